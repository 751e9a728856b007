#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = scriptmark::run_feedback_chat().await {
        eprintln!("feedback-chat fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
