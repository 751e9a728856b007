#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = scriptmark::run().await {
        eprintln!("scriptmark fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
