pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use tokio::sync::watch;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::services::feedback_chat::ChatSession;
use crate::services::gemini::GeminiClient;
use crate::services::model::ModelGateway;
use crate::services::sessions::{InMemorySessionStore, SessionStore};

fn build_state(
    settings: Settings,
    sessions: Arc<dyn SessionStore<ChatSession>>,
) -> anyhow::Result<AppState> {
    if settings.ai().gemini_api_key.is_empty() {
        tracing::warn!("GEMINI_API_KEY is not set; language model calls will fail");
    }
    let client = GeminiClient::from_settings(&settings)?;
    let gateway = ModelGateway::new(Arc::new(client), settings.ai().request_timeout());
    Ok(AppState::new(settings, gateway, sessions))
}

fn chat_sessions(settings: &Settings) -> Arc<InMemorySessionStore<ChatSession>> {
    Arc::new(InMemorySessionStore::new(settings.chat().session_ttl(), settings.chat().max_sessions))
}

/// Script evaluation service.
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings, "evaluator")?;
    core::metrics::init(&settings)?;

    tokio::fs::create_dir_all(&settings.storage().upload_dir).await?;
    let sessions = chat_sessions(&settings);
    let state = build_state(settings, sessions)?;

    let app = api::router::evaluation_router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().evaluator_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        addr = %state.settings().evaluator_addr(),
        environment = %state.settings().runtime().environment.as_str(),
        model = %state.settings().ai().gemini_model,
        "Scriptmark evaluator listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    Ok(())
}

/// Feedback chat service with its session sweeper.
pub async fn run_feedback_chat() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings, "feedback-chat")?;
    core::metrics::init(&settings)?;

    let sessions = chat_sessions(&settings);
    let state = build_state(settings, sessions.clone())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper =
        tasks::session_sweeper::spawn(sessions, tasks::session_sweeper::SWEEP_INTERVAL, shutdown_rx);

    let app = api::router::feedback_router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().feedback_addr()).await?;

    tracing::info!(
        addr = %state.settings().feedback_addr(),
        environment = %state.settings().runtime().environment.as_str(),
        session_ttl_minutes = state.settings().chat().session_ttl_minutes,
        max_sessions = state.settings().chat().max_sessions,
        "Scriptmark feedback chat listening"
    );

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(core::shutdown::shutdown_signal_with(shutdown_tx))
        .await;

    if let Err(err) = sweeper.await {
        tracing::error!(error = %err, "Session sweeper join failed");
    }

    result?;

    Ok(())
}
