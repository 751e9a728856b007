use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::api;
use crate::core::{config::Settings, state::AppState};
use crate::services::feedback_chat::ChatSession;
use crate::services::model::{Content, LanguageModel, ModelError, ModelGateway};
use crate::services::sessions::InMemorySessionStore;

const TEST_API_KEY: &str = "test-key";

const MANAGED_VARS: &[&str] = &[
    "SCRIPTMARK_HOST",
    "SCRIPTMARK_EVALUATOR_PORT",
    "SCRIPTMARK_FEEDBACK_PORT",
    "ENVIRONMENT",
    "BACKEND_CORS_ORIGINS",
    "GEMINI_BASE_URL",
    "GEMINI_MODEL",
    "AI_REQUEST_TIMEOUT",
    "UPLOAD_DIR",
    "MAX_UPLOAD_SIZE_MB",
    "ALLOWED_IMAGE_EXTENSIONS",
    "EVALUATION_RESULT_PATH",
    "CHAT_SESSION_TTL_MINUTES",
    "CHAT_MAX_SESSIONS",
    "SCRIPTMARK_LOG_LEVEL",
    "SCRIPTMARK_LOG_JSON",
];

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    for name in MANAGED_VARS {
        std::env::remove_var(name);
    }
    std::env::set_var("SCRIPTMARK_ENV", "test");
    std::env::set_var("SCRIPTMARK_STRICT_CONFIG", "0");
    std::env::set_var("GEMINI_API_KEY", TEST_API_KEY);
    std::env::set_var("PROMETHEUS_ENABLED", "0");
}

/// Fresh path under the system temp dir; not created.
pub(crate) fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("scriptmark-test-{}", Uuid::new_v4()))
}

/// Scripted model: replies are handed out in order and every request is
/// recorded. An exhausted script answers with `EmptyResponse`.
pub(crate) struct StubModel {
    replies: StdMutex<VecDeque<Result<String, ModelError>>>,
    calls: StdMutex<Vec<Vec<Content>>>,
    delay: Option<Duration>,
}

impl StubModel {
    pub(crate) fn with_replies(replies: Vec<Result<String, ModelError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: StdMutex::new(replies.into()),
            calls: StdMutex::new(Vec::new()),
            delay: None,
        })
    }

    pub(crate) fn delayed(delay: Duration, replies: Vec<Result<String, ModelError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: StdMutex::new(replies.into()),
            calls: StdMutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    pub(crate) fn calls(&self) -> Vec<Vec<Content>> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn generate(&self, contents: &[Content]) -> Result<String, ModelError> {
        self.calls.lock().expect("calls lock").push(contents.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.replies.lock().expect("replies lock").pop_front();
        reply.unwrap_or(Err(ModelError::EmptyResponse))
    }
}

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) stub: Arc<StubModel>,
    dir: PathBuf,
    _guard: OwnedMutexGuard<()>,
}

impl TestContext {
    pub(crate) async fn new(replies: Vec<Result<String, ModelError>>) -> Self {
        Self::with_env(&[], replies).await
    }

    pub(crate) async fn with_env(
        vars: &[(&str, &str)],
        replies: Vec<Result<String, ModelError>>,
    ) -> Self {
        let guard = env_lock().await;
        set_test_env();

        let dir = scratch_dir();
        std::fs::create_dir_all(&dir).expect("scratch dir");
        std::env::set_var("UPLOAD_DIR", dir.join("uploads"));
        std::env::set_var("EVALUATION_RESULT_PATH", dir.join("result.json"));
        for (name, value) in vars {
            std::env::set_var(name, value);
        }

        let settings = Settings::load().expect("settings");
        let stub = StubModel::with_replies(replies);
        let gateway = ModelGateway::new(stub.clone(), settings.ai().request_timeout());
        let sessions: Arc<InMemorySessionStore<ChatSession>> = Arc::new(
            InMemorySessionStore::new(settings.chat().session_ttl(), settings.chat().max_sessions),
        );
        let state = AppState::new(settings, gateway, sessions);

        Self { state, stub, dir, _guard: guard }
    }

    pub(crate) fn evaluation_app(&self) -> Router {
        api::router::evaluation_router(self.state.clone())
    }

    pub(crate) fn feedback_app(&self) -> Router {
        api::router::feedback_router(self.state.clone())
    }

    pub(crate) fn upload_dir(&self) -> PathBuf {
        self.state.settings().storage().upload_dir.clone()
    }

    pub(crate) fn result_path(&self) -> PathBuf {
        self.state.settings().storage().result_path.clone()
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) enum FormPart<'a> {
    Text { name: &'a str, value: &'a str },
    File { name: &'a str, filename: &'a str, bytes: &'a [u8] },
}

pub(crate) fn multipart_request(uri: &str, parts: &[FormPart<'_>]) -> Request<Body> {
    let boundary = format!("scriptmark-{}", Uuid::new_v4().simple());
    let mut body = Vec::new();

    for part in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match part {
            FormPart::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            FormPart::File { name, filename, bytes } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .expect("multipart request")
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}

/// True when no request left files behind under `dir`.
pub(crate) fn dir_is_empty(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}
