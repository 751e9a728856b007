use std::path::PathBuf;

use super::parsing::{
    env_optional, env_or_default, is_supported_image_extension, parse_bool, parse_cors_origins,
    parse_environment, parse_string_list, parse_u64, parse_usize,
};
use super::types::{
    AiSettings, ChatSettings, ConfigError, CorsSettings, RuntimeSettings, ServerHost, ServerPort,
    ServerSettings, Settings, StorageSettings, TelemetrySettings, BYTES_PER_MB, SECS_PER_MINUTE,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("SCRIPTMARK_HOST", "0.0.0.0");
        let evaluator_port = env_or_default("SCRIPTMARK_EVALUATOR_PORT", "5000");
        let feedback_port = env_or_default("SCRIPTMARK_FEEDBACK_PORT", "8000");

        let environment = parse_environment(
            env_optional("SCRIPTMARK_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("SCRIPTMARK_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let gemini_api_key = env_or_default("GEMINI_API_KEY", "");
        let gemini_base_url =
            env_or_default("GEMINI_BASE_URL", "https://generativelanguage.googleapis.com/v1beta");
        let gemini_model = env_or_default("GEMINI_MODEL", "gemini-2.5-flash");
        let ai_request_timeout =
            parse_u64("AI_REQUEST_TIMEOUT", env_or_default("AI_REQUEST_TIMEOUT", "120"))?;

        let upload_dir = PathBuf::from(env_or_default("UPLOAD_DIR", "uploads"));
        let max_upload_size_mb =
            parse_u64("MAX_UPLOAD_SIZE_MB", env_or_default("MAX_UPLOAD_SIZE_MB", "10"))?;
        let allowed_image_extensions =
            parse_string_list(env_optional("ALLOWED_IMAGE_EXTENSIONS"), &["jpg", "jpeg", "png"]);
        let result_path = PathBuf::from(env_or_default(
            "EVALUATION_RESULT_PATH",
            "final_evaluation_result.json",
        ));

        let session_ttl_minutes = parse_u64(
            "CHAT_SESSION_TTL_MINUTES",
            env_or_default("CHAT_SESSION_TTL_MINUTES", "120"),
        )?;
        let max_sessions =
            parse_usize("CHAT_MAX_SESSIONS", env_or_default("CHAT_MAX_SESSIONS", "1000"))?;

        let log_level = env_or_default("SCRIPTMARK_LOG_LEVEL", "info");
        let json = env_optional("SCRIPTMARK_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                evaluator_port: ServerPort::parse(evaluator_port)?,
                feedback_port: ServerPort::parse(feedback_port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            cors: CorsSettings { origins: cors_origins },
            ai: AiSettings { gemini_api_key, gemini_base_url, gemini_model, ai_request_timeout },
            storage: StorageSettings {
                upload_dir,
                max_upload_size_mb,
                allowed_image_extensions,
                result_path,
            },
            chat: ChatSettings { session_ttl_minutes, max_sessions },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn evaluator_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.evaluator_port.0)
    }

    pub(crate) fn feedback_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.feedback_port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn chat(&self) -> &ChatSettings {
        &self.chat
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.allowed_image_extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ALLOWED_IMAGE_EXTENSIONS",
                value: String::from("<empty>"),
            });
        }
        for extension in &self.storage.allowed_image_extensions {
            if !is_supported_image_extension(extension) {
                return Err(ConfigError::InvalidValue {
                    field: "ALLOWED_IMAGE_EXTENSIONS",
                    value: extension.clone(),
                });
            }
        }

        let max_upload_mb = self.storage.max_upload_size_mb;
        if max_upload_mb == 0 || max_upload_mb.checked_mul(BYTES_PER_MB).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "MAX_UPLOAD_SIZE_MB",
                value: max_upload_mb.to_string(),
            });
        }

        if self.chat.session_ttl_minutes.checked_mul(SECS_PER_MINUTE).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "CHAT_SESSION_TTL_MINUTES",
                value: self.chat.session_ttl_minutes.to_string(),
            });
        }

        if self.ai.ai_request_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                field: "AI_REQUEST_TIMEOUT",
                value: String::from("0"),
            });
        }

        if self.chat.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "CHAT_MAX_SESSIONS",
                value: String::from("0"),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.ai.gemini_api_key.is_empty() {
            return Err(ConfigError::MissingSecret("GEMINI_API_KEY"));
        }

        Ok(())
    }
}
