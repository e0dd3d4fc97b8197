use std::env;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

const DEFAULT_CORS_ORIGINS: &[&str] = &["http://localhost:5173", "http://localhost:3000"];

/// Process configuration, read once from the environment (and `.env` via dotenvy).
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    server: ServerSettings,
    runtime: RuntimeSettings,
    api: ApiSettings,
    security: SecuritySettings,
    cors: CorsSettings,
    database: DatabaseSettings,
    redis: RedisSettings,
    ai: AiSettings,
    s3: S3Settings,
    grading: GradingSettings,
    notifications: NotificationSettings,
    telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
struct ServerSettings {
    host: String,
    port: u16,
}

#[derive(Debug, Clone)]
pub(crate) struct ApiSettings {
    pub(crate) api_v1_str: String,
}

/// Tokens are issued by the platform; only the shared secret and algorithm live here.
#[derive(Debug, Clone)]
pub(crate) struct SecuritySettings {
    pub(crate) secret_key: String,
    pub(crate) access_token_expire_minutes: u64,
    pub(crate) algorithm: String,
}

#[derive(Debug, Clone)]
pub(crate) struct CorsSettings {
    pub(crate) origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct DatabaseSettings {
    server: String,
    port: u16,
    user: String,
    password: String,
    name: String,
    url: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct RedisSettings {
    host: String,
    port: u16,
    db: u16,
    password: Option<String>,
}

/// External AI correction/context service.
#[derive(Debug, Clone)]
pub(crate) struct AiSettings {
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) correction_timeout_seconds: u64,
    pub(crate) context_timeout_seconds: u64,
    pub(crate) context_default_ttl_hours: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct S3Settings {
    pub(crate) endpoint: String,
    pub(crate) access_key: String,
    pub(crate) secret_key: String,
    pub(crate) bucket: String,
    pub(crate) region: String,
}

/// Scoring thresholds and retry budgets. The per-question keyword threshold and the
/// quiz pass threshold are separate knobs.
#[derive(Debug, Clone)]
pub(crate) struct GradingSettings {
    pub(crate) quiz_pass_threshold: u32,
    pub(crate) keyword_correct_threshold: u32,
    pub(crate) min_text_answer_chars: usize,
    pub(crate) ai_retry_max_attempts: u32,
    pub(crate) retry_batch_size: u32,
    pub(crate) retry_interval_seconds: u64,
    pub(crate) pending_overdue_hours: u64,
    pub(crate) reminder_max: u32,
    pub(crate) reminder_interval_hours: u64,
    pub(crate) submit_claim_ttl_seconds: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct NotificationSettings {
    pub(crate) webhook_url: Option<String>,
    pub(crate) timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
    pub(crate) prometheus_enabled: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) environment: Environment,
    strict: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Test => "test",
        }
    }

    fn from_env() -> Self {
        let raw = env_optional("GRADER_ENV").or_else(|| env_optional("ENVIRONMENT"));
        match raw.map(|value| value.to_ascii_lowercase()).as_deref() {
            Some("production" | "prod") => Environment::Production,
            Some("staging") => Environment::Staging,
            Some("test" | "testing") => Environment::Test,
            _ => Environment::Development,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("invalid cors origins: {0}")]
    InvalidCors(String),
    #[error("missing required setting {0}")]
    Missing(&'static str),
}

impl RuntimeSettings {
    fn from_env() -> Self {
        let environment = Environment::from_env();
        let strict = env_flag("GRADER_STRICT_CONFIG") || environment == Environment::Production;
        Self { environment, strict }
    }
}

impl ServerSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let host = env_or("GRADER_HOST", "0.0.0.0");
        let port: u16 = env_parse("GRADER_PORT", 8000)?;
        if port == 0 {
            return Err(ConfigError::InvalidValue { field: "GRADER_PORT", value: "0".into() });
        }
        Ok(Self { host, port })
    }
}

impl SecuritySettings {
    fn from_env(runtime: &RuntimeSettings) -> Result<Self, ConfigError> {
        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None if runtime.strict => return Err(ConfigError::Missing("SECRET_KEY")),
            None => {
                tracing::warn!("SECRET_KEY not set; platform tokens will not verify");
                ephemeral_secret()
            }
        };
        Ok(Self {
            secret_key,
            access_token_expire_minutes: env_parse("ACCESS_TOKEN_EXPIRE_MINUTES", 10080)?,
            algorithm: env_or("ALGORITHM", "HS256"),
        })
    }
}

impl DatabaseSettings {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: env_or("POSTGRES_SERVER", "localhost"),
            port: env_parse("POSTGRES_PORT", 5432)?,
            user: env_or("POSTGRES_USER", "quiz_grader"),
            password: env_or("POSTGRES_PASSWORD", ""),
            name: env_or("POSTGRES_DB", "quiz_grader"),
            url: env_optional("DATABASE_URL"),
        })
    }

    pub(crate) fn database_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!(
                "postgresql://{}:{}@{}:{}/{}",
                self.user, self.password, self.server, self.port, self.name
            ),
        }
    }
}

impl RedisSettings {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or("REDIS_HOST", "localhost"),
            port: env_parse("REDIS_PORT", 6379)?,
            db: env_parse("REDIS_DB", 0)?,
            password: env_optional("REDIS_PASSWORD"),
        })
    }

    pub(crate) fn redis_url(&self) -> String {
        match &self.password {
            Some(password) => {
                format!("redis://:{password}@{}:{}/{}", self.host, self.port, self.db)
            }
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

impl AiSettings {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: env_or("AI_SERVICE_BASE_URL", ""),
            api_key: env_or("AI_SERVICE_API_KEY", ""),
            correction_timeout_seconds: env_parse("AI_CORRECTION_TIMEOUT_SECONDS", 30)?,
            context_timeout_seconds: env_parse("AI_CONTEXT_TIMEOUT_SECONDS", 180)?,
            context_default_ttl_hours: env_parse("AI_CONTEXT_DEFAULT_TTL_HOURS", 24)?,
        })
    }
}

impl S3Settings {
    fn from_env() -> Self {
        Self {
            endpoint: env_or("S3_ENDPOINT", "https://storage.yandexcloud.net"),
            access_key: env_or("S3_ACCESS_KEY", ""),
            secret_key: env_or("S3_SECRET_KEY", ""),
            bucket: env_or("S3_BUCKET", "quiz-units"),
            region: env_or("S3_REGION", "ru-central1"),
        }
    }
}

impl GradingSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let grading = Self {
            quiz_pass_threshold: env_parse("QUIZ_PASS_THRESHOLD", 80)?,
            keyword_correct_threshold: env_parse("KEYWORD_CORRECT_THRESHOLD", 50)?,
            min_text_answer_chars: env_parse("MIN_TEXT_ANSWER_CHARS", 5)?,
            ai_retry_max_attempts: env_parse("AI_RETRY_MAX_ATTEMPTS", 3)?,
            retry_batch_size: env_parse("RETRY_BATCH_SIZE", 50)?,
            retry_interval_seconds: env_parse("RETRY_INTERVAL_SECONDS", 300)?,
            pending_overdue_hours: env_parse("PENDING_OVERDUE_HOURS", 48)?,
            reminder_max: env_parse("REMINDER_MAX", 3)?,
            reminder_interval_hours: env_parse("REMINDER_INTERVAL_HOURS", 24)?,
            submit_claim_ttl_seconds: env_parse("SUBMIT_CLAIM_TTL_SECONDS", 60)?,
        };
        grading.check()?;
        Ok(grading)
    }

    fn check(&self) -> Result<(), ConfigError> {
        let percentages = [
            ("QUIZ_PASS_THRESHOLD", self.quiz_pass_threshold),
            ("KEYWORD_CORRECT_THRESHOLD", self.keyword_correct_threshold),
        ];
        if let Some((field, value)) = percentages.into_iter().find(|(_, value)| *value > 100) {
            return Err(ConfigError::InvalidValue { field, value: value.to_string() });
        }

        let budgets = [
            ("AI_RETRY_MAX_ATTEMPTS", self.ai_retry_max_attempts),
            ("RETRY_BATCH_SIZE", self.retry_batch_size),
        ];
        if let Some((field, _)) = budgets.into_iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::InvalidValue { field, value: "0".into() });
        }
        Ok(())
    }
}

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let runtime = RuntimeSettings::from_env();
        let origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let settings = Self {
            server: ServerSettings::from_env()?,
            api: ApiSettings { api_v1_str: env_or("API_V1_STR", "/api/v1") },
            security: SecuritySettings::from_env(&runtime)?,
            cors: CorsSettings { origins },
            database: DatabaseSettings::from_env()?,
            redis: RedisSettings::from_env()?,
            ai: AiSettings::from_env()?,
            s3: S3Settings::from_env(),
            grading: GradingSettings::from_env()?,
            notifications: NotificationSettings {
                webhook_url: env_optional("NOTIFY_WEBHOOK_URL"),
                timeout_seconds: env_parse("NOTIFY_TIMEOUT_SECONDS", 10)?,
            },
            telemetry: TelemetrySettings {
                log_level: env_or("GRADER_LOG_LEVEL", "info"),
                json: env_flag("GRADER_LOG_JSON"),
                prometheus_enabled: env_flag("PROMETHEUS_ENABLED"),
            },
            runtime,
        };

        if settings.runtime.strict {
            settings.require_production_secrets()?;
        }
        Ok(settings)
    }

    fn require_production_secrets(&self) -> Result<(), ConfigError> {
        if self.database.url.is_none() && self.database.password.is_empty() {
            return Err(ConfigError::Missing("POSTGRES_PASSWORD"));
        }
        if self.ai.base_url.is_empty() {
            return Err(ConfigError::Missing("AI_SERVICE_BASE_URL"));
        }
        if self.ai.api_key.is_empty() {
            return Err(ConfigError::Missing("AI_SERVICE_API_KEY"));
        }
        Ok(())
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn s3(&self) -> &S3Settings {
        &self.s3
    }

    pub(crate) fn grading(&self) -> &GradingSettings {
        &self.grading
    }

    pub(crate) fn notifications(&self) -> &NotificationSettings {
        &self.notifications
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

fn env_flag(key: &str) -> bool {
    env_optional(key).is_some_and(|value| {
        matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
    })
}

fn env_parse<T: FromStr>(field: &'static str, default: T) -> Result<T, ConfigError> {
    match env_optional(field) {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue { field, value }),
        None => Ok(default),
    }
}

/// Accepts a JSON array or a comma-separated list; empty input keeps the defaults.
fn parse_cors_origins(value: Option<String>) -> Result<Vec<String>, ConfigError> {
    let raw = value.unwrap_or_default();
    let origins: Vec<String> = if raw.trim_start().starts_with('[') {
        serde_json::from_str(&raw).map_err(|_| ConfigError::InvalidCors(raw.clone()))?
    } else {
        raw.split(',').map(str::trim).filter(|item| !item.is_empty()).map(String::from).collect()
    };

    if origins.is_empty() {
        return Ok(DEFAULT_CORS_ORIGINS.iter().map(|origin| origin.to_string()).collect());
    }
    Ok(origins)
}

fn ephemeral_secret() -> String {
    let mut bytes = [0u8; 64];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
