use robot_agent_core::conversation::DEFAULT_INSTRUCTIONS;
use secrecy::SecretString;
use tracing::Level;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// OpenAI-compatible backend used for the turn-based mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
}

impl Provider {
    pub fn api_base(&self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub robot_ip: String,
    pub robot_port: u16,
    pub provider: Provider,
    pub openai_api_key: Option<SecretString>,
    pub gemini_api_key: Option<SecretString>,
    pub chat_model: String,
    pub chat_store: bool,
    pub realtime_model: String,
    pub realtime_voice: String,
    pub system_prompt: String,
    pub log_level: Level,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn secret(name: &str) -> Option<SecretString> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// API keys are checked only when a mode needs them, so `mcp` and
    /// `devices` work without any.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let robot_ip =
            std::env::var("ROBOT_IP").map_err(|_| ConfigError::MissingVar("ROBOT_IP".to_string()))?;

        let robot_port_str = var_or("ROBOT_PORT", "5000");
        let robot_port = robot_port_str
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidValue("ROBOT_PORT".to_string(), e.to_string()))?;

        let provider_str = var_or("CHAT_PROVIDER", "openai");
        let provider = match provider_str.to_lowercase().as_str() {
            "openai" => Provider::OpenAI,
            "gemini" => Provider::Gemini,
            other => {
                return Err(ConfigError::InvalidValue(
                    "CHAT_PROVIDER".to_string(),
                    format!("'{}' is not one of 'openai', 'gemini'", other),
                ));
            }
        };

        let chat_store_str = var_or("CHAT_STORE", "true");
        let chat_store = chat_store_str.to_lowercase().parse::<bool>().map_err(|_| {
            ConfigError::InvalidValue(
                "CHAT_STORE".to_string(),
                format!("'{}' is not a boolean", chat_store_str),
            )
        })?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            robot_ip,
            robot_port,
            provider,
            openai_api_key: secret("OPENAI_API_KEY"),
            gemini_api_key: secret("GEMINI_API_KEY"),
            chat_model: var_or("CHAT_MODEL", "gpt-4o"),
            chat_store,
            realtime_model: var_or("REALTIME_MODEL", openai_realtime::DEFAULT_MODEL),
            realtime_voice: var_or("REALTIME_VOICE", "alloy"),
            system_prompt: var_or("SYSTEM_PROMPT", DEFAULT_INSTRUCTIONS),
            log_level,
        })
    }

    pub fn robot_url(&self) -> String {
        format!("http://{}:{}", self.robot_ip, self.robot_port)
    }

    /// The key for the configured chat provider.
    pub fn chat_api_key(&self) -> Result<&SecretString, ConfigError> {
        let (key, var) = match self.provider {
            Provider::OpenAI => (&self.openai_api_key, "OPENAI_API_KEY"),
            Provider::Gemini => (&self.gemini_api_key, "GEMINI_API_KEY"),
        };
        key.as_ref().ok_or_else(|| {
            ConfigError::MissingVar(format!(
                "{} must be set for the '{:?}' chat provider",
                var, self.provider
            ))
        })
    }

    /// Realtime sessions always go to OpenAI.
    pub fn realtime_api_key(&self) -> Result<&SecretString, ConfigError> {
        self.openai_api_key.as_ref().ok_or_else(|| {
            ConfigError::MissingVar("OPENAI_API_KEY must be set for voice sessions".to_string())
        })
    }
}
