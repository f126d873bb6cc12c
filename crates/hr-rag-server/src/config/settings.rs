use anyhow::Result;
use config::{Config, Environment};
use serde::Deserialize;

/// Minimum length of the bearer secret, in bytes.
pub const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    Development,
    Test,
    Production,
}

/// Process configuration, read from the environment at startup and
/// immutable afterwards. Validation failure aborts the process.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub database_url: String,
    pub openai_api_key: String,
    pub api_secret_token: String,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_app_env")]
    pub app_env: AppEnv,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_allowed_origins() -> String {
    "http://localhost:3000".to_string()
}

fn default_llm_model() -> String {
    "gpt-5-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_app_env() -> AppEnv {
    AppEnv::Development
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(Environment::default().try_parsing(true))
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL must not be empty");
        }
        if self.openai_api_key.trim().is_empty() {
            anyhow::bail!("OPENAI_API_KEY must not be empty");
        }
        if self.api_secret_token.len() < MIN_SECRET_BYTES {
            anyhow::bail!(
                "API_SECRET_TOKEN must be at least {} bytes, got {}",
                MIN_SECRET_BYTES,
                self.api_secret_token.len()
            );
        }
        if self.origins().is_empty() {
            anyhow::bail!("ALLOWED_ORIGINS must name at least one origin");
        }
        Ok(())
    }

    /// The CORS allowlist, parsed from the comma-separated setting.
    pub fn origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }
}
