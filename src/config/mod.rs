use anyhow::{Result, bail};
use dotenvy::dotenv;
use serde::Deserialize;

/// Which object storage implementation backs uploaded files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    Supabase,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

/// Configuration for the application
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database connection URL. Without it the service runs on the
    /// in-memory store.
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_storage_backend")]
    pub storage_backend: StorageBackend,
    #[serde(default = "default_storage_root")]
    pub storage_root: String,
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    pub supabase_url: Option<String>,
    pub supabase_service_key: Option<String>,
    #[serde(default = "default_bucket")]
    pub default_bucket: String,

    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_mail_from")]
    pub mail_from: String,

    pub openai_api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_secs: u64,

    pub ocr_service_url: Option<String>,
    #[serde(default = "default_ocr_timeout")]
    pub ocr_timeout_secs: u64,

    #[serde(default = "default_payment_terms")]
    pub payment_terms_days: i64,
    #[serde(default = "default_vat_percent")]
    pub default_vat_percent: f64,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    #[serde(default = "default_company_name")]
    pub company_name: String,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

fn default_max_connections() -> u32 {
    5
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Local
}

fn default_storage_root() -> String {
    "storage".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:3000/files".to_string()
}

fn default_bucket() -> String {
    "paperflow-files".to_string()
}

fn default_mail_from() -> String {
    "PaperflowAI <noreply@paperflow.local>".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_ocr_timeout() -> u64 {
    20
}

fn default_payment_terms() -> i64 {
    30
}

fn default_vat_percent() -> f64 {
    25.0
}

fn default_currency() -> String {
    "SEK".to_string()
}

fn default_company_name() -> String {
    "Ditt Företag".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// This function will:
    /// 1. Load variables from .env file if it exists
    /// 2. Deserialize environment variables into Config struct
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let config = envy::from_env::<Config>()?;
        config.validate()?;

        Ok(config)
    }

    /// Build a configuration from explicit key/value pairs, ignoring the
    /// process environment.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Config>(pairs)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.storage_backend == StorageBackend::Supabase
            && (self.supabase_url.is_none() || self.supabase_service_key.is_none())
        {
            bail!("STORAGE_BACKEND=supabase requires SUPABASE_URL and SUPABASE_SERVICE_KEY");
        }
        if self.payment_terms_days < 0 {
            bail!("PAYMENT_TERMS_DAYS must not be negative");
        }
        if !(0.0..=100.0).contains(&self.default_vat_percent) {
            bail!("DEFAULT_VAT_PERCENT must be between 0 and 100");
        }
        Ok(())
    }

    /// Get a direct reference to the database URL
    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref()
    }
}

/// Initialize environment variables and load configuration
pub fn init() -> Result<Config> {
    Config::load()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_keys_are_missing() {
        let config = Config::from_pairs(Vec::new()).unwrap();
        assert!(config.database_url().is_none());
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.storage_backend, StorageBackend::Local);
        assert_eq!(config.default_bucket, "paperflow-files");
        assert_eq!(config.payment_terms_days, 30);
        assert_eq!(config.default_vat_percent, 25.0);
        assert_eq!(config.ocr_timeout_secs, 20);
        assert_eq!(config.log_format, LogFormat::Compact);
    }

    #[test]
    fn reads_uppercase_keys() {
        let config = Config::from_pairs(pairs(&[
            ("DATABASE_URL", "postgres://localhost/paperflow"),
            ("STORAGE_BACKEND", "memory"),
            ("PAYMENT_TERMS_DAYS", "10"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();
        assert_eq!(config.database_url(), Some("postgres://localhost/paperflow"));
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.payment_terms_days, 10);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn supabase_backend_needs_credentials() {
        let result = Config::from_pairs(pairs(&[("STORAGE_BACKEND", "supabase")]));
        assert!(result.is_err());
    }
}
