use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, StorageBackend};
use crate::db::{self, MemoryStore, Store};
use crate::document_gen::DocumentGenerator;
use crate::error::{AppError, Result};
use crate::services::{
    Assistant, HttpOcrClient, LocalStore, LogMailer, Mailer, MemoryObjectStore, ObjectStore, OcrClient,
    OpenAiAssistant, SmtpMailer, SupabaseStore,
};

const STORAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared handles passed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub files: Arc<dyn ObjectStore>,
    pub mailer: Arc<dyn Mailer>,
    pub assistant: Option<Arc<dyn Assistant>>,
    pub ocr: Option<Arc<dyn OcrClient>>,
    pub documents: Arc<DocumentGenerator>,
}

impl AppState {
    /// Wire up every collaborator the configuration names.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let store = db::init(&config).await?;

        let files: Arc<dyn ObjectStore> = match config.storage_backend {
            StorageBackend::Local => {
                tracing::info!(root = %config.storage_root, "storing files on local disk");
                Arc::new(LocalStore::new(&config.storage_root, &config.public_base_url))
            }
            StorageBackend::Supabase => {
                let (Some(url), Some(key)) = (&config.supabase_url, &config.supabase_service_key) else {
                    anyhow::bail!("supabase storage needs SUPABASE_URL and SUPABASE_SERVICE_KEY");
                };
                tracing::info!(url = %url, "storing files in supabase");
                Arc::new(SupabaseStore::new(url, key, STORAGE_TIMEOUT)?)
            }
            StorageBackend::Memory => {
                tracing::warn!("STORAGE_BACKEND=memory, files are lost on restart");
                Arc::new(MemoryObjectStore::new())
            }
        };

        let mailer: Arc<dyn Mailer> = match &config.smtp_host {
            Some(host) => {
                tracing::info!(host = %host, "sending mail over SMTP");
                Arc::new(SmtpMailer::new(&config, host)?)
            }
            None => {
                tracing::warn!("SMTP_HOST is not set, outgoing mail is only logged");
                Arc::new(LogMailer::new())
            }
        };

        let assistant: Option<Arc<dyn Assistant>> = match &config.openai_api_key {
            Some(key) if !key.trim().is_empty() => Some(Arc::new(OpenAiAssistant::new(&config, key)?)),
            _ => {
                tracing::warn!("OPENAI_API_KEY is not set, offer generation and transcription are disabled");
                None
            }
        };

        let ocr: Option<Arc<dyn OcrClient>> = match &config.ocr_service_url {
            Some(url) => Some(Arc::new(HttpOcrClient::new(
                url,
                Duration::from_secs(config.ocr_timeout_secs),
            )?)),
            None => {
                tracing::warn!("OCR_SERVICE_URL is not set, receipts are stored without OCR");
                None
            }
        };

        Ok(Self {
            documents: Arc::new(DocumentGenerator::new(config.company_name.clone())),
            config: Arc::new(config),
            store,
            files,
            mailer,
            assistant,
            ocr,
        })
    }

    /// Everything in process memory, with mail only logged.
    pub fn in_memory(config: Config) -> Self {
        Self {
            documents: Arc::new(DocumentGenerator::new(config.company_name.clone())),
            config: Arc::new(config),
            store: Arc::new(MemoryStore::new()),
            files: Arc::new(MemoryObjectStore::new()),
            mailer: Arc::new(LogMailer::new()),
            assistant: None,
            ocr: None,
        }
    }

    pub fn with_files(mut self, files: Arc<dyn ObjectStore>) -> Self {
        self.files = files;
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_assistant(mut self, assistant: Arc<dyn Assistant>) -> Self {
        self.assistant = Some(assistant);
        self
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrClient>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn assistant(&self) -> Result<&dyn Assistant> {
        self.assistant
            .as_deref()
            .ok_or_else(|| AppError::Unavailable("the language model is not configured (OPENAI_API_KEY)".into()))
    }

    pub fn ocr(&self) -> Result<&dyn OcrClient> {
        self.ocr
            .as_deref()
            .ok_or_else(|| AppError::Unavailable("the OCR service is not configured (OCR_SERVICE_URL)".into()))
    }

    pub fn bucket(&self) -> &str {
        &self.config.default_bucket
    }
}
