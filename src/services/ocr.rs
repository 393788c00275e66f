//! Client for the receipt OCR microservice.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::extract::{ReceiptFields, extract_receipt_fields};

/// Anything shorter cannot be an image.
pub const MIN_IMAGE_BYTES: usize = 10;

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn check_size(&self) -> Result<()> {
        if self.bytes.len() < MIN_IMAGE_BYTES {
            return Err(AppError::bad_request("the file looks empty"));
        }
        Ok(())
    }

    /// Decode `imageBase64` from a JSON body. A `data:image/...;base64,`
    /// prefix is allowed.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let (header, payload) = encoded.split_once(',').unwrap_or(("", encoded));
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|err| AppError::bad_request(format!("invalid base64 image: {err}")))?;
        let content_type = header
            .strip_prefix("data:")
            .and_then(|rest| rest.split(';').next())
            .filter(|mime| !mime.is_empty())
            .unwrap_or("image/jpeg")
            .to_string();

        let extension = content_type.rsplit('/').next().unwrap_or("jpg");
        Ok(Self {
            filename: format!("upload.{extension}"),
            content_type,
            bytes,
        })
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OcrResult {
    pub text: String,
    pub fields: ReceiptFields,
}

#[async_trait]
pub trait OcrClient: Send + Sync {
    async fn recognize(&self, image: ImageUpload) -> Result<OcrResult>;
}

pub struct HttpOcrClient {
    client: Client,
    endpoint: String,
}

impl HttpOcrClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/ocr", base_url.trim_end_matches('/')),
        })
    }
}

#[derive(Deserialize, Debug, Default)]
struct ServiceResponse {
    #[serde(default)]
    ok: bool,
    company: Option<String>,
    total: Option<f64>,
    vat: Option<f64>,
    #[serde(default)]
    raw_text: String,
    error: Option<String>,
    message: Option<String>,
}

impl ServiceResponse {
    /// The service's own fields win; local heuristics fill the gaps.
    fn into_result(self) -> OcrResult {
        let service = ReceiptFields {
            company: self.company,
            total: self.total,
            vat: self.vat,
        };
        let fields = service.or(extract_receipt_fields(&self.raw_text));
        OcrResult {
            text: self.raw_text,
            fields,
        }
    }

    fn failure(&self) -> String {
        match (&self.error, &self.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (Some(code), None) => code.clone(),
            (None, Some(message)) => message.clone(),
            (None, None) => "OCR service failed".to_string(),
        }
    }
}

#[async_trait]
impl OcrClient for HttpOcrClient {
    async fn recognize(&self, image: ImageUpload) -> Result<OcrResult> {
        image.check_size()?;
        let size = image.bytes.len();
        let part = Part::bytes(image.bytes)
            .file_name(image.filename)
            .mime_str(&image.content_type)?;

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(Form::new().part("file", part))
            .send()
            .await?;

        let status = response.status();
        let body: ServiceResponse = response.json().await.unwrap_or_default();
        if status.is_client_error() {
            return Err(AppError::BadRequest(body.failure()));
        }
        if !status.is_success() || !body.ok {
            tracing::warn!(%status, error = %body.failure(), "OCR service failed");
            return Err(AppError::Upstream(body.failure()));
        }

        tracing::info!(bytes = size, chars = body.raw_text.len(), "receipt recognized");
        Ok(body.into_result())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_data_urls() {
        let encoded = format!("data:image/png;base64,{}", STANDARD.encode(b"0123456789abc"));
        let image = ImageUpload::from_base64(&encoded).unwrap();
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.filename, "upload.png");
        assert_eq!(image.bytes, b"0123456789abc");
        assert!(image.check_size().is_ok());
    }

    #[test]
    fn rejects_tiny_and_broken_payloads() {
        let tiny = ImageUpload::from_base64(&STANDARD.encode(b"abc")).unwrap();
        assert!(matches!(tiny.check_size(), Err(AppError::BadRequest(_))));
        assert!(ImageUpload::from_base64("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn service_fields_win_over_heuristics() {
        let response: ServiceResponse = serde_json::from_value(serde_json::json!({
            "ok": true,
            "company": "",
            "total": 250.0,
            "vat": null,
            "raw_text": "ICA Nära\nTotal 199,00\nMoms 39,80"
        }))
        .unwrap();

        let result = response.into_result();
        assert_eq!(result.fields.company.as_deref(), Some("ICA Nära"));
        assert_eq!(result.fields.total, Some(250.0));
        assert_eq!(result.fields.vat, Some(39.8));
    }

    #[test]
    fn failure_message_combines_code_and_text() {
        let response = ServiceResponse {
            error: Some("EMPTY_FILE".into()),
            message: Some("Filen verkar tom.".into()),
            ..Default::default()
        };
        assert_eq!(response.failure(), "EMPTY_FILE: Filen verkar tom.");
    }
}
