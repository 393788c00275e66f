use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Offer,
    Order,
    Invoice,
    Receipt,
}

text_enum!(DocumentType, "document type", {
    Offer => "offer",
    Order => "order",
    Invoice => "invoice",
    Receipt => "receipt",
});

/// A stored file tied to a customer: generated PDFs, uploads and receipts.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    #[sqlx(try_from = "String")]
    pub doc_type: DocumentType,
    pub bucket: String,
    pub storage_path: String,
    pub filename: String,
    pub file_url: Option<String>,
    pub status: String,
    /// Offer, order or invoice the file was rendered from.
    pub source_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn content_type(&self) -> mime::Mime {
        let extension = self
            .filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "pdf" => mime::APPLICATION_PDF,
            "jpg" | "jpeg" => mime::IMAGE_JPEG,
            "png" => mime::IMAGE_PNG,
            "txt" => mime::TEXT_PLAIN_UTF_8,
            _ => mime::APPLICATION_OCTET_STREAM,
        }
    }
}
