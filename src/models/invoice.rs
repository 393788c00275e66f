use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Created,
    Sent,
    Paid,
    Exported,
    Canceled,
}

text_enum!(InvoiceStatus, "invoice status", {
    Created => "created",
    Sent => "sent",
    Paid => "paid",
    Exported => "exported",
    Canceled => "canceled",
});

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub source_order_id: Option<Uuid>,
    pub number: String,
    #[sqlx(try_from = "String")]
    pub status: InvoiceStatus,
    pub due_date: NaiveDate,
    pub currency: String,
    pub subtotal: f64,
    pub vat_percent: f64,
    pub vat_total: f64,
    pub total: f64,
    /// Customer snapshot and billed rows.
    pub data: serde_json::Value,
    pub bucket: String,
    pub storage_path: Option<String>,
    pub pdf_url: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    /// When the invoice was posted to bookkeeping. Never cleared by a later
    /// status change.
    pub exported_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
