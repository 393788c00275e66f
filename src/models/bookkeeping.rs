use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sales invoice or purchase receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Invoice,
    Receipt,
}

text_enum!(EntryKind, "entry kind", {
    Invoice => "invoice",
    Receipt => "receipt",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    ToBook,
    Booked,
}

text_enum!(EntryStatus, "entry status", {
    ToBook => "to_book",
    Booked => "booked",
});

/// A record handed to the bookkeeping process.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BookkeepingEntry {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub kind: EntryKind,
    pub customer_id: Option<Uuid>,
    pub invoice_id: Option<Uuid>,
    pub counterparty: String,
    pub reference: String,
    pub entry_date: NaiveDate,
    pub amount_incl_vat: f64,
    pub vat_amount: f64,
    pub currency: String,
    pub file_url: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
}
