use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{discard_on_error, require_customer};
use crate::error::{AppError, Result};
use crate::models::{BookkeepingEntry, Document, DocumentType, EntryKind, EntryStatus};
use crate::money::{round2, vat_in_gross};
use crate::services::ocr::{ImageUpload, OcrResult};
use crate::services::storage::{receipt_path, sanitize_filename};
use crate::state::AppState;

const UNKNOWN_SUPPLIER: &str = "Okänd leverantör";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptOutcome {
    pub document: Document,
    pub ocr: Option<OcrResult>,
    /// Why OCR did not run or failed.
    pub ocr_error: Option<String>,
    pub entry: Option<BookkeepingEntry>,
}

fn extension(upload: &ImageUpload) -> String {
    upload
        .filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5)
        .unwrap_or_else(|| match upload.content_type.as_str() {
            "image/png" => "png".to_string(),
            "application/pdf" => "pdf".to_string(),
            _ => "jpg".to_string(),
        })
}

/// Store a receipt, run OCR when it is configured and queue a bookkeeping
/// entry when a total could be read.
pub async fn store_receipt(
    state: &AppState,
    upload: ImageUpload,
    customer_id: Option<Uuid>,
) -> Result<ReceiptOutcome> {
    upload.check_size()?;
    if let Some(id) = customer_id {
        require_customer(state, id).await?;
    }

    let path = receipt_path(customer_id, &extension(&upload));
    state
        .files
        .upload(state.bucket(), &path, upload.bytes.clone(), &upload.content_type)
        .await?;
    let url = state.files.public_url(state.bucket(), &path);

    let now = Utc::now();
    let document = Document {
        id: Uuid::new_v4(),
        customer_id,
        doc_type: DocumentType::Receipt,
        bucket: state.bucket().to_string(),
        storage_path: path.clone(),
        filename: sanitize_filename(&upload.filename),
        file_url: Some(url.clone()),
        status: "uploaded".to_string(),
        source_id: None,
        created_at: now,
    };
    discard_on_error(state, &path, state.store.insert_document(&document).await).await?;

    let (ocr, ocr_error) = match state.ocr() {
        Ok(client) => match client.recognize(upload).await {
            Ok(result) => (Some(result), None),
            Err(err) => {
                tracing::warn!(error = %err, path = %path, "receipt OCR failed");
                (None, Some(err.to_string()))
            }
        },
        Err(err) => (None, Some(err.to_string())),
    };

    let mut entry = None;
    if let Some(fields) = ocr.as_ref().map(|result| &result.fields) {
        if let Some(total) = fields.total {
            let receipt_entry = BookkeepingEntry {
                id: Uuid::new_v4(),
                kind: EntryKind::Receipt,
                customer_id,
                invoice_id: None,
                counterparty: fields
                    .company
                    .clone()
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_SUPPLIER.to_string()),
                reference: document.filename.clone(),
                entry_date: now.date_naive(),
                amount_incl_vat: round2(total),
                vat_amount: fields
                    .vat
                    .map(round2)
                    .unwrap_or_else(|| vat_in_gross(total, state.config.default_vat_percent)),
                currency: state.config.default_currency.clone(),
                file_url: Some(url),
                status: EntryStatus::ToBook,
                created_at: now,
            };
            state.store.insert_entry(&receipt_entry).await?;
            entry = Some(receipt_entry);
        }
    }

    tracing::info!(
        document_id = %document.id,
        path = %path,
        recognized = ocr.is_some(),
        booked = entry.is_some(),
        "receipt stored"
    );
    Ok(ReceiptOutcome {
        document,
        ocr,
        ocr_error,
        entry,
    })
}

/// Invoice registered by hand in the bookkeeping view.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ManualEntry {
    pub customer_id: Option<Uuid>,
    pub title: String,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub invoice_url: String,
    #[serde(alias = "created_at")]
    pub created_at: Option<DateTime<Utc>>,
}

/// The amount is gross; the VAT is the share it contains at the default
/// rate.
pub async fn add_manual_entry(state: &AppState, manual: ManualEntry) -> Result<BookkeepingEntry> {
    let title = manual.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("title is required"));
    }
    if manual.invoice_url.trim().is_empty() {
        return Err(AppError::bad_request("invoiceUrl is required"));
    }
    let amount = manual.amount.unwrap_or(0.0);
    if amount < 0.0 {
        return Err(AppError::bad_request("amount must not be negative"));
    }
    if let Some(id) = manual.customer_id {
        require_customer(state, id).await?;
    }

    let reference = manual
        .invoice_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(title)
        .to_string();

    let now = Utc::now();
    let entry = BookkeepingEntry {
        id: Uuid::new_v4(),
        kind: EntryKind::Invoice,
        customer_id: manual.customer_id,
        invoice_id: None,
        counterparty: title.to_string(),
        reference,
        entry_date: manual.created_at.unwrap_or(now).date_naive(),
        amount_incl_vat: round2(amount),
        vat_amount: vat_in_gross(amount, state.config.default_vat_percent),
        currency: manual
            .currency
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| state.config.default_currency.clone()),
        file_url: Some(manual.invoice_url),
        status: EntryStatus::ToBook,
        created_at: now,
    };
    state.store.insert_entry(&entry).await?;
    tracing::info!(entry_id = %entry.id, amount = entry.amount_incl_vat, "manual bookkeeping entry added");
    Ok(entry)
}
