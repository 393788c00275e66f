//! The offer → order → invoice flow and the customer operations around it.
//!
//! Handlers in `api` parse requests and call into here; everything that
//! touches more than one collaborator lives in this module.

use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::document_gen::{Party, RowLine};
use crate::error::{AppError, Result};
use crate::models::{Customer, Document, DocumentType, FlowPatch, Offer, number_like};
use crate::numbering::{Series, format_number};
use crate::services::MailAttachment;
use crate::state::AppState;

pub mod customers;
pub mod inbox;
pub mod invoices;
pub mod offers;
pub mod orders;
pub mod receipts;
pub mod time;

const PDF: &str = "application/pdf";

pub(crate) async fn require_customer(state: &AppState, id: Uuid) -> Result<Customer> {
    state
        .store
        .get_customer(id)
        .await?
        .ok_or(AppError::NotFound("customer"))
}

/// Allocate the next number of a series in the given year.
pub(crate) async fn allocate_number(state: &AppState, series: Series, year: i32) -> Result<String> {
    let seq = state.store.next_sequence(series, year).await?;
    Ok(format_number(series, year, seq))
}

/// Upload a rendered PDF and return its public URL.
pub(crate) async fn store_pdf(state: &AppState, path: &str, bytes: Vec<u8>) -> Result<String> {
    let size = bytes.len();
    state.files.upload(state.bucket(), path, bytes, PDF).await?;
    tracing::info!(path, bytes = size, backend = state.files.kind(), "pdf stored");
    Ok(state.files.public_url(state.bucket(), path))
}

/// Record a document row. A failure is logged and otherwise ignored.
pub(crate) async fn record_document(
    state: &AppState,
    customer_id: Option<Uuid>,
    doc_type: DocumentType,
    storage_path: &str,
    file_url: Option<String>,
    source_id: Option<Uuid>,
) -> Option<Document> {
    let filename = storage_path
        .rsplit('/')
        .next()
        .unwrap_or(storage_path)
        .to_string();
    let document = Document {
        id: Uuid::new_v4(),
        customer_id,
        doc_type,
        bucket: state.bucket().to_string(),
        storage_path: storage_path.to_string(),
        filename,
        file_url,
        status: "created".to_string(),
        source_id,
        created_at: Utc::now(),
    };

    match state.store.insert_document(&document).await {
        Ok(()) => Some(document),
        Err(err) => {
            tracing::warn!(error = %err, path = storage_path, "could not record document row");
            None
        }
    }
}

/// Merge a flow patch. A failure is logged and otherwise ignored.
pub(crate) async fn mark_flow(state: &AppState, customer_id: Uuid, patch: FlowPatch) {
    if let Err(err) = state.store.patch_flow(customer_id, patch).await {
        tracing::warn!(error = %err, %customer_id, "could not update flow status");
    }
}

/// Remove a stored file. A failure is logged and otherwise ignored.
pub(crate) async fn remove_file(state: &AppState, bucket: &str, path: &str) {
    if let Err(err) = state.files.remove(bucket, path).await {
        tracing::warn!(error = %err, bucket, path, "could not remove stored file");
    }
}

/// Pass `result` through, removing the file just stored at `path` when the
/// row that points to it could not be written.
pub(crate) async fn discard_on_error<T>(state: &AppState, path: &str, result: Result<T>) -> Result<T> {
    if result.is_err() {
        remove_file(state, state.bucket(), path).await;
    }
    result
}

/// Download a stored PDF to attach it to an outgoing mail.
pub(crate) async fn pdf_attachment(
    state: &AppState,
    bucket: &str,
    path: Option<&str>,
    number: &str,
) -> Result<Option<MailAttachment>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let bytes = state.files.download(bucket, path).await?;
    Ok(Some(MailAttachment {
        filename: format!("{number}.pdf"),
        content_type: PDF.to_string(),
        bytes,
    }))
}

/// Recipient address of a customer, required before anything is mailed.
pub(crate) fn customer_email(customer: &Customer) -> Result<String> {
    customer
        .email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::bad_request("the customer has no email address"))
}

pub(crate) fn party(customer: &Customer) -> Party {
    let address = [customer.address.as_deref(), customer.zip.as_deref(), customer.city.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");
    Party {
        name: Some(customer.company_name.clone()),
        address: (!address.is_empty()).then_some(address),
        phone: customer.phone.clone(),
        email: customer.email.clone(),
    }
}

/// Customer fields copied into order and invoice payloads.
pub(crate) fn customer_snapshot(customer: &Customer) -> Value {
    json!({
        "id": customer.id,
        "customerNumber": customer.customer_number,
        "name": customer.company_name,
        "orgNr": customer.org_nr,
        "contactPerson": customer.contact_person,
        "email": customer.email,
        "phone": customer.phone,
        "address": customer.address,
        "zip": customer.zip,
        "city": customer.city,
        "country": customer.country,
    })
}

/// Greeting name for mail bodies.
pub(crate) fn greeting(customer: &Customer) -> &str {
    customer
        .contact_person
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(customer.company_name.as_str())
}

/// Line items of an offer payload as `(description, qty, price)`.
///
/// Items use `name` or `description`, `qty` or `quantity`, `price` or
/// `unitPrice`. Items without a description are skipped.
pub(crate) fn payload_lines(offer: &Offer) -> Vec<RowLine> {
    offer
        .payload_items()
        .into_iter()
        .filter_map(|item| {
            let description = ["name", "description"]
                .iter()
                .filter_map(|key| item.get(*key).and_then(Value::as_str))
                .map(str::trim)
                .find(|text| !text.is_empty())?
                .to_string();
            let qty = ["qty", "quantity"]
                .iter()
                .find_map(|key| item.get(*key).and_then(number_like))
                .unwrap_or(1.0);
            let price = ["price", "unitPrice"]
                .iter()
                .find_map(|key| item.get(*key).and_then(number_like))
                .unwrap_or(0.0);
            Some(RowLine { description, qty, price })
        })
        .collect()
}
