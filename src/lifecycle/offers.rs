use chrono::{Datelike, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::{
    allocate_number, customer_email, discard_on_error, greeting, mark_flow, payload_lines,
    pdf_attachment, record_document, remove_file, require_customer, store_pdf,
};
use crate::document_gen::{DocumentInput, DocumentKind};
use crate::error::{AppError, Result};
use crate::customer_match::NumberPool;
use crate::models::{
    Customer, CustomerInput, DocumentType, FlowPatch, Offer, OfferStatus, UnknownVariant, number_like,
};
use crate::numbering::Series;
use crate::services::OutgoingMail;
use crate::services::assistant::OfferDraft;
use crate::services::storage::offer_path;
use crate::state::AppState;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewOffer {
    pub customer_id: Uuid,
    pub title: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub needs_print: bool,
}

/// Allocate a number, render and store the PDF, then write the offer and
/// its document row.
pub async fn create_offer(state: &AppState, new: NewOffer) -> Result<Offer> {
    let customer = require_customer(state, new.customer_id).await?;
    if new.amount.is_some_and(|amount| amount < 0.0) {
        return Err(AppError::bad_request("amount must not be negative"));
    }

    let now = Utc::now();
    let number = allocate_number(state, Series::Offer, now.year()).await?;
    let id = Uuid::new_v4();
    let data = if new.data.is_null() { Value::Object(Default::default()) } else { new.data };

    let mut offer = Offer {
        id,
        customer_id: customer.id,
        number,
        title: new.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        amount: new.amount,
        currency: new
            .currency
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| state.config.default_currency.clone()),
        status: OfferStatus::Draft,
        data,
        needs_print: new.needs_print,
        bucket: state.bucket().to_string(),
        storage_path: None,
        pdf_url: None,
        created_at: now,
        updated_at: now,
    };

    let mut input = DocumentInput::new(DocumentKind::Offer, customer.id.to_string(), now);
    input.title = offer.title.clone();
    input.amount = offer.amount;
    input.currency = offer.currency.clone();
    input.needs_print = offer.needs_print;
    input.number = Some(offer.number.clone());
    input.rows = payload_lines(&offer);
    input.data = offer.data.clone();
    let pdf = state.documents.render(&input)?;

    let path = offer_path(customer.id, id);
    let url = store_pdf(state, &path, pdf).await?;
    offer.storage_path = Some(path.clone());
    offer.pdf_url = Some(url.clone());

    discard_on_error(state, &path, state.store.insert_offer(&offer).await).await?;
    record_document(state, Some(customer.id), DocumentType::Offer, &path, Some(url), Some(id)).await;

    tracing::info!(offer_id = %id, number = %offer.number, customer_id = %customer.id, "offer created");
    Ok(offer)
}

/// Offer belonging to `customer_id`; a mismatched pair is reported as
/// missing.
async fn offer_of(state: &AppState, offer_id: Uuid, customer_id: Uuid) -> Result<Offer> {
    state
        .store
        .get_offer(offer_id)
        .await?
        .filter(|offer| offer.customer_id == customer_id)
        .ok_or(AppError::NotFound("offer"))
}

pub async fn require_offer(state: &AppState, id: Uuid) -> Result<Offer> {
    state.store.get_offer(id).await?.ok_or(AppError::NotFound("offer"))
}

/// Set any of the five statuses, regardless of the current one.
pub async fn update_status(state: &AppState, offer_id: Uuid, customer_id: Uuid, status: &str) -> Result<Offer> {
    let status: OfferStatus = status
        .trim()
        .parse()
        .map_err(|err: UnknownVariant| AppError::bad_request(err.to_string()))?;

    let mut offer = offer_of(state, offer_id, customer_id).await?;
    offer.status = status;
    offer.updated_at = Utc::now();
    state.store.update_offer(&offer).await?;

    if status == OfferStatus::Sent {
        mark_flow(state, customer_id, FlowPatch::offer_sent()).await;
    }
    tracing::info!(%offer_id, status = %status, "offer status updated");
    Ok(offer)
}

pub async fn send_offer(state: &AppState, id: Uuid) -> Result<Offer> {
    let mut offer = require_offer(state, id).await?;
    let customer = require_customer(state, offer.customer_id).await?;
    let to = customer_email(&customer)?;

    let link = offer.pdf_url.clone().unwrap_or_default();
    let mail = OutgoingMail {
        to,
        subject: format!("Här kommer din offert från oss - {}", offer.number),
        text: format!(
            "Hej {},\n\nHär kommer din offert {}.\n\nLänk: {link}\n\nMed vänliga hälsningar\n{}",
            greeting(&customer),
            offer.number,
            state.config.company_name,
        ),
        attachment: pdf_attachment(state, &offer.bucket, offer.storage_path.as_deref(), &offer.number).await?,
    };
    state.mailer.send(&mail).await?;

    offer.status = OfferStatus::Sent;
    offer.updated_at = Utc::now();
    state.store.update_offer(&offer).await?;
    mark_flow(state, offer.customer_id, FlowPatch::offer_sent()).await;

    tracing::info!(offer_id = %id, to = %mail.to, "offer sent");
    Ok(offer)
}

/// Remove the stored PDF, the document rows and the offer.
pub async fn delete_offer(state: &AppState, offer_id: Uuid, customer_id: Uuid) -> Result<()> {
    let offer = offer_of(state, offer_id, customer_id).await?;

    if let Some(path) = &offer.storage_path {
        remove_file(state, &offer.bucket, path).await;
    }
    let documents = state.store.delete_documents_for_source(offer_id).await?;
    if !state.store.delete_offer(offer_id).await? {
        return Err(AppError::NotFound("offer"));
    }

    tracing::info!(%offer_id, documents, "offer deleted");
    Ok(())
}

/// Upsert the customer from the assistant's `kund` object, then create an
/// offer from `titel`, `summa` and `valuta`.
pub async fn create_from_assistant(
    state: &AppState,
    customer_id: Uuid,
    json_data: Value,
    text_data: String,
) -> Result<(Customer, Offer)> {
    if !json_data.is_object() {
        return Err(AppError::bad_request("jsonData must be an object"));
    }
    if text_data.trim().is_empty() {
        return Err(AppError::bad_request("textData is required"));
    }

    let kund: CustomerInput = match json_data.get("kund") {
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|err| AppError::bad_request(format!("invalid kund: {err}")))?,
        None => CustomerInput::default(),
    };
    let customer = upsert_customer(state, customer_id, kund).await?;

    let text_field = |key: &str| {
        json_data
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|v| !v.trim().is_empty())
    };
    let title = text_field("titel").or_else(|| Some("Offert".to_string()));
    let currency = text_field("valuta");
    let amount = json_data.get("summa").and_then(number_like);

    let mut data = json_data.clone();
    if let Value::Object(map) = &mut data {
        map.insert("textData".to_string(), Value::String(text_data));
    }

    let offer = create_offer(
        state,
        NewOffer {
            customer_id: customer.id,
            title,
            amount,
            currency,
            data,
            needs_print: false,
        },
    )
    .await?;
    Ok((customer, offer))
}

async fn upsert_customer(state: &AppState, id: Uuid, fields: CustomerInput) -> Result<Customer> {
    match state.store.get_customer(id).await? {
        Some(mut customer) => {
            if fields.apply_to(&mut customer) {
                customer.updated_at = Utc::now();
                state.store.update_customer(&customer).await?;
            }
            Ok(customer)
        }
        None => {
            if fields.company_name().is_none() {
                return Err(AppError::bad_request("kund.namn is required for a new customer"));
            }
            let existing = state.store.list_customers().await?;
            let mut pool = NumberPool::new(existing.iter().map(|c| c.customer_number.as_str()));
            let number = pool.claim(fields.customer_number.as_deref());
            let customer = fields.into_customer(id, number, Utc::now());
            state.store.insert_customer(&customer).await?;
            tracing::info!(customer_id = %id, "customer created from offer assistant");
            Ok(customer)
        }
    }
}

/// Ask the language model for an offer draft.
pub async fn generate_draft(state: &AppState, requirements: &str, customer_id: Option<Uuid>) -> Result<OfferDraft> {
    if requirements.trim().is_empty() {
        return Err(AppError::bad_request("requirements must not be empty"));
    }
    let assistant = state.assistant()?;
    let customer = match customer_id {
        Some(id) => Some(require_customer(state, id).await?),
        None => None,
    };
    assistant.draft_offer(requirements, customer.as_ref()).await
}
