use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::extract::{ApiJson, ApiPath, ApiQuery};
use crate::document_gen::{DocumentInput, DocumentKind, Party, RowLine};
use crate::error::{AppError, Result};
use crate::extract::extract_offer_fields;
use crate::lifecycle::offers::{self, NewOffer};
use crate::lifecycle::orders;
use crate::models::number_like;
use crate::state::AppState;

/// Offers listed when no customer is given.
const RECENT_OFFERS: i64 = 25;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/update-status", post(update_status))
        .route("/delete", post(delete))
        .route("/parse", post(parse))
        .route("/create-from-gpt", post(create_from_gpt))
        .route("/generate", post(generate))
        .route("/{id}", get(show))
        .route("/{id}/send", post(send))
        .route("/{id}/to-order", post(to_order))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    customer_id: Option<Uuid>,
}

async fn list(State(state): State<AppState>, ApiQuery(query): ApiQuery<ListQuery>) -> Result<Json<Value>> {
    let offers = match query.customer_id {
        Some(id) => state.store.list_offers(Some(id), None).await?,
        None => state.store.list_offers(None, Some(RECENT_OFFERS)).await?,
    };
    Ok(Json(json!({ "ok": true, "offers": offers })))
}

async fn create(State(state): State<AppState>, ApiJson(new): ApiJson<NewOffer>) -> Result<Json<Value>> {
    let offer = offers::create_offer(&state, new).await?;
    Ok(Json(json!({ "ok": true, "offer": offer })))
}

async fn show(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    let offer = offers::require_offer(&state, id).await?;
    Ok(Json(json!({ "ok": true, "offer": offer })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    offer_id: Uuid,
    customer_id: Uuid,
    status: String,
}

async fn update_status(State(state): State<AppState>, ApiJson(body): ApiJson<StatusBody>) -> Result<Json<Value>> {
    let offer = offers::update_status(&state, body.offer_id, body.customer_id, &body.status).await?;
    Ok(Json(json!({ "ok": true, "offer": offer })))
}

async fn send(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    let offer = offers::send_offer(&state, id).await?;
    Ok(Json(json!({ "ok": true, "offer": offer })))
}

async fn to_order(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<Json<Value>> {
    let order = orders::create_from_offer(&state, id).await?;
    Ok(Json(json!({ "ok": true, "order": order })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteBody {
    offer_id: Uuid,
    customer_id: Uuid,
}

async fn delete(State(state): State<AppState>, ApiJson(body): ApiJson<DeleteBody>) -> Result<Json<Value>> {
    offers::delete_offer(&state, body.offer_id, body.customer_id).await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Deserialize)]
struct ParseBody {
    #[serde(default)]
    text: String,
}

async fn parse(ApiJson(body): ApiJson<ParseBody>) -> Result<Json<Value>> {
    if body.text.trim().is_empty() {
        return Err(AppError::bad_request("text must not be empty"));
    }
    let fields = extract_offer_fields(&body.text);
    Ok(Json(json!({ "ok": true, "fields": fields })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FromAssistantBody {
    customer_id: Uuid,
    #[serde(default)]
    json_data: Value,
    #[serde(default)]
    text_data: String,
}

async fn create_from_gpt(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<FromAssistantBody>,
) -> Result<Json<Value>> {
    let (customer, offer) =
        offers::create_from_assistant(&state, body.customer_id, body.json_data, body.text_data).await?;
    Ok(Json(json!({ "ok": true, "customer": customer, "offer": offer })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody {
    #[serde(default)]
    requirements: String,
    customer_id: Option<Uuid>,
}

async fn generate(State(state): State<AppState>, ApiJson(body): ApiJson<GenerateBody>) -> Result<Json<Value>> {
    let draft = offers::generate_draft(&state, &body.requirements, body.customer_id).await?;
    let net_amount = draft.net_amount();
    Ok(Json(json!({ "ok": true, "draft": draft, "netAmount": net_amount })))
}

#[derive(Deserialize)]
#[serde(untagged)]
pub enum OfferPdfBody {
    Wrapped { offer: Value },
    Bare(Value),
}

/// Render an offer PDF straight from a JSON description, without storing
/// anything.
pub async fn generate_offer_pdf(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<OfferPdfBody>,
) -> Result<Json<Value>> {
    let offer = match body {
        OfferPdfBody::Wrapped { offer } => offer,
        OfferPdfBody::Bare(offer) => offer,
    };
    if !offer.is_object() {
        return Err(AppError::bad_request("missing offer payload"));
    }

    let text = |value: &Value| value.as_str().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

    let issued_at = offer
        .get("date")
        .and_then(Value::as_str)
        .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
        .unwrap_or_else(Utc::now);

    let customer_id = offer.get("customerId").and_then(text).unwrap_or_else(|| "-".to_string());
    let mut input = DocumentInput::new(DocumentKind::Offer, customer_id, issued_at);
    input.title = offer.get("title").and_then(text);
    input.amount = offer.get("amount").and_then(number_like);
    if let Some(currency) = offer.get("currency").and_then(text) {
        input.currency = currency;
    }
    input.customer = offer
        .get("customer")
        .and_then(|customer| customer.get("name"))
        .and_then(text)
        .map(|name| Party {
            name: Some(name),
            ..Party::default()
        });
    input.rows = offer
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(RowLine {
                        description: item.get("name").and_then(text)?,
                        qty: item.get("qty").and_then(number_like).unwrap_or(1.0),
                        price: item.get("price").and_then(number_like).unwrap_or(0.0),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let pdf = state.documents.render(&input)?;
    tracing::info!(bytes = pdf.len(), rows = input.rows.len(), "offer pdf generated");
    Ok(Json(json!({ "ok": true, "pdfBase64": STANDARD.encode(pdf) })))
}
