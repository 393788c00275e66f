use chrono::{Datelike, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use super::offers::require_offer;
use super::{
    allocate_number, customer_email, customer_snapshot, discard_on_error, greeting, mark_flow, party,
    payload_lines, pdf_attachment, record_document, require_customer, store_pdf,
};
use crate::document_gen::{DocumentInput, DocumentKind, RowLine};
use crate::error::{AppError, Result};
use crate::models::{
    DocumentType, FlowPatch, OfferStatus, Order, OrderData, OrderRow, OrderStatus, RowSource,
};
use crate::money::{round2, vat_on_net};
use crate::numbering::Series;
use crate::services::OutgoingMail;
use crate::services::storage::order_path;
use crate::state::AppState;

pub async fn require_order(state: &AppState, id: Uuid) -> Result<Order> {
    state.store.get_order(id).await?.ok_or(AppError::NotFound("order"))
}

fn closed(order: &Order, status: OrderStatus) -> AppError {
    AppError::Conflict(format!(
        "order {} is {status} and can no longer be changed",
        order.number
    ))
}

fn ensure_open(order: &Order) -> Result<()> {
    match order.status {
        OrderStatus::Invoiced | OrderStatus::Canceled => Err(closed(order, order.status)),
        OrderStatus::Created | OrderStatus::Sent => Ok(()),
    }
}

/// Write the rows back. The order may have been invoiced since it was read.
async fn save_rows(state: &AppState, order: &Order) -> Result<()> {
    if state.store.update_order_data(order).await? {
        return Ok(());
    }
    let current = require_order(state, order.id).await?;
    Err(closed(order, current.status))
}

fn row_lines(order: &Order) -> Vec<RowLine> {
    order
        .data
        .rows
        .iter()
        .map(|row| RowLine {
            description: row.description.clone(),
            qty: row.qty,
            price: row.price,
        })
        .collect()
}

/// Turn an offer into an order confirmation and mark the offer accepted.
pub async fn create_from_offer(state: &AppState, offer_id: Uuid) -> Result<Order> {
    let mut offer = require_offer(state, offer_id).await?;
    let customer = require_customer(state, offer.customer_id).await?;

    let now = Utc::now();
    let rows: Vec<OrderRow> = payload_lines(&offer)
        .into_iter()
        .map(|line| OrderRow {
            id: Uuid::new_v4(),
            description: line.description,
            qty: line.qty,
            price: line.price,
            source: RowSource::Offer,
            approved: true,
            approved_at: None,
            approved_by: None,
        })
        .collect();

    let total = round2(
        offer
            .amount
            .unwrap_or_else(|| rows.iter().map(OrderRow::line_total).sum()),
    );
    let vat_percent = offer
        .payload_vat_percent()
        .unwrap_or(state.config.default_vat_percent);

    let number = allocate_number(state, Series::Order, now.year()).await?;
    let mut order = Order {
        id: Uuid::new_v4(),
        customer_id: customer.id,
        source_offer_id: Some(offer.id),
        number,
        status: OrderStatus::Created,
        title: offer.title.clone(),
        currency: offer.currency.clone(),
        vat_percent,
        total,
        vat_total: vat_on_net(total, vat_percent),
        data: Json(OrderData {
            customer: customer_snapshot(&customer),
            details: offer.data.clone(),
            rows,
        }),
        bucket: state.bucket().to_string(),
        storage_path: None,
        pdf_url: None,
        created_at: now,
        updated_at: now,
    };

    let mut input = DocumentInput::new(DocumentKind::OrderConfirmation, customer.id.to_string(), now);
    input.title = order.title.clone();
    input.amount = Some(order.total);
    input.currency = order.currency.clone();
    input.needs_print = offer.needs_print;
    input.number = Some(order.number.clone());
    input.customer = Some(party(&customer));
    input.rows = row_lines(&order);
    input.data = offer.data.clone();
    let pdf = state.documents.render(&input)?;

    let path = order_path(now.year(), customer.id, &order.number);
    let url = store_pdf(state, &path, pdf).await?;
    order.storage_path = Some(path.clone());
    order.pdf_url = Some(url.clone());

    discard_on_error(state, &path, state.store.insert_order(&order).await).await?;
    record_document(state, Some(customer.id), DocumentType::Order, &path, Some(url), Some(order.id)).await;
    mark_flow(state, customer.id, FlowPatch::order_created()).await;

    offer.status = OfferStatus::Accepted;
    offer.updated_at = now;
    state.store.update_offer(&offer).await?;

    tracing::info!(
        order_id = %order.id,
        number = %order.number,
        offer_id = %offer.id,
        total = order.total,
        "order created from offer"
    );
    Ok(order)
}

/// Append an extra row. It stays off the invoice until approved.
pub async fn add_item(
    state: &AppState,
    order_id: Uuid,
    description: &str,
    quantity: f64,
    unit_price: f64,
) -> Result<(Order, OrderRow)> {
    let description = description.trim();
    if description.is_empty() {
        return Err(AppError::bad_request("description must not be empty"));
    }
    if !(quantity > 0.0) || !(unit_price > 0.0) {
        return Err(AppError::bad_request("quantity and unitPrice must be greater than zero"));
    }

    let mut order = require_order(state, order_id).await?;
    ensure_open(&order)?;

    let row = OrderRow {
        id: Uuid::new_v4(),
        description: description.to_string(),
        qty: quantity,
        price: unit_price,
        source: RowSource::Extra,
        approved: false,
        approved_at: None,
        approved_by: None,
    };
    order.data.rows.push(row.clone());
    order.updated_at = Utc::now();
    save_rows(state, &order).await?;

    tracing::info!(%order_id, item_id = %row.id, amount = row.line_total(), "extra item added");
    Ok((order, row))
}

pub async fn approve_item(
    state: &AppState,
    order_id: Uuid,
    item_id: Uuid,
    approved_by: Option<String>,
) -> Result<Order> {
    let mut order = require_order(state, order_id).await?;
    ensure_open(&order)?;

    let now = Utc::now();
    let row = order.row_mut(item_id).ok_or(AppError::NotFound("order item"))?;
    row.approved = true;
    row.approved_at = Some(now);
    row.approved_by = approved_by.map(|name| name.trim().to_string()).filter(|name| !name.is_empty());

    order.updated_at = now;
    save_rows(state, &order).await?;
    tracing::info!(%order_id, %item_id, "order item approved");
    Ok(order)
}

pub async fn send_order(state: &AppState, id: Uuid) -> Result<Order> {
    let mut order = require_order(state, id).await?;
    let customer = require_customer(state, order.customer_id).await?;
    let to = customer_email(&customer)?;

    let link = order.pdf_url.clone().unwrap_or_default();
    let mail = OutgoingMail {
        to,
        subject: format!("Orderbekräftelse {} från {}", order.number, state.config.company_name),
        text: format!(
            "Hej {},\n\nTack för din beställning. Här kommer orderbekräftelse {}.\n\nLänk: {link}\n\nMed vänliga hälsningar\n{}",
            greeting(&customer),
            order.number,
            state.config.company_name,
        ),
        attachment: pdf_attachment(state, &order.bucket, order.storage_path.as_deref(), &order.number).await?,
    };
    state.mailer.send(&mail).await?;

    if state
        .store
        .transition_order(order.id, OrderStatus::Created, OrderStatus::Sent)
        .await?
    {
        order.status = OrderStatus::Sent;
        order.updated_at = Utc::now();
    }
    mark_flow(state, order.customer_id, FlowPatch::order_sent()).await;

    tracing::info!(order_id = %id, to = %mail.to, "order confirmation sent");
    Ok(order)
}
