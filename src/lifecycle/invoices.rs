use chrono::{Datelike, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use super::orders::require_order;
use super::{
    allocate_number, customer_email, customer_snapshot, discard_on_error, greeting, mark_flow, party,
    pdf_attachment, record_document, require_customer, store_pdf,
};
use crate::document_gen::{DocumentInput, DocumentKind, InvoiceTotals, RowLine};
use crate::error::{AppError, Result};
use crate::models::{
    BookkeepingEntry, Customer, DocumentType, EntryKind, EntryStatus, FlowPatch, Invoice, InvoiceStatus,
    Order, OrderStatus,
};
use crate::money::{format_amount, round2, vat_on_net};
use crate::numbering::Series;
use crate::services::OutgoingMail;
use crate::services::storage::invoice_path;
use crate::state::AppState;

pub async fn require_invoice(state: &AppState, id: Uuid) -> Result<Invoice> {
    state.store.get_invoice(id).await?.ok_or(AppError::NotFound("invoice"))
}

/// Net, VAT and gross of an order, in that order.
///
/// The net is the agreed order total plus every approved extra row.
pub fn invoice_amounts(order: &Order) -> (f64, f64, f64) {
    let subtotal = round2(order.total + order.approved_extras());
    let vat = vat_on_net(subtotal, order.vat_percent);
    (subtotal, vat, round2(subtotal + vat))
}

/// Bill an order. Each order can be invoiced once.
pub async fn create_from_order(state: &AppState, order_id: Uuid) -> Result<Invoice> {
    let order = require_order(state, order_id).await?;
    if order.status == OrderStatus::Invoiced {
        return Err(already_invoiced(&order));
    }
    let customer = require_customer(state, order.customer_id).await?;

    if !state.store.claim_order_for_invoicing(order.id).await? {
        return Err(already_invoiced(&order));
    }

    match build_invoice(state, &order, &customer).await {
        Ok(invoice) => Ok(invoice),
        Err(err) => {
            // Give the order back so the invoice can be retried.
            let release = state
                .store
                .transition_order(order.id, OrderStatus::Invoiced, order.status)
                .await;
            if let Err(restore) = release {
                tracing::error!(error = %restore, order_id = %order.id, "could not release order after failed invoicing");
            }
            Err(err)
        }
    }
}

fn already_invoiced(order: &Order) -> AppError {
    AppError::Conflict(format!("order {} has already been invoiced", order.number))
}

async fn build_invoice(state: &AppState, order: &Order, customer: &Customer) -> Result<Invoice> {
    let now = Utc::now();
    let today = now.date_naive();
    let (subtotal, vat_total, total) = invoice_amounts(order);
    let due_date = today + Duration::days(state.config.payment_terms_days);
    let billed: Vec<_> = order.billable_rows().into_iter().cloned().collect();

    let number = allocate_number(state, Series::Invoice, now.year()).await?;
    let mut invoice = Invoice {
        id: Uuid::new_v4(),
        customer_id: customer.id,
        source_order_id: Some(order.id),
        number,
        status: InvoiceStatus::Created,
        due_date,
        currency: order.currency.clone(),
        subtotal,
        vat_percent: order.vat_percent,
        vat_total,
        total,
        data: json!({
            "customer": customer_snapshot(customer),
            "orderNumber": order.number,
            "title": order.title,
            "rows": billed,
        }),
        bucket: state.bucket().to_string(),
        storage_path: None,
        pdf_url: None,
        sent_at: None,
        paid_at: None,
        exported_at: None,
        created_at: now,
        updated_at: now,
    };

    let mut input = DocumentInput::new(DocumentKind::Invoice, customer.id.to_string(), now);
    input.title = order.title.clone();
    input.amount = Some(total);
    input.currency = invoice.currency.clone();
    input.number = Some(invoice.number.clone());
    input.customer = Some(party(customer));
    input.rows = billed
        .iter()
        .map(|row| RowLine {
            description: row.description.clone(),
            qty: row.qty,
            price: row.price,
        })
        .collect();
    input.invoice = Some(InvoiceTotals {
        due_date,
        subtotal,
        vat_percent: invoice.vat_percent,
        vat_total,
        total,
    });
    input.data = json!({
        "orderNumber": order.number,
        "betalningsvillkor": format!("{} dagar", state.config.payment_terms_days),
    });
    let pdf = state.documents.render(&input)?;

    let path = invoice_path(now.year(), customer.id, &invoice.number);
    let url = store_pdf(state, &path, pdf).await?;
    invoice.storage_path = Some(path.clone());
    invoice.pdf_url = Some(url.clone());

    discard_on_error(state, &path, state.store.insert_invoice(&invoice).await).await?;
    record_document(state, Some(customer.id), DocumentType::Invoice, &path, Some(url), Some(invoice.id)).await;
    mark_flow(state, customer.id, FlowPatch::invoice_created()).await;

    tracing::info!(
        invoice_id = %invoice.id,
        number = %invoice.number,
        order_id = %order.id,
        total,
        "invoice created"
    );
    Ok(invoice)
}

pub async fn send_invoice(state: &AppState, id: Uuid) -> Result<Invoice> {
    let mut invoice = require_invoice(state, id).await?;
    let customer = require_customer(state, invoice.customer_id).await?;
    let to = customer_email(&customer)?;

    let company = &state.config.company_name;
    let link = invoice.pdf_url.clone().unwrap_or_default();
    let mail = OutgoingMail {
        to,
        subject: format!("Faktura {} från {company}", invoice.number),
        text: format!(
            "Hej {},\n\nHär kommer din faktura {}.\n\nBelopp: {}\nFörfallodatum: {}\n\nDu hittar fakturan här: {link}\n\nMed vänliga hälsningar\n{company}",
            greeting(&customer),
            invoice.number,
            format_amount(invoice.total, &invoice.currency),
            invoice.due_date.format("%Y-%m-%d"),
        ),
        attachment: pdf_attachment(state, &invoice.bucket, invoice.storage_path.as_deref(), &invoice.number)
            .await?,
    };
    state.mailer.send(&mail).await?;

    let now = Utc::now();
    if invoice.status == InvoiceStatus::Created {
        invoice.status = InvoiceStatus::Sent;
    }
    invoice.sent_at = Some(now);
    invoice.updated_at = now;
    state.store.update_invoice(&invoice).await?;
    mark_flow(state, invoice.customer_id, FlowPatch::invoice_sent()).await;

    tracing::info!(invoice_id = %id, to = %mail.to, "invoice sent");
    Ok(invoice)
}

/// Post the invoice to the bookkeeping ledger. Each invoice is exported
/// once.
pub async fn export_to_bookkeeping(state: &AppState, id: Uuid) -> Result<(Invoice, BookkeepingEntry)> {
    let invoice = require_invoice(state, id).await?;
    let already = || AppError::Conflict(format!("invoice {} has already been exported", invoice.number));
    if invoice.exported_at.is_some() {
        return Err(already());
    }

    let counterparty = match state.store.get_customer(invoice.customer_id).await? {
        Some(customer) => customer.company_name,
        None => invoice.data["customer"]["name"]
            .as_str()
            .unwrap_or("Okänd kund")
            .to_string(),
    };

    if !state.store.claim_invoice_for_export(id).await? {
        return Err(already());
    }

    let now = Utc::now();
    let entry = BookkeepingEntry {
        id: Uuid::new_v4(),
        kind: EntryKind::Invoice,
        customer_id: Some(invoice.customer_id),
        invoice_id: Some(invoice.id),
        counterparty,
        reference: invoice.number.clone(),
        entry_date: now.date_naive(),
        amount_incl_vat: invoice.total,
        vat_amount: invoice.vat_total,
        currency: invoice.currency.clone(),
        file_url: invoice.pdf_url.clone(),
        status: EntryStatus::ToBook,
        created_at: now,
    };

    if let Err(err) = state.store.insert_entry(&entry).await {
        if let Err(restore) = state.store.release_invoice_export(id, invoice.status).await {
            tracing::error!(error = %restore, invoice_id = %id, "could not release invoice after failed export");
        }
        return Err(err);
    }
    mark_flow(state, invoice.customer_id, FlowPatch::invoice_posted()).await;

    let exported = require_invoice(state, id).await?;
    tracing::info!(invoice_id = %id, entry_id = %entry.id, amount = entry.amount_incl_vat, "invoice exported to bookkeeping");
    Ok((exported, entry))
}

pub async fn mark_paid(state: &AppState, id: Uuid) -> Result<Invoice> {
    let mut invoice = require_invoice(state, id).await?;
    let now = Utc::now();
    invoice.status = InvoiceStatus::Paid;
    invoice.paid_at = Some(now);
    invoice.updated_at = now;
    state.store.update_invoice(&invoice).await?;
    tracing::info!(invoice_id = %id, "invoice marked as paid");
    Ok(invoice)
}
