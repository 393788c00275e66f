use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::{discard_on_error, remove_file, require_customer};
use crate::customer_match::{NumberPool, SearchQuery, find_match, normalize_customer_number};
use crate::error::{AppError, Result};
use crate::models::{Customer, CustomerInput, Document, DocumentType, FlowStatus, Invoice, Offer, Order};
use crate::services::storage::{sanitize_filename, upload_path};
use crate::state::AppState;

pub async fn create_customer(state: &AppState, input: CustomerInput) -> Result<Customer> {
    if input.company_name().is_none() {
        return Err(AppError::bad_request("companyName is required"));
    }

    let existing = state.store.list_customers().await?;
    let mut pool = NumberPool::new(existing.iter().map(|c| c.customer_number.as_str()));
    let number = pool.claim(input.customer_number.as_deref());

    let customer = input.into_customer(Uuid::new_v4(), number, Utc::now());
    state.store.insert_customer(&customer).await?;
    tracing::info!(customer_id = %customer.id, number = %customer.customer_number, "customer created");
    Ok(customer)
}

/// Overwrite the customer's fields with the non-empty fields of `input`.
pub async fn update_customer(state: &AppState, id: Uuid, input: CustomerInput) -> Result<Customer> {
    let mut customer = require_customer(state, id).await?;
    let mut changed = input.apply_to(&mut customer);

    if let Some(requested) = input.customer_number.as_deref().filter(|n| !n.trim().is_empty()) {
        let existing = state.store.list_customers().await?;
        let pool = NumberPool::new(
            existing
                .iter()
                .filter(|c| c.id != id)
                .map(|c| c.customer_number.as_str()),
        );
        if pool.is_taken(requested) {
            return Err(AppError::Conflict(format!("customer number {requested} is already taken")));
        }
        let normalized = normalize_customer_number(requested);
        if normalized != customer.customer_number {
            customer.customer_number = normalized;
            changed = true;
        }
    }

    if changed {
        customer.updated_at = Utc::now();
        state.store.update_customer(&customer).await?;
    }
    Ok(customer)
}

/// Delete the customer with all its records, then remove the stored files.
pub async fn delete_customer(state: &AppState, id: Uuid) -> Result<usize> {
    require_customer(state, id).await?;

    let offers = state.store.list_offers(Some(id), None).await?;
    let orders = state.store.list_orders(Some(id)).await?;
    let invoices = state.store.list_invoices(Some(id)).await?;
    let documents = state.store.list_documents(id).await?;

    let mut files: Vec<(String, String)> = Vec::new();
    files.extend(offers.iter().filter_map(|o| Some((o.bucket.clone(), o.storage_path.clone()?))));
    files.extend(orders.iter().filter_map(|o| Some((o.bucket.clone(), o.storage_path.clone()?))));
    files.extend(invoices.iter().filter_map(|i| Some((i.bucket.clone(), i.storage_path.clone()?))));
    files.extend(documents.iter().map(|d| (d.bucket.clone(), d.storage_path.clone())));
    files.sort();
    files.dedup();

    if !state.store.delete_customer(id).await? {
        return Err(AppError::NotFound("customer"));
    }

    for (bucket, path) in &files {
        remove_file(state, bucket, path).await;
    }
    tracing::info!(customer_id = %id, files = files.len(), "customer deleted");
    Ok(files.len())
}

/// Zero or one customer matching the dedup rule.
pub async fn search_customers(state: &AppState, query: &SearchQuery) -> Result<Vec<Customer>> {
    if query.is_empty() {
        return Err(AppError::bad_request(
            "give at least one of companyName, email, orgNr or phone",
        ));
    }
    let customers = state.store.list_customers().await?;
    Ok(find_match(&customers, query).cloned().into_iter().collect())
}

#[derive(Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub customers: Vec<Customer>,
}

/// Merge a customer list cached by a browser into the store.
///
/// Matches are updated with the record's non-empty fields, misses are
/// created. Records without a company name are skipped.
pub async fn import_customers(state: &AppState, records: Vec<CustomerInput>) -> Result<ImportSummary> {
    let mut known = state.store.list_customers().await?;
    let mut pool = NumberPool::new(known.iter().map(|c| c.customer_number.as_str()));
    let mut summary = ImportSummary::default();

    for record in records {
        if record.company_name().is_none() {
            summary.skipped += 1;
            continue;
        }

        let query = SearchQuery::from(&record);
        let position = known.iter().position(|c| query.matches(c));
        match position {
            Some(index) => {
                let customer = &mut known[index];
                if record.apply_to(customer) {
                    customer.updated_at = Utc::now();
                    state.store.update_customer(customer).await?;
                    summary.updated += 1;
                } else {
                    summary.unchanged += 1;
                }
                summary.customers.push(customer.clone());
            }
            None => {
                let number = pool.claim(record.customer_number.as_deref());
                let customer = record.into_customer(Uuid::new_v4(), number, Utc::now());
                state.store.insert_customer(&customer).await?;
                summary.created += 1;
                summary.customers.push(customer.clone());
                known.push(customer);
            }
        }
    }

    tracing::info!(
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        "customer import finished"
    );
    Ok(summary)
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RelatedDocs {
    pub customer: Customer,
    pub offers: Vec<Offer>,
    pub orders: Vec<Order>,
    pub invoices: Vec<Invoice>,
    pub documents: Vec<Document>,
    pub flow: FlowStatus,
}

pub async fn related_docs(state: &AppState, id: Uuid) -> Result<RelatedDocs> {
    let customer = require_customer(state, id).await?;
    Ok(RelatedDocs {
        offers: state.store.list_offers(Some(id), None).await?,
        orders: state.store.list_orders(Some(id)).await?,
        invoices: state.store.list_invoices(Some(id)).await?,
        documents: state.store.list_documents(id).await?,
        flow: state.store.get_flow(id).await?,
        customer,
    })
}

/// Store an uploaded file for a customer and record it as a document.
pub async fn upload_document(
    state: &AppState,
    customer_id: Uuid,
    doc_type: DocumentType,
    filename: &str,
    bytes: Vec<u8>,
) -> Result<Document> {
    require_customer(state, customer_id).await?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("the uploaded file is empty"));
    }

    let path = upload_path(customer_id, doc_type.as_str(), filename);
    let document = Document {
        id: Uuid::new_v4(),
        customer_id: Some(customer_id),
        doc_type,
        bucket: state.bucket().to_string(),
        storage_path: path.clone(),
        filename: sanitize_filename(filename),
        file_url: Some(state.files.public_url(state.bucket(), &path)),
        status: "uploaded".to_string(),
        source_id: None,
        created_at: Utc::now(),
    };

    state
        .files
        .upload(state.bucket(), &path, bytes, document.content_type().as_ref())
        .await?;
    discard_on_error(state, &path, state.store.insert_document(&document).await).await?;
    tracing::info!(%customer_id, path = %path, doc_type = %doc_type, "document uploaded");
    Ok(document)
}

pub async fn require_document(state: &AppState, id: Uuid) -> Result<Document> {
    state.store.get_document(id).await?.ok_or(AppError::NotFound("document"))
}

/// The document row and the stored bytes behind it.
pub async fn open_document(state: &AppState, id: Uuid) -> Result<(Document, Vec<u8>)> {
    let document = require_document(state, id).await?;
    let bytes = state.files.download(&document.bucket, &document.storage_path).await?;
    Ok((document, bytes))
}

/// Delete the stored file (best effort) and then the row.
pub async fn delete_document(state: &AppState, id: Uuid) -> Result<Document> {
    let document = require_document(state, id).await?;
    remove_file(state, &document.bucket, &document.storage_path).await;
    if !state.store.delete_document(id).await? {
        return Err(AppError::NotFound("document"));
    }
    tracing::info!(document_id = %id, path = %document.storage_path, "document deleted");
    Ok(document)
}
