use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::models::{
    BookkeepingEntry, Customer, Document, FlowPatch, FlowStatus, Invoice, InvoiceStatus, Offer, Order,
    OrderStatus, TimeEntry, TimeFilter,
};
use crate::numbering::Series;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::Database;

/// Persistence for every record the service keeps.
///
/// Reads return `Ok(None)` for missing rows; handlers turn that into a 404.
#[async_trait]
pub trait Store: Send + Sync {
    /// Short name reported by the health endpoint.
    fn kind(&self) -> &'static str;

    /// Atomically allocate the next sequence value of `series` in `year`.
    async fn next_sequence(&self, series: Series, year: i32) -> Result<u32>;

    // Customers
    async fn list_customers(&self) -> Result<Vec<Customer>>;
    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>>;
    async fn insert_customer(&self, customer: &Customer) -> Result<()>;
    async fn update_customer(&self, customer: &Customer) -> Result<()>;
    /// Delete the customer and everything that belongs to it. Returns
    /// whether the customer existed.
    async fn delete_customer(&self, id: Uuid) -> Result<bool>;

    // Offers
    async fn insert_offer(&self, offer: &Offer) -> Result<()>;
    async fn get_offer(&self, id: Uuid) -> Result<Option<Offer>>;
    /// Newest first. `limit` caps the result when set.
    async fn list_offers(&self, customer_id: Option<Uuid>, limit: Option<i64>) -> Result<Vec<Offer>>;
    async fn update_offer(&self, offer: &Offer) -> Result<()>;
    async fn delete_offer(&self, id: Uuid) -> Result<bool>;

    // Orders
    async fn insert_order(&self, order: &Order) -> Result<()>;
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn list_orders(&self, customer_id: Option<Uuid>) -> Result<Vec<Order>>;
    /// Write the order's rows while it is still open. Returns false when the
    /// order has been invoiced or canceled in the meantime; the status column
    /// is never written here.
    async fn update_order_data(&self, order: &Order) -> Result<bool>;
    /// Compare-and-set on the status. Returns false when the stored status
    /// is not `from`.
    async fn transition_order(&self, id: Uuid, from: OrderStatus, to: OrderStatus) -> Result<bool>;
    /// Move the order to `invoiced` unless it already is. Returns false when
    /// another request got there first.
    async fn claim_order_for_invoicing(&self, id: Uuid) -> Result<bool>;

    // Invoices
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<()>;
    async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>>;
    async fn list_invoices(&self, customer_id: Option<Uuid>) -> Result<Vec<Invoice>>;
    /// Write status, file and timestamp columns. `exported_at` is left alone.
    async fn update_invoice(&self, invoice: &Invoice) -> Result<()>;
    /// Stamp `exported_at` and move the invoice to `exported`, once. Later
    /// status changes such as `paid` keep the stamp.
    async fn claim_invoice_for_export(&self, id: Uuid) -> Result<bool>;
    /// Undo a claim whose ledger entry could not be written.
    async fn release_invoice_export(&self, id: Uuid, status: InvoiceStatus) -> Result<()>;

    // Documents
    async fn insert_document(&self, document: &Document) -> Result<()>;
    async fn get_document(&self, id: Uuid) -> Result<Option<Document>>;
    async fn list_documents(&self, customer_id: Uuid) -> Result<Vec<Document>>;
    async fn delete_document(&self, id: Uuid) -> Result<bool>;
    /// Remove the document rows rendered from an offer, order or invoice.
    async fn delete_documents_for_source(&self, source_id: Uuid) -> Result<u64>;

    // Flow status
    async fn get_flow(&self, customer_id: Uuid) -> Result<FlowStatus>;
    async fn patch_flow(&self, customer_id: Uuid, patch: FlowPatch) -> Result<FlowStatus>;

    // Bookkeeping
    async fn insert_entry(&self, entry: &BookkeepingEntry) -> Result<()>;
    async fn list_entries(&self) -> Result<Vec<BookkeepingEntry>>;

    // Time tracking
    async fn insert_time_entry(&self, entry: &TimeEntry) -> Result<()>;
    async fn list_time_entries(&self, filter: &TimeFilter) -> Result<Vec<TimeEntry>>;
}

/// Connect to Postgres when a database URL is configured, otherwise fall
/// back to the in-memory store.
pub async fn init(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    match config.database_url() {
        Some(_) => {
            let db = Database::new(config).await?;
            tracing::info!("connected to postgres");
            Ok(Arc::new(db))
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, records are kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
