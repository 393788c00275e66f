use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::Store;
use crate::error::Result;
use crate::models::{
    BookkeepingEntry, Customer, Document, FlowPatch, FlowStatus, Invoice, InvoiceStatus, Offer,
    Order, OrderStatus, TimeEntry, TimeFilter,
};
use crate::numbering::{Series, highest_seq};

#[derive(Default)]
struct Tables {
    customers: Vec<Customer>,
    offers: Vec<Offer>,
    orders: Vec<Order>,
    invoices: Vec<Invoice>,
    documents: Vec<Document>,
    flows: HashMap<Uuid, FlowStatus>,
    entries: Vec<BookkeepingEntry>,
    time_entries: Vec<TimeEntry>,
    sequences: HashMap<(Series, i32), u32>,
}

impl Tables {
    fn numbers(&self, series: Series) -> Vec<&str> {
        match series {
            Series::Offer => self.offers.iter().map(|o| o.number.as_str()).collect(),
            Series::Order => self.orders.iter().map(|o| o.number.as_str()).collect(),
            Series::Invoice => self.invoices.iter().map(|i| i.number.as_str()).collect(),
        }
    }
}

fn replace<T: Clone>(rows: &mut [T], row: &T, same: impl Fn(&T) -> bool) {
    if let Some(slot) = rows.iter_mut().find(|r| same(r)) {
        *slot = row.clone();
    }
}

fn remove<T>(rows: &mut Vec<T>, keep: impl Fn(&T) -> bool) -> u64 {
    let before = rows.len();
    rows.retain(keep);
    (before - rows.len()) as u64
}

/// Store kept in process memory. Used when no database is configured and
/// by the tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn next_sequence(&self, series: Series, year: i32) -> Result<u32> {
        let mut tables = self.tables.write().await;
        let seed = highest_seq(series, year, tables.numbers(series));
        let last = tables.sequences.entry((series, year)).or_insert(seed);
        *last += 1;
        Ok(*last)
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        let mut customers = self.tables.read().await.customers.clone();
        customers.sort_by(|a, b| a.company_name.cmp(&b.company_name));
        Ok(customers)
    }

    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>> {
        let tables = self.tables.read().await;
        Ok(tables.customers.iter().find(|c| c.id == id).cloned())
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<()> {
        self.tables.write().await.customers.push(customer.clone());
        Ok(())
    }

    async fn update_customer(&self, customer: &Customer) -> Result<()> {
        let mut tables = self.tables.write().await;
        replace(&mut tables.customers, customer, |c| c.id == customer.id);
        Ok(())
    }

    async fn delete_customer(&self, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        remove(&mut tables.time_entries, |e| e.customer_id != Some(id));
        tables.flows.remove(&id);
        remove(&mut tables.documents, |d| d.customer_id != Some(id));
        remove(&mut tables.invoices, |i| i.customer_id != id);
        remove(&mut tables.orders, |o| o.customer_id != id);
        remove(&mut tables.offers, |o| o.customer_id != id);
        for entry in tables.entries.iter_mut().filter(|e| e.customer_id == Some(id)) {
            entry.customer_id = None;
            entry.invoice_id = None;
        }
        Ok(remove(&mut tables.customers, |c| c.id != id) > 0)
    }

    async fn insert_offer(&self, offer: &Offer) -> Result<()> {
        self.tables.write().await.offers.push(offer.clone());
        Ok(())
    }

    async fn get_offer(&self, id: Uuid) -> Result<Option<Offer>> {
        let tables = self.tables.read().await;
        Ok(tables.offers.iter().find(|o| o.id == id).cloned())
    }

    async fn list_offers(&self, customer_id: Option<Uuid>, limit: Option<i64>) -> Result<Vec<Offer>> {
        let tables = self.tables.read().await;
        let mut offers: Vec<Offer> = tables
            .offers
            .iter()
            .filter(|o| customer_id.is_none_or(|id| o.customer_id == id))
            .cloned()
            .collect();
        offers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            offers.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(offers)
    }

    async fn update_offer(&self, offer: &Offer) -> Result<()> {
        let mut tables = self.tables.write().await;
        replace(&mut tables.offers, offer, |o| o.id == offer.id);
        Ok(())
    }

    async fn delete_offer(&self, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        for order in tables.orders.iter_mut().filter(|o| o.source_offer_id == Some(id)) {
            order.source_offer_id = None;
        }
        Ok(remove(&mut tables.offers, |o| o.id != id) > 0)
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        self.tables.write().await.orders.push(order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list_orders(&self, customer_id: Option<Uuid>) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .iter()
            .filter(|o| customer_id.is_none_or(|id| o.customer_id == id))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_order_data(&self, order: &Order) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.orders.iter_mut().find(|o| o.id == order.id) {
            Some(stored) if !matches!(stored.status, OrderStatus::Invoiced | OrderStatus::Canceled) => {
                stored.data = order.data.clone();
                stored.updated_at = order.updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition_order(&self, id: Uuid, from: OrderStatus, to: OrderStatus) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.orders.iter_mut().find(|o| o.id == id) {
            Some(order) if order.status == from => {
                order.status = to;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_order_for_invoicing(&self, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.orders.iter_mut().find(|o| o.id == id) {
            Some(order) if order.status != OrderStatus::Invoiced => {
                order.status = OrderStatus::Invoiced;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_invoice(&self, invoice: &Invoice) -> Result<()> {
        self.tables.write().await.invoices.push(invoice.clone());
        Ok(())
    }

    async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>> {
        let tables = self.tables.read().await;
        Ok(tables.invoices.iter().find(|i| i.id == id).cloned())
    }

    async fn list_invoices(&self, customer_id: Option<Uuid>) -> Result<Vec<Invoice>> {
        let tables = self.tables.read().await;
        let mut invoices: Vec<Invoice> = tables
            .invoices
            .iter()
            .filter(|i| customer_id.is_none_or(|id| i.customer_id == id))
            .cloned()
            .collect();
        invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(invoices)
    }

    async fn update_invoice(&self, invoice: &Invoice) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(stored) = tables.invoices.iter_mut().find(|i| i.id == invoice.id) {
            stored.status = invoice.status;
            stored.storage_path = invoice.storage_path.clone();
            stored.pdf_url = invoice.pdf_url.clone();
            stored.sent_at = invoice.sent_at;
            stored.paid_at = invoice.paid_at;
            stored.updated_at = invoice.updated_at;
        }
        Ok(())
    }

    async fn claim_invoice_for_export(&self, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.invoices.iter_mut().find(|i| i.id == id) {
            Some(invoice) if invoice.exported_at.is_none() => {
                let now = Utc::now();
                invoice.status = InvoiceStatus::Exported;
                invoice.exported_at = Some(now);
                invoice.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_invoice_export(&self, id: Uuid, status: InvoiceStatus) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(invoice) = tables.invoices.iter_mut().find(|i| i.id == id) {
            invoice.status = status;
            invoice.exported_at = None;
            invoice.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_document(&self, document: &Document) -> Result<()> {
        self.tables.write().await.documents.push(document.clone());
        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let tables = self.tables.read().await;
        Ok(tables.documents.iter().find(|d| d.id == id).cloned())
    }

    async fn list_documents(&self, customer_id: Uuid) -> Result<Vec<Document>> {
        let tables = self.tables.read().await;
        let mut documents: Vec<Document> = tables
            .documents
            .iter()
            .filter(|d| d.customer_id == Some(customer_id))
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    async fn delete_document(&self, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        Ok(remove(&mut tables.documents, |d| d.id != id) > 0)
    }

    async fn delete_documents_for_source(&self, source_id: Uuid) -> Result<u64> {
        let mut tables = self.tables.write().await;
        Ok(remove(&mut tables.documents, |d| d.source_id != Some(source_id)))
    }

    async fn get_flow(&self, customer_id: Uuid) -> Result<FlowStatus> {
        let tables = self.tables.read().await;
        Ok(tables
            .flows
            .get(&customer_id)
            .cloned()
            .unwrap_or_else(|| FlowStatus::empty(customer_id)))
    }

    async fn patch_flow(&self, customer_id: Uuid, patch: FlowPatch) -> Result<FlowStatus> {
        let mut tables = self.tables.write().await;
        let flow = tables
            .flows
            .entry(customer_id)
            .or_insert_with(|| FlowStatus::empty(customer_id));
        flow.apply(patch, Utc::now());
        Ok(flow.clone())
    }

    async fn insert_entry(&self, entry: &BookkeepingEntry) -> Result<()> {
        self.tables.write().await.entries.push(entry.clone());
        Ok(())
    }

    async fn list_entries(&self) -> Result<Vec<BookkeepingEntry>> {
        let mut entries = self.tables.read().await.entries.clone();
        entries.sort_by(|a, b| {
            a.entry_date
                .cmp(&b.entry_date)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(entries)
    }

    async fn insert_time_entry(&self, entry: &TimeEntry) -> Result<()> {
        self.tables.write().await.time_entries.push(entry.clone());
        Ok(())
    }

    async fn list_time_entries(&self, filter: &TimeFilter) -> Result<Vec<TimeEntry>> {
        let tables = self.tables.read().await;
        let mut entries: Vec<TimeEntry> = tables
            .time_entries
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.work_date
                .cmp(&a.work_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CustomerInput, OrderData, OrderRow, RowSource};
    use chrono::NaiveDate;
    use serde_json::json;
    use sqlx::types::Json;
    use std::sync::Arc;

    fn customer(name: &str) -> Customer {
        CustomerInput {
            company_name: Some(name.into()),
            ..Default::default()
        }
        .into_customer(Uuid::new_v4(), format!("K-{}", name.len()), Utc::now())
    }

    #[tokio::test]
    async fn concurrent_allocations_never_collide() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.next_sequence(Series::Invoice, 2025).await.unwrap()
            }));
        }

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap());
        }
        values.sort_unstable();
        assert_eq!(values, (1..=32).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn sequences_are_per_series_and_year() {
        let store = MemoryStore::new();
        assert_eq!(store.next_sequence(Series::Offer, 2025).await.unwrap(), 1);
        assert_eq!(store.next_sequence(Series::Offer, 2025).await.unwrap(), 2);
        assert_eq!(store.next_sequence(Series::Order, 2025).await.unwrap(), 1);
        assert_eq!(store.next_sequence(Series::Offer, 2026).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn flow_patches_merge() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        assert!(!store.get_flow(id).await.unwrap().offer_sent);

        store.patch_flow(id, FlowPatch::offer_sent()).await.unwrap();
        let flow = store.patch_flow(id, FlowPatch::order_created()).await.unwrap();
        assert!(flow.offer_sent && flow.order_created);
    }

    #[tokio::test]
    async fn deleting_a_customer_leaves_others_alone() {
        let store = MemoryStore::new();
        let keep = customer("Alfa AB");
        let gone = customer("Beta Bygg AB");
        store.insert_customer(&keep).await.unwrap();
        store.insert_customer(&gone).await.unwrap();
        store.patch_flow(gone.id, FlowPatch::offer_sent()).await.unwrap();

        assert!(store.delete_customer(gone.id).await.unwrap());
        assert!(!store.delete_customer(gone.id).await.unwrap());

        let left = store.list_customers().await.unwrap();
        assert_eq!(left, vec![keep]);
        assert!(!store.get_flow(gone.id).await.unwrap().offer_sent);
    }

    fn order(status: OrderStatus) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            source_offer_id: None,
            number: "ORD-2025-0001".into(),
            status,
            title: None,
            currency: "SEK".into(),
            vat_percent: 25.0,
            total: 1_000.0,
            vat_total: 250.0,
            data: Json(OrderData::default()),
            bucket: "paperflow-files".into(),
            storage_path: None,
            pdf_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn invoice() -> Invoice {
        let now = Utc::now();
        Invoice {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            source_order_id: None,
            number: "F-2025-0001".into(),
            status: InvoiceStatus::Created,
            due_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            currency: "SEK".into(),
            subtotal: 100.0,
            vat_percent: 25.0,
            vat_total: 25.0,
            total: 125.0,
            data: json!({}),
            bucket: "paperflow-files".into(),
            storage_path: None,
            pdf_url: None,
            sent_at: None,
            paid_at: None,
            exported_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn stale_row_write_cannot_reopen_an_invoiced_order() {
        let store = MemoryStore::new();
        let created = order(OrderStatus::Created);
        store.insert_order(&created).await.unwrap();

        // A row edit read the order before it was invoiced.
        let mut stale = store.get_order(created.id).await.unwrap().unwrap();
        assert!(store.claim_order_for_invoicing(created.id).await.unwrap());

        stale.data.rows.push(OrderRow {
            id: Uuid::new_v4(),
            description: "Sent tillägg".into(),
            qty: 1.0,
            price: 500.0,
            source: RowSource::Extra,
            approved: false,
            approved_at: None,
            approved_by: None,
        });
        assert!(!store.update_order_data(&stale).await.unwrap());

        let stored = store.get_order(created.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Invoiced);
        assert!(stored.data.rows.is_empty());
        assert!(!store.claim_order_for_invoicing(created.id).await.unwrap());
    }

    #[tokio::test]
    async fn order_transitions_compare_the_current_status() {
        let store = MemoryStore::new();
        let created = order(OrderStatus::Created);
        store.insert_order(&created).await.unwrap();

        assert!(store.transition_order(created.id, OrderStatus::Created, OrderStatus::Sent).await.unwrap());
        assert!(!store.transition_order(created.id, OrderStatus::Created, OrderStatus::Sent).await.unwrap());
        assert!(store.claim_order_for_invoicing(created.id).await.unwrap());
        assert!(store.transition_order(created.id, OrderStatus::Invoiced, OrderStatus::Sent).await.unwrap());
        assert_eq!(store.get_order(created.id).await.unwrap().unwrap().status, OrderStatus::Sent);
    }

    #[tokio::test]
    async fn export_stamp_survives_later_status_changes() {
        let store = MemoryStore::new();
        let mut stored = invoice();
        store.insert_invoice(&stored).await.unwrap();

        assert!(store.claim_invoice_for_export(stored.id).await.unwrap());

        // Writer holding the pre-export copy marks it paid.
        stored.status = InvoiceStatus::Paid;
        stored.paid_at = Some(Utc::now());
        store.update_invoice(&stored).await.unwrap();

        let paid = store.get_invoice(stored.id).await.unwrap().unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert!(paid.exported_at.is_some());
        assert!(!store.claim_invoice_for_export(stored.id).await.unwrap());

        store.release_invoice_export(stored.id, InvoiceStatus::Paid).await.unwrap();
        assert!(store.claim_invoice_for_export(stored.id).await.unwrap());
    }
}
