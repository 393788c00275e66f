use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use super::Store;
use crate::config::Config;
use crate::error::Result;
use crate::models::{
    BookkeepingEntry, Customer, Document, FlowPatch, FlowStatus, Invoice, InvoiceStatus, Offer,
    Order, OrderStatus, TimeEntry, TimeFilter,
};
use crate::numbering::Series;

/// Database connection pool
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new Database instance with a connection pool
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let url = config
            .database_url()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded migrations.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(self.get_pool()).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for Database {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    async fn next_sequence(&self, series: Series, year: i32) -> Result<u32> {
        let value: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO number_series (prefix, year, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (prefix, year)
            DO UPDATE SET last_value = number_series.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(series.prefix())
        .bind(year)
        .fetch_one(self.get_pool())
        .await?;

        let value = u32::try_from(value).map_err(anyhow::Error::from)?;
        Ok(value)
    }

    // Customer operations
    async fn list_customers(&self) -> Result<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers ORDER BY company_name ASC",
        )
        .fetch_all(self.get_pool())
        .await?;

        Ok(customers)
    }

    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?;

        Ok(customer)
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, customer_number, company_name, org_nr, contact_person, email,
                                   phone, address, zip, city, country, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(customer.id)
        .bind(&customer.customer_number)
        .bind(&customer.company_name)
        .bind(&customer.org_nr)
        .bind(&customer.contact_person)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.address)
        .bind(&customer.zip)
        .bind(&customer.city)
        .bind(&customer.country)
        .bind(&customer.notes)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(self.get_pool())
        .await?;

        Ok(())
    }

    async fn update_customer(&self, customer: &Customer) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE customers
            SET customer_number = $1, company_name = $2, org_nr = $3, contact_person = $4, email = $5,
                phone = $6, address = $7, zip = $8, city = $9, country = $10, notes = $11, updated_at = $12
            WHERE id = $13
            "#,
        )
        .bind(&customer.customer_number)
        .bind(&customer.company_name)
        .bind(&customer.org_nr)
        .bind(&customer.contact_person)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.address)
        .bind(&customer.zip)
        .bind(&customer.city)
        .bind(&customer.country)
        .bind(&customer.notes)
        .bind(customer.updated_at)
        .bind(customer.id)
        .execute(self.get_pool())
        .await?;

        Ok(())
    }

    async fn delete_customer(&self, id: Uuid) -> Result<bool> {
        // Start a transaction
        let mut tx = self.pool.begin().await?;

        for statement in [
            "DELETE FROM time_entries WHERE customer_id = $1",
            "DELETE FROM customer_flow_status WHERE customer_id = $1",
            "DELETE FROM documents WHERE customer_id = $1",
            "DELETE FROM invoices WHERE customer_id = $1",
            "DELETE FROM orders WHERE customer_id = $1",
            "DELETE FROM offers WHERE customer_id = $1",
        ] {
            sqlx::query(statement).bind(id).execute(&mut *tx).await?;
        }

        let deleted = sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        // Commit the transaction
        tx.commit().await?;

        Ok(deleted > 0)
    }

    // Offer operations
    async fn insert_offer(&self, offer: &Offer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO offers (id, customer_id, number, title, amount, currency, status, data, needs_print,
                                bucket, storage_path, pdf_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(offer.id)
        .bind(offer.customer_id)
        .bind(&offer.number)
        .bind(&offer.title)
        .bind(offer.amount)
        .bind(&offer.currency)
        .bind(offer.status.as_str())
        .bind(&offer.data)
        .bind(offer.needs_print)
        .bind(&offer.bucket)
        .bind(&offer.storage_path)
        .bind(&offer.pdf_url)
        .bind(offer.created_at)
        .bind(offer.updated_at)
        .execute(self.get_pool())
        .await?;

        Ok(())
    }

    async fn get_offer(&self, id: Uuid) -> Result<Option<Offer>> {
        let offer = sqlx::query_as::<_, Offer>("SELECT * FROM offers WHERE id = $1")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?;

        Ok(offer)
    }

    async fn list_offers(&self, customer_id: Option<Uuid>, limit: Option<i64>) -> Result<Vec<Offer>> {
        let mut query = QueryBuilder::new("SELECT * FROM offers");
        if let Some(customer_id) = customer_id {
            query.push(" WHERE customer_id = ").push_bind(customer_id);
        }
        query.push(" ORDER BY created_at DESC");
        if let Some(limit) = limit {
            query.push(" LIMIT ").push_bind(limit);
        }

        let offers = query
            .build_query_as::<Offer>()
            .fetch_all(self.get_pool())
            .await?;

        Ok(offers)
    }

    async fn update_offer(&self, offer: &Offer) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE offers
            SET title = $1, amount = $2, currency = $3, status = $4, data = $5, needs_print = $6,
                storage_path = $7, pdf_url = $8, updated_at = $9
            WHERE id = $10
            "#,
        )
        .bind(&offer.title)
        .bind(offer.amount)
        .bind(&offer.currency)
        .bind(offer.status.as_str())
        .bind(&offer.data)
        .bind(offer.needs_print)
        .bind(&offer.storage_path)
        .bind(&offer.pdf_url)
        .bind(offer.updated_at)
        .bind(offer.id)
        .execute(self.get_pool())
        .await?;

        Ok(())
    }

    async fn delete_offer(&self, id: Uuid) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM offers WHERE id = $1")
            .bind(id)
            .execute(self.get_pool())
            .await?
            .rows_affected();

        Ok(deleted > 0)
    }

    // Order operations
    async fn insert_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, source_offer_id, number, status, title, currency, vat_percent,
                                total, vat_total, data, bucket, storage_path, pdf_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(order.id)
        .bind(order.customer_id)
        .bind(order.source_offer_id)
        .bind(&order.number)
        .bind(order.status.as_str())
        .bind(&order.title)
        .bind(&order.currency)
        .bind(order.vat_percent)
        .bind(order.total)
        .bind(order.vat_total)
        .bind(&order.data)
        .bind(&order.bucket)
        .bind(&order.storage_path)
        .bind(&order.pdf_url)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(self.get_pool())
        .await?;

        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?;

        Ok(order)
    }

    async fn list_orders(&self, customer_id: Option<Uuid>) -> Result<Vec<Order>> {
        let mut query = QueryBuilder::new("SELECT * FROM orders");
        if let Some(customer_id) = customer_id {
            query.push(" WHERE customer_id = ").push_bind(customer_id);
        }
        query.push(" ORDER BY created_at DESC");

        let orders = query
            .build_query_as::<Order>()
            .fetch_all(self.get_pool())
            .await?;

        Ok(orders)
    }

    async fn update_order_data(&self, order: &Order) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET data = $1, updated_at = $2
            WHERE id = $3 AND status NOT IN ($4, $5)
            "#,
        )
        .bind(&order.data)
        .bind(order.updated_at)
        .bind(order.id)
        .bind(OrderStatus::Invoiced.as_str())
        .bind(OrderStatus::Canceled.as_str())
        .execute(self.get_pool())
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn transition_order(&self, id: Uuid, from: OrderStatus, to: OrderStatus) -> Result<bool> {
        let moved = sqlx::query(
            "UPDATE orders SET status = $1, updated_at = now() WHERE id = $2 AND status = $3",
        )
        .bind(to.as_str())
        .bind(id)
        .bind(from.as_str())
        .execute(self.get_pool())
        .await?
        .rows_affected();

        Ok(moved > 0)
    }

    async fn claim_order_for_invoicing(&self, id: Uuid) -> Result<bool> {
        let claimed = sqlx::query(
            "UPDATE orders SET status = $1, updated_at = now() WHERE id = $2 AND status <> $1",
        )
        .bind(OrderStatus::Invoiced.as_str())
        .bind(id)
        .execute(self.get_pool())
        .await?
        .rows_affected();

        Ok(claimed > 0)
    }

    // Invoice operations
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO invoices (id, customer_id, source_order_id, number, status, due_date, currency, subtotal,
                                  vat_percent, vat_total, total, data, bucket, storage_path, pdf_url, sent_at,
                                  paid_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.customer_id)
        .bind(invoice.source_order_id)
        .bind(&invoice.number)
        .bind(invoice.status.as_str())
        .bind(invoice.due_date)
        .bind(&invoice.currency)
        .bind(invoice.subtotal)
        .bind(invoice.vat_percent)
        .bind(invoice.vat_total)
        .bind(invoice.total)
        .bind(&invoice.data)
        .bind(&invoice.bucket)
        .bind(&invoice.storage_path)
        .bind(&invoice.pdf_url)
        .bind(invoice.sent_at)
        .bind(invoice.paid_at)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(self.get_pool())
        .await?;

        Ok(())
    }

    async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>> {
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?;

        Ok(invoice)
    }

    async fn list_invoices(&self, customer_id: Option<Uuid>) -> Result<Vec<Invoice>> {
        let mut query = QueryBuilder::new("SELECT * FROM invoices");
        if let Some(customer_id) = customer_id {
            query.push(" WHERE customer_id = ").push_bind(customer_id);
        }
        query.push(" ORDER BY created_at DESC");

        let invoices = query
            .build_query_as::<Invoice>()
            .fetch_all(self.get_pool())
            .await?;

        Ok(invoices)
    }

    async fn update_invoice(&self, invoice: &Invoice) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE invoices
            SET status = $1, storage_path = $2, pdf_url = $3, sent_at = $4, paid_at = $5, updated_at = $6
            WHERE id = $7
            "#,
        )
        .bind(invoice.status.as_str())
        .bind(&invoice.storage_path)
        .bind(&invoice.pdf_url)
        .bind(invoice.sent_at)
        .bind(invoice.paid_at)
        .bind(invoice.updated_at)
        .bind(invoice.id)
        .execute(self.get_pool())
        .await?;

        Ok(())
    }

    async fn claim_invoice_for_export(&self, id: Uuid) -> Result<bool> {
        let claimed = sqlx::query(
            r#"
            UPDATE invoices
            SET status = $1, exported_at = now(), updated_at = now()
            WHERE id = $2 AND exported_at IS NULL
            "#,
        )
        .bind(InvoiceStatus::Exported.as_str())
        .bind(id)
        .execute(self.get_pool())
        .await?
        .rows_affected();

        Ok(claimed > 0)
    }

    async fn release_invoice_export(&self, id: Uuid, status: InvoiceStatus) -> Result<()> {
        sqlx::query("UPDATE invoices SET status = $1, exported_at = NULL, updated_at = now() WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(self.get_pool())
            .await?;

        Ok(())
    }

    // Document operations
    async fn insert_document(&self, document: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, customer_id, doc_type, bucket, storage_path, filename, file_url, status,
                                   source_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(document.id)
        .bind(document.customer_id)
        .bind(document.doc_type.as_str())
        .bind(&document.bucket)
        .bind(&document.storage_path)
        .bind(&document.filename)
        .bind(&document.file_url)
        .bind(&document.status)
        .bind(document.source_id)
        .bind(document.created_at)
        .execute(self.get_pool())
        .await?;

        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let document = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(self.get_pool())
            .await?;

        Ok(document)
    }

    async fn list_documents(&self, customer_id: Uuid) -> Result<Vec<Document>> {
        let documents = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE customer_id = $1 ORDER BY created_at DESC",
        )
        .bind(customer_id)
        .fetch_all(self.get_pool())
        .await?;

        Ok(documents)
    }

    async fn delete_document(&self, id: Uuid) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(self.get_pool())
            .await?
            .rows_affected();

        Ok(deleted > 0)
    }

    async fn delete_documents_for_source(&self, source_id: Uuid) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM documents WHERE source_id = $1")
            .bind(source_id)
            .execute(self.get_pool())
            .await?
            .rows_affected();

        Ok(deleted)
    }

    // Flow status operations
    async fn get_flow(&self, customer_id: Uuid) -> Result<FlowStatus> {
        let flow = sqlx::query_as::<_, FlowStatus>(
            "SELECT * FROM customer_flow_status WHERE customer_id = $1",
        )
        .bind(customer_id)
        .fetch_optional(self.get_pool())
        .await?;

        Ok(flow.unwrap_or_else(|| FlowStatus::empty(customer_id)))
    }

    async fn patch_flow(&self, customer_id: Uuid, patch: FlowPatch) -> Result<FlowStatus> {
        let flow = sqlx::query_as::<_, FlowStatus>(
            r#"
            INSERT INTO customer_flow_status AS f (customer_id, offer_sent, order_created, order_sent,
                                                   invoice_created, invoice_sent, invoice_posted, updated_at)
            VALUES ($1, COALESCE($2, false), COALESCE($3, false), COALESCE($4, false),
                    COALESCE($5, false), COALESCE($6, false), COALESCE($7, false), now())
            ON CONFLICT (customer_id) DO UPDATE SET
                offer_sent = COALESCE($2, f.offer_sent),
                order_created = COALESCE($3, f.order_created),
                order_sent = COALESCE($4, f.order_sent),
                invoice_created = COALESCE($5, f.invoice_created),
                invoice_sent = COALESCE($6, f.invoice_sent),
                invoice_posted = COALESCE($7, f.invoice_posted),
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(customer_id)
        .bind(patch.offer_sent)
        .bind(patch.order_created)
        .bind(patch.order_sent)
        .bind(patch.invoice_created)
        .bind(patch.invoice_sent)
        .bind(patch.invoice_posted)
        .fetch_one(self.get_pool())
        .await?;

        Ok(flow)
    }

    // Bookkeeping operations
    async fn insert_entry(&self, entry: &BookkeepingEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bookkeeping_entries (id, kind, customer_id, invoice_id, counterparty, reference, entry_date,
                                             amount_incl_vat, vat_amount, currency, file_url, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(entry.id)
        .bind(entry.kind.as_str())
        .bind(entry.customer_id)
        .bind(entry.invoice_id)
        .bind(&entry.counterparty)
        .bind(&entry.reference)
        .bind(entry.entry_date)
        .bind(entry.amount_incl_vat)
        .bind(entry.vat_amount)
        .bind(&entry.currency)
        .bind(&entry.file_url)
        .bind(entry.status.as_str())
        .bind(entry.created_at)
        .execute(self.get_pool())
        .await?;

        Ok(())
    }

    async fn list_entries(&self) -> Result<Vec<BookkeepingEntry>> {
        let entries = sqlx::query_as::<_, BookkeepingEntry>(
            "SELECT * FROM bookkeeping_entries ORDER BY entry_date ASC, created_at ASC",
        )
        .fetch_all(self.get_pool())
        .await?;

        Ok(entries)
    }

    // Time tracking operations
    async fn insert_time_entry(&self, entry: &TimeEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO time_entries (id, work_date, minutes, customer_id, customer_name, project, note, billable,
                                      created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.work_date)
        .bind(entry.minutes)
        .bind(entry.customer_id)
        .bind(&entry.customer_name)
        .bind(&entry.project)
        .bind(&entry.note)
        .bind(entry.billable)
        .bind(entry.created_at)
        .execute(self.get_pool())
        .await?;

        Ok(())
    }

    async fn list_time_entries(&self, filter: &TimeFilter) -> Result<Vec<TimeEntry>> {
        let entries = sqlx::query_as::<_, TimeEntry>(
            r#"
            SELECT * FROM time_entries
            WHERE ($1::date IS NULL OR work_date >= $1)
              AND ($2::date IS NULL OR work_date <= $2)
              AND ($3::uuid IS NULL OR customer_id = $3)
            ORDER BY work_date DESC, created_at DESC
            "#,
        )
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.customer_id)
        .fetch_all(self.get_pool())
        .await?;

        Ok(entries)
    }
}
