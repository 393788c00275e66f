use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use crate::money::round2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Created,
    Sent,
    Invoiced,
    Canceled,
}

text_enum!(OrderStatus, "order status", {
    Created => "created",
    Sent => "sent",
    Invoiced => "invoiced",
    Canceled => "canceled",
});

/// Where an order row came from: copied from the offer, or added on site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowSource {
    Offer,
    Extra,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderRow {
    pub id: Uuid,
    pub description: String,
    pub qty: f64,
    pub price: f64,
    pub source: RowSource,
    pub approved: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
}

impl OrderRow {
    pub fn line_total(&self) -> f64 {
        round2(self.qty * self.price)
    }
}

/// JSON payload of an order.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderData {
    /// Customer snapshot taken when the order was created.
    #[serde(default)]
    pub customer: serde_json::Value,
    /// The source offer's payload.
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(default)]
    pub rows: Vec<OrderRow>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub source_offer_id: Option<Uuid>,
    pub number: String,
    #[sqlx(try_from = "String")]
    pub status: OrderStatus,
    pub title: Option<String>,
    pub currency: String,
    pub vat_percent: f64,
    /// Net total agreed in the offer.
    pub total: f64,
    pub vat_total: f64,
    pub data: Json<OrderData>,
    pub bucket: String,
    pub storage_path: Option<String>,
    pub pdf_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Sum of extra rows that have been approved for billing.
    pub fn approved_extras(&self) -> f64 {
        round2(
            self.data
                .rows
                .iter()
                .filter(|row| row.source == RowSource::Extra && row.approved)
                .map(OrderRow::line_total)
                .sum(),
        )
    }

    /// Rows that end up on the invoice.
    pub fn billable_rows(&self) -> Vec<&OrderRow> {
        self.data
            .rows
            .iter()
            .filter(|row| row.source == RowSource::Offer || row.approved)
            .collect()
    }

    pub fn row_mut(&mut self, id: Uuid) -> Option<&mut OrderRow> {
        self.data.rows.iter_mut().find(|row| row.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(source: RowSource, qty: f64, price: f64, approved: bool) -> OrderRow {
        OrderRow {
            id: Uuid::new_v4(),
            description: "Arbete".into(),
            qty,
            price,
            source,
            approved,
            approved_at: None,
            approved_by: None,
        }
    }

    fn order(rows: Vec<OrderRow>) -> Order {
        Order {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            source_offer_id: None,
            number: "ORD-2025-0001".into(),
            status: OrderStatus::Created,
            title: None,
            currency: "SEK".into(),
            vat_percent: 25.0,
            total: 1000.0,
            vat_total: 250.0,
            data: Json(OrderData {
                rows,
                ..Default::default()
            }),
            bucket: "paperflow-files".into(),
            storage_path: None,
            pdf_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn only_approved_extras_count() {
        let order = order(vec![
            row(RowSource::Offer, 10.0, 100.0, true),
            row(RowSource::Extra, 2.0, 450.0, true),
            row(RowSource::Extra, 1.0, 999.0, false),
        ]);
        assert_eq!(order.approved_extras(), 900.0);
        assert_eq!(order.billable_rows().len(), 2);
    }

    #[test]
    fn data_serializes_as_plain_object() {
        let order = order(vec![row(RowSource::Extra, 1.0, 5.0, false)]);
        let value = serde_json::to_value(&order).unwrap();
        assert_eq!(value["data"]["rows"][0]["source"], "extra");
        assert_eq!(value["status"], "created");
    }
}
