use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Offer status. Any status may follow any other; the column is set
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Draft,
    Sent,
    Accepted,
    Rejected,
    Canceled,
}

text_enum!(OfferStatus, "offer status", {
    Draft => "draft",
    Sent => "sent",
    Accepted => "accepted",
    Rejected => "rejected",
    Canceled => "canceled",
});

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub number: String,
    pub title: Option<String>,
    pub amount: Option<f64>,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub status: OfferStatus,
    /// Free-form payload, usually the structured output of the offer
    /// assistant.
    pub data: serde_json::Value,
    pub needs_print: bool,
    pub bucket: String,
    pub storage_path: Option<String>,
    pub pdf_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Offer {
    /// Line items carried in the payload under `items` or `rows`.
    pub fn payload_items(&self) -> Vec<&serde_json::Value> {
        ["items", "rows"]
            .iter()
            .filter_map(|key| self.data.get(*key).and_then(|v| v.as_array()))
            .flatten()
            .collect()
    }

    /// VAT percent stated in the payload, either at the top level or under
    /// `details`.
    pub fn payload_vat_percent(&self) -> Option<f64> {
        let candidates = [
            self.data.get("vatPercent"),
            self.data.get("details").and_then(|d| d.get("vatPercent")),
        ];
        candidates.into_iter().flatten().find_map(number_like)
    }
}

/// Accept numbers and numeric strings ("25", "1 250,50").
pub(crate) fn number_like(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| if c == ',' { '.' } else { c })
                .collect();
            cleaned.parse().ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_round_trips_through_text() {
        for status in OfferStatus::ALL {
            assert_eq!(status.as_str().parse::<OfferStatus>().unwrap(), *status);
        }
        assert!("order_confirmed".parse::<OfferStatus>().is_err());
    }

    #[test]
    fn reads_numbers_from_strings() {
        assert_eq!(number_like(&json!("1 250,50")), Some(1250.5));
        assert_eq!(number_like(&json!(25)), Some(25.0));
        assert_eq!(number_like(&json!("n/a")), None);
        assert_eq!(number_like(&json!(null)), None);
    }
}
