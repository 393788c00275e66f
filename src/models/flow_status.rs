use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-customer progress through the offer → order → invoice flow.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowStatus {
    pub customer_id: Uuid,
    pub offer_sent: bool,
    pub order_created: bool,
    pub order_sent: bool,
    pub invoice_created: bool,
    pub invoice_sent: bool,
    pub invoice_posted: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Flags to set; `None` leaves the current value alone.
#[derive(Deserialize, Debug, Clone, Copy, Default)]
#[serde(rename_all = "camelCase")]
pub struct FlowPatch {
    pub offer_sent: Option<bool>,
    pub order_created: Option<bool>,
    pub order_sent: Option<bool>,
    pub invoice_created: Option<bool>,
    pub invoice_sent: Option<bool>,
    pub invoice_posted: Option<bool>,
}

impl FlowStatus {
    pub fn empty(customer_id: Uuid) -> Self {
        Self {
            customer_id,
            offer_sent: false,
            order_created: false,
            order_sent: false,
            invoice_created: false,
            invoice_sent: false,
            invoice_posted: false,
            updated_at: None,
        }
    }

    pub fn apply(&mut self, patch: FlowPatch, now: DateTime<Utc>) {
        let fields = [
            (patch.offer_sent, &mut self.offer_sent),
            (patch.order_created, &mut self.order_created),
            (patch.order_sent, &mut self.order_sent),
            (patch.invoice_created, &mut self.invoice_created),
            (patch.invoice_sent, &mut self.invoice_sent),
            (patch.invoice_posted, &mut self.invoice_posted),
        ];
        for (value, slot) in fields {
            if let Some(value) = value {
                *slot = value;
            }
        }
        self.updated_at = Some(now);
    }
}

impl FlowPatch {
    pub fn offer_sent() -> Self {
        Self { offer_sent: Some(true), ..Self::default() }
    }

    pub fn order_created() -> Self {
        Self { order_created: Some(true), ..Self::default() }
    }

    pub fn order_sent() -> Self {
        Self { order_sent: Some(true), ..Self::default() }
    }

    pub fn invoice_created() -> Self {
        Self { invoice_created: Some(true), ..Self::default() }
    }

    pub fn invoice_sent() -> Self {
        Self { invoice_sent: Some(true), ..Self::default() }
    }

    pub fn invoice_posted() -> Self {
        Self { invoice_posted: Some(true), ..Self::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_merges_onto_current_state() {
        let mut status = FlowStatus::empty(Uuid::new_v4());
        status.apply(FlowPatch::offer_sent(), Utc::now());
        status.apply(FlowPatch::order_created(), Utc::now());

        assert!(status.offer_sent);
        assert!(status.order_created);
        assert!(!status.invoice_created);
        assert!(status.updated_at.is_some());
    }
}
