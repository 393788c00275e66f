use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::require_customer;
use crate::error::{AppError, Result};
use crate::models::TimeEntry;
use crate::state::AppState;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewTimeEntry {
    pub work_date: Option<NaiveDate>,
    pub minutes: i32,
    pub customer_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub project: Option<String>,
    pub note: Option<String>,
    #[serde(default = "billable_by_default")]
    pub billable: bool,
}

fn billable_by_default() -> bool {
    true
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Log worked minutes. The customer name is copied from the customer when
/// the entry does not carry one.
pub async fn log_time(state: &AppState, new: NewTimeEntry) -> Result<TimeEntry> {
    if new.minutes <= 0 {
        return Err(AppError::bad_request("minutes must be greater than zero"));
    }

    let mut customer_name = trimmed(new.customer_name);
    if let Some(id) = new.customer_id {
        let customer = require_customer(state, id).await?;
        customer_name.get_or_insert(customer.company_name);
    }

    let now = Utc::now();
    let entry = TimeEntry {
        id: Uuid::new_v4(),
        work_date: new.work_date.unwrap_or_else(|| now.date_naive()),
        minutes: new.minutes,
        customer_id: new.customer_id,
        customer_name,
        project: trimmed(new.project),
        note: trimmed(new.note),
        billable: new.billable,
        created_at: now,
    };
    state.store.insert_time_entry(&entry).await?;
    tracing::info!(entry_id = %entry.id, minutes = entry.minutes, billable = entry.billable, "time logged");
    Ok(entry)
}
