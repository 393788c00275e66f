use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub id: Uuid,
    pub work_date: NaiveDate,
    pub minutes: i32,
    pub customer_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub project: Option<String>,
    pub note: Option<String>,
    pub billable: bool,
    pub created_at: DateTime<Utc>,
}

/// Query filter for time entries; bounds are inclusive.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TimeFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub customer_id: Option<Uuid>,
}

impl TimeFilter {
    pub fn matches(&self, entry: &TimeEntry) -> bool {
        self.from.is_none_or(|from| entry.work_date >= from)
            && self.to.is_none_or(|to| entry.work_date <= to)
            && self
                .customer_id
                .is_none_or(|id| entry.customer_id == Some(id))
    }
}
