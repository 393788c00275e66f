//! Aggregates over logged time.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Datelike;
use serde::Serialize;

use crate::models::TimeEntry;

const UNKNOWN_CUSTOMER: &str = "Okänd kund";
const NO_PROJECT: &str = "Inget projekt";

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub label: String,
    pub minutes: i64,
    pub percentage: i64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyTrend {
    /// ISO week, `2025-W07`.
    pub week: String,
    pub total_minutes: i64,
    pub billable_minutes: i64,
    pub productivity: i64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeStats {
    pub total_minutes: i64,
    pub billable_minutes: i64,
    pub non_billable_minutes: i64,
    pub customer_breakdown: Vec<Share>,
    pub project_breakdown: Vec<Share>,
    pub daily_average: f64,
    /// Billable share of the total, in percent.
    pub productivity: i64,
    pub weekly_trends: Vec<WeeklyTrend>,
}

fn percent(part: i64, total: i64) -> i64 {
    if total > 0 {
        (part as f64 / total as f64 * 100.0).round() as i64
    } else {
        0
    }
}

fn breakdown<'a>(entries: &'a [TimeEntry], label: impl Fn(&'a TimeEntry) -> &'a str, total: i64) -> Vec<Share> {
    let mut minutes: HashMap<&str, i64> = HashMap::new();
    for entry in entries {
        *minutes.entry(label(entry)).or_default() += i64::from(entry.minutes);
    }

    let mut shares: Vec<Share> = minutes
        .into_iter()
        .map(|(label, minutes)| Share {
            label: label.to_string(),
            minutes,
            percentage: percent(minutes, total),
        })
        .collect();
    shares.sort_by(|a, b| b.minutes.cmp(&a.minutes).then_with(|| a.label.cmp(&b.label)));
    shares
}

/// Per ISO week, newest first, at most `weeks` of them.
pub fn weekly_trends(entries: &[TimeEntry], weeks: usize) -> Vec<WeeklyTrend> {
    let mut by_week: BTreeMap<(i32, u32), (i64, i64)> = BTreeMap::new();
    for entry in entries {
        let week = entry.work_date.iso_week();
        let slot = by_week.entry((week.year(), week.week())).or_default();
        slot.0 += i64::from(entry.minutes);
        if entry.billable {
            slot.1 += i64::from(entry.minutes);
        }
    }

    by_week
        .into_iter()
        .rev()
        .take(weeks)
        .map(|((year, week), (total, billable))| WeeklyTrend {
            week: format!("{year}-W{week:02}"),
            total_minutes: total,
            billable_minutes: billable,
            productivity: percent(billable, total),
        })
        .collect()
}

pub fn compute(entries: &[TimeEntry]) -> TimeStats {
    let total_minutes: i64 = entries.iter().map(|e| i64::from(e.minutes)).sum();
    let billable_minutes: i64 = entries
        .iter()
        .filter(|e| e.billable)
        .map(|e| i64::from(e.minutes))
        .sum();

    let days: HashSet<_> = entries.iter().map(|e| e.work_date).collect();
    let daily_average = if days.is_empty() {
        0.0
    } else {
        total_minutes as f64 / days.len() as f64
    };

    TimeStats {
        total_minutes,
        billable_minutes,
        non_billable_minutes: total_minutes - billable_minutes,
        customer_breakdown: breakdown(
            entries,
            |e| e.customer_name.as_deref().filter(|n| !n.is_empty()).unwrap_or(UNKNOWN_CUSTOMER),
            total_minutes,
        ),
        project_breakdown: breakdown(
            entries,
            |e| e.project.as_deref().filter(|p| !p.is_empty()).unwrap_or(NO_PROJECT),
            total_minutes,
        ),
        daily_average,
        productivity: percent(billable_minutes, total_minutes),
        weekly_trends: weekly_trends(entries, 12),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn entry(day: u32, minutes: i32, customer: Option<&str>, billable: bool) -> TimeEntry {
        TimeEntry {
            id: Uuid::new_v4(),
            work_date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            minutes,
            customer_id: None,
            customer_name: customer.map(Into::into),
            project: None,
            note: None,
            billable,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_input_is_all_zero() {
        let stats = compute(&[]);
        assert_eq!(stats.total_minutes, 0);
        assert_eq!(stats.daily_average, 0.0);
        assert_eq!(stats.productivity, 0);
        assert!(stats.customer_breakdown.is_empty());
    }

    #[test]
    fn splits_billable_and_groups_customers() {
        let entries = vec![
            entry(3, 120, Some("Kalles Bygg AB"), true),
            entry(3, 60, Some("Kalles Bygg AB"), false),
            entry(4, 60, None, true),
        ];
        let stats = compute(&entries);

        assert_eq!(stats.total_minutes, 240);
        assert_eq!(stats.billable_minutes, 180);
        assert_eq!(stats.non_billable_minutes, 60);
        assert_eq!(stats.daily_average, 120.0);
        assert_eq!(stats.productivity, 75);

        assert_eq!(stats.customer_breakdown[0].label, "Kalles Bygg AB");
        assert_eq!(stats.customer_breakdown[0].percentage, 75);
        assert_eq!(stats.customer_breakdown[1].label, "Okänd kund");
        assert_eq!(stats.project_breakdown[0].label, "Inget projekt");
        assert_eq!(stats.project_breakdown[0].percentage, 100);
    }

    #[test]
    fn weeks_are_newest_first() {
        let entries = vec![entry(3, 30, None, true), entry(17, 90, None, false)];
        let trends = weekly_trends(&entries, 12);

        assert_eq!(trends.len(), 2);
        assert_eq!(trends[0].week, "2025-W12");
        assert_eq!(trends[1].week, "2025-W10");
        assert_eq!(trends[1].productivity, 100);
    }
}
