//! Turnover page: monthly exits against the average workforce.

use chrono::{DateTime, Datelike};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{choice, distinct_by_number, distinct_sorted, month_number, MONTHS_FR};
use crate::aggregate::Grouped;
use crate::filter::{parse_date, Filter, Predicate};
use crate::models::TurnoverRecord;
use crate::rate::{average_workforce, round_to, turnover_rate};
use crate::table::{normalize, RecordTable};

static YEAR_MONTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([0-9]{4})-([0-9]{2})$").unwrap());

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Filters {
    pub month: Option<String>,
    pub group: Option<String>,
    pub contract: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthTurnover {
    pub month: String,
    pub label: String,
    pub total_started: u64,
    pub total_finished: u64,
    pub average_workforce: f64,
    pub turnover_rate: f64,
    pub groups: Vec<TurnoverRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub month: String,
    pub turnover_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub months: Vec<String>,
    pub groups: Vec<String>,
    pub contracts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnoverReport {
    pub months: Vec<MonthTurnover>,
    pub trend: Vec<TrendPoint>,
    pub options: FilterOptions,
    pub skipped_rows: usize,
}

fn month(record: &TurnoverRecord) -> &str {
    &record.month
}

fn group(record: &TurnoverRecord) -> &str {
    &record.group
}

fn contract(record: &TurnoverRecord) -> &str {
    &record.contract_type
}

pub fn build(table: &RecordTable, filters: &Filters) -> TurnoverReport {
    let normalized = normalize::<TurnoverRecord>(table);
    let records = &normalized.records;

    let filter = Filter::new()
        .with(Predicate::category(month, choice(&filters.month)))
        .with(Predicate::category(group, choice(&filters.group)))
        .with(Predicate::category(contract, choice(&filters.contract)));

    let mut by_month: Grouped<Vec<TurnoverRecord>> = Grouped::new();
    for record in filter.apply(records) {
        by_month.entry(&record.month).push(record.clone());
    }

    let mut months: Vec<MonthTurnover> = by_month
        .into_iter()
        .map(|(month, groups)| {
            let average = average_workforce(groups.iter().map(|g| (g.workers_started, g.workers_ended_month)));
            let finished: u64 = groups.iter().map(|g| g.workers_finished).sum();
            MonthTurnover {
                label: month_label(&month),
                total_started: groups.iter().map(|g| g.workers_started).sum(),
                total_finished: finished,
                average_workforce: average,
                turnover_rate: turnover_rate(finished, average),
                month,
                groups,
            }
        })
        .collect();
    months.sort_by_key(|m| month_number(&m.month));

    let trend = months
        .iter()
        .map(|m| TrendPoint {
            month: format!("Mois {}", m.month),
            turnover_rate: round_to(m.turnover_rate, 2),
        })
        .collect();

    TurnoverReport {
        months,
        trend,
        options: FilterOptions {
            months: distinct_by_number(records.iter().map(month)),
            groups: distinct_sorted(records.iter().map(group)),
            contracts: distinct_sorted(records.iter().map(contract)),
        },
        skipped_rows: normalized.skipped,
    }
}

/// Display label for a month cell: `2024-03` and ISO timestamps become
/// `Mars 2024`, text is kept, bare numbers become `Mois N`.
pub fn month_label(month: &str) -> String {
    let month = month.trim();

    if let Some(caps) = YEAR_MONTH.captures(month) {
        let index: usize = caps[2].parse().unwrap_or(0);
        if let Some(name) = index.checked_sub(1).and_then(|i| MONTHS_FR.get(i)) {
            return format!("{} {}", name, &caps[1]);
        }
        return month.to_string();
    }

    if month.contains('T') || month.contains('Z') {
        let date = DateTime::parse_from_rfc3339(month)
            .map(|timestamp| timestamp.naive_utc().date())
            .ok()
            .or_else(|| parse_date(month));
        return match date {
            Some(date) => format!("{} {}", MONTHS_FR[date.month0() as usize], date.year()),
            None => month.to_string(),
        };
    }

    if month.chars().any(char::is_alphabetic) {
        return month.to_string();
    }

    format!("Mois {month}")
}
