//! Sortie (exit) page.

use serde::{Deserialize, Serialize};

use super::{choice, distinct_by_number, distinct_sorted, month_number};
use crate::aggregate::{sum_by, Grouped};
use crate::filter::{Filter, Predicate};
use crate::models::SortieRecord;
use crate::present::{top_n, unranked, NamedValue};
use crate::table::{normalize, RecordTable};

pub const TOP_DEPARTMENTS: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Filters {
    pub year: Option<String>,
    pub month: Option<String>,
    pub department: Option<String>,
    pub contract: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthExits {
    pub month: String,
    /// Exits per QZ, only for QZs with data in the month.
    pub qz: Vec<NamedValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub years: Vec<String>,
    pub months: Vec<String>,
    pub departments: Vec<String>,
    pub contracts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortieReport {
    pub total_exits: u64,
    pub total_female: u64,
    pub total_male: u64,
    pub contract_types: usize,
    pub unique_qz_count: usize,
    pub by_qz: Vec<NamedValue>,
    pub by_sex: Vec<NamedValue>,
    pub by_contract: Vec<NamedValue>,
    pub by_department: Vec<NamedValue>,
    pub by_month: Vec<MonthExits>,
    pub qz_list: Vec<String>,
    pub options: FilterOptions,
    pub skipped_rows: usize,
}

fn qz(record: &SortieRecord) -> &str {
    &record.qz
}

fn month(record: &SortieRecord) -> &str {
    &record.month
}

fn year(record: &SortieRecord) -> &str {
    &record.year
}

fn sex(record: &SortieRecord) -> &str {
    &record.sex
}

fn contract(record: &SortieRecord) -> &str {
    &record.contract
}

fn department(record: &SortieRecord) -> &str {
    &record.department
}

fn count(record: &SortieRecord) -> u64 {
    record.count
}

/// First non-zero total among the spellings of a sex code.
fn sex_total(by_sex: &Grouped<u64>, codes: [&str; 2]) -> u64 {
    codes
        .iter()
        .filter_map(|code| by_sex.get(code).copied())
        .find(|exits| *exits > 0)
        .unwrap_or(0)
}

pub fn build(table: &RecordTable, filters: &Filters) -> SortieReport {
    let normalized = normalize::<SortieRecord>(table);
    let records = &normalized.records;

    let year_selection = choice(&filters.year);
    let filter = Filter::new()
        .with(Predicate::category(year, year_selection.clone()))
        .with(Predicate::category(month, choice(&filters.month)))
        .with(Predicate::category(department, choice(&filters.department)))
        .with(Predicate::category(contract, choice(&filters.contract)));
    let selected = filter.apply(records);

    let total_exits: u64 = selected.iter().map(|r| r.count).sum();
    let by_qz = sum_by(selected.iter().copied(), qz, count);
    let by_sex = sum_by(selected.iter().copied(), sex, count);
    let by_contract = sum_by(selected.iter().copied(), contract, count);
    let by_department = sum_by(selected.iter().copied(), department, count);

    let mut months: Vec<Grouped<u64>> = (0..12).map(|_| Grouped::new()).collect();
    for record in &selected {
        let n = month_number(&record.month);
        if (1..=12).contains(&n) {
            *months[(n - 1) as usize].entry(&record.qz) += record.count;
        }
    }
    let year_suffix = match &filters.year {
        Some(y) if year_selection.is_active() => format!("/{}", y.trim()),
        _ => String::new(),
    };
    let by_month = months
        .into_iter()
        .enumerate()
        .map(|(i, per_qz)| MonthExits {
            month: format!("Mois {}{}", i + 1, year_suffix),
            qz: unranked(per_qz),
        })
        .collect();

    let mut years = distinct_by_number(records.iter().map(year));
    years.reverse();

    SortieReport {
        total_exits,
        total_female: sex_total(&by_sex, ["M", "m"]),
        total_male: sex_total(&by_sex, ["H", "h"]),
        contract_types: by_contract.len(),
        unique_qz_count: by_qz.len(),
        qz_list: distinct_sorted(selected.iter().map(|r| r.qz.as_str())),
        by_qz: unranked(by_qz),
        by_sex: unranked(by_sex),
        by_contract: unranked(by_contract),
        by_department: top_n(by_department, TOP_DEPARTMENTS),
        by_month,
        options: FilterOptions {
            years,
            months: distinct_by_number(records.iter().map(month)),
            departments: distinct_sorted(records.iter().map(department)),
            contracts: distinct_sorted(records.iter().map(contract)),
        },
        skipped_rows: normalized.skipped,
    }
}
