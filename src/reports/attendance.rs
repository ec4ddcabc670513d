//! Attendance page: presence per group, contract and category.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{choice, distinct_sorted};
use crate::aggregate::{tally_by, AttendanceStatus, AttendanceTally, Grouped};
use crate::filter::{Field, Filter, Predicate, Selection};
use crate::models::AttendanceRecord;
use crate::present::{paginate, sort_descending, Page};
use crate::rate::percentage_of;
use crate::table::{normalize, RecordTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Present,
    Absent,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    pub category: Option<String>,
    pub group_search: Option<String>,
    #[serde(default)]
    pub group_status: StatusFilter,
    #[serde(default)]
    pub contract_status: StatusFilter,
    pub group_page: Option<usize>,
    pub contract_page: Option<usize>,
    /// Group to drill into.
    pub group: Option<String>,
    #[serde(default)]
    pub roster_status: StatusFilter,
    pub roster_search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownRow {
    pub name: String,
    pub total: u64,
    pub present: u64,
    pub absent: u64,
    pub present_rate: f64,
}

impl BreakdownRow {
    fn matches(&self, status: StatusFilter) -> bool {
        match status {
            StatusFilter::All => true,
            StatusFilter::Present => self.present_rate > 0.0,
            StatusFilter::Absent => self.present_rate == 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_present: u64,
    pub total_absent: u64,
    pub total_workers: u64,
    pub attendance_rate: f64,
    pub absence_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub code: String,
    pub name: String,
    /// `P` when the attendance code is `T`, otherwise `A`.
    pub status: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRoster {
    pub group: String,
    pub present: usize,
    pub absent: usize,
    pub records: Vec<RosterEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceReport {
    pub group_stats: Vec<BreakdownRow>,
    pub contract_stats: Vec<BreakdownRow>,
    pub category_stats: Vec<BreakdownRow>,
    pub groups: Page<BreakdownRow>,
    pub contracts: Page<BreakdownRow>,
    pub overall: OverallStats,
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roster: Option<GroupRoster>,
    pub skipped_rows: usize,
}

/// Dashboard tile: T/I counts over every row, unfiltered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total_present: u64,
    pub total_absent: u64,
    pub attendance_rate: f64,
    pub absence_rate: f64,
}

fn group(record: &AttendanceRecord) -> &str {
    &record.group
}

fn contract(record: &AttendanceRecord) -> &str {
    &record.contract
}

fn category(record: &AttendanceRecord) -> &str {
    &record.category
}

fn code(record: &AttendanceRecord) -> &str {
    &record.code
}

fn name(record: &AttendanceRecord) -> &str {
    &record.name
}

fn attendance(record: &AttendanceRecord) -> &str {
    &record.attendance
}

fn breakdown(grouped: Grouped<AttendanceTally>) -> Vec<BreakdownRow> {
    let mut rows: Vec<BreakdownRow> = grouped
        .into_iter()
        .map(|(name, tally)| BreakdownRow {
            present_rate: percentage_of(tally.present, tally.total, 0),
            name,
            total: tally.total,
            present: tally.present,
            absent: tally.absent,
        })
        .collect();
    sort_descending(&mut rows, |row| &row.total);
    rows
}

pub fn build(table: &RecordTable, filters: &Filters) -> AttendanceReport {
    let normalized = normalize::<AttendanceRecord>(table);
    let records = &normalized.records;

    let filter = Filter::new().with(Predicate::category(category, choice(&filters.category)));
    let in_category = filter.apply(records);
    let considered = in_category.len();
    let selected: Vec<&AttendanceRecord> = in_category
        .into_iter()
        .filter(|r| !(r.group.is_empty() && r.contract.is_empty() && r.category.is_empty()))
        .collect();
    if selected.len() < considered {
        debug!(
            rows = considered - selected.len(),
            "Attendance rows without group, contract or category"
        );
    }

    let group_stats = breakdown(tally_by(selected.iter().copied(), group, attendance));
    let contract_stats = breakdown(tally_by(selected.iter().copied(), contract, attendance));
    let category_stats = breakdown(tally_by(selected.iter().copied(), category, attendance));

    let search = filters.group_search.clone().unwrap_or_default();
    let needle = search.trim().to_lowercase();
    let visible_groups: Vec<BreakdownRow> = group_stats
        .iter()
        .filter(|row| needle.is_empty() || row.name.to_lowercase().contains(&needle))
        .filter(|row| row.matches(filters.group_status))
        .cloned()
        .collect();
    let visible_contracts: Vec<BreakdownRow> = contract_stats
        .iter()
        .filter(|row| row.matches(filters.contract_status))
        .cloned()
        .collect();

    let overall = overall_stats(&group_stats);
    let roster = filters
        .group
        .as_deref()
        .filter(|g| !g.trim().is_empty())
        .map(|g| group_roster(records, g.trim(), filters.roster_status, filters.roster_search.as_deref()));

    AttendanceReport {
        groups: paginate(&visible_groups, filters.group_page.unwrap_or(1)),
        contracts: paginate(&visible_contracts, filters.contract_page.unwrap_or(1)),
        categories: distinct_sorted(records.iter().map(category)),
        group_stats,
        contract_stats,
        category_stats,
        overall,
        roster,
        skipped_rows: normalized.skipped,
    }
}

/// Totals over the group breakdown. Workers are present plus absent only.
pub fn overall_stats(group_stats: &[BreakdownRow]) -> OverallStats {
    let total_present: u64 = group_stats.iter().map(|g| g.present).sum();
    let total_absent: u64 = group_stats.iter().map(|g| g.absent).sum();
    let total_workers = total_present + total_absent;
    OverallStats {
        total_present,
        total_absent,
        total_workers,
        attendance_rate: percentage_of(total_present, total_workers, 0),
        absence_rate: percentage_of(total_absent, total_workers, 0),
    }
}

/// Workers of one group with both code and name, optionally narrowed by
/// status and a code/name search.
pub fn group_roster(
    records: &[AttendanceRecord],
    group_name: &str,
    status: StatusFilter,
    search: Option<&str>,
) -> GroupRoster {
    let members = Filter::new().with(Predicate::category(group, Selection::Only(group_name.to_string())));
    let narrowed = Filter::new().with(Predicate::search(
        vec![code as Field<AttendanceRecord>, name],
        search.unwrap_or_default(),
    ));

    let mut present = 0;
    let mut absent = 0;
    let mut entries = Vec::new();
    for record in members.apply(records) {
        if record.code.is_empty() || record.name.is_empty() {
            continue;
        }
        let entry_status = match AttendanceStatus::classify(&record.attendance) {
            AttendanceStatus::Present => {
                present += 1;
                "P"
            }
            _ => {
                absent += 1;
                "A"
            }
        };
        let wanted = match status {
            StatusFilter::All => true,
            StatusFilter::Present => entry_status == "P",
            StatusFilter::Absent => entry_status == "A",
        };
        if wanted && narrowed.matches(record) {
            entries.push(RosterEntry {
                code: record.code.clone(),
                name: record.name.clone(),
                status: entry_status,
            });
        }
    }

    GroupRoster {
        group: group_name.to_string(),
        present,
        absent,
        records: entries,
    }
}

pub fn summary(table: &RecordTable) -> AttendanceSummary {
    let records = normalize::<AttendanceRecord>(table).records;
    let mut total_present = 0;
    let mut total_absent = 0;
    for record in &records {
        match AttendanceStatus::classify(&record.attendance) {
            AttendanceStatus::Present => total_present += 1,
            AttendanceStatus::Absent => total_absent += 1,
            AttendanceStatus::Unclassified => {}
        }
    }
    let total = total_present + total_absent;
    AttendanceSummary {
        total_present,
        total_absent,
        attendance_rate: percentage_of(total_present, total, 0),
        absence_rate: percentage_of(total_absent, total, 0),
    }
}
