//! Performance page: worked hours per group and department.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{choices, distinct_sorted};
use crate::aggregate::Grouped;
use crate::filter::{parse_date, Field, Filter, Predicate};
use crate::models::PerformanceRecord;
use crate::present::{paginate, sort_descending, Page};
use crate::rate::{percentage, percentage_of};
use crate::table::{normalize, RecordTable};

/// Shifts shorter than this count as low hours.
pub const FULL_SHIFT_HOURS: f64 = 8.0;
/// Days shown in a group's attendance series.
pub const SERIES_DAYS: usize = 10;
pub const NO_DEPARTMENT: &str = "(Sans département)";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    /// Comma-separated dates.
    pub dates: Option<String>,
    /// Comma-separated departments.
    pub departments: Option<String>,
    /// Substring of the group name.
    pub search: Option<String>,
    pub page: Option<usize>,
    /// Group to drill into.
    pub group: Option<String>,
    pub roster_dates: Option<String>,
    pub name: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRow {
    pub name: String,
    pub working_hours: f64,
    /// Department of the first matching record, only when date or
    /// department filters are active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    pub worker_count: u64,
    pub avg_daily_workload: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentHours {
    pub name: String,
    pub hours: f64,
    pub percentage: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LowHours {
    pub count: u64,
    pub total: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgCount {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgStats {
    pub total_count: u64,
    pub distribution: Vec<AgCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPresence {
    pub date: String,
    pub present: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthDates {
    /// `YYYY-MM`, or `Invalid` for unparseable dates.
    pub month: String,
    pub dates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDetail {
    pub group: String,
    pub attendance: Vec<DailyPresence>,
    pub dates_by_month: Vec<MonthDates>,
    pub workers: Vec<PerformanceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub groups: Page<GroupRow>,
    pub departments: Vec<DepartmentHours>,
    pub total_hours: f64,
    pub low_hours: LowHours,
    pub ag: AgStats,
    pub department_options: Vec<String>,
    pub dates_by_month: Vec<MonthDates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<GroupDetail>,
    pub skipped_rows: usize,
}

fn date(record: &PerformanceRecord) -> &str {
    &record.date
}

fn department(record: &PerformanceRecord) -> &str {
    &record.department
}

fn group(record: &PerformanceRecord) -> &str {
    &record.group
}

fn name(record: &PerformanceRecord) -> &str {
    &record.name
}

fn code(record: &PerformanceRecord) -> &str {
    &record.code
}

fn worked(record: &&PerformanceRecord) -> bool {
    record.hours > 0.0
}

pub fn build(table: &RecordTable, filters: &Filters) -> PerformanceReport {
    let normalized = normalize::<PerformanceRecord>(table);
    let records = &normalized.records;

    let dates = choices(&filters.dates);
    let departments = choices(&filters.departments);
    let search = filters.search.clone().unwrap_or_default();
    let table_filter = Filter::new()
        .with(Predicate::category(date, dates.clone()))
        .with(Predicate::category(department, departments.clone()))
        .with(Predicate::search(vec![group as Field<PerformanceRecord>], search.clone()));
    let in_view = table_filter.apply(records);

    let (department_hours, total_hours) = department_hours(&in_view);
    let low_hours = low_hours(&in_view);
    let ag = ag_stats(&in_view);

    let rows = if dates.is_active() || departments.is_active() {
        let narrowed = Filter::new()
            .with(Predicate::category(date, dates))
            .with(Predicate::category(department, departments));
        filtered_group_rows(records, &narrowed)
    } else {
        group_rows(records)
    };
    let needle = search.trim().to_lowercase();
    let rows: Vec<GroupRow> = rows
        .into_iter()
        .filter(|row| needle.is_empty() || row.name.to_lowercase().contains(&needle))
        .collect();

    let detail = filters
        .group
        .as_deref()
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(|g| group_detail(records, g, filters));

    PerformanceReport {
        groups: paginate(&rows, filters.page.unwrap_or(1)),
        departments: department_hours,
        total_hours,
        low_hours,
        ag,
        department_options: distinct_sorted(records.iter().map(department)),
        dates_by_month: dates_by_month(records.iter()),
        detail,
        skipped_rows: normalized.skipped,
    }
}

fn department_hours(records: &[&PerformanceRecord]) -> (Vec<DepartmentHours>, f64) {
    let mut grouped: Grouped<(f64, u64)> = Grouped::new();
    let mut total_hours = 0.0;
    for record in records.iter().copied().filter(worked) {
        let label = if record.department.is_empty() {
            NO_DEPARTMENT
        } else {
            record.department.as_str()
        };
        let entry = grouped.entry(label);
        entry.0 += record.hours;
        entry.1 += 1;
        total_hours += record.hours;
    }

    let mut rows: Vec<DepartmentHours> = grouped
        .into_iter()
        .map(|(name, (hours, count))| DepartmentHours {
            name,
            hours,
            percentage: percentage(hours, total_hours, 1),
            count,
        })
        .collect();
    sort_descending(&mut rows, |row| &row.hours);
    (rows, total_hours)
}

fn low_hours(records: &[&PerformanceRecord]) -> LowHours {
    let shifts: Vec<&PerformanceRecord> = records.iter().copied().filter(worked).collect();
    let count = shifts.iter().filter(|r| r.hours < FULL_SHIFT_HOURS).count() as u64;
    let total = shifts.len() as u64;
    LowHours {
        count,
        total,
        percentage: percentage_of(count, total, 1),
    }
}

fn ag_stats(records: &[&PerformanceRecord]) -> AgStats {
    let mut grouped: Grouped<u64> = Grouped::new();
    let mut total_count = 0;
    for record in records {
        let value = record.ag.trim();
        if value.parse::<f64>().map_or(false, |ag| ag > 0.0) {
            total_count += 1;
            *grouped.entry(value) += 1;
        }
    }

    let mut distribution: Vec<AgCount> = grouped
        .into_iter()
        .map(|(value, count)| AgCount { value, count })
        .collect();
    distribution.sort_by(|a, b| {
        let a = a.value.parse::<f64>().unwrap_or(0.0);
        let b = b.value.parse::<f64>().unwrap_or(0.0);
        a.partial_cmp(&b).unwrap_or(Ordering::Equal)
    });

    AgStats {
        total_count,
        distribution,
    }
}

/// Workload per group over all records with hours: worked shifts and shifts
/// per distinct date.
fn workloads(records: &[PerformanceRecord]) -> HashMap<&str, (u64, f64)> {
    let mut shifts: HashMap<&str, (u64, BTreeSet<&str>)> = HashMap::new();
    for record in records.iter().filter(worked) {
        let entry = shifts.entry(record.group.as_str()).or_default();
        entry.0 += 1;
        entry.1.insert(record.date.as_str());
    }
    shifts
        .into_iter()
        .map(|(group, (count, dates))| {
            let per_day = if dates.is_empty() {
                0.0
            } else {
                count as f64 / dates.len() as f64
            };
            (group, (count, per_day))
        })
        .collect()
}

/// Every group seen, with its total hours, sorted by name.
fn group_rows(records: &[PerformanceRecord]) -> Vec<GroupRow> {
    let loads = workloads(records);
    let mut hours: Grouped<f64> = Grouped::new();
    for record in records {
        let total = hours.entry(&record.group);
        if record.hours > 0.0 {
            *total += record.hours;
        }
    }
    let mut rows: Vec<GroupRow> = hours
        .into_iter()
        .map(|(name, working_hours)| {
            let (worker_count, avg_daily_workload) = loads.get(name.as_str()).copied().unwrap_or((0, 0.0));
            GroupRow {
                name,
                working_hours,
                department: None,
                worker_count,
                avg_daily_workload,
            }
        })
        .collect();
    rows.sort_by(|a, b| compare_names(&a.name, &b.name));
    rows
}

/// Groups with worked hours among the records passing `filter`.
fn filtered_group_rows(records: &[PerformanceRecord], filter: &Filter<PerformanceRecord>) -> Vec<GroupRow> {
    let loads = workloads(records);
    let mut hours: Grouped<(f64, String)> = Grouped::new();
    for record in filter.apply(records).into_iter().filter(worked) {
        let entry = hours.entry(&record.group);
        if entry.0 == 0.0 && entry.1.is_empty() {
            entry.1 = record.department.clone();
        }
        entry.0 += record.hours;
    }
    let mut rows: Vec<GroupRow> = hours
        .into_iter()
        .map(|(name, (working_hours, department))| {
            let (worker_count, avg_daily_workload) = loads.get(name.as_str()).copied().unwrap_or((0, 0.0));
            GroupRow {
                name,
                working_hours,
                department: Some(department),
                worker_count,
                avg_daily_workload,
            }
        })
        .collect();
    rows.sort_by(|a, b| compare_names(&a.name, &b.name));
    rows
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

fn dates_by_month<'a, I>(records: I) -> Vec<MonthDates>
where
    I: IntoIterator<Item = &'a PerformanceRecord>,
{
    let mut months: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for record in records {
        let month = match parse_date(&record.date) {
            Some(day) => day.format("%Y-%m").to_string(),
            None => "Invalid".to_string(),
        };
        months.entry(month).or_default().insert(record.date.clone());
    }
    months
        .into_iter()
        .rev()
        .map(|(month, dates)| MonthDates {
            month,
            dates: dates.into_iter().rev().collect(),
        })
        .collect()
}

fn group_detail(records: &[PerformanceRecord], group_name: &str, filters: &Filters) -> GroupDetail {
    let members: Vec<&PerformanceRecord> = records.iter().filter(|r| r.group == group_name).collect();

    let roster_size = members.iter().map(|r| r.code.as_str()).collect::<BTreeSet<_>>().len();
    let days: BTreeSet<&str> = members.iter().map(|r| r.date.as_str()).collect();
    let attendance = days
        .iter()
        .rev()
        .take(SERIES_DAYS)
        .rev()
        .map(|day| DailyPresence {
            date: day.to_string(),
            present: members.iter().filter(|r| r.date == *day && r.hours > 0.0).count(),
            total: roster_size,
        })
        .collect();

    let roster_filter = Filter::new()
        .with(Predicate::category(date, choices(&filters.roster_dates)))
        .with(Predicate::search(
            vec![name as Field<PerformanceRecord>],
            filters.name.clone().unwrap_or_default(),
        ))
        .with(Predicate::search(
            vec![code as Field<PerformanceRecord>],
            filters.code.clone().unwrap_or_default(),
        ));
    let workers = members
        .iter()
        .copied()
        .filter(worked)
        .filter(|r| roster_filter.matches(r))
        .cloned()
        .collect();

    GroupDetail {
        group: group_name.to_string(),
        attendance,
        dates_by_month: dates_by_month(members.iter().copied()),
        workers,
    }
}
