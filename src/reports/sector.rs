//! Sector page: roster analytics across farms.
//!
//! Unlike the sheet-backed pages this works on a worker roster posted as JSON.
//! Ages and open tenures are measured against an explicit `as_of` date.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::aggregate::{count_by, AgeDistribution, Grouped};
use crate::filter::{parse_date, DateRange, Filter, Predicate, Selection};
use crate::present::{top_n, unranked, NamedValue};
use crate::rate::{percentage_of, round_to};
use crate::table::parse_int_prefix;

pub const TOP_SUPERVISORS: usize = 10;
pub const TOP_EXIT_REASONS: usize = 10;
/// Default look-back when no range is given.
pub const DEFAULT_RANGE_MONTHS: u32 = 6;
pub const UNASSIGNED: &str = "Unassigned";
pub const ACTIVE_STATUS: &str = "actif";

const MONTHS_SHORT_FR: [&str; 12] = [
    "Jan", "Fév", "Mar", "Avr", "Mai", "Juin", "Juil", "Août", "Sep", "Oct", "Nov", "Déc",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Worker {
    pub id: String,
    pub name: String,
    pub sex: String,
    pub birth_date: String,
    pub entry_date: String,
    pub exit_date: String,
    pub exit_reason: String,
    pub supervisor_id: String,
    pub farm_id: String,
    pub status: String,
}

impl Worker {
    fn entry(&self) -> Option<NaiveDate> {
        parse_date(&self.entry_date)
    }

    fn exit(&self) -> Option<NaiveDate> {
        parse_date(&self.exit_date)
    }

    fn birth_year(&self) -> Option<i32> {
        let year = self.birth_date.split('-').next()?;
        parse_int_prefix(year).and_then(|y| i32::try_from(y).ok())
    }

    /// Age in calendar years at `as_of`, ignoring the birthday.
    pub fn age_at(&self, as_of: NaiveDate) -> Option<i32> {
        self.birth_year().map(|year| as_of.year() - year)
    }

    /// Days between entry and exit (or `as_of` while still employed).
    pub fn tenure_days(&self, as_of: NaiveDate) -> Option<i64> {
        let entry = self.entry()?;
        let end = self.exit().unwrap_or(as_of);
        Some((end - entry).num_days().abs())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Named {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Filters {
    /// Farm ids; empty selects every farm.
    pub farms: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Year of the 12-month series; defaults to the `as_of` year.
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectorRequest {
    pub workers: Vec<Worker>,
    pub farms: Vec<Named>,
    pub supervisors: Vec<Named>,
    pub filters: Filters,
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthRate {
    pub month: String,
    pub turnover: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitReason {
    pub reason: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmOverview {
    pub id: String,
    pub name: String,
    pub active_workers: usize,
    pub total_workers: usize,
    pub average_tenure_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_workers: usize,
    pub average_age: f64,
    pub turnover_rate: f64,
    pub average_tenure_days: i64,
    pub supervisors: Vec<NamedValue>,
    pub gender: Vec<NamedValue>,
    pub age_buckets: Vec<NamedValue>,
    pub exit_reasons: Vec<ExitReason>,
    pub monthly_turnover: Vec<MonthRate>,
    pub year: i32,
    pub yearly_turnover: Vec<MonthRate>,
    pub available_years: Vec<i32>,
    pub farms: Vec<FarmOverview>,
}

fn farm(worker: &Worker) -> &str {
    &worker.farm_id
}

fn entry(worker: &Worker) -> Option<NaiveDate> {
    worker.entry()
}

fn exit(worker: &Worker) -> Option<NaiveDate> {
    worker.exit()
}

fn gender_label(sex: &str) -> &'static str {
    match sex.to_lowercase().as_str() {
        "homme" => "Male",
        "femme" => "Female",
        _ => "Unknown",
    }
}

pub fn build(request: &SectorRequest, as_of: NaiveDate) -> SectorReport {
    let filters = &request.filters;
    let end = filters.end_date.unwrap_or(as_of);
    let start = filters.start_date.unwrap_or_else(|| {
        end.checked_sub_months(Months::new(DEFAULT_RANGE_MONTHS))
            .unwrap_or(end)
    });
    let range = DateRange::new(start, end);

    let farms = Selection::any_of(filters.farms.iter().cloned());
    let in_farms = Filter::new().with(Predicate::category(farm, farms.clone()));
    let in_range = in_farms.clone().with(Predicate::Tenure { entry, exit, range });

    let selected = in_farms.apply(&request.workers);
    let workers = in_range.apply(&request.workers);

    let supervisor_names: HashMap<&str, &str> = request
        .supervisors
        .iter()
        .map(|s| (s.id.as_str(), s.name.as_str()))
        .collect();

    let year = filters.year.unwrap_or_else(|| as_of.year());

    SectorReport {
        start_date: start,
        end_date: end,
        total_workers: workers.len(),
        average_age: average_age(&workers, as_of),
        turnover_rate: exit_rate(&workers, range),
        average_tenure_days: average_tenure(&workers, as_of),
        supervisors: supervisor_chart(&workers, &supervisor_names),
        // One slice per mapped label: `Femme` and `femme` count together.
        gender: unranked(count_by(workers.iter().copied(), |w| gender_label(&w.sex))),
        age_buckets: age_buckets(&workers, as_of),
        exit_reasons: exit_reasons(&workers),
        monthly_turnover: range_turnover(&workers, start, end),
        year,
        yearly_turnover: yearly_turnover(&selected, year),
        available_years: available_years(&selected),
        farms: farm_overview(request, &farms, as_of),
    }
}

/// Sum of known ages over every worker in view, workers without a birth date
/// included in the divisor.
fn average_age(workers: &[&Worker], as_of: NaiveDate) -> f64 {
    if workers.is_empty() {
        return 0.0;
    }
    let total: i64 = workers
        .iter()
        .filter_map(|w| w.age_at(as_of))
        .map(i64::from)
        .sum();
    round_to(total as f64 / workers.len() as f64, 0)
}

/// Share of workers in view who left within the range.
fn exit_rate(workers: &[&Worker], range: DateRange) -> f64 {
    let exits = workers
        .iter()
        .filter(|w| w.exit().map_or(false, |d| range.contains(d)))
        .count();
    percentage_of(exits as u64, workers.len() as u64, 2)
}

fn average_tenure(workers: &[&Worker], as_of: NaiveDate) -> i64 {
    let tenures: Vec<i64> = workers.iter().filter_map(|w| w.tenure_days(as_of)).collect();
    if tenures.is_empty() {
        return 0;
    }
    round_to(tenures.iter().sum::<i64>() as f64 / tenures.len() as f64, 0) as i64
}

fn supervisor_chart(workers: &[&Worker], names: &HashMap<&str, &str>) -> Vec<NamedValue> {
    let grouped = count_by(workers.iter().copied(), |w| {
        if w.supervisor_id.is_empty() {
            UNASSIGNED
        } else {
            w.supervisor_id.as_str()
        }
    });
    top_n(grouped, TOP_SUPERVISORS)
        .into_iter()
        .map(|item| match names.get(item.name.as_str()) {
            Some(name) if item.name != UNASSIGNED => NamedValue::new(*name, item.value),
            _ => item,
        })
        .collect()
}

fn age_buckets(workers: &[&Worker], as_of: NaiveDate) -> Vec<NamedValue> {
    let mut distribution = AgeDistribution::default();
    for age in workers.iter().filter_map(|w| w.age_at(as_of)) {
        distribution.add_age(f64::from(age));
    }
    distribution
        .buckets()
        .map(|(bucket, count)| NamedValue::new(bucket.label(), count))
        .collect()
}

fn exit_reasons(workers: &[&Worker]) -> Vec<ExitReason> {
    let leavers = workers
        .iter()
        .copied()
        .filter(|w| !w.exit_date.is_empty() && !w.exit_reason.is_empty());
    top_n(count_by(leavers, |w| w.exit_reason.as_str()), TOP_EXIT_REASONS)
        .into_iter()
        .map(|item| ExitReason {
            reason: item.name,
            count: item.value,
        })
        .collect()
}

fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last = first.checked_add_months(Months::new(1))?.pred_opt()?;
    Some((first, last))
}

/// Departures over active headcount for one calendar month.
fn month_rate(workers: &[&Worker], first: NaiveDate, last: NaiveDate) -> f64 {
    let mut active = 0u64;
    let mut departures = 0u64;
    for worker in workers {
        let Some(entry) = worker.entry() else {
            continue;
        };
        let exit = worker.exit();
        if entry <= last && exit.map_or(true, |d| d >= first) {
            active += 1;
        }
        if exit.map_or(false, |d| d >= first && d <= last) {
            departures += 1;
        }
    }
    percentage_of(departures, active, 2)
}

/// One point per month stepping from `start` while the step stays within
/// `end`.
fn range_turnover(workers: &[&Worker], start: NaiveDate, end: NaiveDate) -> Vec<MonthRate> {
    let mut series = Vec::new();
    let mut step = 0;
    while let Some(cursor) = start.checked_add_months(Months::new(step)) {
        if cursor > end {
            break;
        }
        if let Some((first, last)) = month_bounds(cursor.year(), cursor.month()) {
            series.push(MonthRate {
                month: cursor.format("%Y-%m").to_string(),
                turnover: month_rate(workers, first, last),
            });
        }
        step += 1;
    }
    series
}

fn yearly_turnover(workers: &[&Worker], year: i32) -> Vec<MonthRate> {
    (1..=12u32)
        .filter_map(|month| {
            let (first, last) = month_bounds(year, month)?;
            Some(MonthRate {
                month: MONTHS_SHORT_FR[(month - 1) as usize].to_string(),
                turnover: month_rate(workers, first, last),
            })
        })
        .collect()
}

fn available_years(workers: &[&Worker]) -> Vec<i32> {
    let years: BTreeSet<i32> = workers
        .iter()
        .flat_map(|w| [w.entry(), w.exit()])
        .flatten()
        .map(|d| d.year())
        .collect();
    years.into_iter().rev().collect()
}

fn farm_overview(request: &SectorRequest, selection: &Selection, as_of: NaiveDate) -> Vec<FarmOverview> {
    let mut farms: Vec<Named> = request.farms.clone();
    if farms.is_empty() {
        let mut seen: Grouped<()> = Grouped::new();
        for worker in &request.workers {
            seen.entry(&worker.farm_id);
        }
        farms = seen
            .keys()
            .map(|id| Named {
                id: id.to_string(),
                name: id.to_string(),
            })
            .collect();
    }

    farms
        .into_iter()
        .filter(|f| selection.matches(&f.id))
        .map(|f| {
            let workers: Vec<&Worker> = request.workers.iter().filter(|w| w.farm_id == f.id).collect();
            FarmOverview {
                active_workers: workers.iter().filter(|w| w.status == ACTIVE_STATUS).count(),
                total_workers: workers.len(),
                average_tenure_days: average_tenure(&workers, as_of),
                id: f.id,
                name: f.name,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn worker(id: &str, farm: &str, sex: &str, birth: &str, entry: &str, exit: &str, reason: &str, supervisor: &str) -> Worker {
        Worker {
            id: id.into(),
            name: format!("Worker {id}"),
            sex: sex.into(),
            birth_date: birth.into(),
            entry_date: entry.into(),
            exit_date: exit.into(),
            exit_reason: reason.into(),
            supervisor_id: supervisor.into(),
            farm_id: farm.into(),
            status: if exit.is_empty() { "actif".into() } else { "inactif".into() },
        }
    }

    fn request() -> SectorRequest {
        SectorRequest {
            workers: vec![
                worker("1", "F1", "homme", "1990-04-02", "2023-01-10", "", "", "S1"),
                worker("2", "F1", "Femme", "2000-01-01", "2023-06-01", "2024-02-15", "Fin contrat", "S1"),
                worker("3", "F2", "", "1970-07-07", "2022-03-01", "2023-03-01", "Abandon", ""),
                worker("4", "F2", "femme", "", "2024-01-05", "2024-03-20", "Fin contrat", "S2"),
                worker("5", "F1", "homme", "2008-05-05", "2025-01-01", "", "", "S2"),
            ],
            farms: vec![
                Named { id: "F1".into(), name: "Ferme Nord".into() },
                Named { id: "F2".into(), name: "Ferme Sud".into() },
            ],
            supervisors: vec![Named { id: "S1".into(), name: "Karim".into() }],
            filters: Filters {
                farms: vec![],
                start_date: Some(date("2024-01-01")),
                end_date: Some(date("2024-03-31")),
                year: Some(2024),
            },
            as_of: None,
        }
    }

    #[test]
    fn test_range_selection_and_headline_figures() {
        let report = build(&request(), date("2024-06-30"));
        // 3 left before the range, 5 joined after it
        assert_eq!(report.total_workers, 3);
        // ages 34 + 24, worker 4 has no birth date
        assert_eq!(report.average_age, 19.0);
        assert_eq!(report.turnover_rate, 66.67);
        assert_eq!(
            report.gender,
            vec![NamedValue::new("Male", 1), NamedValue::new("Female", 2)]
        );
        assert_eq!(report.supervisors[0], NamedValue::new("Karim", 2));
        assert_eq!(report.supervisors[1], NamedValue::new("S2", 1));
        assert_eq!(
            report.exit_reasons,
            vec![ExitReason { reason: "Fin contrat".into(), count: 2 }]
        );
    }

    #[test]
    fn test_monthly_series() {
        let report = build(&request(), date("2024-06-30"));
        let months: Vec<&str> = report.monthly_turnover.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, vec!["2024-01", "2024-02", "2024-03"]);
        // February: workers 1, 2, 4 active, worker 2 leaves
        assert_eq!(report.monthly_turnover[1].turnover, 33.33);

        assert_eq!(report.yearly_turnover.len(), 12);
        assert_eq!(report.yearly_turnover[1].month, "Fév");
        assert_eq!(report.yearly_turnover[2].turnover, 50.0);
        assert_eq!(report.available_years, vec![2025, 2024, 2023, 2022]);
    }

    #[test]
    fn test_farm_selection_and_overview() {
        let mut request = request();
        request.filters.farms = vec!["F2".into()];
        let report = build(&request, date("2024-06-30"));
        assert_eq!(report.total_workers, 1);
        assert_eq!(report.farms.len(), 1);
        assert_eq!(report.farms[0].name, "Ferme Sud");
        assert_eq!(report.farms[0].active_workers, 0);
        // 365 days and 75 days
        assert_eq!(report.farms[0].average_tenure_days, 220);
    }

    #[test]
    fn test_empty_roster() {
        let report = build(&SectorRequest::default(), date("2024-06-30"));
        assert_eq!(report.total_workers, 0);
        assert_eq!(report.turnover_rate, 0.0);
        assert_eq!(report.average_age, 0.0);
        assert_eq!(report.start_date, date("2023-12-30"));
        assert_eq!(report.monthly_turnover.len(), 7);
    }

    #[test]
    fn test_supervisor_chart_keeps_top_ten() {
        let mut workers = vec![worker("u", "F1", "", "", "2024-01-01", "", "", "")];
        for i in 1..=15 {
            workers.push(worker(&format!("w{i}"), "F1", "", "", "2024-01-01", "", "", &format!("S{i:02}")));
        }
        workers.push(worker("x1", "F1", "", "", "2024-01-01", "", "", "S03"));
        workers.push(worker("x2", "F1", "", "", "2024-01-01", "", "", "S07"));
        workers.push(worker("x3", "F1", "", "", "2024-01-01", "", "", "S03"));
        let refs: Vec<&Worker> = workers.iter().collect();
        let names = HashMap::from([("S03", "Karim"), (UNASSIGNED, "Nobody")]);

        let chart = supervisor_chart(&refs, &names);
        let labels: Vec<(&str, u64)> = chart.iter().map(|c| (c.name.as_str(), c.value)).collect();
        assert_eq!(
            labels,
            vec![
                ("Karim", 3),
                ("S07", 2),
                (UNASSIGNED, 1),
                ("S01", 1),
                ("S02", 1),
                ("S04", 1),
                ("S05", 1),
                ("S06", 1),
                ("S08", 1),
                ("S09", 1),
            ]
        );
    }
}
