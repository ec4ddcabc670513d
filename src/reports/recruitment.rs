//! Recruitment page.

use serde::{Deserialize, Serialize};

use super::{choice, distinct_by_number, distinct_sorted};
use crate::aggregate::sum_by;
use crate::filter::{Filter, Predicate};
use crate::models::RecruitmentRecord;
use crate::present::{ranked, top_n, unranked, NamedValue};
use crate::table::{normalize, RecordTable};

pub const TOP_DEPARTMENTS: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Filters {
    pub department: Option<String>,
    pub source: Option<String>,
    pub month: Option<String>,
    pub sector: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthRecruits {
    pub month: String,
    pub recruits: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub departments: Vec<String>,
    pub sources: Vec<String>,
    pub months: Vec<String>,
    pub sectors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecruitmentReport {
    pub total_recruits: u64,
    pub temporary_recruits: u64,
    pub permanent_recruits: u64,
    pub unique_department_count: usize,
    pub unique_source_count: usize,
    pub unique_interim_types: usize,
    pub by_department: Vec<NamedValue>,
    pub by_source: Vec<NamedValue>,
    pub by_sector: Vec<NamedValue>,
    pub by_interim: Vec<NamedValue>,
    pub by_month: Vec<MonthRecruits>,
    pub options: FilterOptions,
    pub skipped_rows: usize,
}

fn department(record: &RecruitmentRecord) -> &str {
    &record.department
}

fn source(record: &RecruitmentRecord) -> &str {
    &record.source
}

fn month(record: &RecruitmentRecord) -> &str {
    &record.month
}

fn sector(record: &RecruitmentRecord) -> &str {
    &record.sector
}

fn interim(record: &RecruitmentRecord) -> &str {
    &record.interim
}

fn count(record: &RecruitmentRecord) -> u64 {
    record.count
}

pub fn build(table: &RecordTable, filters: &Filters) -> RecruitmentReport {
    let normalized = normalize::<RecruitmentRecord>(table);
    let records = &normalized.records;

    let filter = Filter::new()
        .with(Predicate::category(department, choice(&filters.department)))
        .with(Predicate::category(source, choice(&filters.source)))
        .with(Predicate::category(month, choice(&filters.month)))
        .with(Predicate::category(sector, choice(&filters.sector)));
    let selected = filter.apply(records);

    let total_recruits: u64 = selected.iter().map(|r| r.count).sum();
    let by_department = sum_by(selected.iter().copied(), department, count);
    let by_source = sum_by(selected.iter().copied(), source, count);
    let by_sector = sum_by(selected.iter().copied(), sector, count);
    let by_interim = sum_by(selected.iter().copied(), interim, count);
    let by_month = sum_by(selected.iter().copied(), month, count);

    let temporary_recruits = ["Oui", "OUI"]
        .iter()
        .filter_map(|label| by_interim.get(label).copied())
        .find(|recruits| *recruits > 0)
        .unwrap_or(0);

    RecruitmentReport {
        total_recruits,
        temporary_recruits,
        permanent_recruits: total_recruits.saturating_sub(temporary_recruits),
        unique_department_count: by_department.len(),
        unique_source_count: by_source.len(),
        unique_interim_types: by_interim.len(),
        by_month: (1..=12)
            .map(|n: u32| MonthRecruits {
                month: format!("Mois {n}"),
                recruits: by_month.get(&n.to_string()).copied().unwrap_or(0),
            })
            .collect(),
        by_department: top_n(by_department, TOP_DEPARTMENTS),
        by_source: ranked(by_source),
        by_sector: ranked(by_sector),
        by_interim: unranked(by_interim),
        options: FilterOptions {
            departments: distinct_sorted(records.iter().map(department)),
            sources: distinct_sorted(records.iter().map(source)),
            months: distinct_by_number(records.iter().map(month)),
            sectors: distinct_sorted(records.iter().map(sector)),
        },
        skipped_rows: normalized.skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> RecordTable {
        RecordTable::from_value(json!([
            ["date", "semaine", "qz", "mois", "dept", "secteur", "source", "interim", "nbr"],
            ["2024-01-03", 1, "QZ1", 1, "Campo", "S1", "ETT", "Oui", 4],
            ["2024-01-10", 2, "QZ1", 1, "Almacen", "S2", "Directo", "Non", 2],
            ["2024-02-07", 6, "QZ2", 2, "Campo", "S1", "Directo", "Non", "3 pers"],
            ["2024-02-14", 7, "QZ2", 2, "", "S1", "ETT", "Oui", 9],
            ["2024-03-01", 9, "QZ2", 3, "Campo", "S1", "ETT"]
        ]))
        .unwrap()
    }

    #[test]
    fn test_totals_and_series() {
        let report = build(&sample(), &Filters::default());
        assert_eq!(report.total_recruits, 9);
        assert_eq!(report.temporary_recruits, 4);
        assert_eq!(report.permanent_recruits, 5);
        assert_eq!(report.skipped_rows, 2);
        assert_eq!(report.by_department[0], NamedValue::new("Campo", 7));
        assert_eq!(report.by_source[0], NamedValue::new("Directo", 5));
        assert_eq!(report.by_month.len(), 12);
        assert_eq!(report.by_month[1], MonthRecruits { month: "Mois 2".into(), recruits: 3 });
        assert_eq!(report.by_month[11].recruits, 0);
        assert_eq!(report.options.months, vec!["1", "2"]);
    }

    #[test]
    fn test_filters_combine() {
        let filters = Filters {
            department: Some("Campo".into()),
            source: Some("Directo".into()),
            ..Filters::default()
        };
        let report = build(&sample(), &filters);
        assert_eq!(report.total_recruits, 3);
        assert_eq!(report.temporary_recruits, 0);
        assert_eq!(report.unique_department_count, 1);
        assert_eq!(report.options.departments, vec!["Almacen", "Campo"]);
    }

    #[test]
    fn test_blank_selections_match_defaults() {
        let table = sample();
        let expected = serde_json::to_value(build(&table, &Filters::default())).unwrap();
        for sentinel in ["all", "All", ""] {
            let filters = Filters {
                department: Some(sentinel.into()),
                source: Some(sentinel.into()),
                month: Some(sentinel.into()),
                sector: Some(sentinel.into()),
            };
            let report = serde_json::to_value(build(&table, &filters)).unwrap();
            assert_eq!(report, expected, "sentinel {sentinel:?}");
        }
    }
}
