//! Filter Pipeline
//!
//! A filter is an unordered conjunction of predicates. Inactive predicates
//! (empty selection, blank search, `"all"`) impose no constraint, so an empty
//! filter and a filter of inactive predicates select the same records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Sentinel used by every page's dropdowns for "no restriction".
pub const ALL: &str = "all";

// ============================================================================
// Selections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Selection {
    #[default]
    All,
    Only(String),
    AnyOf(BTreeSet<String>),
}

impl Selection {
    /// Single-value dropdown parameter.
    pub fn from_param(param: Option<&str>) -> Self {
        match param.map(str::trim) {
            None | Some("") => Selection::All,
            Some(value) if value.eq_ignore_ascii_case(ALL) => Selection::All,
            Some(value) => Selection::Only(value.to_string()),
        }
    }

    /// Multi-select parameter; an empty set selects everything.
    pub fn any_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = values
            .into_iter()
            .map(Into::into)
            .filter(|value| !value.is_empty())
            .collect();
        if set.is_empty() {
            Selection::All
        } else {
            Selection::AnyOf(set)
        }
    }

    /// Comma-separated multi-select parameter (`?departments=A,B`).
    pub fn from_list(param: Option<&str>) -> Self {
        match param {
            Some(list) => Selection::any_of(list.split(',').map(str::trim)),
            None => Selection::All,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Selection::All)
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(expected) => expected == value,
            Selection::AnyOf(set) => set.contains(value),
        }
    }
}

// ============================================================================
// Date ranges
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn is_active(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// `start <= date <= end`, open bounds always hold.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| start <= date) && self.end.map_or(true, |end| date <= end)
    }

    /// A tenure overlaps the range when it began before the end and has not
    /// finished before the start. A missing exit means still active.
    pub fn overlaps(&self, entry: NaiveDate, exit: Option<NaiveDate>) -> bool {
        let started_in_time = self.end.map_or(true, |end| entry <= end);
        let still_there = match (exit, self.start) {
            (None, _) | (_, None) => true,
            (Some(exit), Some(start)) => exit >= start,
        };
        started_in_time && still_there
    }
}

// ============================================================================
// Predicates
// ============================================================================

pub type Field<T> = fn(&T) -> &str;

pub enum Predicate<T> {
    /// Equality or set membership on one categorical field.
    Category { field: Field<T>, selection: Selection },
    /// Case-insensitive substring match on any of several fields.
    Search { fields: Vec<Field<T>>, query: String },
    /// Record date inside the range. Records without a date never match an
    /// active range.
    Date {
        date: fn(&T) -> Option<NaiveDate>,
        range: DateRange,
    },
    /// Tenure overlapping the range.
    Tenure {
        entry: fn(&T) -> Option<NaiveDate>,
        exit: fn(&T) -> Option<NaiveDate>,
        range: DateRange,
    },
}

impl<T> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        match self {
            Predicate::Category { field, selection } => Predicate::Category {
                field: *field,
                selection: selection.clone(),
            },
            Predicate::Search { fields, query } => Predicate::Search {
                fields: fields.clone(),
                query: query.clone(),
            },
            Predicate::Date { date, range } => Predicate::Date {
                date: *date,
                range: *range,
            },
            Predicate::Tenure { entry, exit, range } => Predicate::Tenure {
                entry: *entry,
                exit: *exit,
                range: *range,
            },
        }
    }
}

impl<T> Predicate<T> {
    pub fn category(field: Field<T>, selection: Selection) -> Self {
        Predicate::Category { field, selection }
    }

    pub fn search(fields: Vec<Field<T>>, query: impl Into<String>) -> Self {
        Predicate::Search {
            fields,
            query: query.into(),
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            Predicate::Category { selection, .. } => selection.is_active(),
            Predicate::Search { query, .. } => !query.trim().is_empty(),
            Predicate::Date { range, .. } | Predicate::Tenure { range, .. } => range.is_active(),
        }
    }

    pub fn matches(&self, record: &T) -> bool {
        if !self.is_active() {
            return true;
        }
        match self {
            Predicate::Category { field, selection } => selection.matches(field(record)),
            Predicate::Search { fields, query } => {
                let needle = query.trim().to_lowercase();
                fields
                    .iter()
                    .any(|field| field(record).to_lowercase().contains(&needle))
            }
            Predicate::Date { date, range } => date(record).map_or(false, |d| range.contains(d)),
            Predicate::Tenure { entry, exit, range } => match entry(record) {
                Some(entry) => range.overlaps(entry, exit(record)),
                None => false,
            },
        }
    }
}

// ============================================================================
// Filter
// ============================================================================

pub struct Filter<T> {
    predicates: Vec<Predicate<T>>,
}

impl<T> Default for Filter<T> {
    fn default() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self {
            predicates: self.predicates.clone(),
        }
    }
}

impl<T> Filter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, predicate: Predicate<T>) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn active_count(&self) -> usize {
        self.predicates.iter().filter(|p| p.is_active()).count()
    }

    pub fn matches(&self, record: &T) -> bool {
        self.predicates.iter().all(|predicate| predicate.matches(record))
    }

    pub fn apply<'a>(&self, records: &'a [T]) -> Vec<&'a T> {
        records.iter().filter(|record| self.matches(record)).collect()
    }
}

impl<T> From<Vec<Predicate<T>>> for Filter<T> {
    fn from(predicates: Vec<Predicate<T>>) -> Self {
        Self { predicates }
    }
}

/// Lenient ISO date parse for sheet and roster cells (`2024-05-01`, or the
/// date part of a timestamp).
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let head = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    #[derive(Debug, Clone, PartialEq)]
    struct Worker {
        name: String,
        group: String,
        contract: String,
        hired: Option<NaiveDate>,
        left: Option<NaiveDate>,
    }

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn name(w: &Worker) -> &str {
        &w.name
    }

    fn group(w: &Worker) -> &str {
        &w.group
    }

    fn contract(w: &Worker) -> &str {
        &w.contract
    }

    fn hired(w: &Worker) -> Option<NaiveDate> {
        w.hired
    }

    fn left(w: &Worker) -> Option<NaiveDate> {
        w.left
    }

    fn workers(rng: &mut StdRng, n: usize) -> Vec<Worker> {
        let groups = ["G1", "G2", "G3"];
        let contracts = ["CDD", "CDI"];
        let names = ["Ana", "Luis", "Marta", "Pedro", "Zoe"];
        (0..n)
            .map(|_| {
                let hired = NaiveDate::from_ymd_opt(2023, rng.gen_range(1..=12), rng.gen_range(1..=28));
                let left = if rng.gen_bool(0.4) {
                    NaiveDate::from_ymd_opt(2024, rng.gen_range(1..=12), rng.gen_range(1..=28))
                } else {
                    None
                };
                Worker {
                    name: names[rng.gen_range(0..names.len())].to_string(),
                    group: groups[rng.gen_range(0..groups.len())].to_string(),
                    contract: contracts[rng.gen_range(0..contracts.len())].to_string(),
                    hired,
                    left,
                }
            })
            .collect()
    }

    fn predicates() -> Vec<Predicate<Worker>> {
        vec![
            Predicate::category(group, Selection::any_of(["G1", "G2"])),
            Predicate::category(contract, Selection::from_param(Some("CDD"))),
            Predicate::search(vec![name as Field<Worker>], "a"),
            Predicate::Tenure {
                entry: hired,
                exit: left,
                range: DateRange::new(date("2023-06-01"), date("2024-03-31")),
            },
        ]
    }

    #[test]
    fn test_selection_sentinels() {
        assert_eq!(Selection::from_param(None), Selection::All);
        assert_eq!(Selection::from_param(Some("  ")), Selection::All);
        assert_eq!(Selection::from_param(Some("all")), Selection::All);
        assert_eq!(Selection::from_list(Some(",,")), Selection::All);
        assert!(Selection::from_list(Some("A, B")).matches("B"));
        assert!(!Selection::from_param(Some("A")).matches("a"));
    }

    #[test]
    fn test_conjunction_is_commutative() {
        let mut rng = StdRng::seed_from_u64(42);
        let records = workers(&mut rng, 200);
        let baseline = Filter::from(predicates()).apply(&records);
        assert!(!baseline.is_empty());

        for _ in 0..25 {
            let mut shuffled = predicates();
            shuffled.shuffle(&mut rng);
            assert_eq!(Filter::from(shuffled).apply(&records), baseline);
        }
    }

    #[test]
    fn test_inactive_filters_select_everything() {
        let mut rng = StdRng::seed_from_u64(7);
        let records = workers(&mut rng, 50);
        let inactive = Filter::new()
            .with(Predicate::category(group, Selection::from_param(Some("all"))))
            .with(Predicate::category(contract, Selection::any_of(Vec::<String>::new())))
            .with(Predicate::search(vec![name as Field<Worker>], "   "))
            .with(Predicate::Date {
                date: hired,
                range: DateRange::default(),
            });

        assert_eq!(inactive.active_count(), 0);
        assert_eq!(inactive.apply(&records), Filter::new().apply(&records));
        assert_eq!(inactive.apply(&records).len(), records.len());
    }

    #[test]
    fn test_search_is_case_insensitive_any_field() {
        let worker = Worker {
            name: "Marta".into(),
            group: "North".into(),
            contract: "CDI".into(),
            hired: None,
            left: None,
        };
        let search = Predicate::search(vec![name as Field<Worker>, group], "NOR");
        assert!(search.matches(&worker));
        assert!(!Predicate::search(vec![name as Field<Worker>], "nor").matches(&worker));
    }

    #[test]
    fn test_open_tenure_satisfies_upper_bound() {
        let range = DateRange::new(date("2024-01-01"), date("2024-01-31"));
        assert!(range.overlaps(date("2023-05-01"), None));
        assert!(range.overlaps(date("2023-05-01"), Some(date("2024-01-01"))));
        assert!(!range.overlaps(date("2023-05-01"), Some(date("2023-12-31"))));
        assert!(!range.overlaps(date("2024-02-01"), None));
        assert!(range.contains(date("2024-01-31")));
        assert!(!range.contains(date("2024-02-01")));
    }

    #[test]
    fn test_parse_date_accepts_timestamps() {
        assert_eq!(parse_date("2024-05-01T00:00:00.000Z"), Some(date("2024-05-01")));
        assert_eq!(parse_date("01/05/2024"), None);
    }
}
