//! Page reports
//!
//! One module per dashboard page. Each runs normalize, filter, aggregate,
//! rate and presentation against its sheet layout and returns a serializable
//! view model.

pub mod attendance;
pub mod performance;
pub mod recruitment;
pub mod sector;
pub mod sortie;
pub mod turnover;
pub mod workforce;

use std::collections::BTreeSet;

use crate::filter::Selection;
use crate::table::parse_int_prefix;

/// Single-choice query parameter.
pub(crate) fn choice(param: &Option<String>) -> Selection {
    Selection::from_param(param.as_deref())
}

/// Comma-separated multi-choice query parameter.
pub(crate) fn choices(param: &Option<String>) -> Selection {
    Selection::from_list(param.as_deref())
}

/// Distinct non-empty values in lexical order.
pub(crate) fn distinct_sorted<'a, I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct values ordered by their leading integer (`"3"`, `"10 - Oct"`).
/// Values without one sort first; ties keep first-seen order.
pub(crate) fn distinct_by_number<'a, I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = BTreeSet::new();
    let mut distinct: Vec<String> = values
        .into_iter()
        .filter(|value| !value.is_empty() && seen.insert(*value))
        .map(str::to_string)
        .collect();
    distinct.sort_by_key(|value| month_number(value));
    distinct
}

pub(crate) fn month_number(value: &str) -> i64 {
    parse_int_prefix(value).unwrap_or(0)
}

pub(crate) const MONTHS_FR: [&str; 12] = [
    "Janvier",
    "Février",
    "Mars",
    "Avril",
    "Mai",
    "Juin",
    "Juillet",
    "Août",
    "Septembre",
    "Octobre",
    "Novembre",
    "Décembre",
];
