//! Presentation Adapter
//!
//! Shapes aggregates into the `{name, value}` series and paged tables the
//! dashboard widgets consume.

use serde::Serialize;

use crate::aggregate::Grouped;

pub const ROWS_PER_PAGE: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedValue<V = u64> {
    pub name: String,
    pub value: V,
}

impl<V> NamedValue<V> {
    pub fn new(name: impl Into<String>, value: V) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Series in first-seen order.
pub fn unranked<V>(grouped: Grouped<V>) -> Vec<NamedValue<V>> {
    grouped
        .into_iter()
        .map(|(name, value)| NamedValue { name, value })
        .collect()
}

/// Series sorted by value, largest first. Equal values keep first-seen order.
pub fn ranked<V: PartialOrd>(grouped: Grouped<V>) -> Vec<NamedValue<V>> {
    let mut series = unranked(grouped);
    sort_descending(&mut series, |item| &item.value);
    series
}

pub fn top_n<V: PartialOrd>(grouped: Grouped<V>, n: usize) -> Vec<NamedValue<V>> {
    let mut series = ranked(grouped);
    series.truncate(n);
    series
}

/// Stable descending sort on a partially ordered key.
pub fn sort_descending<T, K, F>(items: &mut [T], key: F)
where
    K: PartialOrd + ?Sized,
    F: Fn(&T) -> &K,
{
    items.sort_by(|a, b| {
        key(b)
            .partial_cmp(key(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based, clamped to the available pages.
    pub page: usize,
    pub total_pages: usize,
    pub total_rows: usize,
}

pub fn paginate<T: Clone>(rows: &[T], page: usize) -> Page<T> {
    let total_pages = rows.len().div_ceil(ROWS_PER_PAGE).max(1);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * ROWS_PER_PAGE;
    let items = rows.iter().skip(start).take(ROWS_PER_PAGE).cloned().collect();
    Page {
        items,
        page,
        total_pages,
        total_rows: rows.len(),
    }
}
