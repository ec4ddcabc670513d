//! Aggregator
//!
//! Grouping keeps keys in first-seen order; the presentation layer decides the
//! final ordering.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::table::{display, parse_float_prefix};

// ============================================================================
// Insertion-ordered groups
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Grouped<V> {
    index: HashMap<String, usize>,
    entries: Vec<(String, V)>,
}

impl<V> Default for Grouped<V> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

impl<V> Grouped<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulator for `key`, initialised on first occurrence.
    pub fn entry(&mut self, key: &str) -> &mut V
    where
        V: Default,
    {
        let position = match self.index.get(key) {
            Some(&position) => position,
            None => {
                self.entries.push((key.to_string(), V::default()));
                self.index.insert(key.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[position].1
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&position| &self.entries[position].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl<V> IntoIterator for Grouped<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

pub fn count_by<'a, T: 'a, I, K>(records: I, key: K) -> Grouped<u64>
where
    I: IntoIterator<Item = &'a T>,
    K: Fn(&T) -> &str,
{
    let mut grouped = Grouped::new();
    for record in records {
        *grouped.entry(key(record)) += 1;
    }
    grouped
}

pub fn sum_by<'a, T: 'a, I, K, A>(records: I, key: K, amount: A) -> Grouped<u64>
where
    I: IntoIterator<Item = &'a T>,
    K: Fn(&T) -> &str,
    A: Fn(&T) -> u64,
{
    let mut grouped = Grouped::new();
    for record in records {
        *grouped.entry(key(record)) += amount(record);
    }
    grouped
}

// ============================================================================
// Attendance
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Unclassified,
}

impl AttendanceStatus {
    pub fn classify(code: &str) -> Self {
        match code.trim() {
            c if c.eq_ignore_ascii_case("T") => AttendanceStatus::Present,
            c if c.eq_ignore_ascii_case("I") => AttendanceStatus::Absent,
            _ => AttendanceStatus::Unclassified,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceTally {
    pub total: u64,
    pub present: u64,
    pub absent: u64,
}

impl AttendanceTally {
    pub fn record(&mut self, status: AttendanceStatus) {
        self.total += 1;
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::Unclassified => {}
        }
    }

    /// Counted in the total but neither present nor absent.
    pub fn unclassified(&self) -> u64 {
        self.total - self.present - self.absent
    }
}

/// Tally attendance codes per key; empty keys are left out of the grouping.
pub fn tally_by<'a, T: 'a, I, K, C>(records: I, key: K, code: C) -> Grouped<AttendanceTally>
where
    I: IntoIterator<Item = &'a T>,
    K: Fn(&T) -> &str,
    C: Fn(&T) -> &str,
{
    let mut grouped: Grouped<AttendanceTally> = Grouped::new();
    for record in records {
        let name = key(record);
        if name.is_empty() {
            continue;
        }
        grouped.entry(name).record(AttendanceStatus::classify(code(record)));
    }

    let unclassified: u64 = grouped.iter().map(|(_, tally)| tally.unclassified()).sum();
    if unclassified > 0 {
        debug!(groups = grouped.len(), unclassified, "Attendance codes outside T/I");
    }
    grouped
}

// ============================================================================
// Age buckets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AgeBucket {
    #[serde(rename = "<20")]
    Under20,
    #[serde(rename = "20-29")]
    Twenties,
    #[serde(rename = "30-39")]
    Thirties,
    #[serde(rename = "40-49")]
    Forties,
    #[serde(rename = ">50")]
    Over50,
}

static LESS_THAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<\s*([0-9]{1,3})$").unwrap());
static GREATER_THAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^>\s*([0-9]{1,3})$").unwrap());
static RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{1,3})\s*[-–]\s*([0-9]{1,3})$").unwrap());
static PLAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{1,3}$").unwrap());
static EMBEDDED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]{1,3}").unwrap());

impl AgeBucket {
    pub const ALL: [AgeBucket; 5] = [
        AgeBucket::Under20,
        AgeBucket::Twenties,
        AgeBucket::Thirties,
        AgeBucket::Forties,
        AgeBucket::Over50,
    ];

    pub fn label(self) -> &'static str {
        match self {
            AgeBucket::Under20 => "<20",
            AgeBucket::Twenties => "20-29",
            AgeBucket::Thirties => "30-39",
            AgeBucket::Forties => "40-49",
            AgeBucket::Over50 => ">50",
        }
    }

    pub fn from_age(age: f64) -> Option<Self> {
        if !age.is_finite() {
            return None;
        }
        Some(if age < 20.0 {
            AgeBucket::Under20
        } else if age < 30.0 {
            AgeBucket::Twenties
        } else if age < 40.0 {
            AgeBucket::Thirties
        } else if age < 50.0 {
            AgeBucket::Forties
        } else {
            AgeBucket::Over50
        })
    }

    /// Bucket for a raw age cell. Empty cells resolve to nothing.
    pub fn classify(cell: &Value) -> Option<Self> {
        match cell {
            Value::Number(n) => n.as_f64().and_then(Self::from_age),
            Value::String(s) => Self::classify_text(s),
            Value::Null | Value::Bool(_) => None,
            other => Self::classify_text(&display(Some(other))),
        }
    }

    pub fn classify_text(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if let Some(caps) = LESS_THAN.captures(text) {
            let bound: u32 = caps[1].parse().ok()?;
            return (bound <= 20).then_some(AgeBucket::Under20);
        }
        if let Some(caps) = GREATER_THAN.captures(text) {
            let bound: u32 = caps[1].parse().ok()?;
            return (bound >= 50).then_some(AgeBucket::Over50);
        }
        if let Some(caps) = RANGE.captures(text) {
            let low: u32 = caps[1].parse().ok()?;
            let high: u32 = caps[2].parse().ok()?;
            if high < 20 || low < 20 {
                return Some(AgeBucket::Under20);
            }
            for (bucket, floor) in [
                (AgeBucket::Twenties, 20),
                (AgeBucket::Thirties, 30),
                (AgeBucket::Forties, 40),
            ] {
                if low >= floor && high < floor + 10 {
                    return Some(bucket);
                }
            }
            if low >= 50 {
                return Some(AgeBucket::Over50);
            }
        }
        if PLAIN.is_match(text) {
            return parse_float_prefix(text).and_then(Self::from_age);
        }
        EMBEDDED
            .find(text)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .and_then(Self::from_age)
    }
}

impl fmt::Display for AgeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgeDistribution {
    counts: [u64; 5],
    /// Non-empty ages that matched no bucket.
    pub unresolved: u64,
}

impl AgeDistribution {
    pub fn from_cells<'a, I>(cells: I) -> Self
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut distribution = Self::default();
        for cell in cells {
            distribution.add(cell);
        }
        if distribution.unresolved > 0 {
            debug!(unresolved = distribution.unresolved, "Ages without a bucket");
        }
        distribution
    }

    pub fn add(&mut self, cell: &Value) {
        match AgeBucket::classify(cell) {
            Some(bucket) => self.counts[bucket as usize] += 1,
            None if !matches!(cell, Value::Null) && !display(Some(cell)).trim().is_empty() => {
                self.unresolved += 1
            }
            None => {}
        }
    }

    pub fn add_age(&mut self, age: f64) {
        if let Some(bucket) = AgeBucket::from_age(age) {
            self.counts[bucket as usize] += 1;
        }
    }

    pub fn count(&self, bucket: AgeBucket) -> u64 {
        self.counts[bucket as usize]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Every bucket in label order, zero counts included.
    pub fn buckets(&self) -> impl Iterator<Item = (AgeBucket, u64)> + '_ {
        AgeBucket::ALL.iter().map(move |&bucket| (bucket, self.count(bucket)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_grouped_keeps_first_seen_order() {
        let records = ["b", "a", "b", "c", "a", "b"];
        let grouped = count_by(records.iter(), |r| *r);
        let collected: Vec<(&str, &u64)> = grouped.iter().collect();
        assert_eq!(collected, vec![("b", &3), ("a", &2), ("c", &1)]);
        assert_eq!(grouped.get("z"), None);
    }

    #[test]
    fn test_sum_by() {
        let records = [("x", 2u64), ("y", 5), ("x", 4)];
        let grouped = sum_by(records.iter(), |r| r.0, |r| r.1);
        assert_eq!(grouped.get("x"), Some(&6));
        assert_eq!(grouped.get("y"), Some(&5));
    }

    #[test]
    fn test_attendance_classification() {
        assert_eq!(AttendanceStatus::classify("t"), AttendanceStatus::Present);
        assert_eq!(AttendanceStatus::classify("T"), AttendanceStatus::Present);
        assert_eq!(AttendanceStatus::classify("i"), AttendanceStatus::Absent);
        assert_eq!(AttendanceStatus::classify("CM"), AttendanceStatus::Unclassified);

        let mut tally = AttendanceTally::default();
        for code in ["T", "I", "CM", "t"] {
            tally.record(AttendanceStatus::classify(code));
        }
        assert_eq!(tally, AttendanceTally { total: 4, present: 2, absent: 1 });
        assert_eq!(tally.unclassified(), 1);
    }

    #[test]
    fn test_tally_skips_empty_keys() {
        let rows = [("G1", "T"), ("", "T"), ("G1", "X"), ("G2", "I")];
        let grouped = tally_by(rows.iter(), |r| r.0, |r| r.1);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped.get("G1").map(|t| (t.total, t.present)), Some((2, 1)));
    }

    #[test]
    fn test_age_buckets_numeric() {
        assert_eq!(AgeBucket::classify(&json!(19)), Some(AgeBucket::Under20));
        assert_eq!(AgeBucket::classify(&json!(20)), Some(AgeBucket::Twenties));
        assert_eq!(AgeBucket::classify(&json!(49.5)), Some(AgeBucket::Forties));
        assert_eq!(AgeBucket::classify(&json!(50)), Some(AgeBucket::Over50));
        assert_eq!(AgeBucket::classify(&json!(null)), None);
    }

    #[test]
    fn test_age_buckets_text_forms() {
        assert_eq!(AgeBucket::classify_text("<20"), Some(AgeBucket::Under20));
        assert_eq!(AgeBucket::classify_text("< 18"), Some(AgeBucket::Under20));
        assert_eq!(AgeBucket::classify_text("<25"), None);
        assert_eq!(AgeBucket::classify_text(">50"), Some(AgeBucket::Over50));
        assert_eq!(AgeBucket::classify_text(">40"), None);
        assert_eq!(AgeBucket::classify_text("30-39"), Some(AgeBucket::Thirties));
        assert_eq!(AgeBucket::classify_text("30 – 39"), Some(AgeBucket::Thirties));
        assert_eq!(AgeBucket::classify_text("18-22"), Some(AgeBucket::Under20));
        assert_eq!(AgeBucket::classify_text("55-60"), Some(AgeBucket::Over50));
        assert_eq!(AgeBucket::classify_text("35"), Some(AgeBucket::Thirties));
        assert_eq!(AgeBucket::classify_text("approx 42 ans"), Some(AgeBucket::Forties));
        assert_eq!(AgeBucket::classify_text("inconnu"), None);
    }

    #[test]
    fn test_distribution_is_bounded_by_age_cells() {
        let cells = vec![json!(25), json!("31"), json!(""), json!("n/a"), json!("<20"), json!(null)];
        let distribution = AgeDistribution::from_cells(cells.iter());
        assert_eq!(distribution.total(), 3);
        assert_eq!(distribution.unresolved, 1);
        let with_age = cells.iter().filter(|c| !c.is_null() && c.as_str() != Some("")).count() as u64;
        assert!(distribution.total() <= with_age);
        assert_eq!(distribution.buckets().count(), 5);
    }
}
