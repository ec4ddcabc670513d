use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::table::{count, decimal, raw, text, SheetRecord};

/// External spreadsheet-backed endpoints proxied by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Workforce,
    Attendance,
    Performance,
    Turnover,
    Recruitment,
    Sortie,
    Auth,
}

impl Source {
    pub const ALL: [Source; 7] = [
        Source::Workforce,
        Source::Attendance,
        Source::Performance,
        Source::Turnover,
        Source::Recruitment,
        Source::Sortie,
        Source::Auth,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Source::Workforce => "workforce",
            Source::Attendance => "attendance",
            Source::Performance => "performance",
            Source::Turnover => "turnover",
            Source::Recruitment => "recruitment",
            Source::Sortie => "sortie",
            Source::Auth => "auth",
        }
    }

    /// Path of the proxy endpoint serving this sheet.
    pub fn api_path(self) -> &'static str {
        match self {
            Source::Workforce => "/api/workforce",
            Source::Attendance => "/api/attendance",
            Source::Performance => "/api/performance",
            Source::Turnover => "/api/turnover",
            Source::Recruitment => "/api/recruitment",
            Source::Sortie => "/api/sortie",
            Source::Auth => "/api/admin/auth",
        }
    }

    /// Prefix of the environment variables configuring this source.
    pub fn env_prefix(self) -> &'static str {
        match self {
            Source::Workforce => "HR_WORKFORCE",
            Source::Attendance => "HR_ATTENDANCE",
            Source::Performance => "HR_PERFORMANCE",
            Source::Turnover => "HR_TURNOVER",
            Source::Recruitment => "HR_RECRUITMENT",
            Source::Sortie => "HR_SORTIE",
            Source::Auth => "HR_AUTH",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Column layouts
// ============================================================================

pub mod columns {
    pub mod attendance {
        pub const CODE: usize = 2;
        pub const NAME: usize = 3;
        pub const ATTENDANCE: usize = 10;
        pub const GROUP: usize = 31;
        pub const CONTRACT: usize = 34;
        pub const CATEGORY: usize = 36;
    }

    pub mod performance {
        pub const DATE: usize = 0;
        pub const CODE: usize = 2;
        pub const NAME: usize = 3;
        pub const GROUP: usize = 31;
        pub const DEPARTMENT: usize = 36;
        pub const HOURS: usize = 40;
        pub const AG: usize = 41;
    }

    pub mod recruitment {
        pub const DATE: usize = 0;
        pub const WEEK: usize = 1;
        pub const QZ: usize = 2;
        pub const MONTH: usize = 3;
        pub const DEPARTMENT: usize = 4;
        pub const SECTOR: usize = 5;
        pub const SOURCE: usize = 6;
        pub const INTERIM: usize = 7;
        pub const COUNT: usize = 8;
    }

    pub mod sortie {
        pub const QZ: usize = 0;
        pub const MONTH: usize = 1;
        pub const YEAR: usize = 2;
        pub const SEX: usize = 3;
        pub const CONTRACT: usize = 4;
        pub const DEPARTMENT: usize = 5;
        pub const COUNT: usize = 6;
    }

    pub mod turnover {
        pub const MONTH: usize = 0;
        pub const FINISHED: usize = 1;
        pub const GROUP: usize = 2;
        pub const CONTRACT: usize = 3;
        pub const STARTED: usize = 4;
        pub const ENDED_MONTH: usize = 5;
    }

    pub mod workforce {
        pub const CODE: usize = 0;
        pub const REGISTRATION: usize = 1;
        pub const NAME: usize = 2;
        pub const NIF: usize = 3;
        pub const SEX: usize = 4;
        pub const AGE: usize = 5;
        pub const PHONE: usize = 6;
        pub const CONTRACT: usize = 7;
        pub const CENTER: usize = 8;
        pub const GROUP: usize = 9;
        pub const SUPERVISOR: usize = 10;
        pub const DEPARTMENT: usize = 11;
        pub const POSITION: usize = 12;
        pub const HIRED_ON: usize = 13;
        pub const LEFT_ON: usize = 14;
        pub const CARRIER: usize = 15;
        pub const PR_H1: usize = 16;
        pub const PR_H2: usize = 17;
        pub const PR_AS: usize = 18;
        pub const LEAVE: usize = 19;
    }
}

// ============================================================================
// Records
// ============================================================================

/// One worker's attendance line. Every array row is kept; the aggregator
/// decides which breakdowns a row feeds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub code: String,
    pub name: String,
    /// Attendance code, uppercased (`T` present, `I` absent).
    pub attendance: String,
    pub group: String,
    pub contract: String,
    pub category: String,
}

impl SheetRecord for AttendanceRecord {
    const SOURCE: &'static str = "attendance";

    fn from_row(row: &[Value]) -> Option<Self> {
        use columns::attendance::*;
        Some(Self {
            code: text(row, CODE),
            name: text(row, NAME),
            attendance: text(row, ATTENDANCE).to_uppercase(),
            group: text(row, GROUP),
            contract: text(row, CONTRACT),
            category: text(row, CATEGORY),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    pub date: String,
    pub code: String,
    pub name: String,
    /// Working hours as written in the sheet.
    pub working_hours: String,
    #[serde(skip)]
    pub hours: f64,
    pub group: String,
    pub department: String,
    pub ag: String,
}

impl SheetRecord for PerformanceRecord {
    const SOURCE: &'static str = "performance";

    fn from_row(row: &[Value]) -> Option<Self> {
        use columns::performance::*;
        let record = Self {
            date: text(row, DATE),
            code: text(row, CODE),
            name: text(row, NAME),
            working_hours: text(row, HOURS),
            hours: decimal(row, HOURS),
            group: text(row, GROUP),
            department: text(row, DEPARTMENT),
            ag: text(row, AG),
        };
        let complete = !record.code.is_empty()
            && !record.name.is_empty()
            && !record.date.is_empty()
            && !record.group.is_empty();
        complete.then_some(record)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecruitmentRecord {
    pub date: String,
    pub week: String,
    pub qz: String,
    pub month: String,
    pub department: String,
    pub sector: String,
    pub source: String,
    pub interim: String,
    pub count: u64,
}

impl SheetRecord for RecruitmentRecord {
    const SOURCE: &'static str = "recruitment";
    const MIN_WIDTH: usize = 9;

    fn from_row(row: &[Value]) -> Option<Self> {
        use columns::recruitment::*;
        let record = Self {
            date: text(row, DATE),
            week: text(row, WEEK),
            qz: text(row, QZ),
            month: text(row, MONTH),
            department: text(row, DEPARTMENT),
            sector: text(row, SECTOR),
            source: text(row, SOURCE),
            interim: text(row, INTERIM),
            count: count(row, COUNT),
        };
        let complete =
            !record.date.is_empty() && !record.department.is_empty() && !record.source.is_empty();
        complete.then_some(record)
    }
}

/// Exits ("sorties") per QZ, month and department.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortieRecord {
    pub qz: String,
    pub month: String,
    pub year: String,
    pub sex: String,
    pub contract: String,
    pub department: String,
    pub count: u64,
}

impl SheetRecord for SortieRecord {
    const SOURCE: &'static str = "sortie";
    const MIN_WIDTH: usize = 7;

    fn from_row(row: &[Value]) -> Option<Self> {
        use columns::sortie::*;
        let record = Self {
            qz: text(row, QZ),
            month: text(row, MONTH),
            year: text(row, YEAR),
            sex: text(row, SEX),
            contract: text(row, CONTRACT),
            department: text(row, DEPARTMENT),
            count: count(row, COUNT),
        };
        let complete = !record.qz.is_empty()
            && !record.month.is_empty()
            && !record.year.is_empty()
            && !record.department.is_empty();
        complete.then_some(record)
    }
}

/// Headcount movement of one group and contract type in a month.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnoverRecord {
    pub month: String,
    pub workers_finished: u64,
    pub group: String,
    pub contract_type: String,
    pub workers_started: u64,
    pub workers_ended_month: u64,
}

impl SheetRecord for TurnoverRecord {
    const SOURCE: &'static str = "turnover";
    const MIN_WIDTH: usize = 6;

    fn from_row(row: &[Value]) -> Option<Self> {
        use columns::turnover::*;
        let record = Self {
            month: text(row, MONTH),
            workers_finished: count(row, FINISHED),
            group: text(row, GROUP),
            contract_type: text(row, CONTRACT),
            workers_started: count(row, STARTED),
            workers_ended_month: count(row, ENDED_MONTH),
        };
        let complete =
            !record.month.is_empty() && !record.group.is_empty() && !record.contract_type.is_empty();
        complete.then_some(record)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkforceRecord {
    pub code: String,
    pub registration: String,
    pub name: String,
    pub nif: String,
    pub sex: String,
    /// Age cell untouched: it may be a number, a range label or free text.
    pub age: Value,
    pub phone: String,
    pub contract: String,
    pub center: String,
    pub group: String,
    pub supervisor: String,
    pub department: String,
    pub position: String,
    pub hired_on: String,
    pub left_on: String,
    pub carrier: String,
    pub pr_h1: f64,
    pub pr_h2: f64,
    pub pr_as: f64,
    pub leave: String,
}

impl WorkforceRecord {
    /// Numeric age when the cell holds a positive number.
    pub fn numeric_age(&self) -> Option<f64> {
        self.age.as_f64().filter(|age| *age > 0.0)
    }
}

impl SheetRecord for WorkforceRecord {
    const SOURCE: &'static str = "workforce";

    fn from_row(row: &[Value]) -> Option<Self> {
        use columns::workforce::*;
        Some(Self {
            code: text(row, CODE),
            registration: text(row, REGISTRATION),
            name: text(row, NAME),
            nif: text(row, NIF),
            sex: text(row, SEX),
            age: raw(row, AGE),
            phone: text(row, PHONE),
            contract: text(row, CONTRACT),
            center: text(row, CENTER),
            group: text(row, GROUP),
            supervisor: text(row, SUPERVISOR),
            department: text(row, DEPARTMENT),
            position: text(row, POSITION),
            hired_on: text(row, HIRED_ON),
            left_on: text(row, LEFT_ON),
            carrier: text(row, CARRIER),
            pr_h1: decimal(row, PR_H1),
            pr_h2: decimal(row, PR_H2),
            pr_as: decimal(row, PR_AS),
            leave: text(row, LEAVE),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{normalize, RecordTable};
    use serde_json::json;

    fn wide_row(width: usize, cells: &[(usize, Value)]) -> Value {
        let mut row = vec![json!(""); width];
        for (index, value) in cells {
            row[*index] = value.clone();
        }
        Value::Array(row)
    }

    #[test]
    fn test_attendance_code_is_uppercased() {
        let row = wide_row(37, &[(10, json!(" t ")), (31, json!("GroupA"))]);
        let record = AttendanceRecord::from_row(row.as_array().unwrap()).unwrap();
        assert_eq!(record.attendance, "T");
        assert_eq!(record.group, "GroupA");
        assert_eq!(record.contract, "");
    }

    #[test]
    fn test_turnover_requires_keys_and_width() {
        let table = RecordTable::from_value(json!([
            ["month", "finished", "group", "contract", "started", "ended"],
            [1, 2, "G1", "CDD", 10, 8],
            [1, 2, "", "CDD", 10, 8],
            [1, 2, "G1", "CDD", 10]
        ]))
        .unwrap();
        let normalized = normalize::<TurnoverRecord>(&table);
        assert_eq!(normalized.records.len(), 1);
        assert_eq!(normalized.skipped, 2);
        assert_eq!(normalized.records[0].month, "1");
        assert_eq!(normalized.records[0].workers_started, 10);
    }

    #[test]
    fn test_performance_hours_parse() {
        let row = wide_row(
            42,
            &[
                (0, json!("2024-05-01")),
                (2, json!("W1")),
                (3, json!("Ana")),
                (31, json!("G1")),
                (40, json!("7.5")),
            ],
        );
        let record = PerformanceRecord::from_row(row.as_array().unwrap()).unwrap();
        assert_eq!(record.hours, 7.5);
        assert_eq!(record.working_hours, "7.5");

        let missing_group = wide_row(42, &[(0, json!("2024-05-01")), (2, json!("W1")), (3, json!("Ana"))]);
        assert!(PerformanceRecord::from_row(missing_group.as_array().unwrap()).is_none());
    }

    #[test]
    fn test_workforce_numeric_age() {
        let row = json!([1, "M001", "Juan", "NIF1", "H", 30, "", "Fijo", "C1", "G1", "", "Campo"]);
        let record = WorkforceRecord::from_row(row.as_array().unwrap()).unwrap();
        assert_eq!(record.numeric_age(), Some(30.0));
        assert_eq!(record.department, "Campo");
        assert_eq!(record.leave, "");
    }
}
