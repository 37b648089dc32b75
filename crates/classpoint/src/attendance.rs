//! Class rosters and daily attendance.
//!
//! Each timetable section has a roster of students and one attendance sheet
//! per calendar day. Marking a student only touches that student's entry on
//! the sheet; the rest of the day's marks stay as they are.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One student on a section's roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    /// Generated identifier, stable across renames.
    pub id: String,
    /// Name shown on the roster.
    pub name: String,
    /// When the student was added.
    pub created_at: DateTime<Utc>,
}

impl Student {
    /// A new student with a generated id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStudent`] if the name is blank.
    pub fn new(name: &str, now: DateTime<Utc>) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid_student("name must not be empty"));
        }
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: now,
        })
    }
}

/// Roster order: by name, then id.
pub fn sort_roster(students: &mut [Student]) {
    students.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
}

/// Check that a section key is usable.
///
/// # Errors
///
/// Returns [`Error::InvalidStudent`] if the section is blank.
pub fn validate_section(section: &str) -> Result<()> {
    if section.trim().is_empty() {
        return Err(Error::invalid_student("section must not be empty"));
    }
    Ok(())
}

/// A student's mark for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    /// In class, late arrivals included.
    Present,
    /// Not in class.
    Absent,
}

impl AttendanceStatus {
    /// Stored form of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
        }
    }

    /// One-letter form used in reports.
    #[must_use]
    pub fn letter(self) -> char {
        match self {
            Self::Present => 'P',
            Self::Absent => 'A',
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            // Late counts as present
            "present" | "late" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            other => Err(Error::invalid_student(format!(
                "unknown attendance status '{other}'"
            ))),
        }
    }
}

/// All marks of one section on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceSheet {
    /// Timetable section.
    pub section: String,
    /// Calendar day.
    pub date: NaiveDate,
    /// Marks keyed by student id.
    pub records: BTreeMap<String, AttendanceStatus>,
}

impl AttendanceSheet {
    /// A sheet with no marks.
    #[must_use]
    pub fn empty(section: &str, date: NaiveDate) -> Self {
        Self {
            section: section.to_string(),
            date,
            records: BTreeMap::new(),
        }
    }

    /// Mark of one student, if any.
    #[must_use]
    pub fn status(&self, student_id: &str) -> Option<AttendanceStatus> {
        self.records.get(student_id).copied()
    }

    /// Number of students marked with `status`.
    #[must_use]
    pub fn count(&self, status: AttendanceStatus) -> usize {
        self.records.values().filter(|s| **s == status).count()
    }

    /// Whether nobody has been marked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parse a `YYYY-MM-DD` date.
///
/// # Errors
///
/// Returns [`Error::InvalidDate`] if the value is not a valid date.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| Error::InvalidDate {
        value: value.to_string(),
        expected: "YYYY-MM-DD",
    })
}

/// Parse a `YYYY-MM` month into its year and month number.
///
/// # Errors
///
/// Returns [`Error::InvalidDate`] if the value is not a valid month.
pub fn parse_month(value: &str) -> Result<(i32, u32)> {
    let invalid = || Error::InvalidDate {
        value: value.to_string(),
        expected: "YYYY-MM",
    };
    let (year, month) = value.trim().split_once('-').ok_or_else(invalid)?;
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    Ok((year, month))
}

/// Teaching days of a month, every day except Sundays.
///
/// # Errors
///
/// Returns [`Error::InvalidDate`] if `month` is not in `1..=12`.
pub fn school_days(year: i32, month: u32) -> Result<Vec<NaiveDate>> {
    let mut day = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| Error::InvalidDate {
        value: format!("{year}-{month:02}"),
        expected: "YYYY-MM",
    })?;

    let mut days = Vec::new();
    while day.month() == month {
        if day.weekday() != Weekday::Sun {
            days.push(day);
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    Ok(days)
}

/// One roster row of a [`MonthReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentTally {
    /// Student id.
    pub student_id: String,
    /// Student name.
    pub name: String,
    /// Mark for each of the report's days, `None` when unmarked.
    pub marks: Vec<Option<AttendanceStatus>>,
    /// Days marked present.
    pub present: usize,
    /// Days marked absent.
    pub absent: usize,
}

impl StudentTally {
    /// Days with no mark.
    #[must_use]
    pub fn unmarked(&self) -> usize {
        self.marks.len() - self.present - self.absent
    }
}

/// Attendance grid of one section for one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthReport {
    /// Timetable section.
    pub section: String,
    /// Report year.
    pub year: i32,
    /// Report month, 1 to 12.
    pub month: u32,
    /// Teaching days covered, in order.
    pub days: Vec<NaiveDate>,
    /// One row per student on the current roster.
    pub rows: Vec<StudentTally>,
}

impl MonthReport {
    /// Build the grid from a roster and the sheets of the month.
    ///
    /// Marks of students no longer on the roster are left out, and so are
    /// sheets for Sundays.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDate`] if `month` is not in `1..=12`.
    pub fn build(
        section: &str,
        year: i32,
        month: u32,
        students: &[Student],
        sheets: &[AttendanceSheet],
    ) -> Result<Self> {
        let days = school_days(year, month)?;
        let by_date: BTreeMap<NaiveDate, &AttendanceSheet> =
            sheets.iter().map(|sheet| (sheet.date, sheet)).collect();

        let rows = students
            .iter()
            .map(|student| {
                let marks: Vec<_> = days
                    .iter()
                    .map(|day| by_date.get(day).and_then(|sheet| sheet.status(&student.id)))
                    .collect();
                let count = |status: AttendanceStatus| marks.iter().filter(|m| **m == Some(status)).count();
                StudentTally {
                    student_id: student.id.clone(),
                    name: student.name.clone(),
                    present: count(AttendanceStatus::Present),
                    absent: count(AttendanceStatus::Absent),
                    marks,
                }
            })
            .collect();

        Ok(Self {
            section: section.to_string(),
            year,
            month,
            days,
            rows,
        })
    }
}
