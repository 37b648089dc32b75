//! Section timetables and time-of-day lookups.
//!
//! A timetable maps each section to its weekly schedule. The JSON layout is
//! the one the timetable editor writes:
//!
//! ```json
//! { "sections": { "grade4-super2": { "Monday": [
//!     { "subject": "Physics", "teacher": "Ms. Lee", "location": "Lab 1",
//!       "startTime": "08:20", "endTime": "09:05" } ] } } }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// A wall-clock time of day with minute precision, written as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime(NaiveTime);

impl ClockTime {
    /// Build a clock time from hours and minutes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidClockTime`] if the values are out of range.
    pub fn from_hm(hour: u32, minute: u32) -> Result<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(Self)
            .ok_or_else(|| Error::InvalidClockTime {
                value: format!("{hour:02}:{minute:02}"),
            })
    }

    /// Truncate a time of day to minute precision.
    #[must_use]
    pub fn from_time(time: NaiveTime) -> Self {
        Self(time.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(time))
    }

    /// Minutes since midnight.
    #[must_use]
    pub fn minutes(&self) -> u32 {
        self.0.hour() * 60 + self.0.minute()
    }
}

impl FromStr for ClockTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map(Self)
            .map_err(|_| Error::InvalidClockTime {
                value: s.to_string(),
            })
    }
}

impl TryFrom<String> for ClockTime {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(time: ClockTime) -> Self {
        time.to_string()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

/// Day of the week, keyed by its full English name in timetable files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Day {
    /// Monday.
    Monday,
    /// Tuesday.
    Tuesday,
    /// Wednesday.
    Wednesday,
    /// Thursday.
    Thursday,
    /// Friday.
    Friday,
    /// Saturday.
    Saturday,
    /// Sunday.
    Sunday,
}

impl From<Weekday> for Day {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => Self::Monday,
            Weekday::Tue => Self::Tuesday,
            Weekday::Wed => Self::Wednesday,
            Weekday::Thu => Self::Thursday,
            Weekday::Fri => Self::Friday,
            Weekday::Sat => Self::Saturday,
            Weekday::Sun => Self::Sunday,
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One scheduled class period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPeriod {
    /// Subject taught.
    pub subject: String,
    /// Teacher taking the class.
    pub teacher: String,
    /// Room, when given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Start of the period (inclusive).
    pub start_time: ClockTime,
    /// End of the period (exclusive).
    pub end_time: ClockTime,
}

impl ClassPeriod {
    /// Whether the period is in progress at `now`.
    #[must_use]
    pub fn is_current_at(&self, now: ClockTime) -> bool {
        self.start_time <= now && now < self.end_time
    }

    /// Whether the period starts strictly after `now`.
    #[must_use]
    pub fn is_upcoming_at(&self, now: ClockTime) -> bool {
        self.start_time > now
    }

    /// Whether the two periods share any minute.
    #[must_use]
    pub fn overlaps(&self, other: &ClassPeriod) -> bool {
        self.start_time < other.end_time && self.end_time > other.start_time
    }

    /// Check the period on its own.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidClass`] if subject or teacher is blank or the
    /// period does not end after it starts.
    pub fn validate(&self) -> Result<()> {
        if self.subject.trim().is_empty() {
            return Err(Error::invalid_class("subject is required"));
        }
        if self.teacher.trim().is_empty() {
            return Err(Error::invalid_class("teacher name is required"));
        }
        if self.end_time <= self.start_time {
            return Err(Error::invalid_class("end time must be after start time"));
        }
        Ok(())
    }
}

/// Weekly schedules for every section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timetable {
    /// Section id to day to periods, each day sorted by start time.
    #[serde(default)]
    pub sections: BTreeMap<String, BTreeMap<Day, Vec<ClassPeriod>>>,
}

impl Timetable {
    /// Load a timetable from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimetableLoad`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::TimetableLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut timetable: Self = serde_json::from_str(&raw).map_err(|e| Error::TimetableLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        timetable.sort();
        debug!(
            path = %path.display(),
            sections = timetable.sections.len(),
            "Loaded timetable"
        );
        Ok(timetable)
    }

    /// Write the timetable to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn sort(&mut self) {
        for days in self.sections.values_mut() {
            for periods in days.values_mut() {
                periods.sort_by_key(|p| p.start_time);
            }
        }
    }

    /// The periods of `section` on `day`, sorted by start time.
    #[must_use]
    pub fn day_schedule(&self, section: &str, day: Day) -> &[ClassPeriod] {
        self.sections
            .get(section)
            .and_then(|days| days.get(&day))
            .map_or(&[], Vec::as_slice)
    }

    /// Add a period to a section's day, rejecting overlaps.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidClass`] for an invalid period and
    /// [`Error::ScheduleConflict`] if it overlaps an existing one.
    pub fn add_class(&mut self, section: &str, day: Day, period: ClassPeriod) -> Result<()> {
        period.validate()?;

        let periods = self
            .sections
            .entry(section.to_string())
            .or_default()
            .entry(day)
            .or_default();

        if let Some(existing) = periods.iter().find(|p| p.overlaps(&period)) {
            return Err(Error::ScheduleConflict {
                start: period.start_time.to_string(),
                end: period.end_time.to_string(),
                existing: existing.subject.clone(),
            });
        }

        periods.push(period);
        periods.sort_by_key(|p| p.start_time);
        Ok(())
    }

    /// Remove the period at `index` of a section's day.
    pub fn remove_class(&mut self, section: &str, day: Day, index: usize) -> Option<ClassPeriod> {
        let periods = self.sections.get_mut(section)?.get_mut(&day)?;
        (index < periods.len()).then(|| periods.remove(index))
    }
}

/// The period in progress at `now`.
#[must_use]
pub fn current_class(schedule: &[ClassPeriod], now: ClockTime) -> Option<&ClassPeriod> {
    schedule.iter().find(|p| p.is_current_at(now))
}

/// The earliest period starting after `now`.
#[must_use]
pub fn next_class(schedule: &[ClassPeriod], now: ClockTime) -> Option<&ClassPeriod> {
    schedule
        .iter()
        .filter(|p| p.is_upcoming_at(now))
        .min_by_key(|p| p.start_time)
}

/// All periods starting after `now`, in start order.
#[must_use]
pub fn remaining_classes(schedule: &[ClassPeriod], now: ClockTime) -> Vec<&ClassPeriod> {
    let mut remaining: Vec<_> = schedule.iter().filter(|p| p.is_upcoming_at(now)).collect();
    remaining.sort_by_key(|p| p.start_time);
    remaining
}

/// Whether a class starting at `start` begins within the next `minutes`.
#[must_use]
pub fn is_within_reminder_time(start: ClockTime, now: ClockTime, minutes: u32) -> bool {
    let (start, now) = (start.minutes(), now.minutes());
    start > now && start - now <= minutes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    fn period(subject: &str, teacher: &str, start: &str, end: &str) -> ClassPeriod {
        ClassPeriod {
            subject: subject.to_string(),
            teacher: teacher.to_string(),
            location: None,
            start_time: t(start),
            end_time: t(end),
        }
    }

    fn sample_day() -> Vec<ClassPeriod> {
        vec![
            period("English", "Ms. Lee", "08:20", "09:05"),
            period("Physics", "Dr. Patel", "09:05", "09:50"),
            period("History", "Mr. Singh", "10:10", "10:55"),
        ]
    }

    #[test]
    fn test_clock_time_parse_and_display() {
        assert_eq!(t("08:20").to_string(), "08:20");
        assert_eq!(t(" 14:45 ").minutes(), 14 * 60 + 45);
        assert!("25:00".parse::<ClockTime>().is_err());
        assert!("8.20".parse::<ClockTime>().is_err());
        assert!(ClockTime::from_hm(24, 0).is_err());
    }

    #[test]
    fn test_clock_time_from_time_truncates_seconds() {
        let time = NaiveTime::from_hms_opt(9, 4, 59).unwrap();
        assert_eq!(ClockTime::from_time(time), t("09:04"));
    }

    #[test]
    fn test_current_class_boundaries() {
        let day = sample_day();
        assert_eq!(current_class(&day, t("08:20")).unwrap().subject, "English");
        assert_eq!(current_class(&day, t("09:04")).unwrap().subject, "English");
        // End is exclusive: the next period takes over at 09:05
        assert_eq!(current_class(&day, t("09:05")).unwrap().subject, "Physics");
        assert!(current_class(&day, t("10:00")).is_none());
        assert!(current_class(&day, t("07:00")).is_none());
    }

    #[test]
    fn test_next_class() {
        let day = sample_day();
        assert_eq!(next_class(&day, t("07:00")).unwrap().subject, "English");
        assert_eq!(next_class(&day, t("08:30")).unwrap().subject, "Physics");
        assert_eq!(next_class(&day, t("09:50")).unwrap().subject, "History");
        assert!(next_class(&day, t("10:10")).is_none());
    }

    #[test]
    fn test_remaining_classes() {
        let day = sample_day();
        let remaining = remaining_classes(&day, t("08:30"));
        let subjects: Vec<_> = remaining.iter().map(|p| p.subject.as_str()).collect();
        assert_eq!(subjects, ["Physics", "History"]);
        assert!(remaining_classes(&day, t("11:00")).is_empty());
    }

    #[test]
    fn test_is_within_reminder_time() {
        assert!(is_within_reminder_time(t("09:05"), t("09:03"), 2));
        assert!(!is_within_reminder_time(t("09:05"), t("09:02"), 2));
        assert!(!is_within_reminder_time(t("09:05"), t("09:05"), 2));
        assert!(!is_within_reminder_time(t("09:05"), t("09:10"), 2));
    }

    #[test]
    fn test_add_class_keeps_day_sorted() {
        let mut timetable = Timetable::default();
        timetable
            .add_class("grade4-super2", Day::Monday, period("B", "Ms. Lee", "10:00", "10:45"))
            .unwrap();
        timetable
            .add_class("grade4-super2", Day::Monday, period("A", "Ms. Lee", "08:20", "09:05"))
            .unwrap();

        let day = timetable.day_schedule("grade4-super2", Day::Monday);
        assert_eq!(day[0].subject, "A");
        assert_eq!(day[1].subject, "B");
    }

    #[test]
    fn test_add_class_rejects_overlap() {
        let mut timetable = Timetable::default();
        timetable
            .add_class("s", Day::Monday, period("Physics", "Dr. Patel", "09:00", "09:45"))
            .unwrap();

        let err = timetable
            .add_class("s", Day::Monday, period("Maths", "Ms. Lee", "09:30", "10:15"))
            .unwrap_err();
        assert!(matches!(err, Error::ScheduleConflict { .. }));

        // Enclosing period also conflicts
        assert!(timetable
            .add_class("s", Day::Monday, period("Maths", "Ms. Lee", "08:00", "10:00"))
            .is_err());

        // Back-to-back is fine
        assert!(timetable
            .add_class("s", Day::Monday, period("Maths", "Ms. Lee", "09:45", "10:30"))
            .is_ok());
    }

    #[test]
    fn test_add_class_validation() {
        let mut timetable = Timetable::default();
        assert!(timetable
            .add_class("s", Day::Monday, period("", "Ms. Lee", "09:00", "09:45"))
            .is_err());
        assert!(timetable
            .add_class("s", Day::Monday, period("Maths", " ", "09:00", "09:45"))
            .is_err());
        assert!(timetable
            .add_class("s", Day::Monday, period("Maths", "Ms. Lee", "09:45", "09:45"))
            .is_err());
    }

    #[test]
    fn test_remove_class() {
        let mut timetable = Timetable::default();
        timetable
            .add_class("s", Day::Friday, period("Maths", "Ms. Lee", "09:00", "09:45"))
            .unwrap();

        assert!(timetable.remove_class("s", Day::Friday, 3).is_none());
        assert_eq!(
            timetable.remove_class("s", Day::Friday, 0).unwrap().subject,
            "Maths"
        );
        assert!(timetable.day_schedule("s", Day::Friday).is_empty());
        assert!(timetable.remove_class("missing", Day::Friday, 0).is_none());
    }

    #[test]
    fn test_day_schedule_unknown_section() {
        let timetable = Timetable::default();
        assert!(timetable.day_schedule("nope", Day::Monday).is_empty());
    }

    #[test]
    fn test_parse_editor_json() {
        let json = r#"{
            "sections": {
                "grade4-super2": {
                    "Monday": [
                        {"subject": "Physics", "teacher": "Dr. Patel", "location": "Lab 1",
                         "startTime": "09:05", "endTime": "09:50"},
                        {"subject": "English", "teacher": "Ms. Lee",
                         "startTime": "08:20", "endTime": "09:05"}
                    ]
                }
            },
            "savedAt": "2024-01-15T08:00:00Z"
        }"#;
        let timetable: Timetable = serde_json::from_str(json).unwrap();
        let monday = timetable.day_schedule("grade4-super2", Day::Monday);
        assert_eq!(monday.len(), 2);
        // File order is kept until the timetable goes through load()
        assert_eq!(monday[0].location.as_deref(), Some("Lab 1"));
        assert!(monday[1].location.is_none());
    }

    #[test]
    fn test_load_sorts_and_save_roundtrips() {
        let path = std::env::temp_dir().join(format!(
            "classpoint_timetable_test_{}.json",
            std::process::id()
        ));
        let mut timetable = Timetable::default();
        timetable.sections.entry("s".to_string()).or_default().insert(
            Day::Tuesday,
            vec![
                period("Late", "Ms. Lee", "11:00", "11:45"),
                period("Early", "Ms. Lee", "08:20", "09:05"),
            ],
        );
        timetable.save(&path).unwrap();

        let loaded = Timetable::load(&path).unwrap();
        assert_eq!(loaded.day_schedule("s", Day::Tuesday)[0].subject, "Early");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Timetable::load("/nonexistent/timetable.json").unwrap_err();
        assert!(matches!(err, Error::TimetableLoad { .. }));
    }

    #[test]
    fn test_day_from_weekday() {
        assert_eq!(Day::from(Weekday::Mon), Day::Monday);
        assert_eq!(Day::from(Weekday::Sun), Day::Sunday);
        assert_eq!(Day::Wednesday.to_string(), "Wednesday");
    }
}
