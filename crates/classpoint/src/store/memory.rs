//! Process-local board store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::attendance::{
    sort_roster, validate_section, AttendanceSheet, AttendanceStatus, Student,
};
use crate::board::{BoardFields, BoardRecord, BOARDS_COLLECTION};
use crate::error::{Error, Result};

use super::{AttendanceStore, DocumentStore, LiveQueryFeed, Subscription, TeacherFilter};

type Marks = BTreeMap<String, AttendanceStatus>;

/// A board collection held in memory.
///
/// Writes are visible to every live query of the same store immediately.
/// Faults can be switched on to exercise the failure paths of callers.
#[derive(Debug)]
pub struct MemoryStore {
    boards: Mutex<BTreeMap<String, BoardRecord>>,
    feed: Arc<LiveQueryFeed>,
    /// Rosters keyed by section.
    rosters: Mutex<BTreeMap<String, Vec<Student>>>,
    /// Marks keyed by section and day.
    sheets: Mutex<BTreeMap<(String, NaiveDate), Marks>>,
    deny_writes: AtomicBool,
    deny_subscriptions: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            boards: Mutex::new(BTreeMap::new()),
            feed: LiveQueryFeed::new(),
            rosters: Mutex::new(BTreeMap::new()),
            sheets: Mutex::new(BTreeMap::new()),
            deny_writes: AtomicBool::new(false),
            deny_subscriptions: AtomicBool::new(false),
        }
    }
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every subsequent write with a permission error.
    pub fn deny_writes(&self, deny: bool) {
        self.deny_writes.store(deny, Ordering::SeqCst);
    }

    /// Reject every subsequent subscription with a permission error.
    pub fn deny_subscriptions(&self, deny: bool) {
        self.deny_subscriptions.store(deny, Ordering::SeqCst);
    }

    /// Push a stream error to every open live query.
    pub fn interrupt_subscriptions(&self, message: &str) {
        warn!(message, "Interrupting live queries");
        self.feed.fail_all(message);
    }

    /// Number of open live queries.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.feed.subscriber_count()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, BoardRecord>> {
        self.boards.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_write(&self, target: &str) -> Result<()> {
        if self.deny_writes.load(Ordering::SeqCst) {
            return Err(Error::permission_denied(target, "writes are denied"));
        }
        Ok(())
    }

    fn rosters(&self) -> MutexGuard<'_, BTreeMap<String, Vec<Student>>> {
        self.rosters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sheets(&self) -> MutexGuard<'_, BTreeMap<(String, NaiveDate), Marks>> {
        self.sheets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn to_sheet(section: &str, date: NaiveDate, marks: Option<&Marks>) -> AttendanceSheet {
        AttendanceSheet {
            records: marks.cloned().unwrap_or_default(),
            ..AttendanceSheet::empty(section, date)
        }
    }

    fn matching(boards: &BTreeMap<String, BoardRecord>, filter: &TeacherFilter) -> Vec<BoardRecord> {
        boards
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert(&self, board_id: &str, fields: BoardFields) -> Result<BoardRecord> {
        self.check_write(board_id)?;

        let mut boards = self.lock();
        let record = boards
            .entry(board_id.to_string())
            .or_insert_with(|| BoardRecord::new(board_id));
        fields.apply_to(record);
        let stored = record.clone();
        debug!(board_id, "Upserted board record");

        self.feed.publish(|filter| Ok(Self::matching(&boards, filter)));
        Ok(stored)
    }

    async fn get(&self, board_id: &str) -> Result<Option<BoardRecord>> {
        Ok(self.lock().get(board_id).cloned())
    }

    async fn delete(&self, board_id: &str) -> Result<bool> {
        self.check_write(board_id)?;

        let mut boards = self.lock();
        let existed = boards.remove(board_id).is_some();
        if existed {
            self.feed.publish(|filter| Ok(Self::matching(&boards, filter)));
        }
        Ok(existed)
    }

    async fn list(&self) -> Result<Vec<BoardRecord>> {
        Ok(self.lock().values().cloned().collect())
    }

    async fn boards_owned_by(&self, owner_uid: &str) -> Result<Vec<BoardRecord>> {
        let mut owned: Vec<_> = self
            .lock()
            .values()
            .filter(|record| record.owner_uid.as_deref() == Some(owner_uid))
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(owned)
    }

    async fn query(&self, filter: &TeacherFilter) -> Result<Vec<BoardRecord>> {
        Ok(Self::matching(&self.lock(), filter))
    }

    async fn subscribe(&self, filter: TeacherFilter) -> Result<Subscription> {
        if self.deny_subscriptions.load(Ordering::SeqCst) {
            return Err(Error::permission_denied(
                BOARDS_COLLECTION,
                format!("live query for '{filter}' denied"),
            ));
        }

        let boards = self.lock();
        let initial = Self::matching(&boards, &filter);
        Ok(self.feed.register(filter, initial))
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn add_student(&self, section: &str, name: &str) -> Result<Student> {
        validate_section(section)?;
        self.check_write(section)?;

        let student = Student::new(name, Utc::now())?;
        self.rosters()
            .entry(section.to_string())
            .or_default()
            .push(student.clone());
        info!(section, student_id = %student.id, "Added student");
        Ok(student)
    }

    async fn remove_student(&self, section: &str, student_id: &str) -> Result<bool> {
        self.check_write(section)?;

        let mut rosters = self.rosters();
        let Some(roster) = rosters.get_mut(section) else {
            return Ok(false);
        };
        let before = roster.len();
        roster.retain(|s| s.id != student_id);
        Ok(roster.len() < before)
    }

    async fn students(&self, section: &str) -> Result<Vec<Student>> {
        let mut roster = self.rosters().get(section).cloned().unwrap_or_default();
        sort_roster(&mut roster);
        Ok(roster)
    }

    async fn mark(
        &self,
        section: &str,
        date: NaiveDate,
        student_id: &str,
        status: AttendanceStatus,
    ) -> Result<AttendanceSheet> {
        self.check_write(section)?;

        let enrolled = self
            .rosters()
            .get(section)
            .is_some_and(|roster| roster.iter().any(|s| s.id == student_id));
        if !enrolled {
            return Err(Error::StudentNotFound {
                section: section.to_string(),
                student_id: student_id.to_string(),
            });
        }

        let mut sheets = self.sheets();
        let marks = sheets.entry((section.to_string(), date)).or_default();
        marks.insert(student_id.to_string(), status);
        debug!(section, %date, student_id, %status, "Marked attendance");
        Ok(Self::to_sheet(section, date, Some(marks)))
    }

    async fn sheet(&self, section: &str, date: NaiveDate) -> Result<AttendanceSheet> {
        let sheets = self.sheets();
        Ok(Self::to_sheet(
            section,
            date,
            sheets.get(&(section.to_string(), date)),
        ))
    }

    async fn reset_day(&self, section: &str, date: NaiveDate) -> Result<bool> {
        self.check_write(section)?;
        Ok(self
            .sheets()
            .remove(&(section.to_string(), date))
            .is_some_and(|marks| !marks.is_empty()))
    }

    async fn sheets_between(
        &self,
        section: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceSheet>> {
        if from > to {
            return Ok(Vec::new());
        }
        let sheets = self.sheets();
        Ok(sheets
            .range((section.to_string(), from)..=(section.to_string(), to))
            .filter(|(_, marks)| !marks.is_empty())
            .map(|((_, date), marks)| Self::to_sheet(section, *date, Some(marks)))
            .collect())
    }
}
