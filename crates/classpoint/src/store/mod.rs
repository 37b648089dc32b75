//! The shared board collection and its live queries.
//!
//! [`DocumentStore`] is the only thing the publisher and resolver know about
//! the backend. Two implementations ship with the crate:
//!
//! - [`MemoryStore`], a process-local store used by tests and single-process
//!   setups.
//! - [`SqliteStore`], a `SQLite` file that several boards on the same machine
//!   can share.
//!
//! Both also keep section rosters and attendance sheets behind
//! [`AttendanceStore`].

mod feed;
mod memory;
pub mod migrations;
pub mod schema;
mod sqlite;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::attendance::{AttendanceSheet, AttendanceStatus, MonthReport, Student};
use crate::board::{BoardFields, BoardRecord};
use crate::config::{Config, StoreBackend};
use crate::error::{Error, Result};

pub use feed::{CancelHandle, LiveQueryFeed, QuerySnapshot, SnapshotEvent, Subscription};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Equality filter on `expectedTeacherName`.
///
/// An empty value matches no record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TeacherFilter(String);

impl TeacherFilter {
    /// Filter for boards expecting `teacher`.
    #[must_use]
    pub fn new(teacher: impl Into<String>) -> Self {
        Self(teacher.into())
    }

    /// The teacher name being matched.
    #[must_use]
    pub fn teacher(&self) -> &str {
        &self.0
    }

    /// Whether the filter can never match.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Whether `record` is in this filter's result set.
    #[must_use]
    pub fn matches(&self, record: &BoardRecord) -> bool {
        !self.is_empty() && record.expects(&self.0)
    }
}

impl fmt::Display for TeacherFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Access to the shared board collection.
#[async_trait]
pub trait DocumentStore: Send + Sync + fmt::Debug {
    /// Merge `fields` into the record for `board_id`, creating it if needed.
    ///
    /// Fields not set in the patch keep their stored value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected or fails.
    async fn upsert(&self, board_id: &str, fields: BoardFields) -> Result<BoardRecord>;

    /// Fetch one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn get(&self, board_id: &str) -> Result<Option<BoardRecord>>;

    /// Delete one record. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected or fails.
    async fn delete(&self, board_id: &str) -> Result<bool>;

    /// All records, ordered by board id.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn list(&self) -> Result<Vec<BoardRecord>>;

    /// Records registered by `owner_uid`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn boards_owned_by(&self, owner_uid: &str) -> Result<Vec<BoardRecord>>;

    /// One-shot evaluation of a filter, ordered by board id.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn query(&self, filter: &TeacherFilter) -> Result<Vec<BoardRecord>>;

    /// Open a live query. The current result set is the first snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be established.
    async fn subscribe(&self, filter: TeacherFilter) -> Result<Subscription>;

    /// Register a new board under a generated id.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn register(&self, owner_uid: &str, name: &str, location: &str) -> Result<BoardRecord> {
        let board_id = uuid::Uuid::new_v4().to_string();
        let record = self
            .upsert(
                &board_id,
                BoardFields::registration(owner_uid, name, location, Utc::now()),
            )
            .await?;
        info!(board_id = %board_id, owner = %owner_uid, "Registered board");
        Ok(record)
    }

    /// Fetch a board on behalf of `owner_uid`, checking ownership.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoardNotFound`] if the board does not exist and
    /// [`Error::PermissionDenied`] if it belongs to someone else.
    async fn connect(&self, board_id: &str, owner_uid: &str) -> Result<BoardRecord> {
        let record = self
            .get(board_id)
            .await?
            .ok_or_else(|| Error::BoardNotFound(board_id.to_string()))?;
        if record.owner_uid.as_deref() != Some(owner_uid) {
            return Err(Error::permission_denied(
                board_id,
                "board is registered to another user",
            ));
        }
        Ok(record)
    }
}

/// Shared handle to a store, as injected into publishers and resolvers.
pub type SharedStore = Arc<dyn DocumentStore>;

/// Section rosters and per-day attendance sheets.
#[async_trait]
pub trait AttendanceStore: Send + Sync + fmt::Debug {
    /// Add a student to a section's roster under a generated id.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or section is blank or the write fails.
    async fn add_student(&self, section: &str, name: &str) -> Result<Student>;

    /// Remove a student from the roster. Their past marks are kept.
    ///
    /// Returns `true` if the student was on the roster.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn remove_student(&self, section: &str, student_id: &str) -> Result<bool>;

    /// The roster of a section, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn students(&self, section: &str) -> Result<Vec<Student>>;

    /// Set one student's mark for a day, leaving other marks untouched.
    ///
    /// Returns the whole sheet after the write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StudentNotFound`] if the student is not on the
    /// section's roster, or an error if the write fails.
    async fn mark(
        &self,
        section: &str,
        date: NaiveDate,
        student_id: &str,
        status: AttendanceStatus,
    ) -> Result<AttendanceSheet>;

    /// The sheet of one day; empty if nobody has been marked.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn sheet(&self, section: &str, date: NaiveDate) -> Result<AttendanceSheet>;

    /// Delete every mark of one day. Returns `true` if there were any.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn reset_day(&self, section: &str, date: NaiveDate) -> Result<bool>;

    /// Non-empty sheets from `from` to `to` inclusive, in date order.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn sheets_between(
        &self,
        section: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AttendanceSheet>>;

    /// Attendance grid of the current roster for one month.
    ///
    /// # Errors
    ///
    /// Returns an error if the month is invalid or a read fails.
    async fn month_report(&self, section: &str, year: i32, month: u32) -> Result<MonthReport> {
        let days = crate::attendance::school_days(year, month)?;
        let students = self.students(section).await?;
        let sheets = match (days.first(), days.last()) {
            (Some(from), Some(to)) => self.sheets_between(section, *from, *to).await?,
            _ => Vec::new(),
        };
        MonthReport::build(section, year, month, &students, &sheets)
    }
}

/// Shared handle to the attendance side of a store.
pub type SharedAttendance = Arc<dyn AttendanceStore>;

/// Open the store selected in `config`.
///
/// With `watch_changes`, a `SQLite` store also polls for writes made by
/// other processes; this needs a running Tokio runtime.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
pub fn open_configured(config: &Config, watch_changes: bool) -> Result<SharedStore> {
    match config.store.backend {
        StoreBackend::Memory => {
            info!("Using in-memory board store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Sqlite => {
            let store = Arc::new(SqliteStore::open(config.database_path())?);
            if watch_changes {
                // Detached; the watcher exits once the store is dropped
                drop(store.spawn_change_watcher(config.change_poll_interval()));
            }
            Ok(store)
        }
    }
}

/// Open the attendance store selected in `config`.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
pub fn open_attendance(config: &Config) -> Result<SharedAttendance> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Sqlite => Ok(Arc::new(SqliteStore::open(config.database_path())?)),
    }
}
