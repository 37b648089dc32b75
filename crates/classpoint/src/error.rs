//! Error types for classpoint.
//!
//! This module defines all error types used throughout the classpoint crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for classpoint operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// The store refused the operation.
    #[error("permission denied on '{target}': {message}")]
    PermissionDenied {
        /// Board or section the operation targeted.
        target: String,
        /// Description of the refusal.
        message: String,
    },

    /// A live query was closed by the store.
    #[error("subscription closed: {0}")]
    SubscriptionClosed(String),

    // === Board Errors ===
    /// A board identifier is empty or malformed.
    #[error("invalid board id '{id}': {reason}")]
    InvalidBoardId {
        /// The rejected identifier.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No board record exists for the given identifier.
    #[error("board not found: {0}")]
    BoardNotFound(String),

    // === Attendance Errors ===
    /// A student name or section failed validation.
    #[error("invalid student: {message}")]
    InvalidStudent {
        /// Description of the validation failure.
        message: String,
    },

    /// The student is not on the section's roster.
    #[error("student '{student_id}' not found in section '{section}'")]
    StudentNotFound {
        /// Section that was searched.
        section: String,
        /// The missing student.
        student_id: String,
    },

    /// A calendar date or month could not be parsed.
    #[error("invalid date '{value}', expected {expected}")]
    InvalidDate {
        /// The rejected value.
        value: String,
        /// The accepted format.
        expected: &'static str,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Timetable Errors ===
    /// A clock time string could not be parsed.
    #[error("invalid time '{value}', expected HH:MM")]
    InvalidClockTime {
        /// The rejected value.
        value: String,
    },

    /// A class period failed validation.
    #[error("invalid class period: {message}")]
    InvalidClass {
        /// Description of the validation failure.
        message: String,
    },

    /// A class period overlaps an existing one.
    #[error("time slot {start}-{end} conflicts with existing class '{existing}'")]
    ScheduleConflict {
        /// Start of the rejected period.
        start: String,
        /// End of the rejected period.
        end: String,
        /// Subject of the period already occupying the slot.
        existing: String,
    },

    /// Failed to load a timetable file.
    #[error("failed to load timetable from {path}: {message}")]
    TimetableLoad {
        /// Path to the timetable file.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for classpoint operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create an invalid board id error.
    #[must_use]
    pub fn invalid_board_id(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidBoardId {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a permission denied error.
    #[must_use]
    pub fn permission_denied(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create an invalid class error.
    #[must_use]
    pub fn invalid_class(message: impl Into<String>) -> Self {
        Self::InvalidClass {
            message: message.into(),
        }
    }

    /// Check if this error is a permission issue.
    #[must_use]
    pub fn is_permission_error(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// Create an invalid student error.
    #[must_use]
    pub fn invalid_student(message: impl Into<String>) -> Self {
        Self::InvalidStudent {
            message: message.into(),
        }
    }

    /// Check if this error means the board or student does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BoardNotFound(_) | Self::StudentNotFound { .. })
    }
}
