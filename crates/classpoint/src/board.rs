//! Board records and the teacher destinations derived from them.
//!
//! A board record is the shared document each classroom board keeps in the
//! `boards` collection. A [`TeacherDestination`] is never stored; it is
//! computed locally from a live query over those records.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the shared collection holding board records.
pub const BOARDS_COLLECTION: &str = "boards";

/// Location shown when a matching board has no display name.
pub const UNKNOWN_LOCATION: &str = "Unknown Location";

/// Accepted shape of a board identifier.
const BOARD_ID_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9_.-]*$";

fn board_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(BOARD_ID_PATTERN).expect("board id pattern is valid"))
}

/// Check that a board identifier is non-empty and well formed.
///
/// # Errors
///
/// Returns [`Error::InvalidBoardId`] if the identifier is empty or contains
/// characters outside `[A-Za-z0-9_.-]`.
pub fn validate_board_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::invalid_board_id(id, "must not be empty"));
    }
    if !board_id_regex().is_match(id) {
        return Err(Error::invalid_board_id(
            id,
            format!("must match {BOARD_ID_PATTERN}"),
        ));
    }
    Ok(())
}

/// Treat blank teacher names as "no teacher".
#[must_use]
pub fn teacher_or_none(name: Option<&str>) -> Option<&str> {
    name.filter(|n| !n.trim().is_empty())
}

/// The shared document describing one classroom board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardRecord {
    /// Stable identifier of the board.
    pub board_id: String,

    /// Human-readable classroom label used in alerts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Teacher this board expects for its next period.
    #[serde(default)]
    pub expected_teacher_name: Option<String>,

    /// Time of the last presence write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    /// User that registered the board.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_uid: Option<String>,

    /// Free-form physical location given at registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// When the board was registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl BoardRecord {
    /// Create an empty record for the given board.
    #[must_use]
    pub fn new(board_id: impl Into<String>) -> Self {
        Self {
            board_id: board_id.into(),
            display_name: None,
            expected_teacher_name: None,
            last_updated: None,
            owner_uid: None,
            location: None,
            created_at: None,
        }
    }

    /// Whether this board expects the given teacher next.
    #[must_use]
    pub fn expects(&self, teacher: &str) -> bool {
        self.expected_teacher_name.as_deref() == Some(teacher)
    }
}

/// A shallow patch over a [`BoardRecord`].
///
/// Only fields set in the patch are written; everything else in the stored
/// record is left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardFields {
    /// New display name.
    pub display_name: Option<String>,
    /// New expected teacher; `Some(None)` clears the field.
    pub expected_teacher_name: Option<Option<String>>,
    /// New last-updated timestamp.
    pub last_updated: Option<DateTime<Utc>>,
    /// New owner.
    pub owner_uid: Option<String>,
    /// New physical location.
    pub location: Option<String>,
    /// New registration time.
    pub created_at: Option<DateTime<Utc>>,
}

impl BoardFields {
    /// The patch written by a presence update.
    #[must_use]
    pub fn presence(
        display_name: impl Into<String>,
        expected_teacher: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            display_name: Some(display_name.into()),
            expected_teacher_name: Some(teacher_or_none(expected_teacher).map(str::to_string)),
            last_updated: Some(now),
            ..Self::default()
        }
    }

    /// The patch written when a board is registered.
    #[must_use]
    pub fn registration(
        owner_uid: impl Into<String>,
        display_name: impl Into<String>,
        location: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            display_name: Some(display_name.into()),
            owner_uid: Some(owner_uid.into()),
            location: Some(location.into()),
            created_at: Some(now),
            ..Self::default()
        }
    }

    /// Merge this patch into `record`.
    pub fn apply_to(&self, record: &mut BoardRecord) {
        if let Some(name) = &self.display_name {
            record.display_name = Some(name.clone());
        }
        if let Some(teacher) = &self.expected_teacher_name {
            record.expected_teacher_name.clone_from(teacher);
        }
        if let Some(ts) = self.last_updated {
            record.last_updated = Some(ts);
        }
        if let Some(owner) = &self.owner_uid {
            record.owner_uid = Some(owner.clone());
        }
        if let Some(location) = &self.location {
            record.location = Some(location.clone());
        }
        if let Some(ts) = self.created_at {
            record.created_at = Some(ts);
        }
    }
}

/// Where the current teacher has to go next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherDestination {
    /// Display name of the board expecting the teacher.
    pub location: String,
    /// The teacher being sent there.
    pub teacher_name: String,
}

impl TeacherDestination {
    /// Build a destination from a matching record.
    #[must_use]
    pub fn from_match(record: &BoardRecord, teacher_name: &str) -> Self {
        let location = record
            .display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(UNKNOWN_LOCATION)
            .to_string();
        Self {
            location,
            teacher_name: teacher_name.to_string(),
        }
    }

    /// Text of the alert banner shown on the board.
    #[must_use]
    pub fn alert_message(&self) -> String {
        format!(
            "{}, your next class is in {}",
            self.teacher_name, self.location
        )
    }
}

/// Pick the destination for `teacher` out of a query result set.
///
/// When several boards expect the same teacher, the one with the smallest
/// board id wins, whatever order the store returned them in.
#[must_use]
pub fn select_destination(records: &[BoardRecord], teacher: &str) -> Option<TeacherDestination> {
    records
        .iter()
        .filter(|record| record.expects(teacher))
        .min_by(|a, b| a.board_id.cmp(&b.board_id))
        .map(|record| TeacherDestination::from_match(record, teacher))
}
