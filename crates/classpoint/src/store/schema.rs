//! `SQLite` schema for the local board store.
//!
//! The statements here create the version 1 layout. Later columns are added
//! by [`super::migrations`].

/// The shared board collection, one row per board.
pub const CREATE_BOARDS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS boards (
    board_id TEXT PRIMARY KEY NOT NULL,
    display_name TEXT,
    expected_teacher_name TEXT,
    last_updated TEXT
)
";

/// Live queries filter on the expected teacher.
pub const CREATE_EXPECTED_TEACHER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_boards_expected_teacher ON boards(expected_teacher_name)
";

/// Key-value metadata, holds the schema version.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All base schema statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_BOARDS_TABLE,
    CREATE_EXPECTED_TEACHER_INDEX,
    CREATE_METADATA_TABLE,
];

/// Registration columns added in schema version 2.
pub const ADD_REGISTRATION_COLUMNS: &[&str] = &[
    "ALTER TABLE boards ADD COLUMN owner_uid TEXT",
    "ALTER TABLE boards ADD COLUMN location TEXT",
    "ALTER TABLE boards ADD COLUMN created_at TEXT",
    "CREATE INDEX IF NOT EXISTS idx_boards_owner ON boards(owner_uid)",
];

/// Rosters and attendance marks added in schema version 3.
///
/// One mark row per student and day, so marking a student rewrites only
/// that row.
pub const ADD_ATTENDANCE_TABLES: &[&str] = &[
    r"
CREATE TABLE IF NOT EXISTS students (
    section TEXT NOT NULL,
    student_id TEXT NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (section, student_id)
)
",
    r"
CREATE TABLE IF NOT EXISTS attendance (
    section TEXT NOT NULL,
    date TEXT NOT NULL,
    student_id TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('present', 'absent')),
    marked_at TEXT NOT NULL,
    PRIMARY KEY (section, date, student_id)
)
",
];

/// Column list used by every board select.
pub const BOARD_COLUMNS: &str =
    "board_id, display_name, expected_teacher_name, last_updated, owner_uid, location, created_at";
