//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

/// Run command arguments.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Board id (overrides `board.id`)
    #[arg(short, long)]
    pub board: Option<String>,

    /// Timetable section to follow (overrides `board.section`)
    #[arg(short, long)]
    pub section: Option<String>,

    /// Timetable file (overrides `schedule.timetable_path`)
    #[arg(short, long, value_name = "FILE")]
    pub timetable: Option<PathBuf>,
}

/// Publish command arguments.
#[derive(Debug, Args)]
pub struct PublishCommand {
    /// Board id (overrides `board.id`)
    #[arg(short, long)]
    pub board: Option<String>,

    /// Teacher expected next; omit to clear
    #[arg(short, long)]
    pub teacher: Option<String>,
}

/// Whereis command arguments.
#[derive(Debug, Args)]
pub struct WhereisCommand {
    /// Teacher to look up
    pub teacher: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Schedule command arguments.
#[derive(Debug, Args)]
pub struct ScheduleCommand {
    /// Timetable section (overrides `board.section`)
    #[arg(short, long)]
    pub section: Option<String>,

    /// Timetable file (overrides `schedule.timetable_path`)
    #[arg(short, long, value_name = "FILE")]
    pub timetable: Option<PathBuf>,

    /// Evaluate at this time of day instead of now (HH:MM)
    #[arg(long)]
    pub at: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Board registry commands.
#[derive(Debug, Subcommand)]
pub enum BoardCommand {
    /// Register a new board under a generated id
    Register {
        /// Owner user id
        #[arg(short, long)]
        owner: String,

        /// Classroom name
        #[arg(short, long)]
        name: String,

        /// Building or floor
        #[arg(short, long, default_value = "")]
        location: String,
    },

    /// List boards
    List {
        /// Only boards registered by this owner
        #[arg(short, long)]
        owner: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show one board record
    Show {
        /// Board id
        board_id: String,
    },

    /// Check that a board belongs to an owner
    Connect {
        /// Board id
        board_id: String,

        /// Owner user id
        #[arg(short, long)]
        owner: String,
    },

    /// Delete a board record
    Remove {
        /// Board id
        board_id: String,
    },
}

/// Roster and attendance commands.
#[derive(Debug, Subcommand)]
pub enum AttendanceCommand {
    /// List a section's students
    Students {
        /// Timetable section (overrides `board.section`)
        #[arg(short, long)]
        section: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Add a student to a section
    AddStudent {
        /// Student name
        name: String,

        /// Timetable section (overrides `board.section`)
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Remove a student from a section; past marks are kept
    RemoveStudent {
        /// Student id
        student_id: String,

        /// Timetable section (overrides `board.section`)
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Mark one student for a day
    Mark {
        /// Student id
        student_id: String,

        /// present, absent or late (counted as present)
        #[arg(default_value = "present")]
        status: String,

        /// Day to mark (YYYY-MM-DD), today if omitted
        #[arg(short, long)]
        date: Option<String>,

        /// Timetable section (overrides `board.section`)
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Show the marks of one day
    Show {
        /// Day to show (YYYY-MM-DD), today if omitted
        #[arg(short, long)]
        date: Option<String>,

        /// Timetable section (overrides `board.section`)
        #[arg(short, long)]
        section: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Clear every mark of one day
    Reset {
        /// Day to clear (YYYY-MM-DD)
        date: String,

        /// Timetable section (overrides `board.section`)
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Monthly attendance grid
    Report {
        /// Month (YYYY-MM), current month if omitted
        #[arg(short, long)]
        month: Option<String>,

        /// Timetable section (overrides `board.section`)
        #[arg(short, long)]
        section: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}
