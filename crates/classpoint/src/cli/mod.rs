//! Command-line interface for classpoint.
//!
//! This module provides the CLI structure for the `classpoint` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AttendanceCommand, BoardCommand, ConfigCommand, OutputFormat, PublishCommand, RunCommand, ScheduleCommand,
    StatusCommand, WhereisCommand,
};

/// classpoint - Tell every teacher where their next class is
///
/// Runs a classroom board: follows the section's timetable, announces which
/// teacher the room expects next, and shows the current teacher which room
/// is waiting for them.
#[derive(Debug, Parser)]
#[command(name = "classpoint")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run this board until interrupted
    Run(RunCommand),

    /// Write this board's expected teacher once
    Publish(PublishCommand),

    /// Find the board expecting a teacher
    Whereis(WhereisCommand),

    /// Show the current, next and remaining classes
    Schedule(ScheduleCommand),

    /// Manage registered boards
    #[command(subcommand)]
    Board(BoardCommand),

    /// Manage section rosters and attendance
    #[command(subcommand)]
    Attendance(AttendanceCommand),

    /// Show board and store status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.quiet, self.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn cli(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            command: Command::Status(StatusCommand { json: false }),
        }
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "classpoint");
    }

    #[test]
    fn test_verbosity_levels() {
        use crate::logging::Verbosity;

        assert_eq!(cli(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(cli(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(cli(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(cli(3, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from(["classpoint", "run", "-s", "grade10-a1"]).unwrap();
        let Command::Run(run) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(run.section.as_deref(), Some("grade10-a1"));
        assert!(run.board.is_none());
    }

    #[test]
    fn test_parse_publish_without_teacher() {
        let cli = Cli::try_parse_from(["classpoint", "publish", "-b", "room-204"]).unwrap();
        let Command::Publish(publish) = cli.command else {
            panic!("expected publish");
        };
        assert_eq!(publish.board.as_deref(), Some("room-204"));
        assert!(publish.teacher.is_none());
    }

    #[test]
    fn test_parse_whereis() {
        let cli = Cli::try_parse_from(["classpoint", "whereis", "Ms. Lee"]).unwrap();
        assert!(matches!(cli.command, Command::Whereis(ref w) if w.teacher == "Ms. Lee"));
    }

    #[test]
    fn test_parse_board_register() {
        let args = [
            "classpoint", "board", "register", "-o", "uid-1", "-n", "Room 204", "-l", "Block B",
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(
            cli.command,
            Command::Board(BoardCommand::Register { .. })
        ));
    }

    #[test]
    fn test_parse_board_list_json() {
        let cli = Cli::try_parse_from(["classpoint", "board", "list", "-f", "json"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Board(BoardCommand::List {
                format: OutputFormat::Json,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_attendance_mark() {
        let args = [
            "classpoint", "attendance", "mark", "s-1", "absent", "-d", "2024-03-04", "-s", "grade10-a1",
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        let Command::Attendance(AttendanceCommand::Mark {
            student_id,
            status,
            date,
            section,
        }) = cli.command
        else {
            panic!("expected attendance mark");
        };
        assert_eq!(student_id, "s-1");
        assert_eq!(status, "absent");
        assert_eq!(date.as_deref(), Some("2024-03-04"));
        assert_eq!(section.as_deref(), Some("grade10-a1"));
    }

    #[test]
    fn test_parse_attendance_mark_defaults_present() {
        let cli = Cli::try_parse_from(["classpoint", "attendance", "mark", "s-1"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Attendance(AttendanceCommand::Mark { ref status, .. }) if status == "present"
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let args = ["classpoint", "-c", "/custom/config.toml", "status"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_with_verbose_and_quiet() {
        let cli = Cli::try_parse_from(["classpoint", "-vv", "status"]).unwrap();
        assert_eq!(cli.verbose, 2);

        let cli = Cli::try_parse_from(["classpoint", "-q", "status"]).unwrap();
        assert!(cli.quiet);
    }
}
