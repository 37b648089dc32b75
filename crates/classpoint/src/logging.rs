//! Logging setup for boards and the CLI.
//!
//! Output goes through `tracing`. The filter comes from `CLASSPOINT_LOG`,
//! then `RUST_LOG`, then the per-module defaults of the chosen
//! [`Verbosity`]. Everything a running board logs is wrapped in a `board`
//! span carrying its id (see [`board_span`]), so several boards sharing one
//! process or one terminal stay tellable apart.

use tracing::{info_span, Level, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "CLASSPOINT_LOG";

/// How much a board reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Session lifecycle, registrations, failed writes.
    #[default]
    Normal,
    /// Every publish and destination change.
    Verbose,
    /// Live query traffic as well.
    Trace,
}

impl Verbosity {
    /// Pick a verbosity from the `-q` and `-v` command-line flags.
    #[must_use]
    pub fn from_flags(quiet: bool, verbose: u8) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, 0) => Self::Normal,
            (false, 1) => Self::Verbose,
            (false, _) => Self::Trace,
        }
    }

    /// Level applied to the crate as a whole.
    #[must_use]
    pub fn level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Filter directives used when no environment filter is set.
    ///
    /// The live query feed logs every open, cancel and skipped delivery, so
    /// it is held one step below the rest of the crate until `Trace`.
    #[must_use]
    pub fn directives(self) -> String {
        let feed = match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::WARN,
            Self::Verbose => Level::INFO,
            Self::Trace => Level::TRACE,
        };
        format!(
            "classpoint={},classpoint::store::feed={}",
            self.level(),
            feed
        )
    }
}

fn env_filter(verbosity: Verbosity) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directives()))
}

/// Install the global subscriber.
///
/// Module targets are only printed from `Verbose` up. Calling this again
/// is harmless; the first subscriber stays installed.
///
/// ```no_run
/// use classpoint::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::from_flags(false, 1));
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let layer = fmt::layer()
        .with_target(verbosity >= Verbosity::Verbose)
        .with_file(false)
        .with_line_number(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter(verbosity))
        .with(layer)
        .try_init();
}

/// Span wrapping everything one board does.
#[must_use]
pub fn board_span(board_id: &str) -> Span {
    info_span!("board", board_id = %board_id)
}

/// Quiet subscriber for tests, warnings and errors only.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
