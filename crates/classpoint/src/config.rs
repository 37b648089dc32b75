//! Configuration management for classpoint.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::board::validate_board_id;
use crate::error::{Error, Result};
use crate::schedule::TickerConfig;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "classpoint";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "boards.db";

/// Default timetable file name.
const TIMETABLE_FILE_NAME: &str = "timetable.json";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `CLASSPOINT_`, sections separated
///    by a double underscore, e.g. `CLASSPOINT_BOARD__ID`)
/// 2. TOML config file at `~/.config/classpoint/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// This board's identity.
    pub board: BoardConfig,
    /// Timetable and tick settings.
    pub schedule: ScheduleConfig,
    /// Board store settings.
    pub store: StoreConfig,
}

/// Identity of the board this process runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Stable board identifier. Required to run or publish.
    pub id: Option<String>,
    /// Classroom label shown on other boards. Defaults to the board id.
    pub display_name: Option<String>,
    /// Timetable section this board follows.
    pub section: Option<String>,
}

/// Schedule-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Path to the timetable JSON file.
    /// Defaults to `~/.local/share/classpoint/timetable.json`
    pub timetable_path: Option<PathBuf>,
    /// Seconds between schedule recomputations.
    pub tick_interval_secs: u64,
    /// Minutes before a class at which the reminder fires.
    pub reminder_minutes: u32,
}

/// Which store implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// `SQLite` file shared by the boards of one machine.
    #[default]
    Sqlite,
    /// In-process only; nothing survives a restart.
    Memory,
}

/// Store-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store implementation.
    pub backend: StoreBackend,
    /// Path to the database file.
    /// Defaults to `~/.local/share/classpoint/boards.db`
    pub database_path: Option<PathBuf>,
    /// How often to look for writes from other processes, in milliseconds.
    pub change_poll_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timetable_path: None,
            tick_interval_secs: 60,
            reminder_minutes: 2,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            database_path: None,
            change_poll_ms: 500,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("CLASSPOINT_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if let Some(id) = &self.board.id {
            validate_board_id(id).map_err(|e| Error::ConfigValidation {
                message: format!("board.id: {e}"),
            })?;
        }

        if self.schedule.tick_interval_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "tick_interval_secs must be greater than 0".to_string(),
            });
        }

        if self.store.change_poll_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "change_poll_ms must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Get the board id, failing if none is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if `board.id` is unset.
    pub fn board_id(&self) -> Result<&str> {
        self.board.id.as_deref().ok_or_else(|| Error::ConfigValidation {
            message: "board.id is not set".to_string(),
        })
    }

    /// Get the display name, falling back to the board id.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.board
            .display_name
            .as_deref()
            .or(self.board.id.as_deref())
    }

    /// Display name to publish for `board_id`.
    ///
    /// The configured name belongs to `board.id`; any other board is shown
    /// under its own id.
    #[must_use]
    pub fn display_name_for<'a>(&'a self, board_id: &'a str) -> &'a str {
        if self.board.id.as_deref() == Some(board_id) {
            self.display_name().unwrap_or(board_id)
        } else {
            board_id
        }
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.store
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the timetable path, resolving defaults if not set.
    #[must_use]
    pub fn timetable_path(&self) -> PathBuf {
        self.schedule
            .timetable_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(TIMETABLE_FILE_NAME))
    }

    /// Get the tick interval as a Duration.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.tick_interval_secs)
    }

    /// Get the change poll interval as a Duration.
    #[must_use]
    pub fn change_poll_interval(&self) -> Duration {
        Duration::from_millis(self.store.change_poll_ms)
    }

    /// Ticker settings derived from the schedule section.
    #[must_use]
    pub fn ticker_config(&self) -> TickerConfig {
        TickerConfig {
            tick_interval: self.tick_interval(),
            reminder_minutes: self.schedule.reminder_minutes,
        }
    }
}
