//! `classpoint` - Next-teacher handoff for classroom boards
//!
//! Every classroom board announces which teacher it expects for its next
//! period and watches, through a live query, for the board that expects its
//! current teacher. The result is a single line on the board: where the
//! teacher in the room has to go next. Boards also keep each section's
//! roster and daily attendance.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod attendance;
pub mod board;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod publisher;
pub mod resolver;
pub mod schedule;
pub mod session;
pub mod store;
pub mod timetable;

pub use attendance::{AttendanceSheet, AttendanceStatus, Student};
pub use board::{BoardRecord, TeacherDestination};
pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use publisher::PresencePublisher;
pub use resolver::{DestinationResolver, ResolverState};
pub use schedule::{ScheduleSnapshot, ScheduleTicker};
pub use session::{BoardSession, SessionHandle};
pub use store::{AttendanceStore, DocumentStore, MemoryStore, SqliteStore};
