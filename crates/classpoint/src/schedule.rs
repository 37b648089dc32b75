//! Periodic schedule recomputation.
//!
//! The [`ScheduleTicker`] re-derives the board's current and next class on a
//! fixed interval and whenever the section or timetable changes. Consumers
//! watch the resulting [`ScheduleSnapshot`]; a new value is only sent when
//! the snapshot actually differs from the previous one.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{Datelike, Local, NaiveDateTime};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::timetable::{
    current_class, is_within_reminder_time, next_class, ClassPeriod, ClockTime, Day, Timetable,
};

/// Source of local wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current local date and time.
    fn now(&self) -> NaiveDateTime;
}

/// The system's local clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    /// Create a clock stopped at `now`.
    #[must_use]
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: NaiveDateTime) {
        *self.lock() = now;
    }

    /// Move the clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.lock();
        *now += by;
    }

    fn lock(&self) -> MutexGuard<'_, NaiveDateTime> {
        self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.lock()
    }
}

/// What the board's timetable says right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSnapshot {
    /// Section the snapshot was computed for.
    pub section: String,
    /// Day of the week.
    pub day: Day,
    /// Class in progress.
    pub current: Option<ClassPeriod>,
    /// Earliest class still to start today.
    pub next: Option<ClassPeriod>,
    /// Whether the next class starts within the reminder window.
    pub reminder_due: bool,
}

impl ScheduleSnapshot {
    /// Compute the snapshot for `section` at `now`.
    #[must_use]
    pub fn compute(
        timetable: &Timetable,
        section: &str,
        now: NaiveDateTime,
        reminder_minutes: u32,
    ) -> Self {
        let day = Day::from(now.weekday());
        let time = ClockTime::from_time(now.time());
        let schedule = timetable.day_schedule(section, day);

        let current = current_class(schedule, time).cloned();
        let next = next_class(schedule, time).cloned();
        let reminder_due = next
            .as_ref()
            .is_some_and(|p| is_within_reminder_time(p.start_time, time, reminder_minutes));

        Self {
            section: section.to_string(),
            day,
            current,
            next,
            reminder_due,
        }
    }

    /// Teacher of the class in progress.
    #[must_use]
    pub fn current_teacher(&self) -> Option<&str> {
        self.current.as_ref().map(|p| p.teacher.as_str())
    }

    /// Teacher of the next class.
    #[must_use]
    pub fn next_teacher(&self) -> Option<&str> {
        self.next.as_ref().map(|p| p.teacher.as_str())
    }
}

/// Ticker settings.
#[derive(Debug, Clone)]
pub struct TickerConfig {
    /// Time between recomputations.
    pub tick_interval: Duration,
    /// Minutes before a class at which the reminder fires.
    pub reminder_minutes: u32,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            reminder_minutes: 2,
        }
    }
}

#[derive(Debug)]
struct TickerState {
    timetable: Timetable,
    section: String,
}

/// Recomputes the schedule snapshot and broadcasts changes.
///
/// Cloning yields another handle to the same ticker.
#[derive(Debug, Clone)]
pub struct ScheduleTicker {
    clock: Arc<dyn Clock>,
    config: TickerConfig,
    state: Arc<Mutex<TickerState>>,
    snapshot: Arc<watch::Sender<ScheduleSnapshot>>,
    running: Arc<AtomicBool>,
}

impl ScheduleTicker {
    /// Create a ticker and compute the first snapshot.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        timetable: Timetable,
        section: impl Into<String>,
        config: TickerConfig,
    ) -> Self {
        let section = section.into();
        let initial =
            ScheduleSnapshot::compute(&timetable, &section, clock.now(), config.reminder_minutes);
        let (snapshot, _) = watch::channel(initial);
        Self {
            clock,
            config,
            state: Arc::new(Mutex::new(TickerState { timetable, section })),
            snapshot: Arc::new(snapshot),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ScheduleSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receive every snapshot change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ScheduleSnapshot> {
        self.snapshot.subscribe()
    }

    /// The section being followed.
    #[must_use]
    pub fn section(&self) -> String {
        self.lock().section.clone()
    }

    /// Recompute now. Returns `true` if the snapshot changed.
    pub fn recompute(&self) -> bool {
        let next = {
            let state = self.lock();
            ScheduleSnapshot::compute(
                &state.timetable,
                &state.section,
                self.clock.now(),
                self.config.reminder_minutes,
            )
        };

        let changed = self.snapshot.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });

        if changed {
            let snapshot = self.snapshot.borrow();
            debug!(
                section = %snapshot.section,
                current = snapshot.current_teacher().unwrap_or("-"),
                next = snapshot.next_teacher().unwrap_or("-"),
                "Schedule changed"
            );
        } else {
            trace!("Schedule unchanged");
        }
        changed
    }

    /// Replace the timetable and recompute.
    pub fn set_timetable(&self, timetable: Timetable) -> bool {
        self.lock().timetable = timetable;
        self.recompute()
    }

    /// Follow another section and recompute.
    pub fn set_section(&self, section: impl Into<String>) -> bool {
        self.lock().section = section.into();
        self.recompute()
    }

    /// Check if the tick loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Recompute on every tick until `stop()` is called or `shutdown` fires.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Schedule ticker already running");
            return;
        }
        if *shutdown.borrow() {
            self.running.store(false, Ordering::SeqCst);
            return;
        }

        debug!(
            interval_secs = self.config.tick_interval.as_secs(),
            "Starting schedule ticker"
        );

        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.recompute();
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        debug!("Schedule ticker stopped");
    }

    /// Stop the tick loop after its current iteration.
    pub fn stop(&self) {
        debug!("Stopping schedule ticker");
        self.running.store(false, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, TickerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        // 2024-09-02 is a Monday
        NaiveDate::from_ymd_opt(2024, 9, 2)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn period(subject: &str, teacher: &str, start: (u32, u32), end: (u32, u32)) -> ClassPeriod {
        ClassPeriod {
            subject: subject.to_string(),
            teacher: teacher.to_string(),
            location: None,
            start_time: ClockTime::from_hm(start.0, start.1).unwrap(),
            end_time: ClockTime::from_hm(end.0, end.1).unwrap(),
        }
    }

    fn timetable() -> Timetable {
        let mut timetable = Timetable::default();
        timetable
            .add_class("grade10-a1", Day::Monday, period("Maths", "Ms. Lee", (9, 0), (10, 0)))
            .unwrap();
        timetable
            .add_class("grade10-a1", Day::Monday, period("Physics", "Dr. Patel", (10, 0), (11, 0)))
            .unwrap();
        timetable
            .add_class("grade10-b1", Day::Monday, period("History", "Mr. Singh", (9, 0), (10, 0)))
            .unwrap();
        timetable
    }

    fn ticker(clock: &Arc<FixedClock>) -> ScheduleTicker {
        ScheduleTicker::new(
            clock.clone(),
            timetable(),
            "grade10-a1",
            TickerConfig::default(),
        )
    }

    #[test]
    fn test_snapshot_current_and_next() {
        let snapshot = ScheduleSnapshot::compute(&timetable(), "grade10-a1", at(9, 30), 2);
        assert_eq!(snapshot.day, Day::Monday);
        assert_eq!(snapshot.current_teacher(), Some("Ms. Lee"));
        assert_eq!(snapshot.next_teacher(), Some("Dr. Patel"));
        assert!(!snapshot.reminder_due);
    }

    #[test]
    fn test_snapshot_reminder_window() {
        let snapshot = ScheduleSnapshot::compute(&timetable(), "grade10-a1", at(9, 58), 2);
        assert!(snapshot.reminder_due);
    }

    #[test]
    fn test_snapshot_outside_school_hours() {
        let snapshot = ScheduleSnapshot::compute(&timetable(), "grade10-a1", at(18, 0), 2);
        assert!(snapshot.current.is_none());
        assert!(snapshot.next.is_none());

        let snapshot = ScheduleSnapshot::compute(&timetable(), "unknown", at(9, 30), 2);
        assert!(snapshot.current.is_none());
    }

    #[test]
    fn test_recompute_only_reports_changes() {
        let clock = Arc::new(FixedClock::new(at(9, 30)));
        let ticker = ticker(&clock);
        let rx = ticker.subscribe();

        assert!(!ticker.recompute());
        assert!(!rx.has_changed().unwrap());

        clock.set(at(10, 15));
        assert!(ticker.recompute());
        assert!(rx.has_changed().unwrap());
        assert_eq!(ticker.snapshot().current_teacher(), Some("Dr. Patel"));
        assert!(ticker.snapshot().next.is_none());
    }

    #[test]
    fn test_section_change_forces_recompute() {
        let clock = Arc::new(FixedClock::new(at(9, 30)));
        let ticker = ticker(&clock);

        assert!(ticker.set_section("grade10-b1"));
        assert_eq!(ticker.section(), "grade10-b1");
        assert_eq!(ticker.snapshot().current_teacher(), Some("Mr. Singh"));
    }

    #[test]
    fn test_timetable_change_forces_recompute() {
        let clock = Arc::new(FixedClock::new(at(9, 30)));
        let ticker = ticker(&clock);

        assert!(ticker.set_timetable(Timetable::default()));
        assert!(ticker.snapshot().current.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_until_shutdown() {
        let clock = Arc::new(FixedClock::new(at(9, 59)));
        let ticker = ticker(&clock);
        let mut rx = ticker.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn({
            let ticker = ticker.clone();
            async move { ticker.run(shutdown_rx).await }
        });

        clock.advance(chrono::Duration::minutes(2));
        tokio::time::advance(Duration::from_secs(61)).await;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().current_teacher(), Some("Dr. Patel"));
        assert!(ticker.is_running());

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        assert!(!ticker.is_running());
    }
}
