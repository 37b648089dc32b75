//! One running classroom board.
//!
//! A [`BoardSession`] connects the schedule ticker to the presence publisher
//! and the destination resolver:
//!
//! - every schedule change republishes the board's expected teacher;
//! - a change of the teacher currently in the room re-targets the resolver.
//!
//! [`BoardSession::spawn`] runs this on a background task and returns a
//! [`SessionHandle`] for observing the board and shutting it down.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use crate::board::TeacherDestination;
use crate::error::Result;
use crate::logging::board_span;
use crate::publisher::PresencePublisher;
use crate::resolver::DestinationResolver;
use crate::schedule::{ScheduleSnapshot, ScheduleTicker};
use crate::store::SharedStore;

/// The wiring of one board.
#[derive(Debug)]
pub struct BoardSession {
    publisher: PresencePublisher,
    resolver: DestinationResolver,
    ticker: ScheduleTicker,
    watched_teacher: Option<String>,
    last_publish: Option<JoinHandle<()>>,
}

impl BoardSession {
    /// Create a session for `board_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the board id is invalid.
    pub fn new(
        store: SharedStore,
        board_id: impl Into<String>,
        display_name: impl Into<String>,
        ticker: ScheduleTicker,
    ) -> Result<Self> {
        let publisher = PresencePublisher::new(store.clone(), board_id, display_name)?;
        Ok(Self {
            publisher,
            resolver: DestinationResolver::new(store),
            ticker,
            watched_teacher: None,
            last_publish: None,
        })
    }

    /// The ticker driving this board.
    #[must_use]
    pub fn ticker(&self) -> &ScheduleTicker {
        &self.ticker
    }

    /// The board's resolver.
    #[must_use]
    pub fn resolver(&self) -> &DestinationResolver {
        &self.resolver
    }

    /// React to a schedule snapshot.
    ///
    /// Publishes presence without waiting for the write, and re-targets the
    /// resolver when the current teacher differs from the one being watched.
    /// A publish still in flight from an earlier snapshot can no longer land
    /// after this one.
    pub async fn apply(&mut self, snapshot: &ScheduleSnapshot) {
        self.last_publish = Some(self.publisher.publish_presence(snapshot.next.clone()));

        let teacher = snapshot.current_teacher().map(str::to_string);
        if teacher != self.watched_teacher {
            debug!(
                board_id = %self.publisher.board_id(),
                from = self.watched_teacher.as_deref().unwrap_or("-"),
                to = teacher.as_deref().unwrap_or("-"),
                "Current teacher changed"
            );
            self.resolver.watch_destination(teacher.as_deref()).await;
            self.watched_teacher = teacher;
        }
    }

    /// Run the board on a background task.
    #[must_use]
    pub fn spawn(self) -> SessionHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let schedule = self.ticker.subscribe();
        let destination = self.resolver.subscribe();
        let ticker = self.ticker.clone();
        let board_id = self.publisher.board_id().to_string();

        let task = tokio::spawn(self.run(shutdown_rx).instrument(board_span(&board_id)));

        SessionHandle {
            board_id,
            shutdown_tx,
            schedule,
            destination,
            ticker,
            task,
        }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Board session started");

        let ticker_task = tokio::spawn(
            {
                let ticker = self.ticker.clone();
                let shutdown = shutdown.clone();
                async move { ticker.run(shutdown).await }
            }
            .in_current_span(),
        );

        let mut schedule = self.ticker.subscribe();
        let initial = schedule.borrow_and_update().clone();
        self.apply(&initial).await;

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                changed = schedule.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = schedule.borrow_and_update().clone();
                    self.apply(&snapshot).await;
                }
            }
        }

        self.ticker.stop();
        self.resolver.dispose();
        if let Some(publish) = self.last_publish.take() {
            // Wait for the last presence write
            let _ = publish.await;
        }
        if let Err(e) = ticker_task.await {
            warn!(error = %e, "Schedule ticker task failed");
        }
        info!("Board session stopped");
    }
}

/// Handle to a running [`BoardSession`].
#[derive(Debug)]
pub struct SessionHandle {
    board_id: String,
    shutdown_tx: watch::Sender<bool>,
    schedule: watch::Receiver<ScheduleSnapshot>,
    destination: watch::Receiver<Option<TeacherDestination>>,
    ticker: ScheduleTicker,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// The board being run.
    #[must_use]
    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    /// The board's ticker, for forcing recomputation or changing section.
    #[must_use]
    pub fn ticker(&self) -> &ScheduleTicker {
        &self.ticker
    }

    /// Receive schedule changes.
    #[must_use]
    pub fn schedule(&self) -> watch::Receiver<ScheduleSnapshot> {
        self.schedule.clone()
    }

    /// Receive destination changes.
    #[must_use]
    pub fn destination(&self) -> watch::Receiver<Option<TeacherDestination>> {
        self.destination.clone()
    }

    /// The alert banner text, if there is one to show.
    #[must_use]
    pub fn alert(&self) -> Option<String> {
        self.destination
            .borrow()
            .as_ref()
            .map(TeacherDestination::alert_message)
    }

    /// Stop the session and wait for it to finish.
    pub async fn shutdown(self) {
        debug!(board_id = %self.board_id, "Shutting down board session");
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(board_id = %self.board_id, error = %e, "Board session task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{NaiveDate, NaiveDateTime};
    use tokio::time::timeout;

    use super::*;
    use crate::schedule::{FixedClock, TickerConfig};
    use crate::store::{DocumentStore, MemoryStore};
    use crate::timetable::{ClassPeriod, ClockTime, Day, Timetable};

    const WAIT: Duration = Duration::from_secs(2);

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        // A Monday
        NaiveDate::from_ymd_opt(2024, 9, 2)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn period(subject: &str, teacher: &str, start: u32, end: u32) -> ClassPeriod {
        ClassPeriod {
            subject: subject.to_string(),
            teacher: teacher.to_string(),
            location: None,
            start_time: ClockTime::from_hm(start, 0).unwrap(),
            end_time: ClockTime::from_hm(end, 0).unwrap(),
        }
    }

    /// Section "a" has Ms. Lee at 9 then Dr. Patel at 10;
    /// section "b" has Mr. Singh at 9 then Ms. Lee at 10.
    fn timetable() -> Timetable {
        let mut timetable = Timetable::default();
        timetable
            .add_class("a", Day::Monday, period("Maths", "Ms. Lee", 9, 10))
            .unwrap();
        timetable
            .add_class("a", Day::Monday, period("Physics", "Dr. Patel", 10, 11))
            .unwrap();
        timetable
            .add_class("b", Day::Monday, period("History", "Mr. Singh", 9, 10))
            .unwrap();
        timetable
            .add_class("b", Day::Monday, period("Maths", "Ms. Lee", 10, 11))
            .unwrap();
        timetable
    }

    fn session(
        store: &Arc<MemoryStore>,
        clock: &Arc<FixedClock>,
        board_id: &str,
        name: &str,
        section: &str,
    ) -> BoardSession {
        let ticker = ScheduleTicker::new(
            clock.clone(),
            timetable(),
            section,
            TickerConfig::default(),
        );
        BoardSession::new(store.clone(), board_id, name, ticker).unwrap()
    }

    #[tokio::test]
    async fn test_apply_publishes_and_watches() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(at(9, 30)));
        let mut board = session(&store, &clock, "room-204", "Room 204", "a");

        let snapshot = board.ticker().snapshot();
        board.apply(&snapshot).await;
        if let Some(publish) = board.last_publish.take() {
            publish.await.unwrap();
        }

        let record = store.get("room-204").await.unwrap().unwrap();
        assert_eq!(record.expected_teacher_name.as_deref(), Some("Dr. Patel"));
        assert_eq!(store.subscriber_count(), 1);
        assert_eq!(board.watched_teacher.as_deref(), Some("Ms. Lee"));
    }

    #[tokio::test]
    async fn test_same_teacher_does_not_resubscribe() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(at(9, 30)));
        let mut board = session(&store, &clock, "room-204", "Room 204", "a");

        let snapshot = board.ticker().snapshot();
        board.apply(&snapshot).await;
        let rx = board.resolver().subscribe();
        board.apply(&snapshot).await;

        // Re-watching would have cleared the destination
        assert!(!rx.has_changed().unwrap());
        assert_eq!(store.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_two_boards_hand_off_teacher() {
        crate::logging::init_test_logging();
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(at(9, 30)));

        // Board B expects Ms. Lee next; board A has her now
        let board_b = session(&store, &clock, "room-310", "Room 310", "b").spawn();
        let board_a = session(&store, &clock, "room-204", "Room 204", "a").spawn();

        let mut dest = board_a.destination();
        timeout(WAIT, dest.wait_for(Option::is_some))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            board_a.alert().as_deref(),
            Some("Ms. Lee, your next class is in Room 310")
        );
        assert!(board_b.alert().is_none());

        // 10:30: board B has Ms. Lee in the room and expects nobody
        clock.set(at(10, 30));
        board_b.ticker().recompute();
        board_a.ticker().recompute();

        timeout(WAIT, dest.wait_for(Option::is_none))
            .await
            .unwrap()
            .unwrap();

        board_a.shutdown().await;
        board_b.shutdown().await;
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_ticker() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(at(9, 30)));
        let handle = session(&store, &clock, "room-204", "Room 204", "a").spawn();
        assert_eq!(handle.board_id(), "room-204");

        let ticker = handle.ticker().clone();
        let mut schedule = handle.schedule();
        assert_eq!(schedule.borrow_and_update().current_teacher(), Some("Ms. Lee"));

        handle.shutdown().await;
        assert!(!ticker.is_running());
        assert_eq!(store.subscriber_count(), 0);
    }
}
