//! Push delivery of live query results.
//!
//! Every store owns one [`LiveQueryFeed`]. A subscription registers a filter
//! and receives the current result set straight away; after each write the
//! store calls [`LiveQueryFeed::publish`], and every subscriber whose result
//! set changed receives a fresh snapshot. Unchanged result sets are not
//! re-delivered, which is decided by a BLAKE3 fingerprint of the records.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::board::BoardRecord;
use crate::error::{Error, Result};

use super::TeacherFilter;

/// A complete result set for one live query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySnapshot {
    /// The filter this snapshot answers.
    pub filter: TeacherFilter,
    /// Matching records, ordered by board id.
    pub records: Vec<BoardRecord>,
    /// Position of this snapshot in its subscription, starting at 0.
    pub sequence: u64,
}

impl QuerySnapshot {
    /// Whether the result set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One item delivered by a subscription.
pub type SnapshotEvent = Result<QuerySnapshot>;

#[derive(Debug)]
struct Subscriber {
    id: u64,
    filter: TeacherFilter,
    tx: mpsc::UnboundedSender<SnapshotEvent>,
    fingerprint: Option<blake3::Hash>,
    sequence: u64,
}

impl Subscriber {
    /// Deliver `records` if they differ from the last delivery.
    ///
    /// Returns `false` once the receiving side is gone.
    fn offer(&mut self, records: Vec<BoardRecord>) -> bool {
        let fingerprint = fingerprint(&records);
        if self.fingerprint == Some(fingerprint) {
            trace!(subscription = self.id, "Result set unchanged");
            return !self.tx.is_closed();
        }
        self.fingerprint = Some(fingerprint);

        let snapshot = QuerySnapshot {
            filter: self.filter.clone(),
            records,
            sequence: self.sequence,
        };
        self.sequence += 1;
        self.tx.send(Ok(snapshot)).is_ok()
    }

    fn fail(&mut self, error: Error) -> bool {
        // Force the next good result set through, even if it matches the last one
        self.fingerprint = None;
        self.tx.send(Err(error)).is_ok()
    }
}

fn fingerprint(records: &[BoardRecord]) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    for record in records {
        match serde_json::to_vec(record) {
            Ok(bytes) => hasher.update(&bytes),
            Err(_) => hasher.update(record.board_id.as_bytes()),
        };
        hasher.update(b"\n");
    }
    hasher.finalize()
}

/// Registry of live queries for one store.
#[derive(Debug, Default)]
pub struct LiveQueryFeed {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl LiveQueryFeed {
    /// Create an empty feed.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open a live query and deliver `initial` as its first snapshot.
    ///
    /// Callers must hold whatever lock guards the data `initial` was read
    /// from, so no write can slip in between the read and the registration.
    pub fn register(self: &Arc<Self>, filter: TeacherFilter, initial: Vec<BoardRecord>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut subscriber = Subscriber {
            id,
            filter: filter.clone(),
            tx,
            fingerprint: None,
            sequence: 0,
        };
        subscriber.offer(initial);

        self.lock().push(subscriber);
        debug!(subscription = id, teacher = %filter, "Live query opened");

        Subscription {
            id,
            filter,
            rx,
            feed: Arc::downgrade(self),
        }
    }

    /// Re-run every live query and push the result sets that changed.
    ///
    /// `query` is evaluated once per subscriber. An error is delivered to
    /// that subscriber as a failed snapshot.
    pub fn publish<F>(&self, mut query: F)
    where
        F: FnMut(&TeacherFilter) -> Result<Vec<BoardRecord>>,
    {
        let mut subscribers = self.lock();
        subscribers.retain_mut(|subscriber| {
            let alive = match query(&subscriber.filter) {
                Ok(records) => subscriber.offer(records),
                Err(e) => subscriber.fail(e),
            };
            if !alive {
                debug!(subscription = subscriber.id, "Dropping closed live query");
            }
            alive
        });
    }

    /// Deliver an error to every open live query.
    pub fn fail_all(&self, message: &str) {
        let mut subscribers = self.lock();
        subscribers.retain_mut(|subscriber| {
            subscriber.fail(Error::SubscriptionClosed(message.to_string()))
        });
    }

    /// Number of open live queries.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn remove(&self, id: u64) {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        if subscribers.len() < before {
            debug!(subscription = id, "Live query cancelled");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An open live query.
///
/// The subscription is the only owner of its query. Dropping it, or calling
/// [`Subscription::cancel`], unregisters the query; no snapshot is delivered
/// after that.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    filter: TeacherFilter,
    rx: mpsc::UnboundedReceiver<SnapshotEvent>,
    feed: Weak<LiveQueryFeed>,
}

impl Subscription {
    /// The filter of this query.
    #[must_use]
    pub fn filter(&self) -> &TeacherFilter {
        &self.filter
    }

    /// Wait for the next snapshot.
    ///
    /// Returns `None` once the store has gone away.
    pub async fn next(&mut self) -> Option<SnapshotEvent> {
        self.rx.recv().await
    }

    /// Take a snapshot that is already waiting, without blocking.
    pub fn try_next(&mut self) -> Option<SnapshotEvent> {
        self.rx.try_recv().ok()
    }

    /// A handle that can stop this query from elsewhere.
    ///
    /// Useful when the subscription itself has moved into a task.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            id: self.id,
            feed: self.feed.clone(),
        }
    }

    /// Stop the query.
    pub fn cancel(self) {
        drop(self);
    }
}

/// Detached canceller for a [`Subscription`].
///
/// Cancelling unregisters the query at once; the subscription then sees the
/// end of its stream.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    id: u64,
    feed: Weak<LiveQueryFeed>,
}

impl CancelHandle {
    /// Unregister the query. Calling this more than once is harmless.
    pub fn cancel(&self) {
        if let Some(feed) = self.feed.upgrade() {
            feed.remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(feed) = self.feed.upgrade() {
            feed.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(id: &str, teacher: Option<&str>) -> BoardRecord {
        BoardRecord {
            display_name: Some(id.to_uppercase()),
            expected_teacher_name: teacher.map(str::to_string),
            ..BoardRecord::new(id)
        }
    }

    fn matching(data: &[BoardRecord], filter: &TeacherFilter) -> Vec<BoardRecord> {
        data.iter().filter(|r| filter.matches(r)).cloned().collect()
    }

    #[test]
    fn test_register_delivers_initial_snapshot() {
        let feed = LiveQueryFeed::new();
        let data = vec![board("a", Some("Ms. Lee"))];
        let filter = TeacherFilter::new("Ms. Lee");

        let mut sub = feed.register(filter.clone(), matching(&data, &filter));
        let snapshot = sub.try_next().unwrap().unwrap();
        assert_eq!(snapshot.sequence, 0);
        assert_eq!(snapshot.records.len(), 1);
        assert!(sub.try_next().is_none());
    }

    #[test]
    fn test_publish_skips_unchanged_result_sets() {
        let feed = LiveQueryFeed::new();
        let mut data = vec![board("a", Some("Ms. Lee"))];
        let filter = TeacherFilter::new("Ms. Lee");
        let mut sub = feed.register(filter.clone(), matching(&data, &filter));
        sub.try_next();

        // A write to an unrelated board does not touch this query
        data.push(board("b", Some("Mr. Singh")));
        feed.publish(|f| Ok(matching(&data, f)));
        assert!(sub.try_next().is_none());

        // A matching record leaving the set is delivered
        data[0].expected_teacher_name = Some("Mr. Singh".to_string());
        feed.publish(|f| Ok(matching(&data, f)));
        let snapshot = sub.try_next().unwrap().unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.sequence, 1);
    }

    #[test]
    fn test_empty_filter_never_matches() {
        let feed = LiveQueryFeed::new();
        let data = vec![board("a", Some(""))];
        let filter = TeacherFilter::new("");
        let mut sub = feed.register(filter.clone(), matching(&data, &filter));
        assert!(sub.try_next().unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_cancel_unregisters() {
        let feed = LiveQueryFeed::new();
        let sub = feed.register(TeacherFilter::new("Ms. Lee"), Vec::new());
        assert_eq!(feed.subscriber_count(), 1);

        sub.cancel();
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_handle_ends_stream() {
        let feed = LiveQueryFeed::new();
        let mut sub = feed.register(TeacherFilter::new("Ms. Lee"), Vec::new());
        let handle = sub.cancel_handle();
        sub.try_next();

        handle.cancel();
        handle.cancel();
        assert_eq!(feed.subscriber_count(), 0);
        assert!(sub.next().await.is_none());
    }

    #[test]
    fn test_error_then_same_result_is_redelivered() {
        let feed = LiveQueryFeed::new();
        let data = vec![board("a", Some("Ms. Lee"))];
        let filter = TeacherFilter::new("Ms. Lee");
        let mut sub = feed.register(filter.clone(), matching(&data, &filter));
        sub.try_next();

        feed.fail_all("network down");
        assert!(sub.try_next().unwrap().is_err());

        feed.publish(|f| Ok(matching(&data, f)));
        assert_eq!(sub.try_next().unwrap().unwrap().records.len(), 1);
    }

    #[test]
    fn test_publish_error_reaches_subscriber() {
        let feed = LiveQueryFeed::new();
        let mut sub = feed.register(TeacherFilter::new("Ms. Lee"), Vec::new());
        sub.try_next();

        feed.publish(|_| Err(Error::permission_denied("boards", "read denied")));
        let event = sub.try_next().unwrap();
        assert!(event.unwrap_err().is_permission_error());
    }
}
