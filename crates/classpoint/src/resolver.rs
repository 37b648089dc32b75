//! Teacher destination resolution.
//!
//! The resolver keeps one live query open for the teacher currently in the
//! room and turns every snapshot into a [`TeacherDestination`], or clears it.
//!
//! Each call to [`DestinationResolver::watch_destination`] supersedes the
//! previous one. The old query is cancelled first, and every write to the
//! destination is checked against a generation counter under the watch
//! channel's lock, so a snapshot that was already in flight for the old
//! teacher is discarded rather than overwriting the new state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::board::{select_destination, teacher_or_none, TeacherDestination};
use crate::store::{CancelHandle, SharedStore, SnapshotEvent, Subscription, TeacherFilter};

/// Where the resolver is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResolverState {
    /// No live query; the destination is absent.
    #[default]
    Idle,
    /// A live query is open for this teacher.
    Watching {
        /// Teacher being matched against `expectedTeacherName`.
        teacher: String,
    },
}

/// The single active live query, with the task draining it.
#[derive(Debug)]
struct ActiveWatch {
    teacher: String,
    generation: u64,
    query: CancelHandle,
    task: JoinHandle<()>,
}

impl ActiveWatch {
    fn cancel(self) {
        self.query.cancel();
        self.task.abort();
        debug!(teacher = %self.teacher, generation = self.generation, "Cancelled destination watch");
    }
}

/// Set the destination only if `generation` still belongs to the caller.
///
/// Returns `true` if the value changed.
fn set_if_current(
    destination: &watch::Sender<Option<TeacherDestination>>,
    generation: &AtomicU64,
    expected: u64,
    next: Option<TeacherDestination>,
) -> bool {
    destination.send_if_modified(|current| {
        if generation.load(Ordering::SeqCst) != expected {
            return false;
        }
        if *current == next {
            return false;
        }
        *current = next;
        true
    })
}

/// Resolves where this board's current teacher has to go next.
#[derive(Debug)]
pub struct DestinationResolver {
    store: SharedStore,
    generation: Arc<AtomicU64>,
    destination: Arc<watch::Sender<Option<TeacherDestination>>>,
    active: Option<ActiveWatch>,
}

impl DestinationResolver {
    /// Create an idle resolver over `store`.
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        let (destination, _) = watch::channel(None);
        Self {
            store,
            generation: Arc::new(AtomicU64::new(0)),
            destination: Arc::new(destination),
            active: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ResolverState {
        match &self.active {
            Some(active) => ResolverState::Watching {
                teacher: active.teacher.clone(),
            },
            None => ResolverState::Idle,
        }
    }

    /// The most recently resolved destination.
    #[must_use]
    pub fn destination(&self) -> Option<TeacherDestination> {
        self.destination.borrow().clone()
    }

    /// Receive every destination change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<TeacherDestination>> {
        self.destination.subscribe()
    }

    /// Start watching for the board that expects `teacher` next.
    ///
    /// Any previous watch is cancelled and the destination cleared before
    /// the new query opens. `None` or a blank name leaves the resolver idle.
    /// When this returns, the destination already reflects the query's
    /// first snapshot. Errors are logged and leave the destination absent.
    pub async fn watch_destination(&mut self, teacher: Option<&str>) {
        self.cancel_active();

        let Some(teacher) = teacher_or_none(teacher) else {
            debug!("No current teacher, resolver idle");
            return;
        };
        let teacher = teacher.to_string();
        let generation = self.generation.load(Ordering::SeqCst);

        let mut subscription = match self.store.subscribe(TeacherFilter::new(&teacher)).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(teacher = %teacher, error = %e, "Failed to open destination query");
                return;
            }
        };

        // The first snapshot is queued by the store before subscribe returns
        if let Some(event) = subscription.try_next() {
            self.apply(generation, &teacher, event);
        }

        let query = subscription.cancel_handle();
        let task = tokio::spawn(drain(
            subscription,
            teacher.clone(),
            generation,
            Arc::clone(&self.generation),
            Arc::clone(&self.destination),
        ));

        info!(teacher = %teacher, "Watching for teacher destination");
        self.active = Some(ActiveWatch {
            teacher,
            generation,
            query,
            task,
        });
    }

    /// Stop watching and clear the destination.
    pub fn dispose(&mut self) {
        self.cancel_active();
    }

    fn cancel_active(&mut self) {
        // Invalidate in-flight deliveries before clearing, then drop the query
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.destination.send_if_modified(|current| current.take().is_some());
        if let Some(active) = self.active.take() {
            active.cancel();
        }
    }

    fn apply(&self, generation: u64, teacher: &str, event: SnapshotEvent) {
        apply_event(&self.destination, &self.generation, generation, teacher, event);
    }
}

impl Drop for DestinationResolver {
    fn drop(&mut self) {
        self.cancel_active();
    }
}

fn apply_event(
    destination: &watch::Sender<Option<TeacherDestination>>,
    generation: &AtomicU64,
    expected: u64,
    teacher: &str,
    event: SnapshotEvent,
) {
    let next = match event {
        Ok(snapshot) => select_destination(&snapshot.records, teacher),
        Err(e) => {
            warn!(teacher, error = %e, "Destination query failed");
            None
        }
    };
    if set_if_current(destination, generation, expected, next.clone()) {
        match next {
            Some(dest) => info!(teacher, location = %dest.location, "Teacher destination resolved"),
            None => debug!(teacher, "Teacher destination cleared"),
        }
    }
}

async fn drain(
    mut subscription: Subscription,
    teacher: String,
    expected: u64,
    generation: Arc<AtomicU64>,
    destination: Arc<watch::Sender<Option<TeacherDestination>>>,
) {
    while let Some(event) = subscription.next().await {
        if generation.load(Ordering::SeqCst) != expected {
            break;
        }
        apply_event(&destination, &generation, expected, &teacher, event);
    }
    debug!(teacher = %teacher, "Destination query ended");
    set_if_current(&destination, &generation, expected, None);
}
