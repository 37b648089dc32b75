//! Board presence publishing.
//!
//! A board announces which teacher it expects for its next period by
//! upserting its own record in the shared collection. Only the presence
//! fields are written; registration fields stay untouched.
//!
//! Writes from one publisher land in the order they were requested. Every
//! request takes a sequence number when it is made; a write whose number is
//! older than the last committed one is skipped, so a slow fire-and-forget
//! task can never overwrite a newer expectation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn, Instrument};

use crate::board::{validate_board_id, BoardFields, BoardRecord};
use crate::error::{Error, Result};
use crate::store::SharedStore;
use crate::timetable::ClassPeriod;

/// Ordering state shared by all clones of one publisher.
#[derive(Debug, Default)]
struct WriteOrder {
    /// Last sequence number handed out.
    issued: AtomicU64,
    /// Sequence number of the last write that reached the store.
    committed: Mutex<u64>,
}

impl WriteOrder {
    fn next(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Writes this board's presence into the shared collection.
#[derive(Debug, Clone)]
pub struct PresencePublisher {
    store: SharedStore,
    board_id: String,
    display_name: String,
    order: Arc<WriteOrder>,
}

impl PresencePublisher {
    /// Create a publisher for one board.
    ///
    /// # Errors
    ///
    /// Returns an error if `board_id` is empty or malformed.
    pub fn new(
        store: SharedStore,
        board_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Result<Self> {
        let board_id = board_id.into();
        validate_board_id(&board_id)?;
        Ok(Self {
            store,
            board_id,
            display_name: display_name.into(),
            order: Arc::new(WriteOrder::default()),
        })
    }

    /// The board this publisher writes for.
    #[must_use]
    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    /// The display name written with every update.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Change the display name used by later updates.
    pub fn set_display_name(&mut self, display_name: impl Into<String>) {
        self.display_name = display_name.into();
    }

    /// Write the presence fields and wait for the store to accept them.
    ///
    /// `next` is the board's next class today, if any; its teacher becomes
    /// the record's `expectedTeacherName`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub async fn publish(&self, next: Option<&ClassPeriod>) -> Result<BoardRecord> {
        self.publish_expected(next.map(|period| period.teacher.as_str()))
            .await
    }

    /// Write `teacher` as the expected teacher, or clear it with `None`.
    ///
    /// If a newer request from this publisher has already been written, the
    /// stored record is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub async fn publish_expected(&self, teacher: Option<&str>) -> Result<BoardRecord> {
        let sequence = self.order.next();
        match self.write_in_order(sequence, teacher).await? {
            Some(record) => Ok(record),
            None => self
                .store
                .get(&self.board_id)
                .await?
                .ok_or_else(|| Error::BoardNotFound(self.board_id.clone())),
        }
    }

    /// Publish without waiting for the write.
    ///
    /// The request is ordered against every other request of this publisher
    /// at the time of the call, not when the task runs. Failures are logged
    /// and dropped; the next schedule change writes again. The returned
    /// handle is only useful to tests and shutdown.
    pub fn publish_presence(&self, next: Option<ClassPeriod>) -> JoinHandle<()> {
        let publisher = self.clone();
        let sequence = self.order.next();
        tokio::spawn(async move {
            let teacher = next.as_ref().map(|period| period.teacher.as_str());
            if let Err(e) = publisher.write_in_order(sequence, teacher).await {
                warn!(
                    board_id = %publisher.board_id,
                    error = %e,
                    "Failed to publish board presence"
                );
            }
        }
        .in_current_span())
    }

    /// Upsert the presence fields unless a newer request already committed.
    ///
    /// Returns `None` when the write was skipped.
    async fn write_in_order(
        &self,
        sequence: u64,
        teacher: Option<&str>,
    ) -> Result<Option<BoardRecord>> {
        let mut committed = self.order.committed.lock().await;
        if sequence < *committed {
            trace!(
                board_id = %self.board_id,
                sequence,
                committed = *committed,
                "Skipping superseded presence write"
            );
            return Ok(None);
        }

        // A failed write still supersedes older requests
        *committed = sequence;
        let fields = BoardFields::presence(&self.display_name, teacher, Utc::now());
        let record = self.store.upsert(&self.board_id, fields).await?;
        debug!(
            board_id = %self.board_id,
            sequence,
            expected_teacher = record.expected_teacher_name.as_deref().unwrap_or("-"),
            "Published board presence"
        );
        Ok(Some(record))
    }
}
