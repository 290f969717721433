//! Append-only, per-timeslot log of statement changes.
//!
//! The change history subscribes to the live store's statement-level
//! notifications. While recording, every effective insertion or removal is
//! appended to the sequence of the open slot; [`ChangeHistory::time_incremented`]
//! closes that sequence and opens the next. The last sequence is always the
//! open one, so there is never more than one.
//!
//! Recording is gated: events arriving while the history is sealed (before
//! a run, during replay, during cleanup) are dropped.

use std::sync::{Mutex, MutexGuard, PoisonError};

use bold_store::GraphListener;
use bold_types::{GraphEvent, Quad};
use serde::Serialize;

/// Errors raised by history bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    /// The slot cannot advance because no run is recording.
    #[error("history is not recording")]
    NotRecording,

    /// A run is already being recorded.
    #[error("history is already recording (slot {slot})")]
    AlreadyRecording {
        /// The currently open slot.
        slot: usize,
    },
}

/// Whether a statement was added or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChangeOperation {
    /// The statement was inserted.
    Insert,
    /// The statement was removed.
    Delete,
}

/// One recorded statement change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Insert or delete.
    pub operation: ChangeOperation,
    /// The statement concerned.
    pub statement: Quad,
}

/// The ordered records of one time slot.
pub type ChangeSequence = Vec<ChangeRecord>;

#[derive(Debug, Default)]
struct ChangeLog {
    slots: Vec<ChangeSequence>,
    recording: bool,
}

/// Per-timeslot change log of the live store.
#[derive(Debug, Default)]
pub struct ChangeHistory {
    log: Mutex<ChangeLog>,
}

impl ChangeHistory {
    /// Create an empty, sealed history.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ChangeLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start recording a run: discard any previous content and open slot 0.
    pub fn open(&self) -> Result<(), HistoryError> {
        let mut log = self.lock();
        if log.recording {
            return Err(HistoryError::AlreadyRecording {
                slot: log.slots.len().saturating_sub(1),
            });
        }
        log.slots.clear();
        log.slots.push(ChangeSequence::new());
        log.recording = true;
        Ok(())
    }

    /// Close the open slot and open the next one. Returns the new slot index.
    pub fn time_incremented(&self) -> Result<usize, HistoryError> {
        let mut log = self.lock();
        if !log.recording {
            return Err(HistoryError::NotRecording);
        }
        log.slots.push(ChangeSequence::new());
        Ok(log.slots.len().saturating_sub(1))
    }

    /// Stop recording. Existing sequences are kept for replay.
    pub fn seal(&self) {
        self.lock().recording = false;
    }

    /// Drop every sequence and stop recording.
    pub fn clear(&self) {
        let mut log = self.lock();
        log.slots.clear();
        log.recording = false;
    }

    /// Number of slots recorded so far (including the open one).
    pub fn size(&self) -> usize {
        self.lock().slots.len()
    }

    /// Whether the history is currently recording.
    pub fn is_recording(&self) -> bool {
        self.lock().recording
    }

    /// Index of the open slot, if recording.
    pub fn current_slot(&self) -> Option<usize> {
        let log = self.lock();
        if log.recording {
            log.slots.len().checked_sub(1)
        } else {
            None
        }
    }

    /// Copy of every sequence, in slot order.
    pub fn sequences(&self) -> Vec<ChangeSequence> {
        self.lock().slots.clone()
    }

    fn record(&self, operation: ChangeOperation, statement: &Quad) {
        let mut log = self.lock();
        if !log.recording {
            return;
        }
        if let Some(open) = log.slots.last_mut() {
            open.push(ChangeRecord {
                operation,
                statement: statement.clone(),
            });
        }
    }
}

impl GraphListener for ChangeHistory {
    fn on_event(&self, event: &GraphEvent) {
        match event {
            GraphEvent::StatementAdded(quad) => self.record(ChangeOperation::Insert, quad),
            GraphEvent::StatementRemoved(quad) => self.record(ChangeOperation::Delete, quad),
            _ => {}
        }
    }
}
