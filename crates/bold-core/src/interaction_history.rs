//! Per-timeslot telemetry of protocol operations.
//!
//! Fed by the resource-level events the protocol handler publishes once per
//! completed request. Each slot keeps, per operation kind, a request count
//! and a latency aggregate in microseconds, plus the time the engine spent
//! running update programs in that slot.

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bold_store::GraphListener;
use bold_types::{GraphEvent, OperationKind};
use serde::Serialize;

use crate::change_history::HistoryError;

/// Count and latency aggregate for one operation kind in one slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InteractionCounter {
    /// Number of completed requests.
    pub count: u64,
    /// Latency aggregate in microseconds.
    pub latency_us: u64,
}

impl InteractionCounter {
    /// Fold one latency sample into the aggregate.
    ///
    /// The first sample is taken as is; each later sample is averaged with
    /// the running value, so recent requests weigh more than early ones.
    pub fn fold(&mut self, sample_us: u64) {
        self.count = self.count.saturating_add(1);
        self.latency_us = if self.latency_us == 0 {
            sample_us
        } else {
            self.latency_us.saturating_add(sample_us) / 2
        };
    }
}

/// Telemetry of one slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SlotInteractions {
    /// `GET` requests.
    pub retrieve: InteractionCounter,
    /// `PUT` requests.
    pub replace: InteractionCounter,
    /// `DELETE` requests.
    pub delete: InteractionCounter,
    /// `POST` requests.
    pub extend: InteractionCounter,
    /// Wall-clock time spent running update programs, in microseconds.
    pub update_us: u64,
}

impl SlotInteractions {
    /// Counter for `kind`.
    pub const fn counter(&self, kind: OperationKind) -> InteractionCounter {
        match kind {
            OperationKind::Retrieve => self.retrieve,
            OperationKind::Replace => self.replace,
            OperationKind::Delete => self.delete,
            OperationKind::Extend => self.extend,
        }
    }

    const fn counter_mut(&mut self, kind: OperationKind) -> &mut InteractionCounter {
        match kind {
            OperationKind::Retrieve => &mut self.retrieve,
            OperationKind::Replace => &mut self.replace,
            OperationKind::Delete => &mut self.delete,
            OperationKind::Extend => &mut self.extend,
        }
    }
}

#[derive(Debug, Default)]
struct InteractionLog {
    slots: Vec<SlotInteractions>,
    recording: bool,
}

/// Per-timeslot interaction counters, advanced on the same cadence as the
/// change history.
#[derive(Debug, Default)]
pub struct InteractionHistory {
    log: Mutex<InteractionLog>,
}

fn micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

impl InteractionHistory {
    /// Create an empty, sealed history.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, InteractionLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start recording a run with slot 0 open.
    pub fn open(&self) -> Result<(), HistoryError> {
        let mut log = self.lock();
        if log.recording {
            return Err(HistoryError::AlreadyRecording {
                slot: log.slots.len().saturating_sub(1),
            });
        }
        log.slots.clear();
        log.slots.push(SlotInteractions::default());
        log.recording = true;
        Ok(())
    }

    /// Close the open slot and open the next one. Returns the new slot index.
    pub fn time_incremented(&self) -> Result<usize, HistoryError> {
        let mut log = self.lock();
        if !log.recording {
            return Err(HistoryError::NotRecording);
        }
        log.slots.push(SlotInteractions::default());
        Ok(log.slots.len().saturating_sub(1))
    }

    /// Record one completed operation in the open slot.
    pub fn record(&self, kind: OperationKind, elapsed: Duration) {
        let mut log = self.lock();
        if !log.recording {
            return;
        }
        if let Some(slot) = log.slots.last_mut() {
            slot.counter_mut(kind).fold(micros(elapsed));
        }
    }

    /// Add update-program time to the open slot.
    pub fn record_update_duration(&self, elapsed: Duration) {
        let mut log = self.lock();
        if !log.recording {
            return;
        }
        if let Some(slot) = log.slots.last_mut() {
            slot.update_us = slot.update_us.saturating_add(micros(elapsed));
        }
    }

    /// Stop recording, keeping the rows.
    pub fn seal(&self) {
        self.lock().recording = false;
    }

    /// Drop every row and stop recording.
    pub fn clear(&self) {
        let mut log = self.lock();
        log.slots.clear();
        log.recording = false;
    }

    /// Number of slots recorded.
    pub fn size(&self) -> usize {
        self.lock().slots.len()
    }

    /// Copy of every row, in slot order.
    pub fn rows(&self) -> Vec<SlotInteractions> {
        self.lock().slots.clone()
    }

    /// Write the rows as tab-separated values with a `#` header.
    pub fn write_tsv<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "# slot")?;
        for kind in OperationKind::ALL {
            write!(out, "\t{0}_count\t{0}_us", kind.label())?;
        }
        writeln!(out, "\tupdate_us")?;
        for (slot, row) in self.rows().iter().enumerate() {
            write!(out, "{slot}")?;
            for kind in OperationKind::ALL {
                let counter = row.counter(kind);
                write!(out, "\t{}\t{}", counter.count, counter.latency_us)?;
            }
            writeln!(out, "\t{}", row.update_us)?;
        }
        out.flush()
    }
}

impl GraphListener for InteractionHistory {
    fn on_event(&self, event: &GraphEvent) {
        if let Some((kind, access)) = event.as_resource() {
            self.record(kind, access.elapsed);
        }
    }
}
