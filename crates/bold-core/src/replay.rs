//! Offline reconstruction of per-slot dataset states.
//!
//! Replay walks the recorded change history in slot order against a
//! private store. After applying a slot's records it optionally dumps the
//! reconstructed dataset and evaluates every registered query, appending
//! the solutions to one tab-separated sink per query. Update programs are
//! never re-executed, so replaying the same history always yields the same
//! rows.
//!
//! Failures are contained: a failing slot, dump or query is logged and
//! counted, and replay moves on to the next unit of work.

use std::io::Write;
use std::path::{Path, PathBuf};

use bold_store::codec::write_statements;
use bold_store::{FormatError, GraphStore, ProgramError, QueryProgram, RdfFormat, StoreError};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::change_history::{ChangeOperation, ChangeSequence};
use crate::registry::Registered;
use crate::sink::{Sink, SinkProvider};

/// Placeholder substituted with the slot index in dump patterns.
pub const SLOT_PLACEHOLDER: &str = "%d";

/// Errors raised by one unit of replay work.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// A sink could not be opened, written or flushed.
    #[error("sink {path}: {source}")]
    Sink {
        /// Relative sink path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A query failed to evaluate.
    #[error("query {name} failed: {source}")]
    Query {
        /// Query name.
        name: String,
        /// The underlying program error.
        source: ProgramError,
    },

    /// The private store rejected an operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Dump serialization failed.
    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Counters describing a completed replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    /// Slots reconstructed.
    pub slots: usize,
    /// Insert records applied.
    pub insertions: usize,
    /// Delete records applied.
    pub deletions: usize,
    /// Units of work that failed and were skipped.
    pub failures: usize,
}

/// What to replay and where to write it.
pub struct ReplayPlan<'a> {
    /// Recorded sequences in slot order.
    pub history: &'a [ChangeSequence],
    /// Queries to evaluate at every slot.
    pub queries: &'a [Registered<dyn QueryProgram>],
    /// Optional dump pattern containing [`SLOT_PLACEHOLDER`].
    pub dump_pattern: Option<&'a str>,
    /// Directory (relative to the sink root) receiving the artifacts.
    pub run_dir: &'a Path,
}

/// Sink path for the results of query `name`: its extension replaced by
/// `.tsv`, inside `run_dir`.
pub fn query_sink_path(run_dir: &Path, name: &str) -> PathBuf {
    let file = Path::new(name).with_extension("tsv");
    let file_name = file.file_name().map_or_else(|| file.clone(), PathBuf::from);
    run_dir.join(file_name)
}

/// Sink path of the dump for `slot`. Relative patterns resolve inside
/// `run_dir`.
pub fn dump_path(run_dir: &Path, pattern: &str, slot: usize) -> PathBuf {
    run_dir.join(pattern.replace(SLOT_PLACEHOLDER, &slot.to_string()))
}

/// Append `value` as one TSV field, escaping the characters that would
/// break the row or column structure the way N-Triples escapes them.
fn push_field(line: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '\\' => line.push_str("\\\\"),
            '\t' => line.push_str("\\t"),
            '\n' => line.push_str("\\n"),
            '\r' => line.push_str("\\r"),
            other => line.push(other),
        }
    }
}

struct QuerySink<'a> {
    name: &'a str,
    program: &'a dyn QueryProgram,
    path: PathBuf,
    out: Sink,
}

impl QuerySink<'_> {
    fn write_header(&mut self) -> Result<(), ReplayError> {
        let mut header = String::from("# slot");
        for variable in self.program.variables() {
            header.push('\t');
            header.push_str(&variable);
        }
        self.write_line(&header)
    }

    fn write_line(&mut self, line: &str) -> Result<(), ReplayError> {
        writeln!(self.out, "{line}").map_err(|source| ReplayError::Sink {
            path: self.path.clone(),
            source,
        })
    }

    fn evaluate(&mut self, store: &dyn GraphStore, slot: usize) -> Result<(), ReplayError> {
        let results = self
            .program
            .evaluate(store)
            .map_err(|source| ReplayError::Query {
                name: self.name.to_owned(),
                source,
            })?;
        if results.rows.is_empty() {
            return self.write_line(&slot.to_string());
        }
        for row in &results.rows {
            let mut line = slot.to_string();
            for value in row {
                line.push('\t');
                if let Some(term) = value {
                    push_field(&mut line, term.value());
                }
            }
            self.write_line(&line)?;
        }
        Ok(())
    }

    fn close(mut self) -> Result<(), ReplayError> {
        self.out.flush().map_err(|source| ReplayError::Sink {
            path: self.path,
            source,
        })
    }
}

fn open_sink(sinks: &dyn SinkProvider, path: &Path) -> Result<Sink, ReplayError> {
    sinks.open(path).map_err(|source| ReplayError::Sink {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_slot(
    store: &dyn GraphStore,
    records: &ChangeSequence,
    report: &mut ReplayReport,
) -> Result<(), ReplayError> {
    for record in records {
        match record.operation {
            ChangeOperation::Insert => {
                store.insert(record.statement.clone())?;
                report.insertions = report.insertions.saturating_add(1);
            }
            ChangeOperation::Delete => {
                store.remove(&record.statement)?;
                report.deletions = report.deletions.saturating_add(1);
            }
        }
    }
    Ok(())
}

fn dump_slot(
    store: &dyn GraphStore,
    sinks: &dyn SinkProvider,
    path: &Path,
) -> Result<(), ReplayError> {
    let format = RdfFormat::from_extension(path);
    let mut out = open_sink(sinks, path)?;
    write_statements(&mut out, format, &store.statements()?)?;
    out.flush().map_err(|source| ReplayError::Sink {
        path: path.to_path_buf(),
        source,
    })
}

fn fail(report: &mut ReplayReport, err: &ReplayError) {
    error!(error = %err, "replay step failed");
    report.failures = report.failures.saturating_add(1);
}

/// Replay `plan` against the private `store`, writing artifacts to `sinks`.
pub fn replay(store: &dyn GraphStore, plan: &ReplayPlan<'_>, sinks: &dyn SinkProvider) -> ReplayReport {
    let mut report = ReplayReport::default();

    if let Err(err) = store.clear() {
        fail(&mut report, &ReplayError::from(err));
    }

    let mut query_sinks = Vec::with_capacity(plan.queries.len());
    for query in plan.queries {
        let path = query_sink_path(plan.run_dir, &query.name);
        let opened = open_sink(sinks, &path).and_then(|out| {
            let mut sink = QuerySink {
                name: &query.name,
                program: query.program.as_ref(),
                path,
                out,
            };
            sink.write_header()?;
            Ok(sink)
        });
        match opened {
            Ok(sink) => query_sinks.push(sink),
            Err(err) => fail(&mut report, &err),
        }
    }

    for (slot, records) in plan.history.iter().enumerate() {
        if let Err(err) = apply_slot(store, records, &mut report) {
            error!(slot, "could not apply recorded changes");
            fail(&mut report, &err);
        }
        report.slots = report.slots.saturating_add(1);

        if let Some(pattern) = plan.dump_pattern {
            let path = dump_path(plan.run_dir, pattern, slot);
            if let Err(err) = dump_slot(store, sinks, &path) {
                fail(&mut report, &err);
            }
        }

        for sink in &mut query_sinks {
            if let Err(err) = sink.evaluate(store, slot) {
                fail(&mut report, &err);
            }
        }
        debug!(slot, records = records.len(), "slot replayed");
    }

    for sink in query_sinks {
        if let Err(err) = sink.close() {
            fail(&mut report, &err);
        }
    }

    info!(
        slots = report.slots,
        insertions = report.insertions,
        deletions = report.deletions,
        failures = report.failures,
        "Replay finished"
    );
    report
}
