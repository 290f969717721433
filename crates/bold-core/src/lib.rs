//! Simulation engine for the BOLD simulation server.
//!
//! This crate owns the run lifecycle: a fixed cycle of states driven by a
//! wall-clock scheduler, per-timeslot change and interaction histories
//! recorded while agents act on the live store, and deterministic replay of
//! the recorded changes once a run ends.
//!
//! # Modules
//!
//! - [`engine`] -- [`SimulationEngine`]: state machine, run start, tick
//!   handling, replay and cleanup.
//! - [`change_history`] -- Per-slot statement insert/delete log.
//! - [`interaction_history`] -- Per-slot request counters and latencies.
//! - [`replay`] -- Rebuilds each slot on a private store, evaluates queries
//!   and writes dumps.
//! - [`scheduler`] -- Fixed-rate tick loop with cancellation.
//! - [`registry`] -- Named program registration.
//! - [`control`] -- The `/sim` control resource and its built-in programs.
//! - [`sink`] -- Where run artifacts are written.
//! - [`config`] -- Configuration loading from `bold-config.yaml`.
//!
//! [`SimulationEngine`]: engine::SimulationEngine

pub mod change_history;
pub mod config;
pub mod control;
pub mod engine;
pub mod interaction_history;
pub mod registry;
pub mod replay;
pub mod scheduler;
pub mod sink;

pub use engine::{
    ControlStart, EngineError, EngineSettings, EngineStatus, RequestPermit, RunSummary,
    SimulationEngine,
};
