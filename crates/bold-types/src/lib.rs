//! Shared type definitions for the BOLD simulation server.
//!
//! This crate is the single source of truth for the vocabulary exchanged
//! between the graph store, the simulation engine and the protocol handler.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers (run identifiers)
//! - [`term`] -- RDF terms, graph names and quads
//! - [`vocab`] -- Well-known IRIs (XSD, RDF, simulation namespace)
//! - [`state`] -- The simulation lifecycle state and its fixed cycle
//! - [`event`] -- Tagged graph events fanned out to listeners

pub mod event;
pub mod ids;
pub mod state;
pub mod term;
pub mod vocab;

// Re-export all public types at crate root for convenience.
pub use event::{GraphEvent, OperationKind, ResourceAccess};
pub use ids::RunId;
pub use state::{SimulationState, Transition};
pub use term::{GraphName, Literal, Quad, Term};
