//! Graph store boundary for the BOLD simulation server.
//!
//! The simulation engine treats the graph store as an external collaborator.
//! This crate defines that contract and ships an in-memory backend so the
//! server can run and the engine can be tested without an external store.
//!
//! # Modules
//!
//! - [`traits`] -- `GraphStore` and the program traits (update, ask, query)
//! - [`listener`] -- Synchronous listener fan-out (`ListenerSet`)
//! - [`memory`] -- Thread-safe in-memory `GraphStore`
//! - [`format`] -- Media types and content negotiation
//! - [`codec`] -- Line-based N-Quads / N-Triples codec and `rdf:value` writer
//! - [`turtle`] -- Turtle reader with prefixes, abbreviations and relative IRIs
//! - [`error`] -- Store, program and format errors

pub mod codec;
pub mod error;
pub mod format;
pub mod listener;
pub mod memory;
pub mod traits;
pub mod turtle;

pub use error::{FormatError, ProgramError, StoreError};
pub use format::RdfFormat;
pub use listener::{GraphListener, ListenerSet};
pub use memory::MemoryStore;
pub use traits::{
    AskProgram, GraphStore, ProgramCompiler, QueryProgram, QueryResults, UpdateProgram, ask_fn,
    query_fn, update_fn,
};
