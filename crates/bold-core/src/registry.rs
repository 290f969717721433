//! Named, ordered program registration.

use std::sync::Arc;

use bold_store::{QueryProgram, UpdateProgram};
use serde::Serialize;

/// Role of a registered program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProgramKind {
    /// Runs once during initialization, in registration order.
    SingleUpdate,
    /// Runs once per tick, in registration order.
    ContinuousUpdate,
    /// Evaluated once per reconstructed slot during replay.
    Query,
}

/// A program with its registration name.
pub struct Registered<P: ?Sized> {
    /// Registration name (usually the source file name).
    pub name: String,
    /// The compiled program.
    pub program: Arc<P>,
}

impl<P: ?Sized> Clone for Registered<P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            program: Arc::clone(&self.program),
        }
    }
}

impl<P: ?Sized> std::fmt::Debug for Registered<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registered").field("name", &self.name).finish()
    }
}

/// Insert or replace `program` under `name`. A replaced program keeps its
/// original position. Returns `true` if an entry was replaced.
fn upsert<P: ?Sized>(list: &mut Vec<Registered<P>>, name: &str, program: Arc<P>) -> bool {
    if let Some(existing) = list.iter_mut().find(|entry| entry.name == name) {
        existing.program = program;
        return true;
    }
    list.push(Registered {
        name: name.to_owned(),
        program,
    });
    false
}

/// Programs of all three kinds, each list in registration order.
#[derive(Debug, Default, Clone)]
pub struct ProgramRegistry {
    single: Vec<Registered<dyn UpdateProgram>>,
    continuous: Vec<Registered<dyn UpdateProgram>>,
    queries: Vec<Registered<dyn QueryProgram>>,
}

impl ProgramRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an update program of the given kind. `Query` is not an
    /// update kind and is treated as `SingleUpdate`.
    pub fn register_update(
        &mut self,
        kind: ProgramKind,
        name: &str,
        program: Arc<dyn UpdateProgram>,
    ) -> bool {
        match kind {
            ProgramKind::ContinuousUpdate => upsert(&mut self.continuous, name, program),
            ProgramKind::SingleUpdate | ProgramKind::Query => upsert(&mut self.single, name, program),
        }
    }

    /// Register a query.
    pub fn register_query(&mut self, name: &str, program: Arc<dyn QueryProgram>) -> bool {
        upsert(&mut self.queries, name, program)
    }

    /// Single updates in order.
    pub fn single_updates(&self) -> &[Registered<dyn UpdateProgram>] {
        &self.single
    }

    /// Continuous updates in order.
    pub fn continuous_updates(&self) -> &[Registered<dyn UpdateProgram>] {
        &self.continuous
    }

    /// Queries in order.
    pub fn queries(&self) -> &[Registered<dyn QueryProgram>] {
        &self.queries
    }

    /// Registered names of `kind`, in order.
    pub fn names(&self, kind: ProgramKind) -> Vec<&str> {
        match kind {
            ProgramKind::SingleUpdate => self.single.iter().map(|p| p.name.as_str()).collect(),
            ProgramKind::ContinuousUpdate => {
                self.continuous.iter().map(|p| p.name.as_str()).collect()
            }
            ProgramKind::Query => self.queries.iter().map(|p| p.name.as_str()).collect(),
        }
    }
}
