//! The collaborator contract: a graph store and the programs that run
//! against it.
//!
//! The simulation engine and the protocol handler only ever see these
//! traits. Backends decide how programs are compiled; the in-memory store
//! shipped in this crate has no query language, so its programs are native
//! Rust values built with [`update_fn`], [`query_fn`] and [`ask_fn`].

use std::sync::Arc;

use bold_types::{GraphName, Quad, Term};

use crate::error::{ProgramError, StoreError};
use crate::listener::GraphListener;

/// A quad store with named graphs and statement-level notifications.
///
/// # Notification contract
/// Every *effective* insertion or removal is published as a
/// [`GraphEvent::StatementAdded`](bold_types::GraphEvent::StatementAdded) or
/// [`GraphEvent::StatementRemoved`](bold_types::GraphEvent::StatementRemoved)
/// to subscribed listeners, synchronously and in application order.
/// Inserting a statement that already exists, or removing one that does
/// not, publishes nothing.
pub trait GraphStore: Send + Sync {
    /// Insert one statement. Returns `true` if it was not present before.
    fn insert(&self, quad: Quad) -> Result<bool, StoreError>;

    /// Remove one statement. Returns `true` if it was present.
    fn remove(&self, quad: &Quad) -> Result<bool, StoreError>;

    /// Whether `graph` holds at least one statement.
    fn contains_graph(&self, graph: &GraphName) -> Result<bool, StoreError>;

    /// All statements of `graph`, in a stable order.
    fn graph(&self, graph: &GraphName) -> Result<Vec<Quad>, StoreError>;

    /// Every statement of the dataset, in a stable order.
    fn statements(&self) -> Result<Vec<Quad>, StoreError>;

    /// Statements matching the given subject, predicate and graph. `None`
    /// matches anything.
    fn find(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        graph: Option<&GraphName>,
    ) -> Result<Vec<Quad>, StoreError>;

    /// Total number of statements.
    fn len(&self) -> Result<usize, StoreError>;

    /// Whether the dataset is empty.
    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Remove every statement.
    fn clear(&self) -> Result<(), StoreError>;

    /// Atomically replace the content of `graph` with `quads`. Statements
    /// are moved into `graph` regardless of their own graph name.
    fn replace_graph(&self, graph: &GraphName, quads: Vec<Quad>) -> Result<(), StoreError>;

    /// Atomically add `quads` to `graph`.
    fn extend_graph(&self, graph: &GraphName, quads: Vec<Quad>) -> Result<(), StoreError>;

    /// Remove every statement of `graph`. Returns how many were removed.
    fn clear_graph(&self, graph: &GraphName) -> Result<usize, StoreError>;

    /// Subscribe to statement-level notifications.
    fn subscribe(&self, listener: Arc<dyn GraphListener>);

    /// Create a new, empty store of the same backend, sharing nothing with
    /// this one (no data, no listeners). Used as the private replay store.
    fn detached(&self) -> Arc<dyn GraphStore>;

    /// Insert many statements.
    fn load(&self, quads: Vec<Quad>) -> Result<usize, StoreError> {
        let mut inserted = 0usize;
        for quad in quads {
            if self.insert(quad)? {
                inserted = inserted.saturating_add(1);
            }
        }
        Ok(inserted)
    }
}

/// A mutation program (single or continuous update).
pub trait UpdateProgram: Send + Sync {
    /// Run the program against `store`.
    fn execute(&self, store: &dyn GraphStore) -> Result<(), ProgramError>;
}

/// A side-effect-free boolean query, used as the termination predicate.
pub trait AskProgram: Send + Sync {
    /// Evaluate the predicate against `store`.
    fn evaluate(&self, store: &dyn GraphStore) -> Result<bool, ProgramError>;
}

/// A tabular query evaluated once per reconstructed slot during replay.
pub trait QueryProgram: Send + Sync {
    /// Projected variable names, in output column order.
    fn variables(&self) -> Vec<String>;

    /// Evaluate the query against `store`.
    fn evaluate(&self, store: &dyn GraphStore) -> Result<QueryResults, ProgramError>;
}

/// Solutions of a [`QueryProgram`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResults {
    /// Variable names, matching the order of values in each row.
    pub variables: Vec<String>,
    /// One entry per solution; unbound variables are `None`.
    pub rows: Vec<Vec<Option<Term>>>,
}

/// Compiles program sources for a particular backend.
pub trait ProgramCompiler: Send + Sync {
    /// Compile an update program.
    fn compile_update(&self, name: &str, source: &str)
    -> Result<Arc<dyn UpdateProgram>, ProgramError>;

    /// Compile a tabular query.
    fn compile_query(&self, name: &str, source: &str) -> Result<Arc<dyn QueryProgram>, ProgramError>;

    /// Compile a boolean query.
    fn compile_ask(&self, name: &str, source: &str) -> Result<Arc<dyn AskProgram>, ProgramError>;
}

struct FnUpdate<F>(F);

impl<F> UpdateProgram for FnUpdate<F>
where
    F: Fn(&dyn GraphStore) -> Result<(), ProgramError> + Send + Sync,
{
    fn execute(&self, store: &dyn GraphStore) -> Result<(), ProgramError> {
        (self.0)(store)
    }
}

struct FnAsk<F>(F);

impl<F> AskProgram for FnAsk<F>
where
    F: Fn(&dyn GraphStore) -> Result<bool, ProgramError> + Send + Sync,
{
    fn evaluate(&self, store: &dyn GraphStore) -> Result<bool, ProgramError> {
        (self.0)(store)
    }
}

struct FnQuery<F> {
    variables: Vec<String>,
    eval: F,
}

impl<F> QueryProgram for FnQuery<F>
where
    F: Fn(&dyn GraphStore) -> Result<Vec<Vec<Option<Term>>>, ProgramError> + Send + Sync,
{
    fn variables(&self) -> Vec<String> {
        self.variables.clone()
    }

    fn evaluate(&self, store: &dyn GraphStore) -> Result<QueryResults, ProgramError> {
        Ok(QueryResults {
            variables: self.variables.clone(),
            rows: (self.eval)(store)?,
        })
    }
}

/// Wrap a closure as an [`UpdateProgram`].
pub fn update_fn<F>(f: F) -> Arc<dyn UpdateProgram>
where
    F: Fn(&dyn GraphStore) -> Result<(), ProgramError> + Send + Sync + 'static,
{
    Arc::new(FnUpdate(f))
}

/// Wrap a closure as an [`AskProgram`].
pub fn ask_fn<F>(f: F) -> Arc<dyn AskProgram>
where
    F: Fn(&dyn GraphStore) -> Result<bool, ProgramError> + Send + Sync + 'static,
{
    Arc::new(FnAsk(f))
}

/// Wrap a closure returning solution rows as a [`QueryProgram`] with the
/// given projected variables.
pub fn query_fn<F>(variables: &[&str], f: F) -> Arc<dyn QueryProgram>
where
    F: Fn(&dyn GraphStore) -> Result<Vec<Vec<Option<Term>>>, ProgramError> + Send + Sync + 'static,
{
    Arc::new(FnQuery {
        variables: variables.iter().map(|v| (*v).to_owned()).collect(),
        eval: f,
    })
}
