//! In-memory graph store.
//!
//! Thread-safe reference implementation of [`GraphStore`], used as the live
//! store of the server binary and as the private replay store. Statements
//! are kept per graph in ordered sets so that serialization is stable.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bold_types::{GraphEvent, GraphName, Quad, Term};

use crate::error::{ProgramError, StoreError};
use crate::listener::{GraphListener, ListenerSet};
use crate::traits::{AskProgram, GraphStore, ProgramCompiler, QueryProgram, UpdateProgram};

type Graphs = BTreeMap<GraphName, BTreeSet<Quad>>;

fn lock_err(context: &'static str) -> StoreError {
    StoreError::Poisoned(context)
}

/// Thread-safe in-memory quad store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    graphs: RwLock<Graphs>,
    listeners: ListenerSet,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, context: &'static str) -> Result<RwLockReadGuard<'_, Graphs>, StoreError> {
        self.graphs.read().map_err(|_poisoned| lock_err(context))
    }

    fn write(&self, context: &'static str) -> Result<RwLockWriteGuard<'_, Graphs>, StoreError> {
        self.graphs.write().map_err(|_poisoned| lock_err(context))
    }

    /// Insert under an already held write lock, publishing on change.
    fn insert_locked(&self, graphs: &mut Graphs, quad: Quad) -> bool {
        let set = graphs.entry(quad.graph.clone()).or_default();
        if set.contains(&quad) {
            return false;
        }
        set.insert(quad.clone());
        self.listeners.publish(&GraphEvent::StatementAdded(quad));
        true
    }

    /// Remove under an already held write lock, publishing on change.
    fn remove_locked(&self, graphs: &mut Graphs, quad: &Quad) -> bool {
        let Some(set) = graphs.get_mut(&quad.graph) else {
            return false;
        };
        if !set.remove(quad) {
            return false;
        }
        if set.is_empty() {
            graphs.remove(&quad.graph);
        }
        self.listeners
            .publish(&GraphEvent::StatementRemoved(quad.clone()));
        true
    }
}

impl GraphStore for MemoryStore {
    fn insert(&self, quad: Quad) -> Result<bool, StoreError> {
        let mut graphs = self.write("insert")?;
        Ok(self.insert_locked(&mut graphs, quad))
    }

    fn remove(&self, quad: &Quad) -> Result<bool, StoreError> {
        let mut graphs = self.write("remove")?;
        Ok(self.remove_locked(&mut graphs, quad))
    }

    fn contains_graph(&self, graph: &GraphName) -> Result<bool, StoreError> {
        let graphs = self.read("contains_graph")?;
        Ok(graphs.get(graph).is_some_and(|set| !set.is_empty()))
    }

    fn graph(&self, graph: &GraphName) -> Result<Vec<Quad>, StoreError> {
        let graphs = self.read("graph")?;
        Ok(graphs
            .get(graph)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn statements(&self) -> Result<Vec<Quad>, StoreError> {
        let graphs = self.read("statements")?;
        Ok(graphs.values().flatten().cloned().collect())
    }

    fn find(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        graph: Option<&GraphName>,
    ) -> Result<Vec<Quad>, StoreError> {
        let graphs = self.read("find")?;
        let matches = |quad: &&Quad| {
            subject.is_none_or(|s| &quad.subject == s)
                && predicate.is_none_or(|p| &quad.predicate == p)
        };
        let found = match graph {
            Some(name) => graphs
                .get(name)
                .map(|set| set.iter().filter(matches).cloned().collect())
                .unwrap_or_default(),
            None => graphs.values().flatten().filter(matches).cloned().collect(),
        };
        Ok(found)
    }

    fn len(&self) -> Result<usize, StoreError> {
        let graphs = self.read("len")?;
        Ok(graphs.values().map(BTreeSet::len).sum())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut graphs = self.write("clear")?;
        let all: Vec<Quad> = graphs.values().flatten().cloned().collect();
        for quad in &all {
            self.remove_locked(&mut graphs, quad);
        }
        Ok(())
    }

    fn replace_graph(&self, graph: &GraphName, quads: Vec<Quad>) -> Result<(), StoreError> {
        let mut graphs = self.write("replace_graph")?;
        let incoming: BTreeSet<Quad> = quads
            .into_iter()
            .map(|quad| quad.in_graph(graph.clone()))
            .collect();
        let stale: Vec<Quad> = graphs
            .get(graph)
            .map(|set| set.difference(&incoming).cloned().collect())
            .unwrap_or_default();
        for quad in &stale {
            self.remove_locked(&mut graphs, quad);
        }
        let mut added = 0usize;
        for quad in incoming {
            if self.insert_locked(&mut graphs, quad) {
                added = added.saturating_add(1);
            }
        }
        tracing::debug!(%graph, removed = stale.len(), added, "graph replaced");
        Ok(())
    }

    fn extend_graph(&self, graph: &GraphName, quads: Vec<Quad>) -> Result<(), StoreError> {
        let mut graphs = self.write("extend_graph")?;
        for quad in quads {
            self.insert_locked(&mut graphs, quad.in_graph(graph.clone()));
        }
        Ok(())
    }

    fn clear_graph(&self, graph: &GraphName) -> Result<usize, StoreError> {
        let mut graphs = self.write("clear_graph")?;
        let existing: Vec<Quad> = graphs
            .get(graph)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        for quad in &existing {
            self.remove_locked(&mut graphs, quad);
        }
        tracing::debug!(%graph, removed = existing.len(), "graph cleared");
        Ok(existing.len())
    }

    fn subscribe(&self, listener: Arc<dyn GraphListener>) {
        self.listeners.subscribe(listener);
    }

    fn detached(&self) -> Arc<dyn GraphStore> {
        Arc::new(Self::new())
    }
}

/// The in-memory backend has no query language. Programs must be supplied
/// as native values instead of source text.
impl ProgramCompiler for MemoryStore {
    fn compile_update(
        &self,
        name: &str,
        _source: &str,
    ) -> Result<Arc<dyn UpdateProgram>, ProgramError> {
        Err(unsupported(name))
    }

    fn compile_query(
        &self,
        name: &str,
        _source: &str,
    ) -> Result<Arc<dyn QueryProgram>, ProgramError> {
        Err(unsupported(name))
    }

    fn compile_ask(&self, name: &str, _source: &str) -> Result<Arc<dyn AskProgram>, ProgramError> {
        Err(unsupported(name))
    }
}

fn unsupported(name: &str) -> ProgramError {
    ProgramError::Unsupported {
        name: name.to_owned(),
        reason: String::from("the in-memory store has no query language"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Mutex, PoisonError};

    use super::*;

    #[derive(Default)]
    struct Log(Mutex<Vec<GraphEvent>>);

    impl GraphListener for Log {
        fn on_event(&self, event: &GraphEvent) {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event.clone());
        }
    }

    impl Log {
        fn take(&self) -> Vec<GraphEvent> {
            std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
        }
    }

    fn quad(s: &str, o: i64, g: &str) -> Quad {
        Quad::new(
            Term::iri(format!("http://ex.org/{s}")),
            Term::iri("http://ex.org/p"),
            Term::integer(o),
            GraphName::named(g),
        )
    }

    #[test]
    fn only_effective_changes_are_published() {
        let store = MemoryStore::new();
        let log = Arc::new(Log::default());
        store.subscribe(Arc::clone(&log) as Arc<dyn GraphListener>);

        assert!(store.insert(quad("a", 1, "http://g")).unwrap());
        assert!(!store.insert(quad("a", 1, "http://g")).unwrap());
        assert!(!store.remove(&quad("b", 1, "http://g")).unwrap());
        assert!(store.remove(&quad("a", 1, "http://g")).unwrap());

        let events = log.take();
        assert_eq!(
            events,
            vec![
                GraphEvent::StatementAdded(quad("a", 1, "http://g")),
                GraphEvent::StatementRemoved(quad("a", 1, "http://g")),
            ]
        );
    }

    #[test]
    fn replace_graph_publishes_the_diff_only() {
        let store = MemoryStore::new();
        let g = GraphName::named("http://g");
        store.extend_graph(&g, vec![quad("a", 1, "x"), quad("b", 2, "x")]).unwrap();

        let log = Arc::new(Log::default());
        store.subscribe(Arc::clone(&log) as Arc<dyn GraphListener>);
        store
            .replace_graph(&g, vec![quad("b", 2, "x"), quad("c", 3, "x")])
            .unwrap();

        assert_eq!(
            log.take(),
            vec![
                GraphEvent::StatementRemoved(quad("a", 1, "http://g")),
                GraphEvent::StatementAdded(quad("c", 3, "http://g")),
            ]
        );
        assert_eq!(store.graph(&g).unwrap().len(), 2);
    }

    #[test]
    fn empty_graphs_do_not_exist() {
        let store = MemoryStore::new();
        let g = GraphName::named("http://g");
        assert!(!store.contains_graph(&g).unwrap());
        store.insert(quad("a", 1, "http://g")).unwrap();
        assert!(store.contains_graph(&g).unwrap());
        assert_eq!(store.clear_graph(&g).unwrap(), 1);
        assert!(!store.contains_graph(&g).unwrap());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn find_filters_by_subject_predicate_and_graph() {
        let store = MemoryStore::new();
        store.insert(quad("a", 1, "http://g1")).unwrap();
        store.insert(quad("a", 2, "http://g2")).unwrap();
        store.insert(quad("b", 3, "http://g1")).unwrap();

        let subject = Term::iri("http://ex.org/a");
        assert_eq!(store.find(Some(&subject), None, None).unwrap().len(), 2);
        let g1 = GraphName::named("http://g1");
        assert_eq!(store.find(None, None, Some(&g1)).unwrap().len(), 2);
        assert_eq!(store.find(Some(&subject), None, Some(&g1)).unwrap().len(), 1);
    }

    #[test]
    fn detached_store_shares_nothing() {
        let store = MemoryStore::new();
        let log = Arc::new(Log::default());
        store.subscribe(Arc::clone(&log) as Arc<dyn GraphListener>);
        store.insert(quad("a", 1, "http://g")).unwrap();
        log.take();

        let private = store.detached();
        assert!(private.is_empty().unwrap());
        private.insert(quad("z", 9, "http://g")).unwrap();
        assert!(log.take().is_empty());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn compiler_rejects_source_programs() {
        let store = MemoryStore::new();
        let err = store.compile_query("q.rq", "SELECT * {}").err().unwrap();
        assert!(matches!(err, ProgramError::Unsupported { .. }));
    }
}
