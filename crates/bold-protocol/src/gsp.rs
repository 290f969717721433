//! Graph store protocol over named graphs, independent of the HTTP stack.
//!
//! Every path below the base IRI addresses one named graph (direct
//! addressing). Retrieve, replace, extend and delete map onto the store
//! operations; each completed operation is published to the subscribed
//! listeners as a resource event carrying the graph name and the time the
//! store operation took.
//!
//! Content negotiation runs before the store is touched, and payloads are
//! parsed completely before anything is written, so a rejected request
//! never changes the store.
//!
//! A graph typing itself (`<graph> a ldp:BasicContainer` or one of the
//! other container types) behaves as an LDP container:
//!
//! - POST creates a child graph `<graph>/<uuid>` from the payload and links
//!   it with `<graph> ldp:contains <child>`.
//! - PUT must restate the container's `ldp:contains` statements exactly,
//!   otherwise it is a conflict.
//! - Deleting a contained graph also unlinks it from its containers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use bold_store::codec::{parse_statements, serialize};
use bold_store::{GraphListener, GraphStore, ListenerSet, RdfFormat};
use bold_types::vocab::{LDP_CONTAINER_TYPES, LDP_CONTAINS, RDF_TYPE};
use bold_types::{GraphEvent, GraphName, OperationKind, Quad, Term};
use tracing::debug;
use uuid::Uuid;

use crate::error::ProtocolError;

/// Outcome of a write request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The graph did not exist before.
    Created,
    /// An existing graph was replaced or extended.
    Updated,
    /// A POST to a container created the child graph with this IRI.
    Contained(String),
}

impl WriteOutcome {
    /// IRI of the created child, for POSTs to a container.
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Contained(child) => Some(child),
            Self::Created | Self::Updated => None,
        }
    }
}

/// A serialized graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphRepresentation {
    /// Negotiated format.
    pub format: RdfFormat,
    /// Serialized statements.
    pub body: Vec<u8>,
    /// Container type IRI, when the graph is an LDP container.
    pub container: Option<String>,
}

/// Graph store protocol handler over one store.
pub struct GraphStoreProtocol {
    store: Arc<dyn GraphStore>,
    base_uri: String,
    listeners: ListenerSet,
}

impl std::fmt::Debug for GraphStoreProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStoreProtocol")
            .field("base_uri", &self.base_uri)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl GraphStoreProtocol {
    /// Serve graphs of `store` under `base_uri`.
    pub fn new(store: Arc<dyn GraphStore>, base_uri: &str) -> Self {
        Self {
            store,
            base_uri: base_uri.trim_end_matches('/').to_owned(),
            listeners: ListenerSet::new(),
        }
    }

    /// Subscribe to resource events.
    pub fn subscribe(&self, listener: Arc<dyn GraphListener>) {
        self.listeners.subscribe(listener);
    }

    /// Graph addressed by `path`.
    pub fn graph_name(&self, path: &str) -> GraphName {
        if path.starts_with('/') {
            GraphName::named(format!("{}{path}", self.base_uri))
        } else {
            GraphName::named(format!("{}/{path}", self.base_uri))
        }
    }

    fn notify(&self, kind: OperationKind, graph: GraphName, started: Instant) {
        let elapsed = started.elapsed();
        debug!(
            operation = kind.label(),
            graph = %graph,
            elapsed_us = elapsed.as_micros(),
            "Resource operation"
        );
        self.listeners
            .publish(&GraphEvent::resource(kind, graph, elapsed));
    }

    /// GET: serialize the graph at `path` in a format from `accept`.
    pub fn retrieve(
        &self,
        path: &str,
        accept: Option<&str>,
    ) -> Result<GraphRepresentation, ProtocolError> {
        let format = RdfFormat::negotiate(accept)?;
        let graph = self.graph_name(path);

        let started = Instant::now();
        let quads = self.store.graph(&graph)?;
        if quads.is_empty() {
            return Err(ProtocolError::NotFound(graph.to_string()));
        }
        let body = serialize(format, &quads)?;
        let container = container_type(&graph, &quads);
        self.notify(OperationKind::Retrieve, graph, started);
        Ok(GraphRepresentation {
            format,
            body,
            container,
        })
    }

    /// PUT: atomically replace the graph at `path` with the payload.
    pub fn replace(
        &self,
        path: &str,
        content_type: Option<&str>,
        body: &str,
    ) -> Result<WriteOutcome, ProtocolError> {
        let format = RdfFormat::for_content_type(content_type)?;
        let graph = self.graph_name(path);
        let quads = parse_statements(body, format, &graph)?;

        let started = Instant::now();
        let current = self.store.graph(&graph)?;
        if container_type(&graph, &current).is_some()
            && containment(&current) != containment(&quads)
        {
            return Err(ProtocolError::Conflict(graph.to_string()));
        }
        let outcome = if current.is_empty() {
            WriteOutcome::Created
        } else {
            WriteOutcome::Updated
        };
        self.store.replace_graph(&graph, quads)?;
        self.notify(OperationKind::Replace, graph, started);
        Ok(outcome)
    }

    /// POST: add the payload to the graph at `path`.
    pub fn extend(
        &self,
        path: &str,
        content_type: Option<&str>,
        body: &str,
    ) -> Result<WriteOutcome, ProtocolError> {
        let format = RdfFormat::for_content_type(content_type)?;
        let graph = self.graph_name(path);
        let current = self.store.graph(&graph)?;
        if container_type(&graph, &current).is_some() {
            return self.create_child(&graph, format, body);
        }
        let quads = parse_statements(body, format, &graph)?;

        let started = Instant::now();
        let outcome = if current.is_empty() {
            WriteOutcome::Created
        } else {
            WriteOutcome::Updated
        };
        self.store.extend_graph(&graph, quads)?;
        self.notify(OperationKind::Extend, graph, started);
        Ok(outcome)
    }

    /// POST to a container: store the payload as a fresh child graph, then
    /// link it from the container.
    fn create_child(
        &self,
        container: &GraphName,
        format: RdfFormat,
        body: &str,
    ) -> Result<WriteOutcome, ProtocolError> {
        let parent = container.iri().unwrap_or_default();
        let child_iri = format!("{parent}/{}", Uuid::new_v4());
        let child = GraphName::named(child_iri.as_str());
        let quads = parse_statements(body, format, &child)?;

        let started = Instant::now();
        self.store.extend_graph(&child, quads)?;
        self.notify(OperationKind::Extend, container.clone(), started);

        let started = Instant::now();
        let link = Quad::new(
            Term::iri(parent),
            Term::iri(LDP_CONTAINS),
            Term::iri(child_iri.as_str()),
            container.clone(),
        );
        self.store.extend_graph(container, vec![link])?;
        self.notify(OperationKind::Extend, container.clone(), started);
        debug!(container = %container, child = %child_iri, "Contained resource created");
        Ok(WriteOutcome::Contained(child_iri))
    }

    /// DELETE: remove every statement of the graph at `path`, and its
    /// `ldp:contains` links in any container.
    pub fn delete(&self, path: &str) -> Result<(), ProtocolError> {
        let graph = self.graph_name(path);
        if !self.store.contains_graph(&graph)? {
            return Err(ProtocolError::NotFound(graph.to_string()));
        }

        if let Some(iri) = graph.iri() {
            let target = Term::iri(iri);
            let mut links: BTreeMap<GraphName, Vec<Quad>> = BTreeMap::new();
            for quad in self.store.find(None, Some(&Term::iri(LDP_CONTAINS)), None)? {
                if quad.object == target && quad.graph != graph {
                    links.entry(quad.graph.clone()).or_default().push(quad);
                }
            }
            for (container, quads) in links {
                let started = Instant::now();
                for quad in &quads {
                    self.store.remove(quad)?;
                }
                self.notify(OperationKind::Replace, container, started);
            }
        }

        let started = Instant::now();
        self.store.clear_graph(&graph)?;
        self.notify(OperationKind::Delete, graph, started);
        Ok(())
    }
}

/// Container type of `graph` given its statements.
fn container_type(graph: &GraphName, quads: &[Quad]) -> Option<String> {
    let iri = graph.iri()?;
    quads
        .iter()
        .filter(|quad| quad.subject.is_iri(iri) && quad.predicate.is_iri(RDF_TYPE))
        .find_map(|quad| {
            LDP_CONTAINER_TYPES
                .iter()
                .find(|kind| quad.object.is_iri(kind))
                .map(|kind| (*kind).to_owned())
        })
}

/// The `ldp:contains` links among `quads`, ignoring the graph they sit in.
fn containment(quads: &[Quad]) -> BTreeSet<(&Term, &Term)> {
    quads
        .iter()
        .filter(|quad| quad.predicate.is_iri(LDP_CONTAINS))
        .map(|quad| (&quad.subject, &quad.object))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use bold_store::MemoryStore;

    use super::*;

    const BASE: &str = "http://localhost:8080";
    const BODY: &str = "<http://ex.org/s> <http://ex.org/p> \"1\" .\n";

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(OperationKind, GraphName)>>);

    impl GraphListener for Recorder {
        fn on_event(&self, event: &GraphEvent) {
            if let Some((kind, access)) = event.as_resource() {
                self.0.lock().unwrap().push((kind, access.graph.clone()));
            }
        }
    }

    fn protocol() -> (GraphStoreProtocol, Arc<Recorder>) {
        let protocol = GraphStoreProtocol::new(Arc::new(MemoryStore::new()), "http://localhost:8080/");
        let recorder = Arc::new(Recorder::default());
        protocol.subscribe(Arc::clone(&recorder) as Arc<dyn GraphListener>);
        (protocol, recorder)
    }

    #[test]
    fn paths_address_graphs_below_the_base() {
        let (protocol, _) = protocol();
        assert_eq!(protocol.graph_name("/room/1").iri(), Some("http://localhost:8080/room/1"));
        assert_eq!(protocol.graph_name("sim").iri(), Some("http://localhost:8080/sim"));
    }

    #[test]
    fn replace_then_retrieve_round_trips_the_graph() {
        let (protocol, recorder) = protocol();
        assert_eq!(protocol.replace("/g", None, BODY).unwrap(), WriteOutcome::Created);
        assert_eq!(protocol.replace("/g", None, BODY).unwrap(), WriteOutcome::Updated);

        let representation = protocol.retrieve("/g", Some("application/n-quads")).unwrap();
        assert_eq!(representation.format, RdfFormat::NQuads);
        let text = String::from_utf8(representation.body).unwrap();
        assert!(text.contains(&format!("<{BASE}/g>")));

        let events = recorder.0.lock().unwrap().clone();
        let kinds: Vec<OperationKind> = events.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(
            kinds,
            vec![OperationKind::Replace, OperationKind::Replace, OperationKind::Retrieve]
        );
        assert!(events.iter().all(|(_, graph)| graph.iri() == Some("http://localhost:8080/g")));
    }

    #[test]
    fn missing_graphs_are_not_found() {
        let (protocol, recorder) = protocol();
        assert!(matches!(protocol.retrieve("/nope", None), Err(ProtocolError::NotFound(_))));
        assert!(matches!(protocol.delete("/nope"), Err(ProtocolError::NotFound(_))));
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[test]
    fn malformed_payload_leaves_the_graph_untouched() {
        let (protocol, _) = protocol();
        protocol.replace("/g", None, BODY).unwrap();
        let err = protocol
            .replace("/g", Some("text/turtle"), "<http://ex.org/s> broken")
            .unwrap_err();
        assert!(matches!(err, ProtocolError::BadRequest(_)));
        let text = String::from_utf8(protocol.retrieve("/g", None).unwrap().body).unwrap();
        assert_eq!(text, BODY);
    }

    #[test]
    fn extend_adds_and_delete_removes() {
        let (protocol, _) = protocol();
        assert_eq!(protocol.extend("/g", None, BODY).unwrap(), WriteOutcome::Created);
        let more = "<http://ex.org/s> <http://ex.org/p> \"2\" .\n";
        assert_eq!(
            protocol.extend("/g", Some("application/n-triples"), more).unwrap(),
            WriteOutcome::Updated
        );
        let text = String::from_utf8(protocol.retrieve("/g", None).unwrap().body).unwrap();
        assert_eq!(text.lines().count(), 2);

        protocol.delete("/g").unwrap();
        assert!(matches!(protocol.retrieve("/g", None), Err(ProtocolError::NotFound(_))));
    }

    const CONTAINER: &str = "<http://localhost:8080/rooms> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/ns/ldp#BasicContainer> .\n";

    #[test]
    fn post_to_a_container_creates_a_linked_child() {
        let (protocol, recorder) = protocol();
        protocol.replace("/rooms", None, CONTAINER).unwrap();

        let outcome = protocol.extend("/rooms", None, BODY).unwrap();
        let child = outcome.location().unwrap();
        assert!(child.starts_with("http://localhost:8080/rooms/"));
        let child_path = child.trim_start_matches(BASE);
        let text = String::from_utf8(protocol.retrieve(child_path, None).unwrap().body).unwrap();
        assert_eq!(text, BODY);

        let container = protocol.retrieve("/rooms", None).unwrap();
        assert_eq!(
            container.container.as_deref(),
            Some("http://www.w3.org/ns/ldp#BasicContainer")
        );
        let text = String::from_utf8(container.body).unwrap();
        assert!(text.contains(&format!("<http://www.w3.org/ns/ldp#contains> <{child}>")));

        let extends = recorder
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|(kind, _)| *kind == OperationKind::Extend)
            .count();
        assert_eq!(extends, 2);
    }

    #[test]
    fn put_may_not_change_containment() {
        let (protocol, _) = protocol();
        protocol.replace("/rooms", None, CONTAINER).unwrap();
        let outcome = protocol.extend("/rooms", None, BODY).unwrap();
        let child = outcome.location().unwrap();

        assert!(matches!(
            protocol.replace("/rooms", None, CONTAINER),
            Err(ProtocolError::Conflict(_))
        ));

        let restated = format!(
            "{CONTAINER}<http://localhost:8080/rooms> <http://www.w3.org/ns/ldp#contains> <{child}> .\n\
             <http://localhost:8080/rooms> <http://ex.org/label> \"rooms\" .\n"
        );
        assert_eq!(
            protocol.replace("/rooms", None, &restated).unwrap(),
            WriteOutcome::Updated
        );
    }

    #[test]
    fn deleting_a_child_unlinks_it() {
        let (protocol, _) = protocol();
        protocol.replace("/rooms", None, CONTAINER).unwrap();
        let outcome = protocol.extend("/rooms", None, BODY).unwrap();
        let child = outcome.location().unwrap();

        protocol.delete(child.trim_start_matches(BASE)).unwrap();
        let text = String::from_utf8(protocol.retrieve("/rooms", None).unwrap().body).unwrap();
        assert_eq!(text, CONTAINER);
    }

    #[test]
    fn value_formats_cannot_be_written() {
        let (protocol, _) = protocol();
        assert!(matches!(
            protocol.replace("/g", Some("application/json"), "{}"),
            Err(ProtocolError::UnsupportedMediaType(_))
        ));
    }
}
