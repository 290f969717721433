//! Integration tests for the protocol surface.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server, except for the startup and `WebSocket` tests
//! which bind an ephemeral port.

#![allow(clippy::unwrap_used)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use bold_core::config::ServerConfig;
use bold_core::sink::{MemorySinks, SinkProvider};
use bold_core::{EngineSettings, SimulationEngine};
use bold_protocol::{AppState, build_router, spawn_protocol_server};
use bold_store::{GraphListener, GraphStore, MemoryStore, StoreError};
use bold_types::{GraphName, Quad, SimulationState, Term};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower::ServiceExt;

const BASE: &str = "http://localhost:8080";
const ITERATIONS_BODY: &str =
    "<http://localhost:8080/sim> <http://ti.rw.fau.de/sim#iterations> \"100000\"^^<http://www.w3.org/2001/XMLSchema#integer> .\n";
const ZERO_ITERATIONS_BODY: &str =
    "<http://localhost:8080/sim> <http://ti.rw.fau.de/sim#iterations> \"0\"^^<http://www.w3.org/2001/XMLSchema#integer> .\n";
const ROOM_BODY: &str = "<http://ex.org/room1> <http://ex.org/temperature> \"21\" .\n";

/// Store wrapper counting graph-level reads, with an optional gate that
/// blocks `clear` until released and an optional slow `replace_graph` for
/// one graph that signals when it starts.
struct InstrumentedStore {
    inner: MemoryStore,
    graph_reads: AtomicUsize,
    clear_gate: Option<(mpsc::Sender<()>, Mutex<mpsc::Receiver<()>>)>,
    slow_replace: Option<(GraphName, mpsc::Sender<()>)>,
}

impl InstrumentedStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            graph_reads: AtomicUsize::new(0),
            clear_gate: None,
            slow_replace: None,
        }
    }

    fn graph_reads(&self) -> usize {
        self.graph_reads.load(Ordering::SeqCst)
    }
}

impl GraphStore for InstrumentedStore {
    fn insert(&self, quad: Quad) -> Result<bool, StoreError> {
        self.inner.insert(quad)
    }

    fn remove(&self, quad: &Quad) -> Result<bool, StoreError> {
        self.inner.remove(quad)
    }

    fn contains_graph(&self, graph: &GraphName) -> Result<bool, StoreError> {
        self.graph_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.contains_graph(graph)
    }

    fn graph(&self, graph: &GraphName) -> Result<Vec<Quad>, StoreError> {
        self.graph_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.graph(graph)
    }

    fn statements(&self) -> Result<Vec<Quad>, StoreError> {
        self.inner.statements()
    }

    fn find(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        graph: Option<&GraphName>,
    ) -> Result<Vec<Quad>, StoreError> {
        self.inner.find(subject, predicate, graph)
    }

    fn len(&self) -> Result<usize, StoreError> {
        self.inner.len()
    }

    fn clear(&self) -> Result<(), StoreError> {
        if let Some((entered, release)) = &self.clear_gate {
            entered.send(()).unwrap();
            release.lock().unwrap().recv().unwrap();
        }
        self.inner.clear()
    }

    fn replace_graph(&self, graph: &GraphName, quads: Vec<Quad>) -> Result<(), StoreError> {
        if let Some((slow, entered)) = &self.slow_replace
            && slow == graph
        {
            entered.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(400));
        }
        self.inner.replace_graph(graph, quads)
    }

    fn extend_graph(&self, graph: &GraphName, quads: Vec<Quad>) -> Result<(), StoreError> {
        self.inner.extend_graph(graph, quads)
    }

    fn clear_graph(&self, graph: &GraphName) -> Result<usize, StoreError> {
        self.inner.clear_graph(graph)
    }

    fn subscribe(&self, listener: Arc<dyn GraphListener>) {
        self.inner.subscribe(listener);
    }

    fn detached(&self) -> Arc<dyn GraphStore> {
        self.inner.detached()
    }
}

struct Harness {
    engine: SimulationEngine,
    sinks: Arc<MemorySinks>,
    router: Router,
}

fn harness(store: Arc<dyn GraphStore>) -> Harness {
    let sinks = Arc::new(MemorySinks::new());
    let settings = EngineSettings {
        base_uri: String::from(BASE),
        timeslot: Duration::from_millis(50),
        output_dir: PathBuf::from("unused"),
    };
    let engine = SimulationEngine::with_sinks(
        store,
        settings,
        Arc::clone(&sinks) as Arc<dyn SinkProvider>,
    );
    let router = build_router(Arc::new(AppState::new(engine.clone())));
    Harness {
        engine,
        sinks,
        router,
    }
}

async fn awaiting_start(store: Arc<dyn GraphStore>) -> Harness {
    let h = harness(store);
    h.engine.registration_done().await.unwrap();
    h
}

async fn send(router: &Router, request: Request<Body>) -> axum::response::Response {
    router.clone().oneshot(request).await.unwrap()
}

fn request(method: &str, path: &str) -> axum::http::request::Builder {
    Request::builder().method(method).uri(path)
}

async fn put(router: &Router, path: &str, content_type: &str, body: &str) -> StatusCode {
    let req = request("PUT", path)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body.to_owned()))
        .unwrap();
    send(router, req).await.status()
}

/// Per-operation totals of a run's interaction table: get, put, delete,
/// post.
fn interaction_totals(sinks: &MemorySinks, run: u64) -> Vec<u64> {
    let interactions = sinks
        .contents(format!("run-{run}/interactions.tsv"))
        .unwrap();
    interactions
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(|line| {
            line.split('\t')
                .skip(1)
                .step_by(2)
                .take(4)
                .map(|count| count.parse::<u64>().unwrap())
                .collect::<Vec<_>>()
        })
        .fold(vec![0_u64; 4], |acc, row| {
            acc.iter().zip(row).map(|(a, b)| a.saturating_add(b)).collect()
        })
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn only_the_control_put_is_served_while_awaiting_start() {
    let h = awaiting_start(Arc::new(MemoryStore::new())).await;

    let get = send(&h.router, request("GET", "/sim").body(Body::empty()).unwrap()).await;
    assert_eq!(get.status(), StatusCode::NOT_FOUND);
    assert_eq!(put(&h.router, "/room", "text/turtle", ROOM_BODY).await, StatusCode::NOT_FOUND);
    assert_eq!(h.engine.state(), SimulationState::Initializing);
}

#[tokio::test]
async fn requests_before_registration_is_done_are_unavailable() {
    let h = harness(Arc::new(MemoryStore::new()));
    let response = send(&h.router, request("GET", "/sim").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["status"], 503);
    assert!(json["error"].as_str().unwrap().contains("configured"));
}

#[tokio::test]
async fn control_put_starts_the_run_and_later_puts_are_ordinary() {
    let h = awaiting_start(Arc::new(MemoryStore::new())).await;

    assert_eq!(
        put(&h.router, "/sim", "text/turtle", ITERATIONS_BODY).await,
        StatusCode::CREATED
    );
    assert_eq!(h.engine.state(), SimulationState::Running);

    assert_eq!(
        put(&h.router, "/sim", "text/turtle", ITERATIONS_BODY).await,
        StatusCode::NO_CONTENT
    );
    assert_eq!(h.engine.state(), SimulationState::Running);

    let summary = h.engine.stop().await.unwrap();
    assert_eq!(summary.run, 1);
}

#[tokio::test]
async fn malformed_control_put_does_not_start_the_run() {
    let h = awaiting_start(Arc::new(MemoryStore::new())).await;

    assert_eq!(
        put(&h.router, "/sim", "text/turtle", "<http://localhost:8080/sim> oops").await,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(h.engine.state(), SimulationState::Initializing);
    assert!(h.engine.store().is_empty().unwrap());
}

#[tokio::test]
async fn graph_store_protocol_status_codes_while_running() {
    let h = awaiting_start(Arc::new(MemoryStore::new())).await;
    assert_eq!(
        put(&h.router, "/sim", "text/turtle", ITERATIONS_BODY).await,
        StatusCode::CREATED
    );

    let missing = send(&h.router, request("GET", "/room").body(Body::empty()).unwrap()).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    assert_eq!(
        put(&h.router, "/room", "application/json", "{}").await,
        StatusCode::UNSUPPORTED_MEDIA_TYPE
    );
    assert_eq!(
        put(&h.router, "/room", "text/turtle", "not a statement").await,
        StatusCode::BAD_REQUEST
    );

    let post = request("POST", "/room")
        .header(header::CONTENT_TYPE, "application/n-triples")
        .body(Body::from(ROOM_BODY))
        .unwrap();
    assert_eq!(send(&h.router, post).await.status(), StatusCode::CREATED);
    let post_again = request("POST", "/room").body(Body::from(ROOM_BODY)).unwrap();
    assert_eq!(send(&h.router, post_again).await.status(), StatusCode::NO_CONTENT);

    let get = request("GET", "/room")
        .header(header::ACCEPT, "*/*")
        .body(Body::empty())
        .unwrap();
    let response = send(&h.router, get).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/turtle");
    assert_eq!(body_text(response).await, ROOM_BODY);

    let unacceptable = request("GET", "/room")
        .header(header::ACCEPT, "image/png")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&h.router, unacceptable).await.status(), StatusCode::NOT_ACCEPTABLE);

    let patch = send(&h.router, request("PATCH", "/room").body(Body::empty()).unwrap()).await;
    assert_eq!(patch.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(patch.headers()[header::ALLOW], "GET, PUT, POST, DELETE");

    let delete = send(&h.router, request("DELETE", "/room").body(Body::empty()).unwrap()).await;
    assert_eq!(delete.status(), StatusCode::NO_CONTENT);
    let delete_again =
        send(&h.router, request("DELETE", "/room").body(Body::empty()).unwrap()).await;
    assert_eq!(delete_again.status(), StatusCode::NOT_FOUND);

    h.engine.stop().await.unwrap();

    // get, put, delete, post. Only the control put succeeded.
    assert_eq!(interaction_totals(&h.sinks, 1), vec![1, 1, 1, 2]);
}

#[tokio::test]
async fn prefixed_turtle_control_put_starts_the_run() {
    let h = awaiting_start(Arc::new(MemoryStore::new())).await;
    let body = "@prefix sim: <http://ti.rw.fau.de/sim#> .\n<> sim:iterations 3 .\n";

    assert_eq!(put(&h.router, "/sim", "text/turtle", body).await, StatusCode::CREATED);
    assert_eq!(h.engine.state(), SimulationState::Running);

    let summary = h.engine.wait_for_run().await.unwrap();
    assert_eq!(summary.ticks, 3);
}

#[tokio::test]
async fn unacceptable_accept_never_touches_the_store() {
    let store = Arc::new(InstrumentedStore::new());
    let h = awaiting_start(Arc::clone(&store) as Arc<dyn GraphStore>).await;
    assert_eq!(
        put(&h.router, "/sim", "text/turtle", ITERATIONS_BODY).await,
        StatusCode::CREATED
    );
    assert_eq!(
        put(&h.router, "/room", "text/turtle", ROOM_BODY).await,
        StatusCode::CREATED
    );

    let reads_before = store.graph_reads();
    let get = request("GET", "/room")
        .header(header::ACCEPT, "video/mp4")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&h.router, get).await.status(), StatusCode::NOT_ACCEPTABLE);
    assert_eq!(store.graph_reads(), reads_before);

    h.engine.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn control_put_during_cleaning_is_unavailable() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let store = Arc::new(InstrumentedStore {
        clear_gate: Some((entered_tx, Mutex::new(release_rx))),
        ..InstrumentedStore::new()
    });
    let h = awaiting_start(Arc::clone(&store) as Arc<dyn GraphStore>).await;

    assert_eq!(
        put(&h.router, "/sim", "text/turtle", ZERO_ITERATIONS_BODY).await,
        StatusCode::CREATED
    );
    tokio::task::spawn_blocking(move || entered_rx.recv().unwrap())
        .await
        .unwrap();
    assert_eq!(h.engine.state(), SimulationState::Cleaning);
    assert_eq!(
        put(&h.router, "/sim", "text/turtle", ZERO_ITERATIONS_BODY).await,
        StatusCode::SERVICE_UNAVAILABLE
    );

    release_tx.send(()).unwrap();
    let summary = h.engine.wait_for_run().await.unwrap();
    assert_eq!(summary.timeslots, 1);
    assert_eq!(h.engine.state(), SimulationState::Initializing);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn admitted_write_completes_before_the_run_is_cleaned() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let store = Arc::new(InstrumentedStore {
        slow_replace: Some((GraphName::named(format!("{BASE}/room")), entered_tx)),
        ..InstrumentedStore::new()
    });
    let h = awaiting_start(Arc::clone(&store) as Arc<dyn GraphStore>).await;
    let body = "@prefix sim: <http://ti.rw.fau.de/sim#> .\n<> sim:iterations 5 .\n";
    assert_eq!(put(&h.router, "/sim", "text/turtle", body).await, StatusCode::CREATED);

    let router = h.router.clone();
    let write = tokio::spawn(async move { put(&router, "/room", "text/turtle", ROOM_BODY).await });
    tokio::task::spawn_blocking(move || entered_rx.recv().unwrap())
        .await
        .unwrap();

    let summary = h.engine.wait_for_run().await.unwrap();
    assert_eq!(write.await.unwrap(), StatusCode::CREATED);
    assert_eq!(summary.ticks, 5);

    // The write landed inside the run: it was recorded, then cleaned up.
    assert_eq!(h.engine.state(), SimulationState::Initializing);
    assert!(store.is_empty().unwrap());
    assert_eq!(interaction_totals(&h.sinks, 1), vec![0, 2, 0, 0]);
}

#[tokio::test]
async fn spawned_server_answers_over_tcp() {
    let h = awaiting_start(Arc::new(MemoryStore::new())).await;
    let config = ServerConfig {
        host: String::from("127.0.0.1"),
        port: 0,
        base_uri: None,
    };
    let server = spawn_protocol_server(&config, Arc::new(AppState::new(h.engine.clone())))
        .await
        .unwrap();

    let mut stream = tokio::net::TcpStream::connect(server.local_addr())
        .await
        .unwrap();
    stream
        .write_all(b"GET /room HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 404"));

    server.shutdown().await;
}

#[tokio::test]
async fn container_post_creates_a_child_and_put_keeps_containment() {
    let h = awaiting_start(Arc::new(MemoryStore::new())).await;
    assert_eq!(
        put(&h.router, "/sim", "text/turtle", ITERATIONS_BODY).await,
        StatusCode::CREATED
    );
    let container = "@prefix ldp: <http://www.w3.org/ns/ldp#> .\n<> a ldp:BasicContainer .\n";
    assert_eq!(
        put(&h.router, "/rooms", "text/turtle", container).await,
        StatusCode::CREATED
    );

    let post = request("POST", "/rooms")
        .header(header::CONTENT_TYPE, "text/turtle")
        .body(Body::from(ROOM_BODY))
        .unwrap();
    let created = send(&h.router, post).await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let location = created.headers()[header::LOCATION].to_str().unwrap().to_owned();
    assert!(location.starts_with("http://localhost:8080/rooms/"));

    let child_path = location.trim_start_matches(BASE).to_owned();
    let child = send(&h.router, request("GET", &child_path).body(Body::empty()).unwrap()).await;
    assert_eq!(body_text(child).await, ROOM_BODY);

    let listing = send(&h.router, request("GET", "/rooms").body(Body::empty()).unwrap()).await;
    assert_eq!(
        listing.headers()[header::LINK],
        "<http://www.w3.org/ns/ldp#BasicContainer>; rel=\"type\""
    );
    assert!(body_text(listing).await.contains(&location));

    assert_eq!(
        put(&h.router, "/rooms", "text/turtle", container).await,
        StatusCode::CONFLICT
    );

    h.engine.stop().await.unwrap();
}

#[tokio::test]
async fn websocket_sends_the_store_then_added_statements() {
    let store = Arc::new(MemoryStore::new());
    let seeded = Quad::new(
        Term::iri("http://ex.org/room1"),
        Term::iri("http://ex.org/temperature"),
        Term::string("21"),
        GraphName::named("http://localhost:8080/room"),
    );
    store.insert(seeded.clone()).unwrap();
    let h = awaiting_start(Arc::clone(&store) as Arc<dyn GraphStore>).await;
    let config = ServerConfig {
        host: String::from("127.0.0.1"),
        port: 0,
        base_uri: None,
    };
    let server = spawn_protocol_server(&config, Arc::new(AppState::new(h.engine.clone())))
        .await
        .unwrap();

    let url = format!("ws://{}/ws", server.local_addr());
    let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    let export = socket.next().await.unwrap().unwrap();
    assert_eq!(export.to_text().unwrap(), format!("{}\n", seeded.to_ntriples()));

    let added = Quad::new(
        Term::iri("http://ex.org/room1"),
        Term::iri("http://ex.org/humidity"),
        Term::integer(40),
        GraphName::named("http://localhost:8080/room"),
    );
    store.insert(added.clone()).unwrap();
    store.remove(&seeded).unwrap();
    let pushed = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(pushed.to_text().unwrap(), format!("{}\n", added.to_ntriples()));

    socket.close(None).await.unwrap();
    server.shutdown().await;
}
