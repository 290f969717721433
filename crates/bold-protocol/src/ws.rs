//! `WebSocket` feed of statements added to the live store.
//!
//! Clients connect to `GET /ws` and first receive one text frame holding
//! the whole live store as N-Triples. After that every statement added to
//! the store arrives as its own N-Triples line. Removals are not pushed.
//!
//! [`StatementFeed`] is a store listener fanning added statements out over
//! a [`broadcast`] channel, so all connected clients see the same stream.
//! A client that falls behind skips the lagged lines and carries on.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use bold_store::{GraphListener, GraphStore, StoreError};
use bold_types::GraphEvent;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::state::AppState;

/// Lines buffered per client before it starts lagging.
const FEED_CAPACITY: usize = 1024;

/// Store listener publishing every added statement as an N-Triples line.
#[derive(Debug)]
pub struct StatementFeed {
    sender: broadcast::Sender<String>,
}

impl Default for StatementFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementFeed {
    /// Create a feed with no subscribers.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    /// Receive every line published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

impl GraphListener for StatementFeed {
    fn on_event(&self, event: &GraphEvent) {
        if let GraphEvent::StatementAdded(quad) = event {
            // No connected client is not an error.
            self.sender.send(format!("{}\n", quad.to_ntriples())).ok();
        }
    }
}

/// N-Triples export of everything in `store`, one statement per line.
pub fn export(store: &dyn GraphStore) -> Result<String, StoreError> {
    let mut out = String::new();
    for quad in store.statements()? {
        out.push_str(&quad.to_ntriples());
        out.push('\n');
    }
    Ok(out)
}

/// Upgrade to a `WebSocket` and stream the live store.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_statements(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    debug!("WebSocket client connected");

    // Subscribe before the export so nothing added in between is lost.
    let mut rx = state.feed.subscribe();
    let snapshot = match export(state.engine.store().as_ref()) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(error = %e, "Failed to export the store for a WebSocket client");
            return;
        }
    };
    if socket.send(Message::Text(snapshot.into())).await.is_err() {
        debug!("WebSocket client disconnected (export failed)");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(line) => {
                        if socket.send(Message::Text(line.into())).await.is_err() {
                            debug!("WebSocket client disconnected (send failed)");
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(skipped = n, "WebSocket client lagged, skipping ahead");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Statement feed closed, shutting down WebSocket");
                        return;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    // Clients have nothing to say.
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bold_store::MemoryStore;
    use bold_types::{GraphName, Quad, Term};

    use super::*;

    fn quad(n: i64) -> Quad {
        Quad::new(
            Term::iri("http://ex.org/s"),
            Term::iri("http://ex.org/p"),
            Term::integer(n),
            GraphName::named("http://ex.org/g"),
        )
    }

    #[test]
    fn added_statements_reach_every_subscriber() {
        let store = MemoryStore::new();
        let feed = Arc::new(StatementFeed::new());
        store.subscribe(Arc::clone(&feed) as Arc<dyn GraphListener>);
        let mut first = feed.subscribe();
        let mut second = feed.subscribe();

        store.insert(quad(1)).unwrap();
        store.remove(&quad(1)).unwrap();

        let expected = format!("{}\n", quad(1).to_ntriples());
        assert_eq!(first.try_recv().unwrap(), expected);
        assert_eq!(second.try_recv().unwrap(), expected);
        assert!(first.try_recv().is_err());
    }

    #[test]
    fn export_lists_the_whole_store() {
        let store = MemoryStore::new();
        assert_eq!(export(&store).unwrap(), "");
        store.insert(quad(1)).unwrap();
        store.insert(quad(2)).unwrap();
        assert_eq!(export(&store).unwrap().lines().count(), 2);
    }
}
