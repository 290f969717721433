//! Shared application state for the HTTP handlers.

use std::sync::Arc;

use bold_core::SimulationEngine;
use bold_store::GraphListener;

use crate::gsp::GraphStoreProtocol;
use crate::ws::StatementFeed;

/// State shared by every request: the engine, the protocol handler over
/// the engine's live store and the statement feed of that store.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The simulation engine.
    pub engine: SimulationEngine,
    /// Graph store protocol over the live store.
    pub protocol: Arc<GraphStoreProtocol>,
    /// Added statements, pushed to `WebSocket` clients.
    pub feed: Arc<StatementFeed>,
}

impl AppState {
    /// Build the protocol handler for `engine`, subscribe the engine's
    /// interaction history to its resource events and the statement feed
    /// to the live store.
    pub fn new(engine: SimulationEngine) -> Self {
        let store = engine.store();
        let protocol = GraphStoreProtocol::new(Arc::clone(&store), &engine.settings().base_uri);
        protocol.subscribe(engine.interaction_history() as Arc<dyn GraphListener>);
        let feed = Arc::new(StatementFeed::new());
        store.subscribe(Arc::clone(&feed) as Arc<dyn GraphListener>);
        Self {
            engine,
            protocol: Arc::new(protocol),
            feed,
        }
    }
}
