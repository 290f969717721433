//! Graph store protocol and HTTP surface for the BOLD simulation server.
//!
//! Agents read and write named graphs of the live dataset over HTTP. The
//! protocol itself ([`gsp`]) is independent of the web framework; the
//! [`handlers`] gate it on the simulation state, so that the control
//! resource `PUT /sim` starts a run and requests outside a run are turned
//! away.
//!
//! # Modules
//!
//! - [`gsp`] -- Retrieve, replace, extend and delete on named graphs and
//!   LDP containers, with resource events for the interaction history
//! - [`handlers`] -- State-gated request dispatch
//! - [`router`] -- Axum router with CORS and request tracing
//! - [`server`] -- Binding and graceful serving
//! - [`startup`] -- Background server task
//! - [`state`] -- Shared handler state
//! - [`ws`] -- `WebSocket` feed of added statements
//! - [`error`] -- `ProtocolError` and its HTTP mapping

pub mod error;
pub mod gsp;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

pub use error::ProtocolError;
pub use gsp::{GraphRepresentation, GraphStoreProtocol, WriteOutcome};
pub use router::build_router;
pub use server::{ServerError, bind, serve};
pub use startup::{ProtocolServer, StartupError, spawn_protocol_server};
pub use state::AppState;
pub use ws::StatementFeed;
