//! Request dispatch by simulation state.
//!
//! | State | Behavior |
//! |-------|----------|
//! | Initializing | only `PUT /sim` is served; it writes the control resource and starts the run. Anything else is 404 |
//! | Running | every request is an ordinary graph store request |
//! | any other | 503 |
//!
//! Requests served while Running hold a permit from the engine for the
//! whole store operation, so none of them can write after the run has been
//! sealed. Unknown methods are answered with 405 once a request reaches the
//! graph store protocol.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use bold_core::ControlStart;
use bold_core::control::CONTROL_PATH;
use bold_types::SimulationState;
use tracing::{info, warn};

use crate::error::ProtocolError;
use crate::gsp::{GraphStoreProtocol, WriteOutcome};
use crate::state::AppState;

/// Fallback handler: every path is a potential graph resource.
pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path();
    let result = match state.engine.state() {
        SimulationState::Initializing => {
            if method == Method::PUT && path == CONTROL_PATH {
                start_run(&state, &headers, &body).await
            } else {
                Err(ProtocolError::NotFound(String::from(path)))
            }
        }
        SimulationState::Running => serve_admitted(&state, &method, path, &headers, &body).await,
        other => Err(ProtocolError::Unavailable(other)),
    };

    result.unwrap_or_else(|err| {
        if err.status().is_server_error() && !matches!(err, ProtocolError::Unavailable(_)) {
            warn!(%method, path, error = %err, "Request failed");
        }
        err.into_response()
    })
}

/// `PUT /sim` while the engine awaits its start signal.
async fn start_run(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, ProtocolError> {
    let text = body_text(body)?;
    let content_type = header_value(headers, header::CONTENT_TYPE);
    let protocol = &state.protocol;
    let started = state
        .engine
        .start_with_control_write(|| protocol.replace(CONTROL_PATH, content_type, text))
        .await?;

    match started {
        ControlStart::Started { run_id, output } => {
            info!(%run_id, "Run started by control write");
            Ok(write_response(output))
        }
        ControlStart::Rejected(err) => Err(err),
        // Another request started the run between our state read and the
        // lock. While Running the write is an ordinary request.
        ControlStart::NotAwaiting(SimulationState::Running) => {
            serve_admitted(state, &Method::PUT, CONTROL_PATH, headers, body).await
        }
        ControlStart::NotAwaiting(other) => Err(ProtocolError::Unavailable(other)),
    }
}

/// An ordinary graph store request, served only if the engine admits it
/// into the running simulation.
async fn serve_admitted(
    state: &AppState,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, ProtocolError> {
    match state.engine.admit_request().await {
        Ok(_permit) => serve(&state.protocol, method, path, headers, body),
        // The run ended while the request waited.
        Err(SimulationState::Initializing) => Err(ProtocolError::NotFound(String::from(path))),
        Err(other) => Err(ProtocolError::Unavailable(other)),
    }
}

/// An ordinary graph store request.
fn serve(
    protocol: &GraphStoreProtocol,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, ProtocolError> {
    let content_type = header_value(headers, header::CONTENT_TYPE);
    match *method {
        Method::GET => {
            let accept = header_value(headers, header::ACCEPT);
            let representation = protocol.retrieve(path, accept)?;
            let mut response = (
                StatusCode::OK,
                [(header::CONTENT_TYPE, representation.format.media_type())],
                representation.body,
            )
                .into_response();
            if let Some(link) = representation
                .container
                .and_then(|kind| HeaderValue::try_from(format!("<{kind}>; rel=\"type\"")).ok())
            {
                response.headers_mut().insert(header::LINK, link);
            }
            Ok(response)
        }
        Method::PUT => Ok(write_response(protocol.replace(
            path,
            content_type,
            body_text(body)?,
        )?)),
        Method::POST => Ok(write_response(protocol.extend(
            path,
            content_type,
            body_text(body)?,
        )?)),
        Method::DELETE => {
            protocol.delete(path)?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        _ => Err(ProtocolError::MethodNotAllowed(method.to_string())),
    }
}

fn write_response(outcome: WriteOutcome) -> Response {
    match outcome {
        WriteOutcome::Created => StatusCode::CREATED.into_response(),
        WriteOutcome::Updated => StatusCode::NO_CONTENT.into_response(),
        WriteOutcome::Contained(child) => match HeaderValue::try_from(child) {
            Ok(location) => (StatusCode::CREATED, [(header::LOCATION, location)]).into_response(),
            Err(_) => StatusCode::CREATED.into_response(),
        },
    }
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn body_text(body: &Bytes) -> Result<&str, ProtocolError> {
    std::str::from_utf8(body)
        .map_err(|err| ProtocolError::BadRequest(format!("payload is not UTF-8: {err}")))
}
