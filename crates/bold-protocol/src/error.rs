//! Error types for the graph store protocol.
//!
//! [`ProtocolError`] unifies every failure of a protocol request into a
//! single enum that converts into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bold_core::EngineError;
use bold_store::{FormatError, StoreError};
use bold_types::SimulationState;

/// Methods a graph resource supports, for `Allow` headers.
pub const ALLOWED_METHODS: &str = "GET, PUT, POST, DELETE";

/// Errors that can occur while serving a protocol request.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The addressed graph holds no statement.
    #[error("graph not found: {0}")]
    NotFound(String),

    /// No acceptable response format.
    #[error("not acceptable: {0}")]
    NotAcceptable(String),

    /// The request body's media type cannot be read.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The request body is malformed.
    #[error("malformed payload: {0}")]
    BadRequest(String),

    /// A container replacement would change its containment links.
    #[error("containment of {0} cannot be changed by PUT")]
    Conflict(String),

    /// The method is not part of the protocol.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// The engine does not accept requests in its current state.
    #[error("simulation is {0}")]
    Unavailable(SimulationState),

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The engine failed to start a run.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Serialization failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<FormatError> for ProtocolError {
    fn from(err: FormatError) -> Self {
        match err {
            FormatError::NotAcceptable(accept) => Self::NotAcceptable(accept),
            FormatError::UnsupportedMediaType(media) => Self::UnsupportedMediaType(media),
            err @ FormatError::Syntax { .. } => Self::BadRequest(err.to_string()),
            FormatError::Io(err) => Self::Internal(err.to_string()),
        }
    }
}

impl ProtocolError {
    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) | Self::Engine(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ProtocolError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        let mut response = (status, axum::Json(body)).into_response();
        if matches!(self, Self::MethodNotAllowed(_)) {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
        }
        response
    }
}
