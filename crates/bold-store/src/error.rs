//! Error types for the store boundary.

use thiserror::Error;

/// Errors raised by a graph store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An internal lock was poisoned by a panicking writer.
    #[error("poisoned lock: {0}")]
    Poisoned(&'static str),

    /// Any other backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors raised while compiling or evaluating a program.
#[derive(Debug, Error)]
pub enum ProgramError {
    /// The backend cannot compile programs of this kind.
    #[error("cannot compile program {name}: {reason}")]
    Unsupported {
        /// Program name (usually its file name).
        name: String,
        /// Why compilation is not possible.
        reason: String,
    },

    /// The program ran but failed.
    #[error("program failed: {0}")]
    Failed(String),

    /// The store rejected an operation issued by the program.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by content negotiation and the RDF line codec.
#[derive(Debug, Error)]
pub enum FormatError {
    /// No acceptable response format in the `Accept` header.
    #[error("none of the accepted media types can be produced: {0}")]
    NotAcceptable(String),

    /// The request body's media type cannot be parsed.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// A payload line is not a valid statement.
    #[error("syntax error on line {line}: {message}")]
    Syntax {
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        message: String,
    },

    /// Writing serialized output failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
