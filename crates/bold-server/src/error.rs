//! Error types for the server binary.
//!
//! [`ServerBinError`] is the top-level error type that wraps all possible
//! failure modes during startup and shutdown.

use std::path::PathBuf;

/// Top-level error for the server binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum ServerBinError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: bold_core::config::ConfigError,
    },

    /// A dataset or program file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// The file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A dataset file is not valid RDF.
    #[error("dataset {path}: {source}")]
    Dataset {
        /// The file.
        path: PathBuf,
        /// The underlying parse error.
        source: bold_store::FormatError,
    },

    /// A program file could not be compiled by the store.
    #[error("program {path}: {source}")]
    Program {
        /// The file.
        path: PathBuf,
        /// The underlying compilation error.
        source: bold_store::ProgramError,
    },

    /// Engine registration failed.
    #[error("engine error: {source}")]
    Engine {
        /// The underlying engine error.
        #[from]
        source: bold_core::EngineError,
    },

    /// The protocol server failed to start.
    #[error("server error: {source}")]
    Startup {
        /// The underlying startup error.
        #[from]
        source: bold_protocol::StartupError,
    },

    /// Waiting for the shutdown signal failed.
    #[error("signal error: {0}")]
    Signal(std::io::Error),
}
