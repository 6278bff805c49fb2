// src/error.rs

//! Error types for the review pipeline
//!
//! Per-record and per-source errors (`NotFeedIdentifiable`, `RecordNotReady`,
//! `ServiceNotAvailable`) are isolated by the operations and reported in
//! aggregate. Cross-cutting errors (`Settings`, `NotInitialized`) abort the
//! whole operation.

use crate::record::RecordStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A normal transition tried to move a record against the pipeline order
    #[error("process order violation for {id}: {from} -> {to}")]
    ProcessOrderViolation {
        id: String,
        from: RecordStatus,
        to: RecordStatus,
    },

    /// A reset was requested that does not move the record backward
    #[error("invalid reset of {id}: {reason}")]
    InvalidReset { id: String, reason: String },

    /// A transition precondition is not met
    #[error("record {id} not ready for {target}: {condition}")]
    RecordNotReady {
        id: String,
        target: RecordStatus,
        condition: String,
    },

    /// A feed record lacks its source identifier
    #[error("not feed-identifiable ({identifier} not in record)")]
    NotFeedIdentifiable { identifier: String },

    /// An external collaborator (search API, index, dedupe engine) is unreachable
    #[error("service not available: {service} ({reason})")]
    ServiceNotAvailable { service: String, reason: String },

    /// Transient persistence contention (lock held, concurrent write)
    #[error("contention: {0}")]
    Contention(String),

    /// A retried operation kept failing
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last: String,
    },

    /// Settings file missing or malformed
    #[error("settings error: {0}")]
    Settings(String),

    /// The directory is not an initialized review repository
    #[error("not a review repository: {} (run `litrev init`)", .0.display())]
    NotInitialized(PathBuf),

    /// Record snapshot could not be parsed
    #[error("parse error in {file} line {line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("invalid origin: {0}")]
    InvalidOrigin(String),

    #[error("unknown record: {0}")]
    UnknownRecord(String),

    #[error("unknown search endpoint: {0}")]
    UnknownEndpoint(String),

    /// A selection named nothing that exists
    #[error("invalid selection '{value}' (options: {})", .options.join(", "))]
    Selection { value: String, options: Vec<String> },

    #[error("change log error: {0}")]
    ChangeLog(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the retry helper may retry after this error
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Contention(_) | Error::ServiceNotAvailable { .. } => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::AlreadyExists
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Whether the error is scoped to one record or one source
    pub fn is_isolated(&self) -> bool {
        matches!(
            self,
            Error::NotFeedIdentifiable { .. }
                | Error::RecordNotReady { .. }
                | Error::ServiceNotAvailable { .. }
                | Error::ProcessOrderViolation { .. }
        )
    }
}
