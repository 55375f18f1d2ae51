//! Error types shared by the Pixie/Vizier client crates.
//!
//! [`ApiError`] is the single error type returned from every fallible
//! operation in [`pixie-client`](https://docs.rs/pixie-client): schema
//! decoding, table buffering, stream demultiplexing, and session
//! orchestration all funnel their failures through this enum so that a
//! caller only ever has one error type to match on.

use std::sync::Arc;

use thiserror::Error;

/// A boxed, cloneable, thread-safe error.
///
/// The core's propagation policy requires handing the exact same terminal
/// error to every open table buffer and to the session's own outcome, so
/// [`ApiError`] as a whole must be [`Clone`]. Wrapping foreign error sources
/// (transport failures, callback failures) behind an `Arc` is what makes
/// that possible without forcing every collaborator's error type to be
/// `Clone` itself.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// The full error taxonomy the core distinguishes.
///
/// Propagation policy: no error is recovered inside the core. The first
/// error observed becomes the session's terminal outcome; concurrent
/// consumers are cancelled; subsequent errors are suppressed.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Server returned a non-OK status with compiler line/column details.
    #[error("PxL, line {line}, col {column}: {message}")]
    ScriptCompileError {
        line: i64,
        column: i64,
        message: String,
    },

    /// Server returned a non-OK status without compiler details.
    #[error("{0}")]
    ScriptValueError(String),

    /// Stream closed cleanly but a user-subscribed table name never saw
    /// metadata.
    #[error("Table '{table}' not received")]
    TableNotReceived { table: String },

    /// Transport ended without end-of-stream for a table whose metadata had
    /// already been observed.
    #[error("Closed before receiving end-of-stream.")]
    UnexpectedEndOfStream,

    /// Duplicate table id, row-batch for unknown id, or unknown column
    /// type: a violation of the wire protocol's own invariants.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// Configuration call after run, double subscribe, or a synchronous
    /// run attempted with outstanding pull subscriptions.
    #[error("lifecycle error: {0}")]
    LifecycleError(String),

    /// A user-supplied callback returned an error; it aborted the run.
    #[error("callback error: {0}")]
    CallbackError(#[source] BoxError),

    /// The underlying transport failed; the original error is preserved.
    #[error("transport error: {0}")]
    TransportError(#[source] BoxError),
}

impl ApiError {
    pub fn callback(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        ApiError::CallbackError(Arc::new(err))
    }

    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        ApiError::TransportError(Arc::new(err))
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        ApiError::ProtocolError(msg.into())
    }

    pub fn lifecycle(msg: impl Into<String>) -> Self {
        ApiError::LifecycleError(msg.into())
    }

    /// True for the two kinds the stream demultiplexer raises only at clean
    /// stream end (as opposed to mid-stream or transport-level failures).
    pub fn is_end_of_stream_condition(&self) -> bool {
        matches!(
            self,
            ApiError::TableNotReceived { .. } | ApiError::UnexpectedEndOfStream
        )
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
