//! The error taxonomy shared by the connector, node, and pipeline layers.
//!
//! Every fallible operation in this crate returns one of these variants
//! directly rather than a boxed `dyn Error` — callers branch on the kind
//! (`matches!(err, Error::Timeout { .. })`) instead of sniffing a message.

use crate::ids::{ConnectorId, NodeId};

/// The single error type returned by every fallible operation in this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A constructor or setter received an out-of-range argument:
    /// a non-positive `num_processes`, a negative `maxsize`, a
    /// non-positive `refresh_interval`.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `put` on an output with no partners, `disconnect` of a pair that
    /// was never connected, or `iter_get` on an input with no parent node.
    #[error("missing connection: {0}")]
    MissingConnection(String),

    /// A connect attempt paired two connectors of the same kind.
    ///
    /// The typed `OutputConnector::connect`/`InputConnector` API makes this
    /// unreachable at compile time; the variant is kept for the taxonomy
    /// and for any future type-erased connection helper.
    #[error("type mismatch: cannot connect two {0} connectors")]
    TypeMismatch(&'static str),

    /// A node has no connectors at all, or has an input/output with no
    /// partner.
    #[error("node {node} failed validation: {reason}")]
    NodeValidation { node: NodeId, reason: String },

    /// The pipeline graph is cyclic or is not a single connected component.
    #[error("pipeline validation failed: {0}")]
    PipelineValidation(String),

    /// An operation was attempted against a worker pool or pipeline in the
    /// wrong lifecycle state: resizing a started pool, resetting a pool
    /// that never ran or is still running, joining/killing a pool that was
    /// never started, starting a pool twice.
    #[error("invalid state for this operation: {0}")]
    RuntimeState(String),

    /// `get` exceeded its time budget while the input was still expecting
    /// data from upstream.
    #[error("get on connector {connector} timed out after {waited_ms}ms")]
    Timeout { connector: ConnectorId, waited_ms: u64 },

    /// `get` found its queue empty with no upstream still expected to
    /// produce.
    #[error("connector {connector} is empty and upstream has finished")]
    Empty { connector: ConnectorId },

    /// A worker panicked; the payload is not `Send`-safe to carry directly,
    /// so it is rendered to a string at the thread boundary.
    #[error("worker for node {node} panicked: {message}")]
    WorkerPanicked { node: NodeId, message: String },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
