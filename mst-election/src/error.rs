//! Error types for the election engine and its harnesses.
//!
//! Protocol contract violations are not here: those are
//! [`InvariantViolation`](crate::InvariantViolation)s and are fatal.

use std::time::Duration;

use thiserror::Error;

use crate::types::ProcessId;

/// Problems with an edge-cost table.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("a network needs at least two processes, got {0}")]
    TooFewProcesses(usize),

    #[error("process {0} is listed more than once")]
    DuplicateProcess(ProcessId),

    #[error("edge {a}-{b} refers to a process that is not in the table")]
    UnknownEndpoint { a: ProcessId, b: ProcessId },

    #[error("edge {0}-{0} is a self-loop")]
    SelfLoop(ProcessId),

    #[error("edge {a}-{b} has weight {weight}; weights must be finite and non-negative")]
    InvalidWeight { a: ProcessId, b: ProcessId, weight: f64 },

    #[error("edge {a}-{b} has two different weights ({first} and {second})")]
    AsymmetricWeight {
        a: ProcessId,
        b: ProcessId,
        first: f64,
        second: f64,
    },

    #[error("the graph is not connected: {unreachable:?} cannot be reached from {from}")]
    Disconnected {
        from: ProcessId,
        unreachable: Vec<ProcessId>,
    },
}

/// Problems loading configuration or graph files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures of a simulation run (the transport, not the protocol).
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("message addressed to unknown process {0}")]
    UnknownProcess(ProcessId),

    #[error("{sender} tried to send to {receiver}, which is not a neighbor")]
    NotANeighbor {
        sender: ProcessId,
        receiver: ProcessId,
    },

    #[error("no quiescence after {steps} steps ({pending} messages still queued)")]
    StepLimit { steps: usize, pending: usize },

    #[error("actors did not go quiet within {0:?}")]
    Timeout(Duration),

    #[error("actor for {0} stopped unexpectedly")]
    ActorFailed(ProcessId),
}

/// Merging two distance matrices built over different node sets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatrixError {
    #[error("distance matrices cover different processes ({ours} vs {theirs} nodes)")]
    NodeSetMismatch { ours: usize, theirs: usize },
}
