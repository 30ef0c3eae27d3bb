//! # MST-Based Leader Election
//!
//! This crate elects a leader in a network of asynchronous processes joined
//! by weighted links. The processes first build a minimum spanning tree with
//! the Gallager–Humblet–Spira (GHS) merge protocol, then use the finished
//! tree to agree on a leader.
//!
//! ## Protocol Overview
//!
//! Every process starts asleep, as a fragment of one. Fragments repeatedly
//! find their minimum-weight outgoing edge and join across it:
//! - **Equal levels** that pick the same edge merge into a fragment one level up,
//!   named after that edge (the *core*)
//! - **A lower level** is absorbed into the higher-level fragment
//!
//! When both ends of the core find no outgoing edge the tree spans the
//! network. The lower-id core endpoint becomes the root and floods `Finish`
//! down the tree, fixing every process's parent and children. Processes then
//! acknowledge the leader back up the tree until the root has heard from
//! everyone.
//!
//! Two strategies decide the leader:
//! - **Structural**: the root leads
//! - **Shortest path**: distance matrices flow inward from the leaves until
//!   one process has heard from all sides, the merged all-pairs matrix flows
//!   back out, and every process picks the node with the smallest sum (or
//!   maximum) of distances
//!
//! ## Implementation Structure
//!
//! Core Protocol Modules:
//! - `types.rs`: Identifiers, levels, edge states and tree positions
//! - `message.rs`: Wire messages and delivery outcomes
//! - `process.rs`: Core ElectionProcess struct definition
//! - `message_handling.rs`: Protocol message dispatch
//! - `fragment.rs`: Fragment merging (wakeup, connect, test, report, change-root)
//! - `finalization.rs`: Finish flood and the leader acknowledgement handshake
//! - `shortest_path.rs`: Distance matrices and the shortest-path sweep
//!
//! Supporting Modules:
//! - `graph.rs`: The read-only edge-cost table
//! - `network.rs`: Deterministic in-memory network and run reports
//! - `actor.rs`: Tokio runtime with one task per process
//! - `config.rs`: Run configuration
//! - `invariants.rs`: Invariant checking for protocol safety
//! - `reference.rs`: Centralized MST and shortest-path algorithms for checking runs
//! - `format.rs`: String formatting for protocol structures
//! - `tracing_setup.rs`: Structured logging with tracing-rs

// Core protocol modules
mod finalization;
mod fragment;
mod invariants;
mod message;
mod message_handling;
mod process;
mod types;

// Public modules
pub mod actor;
pub mod config;
pub mod error;
pub mod format;
pub mod graph;
pub mod network;
pub mod reference;
pub mod shortest_path;
pub mod tracing_setup;

// Public re-exports
pub use config::{ElectionConfig, Schedule, WakePolicy};
pub use error::{ConfigError, GraphError, MatrixError, SimulationError};
pub use graph::{CostTable, EdgeCosts};
pub use invariants::{check_network, InvariantViolation};
pub use message::*;
pub use network::{Network, ProcessSummary, RunReport, TrafficStats};
pub use process::*;
pub use shortest_path::{DistanceMatrix, PathInfo};
pub use types::*;
