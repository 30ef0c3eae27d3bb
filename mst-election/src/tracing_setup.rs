use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{ElectionStrategy, LeaderMethod, ProcessId};

/// Installs a global subscriber. Honors `RUST_LOG`, defaulting to `info`.
///
/// Calling this twice is harmless; the second subscriber is discarded.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).try_init()
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).try_init()
    };
    if result.is_err() {
        debug!("tracing subscriber already installed");
    }
}

/// Register a new election process with tracing
pub fn register_process(id: &ProcessId, degree: usize, strategy: &ElectionStrategy) {
    debug!(target: "register_process", process_id = %id, degree = degree, strategy = ?strategy);
}

/// Track protocol transitions such as status or sweep phase changes
pub fn protocol_transition(
    process_id: &ProcessId,
    transition_type: &str,
    from: impl std::fmt::Debug,
    to: impl std::fmt::Debug,
    reason: Option<&str>,
) {
    if let Some(reason) = reason {
        debug!(
            target: "protocol_transition",
            process_id = %process_id,
            transition = transition_type,
            from = ?from,
            to = ?to,
            reason = reason,
        );
    } else {
        debug!(
            target: "protocol_transition",
            process_id = %process_id,
            transition = transition_type,
            from = ?from,
            to = ?to,
        );
    }
}

pub fn message_sent(from: &ProcessId, to: &ProcessId, message_type: &str, message: impl std::fmt::Debug) {
    debug!(
        target: "message_sent",
        from = %from,
        to = %to,
        message_type = message_type,
        message = ?message,
    );
}

/// A message that could not be handled yet went back on its queue
pub fn message_deferred(process_id: &ProcessId, from: &ProcessId, message_type: &str) {
    debug!(
        target: "message_deferred",
        process_id = %process_id,
        from = %from,
        message_type = message_type,
    );
}

/// The core edge saw no outgoing edge on either side: the tree spans everything
pub fn fragment_converged(process_id: &ProcessId, level: u32, fragment: impl std::fmt::Debug, root: &ProcessId) {
    info!(
        target: "fragment_converged",
        process_id = %process_id,
        level = level,
        fragment = ?fragment,
        root = %root,
    );
}

pub fn tree_finalized(process_id: &ProcessId, parent: Option<&ProcessId>, num_children: usize) {
    debug!(
        target: "tree_finalized",
        process_id = %process_id,
        parent = ?parent,
        num_children = num_children,
    );
}

pub fn leader_selected(process_id: &ProcessId, leader: &ProcessId, method: LeaderMethod, score: f64) {
    debug!(
        target: "leader_selected",
        process_id = %process_id,
        leader = %leader,
        method = ?method,
        score = score,
    );
}

/// The root has heard from the whole tree
pub fn coordination_complete(root: &ProcessId, leader: &ProcessId) {
    info!(
        target: "coordination_complete",
        root = %root,
        leader = %leader,
    );
}

/// Track error conditions such as unexpected messages
pub fn protocol_error(process_id: &ProcessId, error_type: &str, details: impl std::fmt::Debug) {
    error!(
        target: "protocol_error",
        process_id = %process_id,
        error_type = error_type,
        details = ?details,
    );
}
