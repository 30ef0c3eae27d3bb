//! Tools for formatting election types for logging and debugging.

use std::fmt::Write;

use crate::message::{Message, Payload};
use crate::shortest_path::DistanceMatrix;
use crate::types::*;

/// Format a ProcessId in a concise way
pub fn format_process_id(id: &ProcessId) -> String {
    format!("p{}", id.0)
}

/// Format a Level in a concise way
pub fn format_level(level: &Level) -> String {
    format!("L{}", level.0)
}

/// Format an edge key as `lo-hi:weight`
pub fn format_edge_key(key: &EdgeKey) -> String {
    format!(
        "{}-{}:{}",
        format_process_id(&key.lo),
        format_process_id(&key.hi),
        key.weight
    )
}

/// Format a BestWeight in a concise way
pub fn format_best(best: &BestWeight) -> String {
    match best {
        BestWeight::Edge(key) => format_edge_key(key),
        BestWeight::Infinite => "inf".to_string(),
    }
}

/// Format a NodeStatus in a concise way
pub fn format_status(status: &NodeStatus) -> String {
    match status {
        NodeStatus::Sleeping => "Sleeping".to_string(),
        NodeStatus::Find => "Find".to_string(),
        NodeStatus::Found => "Found".to_string(),
    }
}

/// Format a message payload
///
/// With `verbose`, distance matrices are printed in full.
pub fn format_payload(payload: &Payload, verbose: bool) -> String {
    match payload {
        Payload::Connect { level } => format!("Connect({})", format_level(level)),
        Payload::Initiate {
            level,
            fragment,
            status,
        } => format!(
            "Initiate({},{},{})",
            format_level(level),
            format_edge_key(fragment),
            format_status(status)
        ),
        Payload::Test { level, fragment } => {
            format!("Test({},{})", format_level(level), format_edge_key(fragment))
        }
        Payload::Accept => "Accept".to_string(),
        Payload::Reject => "Reject".to_string(),
        Payload::Report { best } => format!("Report({})", format_best(best)),
        Payload::ChangeRoot { level } => format!("ChangeRoot({})", format_level(level)),
        Payload::Finish { leader } => format!("Finish({})", format_process_id(leader)),
        Payload::PathPartial(matrix) | Payload::PathFinal(matrix) => {
            let name = if matches!(payload, Payload::PathFinal(_)) {
                "PathFinal"
            } else {
                "PathPartial"
            };
            if verbose {
                format!("{}(\n{})", name, format_matrix(matrix))
            } else {
                format!("{}({} nodes)", name, matrix.nodes().len())
            }
        }
        Payload::AckLeader { leader } => format!("AckLeader({})", format_process_id(leader)),
    }
}

/// Format a message as `sender->receiver Payload`
pub fn format_message(message: &Message, verbose: bool) -> String {
    format!(
        "{}->{} {}",
        format_process_id(&message.sender),
        format_process_id(&message.receiver),
        format_payload(&message.payload, verbose)
    )
}

/// Format a distance matrix as one line per known pair
pub fn format_matrix(matrix: &DistanceMatrix) -> String {
    let mut result = String::new();
    for &from in matrix.nodes() {
        for &to in matrix.nodes() {
            let Some(info) = matrix.get(from, to) else { continue };
            if from == to || !info.is_known() {
                continue;
            }
            let path = info.path.iter().map(format_process_id).collect::<Vec<_>>().join(">");
            let _ = writeln!(
                result,
                "  {} -> {}: {:.3} via {}",
                format_process_id(&from),
                format_process_id(&to),
                info.cost,
                path
            );
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_messages() {
        let message = Message::new(
            ProcessId(1),
            ProcessId(2),
            Payload::Initiate {
                level: Level(1),
                fragment: EdgeKey::new(ProcessId(2), ProcessId(1), 0.5),
                status: NodeStatus::Find,
            },
        );
        assert_eq!(format_message(&message, false), "p1->p2 Initiate(L1,p1-p2:0.5,Find)");
        assert_eq!(format_best(&BestWeight::Infinite), "inf");
    }
}
