use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::shortest_path::DistanceMatrix;
use crate::types::{BestWeight, FragmentId, Level, NodeStatus, ProcessId};

/// Wire type of a message, used for logging and traffic accounting
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Connect,
    Initiate,
    Test,
    Accept,
    Reject,
    Report,
    ChangeRoot,
    Finish,
    PathPartial,
    PathFinal,
    AckLeader,
}

/// The protocol phase a message belongs to
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Fragment merging (GHS)
    Merge,
    /// Finish flood and acknowledgements
    Finalize,
    /// Distance matrix sweep
    ShortestPath,
}

impl MessageKind {
    pub fn phase(&self) -> Phase {
        match self {
            MessageKind::Connect
            | MessageKind::Initiate
            | MessageKind::Test
            | MessageKind::Accept
            | MessageKind::Reject
            | MessageKind::Report
            | MessageKind::ChangeRoot => Phase::Merge,
            MessageKind::Finish | MessageKind::AckLeader => Phase::Finalize,
            MessageKind::PathPartial | MessageKind::PathFinal => Phase::ShortestPath,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Connect => "CONNECT",
            MessageKind::Initiate => "INITIATE",
            MessageKind::Test => "TEST",
            MessageKind::Accept => "ACCEPT",
            MessageKind::Reject => "REJECT",
            MessageKind::Report => "REPORT",
            MessageKind::ChangeRoot => "CHANGEROOT",
            MessageKind::Finish => "FINISH",
            MessageKind::PathPartial => "PATH_PARTIAL",
            MessageKind::PathFinal => "PATH_FINAL",
            MessageKind::AckLeader => "ACK_LEADER",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message contents, one variant per wire type
#[derive(Clone, PartialEq, Debug)]
pub enum Payload {
    Connect {
        level: Level,
    },
    Initiate {
        level: Level,
        fragment: FragmentId,
        status: NodeStatus,
    },
    Test {
        level: Level,
        fragment: FragmentId,
    },
    Accept,
    Reject,
    Report {
        best: BestWeight,
    },
    ChangeRoot {
        level: Level,
    },
    Finish {
        leader: ProcessId,
    },
    PathPartial(Arc<DistanceMatrix>),
    PathFinal(Arc<DistanceMatrix>),
    AckLeader {
        leader: ProcessId,
    },
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::Connect { .. } => MessageKind::Connect,
            Payload::Initiate { .. } => MessageKind::Initiate,
            Payload::Test { .. } => MessageKind::Test,
            Payload::Accept => MessageKind::Accept,
            Payload::Reject => MessageKind::Reject,
            Payload::Report { .. } => MessageKind::Report,
            Payload::ChangeRoot { .. } => MessageKind::ChangeRoot,
            Payload::Finish { .. } => MessageKind::Finish,
            Payload::PathPartial(_) => MessageKind::PathPartial,
            Payload::PathFinal(_) => MessageKind::PathFinal,
            Payload::AckLeader { .. } => MessageKind::AckLeader,
        }
    }
}

/// An immutable point-to-point envelope.
#[derive(Clone, PartialEq, Debug)]
pub struct Message {
    pub sender: ProcessId,
    pub receiver: ProcessId,
    pub payload: Payload,
}

impl Message {
    pub fn new(sender: ProcessId, receiver: ProcessId, payload: Payload) -> Self {
        Message {
            sender,
            receiver,
            payload,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }
}

/// What the dispatcher must do with a message after handing it to a process
#[derive(Debug)]
pub enum Delivery {
    /// The message was consumed
    Handled,
    /// The process cannot interpret the message yet; append it to the tail
    /// of the same process's queue
    Deferred(Message),
    /// Unexpected in the current state; it was logged and dropped
    Ignored,
}

impl Delivery {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Delivery::Deferred(_))
    }
}
