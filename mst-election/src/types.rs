use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

/// Identity of a process in the network
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub u64);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Fragment round number. Starts at 0 and never decreases.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Level(pub u32);

impl Level {
    pub fn incr(&self) -> Level {
        Level(self.0 + 1)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Not yet participating
    Sleeping,
    /// Searching for the fragment's minimum outgoing edge
    Find,
    /// Search complete for this round
    Found,
}

/// Classification of an incident edge, as seen from one endpoint.
///
/// The same edge is not always in the same state at both endpoints while
/// the merge protocol runs.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeState {
    Basic,
    Branch,
    Rejected,
}

impl EdgeState {
    /// BASIC may move to BRANCH or REJECTED; nothing moves back to BASIC.
    pub fn can_become(self, next: EdgeState) -> bool {
        self == next || self == EdgeState::Basic
    }
}

/// Totally ordered edge weight.
///
/// The merge protocol needs distinct weights: two fragments whose core edges
/// share a weight would otherwise mistake each other for the same fragment.
/// Ties on `weight` are broken by the endpoint ids.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EdgeKey {
    pub weight: f64,
    pub lo: ProcessId,
    pub hi: ProcessId,
}

impl EdgeKey {
    pub fn new(a: ProcessId, b: ProcessId, weight: f64) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        EdgeKey { weight, lo, hi }
    }

    /// The endpoint that is not `me`
    pub fn other(&self, me: ProcessId) -> ProcessId {
        if self.lo == me { self.hi } else { self.lo }
    }
}

impl PartialEq for EdgeKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EdgeKey {}

impl PartialOrd for EdgeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.weight
            .total_cmp(&other.weight)
            .then_with(|| self.lo.cmp(&other.lo))
            .then_with(|| self.hi.cmp(&other.hi))
    }
}

/// A fragment is named after its core edge.
pub type FragmentId = EdgeKey;

/// Best outgoing edge weight known to a process and its subtree.
///
/// `Infinite` sorts after every finite edge, so folding reports is a plain `min`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BestWeight {
    Edge(EdgeKey),
    Infinite,
}

impl BestWeight {
    pub fn is_infinite(&self) -> bool {
        matches!(self, BestWeight::Infinite)
    }
}

/// Aggregate used to pick a leader from the all-pairs distance matrix
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderMethod {
    /// Smallest sum of distances to every other process
    #[default]
    Sum,
    /// Smallest maximum distance to any other process
    Max,
}

/// How the leader is chosen once the spanning tree is final.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElectionStrategy {
    /// Whoever wins the tie-break on the last core edge leads
    #[default]
    Structural,
    /// Assemble all-pairs shortest paths over the tree, then pick by `method`
    ShortestPath { method: LeaderMethod },
}

/// Position of a process in the finalized tree.
///
/// Fixed once, when the process handles Finish.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TreePosition {
    /// `None` for the root
    pub parent: Option<ProcessId>,
    pub children: Vec<ProcessId>,
}

impl TreePosition {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    /// Children plus the parent edge, if any
    pub fn num_branch(&self) -> usize {
        self.children.len() + usize::from(self.parent.is_some())
    }

    /// Every tree neighbor, parent first
    pub fn branches(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.parent.iter().copied().chain(self.children.iter().copied())
    }
}

/// Leader acknowledgement bookkeeping for the finalization handshake
#[derive(Clone, Default, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct AckState {
    /// This process knows the leader and has counted itself
    pub self_acked: bool,
    pub child_acks: usize,
    /// AckLeader sent to the parent (or, for the root, coordination declared complete)
    pub done: bool,
}
