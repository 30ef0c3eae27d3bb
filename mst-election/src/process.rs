use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::graph::EdgeCosts;
use crate::shortest_path::SweepState;
use crate::*;

/// ElectionProcess is a single node of the network.
///
/// It owns all of its protocol state and changes it only while handling one
/// of its own messages. Everything it knows about other processes arrived in
/// a message payload; the cost table is the only shared input and is never
/// written.
#[derive(Clone)]
pub struct ElectionProcess {
    pub id: ProcessId,

    /// Shared, read-only edge weights
    pub costs: Arc<dyn EdgeCosts>,

    pub strategy: ElectionStrategy,

    // === Fragment state ===
    /// Fragment round, never decreases
    pub level: Level,

    /// Core edge of the fragment this process belongs to; unset until the
    /// first Initiate arrives
    pub fragment: Option<FragmentId>,

    pub status: NodeStatus,

    /// Classification of every incident edge
    pub edges: BTreeMap<ProcessId, EdgeState>,

    /// The BASIC edge currently being probed
    pub test_edge: Option<ProcessId>,

    /// Lightest outgoing edge found by this process or reported by its subtree
    pub best_weight: BestWeight,

    /// Neighbor in the direction of `best_weight`
    pub best_edge: Option<ProcessId>,

    /// Reports still expected from the subtree before this process can report
    pub find_count: u32,

    /// Parent for reporting, and after finalization for tree routing
    pub in_branch: Option<ProcessId>,

    // === Finalization ===
    /// Winner of the core-edge tie-break (the root of the final tree)
    pub tree_root: Option<ProcessId>,

    /// Set once, when Finish is handled
    pub tree: Option<TreePosition>,

    /// The elected leader under `strategy`
    pub leader: Option<ProcessId>,

    /// True for the single process that originated Finish
    pub originated_finish: bool,

    pub acks: AckState,

    /// Root only: every process has acknowledged the leader
    pub coordination_complete: bool,

    // === Shortest-path augmentation ===
    pub sweep: Option<SweepState>,

    /// Highest level observed by the invariant checker
    pub(crate) peak_level: Level,
}

impl ElectionProcess {
    pub fn new(id: ProcessId, costs: Arc<dyn EdgeCosts>, strategy: ElectionStrategy) -> Self {
        let edges = costs
            .neighbors(id)
            .into_iter()
            .map(|(neighbor, _)| (neighbor, EdgeState::Basic))
            .collect::<BTreeMap<_, _>>();

        crate::tracing_setup::register_process(&id, edges.len(), &strategy);

        ElectionProcess {
            id,
            costs,
            strategy,
            level: Level(0),
            fragment: None,
            status: NodeStatus::Sleeping,
            edges,
            test_edge: None,
            best_weight: BestWeight::Infinite,
            best_edge: None,
            find_count: 0,
            in_branch: None,
            tree_root: None,
            tree: None,
            leader: None,
            originated_finish: false,
            acks: AckState::default(),
            coordination_complete: false,
            sweep: None,
            peak_level: Level(0),
        }
    }

    pub fn edge_state(&self, neighbor: ProcessId) -> Option<EdgeState> {
        self.edges.get(&neighbor).copied()
    }

    /// Moves an edge to `next`. Edges never return to BASIC.
    pub(crate) fn set_edge_state(&mut self, neighbor: ProcessId, next: EdgeState) {
        if let Some(state) = self.edges.get_mut(&neighbor) {
            assert!(
                state.can_become(next),
                "{}: edge to {} cannot go from {:?} to {:?}",
                self.id,
                neighbor,
                state,
                next
            );
            *state = next;
        }
    }

    /// Key of the edge to `neighbor`
    pub(crate) fn edge_key(&self, neighbor: ProcessId) -> Option<EdgeKey> {
        self.costs.edge_key(self.id, neighbor)
    }

    pub fn branch_neighbors(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.edges
            .iter()
            .filter(|(_, state)| **state == EdgeState::Branch)
            .map(|(neighbor, _)| *neighbor)
    }

    pub fn is_finalized(&self) -> bool {
        self.tree.is_some()
    }

    pub fn is_root(&self) -> bool {
        self.tree.as_ref().is_some_and(TreePosition::is_root)
    }

    pub fn num_children(&self) -> Option<usize> {
        self.tree.as_ref().map(TreePosition::num_children)
    }

    pub fn num_branch(&self) -> Option<usize> {
        self.tree.as_ref().map(TreePosition::num_branch)
    }

    /// Tree neighbors to forward a broadcast to, skipping the one it came from
    pub fn broadcast_targets(&self, arrived_from: Option<ProcessId>) -> Vec<ProcessId> {
        self.tree
            .iter()
            .flat_map(|tree| tree.branches())
            .filter(|next| Some(*next) != arrived_from)
            .collect()
    }

    /// Next hop for point-to-point traffic towards the leader.
    ///
    /// With shortest paths known this is `path[1]` of the (self, leader)
    /// entry; otherwise the tree parent.
    pub fn next_hop_to_leader(&self) -> Option<ProcessId> {
        let leader = self.leader?;
        if leader == self.id {
            return None;
        }
        match &self.sweep {
            Some(sweep) if sweep.is_final() => sweep.matrix.next_hop(self.id, leader),
            _ => self.tree.as_ref().and_then(|tree| tree.parent),
        }
    }
}

impl fmt::Debug for ElectionProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElectionProcess")
            .field("id", &self.id)
            .field("level", &self.level)
            .field("fragment", &self.fragment)
            .field("status", &self.status)
            .field("edges", &self.edges)
            .field("in_branch", &self.in_branch)
            .field("tree", &self.tree)
            .field("leader", &self.leader)
            .finish_non_exhaustive()
    }
}
