//! All-pairs shortest paths assembled over the finalized tree.
//!
//! Every process seeds a [`DistanceMatrix`] from its own incident edges. The
//! matrices then travel inward from the leaves as `PathPartial` messages until
//! some process has heard from every tree neighbor; that process holds the
//! merged result and floods it back out as `PathFinal`. Each process then
//! picks the leader from the final matrix by the configured [`LeaderMethod`].

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::MatrixError;
use crate::graph::EdgeCosts;
use crate::*;

/// Relative tolerance under which two leader scores count as equal
pub const LEADER_TOLERANCE: f64 = 1e-9;

/// Best known route between two processes
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct PathInfo {
    pub cost: f64,
    /// Every hop including both endpoints; empty while unknown
    pub path: Vec<ProcessId>,
}

impl PathInfo {
    fn unknown() -> Self {
        PathInfo {
            cost: f64::INFINITY,
            path: Vec::new(),
        }
    }

    pub fn is_known(&self) -> bool {
        self.cost.is_finite()
    }
}

/// Dense matrix of [`PathInfo`] over a fixed, sorted set of processes.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct DistanceMatrix {
    nodes: Vec<ProcessId>,
    cells: Vec<PathInfo>,
}

impl DistanceMatrix {
    /// The view of `owner`, which knows only its own incident edges.
    ///
    /// Pairs `(u, v)` that both neighbor `owner` are reachable through it.
    pub fn seed(owner: ProcessId, costs: &dyn EdgeCosts) -> Self {
        let nodes = costs.processes().to_vec();
        let mut cells = Vec::with_capacity(nodes.len() * nodes.len());
        for &u in &nodes {
            for &v in &nodes {
                let info = if u == v {
                    PathInfo {
                        cost: 0.0,
                        path: vec![u],
                    }
                } else if u == owner || v == owner {
                    match costs.cost(u, v) {
                        Some(cost) => PathInfo {
                            cost,
                            path: vec![u, v],
                        },
                        None => PathInfo::unknown(),
                    }
                } else {
                    match (costs.cost(u, owner), costs.cost(owner, v)) {
                        (Some(a), Some(b)) => PathInfo {
                            cost: a + b,
                            path: vec![u, owner, v],
                        },
                        _ => PathInfo::unknown(),
                    }
                };
                cells.push(info);
            }
        }
        DistanceMatrix { nodes, cells }
    }

    pub fn nodes(&self) -> &[ProcessId] {
        &self.nodes
    }

    fn index(&self, id: ProcessId) -> Option<usize> {
        self.nodes.binary_search(&id).ok()
    }

    pub fn get(&self, u: ProcessId, v: ProcessId) -> Option<&PathInfo> {
        let n = self.nodes.len();
        let (i, j) = (self.index(u)?, self.index(v)?);
        self.cells.get(i * n + j)
    }

    /// Cost of the best known route, infinite if none
    pub fn cost(&self, u: ProcessId, v: ProcessId) -> f64 {
        self.get(u, v).map_or(f64::INFINITY, |info| info.cost)
    }

    /// Whether every pair has a finite route
    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(PathInfo::is_known)
    }

    /// Merges `other` into this matrix and relaxes every pair through every
    /// intermediate process. Returns the number of cells that improved.
    pub fn augment(&mut self, other: &DistanceMatrix) -> Result<usize, MatrixError> {
        if self.nodes != other.nodes {
            return Err(MatrixError::NodeSetMismatch {
                ours: self.nodes.len(),
                theirs: other.nodes.len(),
            });
        }

        let mut improved = 0;
        for (ours, theirs) in self.cells.iter_mut().zip(&other.cells) {
            if theirs.cost < ours.cost {
                *ours = theirs.clone();
                improved += 1;
            }
        }

        let n = self.nodes.len();
        for k in 0..n {
            for i in 0..n {
                let through = self.cells[i * n + k].cost;
                if !through.is_finite() || i == k {
                    continue;
                }
                for j in 0..n {
                    if j == k || i == j {
                        continue;
                    }
                    let candidate = through + self.cells[k * n + j].cost;
                    if candidate < self.cells[i * n + j].cost {
                        let mut path = self.cells[i * n + k].path.clone();
                        path.extend_from_slice(&self.cells[k * n + j].path[1..]);
                        self.cells[i * n + j] = PathInfo {
                            cost: candidate,
                            path,
                        };
                        improved += 1;
                    }
                }
            }
        }
        Ok(improved)
    }

    /// Sum or maximum of the distances from `u` to every other process
    pub fn aggregate(&self, u: ProcessId, method: LeaderMethod) -> f64 {
        let others = self.nodes.iter().filter(|v| **v != u).map(|v| self.cost(u, *v));
        match method {
            LeaderMethod::Sum => others.sum(),
            LeaderMethod::Max => others.fold(0.0, f64::max),
        }
    }

    /// The process with the smallest aggregate. Scores within
    /// [`LEADER_TOLERANCE`] of each other go to the lower id.
    pub fn select_leader(&self, method: LeaderMethod) -> Option<ProcessId> {
        let mut best: Option<(ProcessId, f64)> = None;
        for &u in &self.nodes {
            let score = self.aggregate(u, method);
            match best {
                None => best = Some((u, score)),
                Some((_, best_score)) => {
                    let margin = LEADER_TOLERANCE * best_score.abs().max(1.0);
                    if score < best_score - margin {
                        best = Some((u, score));
                    }
                }
            }
        }
        best.map(|(id, _)| id)
    }

    /// Second hop on the best route from `from` to `to`
    pub fn next_hop(&self, from: ProcessId, to: ProcessId) -> Option<ProcessId> {
        self.get(from, to).and_then(|info| info.path.get(1)).copied()
    }
}

/// Where a process is in the sweep
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepPhase {
    /// Waiting for partial matrices from tree neighbors
    Receiving,
    /// Our merged partial went to the one neighbor we had not heard from
    Sent { to: ProcessId },
    /// Holding the final matrix
    Final,
}

#[derive(Clone, Debug)]
pub struct SweepState {
    pub phase: SweepPhase,
    pub matrix: DistanceMatrix,
    /// Tree neighbors whose partial has been merged
    pub heard: BTreeSet<ProcessId>,
}

impl SweepState {
    pub fn is_final(&self) -> bool {
        self.phase == SweepPhase::Final
    }
}

impl ElectionProcess {
    fn leader_method(&self) -> Option<LeaderMethod> {
        match self.strategy {
            ElectionStrategy::ShortestPath { method } => Some(method),
            ElectionStrategy::Structural => None,
        }
    }

    /// Seeds the local matrix once the tree position is known. A process
    /// with a single tree neighbor sends straight away.
    pub(crate) fn start_sweep(&mut self, to_send: &mut Vec<Message>) {
        let matrix = DistanceMatrix::seed(self.id, self.costs.as_ref());
        self.sweep = Some(SweepState {
            phase: SweepPhase::Receiving,
            matrix,
            heard: BTreeSet::new(),
        });
        self.maybe_send_partial(to_send);
    }

    /// Sends our partial matrix once exactly one tree neighbor is unheard
    fn maybe_send_partial(&mut self, to_send: &mut Vec<Message>) {
        let Some(tree) = &self.tree else { return };
        let Some(sweep) = &self.sweep else { return };
        if sweep.phase != SweepPhase::Receiving {
            return;
        }

        let mut unheard = tree.branches().filter(|n| !sweep.heard.contains(n));
        let (Some(to), None) = (unheard.next(), unheard.next()) else {
            return;
        };

        let matrix = Arc::new(sweep.matrix.clone());
        if let Some(sweep) = self.sweep.as_mut() {
            sweep.phase = SweepPhase::Sent { to };
        }
        crate::tracing_setup::protocol_transition(
            &self.id,
            "sweep",
            SweepPhase::Receiving,
            SweepPhase::Sent { to },
            None,
        );
        self.send(to, Payload::PathPartial(matrix), to_send);
    }

    pub(crate) fn process_path_partial(
        &mut self,
        sender: ProcessId,
        matrix: &DistanceMatrix,
        message: &Message,
        to_send: &mut Vec<Message>,
    ) -> Delivery {
        if self.leader_method().is_none() {
            crate::tracing_setup::protocol_error(&self.id, "path_message_in_structural_mode", message);
            return Delivery::Ignored;
        }
        let Some(num_branch) = self.num_branch() else {
            return Delivery::Deferred(message.clone());
        };
        let is_branch = self
            .tree
            .as_ref()
            .is_some_and(|tree| tree.branches().any(|n| n == sender));
        let Some(sweep) = self.sweep.as_mut() else {
            return Delivery::Deferred(message.clone());
        };
        if !is_branch || sweep.is_final() || sweep.heard.contains(&sender) {
            crate::tracing_setup::protocol_error(&self.id, "unexpected_path_partial", message);
            return Delivery::Ignored;
        }

        if let Err(error) = sweep.matrix.augment(matrix) {
            crate::tracing_setup::protocol_error(&self.id, "matrix_mismatch", error);
            return Delivery::Ignored;
        }
        sweep.heard.insert(sender);

        if sweep.heard.len() == num_branch {
            self.saturate(sender, to_send);
        } else {
            self.maybe_send_partial(to_send);
        }
        Delivery::Handled
    }

    /// Every tree neighbor has been merged in: the matrix is exact. Flood it
    /// to everyone except `last`, who saturated at the same time.
    fn saturate(&mut self, last: ProcessId, to_send: &mut Vec<Message>) {
        let Some(sweep) = self.sweep.as_mut() else { return };
        let from = sweep.phase;
        sweep.phase = SweepPhase::Final;
        let matrix = Arc::new(sweep.matrix.clone());
        crate::tracing_setup::protocol_transition(&self.id, "sweep", from, SweepPhase::Final, Some("saturated"));

        for next in self.broadcast_targets(Some(last)) {
            self.send(next, Payload::PathFinal(matrix.clone()), to_send);
        }
        self.finish_sweep(to_send);
    }

    pub(crate) fn process_path_final(
        &mut self,
        sender: ProcessId,
        matrix: &Arc<DistanceMatrix>,
        message: &Message,
        to_send: &mut Vec<Message>,
    ) -> Delivery {
        if self.leader_method().is_none() {
            crate::tracing_setup::protocol_error(&self.id, "path_message_in_structural_mode", message);
            return Delivery::Ignored;
        }
        let Some(sweep) = self.sweep.as_mut() else {
            return Delivery::Deferred(message.clone());
        };
        if sweep.is_final() {
            crate::tracing_setup::protocol_error(&self.id, "duplicate_path_final", message);
            return Delivery::Ignored;
        }

        let from = sweep.phase;
        sweep.matrix = matrix.as_ref().clone();
        sweep.phase = SweepPhase::Final;
        crate::tracing_setup::protocol_transition(&self.id, "sweep", from, SweepPhase::Final, Some("path_final"));

        for next in self.broadcast_targets(Some(sender)) {
            self.send(next, Payload::PathFinal(matrix.clone()), to_send);
        }
        self.finish_sweep(to_send);
        Delivery::Handled
    }

    fn finish_sweep(&mut self, to_send: &mut Vec<Message>) {
        let Some(method) = self.leader_method() else { return };
        let Some(sweep) = &self.sweep else { return };
        match sweep.matrix.select_leader(method) {
            Some(leader) => {
                crate::tracing_setup::leader_selected(&self.id, &leader, method, sweep.matrix.aggregate(leader, method));
                self.acknowledge_leader(leader, to_send);
            }
            None => crate::tracing_setup::protocol_error(&self.id, "empty_distance_matrix", &sweep.matrix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::CostTable;

    fn p(id: u64) -> ProcessId {
        ProcessId(id)
    }

    /// 1 - 2 - 3 - 4 line with weights 1, 2, 3 plus a heavy 1-4 shortcut
    fn line() -> CostTable {
        CostTable::from_edges(
            [p(1), p(2), p(3), p(4)],
            [(p(1), p(2), 1.0), (p(2), p(3), 2.0), (p(3), p(4), 3.0), (p(1), p(4), 10.0)],
        )
        .unwrap()
    }

    #[test]
    fn seed_uses_own_edges_only() {
        let table = line();
        let m = DistanceMatrix::seed(p(2), &table);
        assert_eq!(m.cost(p(2), p(2)), 0.0);
        assert_eq!(m.get(p(2), p(1)).unwrap().path, vec![p(2), p(1)]);
        assert_eq!(m.cost(p(1), p(3)), 3.0);
        assert_eq!(m.get(p(1), p(3)).unwrap().path, vec![p(1), p(2), p(3)]);
        // 1-4 is not incident to 2
        assert!(!m.get(p(1), p(4)).unwrap().is_known());
        assert!(!m.is_complete());
    }

    #[test]
    fn augment_relaxes_to_exact_distances() {
        let table = line();
        let mut m = DistanceMatrix::seed(p(1), &table);
        for owner in [p(2), p(3), p(4)] {
            m.augment(&DistanceMatrix::seed(owner, &table)).unwrap();
        }
        assert!(m.is_complete());
        assert_eq!(m.cost(p(1), p(4)), 6.0);
        assert_eq!(m.get(p(1), p(4)).unwrap().path, vec![p(1), p(2), p(3), p(4)]);
        assert_eq!(m.get(p(4), p(1)).unwrap().path, vec![p(4), p(3), p(2), p(1)]);
        assert_eq!(m.next_hop(p(4), p(1)), Some(p(3)));
    }

    #[test]
    fn augment_rejects_other_node_sets() {
        let table = line();
        let other = CostTable::from_edges([p(1), p(2)], [(p(1), p(2), 1.0)]).unwrap();
        let mut m = DistanceMatrix::seed(p(1), &table);
        assert_eq!(
            m.augment(&DistanceMatrix::seed(p(1), &other)),
            Err(MatrixError::NodeSetMismatch { ours: 4, theirs: 2 })
        );
    }

    #[test]
    fn leader_by_sum_and_max() {
        let table = line();
        let mut m = DistanceMatrix::seed(p(1), &table);
        for owner in [p(2), p(3), p(4)] {
            m.augment(&DistanceMatrix::seed(owner, &table)).unwrap();
        }
        // Sums: p1 = 1+3+6 = 10, p2 = 1+2+5 = 8, p3 = 3+2+3 = 8, p4 = 6+5+3 = 14
        assert_eq!(m.aggregate(p(2), LeaderMethod::Sum), 8.0);
        assert_eq!(m.select_leader(LeaderMethod::Sum), Some(p(2)));
        // Maxes: p1 = 6, p2 = 5, p3 = 3, p4 = 6
        assert_eq!(m.select_leader(LeaderMethod::Max), Some(p(3)));
    }

    #[test]
    fn near_ties_go_to_the_lower_id() {
        let table = CostTable::from_edges([p(5), p(9)], [(p(5), p(9), 0.1 + 0.2)]).unwrap();
        let m = DistanceMatrix::seed(p(9), &table);
        assert_eq!(m.select_leader(LeaderMethod::Sum), Some(p(5)));
        assert_eq!(m.select_leader(LeaderMethod::Max), Some(p(5)));
    }
}
