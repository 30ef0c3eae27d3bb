use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use crate::format::{format_best, format_process_id};
use crate::*;

/// Represents a violation of an internal state invariant
///
/// This has a nice-ish `Display` impl.
#[derive(Debug, Clone, PartialEq)]
pub enum InvariantViolation {
    // Per-process state
    SleepingWithState {
        process: ProcessId,
    },
    LevelDecreased {
        process: ProcessId,
        peak: Level,
        level: Level,
    },
    BestEdgeNotNeighbor {
        process: ProcessId,
        best_edge: ProcessId,
    },
    BestEdgeWithoutWeight {
        process: ProcessId,
        best: BestWeight,
    },
    InBranchNotNeighbor {
        process: ProcessId,
        in_branch: ProcessId,
    },
    TreeBranchMismatch {
        process: ProcessId,
        tree_branches: usize,
        branch_edges: usize,
    },
    ParentEdgeNotBranch {
        process: ProcessId,
        parent: ProcessId,
    },
    LeaderBeforeTree {
        process: ProcessId,
    },
    TooManyAcks {
        process: ProcessId,
        acks: usize,
        children: usize,
    },
    MalformedPath {
        process: ProcessId,
        from: ProcessId,
        to: ProcessId,
    },

    // Whole network, after quiescence
    NotFinalized(ProcessId),
    FinishOriginators(Vec<ProcessId>),
    LeadersDisagree(BTreeMap<ProcessId, Option<ProcessId>>),
    AsymmetricBranch {
        a: ProcessId,
        b: ProcessId,
    },
    WrongEdgeCount {
        expected: usize,
        actual: usize,
    },
    TreeNotSpanning {
        unreached: Vec<ProcessId>,
    },
    ChildCountMismatch {
        expected: usize,
        actual: usize,
    },
    CoordinationIncomplete(ProcessId),
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SleepingWithState { process } => write!(
                f,
                "{} is sleeping but has a level, fragment or BRANCH edge",
                format_process_id(process)
            ),

            Self::LevelDecreased { process, peak, level } => write!(
                f,
                "{} dropped from level {} to {}",
                format_process_id(process),
                peak.0,
                level.0
            ),

            Self::BestEdgeNotNeighbor { process, best_edge } => write!(
                f,
                "{} has best edge towards {}, which is not a neighbor",
                format_process_id(process),
                format_process_id(best_edge)
            ),

            Self::BestEdgeWithoutWeight { process, best } => write!(
                f,
                "{} has a best edge but best weight {}",
                format_process_id(process),
                format_best(best)
            ),

            Self::InBranchNotNeighbor { process, in_branch } => write!(
                f,
                "{} reports to {}, which is not a neighbor",
                format_process_id(process),
                format_process_id(in_branch)
            ),

            Self::TreeBranchMismatch {
                process,
                tree_branches,
                branch_edges,
            } => write!(
                f,
                "{} has {} tree neighbors but {} BRANCH edges",
                format_process_id(process),
                tree_branches,
                branch_edges
            ),

            Self::ParentEdgeNotBranch { process, parent } => write!(
                f,
                "{} has parent {} over a non-BRANCH edge",
                format_process_id(process),
                format_process_id(parent)
            ),

            Self::LeaderBeforeTree { process } => write!(
                f,
                "{} knows a leader before its tree position",
                format_process_id(process)
            ),

            Self::TooManyAcks {
                process,
                acks,
                children,
            } => write!(
                f,
                "{} counted {} acknowledgements from {} children",
                format_process_id(process),
                acks,
                children
            ),

            Self::MalformedPath { process, from, to } => write!(
                f,
                "{} holds a path for ({}, {}) with the wrong endpoints",
                format_process_id(process),
                format_process_id(from),
                format_process_id(to)
            ),

            Self::NotFinalized(process) => {
                write!(f, "{} never learned its tree position", format_process_id(process))
            }

            Self::FinishOriginators(originators) => write!(
                f,
                "expected exactly one Finish originator, got {:?}",
                originators.iter().map(format_process_id).collect::<Vec<_>>()
            ),

            Self::LeadersDisagree(leaders) => write!(f, "processes disagree on the leader: {:?}", leaders),

            Self::AsymmetricBranch { a, b } => write!(
                f,
                "{} marks the edge to {} as BRANCH but not the other way round",
                format_process_id(a),
                format_process_id(b)
            ),

            Self::WrongEdgeCount { expected, actual } => {
                write!(f, "tree has {} edges, expected {}", actual, expected)
            }

            Self::TreeNotSpanning { unreached } => write!(
                f,
                "tree does not reach {:?}",
                unreached.iter().map(format_process_id).collect::<Vec<_>>()
            ),

            Self::ChildCountMismatch { expected, actual } => {
                write!(f, "child counts sum to {}, expected {}", actual, expected)
            }

            Self::CoordinationIncomplete(root) => write!(
                f,
                "root {} never received every acknowledgement",
                format_process_id(root)
            ),
        }
    }
}

impl ElectionProcess {
    /// Checks the local state of this process for consistency
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();
        let process = self.id;

        if self.status == NodeStatus::Sleeping
            && (self.level != Level(0) || self.fragment.is_some() || self.branch_neighbors().next().is_some())
        {
            violations.push(InvariantViolation::SleepingWithState { process });
        }

        if self.level < self.peak_level {
            violations.push(InvariantViolation::LevelDecreased {
                process,
                peak: self.peak_level,
                level: self.level,
            });
        }

        if let Some(best_edge) = self.best_edge {
            if !self.edges.contains_key(&best_edge) {
                violations.push(InvariantViolation::BestEdgeNotNeighbor { process, best_edge });
            }
            if self.best_weight.is_infinite() {
                violations.push(InvariantViolation::BestEdgeWithoutWeight {
                    process,
                    best: self.best_weight,
                });
            }
        }

        if let Some(in_branch) = self.in_branch {
            if !self.edges.contains_key(&in_branch) {
                violations.push(InvariantViolation::InBranchNotNeighbor { process, in_branch });
            }
        }

        match &self.tree {
            Some(tree) => {
                let branch_edges = self.branch_neighbors().count();
                if tree.num_branch() != branch_edges {
                    violations.push(InvariantViolation::TreeBranchMismatch {
                        process,
                        tree_branches: tree.num_branch(),
                        branch_edges,
                    });
                }
                if let Some(parent) = tree.parent {
                    if self.edge_state(parent) != Some(EdgeState::Branch) {
                        violations.push(InvariantViolation::ParentEdgeNotBranch { process, parent });
                    }
                }
                if self.acks.child_acks > tree.num_children() {
                    violations.push(InvariantViolation::TooManyAcks {
                        process,
                        acks: self.acks.child_acks,
                        children: tree.num_children(),
                    });
                }
            }
            None => {
                if self.leader.is_some() {
                    violations.push(InvariantViolation::LeaderBeforeTree { process });
                }
            }
        }

        if let Some(sweep) = &self.sweep {
            let nodes = sweep.matrix.nodes();
            for &from in nodes {
                for &to in nodes {
                    let Some(info) = sweep.matrix.get(from, to) else { continue };
                    let endpoints_ok = match (info.path.first(), info.path.last()) {
                        (Some(first), Some(last)) => *first == from && *last == to,
                        _ => !info.is_known(),
                    };
                    if !endpoints_ok {
                        violations.push(InvariantViolation::MalformedPath { process, from, to });
                    }
                }
            }
        }

        violations
    }
}

/// Checks the finished network as a whole: one tree, one originator, one
/// leader, and a completed acknowledgement round.
pub fn check_network(processes: &BTreeMap<ProcessId, ElectionProcess>) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let n = processes.len();

    for (id, process) in processes {
        if !process.is_finalized() {
            violations.push(InvariantViolation::NotFinalized(*id));
        }
    }

    let originators: Vec<_> = processes
        .values()
        .filter(|p| p.originated_finish)
        .map(|p| p.id)
        .collect();
    if originators.len() != 1 {
        violations.push(InvariantViolation::FinishOriginators(originators.clone()));
    }

    let leaders: BTreeMap<_, _> = processes.iter().map(|(id, p)| (*id, p.leader)).collect();
    let distinct: BTreeSet<_> = leaders.values().copied().collect();
    if distinct.len() != 1 || leaders.values().any(Option::is_none) {
        violations.push(InvariantViolation::LeadersDisagree(leaders));
    }

    let mut edge_count = 0;
    let mut adjacency: BTreeMap<ProcessId, Vec<ProcessId>> = BTreeMap::new();
    for (id, process) in processes {
        for neighbor in process.branch_neighbors() {
            let mirrored = processes
                .get(&neighbor)
                .is_some_and(|other| other.edge_state(*id) == Some(EdgeState::Branch));
            if !mirrored {
                violations.push(InvariantViolation::AsymmetricBranch { a: *id, b: neighbor });
            }
            if *id < neighbor {
                edge_count += 1;
            }
            adjacency.entry(*id).or_default().push(neighbor);
        }
    }
    if edge_count + 1 != n {
        violations.push(InvariantViolation::WrongEdgeCount {
            expected: n.saturating_sub(1),
            actual: edge_count,
        });
    }

    if let Some(start) = processes.keys().next().copied() {
        let mut reached = BTreeSet::from([start]);
        let mut frontier = VecDeque::from([start]);
        while let Some(id) = frontier.pop_front() {
            for next in adjacency.get(&id).into_iter().flatten() {
                if reached.insert(*next) {
                    frontier.push_back(*next);
                }
            }
        }
        let unreached: Vec<_> = processes.keys().filter(|id| !reached.contains(id)).copied().collect();
        if !unreached.is_empty() {
            violations.push(InvariantViolation::TreeNotSpanning { unreached });
        }
    }

    let children: usize = processes.values().filter_map(|p| p.num_children()).sum();
    if children + 1 != n {
        violations.push(InvariantViolation::ChildCountMismatch {
            expected: n.saturating_sub(1),
            actual: children,
        });
    }

    for root in &originators {
        if processes.get(root).is_some_and(|p| !p.coordination_complete) {
            violations.push(InvariantViolation::CoordinationIncomplete(*root));
        }
    }

    violations
}
