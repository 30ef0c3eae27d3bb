//! Simulator that runs an in-memory network of election processes
//
//! There is no clock. Each step delivers exactly one message: the scheduler
//! picks a process with a non-empty inbox (round-robin or by a seeded RNG)
//! and hands it the head of its queue. Messages a process cannot handle yet
//! go back to the tail of its own queue.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;

use crate::config::{ElectionConfig, Schedule};
use crate::error::SimulationError;
use crate::graph::{validate_topology, EdgeCosts, EdgeSpec};
use crate::*;

/// Message and cost bookkeeping for a run
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TrafficStats {
    /// Messages sent, by wire type
    pub by_kind: BTreeMap<MessageKind, usize>,
    pub by_phase: BTreeMap<Phase, usize>,
    /// Summed weight of the edges every message crossed
    pub cost_by_phase: BTreeMap<Phase, f64>,
    pub total_cost: f64,
    /// Times a message went back on its queue
    pub deferrals: usize,
}

impl TrafficStats {
    pub(crate) fn record_sent(&mut self, kind: MessageKind, cost: f64) {
        *self.by_kind.entry(kind).or_default() += 1;
        *self.by_phase.entry(kind.phase()).or_default() += 1;
        *self.cost_by_phase.entry(kind.phase()).or_default() += cost;
        self.total_cost += cost;
    }

    pub fn count(&self, kind: MessageKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.by_kind.values().sum()
    }

    pub fn merge(&mut self, other: &TrafficStats) {
        for (kind, n) in &other.by_kind {
            *self.by_kind.entry(*kind).or_default() += n;
        }
        for (phase, n) in &other.by_phase {
            *self.by_phase.entry(*phase).or_default() += n;
        }
        for (phase, cost) in &other.cost_by_phase {
            *self.cost_by_phase.entry(*phase).or_default() += cost;
        }
        self.total_cost += other.total_cost;
        self.deferrals += other.deferrals;
    }
}

/// Final state of one process, for reports
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcessSummary {
    pub id: ProcessId,
    pub level: Level,
    pub parent: Option<ProcessId>,
    pub children: Vec<ProcessId>,
    pub leader: Option<ProcessId>,
    pub next_hop_to_leader: Option<ProcessId>,
}

/// Outcome of an election run
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub leader: Option<ProcessId>,
    pub tree_root: Option<ProcessId>,
    pub strategy: ElectionStrategy,
    pub steps: usize,
    pub tree_edges: Vec<EdgeSpec>,
    pub tree_weight: f64,
    pub processes: Vec<ProcessSummary>,
    pub traffic: TrafficStats,
}

impl RunReport {
    pub fn from_processes(
        processes: &BTreeMap<ProcessId, ElectionProcess>,
        strategy: ElectionStrategy,
        steps: usize,
        traffic: TrafficStats,
    ) -> Self {
        let root = processes.values().find(|p| p.originated_finish);

        let tree_edges: Vec<_> = processes
            .values()
            .flat_map(|p| {
                p.branch_neighbors()
                    .filter(move |n| p.id < *n)
                    .map(move |n| EdgeSpec {
                        a: p.id,
                        b: n,
                        weight: p.costs.cost(p.id, n).unwrap_or(0.0),
                    })
            })
            .collect();
        let tree_weight = tree_edges.iter().map(|e| e.weight).sum();

        let summaries = processes
            .values()
            .map(|p| ProcessSummary {
                id: p.id,
                level: p.level,
                parent: p.tree.as_ref().and_then(|t| t.parent),
                children: p.tree.as_ref().map(|t| t.children.clone()).unwrap_or_default(),
                leader: p.leader,
                next_hop_to_leader: p.next_hop_to_leader(),
            })
            .collect();

        RunReport {
            leader: root.and_then(|p| p.leader),
            tree_root: root.map(|p| p.id),
            strategy,
            steps,
            tree_edges,
            tree_weight,
            processes: summaries,
            traffic,
        }
    }
}

/// A deterministic single-threaded network of election processes
#[derive(Clone)]
pub struct Network {
    pub costs: Arc<dyn EdgeCosts>,

    pub config: ElectionConfig,

    /// The processes participating in the simulation
    pub processes: BTreeMap<ProcessId, ElectionProcess>,

    /// Per-process FIFO of messages waiting to be delivered
    pub inboxes: BTreeMap<ProcessId, VecDeque<Message>>,

    /// Messages delivered so far
    pub steps: usize,

    pub traffic: TrafficStats,

    triggered: bool,

    /// Round-robin position in `processes`
    cursor: usize,

    rng: Option<StdRng>,
}

impl Network {
    pub fn new(costs: Arc<dyn EdgeCosts>, config: ElectionConfig) -> Result<Self, SimulationError> {
        validate_topology(costs.as_ref())?;

        let processes: BTreeMap<_, _> = costs
            .processes()
            .iter()
            .map(|id| (*id, ElectionProcess::new(*id, costs.clone(), config.strategy)))
            .collect();
        let inboxes = processes.keys().map(|id| (*id, VecDeque::new())).collect();
        let rng = match config.schedule {
            Schedule::RoundRobin => None,
            Schedule::Random { seed } => Some(StdRng::seed_from_u64(seed)),
        };

        Ok(Network {
            costs,
            config,
            processes,
            inboxes,
            steps: 0,
            traffic: TrafficStats::default(),
            triggered: false,
            cursor: 0,
            rng,
        })
    }

    /// Wakes the processes named by the wake policy
    pub fn trigger(&mut self) -> Result<(), SimulationError> {
        self.triggered = true;
        let targets = self.config.wake_targets(self.costs.processes())?;
        for id in targets {
            self.wake(id)?;
        }
        Ok(())
    }

    /// Delivers the external wakeup to one process
    pub fn wake(&mut self, id: ProcessId) -> Result<(), SimulationError> {
        let process = self
            .processes
            .get_mut(&id)
            .ok_or(SimulationError::UnknownProcess(id))?;
        let mut to_send = Vec::new();
        process.wakeup(&mut to_send);
        for message in to_send {
            self.enqueue_message(message)?;
        }
        Ok(())
    }

    /// Add a message to its receiver's queue
    pub fn enqueue_message(&mut self, message: Message) -> Result<(), SimulationError> {
        let (sender, receiver) = (message.sender, message.receiver);
        if !self.processes.contains_key(&sender) {
            return Err(SimulationError::UnknownProcess(sender));
        }
        let inbox = self
            .inboxes
            .get_mut(&receiver)
            .ok_or(SimulationError::UnknownProcess(receiver))?;
        let cost = if sender == receiver {
            0.0
        } else {
            self.costs
                .cost(sender, receiver)
                .ok_or(SimulationError::NotANeighbor { sender, receiver })?
        };

        self.traffic.record_sent(message.kind(), cost);
        inbox.push_back(message);
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.inboxes.values().map(VecDeque::len).sum()
    }

    fn next_receiver(&mut self) -> Option<ProcessId> {
        let ready: Vec<_> = self
            .inboxes
            .iter()
            .filter(|(_, inbox)| !inbox.is_empty())
            .map(|(id, _)| *id)
            .collect();
        if ready.is_empty() {
            return None;
        }
        match self.rng.as_mut() {
            Some(rng) => Some(ready[rng.gen_range(0..ready.len())]),
            None => {
                let ids: Vec<_> = self.inboxes.keys().copied().collect();
                for offset in 0..ids.len() {
                    let id = ids[(self.cursor + offset) % ids.len()];
                    if ready.contains(&id) {
                        self.cursor = (self.cursor + offset + 1) % ids.len();
                        return Some(id);
                    }
                }
                None
            }
        }
    }

    /// Delivers a single message. Returns `false` once every queue is empty.
    pub fn step(&mut self) -> Result<bool, SimulationError> {
        let Some(receiver) = self.next_receiver() else {
            return Ok(false);
        };
        let Some(message) = self.inboxes.get_mut(&receiver).and_then(VecDeque::pop_front) else {
            return Ok(false);
        };
        let process = self
            .processes
            .get_mut(&receiver)
            .ok_or(SimulationError::UnknownProcess(receiver))?;

        let mut to_send = Vec::new();
        let delivery = process.process_message(message, &mut to_send);
        self.steps += 1;

        if let Delivery::Deferred(message) = delivery {
            self.traffic.deferrals += 1;
            if let Some(inbox) = self.inboxes.get_mut(&receiver) {
                inbox.push_back(message);
            }
        }
        for message in to_send {
            self.enqueue_message(message)?;
        }
        Ok(true)
    }

    /// Runs to quiescence, triggering first if nobody has been woken yet
    pub fn run(&mut self) -> Result<RunReport, SimulationError> {
        if !self.triggered {
            self.trigger()?;
        }
        while self.step()? {
            if self.steps >= self.config.max_steps && self.pending() > 0 {
                return Err(SimulationError::StepLimit {
                    steps: self.steps,
                    pending: self.pending(),
                });
            }
        }
        tracing::info!(
            target: "network_quiescent",
            steps = self.steps,
            messages = self.traffic.total(),
            deferrals = self.traffic.deferrals,
            total_cost = self.traffic.total_cost,
        );
        Ok(self.report())
    }

    pub fn report(&self) -> RunReport {
        RunReport::from_processes(&self.processes, self.config.strategy, self.steps, self.traffic.clone())
    }

    /// Checks every process and the network as a whole
    pub fn verify(&self) -> Vec<InvariantViolation> {
        let mut violations: Vec<_> = self
            .processes
            .values()
            .flat_map(ElectionProcess::check_invariants)
            .collect();
        violations.extend(check_network(&self.processes));
        violations
    }

    pub fn process(&self, id: ProcessId) -> Option<&ElectionProcess> {
        self.processes.get(&id)
    }
}
