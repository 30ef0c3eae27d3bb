//! Asynchronous runtime: one tokio task per process.
//!
//! Each task owns its [`ElectionProcess`] and an unbounded inbox. A shared
//! in-flight counter is raised before every send and lowered after every
//! handled message, so it reaches zero only once the network is quiet.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::config::ElectionConfig;
use crate::error::SimulationError;
use crate::graph::{validate_topology, EdgeCosts};
use crate::network::{RunReport, TrafficStats};
use crate::*;

/// Final process states of an actor run
#[derive(Debug)]
pub struct ActorRun {
    pub processes: BTreeMap<ProcessId, ElectionProcess>,
    pub report: RunReport,
}

impl ActorRun {
    pub fn verify(&self) -> Vec<InvariantViolation> {
        let mut violations: Vec<_> = self
            .processes
            .values()
            .flat_map(ElectionProcess::check_invariants)
            .collect();
        violations.extend(check_network(&self.processes));
        violations
    }
}

struct Mailboxes {
    costs: Arc<dyn EdgeCosts>,
    senders: BTreeMap<ProcessId, mpsc::UnboundedSender<Message>>,
    in_flight: AtomicUsize,
    quiet: Notify,
}

impl Mailboxes {
    fn post(&self, message: Message) -> Result<(), SimulationError> {
        let receiver = message.receiver;
        let inbox = self
            .senders
            .get(&receiver)
            .ok_or(SimulationError::UnknownProcess(receiver))?;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if inbox.send(message).is_err() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(SimulationError::ActorFailed(receiver));
        }
        Ok(())
    }

    /// Posts a freshly sent message and accounts for it
    fn send(&self, message: Message, traffic: &mut TrafficStats) -> Result<(), SimulationError> {
        let (sender, receiver) = (message.sender, message.receiver);
        if !self.senders.contains_key(&receiver) {
            return Err(SimulationError::UnknownProcess(receiver));
        }
        let cost = if sender == receiver {
            0.0
        } else {
            self.costs
                .cost(sender, receiver)
                .ok_or(SimulationError::NotANeighbor { sender, receiver })?
        };
        traffic.record_sent(message.kind(), cost);
        self.post(message)
    }

    fn handled(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.quiet.notify_one();
        }
    }
}

struct ActorResult {
    process: ElectionProcess,
    traffic: TrafficStats,
    steps: usize,
}

async fn run_actor(
    mut process: ElectionProcess,
    mut inbox: mpsc::UnboundedReceiver<Message>,
    mailboxes: Arc<Mailboxes>,
    cancel: CancellationToken,
) -> Result<ActorResult, SimulationError> {
    // Unwinding out of a handler stops every other actor too
    let _stop_all = cancel.clone().drop_guard();
    let mut traffic = TrafficStats::default();
    let mut steps = 0;

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            received = inbox.recv() => match received {
                Some(message) => message,
                None => break,
            },
        };

        let mut to_send = Vec::new();
        let delivery = process.process_message(message, &mut to_send);
        steps += 1;

        let mut outcome = to_send
            .into_iter()
            .try_for_each(|message| mailboxes.send(message, &mut traffic));
        let deferred = delivery.is_deferred();
        if let Delivery::Deferred(message) = delivery {
            traffic.deferrals += 1;
            outcome = outcome.and_then(|()| mailboxes.post(message));
        }
        mailboxes.handled();

        if let Err(error) = outcome {
            crate::tracing_setup::protocol_error(&process.id, "actor_send_failed", &error);
            cancel.cancel();
            return Err(error);
        }
        if deferred {
            tokio::task::yield_now().await;
        }
    }

    Ok(ActorResult {
        process,
        traffic,
        steps,
    })
}

/// Runs an election with one task per process and waits for quiescence
pub async fn run_actors(costs: Arc<dyn EdgeCosts>, config: ElectionConfig) -> Result<ActorRun, SimulationError> {
    validate_topology(costs.as_ref())?;

    let mut processes: BTreeMap<_, _> = costs
        .processes()
        .iter()
        .map(|id| (*id, ElectionProcess::new(*id, costs.clone(), config.strategy)))
        .collect();

    let mut senders = BTreeMap::new();
    let mut inboxes = BTreeMap::new();
    for id in processes.keys() {
        let (tx, rx) = mpsc::unbounded_channel();
        senders.insert(*id, tx);
        inboxes.insert(*id, rx);
    }
    let mailboxes = Arc::new(Mailboxes {
        costs: costs.clone(),
        senders,
        in_flight: AtomicUsize::new(0),
        quiet: Notify::new(),
    });

    // Wake before spawning so the first messages are already counted
    let mut traffic = TrafficStats::default();
    let mut initial = Vec::new();
    for id in config.wake_targets(costs.processes())? {
        processes
            .get_mut(&id)
            .ok_or(SimulationError::UnknownProcess(id))?
            .wakeup(&mut initial);
    }
    for message in initial {
        mailboxes.send(message, &mut traffic)?;
    }

    let cancel = CancellationToken::new();
    let mut ids = Vec::new();
    let mut handles = Vec::new();
    for (id, process) in std::mem::take(&mut processes) {
        let Some(inbox) = inboxes.remove(&id) else { continue };
        ids.push(id);
        handles.push(tokio::spawn(run_actor(process, inbox, mailboxes.clone(), cancel.clone())));
    }

    let limit = Duration::from_millis(config.actor_timeout_ms);
    let waited = tokio::time::timeout(limit, async {
        tokio::select! {
            _ = mailboxes.quiet.notified() => {}
            _ = cancel.cancelled() => {}
        }
    })
    .await;
    cancel.cancel();
    let results = join_all(handles).await;

    let mut steps = 0;
    for (id, result) in ids.into_iter().zip(results) {
        let actor = result.map_err(|_| SimulationError::ActorFailed(id))??;
        steps += actor.steps;
        traffic.merge(&actor.traffic);
        processes.insert(id, actor.process);
    }
    if waited.is_err() {
        return Err(SimulationError::Timeout(limit));
    }

    tracing::info!(
        target: "actors_quiescent",
        steps = steps,
        messages = traffic.total(),
        deferrals = traffic.deferrals,
        total_cost = traffic.total_cost,
    );
    let report = RunReport::from_processes(&processes, config.strategy, steps, traffic);
    Ok(ActorRun { processes, report })
}
