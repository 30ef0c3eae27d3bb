use crate::tracing_setup::{protocol_error, protocol_transition};
use crate::*;

/// Fragment merging: the GHS minimum spanning tree construction.
///
/// Each process starts as its own fragment and repeatedly joins its
/// fragment's minimum outgoing edge. Fragments of equal level that pick the
/// same edge merge one level up; a lower-level fragment is absorbed.
impl ElectionProcess {
    /// Spontaneous start, or start on the first message received while asleep
    pub fn wakeup(&mut self, to_send: &mut Vec<Message>) {
        if self.status != NodeStatus::Sleeping {
            return;
        }
        let lightest = self
            .edges
            .keys()
            .filter_map(|neighbor| self.edge_key(*neighbor))
            .min();

        self.level = Level(0);
        self.find_count = 0;
        self.set_status(NodeStatus::Found, "wakeup");

        if let Some(key) = lightest {
            let neighbor = key.other(self.id);
            self.set_edge_state(neighbor, EdgeState::Branch);
            self.send(neighbor, Payload::Connect { level: self.level }, to_send);
        }
    }

    pub(crate) fn set_status(&mut self, next: NodeStatus, reason: &str) {
        if self.status != next {
            protocol_transition(&self.id, "status", self.status, next, Some(reason));
            self.status = next;
        }
    }

    pub(crate) fn process_connect(
        &mut self,
        sender: ProcessId,
        level: Level,
        message: &Message,
        to_send: &mut Vec<Message>,
    ) -> Delivery {
        self.wakeup(to_send);

        if level < self.level {
            // Absorb the lower-level fragment
            let Some(fragment) = self.fragment else {
                protocol_error(&self.id, "absorb_without_fragment", message);
                return Delivery::Ignored;
            };
            self.set_edge_state(sender, EdgeState::Branch);
            self.send(
                sender,
                Payload::Initiate {
                    level: self.level,
                    fragment,
                    status: self.status,
                },
                to_send,
            );
            if self.status == NodeStatus::Find {
                self.find_count += 1;
            }
            Delivery::Handled
        } else if self.edge_state(sender) == Some(EdgeState::Basic) {
            // Wait until our fragment reaches this level or picks this edge
            Delivery::Deferred(message.clone())
        } else {
            let Some(core) = self.edge_key(sender) else {
                protocol_error(&self.id, "connect_from_non_neighbor", message);
                return Delivery::Ignored;
            };
            self.send(
                sender,
                Payload::Initiate {
                    level: self.level.incr(),
                    fragment: core,
                    status: NodeStatus::Find,
                },
                to_send,
            );
            Delivery::Handled
        }
    }

    pub(crate) fn process_initiate(
        &mut self,
        sender: ProcessId,
        level: Level,
        fragment: FragmentId,
        status: NodeStatus,
        to_send: &mut Vec<Message>,
    ) -> Delivery {
        if level != self.level {
            protocol_transition(&self.id, "level", self.level, level, None);
        }
        self.level = level;
        self.fragment = Some(fragment);
        self.set_status(status, "initiate");
        self.in_branch = Some(sender);
        self.best_edge = None;
        self.best_weight = BestWeight::Infinite;

        let forward: Vec<_> = self.branch_neighbors().filter(|n| *n != sender).collect();
        for neighbor in forward {
            self.send(neighbor, Payload::Initiate { level, fragment, status }, to_send);
            if status == NodeStatus::Find {
                self.find_count += 1;
            }
        }

        if status == NodeStatus::Find {
            self.test(to_send);
        }
        Delivery::Handled
    }

    /// Probes the lightest BASIC edge, or reports if none is left
    pub(crate) fn test(&mut self, to_send: &mut Vec<Message>) {
        let lightest = self
            .edges
            .iter()
            .filter(|(_, state)| **state == EdgeState::Basic)
            .filter_map(|(neighbor, _)| self.edge_key(*neighbor))
            .min();

        match (lightest, self.fragment) {
            (Some(key), Some(fragment)) => {
                let neighbor = key.other(self.id);
                self.test_edge = Some(neighbor);
                self.send(
                    neighbor,
                    Payload::Test {
                        level: self.level,
                        fragment,
                    },
                    to_send,
                );
            }
            _ => {
                self.test_edge = None;
                self.report(to_send);
            }
        }
    }

    pub(crate) fn process_test(
        &mut self,
        sender: ProcessId,
        level: Level,
        fragment: FragmentId,
        message: &Message,
        to_send: &mut Vec<Message>,
    ) -> Delivery {
        self.wakeup(to_send);

        if level > self.level {
            // The tester may be in our fragment already; we cannot tell yet
            return Delivery::Deferred(message.clone());
        }

        if self.fragment != Some(fragment) {
            self.send(sender, Payload::Accept, to_send);
            return Delivery::Handled;
        }

        if self.edge_state(sender) == Some(EdgeState::Basic) {
            self.set_edge_state(sender, EdgeState::Rejected);
        }
        if self.test_edge != Some(sender) {
            self.send(sender, Payload::Reject, to_send);
        } else {
            self.test(to_send);
        }
        Delivery::Handled
    }

    pub(crate) fn process_accept(
        &mut self,
        sender: ProcessId,
        message: &Message,
        to_send: &mut Vec<Message>,
    ) -> Delivery {
        if self.test_edge != Some(sender) {
            protocol_error(&self.id, "accept_from_untested_edge", message);
            return Delivery::Ignored;
        }
        self.test_edge = None;

        if let Some(key) = self.edge_key(sender) {
            let candidate = BestWeight::Edge(key);
            if candidate < self.best_weight {
                self.best_weight = candidate;
                self.best_edge = Some(sender);
            }
        }
        self.report(to_send);
        Delivery::Handled
    }

    pub(crate) fn process_reject(
        &mut self,
        sender: ProcessId,
        message: &Message,
        to_send: &mut Vec<Message>,
    ) -> Delivery {
        if self.test_edge != Some(sender) {
            protocol_error(&self.id, "reject_from_untested_edge", message);
            return Delivery::Ignored;
        }
        if self.edge_state(sender) == Some(EdgeState::Basic) {
            self.set_edge_state(sender, EdgeState::Rejected);
        }
        self.test(to_send);
        Delivery::Handled
    }

    /// Reports to `in_branch` once the local search and every child are done
    pub(crate) fn report(&mut self, to_send: &mut Vec<Message>) {
        if self.find_count != 0 || self.test_edge.is_some() {
            return;
        }
        self.set_status(NodeStatus::Found, "report");
        if let Some(parent) = self.in_branch {
            self.send(parent, Payload::Report { best: self.best_weight }, to_send);
        }
    }

    pub(crate) fn process_report(
        &mut self,
        sender: ProcessId,
        best: BestWeight,
        message: &Message,
        to_send: &mut Vec<Message>,
    ) -> Delivery {
        if self.in_branch != Some(sender) {
            // From a child in our subtree
            if self.find_count == 0 {
                protocol_error(&self.id, "unsolicited_report", message);
                return Delivery::Ignored;
            }
            self.find_count -= 1;
            if best < self.best_weight {
                self.best_weight = best;
                self.best_edge = Some(sender);
            }
            self.report(to_send);
            return Delivery::Handled;
        }

        // From across the core edge
        if self.status == NodeStatus::Find {
            return Delivery::Deferred(message.clone());
        }
        if best > self.best_weight {
            return self.change_root(message, to_send);
        }
        if best == self.best_weight && best.is_infinite() {
            let root = self.id.min(sender);
            crate::tracing_setup::fragment_converged(&self.id, self.level.0, self.fragment, &root);
            if root == self.id {
                self.send(self.id, Payload::Finish { leader: root }, to_send);
            }
        }
        Delivery::Handled
    }

    /// Walks towards `best_edge` and connects across it
    pub(crate) fn change_root(&mut self, message: &Message, to_send: &mut Vec<Message>) -> Delivery {
        let Some(best_edge) = self.best_edge else {
            protocol_error(&self.id, "change_root_without_best_edge", message);
            return Delivery::Ignored;
        };
        if self.edge_state(best_edge) == Some(EdgeState::Branch) {
            self.send(best_edge, Payload::ChangeRoot { level: self.level }, to_send);
        } else {
            self.send(best_edge, Payload::Connect { level: self.level }, to_send);
            self.set_edge_state(best_edge, EdgeState::Branch);
        }
        Delivery::Handled
    }

    pub(crate) fn process_change_root(&mut self, message: &Message, to_send: &mut Vec<Message>) -> Delivery {
        self.change_root(message, to_send)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::graph::CostTable;

    fn p(id: u64) -> ProcessId {
        ProcessId(id)
    }

    fn triangle() -> Arc<CostTable> {
        Arc::new(
            CostTable::from_edges(
                [p(1), p(2), p(3)],
                [(p(1), p(2), 2.0), (p(2), p(3), 1.0), (p(1), p(3), 3.0)],
            )
            .unwrap(),
        )
    }

    #[test]
    fn wakeup_connects_over_lightest_edge() {
        let mut process = ElectionProcess::new(p(2), triangle(), ElectionStrategy::Structural);
        let mut to_send = Vec::new();
        process.wakeup(&mut to_send);

        assert_eq!(process.status, NodeStatus::Found);
        assert_eq!(process.edge_state(p(3)), Some(EdgeState::Branch));
        assert_eq!(process.edge_state(p(1)), Some(EdgeState::Basic));
        assert_eq!(
            to_send,
            vec![Message::new(p(2), p(3), Payload::Connect { level: Level(0) })]
        );

        // A second wakeup does nothing
        to_send.clear();
        process.wakeup(&mut to_send);
        assert!(to_send.is_empty());
    }

    #[test]
    fn equal_level_connect_on_basic_edge_is_deferred() {
        let mut process = ElectionProcess::new(p(1), triangle(), ElectionStrategy::Structural);
        let mut to_send = Vec::new();
        // p1's lightest edge is to p2, so the edge to p3 stays BASIC
        let message = Message::new(p(3), p(1), Payload::Connect { level: Level(0) });
        let delivery = process.process_connect(p(3), Level(0), &message, &mut to_send);
        assert!(delivery.is_deferred());
        assert_eq!(to_send.len(), 1, "only the wakeup Connect is sent");
    }

    #[test]
    fn mutual_connect_starts_a_level_one_fragment() {
        let mut process = ElectionProcess::new(p(2), triangle(), ElectionStrategy::Structural);
        let mut to_send = Vec::new();
        process.wakeup(&mut to_send);
        to_send.clear();

        let message = Message::new(p(3), p(2), Payload::Connect { level: Level(0) });
        let delivery = process.process_connect(p(3), Level(0), &message, &mut to_send);
        assert!(matches!(delivery, Delivery::Handled));
        assert_eq!(
            to_send,
            vec![Message::new(
                p(2),
                p(3),
                Payload::Initiate {
                    level: Level(1),
                    fragment: EdgeKey::new(p(2), p(3), 1.0),
                    status: NodeStatus::Find,
                }
            )]
        );
    }

    #[test]
    fn test_within_fragment_is_rejected() {
        let mut process = ElectionProcess::new(p(1), triangle(), ElectionStrategy::Structural);
        let mut to_send = Vec::new();
        let core = EdgeKey::new(p(2), p(3), 1.0);
        process.process_initiate(p(2), Level(1), core, NodeStatus::Find, &mut to_send);
        to_send.clear();

        let message = Message::new(p(3), p(1), Payload::Test { level: Level(1), fragment: core });
        process.process_test(p(3), Level(1), core, &message, &mut to_send);
        assert_eq!(process.edge_state(p(3)), Some(EdgeState::Rejected));
        assert_eq!(to_send, vec![Message::new(p(1), p(3), Payload::Reject)]);
    }

    #[test]
    fn test_from_higher_level_is_deferred() {
        let mut process = ElectionProcess::new(p(1), triangle(), ElectionStrategy::Structural);
        let mut to_send = Vec::new();
        let core = EdgeKey::new(p(2), p(3), 1.0);
        let message = Message::new(p(3), p(1), Payload::Test { level: Level(2), fragment: core });
        assert!(process.process_test(p(3), Level(2), core, &message, &mut to_send).is_deferred());
    }

    #[test]
    fn stray_accept_is_ignored() {
        let mut process = ElectionProcess::new(p(1), triangle(), ElectionStrategy::Structural);
        let mut to_send = Vec::new();
        let message = Message::new(p(3), p(1), Payload::Accept);
        assert!(matches!(
            process.process_accept(p(3), &message, &mut to_send),
            Delivery::Ignored
        ));
        assert!(to_send.is_empty());
    }
}
