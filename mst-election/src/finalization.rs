use crate::tracing_setup::{coordination_complete, protocol_error, tree_finalized};
use crate::*;

/// Tree finalization and the leader acknowledgement handshake
impl ElectionProcess {
    /// Handles the Finish flood.
    ///
    /// The sender becomes our parent (the originator receives Finish from
    /// itself and becomes the root) and every other BRANCH edge leads to a
    /// child. Finish is forwarded to all children.
    pub(crate) fn process_finish(
        &mut self,
        sender: ProcessId,
        root: ProcessId,
        message: &Message,
        to_send: &mut Vec<Message>,
    ) -> Delivery {
        if self.tree.is_some() {
            protocol_error(&self.id, "duplicate_finish", message);
            return Delivery::Ignored;
        }

        let parent = (sender != self.id).then_some(sender);
        let children: Vec<_> = self.branch_neighbors().filter(|n| Some(*n) != parent).collect();
        tree_finalized(&self.id, parent.as_ref(), children.len());

        self.originated_finish = parent.is_none();
        self.tree_root = Some(root);
        self.in_branch = parent;
        self.tree = Some(TreePosition { parent, children });

        for child in self.broadcast_targets(parent) {
            self.send(child, Payload::Finish { leader: root }, to_send);
        }

        match self.strategy {
            ElectionStrategy::Structural => self.acknowledge_leader(root, to_send),
            ElectionStrategy::ShortestPath { .. } => self.start_sweep(to_send),
        }
        Delivery::Handled
    }

    /// Records the leader and counts ourselves as acknowledged
    pub(crate) fn acknowledge_leader(&mut self, leader: ProcessId, to_send: &mut Vec<Message>) {
        self.leader = Some(leader);
        self.acks.self_acked = true;
        self.try_ack_parent(to_send);
    }

    pub(crate) fn process_ack_leader(
        &mut self,
        sender: ProcessId,
        leader: ProcessId,
        message: &Message,
        to_send: &mut Vec<Message>,
    ) -> Delivery {
        let from_child = self
            .tree
            .as_ref()
            .is_some_and(|tree| tree.children.contains(&sender));
        if !from_child || self.acks.done {
            protocol_error(&self.id, "unexpected_ack_leader", message);
            return Delivery::Ignored;
        }
        if self.leader.is_some_and(|ours| ours != leader) {
            protocol_error(&self.id, "leader_disagreement", message);
        }

        self.acks.child_acks += 1;
        self.try_ack_parent(to_send);
        Delivery::Handled
    }

    /// Once we and every child have acknowledged, pass it up. At the root
    /// this completes coordination.
    fn try_ack_parent(&mut self, to_send: &mut Vec<Message>) {
        let (Some(tree), Some(leader)) = (&self.tree, self.leader) else {
            return;
        };
        if self.acks.done || !self.acks.self_acked || self.acks.child_acks != tree.num_children() {
            return;
        }
        let parent = tree.parent;
        self.acks.done = true;

        match parent {
            Some(parent) => self.send(parent, Payload::AckLeader { leader }, to_send),
            None => {
                self.coordination_complete = true;
                coordination_complete(&self.id, &leader);
            }
        }
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

    /// p2 sits between p1 and p3
    fn path_process(strategy: ElectionStrategy) -> ElectionProcess {
        let table = Arc::new(
            CostTable::from_edges([p(1), p(2), p(3)], [(p(1), p(2), 1.0), (p(2), p(3), 2.0)]).unwrap(),
        );
        let mut process = ElectionProcess::new(p(2), table, strategy);
        process.status = NodeStatus::Found;
        process.level = Level(2);
        process.edges.insert(p(1), EdgeState::Branch);
        process.edges.insert(p(3), EdgeState::Branch);
        process
    }

    #[test]
    fn finish_sets_parent_and_children() {
        let mut process = path_process(ElectionStrategy::Structural);
        let mut to_send = Vec::new();
        let message = Message::new(p(1), p(2), Payload::Finish { leader: p(1) });
        process.process_finish(p(1), p(1), &message, &mut to_send);

        assert_eq!(
            process.tree,
            Some(TreePosition {
                parent: Some(p(1)),
                children: vec![p(3)],
            })
        );
        assert_eq!(process.leader, Some(p(1)));
        assert_eq!(process.originated_finish, false);
        assert_eq!(to_send, vec![Message::new(p(2), p(3), Payload::Finish { leader: p(1) })]);

        // Duplicate Finish is dropped
        to_send.clear();
        assert!(matches!(
            process.process_finish(p(1), p(1), &message, &mut to_send),
            Delivery::Ignored
        ));
        assert!(to_send.is_empty());
    }

    #[test]
    fn ack_waits_for_every_child() {
        let mut process = path_process(ElectionStrategy::Structural);
        let mut to_send = Vec::new();
        let finish = Message::new(p(1), p(2), Payload::Finish { leader: p(1) });
        process.process_finish(p(1), p(1), &finish, &mut to_send);
        to_send.clear();

        // The child's ack releases ours
        let ack = Message::new(p(3), p(2), Payload::AckLeader { leader: p(1) });
        process.process_ack_leader(p(3), p(1), &ack, &mut to_send);
        assert_eq!(to_send, vec![Message::new(p(2), p(1), Payload::AckLeader { leader: p(1) })]);
        assert_eq!(process.acks.done, true);

        // Acks from the parent are not expected
        let stray = Message::new(p(1), p(2), Payload::AckLeader { leader: p(1) });
        assert!(matches!(
            process.process_ack_leader(p(1), p(1), &stray, &mut to_send),
            Delivery::Ignored
        ));
    }

    #[test]
    fn root_completes_coordination() {
        let mut process = path_process(ElectionStrategy::Structural);
        let mut to_send = Vec::new();
        let finish = Message::new(p(2), p(2), Payload::Finish { leader: p(2) });
        process.process_finish(p(2), p(2), &finish, &mut to_send);
        assert_eq!(process.originated_finish, true);
        assert_eq!(process.num_children(), Some(2));
        assert_eq!(to_send.len(), 2);

        for child in [p(1), p(3)] {
            assert_eq!(process.coordination_complete, false);
            let ack = Message::new(child, p(2), Payload::AckLeader { leader: p(2) });
            process.process_ack_leader(child, p(2), &ack, &mut to_send);
        }
        assert_eq!(process.coordination_complete, true);
    }

    #[test]
    fn shortest_path_finish_starts_the_sweep() {
        let mut process = path_process(ElectionStrategy::ShortestPath {
            method: LeaderMethod::Sum,
        });
        let mut to_send = Vec::new();
        let finish = Message::new(p(1), p(2), Payload::Finish { leader: p(1) });
        process.process_finish(p(1), p(1), &finish, &mut to_send);

        // Two tree neighbors, none heard yet: no partial goes out
        assert_eq!(process.leader, None);
        assert_eq!(to_send.len(), 1);
        assert_eq!(to_send[0].kind(), MessageKind::Finish);
        assert!(process.sweep.is_some());
    }
}
