use std::sync::Arc;

use mst_election::config::{ElectionConfig, Schedule, WakePolicy};
use mst_election::reference::prim_mst_weight;
use mst_election::{
    CostTable, EdgeState, ElectionStrategy, LeaderMethod, MessageKind, Network, NodeStatus, ProcessId,
};

fn p(id: u64) -> ProcessId {
    ProcessId(id)
}

/// A=1, B=2, C=3, D=4 on a complete graph
fn four_processes() -> CostTable {
    CostTable::from_edges(
        [p(1), p(2), p(3), p(4)],
        [
            (p(1), p(2), 1.0),
            (p(1), p(3), 4.0),
            (p(1), p(4), 3.0),
            (p(2), p(3), 2.0),
            (p(2), p(4), 5.0),
            (p(3), p(4), 1.0),
        ],
    )
    .unwrap()
}

fn run(table: CostTable, config: ElectionConfig) -> Network {
    let mut network = Network::new(Arc::new(table), config).unwrap();
    network.run().unwrap();
    let violations = network.verify();
    assert!(violations.is_empty(), "violations: {:?}", violations);
    network
}

#[test_log::test]
fn test_four_processes_build_the_minimum_tree() {
    let network = run(four_processes(), ElectionConfig::default());
    let report = network.report();

    // A-B, B-C and C-D
    assert_eq!(report.tree_edges.len(), 3);
    assert_eq!(report.tree_weight, 4.0);
    assert_eq!(report.tree_weight, prim_mst_weight(&four_processes()));

    let branch_edges: usize = network
        .processes
        .values()
        .map(|process| process.branch_neighbors().count())
        .sum();
    assert_eq!(branch_edges, 6, "each tree edge is BRANCH at both ends");

    // Everyone agrees, and the root leads
    let leader = report.leader.unwrap();
    assert_eq!(Some(leader), report.tree_root);
    for process in network.processes.values() {
        assert_eq!(process.leader, Some(leader));
        assert_eq!(process.status, NodeStatus::Found);
    }
    assert_eq!(network.process(leader).unwrap().coordination_complete, true);
    assert_eq!(network.pending(), 0);
}

#[test_log::test]
fn test_two_processes_converge_immediately() {
    let table = CostTable::from_edges([p(7), p(3)], [(p(7), p(3), 2.5)]).unwrap();
    let network = run(table, ElectionConfig::default());
    let report = network.report();

    assert_eq!(report.leader, Some(p(3)));
    assert_eq!(report.tree_root, Some(p(3)));
    assert_eq!(report.tree_weight, 2.5);

    // No BASIC edge survives the first Connect, so nothing is ever tested
    let traffic = &report.traffic;
    assert_eq!(traffic.count(MessageKind::Test), 0);
    assert_eq!(traffic.count(MessageKind::Accept), 0);
    assert_eq!(traffic.count(MessageKind::Reject), 0);
    assert_eq!(traffic.count(MessageKind::Connect), 2);
    assert_eq!(traffic.count(MessageKind::Finish), 2);
    assert_eq!(traffic.count(MessageKind::AckLeader), 1);

    for process in network.processes.values() {
        assert_eq!(process.edge_state(if process.id == p(3) { p(7) } else { p(3) }), Some(EdgeState::Branch));
    }
}

#[test_log::test]
fn test_wake_all_and_random_schedules_agree_on_the_tree() {
    let baseline = run(four_processes(), ElectionConfig::default()).report();

    for seed in 0..8 {
        for wake in [WakePolicy::All, WakePolicy::One(p(4))] {
            let config = ElectionConfig {
                wake,
                schedule: Schedule::Random { seed },
                ..ElectionConfig::default()
            };
            let report = run(four_processes(), config).report();
            assert_eq!(report.tree_edges, baseline.tree_edges, "seed {seed}, wake {wake:?}");
            assert_eq!(report.tree_weight, 4.0);
            assert!(report.leader.is_some());
        }
    }
}

#[test_log::test]
fn test_shortest_path_leader_by_sum() {
    // Sums of distances: A=7, B=6, C=6, D=7; B wins the tie on id
    let config = ElectionConfig {
        strategy: ElectionStrategy::ShortestPath {
            method: LeaderMethod::Sum,
        },
        ..ElectionConfig::default()
    };
    let network = run(four_processes(), config);
    let report = network.report();

    assert_eq!(report.leader, Some(p(2)));
    assert_eq!(report.traffic.count(MessageKind::PathPartial) > 0, true);
    for process in network.processes.values() {
        assert_eq!(process.leader, Some(p(2)));
        let sweep = process.sweep.as_ref().unwrap();
        assert!(sweep.is_final());
        assert!(sweep.matrix.is_complete());
        assert_eq!(sweep.matrix.cost(p(1), p(3)), 3.0);
        assert_eq!(sweep.matrix.cost(p(2), p(4)), 3.0);
    }

    // A reaches B directly, D goes through C then B
    assert_eq!(network.process(p(1)).unwrap().next_hop_to_leader(), Some(p(2)));
    assert_eq!(network.process(p(4)).unwrap().next_hop_to_leader(), Some(p(3)));
    assert_eq!(network.process(p(2)).unwrap().next_hop_to_leader(), None);
}

#[test_log::test]
fn test_shortest_path_leader_by_max() {
    // Every eccentricity is 3, so the lowest id wins
    let config = ElectionConfig {
        strategy: ElectionStrategy::ShortestPath {
            method: LeaderMethod::Max,
        },
        schedule: Schedule::Random { seed: 11 },
        ..ElectionConfig::default()
    };
    let report = run(four_processes(), config).report();
    assert_eq!(report.leader, Some(p(1)));
}

#[test_log::test]
fn test_shortest_path_on_two_processes() {
    let table = CostTable::from_edges([p(5), p(9)], [(p(5), p(9), 1.0)]).unwrap();
    let config = ElectionConfig {
        strategy: ElectionStrategy::ShortestPath {
            method: LeaderMethod::Sum,
        },
        ..ElectionConfig::default()
    };
    let network = run(table, config);
    let report = network.report();

    // Both send a partial, both saturate, neither needs a final
    assert_eq!(report.leader, Some(p(5)));
    assert_eq!(report.traffic.count(MessageKind::PathPartial), 2);
    assert_eq!(report.traffic.count(MessageKind::PathFinal), 0);
    assert_eq!(network.process(p(9)).unwrap().next_hop_to_leader(), Some(p(5)));
}

#[test_log::test]
fn test_structural_next_hop_follows_the_tree() {
    let network = run(four_processes(), ElectionConfig::default());
    let leader = network.report().leader.unwrap();

    for process in network.processes.values() {
        // Walk parent links up to the leader
        let mut current = process.id;
        let mut hops = 0;
        while current != leader {
            current = network.process(current).unwrap().next_hop_to_leader().unwrap();
            hops += 1;
            assert!(hops < 4);
        }
    }
}
