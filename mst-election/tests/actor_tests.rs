use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::{rngs::StdRng, SeedableRng};

use mst_election::actor::run_actors;
use mst_election::config::{ElectionConfig, WakePolicy};
use mst_election::reference::prim_mst_weight;
use mst_election::{CostTable, EdgeCosts, ElectionStrategy, LeaderMethod, Network, ProcessId, SimulationError};

fn p(id: u64) -> ProcessId {
    ProcessId(id)
}

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

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_actors_elect_a_single_leader() {
    let run = run_actors(Arc::new(four_processes()), ElectionConfig::default())
        .await
        .unwrap();

    let violations = run.verify();
    assert!(violations.is_empty(), "violations: {:?}", violations);
    assert_eq!(run.report.tree_weight, 4.0);
    assert_eq!(run.report.leader, run.report.tree_root);
    assert!(run.report.steps > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_actors_match_the_deterministic_network() {
    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..5 {
        let table = CostTable::random_complete(7, &mut rng).unwrap();
        let config = ElectionConfig {
            strategy: ElectionStrategy::ShortestPath {
                method: LeaderMethod::Sum,
            },
            wake: WakePolicy::All,
            ..ElectionConfig::default()
        };

        let mut network = Network::new(Arc::new(table.clone()), config.clone()).unwrap();
        let expected = network.run().unwrap();
        let run = run_actors(Arc::new(table.clone()), config).await.unwrap();

        assert!(run.verify().is_empty());
        assert_eq!(run.report.tree_edges, expected.tree_edges);
        assert_eq!(run.report.leader, expected.leader);
        assert!((run.report.tree_weight - prim_mst_weight(&table)).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_actors_reject_disconnected_graphs() {
    let table = CostTable::new([p(1), p(2), p(3)]).unwrap();
    assert!(matches!(
        run_actors(Arc::new(table), ElectionConfig::default()).await,
        Err(SimulationError::Graph(_))
    ));
}

#[tokio::test]
async fn test_actors_reject_an_unknown_wake_target() {
    let config = ElectionConfig {
        wake: WakePolicy::One(p(99)),
        actor_timeout_ms: 60_000,
        ..ElectionConfig::default()
    };
    let started = Instant::now();
    let outcome = run_actors(Arc::new(four_processes()), config).await;
    assert!(matches!(outcome, Err(SimulationError::UnknownProcess(id)) if id == p(99)));
    assert!(started.elapsed() < Duration::from_secs(10));
}

/// Delegates to a real table but panics when queried from a runtime worker,
/// so whichever actor handles the first message blows up.
#[derive(Debug)]
struct PanicInActors(CostTable);

impl EdgeCosts for PanicInActors {
    fn processes(&self) -> &[ProcessId] {
        self.0.processes()
    }

    fn cost(&self, a: ProcessId, b: ProcessId) -> Option<f64> {
        if std::thread::current().name() == Some("tokio-runtime-worker") {
            panic!("cost table lookup failed for {a}-{b}");
        }
        self.0.cost(a, b)
    }

    fn neighbors(&self, id: ProcessId) -> Vec<(ProcessId, f64)> {
        self.0.neighbors(id)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_actor_panic_fails_the_run_without_waiting_for_the_timeout() {
    let config = ElectionConfig {
        actor_timeout_ms: 60_000,
        ..ElectionConfig::default()
    };
    let started = Instant::now();
    let outcome = run_actors(Arc::new(PanicInActors(four_processes())), config).await;
    assert!(matches!(outcome, Err(SimulationError::ActorFailed(_))), "{outcome:?}");
    assert!(started.elapsed() < Duration::from_secs(10));
}
