//! Symmetric edge-cost tables.
//!
//! Processes only ever read the table, through the [`EdgeCosts`] trait, and
//! every process of a run shares the same instance.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::types::{EdgeKey, ProcessId};

/// Read-only view of the network's weighted links
pub trait EdgeCosts: fmt::Debug + Send + Sync {
    /// Every process in the network, in ascending id order
    fn processes(&self) -> &[ProcessId];

    /// Weight of the link between `a` and `b`, if they are neighbors
    fn cost(&self, a: ProcessId, b: ProcessId) -> Option<f64>;

    /// The incident edges of `id`
    fn neighbors(&self, id: ProcessId) -> Vec<(ProcessId, f64)>;

    fn edge_key(&self, a: ProcessId, b: ProcessId) -> Option<EdgeKey> {
        self.cost(a, b).map(|w| EdgeKey::new(a, b, w))
    }
}

/// An edge as written in a graph file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub a: ProcessId,
    pub b: ProcessId,
    pub weight: f64,
}

/// Serialized form of a [`CostTable`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    pub processes: Vec<ProcessId>,
    pub edges: Vec<EdgeSpec>,
}

/// Adjacency-map cost table.
///
/// Always symmetric: inserting `a-b` also inserts `b-a`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GraphSpec", into = "GraphSpec")]
pub struct CostTable {
    processes: Vec<ProcessId>,
    costs: BTreeMap<ProcessId, BTreeMap<ProcessId, f64>>,
}

impl CostTable {
    pub fn new(processes: impl IntoIterator<Item = ProcessId>) -> Result<Self, GraphError> {
        let mut seen = BTreeSet::new();
        for id in processes {
            if !seen.insert(id) {
                return Err(GraphError::DuplicateProcess(id));
            }
        }
        let costs = seen.iter().map(|id| (*id, BTreeMap::new())).collect();
        Ok(CostTable {
            processes: seen.into_iter().collect(),
            costs,
        })
    }

    pub fn insert_edge(&mut self, a: ProcessId, b: ProcessId, weight: f64) -> Result<(), GraphError> {
        if a == b {
            return Err(GraphError::SelfLoop(a));
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(GraphError::InvalidWeight { a, b, weight });
        }
        if !self.costs.contains_key(&a) || !self.costs.contains_key(&b) {
            return Err(GraphError::UnknownEndpoint { a, b });
        }
        if let Some(first) = self.cost(a, b) {
            if first != weight {
                return Err(GraphError::AsymmetricWeight {
                    a,
                    b,
                    first,
                    second: weight,
                });
            }
        }
        self.costs.entry(a).or_default().insert(b, weight);
        self.costs.entry(b).or_default().insert(a, weight);
        Ok(())
    }

    /// Builds and validates a table from an explicit edge list
    pub fn from_edges(
        processes: impl IntoIterator<Item = ProcessId>,
        edges: impl IntoIterator<Item = (ProcessId, ProcessId, f64)>,
    ) -> Result<Self, GraphError> {
        let mut table = CostTable::new(processes)?;
        for (a, b, w) in edges {
            table.insert_edge(a, b, w)?;
        }
        validate_topology(&table)?;
        Ok(table)
    }

    /// A complete graph over `n` distinct random ids with weights in `[0, 10)`
    pub fn random_complete<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Result<Self, GraphError> {
        let id_space = (n as u64 * 100).max(1000);
        let mut ids = BTreeSet::new();
        while ids.len() < n {
            ids.insert(ProcessId(rng.gen_range(0..id_space)));
        }
        let ids: Vec<_> = ids.into_iter().collect();
        let mut table = CostTable::new(ids.iter().copied())?;
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[..i] {
                table.insert_edge(*a, *b, rng.gen_range(0.0..10.0))?;
            }
        }
        validate_topology(&table)?;
        Ok(table)
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> String {
        // Weights are validated finite, so this cannot fail
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Every undirected edge once, as `(lo, hi, weight)`
    pub fn edges(&self) -> Vec<(ProcessId, ProcessId, f64)> {
        self.costs
            .iter()
            .flat_map(|(a, row)| {
                row.iter()
                    .filter(move |(b, _)| a < *b)
                    .map(move |(b, w)| (*a, *b, *w))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

impl EdgeCosts for CostTable {
    fn processes(&self) -> &[ProcessId] {
        &self.processes
    }

    fn cost(&self, a: ProcessId, b: ProcessId) -> Option<f64> {
        self.costs.get(&a).and_then(|row| row.get(&b)).copied()
    }

    fn neighbors(&self, id: ProcessId) -> Vec<(ProcessId, f64)> {
        self.costs
            .get(&id)
            .map(|row| row.iter().map(|(b, w)| (*b, *w)).collect())
            .unwrap_or_default()
    }
}

impl TryFrom<GraphSpec> for CostTable {
    type Error = GraphError;

    fn try_from(spec: GraphSpec) -> Result<Self, Self::Error> {
        CostTable::from_edges(
            spec.processes,
            spec.edges.into_iter().map(|e| (e.a, e.b, e.weight)),
        )
    }
}

impl From<CostTable> for GraphSpec {
    fn from(table: CostTable) -> Self {
        GraphSpec {
            edges: table
                .edges()
                .into_iter()
                .map(|(a, b, weight)| EdgeSpec { a, b, weight })
                .collect(),
            processes: table.processes,
        }
    }
}

/// Checks that a network can run an election: two or more processes, all
/// reachable from one another.
pub fn validate_topology(costs: &dyn EdgeCosts) -> Result<(), GraphError> {
    let processes = costs.processes();
    if processes.len() < 2 {
        return Err(GraphError::TooFewProcesses(processes.len()));
    }

    let start = processes[0];
    let mut reached = BTreeSet::from([start]);
    let mut frontier = VecDeque::from([start]);
    while let Some(id) = frontier.pop_front() {
        for (next, _) in costs.neighbors(id) {
            if reached.insert(next) {
                frontier.push_back(next);
            }
        }
    }

    let unreachable: Vec<_> = processes
        .iter()
        .filter(|id| !reached.contains(id))
        .copied()
        .collect();
    if !unreachable.is_empty() {
        return Err(GraphError::Disconnected {
            from: start,
            unreachable,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn p(id: u64) -> ProcessId {
        ProcessId(id)
    }

    #[test]
    fn table_is_symmetric() {
        let table = CostTable::from_edges([p(1), p(2), p(3)], [(p(1), p(2), 1.5), (p(2), p(3), 2.0)]).unwrap();
        assert_eq!(table.cost(p(2), p(1)), Some(1.5));
        assert_eq!(table.cost(p(3), p(2)), Some(2.0));
        assert_eq!(table.cost(p(1), p(3)), None);
        assert_eq!(table.neighbors(p(2)), vec![(p(1), 1.5), (p(3), 2.0)]);
    }

    #[test]
    fn rejects_bad_tables() {
        assert_eq!(
            CostTable::from_edges([p(1)], std::iter::empty()),
            Err(GraphError::TooFewProcesses(1))
        );
        assert_eq!(
            CostTable::from_edges([p(1), p(2)], [(p(1), p(2), -1.0)]),
            Err(GraphError::InvalidWeight {
                a: p(1),
                b: p(2),
                weight: -1.0
            })
        );
        assert_eq!(
            CostTable::from_edges([p(1), p(2), p(3)], [(p(1), p(2), 1.0)]),
            Err(GraphError::Disconnected {
                from: p(1),
                unreachable: vec![p(3)]
            })
        );
        assert_eq!(
            CostTable::from_edges([p(1), p(2)], [(p(1), p(2), 1.0), (p(2), p(1), 2.0)]),
            Err(GraphError::AsymmetricWeight {
                a: p(2),
                b: p(1),
                first: 1.0,
                second: 2.0
            })
        );
        assert_eq!(CostTable::new([p(4), p(4)]), Err(GraphError::DuplicateProcess(p(4))));
    }

    #[test]
    fn parses_graph_files() {
        let json = r#"{
            "processes": [10, 20, 30],
            "edges": [
                {"a": 10, "b": 20, "weight": 3.0},
                {"a": 20, "b": 30, "weight": 4.0},
                {"a": 10, "b": 30, "weight": 1.0}
            ]
        }"#;
        let table = CostTable::from_json_str(json).unwrap();
        assert_eq!(table.processes(), &[p(10), p(20), p(30)]);
        assert_eq!(table.cost(p(30), p(10)), Some(1.0));

        let disconnected = r#"{"processes": [1, 2, 3], "edges": [{"a": 1, "b": 2, "weight": 1.0}]}"#;
        assert!(CostTable::from_json_str(disconnected).is_err());
    }

    #[test]
    fn random_tables_are_complete() {
        let mut rng = StdRng::seed_from_u64(7);
        let table = CostTable::random_complete(6, &mut rng).unwrap();
        assert_eq!(table.len(), 6);
        assert_eq!(table.edges().len(), 15);
        for (_, _, w) in table.edges() {
            assert!((0.0..10.0).contains(&w));
        }
    }
}
