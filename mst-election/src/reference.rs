//! Centralized reference algorithms used to check distributed runs.

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::EdgeCosts;
use crate::types::{EdgeKey, LeaderMethod, ProcessId};

/// Total weight of a minimum spanning tree (Prim)
pub fn prim_mst_weight(costs: &dyn EdgeCosts) -> f64 {
    let processes = costs.processes();
    let Some(&start) = processes.first() else {
        return 0.0;
    };

    let mut in_tree = BTreeSet::from([start]);
    let mut frontier: BTreeSet<EdgeKey> = costs
        .neighbors(start)
        .into_iter()
        .map(|(n, w)| EdgeKey::new(start, n, w))
        .collect();
    let mut total = 0.0;

    while in_tree.len() < processes.len() {
        let Some(edge) = frontier.pop_first() else { break };
        let next = if in_tree.contains(&edge.lo) { edge.hi } else { edge.lo };
        if !in_tree.insert(next) {
            continue;
        }
        total += edge.weight;
        for (n, w) in costs.neighbors(next) {
            if !in_tree.contains(&n) {
                frontier.insert(EdgeKey::new(next, n, w));
            }
        }
    }
    total
}

/// All-pairs shortest distances (Floyd–Warshall)
pub fn floyd_warshall(costs: &dyn EdgeCosts) -> BTreeMap<(ProcessId, ProcessId), f64> {
    let nodes = costs.processes();
    let mut dist = BTreeMap::new();
    for &u in nodes {
        for &v in nodes {
            let d = if u == v {
                0.0
            } else {
                costs.cost(u, v).unwrap_or(f64::INFINITY)
            };
            dist.insert((u, v), d);
        }
    }
    for &k in nodes {
        for &i in nodes {
            for &j in nodes {
                let through = dist[&(i, k)] + dist[&(k, j)];
                if through < dist[&(i, j)] {
                    dist.insert((i, j), through);
                }
            }
        }
    }
    dist
}

/// Scores every process by `method` over exact distances
pub fn leader_scores(costs: &dyn EdgeCosts, method: LeaderMethod) -> BTreeMap<ProcessId, f64> {
    let dist = floyd_warshall(costs);
    costs
        .processes()
        .iter()
        .map(|&u| {
            let others = costs
                .processes()
                .iter()
                .filter(|v| **v != u)
                .map(|v| dist[&(u, *v)]);
            let score = match method {
                LeaderMethod::Sum => others.sum(),
                LeaderMethod::Max => others.fold(0.0, f64::max),
            };
            (u, score)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::CostTable;

    #[test]
    fn prim_on_a_square() {
        let p = ProcessId;
        let table = CostTable::from_edges(
            [p(1), p(2), p(3), p(4)],
            [
                (p(1), p(2), 1.0),
                (p(2), p(3), 2.0),
                (p(3), p(4), 1.0),
                (p(4), p(1), 5.0),
                (p(1), p(3), 4.0),
            ],
        )
        .unwrap();
        assert_eq!(prim_mst_weight(&table), 4.0);
        let dist = floyd_warshall(&table);
        assert_eq!(dist[&(p(1), p(4))], 4.0);
        assert_eq!(dist[&(p(4), p(4))], 0.0);
    }
}
