use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SimulationError};
use crate::types::{ElectionStrategy, ProcessId};

/// Which processes get the external wakeup
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakePolicy {
    /// The lowest id only; the rest wake on their first message
    #[default]
    First,
    All,
    One(ProcessId),
}

/// How the deterministic harness picks the next process to deliver to
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    #[default]
    RoundRobin,
    Random { seed: u64 },
}

/// Settings for one election run
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    pub strategy: ElectionStrategy,
    pub wake: WakePolicy,
    pub schedule: Schedule,
    /// Harness gives up after this many deliveries
    pub max_steps: usize,
    /// Wall-clock bound for the actor runtime
    pub actor_timeout_ms: u64,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        ElectionConfig {
            strategy: ElectionStrategy::default(),
            wake: WakePolicy::default(),
            schedule: Schedule::default(),
            max_steps: 1_000_000,
            actor_timeout_ms: 30_000,
        }
    }
}

impl ElectionConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    /// The processes to wake, in the order they should be woken.
    ///
    /// Naming a process that is not in `processes` is an error.
    pub fn wake_targets(&self, processes: &[ProcessId]) -> Result<Vec<ProcessId>, SimulationError> {
        match self.wake {
            WakePolicy::First => Ok(processes.iter().min().copied().into_iter().collect()),
            WakePolicy::All => Ok(processes.to_vec()),
            WakePolicy::One(id) if processes.contains(&id) => Ok(vec![id]),
            WakePolicy::One(id) => Err(SimulationError::UnknownProcess(id)),
        }
    }
}

/// Reads a cost table from a JSON graph file
pub fn load_graph(path: impl AsRef<Path>) -> Result<crate::graph::CostTable, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    crate::graph::CostTable::from_json_str(&text).map_err(|source| ConfigError::Json {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LeaderMethod;

    #[test]
    fn missing_fields_use_defaults() {
        let config: ElectionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ElectionConfig::default());
        assert_eq!(config.max_steps, 1_000_000);
    }

    #[test]
    fn parses_every_option() {
        let json = r#"{
            "strategy": {"kind": "shortest_path", "method": "max"},
            "wake": {"one": 7},
            "schedule": {"random": {"seed": 42}},
            "max_steps": 500
        }"#;
        let config: ElectionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.strategy,
            ElectionStrategy::ShortestPath {
                method: LeaderMethod::Max
            }
        );
        assert_eq!(config.wake, WakePolicy::One(ProcessId(7)));
        assert_eq!(config.schedule, Schedule::Random { seed: 42 });
        assert_eq!(config.max_steps, 500);
        assert_eq!(config.actor_timeout_ms, 30_000);
    }

    #[test]
    fn wake_targets() {
        let ids = [ProcessId(3), ProcessId(1), ProcessId(2)];
        let mut config = ElectionConfig::default();
        assert_eq!(config.wake_targets(&ids).unwrap(), vec![ProcessId(1)]);
        config.wake = WakePolicy::One(ProcessId(2));
        assert_eq!(config.wake_targets(&ids).unwrap(), vec![ProcessId(2)]);
        config.wake = WakePolicy::One(ProcessId(9));
        assert!(matches!(
            config.wake_targets(&ids),
            Err(SimulationError::UnknownProcess(id)) if id == ProcessId(9)
        ));
        config.wake = WakePolicy::All;
        assert_eq!(config.wake_targets(&ids).unwrap().len(), 3);
    }
}
