use argh::FromArgs;
use mst_election::config::Schedule;
use mst_election::LeaderMethod;

#[derive(FromArgs, PartialEq, Debug)]
/// Leader election over a distributed minimum spanning tree.
pub struct TopLevel {
    #[argh(subcommand)]
    pub nested: Subcommands,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub enum Subcommands {
    Run(Run),
    Generate(Generate),
}

#[derive(FromArgs, PartialEq, Debug)]
/// Run one election and print the report
#[argh(subcommand, name = "run")]
pub struct Run {
    #[argh(option)]
    /// graph file (JSON); a random complete graph is used when absent
    pub graph: Option<String>,
    #[argh(option, default = "8")]
    /// number of processes in the random graph (default 8)
    pub nodes: usize,
    #[argh(option, default = "0")]
    /// seed for the random graph (default 0)
    pub seed: u64,
    #[argh(option)]
    /// configuration file (JSON); flags below override it
    pub config: Option<String>,
    #[argh(option, from_str_fn(parse_strategy))]
    /// structural or shortest-path
    pub strategy: Option<StrategyKind>,
    #[argh(option, from_str_fn(parse_method))]
    /// leader metric in shortest-path mode: sum or max
    pub method: Option<LeaderMethod>,
    #[argh(switch)]
    /// wake every process instead of only the lowest id
    pub wake_all: bool,
    #[argh(option, from_str_fn(parse_schedule))]
    /// delivery order: round-robin or random
    pub schedule: Option<ScheduleKind>,
    #[argh(option, default = "0")]
    /// seed for the random schedule (default 0)
    pub schedule_seed: u64,
    #[argh(switch)]
    /// run one tokio task per process instead of the deterministic network
    pub actors: bool,
    #[argh(switch)]
    /// print the report and logs as JSON
    pub json: bool,
    #[argh(switch)]
    /// check the tree and leader invariants after the run
    pub verify: bool,
}

#[derive(FromArgs, PartialEq, Debug)]
/// Write a random complete graph as JSON
#[argh(subcommand, name = "generate")]
pub struct Generate {
    #[argh(option)]
    /// number of processes
    pub nodes: usize,
    #[argh(option, default = "0")]
    /// random seed (default 0)
    pub seed: u64,
    #[argh(option)]
    /// output file; stdout when absent
    pub out: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StrategyKind {
    Structural,
    ShortestPath,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ScheduleKind {
    RoundRobin,
    Random,
}

impl ScheduleKind {
    pub fn with_seed(self, seed: u64) -> Schedule {
        match self {
            ScheduleKind::RoundRobin => Schedule::RoundRobin,
            ScheduleKind::Random => Schedule::Random { seed },
        }
    }
}

fn parse_strategy(value: &str) -> Result<StrategyKind, String> {
    match value {
        "structural" => Ok(StrategyKind::Structural),
        "shortest-path" => Ok(StrategyKind::ShortestPath),
        other => Err(format!("unknown strategy {other:?}, expected structural or shortest-path")),
    }
}

fn parse_method(value: &str) -> Result<LeaderMethod, String> {
    match value {
        "sum" => Ok(LeaderMethod::Sum),
        "max" => Ok(LeaderMethod::Max),
        other => Err(format!("unknown method {other:?}, expected sum or max")),
    }
}

fn parse_schedule(value: &str) -> Result<ScheduleKind, String> {
    match value {
        "round-robin" => Ok(ScheduleKind::RoundRobin),
        "random" => Ok(ScheduleKind::Random),
        other => Err(format!("unknown schedule {other:?}, expected round-robin or random")),
    }
}
