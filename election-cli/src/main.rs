mod cli;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rand::{rngs::StdRng, SeedableRng};

use cli::{Generate, Run, StrategyKind, Subcommands, TopLevel};
use mst_election::actor::run_actors;
use mst_election::config::{load_graph, WakePolicy};
use mst_election::format::format_process_id;
use mst_election::{
    CostTable, EdgeCosts, ElectionConfig, ElectionStrategy, LeaderMethod, Network, ProcessId, RunReport,
};

fn main() -> Result<()> {
    let args: TopLevel = argh::from_env();
    match args.nested {
        Subcommands::Run(run) => run_election(run),
        Subcommands::Generate(generate) => generate_graph(generate),
    }
}

/// File config first, then flags on top
fn build_config(run: &Run) -> Result<ElectionConfig> {
    let mut config = match &run.config {
        Some(path) => ElectionConfig::from_json_file(path)?,
        None => ElectionConfig::default(),
    };

    let current_method = match config.strategy {
        ElectionStrategy::ShortestPath { method } => Some(method),
        ElectionStrategy::Structural => None,
    };
    config.strategy = match (run.strategy, run.method, current_method) {
        (Some(StrategyKind::Structural), Some(_), _) => {
            bail!("--method only applies to the shortest-path strategy")
        }
        (Some(StrategyKind::Structural), None, _) => ElectionStrategy::Structural,
        (Some(StrategyKind::ShortestPath), method, current) => ElectionStrategy::ShortestPath {
            method: method.or(current).unwrap_or_default(),
        },
        (None, Some(method), Some(_)) => ElectionStrategy::ShortestPath { method },
        (None, Some(_), None) => bail!("--method needs --strategy shortest-path"),
        (None, None, _) => config.strategy,
    };

    if run.wake_all {
        config.wake = WakePolicy::All;
    }
    if let Some(kind) = run.schedule {
        config.schedule = kind.with_seed(run.schedule_seed);
    }
    Ok(config)
}

fn run_election(run: Run) -> Result<()> {
    mst_election::tracing_setup::init(run.json);
    let config = build_config(&run)?;

    let table = match &run.graph {
        Some(path) => load_graph(path)?,
        None => CostTable::random_complete(run.nodes, &mut StdRng::seed_from_u64(run.seed))
            .context("generating a random graph")?,
    };
    let costs: Arc<dyn EdgeCosts> = Arc::new(table);
    tracing::info!(processes = costs.processes().len(), strategy = ?config.strategy, "starting election");

    let (report, violations) = if run.actors {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("starting the tokio runtime")?;
        let outcome = runtime.block_on(run_actors(costs, config))?;
        let violations = outcome.verify();
        (outcome.report, violations)
    } else {
        let mut network = Network::new(costs, config)?;
        let report = network.run()?;
        (report, network.verify())
    };

    if run.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if run.verify {
        if !violations.is_empty() {
            for violation in &violations {
                eprintln!("invariant violated: {violation}");
            }
            bail!("{} invariant violations", violations.len());
        }
        eprintln!("all invariants hold");
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    let show = |id: Option<ProcessId>| id.as_ref().map(format_process_id).unwrap_or_else(|| "-".to_string());

    println!("leader:      {}", show(report.leader));
    println!("tree root:   {}", show(report.tree_root));
    match report.strategy {
        ElectionStrategy::Structural => println!("strategy:    structural"),
        ElectionStrategy::ShortestPath { method } => println!(
            "strategy:    shortest path ({})",
            match method {
                LeaderMethod::Sum => "sum",
                LeaderMethod::Max => "max",
            }
        ),
    }
    println!("tree weight: {:.3} over {} edges", report.tree_weight, report.tree_edges.len());
    println!(
        "messages:    {} in {} steps, {} deferred, total cost {:.3}",
        report.traffic.total(),
        report.steps,
        report.traffic.deferrals,
        report.traffic.total_cost
    );
    for (kind, count) in &report.traffic.by_kind {
        println!("  {:<12} {count}", kind.as_str());
    }
    println!("processes:");
    for process in &report.processes {
        println!(
            "  {:<6} parent {:<6} children {:<3} next hop {}",
            format_process_id(&process.id),
            show(process.parent),
            process.children.len(),
            show(process.next_hop_to_leader)
        );
    }
}

fn generate_graph(generate: Generate) -> Result<()> {
    let table = CostTable::random_complete(generate.nodes, &mut StdRng::seed_from_u64(generate.seed))
        .context("generating a random graph")?;
    let json = table.to_json_pretty();
    match generate.out {
        Some(path) => std::fs::write(&path, json).with_context(|| format!("writing {path}"))?,
        None => println!("{json}"),
    }
    Ok(())
}
