use std::path::{Path, PathBuf};

use beamsaw::render;
use beamsaw::solver::Optimizer;
use beamsaw::types::{OptimizeConfig, PartRequest, PartialBoardSaving, PlacementResult, Strategy};
use beamsaw::upgrade::UpgradeSequence;
use beamsaw::MaterialCatalog;
use clap::Parser;
use serde::Deserialize;
use tracing::Level;

#[derive(Parser)]
#[command(name = "beamsaw", about = "Guillotine panel-cutting optimizer for beam saws")]
struct Cli {
    /// Job file (JSON) with catalog, parts and optional settings
    #[arg(long)]
    job: PathBuf,

    /// Blade kerf in mm (overrides the job file)
    #[arg(long)]
    kerf: Option<f64>,

    /// Placement strategy: fast, best_fit, skyline, shelf, or multi
    #[arg(long, value_parser = parse_strategy)]
    strategy: Option<Strategy>,

    /// Upgrade sequence as comma-separated core names (e.g. 18MR,18BWR)
    #[arg(long)]
    upgrades: Option<String>,

    /// Show ASCII layout of each board
    #[arg(long)]
    layout: bool,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,

    /// Log debug events to stderr
    #[arg(long)]
    verbose: bool,
}

#[derive(Deserialize)]
struct Job {
    catalog: MaterialCatalog,
    parts: Vec<PartRequest>,
    #[serde(default)]
    upgrade_sequence: Vec<String>,
    kerf: Option<f64>,
    strategy: Option<Strategy>,
}

fn parse_strategy(s: &str) -> Result<Strategy, String> {
    s.parse()
}

fn load_job(path: &Path) -> Result<Job, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid job file {}: {}", path.display(), e))
}

fn describe_saving(s: &PartialBoardSaving) -> String {
    format!(
        "Partial board: {} keeps {:.0}x{:.0} offcut, credit {:.0}% of a board, value {:.2}",
        s.board_id,
        s.offcut.length,
        s.offcut.width,
        s.credit * 100.0,
        s.value
    )
}

fn print_result(result: &PlacementResult, layout: bool) {
    for board in &result.boards {
        println!(
            "Board {} [{}] {}x{}, {:.1}% used:",
            board.id, board.material, board.length, board.width, board.utilization
        );
        for part in &board.parts {
            let Some(p) = part.placement.as_ref() else {
                continue;
            };
            let rot = if p.rotated { " [rotated]" } else { "" };
            println!(
                "  {} {}x{} @ ({}, {}){}",
                part.id, part.length, part.width, p.x, p.y, rot
            );
        }
        if layout {
            print!("{}", render::render_board(board));
        }
        println!();
    }

    for u in &result.unplaced {
        println!("Unplaced: {} {}x{} ({})", u.part.id, u.part.length, u.part.width, u.reason);
    }
    for r in &result.rejected {
        println!("Rejected: {} ({})", r.id, r.reason);
    }
    for u in &result.upgrade_log {
        println!("Upgraded: {} {} -> {}", u.part_id, u.from, u.to);
    }
    for s in &result.partial_savings {
        println!("{}", describe_saving(s));
    }

    let summary = result.summary();
    println!(
        "Summary: {} board{} used, {:.1}% utilization, cost {:.2} (baseline {:.2}, saved {:.2})",
        result.board_count(),
        if result.board_count() == 1 { "" } else { "s" },
        summary.utilization,
        result.net_cost(),
        result.baseline_cost,
        summary.savings,
    );
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    let job = load_job(&cli.job).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    let mut config = OptimizeConfig {
        upgrade_sequence: job.upgrade_sequence,
        ..OptimizeConfig::default()
    };
    if let Some(kerf) = cli.kerf.or(job.kerf) {
        config.kerf = kerf;
    }
    if let Some(strategy) = cli.strategy.or(job.strategy) {
        config.strategy = strategy;
    }
    if let Some(text) = &cli.upgrades {
        config.upgrade_sequence = UpgradeSequence::parse(text).0;
    }

    let optimizer = Optimizer::new(job.catalog, config);
    let result = optimizer.optimize(&job.parts).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    if cli.json {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        print_result(&result, cli.layout);
    }
}
