//! Stencil Accelerator Optimizer - Command Line Interface
//!
//! Usage:
//!   stencil-opt optimize [OPTIONS]     Optimize a sweep of design points
//!   stencil-opt point <...>            Optimize a single design point
//!   stencil-opt board <NAME>           Optimize a known board
//!   stencil-opt boards                 List known boards
//!   stencil-opt reload <FILE>          Summarize a file of optimized records
//!   stencil-opt init-config <FILE>     Write the default configuration

use clap::{Parser, Subcommand};
use colored::*;
use log::info;

use stencil_dse::prelude::*;
use stencil_dse::record;

#[derive(Parser)]
#[command(name = "stencil-opt")]
#[command(about = "Design space optimizer for pipelined stencil accelerators")]
#[command(version)]
struct Cli {
    /// Output results in JSON format (for machine parsing)
    #[arg(long, global = true)]
    json: bool,

    /// Optimizer configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Override the number of worker threads
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize every combination of the given ranges
    Optimize {
        /// Frequency in MHz: a value or start,stop,step
        #[arg(long)]
        frequency: ParameterRange<f64>,

        /// Bandwidth in GB/s: a value or start,stop,step
        #[arg(long)]
        bandwidth: ParameterRange<f64>,

        /// Compute units: a value or start,stop,step
        #[arg(long)]
        compute: ParameterRange<usize>,

        /// BRAM blocks: a value or start,stop,step
        #[arg(long)]
        bram: ParameterRange<usize>,

        /// Elements per BRAM block
        #[arg(long, default_value = "512")]
        bram_depth: usize,

        /// Write optimized records to this CSV file
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Optimize a single design point
    Point {
        /// Compute units
        compute: usize,
        /// BRAM blocks
        bram: usize,
        /// Elements per BRAM block
        bram_depth: usize,
        /// Bandwidth in GB/s
        bandwidth: f64,
        /// Frequency in MHz
        frequency: f64,
    },

    /// Optimize a known board
    Board {
        /// Board name (see `boards`)
        name: String,

        /// Elements per BRAM block
        #[arg(long, default_value = "512")]
        bram_depth: usize,
    },

    /// List known boards
    Boards,

    /// Load optimized records and print them
    Reload {
        /// CSV file written by `optimize --output`
        path: String,
    },

    /// Write the default configuration to a TOML file
    InitConfig {
        path: String,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let json_output = cli.json;
    let mut config = match &cli.config {
        Some(path) => OptimizerConfig::load(path)?,
        None => OptimizerConfig::default(),
    };
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }

    match cli.command {
        Commands::Optimize { frequency, bandwidth, compute, bram, bram_depth, output } => {
            let space = DesignSpace::from_ranges(&frequency, &bandwidth, &compute, &bram, bram_depth);
            run_batch(config, &space, output.as_deref(), json_output)
        }
        Commands::Point { compute, bram, bram_depth, bandwidth, frequency } => {
            let point = DesignPoint::new(compute, bram, bram_depth, bandwidth, frequency);
            run_single(config, &point, json_output)
        }
        Commands::Board { name, bram_depth } => {
            let board = Board::find(&name).ok_or_else(|| {
                Error::invalid_input("board", format!("unknown board '{}'", name))
            })?;
            if !json_output {
                println!("Board {}: {} MHz, {} GB/s, {} compute, {} BRAM",
                         board.name.cyan(), board.frequency, board.bandwidth, board.compute, board.bram);
            }
            run_single(config, &board.design_point(bram_depth), json_output)
        }
        Commands::Boards => {
            show_boards(json_output);
            Ok(())
        }
        Commands::Reload { path } => run_reload(&path, config.bytes_per_element, json_output),
        Commands::InitConfig { path } => {
            config.save(&path)?;
            println!("Wrote configuration to {}", path.green());
            Ok(())
        }
    }
}

fn print_banner(title: &str) {
    println!("{}", "╔══════════════════════════════════════════════════════════════╗".cyan());
    println!("{}", format!("║  {:<60}║", title).cyan());
    println!("{}", "╚══════════════════════════════════════════════════════════════╝".cyan());
    println!();
}

fn run_single(config: OptimizerConfig, point: &DesignPoint, json_output: bool) -> Result<()> {
    let bytes_per_element = config.bytes_per_element;
    let optimizer = Optimizer::new(config)?;
    let optimized = optimizer.optimize(point)?;

    if json_output {
        print_json(&optimized);
        return Ok(());
    }

    print_banner("Stencil Configuration Optimizer");
    if optimized.result.is_feasible() {
        println!("{}", optimized.report(bytes_per_element));
    } else {
        println!("{}", "No configuration fits the BRAM and bandwidth budgets.".yellow());
    }
    Ok(())
}

fn run_batch(config: OptimizerConfig, space: &DesignSpace, output: Option<&str>, json_output: bool) -> Result<()> {
    let points = space.enumerate();
    let optimizer = Optimizer::new(config)?;
    info!("enumerated {} design points", points.len());

    if !json_output {
        print_banner("Design Space Optimization");
        println!("Optimizing {} design points...", points.len());
    }

    let results = if json_output {
        optimizer.optimize_batch(&points)?
    } else {
        let results = optimizer.optimize_batch_with_progress(&points, |current, total| {
            print!("\rProgress: {}/{} ({:.1}%)", current, total,
                   100.0 * current as f64 / total as f64);
            use std::io::Write;
            let _ = std::io::stdout().flush();
        })?;
        println!();
        results
    };

    if let Some(path) = output {
        record::save_optimized(path, &results)?;
        info!("wrote {} records to {}", results.len(), path);
    }

    if json_output {
        print_json(&results);
        return Ok(());
    }

    if results.len() > 10 {
        println!("{}", format!("Successfully optimized {} configurations.", results.len()).green());
    } else {
        println!("{}", format!("Successfully optimized {} configuration(s):", results.len()).green());
        print_table(&results);
    }
    Ok(())
}

fn run_reload(path: &str, bytes_per_element: usize, json_output: bool) -> Result<()> {
    let optimized = record::load_optimized(path)?;

    if json_output {
        print_json(&optimized);
        return Ok(());
    }

    print_banner("Optimized Records");
    println!("Loaded {} optimized points from {}", optimized.len(), path);
    print_table(&optimized);

    if let Some(best) = optimized
        .iter()
        .max_by(|a, b| a.result.throughput.total_cmp(&b.result.throughput))
    {
        println!();
        println!("{}", "BEST POINT".green());
        println!("{}", best.report(bytes_per_element));
    }
    Ok(())
}

fn print_table(points: &[OptimizedPoint]) {
    println!("──────────────────────────────────────────────────────────────────────────────────");
    println!("{:>8} {:>7} {:>8} {:>8} {:>6} {:>6} {:>6} {:>7} {:>10} {:>10}",
             "Compute", "BRAM", "BW", "MHz", "Width", "Depth", "Tile", "BRAM#", "GStencil/s", "GOp/s");
    println!("──────────────────────────────────────────────────────────────────────────────────");
    for opt in points {
        let line = format!("{:>8} {:>7} {:>8.2} {:>8.1} {:>6} {:>6} {:>6} {:>7} {:>10.3} {:>10.3}",
                           opt.point.compute_budget,
                           opt.point.bram_budget,
                           opt.point.bandwidth,
                           opt.point.frequency,
                           opt.result.width,
                           opt.result.depth,
                           opt.result.tile_size,
                           opt.bram_used(),
                           opt.performance_gstencils(),
                           opt.performance_gops());
        if opt.result.is_feasible() {
            println!("{}", line);
        } else {
            println!("{}", line.dimmed());
        }
    }
}

fn show_boards(json_output: bool) {
    let boards = Board::presets();
    if json_output {
        print_json(&boards);
        return;
    }

    println!("{:<12} {:>8} {:>10} {:>8} {:>8}", "Board", "MHz", "GB/s", "Compute", "BRAM");
    println!("──────────────────────────────────────────────────");
    for board in &boards {
        println!("{:<12} {:>8.1} {:>10.2} {:>8} {:>8}",
                 board.name, board.frequency, board.bandwidth, board.compute, board.bram);
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("{{\"error\": \"{}\"}}", e),
    }
}
