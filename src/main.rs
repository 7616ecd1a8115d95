//! TSP exact solver - Command Line Interface
//!
//! Solves TSP instances to optimality with DFJ (enumerated or lazy) or MTZ
//! subtour elimination, benchmarks the strategies and analyzes instances.

use clap::{Parser, Subcommand, ValueEnum};
use tsp_exact_solver::benchmark::{load_instances_from_dir, Benchmark, BenchmarkConfig};
use tsp_exact_solver::error::{TspError, TspResult};
use tsp_exact_solver::exact::{BackendKind, Formulation, SolveOutcome, SolverConfig, Strategy, TspSolver};
use tsp_exact_solver::heuristics::construction::*;
use tsp_exact_solver::heuristics::local_search::*;
use tsp_exact_solver::instance::{DistanceMetric, TspInstance};

use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "tsp-exact-solver")]
#[command(version = "1.0")]
#[command(about = "Exact TSP solver comparing DFJ and MTZ subtour elimination")]
struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve one instance to optimality
    Solve {
        /// TSP-LIB file or JSON arc table
        #[arg(short, long)]
        instance: PathBuf,

        /// Subtour elimination strategy
        #[arg(short, long, value_enum, default_value = "lazy")]
        strategy: StrategyArg,

        /// Label of the location anchored at position 1 by MTZ (default: first location)
        #[arg(long)]
        mtz_start: Option<String>,

        /// MIP backend
        #[arg(short, long, value_enum, default_value = "microlp")]
        backend: BackendKind,

        /// Distance metric for coordinate files (default: from EDGE_WEIGHT_TYPE)
        #[arg(short, long, value_enum)]
        metric: Option<MetricArg>,

        /// Time limit in seconds
        #[arg(short, long, default_value = "3600")]
        time_limit: f64,

        /// MIP gap tolerance
        #[arg(long, default_value = "1e-6")]
        mip_gap: f64,

        /// Backend threads (0 = automatic)
        #[arg(long, default_value = "0")]
        threads: i32,

        /// Seed the solver with a heuristic tour
        #[arg(long)]
        warm_start: bool,

        /// Write the result as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Where the IIS of an infeasible model is written
        #[arg(long, default_value = "iis.ilp")]
        iis: PathBuf,

        /// Write the formulation in LP format before solving
        #[arg(long)]
        write_lp: Option<PathBuf>,
    },

    /// Run every strategy on a directory of instances
    Benchmark {
        /// Directory containing instance files
        #[arg(short, long)]
        dir: PathBuf,

        /// Strategies to compare
        #[arg(short, long, value_enum, value_delimiter = ',', default_value = "enumerated,lazy,mtz")]
        strategies: Vec<StrategyArg>,

        /// MIP backend
        #[arg(short, long, value_enum, default_value = "microlp")]
        backend: BackendKind,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Time limit per solve
        #[arg(short, long, default_value = "60")]
        time_limit: f64,

        /// Maximum instance size
        #[arg(long)]
        max_size: Option<usize>,

        /// Run solves one after another
        #[arg(long)]
        sequential: bool,
    },

    /// Analyze an instance
    Analyze {
        /// Path to the instance file
        #[arg(short, long)]
        instance: PathBuf,

        #[arg(short, long, value_enum)]
        metric: Option<MetricArg>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum StrategyArg {
    /// DFJ cuts for every location subset, written up front
    Enumerated,
    /// DFJ cuts added by the lazy-constraint callback
    Lazy,
    /// Miller-Tucker-Zemlin position variables
    Mtz,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum MetricArg {
    Euclidean,
    SquaredEuclidean,
    Euc2d,
}

impl From<MetricArg> for DistanceMetric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::Euclidean => DistanceMetric::Euclidean,
            MetricArg::SquaredEuclidean => DistanceMetric::SquaredEuclidean,
            MetricArg::Euc2d => DistanceMetric::Euc2d,
        }
    }
}

fn strategy_for(arg: StrategyArg, instance: &TspInstance, mtz_start: Option<&str>) -> TspResult<Strategy> {
    Ok(match arg {
        StrategyArg::Enumerated => Strategy::Enumerated,
        StrategyArg::Lazy => Strategy::Lazy,
        StrategyArg::Mtz => {
            let start = match mtz_start {
                Some(label) => instance
                    .index_of(label)
                    .ok_or_else(|| TspError::input(format!("unknown MTZ start location {}", label)))?,
                None => 0,
            };
            Strategy::Mtz { start }
        }
    })
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let outcome = match cli.command {
        Commands::Solve {
            instance,
            strategy,
            mtz_start,
            backend,
            metric,
            time_limit,
            mip_gap,
            threads,
            warm_start,
            output,
            iis,
            write_lp,
        } => {
            let config = SolverConfig {
                time_limit,
                mip_gap,
                threads,
                verbose: cli.verbose,
                iis_path: Some(iis),
                ..SolverConfig::default()
            };
            let options = SolveOptions { strategy, mtz_start, backend, metric, warm_start, output, write_lp };
            solve_instance(&instance, config, options)
        }

        Commands::Benchmark { dir, strategies, backend, output, time_limit, max_size, sequential } => {
            run_benchmark(&dir, &strategies, backend, &output, time_limit, max_size, !sequential)
        }

        Commands::Analyze { instance, metric } => analyze_instance(&instance, metric),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

struct SolveOptions {
    strategy: StrategyArg,
    mtz_start: Option<String>,
    backend: BackendKind,
    metric: Option<MetricArg>,
    warm_start: bool,
    output: Option<PathBuf>,
    write_lp: Option<PathBuf>,
}

fn heuristic_tour(instance: &TspInstance) -> Vec<usize> {
    let mut sol = MultiStartConstruction::with_all_heuristics().construct(instance);
    VND::with_standard_operators().improve(instance, &mut sol);
    log::info!("heuristic warm start cost {:.4}", sol.cost);
    sol.tour
}

fn solve_instance(path: &Path, mut config: SolverConfig, options: SolveOptions) -> TspResult<()> {
    println!("Loading instance from {:?}...", path);
    let instance = TspInstance::load(path, options.metric.map(Into::into))?;
    println!("{}", instance.statistics());

    let strategy = strategy_for(options.strategy, &instance, options.mtz_start.as_deref())?;
    let formulation = Formulation::build(&instance, strategy)?;

    if let Some(ref lp_path) = options.write_lp {
        std::fs::write(lp_path, formulation.to_lp_string())?;
        println!("Formulation written to {:?}", lp_path);
    }

    if options.warm_start {
        config.warm_start = Some(heuristic_tour(&instance));
    }

    println!("Solving with {} on {:?}...", strategy, options.backend);
    let solver = TspSolver::new(config, options.backend);
    let outcome = solver.solve_formulation(&instance, &formulation)?;

    println!("\n========== Results ==========");
    println!("Status: {}", outcome.status());
    let json = match &outcome {
        SolveOutcome::Optimal(result) | SolveOutcome::TimeLimitReached(result) => {
            match result.solution {
                Some(ref solution) => {
                    print!("{}", solution);
                    println!("Swap-optimal: {}", is_swap_optimal(&instance, solution));
                }
                None => println!("No tour found"),
            }
            println!("Lower bound: {:.4}", result.lower_bound);
            println!("Gap: {:.4}%", result.gap * 100.0);
            println!("Candidates inspected: {}", result.candidates);
            println!("Cuts added: {}", result.cuts_added);
            if result.ambiguities > 0 {
                println!("Ambiguous selections resolved: {}", result.ambiguities);
            }
            if let Some(nodes) = result.nodes_explored {
                println!("Nodes explored: {}", nodes);
            }
            println!("Time: {:.4}s", result.computation_time);
            serde_json::to_string_pretty(result)?
        }
        SolveOutcome::Infeasible(report) => {
            println!("Conflicting constraints:");
            for label in &report.constraints {
                println!("  {}", label);
            }
            if let Some(ref iis_path) = report.path {
                println!("IIS written to {:?}", iis_path);
            }
            serde_json::to_string_pretty(report)?
        }
    };

    if let Some(out_path) = options.output {
        std::fs::write(&out_path, json)?;
        println!("\nResult saved to {:?}", out_path);
    }

    Ok(())
}

fn run_benchmark(
    dir: &Path,
    strategies: &[StrategyArg],
    backend: BackendKind,
    output: &Path,
    time_limit: f64,
    max_size: Option<usize>,
    parallel: bool,
) -> TspResult<()> {
    println!("Loading instances from {:?}...", dir);

    let mut instances = load_instances_from_dir(dir, None)?;
    if let Some(max) = max_size {
        instances.retain(|i| i.dimension <= max);
    }
    instances.retain(|i| i.validate().is_ok());

    println!("Found {} instances", instances.len());
    if instances.is_empty() {
        return Err(TspError::input(format!("no usable instance in {:?}", dir)));
    }

    let strategies: Vec<Strategy> = strategies
        .iter()
        .map(|&s| match s {
            StrategyArg::Enumerated => Strategy::Enumerated,
            StrategyArg::Lazy => Strategy::Lazy,
            StrategyArg::Mtz => Strategy::Mtz { start: 0 },
        })
        .collect();

    let config = BenchmarkConfig {
        strategies,
        backend,
        time_limit,
        parallel,
        output_dir: output.to_string_lossy().to_string(),
        ..Default::default()
    };

    let mut benchmark = Benchmark::new(config);
    benchmark.run_on_instances(&instances);
    benchmark.save()?;

    println!("\n{}", benchmark.generate_report());
    println!("Results saved to {:?}", output);
    Ok(())
}

fn analyze_instance(path: &Path, metric: Option<MetricArg>) -> TspResult<()> {
    let instance = TspInstance::load(path, metric.map(Into::into))?;

    println!("========== Instance Analysis ==========\n");
    println!("{}", instance.statistics());

    match instance.validate() {
        Ok(()) => println!("Valid for exact solving"),
        Err(e) => println!("Not solvable: {}", e),
    }

    let n = instance.dimension;
    if n > tsp_exact_solver::exact::MAX_ENUMERATED_LOCATIONS {
        println!("Enumerated DFJ unavailable (more than {} locations)", tsp_exact_solver::exact::MAX_ENUMERATED_LOCATIONS);
    } else if n >= 3 {
        let cuts = (1u64 << n) - n as u64 - 2;
        println!("Enumerated DFJ would write {} subtour constraints", cuts);
    }
    println!("MTZ would write {} ordering constraints", n.saturating_sub(1) * n.saturating_sub(1));

    if n >= 2 {
        let nn_sol = NearestNeighborHeuristic::new().construct(&instance);

        let mut multi_sol = MultiStartConstruction::with_all_heuristics().construct(&instance);
        VND::with_standard_operators().improve(&instance, &mut multi_sol);

        println!("\nQuick Solution Estimates:");
        println!("  Nearest Neighbor: {:.2}", nn_sol.cost);
        println!("  Multi-Start + VND: {:.2}", multi_sol.cost);
    }

    Ok(())
}
