//! Benchmarking of the subtour elimination strategies.
//!
//! Every (instance, strategy) pair is an independent solve with its own
//! formulation and cut pool, so the pairs run in parallel.

use crate::error::{TspError, TspResult};
use crate::exact::{BackendKind, SolveOutcome, SolverConfig, Strategy, TspSolver, MAX_ENUMERATED_LOCATIONS};
use crate::heuristics::construction::{ConstructionHeuristic, MultiStartConstruction};
use crate::heuristics::local_search::{LocalSearch, VND};
use crate::instance::{DistanceMetric, TspInstance};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

/// Result of running one strategy on one instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyResult {
    pub strategy: String,
    pub instance: String,
    pub dimension: usize,
    pub backend: String,
    /// Optimal, TimeLimit, Infeasible, Skipped or Error
    pub status: String,
    /// Cost of the best tour found
    pub cost: Option<f64>,
    pub lower_bound: Option<f64>,
    pub gap: Option<f64>,
    /// Wall time in seconds
    pub time: f64,
    pub candidates: usize,
    pub cuts_added: usize,
    pub ambiguities: usize,
    pub message: Option<String>,
}

impl StrategyResult {
    fn empty(instance: &TspInstance, strategy: Strategy, backend: BackendKind, status: &str) -> Self {
        StrategyResult {
            strategy: strategy.name().to_string(),
            instance: instance.name.clone(),
            dimension: instance.dimension,
            backend: format!("{:?}", backend).to_lowercase(),
            status: status.to_string(),
            cost: None,
            lower_bound: None,
            gap: None,
            time: 0.0,
            candidates: 0,
            cuts_added: 0,
            ambiguities: 0,
            message: None,
        }
    }
}

/// Aggregated statistics for a strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyStatistics {
    pub strategy: String,
    pub num_runs: usize,
    pub num_optimal: usize,
    pub avg_time: f64,
    pub std_time: f64,
    pub max_time: f64,
    pub total_time: f64,
    pub avg_cuts: f64,
    pub avg_gap: Option<f64>,
}

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    pub strategies: Vec<Strategy>,
    pub backend: BackendKind,
    /// Time limit per solve in seconds
    pub time_limit: f64,
    /// Seed each solve with a heuristic tour
    pub warm_start: bool,
    /// Run in parallel
    pub parallel: bool,
    pub show_progress: bool,
    pub output_dir: String,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            strategies: vec![Strategy::Enumerated, Strategy::Lazy, Strategy::Mtz { start: 0 }],
            backend: BackendKind::default(),
            time_limit: 60.0,
            warm_start: true,
            parallel: true,
            show_progress: true,
            output_dir: "results".to_string(),
        }
    }
}

/// Benchmarking engine
pub struct Benchmark {
    config: BenchmarkConfig,
    results: Vec<StrategyResult>,
}

impl Benchmark {
    pub fn new(config: BenchmarkConfig) -> Self {
        Benchmark {
            config,
            results: Vec::new(),
        }
    }

    /// Run every configured strategy on every instance
    pub fn run_on_instances(&mut self, instances: &[TspInstance]) {
        let jobs: Vec<(&TspInstance, Strategy)> = instances
            .iter()
            .flat_map(|instance| self.config.strategies.iter().map(move |&s| (instance, s)))
            .collect();

        let progress = if self.config.show_progress {
            ProgressBar::new(jobs.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}") {
            progress.set_style(style);
        }

        let config = &self.config;
        let run = |&(instance, strategy): &(&TspInstance, Strategy)| {
            progress.set_message(format!("{} {}", instance.name, strategy));
            let result = run_single(instance, strategy, config);
            progress.inc(1);
            result
        };

        let results: Vec<StrategyResult> = if config.parallel {
            jobs.par_iter().map(run).collect()
        } else {
            jobs.iter().map(run).collect()
        };
        progress.finish_with_message("done");

        self.results.extend(results);
    }

    /// Instances on which optimal strategies report different costs
    pub fn disagreements(&self) -> Vec<String> {
        let mut by_instance: BTreeMap<&str, Vec<(&str, f64)>> = BTreeMap::new();
        for r in &self.results {
            if r.status == "Optimal" {
                if let Some(cost) = r.cost {
                    by_instance.entry(r.instance.as_str()).or_default().push((r.strategy.as_str(), cost));
                }
            }
        }

        by_instance
            .into_iter()
            .filter(|(_, costs)| {
                costs.iter().any(|&(_, c)| (c - costs[0].1).abs() > 1e-6 * costs[0].1.abs().max(1.0))
            })
            .map(|(instance, costs)| {
                let listed: Vec<String> = costs.iter().map(|(s, c)| format!("{}={:.4}", s, c)).collect();
                format!("{}: {}", instance, listed.join(", "))
            })
            .collect()
    }

    /// Compute statistics for each strategy
    pub fn compute_statistics(&self) -> Vec<StrategyStatistics> {
        let mut grouped: BTreeMap<String, Vec<&StrategyResult>> = BTreeMap::new();
        for result in &self.results {
            grouped.entry(result.strategy.clone()).or_default().push(result);
        }

        grouped
            .into_iter()
            .map(|(strategy, results)| {
                let ran: Vec<&StrategyResult> = results
                    .iter()
                    .copied()
                    .filter(|r| r.status != "Skipped" && r.status != "Error")
                    .collect();
                let times: Vec<f64> = ran.iter().map(|r| r.time).collect();
                let cuts: Vec<f64> = ran.iter().map(|r| r.cuts_added as f64).collect();
                let gaps: Vec<f64> = ran.iter().filter_map(|r| r.gap).collect();

                let (avg_time, std_time, max_time) = if times.is_empty() {
                    (0.0, 0.0, 0.0)
                } else {
                    let std = if times.len() > 1 { Statistics::std_dev(times.iter()) } else { 0.0 };
                    (Statistics::mean(times.iter()), std, Statistics::max(times.iter()))
                };

                StrategyStatistics {
                    strategy,
                    num_runs: results.len(),
                    num_optimal: results.iter().filter(|r| r.status == "Optimal").count(),
                    avg_time,
                    std_time,
                    max_time,
                    total_time: times.iter().sum(),
                    avg_cuts: if cuts.is_empty() { 0.0 } else { Statistics::mean(cuts.iter()) },
                    avg_gap: if gaps.is_empty() { None } else { Some(Statistics::mean(gaps.iter())) },
                }
            })
            .collect()
    }

    /// Export results to CSV
    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> TspResult<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for result in &self.results {
            writer.serialize(result)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Export statistics to CSV
    pub fn export_statistics_csv<P: AsRef<Path>>(&self, path: P) -> TspResult<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for stat in self.compute_statistics() {
            writer.serialize(stat)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Generate summary report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str("========================================\n");
        report.push_str("   Subtour Elimination Benchmark Report\n");
        report.push_str("========================================\n");
        report.push_str(&format!("Generated: {}\n", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")));
        report.push_str(&format!(
            "Backend: {:?}, time limit {:.1}s\n\n",
            self.config.backend, self.config.time_limit
        ));

        report.push_str("Strategy Performance Summary:\n");
        report.push_str("-".repeat(84).as_str());
        report.push('\n');
        report.push_str(&format!(
            "{:<18} {:>10} {:>12} {:>12} {:>12} {:>12}\n",
            "Strategy", "Optimal", "Avg Time", "Std Time", "Max Time", "Avg Cuts"
        ));
        report.push_str("-".repeat(84).as_str());
        report.push('\n');

        for stat in self.compute_statistics() {
            report.push_str(&format!(
                "{:<18} {:>10} {:>12.4} {:>12.4} {:>12.4} {:>12.1}\n",
                stat.strategy,
                format!("{}/{}", stat.num_optimal, stat.num_runs),
                stat.avg_time,
                stat.std_time,
                stat.max_time,
                stat.avg_cuts
            ));
        }

        report.push_str("-".repeat(84).as_str());
        report.push('\n');

        report.push_str("\nBest Tours per Instance:\n");
        let mut instance_best: BTreeMap<&str, &StrategyResult> = BTreeMap::new();
        for result in &self.results {
            let Some(cost) = result.cost else { continue };
            let entry = instance_best.entry(result.instance.as_str()).or_insert(result);
            if entry.cost.map_or(true, |best| cost < best) {
                *entry = result;
            }
        }
        for (instance, best) in &instance_best {
            report.push_str(&format!(
                "  {}: {:.2} ({}, {})\n",
                instance,
                best.cost.unwrap_or(f64::NAN),
                best.strategy,
                best.status
            ));
        }

        let disagreements = self.disagreements();
        if !disagreements.is_empty() {
            report.push_str("\nStrategies disagree on:\n");
            for line in disagreements {
                report.push_str(&format!("  {}\n", line));
            }
        }

        report
    }

    /// Write results, statistics and report into the configured output directory
    pub fn save(&self) -> TspResult<()> {
        let dir = Path::new(&self.config.output_dir);
        std::fs::create_dir_all(dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.export_to_csv(dir.join(format!("results_{}.csv", stamp)))?;
        self.export_statistics_csv(dir.join(format!("statistics_{}.csv", stamp)))?;
        std::fs::write(dir.join(format!("report_{}.txt", stamp)), self.generate_report())?;
        log::info!("benchmark results saved to {}", dir.display());
        Ok(())
    }

    pub fn results(&self) -> &[StrategyResult] {
        &self.results
    }
}

fn warm_start_tour(instance: &TspInstance) -> Vec<usize> {
    let mut solution = MultiStartConstruction::with_all_heuristics().construct(instance);
    VND::with_standard_operators().improve(instance, &mut solution);
    solution.tour
}

/// Solve one (instance, strategy) pair and record the outcome
pub fn run_single(instance: &TspInstance, strategy: Strategy, config: &BenchmarkConfig) -> StrategyResult {
    let mut record = StrategyResult::empty(instance, strategy, config.backend, "Error");

    if strategy == Strategy::Enumerated && instance.dimension > MAX_ENUMERATED_LOCATIONS {
        record.status = "Skipped".to_string();
        record.message = Some(format!("more than {} locations", MAX_ENUMERATED_LOCATIONS));
        return record;
    }

    let solver_config = SolverConfig {
        time_limit: config.time_limit,
        warm_start: config.warm_start.then(|| warm_start_tour(instance)),
        iis_path: None,
        ..SolverConfig::default()
    };
    let solver = TspSolver::new(solver_config, config.backend);

    let start = std::time::Instant::now();
    let outcome = solver.solve(instance, strategy);
    record.time = start.elapsed().as_secs_f64();

    match outcome {
        Ok(outcome) => {
            record.status = outcome.status().to_string();
            match outcome {
                SolveOutcome::Optimal(result) | SolveOutcome::TimeLimitReached(result) => {
                    record.cost = result.cost();
                    record.lower_bound = Some(result.lower_bound);
                    record.gap = Some(result.gap);
                    record.candidates = result.candidates;
                    record.cuts_added = result.cuts_added;
                    record.ambiguities = result.ambiguities;
                    record.backend = result.backend;
                }
                SolveOutcome::Infeasible(report) => {
                    record.message = Some(format!("IIS of {} constraints", report.constraints.len()));
                }
            }
        }
        Err(e) => {
            log::error!("{} on {} failed: {}", strategy, instance.name, e);
            record.message = Some(e.to_string());
        }
    }

    record
}

/// Load every `.tsp` and `.json` instance of a directory, sorted by dimension
pub fn load_instances_from_dir<P: AsRef<Path>>(dir: P, metric: Option<DistanceMetric>) -> TspResult<Vec<TspInstance>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(TspError::input(format!("{} is not a directory", dir.display())));
    }

    let mut instances = Vec::new();
    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        let supported = path
            .extension()
            .map(|e| e == "tsp" || e == "json")
            .unwrap_or(false);
        if !supported {
            continue;
        }
        match TspInstance::load(&path, metric) {
            Ok(instance) => instances.push(instance),
            Err(e) => log::warn!("skipping {}: {}", path.display(), e),
        }
    }

    instances.sort_by(|a, b| a.dimension.cmp(&b.dimension).then_with(|| a.name.cmp(&b.name)));
    Ok(instances)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> BenchmarkConfig {
        BenchmarkConfig {
            show_progress: false,
            ..BenchmarkConfig::default()
        }
    }

    #[test]
    fn test_benchmark_config() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.strategies.len(), 3);
        assert_eq!(config.backend, BackendKind::Microlp);
    }

    #[test]
    fn test_strategies_agree_on_small_instances() {
        let instances: Vec<TspInstance> = (0..2)
            .map(|seed| TspInstance::random(6, seed, DistanceMetric::Euclidean).unwrap())
            .collect();
        let mut benchmark = Benchmark::new(quiet_config());
        benchmark.run_on_instances(&instances);

        assert_eq!(benchmark.results().len(), 6);
        assert!(benchmark.results().iter().all(|r| r.status == "Optimal"));
        assert!(benchmark.disagreements().is_empty());

        let stats = benchmark.compute_statistics();
        assert_eq!(stats.len(), 3);
        assert!(stats.iter().all(|s| s.num_optimal == 2));
        assert!(benchmark.generate_report().contains("DFJ-Lazy"));
    }

    #[test]
    fn test_enumerated_is_skipped_on_large_instances() {
        let instance = TspInstance::random(MAX_ENUMERATED_LOCATIONS + 1, 1, DistanceMetric::Euclidean).unwrap();
        let record = run_single(&instance, Strategy::Enumerated, &quiet_config());
        assert_eq!(record.status, "Skipped");
    }

    #[test]
    fn test_csv_export() {
        let instance = TspInstance::random(5, 3, DistanceMetric::Euclidean).unwrap();
        let mut benchmark = Benchmark::new(BenchmarkConfig {
            strategies: vec![Strategy::Lazy],
            parallel: false,
            ..quiet_config()
        });
        benchmark.run_on_instances(std::slice::from_ref(&instance));

        let path = std::env::temp_dir().join(format!("tsp_bench_{}.csv", std::process::id()));
        benchmark.export_to_csv(&path).unwrap();
        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<StrategyResult> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].strategy, "DFJ-Lazy");
        let _ = std::fs::remove_file(path);
    }
}
