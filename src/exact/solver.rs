//! Solve driver.
//!
//! Owns everything one solve needs: the formulation, the cut pool, the
//! separator and the backend. Nothing is shared between invocations, so
//! several instances can be solved concurrently in one process.

use super::backend::{BackendKind, BackendOutcome, BackendStatus, InfeasibilityReport};
use super::callback::{CallbackStats, SolveContext, SubtourSeparator};
use super::formulation::{Formulation, Strategy};
use crate::error::{TspError, TspResult};
use crate::instance::TspInstance;
use crate::solution::Solution;
use crate::tour::{reconstruct_tour, DEFAULT_SELECTION_TOLERANCE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Exact solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Time limit in seconds
    pub time_limit: f64,
    /// MIP gap tolerance
    pub mip_gap: f64,
    /// Number of threads (0 = automatic)
    pub threads: i32,
    /// Enable backend output
    pub verbose: bool,
    /// Selection values at least `1 - int_feas_tol` count as selected
    pub int_feas_tol: f64,
    /// Heuristic tour used as a starting point
    pub warm_start: Option<Vec<usize>>,
    /// Where the IIS of an infeasible model is written
    pub iis_path: Option<PathBuf>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            time_limit: 3600.0,
            mip_gap: 1e-6,
            threads: 0,
            verbose: false,
            int_feas_tol: DEFAULT_SELECTION_TOLERANCE,
            warm_start: None,
            iis_path: Some(PathBuf::from("iis.ilp")),
        }
    }
}

/// Result of an exact solve that produced a bound
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExactResult {
    /// Best tour found, absent when a time limit struck before any
    pub solution: Option<Solution>,
    pub lower_bound: f64,
    /// Cost of the best tour, infinite when there is none
    pub upper_bound: f64,
    pub gap: f64,
    pub optimal: bool,
    pub strategy: Strategy,
    pub backend: String,
    pub nodes_explored: Option<i64>,
    pub candidates: usize,
    pub cuts_added: usize,
    pub ambiguities: usize,
    pub computation_time: f64,
}

impl ExactResult {
    pub fn cost(&self) -> Option<f64> {
        self.solution.as_ref().map(|s| s.cost)
    }
}

/// Terminal outcome of a solve
#[derive(Debug, Clone)]
pub enum SolveOutcome {
    Optimal(ExactResult),
    TimeLimitReached(ExactResult),
    Infeasible(InfeasibilityReport),
}

impl SolveOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            SolveOutcome::Optimal(_) => "Optimal",
            SolveOutcome::TimeLimitReached(_) => "TimeLimit",
            SolveOutcome::Infeasible(_) => "Infeasible",
        }
    }

    pub fn result(&self) -> Option<&ExactResult> {
        match self {
            SolveOutcome::Optimal(r) | SolveOutcome::TimeLimitReached(r) => Some(r),
            SolveOutcome::Infeasible(_) => None,
        }
    }

    pub fn is_optimal(&self) -> bool {
        matches!(self, SolveOutcome::Optimal(_))
    }
}

pub struct TspSolver {
    pub config: SolverConfig,
    pub backend: BackendKind,
}

impl TspSolver {
    pub fn new(config: SolverConfig, backend: BackendKind) -> Self {
        TspSolver { config, backend }
    }

    /// Build the formulation for `strategy` and solve it
    pub fn solve(&self, instance: &TspInstance, strategy: Strategy) -> TspResult<SolveOutcome> {
        let formulation = Formulation::build(instance, strategy)?;
        self.solve_formulation(instance, &formulation)
    }

    /// Solve a formulation previously built from `instance`
    pub fn solve_formulation(&self, instance: &TspInstance, formulation: &Formulation) -> TspResult<SolveOutcome> {
        let start = std::time::Instant::now();
        if formulation.dimension != instance.dimension {
            return Err(TspError::input(format!(
                "formulation {} has {} locations, instance {} has {}",
                formulation.name, formulation.dimension, instance.name, instance.dimension
            )));
        }
        if let Some(ref tour) = self.config.warm_start {
            validate_warm_start(tour, instance.dimension)?;
        }

        let backend = self.backend.create()?;
        log::info!(
            "solving {} with {} ({} variables, {} constraints)",
            formulation.name,
            backend.name(),
            formulation.variables.len(),
            formulation.constraints.len()
        );

        let mut ctx = SolveContext::new(formulation);
        let separator = SubtourSeparator::new(self.config.int_feas_tol);
        let outcome = backend.solve(&mut ctx, Some(&separator), &self.config)?;
        let elapsed = start.elapsed().as_secs_f64();

        match outcome.status {
            BackendStatus::Infeasible => {
                let report = outcome
                    .infeasibility
                    .ok_or_else(|| TspError::solver("backend reported infeasibility without a report"))?;
                Ok(SolveOutcome::Infeasible(self.persist_report(report)?))
            }
            BackendStatus::Optimal => {
                let solution = self
                    .extract_solution(instance, formulation, &outcome, elapsed)?
                    .ok_or_else(|| TspError::solver("backend reported an optimum without values"))?;
                log::info!(
                    "{} optimal: cost {:.4} after {} candidates and {} cuts",
                    formulation.name,
                    solution.cost,
                    outcome.stats.candidates,
                    outcome.stats.cuts_added
                );
                let cost = solution.cost;
                let lower_bound = outcome.bound.unwrap_or(cost).min(cost);
                let result = self.result(formulation, &outcome, backend.name(), Some(solution), lower_bound, elapsed, true);
                Ok(SolveOutcome::Optimal(result))
            }
            BackendStatus::TimeLimit => {
                let incumbent = match self.extract_solution(instance, formulation, &outcome, elapsed)? {
                    Some(solution) => Some(solution),
                    None => self.config.warm_start.as_ref().map(|tour| {
                        let mut solution = Solution::from_tour(instance, tour.clone(), "Warm-Start");
                        solution.computation_time = elapsed;
                        solution
                    }),
                };
                let lower_bound = outcome.bound.unwrap_or(0.0);
                log::warn!(
                    "{} hit the time limit of {:.1}s, lower bound {:.4}, incumbent {}",
                    formulation.name,
                    self.config.time_limit,
                    lower_bound,
                    incumbent.as_ref().map_or("none".to_string(), |s| format!("{:.4}", s.cost))
                );
                let result = self.result(formulation, &outcome, backend.name(), incumbent, lower_bound, elapsed, false);
                Ok(SolveOutcome::TimeLimitReached(result))
            }
        }
    }

    fn extract_solution(
        &self,
        instance: &TspInstance,
        formulation: &Formulation,
        outcome: &BackendOutcome,
        elapsed: f64,
    ) -> TspResult<Option<Solution>> {
        let Some(ref values) = outcome.values else {
            return Ok(None);
        };
        let rec = reconstruct_tour(
            formulation.arcs().map(|(i, j, var)| (i, j, values[var.0])),
            self.config.int_feas_tol,
        );
        if !rec.spans(instance.dimension) {
            return Err(TspError::solver(format!(
                "final selection of {} is not a single tour: {:?} (closed: {})",
                formulation.name, rec.tour, rec.closed
            )));
        }

        let mut solution = Solution::from_tour(instance, rec.tour, formulation.strategy.name());
        solution.computation_time = elapsed;
        solution.iterations = Some(outcome.stats.candidates);
        if let Some(objective) = outcome.objective {
            if (objective - solution.cost).abs() > 1e-6 * objective.abs().max(1.0) {
                log::warn!(
                    "backend objective {:.6} differs from tour cost {:.6}",
                    objective,
                    solution.cost
                );
            }
        }
        Ok(Some(solution))
    }

    #[allow(clippy::too_many_arguments)]
    fn result(
        &self,
        formulation: &Formulation,
        outcome: &BackendOutcome,
        backend: &str,
        solution: Option<Solution>,
        lower_bound: f64,
        elapsed: f64,
        optimal: bool,
    ) -> ExactResult {
        let upper_bound = solution.as_ref().map_or(f64::INFINITY, |s| s.cost);
        let gap = if optimal {
            outcome.gap.unwrap_or(0.0)
        } else if upper_bound.is_finite() && upper_bound.abs() > f64::EPSILON {
            ((upper_bound - lower_bound) / upper_bound.abs()).max(0.0)
        } else {
            1.0
        };
        let CallbackStats { candidates, cuts_added, ambiguities, .. } = outcome.stats;
        ExactResult {
            solution,
            lower_bound,
            upper_bound,
            gap,
            optimal,
            strategy: formulation.strategy,
            backend: backend.to_string(),
            nodes_explored: outcome.nodes,
            candidates,
            cuts_added,
            ambiguities,
            computation_time: elapsed,
        }
    }

    fn persist_report(&self, mut report: InfeasibilityReport) -> TspResult<InfeasibilityReport> {
        if report.path.is_none() {
            if let Some(ref path) = self.config.iis_path {
                std::fs::write(path, &report.export)?;
                report.path = Some(path.clone());
            }
        }
        log::error!(
            "model is infeasible, IIS of {} constraints{}",
            report.constraints.len(),
            report.path.as_ref().map_or(String::new(), |p| format!(" written to {}", p.display()))
        );
        Ok(report)
    }
}

fn validate_warm_start(tour: &[usize], n: usize) -> TspResult<()> {
    let mut seen = vec![false; n];
    for &location in tour {
        if location >= n || seen[location] {
            return Err(TspError::input(format!(
                "warm start {:?} is not a permutation of 0..{}",
                tour, n
            )));
        }
        seen[location] = true;
    }
    if tour.len() != n {
        return Err(TspError::input(format!(
            "warm start visits {} of {} locations",
            tour.len(),
            n
        )));
    }
    Ok(())
}
