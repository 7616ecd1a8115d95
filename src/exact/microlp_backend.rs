//! Pure-Rust backend built on microlp.
//!
//! microlp solves a problem in one blocking call and offers no callback hook,
//! so lazy constraints are handled by cut rounds: every optimum of the current
//! relaxation is an integer-feasible candidate, it is passed to the callback,
//! and the returned cuts are added before the next round. The relaxation
//! optimum of the last round is a valid lower bound when the time limit
//! interrupts the rounds.
//!
//! Each round runs on a worker thread so the time limit also interrupts a
//! single long solve. A worker that misses the deadline is detached and its
//! result dropped.

use super::backend::{BackendOutcome, BackendStatus, InfeasibilityReport, MipBackend};
use super::callback::{LazyConstraintCallback, SolveContext};
use super::formulation::{self, Formulation, LinearConstraint, Sense, VarKind};
use super::solver::SolverConfig;
use crate::error::{TspError, TspResult};
use microlp::{ComparisonOp, OptimizationDirection, Problem, Variable};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Above this many constraints the IIS search is skipped and the whole model exported
const MAX_IIS_CONSTRAINTS: usize = 2000;

pub struct MicrolpBackend;

impl MicrolpBackend {
    pub fn new() -> Self {
        MicrolpBackend
    }
}

impl Default for MicrolpBackend {
    fn default() -> Self {
        Self::new()
    }
}

enum RoundResult {
    Solved { values: Vec<f64>, objective: f64 },
    Infeasible,
}

fn build_problem<'a>(
    variables: &[formulation::Variable],
    constraints: impl Iterator<Item = &'a LinearConstraint>,
) -> (Problem, Vec<Variable>) {
    let mut problem = Problem::new(OptimizationDirection::Minimize);
    let vars: Vec<Variable> = variables
        .iter()
        .map(|v| match v.kind {
            VarKind::Binary => problem.add_binary_var(v.obj),
            VarKind::Integer => {
                let lower = v.lower.max(i32::MIN as f64) as i32;
                let upper = v.upper.min(i32::MAX as f64) as i32;
                problem.add_integer_var(v.obj, (lower, upper))
            }
            VarKind::Continuous => problem.add_var(v.obj, (v.lower, v.upper)),
        })
        .collect();

    for constraint in constraints {
        let op = match constraint.sense {
            Sense::Le => ComparisonOp::Le,
            Sense::Ge => ComparisonOp::Ge,
            Sense::Eq => ComparisonOp::Eq,
        };
        problem.add_constraint(
            constraint.terms.iter().map(|&(v, c)| (vars[v.0], c)),
            op,
            constraint.rhs,
        );
    }

    (problem, vars)
}

fn solve_model<'a>(
    name: &str,
    variables: &[formulation::Variable],
    constraints: impl Iterator<Item = &'a LinearConstraint>,
) -> TspResult<RoundResult> {
    let (problem, vars) = build_problem(variables, constraints);
    match problem.solve() {
        Ok(solution) => {
            let values = vars.iter().map(|&v| *solution.var_value(v)).collect();
            Ok(RoundResult::Solved { values, objective: solution.objective() })
        }
        Err(microlp::Error::Infeasible) => Ok(RoundResult::Infeasible),
        Err(microlp::Error::Unbounded) => Err(TspError::solver(format!(
            "{} is unbounded, every variable of a TSP formulation should be bounded",
            name
        ))),
        Err(microlp::Error::InternalError(msg)) => Err(TspError::solver(format!("microlp: {}", msg))),
    }
}

fn solve_round<'a>(
    formulation: &Formulation,
    constraints: impl Iterator<Item = &'a LinearConstraint>,
) -> TspResult<RoundResult> {
    solve_model(&formulation.name, &formulation.variables, constraints)
}

/// Solve one round on a worker thread. `None` means `remaining` ran out first.
fn solve_round_within(
    formulation: &Formulation,
    constraints: Vec<LinearConstraint>,
    remaining: f64,
) -> TspResult<Option<RoundResult>> {
    let name = formulation.name.clone();
    let variables = formulation.variables.clone();
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("microlp-round".to_string())
        .spawn(move || {
            // the receiver is gone once the deadline passed
            let _ = tx.send(solve_model(&name, &variables, constraints.iter()));
        })
        .map_err(|e| TspError::solver(format!("cannot start microlp worker: {}", e)))?;

    let received = match Duration::try_from_secs_f64(remaining.max(0.0)) {
        Ok(timeout) => rx.recv_timeout(timeout),
        // no representable deadline, wait for the solve
        Err(_) => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
    };
    match received {
        Ok(result) => result.map(Some),
        Err(RecvTimeoutError::Timeout) => {
            log::debug!("{}: round still running after {:.3}s, detaching it", formulation.name, remaining);
            Ok(None)
        }
        Err(RecvTimeoutError::Disconnected) => Err(TspError::solver(format!(
            "{}: microlp worker stopped without a result",
            formulation.name
        ))),
    }
}

/// Deletion filter: drop each constraint in turn and keep it out whenever the
/// rest stays infeasible. What remains is irreducible.
fn deletion_filter(formulation: &Formulation, constraints: &[LinearConstraint]) -> TspResult<Vec<usize>> {
    let mut active: Vec<bool> = vec![true; constraints.len()];
    for k in 0..constraints.len() {
        active[k] = false;
        let remaining = constraints.iter().zip(&active).filter(|(_, &on)| on).map(|(c, _)| c);
        if let RoundResult::Solved { .. } = solve_round(formulation, remaining)? {
            active[k] = true;
        }
    }
    Ok((0..constraints.len()).filter(|&k| active[k]).collect())
}

fn infeasibility_report(formulation: &Formulation, constraints: &[LinearConstraint]) -> TspResult<InfeasibilityReport> {
    if constraints.len() > MAX_IIS_CONSTRAINTS {
        log::warn!(
            "{} constraints, skipping IIS search and exporting the whole model",
            constraints.len()
        );
        return Ok(InfeasibilityReport {
            constraints: constraints.iter().map(|c| c.label.clone()).collect(),
            export: formulation.lp_with(constraints.iter()),
            path: None,
        });
    }

    let iis = deletion_filter(formulation, constraints)?;
    log::info!("IIS has {} of {} constraints", iis.len(), constraints.len());
    Ok(InfeasibilityReport {
        constraints: iis.iter().map(|&k| constraints[k].label.clone()).collect(),
        export: formulation.lp_with(iis.iter().map(|&k| &constraints[k])),
        path: None,
    })
}

impl MipBackend for MicrolpBackend {
    fn name(&self) -> &str {
        "microlp"
    }

    fn solve(
        &self,
        ctx: &mut SolveContext<'_>,
        callback: Option<&dyn LazyConstraintCallback>,
        config: &SolverConfig,
    ) -> TspResult<BackendOutcome> {
        let start = Instant::now();
        let formulation = ctx.formulation;
        let callback = if formulation.lazy_constraints { callback } else { None };
        if formulation.lazy_constraints && callback.is_none() {
            log::warn!("{} expects lazy constraints but no callback was given", formulation.name);
        }

        let mut round = 0usize;
        let mut last_bound: Option<f64> = None;

        loop {
            round += 1;
            let constraints: Vec<LinearConstraint> =
                formulation.constraints.iter().chain(ctx.pool.constraints()).cloned().collect();
            let remaining = config.time_limit - start.elapsed().as_secs_f64();
            let Some(result) = solve_round_within(formulation, constraints, remaining)? else {
                log::info!(
                    "time limit of {:.3}s reached in round {}, bound {}",
                    config.time_limit,
                    round,
                    last_bound.map_or("none".to_string(), |b| format!("{:.4}", b))
                );
                return Ok(BackendOutcome::time_limit(last_bound, ctx.stats.clone()));
            };

            let (values, objective) = match result {
                RoundResult::Solved { values, objective } => (values, objective),
                RoundResult::Infeasible => {
                    log::error!("{} is infeasible (round {})", formulation.name, round);
                    let all: Vec<LinearConstraint> = formulation
                        .constraints
                        .iter()
                        .chain(ctx.pool.constraints())
                        .cloned()
                        .collect();
                    let report = infeasibility_report(formulation, &all)?;
                    return Ok(BackendOutcome::infeasible(report, ctx.stats.clone()));
                }
            };

            let Some(callback) = callback else {
                return Ok(BackendOutcome {
                    status: BackendStatus::Optimal,
                    values: Some(values),
                    objective: Some(objective),
                    bound: Some(objective),
                    gap: Some(0.0),
                    nodes: None,
                    stats: ctx.stats.clone(),
                    infeasibility: None,
                });
            };

            last_bound = Some(last_bound.map_or(objective, |b: f64| b.max(objective)));
            let response = ctx.on_candidate(callback, &values);
            if response.accepted {
                log::debug!(
                    "round {}: candidate accepted after {} cuts",
                    round,
                    ctx.pool.len()
                );
                return Ok(BackendOutcome {
                    status: BackendStatus::Optimal,
                    values: Some(values),
                    objective: Some(objective),
                    bound: Some(objective),
                    gap: Some(0.0),
                    nodes: None,
                    stats: ctx.stats.clone(),
                    infeasibility: None,
                });
            }

            if response.new_cuts == 0 {
                // the same candidate would come back next round
                return Err(TspError::solver(format!(
                    "round {}: candidate rejected without a new cut ({} cuts registered)",
                    round,
                    ctx.pool.len()
                )));
            }

            if start.elapsed().as_secs_f64() >= config.time_limit {
                log::info!(
                    "time limit of {:.1}s reached after {} rounds, bound {:.4}",
                    config.time_limit,
                    round,
                    objective
                );
                return Ok(BackendOutcome::time_limit(last_bound, ctx.stats.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exact::callback::SubtourSeparator;
    use crate::exact::formulation::{Formulation, Strategy, VarId};
    use crate::instance::TspInstance;

    fn square() -> TspInstance {
        let points = vec![
            ("1".to_string(), 0.0, 0.0),
            ("2".to_string(), 1.0, 0.0),
            ("3".to_string(), 1.0, 1.0),
            ("4".to_string(), 0.0, 1.0),
        ];
        TspInstance::from_coordinates("square", points, crate::instance::DistanceMetric::Euclidean).unwrap()
    }

    #[test]
    fn test_plain_solve_without_callback() {
        let formulation = Formulation::build(&square(), Strategy::Enumerated).unwrap();
        let mut ctx = SolveContext::new(&formulation);
        let outcome = MicrolpBackend::new().solve(&mut ctx, None, &SolverConfig::default()).unwrap();
        assert_eq!(outcome.status, BackendStatus::Optimal);
        assert!((outcome.objective.unwrap() - 4.0).abs() < 1e-6);
        assert_eq!(outcome.stats.candidates, 0);
    }

    #[test]
    fn test_lazy_rounds_reach_the_optimum() {
        let formulation = Formulation::build(&square(), Strategy::Lazy).unwrap();
        let mut ctx = SolveContext::new(&formulation);
        let separator = SubtourSeparator::new(1e-4);
        let outcome = MicrolpBackend::new()
            .solve(&mut ctx, Some(&separator), &SolverConfig::default())
            .unwrap();
        assert_eq!(outcome.status, BackendStatus::Optimal);
        assert!((outcome.objective.unwrap() - 4.0).abs() < 1e-6);
        assert!(outcome.stats.candidates >= 1);
        assert_eq!(outcome.stats.cuts_added, ctx.pool.len());
    }

    #[test]
    fn test_infeasible_model_reports_iis() {
        let mut formulation = Formulation::build(&square(), Strategy::Enumerated).unwrap();
        // out-degree of location 1 cannot be both 1 and 0
        let terms: Vec<(VarId, f64)> = (1..4).map(|j| (formulation.arc_var(0, j).unwrap(), 1.0)).collect();
        formulation.add_constraint(LinearConstraint::new("forbid_leaving_1", terms, Sense::Eq, 0.0));

        let mut ctx = SolveContext::new(&formulation);
        let outcome = MicrolpBackend::new().solve(&mut ctx, None, &SolverConfig::default()).unwrap();
        assert_eq!(outcome.status, BackendStatus::Infeasible);
        let report = outcome.infeasibility.unwrap();
        // the model is feasible without it, so every IIS contains it
        assert!(report.constraints.iter().any(|c| c == "forbid_leaving_1"));
        assert!(report.constraints.len() < formulation.constraints.len());
        assert!(report.export.contains("forbid_leaving_1"));
    }

    #[test]
    fn test_time_limit_interrupts_a_single_round() {
        let instance = TspInstance::random(12, 5, crate::instance::DistanceMetric::Euclidean).unwrap();
        let formulation = Formulation::build(&instance, Strategy::Mtz { start: 0 }).unwrap();
        let mut ctx = SolveContext::new(&formulation);
        let config = SolverConfig { time_limit: 0.01, ..SolverConfig::default() };
        let started = Instant::now();
        let outcome = MicrolpBackend::new().solve(&mut ctx, None, &config).unwrap();
        assert_eq!(outcome.status, BackendStatus::TimeLimit);
        assert!(outcome.values.is_none());
        assert!(outcome.bound.is_none());
        assert!(started.elapsed() < Duration::from_millis(250));
    }
}
