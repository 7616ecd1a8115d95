//! Gurobi backend.
//!
//! Variables and constraints of the formulation are registered one to one.
//! When the formulation asks for lazy constraints, `LazyConstraints` is
//! enabled and the callback runs on every `MIPSol` event, injecting its cuts
//! with `add_lazy`.

use super::backend::{BackendOutcome, BackendStatus, InfeasibilityReport, MipBackend};
use super::callback::{LazyConstraintCallback, SolveContext};
use super::formulation::{Formulation, LinearConstraint, Sense, VarKind};
use super::solver::SolverConfig;
use crate::error::{TspError, TspResult};
use crate::tour::tour_arcs;
use grb::callback::Where;
use grb::prelude::*;

fn grb_err(context: &'static str) -> impl Fn(grb::Error) -> TspError {
    move |e| TspError::solver(format!("{}: {}", context, e))
}

fn linear_expr(constraint: &LinearConstraint, vars: &[Var]) -> Expr {
    constraint.terms.iter().map(|&(v, coeff)| coeff * vars[v.0]).grb_sum()
}

fn inequality(constraint: &LinearConstraint, vars: &[Var]) -> IneqExpr {
    let lhs = linear_expr(constraint, vars);
    let rhs = constraint.rhs;
    match constraint.sense {
        Sense::Le => c!(lhs <= rhs),
        Sense::Ge => c!(lhs >= rhs),
        Sense::Eq => c!(lhs == rhs),
    }
}

pub struct GurobiBackend;

impl GurobiBackend {
    pub fn new() -> Self {
        GurobiBackend
    }

    fn build_model(&self, formulation: &Formulation, config: &SolverConfig) -> TspResult<(Model, Vec<Var>, Vec<Constr>)> {
        let env = Env::new("").map_err(grb_err("Failed to create Gurobi environment"))?;
        let mut model = Model::with_env(&formulation.name, env).map_err(grb_err("Failed to create model"))?;

        model.set_param(param::TimeLimit, config.time_limit).map_err(grb_err("Failed to set time limit"))?;
        model.set_param(param::MIPGap, config.mip_gap).map_err(grb_err("Failed to set MIP gap"))?;
        model.set_param(param::Threads, config.threads).map_err(grb_err("Failed to set threads"))?;
        model
            .set_param(param::IntFeasTol, config.int_feas_tol.min(1e-1))
            .map_err(grb_err("Failed to set integrality tolerance"))?;
        if formulation.lazy_constraints {
            model.set_param(param::LazyConstraints, 1).map_err(grb_err("Failed to enable lazy constraints"))?;
        }
        if !config.verbose {
            model.set_param(param::OutputFlag, 0).map_err(grb_err("Failed to set output flag"))?;
        }

        let mut vars = Vec::with_capacity(formulation.variables.len());
        for v in &formulation.variables {
            let var = match v.kind {
                VarKind::Binary => add_binvar!(model, name: &v.name, obj: v.obj),
                VarKind::Integer => add_intvar!(model, name: &v.name, obj: v.obj, bounds: v.lower..v.upper),
                VarKind::Continuous => add_ctsvar!(model, name: &v.name, obj: v.obj, bounds: v.lower..v.upper),
            }
            .map_err(grb_err("Failed to add variable"))?;
            vars.push(var);
        }
        model.update().map_err(grb_err("Failed to update model"))?;

        let mut constrs = Vec::with_capacity(formulation.constraints.len());
        for constraint in &formulation.constraints {
            let constr = model
                .add_constr(&constraint.label, inequality(constraint, &vars))
                .map_err(grb_err("Failed to add constraint"))?;
            constrs.push(constr);
        }

        if let Some(ref warm_tour) = config.warm_start {
            for (_, _, var) in formulation.arcs() {
                model.set_obj_attr(attr::Start, &vars[var.0], 0.0).map_err(grb_err("Failed to initialize warm start"))?;
            }
            for (i, j) in tour_arcs(warm_tour) {
                let var = formulation.arc_var(i, j)?;
                model.set_obj_attr(attr::Start, &vars[var.0], 1.0).map_err(grb_err("Failed to set warm start arc"))?;
            }
        }

        model.update().map_err(grb_err("Failed to update model before optimization"))?;
        Ok((model, vars, constrs))
    }

    fn infeasibility(&self, model: &mut Model, constrs: &[Constr], formulation: &Formulation, config: &SolverConfig) -> TspResult<InfeasibilityReport> {
        model.compute_iis().map_err(grb_err("Failed to compute IIS"))?;
        let mut labels = Vec::new();
        let mut members = Vec::new();
        for (constr, constraint) in constrs.iter().zip(&formulation.constraints) {
            let in_iis = model.get_obj_attr(attr::IISConstr, constr).map_err(grb_err("Failed to read IIS membership"))?;
            if in_iis != 0 {
                labels.push(constraint.label.clone());
                members.push(constraint);
            }
        }

        let path = match config.iis_path {
            Some(ref path) => {
                model.write(&path.to_string_lossy()).map_err(grb_err("Failed to write IIS"))?;
                log::info!("IIS written to {}", path.display());
                Some(path.clone())
            }
            None => None,
        };

        Ok(InfeasibilityReport {
            constraints: labels,
            export: formulation.lp_with(members.into_iter()),
            path,
        })
    }
}

impl Default for GurobiBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MipBackend for GurobiBackend {
    fn name(&self) -> &str {
        "gurobi"
    }

    fn solve(
        &self,
        ctx: &mut SolveContext<'_>,
        callback: Option<&dyn LazyConstraintCallback>,
        config: &SolverConfig,
    ) -> TspResult<BackendOutcome> {
        let formulation = ctx.formulation;
        let (mut model, vars, constrs) = self.build_model(formulation, config)?;

        match callback.filter(|_| formulation.lazy_constraints) {
            Some(callback) => {
                let mut on_event = |w: Where| {
                    if let Where::MIPSol(cb) = w {
                        let values = cb.get_solution(&vars)?;
                        let response = ctx.on_candidate(callback, &values);
                        for cut in &response.cuts {
                            cb.add_lazy(inequality(cut, &vars))?;
                        }
                    }
                    Ok(())
                };
                model
                    .optimize_with_callback(&mut on_event)
                    .map_err(grb_err("Optimization failed"))?;
            }
            None => {
                if formulation.lazy_constraints {
                    log::warn!("{} expects lazy constraints but no callback was given", formulation.name);
                }
                model.optimize().map_err(grb_err("Optimization failed"))?;
            }
        }

        let status = model.status().map_err(grb_err("Failed to get status"))?;
        log::debug!("gurobi status {:?}", status);

        if status == Status::Infeasible || status == Status::InfOrUnbd {
            let report = self.infeasibility(&mut model, &constrs, formulation, config)?;
            return Ok(BackendOutcome::infeasible(report, ctx.stats.clone()));
        }

        let status = match status {
            Status::Optimal => BackendStatus::Optimal,
            Status::TimeLimit => BackendStatus::TimeLimit,
            other => return Err(TspError::solver(format!("unexpected Gurobi status {:?}", other))),
        };

        let solutions = model.get_attr(attr::SolCount).map_err(grb_err("Failed to get solution count"))?;
        let (values, objective) = if solutions > 0 {
            let mut values = Vec::with_capacity(vars.len());
            for var in &vars {
                values.push(model.get_obj_attr(attr::X, var).map_err(grb_err("Failed to read variable value"))?);
            }
            let objective = model.get_attr(attr::ObjVal).map_err(grb_err("Failed to get objective"))?;
            (Some(values), Some(objective))
        } else {
            (None, None)
        };

        Ok(BackendOutcome {
            status,
            values,
            objective,
            bound: model.get_attr(attr::ObjBound).ok(),
            gap: objective.and_then(|_| model.get_attr(attr::MIPGap).ok()),
            nodes: model.get_attr(attr::NodeCount).ok().map(|n| n as i64),
            stats: ctx.stats.clone(),
            infeasibility: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exact::formulation::Strategy;
    use crate::instance::{DistanceMetric, TspInstance};

    #[test]
    #[ignore]
    fn test_gurobi_lazy_matches_mtz() {
        let instance = TspInstance::random(8, 5, DistanceMetric::Euclidean).unwrap();
        let config = SolverConfig::default();
        let backend = GurobiBackend::new();

        let lazy = Formulation::build(&instance, Strategy::Lazy).unwrap();
        let mut ctx = SolveContext::new(&lazy);
        let separator = crate::exact::callback::SubtourSeparator::new(config.int_feas_tol);
        let a = backend.solve(&mut ctx, Some(&separator), &config).unwrap();

        let mtz = Formulation::build(&instance, Strategy::Mtz { start: 0 }).unwrap();
        let mut ctx = SolveContext::new(&mtz);
        let b = backend.solve(&mut ctx, None, &config).unwrap();

        assert!((a.objective.unwrap() - b.objective.unwrap()).abs() < 1e-6);
    }
}
