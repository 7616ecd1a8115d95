//! The MIP engine seen by the exact solver.
//!
//! A backend registers the variables and constraints of a [`Formulation`],
//! minimises the objective, fires the lazy-constraint callback on every
//! integer-feasible candidate when the formulation asks for it, and reports a
//! terminal status together with the variable values.

use super::callback::{CallbackStats, LazyConstraintCallback, SolveContext};
use super::solver::SolverConfig;
use crate::error::{TspError, TspResult};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendStatus {
    Optimal,
    TimeLimit,
    Infeasible,
}

/// Conflicting constraints of an infeasible model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InfeasibilityReport {
    /// Labels of the constraints in the irreducible inconsistent subsystem
    pub constraints: Vec<String>,
    /// LP/ILP text of the subsystem
    pub export: String,
    /// File the backend already wrote the export to
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct BackendOutcome {
    pub status: BackendStatus,
    /// Values of every formulation variable for the best integer solution
    pub values: Option<Vec<f64>>,
    pub objective: Option<f64>,
    /// Best proven lower bound
    pub bound: Option<f64>,
    pub gap: Option<f64>,
    pub nodes: Option<i64>,
    pub stats: CallbackStats,
    pub infeasibility: Option<InfeasibilityReport>,
}

impl BackendOutcome {
    pub fn infeasible(report: InfeasibilityReport, stats: CallbackStats) -> Self {
        BackendOutcome {
            status: BackendStatus::Infeasible,
            values: None,
            objective: None,
            bound: None,
            gap: None,
            nodes: None,
            stats,
            infeasibility: Some(report),
        }
    }

    /// Stopped by the time limit before any accepted candidate
    pub fn time_limit(bound: Option<f64>, stats: CallbackStats) -> Self {
        BackendOutcome {
            status: BackendStatus::TimeLimit,
            values: None,
            objective: None,
            bound,
            gap: None,
            nodes: None,
            stats,
            infeasibility: None,
        }
    }
}

pub trait MipBackend {
    fn name(&self) -> &str;

    /// Solve `ctx.formulation`. `callback` is only invoked when the
    /// formulation requests lazy constraints.
    fn solve(
        &self,
        ctx: &mut SolveContext<'_>,
        callback: Option<&dyn LazyConstraintCallback>,
        config: &SolverConfig,
    ) -> TspResult<BackendOutcome>;
}

/// Backend selection
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum BackendKind {
    /// Pure-Rust branch and bound (microlp)
    Microlp,
    /// Gurobi through the grb crate (requires the `gurobi` feature)
    Gurobi,
}

impl BackendKind {
    pub fn create(&self) -> TspResult<Box<dyn MipBackend>> {
        match self {
            BackendKind::Microlp => Ok(Box::new(super::microlp_backend::MicrolpBackend::new())),
            #[cfg(feature = "gurobi")]
            BackendKind::Gurobi => Ok(Box::new(super::gurobi::GurobiBackend::new())),
            #[cfg(not(feature = "gurobi"))]
            BackendKind::Gurobi => Err(TspError::solver("Gurobi feature not enabled in this build")),
        }
    }
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Microlp
    }
}
