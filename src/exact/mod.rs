//! Exact solvers module.
//!
//! The formulation is solver independent. A [`MipBackend`] turns it into a
//! model of the selected engine: microlp is always available, Gurobi only
//! when built with the `gurobi` feature.

pub mod backend;
pub mod callback;
pub mod formulation;
pub mod microlp_backend;
pub mod solver;

#[cfg(feature = "gurobi")]
pub mod gurobi;

pub use backend::{BackendKind, BackendOutcome, BackendStatus, InfeasibilityReport, MipBackend};
pub use callback::{CallbackStats, CutPool, LazyConstraintCallback, SolveContext, SubtourSeparator, Verdict};
pub use formulation::{Formulation, LinearConstraint, Sense, Strategy, SubtourElimination, MAX_ENUMERATED_LOCATIONS};
pub use microlp_backend::MicrolpBackend;
pub use solver::{ExactResult, SolveOutcome, SolverConfig, TspSolver};

#[cfg(feature = "gurobi")]
pub use gurobi::GurobiBackend;
