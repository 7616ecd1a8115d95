//! TSP Exact Solver Library
//!
//! Solves the Travelling Salesman Problem to optimality as a mixed-integer
//! program and compares three ways of eliminating subtours.
//!
//! # Features
//!
//! - DFJ subtour cuts enumerated for every location subset
//! - DFJ subtour cuts generated lazily from integer-feasible candidates
//! - Miller-Tucker-Zemlin ordering constraints
//! - A pure-Rust MIP backend (microlp) and an optional Gurobi backend
//! - IIS reports for infeasible models
//! - Heuristic warm starts, benchmarking and instance analysis
//!
//! # Example
//!
//! ```no_run
//! use tsp_exact_solver::exact::{BackendKind, SolveOutcome, SolverConfig, Strategy, TspSolver};
//! use tsp_exact_solver::instance::TspInstance;
//!
//! let instance = TspInstance::from_file("instance.tsp").unwrap();
//! let solver = TspSolver::new(SolverConfig::default(), BackendKind::Microlp);
//!
//! match solver.solve(&instance, Strategy::Lazy).unwrap() {
//!     SolveOutcome::Optimal(result) => println!("{}", result.solution.unwrap()),
//!     SolveOutcome::TimeLimitReached(result) => println!("bound {:.2}", result.lower_bound),
//!     SolveOutcome::Infeasible(report) => println!("IIS: {:?}", report.constraints),
//! }
//! ```

pub mod benchmark;
pub mod error;
pub mod exact;
pub mod heuristics;
pub mod instance;
pub mod solution;
pub mod tour;

pub use error::{TspError, TspResult};
pub use instance::TspInstance;
pub use solution::Solution;
