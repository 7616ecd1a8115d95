//! Lazy subtour elimination.
//!
//! A backend hands every integer-feasible candidate to a
//! [`LazyConstraintCallback`]. The callback is a pure function of the candidate
//! snapshot and the cuts registered so far. It returns the cuts the backend
//! should inject; the [`SolveContext`] owned by the solve invocation registers
//! them and keeps the counters.

use super::formulation::{subset_label_from, Formulation, LinearConstraint};
use crate::tour::reconstruct_tour;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A DFJ cut for one location subset
#[derive(Clone, Debug, PartialEq)]
pub struct SubtourCut {
    /// Sorted location indices
    pub subset: Vec<usize>,
    pub constraint: LinearConstraint,
}

/// What the callback decided for one candidate
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    /// The candidate is a single tour over every location
    Accepted,
    /// The candidate contains this subtour
    Cut(SubtourCut),
    /// The selection could not be read as a cycle; no cut is produced
    Skipped(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Separation {
    pub verdict: Verdict,
    /// Successor conflicts resolved while reconstructing
    pub ambiguities: usize,
}

/// Cuts registered during one solve
#[derive(Clone, Debug, Default)]
pub struct CutPool {
    subsets: BTreeSet<Vec<usize>>,
    cuts: Vec<LinearConstraint>,
}

impl CutPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, subset: &[usize]) -> bool {
        self.subsets.contains(subset)
    }

    /// Register a cut. Returns false when its subset is already registered.
    pub fn register(&mut self, cut: &SubtourCut) -> bool {
        if !self.subsets.insert(cut.subset.clone()) {
            return false;
        }
        self.cuts.push(cut.constraint.clone());
        true
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.cuts
    }

    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }
}

/// Counters of the callback activity of one solve
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackStats {
    pub candidates: usize,
    pub cuts_added: usize,
    pub duplicate_cuts: usize,
    pub skipped: usize,
    pub ambiguities: usize,
}

pub trait LazyConstraintCallback {
    /// Inspect one integer-feasible candidate. `values` holds every variable
    /// of `formulation` in index order.
    fn separate(&self, formulation: &Formulation, values: &[f64], pool: &CutPool) -> Separation;
}

/// Finds the subtour through the first selected origin
pub struct SubtourSeparator {
    /// A selection value counts as 1 when it is at least `1 - tolerance`
    pub tolerance: f64,
}

impl SubtourSeparator {
    pub fn new(tolerance: f64) -> Self {
        SubtourSeparator { tolerance }
    }
}

impl LazyConstraintCallback for SubtourSeparator {
    fn separate(&self, formulation: &Formulation, values: &[f64], pool: &CutPool) -> Separation {
        let n = formulation.dimension;
        let rec = reconstruct_tour(
            formulation.arcs().map(|(i, j, var)| (i, j, values[var.0])),
            self.tolerance,
        );
        let ambiguities = rec.ambiguities.len();

        let verdict = if rec.is_empty() {
            log::warn!("candidate selects no arc, skipping it");
            Verdict::Skipped("empty selection".to_string())
        } else if !rec.closed {
            log::warn!(
                "candidate path {:?} does not close into a cycle, skipping it",
                rec.tour
            );
            Verdict::Skipped(format!("open path of {} locations", rec.tour.len()))
        } else if rec.tour.len() == n {
            Verdict::Accepted
        } else {
            let mut subset = rec.tour.clone();
            subset.sort_unstable();
            if pool.contains(&subset) {
                log::debug!("subtour {:?} is already cut off, offering the cut again", subset);
            }
            let label = format!("subtour_{}", subset_label_from(&formulation.labels, &subset));
            let constraint = formulation.subset_cut(label, &subset);
            log::debug!(
                "subtour of {} locations found, adding {}",
                subset.len(),
                constraint.label
            );
            Verdict::Cut(SubtourCut { subset, constraint })
        };

        Separation { verdict, ambiguities }
    }
}

/// What the backend must do after a candidate was inspected
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateResponse {
    pub accepted: bool,
    /// Constraints to inject into the live model (may repeat a registered one)
    pub cuts: Vec<LinearConstraint>,
    /// Number of cuts that were not registered before
    pub new_cuts: usize,
}

/// State owned by one solve invocation
pub struct SolveContext<'f> {
    pub formulation: &'f Formulation,
    pub pool: CutPool,
    pub stats: CallbackStats,
}

impl<'f> SolveContext<'f> {
    pub fn new(formulation: &'f Formulation) -> Self {
        SolveContext { formulation, pool: CutPool::new(), stats: CallbackStats::default() }
    }

    /// Run the callback on one candidate and register the cuts it returns
    pub fn on_candidate(&mut self, callback: &dyn LazyConstraintCallback, values: &[f64]) -> CandidateResponse {
        self.stats.candidates += 1;
        let separation = callback.separate(self.formulation, values, &self.pool);
        self.stats.ambiguities += separation.ambiguities;

        match separation.verdict {
            Verdict::Accepted => CandidateResponse { accepted: true, cuts: Vec::new(), new_cuts: 0 },
            Verdict::Skipped(_) => {
                self.stats.skipped += 1;
                CandidateResponse { accepted: false, cuts: Vec::new(), new_cuts: 0 }
            }
            Verdict::Cut(cut) => {
                let new_cuts = if self.pool.register(&cut) {
                    self.stats.cuts_added += 1;
                    1
                } else {
                    self.stats.duplicate_cuts += 1;
                    0
                };
                CandidateResponse { accepted: false, cuts: vec![cut.constraint], new_cuts }
            }
        }
    }
}
