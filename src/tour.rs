//! Tour reconstruction from selected arcs.
//!
//! Turns a set of `(origin, destination, value)` triples into the ordered
//! sequence of locations reachable from the first origin. Arcs whose value is
//! below `1 - tolerance` are ignored. The reconstructor is generic over the
//! location type so it serves both solver indices and user labels.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Default tolerance used when rounding selection values to booleans
pub const DEFAULT_SELECTION_TOLERANCE: f64 = 1e-4;

/// A location with more than one selected outgoing arc
#[derive(Debug, Clone, PartialEq)]
pub struct Ambiguity<L> {
    pub origin: L,
    /// Successor that was kept
    pub kept: L,
    /// Successor that was discarded
    pub discarded: L,
    pub kept_value: f64,
    pub discarded_value: f64,
}

/// Result of following successor links
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction<L> {
    /// Visiting order, without repeating the start location
    pub tour: Vec<L>,
    /// Whether the last location's successor is the first one
    pub closed: bool,
    /// Number of distinct origins with a selected outgoing arc
    pub origins: usize,
    /// Successor conflicts resolved while building the successor map
    pub ambiguities: Vec<Ambiguity<L>>,
}

impl<L> Reconstruction<L> {
    pub fn is_empty(&self) -> bool {
        self.tour.is_empty()
    }

    /// True when the closed cycle visits `n` locations
    pub fn spans(&self, n: usize) -> bool {
        self.closed && self.tour.len() == n
    }
}

/// Follow successor links through the selected arcs.
///
/// When an origin carries several selected arcs, the one whose value is
/// closest to 1 is kept (ties keep the first seen) and the conflict is logged.
/// The walk starts at the first origin encountered and stops when it returns to
/// the start, when it has visited as many locations as there are origins,
/// when it reaches a location without a successor, or when the next location
/// was already visited. The tour never repeats a location.
pub fn reconstruct_tour<L, I>(arcs: I, tolerance: f64) -> Reconstruction<L>
where
    L: Copy + Eq + Hash + std::fmt::Debug,
    I: IntoIterator<Item = (L, L, f64)>,
{
    let mut order: Vec<L> = Vec::new();
    let mut successors: HashMap<L, (L, f64)> = HashMap::new();
    let mut ambiguities = Vec::new();

    for (origin, destination, value) in arcs {
        if value < 1.0 - tolerance {
            continue;
        }
        match successors.get(&origin).copied() {
            None => {
                order.push(origin);
                successors.insert(origin, (destination, value));
            }
            Some((kept, kept_value)) => {
                let ambiguity = if (1.0 - value).abs() < (1.0 - kept_value).abs() {
                    successors.insert(origin, (destination, value));
                    Ambiguity {
                        origin,
                        kept: destination,
                        discarded: kept,
                        kept_value: value,
                        discarded_value: kept_value,
                    }
                } else {
                    Ambiguity {
                        origin,
                        kept,
                        discarded: destination,
                        kept_value,
                        discarded_value: value,
                    }
                };
                log::warn!(
                    "location {:?} has several selected successors, keeping {:?} ({:.6}) over {:?} ({:.6})",
                    ambiguity.origin,
                    ambiguity.kept,
                    ambiguity.kept_value,
                    ambiguity.discarded,
                    ambiguity.discarded_value
                );
                ambiguities.push(ambiguity);
            }
        }
    }

    let Some(&start) = order.first() else {
        log::debug!("no selected arcs, nothing to reconstruct");
        return Reconstruction { tour: Vec::new(), closed: false, origins: 0, ambiguities };
    };

    let origins = order.len();
    let mut tour = vec![start];
    let mut visited: HashSet<L> = HashSet::from([start]);
    let mut closed = false;

    while tour.len() < origins {
        let last = tour[tour.len() - 1];
        let Some(&(next, _)) = successors.get(&last) else {
            break;
        };
        if next == start {
            closed = true;
            break;
        }
        if !visited.insert(next) {
            log::debug!("walk from {:?} re-enters {:?} without closing", start, next);
            break;
        }
        tour.push(next);
    }

    if !closed {
        // the length bound stopped the walk, check whether it closes anyway
        let last = tour[tour.len() - 1];
        closed = successors.get(&last).map(|&(next, _)| next == start).unwrap_or(false);
    }

    Reconstruction { tour, closed, origins, ambiguities }
}

/// Reconstruct from an `n x n` matrix of selection values indexed by location
pub fn reconstruct_from_matrix(values: &[Vec<f64>], tolerance: f64) -> Reconstruction<usize> {
    reconstruct_tour(
        values.iter().enumerate().flat_map(|(i, row)| {
            row.iter().enumerate().filter(move |(j, _)| *j != i).map(move |(j, &v)| (i, j, v))
        }),
        tolerance,
    )
}

/// Directed arcs of a closed tour, including the closing arc
pub fn tour_arcs(tour: &[usize]) -> Vec<(usize, usize)> {
    if tour.len() < 2 {
        return Vec::new();
    }
    tour.iter()
        .zip(tour.iter().cycle().skip(1))
        .map(|(&a, &b)| (a, b))
        .collect()
}
