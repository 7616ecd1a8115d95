//! Tour solutions and move evaluation.
//!
//! A tour is stored without repeating its first location; the closing arc
//! back to the start is implied.

use crate::instance::TspInstance;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A closed tour over the locations of an instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    /// Location indices in visiting order
    pub tour: Vec<usize>,
    /// Location labels in visiting order
    pub labels: Vec<String>,
    /// Total tour cost, closing arc included
    pub cost: f64,
    /// Whether every location is visited exactly once
    pub feasible: bool,
    /// Algorithm that generated this solution
    pub algorithm: String,
    /// Computation time in seconds
    pub computation_time: f64,
    /// Number of iterations (if applicable)
    pub iterations: Option<usize>,
}

impl Solution {
    /// Create a new empty solution
    pub fn new() -> Self {
        Solution {
            tour: Vec::new(),
            labels: Vec::new(),
            cost: f64::INFINITY,
            feasible: false,
            algorithm: String::new(),
            computation_time: 0.0,
            iterations: None,
        }
    }

    /// Create a solution from a tour
    pub fn from_tour(instance: &TspInstance, tour: Vec<usize>, algorithm: &str) -> Self {
        let mut solution = Solution {
            tour,
            algorithm: algorithm.to_string(),
            ..Solution::new()
        };
        solution.validate(instance);
        solution
    }

    /// Recompute cost, labels and feasibility from the tour
    pub fn validate(&mut self, instance: &TspInstance) {
        self.feasible = self.is_complete(instance);
        if self.tour.iter().any(|&i| i >= instance.dimension) {
            self.cost = f64::INFINITY;
            self.labels.clear();
            return;
        }
        self.cost = instance.tour_length(&self.tour);
        self.labels = instance.labels(&self.tour);
    }

    /// Check if all locations are visited exactly once
    pub fn is_complete(&self, instance: &TspInstance) -> bool {
        if self.tour.len() != instance.dimension {
            return false;
        }

        let unique: HashSet<usize> = self.tour.iter().cloned().collect();
        unique.len() == instance.dimension && self.tour.iter().all(|&i| i < instance.dimension)
    }

    /// Get the position of a location in the tour
    pub fn position(&self, location: usize) -> Option<usize> {
        self.tour.iter().position(|&n| n == location)
    }

    /// Get the location at a given position (circular)
    pub fn location_at(&self, pos: usize) -> usize {
        self.tour[pos % self.tour.len()]
    }

    pub fn successor(&self, location: usize) -> Option<usize> {
        self.position(location).map(|pos| self.location_at(pos + 1))
    }

    pub fn predecessor(&self, location: usize) -> Option<usize> {
        self.position(location).map(|pos| {
            if pos == 0 {
                self.tour[self.tour.len() - 1]
            } else {
                self.tour[pos - 1]
            }
        })
    }

    /// Cost change of exchanging the locations at positions `i` and `j`.
    /// Costs may be asymmetric, so the whole tour is re-evaluated.
    pub fn swap_delta(&self, instance: &TspInstance, i: usize, j: usize) -> f64 {
        if i == j || self.tour.len() < 3 {
            return 0.0;
        }

        let mut new_tour = self.tour.clone();
        new_tour.swap(i, j);
        instance.tour_length(&new_tour) - instance.tour_length(&self.tour)
    }

    /// Cost change of reversing the segment between positions `i + 1` and `j`
    pub fn two_opt_delta(&self, instance: &TspInstance, i: usize, j: usize) -> f64 {
        self.two_opt_delta_with(instance, i, j, instance.is_symmetric())
    }

    /// Same as [`Solution::two_opt_delta`] with the symmetry of `instance`
    /// known by the caller. Symmetric costs take the four-arc shortcut.
    pub fn two_opt_delta_with(&self, instance: &TspInstance, i: usize, j: usize, symmetric: bool) -> f64 {
        let n = self.tour.len();
        if i >= j || j >= n {
            return 0.0;
        }

        if symmetric {
            let a = self.tour[i];
            let b = self.tour[i + 1];
            let c = self.tour[j];
            let d = self.tour[(j + 1) % n];
            if d == a {
                return 0.0;
            }
            return instance.distance(a, c) + instance.distance(b, d)
                - instance.distance(a, b)
                - instance.distance(c, d);
        }

        let mut new_tour = self.tour.clone();
        new_tour[i + 1..=j].reverse();
        instance.tour_length(&new_tour) - instance.tour_length(&self.tour)
    }

    /// Apply a 2-opt move (reverse segment between i+1 and j)
    pub fn apply_two_opt(&mut self, i: usize, j: usize) {
        self.tour[i + 1..=j].reverse();
    }

    pub fn apply_swap(&mut self, i: usize, j: usize) {
        self.tour.swap(i, j);
    }

    /// Rotate the tour so that it starts at `location`
    pub fn rotate_to(&mut self, location: usize) {
        if let Some(pos) = self.position(location) {
            self.tour.rotate_left(pos);
            self.labels.rotate_left(pos);
        }
    }
}

impl Default for Solution {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Solution ({})", self.algorithm)?;
        writeln!(f, "  Cost: {:.2}", self.cost)?;
        writeln!(f, "  Complete: {}", self.feasible)?;
        writeln!(f, "  Time: {:.4}s", self.computation_time)?;
        if let Some(iter) = self.iterations {
            writeln!(f, "  Iterations: {}", iter)?;
        }
        if let Some(first) = self.labels.first() {
            writeln!(f, "  Tour: {} -> {}", self.labels.join(" -> "), first)
        } else {
            writeln!(f, "  Tour: {:?}", self.tour)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::DistanceMetric;

    fn square() -> TspInstance {
        let points = vec![
            ("a".to_string(), 0.0, 0.0),
            ("b".to_string(), 1.0, 0.0),
            ("c".to_string(), 1.0, 1.0),
            ("d".to_string(), 0.0, 1.0),
        ];
        TspInstance::from_coordinates("square", points, DistanceMetric::Euclidean).unwrap()
    }

    #[test]
    fn test_solution_creation() {
        let sol = Solution::new();
        assert!(sol.tour.is_empty());
        assert!(!sol.feasible);
        assert_eq!(sol.cost, f64::INFINITY);
    }

    #[test]
    fn test_from_tour_closes_the_cycle() {
        let instance = square();
        let sol = Solution::from_tour(&instance, vec![0, 1, 2, 3], "test");
        assert!((sol.cost - 4.0).abs() < 1e-6);
        assert!(sol.feasible);
        assert_eq!(sol.labels, vec!["a", "b", "c", "d"]);
        assert_eq!(sol.successor(3), Some(0));
        assert_eq!(sol.predecessor(0), Some(3));
    }

    #[test]
    fn test_incomplete_tour() {
        let instance = square();
        assert!(!Solution::from_tour(&instance, vec![0, 1, 2], "test").feasible);
        assert!(!Solution::from_tour(&instance, vec![0, 1, 1, 2], "test").feasible);
    }

    #[test]
    fn test_deltas_match_recomputed_cost() {
        let instance = square();
        let crossing = Solution::from_tour(&instance, vec![0, 2, 1, 3], "test");
        let delta = crossing.two_opt_delta(&instance, 0, 2);
        let mut fixed = crossing.clone();
        fixed.apply_two_opt(0, 2);
        fixed.validate(&instance);
        assert!((crossing.cost + delta - fixed.cost).abs() < 1e-9);
        assert!(delta < 0.0);

        let swap = crossing.swap_delta(&instance, 1, 2);
        assert!((crossing.cost + swap - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_two_opt_shortcut_matches_full_evaluation() {
        let instance = TspInstance::random(9, 4, DistanceMetric::Euclidean).unwrap();
        let sol = Solution::from_tour(&instance, vec![0, 5, 2, 7, 1, 8, 3, 6, 4], "test");
        for i in 0..7 {
            for j in i + 2..9 {
                let shortcut = sol.two_opt_delta_with(&instance, i, j, true);
                let full = sol.two_opt_delta_with(&instance, i, j, false);
                assert!((shortcut - full).abs() < 1e-9, "move ({}, {})", i, j);
            }
        }
    }

    #[test]
    fn test_rotate_keeps_labels_aligned() {
        let instance = square();
        let mut sol = Solution::from_tour(&instance, vec![0, 1, 2, 3], "test");
        sol.rotate_to(2);
        assert_eq!(sol.tour, vec![2, 3, 0, 1]);
        assert_eq!(sol.labels[0], "c");
    }
}
