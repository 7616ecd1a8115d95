//! Local search improvement heuristics.
//!
//! - 2-opt (segment reversal)
//! - Location swap
//! - VND over both
//!
//! They produce warm starts for the exact solver and check exact tours for
//! local optimality.

use crate::instance::TspInstance;
use crate::solution::Solution;

const IMPROVEMENT_EPS: f64 = 1e-9;

/// Trait for local search improvement methods
pub trait LocalSearch {
    fn improve(&self, instance: &TspInstance, solution: &mut Solution) -> bool;
    fn name(&self) -> &str;
}

/// 2-Opt Local Search
///
/// Reverses segments of the tour to reduce total cost. On asymmetric costs
/// the reversed segment is re-evaluated in full.
pub struct TwoOptSearch {
    /// Use first improvement instead of best improvement
    pub first_improvement: bool,
    /// Maximum number of applied moves
    pub max_iterations: usize,
}

impl TwoOptSearch {
    pub fn new() -> Self {
        TwoOptSearch {
            first_improvement: false,
            max_iterations: 1000,
        }
    }

    pub fn first_improvement() -> Self {
        TwoOptSearch {
            first_improvement: true,
            max_iterations: 1000,
        }
    }
}

impl Default for TwoOptSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSearch for TwoOptSearch {
    fn improve(&self, instance: &TspInstance, solution: &mut Solution) -> bool {
        let n = solution.tour.len();
        if n < 4 {
            return false;
        }

        let mut total_improved = false;
        let symmetric = instance.is_symmetric();

        for _ in 0..self.max_iterations {
            let mut best: Option<(usize, usize, f64)> = None;

            'outer: for i in 0..n - 2 {
                for j in i + 2..n {
                    if i == 0 && j == n - 1 {
                        continue; // reverses the whole tour
                    }

                    let delta = solution.two_opt_delta_with(instance, i, j, symmetric);
                    if delta < best.map_or(-IMPROVEMENT_EPS, |(_, _, d)| d) {
                        best = Some((i, j, delta));
                        if self.first_improvement {
                            break 'outer;
                        }
                    }
                }
            }

            match best {
                Some((i, j, delta)) => {
                    solution.apply_two_opt(i, j);
                    solution.cost += delta;
                    total_improved = true;
                }
                None => break,
            }
        }

        solution.validate(instance);
        total_improved
    }

    fn name(&self) -> &str {
        if self.first_improvement {
            "2-Opt-FI"
        } else {
            "2-Opt-BI"
        }
    }
}

/// Location Swap Local Search
///
/// Exchanges pairs of locations to improve tour cost.
pub struct SwapSearch {
    /// Use first improvement
    pub first_improvement: bool,
}

impl SwapSearch {
    pub fn new() -> Self {
        SwapSearch {
            first_improvement: false,
        }
    }

    pub fn first_improvement() -> Self {
        SwapSearch {
            first_improvement: true,
        }
    }

    fn best_move(&self, instance: &TspInstance, solution: &Solution) -> Option<(usize, usize, f64)> {
        let n = solution.tour.len();
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..n - 1 {
            for j in i + 1..n {
                let delta = solution.swap_delta(instance, i, j);
                if delta < best.map_or(-IMPROVEMENT_EPS, |(_, _, d)| d) {
                    best = Some((i, j, delta));
                    if self.first_improvement {
                        return best;
                    }
                }
            }
        }
        best
    }
}

impl Default for SwapSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSearch for SwapSearch {
    fn improve(&self, instance: &TspInstance, solution: &mut Solution) -> bool {
        let n = solution.tour.len();
        if n < 3 {
            return false;
        }

        let mut total_improved = false;
        let max_iterations = n * n;

        for _ in 0..max_iterations {
            let Some((i, j, delta)) = self.best_move(instance, solution) else {
                break;
            };
            solution.apply_swap(i, j);
            solution.cost += delta;
            total_improved = true;
        }

        solution.validate(instance);
        total_improved
    }

    fn name(&self) -> &str {
        "Swap"
    }
}

/// True when no exchange of two locations lowers the tour cost
pub fn is_swap_optimal(instance: &TspInstance, solution: &Solution) -> bool {
    if solution.tour.len() < 3 {
        return true;
    }
    SwapSearch::first_improvement().best_move(instance, solution).is_none()
}

/// Variable Neighborhood Descent (VND)
///
/// Applies multiple local search operators in a systematic way.
pub struct VND {
    /// List of local search operators
    operators: Vec<Box<dyn LocalSearch + Send + Sync>>,
}

impl VND {
    pub fn new() -> Self {
        VND {
            operators: Vec::new(),
        }
    }

    pub fn with_standard_operators() -> Self {
        let operators: Vec<Box<dyn LocalSearch + Send + Sync>> = vec![
            Box::new(TwoOptSearch::first_improvement()),
            Box::new(SwapSearch::first_improvement()),
        ];

        VND { operators }
    }

    pub fn add_operator<L: LocalSearch + Send + Sync + 'static>(&mut self, op: L) {
        self.operators.push(Box::new(op));
    }
}

impl Default for VND {
    fn default() -> Self {
        Self::with_standard_operators()
    }
}

impl LocalSearch for VND {
    fn improve(&self, instance: &TspInstance, solution: &mut Solution) -> bool {
        let mut total_improved = false;
        let mut k = 0;
        let mut total_iterations = 0;
        let max_total_iterations = 100;

        while k < self.operators.len() && total_iterations < max_total_iterations {
            if self.operators[k].improve(instance, solution) {
                total_improved = true;
                k = 0;
            } else {
                k += 1;
            }
            total_iterations += 1;
        }

        total_improved
    }

    fn name(&self) -> &str {
        "VND"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::construction::{ConstructionHeuristic, NearestNeighborHeuristic};
    use crate::instance::DistanceMetric;

    #[test]
    fn test_two_opt_removes_crossing() {
        let points = vec![
            ("a".to_string(), 0.0, 0.0),
            ("b".to_string(), 1.0, 0.0),
            ("c".to_string(), 1.0, 1.0),
            ("d".to_string(), 0.0, 1.0),
        ];
        let instance = TspInstance::from_coordinates("square", points, DistanceMetric::Euclidean).unwrap();
        let mut solution = Solution::from_tour(&instance, vec![0, 2, 1, 3], "test");
        assert!(TwoOptSearch::new().improve(&instance, &mut solution));
        assert!((solution.cost - 4.0).abs() < 1e-9);
        assert!(is_swap_optimal(&instance, &solution));
    }

    #[test]
    fn test_vnd_result_is_swap_optimal() {
        let instance = TspInstance::random(15, 6, DistanceMetric::Euclidean).unwrap();
        let mut solution = NearestNeighborHeuristic::new().construct(&instance);
        let before = solution.cost;
        VND::with_standard_operators().improve(&instance, &mut solution);
        assert!(solution.cost <= before + 1e-9);
        assert!(solution.feasible);
        assert!(is_swap_optimal(&instance, &solution));
    }

    #[test]
    fn test_asymmetric_two_opt_keeps_cost_consistent() {
        let matrix = vec![
            vec![0.0, 1.0, 9.0, 4.0],
            vec![7.0, 0.0, 2.0, 8.0],
            vec![3.0, 6.0, 0.0, 1.0],
            vec![1.0, 5.0, 9.0, 0.0],
        ];
        let labels = (0..4).map(|i| i.to_string()).collect();
        let instance = TspInstance::from_matrix("asym", labels, matrix).unwrap();
        let mut solution = Solution::from_tour(&instance, vec![0, 3, 2, 1], "test");
        TwoOptSearch::new().improve(&instance, &mut solution);
        assert!((solution.cost - instance.tour_length(&solution.tour)).abs() < 1e-9);
        assert!(solution.cost < 26.0);
    }
}
