use crate::instance::TspInstance;
use crate::solution::Solution;
use ordered_float::OrderedFloat;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;

pub trait ConstructionHeuristic {
    fn construct(&self, instance: &TspInstance) -> Solution;
    fn name(&self) -> &str;
}

/// Nearest Neighbor Heuristic
///
/// Builds a tour from location 0 by repeatedly moving to the cheapest
/// unvisited location. The randomized variant picks among the three cheapest.
pub struct NearestNeighborHeuristic {
    pub randomized: bool,
    pub seed: u64,
}

impl NearestNeighborHeuristic {
    pub fn new() -> Self {
        NearestNeighborHeuristic {
            randomized: false,
            seed: 42,
        }
    }

    pub fn randomized(seed: u64) -> Self {
        NearestNeighborHeuristic {
            randomized: true,
            seed,
        }
    }

    fn find_nearest(
        &self,
        instance: &TspInstance,
        current: usize,
        visited: &[bool],
        rng: &mut ChaCha8Rng,
    ) -> Option<usize> {
        let mut candidates: Vec<(usize, f64)> = (0..instance.dimension)
            .filter(|&n| !visited[n])
            .map(|n| (n, instance.distance(current, n)))
            .collect();

        if candidates.is_empty() {
            return None;
        }

        candidates.sort_by_key(|&(_, d)| OrderedFloat(d));

        if self.randomized && candidates.len() > 1 {
            let top_k = candidates.len().min(3);
            let idx = rng.gen_range(0..top_k);
            Some(candidates[idx].0)
        } else {
            Some(candidates[0].0)
        }
    }
}

impl Default for NearestNeighborHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionHeuristic for NearestNeighborHeuristic {
    fn construct(&self, instance: &TspInstance) -> Solution {
        let start = std::time::Instant::now();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let mut tour = Vec::with_capacity(instance.dimension);
        let mut visited = vec![false; instance.dimension];
        let mut current = 0;
        if instance.dimension > 0 {
            tour.push(0);
            visited[0] = true;
        }

        while let Some(next) = self.find_nearest(instance, current, &visited, &mut rng) {
            tour.push(next);
            visited[next] = true;
            current = next;
        }

        let mut solution = Solution::from_tour(instance, tour, self.name());
        solution.computation_time = start.elapsed().as_secs_f64();
        solution
    }

    fn name(&self) -> &str {
        if self.randomized {
            "NearestNeighbor-Randomized"
        } else {
            "NearestNeighbor"
        }
    }
}

/// Greedy Insertion Heuristic
///
/// Starts from location 0 and one partner, then repeatedly inserts the
/// location with the cheapest insertion (or, for the farthest variant, the
/// location farthest from the partial tour) at its cheapest position.
pub struct GreedyInsertionHeuristic {
    pub farthest_insertion: bool,
}

impl GreedyInsertionHeuristic {
    pub fn new() -> Self {
        GreedyInsertionHeuristic {
            farthest_insertion: false,
        }
    }

    pub fn farthest() -> Self {
        GreedyInsertionHeuristic {
            farthest_insertion: true,
        }
    }

    /// Cost of inserting `location` between `tour[pos]` and its successor
    fn insertion_cost(&self, instance: &TspInstance, tour: &[usize], location: usize, pos: usize) -> f64 {
        let prev = tour[pos];
        let next = tour[(pos + 1) % tour.len()];

        instance.distance(prev, location) + instance.distance(location, next) - instance.distance(prev, next)
    }

    fn find_best_insertion(&self, instance: &TspInstance, tour: &[usize], location: usize) -> (usize, f64) {
        (0..tour.len())
            .map(|pos| (pos, self.insertion_cost(instance, tour, location, pos)))
            .min_by_key(|&(_, cost)| OrderedFloat(cost))
            .unwrap_or((0, f64::INFINITY))
    }
}

impl Default for GreedyInsertionHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionHeuristic for GreedyInsertionHeuristic {
    fn construct(&self, instance: &TspInstance) -> Solution {
        let start = std::time::Instant::now();

        if instance.dimension < 2 {
            return Solution::from_tour(instance, (0..instance.dimension).collect(), self.name());
        }

        let mut tour = vec![0];
        let mut unvisited: BTreeSet<usize> = (1..instance.dimension).collect();

        let round_trip = |n: usize| OrderedFloat(instance.distance(0, n) + instance.distance(n, 0));
        let initial = if self.farthest_insertion {
            unvisited.iter().copied().max_by_key(|&n| round_trip(n))
        } else {
            unvisited.iter().copied().min_by_key(|&n| round_trip(n))
        };
        if let Some(initial) = initial {
            tour.push(initial);
            unvisited.remove(&initial);
        }

        while !unvisited.is_empty() {
            let mut best: Option<(usize, usize, f64)> = None;

            for &location in &unvisited {
                let (pos, cost) = self.find_best_insertion(instance, &tour, location);
                let selection_cost = if self.farthest_insertion {
                    -tour
                        .iter()
                        .map(|&t| instance.distance(t, location))
                        .fold(f64::INFINITY, f64::min)
                } else {
                    cost
                };

                if best.map_or(true, |(_, _, c)| selection_cost < c) {
                    best = Some((location, pos, selection_cost));
                }
            }

            match best {
                Some((location, pos, _)) => {
                    tour.insert(pos + 1, location);
                    unvisited.remove(&location);
                }
                None => break,
            }
        }

        let mut solution = Solution::from_tour(instance, tour, self.name());
        solution.computation_time = start.elapsed().as_secs_f64();
        solution
    }

    fn name(&self) -> &str {
        if self.farthest_insertion {
            "FarthestInsertion"
        } else {
            "GreedyInsertion"
        }
    }
}

/// Multi-Start Construction
///
/// Runs multiple construction heuristics and returns the best result.
pub struct MultiStartConstruction {
    heuristics: Vec<Box<dyn ConstructionHeuristic + Send + Sync>>,
}

impl MultiStartConstruction {
    pub fn new() -> Self {
        MultiStartConstruction {
            heuristics: Vec::new(),
        }
    }

    pub fn with_all_heuristics() -> Self {
        let heuristics: Vec<Box<dyn ConstructionHeuristic + Send + Sync>> = vec![
            Box::new(NearestNeighborHeuristic::new()),
            Box::new(NearestNeighborHeuristic::randomized(1)),
            Box::new(NearestNeighborHeuristic::randomized(2)),
            Box::new(NearestNeighborHeuristic::randomized(3)),
            Box::new(GreedyInsertionHeuristic::new()),
            Box::new(GreedyInsertionHeuristic::farthest()),
        ];

        MultiStartConstruction { heuristics }
    }

    pub fn add_heuristic<H: ConstructionHeuristic + Send + Sync + 'static>(&mut self, h: H) {
        self.heuristics.push(Box::new(h));
    }
}

impl Default for MultiStartConstruction {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionHeuristic for MultiStartConstruction {
    fn construct(&self, instance: &TspInstance) -> Solution {
        let start = std::time::Instant::now();

        let mut best_solution = self
            .heuristics
            .iter()
            .map(|h| h.construct(instance))
            .filter(|s| s.feasible)
            .min_by_key(|s| OrderedFloat(s.cost))
            .unwrap_or_else(|| Solution::from_tour(instance, (0..instance.dimension).collect(), self.name()));

        log::debug!("multi-start picked {} with cost {:.4}", best_solution.algorithm, best_solution.cost);
        best_solution.algorithm = self.name().to_string();
        best_solution.computation_time = start.elapsed().as_secs_f64();
        best_solution
    }

    fn name(&self) -> &str {
        "MultiStart"
    }
}
