//! Module for parsing and representing TSP instances.
//!
//! An instance is a finite set of labelled locations together with a complete
//! cost table over ordered pairs of distinct locations. Costs may be asymmetric.
//! Instances can be built from an explicit arc table, a square matrix, a list of
//! coordinates with a distance metric, a TSP-LIB file, or a JSON arc table.

use crate::error::{TspError, TspResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A location of the instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    /// Index of the location (0-indexed internally)
    pub id: usize,
    /// Label used in input files and reports
    pub label: String,
    /// Planar coordinates, when the instance was derived from coordinates
    pub coords: Option<(f64, f64)>,
}

impl Location {
    pub fn new(id: usize, label: impl Into<String>) -> Self {
        Location { id, label: label.into(), coords: None }
    }

    pub fn with_coords(id: usize, label: impl Into<String>, x: f64, y: f64) -> Self {
        Location { id, label: label.into(), coords: Some((x, y)) }
    }
}

/// Distance function used to derive costs from coordinates
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Plain Euclidean distance
    Euclidean,
    /// Squared Euclidean distance, no square root taken
    SquaredEuclidean,
    /// TSP-LIB EUC_2D: Euclidean distance rounded to the nearest integer
    Euc2d,
}

impl DistanceMetric {
    pub fn distance(&self, a: (f64, f64), b: (f64, f64)) -> f64 {
        let dx = a.0 - b.0;
        let dy = a.1 - b.1;
        let squared = dx * dx + dy * dy;
        match self {
            DistanceMetric::Euclidean => squared.sqrt(),
            DistanceMetric::SquaredEuclidean => squared,
            DistanceMetric::Euc2d => (squared.sqrt() + 0.5).floor(),
        }
    }
}

/// One record of a JSON arc table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArcRecord {
    pub from: String,
    pub to: String,
    pub cost: f64,
}

/// Represents a complete TSP instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TspInstance {
    /// Name of the instance
    pub name: String,
    /// Comment/description
    pub comment: String,
    /// Number of locations
    pub dimension: usize,
    /// All locations, indexed by id
    pub locations: Vec<Location>,
    /// Cost of the arc (i, j); the diagonal is zero and never used
    pub distance_matrix: Vec<Vec<f64>>,
}

impl TspInstance {
    /// Build an instance from a table keyed by ordered location pairs.
    ///
    /// Locations are numbered in order of first appearance. Self-loops are
    /// accepted and ignored. Every ordered pair of distinct locations must be
    /// present exactly once (repeats with an identical cost are tolerated).
    pub fn from_arc_costs<L, I>(name: &str, arcs: I) -> TspResult<Self>
    where
        L: AsRef<str>,
        I: IntoIterator<Item = ((L, L), f64)>,
    {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut labels: Vec<String> = Vec::new();
        let mut entries: Vec<(usize, usize, f64)> = Vec::new();

        for ((from, to), cost) in arcs {
            let mut intern = |label: &str| -> usize {
                if let Some(&id) = index.get(label) {
                    return id;
                }
                let id = labels.len();
                labels.push(label.to_string());
                index.insert(label.to_string(), id);
                id
            };
            let i = intern(from.as_ref());
            let j = intern(to.as_ref());
            entries.push((i, j, cost));
        }

        let n = labels.len();
        if n < 2 {
            return Err(TspError::input(format!(
                "cost table names {} distinct location(s), at least 2 are required",
                n
            )));
        }

        let mut matrix: Vec<Vec<Option<f64>>> = vec![vec![None; n]; n];
        for (i, j, cost) in entries {
            if i == j {
                continue;
            }
            check_cost(&labels[i], &labels[j], cost)?;
            match matrix[i][j] {
                Some(existing) if existing != cost => {
                    return Err(TspError::input(format!(
                        "arc ({}, {}) listed twice with costs {} and {}",
                        labels[i], labels[j], existing, cost
                    )));
                }
                _ => matrix[i][j] = Some(cost),
            }
        }

        let mut distance_matrix = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                distance_matrix[i][j] = matrix[i][j].ok_or_else(|| {
                    TspError::input(format!(
                        "incomplete cost table: arc ({}, {}) is missing",
                        labels[i], labels[j]
                    ))
                })?;
            }
        }

        let locations = labels
            .into_iter()
            .enumerate()
            .map(|(id, label)| Location::new(id, label))
            .collect();

        Ok(TspInstance {
            name: name.to_string(),
            comment: String::new(),
            dimension: n,
            locations,
            distance_matrix,
        })
    }

    /// Build an instance from a square cost matrix
    pub fn from_matrix(name: &str, labels: Vec<String>, matrix: Vec<Vec<f64>>) -> TspResult<Self> {
        let n = labels.len();
        if n < 2 {
            return Err(TspError::input(format!(
                "{} location(s) given, at least 2 are required",
                n
            )));
        }
        if matrix.len() != n || matrix.iter().any(|row| row.len() != n) {
            return Err(TspError::input(format!(
                "cost matrix must be {}x{} to match the location labels",
                n, n
            )));
        }

        let mut distance_matrix = matrix;
        for i in 0..n {
            distance_matrix[i][i] = 0.0;
            for j in 0..n {
                if i != j {
                    check_cost(&labels[i], &labels[j], distance_matrix[i][j])?;
                }
            }
        }

        let locations = labels
            .into_iter()
            .enumerate()
            .map(|(id, label)| Location::new(id, label))
            .collect();

        Ok(TspInstance {
            name: name.to_string(),
            comment: String::new(),
            dimension: n,
            locations,
            distance_matrix,
        })
    }

    /// Build an instance from labelled planar points
    pub fn from_coordinates(
        name: &str,
        points: Vec<(String, f64, f64)>,
        metric: DistanceMetric,
    ) -> TspResult<Self> {
        let n = points.len();
        if n < 2 {
            return Err(TspError::input(format!(
                "{} location(s) given, at least 2 are required",
                n
            )));
        }

        let locations: Vec<Location> = points
            .into_iter()
            .enumerate()
            .map(|(id, (label, x, y))| Location::with_coords(id, label, x, y))
            .collect();
        let distance_matrix = Self::compute_distance_matrix(&locations, metric);

        Ok(TspInstance {
            name: name.to_string(),
            comment: String::new(),
            dimension: n,
            locations,
            distance_matrix,
        })
    }

    /// Uniform random points in a 100x100 square. Deterministic via seed.
    pub fn random(n: usize, seed: u64, metric: DistanceMetric) -> TspResult<Self> {
        use rand::prelude::*;
        use rand_chacha::ChaCha8Rng;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let points = (0..n)
            .map(|i| {
                let x: f64 = rng.gen_range(0.0..100.0);
                let y: f64 = rng.gen_range(0.0..100.0);
                ((i + 1).to_string(), x, y)
            })
            .collect();
        Self::from_coordinates(&format!("random{}_{}", n, seed), points, metric)
    }

    /// Parse a TSP-LIB file with the metric implied by its EDGE_WEIGHT_TYPE
    pub fn from_file<P: AsRef<Path>>(path: P) -> TspResult<Self> {
        Self::from_file_with_metric(path, None)
    }

    /// Parse a TSP-LIB file.
    ///
    /// Supports NODE_COORD_SECTION (EUC_2D, or any metric when `metric` overrides
    /// it) and EDGE_WEIGHT_SECTION in FULL_MATRIX format.
    pub fn from_file_with_metric<P: AsRef<Path>>(
        path: P,
        metric: Option<DistanceMetric>,
    ) -> TspResult<Self> {
        let file = File::open(&path)?;
        let reader = BufReader::new(file);

        let mut name = path
            .as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut comment = String::new();
        let mut dimension = 0usize;
        let mut edge_weight_type = String::from("EUC_2D");
        let mut edge_weight_format = String::from("FULL_MATRIX");
        let mut coords: Vec<(String, f64, f64)> = Vec::new();
        let mut weights: Vec<f64> = Vec::new();

        let mut section = String::new();

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();

            if line.is_empty() || line == "EOF" {
                continue;
            }

            if line.ends_with("_SECTION") {
                section = line.to_string();
                continue;
            }

            if let Some((key, value)) = line.split_once(':') {
                let value = value.trim();
                match key.trim() {
                    "NAME" => {
                        name = value.to_string();
                        continue;
                    }
                    "COMMENT" => {
                        comment = value.to_string();
                        continue;
                    }
                    "DIMENSION" => {
                        dimension = value
                            .parse()
                            .map_err(|_| TspError::input(format!("invalid dimension '{}'", value)))?;
                        continue;
                    }
                    "EDGE_WEIGHT_TYPE" => {
                        edge_weight_type = value.to_string();
                        continue;
                    }
                    "EDGE_WEIGHT_FORMAT" => {
                        edge_weight_format = value.to_string();
                        continue;
                    }
                    "TYPE" | "DISPLAY_DATA_TYPE" | "NODE_COORD_TYPE" => continue,
                    _ => {}
                }
            }

            match section.as_str() {
                "NODE_COORD_SECTION" => {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    if parts.len() >= 3 {
                        let x: f64 = parts[1]
                            .parse()
                            .map_err(|_| TspError::input(format!("invalid x coordinate in '{}'", line)))?;
                        let y: f64 = parts[2]
                            .parse()
                            .map_err(|_| TspError::input(format!("invalid y coordinate in '{}'", line)))?;
                        coords.push((parts[0].to_string(), x, y));
                    }
                }
                "EDGE_WEIGHT_SECTION" => {
                    for token in line.split_whitespace() {
                        let weight: f64 = token
                            .parse()
                            .map_err(|_| TspError::input(format!("invalid edge weight '{}'", token)))?;
                        weights.push(weight);
                    }
                }
                _ => {}
            }
        }

        let mut instance = if edge_weight_type == "EXPLICIT" {
            if edge_weight_format != "FULL_MATRIX" {
                return Err(TspError::input(format!(
                    "unsupported EDGE_WEIGHT_FORMAT '{}', only FULL_MATRIX is read",
                    edge_weight_format
                )));
            }
            if dimension == 0 || weights.len() != dimension * dimension {
                return Err(TspError::input(format!(
                    "EDGE_WEIGHT_SECTION holds {} values, expected {}",
                    weights.len(),
                    dimension * dimension
                )));
            }
            let matrix = weights.chunks(dimension).map(|row| row.to_vec()).collect();
            let labels = (1..=dimension).map(|i| i.to_string()).collect();
            Self::from_matrix(&name, labels, matrix)?
        } else {
            let metric = match (metric, edge_weight_type.as_str()) {
                (Some(metric), _) => metric,
                (None, "EUC_2D") => DistanceMetric::Euc2d,
                (None, other) => {
                    return Err(TspError::input(format!(
                        "unsupported EDGE_WEIGHT_TYPE '{}'",
                        other
                    )))
                }
            };
            if dimension != 0 && coords.len() != dimension {
                log::warn!(
                    "{}: DIMENSION is {} but {} coordinates were read",
                    name,
                    dimension,
                    coords.len()
                );
            }
            Self::from_coordinates(&name, coords, metric)?
        };

        instance.comment = comment;
        Ok(instance)
    }

    /// Read a JSON array of `{ "from": .., "to": .., "cost": .. }` records
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> TspResult<Self> {
        let file = File::open(&path)?;
        let records: Vec<ArcRecord> = serde_json::from_reader(BufReader::new(file))?;
        let name = path
            .as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::from_arc_costs(&name, records.into_iter().map(|r| ((r.from, r.to), r.cost)))
    }

    /// Load by extension: `.json` arc tables, anything else as TSP-LIB
    pub fn load<P: AsRef<Path>>(path: P, metric: Option<DistanceMetric>) -> TspResult<Self> {
        let is_json = path
            .as_ref()
            .extension()
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_json_file(path)
        } else {
            Self::from_file_with_metric(path, metric)
        }
    }

    /// Compute the cost matrix for coordinate-based locations
    fn compute_distance_matrix(locations: &[Location], metric: DistanceMetric) -> Vec<Vec<f64>> {
        let n = locations.len();
        let mut matrix = vec![vec![0.0; n]; n];

        for i in 0..n {
            for j in 0..n {
                if i != j {
                    let a = locations[i].coords.unwrap_or_default();
                    let b = locations[j].coords.unwrap_or_default();
                    matrix[i][j] = metric.distance(a, b);
                }
            }
        }

        matrix
    }

    /// Reject instances a formulation cannot be built for
    pub fn validate(&self) -> TspResult<()> {
        let n = self.dimension;
        if n < 2 {
            return Err(TspError::input(format!(
                "{} location(s), at least 2 distinct locations are required",
                n
            )));
        }
        if n < 3 {
            return Err(TspError::input(
                "2 locations cannot form a tour without self-loops, at least 3 are required",
            ));
        }
        if self.locations.len() != n
            || self.distance_matrix.len() != n
            || self.distance_matrix.iter().any(|row| row.len() != n)
        {
            return Err(TspError::input(format!(
                "cost table is not {}x{}",
                n, n
            )));
        }
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    check_cost(self.label(i), self.label(j), self.distance_matrix[i][j])?;
                }
            }
        }
        Ok(())
    }

    /// Get the cost of the arc (i, j)
    #[inline]
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        self.distance_matrix[i][j]
    }

    /// All arcs (i, j) with i != j
    pub fn arcs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let n = self.dimension;
        (0..n).flat_map(move |i| (0..n).filter(move |&j| j != i).map(move |j| (i, j)))
    }

    pub fn label(&self, id: usize) -> &str {
        &self.locations[id].label
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.locations.iter().position(|l| l.label == label)
    }

    pub fn labels(&self, tour: &[usize]) -> Vec<String> {
        tour.iter().map(|&i| self.label(i).to_string()).collect()
    }

    /// Calculate the cost of a closed tour (returning to its first location)
    pub fn tour_length(&self, tour: &[usize]) -> f64 {
        if tour.len() < 2 {
            return 0.0;
        }

        let mut length = 0.0;
        for i in 0..tour.len() - 1 {
            length += self.distance(tour[i], tour[i + 1]);
        }

        length += self.distance(tour[tour.len() - 1], tour[0]);

        length
    }

    pub fn is_symmetric(&self) -> bool {
        let n = self.dimension;
        (0..n).all(|i| {
            (i + 1..n).all(|j| (self.distance_matrix[i][j] - self.distance_matrix[j][i]).abs() < 1e-9)
        })
    }

    /// Get statistics about the instance
    pub fn statistics(&self) -> InstanceStatistics {
        let costs: Vec<f64> = self.arcs().map(|(i, j)| self.distance(i, j)).collect();
        let avg_cost = if costs.is_empty() {
            0.0
        } else {
            costs.iter().sum::<f64>() / costs.len() as f64
        };
        let min_cost = costs.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_cost = costs.iter().cloned().fold(0.0, f64::max);

        InstanceStatistics {
            name: self.name.clone(),
            dimension: self.dimension,
            num_arcs: costs.len(),
            symmetric: self.is_symmetric(),
            has_coordinates: self.locations.iter().all(|l| l.coords.is_some()),
            avg_cost,
            min_cost,
            max_cost,
        }
    }
}

fn check_cost(from: &str, to: &str, cost: f64) -> TspResult<()> {
    if !cost.is_finite() || cost < 0.0 {
        return Err(TspError::input(format!(
            "arc ({}, {}) has cost {}, costs must be finite and non-negative",
            from, to, cost
        )));
    }
    Ok(())
}

/// Statistics about a TSP instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub name: String,
    pub dimension: usize,
    pub num_arcs: usize,
    pub symmetric: bool,
    pub has_coordinates: bool,
    pub avg_cost: f64,
    pub min_cost: f64,
    pub max_cost: f64,
}

impl std::fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Instance: {}", self.name)?;
        writeln!(f, "  Locations: {}", self.dimension)?;
        writeln!(f, "  Arcs: {}", self.num_arcs)?;
        writeln!(f, "  Symmetric: {}", self.symmetric)?;
        writeln!(f, "  Coordinates: {}", self.has_coordinates)?;
        writeln!(f, "  Avg cost: {:.2}", self.avg_cost)?;
        writeln!(f, "  Min cost: {:.2}", self.min_cost)?;
        writeln!(f, "  Max cost: {:.2}", self.max_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_distance_calculation() {
        let locations = vec![
            Location::with_coords(0, "1", 0.0, 0.0),
            Location::with_coords(1, "2", 3.0, 4.0),
        ];
        let matrix = TspInstance::compute_distance_matrix(&locations, DistanceMetric::Euclidean);
        assert!((matrix[0][1] - 5.0).abs() < 1e-10);
        assert!((matrix[1][0] - 5.0).abs() < 1e-10);

        let squared = TspInstance::compute_distance_matrix(&locations, DistanceMetric::SquaredEuclidean);
        assert!((squared[0][1] - 25.0).abs() < 1e-10);
    }

    #[test]
    fn test_euc_2d_rounds_to_nearest() {
        assert_eq!(DistanceMetric::Euc2d.distance((0.0, 0.0), (1.0, 1.0)), 1.0);
        assert_eq!(DistanceMetric::Euc2d.distance((0.0, 0.0), (1.2, 1.2)), 2.0);
    }

    #[test]
    fn test_arc_table_ignores_self_loops() {
        let arcs = vec![
            (("A", "A"), 0.0),
            (("A", "B"), 1.0),
            (("B", "A"), 2.0),
            (("B", "B"), 0.0),
        ];
        let instance = TspInstance::from_arc_costs("ab", arcs).unwrap();
        assert_eq!(instance.dimension, 2);
        assert_eq!(instance.distance(0, 1), 1.0);
        assert_eq!(instance.distance(1, 0), 2.0);
        assert!(!instance.is_symmetric());
    }

    #[test]
    fn test_incomplete_table_is_rejected() {
        let arcs = vec![(("A", "B"), 1.0), (("B", "A"), 1.0), (("A", "C"), 1.0)];
        let err = TspInstance::from_arc_costs("abc", arcs).unwrap_err();
        assert!(matches!(err, TspError::InputError(_)));
    }

    #[test]
    fn test_single_location_is_rejected() {
        let arcs = vec![(("A", "A"), 0.0)];
        assert!(matches!(
            TspInstance::from_arc_costs("a", arcs),
            Err(TspError::InputError(_))
        ));
    }

    #[test]
    fn test_negative_cost_is_rejected() {
        let matrix = vec![vec![0.0, -1.0], vec![1.0, 0.0]];
        let labels = vec!["A".to_string(), "B".to_string()];
        assert!(TspInstance::from_matrix("neg", labels, matrix).is_err());
    }

    #[test]
    fn test_non_square_matrix_is_rejected() {
        let matrix = vec![vec![0.0, 1.0, 2.0], vec![1.0, 0.0]];
        let labels = vec!["A".to_string(), "B".to_string()];
        assert!(TspInstance::from_matrix("ragged", labels, matrix).is_err());
    }

    #[test]
    fn test_validate_requires_three_locations() {
        let matrix = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        let labels = vec!["A".to_string(), "B".to_string()];
        let instance = TspInstance::from_matrix("two", labels, matrix).unwrap();
        assert!(instance.validate().is_err());
    }

    #[test]
    fn test_parse_tsplib_coordinates() {
        let dir = std::env::temp_dir().join("tsp_exact_solver_instance_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("square4.tsp");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "NAME : square4").unwrap();
        writeln!(file, "TYPE : TSP").unwrap();
        writeln!(file, "DIMENSION : 4").unwrap();
        writeln!(file, "EDGE_WEIGHT_TYPE : EUC_2D").unwrap();
        writeln!(file, "NODE_COORD_SECTION").unwrap();
        writeln!(file, "1 0 0").unwrap();
        writeln!(file, "2 10 0").unwrap();
        writeln!(file, "3 10 10").unwrap();
        writeln!(file, "4 0 10").unwrap();
        writeln!(file, "EOF").unwrap();
        drop(file);

        let instance = TspInstance::from_file(&path).unwrap();
        assert_eq!(instance.name, "square4");
        assert_eq!(instance.dimension, 4);
        assert_eq!(instance.label(2), "3");
        assert_eq!(instance.distance(0, 1), 10.0);
        assert_eq!(instance.distance(0, 2), 14.0);
        assert_eq!(instance.tour_length(&[0, 1, 2, 3]), 40.0);

        let squared =
            TspInstance::from_file_with_metric(&path, Some(DistanceMetric::SquaredEuclidean)).unwrap();
        assert_eq!(squared.distance(0, 2), 200.0);
    }

    #[test]
    fn test_parse_tsplib_full_matrix() {
        let dir = std::env::temp_dir().join("tsp_exact_solver_instance_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("explicit3.tsp");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "NAME: explicit3").unwrap();
        writeln!(file, "DIMENSION: 3").unwrap();
        writeln!(file, "EDGE_WEIGHT_TYPE: EXPLICIT").unwrap();
        writeln!(file, "EDGE_WEIGHT_FORMAT: FULL_MATRIX").unwrap();
        writeln!(file, "EDGE_WEIGHT_SECTION").unwrap();
        writeln!(file, "0 1 2").unwrap();
        writeln!(file, "3 0 4").unwrap();
        writeln!(file, "5 6 0").unwrap();
        writeln!(file, "EOF").unwrap();
        drop(file);

        let instance = TspInstance::from_file(&path).unwrap();
        assert_eq!(instance.dimension, 3);
        assert_eq!(instance.distance(1, 2), 4.0);
        assert_eq!(instance.distance(2, 0), 5.0);
    }

    #[test]
    fn test_random_is_deterministic() {
        let a = TspInstance::random(6, 7, DistanceMetric::Euclidean).unwrap();
        let b = TspInstance::random(6, 7, DistanceMetric::Euclidean).unwrap();
        assert_eq!(a.distance_matrix, b.distance_matrix);
        assert!(a.is_symmetric());
    }
}
