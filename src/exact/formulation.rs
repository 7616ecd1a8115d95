//! Solver-independent MIP formulations of the TSP.
//!
//! The formulation uses:
//! - Binary variables x_{i}_{j} for every arc i != j
//! - Degree constraints: every location is left once and visited once
//! - One subtour elimination strategy:
//!   - enumerated DFJ cuts over every proper subset of locations
//!   - lazy DFJ cuts added by a callback during the search
//!   - MTZ position variables b_{i}

use crate::error::{TspError, TspResult};
use crate::instance::TspInstance;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write;

/// Largest instance for which every subset cut is written up front
pub const MAX_ENUMERATED_LOCATIONS: usize = 16;

/// Handle of a variable inside a [`Formulation`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    Binary,
    Continuous,
    Integer,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    pub lower: f64,
    pub upper: f64,
    /// Objective coefficient
    pub obj: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

impl Sense {
    pub fn symbol(&self) -> &'static str {
        match self {
            Sense::Le => "<=",
            Sense::Ge => ">=",
            Sense::Eq => "=",
        }
    }
}

/// A labelled linear constraint `sum(coef * var) sense rhs`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    pub label: String,
    pub terms: Vec<(VarId, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

impl LinearConstraint {
    /// Build a constraint, merging repeated variables into one term
    pub fn new(label: impl Into<String>, terms: Vec<(VarId, f64)>, sense: Sense, rhs: f64) -> Self {
        let mut merged: Vec<(VarId, f64)> = Vec::with_capacity(terms.len());
        for (var, coef) in terms {
            match merged.iter_mut().find(|(v, _)| *v == var) {
                Some(term) => term.1 += coef,
                None => merged.push((var, coef)),
            }
        }
        LinearConstraint { label: label.into(), terms: merged, sense, rhs }
    }

    pub fn lhs(&self, values: &[f64]) -> f64 {
        self.terms.iter().map(|&(v, c)| c * values[v.0]).sum()
    }

    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.lhs(values);
        match self.sense {
            Sense::Le => lhs <= self.rhs + tolerance,
            Sense::Ge => lhs >= self.rhs - tolerance,
            Sense::Eq => (lhs - self.rhs).abs() <= tolerance,
        }
    }
}

/// Subtour elimination strategy, chosen once when the formulation is built
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// DFJ cuts for every subset of 2..n-1 locations, written before solving
    Enumerated,
    /// DFJ cuts generated from integer candidates during the search
    Lazy,
    /// Miller-Tucker-Zemlin position variables, `start` is fixed to position 1
    Mtz { start: usize },
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Enumerated => "DFJ-Enumerated",
            Strategy::Lazy => "DFJ-Lazy",
            Strategy::Mtz { .. } => "MTZ",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Capability shared by the subtour elimination strategies
pub trait SubtourElimination {
    fn add_constraints(&self, instance: &TspInstance, formulation: &mut Formulation) -> TspResult<()>;
}

/// Writes every DFJ subset cut up front
pub struct EnumeratedCuts;

/// Leaves subtour elimination to the lazy-constraint callback
pub struct LazyCuts;

/// MTZ ordering constraints anchored at `start`
pub struct MtzConstraints {
    pub start: usize,
}

impl SubtourElimination for EnumeratedCuts {
    fn add_constraints(&self, instance: &TspInstance, formulation: &mut Formulation) -> TspResult<()> {
        let n = instance.dimension;
        if n > MAX_ENUMERATED_LOCATIONS {
            return Err(TspError::input(format!(
                "enumerated cuts need 2^{} - {} - 2 constraints, use the lazy or MTZ strategy above {} locations",
                n, n, MAX_ENUMERATED_LOCATIONS
            )));
        }

        let mut added = 0usize;
        for mask in 1u32..(1u32 << n) - 1 {
            let size = mask.count_ones() as usize;
            if size < 2 {
                continue;
            }
            let subset: Vec<usize> = (0..n).filter(|&i| mask & (1 << i) != 0).collect();
            let label = format!("remove_subtour_{}", subset_label(instance, &subset));
            let cut = formulation.subset_cut(label, &subset);
            formulation.add_constraint(cut);
            added += 1;
        }
        log::debug!("added {} enumerated subtour constraints", added);
        Ok(())
    }
}

impl SubtourElimination for LazyCuts {
    fn add_constraints(&self, _instance: &TspInstance, formulation: &mut Formulation) -> TspResult<()> {
        formulation.lazy_constraints = true;
        Ok(())
    }
}

impl SubtourElimination for MtzConstraints {
    fn add_constraints(&self, instance: &TspInstance, formulation: &mut Formulation) -> TspResult<()> {
        let n = instance.dimension;
        if self.start >= n {
            return Err(TspError::input(format!(
                "MTZ start location {} is out of range for {} locations",
                self.start, n
            )));
        }

        let big_n = n as f64;
        let mut positions = Vec::with_capacity(n);
        for i in 0..n {
            let var = formulation.add_var(
                format!("b_{}", instance.label(i)),
                VarKind::Continuous,
                1.0,
                big_n,
                0.0,
            );
            positions.push(var);
        }

        formulation.add_constraint(LinearConstraint::new(
            "first_city",
            vec![(positions[self.start], 1.0)],
            Sense::Eq,
            1.0,
        ));

        // b_i + 1 - n(1 - x_ij) <= b_j  <=>  b_i - b_j + n x_ij <= n - 1
        for (i, j) in instance.arcs() {
            if j == self.start {
                continue;
            }
            let x = formulation.arc_var(i, j)?;
            formulation.add_constraint(LinearConstraint::new(
                format!("mtz_{}_{}", instance.label(i), instance.label(j)),
                vec![(positions[i], 1.0), (positions[j], -1.0), (x, big_n)],
                Sense::Le,
                big_n - 1.0,
            ));
        }

        formulation.position_vars = Some(positions);
        Ok(())
    }
}

impl SubtourElimination for Strategy {
    fn add_constraints(&self, instance: &TspInstance, formulation: &mut Formulation) -> TspResult<()> {
        match *self {
            Strategy::Enumerated => EnumeratedCuts.add_constraints(instance, formulation),
            Strategy::Lazy => LazyCuts.add_constraints(instance, formulation),
            Strategy::Mtz { start } => MtzConstraints { start }.add_constraints(instance, formulation),
        }
    }
}

/// A minimisation MIP together with the arc variable map of the instance
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Formulation {
    pub name: String,
    pub strategy: Strategy,
    pub dimension: usize,
    pub variables: Vec<Variable>,
    pub constraints: Vec<LinearConstraint>,
    /// `arc_vars[i][j]` is the selection variable of arc (i, j), `None` on the diagonal
    pub arc_vars: Vec<Vec<Option<VarId>>>,
    /// MTZ position variables, one per location
    pub position_vars: Option<Vec<VarId>>,
    /// Backend must enable lazy constraints and register the subtour callback
    pub lazy_constraints: bool,
    /// Location labels, used for readable cut labels
    pub labels: Vec<String>,
}

impl Formulation {
    /// Build the full formulation of `instance` for `strategy`
    pub fn build(instance: &TspInstance, strategy: Strategy) -> TspResult<Self> {
        instance.validate()?;
        let n = instance.dimension;

        let mut formulation = Formulation {
            name: format!("{}_{}", instance.name, strategy.name()),
            strategy,
            dimension: n,
            variables: Vec::new(),
            constraints: Vec::new(),
            arc_vars: vec![vec![None; n]; n],
            position_vars: None,
            lazy_constraints: false,
            labels: instance.locations.iter().map(|l| l.label.clone()).collect(),
        };

        // x[i][j] = 1 if arc (i,j) is in the tour
        for (i, j) in instance.arcs() {
            let var = formulation.add_var(
                format!("x_{}_{}", instance.label(i), instance.label(j)),
                VarKind::Binary,
                0.0,
                1.0,
                instance.distance(i, j),
            );
            formulation.arc_vars[i][j] = Some(var);
        }

        for i in 0..n {
            let mut terms = Vec::with_capacity(n - 1);
            for j in (0..n).filter(|&j| j != i) {
                terms.push((formulation.arc_var(i, j)?, 1.0));
            }
            formulation.add_constraint(LinearConstraint::new(
                format!("{}_must_be_left", instance.label(i)),
                terms,
                Sense::Eq,
                1.0,
            ));
        }

        for j in 0..n {
            let mut terms = Vec::with_capacity(n - 1);
            for i in (0..n).filter(|&i| i != j) {
                terms.push((formulation.arc_var(i, j)?, 1.0));
            }
            formulation.add_constraint(LinearConstraint::new(
                format!("{}_must_be_visited", instance.label(j)),
                terms,
                Sense::Eq,
                1.0,
            ));
        }

        strategy.add_constraints(instance, &mut formulation)?;

        log::info!(
            "built {} with {} variables and {} constraints{}",
            formulation.name,
            formulation.variables.len(),
            formulation.constraints.len(),
            if formulation.lazy_constraints { " (lazy cuts enabled)" } else { "" }
        );

        Ok(formulation)
    }

    pub fn add_var(&mut self, name: String, kind: VarKind, lower: f64, upper: f64, obj: f64) -> VarId {
        let id = VarId(self.variables.len());
        self.variables.push(Variable { name, kind, lower, upper, obj });
        id
    }

    pub fn add_constraint(&mut self, constraint: LinearConstraint) {
        self.constraints.push(constraint);
    }

    pub fn arc_var(&self, i: usize, j: usize) -> TspResult<VarId> {
        self.arc_vars
            .get(i)
            .and_then(|row| row.get(j).copied().flatten())
            .ok_or_else(|| TspError::solver(format!("no selection variable for arc ({}, {})", i, j)))
    }

    /// Every (i, j, var) triple of the selection variables
    pub fn arcs(&self) -> impl Iterator<Item = (usize, usize, VarId)> + '_ {
        self.arc_vars.iter().enumerate().flat_map(|(i, row)| {
            row.iter().enumerate().filter_map(move |(j, v)| v.map(|v| (i, j, v)))
        })
    }

    /// DFJ cut: arcs with both endpoints in `subset` sum to at most |subset| - 1
    pub fn subset_cut(&self, label: String, subset: &[usize]) -> LinearConstraint {
        let mut terms = Vec::with_capacity(subset.len() * subset.len());
        for &i in subset {
            for &j in subset {
                if let Some(var) = self.arc_vars[i][j] {
                    terms.push((var, 1.0));
                }
            }
        }
        LinearConstraint::new(label, terms, Sense::Le, subset.len() as f64 - 1.0)
    }

    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.variables.iter().zip(values).map(|(v, x)| v.obj * x).sum()
    }

    /// Write the model in CPLEX LP format
    pub fn to_lp_string(&self) -> String {
        self.lp_with(self.constraints.iter())
    }

    /// Write the model restricted to the given constraints in CPLEX LP format.
    ///
    /// Names are sanitized for the format. A name that collides with an
    /// earlier one gets its index appended.
    pub fn lp_with<'a>(&self, constraints: impl Iterator<Item = &'a LinearConstraint>) -> String {
        let constraints: Vec<&LinearConstraint> = constraints.collect();
        let var_names = unique_lp_names(self.variables.iter().map(|v| v.name.as_str()));
        let row_names = unique_lp_names(constraints.iter().map(|c| c.label.as_str()));

        let mut out = String::new();
        let _ = writeln!(out, "\\ Model {}", self.name);
        let _ = writeln!(out, "Minimize");
        let objective: Vec<(VarId, f64)> = self
            .variables
            .iter()
            .enumerate()
            .filter(|(_, v)| v.obj != 0.0)
            .map(|(i, v)| (VarId(i), v.obj))
            .collect();
        let _ = writeln!(out, " obj: {}", lp_expr(&var_names, &objective));
        let _ = writeln!(out, "Subject To");
        for (constraint, name) in constraints.iter().zip(&row_names) {
            let _ = writeln!(
                out,
                " {}: {} {} {}",
                name,
                lp_expr(&var_names, &constraint.terms),
                constraint.sense.symbol(),
                constraint.rhs
            );
        }
        let _ = writeln!(out, "Bounds");
        for (v, name) in self.variables.iter().zip(&var_names).filter(|(v, _)| v.kind != VarKind::Binary) {
            if v.upper.is_finite() {
                let _ = writeln!(out, " {} <= {} <= {}", v.lower, name, v.upper);
            } else {
                let _ = writeln!(out, " {} >= {}", name, v.lower);
            }
        }
        let binaries = names_of_kind(&self.variables, &var_names, VarKind::Binary);
        if !binaries.is_empty() {
            let _ = writeln!(out, "Binaries");
            let _ = writeln!(out, " {}", binaries.join(" "));
        }
        let generals = names_of_kind(&self.variables, &var_names, VarKind::Integer);
        if !generals.is_empty() {
            let _ = writeln!(out, "Generals");
            let _ = writeln!(out, " {}", generals.join(" "));
        }
        let _ = writeln!(out, "End");
        out
    }
}

fn names_of_kind<'n>(variables: &[Variable], names: &'n [String], kind: VarKind) -> Vec<&'n str> {
    variables
        .iter()
        .zip(names)
        .filter(|(v, _)| v.kind == kind)
        .map(|(_, name)| name.as_str())
        .collect()
}

fn lp_expr(names: &[String], terms: &[(VarId, f64)]) -> String {
    if terms.is_empty() {
        return "0".to_string();
    }
    let mut expr = String::new();
    for (k, &(var, coef)) in terms.iter().enumerate() {
        let name = &names[var.0];
        let sign = if coef < 0.0 { "-" } else if k > 0 { "+" } else { "" };
        let magnitude = coef.abs();
        if k > 0 {
            expr.push(' ');
        }
        if (magnitude - 1.0).abs() < f64::EPSILON {
            let _ = write!(expr, "{} {}", sign, name);
        } else {
            let _ = write!(expr, "{} {} {}", sign, magnitude, name);
        }
    }
    expr.trim_start().to_string()
}

/// Readable label of a location subset, e.g. `{A,C,D}`
pub fn subset_label(instance: &TspInstance, subset: &[usize]) -> String {
    let labels: Vec<&str> = subset.iter().map(|&i| instance.label(i)).collect();
    format!("{{{}}}", labels.join(","))
}

pub fn subset_label_from(labels: &[String], subset: &[usize]) -> String {
    let names: Vec<&str> = subset.iter().map(|&i| labels[i].as_str()).collect();
    format!("{{{}}}", names.join(","))
}

/// Sanitized names in input order, with `_{index}` appended on collision
fn unique_lp_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    names
        .enumerate()
        .map(|(index, name)| {
            let base = lp_name(name);
            let mut candidate = base.clone();
            let mut suffix = index;
            while !taken.insert(candidate.clone()) {
                candidate = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            candidate
        })
        .collect()
}

/// LP format names may not contain spaces or a few operator characters
fn lp_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' ' | ':' | '+' | '-' | '<' | '>' | '=' | '*' | '/' | '^' => '_',
            '{' | '}' | ',' => '.',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> TspInstance {
        let arcs = vec![
            (("A", "B"), 1.0),
            (("B", "A"), 1.0),
            (("A", "C"), 2.0),
            (("C", "A"), 2.0),
            (("B", "C"), 3.0),
            (("C", "B"), 3.0),
        ];
        TspInstance::from_arc_costs("triangle", arcs).unwrap()
    }

    fn five_locations() -> TspInstance {
        TspInstance::random(5, 3, crate::instance::DistanceMetric::Euclidean).unwrap()
    }

    #[test]
    fn test_degree_constraints() {
        let instance = triangle();
        let formulation = Formulation::build(&instance, Strategy::Lazy).unwrap();
        assert_eq!(formulation.variables.len(), 6);
        assert_eq!(formulation.constraints.len(), 6);
        assert!(formulation.lazy_constraints);
        assert!(formulation.constraints.iter().all(|c| c.sense == Sense::Eq && c.rhs == 1.0));
        assert!(formulation.constraints.iter().any(|c| c.label == "A_must_be_left"));
        assert!(formulation.constraints.iter().any(|c| c.label == "C_must_be_visited"));
    }

    #[test]
    fn test_enumerated_cut_count() {
        let instance = five_locations();
        let formulation = Formulation::build(&instance, Strategy::Enumerated).unwrap();
        let cuts = formulation
            .constraints
            .iter()
            .filter(|c| c.label.starts_with("remove_subtour_"))
            .count();
        // 2^5 - 5 - 2
        assert_eq!(cuts, 25);
        assert!(!formulation.lazy_constraints);
    }

    #[test]
    fn test_enumerated_cut_shape() {
        let instance = five_locations();
        let formulation = Formulation::build(&instance, Strategy::Enumerated).unwrap();
        let cut = formulation
            .constraints
            .iter()
            .find(|c| c.label == "remove_subtour_{1,2,3}")
            .unwrap();
        assert_eq!(cut.terms.len(), 6);
        assert_eq!(cut.sense, Sense::Le);
        assert_eq!(cut.rhs, 2.0);
    }

    #[test]
    fn test_enumerated_refuses_large_instances() {
        let instance = TspInstance::random(MAX_ENUMERATED_LOCATIONS + 1, 1, crate::instance::DistanceMetric::Euclidean).unwrap();
        assert!(matches!(
            Formulation::build(&instance, Strategy::Enumerated),
            Err(TspError::InputError(_))
        ));
    }

    #[test]
    fn test_mtz_constraints() {
        let instance = five_locations();
        let formulation = Formulation::build(&instance, Strategy::Mtz { start: 0 }).unwrap();
        let positions = formulation.position_vars.as_ref().unwrap();
        assert_eq!(positions.len(), 5);
        let mtz = formulation.constraints.iter().filter(|c| c.label.starts_with("mtz_")).count();
        // arcs (i, j) with j != start: 5 * 4 - 4
        assert_eq!(mtz, 16);
        assert!(formulation.constraints.iter().any(|c| c.label == "first_city"));
    }

    #[test]
    fn test_mtz_rejects_bad_start() {
        let instance = triangle();
        assert!(Formulation::build(&instance, Strategy::Mtz { start: 3 }).is_err());
    }

    #[test]
    fn test_mtz_cuts_off_subtour_assignment() {
        // a 2-cycle among non-start locations violates some MTZ row for any positions
        let instance = five_locations();
        let formulation = Formulation::build(&instance, Strategy::Mtz { start: 0 }).unwrap();
        let mut values = vec![0.0; formulation.variables.len()];
        for (i, j) in [(0, 1), (1, 2), (2, 0), (3, 4), (4, 3)] {
            values[formulation.arc_var(i, j).unwrap().0] = 1.0;
        }
        let positions = formulation.position_vars.clone().unwrap();
        for (k, p) in positions.iter().enumerate() {
            values[p.0] = (k + 1) as f64;
        }
        let violated = formulation
            .constraints
            .iter()
            .filter(|c| c.label.starts_with("mtz_"))
            .any(|c| !c.is_satisfied(&values, 1e-9));
        assert!(violated);
    }

    #[test]
    fn test_repeated_terms_are_merged() {
        let c = LinearConstraint::new("c", vec![(VarId(0), 1.0), (VarId(1), 2.0), (VarId(0), 3.0)], Sense::Le, 1.0);
        assert_eq!(c.terms, vec![(VarId(0), 4.0), (VarId(1), 2.0)]);
    }

    #[test]
    fn test_lp_export() {
        let instance = triangle();
        let formulation = Formulation::build(&instance, Strategy::Mtz { start: 0 }).unwrap();
        let lp = formulation.to_lp_string();
        assert!(lp.starts_with("\\ Model triangle_MTZ"));
        assert!(lp.contains("Minimize"));
        assert!(lp.contains(" A_must_be_left: x_A_B + x_A_C = 1"));
        assert!(lp.contains("Binaries"));
        assert!(lp.contains("1 <= b_A <= 3"));
        assert!(lp.trim_end().ends_with("End"));
    }

    #[test]
    fn test_lp_export_keeps_sanitized_names_distinct() {
        let labels = vec!["A B".to_string(), "A_B".to_string(), "C".to_string()];
        let matrix = vec![vec![0.0, 1.0, 2.0], vec![1.0, 0.0, 3.0], vec![2.0, 3.0, 0.0]];
        let instance = TspInstance::from_matrix("clash", labels, matrix).unwrap();
        let formulation = Formulation::build(&instance, Strategy::Enumerated).unwrap();
        let lp = formulation.to_lp_string();

        let binaries: Vec<&str> = lp
            .lines()
            .skip_while(|l| *l != "Binaries")
            .nth(1)
            .unwrap()
            .split_whitespace()
            .collect();
        assert_eq!(binaries.len(), 6);
        let distinct: HashSet<&str> = binaries.iter().copied().collect();
        assert_eq!(distinct.len(), 6);

        let rows: Vec<&str> = lp
            .lines()
            .skip_while(|l| *l != "Subject To")
            .skip(1)
            .take_while(|l| *l != "Bounds")
            .filter_map(|l| l.split(':').next())
            .collect();
        let distinct_rows: HashSet<&str> = rows.iter().copied().collect();
        assert_eq!(rows.len(), formulation.constraints.len());
        assert_eq!(distinct_rows.len(), rows.len());
    }

    #[test]
    fn test_build_rejects_two_locations() {
        let arcs = vec![(("A", "B"), 1.0), (("B", "A"), 1.0)];
        let instance = TspInstance::from_arc_costs("pair", arcs).unwrap();
        assert!(matches!(
            Formulation::build(&instance, Strategy::Lazy),
            Err(TspError::InputError(_))
        ));
    }
}
