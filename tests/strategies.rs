use tsp_exact_solver::exact::{
    BackendKind, Formulation, SolveContext, SolveOutcome, SolverConfig, Strategy, SubtourSeparator, TspSolver,
    Verdict,
};
use tsp_exact_solver::exact::callback::LazyConstraintCallback;
use tsp_exact_solver::heuristics::local_search::is_swap_optimal;
use tsp_exact_solver::instance::{DistanceMetric, TspInstance};
use tsp_exact_solver::tour::tour_arcs;

const STRATEGIES: [Strategy; 3] = [Strategy::Enumerated, Strategy::Lazy, Strategy::Mtz { start: 0 }];

fn five_locations() -> TspInstance {
    let costs = [
        (("A", "A"), 0.0), (("A", "B"), 23.0), (("A", "C"), 13.0), (("A", "D"), 15.0), (("A", "E"), 20.0),
        (("B", "A"), 23.0), (("B", "B"), 0.0), (("B", "C"), 6.0), (("B", "D"), 14.0), (("B", "E"), 18.0),
        (("C", "A"), 13.0), (("C", "B"), 6.0), (("C", "C"), 0.0), (("C", "D"), 9.0), (("C", "E"), 22.0),
        (("D", "A"), 15.0), (("D", "B"), 14.0), (("D", "C"), 9.0), (("D", "D"), 0.0), (("D", "E"), 11.0),
        (("E", "A"), 20.0), (("E", "B"), 18.0), (("E", "C"), 22.0), (("E", "D"), 11.0), (("E", "E"), 0.0),
    ];
    TspInstance::from_arc_costs("five", costs).unwrap()
}

fn grid() -> TspInstance {
    let points = vec![
        ("p00".to_string(), 0.0, 0.0),
        ("p10".to_string(), 1.0, 0.0),
        ("p01".to_string(), 0.0, 1.0),
        ("p11".to_string(), 1.0, 1.0),
    ];
    TspInstance::from_coordinates("grid", points, DistanceMetric::Euclidean).unwrap()
}

fn solver() -> TspSolver {
    let config = SolverConfig { iis_path: None, ..SolverConfig::default() };
    TspSolver::new(config, BackendKind::Microlp)
}

fn optimal_cost(instance: &TspInstance, strategy: Strategy) -> f64 {
    match solver().solve(instance, strategy).unwrap() {
        SolveOutcome::Optimal(result) => {
            let solution = result.solution.unwrap();
            assert!(solution.is_complete(instance), "{} returned {:?}", strategy, solution.tour);
            solution.cost
        }
        other => panic!("{} ended with {}", strategy, other.status()),
    }
}

#[test]
fn five_locations_all_strategies_find_63() {
    let instance = five_locations();
    for strategy in STRATEGIES {
        assert!((optimal_cost(&instance, strategy) - 63.0).abs() < 1e-6, "{}", strategy);
    }
}

#[test]
fn five_locations_enumerated_tour_is_swap_optimal_and_matches_lazy() {
    let instance = five_locations();
    let SolveOutcome::Optimal(enumerated) = solver().solve(&instance, Strategy::Enumerated).unwrap() else {
        panic!("enumerated did not reach optimality");
    };
    let tour = enumerated.solution.unwrap();
    assert_eq!(tour.tour.len(), 5);
    assert!(is_swap_optimal(&instance, &tour));
    for i in 0..5 {
        for j in i + 1..5 {
            assert!(tour.swap_delta(&instance, i, j) > 0.0);
        }
    }

    let lazy = optimal_cost(&instance, Strategy::Lazy);
    assert!((tour.cost - lazy).abs() < 1e-6);
}

#[test]
fn five_locations_mtz_start_does_not_change_optimum() {
    let instance = five_locations();
    let start = instance.index_of("D").unwrap();
    assert!((optimal_cost(&instance, Strategy::Mtz { start }) - 63.0).abs() < 1e-6);
}

#[test]
fn grid_enumerated_and_lazy_agree() {
    let instance = grid();
    let enumerated = optimal_cost(&instance, Strategy::Enumerated);
    let lazy = optimal_cost(&instance, Strategy::Lazy);
    assert!((enumerated - 4.0).abs() < 1e-6);
    assert!((lazy - 4.0).abs() < 1e-6);
}

#[test]
fn repeated_cut_does_not_change_optimum() {
    let instance = five_locations();
    let mut formulation = Formulation::build(&instance, Strategy::Enumerated).unwrap();
    let before = match solver().solve_formulation(&instance, &formulation).unwrap() {
        SolveOutcome::Optimal(result) => result.upper_bound,
        other => panic!("unexpected {}", other.status()),
    };

    let subset = vec![instance.index_of("B").unwrap(), instance.index_of("C").unwrap()];
    for _ in 0..2 {
        let cut = formulation.subset_cut("subtour_{B,C}".to_string(), &subset);
        formulation.add_constraint(cut);
    }
    let after = match solver().solve_formulation(&instance, &formulation).unwrap() {
        SolveOutcome::Optimal(result) => result.upper_bound,
        other => panic!("unexpected {}", other.status()),
    };
    assert!((before - after).abs() < 1e-9);
}

#[test]
fn separator_offers_the_same_cut_for_a_registered_subtour() {
    let instance = five_locations();
    let formulation = Formulation::build(&instance, Strategy::Lazy).unwrap();
    let mut values = vec![0.0; formulation.variables.len()];
    // B-C and A-D-E
    for (i, j) in [(1, 2), (2, 1), (0, 3), (3, 4), (4, 0)] {
        values[formulation.arc_var(i, j).unwrap().0] = 1.0;
    }

    let separator = SubtourSeparator::new(1e-4);
    let mut ctx = SolveContext::new(&formulation);
    let first = ctx.on_candidate(&separator, &values);
    let again = separator.separate(&formulation, &values, &ctx.pool);
    let Verdict::Cut(cut) = again.verdict else {
        panic!("expected a cut");
    };
    assert_eq!(first.cuts, vec![cut.constraint.clone()]);
    assert_eq!(ctx.pool.len(), 1);
    assert!(ctx.pool.contains(&cut.subset));
}

#[test]
fn three_locations_every_strategy_covers_all() {
    let matrix = vec![vec![0.0, 1.0, 5.0], vec![4.0, 0.0, 2.0], vec![3.0, 6.0, 0.0]];
    let labels = vec!["x".to_string(), "y".to_string(), "z".to_string()];
    let instance = TspInstance::from_matrix("three", labels, matrix).unwrap();

    for strategy in STRATEGIES {
        let SolveOutcome::Optimal(result) = solver().solve(&instance, strategy).unwrap() else {
            panic!("{} did not reach optimality", strategy);
        };
        let solution = result.solution.unwrap();
        assert_eq!(solution.tour.len(), 3);
        let arc_sum: f64 = tour_arcs(&solution.tour).iter().map(|&(i, j)| instance.distance(i, j)).sum();
        assert!((solution.cost - arc_sum).abs() < 1e-9);
        assert!((solution.cost - 6.0).abs() < 1e-9, "{}", strategy);
    }
}

#[test]
fn two_locations_are_rejected_before_solving() {
    let costs = [(("A", "B"), 1.0), (("B", "A"), 1.0)];
    let instance = TspInstance::from_arc_costs("two", costs).unwrap();
    for strategy in STRATEGIES {
        assert!(solver().solve(&instance, strategy).is_err());
    }
}

#[test]
fn mtz_agrees_with_dfj_on_random_instances() {
    for seed in 0..3 {
        let instance = TspInstance::random(7, seed, DistanceMetric::Euc2d).unwrap();
        let lazy = optimal_cost(&instance, Strategy::Lazy);
        let mtz = optimal_cost(&instance, Strategy::Mtz { start: 3 });
        assert!((lazy - mtz).abs() < 1e-6, "seed {}: {} vs {}", seed, lazy, mtz);
    }
}

#[test]
fn asymmetric_instance_strategies_agree() {
    let matrix = vec![
        vec![0.0, 3.0, 8.0, 2.0, 9.0],
        vec![7.0, 0.0, 1.0, 6.0, 4.0],
        vec![2.0, 9.0, 0.0, 5.0, 3.0],
        vec![4.0, 2.0, 7.0, 0.0, 8.0],
        vec![1.0, 6.0, 3.0, 9.0, 0.0],
    ];
    let labels = (1..=5).map(|i| format!("L{}", i)).collect();
    let instance = TspInstance::from_matrix("asym", labels, matrix).unwrap();
    let costs: Vec<f64> = STRATEGIES.iter().map(|&s| optimal_cost(&instance, s)).collect();
    assert!((costs[0] - costs[1]).abs() < 1e-6);
    assert!((costs[0] - costs[2]).abs() < 1e-6);
}
