use rand::{rngs::StdRng, Rng, SeedableRng};

use super::*;
use crate::models::lp::LpSolver;
use crate::problem::{Arc, INF};

const TOL: f64 = 1e-6;

fn knapsack() -> Configuration {
    Configuration::with_formulation(1)
}

/// 2 nodes, one arc, 5 units to ship, unbounded individual capacity
fn scenario_a() -> Problem {
    Problem::new(
        2,
        vec![Arc::new(0, 1)],
        vec![vec![1.0]],
        vec![vec![INF]],
        vec![vec![-5.0, 5.0]],
        vec![5.0],
        None,
    )
    .unwrap()
}

/// Two commodities sharing the cheap arc 0 -> 2, which can't hold both
fn contested() -> Problem {
    Problem::new(
        3,
        vec![Arc::new(0, 2), Arc::new(0, 1), Arc::new(1, 2)],
        vec![vec![1.0, 2.0, 2.0], vec![1.0, 1.0, 1.0]],
        vec![vec![INF, INF, INF], vec![3.0, 3.0, 3.0]],
        vec![vec![-2.0, 0.0, 2.0], vec![-3.0, 0.0, 3.0]],
        vec![3.0, 10.0, 10.0],
        None,
    )
    .unwrap()
}

fn random_problem(rng: &mut StdRng) -> Problem {
    let n_nodes = rng.gen_range(3..6);
    let n_comm = rng.gen_range(1..4);

    let mut arcs = Vec::new();
    for s in 0..n_nodes {
        for e in 0..n_nodes {
            if s != e && rng.gen_bool(0.6) {
                arcs.push(Arc::new(s, e));
            }
        }
    }
    if arcs.is_empty() {
        arcs.push(Arc::new(0, 1));
    }
    let n_arcs = arcs.len();

    let mut costs = Vec::new();
    let mut capacities = Vec::new();
    let mut deficits = Vec::new();
    for _ in 0..n_comm {
        costs.push(
            (0..n_arcs)
                .map(|_| match rng.gen_bool(0.1) {
                    true => INF,
                    false => rng.gen_range(1..10) as f64,
                })
                .collect(),
        );
        capacities.push(
            (0..n_arcs)
                .map(|_| match rng.gen_bool(0.2) {
                    true => INF,
                    false => rng.gen_range(0..8) as f64,
                })
                .collect(),
        );

        let source = rng.gen_range(0..n_nodes);
        let sink = (source + rng.gen_range(1..n_nodes)) % n_nodes;
        let amount = rng.gen_range(1..6) as f64;
        let mut b = vec![0.0; n_nodes];
        b[source] = -amount;
        b[sink] = amount;
        deficits.push(b);
    }
    let shared = (0..n_arcs).map(|_| rng.gen_range(2..12) as f64).collect();

    Problem::new(n_nodes, arcs, costs, capacities, deficits, shared, None).unwrap()
}

fn solved(problem: Problem, config: &Configuration) -> Result<(MmcfModel, f64)> {
    let mut model = MmcfModel::new(problem);
    model.build(Some(config))?;
    let outcome = LpSolver::solve(&mut model)?;
    Ok((model, outcome.objective))
}

fn assert_feasible_flows(model: &MmcfModel) {
    let problem = model.problem();
    for k in 0..problem.n_commodities() {
        for i in 0..problem.n_nodes() {
            if problem.deficit(k, i) == INF {
                continue;
            }
            let (out, into) = problem.incident(i);
            let net = out.iter().map(|&j| model.flow(k, j)).sum::<f64>()
                - into.iter().map(|&j| model.flow(k, j)).sum::<f64>();
            assert!(
                (net + problem.deficit(k, i)).abs() < TOL,
                "conservation of commodity {} at node {}: {}",
                k,
                i,
                net
            );
        }
    }
    for j in 0..problem.n_arcs() {
        let total = (0..problem.n_commodities())
            .map(|k| model.flow(k, j))
            .sum::<f64>();
        assert!(total <= problem.shared_capacity(j) + TOL);
    }
}

#[test]
fn scenario_a_under_both_formulations() {
    let (flow, objective) = solved(scenario_a(), &Configuration::default()).unwrap();
    assert_eq!(flow.formulation(), Some(Formulation::Flow));
    assert!((flow.flow(0, 0) - 5.0).abs() < TOL);
    assert!((objective - 5.0).abs() < TOL);

    let (knap, objective) = solved(scenario_a(), &knapsack()).unwrap();
    assert_eq!(knap.formulation(), Some(Formulation::Knapsack));
    assert!((knap.flow(0, 0) - 5.0).abs() < TOL);
    assert!((objective - 5.0).abs() < TOL);
}

#[test]
fn accessors_are_zero_before_construction() {
    let mut model = MmcfModel::new(scenario_a());
    assert_eq!(model.formulation(), None);
    assert_eq!(model.flow(0, 0), 0.0);
    assert_eq!(model.flow_variable(0, 0), None);
    assert_eq!(model.potential(0, 1), 0.0);
    assert_eq!(model.dual(0), 0.0);
    assert!(model.sub_models().is_empty());
    assert!(model.constraints().is_empty());

    model.set_dual(0, 2.0);
    model.set_potential(0, 1, 2.0);
    assert_eq!(model.dual(0), 0.0);

    // the data accessors work all along
    assert_eq!(model.cost(0, 0), 1.0);
    assert_eq!(model.capacity(0, 0), INF);
    assert_eq!(model.shared_capacity(0), 5.0);
}

#[test]
fn construction_is_idempotent() {
    for config in [Configuration::default(), knapsack()] {
        let mut model = MmcfModel::new(contested());
        model.generate_variables(Some(&config)).unwrap();
        assert!(model.variables_built());
        assert!(!model.constraints_built());
        let n_vars = model
            .sub_models()
            .iter()
            .map(|sm| sm.variables().len())
            .sum::<usize>();

        model.generate_variables(Some(&config)).unwrap();
        model.generate_constraints(Some(&config)).unwrap();
        let rows = model.constraints().to_vec();
        let sub_rows = model
            .sub_models()
            .iter()
            .map(|sm| sm.constraints().len())
            .sum::<usize>();

        model.generate_constraints(Some(&config)).unwrap();
        model.build(Some(&config)).unwrap();
        assert_eq!(model.constraints(), &rows[..]);
        assert_eq!(
            model
                .sub_models()
                .iter()
                .map(|sm| sm.constraints().len())
                .sum::<usize>(),
            sub_rows
        );
        assert_eq!(
            model
                .sub_models()
                .iter()
                .map(|sm| sm.variables().len())
                .sum::<usize>(),
            n_vars
        );
    }
}

#[test]
fn formulation_is_chosen_once() {
    let mut model = MmcfModel::new(scenario_a());
    model.generate_variables(None).unwrap();
    model.generate_constraints(Some(&knapsack())).unwrap();
    assert_eq!(model.formulation(), Some(Formulation::Flow));

    let block = BlockConfig {
        static_variables: Some(1),
        static_constraints: None,
    };
    let mut model = MmcfModel::with_config(scenario_a(), block);
    model.generate_constraints(None).unwrap();
    assert_eq!(model.formulation(), Some(Formulation::Knapsack));
    assert!(model.constraints_built());
}

#[test]
fn flow_decomposition_rows() {
    let mut model = MmcfModel::new(contested());
    model.build(None).unwrap();

    assert_eq!(model.sub_models().len(), 2);
    assert_eq!(model.constraints().len(), 3);
    let row = &model.constraints()[0];
    assert_eq!(row.rhs(), 3.0);
    assert_eq!(row.lhs(), -INF);
    assert_eq!(row.function().coeffs().len(), 2);
    assert_eq!(
        model.flow_variable(1, 2),
        Some(Var { block: 1, index: 2 })
    );
}

#[test]
fn infinite_coupling_rhs_is_a_logic_error() {
    let problem = Problem::new(
        2,
        vec![Arc::new(0, 1)],
        vec![vec![1.0]],
        vec![vec![5.0]],
        vec![vec![-5.0, 5.0]],
        vec![INF],
        None,
    )
    .unwrap();
    let mut model = MmcfModel::new(problem);
    let err = model.build(None).unwrap_err();
    assert!(matches!(err, Error::Logic(_)));
    // nothing half built is left behind
    assert!(!model.variables_built());
    assert!(model.sub_models().is_empty());

    // with variables built beforehand they survive the failure
    model.generate_variables(None).unwrap();
    assert!(model.generate_constraints(None).is_err());
    assert!(model.variables_built());
    assert!(!model.constraints_built());
    assert!(model
        .sub_models()
        .iter()
        .all(|sm| sm.constraints().is_empty()));
}

#[test]
fn knapsack_decomposition_rows() {
    let mut problem = contested();
    problem.fixed_costs = Some(vec![4.0, 0.0, 1.0]);
    let config = Configuration {
        formulation: Some(1),
        strong_forcing: Some(true),
    };
    let mut model = MmcfModel::new(problem);
    model.build(Some(&config)).unwrap();
    assert!(model.strong_forcing());

    // one knapsack per arc, items for both commodities and the activation
    let subs = model.sub_models();
    assert_eq!(subs.len(), 3);
    assert!(subs.iter().all(|sm| sm.variables().len() == 3));
    assert!(subs.iter().all(|sm| sm.constraints()[0].rhs() == 0.0));
    // 2 commodities x 3 nodes conservation rows, then 2 x 3 forcing rows
    assert_eq!(model.constraints().len(), 12);
    assert_eq!(model.constraints()[0].rhs(), 2.0);
    assert_eq!(model.flow_variable(1, 2), Some(Var { block: 2, index: 1 }));

    // without fixed costs there is nothing to force
    let mut model = MmcfModel::new(contested());
    model.build(Some(&config)).unwrap();
    assert_eq!(model.constraints().len(), 6);
    assert!(model.sub_models().iter().all(|sm| sm.variables().len() == 2));
    assert_eq!(model.activation(0), 0.0);
}

#[test]
fn forcing_rows_cover_every_commodity_and_arc() {
    // node 1 is removed for commodity 1, so it can only use arc 0
    let mut problem = Problem::new(
        3,
        vec![Arc::new(0, 2), Arc::new(0, 1), Arc::new(1, 2)],
        vec![vec![1.0, 2.0, 2.0], vec![1.0, 1.0, 1.0]],
        vec![vec![INF, INF, INF], vec![3.0, 3.0, 3.0]],
        vec![vec![-2.0, 0.0, 2.0], vec![-3.0, INF, 3.0]],
        vec![5.0, 10.0, 10.0],
        None,
    )
    .unwrap();
    problem.fixed_costs = Some(vec![1.0, 1.0, 1.0]);
    let config = Configuration {
        formulation: Some(1),
        strong_forcing: Some(true),
    };
    let mut model = MmcfModel::new(problem);
    model.build(Some(&config)).unwrap();

    let n_arcs = 3;
    let forcing = &model.constraints()[2 * 3..];
    assert_eq!(forcing.len(), 2 * n_arcs);
    for (k, j) in [(0, 0), (1, 1), (1, 2)] {
        let row = &forcing[k * n_arcs + j];
        assert_eq!(row.name(), format!("forcing_{}_{}", k, j));
        assert_eq!(
            row.function().coeffs(),
            &[
                (Var { block: j, index: k }, 1.0),
                (Var { block: j, index: 2 }, -1.0)
            ][..]
        );
        assert_eq!(row.rhs(), 0.0);
    }

    let (model, _) = solved(model.into_problem(), &config).unwrap();
    assert_feasible_flows(&model);
    assert_eq!(model.flow(1, 1), 0.0);
    assert!((model.flow(1, 0) - 3.0).abs() < TOL);
}

#[test]
fn duals_and_potentials_round_trip() {
    for config in [Configuration::default(), knapsack()] {
        let mut model = MmcfModel::new(contested());
        model.build(Some(&config)).unwrap();
        model.set_dual(1, -3.0);
        model.set_potential(1, 2, 7.5);
        assert_eq!(model.dual(1), -3.0);
        assert_eq!(model.potential(1, 2), 7.5);
        assert_eq!(model.potential(0, 2), 0.0);
    }
}

#[test]
fn contested_arc_is_shared() {
    let (flow, flow_obj) = solved(contested(), &Configuration::default()).unwrap();
    let (knap, knap_obj) = solved(contested(), &knapsack()).unwrap();

    // the detour costs commodity 0 more, so it ships its 2 units directly and commodity 1
    // sends 1 unit directly and 2 around: 2 + 1 + 4
    assert!((flow_obj - 7.0).abs() < TOL);
    assert!((knap_obj - flow_obj).abs() < TOL);
    for model in [&flow, &knap] {
        assert_feasible_flows(model);
        assert!((model.flows(0)[0] + model.flows(1)[0] - 3.0).abs() < TOL);
    }

    // the optimum is unique, so both formulations ship the same flows
    let expected = [[2.0, 0.0, 0.0], [1.0, 2.0, 2.0]];
    for (k, row) in expected.iter().enumerate() {
        for (j, &x) in row.iter().enumerate() {
            assert!((flow.flow(k, j) - x).abs() < TOL, "flow of {} on {}", k, j);
            assert!((knap.flow(k, j) - x).abs() < TOL, "knapsack flow of {} on {}", k, j);
        }
    }
}

#[test]
fn formulations_agree_on_random_instances() {
    let mut rng = StdRng::seed_from_u64(17);
    let mut solved_both = 0;
    for _ in 0..25 {
        let problem = random_problem(&mut rng);
        let flow = solved(problem.clone(), &Configuration::default());
        let knap = solved(problem, &knapsack());
        match (flow, knap) {
            (Ok((flow, flow_obj)), Ok((knap, knap_obj))) => {
                assert!(
                    (flow_obj - knap_obj).abs() < TOL * flow_obj.abs().max(1.0),
                    "flow {} knapsack {}",
                    flow_obj,
                    knap_obj
                );
                assert_feasible_flows(&flow);
                assert_feasible_flows(&knap);
                solved_both += 1;
            }
            (Err(_), Err(_)) => (),
            (flow, knap) => panic!(
                "only one formulation could be solved: flow {:?}, knapsack {:?}",
                flow.map(|r| r.1),
                knap.map(|r| r.1)
            ),
        }
    }
    assert!(solved_both > 0);
}

#[test]
fn fixed_costs_only_raise_the_knapsack_bound() {
    let (_, flow_obj) = solved(contested(), &Configuration::default()).unwrap();

    let mut problem = contested();
    problem.set_fixed_costs_from_mean(0.5);
    let (knap, knap_obj) = solved(problem, &knapsack()).unwrap();
    assert!(knap_obj >= flow_obj - TOL);
    assert_feasible_flows(&knap);
    // the direct arc is full, so it must be fully activated
    assert!((knap.activation(0) - 1.0).abs() < TOL);
}

#[test]
fn duplicate_commodities_get_identical_results() {
    // the only route is 0 -> 1 -> 2 and the shared capacity is never binding
    let problem = Problem::new(
        3,
        vec![Arc::new(0, 1), Arc::new(1, 2)],
        vec![vec![1.0, 2.0], vec![1.0, 2.0]],
        vec![vec![4.0, 4.0], vec![4.0, 4.0]],
        vec![vec![-2.0, 0.0, 2.0], vec![-2.0, 0.0, 2.0]],
        vec![10.0, 10.0],
        None,
    )
    .unwrap();

    for config in [Configuration::default(), knapsack()] {
        let mut model = MmcfModel::new(problem.clone());
        model.preprocess(&PreprocessBounds::default()).unwrap();
        let copies = model.problem().deficit_copies();
        assert!(copies.is_duplicate(0) && copies.is_duplicate(1));

        model.build(Some(&config)).unwrap();
        LpSolver::solve(&mut model).unwrap();
        for j in 0..2 {
            assert!((model.flow(0, j) - model.flow(1, j)).abs() < TOL);
        }
        for i in 0..3 {
            assert_eq!(model.potential(0, i), model.potential(1, i));
        }
        assert!((model.flow(1, 1) - 2.0).abs() < TOL);
    }
}

#[test]
fn preprocessing_after_construction_is_refused() {
    let mut model = MmcfModel::new(scenario_a());
    model.generate_variables(None).unwrap();
    let err = model.preprocess(&PreprocessBounds::default()).unwrap_err();
    assert!(matches!(err, Error::Logic(_)));
}

#[test]
fn reset_drops_the_representation() {
    let mut model = MmcfModel::new(scenario_a());
    model.build(None).unwrap();
    LpSolver::solve(&mut model).unwrap();
    assert!(model.flow(0, 0) > 0.0);

    model.reset(contested());
    assert!(!model.variables_built());
    assert_eq!(model.flow(0, 0), 0.0);
    assert_eq!(model.problem().n_commodities(), 2);
}

#[test]
fn solving_requires_a_built_model() {
    let mut model = MmcfModel::new(scenario_a());
    model.generate_variables(None).unwrap();
    assert!(matches!(LpSolver::solve(&mut model), Err(Error::Logic(_))));
}

#[test]
fn pruned_arcs_carry_no_flow() {
    // the detour starts with an arc without shared capacity, which can't grow
    let problem = Problem::new(
        3,
        vec![Arc::new(0, 2), Arc::new(0, 1), Arc::new(1, 2)],
        vec![vec![5.0, 1.0, 1.0]],
        vec![vec![INF, 4.0, 4.0]],
        vec![vec![-2.0, 0.0, 2.0]],
        vec![4.0, 0.0, 4.0],
        None,
    )
    .unwrap();

    for config in [Configuration::default(), knapsack()] {
        let mut model = MmcfModel::new(problem.clone());
        model.preprocess(&PreprocessBounds::default()).unwrap();
        assert_eq!(model.cost(0, 1), INF);
        assert_eq!(model.capacity(0, 1), 0.0);
        assert!(!model.problem().active().contains(1));

        model.build(Some(&config)).unwrap();
        let outcome = LpSolver::solve(&mut model).unwrap();
        assert!((outcome.objective - 10.0).abs() < TOL);
        assert_eq!(model.flow(0, 1), 0.0);
        assert_feasible_flows(&model);
    }
}

#[test]
fn knapsack_scales_unbounded_capacities() {
    let decomposition = KnapsackDecomposition::build(&contested()).unwrap();
    assert!(!decomposition.has_activation());
    // commodity 0 ships 2 units at most, commodity 1 keeps its capacity
    assert_eq!(decomposition.scale(0, 0), 2.0);
    assert_eq!(decomposition.scale(1, 0), 3.0);

    // an unbounded arc whose cost is negative leaves the flow unbounded
    let problem = Problem::new(
        2,
        vec![Arc::new(0, 1), Arc::new(1, 0)],
        vec![vec![-1.0, 1.0]],
        vec![vec![INF, 1.0]],
        vec![vec![-1.0, 1.0]],
        vec![INF, 1.0],
        None,
    )
    .unwrap();
    let err = KnapsackDecomposition::build(&problem).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}
