//! Gradient engine tests.

use flowline_algo::{
    AdjointTable, CoupledModel, Evaluator, Npv, Objective, SensitivityEngine, SensitivitySettings,
    WellSeries,
};
use flowline_core::{
    CostEvent, EndPipe, FlowError, InstallCost, MidPipe, Network, Node, PressureBooster, Schedule,
    Stream, UnitSystem, VarId, VariableKind, Well,
};
use std::sync::Arc;

/// Sum of capital spent.
#[derive(Debug)]
struct Capex;

impl Objective for Capex {
    fn name(&self) -> &str {
        "capex"
    }

    fn value(&self, _wells: &[WellSeries], costs: &[CostEvent]) -> f64 {
        costs.iter().map(|c| c.amount).sum()
    }
}

/// A booster whose capacity `x` costs `2x`.
fn booster_case() -> (Network, VarId, VarId) {
    let mut network = Network::new(UnitSystem::Metric);
    let dp = network.variables.add("dp", VariableKind::Real, 5.0, 0.0, 10.0);
    let x = network.variables.add("x", VariableKind::Real, 10.0, 0.0, 20.0);
    let install = network
        .variables
        .add("install", VariableKind::Integer, 0.0, 0.0, 1.0);
    let well = network.add_node(Node::Well(Well::production("P1")));
    let booster = network.add_node(Node::Booster(
        PressureBooster::new("pump", dp, x)
            .with_install_time(install)
            .with_cost(InstallCost {
                constant: 0.0,
                capacity_factor: 2.0,
                exponent: 1.0,
            }),
    ));
    let end = network.add_node(Node::EndPipe(EndPipe::new("export", 20.0, UnitSystem::Metric)));
    network.connect_fixed(well, booster, 1.0);
    network.connect_fixed(booster, end, 1.0);
    network.initialize(Schedule::new(vec![10.0, 20.0]).unwrap()).unwrap();
    network
        .set_well_streams(
            well,
            vec![
                Stream::new(10.0, 4.0, 0.0, 1.0, 60.0),
                Stream::new(20.0, 4.0, 0.0, 1.0, 60.0),
            ],
        )
        .unwrap();
    (network, x, install)
}

fn engine(objective: Arc<dyn Objective>) -> SensitivityEngine {
    SensitivityEngine::new(
        Evaluator::new(Arc::new(CoupledModel), objective),
        SensitivitySettings {
            perturbation_fraction: 0.1,
            parallel: false,
            threads: 0,
        },
    )
}

#[test]
fn test_linear_surface_variable_gradient() {
    let (network, x, _) = booster_case();
    let case = engine(Arc::new(Capex))
        .run(&network, &AdjointTable::new())
        .unwrap();
    assert_eq!(case.objective(), 20.0);
    let d = case.objective_derivative().unwrap()[&x];
    assert!((d - 2.0).abs() < 1e-12, "df/dx = {d}");
}

#[test]
fn test_npv_capex_gradient_is_negative() {
    let (network, x, _) = booster_case();
    let npv = Npv {
        oil_price: 10.0,
        gas_price: 0.0,
        water_price: 0.0,
        injection_price: 0.0,
        discount_rate: 0.0,
    };
    let case = engine(Arc::new(npv))
        .run(&network, &AdjointTable::new())
        .unwrap();
    let d = case.objective_derivative().unwrap()[&x];
    assert!((d + 2.0).abs() < 1e-9);
}

#[test]
fn test_integer_variables_are_not_differentiated() {
    let (network, _, install) = booster_case();
    let case = engine(Arc::new(Capex))
        .run(&network, &AdjointTable::new())
        .unwrap();
    assert!(!case.objective_derivative().unwrap().contains_key(&install));
}

#[test]
fn test_constraint_derivatives_align_with_constraints() {
    let (network, x, _) = booster_case();
    let case = engine(Arc::new(Capex))
        .run(&network, &AdjointTable::new())
        .unwrap();
    let derivatives = case.derivatives().unwrap();
    assert_eq!(derivatives.constraints.len(), case.constraints().len());

    // booster pressure increase moves the well's BHP constraint
    let dp = network.variables.by_name("dp").unwrap().id;
    let bhp = case
        .constraints()
        .iter()
        .position(|c| c.name == "bhp:P1:0")
        .unwrap();
    // p_booster = 20 - dp, bhp = (60 - p_booster) / 60
    let d = case.constraint_derivative(bhp).unwrap()[&dp];
    assert!((d - 1.0 / 60.0).abs() < 1e-9);

    // capacity only affects the booster constraint
    let balance = case
        .constraints()
        .iter()
        .position(|c| c.name == "booster:pump:0")
        .unwrap();
    assert!(case.constraint_derivative(balance).unwrap()[&x] > 0.0);
}

#[test]
fn test_base_network_is_not_mutated() {
    let (network, x, _) = booster_case();
    let before: Vec<f64> = network.variables.iter().map(|v| v.value).collect();
    engine(Arc::new(Capex))
        .run(&network, &AdjointTable::new())
        .unwrap();
    let after: Vec<f64> = network.variables.iter().map(|v| v.value).collect();
    assert_eq!(before, after);
    assert_eq!(network.variables.value(x), 10.0);
    assert_eq!(network.node(network.find("export").unwrap()).streams()[0].oil_rate, 0.0);
}

#[test]
fn test_routing_fraction_gradient() {
    let mut network = Network::new(UnitSystem::Metric);
    let well = network.add_node(Node::Well(Well::production("P1")));
    let mid = network.add_node(Node::MidPipe(MidPipe::new("m")));
    let a = network.add_node(Node::EndPipe(EndPipe::new("a", 10.0, UnitSystem::Metric)));
    let b = network.add_node(Node::EndPipe(EndPipe::new("b", 10.0, UnitSystem::Metric)));
    let ra = network.variables.add("ra", VariableKind::Real, 0.5, 0.0, 1.0);
    let rb = network.variables.add("rb", VariableKind::Real, 0.5, 0.0, 1.0);
    network.connect_fixed(well, mid, 1.0);
    network.connect(mid, a, ra);
    network.connect(mid, b, rb);
    network.initialize(Schedule::new(vec![1.0]).unwrap()).unwrap();
    network
        .set_well_streams(well, vec![Stream::new(1.0, 10.0, 0.0, 0.0, 50.0)])
        .unwrap();

    let case = engine(Arc::new(flowline_algo::CumulativeOil))
        .run(&network, &AdjointTable::new())
        .unwrap();
    let routing = case
        .constraints()
        .iter()
        .position(|c| c.name == "routing:m")
        .unwrap();
    assert_eq!(case.constraints().get(flowline_algo::ConstraintId::new(routing)).unwrap().value, 1.0);
    let d = case.constraint_derivative(routing).unwrap()[&ra];
    assert!((d - 1.0).abs() < 1e-9);
    // well production does not depend on surface routing
    assert_eq!(case.objective_derivative().unwrap()[&rb], 0.0);
}

#[test]
fn test_degenerate_perturbation_fraction_is_rejected() {
    let (network, ..) = booster_case();
    for fraction in [0.0, -0.1, 1.5, f64::NAN] {
        let engine = SensitivityEngine::new(
            Evaluator::new(Arc::new(CoupledModel), Arc::new(Capex)),
            SensitivitySettings {
                perturbation_fraction: fraction,
                parallel: false,
                threads: 0,
            },
        );
        assert!(
            matches!(
                engine.run(&network, &AdjointTable::new()),
                Err(FlowError::Config(_))
            ),
            "fraction {fraction} accepted"
        );
    }
}

#[test]
fn test_coarse_perturbation_reaches_upper_bound() {
    let (network, x, _) = booster_case();
    let engine = SensitivityEngine::new(
        Evaluator::new(Arc::new(CoupledModel), Arc::new(Capex)),
        SensitivitySettings {
            perturbation_fraction: 0.5,
            parallel: false,
            threads: 0,
        },
    );
    // x = 10 in [0, 20]: a step of 10 lands exactly on the bound
    let case = engine.run(&network, &AdjointTable::new()).unwrap();
    let d = case.objective_derivative().unwrap()[&x];
    assert!((d - 2.0).abs() < 1e-12, "df/dx = {d}");
}
