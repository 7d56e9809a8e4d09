//! Property-based tests for battery-backed power chains.
//!
//! Random schedules of demand and carbon intensity changes are played
//! against one chain; after every step the chain's bookkeeping and dispatch
//! invariants are checked.

use greenflow_core::clock::SimClock;
use greenflow_core::graph::FlowGraph;
use greenflow_core::id::NodeId;
use greenflow_power::{
    Battery, BatteryConfig, BatteryState, GridPowerSource, Multiplexer, PowerChain,
    PowerChainConfig, PowerNode,
};
use proptest::prelude::*;

const THRESHOLD: f64 = 100.0;

// ===========================================================================
// Generators
// ===========================================================================

#[derive(Debug, Clone)]
struct Step {
    dt: u64,
    demand: Option<f64>,
    intensity: Option<f64>,
}

fn arb_step() -> impl Strategy<Value = Step> {
    (
        1..20_000u64,
        proptest::option::of(0.0..2_000.0f64),
        proptest::option::of(0.0..300.0f64),
    )
        .prop_map(|(dt, demand, intensity)| Step {
            dt,
            demand,
            intensity,
        })
}

fn arb_battery() -> impl Strategy<Value = BatteryConfig> {
    (1_000.0..100_000.0f64, 1.0..2_000.0f64, 0.0..1.0f64).prop_map(
        |(capacity, charge_current, fill)| {
            BatteryConfig::new(capacity, charge_current).with_initial_charge(capacity * fill)
        },
    )
}

fn build(battery: BatteryConfig, intensity: f64) -> (FlowGraph, NodeId, PowerChain) {
    let mut graph = FlowGraph::new(SimClock::new(0));
    let mux = graph.add_node(Multiplexer::new(graph.clock().clone()));
    let config = PowerChainConfig::grid_only(10_000.0, intensity).with_battery(battery, THRESHOLD);
    let chain = PowerChain::build(&mut graph, mux, &config).unwrap();
    graph.settle().unwrap();
    (graph, mux, chain)
}

fn apply(graph: &mut FlowGraph, mux: NodeId, chain: &PowerChain, now: u64, step: &Step) {
    graph.advance_to(now).unwrap();
    if let Some(intensity) = step.intensity {
        chain.set_carbon_intensity(graph, intensity).unwrap();
    }
    if let Some(watts) = step.demand {
        graph
            .with_node::<Multiplexer, _>(mux, |m, ctx| m.set_demand(watts, ctx))
            .unwrap()
            .unwrap();
    }
    graph.settle().unwrap();
}

fn close_to(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #[test]
    fn combined_energy_is_battery_plus_source(
        battery in arb_battery(),
        intensity in 0.0..300.0f64,
        steps in proptest::collection::vec(arb_step(), 1..30),
    ) {
        let (mut graph, mux, chain) = build(battery, intensity);
        let mut now = 0;
        for step in &steps {
            now += step.dt;
            apply(&mut graph, mux, &chain, now, step);
            let report = chain.report(&mut graph).unwrap();
            prop_assert!(close_to(
                report.energy_usage,
                report.battery_energy_usage + report.source_energy_usage
            ));
            let mux_energy = graph.node::<Multiplexer>(mux).unwrap().total_energy_usage();
            prop_assert!(mux_energy <= report.energy_usage + 1e-6 * report.energy_usage.max(1.0));
        }
    }

    #[test]
    fn battery_level_stays_in_bounds_and_balances(
        battery in arb_battery(),
        intensity in 0.0..300.0f64,
        steps in proptest::collection::vec(arb_step(), 1..30),
    ) {
        let initial = battery.initial_charge;
        let (mut graph, mux, chain) = build(battery, intensity);
        let mut now = 0;
        for step in &steps {
            now += step.dt;
            apply(&mut graph, mux, &chain, now, step);
            chain.report(&mut graph).unwrap();

            let b = graph.node::<Battery>(chain.battery().unwrap()).unwrap();
            prop_assert!(b.charge_level() >= 0.0);
            prop_assert!(b.charge_level() <= b.capacity());
            let balance = initial + b.total_charge_received() - b.total_energy_usage();
            prop_assert!(close_to(b.charge_level(), balance));
        }
    }

    #[test]
    fn each_tick_routes_load_to_one_child(
        battery in arb_battery(),
        intensity in 0.0..300.0f64,
        steps in proptest::collection::vec(arb_step(), 1..30),
    ) {
        let (mut graph, mux, chain) = build(battery, intensity);
        let mut now = 0;
        for step in &steps {
            now += step.dt;
            apply(&mut graph, mux, &chain, now, step);

            let battery_draw = graph.node::<Battery>(chain.battery().unwrap()).unwrap().power_draw();
            let grid_draw = graph.node::<GridPowerSource>(chain.source()).unwrap().load_draw();
            prop_assert!(battery_draw == 0.0 || grid_draw == 0.0);
        }
    }

    #[test]
    fn battery_state_agrees_with_policy(
        battery in arb_battery(),
        intensity in 0.0..300.0f64,
        steps in proptest::collection::vec(arb_step(), 1..30),
    ) {
        let (mut graph, mux, chain) = build(battery, intensity);
        let mut now = 0;
        for step in &steps {
            now += step.dt;
            apply(&mut graph, mux, &chain, now, step);

            let current = graph.node::<GridPowerSource>(chain.source()).unwrap().carbon_intensity();
            let green = current < THRESHOLD;
            let b = graph.node::<Battery>(chain.battery().unwrap()).unwrap();
            match b.state() {
                BatteryState::Charging => prop_assert!(green),
                BatteryState::Depleting => prop_assert!(!green),
                BatteryState::Idle if green => prop_assert!(b.is_full()),
                BatteryState::Idle => {}
            }
        }
    }

    #[test]
    fn settling_twice_changes_nothing(
        battery in arb_battery(),
        intensity in 0.0..300.0f64,
        steps in proptest::collection::vec(arb_step(), 1..20),
    ) {
        let (mut graph, mux, chain) = build(battery, intensity);
        let mut now = 0;
        for step in &steps {
            now += step.dt;
            apply(&mut graph, mux, &chain, now, step);
            let before = chain.report(&mut graph).unwrap();

            prop_assert_eq!(graph.settle().unwrap(), 0);
            let after = chain.report(&mut graph).unwrap();
            prop_assert_eq!(before, after);
        }
    }
}
