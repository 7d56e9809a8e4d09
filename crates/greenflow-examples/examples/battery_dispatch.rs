//! Battery dispatch example: one day on a sinusoidal carbon trace.
//!
//! Builds a battery-backed power chain, feeds it a carbon intensity that
//! swings between 50 and 150 gCO2/kWh twice a day, and prints one telemetry
//! row per hour. The battery charges while the grid is below the 100 g
//! threshold and carries the load while it is above.
//!
//! Run with: `cargo run -p greenflow-examples --example battery_dispatch`
//! Set `RUST_LOG=debug` to follow individual dispatch decisions.

use greenflow_core::clock::SimClock;
use greenflow_core::graph::FlowGraph;
use greenflow_power::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

const HOUR: u64 = 3_600_000;

fn main() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    let mut graph = FlowGraph::new(SimClock::new(0));
    let mux = graph.add_node(Multiplexer::new(graph.clock().clone()));

    // 96 quarter-hour fragments, two full waves.
    let trace = CarbonTrace::sinusoidal(Sinusoid {
        points: 96,
        periods: 2.0,
        ..Sinusoid::default()
    })
    .unwrap();

    // 5 kWh battery, charging at 1.5 kW, starting half full.
    let battery = BatteryConfig::new(18_000_000.0, 1_500.0).with_initial_charge(9_000_000.0);
    let config = PowerChainConfig::grid_only(10_000.0, trace.intensity_at(0).unwrap_or(100.0))
        .with_battery(battery, 100.0);
    let chain = PowerChain::build(&mut graph, mux, &config).unwrap();

    let mut recorder = PowerRecorder::new();
    let mut next_sample = HOUR;

    println!(
        "{:>4} {:>9} {:>9} {:>11} {:>11} {:>9} {:>10}",
        "hour", "gCO2/kWh", "draw W", "battery kJ", "grid kJ", "CO2 g", "state"
    );

    for fragment in trace.fragments() {
        graph.advance_to(fragment.start).unwrap();
        while next_sample <= fragment.start {
            print_row(&mut recorder, &chain, &mut graph);
            next_sample += HOUR;
        }

        // Office hours draw more.
        let hour = fragment.start / HOUR;
        let demand = if (8..18).contains(&hour) { 2_000.0 } else { 600.0 };
        graph
            .with_node::<Multiplexer, _>(mux, |m, ctx| m.set_demand(demand, ctx))
            .unwrap()
            .unwrap();
        chain.set_carbon_intensity(&mut graph, fragment.intensity).unwrap();
        graph.settle().unwrap();
    }
    if let Some(end) = trace.end() {
        graph.advance_to(end).unwrap();
        print_row(&mut recorder, &chain, &mut graph);
    }

    let report = chain.report(&mut graph).unwrap();
    info!(
        energy_kwh = report.energy_usage / JOULES_PER_KWH,
        battery_kwh = report.battery_energy_usage / JOULES_PER_KWH,
        emission_g = report.carbon_emission,
        "day complete"
    );

    chain.close(&mut graph).unwrap();
}

fn print_row(recorder: &mut PowerRecorder, chain: &PowerChain, graph: &mut FlowGraph) {
    let sample = recorder.record(&chain.report(graph).unwrap());
    println!(
        "{:>4} {:>9.1} {:>9.0} {:>11.0} {:>11.0} {:>9.1} {:>10}",
        sample.timestamp / HOUR,
        sample.carbon_intensity,
        sample.power_draw,
        sample.battery_energy_usage / 1_000.0,
        sample.grid_energy_usage / 1_000.0,
        sample.carbon_emission,
        sample.battery_state.map_or("-", BatteryState::name),
    );
}
