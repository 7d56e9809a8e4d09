//! Grid-only example: a scenario without a battery.
//!
//! Parses a scenario from inline JSON, runs it through the scenario runner
//! and prints the per-interval samples. Every joule comes from the grid, so
//! emission follows demand times the constant carbon intensity.
//!
//! Run with: `cargo run -p greenflow-examples --example grid_only`

use std::path::Path;

use greenflow_data::Scenario;
use greenflow_data::loader::{Format, deserialize_str};
use greenflow_data::schema::ScenarioData;
use tracing_subscriber::EnvFilter;

const SCENARIO: &str = r#"{
    "power_source": {"capacity": 5000.0, "carbon_intensity": 230.0},
    "demand": [
        {"at": 0, "watts": 400.0},
        {"at": 1800000, "watts": 1200.0},
        {"at": 5400000, "watts": 250.0}
    ],
    "duration": 7200000,
    "sample_interval": 900000
}"#;

fn main() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    let origin = Path::new("grid_only.json");
    let data: ScenarioData = deserialize_str(SCENARIO, Format::Json, origin).unwrap();
    let scenario = Scenario::from_data(data, Path::new(".")).unwrap();
    let outcome = scenario.run().unwrap();

    println!("{:>8} {:>8} {:>10} {:>8}", "minute", "draw W", "energy kJ", "CO2 g");
    for sample in &outcome.samples {
        println!(
            "{:>8} {:>8.0} {:>10.1} {:>8.2}",
            sample.timestamp / 60_000,
            sample.power_draw,
            sample.energy_usage / 1_000.0,
            sample.carbon_emission,
        );
    }
    println!(
        "\ntotal: {:.1} kJ, {:.2} g CO2",
        outcome.report.energy_usage / 1_000.0,
        outcome.report.carbon_emission
    );
}
