pub mod loader;
pub mod scenario;
pub mod schema;

pub use loader::{DataLoadError, deserialize_file};
pub use scenario::{DemandStep, Scenario, ScenarioError, ScenarioOutcome};
