//! Grid-connected power source.
//!
//! The source satisfies whatever is asked of it on two paths: the load path
//! to the adapter ([`EdgeRole::ToSource`]) and the charging path to the
//! battery ([`EdgeRole::Charging`]). Capacity is advisory and reported only.
//! Carbon emission is charged on the energy of both paths.

use greenflow_core::clock::{Millis, NEVER, SimClock};
use greenflow_core::context::FlowContext;
use greenflow_core::edge::{EdgeRef, EdgeRole, checked_power};
use greenflow_core::graph::FlowError;
use greenflow_core::node::FlowNode;
use tracing::{debug, info, trace};

use crate::counter::{EnergyCounter, JOULES_PER_KWH, PowerNode};

/// Demand, supply and energy of one outbound path.
#[derive(Debug, Clone, Default)]
struct SupplyPath {
    edge: Option<EdgeRef>,
    demand: f64,
    supplied: f64,
    energy: EnergyCounter,
}

impl SupplyPath {
    fn new(start: Millis) -> Self {
        Self {
            energy: EnergyCounter::new(start),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct GridPowerSource {
    clock: SimClock,
    capacity: f64,
    carbon_intensity: f64,
    total_carbon_emission: f64,
    load: SupplyPath,
    charge: SupplyPath,
}

impl GridPowerSource {
    /// Create a source with a capacity ceiling (W) and an initial carbon
    /// intensity (gCO2/kWh).
    pub fn new(clock: SimClock, capacity: f64, carbon_intensity: f64) -> Self {
        let start = clock.now();
        Self {
            clock,
            capacity,
            carbon_intensity,
            total_carbon_emission: 0.0,
            load: SupplyPath::new(start),
            charge: SupplyPath::new(start),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn carbon_intensity(&self) -> f64 {
        self.carbon_intensity
    }

    /// Cumulative emission (g) as of the last counter update.
    pub fn carbon_emission(&self) -> f64 {
        self.total_carbon_emission
    }

    /// Refresh counters to the clock's current time and return the
    /// cumulative energy (J) delivered on both paths.
    pub fn energy_usage(&mut self) -> f64 {
        self.update_counters(self.clock.now());
        self.total_energy_usage()
    }

    /// Energy (J) delivered on the load path only.
    pub fn load_energy_usage(&self) -> f64 {
        self.load.energy.total()
    }

    /// Energy (J) delivered on the charging path only.
    pub fn charge_energy_usage(&self) -> f64 {
        self.charge.energy.total()
    }

    pub fn load_draw(&self) -> f64 {
        self.load.supplied
    }

    pub fn charge_draw(&self) -> f64 {
        self.charge.supplied
    }

    /// Set the grid's carbon intensity. The interval up to now is charged at
    /// the previous intensity.
    pub fn update_carbon_intensity(&mut self, carbon_intensity: f64) -> Result<(), FlowError> {
        if !(carbon_intensity.is_finite() && carbon_intensity >= 0.0) {
            return Err(FlowError::InvalidIntensity(carbon_intensity));
        }
        self.update_counters(self.clock.now());
        if carbon_intensity != self.carbon_intensity {
            debug!(
                from = self.carbon_intensity,
                to = carbon_intensity,
                "carbon intensity changed"
            );
        }
        self.carbon_intensity = carbon_intensity;
        Ok(())
    }

    fn path_mut(&mut self, edge: EdgeRef) -> Result<&mut SupplyPath, FlowError> {
        match edge.role {
            EdgeRole::ToSource => Ok(&mut self.load),
            EdgeRole::Charging => Ok(&mut self.charge),
            role @ (EdgeRole::ToMultiplexer | EdgeRole::ToBattery) => {
                Err(FlowError::UnexpectedRole {
                    node: self.name().to_string(),
                    role,
                })
            }
        }
    }
}

impl PowerNode for GridPowerSource {
    fn power_demand(&self) -> f64 {
        self.load.demand + self.charge.demand
    }

    fn power_draw(&self) -> f64 {
        self.load.supplied + self.charge.supplied
    }

    fn total_energy_usage(&self) -> f64 {
        self.load.energy.total() + self.charge.energy.total()
    }

    fn update_counters(&mut self, now: Millis) {
        let delta = self.load.energy.integrate(self.load.supplied, now)
            + self.charge.energy.integrate(self.charge.supplied, now);
        self.total_carbon_emission += self.carbon_intensity * (delta / JOULES_PER_KWH);
    }
}

impl FlowNode for GridPowerSource {
    fn name(&self) -> &str {
        "grid-power-source"
    }

    fn on_update(&mut self, now: Millis, ctx: &mut FlowContext<'_>) -> Result<Millis, FlowError> {
        self.update_counters(now);

        for path in [&mut self.load, &mut self.charge] {
            let Some(edge) = path.edge else {
                continue;
            };
            if path.demand != path.supplied {
                path.supplied = path.demand;
                ctx.push_supply(edge, path.supplied)?;
            }
        }

        let draw = self.power_draw();
        if draw > self.capacity {
            trace!(draw, capacity = self.capacity, "drawing above advisory capacity");
        }
        Ok(NEVER)
    }

    fn handle_demand(
        &mut self,
        edge: EdgeRef,
        demand: f64,
        ctx: &mut FlowContext<'_>,
    ) -> Result<(), FlowError> {
        let demand = checked_power(demand)?;
        let path = self.path_mut(edge)?;
        if path.demand == demand {
            return Ok(());
        }
        path.demand = demand;
        ctx.invalidate();
        Ok(())
    }

    fn add_consumer_edge(&mut self, edge: EdgeRef) -> Result<(), FlowError> {
        self.path_mut(edge)?.edge = Some(edge);
        Ok(())
    }

    fn remove_consumer_edge(&mut self, edge: EdgeRef) {
        self.update_counters(self.clock.now());
        if let Ok(path) = self.path_mut(edge) {
            path.edge = None;
            path.demand = 0.0;
            path.supplied = 0.0;
        }
    }

    fn close(&mut self, now: Millis) {
        self.update_counters(now);
        info!(
            energy = self.total_energy_usage(),
            emission = self.total_carbon_emission,
            "grid power source closed"
        );
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
