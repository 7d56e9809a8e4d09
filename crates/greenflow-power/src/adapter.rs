//! Power adapters: the node between the multiplexer and the supply side.
//!
//! Two variants, chosen when the chain is built:
//!
//! - [`PowerAdapter::GridOnly`] forwards demand to the grid source and supply
//!   back to the multiplexer without evaluating any policy.
//! - [`PowerAdapter::GridWithBattery`] evaluates a [`CarbonPolicy`] once per
//!   update and routes the whole demand to either the grid source or the
//!   battery, steering the battery's state along the way.
//!
//! The adapter owns no physical energy. It mirrors what its children supply
//! into combined and per-child counters for reporting.

use greenflow_core::clock::{Millis, NEVER, SimClock};
use greenflow_core::context::FlowContext;
use greenflow_core::edge::{EdgeRef, EdgeRole, checked_power, require_edge};
use greenflow_core::graph::FlowError;
use greenflow_core::id::NodeId;
use greenflow_core::node::FlowNode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::battery::Battery;
use crate::counter::{EnergyCounter, PowerNode};
use crate::policy::CarbonPolicy;
use crate::source::GridPowerSource;

/// Which child serves the demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    #[default]
    Grid,
    Battery,
}

fn unexpected(node: &str, role: EdgeRole) -> FlowError {
    FlowError::UnexpectedRole {
        node: node.to_string(),
        role,
    }
}

// ---------------------------------------------------------------------------
// Grid-only pass-through
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct GridOnlyAdapter {
    clock: SimClock,
    mux_edge: Option<EdgeRef>,
    source_edge: Option<EdgeRef>,
    demand: f64,
    /// Demand last pushed to the grid source.
    source_demand: f64,
    supplied: f64,
    energy: EnergyCounter,
}

impl GridOnlyAdapter {
    pub fn new(clock: SimClock) -> Self {
        let start = clock.now();
        Self {
            clock,
            mux_edge: None,
            source_edge: None,
            demand: 0.0,
            source_demand: 0.0,
            supplied: 0.0,
            energy: EnergyCounter::new(start),
        }
    }

    fn forward_demand(&mut self, ctx: &mut FlowContext<'_>) -> Result<(), FlowError> {
        if self.demand != self.source_demand {
            let source = require_edge(self.source_edge, self.name(), EdgeRole::ToSource)?;
            ctx.push_demand(source, self.demand)?;
            self.source_demand = self.demand;
        }
        Ok(())
    }
}

/// Pass supply on to the multiplexer. Without one the load is
/// gone, and only a zero supply has nowhere left to go.
fn forward_supply(
    mux_edge: Option<EdgeRef>,
    node: &str,
    supply: f64,
    ctx: &mut FlowContext<'_>,
) -> Result<(), FlowError> {
    match mux_edge {
        Some(edge) => ctx.push_supply(edge, supply),
        None if supply == 0.0 => Ok(()),
        None => Err(FlowError::Unconnected {
            node: node.to_string(),
            role: EdgeRole::ToMultiplexer,
        }),
    }
}

impl PowerNode for GridOnlyAdapter {
    fn power_demand(&self) -> f64 {
        self.demand
    }

    fn power_draw(&self) -> f64 {
        self.supplied
    }

    fn total_energy_usage(&self) -> f64 {
        self.energy.total()
    }

    fn update_counters(&mut self, now: Millis) {
        self.energy.integrate(self.supplied, now);
    }
}

impl FlowNode for GridOnlyAdapter {
    fn name(&self) -> &str {
        "grid-only-adapter"
    }

    fn on_update(&mut self, now: Millis, ctx: &mut FlowContext<'_>) -> Result<Millis, FlowError> {
        self.update_counters(now);
        self.forward_demand(ctx)?;
        Ok(NEVER)
    }

    fn handle_demand(
        &mut self,
        edge: EdgeRef,
        demand: f64,
        ctx: &mut FlowContext<'_>,
    ) -> Result<(), FlowError> {
        if edge.role != EdgeRole::ToMultiplexer {
            return Err(unexpected(self.name(), edge.role));
        }
        self.demand = checked_power(demand)?;
        self.forward_demand(ctx)
    }

    fn handle_supply(
        &mut self,
        edge: EdgeRef,
        supply: f64,
        ctx: &mut FlowContext<'_>,
    ) -> Result<(), FlowError> {
        if edge.role != EdgeRole::ToSource {
            return Err(unexpected(self.name(), edge.role));
        }
        let supply = checked_power(supply)?;
        self.update_counters(ctx.now());
        self.supplied = supply;
        forward_supply(self.mux_edge, self.name(), supply, ctx)
    }

    fn add_consumer_edge(&mut self, edge: EdgeRef) -> Result<(), FlowError> {
        match edge.role {
            EdgeRole::ToMultiplexer => {
                self.mux_edge = Some(edge);
                Ok(())
            }
            role => Err(unexpected(self.name(), role)),
        }
    }

    fn remove_consumer_edge(&mut self, _edge: EdgeRef) {
        // The next update withdraws the demand from the source.
        self.mux_edge = None;
        self.demand = 0.0;
    }

    fn add_supplier_edge(&mut self, edge: EdgeRef) -> Result<(), FlowError> {
        match edge.role {
            EdgeRole::ToSource => {
                self.source_edge = Some(edge);
                self.source_demand = 0.0;
                Ok(())
            }
            role => Err(unexpected(self.name(), role)),
        }
    }

    fn remove_supplier_edge(&mut self, _edge: EdgeRef) {
        self.update_counters(self.clock.now());
        self.source_edge = None;
        self.source_demand = 0.0;
        self.supplied = 0.0;
    }

    fn close(&mut self, now: Millis) {
        self.update_counters(now);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Battery-backed dispatch
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct BatteryAdapter {
    clock: SimClock,
    source: NodeId,
    battery: NodeId,
    policy: Box<dyn CarbonPolicy>,

    mux_edge: Option<EdgeRef>,
    source_edge: Option<EdgeRef>,
    battery_edge: Option<EdgeRef>,

    /// Aggregate demand from the multiplexer.
    demand: f64,
    /// Policy answer cached for the current update.
    green_energy_available: bool,
    route: Route,

    source_demand: f64,
    battery_demand: f64,
    source_supplied: f64,
    battery_supplied: f64,
    combined_supplied: f64,

    combined_energy: EnergyCounter,
    source_energy: EnergyCounter,
    battery_energy: EnergyCounter,
}

impl BatteryAdapter {
    pub fn new(
        clock: SimClock,
        source: NodeId,
        battery: NodeId,
        policy: Box<dyn CarbonPolicy>,
    ) -> Self {
        let start = clock.now();
        Self {
            clock,
            source,
            battery,
            policy,
            mux_edge: None,
            source_edge: None,
            battery_edge: None,
            demand: 0.0,
            green_energy_available: false,
            route: Route::Grid,
            source_demand: 0.0,
            battery_demand: 0.0,
            source_supplied: 0.0,
            battery_supplied: 0.0,
            combined_supplied: 0.0,
            combined_energy: EnergyCounter::new(start),
            source_energy: EnergyCounter::new(start),
            battery_energy: EnergyCounter::new(start),
        }
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn battery(&self) -> NodeId {
        self.battery
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn green_energy_available(&self) -> bool {
        self.green_energy_available
    }

    /// Energy (J) the battery delivered to the load.
    pub fn battery_energy_usage(&self) -> f64 {
        self.battery_energy.total()
    }

    /// Energy (J) the grid source delivered to the load.
    pub fn source_energy_usage(&self) -> f64 {
        self.source_energy.total()
    }

    /// Pick the route for this update and put the battery in the matching
    /// state.
    fn dispatch(&mut self, ctx: &mut FlowContext<'_>) -> Result<Route, FlowError> {
        if self.green_energy_available {
            ctx.with_node::<Battery, _>(self.battery, |b, bctx| b.set_charging(bctx))?;
            return Ok(Route::Grid);
        }
        let empty = ctx.with_node::<Battery, _>(self.battery, |b, bctx| {
            b.update_counters(bctx.now());
            b.is_empty()
        })?;
        if empty {
            ctx.with_node::<Battery, _>(self.battery, |b, bctx| b.set_idle(bctx))?;
            Ok(Route::Grid)
        } else {
            ctx.with_node::<Battery, _>(self.battery, |b, bctx| b.set_depleting(bctx))?;
            Ok(Route::Battery)
        }
    }
}

impl PowerNode for BatteryAdapter {
    fn power_demand(&self) -> f64 {
        self.demand
    }

    fn power_draw(&self) -> f64 {
        self.combined_supplied
    }

    fn total_energy_usage(&self) -> f64 {
        self.combined_energy.total()
    }

    fn update_counters(&mut self, now: Millis) {
        self.combined_energy
            .integrate(self.source_supplied + self.battery_supplied, now);
        self.source_energy.integrate(self.source_supplied, now);
        self.battery_energy.integrate(self.battery_supplied, now);
    }
}

impl FlowNode for BatteryAdapter {
    fn name(&self) -> &str {
        "battery-adapter"
    }

    fn on_update(&mut self, now: Millis, ctx: &mut FlowContext<'_>) -> Result<Millis, FlowError> {
        self.update_counters(now);

        let intensity =
            ctx.with_node::<GridPowerSource, _>(self.source, |s, _| s.carbon_intensity())?;
        self.green_energy_available = self.policy.green_energy_available(intensity, now);

        let route = self.dispatch(ctx)?;
        if route != self.route {
            debug!(
                ?route,
                intensity,
                green = self.green_energy_available,
                "adapter route changed"
            );
            self.route = route;
        }

        let (to_source, to_battery) = match route {
            Route::Grid => (self.demand, 0.0),
            Route::Battery => (0.0, self.demand),
        };
        if to_source != self.source_demand {
            self.source_demand = to_source;
            let edge = require_edge(self.source_edge, self.name(), EdgeRole::ToSource)?;
            ctx.push_demand(edge, to_source)?;
        }
        if to_battery != self.battery_demand {
            self.battery_demand = to_battery;
            let edge = require_edge(self.battery_edge, self.name(), EdgeRole::ToBattery)?;
            ctx.push_demand(edge, to_battery)?;
        }

        ctx.update_node(self.source)?;
        ctx.update_node(self.battery)?;
        Ok(NEVER)
    }

    fn handle_demand(
        &mut self,
        edge: EdgeRef,
        demand: f64,
        ctx: &mut FlowContext<'_>,
    ) -> Result<(), FlowError> {
        if edge.role != EdgeRole::ToMultiplexer {
            return Err(unexpected(self.name(), edge.role));
        }
        let demand = checked_power(demand)?;
        if demand != self.demand {
            self.demand = demand;
            ctx.invalidate();
        }
        Ok(())
    }

    fn handle_supply(
        &mut self,
        edge: EdgeRef,
        supply: f64,
        ctx: &mut FlowContext<'_>,
    ) -> Result<(), FlowError> {
        let supply = checked_power(supply)?;
        self.update_counters(ctx.now());
        match edge.role {
            EdgeRole::ToSource => self.source_supplied = supply,
            EdgeRole::ToBattery => self.battery_supplied = supply,
            role @ (EdgeRole::ToMultiplexer | EdgeRole::Charging) => {
                return Err(unexpected(self.name(), role));
            }
        }

        let combined = self.source_supplied + self.battery_supplied;
        if combined != self.combined_supplied {
            self.combined_supplied = combined;
            forward_supply(self.mux_edge, self.name(), combined, ctx)?;
        }
        ctx.invalidate();
        Ok(())
    }

    fn add_consumer_edge(&mut self, edge: EdgeRef) -> Result<(), FlowError> {
        match edge.role {
            EdgeRole::ToMultiplexer => {
                self.mux_edge = Some(edge);
                Ok(())
            }
            role => Err(unexpected(self.name(), role)),
        }
    }

    fn remove_consumer_edge(&mut self, _edge: EdgeRef) {
        self.mux_edge = None;
        self.demand = 0.0;
    }

    fn add_supplier_edge(&mut self, edge: EdgeRef) -> Result<(), FlowError> {
        match edge.role {
            EdgeRole::ToSource => self.source_edge = Some(edge),
            EdgeRole::ToBattery => self.battery_edge = Some(edge),
            role @ (EdgeRole::ToMultiplexer | EdgeRole::Charging) => {
                return Err(unexpected(self.name(), role));
            }
        }
        Ok(())
    }

    fn remove_supplier_edge(&mut self, edge: EdgeRef) {
        self.update_counters(self.clock.now());
        match edge.role {
            EdgeRole::ToSource => {
                self.source_edge = None;
                self.source_demand = 0.0;
                self.source_supplied = 0.0;
            }
            EdgeRole::ToBattery => {
                self.battery_edge = None;
                self.battery_demand = 0.0;
                self.battery_supplied = 0.0;
            }
            EdgeRole::ToMultiplexer | EdgeRole::Charging => {}
        }
        self.combined_supplied = self.source_supplied + self.battery_supplied;
    }

    fn close(&mut self, now: Millis) {
        self.update_counters(now);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Closed adapter set
// ---------------------------------------------------------------------------

/// The adapter node inserted into the graph.
#[derive(Debug)]
pub enum PowerAdapter {
    GridOnly(GridOnlyAdapter),
    GridWithBattery(BatteryAdapter),
}

impl PowerAdapter {
    pub fn grid_only(clock: SimClock) -> Self {
        PowerAdapter::GridOnly(GridOnlyAdapter::new(clock))
    }

    pub fn with_battery(
        clock: SimClock,
        source: NodeId,
        battery: NodeId,
        policy: Box<dyn CarbonPolicy>,
    ) -> Self {
        PowerAdapter::GridWithBattery(BatteryAdapter::new(clock, source, battery, policy))
    }

    fn inner(&self) -> &dyn FlowNode {
        match self {
            PowerAdapter::GridOnly(a) => a,
            PowerAdapter::GridWithBattery(a) => a,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn FlowNode {
        match self {
            PowerAdapter::GridOnly(a) => a,
            PowerAdapter::GridWithBattery(a) => a,
        }
    }

    /// Energy (J) the battery delivered to the load. Zero without a battery.
    pub fn battery_energy_usage(&self) -> f64 {
        match self {
            PowerAdapter::GridOnly(_) => 0.0,
            PowerAdapter::GridWithBattery(a) => a.battery_energy_usage(),
        }
    }

    /// Energy (J) the grid source delivered to the load.
    pub fn source_energy_usage(&self) -> f64 {
        match self {
            PowerAdapter::GridOnly(a) => a.total_energy_usage(),
            PowerAdapter::GridWithBattery(a) => a.source_energy_usage(),
        }
    }

    /// The cached policy answer. `None` when no policy is evaluated.
    pub fn green_energy_available(&self) -> Option<bool> {
        match self {
            PowerAdapter::GridOnly(_) => None,
            PowerAdapter::GridWithBattery(a) => Some(a.green_energy_available()),
        }
    }

    pub fn route(&self) -> Route {
        match self {
            PowerAdapter::GridOnly(_) => Route::Grid,
            PowerAdapter::GridWithBattery(a) => a.route(),
        }
    }
}

impl PowerNode for PowerAdapter {
    fn power_demand(&self) -> f64 {
        match self {
            PowerAdapter::GridOnly(a) => a.power_demand(),
            PowerAdapter::GridWithBattery(a) => a.power_demand(),
        }
    }

    fn power_draw(&self) -> f64 {
        match self {
            PowerAdapter::GridOnly(a) => a.power_draw(),
            PowerAdapter::GridWithBattery(a) => a.power_draw(),
        }
    }

    fn total_energy_usage(&self) -> f64 {
        match self {
            PowerAdapter::GridOnly(a) => a.total_energy_usage(),
            PowerAdapter::GridWithBattery(a) => a.total_energy_usage(),
        }
    }

    fn update_counters(&mut self, now: Millis) {
        match self {
            PowerAdapter::GridOnly(a) => a.update_counters(now),
            PowerAdapter::GridWithBattery(a) => a.update_counters(now),
        }
    }
}

impl FlowNode for PowerAdapter {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn on_update(&mut self, now: Millis, ctx: &mut FlowContext<'_>) -> Result<Millis, FlowError> {
        self.inner_mut().on_update(now, ctx)
    }

    fn handle_demand(
        &mut self,
        edge: EdgeRef,
        demand: f64,
        ctx: &mut FlowContext<'_>,
    ) -> Result<(), FlowError> {
        self.inner_mut().handle_demand(edge, demand, ctx)
    }

    fn handle_supply(
        &mut self,
        edge: EdgeRef,
        supply: f64,
        ctx: &mut FlowContext<'_>,
    ) -> Result<(), FlowError> {
        self.inner_mut().handle_supply(edge, supply, ctx)
    }

    fn add_consumer_edge(&mut self, edge: EdgeRef) -> Result<(), FlowError> {
        self.inner_mut().add_consumer_edge(edge)
    }

    fn remove_consumer_edge(&mut self, edge: EdgeRef) {
        self.inner_mut().remove_consumer_edge(edge)
    }

    fn add_supplier_edge(&mut self, edge: EdgeRef) -> Result<(), FlowError> {
        self.inner_mut().add_supplier_edge(edge)
    }

    fn remove_supplier_edge(&mut self, edge: EdgeRef) {
        self.inner_mut().remove_supplier_edge(edge)
    }

    fn close(&mut self, now: Millis) {
        self.inner_mut().close(now)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
