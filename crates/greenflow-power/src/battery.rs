//! Battery with a three-state charge/discharge machine.
//!
//! The adapter picks the state ([`Battery::set_charging`],
//! [`Battery::set_depleting`], [`Battery::set_idle`]). The battery itself only
//! enforces its capacity bounds, dropping to [`BatteryState::Idle`] when a
//! charge reaches the upper bound or a discharge reaches the lower bound.
//!
//! # Edges
//!
//! - [`EdgeRole::ToBattery`]: the battery supplies the adapter (depletion).
//! - [`EdgeRole::Charging`]: the battery consumes from the grid source.

use greenflow_core::clock::{Millis, NEVER, SimClock};
use greenflow_core::context::FlowContext;
use greenflow_core::edge::{EdgeRef, EdgeRole, checked_power, require_edge};
use greenflow_core::graph::FlowError;
use greenflow_core::node::FlowNode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::counter::{EnergyCounter, PowerNode};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatteryState {
    Charging,
    #[default]
    Idle,
    Depleting,
}

impl BatteryState {
    pub fn name(self) -> &'static str {
        match self {
            BatteryState::Charging => "charging",
            BatteryState::Idle => "idle",
            BatteryState::Depleting => "depleting",
        }
    }
}

impl std::fmt::Display for BatteryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BatteryConfigError {
    #[error("battery capacity must be positive, got {0} J")]
    NonPositiveCapacity(f64),
    #[error("charge current must be finite and non-negative, got {0} W")]
    InvalidChargeCurrent(f64),
    #[error("bounds must satisfy 0 < lower ({lower}) < upper ({upper}) < 1")]
    InvalidBounds { lower: f64, upper: f64 },
    #[error("initial charge {initial} J is outside [0, {capacity}] J")]
    InitialChargeOutOfRange { initial: f64, capacity: f64 },
    #[error("one tick of charging adds {step} J but only {headroom} J fit above the upper bound")]
    ChargeStepExceedsHeadroom { step: f64, headroom: f64 },
}

/// Static battery parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryConfig {
    /// Storage capacity in joules.
    pub capacity: f64,
    /// Constant charge rate in watts.
    pub charge_current: f64,
    /// Charge level at construction, in joules.
    pub initial_charge: f64,
    /// Fraction of capacity at which charging stops.
    pub upper_bound: f64,
    /// Fraction of capacity below which the battery counts as empty.
    pub lower_bound: f64,
}

impl BatteryConfig {
    pub const DEFAULT_UPPER_BOUND: f64 = 0.99;
    pub const DEFAULT_LOWER_BOUND: f64 = 0.05;

    /// An empty battery with default hysteresis bounds.
    pub fn new(capacity: f64, charge_current: f64) -> Self {
        Self {
            capacity,
            charge_current,
            initial_charge: 0.0,
            upper_bound: Self::DEFAULT_UPPER_BOUND,
            lower_bound: Self::DEFAULT_LOWER_BOUND,
        }
    }

    pub fn with_initial_charge(mut self, initial_charge: f64) -> Self {
        self.initial_charge = initial_charge;
        self
    }

    pub fn with_bounds(mut self, lower_bound: f64, upper_bound: f64) -> Self {
        self.lower_bound = lower_bound;
        self.upper_bound = upper_bound;
        self
    }

    pub fn validate(&self) -> Result<(), BatteryConfigError> {
        if !(self.capacity.is_finite() && self.capacity > 0.0) {
            return Err(BatteryConfigError::NonPositiveCapacity(self.capacity));
        }
        if !(self.charge_current.is_finite() && self.charge_current >= 0.0) {
            return Err(BatteryConfigError::InvalidChargeCurrent(self.charge_current));
        }
        let (lower, upper) = (self.lower_bound, self.upper_bound);
        if !(0.0 < lower && lower < upper && upper < 1.0) {
            return Err(BatteryConfigError::InvalidBounds { lower, upper });
        }
        if !(0.0..=self.capacity).contains(&self.initial_charge) {
            return Err(BatteryConfigError::InitialChargeOutOfRange {
                initial: self.initial_charge,
                capacity: self.capacity,
            });
        }
        // Bound crossings are observed on whole milliseconds, so a charge may
        // run up to one tick past the upper bound. That tick must fit.
        let step = self.charge_current * 0.001;
        let headroom = self.capacity * (1.0 - self.upper_bound);
        if step > headroom {
            return Err(BatteryConfigError::ChargeStepExceedsHeadroom { step, headroom });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Battery node
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Battery {
    clock: SimClock,
    config: BatteryConfig,
    state: BatteryState,
    charge_level: f64,

    consumer_edge: Option<EdgeRef>,
    supplier_edge: Option<EdgeRef>,

    /// Demand presented by the adapter on the depletion path.
    power_demand: f64,
    /// Supply pushed to the adapter. Zero unless depleting.
    power_supplied: f64,
    /// Charge demand pushed to the grid source.
    charge_demand: f64,
    /// Charge the grid source committed to deliver.
    charge_received: f64,

    usage: EnergyCounter,
    received: EnergyCounter,
}

impl Battery {
    pub fn new(clock: SimClock, config: BatteryConfig) -> Result<Self, BatteryConfigError> {
        config.validate()?;
        let start = clock.now();
        Ok(Self {
            clock,
            config,
            state: BatteryState::Idle,
            charge_level: config.initial_charge,
            consumer_edge: None,
            supplier_edge: None,
            power_demand: 0.0,
            power_supplied: 0.0,
            charge_demand: 0.0,
            charge_received: 0.0,
            usage: EnergyCounter::new(start),
            received: EnergyCounter::new(start),
        })
    }

    pub fn config(&self) -> &BatteryConfig {
        &self.config
    }

    pub fn capacity(&self) -> f64 {
        self.config.capacity
    }

    pub fn state(&self) -> BatteryState {
        self.state
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    /// Stored energy (J) as of the last counter update.
    pub fn charge_level(&self) -> f64 {
        self.charge_level
    }

    pub fn total_charge_received(&self) -> f64 {
        self.received.total()
    }

    pub fn charge_demand(&self) -> f64 {
        self.charge_demand
    }

    pub fn charge_received(&self) -> f64 {
        self.charge_received
    }

    /// Below the lower bound.
    pub fn is_empty(&self) -> bool {
        self.charge_level < self.config.capacity * self.config.lower_bound
    }

    /// At or above the upper bound.
    pub fn is_full(&self) -> bool {
        self.charge_level >= self.config.capacity * self.config.upper_bound
    }

    pub fn set_charging(&mut self, ctx: &mut FlowContext<'_>) {
        self.set_state(BatteryState::Charging, ctx);
    }

    pub fn set_depleting(&mut self, ctx: &mut FlowContext<'_>) {
        self.set_state(BatteryState::Depleting, ctx);
    }

    pub fn set_idle(&mut self, ctx: &mut FlowContext<'_>) {
        self.set_state(BatteryState::Idle, ctx);
    }

    fn set_state(&mut self, state: BatteryState, ctx: &mut FlowContext<'_>) {
        if self.state == state {
            return;
        }
        debug!(from = %self.state, to = %state, "battery state set");
        self.state = state;
        ctx.invalidate();
    }

    /// Time at which the active bound will be crossed at the current rates.
    fn next_bound_crossing(&self, now: Millis) -> Millis {
        let (gap, rate) = match self.state {
            BatteryState::Charging => (
                self.config.capacity * self.config.upper_bound - self.charge_level,
                self.charge_received - self.power_supplied,
            ),
            BatteryState::Depleting => (
                self.charge_level - self.config.capacity * self.config.lower_bound,
                self.power_supplied - self.charge_received,
            ),
            BatteryState::Idle => return NEVER,
        };
        if rate <= 0.0 {
            return NEVER;
        }
        let ms = (gap.max(0.0) / rate * 1_000.0).ceil() as Millis;
        now.saturating_add(ms.max(1))
    }

    fn role_error(&self, role: EdgeRole) -> FlowError {
        FlowError::UnexpectedRole {
            node: self.name().to_string(),
            role,
        }
    }
}

impl PowerNode for Battery {
    fn power_demand(&self) -> f64 {
        self.power_demand
    }

    fn power_draw(&self) -> f64 {
        self.power_supplied
    }

    fn total_energy_usage(&self) -> f64 {
        self.usage.total()
    }

    fn update_counters(&mut self, now: Millis) {
        let used = self.usage.integrate(self.power_supplied, now);
        let received = self.received.integrate(self.charge_received, now);
        let level = self.charge_level + received - used;
        let clamped = level.clamp(0.0, self.config.capacity);
        if clamped != level {
            warn!(level, capacity = self.config.capacity, "battery charge level clamped");
        }
        self.charge_level = clamped;
    }
}

impl FlowNode for Battery {
    fn name(&self) -> &str {
        "battery"
    }

    fn on_update(&mut self, now: Millis, ctx: &mut FlowContext<'_>) -> Result<Millis, FlowError> {
        self.update_counters(now);

        match self.state {
            BatteryState::Charging if self.is_full() => {
                debug!(level = self.charge_level, "battery full");
                self.state = BatteryState::Idle;
            }
            BatteryState::Depleting if self.is_empty() => {
                debug!(level = self.charge_level, "battery empty");
                self.state = BatteryState::Idle;
            }
            _ => {}
        }

        let (supply, charge_demand) = match self.state {
            BatteryState::Charging => (0.0, self.config.charge_current),
            BatteryState::Depleting => (self.power_demand, 0.0),
            BatteryState::Idle => (0.0, 0.0),
        };

        if supply != self.power_supplied {
            self.power_supplied = supply;
            let edge = require_edge(self.consumer_edge, self.name(), EdgeRole::ToBattery)?;
            ctx.push_supply(edge, supply)?;
        }
        if charge_demand != self.charge_demand {
            self.charge_demand = charge_demand;
            let edge = require_edge(self.supplier_edge, self.name(), EdgeRole::Charging)?;
            ctx.push_demand(edge, charge_demand)?;
        }

        Ok(self.next_bound_crossing(now))
    }

    fn handle_demand(
        &mut self,
        edge: EdgeRef,
        demand: f64,
        ctx: &mut FlowContext<'_>,
    ) -> Result<(), FlowError> {
        if edge.role != EdgeRole::ToBattery {
            return Err(self.role_error(edge.role));
        }
        let demand = checked_power(demand)?;
        if demand != self.power_demand {
            self.power_demand = demand;
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
        if edge.role != EdgeRole::Charging {
            return Err(self.role_error(edge.role));
        }
        let supply = checked_power(supply)?;
        self.update_counters(ctx.now());
        if supply != self.charge_received {
            self.charge_received = supply;
            ctx.invalidate();
        }
        Ok(())
    }

    fn add_consumer_edge(&mut self, edge: EdgeRef) -> Result<(), FlowError> {
        match edge.role {
            EdgeRole::ToBattery => {
                self.consumer_edge = Some(edge);
                Ok(())
            }
            role => Err(self.role_error(role)),
        }
    }

    fn remove_consumer_edge(&mut self, edge: EdgeRef) {
        if self.consumer_edge == Some(edge) {
            self.update_counters(self.clock.now());
            self.consumer_edge = None;
            self.power_demand = 0.0;
            self.power_supplied = 0.0;
        }
    }

    fn add_supplier_edge(&mut self, edge: EdgeRef) -> Result<(), FlowError> {
        match edge.role {
            EdgeRole::Charging => {
                self.supplier_edge = Some(edge);
                Ok(())
            }
            role => Err(self.role_error(role)),
        }
    }

    fn remove_supplier_edge(&mut self, edge: EdgeRef) {
        if self.supplier_edge == Some(edge) {
            self.update_counters(self.clock.now());
            self.supplier_edge = None;
            self.charge_demand = 0.0;
            self.charge_received = 0.0;
        }
    }

    fn close(&mut self, now: Millis) {
        self.update_counters(now);
        info!(
            level = self.charge_level,
            energy = self.usage.total(),
            received = self.received.total(),
            "battery closed"
        );
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::GridPowerSource;
    use greenflow_core::graph::FlowGraph;
    use greenflow_core::id::NodeId;
    use greenflow_core::test_utils::*;

    struct Rig {
        graph: FlowGraph,
        source: NodeId,
        battery: NodeId,
        load: NodeId,
    }

    impl Rig {
        /// Source -> battery (charging), battery -> probe load (depletion).
        fn new(config: BatteryConfig, demand: f64) -> Self {
            let mut graph = FlowGraph::new(SimClock::new(0));
            let clock = graph.clock().clone();
            let source = graph.add_node(GridPowerSource::new(clock.clone(), 10_000.0, 0.0));
            let battery = graph.add_node(Battery::new(clock, config).unwrap());
            let load = graph.add_node(ProbeConsumer::new(demand));
            graph.connect(source, battery, EdgeRole::Charging).unwrap();
            graph.connect(battery, load, EdgeRole::ToBattery).unwrap();
            graph.settle().unwrap();
            Self {
                graph,
                source,
                battery,
                load,
            }
        }

        fn set(&mut self, state: BatteryState) {
            self.graph
                .with_node::<Battery, _>(self.battery, |b, ctx| match state {
                    BatteryState::Charging => b.set_charging(ctx),
                    BatteryState::Depleting => b.set_depleting(ctx),
                    BatteryState::Idle => b.set_idle(ctx),
                })
                .unwrap();
            self.graph.settle().unwrap();
        }

        /// Battery with counters refreshed to now.
        fn battery(&mut self) -> &Battery {
            let now = self.graph.now();
            let battery = self.graph.node_mut::<Battery>(self.battery).unwrap();
            battery.update_counters(now);
            battery
        }

        fn received(&self) -> f64 {
            self.graph.node::<ProbeConsumer>(self.load).unwrap().received
        }
    }

    #[test]
    fn starts_idle_and_supplies_nothing() {
        let mut rig = Rig::new(BatteryConfig::new(1_000.0, 100.0).with_initial_charge(500.0), 300.0);

        assert_eq!(rig.battery().state(), BatteryState::Idle);
        assert_eq!(rig.battery().power_demand(), 300.0);
        assert_eq!(rig.battery().power_draw(), 0.0);
        assert_eq!(rig.received(), 0.0);
    }

    #[test]
    fn charging_draws_charge_current_from_source() {
        let mut rig = Rig::new(BatteryConfig::new(10_000.0, 100.0), 0.0);
        rig.set(BatteryState::Charging);

        rig.graph.advance_to(10_000).unwrap();

        let battery = rig.battery();
        assert_eq!(battery.state(), BatteryState::Charging);
        assert_eq!(battery.charge_demand(), 100.0);
        assert!((battery.charge_level() - 1_000.0).abs() < 1e-9);
        assert!((battery.total_charge_received() - 1_000.0).abs() < 1e-9);
        assert_eq!(battery.power_draw(), 0.0);
        let source = rig.graph.node_mut::<GridPowerSource>(rig.source).unwrap();
        assert!((source.energy_usage() - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn charging_stops_on_the_tick_the_upper_bound_is_crossed() {
        let mut rig = Rig::new(BatteryConfig::new(1_000.0, 100.0), 0.0);
        rig.set(BatteryState::Charging);

        // 990 J at 100 W is reached at t = 9.9 s.
        rig.graph.advance_to(9_899).unwrap();
        assert_eq!(rig.battery().state(), BatteryState::Charging);

        rig.graph.advance_to(20_000).unwrap();
        let battery = rig.battery();
        assert_eq!(battery.state(), BatteryState::Idle);
        assert_eq!(battery.charge_demand(), 0.0);
        assert!(battery.charge_level() >= 990.0);
        assert!(battery.charge_level() < 990.2);
        assert!(battery.charge_level() <= battery.capacity());
    }

    #[test]
    fn depleting_serves_demand_until_empty() {
        let config = BatteryConfig::new(1_000.0, 100.0).with_initial_charge(500.0);
        let mut rig = Rig::new(config, 300.0);
        rig.set(BatteryState::Depleting);
        assert_eq!(rig.received(), 300.0);

        rig.graph.advance_to(1_000).unwrap();
        let battery = rig.battery();
        assert!((battery.charge_level() - 200.0).abs() < 1e-9);
        assert!((battery.total_energy_usage() - 300.0).abs() < 1e-9);

        // The lower bound (50 J) is crossed at t = 1.5 s.
        rig.graph.advance_to(3_000).unwrap();
        let battery = rig.battery();
        assert_eq!(battery.state(), BatteryState::Idle);
        assert!(battery.is_empty());
        assert!(battery.charge_level() > 49.0);
        assert_eq!(rig.received(), 0.0);
    }

    #[test]
    fn depleting_does_not_draw_charge() {
        let config = BatteryConfig::new(1_000.0, 100.0).with_initial_charge(500.0);
        let mut rig = Rig::new(config, 100.0);
        rig.set(BatteryState::Charging);
        rig.set(BatteryState::Depleting);

        assert_eq!(rig.battery().charge_demand(), 0.0);
        assert_eq!(rig.battery().charge_received(), 0.0);
        let source = rig.graph.node::<GridPowerSource>(rig.source).unwrap();
        assert_eq!(source.charge_draw(), 0.0);
    }

    #[test]
    fn idle_is_never_left_without_an_external_call() {
        let config = BatteryConfig::new(1_000.0, 100.0).with_initial_charge(500.0);
        let mut rig = Rig::new(config, 300.0);

        rig.graph.advance_to(60_000).unwrap();

        let battery = rig.battery();
        assert_eq!(battery.state(), BatteryState::Idle);
        assert_eq!(battery.charge_level(), 500.0);
    }

    #[test]
    fn charging_a_full_battery_settles_idle_without_chatter() {
        let config = BatteryConfig::new(1_000.0, 100.0).with_initial_charge(995.0);
        let mut rig = Rig::new(config, 0.0);
        rig.set(BatteryState::Charging);

        assert_eq!(rig.battery().state(), BatteryState::Idle);
        assert_eq!(rig.battery().charge_demand(), 0.0);
        assert_eq!(rig.graph.next_wake(), None);
    }

    #[test]
    fn update_counters_is_idempotent() {
        let config = BatteryConfig::new(1_000.0, 100.0).with_initial_charge(500.0);
        let mut rig = Rig::new(config, 200.0);
        rig.set(BatteryState::Depleting);
        rig.graph.advance_to(1_000).unwrap();

        let first = rig.battery().charge_level();
        let second = rig.battery().charge_level();

        assert_eq!(first, second);
        assert_eq!(rig.battery().total_energy_usage(), 200.0);
    }

    #[test]
    fn charging_without_a_charging_edge_fails_fast() {
        let mut graph = FlowGraph::new(SimClock::new(0));
        let battery = graph.add_node(Battery::new(graph.clock().clone(), BatteryConfig::new(1_000.0, 10.0)).unwrap());
        graph.settle().unwrap();
        graph
            .with_node::<Battery, _>(battery, |b, ctx| b.set_charging(ctx))
            .unwrap();

        let err = graph.settle().unwrap_err();

        assert!(matches!(
            err,
            FlowError::Unconnected { role: EdgeRole::Charging, .. }
        ));
    }

    #[test]
    fn rejects_load_path_edge() {
        let mut graph = FlowGraph::new(SimClock::new(0));
        let battery = graph.add_node(Battery::new(graph.clock().clone(), BatteryConfig::new(1_000.0, 10.0)).unwrap());
        let load = graph.add_node(ProbeConsumer::new(0.0));

        let err = graph.connect(battery, load, EdgeRole::ToSource).unwrap_err();

        assert!(matches!(err, FlowError::UnexpectedRole { role: EdgeRole::ToSource, .. }));
    }

    #[test]
    fn config_validation() {
        assert!(BatteryConfig::new(1_000.0, 10.0).validate().is_ok());
        assert_eq!(
            BatteryConfig::new(0.0, 10.0).validate(),
            Err(BatteryConfigError::NonPositiveCapacity(0.0))
        );
        assert_eq!(
            BatteryConfig::new(1_000.0, -1.0).validate(),
            Err(BatteryConfigError::InvalidChargeCurrent(-1.0))
        );
        assert!(matches!(
            BatteryConfig::new(1_000.0, 10.0).with_bounds(0.5, 0.4).validate(),
            Err(BatteryConfigError::InvalidBounds { .. })
        ));
        assert!(matches!(
            BatteryConfig::new(1_000.0, 10.0).with_bounds(0.05, 1.0).validate(),
            Err(BatteryConfigError::InvalidBounds { .. })
        ));
        assert!(matches!(
            BatteryConfig::new(1_000.0, 10.0).with_initial_charge(2_000.0).validate(),
            Err(BatteryConfigError::InitialChargeOutOfRange { .. })
        ));
    }

    #[test]
    fn charge_step_must_fit_above_the_upper_bound() {
        // 100 kW puts 100 J into a 10 J battery within one tick.
        assert!(matches!(
            BatteryConfig::new(10.0, 100_000.0).validate(),
            Err(BatteryConfigError::ChargeStepExceedsHeadroom { .. })
        ));
        assert!(Battery::new(SimClock::new(0), BatteryConfig::new(10.0, 100_000.0)).is_err());
        // 10 J per tick against 10 J of headroom is the limit.
        assert!(BatteryConfig::new(1_000.0, 10_000.0).validate().is_ok());
    }

    #[test]
    fn fastest_allowed_charge_never_spills_past_capacity() {
        let config = BatteryConfig::new(1_000.0, 10_000.0).with_initial_charge(985.0);
        let mut rig = Rig::new(config, 0.0);
        rig.set(BatteryState::Charging);

        rig.graph.advance_to(5).unwrap();

        let battery = rig.battery();
        assert_eq!(battery.state(), BatteryState::Idle);
        assert!(battery.charge_level() <= battery.capacity());
        let balance = 985.0 + battery.total_charge_received() - battery.total_energy_usage();
        assert!((battery.charge_level() - balance).abs() < 1e-9);
        let received = battery.total_charge_received();
        let source = rig.graph.node_mut::<GridPowerSource>(rig.source).unwrap();
        assert!((source.energy_usage() - received).abs() < 1e-9);
    }

    #[test]
    fn state_names() {
        assert_eq!(BatteryState::Charging.to_string(), "charging");
        assert_eq!(BatteryState::Idle.name(), "idle");
        assert_eq!(BatteryState::Depleting.name(), "depleting");
    }
}
