//! Aggregate load presented to a power chain.
//!
//! Stands in for the machine-side multiplexer: whatever fans out to the
//! individual consumers upstream, the power chain only ever sees one
//! aggregate demand on a [`EdgeRole::ToMultiplexer`] edge.

use greenflow_core::clock::{Millis, NEVER, SimClock};
use greenflow_core::context::FlowContext;
use greenflow_core::edge::{EdgeRef, EdgeRole, checked_power, require_edge};
use greenflow_core::graph::FlowError;
use greenflow_core::node::FlowNode;
use tracing::debug;

use crate::counter::{EnergyCounter, PowerNode};

#[derive(Debug)]
pub struct Multiplexer {
    clock: SimClock,
    supplier_edge: Option<EdgeRef>,
    demand: f64,
    pushed_demand: f64,
    supplied: f64,
    energy: EnergyCounter,
}

impl Multiplexer {
    pub fn new(clock: SimClock) -> Self {
        let start = clock.now();
        Self {
            clock,
            supplier_edge: None,
            demand: 0.0,
            pushed_demand: 0.0,
            supplied: 0.0,
            energy: EnergyCounter::new(start),
        }
    }

    /// Request a new aggregate demand (W). Takes effect when the graph
    /// settles.
    pub fn set_demand(&mut self, watts: f64, ctx: &mut FlowContext<'_>) -> Result<(), FlowError> {
        let watts = checked_power(watts)?;
        if watts != self.demand {
            debug!(from = self.demand, to = watts, "aggregate demand changed");
            self.demand = watts;
            ctx.invalidate();
        }
        Ok(())
    }

    /// Demand (W) not covered by the chain's current supply.
    pub fn shortfall(&self) -> f64 {
        (self.demand - self.supplied).max(0.0)
    }
}

impl PowerNode for Multiplexer {
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

impl FlowNode for Multiplexer {
    fn name(&self) -> &str {
        "multiplexer"
    }

    fn on_update(&mut self, now: Millis, ctx: &mut FlowContext<'_>) -> Result<Millis, FlowError> {
        self.update_counters(now);
        if self.demand != self.pushed_demand {
            let edge = require_edge(self.supplier_edge, self.name(), EdgeRole::ToMultiplexer)?;
            ctx.push_demand(edge, self.demand)?;
            self.pushed_demand = self.demand;
        }
        Ok(NEVER)
    }

    fn handle_supply(
        &mut self,
        edge: EdgeRef,
        supply: f64,
        ctx: &mut FlowContext<'_>,
    ) -> Result<(), FlowError> {
        if edge.role != EdgeRole::ToMultiplexer {
            return Err(FlowError::UnexpectedRole {
                node: self.name().to_string(),
                role: edge.role,
            });
        }
        self.update_counters(ctx.now());
        self.supplied = checked_power(supply)?;
        Ok(())
    }

    fn add_supplier_edge(&mut self, edge: EdgeRef) -> Result<(), FlowError> {
        match edge.role {
            EdgeRole::ToMultiplexer => {
                // A fresh supplier has seen no demand yet.
                self.supplier_edge = Some(edge);
                self.pushed_demand = 0.0;
                Ok(())
            }
            role => Err(FlowError::UnexpectedRole {
                node: self.name().to_string(),
                role,
            }),
        }
    }

    fn remove_supplier_edge(&mut self, _edge: EdgeRef) {
        self.update_counters(self.clock.now());
        self.supplier_edge = None;
        self.supplied = 0.0;
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
