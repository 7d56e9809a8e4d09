//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these probes
//! are available in unit tests and, via the `test-utils` feature, to other
//! crates' tests.

use crate::clock::{Millis, NEVER, SimClock};
use crate::context::FlowContext;
use crate::edge::{EdgeRef, EdgeRole, require_edge};
use crate::graph::{FlowError, FlowGraph};
use crate::id::{EdgeId, NodeId};
use crate::node::FlowNode;

// ===========================================================================
// Probe supplier
// ===========================================================================

/// A supplier that answers every demand in full, optionally capped.
#[derive(Debug, Default)]
pub struct ProbeSupplier {
    pub consumer_edge: Option<EdgeRef>,
    pub demand: f64,
    pub supplied: f64,
    /// Upper bound on what is supplied, if any.
    pub limit: Option<f64>,
    /// Re-arm a wake timer this many ms after every update.
    pub period: Option<Millis>,
    /// Invalidate itself on every update (never settles).
    pub restless: bool,
    pub updates: usize,
    pub closed: bool,
}

impl ProbeSupplier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlowNode for ProbeSupplier {
    fn name(&self) -> &str {
        "probe-supplier"
    }

    fn on_update(&mut self, now: Millis, ctx: &mut FlowContext<'_>) -> Result<Millis, FlowError> {
        self.updates += 1;
        let supply = match self.limit {
            Some(limit) => self.demand.min(limit),
            None => self.demand,
        };
        if supply != self.supplied {
            self.supplied = supply;
            let edge = require_edge(self.consumer_edge, self.name(), EdgeRole::ToSource)?;
            ctx.push_supply(edge, supply)?;
        }
        if self.restless {
            ctx.invalidate();
        }
        Ok(self.period.map_or(NEVER, |p| now + p))
    }

    fn handle_demand(
        &mut self,
        _edge: EdgeRef,
        demand: f64,
        ctx: &mut FlowContext<'_>,
    ) -> Result<(), FlowError> {
        if demand != self.demand {
            self.demand = demand;
            ctx.invalidate();
        }
        Ok(())
    }

    fn add_consumer_edge(&mut self, edge: EdgeRef) -> Result<(), FlowError> {
        self.consumer_edge = Some(edge);
        Ok(())
    }

    fn remove_consumer_edge(&mut self, _edge: EdgeRef) {
        self.consumer_edge = None;
    }

    fn close(&mut self, _now: Millis) {
        self.closed = true;
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

// ===========================================================================
// Probe consumer
// ===========================================================================

/// A consumer that requests a fixed demand and records what it receives.
#[derive(Debug, Default)]
pub struct ProbeConsumer {
    pub supplier_edge: Option<EdgeRef>,
    pub demand: f64,
    pub pushed: Option<f64>,
    pub received: f64,
    pub supply_events: usize,
}

impl ProbeConsumer {
    pub fn new(demand: f64) -> Self {
        Self {
            demand,
            ..Self::default()
        }
    }
}

impl FlowNode for ProbeConsumer {
    fn name(&self) -> &str {
        "probe-consumer"
    }

    fn on_update(&mut self, _now: Millis, ctx: &mut FlowContext<'_>) -> Result<Millis, FlowError> {
        if self.pushed != Some(self.demand) {
            let edge = require_edge(self.supplier_edge, self.name(), EdgeRole::ToSource)?;
            ctx.push_demand(edge, self.demand)?;
            self.pushed = Some(self.demand);
        }
        Ok(NEVER)
    }

    fn handle_supply(
        &mut self,
        _edge: EdgeRef,
        supply: f64,
        _ctx: &mut FlowContext<'_>,
    ) -> Result<(), FlowError> {
        self.received = supply;
        self.supply_events += 1;
        Ok(())
    }

    fn add_supplier_edge(&mut self, edge: EdgeRef) -> Result<(), FlowError> {
        self.supplier_edge = Some(edge);
        Ok(())
    }

    fn remove_supplier_edge(&mut self, _edge: EdgeRef) {
        self.supplier_edge = None;
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

// ===========================================================================
// Graph builders
// ===========================================================================

/// Build a graph at t=0 holding one probe supplier wired to one probe
/// consumer over a `ToSource` edge.
pub fn probe_pair(demand: f64) -> (FlowGraph, NodeId, NodeId, EdgeId) {
    let mut graph = FlowGraph::new(SimClock::new(0));
    let supplier = graph.add_node(ProbeSupplier::new());
    let consumer = graph.add_node(ProbeConsumer::new(demand));
    let edge = graph
        .connect(supplier, consumer, EdgeRole::ToSource)
        .expect("probe nodes accept a to-source edge");
    (graph, supplier, consumer, edge)
}
