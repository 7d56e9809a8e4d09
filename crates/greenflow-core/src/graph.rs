use crate::clock::{ClockError, Millis, NEVER, SimClock};
use crate::context::FlowContext;
use crate::dirty::DirtyTracker;
use crate::edge::{EdgeRef, EdgeRole, FlowEdge};
use crate::id::*;
use crate::node::FlowNode;
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::VecDeque;
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by the flow engine and by nodes running inside it.
///
/// Every variant is a broken precondition of the simulation; once one is
/// returned from [`FlowGraph::settle`] the graph should not be driven further.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FlowError {
    #[error("{node} has no {role} edge connected")]
    Unconnected { node: String, role: EdgeRole },
    #[error("{node} does not accept a {role} edge")]
    UnexpectedRole { node: String, role: EdgeRole },
    #[error("power value {0} is negative or not finite")]
    InvalidPower(f64),
    #[error("carbon intensity {0} gCO2/kWh is negative or not finite")]
    InvalidIntensity(f64),
    #[error("node not found: {0:?}")]
    NodeNotFound(NodeId),
    #[error("edge not found: {0:?}")]
    EdgeNotFound(EdgeId),
    #[error("node {0:?} is already executing")]
    NodeBusy(NodeId),
    #[error("node {node:?} is not a {expected}")]
    TypeMismatch { node: NodeId, expected: &'static str },
    #[error("node {node:?} is not the pushing endpoint of edge {edge:?}")]
    WrongEndpoint { edge: EdgeId, node: NodeId },
    #[error("edge {edge:?} carries {actual}, not {claimed}")]
    RoleMismatch {
        edge: EdgeId,
        claimed: EdgeRole,
        actual: EdgeRole,
    },
    #[error("graph did not settle after {activations} activations at t={now} ms")]
    NoConvergence { activations: usize, now: Millis },
    #[error(transparent)]
    Clock(#[from] ClockError),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Engine tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Upper bound on signal deliveries plus node updates in one settling
    /// pass before the engine reports [`FlowError::NoConvergence`].
    pub max_activations: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_activations: 10_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Core data structures
// ---------------------------------------------------------------------------

/// Adjacency lists for a single node.
#[derive(Debug, Clone, Default)]
struct NodeAdjacency {
    /// Edges on which this node is the consumer.
    inputs: Vec<EdgeId>,
    /// Edges on which this node is the supplier.
    outputs: Vec<EdgeId>,
}

/// Arena slot. `node` is `None` while the node is executing.
#[derive(Debug)]
pub(crate) struct NodeSlot {
    node: Option<Box<dyn FlowNode>>,
    name: String,
}

/// A queued edge signal awaiting delivery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Signal {
    /// Delivered to the edge's supplier via `handle_demand`.
    Demand { edge: EdgeId, value: f64 },
    /// Delivered to the edge's consumer via `handle_supply`.
    Supply { edge: EdgeId, value: f64 },
}

/// Node arena, edge table and scheduling state shared with [`FlowContext`].
#[derive(Debug, Default)]
pub(crate) struct NodeStore {
    pub(crate) nodes: SlotMap<NodeId, NodeSlot>,
    pub(crate) edges: SlotMap<EdgeId, FlowEdge>,
    adjacency: SecondaryMap<NodeId, NodeAdjacency>,
    pub(crate) dirty: DirtyTracker,
    pub(crate) outbox: VecDeque<Signal>,
}

impl NodeStore {
    /// Look up an edge and check that the caller's role tag matches the table.
    pub(crate) fn edge_checked(&self, edge: EdgeRef) -> Result<FlowEdge, FlowError> {
        let data = *self
            .edges
            .get(edge.id)
            .ok_or(FlowError::EdgeNotFound(edge.id))?;
        if data.role != edge.role {
            return Err(FlowError::RoleMismatch {
                edge: edge.id,
                claimed: edge.role,
                actual: data.role,
            });
        }
        Ok(data)
    }

    fn take(&mut self, id: NodeId) -> Result<Box<dyn FlowNode>, FlowError> {
        let slot = self.nodes.get_mut(id).ok_or(FlowError::NodeNotFound(id))?;
        slot.node.take().ok_or(FlowError::NodeBusy(id))
    }

    fn restore(&mut self, id: NodeId, node: Box<dyn FlowNode>) {
        if let Some(slot) = self.nodes.get_mut(id) {
            slot.node = Some(node);
        }
    }

    /// Run `f` against a node taken out of its slot, with a context whose
    /// current node is `id`.
    fn with_dyn<R>(
        &mut self,
        now: Millis,
        id: NodeId,
        f: impl FnOnce(&mut dyn FlowNode, &mut FlowContext<'_>) -> R,
    ) -> Result<R, FlowError> {
        let mut node = self.take(id)?;
        let result = {
            let mut ctx = FlowContext::new(now, id, self);
            f(node.as_mut(), &mut ctx)
        };
        self.restore(id, node);
        Ok(result)
    }

    pub(crate) fn with_node<T, R>(
        &mut self,
        now: Millis,
        id: NodeId,
        f: impl FnOnce(&mut T, &mut FlowContext<'_>) -> R,
    ) -> Result<R, FlowError>
    where
        T: FlowNode + 'static,
    {
        let mut node = self.take(id)?;
        let result = match node.as_any_mut().downcast_mut::<T>() {
            Some(typed) => {
                let mut ctx = FlowContext::new(now, id, self);
                Ok(f(typed, &mut ctx))
            }
            None => Err(FlowError::TypeMismatch {
                node: id,
                expected: std::any::type_name::<T>(),
            }),
        };
        self.restore(id, node);
        result
    }

    pub(crate) fn update_node(&mut self, now: Millis, id: NodeId) -> Result<Millis, FlowError> {
        let wake = self.with_dyn(now, id, |node, ctx| {
            trace!(node = node.name(), now, "update");
            node.on_update(now, ctx)
        })??;
        if wake > now {
            self.dirty.schedule_wake(id, wake);
        } else {
            trace!(?id, wake, now, "ignoring wake time that is not in the future");
            self.dirty.schedule_wake(id, NEVER);
        }
        Ok(wake)
    }

    fn deliver(&mut self, now: Millis, signal: Signal) -> Result<(), FlowError> {
        let (edge_id, value) = match signal {
            Signal::Demand { edge, value } | Signal::Supply { edge, value } => (edge, value),
        };
        // The edge may have been released after the signal was queued.
        let Some(edge) = self.edges.get(edge_id).copied() else {
            trace!(?edge_id, "dropping signal for released edge");
            return Ok(());
        };
        let edge_ref = EdgeRef {
            id: edge_id,
            role: edge.role,
        };
        match signal {
            Signal::Demand { .. } => {
                debug!(role = %edge.role, value, "deliver demand");
                self.with_dyn(now, edge.supplier, |node, ctx| {
                    node.handle_demand(edge_ref, value, ctx)
                })?
            }
            Signal::Supply { .. } => {
                debug!(role = %edge.role, value, "deliver supply");
                self.with_dyn(now, edge.consumer, |node, ctx| {
                    node.handle_supply(edge_ref, value, ctx)
                })?
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FlowGraph
// ---------------------------------------------------------------------------

/// The flow graph engine: an arena of nodes addressed by [`NodeId`], an edge
/// table addressed by [`EdgeId`], a virtual clock, and dirty tracking.
///
/// Changes propagate by invalidation: a node whose inputs changed is marked
/// dirty and re-evaluated before the simulation advances. [`settle`] runs
/// until no signal is queued and no node is dirty.
///
/// [`settle`]: FlowGraph::settle
#[derive(Debug)]
pub struct FlowGraph {
    clock: SimClock,
    config: GraphConfig,
    store: NodeStore,
}

impl FlowGraph {
    /// Create an empty graph driven by `clock`.
    pub fn new(clock: SimClock) -> Self {
        Self::with_config(clock, GraphConfig::default())
    }

    /// Create an empty graph with explicit engine configuration.
    pub fn with_config(clock: SimClock, config: GraphConfig) -> Self {
        Self {
            clock,
            config,
            store: NodeStore::default(),
        }
    }

    /// The clock handle to pass to nodes at construction.
    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Current simulated time.
    pub fn now(&self) -> Millis {
        self.clock.now()
    }

    pub fn config(&self) -> GraphConfig {
        self.config
    }

    // -----------------------------------------------------------------------
    // Topology
    // -----------------------------------------------------------------------

    /// Insert a node. It starts dirty so it gets a first update.
    pub fn add_node<N: FlowNode + 'static>(&mut self, node: N) -> NodeId {
        let name = node.name().to_string();
        let id = self.store.nodes.insert(NodeSlot {
            node: Some(Box::new(node)),
            name,
        });
        self.store.adjacency.insert(id, NodeAdjacency::default());
        self.store.dirty.mark_node(id);
        debug!(?id, name = %self.store.nodes[id].name, "node added");
        id
    }

    /// Connect `supplier` to `consumer` with an edge carrying `role`.
    ///
    /// Both endpoints are asked to accept the edge; if either refuses, the
    /// edge is rolled back and the refusal is returned.
    pub fn connect(
        &mut self,
        supplier: NodeId,
        consumer: NodeId,
        role: EdgeRole,
    ) -> Result<EdgeId, FlowError> {
        if !self.store.nodes.contains_key(supplier) {
            return Err(FlowError::NodeNotFound(supplier));
        }
        if !self.store.nodes.contains_key(consumer) {
            return Err(FlowError::NodeNotFound(consumer));
        }

        let id = self.store.edges.insert(FlowEdge {
            supplier,
            consumer,
            role,
        });
        let edge = EdgeRef { id, role };
        let now = self.now();

        let accepted = self
            .store
            .with_dyn(now, supplier, |node, _| node.add_consumer_edge(edge))
            .and_then(|r| r);
        if let Err(err) = accepted {
            self.store.edges.remove(id);
            return Err(err);
        }

        let accepted = self
            .store
            .with_dyn(now, consumer, |node, _| node.add_supplier_edge(edge))
            .and_then(|r| r);
        if let Err(err) = accepted {
            self.store
                .with_dyn(now, supplier, |node, _| node.remove_consumer_edge(edge))?;
            self.store.edges.remove(id);
            return Err(err);
        }

        if let Some(adj) = self.store.adjacency.get_mut(supplier) {
            adj.outputs.push(id);
        }
        if let Some(adj) = self.store.adjacency.get_mut(consumer) {
            adj.inputs.push(id);
        }
        self.store.dirty.mark_node(supplier);
        self.store.dirty.mark_node(consumer);
        debug!(?id, %role, "edge connected");
        Ok(id)
    }

    /// Remove an edge, unwiring it from both endpoints.
    pub fn disconnect(&mut self, edge: EdgeId) -> Result<(), FlowError> {
        let data = self
            .store
            .edges
            .remove(edge)
            .ok_or(FlowError::EdgeNotFound(edge))?;
        let edge_ref = EdgeRef {
            id: edge,
            role: data.role,
        };
        let now = self.now();

        if self.store.nodes.contains_key(data.supplier) {
            self.store
                .with_dyn(now, data.supplier, |node, _| node.remove_consumer_edge(edge_ref))?;
            self.store.dirty.mark_node(data.supplier);
        }
        if self.store.nodes.contains_key(data.consumer) {
            self.store
                .with_dyn(now, data.consumer, |node, _| node.remove_supplier_edge(edge_ref))?;
            self.store.dirty.mark_node(data.consumer);
        }
        if let Some(adj) = self.store.adjacency.get_mut(data.supplier) {
            adj.outputs.retain(|&e| e != edge);
        }
        if let Some(adj) = self.store.adjacency.get_mut(data.consumer) {
            adj.inputs.retain(|&e| e != edge);
        }
        debug!(?edge, role = %data.role, "edge disconnected");
        Ok(())
    }

    /// Close a node and remove it, releasing every edge it takes part in.
    pub fn remove_node(&mut self, node: NodeId) -> Result<(), FlowError> {
        let now = self.now();
        self.store.with_dyn(now, node, |n, _| n.close(now))?;

        let edges: Vec<EdgeId> = self
            .store
            .adjacency
            .get(node)
            .map(|adj| adj.inputs.iter().chain(adj.outputs.iter()).copied().collect())
            .unwrap_or_default();
        for edge in edges {
            self.disconnect(edge)?;
        }

        self.store.adjacency.remove(node);
        self.store.dirty.forget(node);
        if let Some(slot) = self.store.nodes.remove(node) {
            debug!(?node, name = %slot.name, "node removed");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Node access
    // -----------------------------------------------------------------------

    /// Typed read access to a node.
    pub fn node<T: FlowNode + 'static>(&self, id: NodeId) -> Option<&T> {
        self.store
            .nodes
            .get(id)?
            .node
            .as_ref()?
            .as_any()
            .downcast_ref::<T>()
    }

    /// Typed mutable access to a node without a context. Changes made here do
    /// not invalidate anything; call [`invalidate`](Self::invalidate) if the
    /// node must be re-evaluated.
    pub fn node_mut<T: FlowNode + 'static>(&mut self, id: NodeId) -> Option<&mut T> {
        self.store
            .nodes
            .get_mut(id)?
            .node
            .as_mut()?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    /// Run `f` with typed access to a node and a context at the current
    /// time, so the node can push signals. Call [`settle`](Self::settle)
    /// afterwards to propagate them.
    pub fn with_node<T, R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut T, &mut FlowContext<'_>) -> R,
    ) -> Result<R, FlowError>
    where
        T: FlowNode + 'static,
    {
        let now = self.now();
        self.store.with_node(now, id, f)
    }

    /// Mark a node dirty.
    pub fn invalidate(&mut self, id: NodeId) -> Result<(), FlowError> {
        if !self.store.nodes.contains_key(id) {
            return Err(FlowError::NodeNotFound(id));
        }
        self.store.dirty.mark_node(id);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn edge(&self, edge: EdgeId) -> Option<&FlowEdge> {
        self.store.edges.get(edge)
    }

    /// Edges on which `node` is the consumer.
    pub fn inputs(&self, node: NodeId) -> &[EdgeId] {
        self.store
            .adjacency
            .get(node)
            .map(|adj| adj.inputs.as_slice())
            .unwrap_or(&[])
    }

    /// Edges on which `node` is the supplier.
    pub fn outputs(&self, node: NodeId) -> &[EdgeId] {
        self.store
            .adjacency
            .get(node)
            .map(|adj| adj.outputs.as_slice())
            .unwrap_or(&[])
    }

    pub fn node_name(&self, node: NodeId) -> Option<&str> {
        self.store.nodes.get(node).map(|slot| slot.name.as_str())
    }

    pub fn node_count(&self) -> usize {
        self.store.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.store.edges.len()
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.store.nodes.contains_key(node)
    }

    /// Returns true if a node is dirty or a signal is waiting for delivery.
    pub fn is_dirty(&self) -> bool {
        self.store.dirty.is_dirty() || !self.store.outbox.is_empty()
    }

    /// The earliest wake time any node has requested.
    pub fn next_wake(&self) -> Option<Millis> {
        self.store.dirty.next_wake()
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// Deliver queued signals and update dirty nodes at the current time
    /// until nothing is left to do. Returns the number of activations.
    pub fn settle(&mut self) -> Result<usize, FlowError> {
        let now = self.now();
        let mut activations = 0;

        loop {
            if let Some(signal) = self.store.outbox.pop_front() {
                self.store.deliver(now, signal)?;
            } else if let Some(node) = self.store.dirty.pop_node() {
                if !self.store.nodes.contains_key(node) {
                    continue;
                }
                self.store.update_node(now, node)?;
            } else {
                break;
            }

            activations += 1;
            if activations > self.config.max_activations {
                return Err(FlowError::NoConvergence { activations, now });
            }
        }

        trace!(now, activations, "settled");
        Ok(activations)
    }

    /// Settle, then move the clock to `t`, stopping at every wake time that
    /// falls due on the way.
    pub fn advance_to(&mut self, t: Millis) -> Result<(), FlowError> {
        if t < self.now() {
            return Err(ClockError::Regression {
                now: self.now(),
                requested: t,
            }
            .into());
        }
        self.settle()?;

        while let Some(wake) = self.store.dirty.next_wake() {
            if wake > t {
                break;
            }
            self.clock.advance_to(wake.max(self.now()))?;
            self.store.dirty.fire_due(self.now());
            self.settle()?;
        }

        self.clock.advance_to(t)?;
        self.store.dirty.fire_due(t);
        self.settle()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn add_node_starts_dirty() {
        let mut graph = FlowGraph::new(SimClock::new(0));
        let id = graph.add_node(ProbeSupplier::new());

        assert_eq!(graph.node_count(), 1);
        assert!(graph.is_dirty());
        assert_eq!(graph.node_name(id), Some("probe-supplier"));
    }

    #[test]
    fn connect_wires_both_endpoints() {
        let (graph, supplier, consumer, edge) = probe_pair(0.0);

        let s = graph.node::<ProbeSupplier>(supplier).unwrap();
        let c = graph.node::<ProbeConsumer>(consumer).unwrap();
        assert_eq!(s.consumer_edge.map(|e| e.id), Some(edge));
        assert_eq!(c.supplier_edge.map(|e| e.id), Some(edge));
        assert_eq!(graph.outputs(supplier), &[edge]);
        assert_eq!(graph.inputs(consumer), &[edge]);
        assert_eq!(graph.edge(edge).unwrap().role, EdgeRole::ToSource);
    }

    #[test]
    fn demand_round_trips_as_supply() {
        let (mut graph, supplier, consumer, _) = probe_pair(120.0);

        graph.settle().unwrap();

        assert_eq!(graph.node::<ProbeSupplier>(supplier).unwrap().demand, 120.0);
        assert_eq!(graph.node::<ProbeConsumer>(consumer).unwrap().received, 120.0);
        assert!(!graph.is_dirty());
    }

    #[test]
    fn supplier_limit_caps_supply() {
        let (mut graph, supplier, consumer, _) = probe_pair(120.0);
        graph.node_mut::<ProbeSupplier>(supplier).unwrap().limit = Some(80.0);

        graph.settle().unwrap();

        assert_eq!(graph.node::<ProbeConsumer>(consumer).unwrap().received, 80.0);
    }

    #[test]
    fn settle_twice_is_quiet() {
        let (mut graph, _, consumer, _) = probe_pair(10.0);
        graph.settle().unwrap();
        let events = graph.node::<ProbeConsumer>(consumer).unwrap().supply_events;

        assert_eq!(graph.settle().unwrap(), 0);
        assert_eq!(
            graph.node::<ProbeConsumer>(consumer).unwrap().supply_events,
            events
        );
    }

    #[test]
    fn rejected_edge_is_rolled_back() {
        let mut graph = FlowGraph::new(SimClock::new(0));
        let a = graph.add_node(ProbeConsumer::new(0.0));
        let b = graph.add_node(ProbeConsumer::new(0.0));

        // A consumer probe cannot act as a supplier.
        let err = graph.connect(a, b, EdgeRole::ToSource).unwrap_err();

        assert!(matches!(err, FlowError::UnexpectedRole { .. }));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn disconnect_unwires_endpoints() {
        let (mut graph, supplier, consumer, edge) = probe_pair(0.0);

        graph.disconnect(edge).unwrap();

        assert!(graph.node::<ProbeSupplier>(supplier).unwrap().consumer_edge.is_none());
        assert!(graph.node::<ProbeConsumer>(consumer).unwrap().supplier_edge.is_none());
        assert!(graph.outputs(supplier).is_empty());
        assert_eq!(graph.disconnect(edge), Err(FlowError::EdgeNotFound(edge)));
    }

    #[test]
    fn remove_node_closes_and_releases_edges() {
        let (mut graph, supplier, consumer, _) = probe_pair(0.0);

        graph.remove_node(supplier).unwrap();

        assert!(!graph.contains_node(supplier));
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.node::<ProbeConsumer>(consumer).unwrap().supplier_edge.is_none());
    }

    #[test]
    fn unconnected_consumer_fails_fast() {
        let mut graph = FlowGraph::new(SimClock::new(0));
        graph.add_node(ProbeConsumer::new(5.0));

        let err = graph.settle().unwrap_err();

        assert!(matches!(err, FlowError::Unconnected { .. }));
    }

    #[test]
    fn push_from_wrong_endpoint_is_rejected() {
        let (mut graph, _, consumer, edge) = probe_pair(0.0);
        let edge_ref = EdgeRef {
            id: edge,
            role: EdgeRole::ToSource,
        };

        let result = graph
            .with_node::<ProbeConsumer, _>(consumer, |_, ctx| ctx.push_supply(edge_ref, 1.0))
            .unwrap();

        assert!(matches!(result, Err(FlowError::WrongEndpoint { .. })));
    }

    #[test]
    fn push_with_wrong_role_tag_is_rejected() {
        let (mut graph, _, consumer, edge) = probe_pair(0.0);
        let edge_ref = EdgeRef {
            id: edge,
            role: EdgeRole::ToBattery,
        };

        let result = graph
            .with_node::<ProbeConsumer, _>(consumer, |_, ctx| ctx.push_demand(edge_ref, 1.0))
            .unwrap();

        assert!(matches!(result, Err(FlowError::RoleMismatch { .. })));
    }

    #[test]
    fn invalid_power_is_rejected_at_push() {
        let (mut graph, _, consumer, edge) = probe_pair(0.0);
        let edge_ref = EdgeRef {
            id: edge,
            role: EdgeRole::ToSource,
        };

        let result = graph
            .with_node::<ProbeConsumer, _>(consumer, |_, ctx| ctx.push_demand(edge_ref, f64::NAN))
            .unwrap();

        assert!(matches!(result, Err(FlowError::InvalidPower(_))));
    }

    #[test]
    fn reentering_a_running_node_is_busy() {
        let (mut graph, _, consumer, _) = probe_pair(0.0);

        let result = graph
            .with_node::<ProbeConsumer, _>(consumer, |_, ctx| {
                let me = ctx.current();
                ctx.with_node::<ProbeConsumer, _>(me, |_, _| ())
            })
            .unwrap();

        assert_eq!(result, Err(FlowError::NodeBusy(consumer)));
    }

    #[test]
    fn wrong_type_is_reported() {
        let (mut graph, supplier, _, _) = probe_pair(0.0);

        let err = graph
            .with_node::<ProbeConsumer, _>(supplier, |_, _| ())
            .unwrap_err();

        assert!(matches!(err, FlowError::TypeMismatch { .. }));
        // The node is back in its slot after the failed downcast.
        assert!(graph.node::<ProbeSupplier>(supplier).is_some());
    }

    #[test]
    fn wake_timers_stop_the_clock() {
        let (mut graph, supplier, _, _) = probe_pair(1.0);
        graph.node_mut::<ProbeSupplier>(supplier).unwrap().period = Some(250);
        graph.settle().unwrap();
        let before = graph.node::<ProbeSupplier>(supplier).unwrap().updates;

        graph.advance_to(1_000).unwrap();

        // Woken at 250, 500, 750 and 1000.
        let after = graph.node::<ProbeSupplier>(supplier).unwrap().updates;
        assert_eq!(after - before, 4);
        assert_eq!(graph.now(), 1_000);
        assert_eq!(graph.next_wake(), Some(1_250));
    }

    #[test]
    fn restless_node_does_not_converge() {
        let clock = SimClock::new(0);
        let mut graph = FlowGraph::with_config(clock, GraphConfig { max_activations: 50 });
        let id = graph.add_node(ProbeSupplier::new());
        graph.node_mut::<ProbeSupplier>(id).unwrap().restless = true;

        let err = graph.settle().unwrap_err();

        assert!(matches!(err, FlowError::NoConvergence { activations: 51, now: 0 }));
    }

    #[test]
    fn advancing_backwards_is_an_error() {
        let mut graph = FlowGraph::new(SimClock::new(500));

        let err = graph.advance_to(100).unwrap_err();

        assert!(matches!(err, FlowError::Clock(ClockError::Regression { .. })));
    }

    #[test]
    fn signals_for_released_edges_are_dropped() {
        let (mut graph, supplier, consumer, edge) = probe_pair(0.0);
        graph.settle().unwrap();
        // Queue a demand by hand, then release the edge before delivery.
        graph
            .with_node::<ProbeConsumer, _>(consumer, |c, ctx| {
                c.demand = 7.0;
                c.on_update(ctx.now(), ctx)
            })
            .unwrap()
            .unwrap();
        graph.remove_node(consumer).unwrap();

        graph.settle().unwrap();

        assert_eq!(graph.node::<ProbeSupplier>(supplier).unwrap().demand, 0.0);
        assert!(graph.edge(edge).is_none());
    }

    #[test]
    fn settled_pair_has_no_timers() {
        let (mut graph, _, _, _) = probe_pair(1.0);
        graph.settle().unwrap();

        assert_eq!(graph.next_wake(), None);
    }
}
