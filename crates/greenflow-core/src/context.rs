//! Execution context handed to a node while the engine runs it.
//!
//! The context is the only way a node talks to the rest of the graph: it
//! pushes demand and supply along its own edges, invalidates itself or other
//! nodes, and reaches other nodes by handle. Signals are queued and delivered
//! by the engine after the running node returns.

use tracing::trace;

use crate::clock::Millis;
use crate::edge::{EdgeRef, checked_power};
use crate::graph::{FlowError, NodeStore, Signal};
use crate::id::NodeId;
use crate::node::FlowNode;

pub struct FlowContext<'a> {
    now: Millis,
    current: NodeId,
    store: &'a mut NodeStore,
}

impl<'a> FlowContext<'a> {
    pub(crate) fn new(now: Millis, current: NodeId, store: &'a mut NodeStore) -> Self {
        Self {
            now,
            current,
            store,
        }
    }

    /// Simulated time of the current activation.
    pub fn now(&self) -> Millis {
        self.now
    }

    /// Handle of the node currently executing.
    pub fn current(&self) -> NodeId {
        self.current
    }

    /// Mark the running node dirty so it is re-evaluated in this settling pass.
    pub fn invalidate(&mut self) {
        self.store.dirty.mark_node(self.current);
    }

    /// Mark another node dirty.
    pub fn invalidate_node(&mut self, node: NodeId) -> Result<(), FlowError> {
        if !self.store.nodes.contains_key(node) {
            return Err(FlowError::NodeNotFound(node));
        }
        self.store.dirty.mark_node(node);
        Ok(())
    }

    /// Ask the supplier at the far end of `edge` for `demand` watts.
    ///
    /// The running node must be the edge's consumer.
    pub fn push_demand(&mut self, edge: EdgeRef, demand: f64) -> Result<(), FlowError> {
        let demand = checked_power(demand)?;
        let data = self.store.edge_checked(edge)?;
        if data.consumer != self.current {
            return Err(FlowError::WrongEndpoint {
                edge: edge.id,
                node: self.current,
            });
        }
        trace!(role = %edge.role, demand, "push demand");
        self.store.outbox.push_back(Signal::Demand {
            edge: edge.id,
            value: demand,
        });
        Ok(())
    }

    /// Tell the consumer at the far end of `edge` that `supply` watts will be
    /// delivered.
    ///
    /// The running node must be the edge's supplier.
    pub fn push_supply(&mut self, edge: EdgeRef, supply: f64) -> Result<(), FlowError> {
        let supply = checked_power(supply)?;
        let data = self.store.edge_checked(edge)?;
        if data.supplier != self.current {
            return Err(FlowError::WrongEndpoint {
                edge: edge.id,
                node: self.current,
            });
        }
        trace!(role = %edge.role, supply, "push supply");
        self.store.outbox.push_back(Signal::Supply {
            edge: edge.id,
            value: supply,
        });
        Ok(())
    }

    /// Run `f` with typed mutable access to another node.
    ///
    /// The nested context reports `node` as its current node, so signals and
    /// invalidations issued inside `f` are attributed to it.
    pub fn with_node<T, R>(
        &mut self,
        node: NodeId,
        f: impl FnOnce(&mut T, &mut FlowContext<'_>) -> R,
    ) -> Result<R, FlowError>
    where
        T: FlowNode + 'static,
    {
        self.store.with_node(self.now, node, f)
    }

    /// Drive another node's `on_update` at the current time and register the
    /// wake time it returns.
    pub fn update_node(&mut self, node: NodeId) -> Result<Millis, FlowError> {
        self.store.update_node(self.now, node)
    }
}
