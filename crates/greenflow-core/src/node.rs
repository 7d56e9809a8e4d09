//! The node trait every participant of the flow graph implements.
//!
//! A node is driven by the engine through [`FlowNode::on_update`] when it is
//! dirty or a wake timer it requested is due, and receives edge signals
//! through [`FlowNode::handle_demand`] (supplier side) and
//! [`FlowNode::handle_supply`] (consumer side). All calls receive a
//! [`FlowContext`] for pushing signals and invalidating nodes.
//!
//! The edge handlers default to rejecting the call, so a node only overrides
//! the halves of the protocol it actually takes part in.

use crate::clock::Millis;
use crate::context::FlowContext;
use crate::edge::EdgeRef;
use crate::graph::FlowError;

pub trait FlowNode: std::fmt::Debug {
    /// Human-readable name used in logs and errors.
    fn name(&self) -> &str;

    /// Re-evaluate the node at simulated time `now`.
    ///
    /// Returns the next time the node wants to be woken without an
    /// invalidation, or [`NEVER`](crate::clock::NEVER).
    fn on_update(&mut self, now: Millis, ctx: &mut FlowContext<'_>) -> Result<Millis, FlowError>;

    /// A consumer on `edge` asks this node for `demand` watts.
    fn handle_demand(
        &mut self,
        edge: EdgeRef,
        demand: f64,
        ctx: &mut FlowContext<'_>,
    ) -> Result<(), FlowError> {
        let _ = (demand, ctx);
        Err(FlowError::UnexpectedRole {
            node: self.name().to_string(),
            role: edge.role,
        })
    }

    /// The supplier on `edge` commits to delivering `supply` watts.
    fn handle_supply(
        &mut self,
        edge: EdgeRef,
        supply: f64,
        ctx: &mut FlowContext<'_>,
    ) -> Result<(), FlowError> {
        let _ = (supply, ctx);
        Err(FlowError::UnexpectedRole {
            node: self.name().to_string(),
            role: edge.role,
        })
    }

    /// Wire an edge on which this node is the supplier.
    fn add_consumer_edge(&mut self, edge: EdgeRef) -> Result<(), FlowError> {
        Err(FlowError::UnexpectedRole {
            node: self.name().to_string(),
            role: edge.role,
        })
    }

    /// Unwire an edge on which this node is the supplier.
    fn remove_consumer_edge(&mut self, edge: EdgeRef) {
        let _ = edge;
    }

    /// Wire an edge on which this node is the consumer.
    fn add_supplier_edge(&mut self, edge: EdgeRef) -> Result<(), FlowError> {
        Err(FlowError::UnexpectedRole {
            node: self.name().to_string(),
            role: edge.role,
        })
    }

    /// Unwire an edge on which this node is the consumer.
    fn remove_supplier_edge(&mut self, edge: EdgeRef) {
        let _ = edge;
    }

    /// Called once when the node is removed from the graph, before its edges
    /// are released.
    fn close(&mut self, now: Millis) {
        let _ = now;
    }

    /// Downcast to `&dyn Any` for typed access to concrete node types.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Downcast to `&mut dyn Any` for typed mutable access.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}
