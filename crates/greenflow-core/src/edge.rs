//! Edge records and role tags.
//!
//! Every edge connects exactly one supplier to one consumer and carries an
//! [`EdgeRole`] naming which path of the power chain it is. Nodes resolve an
//! incoming signal by matching on the role, never by comparing handles.

use serde::{Deserialize, Serialize};

use crate::graph::FlowError;
use crate::id::{EdgeId, NodeId};

/// Which path of the power chain an edge carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeRole {
    /// Adapter (supplier) to the upstream multiplexer (consumer).
    ToMultiplexer,
    /// Grid source (supplier) to the adapter (consumer), load path.
    ToSource,
    /// Battery (supplier) to the adapter (consumer), depletion path.
    ToBattery,
    /// Grid source (supplier) to the battery (consumer), charging path.
    Charging,
}

impl std::fmt::Display for EdgeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EdgeRole::ToMultiplexer => "to-multiplexer",
            EdgeRole::ToSource => "to-source",
            EdgeRole::ToBattery => "to-battery",
            EdgeRole::Charging => "charging",
        };
        f.write_str(name)
    }
}

/// Per-edge data stored in the flow graph's edge table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEdge {
    /// The node that delivers power along this edge.
    pub supplier: NodeId,
    /// The node that requests power along this edge.
    pub consumer: NodeId,
    pub role: EdgeRole,
}

/// The handle a node keeps for one of its edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeRef {
    pub id: EdgeId,
    pub role: EdgeRole,
}

/// Resolve an optional edge slot, failing if the node was never wired.
pub fn require_edge(
    edge: Option<EdgeRef>,
    node: &str,
    role: EdgeRole,
) -> Result<EdgeRef, FlowError> {
    edge.ok_or_else(|| FlowError::Unconnected {
        node: node.to_string(),
        role,
    })
}

/// Reject power values that would corrupt cumulative totals.
pub fn checked_power(value: f64) -> Result<f64, FlowError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(FlowError::InvalidPower(value))
    }
}
