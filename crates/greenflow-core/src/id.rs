use slotmap::new_key_type;

new_key_type! {
    /// Identifies a node (power source, battery, adapter, multiplexer) in the flow graph.
    pub struct NodeId;

    /// Identifies an edge (one supplier to one consumer) in the flow graph.
    pub struct EdgeId;
}
