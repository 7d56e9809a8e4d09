use crate::clock::{Millis, NEVER};
use crate::id::NodeId;
use slotmap::SecondaryMap;
use std::collections::BTreeSet;

/// Tracks which nodes must be re-evaluated and when sleeping nodes asked to
/// be woken.
///
/// A node becomes dirty when it is invalidated (a signal changed its inputs)
/// or when its wake timer falls due. The engine drains dirty nodes in key
/// order, which keeps a settling pass deterministic.
#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    dirty_nodes: BTreeSet<NodeId>,
    timers: BTreeSet<(Millis, NodeId)>,
    wake_at: SecondaryMap<NodeId, Millis>,
}

impl DirtyTracker {
    /// Create a new tracker with nothing dirty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a single node as dirty.
    pub fn mark_node(&mut self, node: NodeId) {
        self.dirty_nodes.insert(node);
    }

    /// Take the next dirty node, if any.
    pub fn pop_node(&mut self) -> Option<NodeId> {
        self.dirty_nodes.pop_first()
    }

    /// Returns `true` if any node is waiting to be re-evaluated.
    pub fn is_dirty(&self) -> bool {
        !self.dirty_nodes.is_empty()
    }

    /// Returns `true` if the given node has been marked dirty.
    pub fn is_node_dirty(&self, node: NodeId) -> bool {
        self.dirty_nodes.contains(&node)
    }

    /// Replace the node's wake timer. [`NEVER`] cancels it.
    pub fn schedule_wake(&mut self, node: NodeId, at: Millis) {
        if let Some(previous) = self.wake_at.remove(node) {
            self.timers.remove(&(previous, node));
        }
        if at != NEVER {
            self.timers.insert((at, node));
            self.wake_at.insert(node, at);
        }
    }

    /// The wake time currently registered for `node`.
    pub fn wake_time(&self, node: NodeId) -> Option<Millis> {
        self.wake_at.get(node).copied()
    }

    /// The earliest pending wake time across all nodes.
    pub fn next_wake(&self) -> Option<Millis> {
        self.timers.first().map(|(at, _)| *at)
    }

    /// Move every node whose timer is due at or before `now` into the dirty
    /// set. Returns how many timers fired.
    pub fn fire_due(&mut self, now: Millis) -> usize {
        let mut fired = 0;
        while let Some(&(at, node)) = self.timers.first() {
            if at > now {
                break;
            }
            self.timers.pop_first();
            self.wake_at.remove(node);
            self.dirty_nodes.insert(node);
            fired += 1;
        }
        fired
    }

    /// Drop all state for a removed node.
    pub fn forget(&mut self, node: NodeId) {
        self.dirty_nodes.remove(&node);
        if let Some(at) = self.wake_at.remove(node) {
            self.timers.remove(&(at, node));
        }
    }
}
