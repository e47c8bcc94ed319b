//! Namespace tree
//!
//! One node per address, created lazily. Each node keeps an ordered set of
//! subscribers and the arguments of the last message sent to it. A message
//! sent to `/a/b` is delivered to subscribers of `/`, `/a` and `/a/b`, in
//! that order.
//!
//! The tree is owned by the router task and never shared, so it needs no
//! locking.

use rhizome_core::{Address, Arg};
use std::collections::{HashMap, HashSet};

use crate::connection::ConnectionId;

/// Index of a node in the tree
pub type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug, Default)]
struct Node {
    children: HashMap<String, NodeId>,
    /// Insertion ordered, no duplicates
    subscribers: Vec<ConnectionId>,
    last_message: Option<Vec<Arg>>,
}

/// Tree of subscriptions and retained messages
#[derive(Debug)]
pub struct NamespaceTree {
    nodes: Vec<Node>,
    /// Nodes each connection is subscribed at
    by_connection: HashMap<ConnectionId, HashSet<NodeId>>,
}

impl NamespaceTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
            by_connection: HashMap::new(),
        }
    }

    /// Node for `address`, creating it and its ancestors as needed
    pub fn resolve(&mut self, address: &Address) -> NodeId {
        let mut current = ROOT;
        for segment in address.segments() {
            current = match self.nodes[current].children.get(segment) {
                Some(&child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[current].children.insert(segment.clone(), child);
                    child
                }
            };
        }
        current
    }

    /// Node for `address` if it exists, without creating anything
    pub fn lookup(&self, address: &Address) -> Option<NodeId> {
        let path = self.walk(address);
        if path.len() == address.segments().len() + 1 {
            path.last().copied()
        } else {
            None
        }
    }

    /// Subscribe `id` at `address`. Returns false if it already was.
    pub fn subscribe(&mut self, address: &Address, id: &str) -> bool {
        let node = self.resolve(address);
        let subscribers = &mut self.nodes[node].subscribers;
        if subscribers.iter().any(|s| s == id) {
            return false;
        }
        subscribers.push(id.to_string());
        self.by_connection
            .entry(id.to_string())
            .or_default()
            .insert(node);
        true
    }

    /// Remove `id` from every node it is subscribed at, returns how many
    pub fn unsubscribe_all(&mut self, id: &str) -> usize {
        let Some(nodes) = self.by_connection.remove(id) else {
            return 0;
        };
        for &node in &nodes {
            self.nodes[node].subscribers.retain(|s| s != id);
        }
        nodes.len()
    }

    /// Subscribers on the path from the root to `address`, root first.
    ///
    /// Missing nodes contribute nothing; the tree is not modified.
    pub fn delivery_set(&self, address: &Address) -> Vec<ConnectionId> {
        let mut set = Vec::new();
        for node in self.walk(address) {
            set.extend(self.nodes[node].subscribers.iter().cloned());
        }
        set
    }

    /// Number of nodes `id` is subscribed at
    pub fn subscription_count(&self, id: &str) -> usize {
        self.by_connection.get(id).map_or(0, HashSet::len)
    }

    /// Store `args` as the last message of `address`
    pub fn retain(&mut self, address: &Address, args: Vec<Arg>) {
        let node = self.resolve(address);
        self.nodes[node].last_message = Some(args);
    }

    /// Last message sent to `address`, empty if there is none
    pub fn retained(&self, address: &Address) -> Vec<Arg> {
        self.lookup(address)
            .and_then(|node| self.nodes[node].last_message.clone())
            .unwrap_or_default()
    }

    /// Subscribers registered exactly at `address`
    pub fn subscribers(&self, address: &Address) -> Vec<ConnectionId> {
        self.lookup(address)
            .map(|node| self.nodes[node].subscribers.clone())
            .unwrap_or_default()
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Existing nodes from the root towards `address`. Stops at the first
    /// missing segment, so the last entry is the node itself only if the
    /// whole path exists.
    fn walk(&self, address: &Address) -> Vec<NodeId> {
        let mut path = Vec::with_capacity(address.segments().len() + 1);
        let mut current = ROOT;
        path.push(current);
        for segment in address.segments() {
            match self.nodes[current].children.get(segment) {
                Some(&child) => {
                    current = child;
                    path.push(current);
                }
                None => break,
            }
        }
        path
    }
}

impl Default for NamespaceTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut tree = NamespaceTree::new();
        let a = tree.resolve(&addr("/bla/bli"));
        let b = tree.resolve(&addr("/bla/bli/"));
        assert_eq!(a, b);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_lookup_does_not_create() {
        let tree = NamespaceTree::new();
        assert!(tree.lookup(&addr("/bla")).is_none());
        assert_eq!(tree.lookup(&addr("/")), Some(ROOT));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_partial_path_lookup() {
        let mut tree = NamespaceTree::new();
        tree.resolve(&addr("/bla"));
        assert!(tree.lookup(&addr("/bla/bli")).is_none());
    }
}
