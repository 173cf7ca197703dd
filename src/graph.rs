//! Dependency graph module.
//!
//! Provides the `RuleGraph` type, which represents attribute dependencies
//! as a directed graph. Used by the resolver to determine the order in
//! which targets are evaluated.

use crate::attr_id::AttrId;
use crate::error::RuleError;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// The kind of a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// The dependent reads the dependency's final value.
    Data,
    /// The dependent reads itself while it is being computed. Trigger
    /// edges order nothing and never form cycles.
    Trigger,
}

/// A directed graph of attribute dependencies.
///
/// Nodes are `AttrId`s, edges run from a dependency to its dependent. If
/// attribute A depends on B, then B is evaluated before A.
///
/// Each node carries a rank (its first declaration sequence number); the
/// topological order breaks ties by rank, so independent targets keep
/// their declaration order.
///
/// # Examples
///
/// ```rust
/// use sheetrule::graph::{EdgeKind, RuleGraph};
/// use sheetrule::AttrId;
///
/// let mut graph = RuleGraph::new();
/// let level = AttrId::from_str("level");
/// let hit_points = AttrId::from_str("hitPoints");
///
/// // hitPoints depends on level
/// graph.add_edge(hit_points.clone(), level.clone(), EdgeKind::Data);
///
/// let order = graph.topological_sort().unwrap();
/// assert_eq!(order, vec![level, hit_points]);
/// ```
#[derive(Debug, Default)]
pub struct RuleGraph {
    graph: DiGraph<AttrId, EdgeKind>,
    node_map: HashMap<AttrId, NodeIndex>,
    rank: HashMap<NodeIndex, u64>,
}

impl RuleGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the graph if it doesn't exist, returning its index.
    pub fn add_node(&mut self, id: AttrId) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(&id) {
            idx
        } else {
            let idx = self.graph.add_node(id.clone());
            self.node_map.insert(id, idx);
            idx
        }
    }

    /// Record a declaration rank for `id`; the lowest rank wins.
    pub fn set_rank(&mut self, id: AttrId, rank: u64) {
        let idx = self.add_node(id);
        let entry = self.rank.entry(idx).or_insert(rank);
        *entry = (*entry).min(rank);
    }

    /// Add an edge representing a dependency.
    ///
    /// `from` depends on `to`. An edge from a node to itself is always
    /// recorded as a trigger edge.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sheetrule::graph::{EdgeKind, RuleGraph};
    /// use sheetrule::AttrId;
    ///
    /// let mut graph = RuleGraph::new();
    /// let hp = AttrId::from_str("hitPoints");
    ///
    /// graph.add_edge(hp.clone(), hp.clone(), EdgeKind::Data);
    /// assert_eq!(graph.edge_count(EdgeKind::Trigger), 1);
    /// assert!(graph.detect_cycles().is_ok());
    /// ```
    pub fn add_edge(&mut self, from: AttrId, to: AttrId, kind: EdgeKind) {
        let kind = if from == to { EdgeKind::Trigger } else { kind };
        let from_idx = self.add_node(from);
        let to_idx = self.add_node(to);
        let exists = self
            .graph
            .edges_connecting(to_idx, from_idx)
            .any(|e| *e.weight() == kind);
        if !exists {
            self.graph.add_edge(to_idx, from_idx, kind);
        }
    }

    /// Number of edges of one kind.
    pub fn edge_count(&self, kind: EdgeKind) -> usize {
        self.graph
            .edge_references()
            .filter(|e| *e.weight() == kind)
            .count()
    }

    /// Detect cycles over data edges.
    ///
    /// Uses depth-first search with a recursion stack. Nodes are visited in
    /// rank order so the reported cycle is deterministic.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if no cycles are detected
    /// * `Err(RuleError::Cycle)` with the closed cycle path if one is found
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sheetrule::graph::{EdgeKind, RuleGraph};
    /// use sheetrule::AttrId;
    ///
    /// let mut graph = RuleGraph::new();
    /// let a = AttrId::from_str("A");
    /// let b = AttrId::from_str("B");
    ///
    /// graph.add_edge(b.clone(), a.clone(), EdgeKind::Data);
    /// assert!(graph.detect_cycles().is_ok());
    ///
    /// // A -> B -> A
    /// graph.add_edge(a.clone(), b.clone(), EdgeKind::Data);
    /// assert!(graph.detect_cycles().is_err());
    /// ```
    pub fn detect_cycles(&self) -> Result<(), RuleError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        for node_idx in self.ranked_nodes() {
            if !visited.contains(&node_idx) {
                let mut cycle_path = Vec::new();
                if let Some(cycle) =
                    self.dfs_cycle_detect(node_idx, &mut visited, &mut rec_stack, &mut cycle_path)
                {
                    return Err(cycle);
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle_detect(
        &self,
        node: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        rec_stack: &mut HashSet<NodeIndex>,
        cycle_path: &mut Vec<AttrId>,
    ) -> Option<RuleError> {
        visited.insert(node);
        rec_stack.insert(node);
        cycle_path.push(self.graph[node].clone());

        for neighbor in self.data_neighbors(node, Direction::Outgoing) {
            if !visited.contains(&neighbor) {
                if let Some(cycle) = self.dfs_cycle_detect(neighbor, visited, rec_stack, cycle_path)
                {
                    return Some(cycle);
                }
            } else if rec_stack.contains(&neighbor) {
                let neighbor_attr = self.graph[neighbor].clone();
                let start = cycle_path
                    .iter()
                    .position(|attr| attr == &neighbor_attr)
                    .unwrap_or(0);
                let mut cycle: Vec<AttrId> = cycle_path[start..].to_vec();
                cycle.push(neighbor_attr);
                return Some(RuleError::Cycle { path: cycle });
            }
        }

        rec_stack.remove(&node);
        cycle_path.pop();
        None
    }

    /// Get a topological order of all nodes.
    ///
    /// Kahn's algorithm over data edges; among nodes whose dependencies are
    /// all placed, the lowest rank goes first. Unranked nodes sort last.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<AttrId>)` - The evaluation order (dependencies first)
    /// * `Err(RuleError::Cycle)` - If a cycle is detected
    pub fn topological_sort(&self) -> Result<Vec<AttrId>, RuleError> {
        self.detect_cycles()?;

        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| (idx, self.data_neighbors(idx, Direction::Incoming).len()))
            .collect();

        let mut ready: BinaryHeap<Reverse<(u64, usize)>> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&idx, _)| Reverse((self.rank_of(idx), idx.index())))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse((_, raw))) = ready.pop() {
            let idx = NodeIndex::new(raw);
            order.push(self.graph[idx].clone());
            for dependent in self.data_neighbors(idx, Direction::Outgoing) {
                if let Some(degree) = in_degree.get_mut(&dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse((self.rank_of(dependent), dependent.index())));
                    }
                }
            }
        }

        if order.len() != self.graph.node_count() {
            let stuck = self
                .graph
                .node_indices()
                .find(|idx| in_degree.get(idx).copied().unwrap_or(0) > 0)
                .map(|idx| vec![self.graph[idx].clone()])
                .unwrap_or_default();
            return Err(RuleError::Cycle { path: stuck });
        }

        Ok(order)
    }

    /// Direct data dependencies of `id`.
    pub fn dependencies_of(&self, id: &AttrId) -> Vec<AttrId> {
        self.node_map
            .get(id)
            .map(|&idx| {
                self.data_neighbors(idx, Direction::Incoming)
                    .into_iter()
                    .map(|dep| self.graph[dep].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get all nodes in the graph.
    pub fn nodes(&self) -> Vec<AttrId> {
        self.graph
            .node_indices()
            .map(|idx| self.graph[idx].clone())
            .collect()
    }

    /// Check if a node exists in the graph.
    pub fn contains_node(&self, id: &AttrId) -> bool {
        self.node_map.contains_key(id)
    }

    fn rank_of(&self, idx: NodeIndex) -> u64 {
        self.rank.get(&idx).copied().unwrap_or(u64::MAX)
    }

    fn ranked_nodes(&self) -> Vec<NodeIndex> {
        let mut nodes: Vec<_> = self.graph.node_indices().collect();
        nodes.sort_by_key(|&idx| (self.rank_of(idx), idx.index()));
        nodes
    }

    /// Distinct neighbours over data edges, sorted by rank.
    fn data_neighbors(&self, node: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> = self
            .graph
            .edges_directed(node, direction)
            .filter(|e| *e.weight() == EdgeKind::Data)
            .map(|e| match direction {
                Direction::Outgoing => e.target(),
                Direction::Incoming => e.source(),
            })
            .collect();
        neighbors.sort_by_key(|&idx| (self.rank_of(idx), idx.index()));
        neighbors.dedup();
        neighbors
    }
}
