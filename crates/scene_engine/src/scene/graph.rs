//! Arena scene graph
//!
//! Nodes live in a [`SlotMap`] and refer to each other by [`NodeId`]. The
//! parent link is a plain index; the ordered child list is the ownership
//! edge. Inserting a node under itself or one of its descendants is not
//! detected and produces a cycle, so callers must not do it.

use std::collections::VecDeque;

use slotmap::SlotMap;

use super::node::{Node, NodeId};
use crate::foundation::math::{Mat4, Vec3};

/// Returned by traversal callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraverseControl {
    /// Visit this node's children
    #[default]
    Continue,
    /// Skip this node's children, keep walking siblings
    StopChildren,
    /// Abort the whole traversal
    StopAll,
}

/// Tree of [`Node`]s rooted at a node named "Scene"
#[derive(Debug)]
pub struct SceneGraph {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
}

impl SceneGraph {
    /// Graph holding only the root node
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::group("Scene"));
        Self { nodes, root }
    }

    /// Root node id
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false, the root cannot be removed
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `id` refers to a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Node by id
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Mutable node by id
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Insert a detached node
    pub fn spawn(&mut self, node: Node) -> NodeId {
        self.nodes.insert(node)
    }

    /// Insert a node as the last child of `parent`
    pub fn create_child(&mut self, parent: NodeId, node: Node) -> Option<NodeId> {
        if !self.nodes.contains_key(parent) {
            return None;
        }
        let id = self.nodes.insert(node);
        self.add_child(parent, id);
        Some(id)
    }

    /// Append `child` to `parent`, detaching it from its previous parent
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let index = self.nodes.get(parent).map_or(0, |p| p.children.len());
        self.insert_child(parent, index, child)
    }

    /// Insert `child` at `index` (clamped) in `parent`'s child list
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> bool {
        if parent == child || !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) {
            return false;
        }
        self.detach(child);

        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            let index = index.min(parent_node.children.len());
            parent_node.children.insert(index, child);
        }
        true
    }

    /// Unlink a node from its parent. The subtree stays intact.
    pub fn detach(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.nodes.get_mut(id).and_then(|n| n.parent.take()) else {
            return false;
        };
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.retain(|c| *c != id);
        }
        true
    }

    /// Free a node and all its descendants. The root is never removed.
    pub fn remove_subtree(&mut self, id: NodeId) -> usize {
        if id == self.root || !self.nodes.contains_key(id) {
            return 0;
        }
        self.detach(id);

        let mut stack = vec![id];
        let mut removed = 0;
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                stack.extend(node.children);
                removed += 1;
            }
        }
        log::trace!("Removed {removed} nodes from the scene graph");
        removed
    }

    /// Depth-first pre-order walk from `root`.
    ///
    /// With `only_children` the callback is not invoked for `root` itself.
    /// Returns whether the walk was aborted with [`TraverseControl::StopAll`].
    pub fn traverse<F>(&self, root: NodeId, only_children: bool, mut callback: F) -> bool
    where
        F: FnMut(NodeId, &Node) -> TraverseControl,
    {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if !(only_children && id == root) {
                match callback(id, node) {
                    TraverseControl::StopAll => return true,
                    TraverseControl::StopChildren => continue,
                    TraverseControl::Continue => {}
                }
            }
            stack.extend(node.children.iter().rev());
        }
        false
    }

    /// Level-order walk from `root`; same contract as [`Self::traverse`]
    pub fn traverse_breadth_first<F>(&self, root: NodeId, only_children: bool, mut callback: F) -> bool
    where
        F: FnMut(NodeId, &Node) -> TraverseControl,
    {
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if !(only_children && id == root) {
                match callback(id, node) {
                    TraverseControl::StopAll => return true,
                    TraverseControl::StopChildren => continue,
                    TraverseControl::Continue => {}
                }
            }
            queue.extend(node.children.iter());
        }
        false
    }

    /// First descendant of `root` named `name`, shallowest first
    pub fn get_child_by_name(&self, root: NodeId, name: &str) -> Option<NodeId> {
        let mut found = None;
        self.traverse_breadth_first(root, true, |id, node| {
            if node.name == name {
                found = Some(id);
                TraverseControl::StopAll
            } else {
                TraverseControl::Continue
            }
        });
        found
    }

    /// Descendant of `root` with the given id
    pub fn get_child_by_id(&self, root: NodeId, id: NodeId) -> Option<&Node> {
        let mut found = false;
        self.traverse_breadth_first(root, true, |current, _| {
            if current == id {
                found = true;
                TraverseControl::StopAll
            } else {
                TraverseControl::Continue
            }
        });
        if found {
            self.nodes.get(id)
        } else {
            None
        }
    }

    /// First node in the whole graph named `name`
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        if self.nodes.get(self.root).is_some_and(|n| n.name == name) {
            return Some(self.root);
        }
        self.get_child_by_name(self.root, name)
    }

    /// Every descendant of `root` named `name`, depth-first
    pub fn get_children_by_name(&self, root: NodeId, name: &str) -> Vec<NodeId> {
        self.filter(root, |node| node.name == name)
    }

    /// Every descendant of `root` matching `predicate`, depth-first
    pub fn filter<P>(&self, root: NodeId, mut predicate: P) -> Vec<NodeId>
    where
        P: FnMut(&Node) -> bool,
    {
        let mut out = Vec::new();
        self.traverse(root, true, |id, node| {
            if predicate(node) {
                out.push(id);
            }
            TraverseControl::Continue
        });
        out
    }

    /// World-space translation of a node as of the last update pass
    pub fn world_position(&self, id: NodeId) -> Option<Vec3> {
        self.nodes.get(id).map(Node::world_position)
    }

    /// Recompute one node's local matrix if dirty
    pub fn update_matrix(&mut self, id: NodeId) -> bool {
        self.nodes.get_mut(id).is_some_and(Node::update_matrix)
    }

    /// Propagate world matrices through the subtree at `root`
    pub fn update_world_matrix_tree(&mut self, root: NodeId, force: bool) {
        self.update_world_matrix_tree_with(root, force, |_, _| TraverseControl::Continue);
    }

    /// Propagate world matrices, consulting `predicate` after each node.
    ///
    /// Pre-order, so every parent is final before its children read it. A node
    /// is recomputed when `auto_update_world_matrix` is set or `force` is true;
    /// descent stops below nodes with `auto_update_child_world_matrix` unset
    /// unless forced. Returns whether the predicate aborted the walk.
    pub fn update_world_matrix_tree_with<P>(&mut self, root: NodeId, force: bool, mut predicate: P) -> bool
    where
        P: FnMut(NodeId, &Node) -> TraverseControl,
    {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let parent_world: Option<Mat4> = self
                .nodes
                .get(id)
                .and_then(|n| n.parent)
                .and_then(|p| self.nodes.get(p))
                .map(|p| p.world_matrix);
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };

            if node.auto_update_world_matrix || force {
                node.update_matrix();
                node.world_matrix = match parent_world {
                    Some(parent) if node.inherit_parent_transform => parent,
                    Some(parent) => parent * node.transform().matrix(),
                    None => *node.transform().matrix(),
                };
            }

            match predicate(id, node) {
                TraverseControl::StopAll => return true,
                TraverseControl::StopChildren => continue,
                TraverseControl::Continue => {}
            }
            if !node.auto_update_child_world_matrix && !force {
                continue;
            }
            stack.extend(node.children.iter().rev());
        }
        false
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn names(graph: &SceneGraph, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|id| graph.node(*id).map(|n| n.name.clone()).unwrap_or_default())
            .collect()
    }

    // Scene
    // ├── a
    // │   ├── a1
    // │   └── x
    // └── b
    //     └── x
    fn sample() -> (SceneGraph, [NodeId; 5]) {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let a = graph.create_child(root, Node::group("a")).unwrap();
        let b = graph.create_child(root, Node::group("b")).unwrap();
        let a1 = graph.create_child(a, Node::group("a1")).unwrap();
        let ax = graph.create_child(a, Node::group("x")).unwrap();
        let bx = graph.create_child(b, Node::group("x")).unwrap();
        (graph, [a, b, a1, ax, bx])
    }

    #[test]
    fn test_child_world_translation() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let parent = graph
            .create_child(root, Node::group("parent").with_position(1.0, 0.0, 0.0))
            .unwrap();
        let child = graph
            .create_child(parent, Node::group("child").with_rotation(0.0, 90.0, 0.0))
            .unwrap();

        graph.update_world_matrix_tree(root, false);
        assert_relative_eq!(graph.world_position(child).unwrap(), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_traversal_orders() {
        let (graph, _) = sample();
        let mut dfs = Vec::new();
        graph.traverse(graph.root(), true, |id, _| {
            dfs.push(id);
            TraverseControl::Continue
        });
        assert_eq!(names(&graph, &dfs), ["a", "a1", "x", "b", "x"]);

        let mut bfs = Vec::new();
        graph.traverse_breadth_first(graph.root(), false, |id, _| {
            bfs.push(id);
            TraverseControl::Continue
        });
        assert_eq!(names(&graph, &bfs), ["Scene", "a", "b", "a1", "x", "x"]);
    }

    #[test]
    fn test_stop_children_and_stop_all() {
        let (graph, [a, ..]) = sample();
        let mut seen = Vec::new();
        let stopped = graph.traverse(graph.root(), true, |id, _| {
            seen.push(id);
            if id == a {
                TraverseControl::StopChildren
            } else {
                TraverseControl::Continue
            }
        });
        assert!(!stopped);
        assert_eq!(names(&graph, &seen), ["a", "b", "x"]);

        let mut count = 0;
        let stopped = graph.traverse(graph.root(), false, |_, _| {
            count += 1;
            TraverseControl::StopAll
        });
        assert!(stopped);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_lookups() {
        let (graph, [a, b, _, ax, bx]) = sample();
        assert_eq!(graph.get_child_by_name(graph.root(), "x"), Some(ax));
        assert_eq!(graph.get_child_by_name(b, "x"), Some(bx));
        assert_eq!(graph.get_children_by_name(graph.root(), "x"), vec![ax, bx]);
        assert!(graph.get_child_by_id(a, bx).is_none());
        assert!(graph.get_child_by_id(b, bx).is_some());
        assert_eq!(graph.find_by_name("Scene"), Some(graph.root()));
        assert_eq!(graph.filter(graph.root(), |n| n.name.starts_with('a')).len(), 2);
    }

    #[test]
    fn test_detach_keeps_subtree_and_remove_frees_it() {
        let (mut graph, [a, _, a1, ax, _]) = sample();
        assert!(graph.detach(a));
        assert!(graph.node(a).unwrap().parent().is_none());
        assert_eq!(graph.node(a).unwrap().children(), &[a1, ax]);
        assert!(graph.get_child_by_name(graph.root(), "a1").is_none());

        assert_eq!(graph.remove_subtree(a), 3);
        assert!(!graph.contains(a1));
        assert_eq!(graph.remove_subtree(graph.root()), 0);
    }

    #[test]
    fn test_insert_child_reparents() {
        let (mut graph, [a, b, a1, ax, bx]) = sample();
        assert!(graph.insert_child(b, 0, a1));
        assert_eq!(graph.node(b).unwrap().children(), &[a1, bx]);
        assert_eq!(graph.node(a).unwrap().children(), &[ax]);
        assert_eq!(graph.node(a1).unwrap().parent(), Some(b));
        assert!(!graph.add_child(a, a));
    }

    #[test]
    fn test_update_flags() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let frozen = graph
            .create_child(root, Node::group("frozen").with_position(1.0, 0.0, 0.0))
            .unwrap();
        let child = graph
            .create_child(frozen, Node::group("child").with_position(0.0, 2.0, 0.0))
            .unwrap();
        let attached = graph.create_child(frozen, Node::group("attached").with_position(9.0, 9.0, 9.0)).unwrap();
        graph.node_mut(attached).unwrap().inherit_parent_transform = true;
        graph.node_mut(frozen).unwrap().auto_update_child_world_matrix = false;

        graph.update_world_matrix_tree(root, false);
        assert_relative_eq!(graph.world_position(child).unwrap(), Vec3::zeros());

        graph.update_world_matrix_tree(root, true);
        assert_relative_eq!(graph.world_position(child).unwrap(), Vec3::new(1.0, 2.0, 0.0));
        assert_relative_eq!(graph.world_position(attached).unwrap(), Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_matrix_version_increments_once_per_commit() {
        let mut graph = SceneGraph::new();
        let id = graph.create_child(graph.root(), Node::group("n")).unwrap();
        graph.node_mut(id).unwrap().set_position(1.0, 1.0, 1.0);
        graph.node_mut(id).unwrap().set_scale(2.0, 2.0, 2.0);
        assert!(graph.update_matrix(id));
        assert!(!graph.update_matrix(id));
        assert_eq!(graph.node(id).unwrap().transform().matrix_version(), 1);
    }
}
