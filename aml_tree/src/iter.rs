//! Depth-first traversal of trees.

use crate::node::{AmlTree, NodeId};
use alloc::vec::Vec;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IterMode {
    /// Only visit the subtree below the starting node
    Branch,
    /// Visit the subtree below the starting node, then carry on through the rest of its tree in the order the
    /// nodes appear in the AML
    Linear,
}

/// Pre-order iterator over the nodes of a tree. Each object's fixed arguments are visited before its variable
/// arguments.
pub struct TreeIter<'t> {
    tree: &'t AmlTree,
    mode: IterMode,
    to_visit: Vec<NodeId>,
    /// In `Linear` mode, the iterator walks the whole tree from its root, and nothing is yielded until it reaches
    /// this node.
    start: Option<NodeId>,
}

impl<'t> TreeIter<'t> {
    pub fn new(tree: &'t AmlTree, node: NodeId, mode: IterMode) -> TreeIter<'t> {
        let (first, start) = match mode {
            IterMode::Branch => (Some(node), None),
            IterMode::Linear => (tree.get_root_node(node), Some(node)),
        };

        let mut to_visit = Vec::new();
        if let Some(first) = first.filter(|&first| tree.is_valid(first)) {
            to_visit.push(first);
        }
        TreeIter { tree, mode, to_visit, start }
    }

    pub fn branch(tree: &'t AmlTree, node: NodeId) -> TreeIter<'t> {
        TreeIter::new(tree, node, IterMode::Branch)
    }

    pub fn linear(tree: &'t AmlTree, node: NodeId) -> TreeIter<'t> {
        TreeIter::new(tree, node, IterMode::Linear)
    }

    pub fn mode(&self) -> IterMode {
        self.mode
    }

    fn step(&mut self) -> Option<NodeId> {
        let id = self.to_visit.pop()?;
        if let Ok(node) = self.tree.node(id) {
            let first_child = self.to_visit.len();
            self.to_visit.extend(node.children());
            self.to_visit[first_child..].reverse();
        }
        Some(id)
    }
}

impl Iterator for TreeIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if let Some(start) = self.start {
            loop {
                let id = self.step()?;
                if id == start {
                    self.start = None;
                    return Some(id);
                }
            }
        }

        self.step()
    }
}

/// Call `f` on `node` and every node below it, in pre-order. Stops as soon as `f` returns `false`. Returns whether
/// every node was visited.
pub fn enumerate<F>(tree: &AmlTree, node: NodeId, f: F) -> bool
where
    F: FnMut(NodeId) -> bool,
{
    TreeIter::branch(tree, node).all(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use alloc::vec;

    #[test]
    fn branch_visits_subtree_in_order() {
        let (tree, root) = parse_fixture();
        assert_eq!(TreeIter::branch(&tree, root).count(), tree.node_count());
        assert_eq!(TreeIter::branch(&tree, root).next(), Some(root));

        let hid = find(&tree, root, "\\_SB.COM0._HID");
        let name_string = tree.get_fixed_argument(hid, 0).unwrap().unwrap();
        let string_prefix = tree.get_fixed_argument(hid, 1).unwrap().unwrap();
        let string = tree.get_fixed_argument(string_prefix, 0).unwrap().unwrap();
        assert_eq!(TreeIter::branch(&tree, hid).collect::<Vec<_>>(), vec![hid, name_string, string_prefix, string]);
    }

    #[test]
    fn linear_carries_on_past_the_subtree() {
        let (tree, root) = parse_fixture();
        let all: Vec<NodeId> = TreeIter::branch(&tree, root).collect();

        let device = find(&tree, root, "\\_SB.COM0");
        let position = all.iter().position(|&id| id == device).unwrap();
        assert_eq!(TreeIter::linear(&tree, device).collect::<Vec<_>>(), all[position..]);
        assert_eq!(TreeIter::linear(&tree, root).count(), all.len());
    }

    #[test]
    fn stale_ids_yield_nothing() {
        let mut tree = AmlTree::new();
        let node = integer_node(&mut tree, 0x10);
        tree.delete_tree(node).unwrap();
        assert_eq!(TreeIter::branch(&tree, node).next(), None);
        assert_eq!(TreeIter::linear(&tree, node).next(), None);
    }

    #[test]
    fn enumerate_stops_early() {
        let (tree, root) = parse_fixture();
        let mut visited = 0;
        assert!(enumerate(&tree, root, |_| {
            visited += 1;
            true
        }));
        assert_eq!(visited, tree.node_count());

        let device = find(&tree, root, "\\_SB.COM0");
        let mut visited = 0;
        assert!(!enumerate(&tree, root, |id| {
            visited += 1;
            id != device
        }));
        assert!(visited < tree.node_count());
    }
}
