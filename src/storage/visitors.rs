//! Visitor Tracking Tree
//!
//! Every cache entry carries a `VisitorTree`: the set of requester ids that
//! have written or read the entry since its last mutation. A `cas` command is
//! accepted only when its token is a member of this set.
//!
//! ## Representation
//!
//! The set is a left-leaning red-black tree whose nodes live in a per-tree
//! arena (`Vec<Node>`) and link to each other by index:
//!
//! ```text
//!   nodes: [ {id: 7, B} , {id: 3, R} , {id: 9, B} ]
//!              │  ▲ left ──────┘          ▲
//!              │  └── right ──────────────┘
//!   root ──────┘
//! ```
//!
//! ## Complexity
//!
//! - `insert`: O(log n) worst case; rotations and color flips are applied
//!   bottom-up while the recursion unwinds toward the root.
//! - `contains`: O(log n)
//! - `clear`: O(1). Nodes are plain `Copy` data, so truncating the arena does
//!   not visit them. Every mutating write calls `clear`.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    id: u64,
    left: Option<usize>,
    right: Option<usize>,
    color: Color,
}

impl Node {
    fn red(id: u64) -> Self {
        Self {
            id,
            left: None,
            right: None,
            color: Color::Red,
        }
    }
}

/// Ordered set of requester ids backed by a red-black tree.
#[derive(Debug, Clone, Default)]
pub struct VisitorTree {
    nodes: Vec<Node>,
    root: Option<usize>,
}

impl VisitorTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tree holding a single visitor.
    pub fn with_visitor(id: u64) -> Self {
        let mut tree = Self::new();
        tree.insert(id);
        tree
    }

    /// Number of distinct visitors.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Inserts `id`. Returns `false` if it was already present.
    pub fn insert(&mut self, id: u64) -> bool {
        let before = self.nodes.len();
        let root = self.insert_at(self.root, id);
        self.nodes[root].color = Color::Black;
        self.root = Some(root);
        self.nodes.len() > before
    }

    /// Returns `true` if `id` has visited since the last `clear`.
    pub fn contains(&self, id: u64) -> bool {
        let mut link = self.root;
        while let Some(idx) = link {
            let node = &self.nodes[idx];
            link = match id.cmp(&node.id) {
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
                Ordering::Equal => return true,
            };
        }
        false
    }

    /// Forgets every visitor without walking the tree.
    pub fn clear(&mut self) {
        self.root = None;
        self.nodes.clear();
    }

    /// Visitors in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        let mut stack = Vec::new();
        let mut link = self.root;
        std::iter::from_fn(move || {
            while let Some(idx) = link {
                stack.push(idx);
                link = self.nodes[idx].left;
            }
            let idx = stack.pop()?;
            link = self.nodes[idx].right;
            Some(self.nodes[idx].id)
        })
    }

    fn insert_at(&mut self, link: Option<usize>, id: u64) -> usize {
        let Some(mut h) = link else {
            self.nodes.push(Node::red(id));
            return self.nodes.len() - 1;
        };

        match id.cmp(&self.nodes[h].id) {
            Ordering::Less => {
                let left = self.insert_at(self.nodes[h].left, id);
                self.nodes[h].left = Some(left);
            }
            Ordering::Greater => {
                let right = self.insert_at(self.nodes[h].right, id);
                self.nodes[h].right = Some(right);
            }
            Ordering::Equal => return h,
        }

        if self.is_red(self.nodes[h].right) && !self.is_red(self.nodes[h].left) {
            h = self.rotate_left(h);
        }
        if self.is_red(self.nodes[h].left) && self.is_red(self.left_of(self.nodes[h].left)) {
            h = self.rotate_right(h);
        }
        if self.is_red(self.nodes[h].left) && self.is_red(self.nodes[h].right) {
            self.flip_colors(h);
        }
        h
    }

    fn is_red(&self, link: Option<usize>) -> bool {
        link.is_some_and(|idx| self.nodes[idx].color == Color::Red)
    }

    fn left_of(&self, link: Option<usize>) -> Option<usize> {
        link.and_then(|idx| self.nodes[idx].left)
    }

    fn rotate_left(&mut self, h: usize) -> usize {
        let Some(x) = self.nodes[h].right else {
            return h;
        };
        self.nodes[h].right = self.nodes[x].left;
        self.nodes[x].left = Some(h);
        self.nodes[x].color = self.nodes[h].color;
        self.nodes[h].color = Color::Red;
        x
    }

    fn rotate_right(&mut self, h: usize) -> usize {
        let Some(x) = self.nodes[h].left else {
            return h;
        };
        self.nodes[h].left = self.nodes[x].right;
        self.nodes[x].right = Some(h);
        self.nodes[x].color = self.nodes[h].color;
        self.nodes[h].color = Color::Red;
        x
    }

    fn flip_colors(&mut self, h: usize) {
        self.nodes[h].color = Color::Red;
        for child in [self.nodes[h].left, self.nodes[h].right]
            .into_iter()
            .flatten()
        {
            self.nodes[child].color = Color::Black;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns the black height of the subtree, panicking on a violated invariant.
    fn black_height(tree: &VisitorTree, link: Option<usize>) -> usize {
        let Some(idx) = link else {
            return 1;
        };
        let node = tree.nodes[idx];
        if node.color == Color::Red {
            assert!(
                !tree.is_red(node.left),
                "red node {} has red left child",
                node.id
            );
            assert!(
                !tree.is_red(node.right),
                "red node {} has red right child",
                node.id
            );
        }
        if let Some(l) = node.left {
            assert!(tree.nodes[l].id < node.id);
        }
        if let Some(r) = node.right {
            assert!(tree.nodes[r].id > node.id);
        }
        let left = black_height(tree, node.left);
        let right = black_height(tree, node.right);
        assert_eq!(left, right, "unequal black height below {}", node.id);
        left + usize::from(node.color == Color::Black)
    }

    fn assert_balanced(tree: &VisitorTree) {
        if let Some(root) = tree.root {
            assert_eq!(tree.nodes[root].color, Color::Black);
        }
        black_height(tree, tree.root);
    }

    #[test]
    fn test_empty_tree() {
        let tree = VisitorTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert!(!tree.contains(1));
    }

    #[test]
    fn test_insert_and_contains() {
        let mut tree = VisitorTree::new();
        assert!(tree.insert(5));
        assert!(tree.insert(1));
        assert!(tree.insert(9));

        assert!(tree.contains(5));
        assert!(tree.contains(1));
        assert!(tree.contains(9));
        assert!(!tree.contains(2));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut tree = VisitorTree::with_visitor(42);
        assert!(!tree.insert(42));
        assert!(!tree.insert(42));
        assert_eq!(tree.len(), 1);
        assert_balanced(&tree);
    }

    #[test]
    fn test_ascending_inserts_stay_balanced() {
        let mut tree = VisitorTree::new();
        for id in 0..1024 {
            tree.insert(id);
            assert_balanced(&tree);
        }
        assert_eq!(tree.len(), 1024);
        assert!((0..1024).all(|id| tree.contains(id)));
        assert!(!tree.contains(1024));
    }

    #[test]
    fn test_descending_and_mixed_inserts_stay_balanced() {
        let mut tree = VisitorTree::new();
        for id in (0..500).rev() {
            tree.insert(id * 2);
        }
        for id in 0..500 {
            tree.insert(id * 2 + 1);
        }
        assert_balanced(&tree);
        assert_eq!(tree.len(), 1000);
        assert_eq!(
            tree.iter().collect::<Vec<_>>(),
            (0..1000).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_extreme_ids() {
        let mut tree = VisitorTree::new();
        tree.insert(u64::MAX);
        tree.insert(0);
        tree.insert(12_700_154_321);
        assert!(tree.contains(u64::MAX));
        assert!(tree.contains(0));
        assert!(tree.contains(12_700_154_321));
        assert_balanced(&tree);
    }

    #[test]
    fn test_clear_then_reuse() {
        let mut tree = VisitorTree::new();
        for id in 1..=64 {
            tree.insert(id);
        }
        tree.clear();

        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert!(!tree.contains(1));

        tree.insert(7);
        assert_eq!(tree.iter().collect::<Vec<_>>(), vec![7]);
        assert_balanced(&tree);
    }
}
