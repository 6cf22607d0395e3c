//! Red-black-tree ordered index.
//!
//! A vec-backed red-black tree over [`EntryRef`] handles with parent
//! links, so `next`/`prev` walk to the in-order successor/predecessor
//! without re-descending from the root. Nodes link by `u32` index;
//! `u32::MAX` is the nil link. This is the default index structure.
//!
//! Duplicate-comparing entries cannot occur: the entry order tie-breaks
//! on log offset, which is unique per record.

use std::cmp::Ordering;

use super::{EntryRef, IndexContext, Probe};

const NIL: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

#[derive(Debug)]
struct Node {
    entry: EntryRef,
    left: u32,
    right: u32,
    parent: u32,
    color: Color,
}

/// Red-black-tree implementation of the ordered index.
#[derive(Debug)]
pub struct RbTreeIndex {
    nodes: Vec<Node>,
    root: u32,
}

impl RbTreeIndex {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: NIL,
        }
    }

    /// Number of entries in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    fn color(&self, node: u32) -> Color {
        if node == NIL {
            Color::Black
        } else {
            self.nodes[node as usize].color
        }
    }

    fn left(&self, node: u32) -> u32 {
        self.nodes[node as usize].left
    }

    fn right(&self, node: u32) -> u32 {
        self.nodes[node as usize].right
    }

    fn parent(&self, node: u32) -> u32 {
        self.nodes[node as usize].parent
    }

    fn rotate_left(&mut self, x: u32) {
        let y = self.right(x);
        let y_left = self.left(y);
        self.nodes[x as usize].right = y_left;
        if y_left != NIL {
            self.nodes[y_left as usize].parent = x;
        }
        let x_parent = self.parent(x);
        self.nodes[y as usize].parent = x_parent;
        if x_parent == NIL {
            self.root = y;
        } else if self.left(x_parent) == x {
            self.nodes[x_parent as usize].left = y;
        } else {
            self.nodes[x_parent as usize].right = y;
        }
        self.nodes[y as usize].left = x;
        self.nodes[x as usize].parent = y;
    }

    fn rotate_right(&mut self, x: u32) {
        let y = self.left(x);
        let y_right = self.right(y);
        self.nodes[x as usize].left = y_right;
        if y_right != NIL {
            self.nodes[y_right as usize].parent = x;
        }
        let x_parent = self.parent(x);
        self.nodes[y as usize].parent = x_parent;
        if x_parent == NIL {
            self.root = y;
        } else if self.right(x_parent) == x {
            self.nodes[x_parent as usize].right = y;
        } else {
            self.nodes[x_parent as usize].left = y;
        }
        self.nodes[y as usize].right = x;
        self.nodes[x as usize].parent = y;
    }

    /// Insert a handle, keeping the tree sorted by the entry order.
    pub fn insert(&mut self, entry: EntryRef, ctx: &IndexContext<'_>) {
        let new = self.nodes.len() as u32;
        let mut parent = NIL;
        let mut node = self.root;
        let mut went_left = false;
        while node != NIL {
            parent = node;
            went_left = ctx.compare_refs(entry, self.nodes[node as usize].entry)
                == Ordering::Less;
            node = if went_left {
                self.left(node)
            } else {
                self.right(node)
            };
        }
        self.nodes.push(Node {
            entry,
            left: NIL,
            right: NIL,
            parent,
            color: Color::Red,
        });
        if parent == NIL {
            self.root = new;
        } else if went_left {
            self.nodes[parent as usize].left = new;
        } else {
            self.nodes[parent as usize].right = new;
        }
        self.fix_insert(new);
    }

    fn fix_insert(&mut self, mut z: u32) {
        while z != self.root && self.color(self.parent(z)) == Color::Red {
            let parent = self.parent(z);
            // A red parent is never the root, so the grandparent exists.
            let grandparent = self.parent(parent);
            if parent == self.left(grandparent) {
                let uncle = self.right(grandparent);
                if self.color(uncle) == Color::Red {
                    self.nodes[parent as usize].color = Color::Black;
                    self.nodes[uncle as usize].color = Color::Black;
                    self.nodes[grandparent as usize].color = Color::Red;
                    z = grandparent;
                } else {
                    if z == self.right(parent) {
                        z = parent;
                        self.rotate_left(z);
                    }
                    let parent = self.parent(z);
                    let grandparent = self.parent(parent);
                    self.nodes[parent as usize].color = Color::Black;
                    self.nodes[grandparent as usize].color = Color::Red;
                    self.rotate_right(grandparent);
                }
            } else {
                let uncle = self.left(grandparent);
                if self.color(uncle) == Color::Red {
                    self.nodes[parent as usize].color = Color::Black;
                    self.nodes[uncle as usize].color = Color::Black;
                    self.nodes[grandparent as usize].color = Color::Red;
                    z = grandparent;
                } else {
                    if z == self.left(parent) {
                        z = parent;
                        self.rotate_right(z);
                    }
                    let parent = self.parent(z);
                    let grandparent = self.parent(parent);
                    self.nodes[parent as usize].color = Color::Black;
                    self.nodes[grandparent as usize].color = Color::Red;
                    self.rotate_left(grandparent);
                }
            }
        }
        let root = self.root;
        self.nodes[root as usize].color = Color::Black;
    }

    fn minimum(&self, mut node: u32) -> u32 {
        while self.left(node) != NIL {
            node = self.left(node);
        }
        node
    }

    fn maximum(&self, mut node: u32) -> u32 {
        while self.right(node) != NIL {
            node = self.right(node);
        }
        node
    }

    fn successor(&self, mut node: u32) -> u32 {
        if self.right(node) != NIL {
            return self.minimum(self.right(node));
        }
        let mut parent = self.parent(node);
        while parent != NIL && node == self.right(parent) {
            node = parent;
            parent = self.parent(parent);
        }
        parent
    }

    fn predecessor(&self, mut node: u32) -> u32 {
        if self.left(node) != NIL {
            return self.maximum(self.left(node));
        }
        let mut parent = self.parent(node);
        while parent != NIL && node == self.left(parent) {
            node = parent;
            parent = self.parent(parent);
        }
        parent
    }

    /// First node whose entry is `>=` the probe, or `NIL`.
    fn lower_bound(&self, probe: &Probe<'_>, ctx: &IndexContext<'_>) -> u32 {
        let mut best = NIL;
        let mut node = self.root;
        while node != NIL {
            if ctx.compare_ref_to_probe(self.nodes[node as usize].entry, probe) != Ordering::Less {
                best = node;
                node = self.left(node);
            } else {
                node = self.right(node);
            }
        }
        best
    }

    /// Last node whose entry is `<=` the probe, or `NIL`.
    fn upper_bound_rev(&self, probe: &Probe<'_>, ctx: &IndexContext<'_>) -> u32 {
        let mut best = NIL;
        let mut node = self.root;
        while node != NIL {
            if ctx.compare_ref_to_probe(self.nodes[node as usize].entry, probe)
                != Ordering::Greater
            {
                best = node;
                node = self.right(node);
            } else {
                node = self.left(node);
            }
        }
        best
    }

    /// Open an unpositioned cursor.
    pub(crate) fn cursor(&self) -> Cursor<'_> {
        Cursor {
            tree: self,
            node: NIL,
        }
    }
}

impl Default for RbTreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Cursor over an [`RbTreeIndex`].
#[derive(Debug)]
pub(crate) struct Cursor<'a> {
    tree: &'a RbTreeIndex,
    node: u32,
}

impl<'a> Cursor<'a> {
    pub fn valid(&self) -> bool {
        self.node != NIL
    }

    pub fn entry_ref(&self) -> EntryRef {
        debug_assert!(self.valid());
        self.tree.nodes[self.node as usize].entry
    }

    pub fn seek(&mut self, probe: &Probe<'_>, ctx: &IndexContext<'_>) {
        self.node = self.tree.lower_bound(probe, ctx);
    }

    pub fn seek_for_prev(&mut self, probe: &Probe<'_>, ctx: &IndexContext<'_>) {
        self.node = self.tree.upper_bound_rev(probe, ctx);
    }

    pub fn seek_to_first(&mut self) {
        self.node = if self.tree.root == NIL {
            NIL
        } else {
            self.tree.minimum(self.tree.root)
        };
    }

    pub fn seek_to_last(&mut self) {
        self.node = if self.tree.root == NIL {
            NIL
        } else {
            self.tree.maximum(self.tree.root)
        };
    }

    pub fn next(&mut self) {
        debug_assert!(self.valid());
        self.node = self.tree.successor(self.node);
    }

    pub fn prev(&mut self) {
        debug_assert!(self.valid());
        self.node = self.tree.predecessor(self.node);
    }
}
