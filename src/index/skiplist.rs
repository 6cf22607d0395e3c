//! Skip-list ordered index.
//!
//! A classic tower skip list over [`EntryRef`] handles: branching factor
//! 4, twelve levels (ample for batch-sized entry counts), forward links
//! only. `prev` re-descends from the top to find the strict predecessor,
//! so backward iteration costs `O(log n)` per step while forward
//! iteration stays `O(1)`.
//!
//! Nodes live in a `Vec` and link by index; `u32::MAX` is the nil link.
//! The node at slot 0 is the head sentinel — its entry handle is never
//! dereferenced because traversal only compares successor nodes.

use std::cmp::Ordering;

use super::{EntryRef, IndexContext, Probe};

const MAX_HEIGHT: usize = 12;
const BRANCHING: u32 = 4;
const NIL: u32 = u32::MAX;
const HEAD: u32 = 0;

#[derive(Debug)]
struct Node {
    entry: EntryRef,
    next: [u32; MAX_HEIGHT],
}

/// Skip-list implementation of the ordered index.
#[derive(Debug)]
pub struct SkipListIndex {
    nodes: Vec<Node>,
    max_height: usize,
    rnd: u32,
    len: usize,
}

impl SkipListIndex {
    /// Create an empty list.
    pub fn new() -> Self {
        let head = Node {
            // Placeholder handle; the head sentinel is never compared.
            entry: EntryRef::dangling(),
            next: [NIL; MAX_HEIGHT],
        };
        Self {
            nodes: vec![head],
            max_height: 1,
            rnd: 0xdead_beef,
            len: 0,
        }
    }

    /// Number of entries in the list.
    pub fn len(&self) -> usize {
        self.len
    }

    fn next_random(&mut self) -> u32 {
        // xorshift32; any fixed seed gives a usable height distribution.
        let mut x = self.rnd;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rnd = x;
        x
    }

    fn random_height(&mut self) -> usize {
        let mut height = 1;
        while height < MAX_HEIGHT && self.next_random() % BRANCHING == 0 {
            height += 1;
        }
        height
    }

    fn next_of(&self, node: u32, level: usize) -> u32 {
        self.nodes[node as usize].next[level]
    }

    /// Insert a handle, keeping the list sorted by the entry order.
    pub fn insert(&mut self, entry: EntryRef, ctx: &IndexContext<'_>) {
        let mut prev = [HEAD; MAX_HEIGHT];
        let mut node = HEAD;
        for level in (0..self.max_height).rev() {
            loop {
                let next = self.next_of(node, level);
                if next != NIL
                    && ctx.compare_refs(self.nodes[next as usize].entry, entry) == Ordering::Less
                {
                    node = next;
                } else {
                    break;
                }
            }
            prev[level] = node;
        }

        let height = self.random_height();
        if height > self.max_height {
            for slot in prev.iter_mut().take(height).skip(self.max_height) {
                *slot = HEAD;
            }
            self.max_height = height;
        }

        let new = self.nodes.len() as u32;
        let mut links = [NIL; MAX_HEIGHT];
        for (level, link) in links.iter_mut().enumerate().take(height) {
            *link = self.next_of(prev[level], level);
        }
        self.nodes.push(Node { entry, next: links });
        for (level, &p) in prev.iter().enumerate().take(height) {
            self.nodes[p as usize].next[level] = new;
        }
        self.len += 1;
    }

    /// First node whose entry is `>=` the probe, or `NIL`.
    fn find_greater_or_equal(&self, probe: &Probe<'_>, ctx: &IndexContext<'_>) -> u32 {
        let mut node = HEAD;
        let mut level = self.max_height - 1;
        loop {
            let next = self.next_of(node, level);
            if next != NIL
                && ctx.compare_ref_to_probe(self.nodes[next as usize].entry, probe)
                    == Ordering::Less
            {
                node = next;
            } else if level == 0 {
                return next;
            } else {
                level -= 1;
            }
        }
    }

    /// Last node whose entry is `<=` the probe; `HEAD` when none is.
    fn find_less_or_equal(&self, probe: &Probe<'_>, ctx: &IndexContext<'_>) -> u32 {
        let mut node = HEAD;
        let mut level = self.max_height - 1;
        loop {
            let next = self.next_of(node, level);
            if next != NIL
                && ctx.compare_ref_to_probe(self.nodes[next as usize].entry, probe)
                    != Ordering::Greater
            {
                node = next;
            } else if level == 0 {
                return node;
            } else {
                level -= 1;
            }
        }
    }

    /// Last node whose entry is strictly before `target`; `HEAD` when
    /// `target`'s node is first.
    fn find_less_than(&self, target: EntryRef, ctx: &IndexContext<'_>) -> u32 {
        let mut node = HEAD;
        let mut level = self.max_height - 1;
        loop {
            let next = self.next_of(node, level);
            if next != NIL
                && ctx.compare_refs(self.nodes[next as usize].entry, target) == Ordering::Less
            {
                node = next;
            } else if level == 0 {
                return node;
            } else {
                level -= 1;
            }
        }
    }

    /// Last node of the list; `HEAD` when empty.
    fn find_last(&self) -> u32 {
        let mut node = HEAD;
        let mut level = self.max_height - 1;
        loop {
            let next = self.next_of(node, level);
            if next != NIL {
                node = next;
            } else if level == 0 {
                return node;
            } else {
                level -= 1;
            }
        }
    }

    /// Open an unpositioned cursor.
    pub(crate) fn cursor(&self) -> Cursor<'_> {
        Cursor {
            list: self,
            node: NIL,
        }
    }
}

impl Default for SkipListIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Cursor over a [`SkipListIndex`].
#[derive(Debug)]
pub(crate) struct Cursor<'a> {
    list: &'a SkipListIndex,
    node: u32,
}

impl<'a> Cursor<'a> {
    pub fn valid(&self) -> bool {
        self.node != NIL
    }

    pub fn entry_ref(&self) -> EntryRef {
        debug_assert!(self.valid());
        self.list.nodes[self.node as usize].entry
    }

    pub fn seek(&mut self, probe: &Probe<'_>, ctx: &IndexContext<'_>) {
        self.node = self.list.find_greater_or_equal(probe, ctx);
    }

    pub fn seek_for_prev(&mut self, probe: &Probe<'_>, ctx: &IndexContext<'_>) {
        let node = self.list.find_less_or_equal(probe, ctx);
        self.node = if node == HEAD { NIL } else { node };
    }

    pub fn seek_to_first(&mut self) {
        self.node = self.list.next_of(HEAD, 0);
    }

    pub fn seek_to_last(&mut self) {
        let node = self.list.find_last();
        self.node = if node == HEAD { NIL } else { node };
    }

    pub fn next(&mut self) {
        debug_assert!(self.valid());
        self.node = self.list.next_of(self.node, 0);
    }

    pub fn prev(&mut self, ctx: &IndexContext<'_>) {
        debug_assert!(self.valid());
        let target = self.list.nodes[self.node as usize].entry;
        let node = self.list.find_less_than(target, ctx);
        self.node = if node == HEAD { NIL } else { node };
    }
}
