use std::{borrow::Borrow, cmp::Ordering, mem};

use log::{debug, trace};

use crate::compare::{Comparator, Natural};
use crate::depth::Depth;
use crate::error::RbError;

/// Rbtree manage a single instance of in-memory index using
/// [red-black][rbtree] tree.
///
/// Nodes live in an arena owned by the tree and refer to their parent
/// and children by index, so that rotations and fixups can walk up the
/// tree without any ownership cycle. Key comparison is delegated to a
/// [`Comparator`] strategy, [`Natural`] ordering by default.
///
/// [rbtree]: https://en.wikipedia.org/wiki/Red%E2%80%93black_tree
pub struct Rbtree<K, V, C = Natural> {
    name: String,
    nodes: Vec<Option<Node<K, V>>>, // arena, None for free slots.
    free: Vec<usize>,               // free slots in arena.
    root: Option<usize>,
    n_count: usize, // number of entries in the tree.
    cmp: C,
    #[cfg(test)]
    pub(crate) fail_alloc: bool, // fail arena growth while set.
}

// free list of the clone keeps room for every arena slot.
impl<K, V, C> Clone for Rbtree<K, V, C>
where
    K: Clone,
    V: Clone,
    C: Clone,
{
    fn clone(&self) -> Self {
        let mut free = Vec::with_capacity(self.nodes.len());
        free.extend_from_slice(&self.free);
        Rbtree {
            name: self.name.clone(),
            nodes: self.nodes.clone(),
            free,
            root: self.root,
            n_count: self.n_count,
            cmp: self.cmp.clone(),
            #[cfg(test)]
            fail_alloc: false,
        }
    }
}

/// Different ways to construct a new Rbtree instance.
impl<K, V> Rbtree<K, V, Natural>
where
    K: Clone + Ord,
    V: Clone,
{
    /// Create an empty instance of Rbtree, identified by `name`, using
    /// the natural ordering of `K`. Applications can choose unique names.
    pub fn new<S>(name: S) -> Rbtree<K, V, Natural>
    where
        S: AsRef<str>,
    {
        Rbtree::with_comparator(name, Natural)
    }

    /// Create a new instance of Rbtree tree and load it with entries
    /// from `iter`. Note that iterator should return (key, value) tuples,
    /// where key must be ``unique``.
    pub fn load_from<S, I>(name: S, iter: I) -> Result<Rbtree<K, V, Natural>, RbError<K>>
    where
        S: AsRef<str>,
        I: Iterator<Item = (K, V)>,
    {
        let mut index = Rbtree::new(name);
        for (key, value) in iter {
            index.insert(key, value)?;
        }
        Ok(index)
    }
}

impl<K, V, C> Rbtree<K, V, C>
where
    K: Clone,
    V: Clone,
    C: Comparator<K>,
{
    /// Create an empty instance of Rbtree, identified by `name`, that
    /// orders its keys using `cmp`.
    pub fn with_comparator<S>(name: S, cmp: C) -> Rbtree<K, V, C>
    where
        S: AsRef<str>,
    {
        Rbtree {
            name: name.as_ref().to_string(),
            nodes: Default::default(),
            free: Default::default(),
            root: Default::default(),
            n_count: Default::default(),
            cmp,
            #[cfg(test)]
            fail_alloc: false,
        }
    }
}

/// Maintenance API.
impl<K, V, C> Rbtree<K, V, C>
where
    K: Clone,
    V: Clone,
    C: Comparator<K>,
{
    /// Identify this instance. Applications can choose unique names while
    /// creating Rbtree instances.
    #[inline]
    pub fn id(&self) -> String {
        self.name.clone()
    }

    /// Return number of entries in this instance.
    #[inline]
    pub fn len(&self) -> usize {
        self.n_count
    }

    /// Check whether this index is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_count == 0
    }

    /// Return quickly with basic statisics, only entries() and
    /// node_size() methods are valid with this statisics.
    pub fn stats(&self) -> Stats {
        Stats::new(self.n_count, mem::size_of::<Node<K, V>>())
    }

    /// Release all entries, the instance can be reused afterwards.
    pub fn clear(&mut self) {
        debug!("{}: clearing {} entries", self.name, self.n_count);
        self.nodes.clear();
        self.free.clear();
        self.root = None;
        self.n_count = 0;
    }
}

/// Write operations on Rbtree instance.
impl<K, V, C> Rbtree<K, V, C>
where
    K: Clone,
    V: Clone,
    C: Comparator<K>,
{
    /// Insert a new {key, value} entry in the index. If key is already
    /// present return error and leave the index untouched, existing
    /// entries are never overwritten.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), RbError<K>> {
        let mut parent: Option<(usize, Ordering)> = None;
        let mut node = self.root;
        while let Some(n) = node {
            let nref = self.node(n);
            let ord = self.cmp.compare(&nref.key, &key);
            node = match ord {
                Ordering::Greater => nref.left,
                Ordering::Less => nref.right,
                Ordering::Equal => return Err(RbError::OverwriteKey),
            };
            parent = Some((n, ord));
        }

        let new = self.alloc(Node::new(key, value, parent.map(|(p, _)| p)))?;
        match parent {
            None => {
                self.node_mut(new).set_black();
                self.root = Some(new);
            }
            Some((p, Ordering::Greater)) => {
                self.node_mut(p).left = Some(new);
                self.insert_fixup(new);
            }
            Some((p, _)) => {
                self.node_mut(p).right = Some(new);
                self.insert_fixup(new);
            }
        }
        self.n_count += 1;
        Ok(())
    }

    /// Remove key from this instance and return the entry that was
    /// stored for it. If key is not present, then remove is effectively
    /// a no-op.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        C: Comparator<Q>,
        Q: ?Sized,
    {
        let mut n = self.search(key)?;

        if let (Some(left), Some(_)) = (self.node(n).left, self.node(n).right) {
            // pull the predecessor's entry up, then unlink the
            // predecessor, which has at most one child.
            let pred = self.max_under(left);
            self.swap_entries(n, pred);
            n = pred;
        }

        let nref = self.node(n);
        let child = nref.left.or(nref.right);
        if nref.is_black() {
            self.delete_fixup(n);
        }

        let parent = self.parent(n);
        self.replace_child(parent, n, child);
        if let (None, Some(child)) = (parent, child) {
            self.node_mut(child).set_black();
        }

        let node = self.dealloc(n);
        self.n_count -= 1;
        Some((node.key, node.value))
    }

    /// Validate red-black tree with following rules:
    ///
    /// * Root node is black.
    /// * From root to any leaf, no consecutive reds allowed in its path.
    /// * Number of blacks should be same under left child and right child.
    /// * Make sure keys are in sorted order.
    /// * Every child points back to its parent.
    /// * Height of the tree is within 2*log2(n+1).
    ///
    /// Additionally return full statistics on the tree. Refer to [`Stats`]
    /// for more information.
    pub fn validate(&self) -> Result<Stats, RbError<K>> {
        if self.is_red(self.root) {
            return Err(RbError::RedRoot);
        }
        if let Some(root) = self.root {
            if let Some(parent) = self.node(root).parent {
                let err = format!("root {} has parent {}", root, parent);
                return Err(RbError::BrokenLink(err));
            }
        }

        let mut stats = Stats::new(self.n_count, mem::size_of::<Node<K, V>>());
        stats.set_depths(Depth::new());
        let mut walk = Walk {
            low: None,
            high: None,
            nb: 0,
            depth: 0,
            count: 0,
        };
        let blacks = self.validate_tree(self.root, false, &mut walk, &mut stats)?;
        stats.set_blacks(blacks);

        if walk.count != self.n_count {
            let (expected, found) = (self.n_count, walk.count);
            return Err(RbError::EntryCount { expected, found });
        }

        let depth = stats.depths.as_ref().map_or(0, |d| d.max());
        let bound = (2.0 * ((self.n_count + 1) as f64).log2()).ceil() as usize;
        if depth > bound {
            let entries = self.n_count;
            return Err(RbError::DepthExceeded {
                depth,
                bound,
                entries,
            });
        }
        Ok(stats)
    }
}

/// Read operations on Rbtree instance.
impl<K, V, C> Rbtree<K, V, C>
where
    K: Clone,
    V: Clone,
    C: Comparator<K>,
{
    /// Get the value for key.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        C: Comparator<Q>,
        Q: ?Sized,
    {
        self.search(key).map(|n| self.node(n).value.clone())
    }

    /// Check whether key is present in this instance.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        C: Comparator<Q>,
        Q: ?Sized,
    {
        self.search(key).is_some()
    }
}

// validation state, threaded through the recursive walk.
struct Walk {
    low: Option<usize>,  // node holding the exclusive lower bound.
    high: Option<usize>, // node holding the exclusive upper bound.
    nb: usize,
    depth: usize,
    count: usize,
}

impl<K, V, C> Rbtree<K, V, C>
where
    K: Clone,
    V: Clone,
    C: Comparator<K>,
{
    fn search<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        C: Comparator<Q>,
        Q: ?Sized,
    {
        let mut node = self.root;
        while let Some(n) = node {
            let nref = self.node(n);
            let nkey: &Q = nref.key.borrow();
            node = match Comparator::<Q>::compare(&self.cmp, nkey, key) {
                Ordering::Less => nref.right,
                Ordering::Greater => nref.left,
                Ordering::Equal => return Some(n),
            };
        }
        None
    }

    fn max_under(&self, mut n: usize) -> usize {
        while let Some(right) = self.node(n).right {
            n = right;
        }
        n
    }

    fn validate_tree(
        &self,
        node: Option<usize>,
        fromred: bool,
        walk: &mut Walk,
        stats: &mut Stats,
    ) -> Result<usize, RbError<K>> {
        let n = match node {
            None => {
                if let Some(depths) = stats.depths.as_mut() {
                    depths.sample(walk.depth);
                }
                return Ok(walk.nb);
            }
            Some(n) => n,
        };
        walk.count += 1;

        let nref = self.node(n);
        let red = !nref.is_black();
        if fromred && red {
            return Err(RbError::ConsecutiveReds);
        }

        if let Some(low) = walk.low {
            let lkey = &self.node(low).key;
            if self.cmp.compare(lkey, &nref.key) != Ordering::Less {
                return Err(RbError::SortError(nref.key.clone(), lkey.clone()));
            }
        }
        if let Some(high) = walk.high {
            let hkey = &self.node(high).key;
            if self.cmp.compare(&nref.key, hkey) != Ordering::Less {
                return Err(RbError::SortError(nref.key.clone(), hkey.clone()));
            }
        }

        for child in [nref.left, nref.right].iter().filter_map(|c| *c) {
            if self.node(child).parent != Some(n) {
                let err = format!("node {} not linked back to parent {}", child, n);
                return Err(RbError::BrokenLink(err));
            }
        }

        let (nb, depth, low, high) = (walk.nb, walk.depth, walk.low, walk.high);
        walk.nb = if red { nb } else { nb + 1 };
        walk.depth = depth + 1;

        walk.high = Some(n);
        let lblacks = self.validate_tree(nref.left, red, walk, stats)?;
        walk.high = high;
        walk.low = Some(n);
        let rblacks = self.validate_tree(nref.right, red, walk, stats)?;
        walk.low = low;

        walk.nb = nb;
        walk.depth = depth;

        if lblacks != rblacks {
            let err = format!("left: {} right: {}", lblacks, rblacks);
            return Err(RbError::UnbalancedBlacks(err));
        }
        Ok(lblacks)
    }

    //--------- fixup routines ----------------

    //  uncle red, recolor and move up:
    //
    //              (g)                      [G]
    //              / \                      / \
    //            [P] [U]        =>        (p) (u)
    //            /                        /
    //          [N]                      [N]
    //
    //  uncle black, straighten zig-zag and rotate at grand-parent:
    //
    //              (g)                      (p)
    //              / \                      / \
    //            [P] (u)        =>        [N] [G]
    //            /                              \
    //          [N]                              (u)
    //
    //  upper-case in [] is red, lower-case in () is black.
    fn insert_fixup(&mut self, mut n: usize) {
        loop {
            let parent = match self.parent(n) {
                None => {
                    self.node_mut(n).set_black();
                    break;
                }
                Some(parent) => parent,
            };
            if self.node(parent).is_black() {
                break;
            }

            // a red parent is never the root.
            let grand = match self.parent(parent) {
                Some(grand) => grand,
                None => panic!("insert_fixup(): red root, call the programmer"),
            };
            let uncle = self.sibling(parent);

            match uncle {
                Some(uncle) if !self.node(uncle).is_black() => {
                    trace!("{}: insert fixup, red uncle at {}", self.name, uncle);
                    self.node_mut(parent).set_black();
                    self.node_mut(uncle).set_black();
                    self.node_mut(grand).set_red();
                    n = grand;
                    continue;
                }
                _ => (),
            }

            let (n_left, p_left) = (self.is_left(n), self.is_left(parent));
            let parent = if !n_left && p_left {
                trace!("{}: insert fixup, zig-zag left at {}", self.name, parent);
                self.rotate_left(parent);
                mem::replace(&mut n, parent)
            } else if n_left && !p_left {
                trace!("{}: insert fixup, zig-zag right at {}", self.name, parent);
                self.rotate_right(parent);
                mem::replace(&mut n, parent)
            } else {
                parent
            };

            trace!("{}: insert fixup, rotate grand-parent {}", self.name, grand);
            self.node_mut(parent).set_black();
            self.node_mut(grand).set_red();
            if self.is_left(n) {
                self.rotate_right(grand);
            } else {
                self.rotate_left(grand);
            }
            break;
        }
    }

    // Restore the black count on `n`'s side of its parent, before the
    // black node `n` is unlinked from the tree. `n` itself is never
    // moved, only its ancestors and their other sub-trees are.
    fn delete_fixup(&mut self, mut n: usize) {
        loop {
            let parent = match self.parent(n) {
                None => break,
                Some(parent) => parent,
            };

            let mut sibling = self.sibling(n);
            if self.is_red(sibling) {
                trace!("{}: delete fixup, red sibling under {}", self.name, parent);
                if let Some(s) = sibling {
                    self.node_mut(s).set_black();
                }
                self.node_mut(parent).set_red();
                if self.is_left(n) {
                    self.rotate_left(parent);
                } else {
                    self.rotate_right(parent);
                }
                sibling = self.sibling(n);
                debug_assert!(
                    self.is_black(sibling),
                    "delete_fixup(): sibling is red after rotation"
                );
            }

            // black node `n` has black-height >= 1, so does its sibling.
            let s = match sibling {
                Some(s) => s,
                None => panic!("delete_fixup(): missing sibling, call the programmer"),
            };
            let (sleft, sright) = (self.node(s).left, self.node(s).right);

            if self.is_black(sleft) && self.is_black(sright) {
                self.node_mut(s).set_red();
                if self.node(parent).is_black() {
                    trace!("{}: delete fixup, push deficit to {}", self.name, parent);
                    n = parent;
                    continue;
                }
                trace!("{}: delete fixup, absorbed at {}", self.name, parent);
                self.node_mut(parent).set_black();
                break;
            }

            let n_left = self.is_left(n);
            let (near, far) = if n_left {
                (sleft, sright)
            } else {
                (sright, sleft)
            };
            let s = match near {
                Some(near) if self.is_black(far) => {
                    trace!("{}: delete fixup, straighten at {}", self.name, s);
                    self.node_mut(s).set_red();
                    self.node_mut(near).set_black();
                    if n_left {
                        self.rotate_right(s);
                    } else {
                        self.rotate_left(s);
                    }
                    near
                }
                _ => s,
            };

            trace!("{}: delete fixup, rotate parent {}", self.name, parent);
            let black = self.node(parent).is_black();
            self.node_mut(s).black = black;
            self.node_mut(parent).set_black();
            let far = if n_left {
                self.node(s).right
            } else {
                self.node(s).left
            };
            if let Some(far) = far {
                self.node_mut(far).set_black();
            }
            if n_left {
                self.rotate_left(parent);
            } else {
                self.rotate_right(parent);
            }
            break;
        }
    }

    //--------- rotation routines ----------------

    //              (i)                       (i)
    //               |                         |
    //              node                       x
    //              /  \                      / \
    //             /    \                    /   \
    //            /      \                  /     \
    //          left      x              node      xr
    //                   / \             /  \
    //                 xl   xr        left   xl
    //
    fn rotate_left(&mut self, node: usize) {
        let x = match self.node(node).right {
            Some(x) => x,
            None => panic!("rotate_left(): no right child, call the programmer"),
        };
        let parent = self.parent(node);
        self.replace_child(parent, node, Some(x));

        let xl = self.node(x).left;
        self.node_mut(node).right = xl;
        if let Some(xl) = xl {
            self.node_mut(xl).parent = Some(node);
        }

        self.node_mut(x).left = Some(node);
        self.node_mut(node).parent = Some(x);
    }

    //              (i)                       (i)
    //               |                         |
    //              node                       x
    //              /  \                      / \
    //             /    \                    /   \
    //            /      \                  /     \
    //           x       right            xl      node
    //          / \                               / \
    //        xl   xr                           xr  right
    //
    fn rotate_right(&mut self, node: usize) {
        let x = match self.node(node).left {
            Some(x) => x,
            None => panic!("rotate_right(): no left child, call the programmer"),
        };
        let parent = self.parent(node);
        self.replace_child(parent, node, Some(x));

        let xr = self.node(x).right;
        self.node_mut(node).left = xr;
        if let Some(xr) = xr {
            self.node_mut(xr).parent = Some(node);
        }

        self.node_mut(x).right = Some(node);
        self.node_mut(node).parent = Some(x);
    }

    // Link `new` in place of `old` under `parent`, or as root when
    // `parent` is None.
    fn replace_child(&mut self, parent: Option<usize>, old: usize, new: Option<usize>) {
        match parent {
            None => self.root = new,
            Some(p) => {
                let pref = self.node_mut(p);
                if pref.left == Some(old) {
                    pref.left = new;
                } else {
                    pref.right = new;
                }
            }
        }
        if let Some(new) = new {
            self.node_mut(new).parent = parent;
        }
    }

    //--------- arena routines ----------------

    // (arena slots, free list capacity)
    #[cfg(test)]
    pub(crate) fn arena_capacity(&self) -> (usize, usize) {
        (self.nodes.len(), self.free.capacity())
    }

    fn alloc(&mut self, node: Node<K, V>) -> Result<usize, RbError<K>> {
        if let Some(n) = self.free.pop() {
            self.nodes[n] = Some(node);
            return Ok(n);
        }

        // keep room in the free list for every slot, so that remove()
        // never allocates.
        let want = self.nodes.len() + 1 - self.free.len();
        #[cfg(test)]
        {
            if self.fail_alloc {
                return Err(RbError::OutOfMemory);
            }
        }
        let res = self.nodes.try_reserve(1);
        let res = res.and_then(|_| self.free.try_reserve(want));
        if let Err(err) = res {
            debug!("{}: node allocation failed, {}", self.name, err);
            return Err(RbError::OutOfMemory);
        }
        self.nodes.push(Some(node));
        Ok(self.nodes.len() - 1)
    }

    fn dealloc(&mut self, n: usize) -> Node<K, V> {
        match self.nodes[n].take() {
            Some(node) => {
                self.free.push(n);
                node
            }
            None => panic!("dealloc(): slot {} already free, call the programmer", n),
        }
    }

    fn swap_entries(&mut self, a: usize, b: usize) {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.nodes.split_at_mut(hi);
        match (head[lo].as_mut(), tail[0].as_mut()) {
            (Some(x), Some(y)) => {
                mem::swap(&mut x.key, &mut y.key);
                mem::swap(&mut x.value, &mut y.value);
            }
            _ => panic!("swap_entries(): free slot {}/{}, call the programmer", a, b),
        }
    }

    #[inline]
    fn node(&self, n: usize) -> &Node<K, V> {
        match self.nodes[n].as_ref() {
            Some(node) => node,
            None => panic!("node(): slot {} is free, call the programmer", n),
        }
    }

    #[inline]
    fn node_mut(&mut self, n: usize) -> &mut Node<K, V> {
        match self.nodes[n].as_mut() {
            Some(node) => node,
            None => panic!("node_mut(): slot {} is free, call the programmer", n),
        }
    }

    #[inline]
    fn parent(&self, n: usize) -> Option<usize> {
        self.node(n).parent
    }

    #[inline]
    fn is_left(&self, n: usize) -> bool {
        match self.parent(n) {
            Some(p) => self.node(p).left == Some(n),
            None => false,
        }
    }

    fn sibling(&self, n: usize) -> Option<usize> {
        let p = self.node(self.parent(n)?);
        if p.left == Some(n) {
            p.right
        } else {
            p.left
        }
    }

    #[inline]
    fn is_red(&self, n: Option<usize>) -> bool {
        n.map_or(false, |n| !self.node(n).is_black())
    }

    #[inline]
    fn is_black(&self, n: Option<usize>) -> bool {
        n.map_or(true, |n| self.node(n).is_black())
    }
}

impl<K, V, C> Drop for Rbtree<K, V, C> {
    fn drop(&mut self) {
        debug!("{}: dropping {} entries", self.name, self.n_count);
    }
}

/// Node corresponds to a single entry in Rbtree instance.
#[derive(Clone)]
struct Node<K, V> {
    key: K,
    value: V,
    black: bool,           // store: black or red
    parent: Option<usize>, // link: parent, None for root
    left: Option<usize>,   // link: left child
    right: Option<usize>,  // link: right child
}

// Primary operations on a single node.
impl<K, V> Node<K, V> {
    // CREATE operation, new nodes are red.
    fn new(key: K, value: V, parent: Option<usize>) -> Node<K, V> {
        Node {
            key,
            value,
            black: false,
            parent,
            left: None,
            right: None,
        }
    }

    #[inline]
    fn set_red(&mut self) {
        self.black = false
    }

    #[inline]
    fn set_black(&mut self) {
        self.black = true
    }

    #[inline]
    fn is_black(&self) -> bool {
        self.black
    }
}

/// Statistics on [`Rbtree`] tree. Serves two purpose:
///
/// * To get partial but quick statistics via [`Rbtree::stats`] method.
/// * To get full statisics via [`Rbtree::validate`] method.
#[derive(Default, Debug)]
pub struct Stats {
    entries: usize, // number of entries in the tree.
    node_size: usize,
    blacks: Option<usize>,
    depths: Option<Depth>,
}

impl Stats {
    fn new(entries: usize, node_size: usize) -> Stats {
        Stats {
            entries,
            node_size,
            blacks: Default::default(),
            depths: Default::default(),
        }
    }

    #[inline]
    fn set_blacks(&mut self, blacks: usize) {
        self.blacks = Some(blacks)
    }

    #[inline]
    fn set_depths(&mut self, depths: Depth) {
        self.depths = Some(depths)
    }

    /// Return number entries in [`Rbtree`] instance.
    #[inline]
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Return node-size, including over-head for `Rbtree<k,V>`. Although
    /// the node overhead is constant, the node size varies based on
    /// key and value types. EG:
    ///
    /// ```
    /// use rbtree_index::Rbtree;
    /// let index: Rbtree<u64, u64> = Rbtree::new("myinstance");
    ///
    /// // size of key: 8 bytes
    /// // size of value: 8 bytes
    /// // overhead is 56 bytes, color and three links.
    /// assert_eq!(index.stats().node_size(), 72);
    /// ```
    #[inline]
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    /// Return number of black nodes from root to leaf, on both left
    /// and right child.
    #[inline]
    pub fn blacks(&self) -> Option<usize> {
        self.blacks
    }

    /// Return [`Depth`] statistics.
    pub fn depths(&self) -> Option<Depth> {
        match self.depths.as_ref() {
            Some(depths) if depths.samples() > 0 => Some(depths.clone()),
            _ => None,
        }
    }
}
