//! Persistent ordered map
//!
//! [`AvlMap`] is an immutable, structurally shared AVL tree. Every
//! "mutation" returns a new map; the map it was derived from stays valid and
//! unchanged for anyone still holding it.
//!
//! # Sharing
//!
//! ```text
//!    before = {b, d, f}            after = before.add(e)
//!
//!          d                             d'
//!         / \                           / \
//!        b   f      ◄── shared ──      b   f'
//!                                         /
//!                                        e
//! ```
//!
//! Only the nodes on the path to the change (plus any rotated nodes) are
//! allocated. Untouched subtrees are shared through `Arc`, so cloning a map
//! (taking a snapshot) is O(1) and dropping the last owner of a subtree
//! releases it recursively.
//!
//! # Ownership policies
//!
//! Keys are deep-copied (`Clone`) into new nodes and destroyed with them.
//! Values are cloned when a node is rebuilt; for reference-counted values
//! this is an increment, and dropping a node releases its reference.

mod iter;
mod node;

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

pub use iter::{Iter, Keys, Values};

use node::Link;

/// Immutable, structurally shared AVL map
pub struct AvlMap<K, V> {
    root: Link<K, V>,
    len: usize,
}

impl<K, V> AvlMap<K, V> {
    /// Create an empty map
    pub const fn new() -> Self {
        Self { root: None, len: 0 }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the map has no entries
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Height of the tree (0 for an empty map)
    pub fn height(&self) -> u8 {
        node::height(&self.root)
    }

    /// Whether two maps share the same root.
    ///
    /// Identical roots imply identical contents. This is the identity check
    /// used to detect that a snapshot is still current.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        match (&a.root, &b.root) {
            (Some(x), Some(y)) => Arc::ptr_eq(x, y),
            (None, None) => true,
            _ => false,
        }
    }

    /// In-order iterator over the entries
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(&self.root, self.len)
    }

    /// In-order iterator over the keys
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys(self.iter())
    }

    /// In-order iterator over the values
    pub fn values(&self) -> Values<'_, K, V> {
        Values(self.iter())
    }

    /// Look up the value stored for `key`
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        node::get(&self.root, key)
    }

    /// Whether `key` is present
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).is_some()
    }
}

impl<K: Ord + Clone, V: Clone> AvlMap<K, V> {
    /// Return a new map with `key` mapped to `value`.
    ///
    /// An existing mapping for `key` is replaced in the new map.
    #[must_use]
    pub fn add(&self, key: K, value: V) -> Self {
        let (root, added) = node::insert(&self.root, key, value);
        Self {
            root: Some(root),
            len: self.len + usize::from(added),
        }
    }

    /// Return a new map without `key`, along with the removed value.
    ///
    /// Returns `None` if `key` is not present.
    #[must_use]
    pub fn remove<Q>(&self, key: &Q) -> Option<(Self, V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let (root, removed) = node::remove(&self.root, key)?;
        let map = Self {
            root,
            len: self.len - 1,
        };
        Some((map, removed))
    }
}

impl<K, V> Clone for AvlMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
        }
    }
}

impl<K, V> Default for AvlMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for AvlMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V> IntoIterator for &'a AvlMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Ord + Clone, V: Clone> FromIterator<(K, V)> for AvlMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |map, (key, value)| map.add(key, value))
    }
}
