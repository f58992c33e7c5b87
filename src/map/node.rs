//! AVL tree nodes
//!
//! Nodes are never mutated after construction. Every structural change
//! builds new nodes along the affected path and shares the untouched
//! subtrees by `Arc`.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::sync::Arc;

/// Owned link to a child subtree
pub(crate) type Link<K, V> = Option<Arc<Node<K, V>>>;

/// An immutable tree node
#[derive(Debug)]
pub(crate) struct Node<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) left: Link<K, V>,
    pub(crate) right: Link<K, V>,
    pub(crate) height: u8,
}

/// Height of a subtree (0 for empty)
pub(crate) fn height<K, V>(link: &Link<K, V>) -> u8 {
    link.as_ref().map_or(0, |n| n.height)
}

impl<K, V> Node<K, V> {
    /// Build a node, computing its height from the children
    fn new(key: K, value: V, left: Link<K, V>, right: Link<K, V>) -> Arc<Self> {
        let height = 1 + height(&left).max(height(&right));
        Arc::new(Self {
            key,
            value,
            left,
            right,
            height,
        })
    }
}

/// Build a node from parts, restoring the AVL condition with at most two
/// rotations. Both children must already be balanced and differ in height
/// by at most two.
fn rebalance<K: Clone, V: Clone>(
    key: K,
    value: V,
    left: Link<K, V>,
    right: Link<K, V>,
) -> Arc<Node<K, V>> {
    let lh = height(&left);
    let rh = height(&right);

    if lh > rh + 1 {
        let Some(l) = left else { unreachable!("left taller than right") };
        if height(&l.left) >= height(&l.right) {
            // Single right rotation
            let new_right = Node::new(key, value, l.right.clone(), right);
            Node::new(l.key.clone(), l.value.clone(), l.left.clone(), Some(new_right))
        } else {
            // Left-right double rotation
            let Some(lr) = &l.right else { unreachable!("inner grandchild is taller") };
            let new_left =
                Node::new(l.key.clone(), l.value.clone(), l.left.clone(), lr.left.clone());
            let new_right = Node::new(key, value, lr.right.clone(), right);
            Node::new(lr.key.clone(), lr.value.clone(), Some(new_left), Some(new_right))
        }
    } else if rh > lh + 1 {
        let Some(r) = right else { unreachable!("right taller than left") };
        if height(&r.right) >= height(&r.left) {
            // Single left rotation
            let new_left = Node::new(key, value, left, r.left.clone());
            Node::new(r.key.clone(), r.value.clone(), Some(new_left), r.right.clone())
        } else {
            // Right-left double rotation
            let Some(rl) = &r.left else { unreachable!("inner grandchild is taller") };
            let new_left = Node::new(key, value, left, rl.left.clone());
            let new_right =
                Node::new(r.key.clone(), r.value.clone(), rl.right.clone(), r.right.clone());
            Node::new(rl.key.clone(), rl.value.clone(), Some(new_left), Some(new_right))
        }
    } else {
        Node::new(key, value, left, right)
    }
}

/// Insert or replace `key`, returning the new subtree root and whether the
/// key was new
pub(crate) fn insert<K: Ord + Clone, V: Clone>(
    link: &Link<K, V>,
    key: K,
    value: V,
) -> (Arc<Node<K, V>>, bool) {
    let Some(node) = link else {
        return (Node::new(key, value, None, None), true);
    };

    match key.cmp(&node.key) {
        Ordering::Equal => (Node::new(key, value, node.left.clone(), node.right.clone()), false),
        Ordering::Less => {
            let (left, added) = insert(&node.left, key, value);
            let root =
                rebalance(node.key.clone(), node.value.clone(), Some(left), node.right.clone());
            (root, added)
        }
        Ordering::Greater => {
            let (right, added) = insert(&node.right, key, value);
            let root =
                rebalance(node.key.clone(), node.value.clone(), node.left.clone(), Some(right));
            (root, added)
        }
    }
}

/// Remove `key`, returning the new subtree and the removed value.
///
/// Returns `None` when the key is absent so callers can keep sharing the
/// original subtree.
pub(crate) fn remove<K, V, Q>(link: &Link<K, V>, key: &Q) -> Option<(Link<K, V>, V)>
where
    K: Ord + Clone + Borrow<Q>,
    V: Clone,
    Q: Ord + ?Sized,
{
    let node = link.as_ref()?;

    match key.cmp(node.key.borrow()) {
        Ordering::Less => {
            let (left, removed) = remove(&node.left, key)?;
            let root = rebalance(node.key.clone(), node.value.clone(), left, node.right.clone());
            Some((Some(root), removed))
        }
        Ordering::Greater => {
            let (right, removed) = remove(&node.right, key)?;
            let root = rebalance(node.key.clone(), node.value.clone(), node.left.clone(), right);
            Some((Some(root), removed))
        }
        Ordering::Equal => {
            let removed = node.value.clone();
            let replacement = match (&node.left, &node.right) {
                (None, right) => right.clone(),
                (left, None) => left.clone(),
                (left, Some(right)) => {
                    let (succ_key, succ_value, rest) = remove_min(right);
                    Some(rebalance(succ_key, succ_value, left.clone(), rest))
                }
            };
            Some((replacement, removed))
        }
    }
}

/// Detach the leftmost entry of a non-empty subtree
fn remove_min<K: Clone, V: Clone>(node: &Arc<Node<K, V>>) -> (K, V, Link<K, V>) {
    match &node.left {
        None => (node.key.clone(), node.value.clone(), node.right.clone()),
        Some(left) => {
            let (key, value, rest) = remove_min(left);
            let root = rebalance(node.key.clone(), node.value.clone(), rest, node.right.clone());
            (key, value, Some(root))
        }
    }
}

/// Look up `key` without allocating
pub(crate) fn get<'a, K, V, Q>(mut link: &'a Link<K, V>, key: &Q) -> Option<&'a V>
where
    K: Borrow<Q>,
    Q: Ord + ?Sized,
{
    while let Some(node) = link {
        match key.cmp(node.key.borrow()) {
            Ordering::Less => link = &node.left,
            Ordering::Greater => link = &node.right,
            Ordering::Equal => return Some(&node.value),
        }
    }
    None
}

/// Check ordering, stored heights and the AVL balance condition
#[cfg(test)]
pub(crate) fn check_invariants<K: Ord, V>(link: &Link<K, V>) -> u8 {
    let Some(node) = link else { return 0 };

    if let Some(left) = &node.left {
        assert!(left.key < node.key, "left child out of order");
    }
    if let Some(right) = &node.right {
        assert!(right.key > node.key, "right child out of order");
    }

    let lh = check_invariants(&node.left);
    let rh = check_invariants(&node.right);
    assert_eq!(node.height, 1 + lh.max(rh), "stale height");
    assert!(lh.abs_diff(rh) <= 1, "unbalanced node");
    node.height
}
