use std::collections::HashMap;

use serde::Serialize;

use crate::models::comment::{Comment, CommentResponse};

/// Anything that can be placed in a reply tree.
pub trait Threaded {
    fn thread_id(&self) -> i64;
    fn thread_parent_id(&self) -> Option<i64>;
}

impl Threaded for Comment {
    fn thread_id(&self) -> i64 {
        self.id
    }

    fn thread_parent_id(&self) -> Option<i64> {
        self.parent_id
    }
}

impl Threaded for CommentResponse {
    fn thread_id(&self) -> i64 {
        self.id
    }

    fn thread_parent_id(&self) -> Option<i64> {
        self.parent_id
    }
}

/// Which entries of the flat list start a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadRoots {
    /// Every entry without a parent (whole-event listing).
    TopLevel,
    /// Only the entry with this id (single-thread fetch).
    Comment(i64),
}

/// One comment with its direct replies, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadNode<T> {
    #[serde(flatten)]
    pub item: T,
    pub replies: Vec<ThreadNode<T>>,
}

impl<T> ThreadNode<T> {
    /// Number of nodes in this subtree, itself included.
    pub fn node_count(&self) -> usize {
        1 + self.replies.iter().map(ThreadNode::node_count).sum::<usize>()
    }
}

/// Reshapes a chronologically ordered flat list into nested reply trees.
///
/// The list is used as an arena: one pass indexes every entry by id, a second
/// pass records each entry under its parent. Sibling order is the input order.
/// Entries whose parent is missing from the input are returned as extra roots
/// instead of being dropped.
pub fn build_threads<T: Threaded>(items: Vec<T>, roots: ThreadRoots) -> Vec<ThreadNode<T>> {
    let mut index = HashMap::with_capacity(items.len());
    for (pos, item) in items.iter().enumerate() {
        index.insert(item.thread_id(), pos);
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); items.len()];
    let mut root_positions = Vec::new();

    for (pos, item) in items.iter().enumerate() {
        let is_root = match roots {
            ThreadRoots::TopLevel => item.thread_parent_id().is_none(),
            ThreadRoots::Comment(id) => item.thread_id() == id,
        };
        if is_root {
            root_positions.push(pos);
            continue;
        }

        match item.thread_parent_id().and_then(|parent| index.get(&parent)) {
            Some(&parent) if parent != pos => children[parent].push(pos),
            _ => {
                tracing::debug!(
                    comment_id = item.thread_id(),
                    parent_id = ?item.thread_parent_id(),
                    "Parent not in result set, presenting comment as a root"
                );
                root_positions.push(pos);
            }
        }
    }

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut forest: Vec<ThreadNode<T>> = root_positions
        .into_iter()
        .filter_map(|pos| materialize(pos, &mut slots, &children))
        .collect();

    // Whatever is left hangs off a parent cycle.
    for pos in 0..slots.len() {
        if let Some(node) = materialize(pos, &mut slots, &children) {
            forest.push(node);
        }
    }

    forest
}

/// Moves the entry at `pos` and its descendants out of the arena.
/// Recursion is bounded by the tree height; taken slots stop cycles.
fn materialize<T>(
    pos: usize,
    slots: &mut [Option<T>],
    children: &[Vec<usize>],
) -> Option<ThreadNode<T>> {
    let item = slots[pos].take()?;
    let replies = children[pos]
        .iter()
        .filter_map(|&child| materialize(child, slots, children))
        .collect();

    Some(ThreadNode { item, replies })
}
