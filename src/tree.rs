use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{Comment, Id};

/// A comment together with the replies that point at it.
///
/// Serialization nests once per level; writes cap the nesting at
/// [`MAX_THREAD_DEPTH`](crate::repo::MAX_THREAD_DEPTH).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommentNode {
    pub id: Id,
    pub post_id: Id,
    pub uid: Id,
    pub username: String,
    pub text: String,
    pub date: DateTime<Utc>,
    pub parent_comment_id: Option<Id>,
    pub replies: Vec<CommentNode>,
}

impl From<Comment> for CommentNode {
    fn from(c: Comment) -> Self {
        CommentNode {
            id: c.id,
            post_id: c.post_id,
            uid: c.uid,
            username: c.username,
            text: c.text,
            date: c.date,
            parent_comment_id: c.parent_comment_id,
            replies: Vec::new(),
        }
    }
}

// Unlinks replies onto a heap stack so dropping a deep chain stays flat.
impl Drop for CommentNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.replies);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.replies);
        }
    }
}

/// Materialize a flat, ordered list of comment rows into a reply forest.
///
/// Siblings keep the relative order they had in `rows`. A row whose
/// `parent_comment_id` does not resolve to another row in the input is
/// dropped: it is neither attached nor promoted to a root. Rows caught in a
/// parent cycle are unreachable from any root and are dropped the same way.
///
/// Runs without recursion, so arbitrarily deep reply chains are fine here.
pub fn build_comment_tree(rows: Vec<Comment>) -> Vec<CommentNode> {
    let known: HashSet<Id> = rows.iter().map(|c| c.id).collect();

    let mut roots = Vec::new();
    let mut children: HashMap<Id, Vec<usize>> = HashMap::new();
    for (idx, c) in rows.iter().enumerate() {
        match c.parent_comment_id {
            None => roots.push(idx),
            Some(parent) if known.contains(&parent) => children.entry(parent).or_default().push(idx),
            Some(parent) => {
                tracing::warn!(comment_id = c.id, parent_id = parent, "dropping reply to unknown parent comment");
            }
        }
    }

    // pre-order walk from the roots; every reachable row is visited once
    let mut visited = vec![false; rows.len()];
    let mut order = Vec::with_capacity(rows.len());
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(idx) = stack.pop() {
        if std::mem::replace(&mut visited[idx], true) {
            continue;
        }
        order.push(idx);
        if let Some(kids) = children.get(&rows[idx].id) {
            stack.extend(kids.iter().rev().copied());
        }
    }

    // children sit after their parent in pre-order, so walking it backwards
    // finishes every reply before the comment it answers
    let mut slots: Vec<Option<Comment>> = rows.into_iter().map(Some).collect();
    let mut built: Vec<Option<CommentNode>> = std::iter::repeat_with(|| None).take(slots.len()).collect();
    for &idx in order.iter().rev() {
        let Some(row) = slots[idx].take() else { continue };
        let mut node = CommentNode::from(row);
        if let Some(kids) = children.get(&node.id) {
            node.replies = kids.iter().filter_map(|&k| built[k].take()).collect();
        }
        built[idx] = Some(node);
    }

    roots.into_iter().filter_map(|idx| built[idx].take()).collect()
}
