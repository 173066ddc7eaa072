//! Optimistic mutations.
//!
//! Every reaction, comment and view follows one path: [`PendingMutation::apply`]
//! writes the local post-image and returns a record of what changed,
//! [`PendingMutation::remote_op`] says what to ask the store, and the store's
//! answer goes through either [`PendingMutation::settle`] or
//! [`PendingMutation::revert`].
//!
//! [`MutationGate`] keeps at most one mutation in flight per
//! `(status, kind)` lane; later requests on a busy lane wait in FIFO order.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{Comment, ItemCounters, Reaction, StatusId, StatusItem};
use crate::state::CommentThread;
use crate::store::StatusStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    Reaction,
    Comment,
    View,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MutationKind::Reaction => "reaction",
            MutationKind::Comment => "comment",
            MutationKind::View => "view",
        })
    }
}

/// What the viewer was asked to do to a status.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationRequest {
    /// Toggle/replace the viewer's reaction.
    React(Reaction),
    /// Post a comment (already validated and trimmed).
    Comment(String),
    View,
}

impl MutationRequest {
    pub fn kind(&self) -> MutationKind {
        match self {
            MutationRequest::React(_) => MutationKind::Reaction,
            MutationRequest::Comment(_) => MutationKind::Comment,
            MutationRequest::View => MutationKind::View,
        }
    }
}

/// An applied optimistic change and the pre-image needed to undo it.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingMutation {
    Reaction {
        status_id: StatusId,
        before: Option<Reaction>,
        after: Option<Reaction>,
    },
    Comment {
        status_id: StatusId,
        placeholder_id: String,
        text: String,
    },
    View {
        status_id: StatusId,
    },
}

/// What the store sent back for a successful mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// Reaction/view acknowledged, with fresh counters if the store has them.
    Counters(Option<ItemCounters>),
    /// The stored comment, carrying the server id, author and timestamp.
    Comment(Comment),
}

/// Remote call backing a pending mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOp {
    SetReaction(Reaction),
    ClearReaction,
    CreateComment(String),
    RecordView,
}

impl RemoteOp {
    pub async fn execute(
        self,
        store: &dyn StatusStore,
        status_id: &StatusId,
    ) -> Result<Settlement, StoreError> {
        match self {
            RemoteOp::SetReaction(reaction) => store
                .set_reaction(status_id, reaction)
                .await
                .map(Settlement::Counters),
            RemoteOp::ClearReaction => store.clear_reaction(status_id).await.map(Settlement::Counters),
            RemoteOp::CreateComment(text) => store
                .create_comment(status_id, &text)
                .await
                .map(Settlement::Comment),
            RemoteOp::RecordView => store.record_view(status_id).await.map(Settlement::Counters),
        }
    }
}

fn reaction_delta(before: Option<Reaction>, after: Option<Reaction>) -> i64 {
    match (before, after) {
        (None, Some(_)) => 1,
        (Some(_), None) => -1,
        _ => 0,
    }
}

fn shift(count: &mut u32, delta: i64) {
    *count = (i64::from(*count) + delta).clamp(0, i64::from(u32::MAX)) as u32;
}

impl PendingMutation {
    /// Apply `request` to the item (and its comment thread) locally.
    ///
    /// Returns `None` when there is nothing to do, e.g. a view for a status
    /// already marked viewed.
    pub fn apply(
        request: &MutationRequest,
        item: &mut StatusItem,
        thread: &mut CommentThread,
        placeholder_seq: u64,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let status_id = item.id.clone();
        let pending = match request {
            MutationRequest::React(chosen) => {
                let before = item.viewer_reaction;
                let after = if before == Some(*chosen) { None } else { Some(*chosen) };
                PendingMutation::Reaction {
                    status_id,
                    before,
                    after,
                }
            }
            MutationRequest::Comment(text) => PendingMutation::Comment {
                status_id,
                placeholder_id: format!("local-{placeholder_seq}"),
                text: text.clone(),
            },
            MutationRequest::View => {
                if item.is_viewed {
                    return None;
                }
                PendingMutation::View { status_id }
            }
        };
        pending.forward(item, thread, placeholder_seq, now);
        Some(pending)
    }

    fn forward(
        &self,
        item: &mut StatusItem,
        thread: &mut CommentThread,
        placeholder_seq: u64,
        now: DateTime<Utc>,
    ) {
        match self {
            PendingMutation::Reaction { before, after, .. } => {
                item.viewer_reaction = *after;
                shift(&mut item.reaction_count, reaction_delta(*before, *after));
            }
            PendingMutation::Comment {
                status_id, text, ..
            } => {
                thread.comments.insert(
                    0,
                    Comment::placeholder(placeholder_seq, status_id.clone(), text, now),
                );
                shift(&mut item.comment_count, 1);
            }
            PendingMutation::View { .. } => {
                item.is_viewed = true;
                shift(&mut item.view_count, 1);
            }
        }
    }

    /// Undo the local change after the store rejected it.
    ///
    /// Viewer-scoped fields go back to the pre-image; counters have the
    /// applied delta taken back out, so reconciliations that landed in
    /// between are not lost.
    pub fn revert(&self, item: &mut StatusItem, thread: &mut CommentThread) {
        match self {
            PendingMutation::Reaction { before, after, .. } => {
                item.viewer_reaction = *before;
                shift(&mut item.reaction_count, -reaction_delta(*before, *after));
            }
            PendingMutation::Comment { placeholder_id, .. } => {
                thread.comments.retain(|c| &c.id != placeholder_id);
                shift(&mut item.comment_count, -1);
            }
            PendingMutation::View { .. } => {
                item.is_viewed = false;
                shift(&mut item.view_count, -1);
            }
        }
    }

    /// Re-apply this mutation's counter delta on top of authoritative
    /// counters that were computed before the store saw it.
    pub fn reapply_counters(&self, item: &mut StatusItem) {
        match self {
            PendingMutation::Reaction { before, after, .. } => {
                shift(&mut item.reaction_count, reaction_delta(*before, *after));
            }
            PendingMutation::Comment { .. } => shift(&mut item.comment_count, 1),
            PendingMutation::View { .. } => shift(&mut item.view_count, 1),
        }
    }

    /// Fold the store's answer into local state.
    pub fn settle(&self, settlement: Settlement, item: &mut StatusItem, thread: &mut CommentThread) {
        match (self, settlement) {
            (_, Settlement::Counters(Some(counters))) => item.apply_counters(counters),
            (_, Settlement::Counters(None)) => {}
            (PendingMutation::Comment { placeholder_id, .. }, Settlement::Comment(mut stored)) => {
                stored.pending = false;
                match thread.comments.iter().position(|c| &c.id == placeholder_id) {
                    Some(i) => thread.comments[i] = stored,
                    None => thread.comments.insert(0, stored),
                }
                // The server list now has one more entry ahead of our cursor.
                thread.next_offset += 1;
            }
            (_, Settlement::Comment(_)) => {}
        }
    }

    pub fn remote_op(&self) -> RemoteOp {
        match self {
            PendingMutation::Reaction {
                after: Some(reaction),
                ..
            } => RemoteOp::SetReaction(*reaction),
            PendingMutation::Reaction { after: None, .. } => RemoteOp::ClearReaction,
            PendingMutation::Comment { text, .. } => RemoteOp::CreateComment(text.clone()),
            PendingMutation::View { .. } => RemoteOp::RecordView,
        }
    }

    pub fn kind(&self) -> MutationKind {
        match self {
            PendingMutation::Reaction { .. } => MutationKind::Reaction,
            PendingMutation::Comment { .. } => MutationKind::Comment,
            PendingMutation::View { .. } => MutationKind::View,
        }
    }

    pub fn status_id(&self) -> &StatusId {
        match self {
            PendingMutation::Reaction { status_id, .. }
            | PendingMutation::Comment { status_id, .. }
            | PendingMutation::View { status_id } => status_id,
        }
    }
}

/// Per-`(status, kind)` serialization of in-flight mutations.
///
/// A lane exists while one of its mutations is in flight; its queue holds
/// requests that arrived meanwhile.
#[derive(Debug, Default)]
pub struct MutationGate {
    lanes: HashMap<(StatusId, MutationKind), VecDeque<MutationRequest>>,
}

impl MutationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the request back if its lane is free (the lane is now busy
    /// and the caller must start it), or queues it and returns `None`.
    pub fn admit(&mut self, status_id: &StatusId, request: MutationRequest) -> Option<MutationRequest> {
        let key = (status_id.clone(), request.kind());
        match self.lanes.get_mut(&key) {
            Some(queue) => {
                queue.push_back(request);
                None
            }
            None => {
                self.lanes.insert(key, VecDeque::new());
                Some(request)
            }
        }
    }

    /// The in-flight mutation on this lane finished. Returns the next queued
    /// request (lane stays busy) or frees the lane.
    pub fn release(&mut self, status_id: &StatusId, kind: MutationKind) -> Option<MutationRequest> {
        let key = (status_id.clone(), kind);
        let next = self.lanes.get_mut(&key).and_then(VecDeque::pop_front);
        if next.is_none() {
            self.lanes.remove(&key);
        }
        next
    }

    pub fn is_busy(&self, status_id: &StatusId, kind: MutationKind) -> bool {
        self.lanes.contains_key(&(status_id.clone(), kind))
    }

    pub fn queued(&self, status_id: &StatusId, kind: MutationKind) -> usize {
        self.lanes
            .get(&(status_id.clone(), kind))
            .map_or(0, VecDeque::len)
    }

    pub fn is_idle(&self) -> bool {
        self.lanes.is_empty()
    }
}
