use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tracing::debug;

use super::StatusStore;
use crate::error::StoreError;
use crate::model::{AuthorRef, Comment, CommentPage, ItemCounters, Reaction, StatusId, StatusItem};

/// Store endpoints, for failure injection and call assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListTimeline,
    CreateComment,
    ListComments,
    SetReaction,
    ClearReaction,
    RecordView,
}

#[derive(Default)]
struct Inner {
    timelines: HashMap<String, Vec<StatusId>>,
    items: HashMap<StatusId, StatusItem>,
    /// Newest first.
    comments: HashMap<StatusId, Vec<Comment>>,
    failing: HashSet<StoreOp>,
    calls: Vec<StoreOp>,
    next_comment: u64,
}

/// In-process [`StatusStore`] for a single viewer.
///
/// Keeps the server's view of counters and the viewer's reaction/viewed
/// flags. Tests can make endpoints fail ([`fail`](Self::fail)) or hold
/// every call in flight until [`release`](Self::release).
pub struct MemoryStatusStore {
    viewer: AuthorRef,
    inner: Mutex<Inner>,
    held: watch::Sender<bool>,
    report_counters: AtomicBool,
}

impl MemoryStatusStore {
    /// `viewer` is the identity attached to comments it creates.
    pub fn new(viewer: AuthorRef) -> Self {
        let (held, _) = watch::channel(false);
        Self {
            viewer,
            inner: Mutex::new(Inner::default()),
            held,
            report_counters: AtomicBool::new(true),
        }
    }

    /// Add a status to the end of its author's timeline.
    pub fn insert_item(&self, item: StatusItem) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .timelines
            .entry(item.author_id.clone())
            .or_default()
            .push(item.id.clone());
        inner.items.insert(item.id.clone(), item);
    }

    /// Add an existing (older) comment below those already stored.
    pub fn insert_comment(&self, comment: Comment) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .comments
            .entry(comment.status_id.clone())
            .or_default()
            .push(comment);
    }

    /// Server copy of a status.
    pub fn item(&self, id: &StatusId) -> Option<StatusItem> {
        self.inner.lock().unwrap().items.get(id).cloned()
    }

    pub fn comments(&self, id: &StatusId) -> Vec<Comment> {
        let inner = self.inner.lock().unwrap();
        inner.comments.get(id).cloned().unwrap_or_default()
    }

    pub fn fail(&self, op: StoreOp) {
        self.inner.lock().unwrap().failing.insert(op);
    }

    pub fn recover(&self, op: StoreOp) {
        self.inner.lock().unwrap().failing.remove(&op);
    }

    /// Park every subsequent call until `release`.
    pub fn hold(&self) {
        self.held.send_replace(true);
    }

    pub fn release(&self) {
        self.held.send_replace(false);
    }

    /// Whether mutation endpoints answer with counters (default) or empty.
    pub fn set_report_counters(&self, report: bool) {
        self.report_counters.store(report, Ordering::Relaxed);
    }

    /// Every call received, in arrival order.
    pub fn calls(&self) -> Vec<StoreOp> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, op: StoreOp) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| **c == op)
            .count()
    }

    /// Record the call, wait out any hold, then apply failure injection.
    async fn enter(&self, op: StoreOp) -> Result<(), StoreError> {
        self.inner.lock().unwrap().calls.push(op);
        let mut held = self.held.subscribe();
        // The sender lives in `self`, so this only ends once released.
        let _ = held.wait_for(|held| !*held).await;
        if self.inner.lock().unwrap().failing.contains(&op) {
            debug!("memory store: injected failure for {op:?}");
            return Err(StoreError::Network(format!("{op:?} unavailable")));
        }
        Ok(())
    }

    fn counters(&self, item: &StatusItem) -> Option<ItemCounters> {
        self.report_counters
            .load(Ordering::Relaxed)
            .then(|| item.counters())
    }
}

fn not_found(id: &StatusId) -> StoreError {
    StoreError::NotFound(format!("status {id}"))
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn list_timeline_items(&self, author_id: &str) -> Result<Vec<StatusItem>, StoreError> {
        self.enter(StoreOp::ListTimeline).await?;
        let now = Utc::now();
        let inner = self.inner.lock().unwrap();
        let ids = inner.timelines.get(author_id).cloned().unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| inner.items.get(id))
            .filter(|item| !item.is_expired(now))
            .cloned()
            .collect())
    }

    async fn create_comment(&self, status_id: &StatusId, text: &str) -> Result<Comment, StoreError> {
        self.enter(StoreOp::CreateComment).await?;
        let mut inner = self.inner.lock().unwrap();
        let item = inner.items.get_mut(status_id).ok_or_else(|| not_found(status_id))?;
        item.comment_count += 1;

        inner.next_comment += 1;
        let comment = Comment {
            id: format!("c{}", inner.next_comment),
            status_id: status_id.clone(),
            author: Some(self.viewer.clone()),
            text: text.to_string(),
            created_at: Utc::now(),
            pending: false,
        };
        inner
            .comments
            .entry(status_id.clone())
            .or_default()
            .insert(0, comment.clone());
        Ok(comment)
    }

    async fn list_comments(
        &self,
        status_id: &StatusId,
        limit: usize,
        offset: usize,
    ) -> Result<CommentPage, StoreError> {
        self.enter(StoreOp::ListComments).await?;
        let inner = self.inner.lock().unwrap();
        if !inner.items.contains_key(status_id) {
            return Err(not_found(status_id));
        }
        let all = inner.comments.get(status_id).map(Vec::as_slice).unwrap_or_default();
        let comments: Vec<Comment> = all.iter().skip(offset).take(limit).cloned().collect();
        Ok(CommentPage {
            has_more: offset + comments.len() < all.len(),
            comments,
        })
    }

    async fn set_reaction(
        &self,
        status_id: &StatusId,
        reaction: Reaction,
    ) -> Result<Option<ItemCounters>, StoreError> {
        self.enter(StoreOp::SetReaction).await?;
        let mut inner = self.inner.lock().unwrap();
        let item = inner.items.get_mut(status_id).ok_or_else(|| not_found(status_id))?;
        if item.viewer_reaction.is_none() {
            item.reaction_count += 1;
        }
        item.viewer_reaction = Some(reaction);
        Ok(self.counters(item))
    }

    async fn clear_reaction(&self, status_id: &StatusId) -> Result<Option<ItemCounters>, StoreError> {
        self.enter(StoreOp::ClearReaction).await?;
        let mut inner = self.inner.lock().unwrap();
        let item = inner.items.get_mut(status_id).ok_or_else(|| not_found(status_id))?;
        if item.viewer_reaction.take().is_some() {
            item.reaction_count = item.reaction_count.saturating_sub(1);
        }
        Ok(self.counters(item))
    }

    async fn record_view(&self, status_id: &StatusId) -> Result<Option<ItemCounters>, StoreError> {
        self.enter(StoreOp::RecordView).await?;
        let mut inner = self.inner.lock().unwrap();
        let item = inner.items.get_mut(status_id).ok_or_else(|| not_found(status_id))?;
        if !item.is_viewed {
            item.is_viewed = true;
            item.view_count += 1;
        }
        Ok(self.counters(item))
    }
}
