//! Observable viewer state.
//!
//! The viewer loop is the only writer. The presentation layer reads with
//! `get(path)` or registers `subscribe(pattern, handler)` and repaints
//! from the notifications. Paths:
//!
//! - `viewer/playback`: [`PlaybackSnapshot`]
//! - `viewer/items/{id}`: latest [`StatusItem`]
//! - `viewer/comments/{id}`: [`CommentThread`]
//! - `viewer/notice`: latest [`ViewerNotice`]
//! - `viewer/load`: [`LoadState`]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::ViewerError;
use crate::model::{AuthorRef, Comment, StatusId, StatusItem};
use crate::pause::PauseReason;
use crate::playback::Phase;
use crate::topic::Topic;

pub const ITEMS_PREFIX: &str = "viewer/items";
pub const COMMENTS_PREFIX: &str = "viewer/comments";

pub fn item_path(id: &StatusId) -> String {
    format!("{ITEMS_PREFIX}/{id}")
}

/// What the presentation layer repaints the viewer from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorRef>,
    pub current_index: usize,
    pub len: usize,
    /// Current item progress in `[0, 1]`.
    pub progress: f32,
    pub is_paused: bool,
    pub pause_reasons: Vec<PauseReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_item: Option<StatusItem>,
}

impl PlaybackSnapshot {
    pub const PATH: &'static str = "viewer/playback";

    pub fn idle(phase: Phase) -> Self {
        Self {
            phase,
            author: None,
            current_index: 0,
            len: 0,
            progress: 0.0,
            is_paused: false,
            pause_reasons: Vec::new(),
            current_item: None,
        }
    }
}

/// Comments loaded for one status, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThread {
    pub status_id: StatusId,
    pub comments: Vec<Comment>,
    pub has_more: bool,
    pub loading: bool,
    /// At least one page has been fetched.
    pub fetched: bool,
    /// Server-side offset of the next page.
    pub next_offset: usize,
}

impl CommentThread {
    pub fn new(status_id: StatusId) -> Self {
        Self {
            status_id,
            comments: Vec::new(),
            has_more: true,
            loading: false,
            fetched: false,
            next_offset: 0,
        }
    }

    pub fn path(status_id: &StatusId) -> String {
        format!("{COMMENTS_PREFIX}/{status_id}")
    }
}

/// Transient, user-facing message (toast). `code` doubles as the
/// translation key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerNotice {
    /// Increases with every notice so repeats are distinguishable.
    pub seq: u64,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_id: Option<StatusId>,
}

impl ViewerNotice {
    pub const PATH: &'static str = "viewer/notice";

    pub fn from_error(seq: u64, error: &ViewerError, status_id: Option<StatusId>) -> Self {
        Self {
            seq,
            code: error.error_code().to_string(),
            message: error.to_string(),
            status_id,
        }
    }
}

/// Remote timeline fetch progress for `open_author`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum LoadState {
    Idle,
    Loading { author: AuthorRef },
    Loaded { author: AuthorRef },
    Failed { author: AuthorRef, message: String },
}

impl LoadState {
    pub const PATH: &'static str = "viewer/load";
}

/// A value stored at a viewer path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ViewerState {
    Playback(PlaybackSnapshot),
    Item(StatusItem),
    Comments(CommentThread),
    Notice(ViewerNotice),
    Load(LoadState),
}

impl ViewerState {
    pub fn as_playback(&self) -> Option<&PlaybackSnapshot> {
        match self {
            ViewerState::Playback(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_item(&self) -> Option<&StatusItem> {
        match self {
            ViewerState::Item(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_comments(&self) -> Option<&CommentThread> {
        match self {
            ViewerState::Comments(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_notice(&self) -> Option<&ViewerNotice> {
        match self {
            ViewerState::Notice(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_load(&self) -> Option<&LoadState> {
        match self {
            ViewerState::Load(v) => Some(v),
            _ => None,
        }
    }
}

/// Callback type for state change notifications.
pub type ChangeHandler = Arc<dyn Fn(&str, &ViewerState) + Send + Sync>;

/// Handle returned by [`ViewerStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct HandlerEntry {
    id: SubscriptionId,
    topic: Topic,
    handler: ChangeHandler,
}

/// Path-keyed state with pattern subscriptions.
///
/// Handlers run synchronously on the writer's thread, after the new value
/// is visible to `get`, and outside any store lock (a handler may read the
/// store).
pub struct ViewerStore {
    values: RwLock<BTreeMap<String, Arc<ViewerState>>>,
    handlers: RwLock<Vec<HandlerEntry>>,
    next_id: AtomicU64,
}

impl ViewerStore {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(BTreeMap::new()),
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Store `state` at `path` and notify matching subscribers.
    pub fn set(&self, path: &str, state: ViewerState) {
        let state = Arc::new(state);
        {
            let mut values = self.values.write().unwrap();
            values.insert(path.to_string(), Arc::clone(&state));
        }
        let matching: Vec<ChangeHandler> = {
            let handlers = self.handlers.read().unwrap();
            handlers
                .iter()
                .filter(|entry| entry.topic.matches(path))
                .map(|entry| Arc::clone(&entry.handler))
                .collect()
        };
        for handler in matching {
            handler(path, &state);
        }
    }

    pub fn get(&self, path: &str) -> Option<Arc<ViewerState>> {
        let values = self.values.read().unwrap();
        values.get(path).cloned()
    }

    pub fn playback(&self) -> Option<PlaybackSnapshot> {
        self.get(PlaybackSnapshot::PATH)
            .and_then(|v| v.as_playback().cloned())
    }

    pub fn item(&self, id: &StatusId) -> Option<StatusItem> {
        self.get(&item_path(id)).and_then(|v| v.as_item().cloned())
    }

    pub fn comments(&self, id: &StatusId) -> Option<CommentThread> {
        self.get(&CommentThread::path(id))
            .and_then(|v| v.as_comments().cloned())
    }

    pub fn notice(&self) -> Option<ViewerNotice> {
        self.get(ViewerNotice::PATH).and_then(|v| v.as_notice().cloned())
    }

    pub fn load(&self) -> Option<LoadState> {
        self.get(LoadState::PATH).and_then(|v| v.as_load().cloned())
    }

    /// Remove the value at `path` without notifying.
    pub fn remove(&self, path: &str) -> Option<Arc<ViewerState>> {
        let mut values = self.values.write().unwrap();
        values.remove(path)
    }

    /// Remove every child of `prefix` without notifying. Returns how many
    /// entries were dropped.
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let scan_prefix = format!("{prefix}/");
        let mut values = self.values.write().unwrap();
        let before = values.len();
        values.retain(|k, _| !k.starts_with(&scan_prefix));
        before - values.len()
    }

    /// Children of `prefix` (not `prefix` itself), ordered by path.
    pub fn scan(&self, prefix: &str) -> Vec<(String, Arc<ViewerState>)> {
        let scan_prefix = format!("{prefix}/");
        let values = self.values.read().unwrap();
        values
            .range(scan_prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&scan_prefix))
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.values.read().unwrap().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.values.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a handler for every path matching `pattern` (`+`/`#`
    /// wildcards).
    pub fn subscribe<F>(&self, pattern: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&str, &ViewerState) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = HandlerEntry {
            id,
            topic: Topic::parse(pattern),
            handler: Arc::new(handler),
        };
        self.handlers.write().unwrap().push(entry);
        id
    }

    /// Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap();
        let before = handlers.len();
        handlers.retain(|entry| entry.id != id);
        handlers.len() != before
    }

    /// Patterns currently subscribed, in registration order.
    pub fn subscriptions(&self) -> Vec<(SubscriptionId, String)> {
        let handlers = self.handlers.read().unwrap();
        handlers
            .iter()
            .map(|entry| (entry.id, entry.topic.as_str().to_string()))
            .collect()
    }
}

impl Default for ViewerStore {
    fn default() -> Self {
        Self::new()
    }
}
