use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::config::ViewerConfig;
use crate::controller::{Command, StartAt, TimelineContinuation, ViewerLoop};
use crate::error::ViewerError;
use crate::model::{AuthorRef, Reaction, StatusId, StatusItem};
use crate::pause::PauseReason;
use crate::playback::{Direction, Phase};
use crate::state::{
    CommentThread, LoadState, PlaybackSnapshot, SubscriptionId, ViewerNotice, ViewerState,
    ViewerStore,
};
use crate::store::StatusStore;
use crate::timeline::Timeline;

/// Handle to a running status viewer.
///
/// Input methods are fire-and-forget: they queue a command for the viewer
/// loop and return at once. They only fail when the loop is gone
/// ([`ViewerError::Closed`]) or the input is rejected up front
/// ([`ViewerError::InvalidInput`]). Everything else (progress, counters,
/// comments, failures) is observed through the [`ViewerStore`].
///
/// # Examples
///
/// ```ignore
/// let viewer = StatusViewer::builder(store).spawn()?;
///
/// viewer.subscribe("viewer/playback", |_, value| {
///     if let Some(snapshot) = value.as_playback() {
///         render(snapshot);
///     }
/// });
///
/// viewer.open(timeline, 0)?;
/// viewer.react(Reaction::Love)?;
/// ```
///
/// The loop stops once every handle is dropped.
pub struct StatusViewer {
    tx: mpsc::UnboundedSender<Command>,
    state: Arc<ViewerStore>,
    config: ViewerConfig,
}

/// Builder returned by [`StatusViewer::builder`].
pub struct StatusViewerBuilder {
    store: Arc<dyn StatusStore>,
    config: ViewerConfig,
    continuation: Option<Arc<dyn TimelineContinuation>>,
    state: Option<Arc<ViewerStore>>,
}

impl StatusViewerBuilder {
    pub fn config(mut self, config: ViewerConfig) -> Self {
        self.config = config;
        self
    }

    /// Hook for what plays before the first and after the last item.
    pub fn continuation(mut self, continuation: impl TimelineContinuation) -> Self {
        self.continuation = Some(Arc::new(continuation));
        self
    }

    /// Publish into an existing store instead of a fresh one.
    pub fn state(mut self, state: Arc<ViewerStore>) -> Self {
        self.state = Some(state);
        self
    }

    /// Validate the config and start the viewer loop on the current tokio
    /// runtime.
    pub fn spawn(self) -> Result<StatusViewer, ViewerError> {
        self.config.validate()?;
        let state = self.state.unwrap_or_default();
        state.set(
            PlaybackSnapshot::PATH,
            ViewerState::Playback(PlaybackSnapshot::idle(Phase::Closed)),
        );
        state.set(LoadState::PATH, ViewerState::Load(LoadState::Idle));

        let (tx, rx) = mpsc::unbounded_channel();
        let viewer_loop = ViewerLoop::new(
            self.config.clone(),
            self.store,
            Arc::clone(&state),
            self.continuation,
            tx.downgrade(),
            rx,
        );
        tokio::spawn(viewer_loop.run());
        debug!("status viewer spawned");

        Ok(StatusViewer {
            tx,
            state,
            config: self.config,
        })
    }
}

impl StatusViewer {
    pub fn builder(store: Arc<dyn StatusStore>) -> StatusViewerBuilder {
        StatusViewerBuilder {
            store,
            config: ViewerConfig::default(),
            continuation: None,
            state: None,
        }
    }

    /// Spawn with the default config and no continuation hook.
    pub fn spawn(store: Arc<dyn StatusStore>) -> Result<Self, ViewerError> {
        Self::builder(store).spawn()
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    // ====================================================================
    // Lifecycle
    // ====================================================================

    /// Play `timeline` from `start_index`. Expired items are dropped first;
    /// if the start item expired, playback starts at the next live one.
    ///
    /// Replaces whatever was open. Fails with `InvalidInput` when the
    /// timeline has no live items.
    pub fn open(&self, timeline: Timeline, start_index: usize) -> Result<(), ViewerError> {
        if timeline.live_count(Utc::now()) == 0 {
            return Err(ViewerError::InvalidInput(format!(
                "no active statuses for {}",
                timeline.author
            )));
        }
        self.send(Command::Open {
            timeline,
            start: StartAt::Index(start_index),
        })
    }

    /// Fetch `author`'s timeline from the store, then play it.
    pub fn open_author(&self, author: AuthorRef, start_index: usize) -> Result<(), ViewerError> {
        self.send(Command::OpenAuthor {
            author,
            start: StartAt::Index(start_index),
        })
    }

    /// Repeat a failed [`open_author`](Self::open_author) fetch.
    pub fn retry_load(&self) -> Result<(), ViewerError> {
        self.send(Command::RetryLoad)
    }

    pub fn close(&self) -> Result<(), ViewerError> {
        self.send(Command::Close)
    }

    // ====================================================================
    // Playback
    // ====================================================================

    pub fn pause(&self, reason: PauseReason) -> Result<(), ViewerError> {
        self.send(Command::Pause(reason))
    }

    pub fn resume(&self, reason: PauseReason) -> Result<(), ViewerError> {
        self.send(Command::Resume(reason))
    }

    pub fn next(&self) -> Result<(), ViewerError> {
        self.send(Command::Navigate(Direction::Forward))
    }

    pub fn previous(&self) -> Result<(), ViewerError> {
        self.send(Command::Navigate(Direction::Backward))
    }

    pub fn on_drag_start(&self) -> Result<(), ViewerError> {
        self.send(Command::DragStart)
    }

    /// `displacement` is the horizontal drag distance in pixels; negative
    /// is leftward (next), positive is rightward (previous).
    pub fn on_drag_end(&self, displacement: f32) -> Result<(), ViewerError> {
        self.send(Command::DragEnd(displacement))
    }

    // ====================================================================
    // Engagement
    // ====================================================================

    /// Toggle `reaction` on the current status: same reaction clears it,
    /// a different one replaces it.
    pub fn react(&self, reaction: Reaction) -> Result<(), ViewerError> {
        self.send(Command::React(reaction))
    }

    /// Post a comment on the current status.
    pub fn submit_comment(&self, text: &str) -> Result<(), ViewerError> {
        let text = validate_comment(text, self.config.max_comment_chars)?;
        self.send(Command::SubmitComment(text))
    }

    /// Pause for the comment panel and fetch the first page if needed.
    pub fn open_comments(&self) -> Result<(), ViewerError> {
        self.send(Command::OpenComments)
    }

    pub fn load_more_comments(&self) -> Result<(), ViewerError> {
        self.send(Command::LoadMoreComments)
    }

    pub fn close_comments(&self) -> Result<(), ViewerError> {
        self.send(Command::CloseComments)
    }

    // ====================================================================
    // Observation
    // ====================================================================

    /// Playback state as of now, with progress computed at the time the
    /// loop answers.
    pub async fn snapshot(&self) -> Result<PlaybackSnapshot, ViewerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply))?;
        rx.await.map_err(|_| ViewerError::Closed)
    }

    /// Resolves once no load, mutation or comment fetch is in flight.
    pub async fn idle(&self) -> Result<(), ViewerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Idle(reply))?;
        rx.await.map_err(|_| ViewerError::Closed)
    }

    pub fn state(&self) -> &Arc<ViewerStore> {
        &self.state
    }

    pub fn subscribe<F>(&self, pattern: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&str, &ViewerState) + Send + Sync + 'static,
    {
        self.state.subscribe(pattern, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.state.unsubscribe(id)
    }

    pub fn item(&self, id: &StatusId) -> Option<StatusItem> {
        self.state.item(id)
    }

    pub fn comments(&self, id: &StatusId) -> Option<CommentThread> {
        self.state.comments(id)
    }

    /// The most recent notice, if any.
    pub fn notice(&self) -> Option<ViewerNotice> {
        self.state.notice()
    }

    fn send(&self, command: Command) -> Result<(), ViewerError> {
        self.tx.send(command).map_err(|_| ViewerError::Closed)
    }
}

/// Trim `text` and check it fits in `max_chars` characters.
pub fn validate_comment(text: &str, max_chars: usize) -> Result<String, ViewerError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ViewerError::InvalidInput("comment is empty".into()));
    }
    let chars = trimmed.chars().count();
    if chars > max_chars {
        return Err(ViewerError::InvalidInput(format!(
            "comment is {chars} characters, limit is {max_chars}"
        )));
    }
    Ok(trimmed.to_string())
}
