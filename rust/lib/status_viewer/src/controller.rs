//! The viewer loop.
//!
//! One task owns all mutable viewer state. UI input, frame ticks and
//! remote completions all arrive as [`Command`]s on one channel and are
//! handled in order, so none of them can interleave. Results of work
//! started for an earlier session carry that session's epoch and are
//! dropped once a different session is active.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ViewerConfig;
use crate::error::{StoreError, ViewerError};
use crate::model::{AuthorRef, CommentPage, Reaction, StatusId, StatusItem};
use crate::mutation::{MutationGate, MutationKind, MutationRequest, PendingMutation, Settlement};
use crate::pause::PauseReason;
use crate::playback::{Direction, Phase, Playback, Step, Tick};
use crate::state::{
    COMMENTS_PREFIX, CommentThread, ITEMS_PREFIX, LoadState, PlaybackSnapshot, ViewerNotice,
    ViewerState, ViewerStore, item_path,
};
use crate::store::StatusStore;
use crate::timeline::Timeline;

/// What to play once the viewer runs off either end of a timeline.
pub enum Continuation {
    /// Play this timeline right away.
    Timeline(Timeline),
    /// Fetch this author's timeline from the store, then play it.
    Author(AuthorRef),
}

/// Host hook for multi-author trays.
///
/// Without one, running off the end closes the viewer and stepping back
/// from the first item does nothing.
pub trait TimelineContinuation: Send + Sync + 'static {
    /// Called after the last item of `current` completes or is skipped.
    fn next(&self, current: &AuthorRef) -> Option<Continuation>;

    /// Called on "previous" at the first item of `current`. A returned
    /// timeline opens at its last item.
    fn previous(&self, current: &AuthorRef) -> Option<Continuation>;
}

/// Where to start in a timeline that is about to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartAt {
    Index(usize),
    Last,
}

pub(crate) enum Command {
    Open { timeline: Timeline, start: StartAt },
    OpenAuthor { author: AuthorRef, start: StartAt },
    RetryLoad,
    Close,
    Pause(PauseReason),
    Resume(PauseReason),
    Navigate(Direction),
    DragStart,
    DragEnd(f32),
    React(Reaction),
    SubmitComment(String),
    OpenComments,
    LoadMoreComments,
    CloseComments,
    Snapshot(oneshot::Sender<PlaybackSnapshot>),
    Idle(oneshot::Sender<()>),
    Tick {
        generation: u64,
    },
    Loaded {
        epoch: u64,
        result: Result<Vec<StatusItem>, StoreError>,
    },
    Settled {
        epoch: u64,
        ticket: u64,
        result: Result<Settlement, StoreError>,
    },
    CommentsLoaded {
        epoch: u64,
        status_id: StatusId,
        result: Result<CommentPage, StoreError>,
    },
}

struct TimerHandle {
    generation: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// An opened timeline and everything in flight for it.
struct Session {
    epoch: u64,
    timeline: Timeline,
    playback: Playback,
    /// Statuses a view was already submitted for.
    viewed: HashSet<StatusId>,
    threads: HashMap<StatusId, CommentThread>,
    /// Applied, unsettled mutations by ticket.
    pending: HashMap<u64, PendingMutation>,
    gate: MutationGate,
    comment_loads: usize,
}

impl Session {
    fn current_item(&self) -> Option<&StatusItem> {
        self.timeline.get(self.playback.index())
    }

    fn current_id(&self) -> Option<StatusId> {
        self.current_item().map(|item| item.id.clone())
    }

    fn thread_mut(&mut self, status_id: &StatusId) -> &mut CommentThread {
        self.threads
            .entry(status_id.clone())
            .or_insert_with(|| CommentThread::new(status_id.clone()))
    }

    /// Apply `request` locally. Returns the pending record when a remote
    /// call is needed.
    fn begin(
        &mut self,
        ticket: u64,
        status_id: &StatusId,
        request: &MutationRequest,
    ) -> Option<PendingMutation> {
        let item = self.timeline.find_mut(status_id)?;
        let thread = self
            .threads
            .entry(status_id.clone())
            .or_insert_with(|| CommentThread::new(status_id.clone()));
        let pending = PendingMutation::apply(request, item, thread, ticket, Utc::now())?;
        self.pending.insert(ticket, pending.clone());
        Some(pending)
    }

    /// Reconcile a finished remote call. Returns the error to surface, if any.
    fn finish(
        &mut self,
        pending: &PendingMutation,
        result: Result<Settlement, StoreError>,
    ) -> Option<ViewerError> {
        let status_id = pending.status_id();
        let item = self.timeline.find_mut(status_id)?;
        let thread = self
            .threads
            .entry(status_id.clone())
            .or_insert_with(|| CommentThread::new(status_id.clone()));
        match result {
            Ok(settlement) => {
                let authoritative = matches!(settlement, Settlement::Counters(Some(_)));
                pending.settle(settlement, item, thread);
                if authoritative {
                    // Other lanes' optimistic deltas are not in the store's
                    // counters yet.
                    for other in self.pending.values().filter(|p| p.status_id() == status_id) {
                        other.reapply_counters(item);
                    }
                }
                None
            }
            Err(e) => {
                pending.revert(item, thread);
                Some(ViewerError::Mutation {
                    kind: pending.kind(),
                    message: e.to_string(),
                })
            }
        }
    }

    fn is_quiet(&self) -> bool {
        self.pending.is_empty() && self.gate.is_idle() && self.comment_loads == 0
    }
}

/// A remote timeline fetch started by `open_author`.
struct LoadRequest {
    epoch: u64,
    author: AuthorRef,
    start: StartAt,
    in_flight: bool,
}

pub(crate) struct ViewerLoop {
    config: ViewerConfig,
    store: Arc<dyn StatusStore>,
    state: Arc<ViewerStore>,
    continuation: Option<Arc<dyn TimelineContinuation>>,
    tx: mpsc::WeakUnboundedSender<Command>,
    rx: mpsc::UnboundedReceiver<Command>,
    session: Option<Session>,
    load: Option<LoadRequest>,
    timer: Option<TimerHandle>,
    epoch: u64,
    generation: u64,
    next_ticket: u64,
    next_notice: u64,
    idle_waiters: Vec<oneshot::Sender<()>>,
}

impl ViewerLoop {
    pub(crate) fn new(
        config: ViewerConfig,
        store: Arc<dyn StatusStore>,
        state: Arc<ViewerStore>,
        continuation: Option<Arc<dyn TimelineContinuation>>,
        tx: mpsc::WeakUnboundedSender<Command>,
        rx: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            config,
            store,
            state,
            continuation,
            tx,
            rx,
            session: None,
            load: None,
            timer: None,
            epoch: 0,
            generation: 0,
            next_ticket: 1,
            next_notice: 0,
            idle_waiters: Vec::new(),
        }
    }

    /// Runs until every [`StatusViewer`](crate::StatusViewer) handle and
    /// in-flight remote call is gone.
    pub(crate) async fn run(mut self) {
        debug!("status viewer loop started");
        while let Some(command) = self.rx.recv().await {
            self.handle(command);
            self.answer_idle();
        }
        self.end_session();
        debug!("status viewer loop stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Open { timeline, start } => {
                self.set_load_state(LoadState::Idle);
                self.open(timeline, start);
            }
            Command::OpenAuthor { author, start } => self.open_author(author, start),
            Command::RetryLoad => self.retry_load(),
            Command::Close => self.close(),
            Command::Pause(reason) => self.pause(reason),
            Command::Resume(reason) => self.resume(reason),
            Command::Navigate(direction) => self.navigate(direction),
            Command::DragStart => self.pause(PauseReason::Drag),
            Command::DragEnd(displacement) => self.drag_end(displacement),
            Command::React(reaction) => self.submit_current(MutationRequest::React(reaction)),
            Command::SubmitComment(text) => self.submit_current(MutationRequest::Comment(text)),
            Command::OpenComments => self.open_comments(),
            Command::LoadMoreComments => self.load_more_comments(),
            Command::CloseComments => self.resume(PauseReason::CommentPanel),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Idle(reply) => self.idle_waiters.push(reply),
            Command::Tick { generation } => self.on_tick(generation),
            Command::Loaded { epoch, result } => self.on_loaded(epoch, result),
            Command::Settled {
                epoch,
                ticket,
                result,
            } => self.on_settled(epoch, ticket, result),
            Command::CommentsLoaded {
                epoch,
                status_id,
                result,
            } => self.on_comments_loaded(epoch, status_id, result),
        }
    }

    // ====================================================================
    // Sessions
    // ====================================================================

    fn open(&mut self, mut timeline: Timeline, start: StartAt) {
        self.end_session();
        self.load = None;

        let requested = match start {
            StartAt::Index(index) => index,
            StartAt::Last => timeline.len().saturating_sub(1),
        };
        let start = timeline.retain_live(requested, Utc::now());
        let Some(playback) = Playback::new(
            timeline.len(),
            start,
            self.config.item_duration(),
            Instant::now(),
        ) else {
            warn!("no active statuses for {}, closing", timeline.author);
            self.notify(
                ViewerError::InvalidInput(format!("no active statuses for {}", timeline.author)),
                None,
            );
            self.publish_playback();
            return;
        };

        self.epoch += 1;
        info!(
            "opened {} statuses from {} at {start}",
            timeline.len(),
            timeline.author
        );

        self.state.remove_prefix(ITEMS_PREFIX);
        self.state.remove_prefix(COMMENTS_PREFIX);
        for item in &timeline.items {
            self.state
                .set(&item_path(&item.id), ViewerState::Item(item.clone()));
        }

        self.session = Some(Session {
            epoch: self.epoch,
            timeline,
            playback,
            viewed: HashSet::new(),
            threads: HashMap::new(),
            pending: HashMap::new(),
            gate: MutationGate::new(),
            comment_loads: 0,
        });
        self.rearm_timer();
        self.mark_viewed();
        self.publish_playback();
    }

    fn open_author(&mut self, author: AuthorRef, start: StartAt) {
        self.end_session();
        self.epoch += 1;
        info!("loading statuses for {author}");
        self.load = Some(LoadRequest {
            epoch: self.epoch,
            author: author.clone(),
            start,
            in_flight: false,
        });
        self.start_load();
    }

    fn retry_load(&mut self) {
        match &self.load {
            Some(load) if !load.in_flight => {
                info!("retrying status load for {}", load.author);
                self.start_load();
            }
            Some(_) => debug!("retry ignored: load already in flight"),
            None => debug!("retry ignored: no failed load"),
        }
    }

    fn start_load(&mut self) {
        let Some(load) = self.load.as_mut() else {
            return;
        };
        load.in_flight = true;
        let epoch = load.epoch;
        let author = load.author.clone();
        self.set_load_state(LoadState::Loading {
            author: author.clone(),
        });
        self.publish_playback();

        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let result = store.list_timeline_items(&author.id).await;
            let _ = tx.send(Command::Loaded { epoch, result });
        });
    }

    fn on_loaded(&mut self, epoch: u64, result: Result<Vec<StatusItem>, StoreError>) {
        if !self.load.as_ref().is_some_and(|load| load.epoch == epoch) {
            debug!("discarding stale timeline load");
            return;
        }
        let message = match result {
            Ok(items) => {
                let Some(load) = self.load.take() else {
                    return;
                };
                let timeline = Timeline::new(load.author.clone(), items);
                if timeline.live_count(Utc::now()) > 0 {
                    self.set_load_state(LoadState::Loaded {
                        author: load.author.clone(),
                    });
                    self.open(timeline, load.start);
                    return;
                }
                self.load = Some(load);
                "no active statuses".to_string()
            }
            Err(e) => e.to_string(),
        };

        let Some(load) = self.load.as_mut() else {
            return;
        };
        load.in_flight = false;
        let author = load.author.clone();
        warn!("failed to load statuses for {author}: {message}");
        self.set_load_state(LoadState::Failed {
            author,
            message: message.clone(),
        });
        self.notify(ViewerError::Load(message), None);
        self.publish_playback();
    }

    fn close(&mut self) {
        let was_open = self.session.is_some() || self.load.is_some();
        self.end_session();
        self.load = None;
        if was_open {
            info!("status viewer closed");
        }
        self.set_load_state(LoadState::Idle);
        self.publish_playback();
    }

    /// Stop the clock and forget the current session. In-flight remote
    /// calls still complete but their results no longer match an epoch.
    fn end_session(&mut self) {
        self.disarm_timer();
        if let Some(mut session) = self.session.take() {
            session.playback.close(Instant::now());
            if !session.pending.is_empty() {
                debug!(
                    "dropping {} unsettled mutations for {}",
                    session.pending.len(),
                    session.timeline.author
                );
            }
        }
    }

    // ====================================================================
    // Playback
    // ====================================================================

    fn on_tick(&mut self, generation: u64) {
        let current = self
            .timer
            .as_ref()
            .is_some_and(|timer| timer.generation == generation);
        let Some(session) = self.session.as_mut() else {
            trace!(generation, "dropping tick: nothing open");
            return;
        };
        if !current || !session.playback.is_running() {
            trace!(generation, "dropping stale tick");
            return;
        }
        if session
            .current_item()
            .is_some_and(|item| item.is_expired(Utc::now()))
        {
            debug!("current status expired, skipping");
            self.navigate(Direction::Forward);
            return;
        }
        match session.playback.tick(Instant::now()) {
            Tick::Progress(_) => self.publish_playback(),
            Tick::Completed => {
                debug!("status {} completed", session.playback.index());
                self.navigate(Direction::Forward);
            }
            Tick::Idle => {}
        }
    }

    fn navigate(&mut self, direction: Direction) {
        let now = Instant::now();
        let wall = Utc::now();
        let Some(session) = self.session.as_mut() else {
            debug!("navigation ignored: nothing open");
            return;
        };
        loop {
            match session.playback.step(direction, now) {
                Step::Moved(index) => {
                    if session
                        .timeline
                        .get(index)
                        .is_some_and(|item| item.is_expired(wall))
                    {
                        debug!("skipping expired status at {index}");
                        continue;
                    }
                    debug!(
                        "moved {direction:?} to status {} of {}",
                        index + 1,
                        session.playback.len()
                    );
                    break;
                }
                Step::Boundary(direction) => {
                    self.cross_boundary(direction);
                    return;
                }
            }
        }
        if direction == Direction::Forward {
            self.mark_viewed();
        }
        self.rearm_timer();
        self.publish_playback();
    }

    fn cross_boundary(&mut self, direction: Direction) {
        let Some(author) = self
            .session
            .as_ref()
            .map(|session| session.timeline.author.clone())
        else {
            return;
        };
        let continuation = self.continuation.as_ref().and_then(|hook| match direction {
            Direction::Forward => hook.next(&author),
            Direction::Backward => hook.previous(&author),
        });
        let start = match direction {
            Direction::Forward => StartAt::Index(0),
            Direction::Backward => StartAt::Last,
        };
        match continuation {
            Some(Continuation::Timeline(timeline)) => {
                info!("continuing from {author} to {}", timeline.author);
                self.set_load_state(LoadState::Idle);
                self.open(timeline, start);
            }
            Some(Continuation::Author(next)) => {
                info!("continuing from {author} to {next}");
                self.open_author(next, start);
            }
            None if direction == Direction::Forward => {
                info!("reached the end of statuses from {author}");
                self.close();
            }
            None => {
                debug!("already at the first status");
                // A paused-then-released drag may have resumed the clock.
                self.sync_timer();
                self.publish_playback();
            }
        }
    }

    fn pause(&mut self, reason: PauseReason) {
        let Some(session) = self.session.as_mut() else {
            debug!("pause ignored: nothing open");
            return;
        };
        if session.playback.pause(reason, Instant::now()) {
            debug!("paused ({reason:?})");
        }
        self.sync_timer();
        self.publish_playback();
    }

    fn resume(&mut self, reason: PauseReason) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.playback.resume(reason, Instant::now()) {
            debug!("resumed ({reason:?})");
        }
        self.sync_timer();
        self.publish_playback();
    }

    /// Negative displacement is a leftward swipe (next).
    fn drag_end(&mut self, displacement: f32) {
        let threshold = self.config.drag_threshold_px;
        let direction = if displacement <= -threshold {
            Some(Direction::Forward)
        } else if displacement >= threshold {
            Some(Direction::Backward)
        } else {
            None
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match direction {
            Some(direction) => {
                session.playback.clear_pauses(Instant::now());
                self.navigate(direction);
            }
            None => {
                session.playback.release(PauseReason::Drag, Instant::now());
                self.sync_timer();
                self.publish_playback();
            }
        }
    }

    // ====================================================================
    // Timer
    // ====================================================================

    fn sync_timer(&mut self) {
        let running = self
            .session
            .as_ref()
            .is_some_and(|session| session.playback.is_running());
        match (running, self.timer.is_some()) {
            (true, false) => self.arm_timer(),
            (false, true) => self.disarm_timer(),
            _ => {}
        }
    }

    /// Restart the frame timer under a new generation so ticks queued for
    /// the previous item are ignored.
    fn rearm_timer(&mut self) {
        self.disarm_timer();
        self.sync_timer();
    }

    fn arm_timer(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let period = self.config.frame_interval();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let tx = self.tx.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(period) => {
                        let Some(tx) = tx.upgrade() else {
                            break;
                        };
                        if tx.send(Command::Tick { generation }).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        trace!(generation, "frame timer armed");
        self.timer = Some(TimerHandle {
            generation,
            cancel,
            task,
        });
    }

    fn disarm_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel.cancel();
            timer.task.abort();
            trace!(generation = timer.generation, "frame timer disarmed");
        }
    }

    // ====================================================================
    // Mutations
    // ====================================================================

    fn mark_viewed(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(status_id) = session.current_id() else {
            return;
        };
        if session.viewed.insert(status_id.clone()) {
            self.submit(status_id, MutationRequest::View);
        }
    }

    fn submit_current(&mut self, request: MutationRequest) {
        let Some(status_id) = self.session.as_ref().and_then(Session::current_id) else {
            debug!("{} ignored: nothing open", request.kind());
            return;
        };
        self.submit(status_id, request);
    }

    fn submit(&mut self, status_id: StatusId, request: MutationRequest) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let kind = request.kind();
        let next = session.gate.admit(&status_id, request);
        if next.is_none() {
            debug!("{kind} for {status_id} queued behind an in-flight request");
        }
        self.drive_lane(status_id, next);
    }

    /// Start `next` on its lane; requests that turn out to be no-ops free
    /// the lane for the one queued behind them.
    fn drive_lane(&mut self, status_id: StatusId, mut next: Option<MutationRequest>) {
        while let Some(request) = next.take() {
            let ticket = self.next_ticket;
            self.next_ticket += 1;
            let Some(session) = self.session.as_mut() else {
                return;
            };
            let kind = request.kind();
            match session.begin(ticket, &status_id, &request) {
                Some(pending) => {
                    let epoch = session.epoch;
                    debug!("{kind} for {status_id} applied locally (ticket {ticket})");
                    self.publish_status(&status_id, kind);
                    self.spawn_remote(epoch, ticket, pending);
                }
                None => next = session.gate.release(&status_id, kind),
            }
        }
    }

    fn spawn_remote(&self, epoch: u64, ticket: u64, pending: PendingMutation) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        let store = Arc::clone(&self.store);
        let status_id = pending.status_id().clone();
        let op = pending.remote_op();
        tokio::spawn(async move {
            let result = op.execute(store.as_ref(), &status_id).await;
            let _ = tx.send(Command::Settled {
                epoch,
                ticket,
                result,
            });
        });
    }

    fn on_settled(&mut self, epoch: u64, ticket: u64, result: Result<Settlement, StoreError>) {
        let Some(session) = self.session.as_mut().filter(|s| s.epoch == epoch) else {
            debug!("discarding result of ticket {ticket} from a closed session");
            return;
        };
        let Some(pending) = session.pending.remove(&ticket) else {
            return;
        };
        let status_id = pending.status_id().clone();
        let kind = pending.kind();
        let error = session.finish(&pending, result);
        let next = session.gate.release(&status_id, kind);

        match error {
            Some(e) => {
                warn!("{kind} for {status_id} rolled back: {e}");
                self.notify(e, Some(status_id.clone()));
            }
            None => debug!("{kind} for {status_id} confirmed (ticket {ticket})"),
        }
        self.publish_status(&status_id, kind);
        self.drive_lane(status_id, next);
    }

    // ====================================================================
    // Comments
    // ====================================================================

    fn open_comments(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        // One hold per open panel, however often the host reopens it.
        if !session.playback.reasons().contains(PauseReason::CommentPanel) {
            self.pause(PauseReason::CommentPanel);
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(status_id) = session.current_id() else {
            return;
        };
        let thread = session.thread_mut(&status_id);
        if thread.fetched || thread.loading {
            self.publish_thread(&status_id);
            return;
        }
        self.request_comments(status_id);
    }

    fn load_more_comments(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(status_id) = session.current_id() else {
            return;
        };
        let thread = session.thread_mut(&status_id);
        if thread.loading || !thread.has_more {
            debug!("no more comments to load for {status_id}");
            return;
        }
        self.request_comments(status_id);
    }

    fn request_comments(&mut self, status_id: StatusId) {
        let limit = self.config.comment_page_size;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let epoch = session.epoch;
        session.comment_loads += 1;
        let thread = session.thread_mut(&status_id);
        thread.loading = true;
        let offset = thread.next_offset;
        self.publish_thread(&status_id);

        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let result = store.list_comments(&status_id, limit, offset).await;
            let _ = tx.send(Command::CommentsLoaded {
                epoch,
                status_id,
                result,
            });
        });
    }

    fn on_comments_loaded(
        &mut self,
        epoch: u64,
        status_id: StatusId,
        result: Result<CommentPage, StoreError>,
    ) {
        let Some(session) = self.session.as_mut().filter(|s| s.epoch == epoch) else {
            debug!("discarding comments for {status_id} from a closed session");
            return;
        };
        session.comment_loads = session.comment_loads.saturating_sub(1);
        let thread = session.thread_mut(&status_id);
        thread.loading = false;
        match result {
            Ok(page) => {
                thread.next_offset += page.comments.len();
                thread.has_more = page.has_more;
                thread.fetched = true;
                for comment in page.comments {
                    if !thread.comments.iter().any(|c| c.id == comment.id) {
                        thread.comments.push(comment);
                    }
                }
                debug!(
                    "loaded comments for {status_id} ({} total)",
                    thread.comments.len()
                );
                self.publish_thread(&status_id);
            }
            Err(e) => {
                warn!("failed to load comments for {status_id}: {e}");
                self.publish_thread(&status_id);
                self.notify(
                    ViewerError::Load(format!("comments: {e}")),
                    Some(status_id),
                );
            }
        }
    }

    // ====================================================================
    // Publishing
    // ====================================================================

    fn snapshot(&self) -> PlaybackSnapshot {
        if let Some(session) = &self.session {
            let playback = &session.playback;
            return PlaybackSnapshot {
                phase: playback.phase(),
                author: Some(session.timeline.author.clone()),
                current_index: playback.index(),
                len: playback.len(),
                progress: playback.progress(Instant::now()),
                is_paused: playback.is_paused(),
                pause_reasons: playback.reasons().active(),
                current_item: session.current_item().cloned(),
            };
        }
        match &self.load {
            Some(load) => PlaybackSnapshot {
                author: Some(load.author.clone()),
                ..PlaybackSnapshot::idle(if load.in_flight {
                    Phase::Loading
                } else {
                    Phase::LoadFailed
                })
            },
            None => PlaybackSnapshot::idle(Phase::Closed),
        }
    }

    fn publish_playback(&self) {
        self.state
            .set(PlaybackSnapshot::PATH, ViewerState::Playback(self.snapshot()));
    }

    /// Publish the item (and its thread for comments) after a local change.
    fn publish_status(&self, status_id: &StatusId, kind: MutationKind) {
        let Some(session) = &self.session else {
            return;
        };
        if let Some(item) = session.timeline.items.iter().find(|i| &i.id == status_id) {
            self.state
                .set(&item_path(status_id), ViewerState::Item(item.clone()));
        }
        if kind == MutationKind::Comment {
            self.publish_thread(status_id);
        }
        if session.current_id().as_ref() == Some(status_id) {
            self.publish_playback();
        }
    }

    fn publish_thread(&self, status_id: &StatusId) {
        let Some(thread) = self
            .session
            .as_ref()
            .and_then(|session| session.threads.get(status_id))
        else {
            return;
        };
        self.state.set(
            &CommentThread::path(status_id),
            ViewerState::Comments(thread.clone()),
        );
    }

    fn set_load_state(&self, load: LoadState) {
        if self.state.load().as_ref() != Some(&load) {
            self.state.set(LoadState::PATH, ViewerState::Load(load));
        }
    }

    fn notify(&mut self, error: ViewerError, status_id: Option<StatusId>) {
        self.next_notice += 1;
        let notice = ViewerNotice::from_error(self.next_notice, &error, status_id);
        self.state
            .set(ViewerNotice::PATH, ViewerState::Notice(notice));
    }

    fn is_quiet(&self) -> bool {
        !self.load.as_ref().is_some_and(|load| load.in_flight)
            && self.session.as_ref().is_none_or(Session::is_quiet)
    }

    fn answer_idle(&mut self) {
        if self.idle_waiters.is_empty() || !self.is_quiet() {
            return;
        }
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}
