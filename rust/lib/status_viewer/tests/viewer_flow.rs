//! End-to-end viewer behavior against the in-memory store, on paused tokio
//! time so playback timing is exact.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use status_viewer::{
    AuthorRef, Comment, CommentPage, Continuation, ItemCounters, LoadState, MemoryStatusStore,
    PauseReason, Phase, Reaction, StatusId, StatusItem, StatusKind, StatusStore, StatusViewer,
    StoreError, StoreOp, Timeline, TimelineContinuation, ViewerConfig, ViewerError, error_code,
};
use tokio::time::sleep;

// ========================================================================
// Fixtures
// ========================================================================

fn config() -> ViewerConfig {
    ViewerConfig {
        item_duration_ms: 1_000,
        frame_interval_ms: 10,
        comment_page_size: 2,
        ..ViewerConfig::default()
    }
}

fn me() -> AuthorRef {
    AuthorRef::new("me", "Me")
}

fn author(id: &str) -> AuthorRef {
    AuthorRef::new(id, id.to_uppercase())
}

fn text_item(id: &str, author_id: &str) -> StatusItem {
    StatusItem::new(
        id,
        author_id,
        StatusKind::Text {
            content: format!("status {id}"),
        },
        Utc::now(),
    )
}

/// Seed `ids` for `author_id` into the store and return them as a timeline.
fn seed(store: &MemoryStatusStore, author_id: &str, ids: &[&str]) -> Timeline {
    let items: Vec<StatusItem> = ids.iter().map(|id| text_item(id, author_id)).collect();
    for item in &items {
        store.insert_item(item.clone());
    }
    Timeline::new(author(author_id), items)
}

fn store() -> Arc<MemoryStatusStore> {
    Arc::new(MemoryStatusStore::new(me()))
}

fn spawn(store: &Arc<MemoryStatusStore>) -> StatusViewer {
    StatusViewer::builder(store.clone())
        .config(config())
        .spawn()
        .unwrap()
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn id(s: &str) -> StatusId {
    StatusId::new(s)
}

/// Plays timelines in tray order.
struct Tray {
    timelines: Vec<Timeline>,
}

impl Tray {
    fn position(&self, current: &AuthorRef) -> Option<usize> {
        self.timelines.iter().position(|t| t.author.id == current.id)
    }
}

impl TimelineContinuation for Tray {
    fn next(&self, current: &AuthorRef) -> Option<Continuation> {
        let i = self.position(current)?;
        self.timelines.get(i + 1).cloned().map(Continuation::Timeline)
    }

    fn previous(&self, current: &AuthorRef) -> Option<Continuation> {
        let i = self.position(current)?;
        self.timelines
            .get(i.checked_sub(1)?)
            .cloned()
            .map(Continuation::Timeline)
    }
}

// ========================================================================
// Playback
// ========================================================================

#[tokio::test(start_paused = true)]
async fn auto_advances_then_closes_after_last() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1", "s2"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.phase, Phase::Playing);
    assert_eq!(snap.current_index, 0);
    assert_eq!(snap.len, 2);
    assert_eq!(snap.author.unwrap().id, "ana");

    sleep(ms(500)).await;
    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.current_index, 0);
    assert!((snap.progress - 0.5).abs() < 0.02);

    sleep(ms(505)).await;
    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.current_index, 1);
    assert!(snap.progress < 0.02);

    sleep(ms(1_000)).await;
    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.phase, Phase::Closed);
    assert!(snap.author.is_none());
    assert_eq!(viewer.state().playback().unwrap().phase, Phase::Closed);
}

#[tokio::test(start_paused = true)]
async fn pause_freezes_progress_and_resume_continues() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1", "s2"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    sleep(ms(400)).await;
    viewer.pause(PauseReason::Hold).unwrap();
    sleep(ms(5_000)).await;

    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.phase, Phase::Paused);
    assert!(snap.is_paused);
    assert_eq!(snap.pause_reasons, vec![PauseReason::Hold]);
    assert_eq!(snap.current_index, 0);
    assert!((snap.progress - 0.4).abs() < 0.001);

    viewer.resume(PauseReason::Hold).unwrap();
    sleep(ms(590)).await;
    assert_eq!(viewer.snapshot().await.unwrap().current_index, 0);

    sleep(ms(20)).await;
    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.current_index, 1);
    assert_eq!(snap.phase, Phase::Playing);
}

#[tokio::test(start_paused = true)]
async fn overlapping_pause_reasons_hold_until_all_released() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    viewer.pause(PauseReason::Hold).unwrap();
    viewer.open_comments().unwrap();
    viewer.resume(PauseReason::Hold).unwrap();

    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.phase, Phase::Paused);
    assert_eq!(snap.pause_reasons, vec![PauseReason::CommentPanel]);

    sleep(ms(3_000)).await;
    assert_eq!(viewer.snapshot().await.unwrap().phase, Phase::Paused);

    viewer.close_comments().unwrap();
    assert_eq!(viewer.snapshot().await.unwrap().phase, Phase::Playing);
}

#[tokio::test(start_paused = true)]
async fn resuming_an_inactive_reason_is_a_no_op() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    viewer.pause(PauseReason::ReactionPicker).unwrap();
    viewer.resume(PauseReason::TextInput).unwrap();

    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.pause_reasons, vec![PauseReason::ReactionPicker]);
}

#[tokio::test(start_paused = true)]
async fn navigation_restarts_the_item_clock() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1", "s2", "s3"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    sleep(ms(700)).await;
    viewer.next().unwrap();
    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.current_index, 1);
    assert_eq!(snap.progress, 0.0);

    // Ticks armed for the first item must not carry its 700ms over.
    sleep(ms(500)).await;
    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.current_index, 1);
    assert!((snap.progress - 0.5).abs() < 0.02);

    viewer.previous().unwrap();
    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.current_index, 0);
    assert_eq!(snap.progress, 0.0);
}

#[tokio::test(start_paused = true)]
async fn navigation_keeps_pause_holds() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1", "s2"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    viewer.pause(PauseReason::ReactionPicker).unwrap();
    viewer.next().unwrap();
    sleep(ms(2_000)).await;

    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.current_index, 1);
    assert_eq!(snap.phase, Phase::Paused);
    assert_eq!(snap.progress, 0.0);
}

#[tokio::test(start_paused = true)]
async fn previous_at_first_item_without_hook_stays() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1", "s2"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    viewer.previous().unwrap();
    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.phase, Phase::Playing);
    assert_eq!(snap.current_index, 0);
}

#[tokio::test(start_paused = true)]
async fn next_at_last_item_without_hook_closes() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1", "s2"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 1).unwrap();

    viewer.next().unwrap();
    assert_eq!(viewer.snapshot().await.unwrap().phase, Phase::Closed);
}

#[tokio::test(start_paused = true)]
async fn start_index_is_clamped() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1", "s2"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 9).unwrap();

    assert_eq!(viewer.snapshot().await.unwrap().current_index, 1);
}

// ========================================================================
// Drag gestures
// ========================================================================

#[tokio::test(start_paused = true)]
async fn drag_past_threshold_navigates() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1", "s2"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    viewer.on_drag_start().unwrap();
    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.pause_reasons, vec![PauseReason::Drag]);

    viewer.on_drag_end(-150.0).unwrap();
    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.current_index, 1);
    assert_eq!(snap.phase, Phase::Playing);

    viewer.on_drag_start().unwrap();
    viewer.on_drag_end(150.0).unwrap();
    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.current_index, 0);
    assert_eq!(snap.phase, Phase::Playing);
}

#[tokio::test(start_paused = true)]
async fn short_drag_only_releases_the_drag_hold() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1", "s2"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    viewer.on_drag_start().unwrap();
    viewer.on_drag_end(-30.0).unwrap();
    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.current_index, 0);
    assert_eq!(snap.phase, Phase::Playing);

    viewer.pause(PauseReason::Hold).unwrap();
    viewer.on_drag_start().unwrap();
    viewer.on_drag_end(99.0).unwrap();
    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.pause_reasons, vec![PauseReason::Hold]);
}

#[tokio::test(start_paused = true)]
async fn navigating_drag_clears_every_hold() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1", "s2"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    viewer.pause(PauseReason::Hold).unwrap();
    viewer.on_drag_start().unwrap();
    viewer.on_drag_end(-100.0).unwrap();

    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.current_index, 1);
    assert_eq!(snap.phase, Phase::Playing);
    assert!(snap.pause_reasons.is_empty());
}

#[tokio::test(start_paused = true)]
async fn drag_back_at_first_item_resumes_in_place() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1", "s2"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    viewer.on_drag_start().unwrap();
    viewer.on_drag_end(200.0).unwrap();
    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.current_index, 0);
    assert_eq!(snap.phase, Phase::Playing);

    sleep(ms(1_005)).await;
    assert_eq!(viewer.snapshot().await.unwrap().current_index, 1);
}

// ========================================================================
// Expiry
// ========================================================================

#[tokio::test(start_paused = true)]
async fn expired_items_are_dropped_at_open() {
    let store = store();
    let mut timeline = seed(&store, "ana", &["s1", "s2", "s3"]);
    timeline.items[1].created_at = Utc::now() - chrono::Duration::hours(30);
    timeline.items[1].expires_at = Utc::now() - chrono::Duration::hours(6);

    let viewer = spawn(&store);
    viewer.open(timeline, 1).unwrap();

    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.len, 2);
    assert_eq!(snap.current_index, 1);
    assert_eq!(snap.current_item.unwrap().id, id("s3"));
}

#[tokio::test(start_paused = true)]
async fn fully_expired_timeline_is_rejected() {
    let store = store();
    let mut timeline = seed(&store, "ana", &["s1"]);
    timeline.items[0].expires_at = Utc::now() - chrono::Duration::minutes(1);

    let viewer = spawn(&store);
    let err = viewer.open(timeline, 0).unwrap_err();
    assert!(matches!(err, ViewerError::InvalidInput(_)));
}

#[tokio::test(start_paused = true)]
async fn item_expiring_during_playback_is_skipped() {
    let store = store();
    let mut timeline = seed(&store, "ana", &["s1", "s2"]);
    timeline.items[0].expires_at = Utc::now() + chrono::Duration::milliseconds(200);

    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();
    assert_eq!(viewer.snapshot().await.unwrap().current_index, 0);

    // Expiry is wall-clock; paused tokio time does not move it.
    std::thread::sleep(ms(250));
    sleep(ms(20)).await;

    assert_eq!(viewer.snapshot().await.unwrap().current_index, 1);
}

// ========================================================================
// Views
// ========================================================================

#[tokio::test(start_paused = true)]
async fn each_status_is_recorded_viewed_once() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1", "s2"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    viewer.next().unwrap();
    viewer.previous().unwrap();
    viewer.next().unwrap();
    viewer.idle().await.unwrap();

    assert_eq!(store.call_count(StoreOp::RecordView), 2);
    for s in ["s1", "s2"] {
        let item = viewer.item(&id(s)).unwrap();
        assert!(item.is_viewed);
        assert_eq!(item.view_count, 1);
        assert_eq!(store.item(&id(s)).unwrap().view_count, 1);
    }
}

#[tokio::test(start_paused = true)]
async fn already_viewed_status_is_not_recorded_again() {
    let store = store();
    let mut timeline = seed(&store, "ana", &["s1"]);
    timeline.items[0].is_viewed = true;

    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();
    viewer.idle().await.unwrap();

    assert_eq!(store.call_count(StoreOp::RecordView), 0);
}

// ========================================================================
// Reactions
// ========================================================================

#[tokio::test(start_paused = true)]
async fn reaction_shows_immediately_and_reconciles() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();
    viewer.idle().await.unwrap();

    store.hold();
    viewer.react(Reaction::Love).unwrap();
    viewer.snapshot().await.unwrap();

    let item = viewer.item(&id("s1")).unwrap();
    assert_eq!(item.viewer_reaction, Some(Reaction::Love));
    assert_eq!(item.reaction_count, 1);
    let current = viewer.snapshot().await.unwrap().current_item.unwrap();
    assert_eq!(current.viewer_reaction, Some(Reaction::Love));

    store.release();
    viewer.idle().await.unwrap();

    let item = viewer.item(&id("s1")).unwrap();
    assert_eq!(item.viewer_reaction, Some(Reaction::Love));
    assert_eq!(item.counters(), store.item(&id("s1")).unwrap().counters());
}

#[tokio::test(start_paused = true)]
async fn same_reaction_twice_clears_it() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    viewer.react(Reaction::Like).unwrap();
    viewer.idle().await.unwrap();
    viewer.react(Reaction::Like).unwrap();
    viewer.idle().await.unwrap();

    let item = viewer.item(&id("s1")).unwrap();
    assert_eq!(item.viewer_reaction, None);
    assert_eq!(item.reaction_count, 0);
    assert_eq!(store.item(&id("s1")).unwrap().viewer_reaction, None);
}

#[tokio::test(start_paused = true)]
async fn failed_reaction_rolls_back_and_notifies() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();
    viewer.idle().await.unwrap();

    store.fail(StoreOp::SetReaction);
    viewer.react(Reaction::Wow).unwrap();
    viewer.idle().await.unwrap();

    let item = viewer.item(&id("s1")).unwrap();
    assert_eq!(item.viewer_reaction, None);
    assert_eq!(item.reaction_count, 0);

    let notice = viewer.notice().unwrap();
    assert_eq!(notice.code, error_code::MUTATION_FAILED);
    assert_eq!(notice.status_id, Some(id("s1")));
}

#[tokio::test(start_paused = true)]
async fn switching_reaction_counts_once() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    viewer.react(Reaction::Like).unwrap();
    viewer.idle().await.unwrap();
    viewer.react(Reaction::Laugh).unwrap();
    viewer.idle().await.unwrap();

    let item = viewer.item(&id("s1")).unwrap();
    assert_eq!(item.viewer_reaction, Some(Reaction::Laugh));
    assert_eq!(item.reaction_count, 1);
}

#[tokio::test(start_paused = true)]
async fn second_reaction_waits_for_the_first() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();
    viewer.idle().await.unwrap();

    store.hold();
    viewer.react(Reaction::Like).unwrap();
    viewer.react(Reaction::Love).unwrap();
    viewer.snapshot().await.unwrap();
    store.release();
    viewer.idle().await.unwrap();

    let item = viewer.item(&id("s1")).unwrap();
    assert_eq!(item.viewer_reaction, Some(Reaction::Love));
    assert_eq!(item.reaction_count, 1);
    assert_eq!(store.call_count(StoreOp::SetReaction), 2);
    assert_eq!(store.call_count(StoreOp::ClearReaction), 0);
}

#[tokio::test(start_paused = true)]
async fn rapid_reactions_reach_the_store_in_order() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();
    viewer.idle().await.unwrap();

    store.hold();
    viewer.react(Reaction::Like).unwrap();
    viewer.react(Reaction::Like).unwrap();
    viewer.react(Reaction::Love).unwrap();
    viewer.snapshot().await.unwrap();

    // Only the first is applied while it is in flight.
    assert_eq!(
        viewer.item(&id("s1")).unwrap().viewer_reaction,
        Some(Reaction::Like)
    );

    store.release();
    viewer.idle().await.unwrap();

    let reaction_calls: Vec<StoreOp> = store
        .calls()
        .into_iter()
        .filter(|op| matches!(op, StoreOp::SetReaction | StoreOp::ClearReaction))
        .collect();
    assert_eq!(
        reaction_calls,
        vec![StoreOp::SetReaction, StoreOp::ClearReaction, StoreOp::SetReaction]
    );

    let local = viewer.item(&id("s1")).unwrap();
    let server = store.item(&id("s1")).unwrap();
    assert_eq!(local.viewer_reaction, Some(Reaction::Love));
    assert_eq!(server.viewer_reaction, Some(Reaction::Love));
    assert_eq!(local.reaction_count, 1);
    assert_eq!(server.reaction_count, 1);
}

#[tokio::test(start_paused = true)]
async fn counters_stand_when_store_answers_without_them() {
    let store = store();
    store.set_report_counters(false);
    let timeline = seed(&store, "ana", &["s1"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    viewer.react(Reaction::Sad).unwrap();
    viewer.idle().await.unwrap();

    let item = viewer.item(&id("s1")).unwrap();
    assert_eq!(item.reaction_count, 1);
    assert_eq!(item.view_count, 1);
}

/// Memory store whose comment endpoint answers 200ms late.
struct SlowComments {
    inner: Arc<MemoryStatusStore>,
}

#[async_trait]
impl StatusStore for SlowComments {
    async fn list_timeline_items(&self, author_id: &str) -> Result<Vec<StatusItem>, StoreError> {
        self.inner.list_timeline_items(author_id).await
    }

    async fn create_comment(&self, status_id: &StatusId, text: &str) -> Result<Comment, StoreError> {
        sleep(ms(200)).await;
        self.inner.create_comment(status_id, text).await
    }

    async fn list_comments(
        &self,
        status_id: &StatusId,
        limit: usize,
        offset: usize,
    ) -> Result<CommentPage, StoreError> {
        self.inner.list_comments(status_id, limit, offset).await
    }

    async fn set_reaction(
        &self,
        status_id: &StatusId,
        reaction: Reaction,
    ) -> Result<Option<ItemCounters>, StoreError> {
        self.inner.set_reaction(status_id, reaction).await
    }

    async fn clear_reaction(&self, status_id: &StatusId) -> Result<Option<ItemCounters>, StoreError> {
        self.inner.clear_reaction(status_id).await
    }

    async fn record_view(&self, status_id: &StatusId) -> Result<Option<ItemCounters>, StoreError> {
        self.inner.record_view(status_id).await
    }
}

/// Item `s1` with three existing comments, opened behind a slow comment
/// endpoint and with its view already settled.
async fn open_with_slow_comments() -> (Arc<MemoryStatusStore>, StatusViewer) {
    let memory = store();
    let mut item = text_item("s1", "ana");
    item.comment_count = 3;
    memory.insert_item(item.clone());

    let viewer = StatusViewer::builder(Arc::new(SlowComments {
        inner: memory.clone(),
    }))
    .config(config())
    .spawn()
    .unwrap();
    viewer
        .open(Timeline::new(author("ana"), vec![item]), 0)
        .unwrap();
    viewer.idle().await.unwrap();
    (memory, viewer)
}

#[tokio::test(start_paused = true)]
async fn reaction_counters_keep_in_flight_comment() {
    let (memory, viewer) = open_with_slow_comments().await;

    viewer.submit_comment("hello").unwrap();
    viewer.react(Reaction::Like).unwrap();
    sleep(ms(50)).await;

    // The reaction settled with counters that predate the comment.
    let item = viewer.item(&id("s1")).unwrap();
    assert_eq!(item.reaction_count, 1);
    assert_eq!(item.comment_count, 4);

    viewer.idle().await.unwrap();
    let item = viewer.item(&id("s1")).unwrap();
    assert_eq!(item.comment_count, 4);
    assert_eq!(item.counters(), memory.item(&id("s1")).unwrap().counters());
}

#[tokio::test(start_paused = true)]
async fn failed_comment_after_reaction_settles_restores_count() {
    let (memory, viewer) = open_with_slow_comments().await;
    memory.fail(StoreOp::CreateComment);

    viewer.submit_comment("hello").unwrap();
    viewer.react(Reaction::Like).unwrap();
    sleep(ms(50)).await;
    assert_eq!(viewer.item(&id("s1")).unwrap().comment_count, 4);

    viewer.idle().await.unwrap();
    let item = viewer.item(&id("s1")).unwrap();
    assert_eq!(item.comment_count, 3);
    assert_eq!(item.reaction_count, 1);
    assert_eq!(item.viewer_reaction, Some(Reaction::Like));
    assert_eq!(memory.item(&id("s1")).unwrap().comment_count, 3);
    assert_eq!(viewer.notice().unwrap().code, error_code::MUTATION_FAILED);
}

// ========================================================================
// Comments
// ========================================================================

#[tokio::test(start_paused = true)]
async fn comment_placeholder_is_replaced_by_server_copy() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();
    viewer.idle().await.unwrap();

    store.hold();
    viewer.submit_comment("  nice one  ").unwrap();
    viewer.snapshot().await.unwrap();

    let thread = viewer.comments(&id("s1")).unwrap();
    assert_eq!(thread.comments.len(), 1);
    let placeholder = &thread.comments[0];
    assert!(placeholder.pending);
    assert!(placeholder.id.starts_with("local-"));
    assert_eq!(placeholder.text, "nice one");
    assert_eq!(viewer.item(&id("s1")).unwrap().comment_count, 1);

    store.release();
    viewer.idle().await.unwrap();

    let thread = viewer.comments(&id("s1")).unwrap();
    assert_eq!(thread.comments.len(), 1);
    let stored = &thread.comments[0];
    assert!(!stored.pending);
    assert_eq!(stored.id, "c1");
    assert_eq!(stored.author.as_ref().unwrap().id, "me");
    assert_eq!(viewer.item(&id("s1")).unwrap().comment_count, 1);
    assert_eq!(store.comments(&id("s1")).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_comment_only_undoes_itself() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    store.fail(StoreOp::CreateComment);
    viewer.submit_comment("hello").unwrap();
    viewer.idle().await.unwrap();

    let item = viewer.item(&id("s1")).unwrap();
    assert_eq!(item.comment_count, 0);
    // The view submitted at open succeeded and is kept.
    assert!(item.is_viewed);
    assert_eq!(item.view_count, 1);
    assert!(viewer.comments(&id("s1")).unwrap().comments.is_empty());
    assert_eq!(viewer.notice().unwrap().code, error_code::MUTATION_FAILED);
}

#[tokio::test(start_paused = true)]
async fn invalid_comments_are_rejected_before_sending() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    assert!(matches!(
        viewer.submit_comment("   "),
        Err(ViewerError::InvalidInput(_))
    ));
    let long = "x".repeat(501);
    assert!(matches!(
        viewer.submit_comment(&long),
        Err(ViewerError::InvalidInput(_))
    ));
    viewer.idle().await.unwrap();
    assert_eq!(store.call_count(StoreOp::CreateComment), 0);
}

#[tokio::test(start_paused = true)]
async fn comment_panel_pages_through_thread() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1"]);
    for n in 1..=3 {
        store.insert_comment(Comment {
            id: format!("old{n}"),
            status_id: id("s1"),
            author: Some(author("bob")),
            text: format!("comment {n}"),
            created_at: Utc::now(),
            pending: false,
        });
    }
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    viewer.open_comments().unwrap();
    viewer.idle().await.unwrap();

    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.pause_reasons, vec![PauseReason::CommentPanel]);
    let thread = viewer.comments(&id("s1")).unwrap();
    let ids: Vec<&str> = thread.comments.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["old1", "old2"]);
    assert!(thread.has_more);
    assert!(!thread.loading);

    viewer.load_more_comments().unwrap();
    viewer.idle().await.unwrap();
    let thread = viewer.comments(&id("s1")).unwrap();
    assert_eq!(thread.comments.len(), 3);
    assert!(!thread.has_more);

    // Nothing left to fetch.
    viewer.load_more_comments().unwrap();
    viewer.idle().await.unwrap();
    assert_eq!(store.call_count(StoreOp::ListComments), 2);

    viewer.close_comments().unwrap();
    assert_eq!(viewer.snapshot().await.unwrap().phase, Phase::Playing);
}

#[tokio::test(start_paused = true)]
async fn reopening_comment_panel_needs_one_close() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    viewer.open_comments().unwrap();
    viewer.open_comments().unwrap();
    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.pause_reasons, vec![PauseReason::CommentPanel]);

    viewer.close_comments().unwrap();
    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.phase, Phase::Playing);
    assert!(snap.pause_reasons.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_comment_page_raises_notice() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1"]);
    let viewer = spawn(&store);
    viewer.open(timeline, 0).unwrap();

    store.fail(StoreOp::ListComments);
    viewer.open_comments().unwrap();
    viewer.idle().await.unwrap();

    let thread = viewer.comments(&id("s1")).unwrap();
    assert!(!thread.loading);
    assert!(!thread.fetched);
    assert_eq!(viewer.notice().unwrap().code, error_code::LOAD_FAILED);
}

// ========================================================================
// Loading
// ========================================================================

#[tokio::test(start_paused = true)]
async fn open_author_loads_then_plays() {
    let store = store();
    seed(&store, "ana", &["s1", "s2"]);
    let viewer = spawn(&store);

    store.hold();
    viewer.open_author(author("ana"), 0).unwrap();
    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.phase, Phase::Loading);
    assert!(matches!(viewer.state().load(), Some(LoadState::Loading { .. })));

    store.release();
    viewer.idle().await.unwrap();

    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.phase, Phase::Playing);
    assert_eq!(snap.len, 2);
    assert!(matches!(viewer.state().load(), Some(LoadState::Loaded { .. })));
}

#[tokio::test(start_paused = true)]
async fn failed_load_can_be_retried() {
    let store = store();
    seed(&store, "ana", &["s1"]);
    let viewer = spawn(&store);

    store.fail(StoreOp::ListTimeline);
    viewer.open_author(author("ana"), 0).unwrap();
    viewer.idle().await.unwrap();

    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.phase, Phase::LoadFailed);
    assert_eq!(snap.author.unwrap().id, "ana");
    assert!(matches!(viewer.state().load(), Some(LoadState::Failed { .. })));
    assert_eq!(viewer.notice().unwrap().code, error_code::LOAD_FAILED);

    store.recover(StoreOp::ListTimeline);
    viewer.retry_load().unwrap();
    viewer.idle().await.unwrap();

    assert_eq!(viewer.snapshot().await.unwrap().phase, Phase::Playing);
    assert_eq!(store.call_count(StoreOp::ListTimeline), 2);
}

#[tokio::test(start_paused = true)]
async fn author_without_statuses_fails_to_load() {
    let store = store();
    let viewer = spawn(&store);

    viewer.open_author(author("ghost"), 0).unwrap();
    viewer.idle().await.unwrap();

    assert_eq!(viewer.snapshot().await.unwrap().phase, Phase::LoadFailed);
    match viewer.state().load() {
        Some(LoadState::Failed { message, .. }) => assert!(message.contains("no active")),
        other => panic!("unexpected load state: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn retry_without_failed_load_does_nothing() {
    let store = store();
    let viewer = spawn(&store);

    viewer.retry_load().unwrap();
    viewer.idle().await.unwrap();

    assert_eq!(store.call_count(StoreOp::ListTimeline), 0);
    assert_eq!(viewer.snapshot().await.unwrap().phase, Phase::Closed);
}

// ========================================================================
// Close
// ========================================================================

#[tokio::test(start_paused = true)]
async fn results_after_close_are_discarded() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1"]);
    let viewer = spawn(&store);

    store.hold();
    viewer.open(timeline, 0).unwrap();
    viewer.react(Reaction::Laugh).unwrap();
    viewer.close().unwrap();
    assert_eq!(viewer.snapshot().await.unwrap().phase, Phase::Closed);

    let changes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&changes);
    viewer.subscribe("viewer/#", move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    store.release();
    sleep(ms(100)).await;
    viewer.idle().await.unwrap();

    assert_eq!(changes.load(Ordering::SeqCst), 0);
    // The calls themselves still reached the store.
    assert_eq!(store.call_count(StoreOp::SetReaction), 1);
}

#[tokio::test(start_paused = true)]
async fn load_after_close_is_discarded() {
    let store = store();
    seed(&store, "ana", &["s1"]);
    let viewer = spawn(&store);

    store.hold();
    viewer.open_author(author("ana"), 0).unwrap();
    viewer.close().unwrap();
    store.release();
    sleep(ms(100)).await;

    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.phase, Phase::Closed);
    assert_eq!(viewer.state().load(), Some(LoadState::Idle));
}

#[tokio::test(start_paused = true)]
async fn inputs_while_closed_are_ignored() {
    let store = store();
    let viewer = spawn(&store);

    viewer.next().unwrap();
    viewer.react(Reaction::Like).unwrap();
    viewer.pause(PauseReason::Hold).unwrap();
    viewer.open_comments().unwrap();
    viewer.idle().await.unwrap();

    assert_eq!(viewer.snapshot().await.unwrap().phase, Phase::Closed);
    assert!(store.calls().is_empty());
}

// ========================================================================
// Continuation
// ========================================================================

#[tokio::test(start_paused = true)]
async fn continues_into_next_timeline() {
    let store = store();
    let ana = seed(&store, "ana", &["a1"]);
    let bob = seed(&store, "bob", &["b1", "b2"]);
    let viewer = StatusViewer::builder(store.clone())
        .config(config())
        .continuation(Tray {
            timelines: vec![ana.clone(), bob],
        })
        .spawn()
        .unwrap();
    viewer.open(ana, 0).unwrap();

    sleep(ms(1_005)).await;
    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.author.unwrap().id, "bob");
    assert_eq!(snap.current_index, 0);
    assert_eq!(snap.len, 2);
    assert!(viewer.item(&id("a1")).is_none());
}

#[tokio::test(start_paused = true)]
async fn previous_timeline_opens_at_its_last_item() {
    let store = store();
    let ana = seed(&store, "ana", &["a1", "a2"]);
    let bob = seed(&store, "bob", &["b1"]);
    let viewer = StatusViewer::builder(store.clone())
        .config(config())
        .continuation(Tray {
            timelines: vec![ana, bob.clone()],
        })
        .spawn()
        .unwrap();
    viewer.open(bob, 0).unwrap();

    viewer.previous().unwrap();
    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.author.unwrap().id, "ana");
    assert_eq!(snap.current_index, 1);
}

struct LoadNext;

impl TimelineContinuation for LoadNext {
    fn next(&self, current: &AuthorRef) -> Option<Continuation> {
        (current.id == "ana").then(|| Continuation::Author(author("bob")))
    }

    fn previous(&self, _current: &AuthorRef) -> Option<Continuation> {
        None
    }
}

#[tokio::test(start_paused = true)]
async fn continuation_can_load_from_store() {
    let store = store();
    let ana = seed(&store, "ana", &["a1"]);
    seed(&store, "bob", &["b1"]);
    let viewer = StatusViewer::builder(store.clone())
        .config(config())
        .continuation(LoadNext)
        .spawn()
        .unwrap();
    viewer.open(ana, 0).unwrap();

    viewer.next().unwrap();
    viewer.idle().await.unwrap();

    let snap = viewer.snapshot().await.unwrap();
    assert_eq!(snap.phase, Phase::Playing);
    assert_eq!(snap.author.unwrap().id, "bob");

    // bob has no successor.
    viewer.next().unwrap();
    assert_eq!(viewer.snapshot().await.unwrap().phase, Phase::Closed);
}

// ========================================================================
// Observation
// ========================================================================

#[tokio::test(start_paused = true)]
async fn subscribers_see_item_updates() {
    let store = store();
    let timeline = seed(&store, "ana", &["s1", "s2"]);
    let viewer = spawn(&store);

    let updates = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&updates);
    let sub = viewer.subscribe("viewer/items/+", move |path, value| {
        assert!(path.starts_with("viewer/items/"));
        assert!(value.as_item().is_some());
        counter.fetch_add(1, Ordering::SeqCst);
    });

    viewer.open(timeline, 0).unwrap();
    viewer.idle().await.unwrap();
    let seen = updates.load(Ordering::SeqCst);
    // Two items published at open, then the view applied and confirmed.
    assert!(seen >= 3);

    assert!(viewer.unsubscribe(sub));
    viewer.react(Reaction::Like).unwrap();
    viewer.idle().await.unwrap();
    assert_eq!(updates.load(Ordering::SeqCst), seen);
}

#[tokio::test(start_paused = true)]
async fn handle_reports_closed_loop() {
    let store = store();
    let viewer = spawn(&store);
    let state = Arc::clone(viewer.state());
    drop(viewer);
    sleep(ms(10)).await;

    // The loop is gone; the last published state stays readable.
    assert_eq!(state.playback().unwrap().phase, Phase::Closed);
}
