//! Status viewer: playback clock and engagement sync for ephemeral
//! author statuses.
//!
//! A viewer plays one author's timeline item by item, advancing on a
//! fixed per-item duration unless something holds it (comment panel,
//! reaction picker, press-and-hold, drag, text input). Reactions,
//! comments and views are applied locally first and reconciled with the
//! remote [`StatusStore`] afterwards; failures roll the local change back
//! and raise a notice.
//!
//! # Architecture
//!
//! - [`StatusViewer`]: handle; every input becomes a command
//! - the viewer loop: a single tokio task that owns all mutable state
//!   and serializes UI input, frame ticks and remote completions
//! - [`ViewerStore`]: path-keyed observable state the UI renders from
//!
//! # Paths
//!
//! - `viewer/playback`: phase, index, progress, pause reasons
//! - `viewer/items/{id}`: counters, reaction and viewed flag per status
//! - `viewer/comments/{id}`: loaded comment thread
//! - `viewer/notice`: latest transient error
//! - `viewer/load`: remote timeline fetch progress
//!
//! Subscriptions take MQTT-style patterns (`viewer/items/+`, `viewer/#`).
//!
//! # Example
//!
//! ```ignore
//! use status_viewer::{StatusViewer, MemoryStatusStore, AuthorRef};
//!
//! let store = Arc::new(MemoryStatusStore::new(AuthorRef::new("me", "Me")));
//! let viewer = StatusViewer::spawn(store)?;
//!
//! viewer.subscribe("viewer/#", |path, value| {
//!     println!("{path} changed");
//! });
//!
//! viewer.open_author(AuthorRef::new("ana", "Ana"), 0)?;
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod mutation;
pub mod pause;
pub mod playback;
pub mod state;
pub mod store;
pub mod timeline;
pub mod topic;
pub mod viewer;

// Re-export primary types at crate root.
pub use config::ViewerConfig;
pub use controller::{Continuation, TimelineContinuation};
pub use error::{StoreError, ViewerError, error_code};
pub use model::{
    AuthorRef, Comment, CommentPage, ItemCounters, Reaction, StatusId, StatusItem, StatusKind,
};
pub use mutation::MutationKind;
pub use pause::PauseReason;
pub use playback::Phase;
pub use state::{
    ChangeHandler, CommentThread, LoadState, PlaybackSnapshot, SubscriptionId, ViewerNotice,
    ViewerState, ViewerStore,
};
pub use store::{MemoryStatusStore, StatusStore, StoreOp};
pub use timeline::{Timeline, order_timelines};
pub use viewer::{StatusViewer, StatusViewerBuilder, validate_comment};
