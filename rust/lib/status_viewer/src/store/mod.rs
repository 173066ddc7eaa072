//! The remote status store the viewer talks to.
//!
//! Production apps implement [`StatusStore`] over their HTTP client; the
//! viewer only depends on this trait. [`MemoryStatusStore`] is an
//! in-process implementation for tests and offline embedding.

pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{Comment, CommentPage, ItemCounters, Reaction, StatusId, StatusItem};

pub use memory::{MemoryStatusStore, StoreOp};

/// Remote status endpoints.
///
/// Mutation endpoints may return the item's authoritative counters; `None`
/// means the endpoint answered without a body and local estimates stand.
#[async_trait]
pub trait StatusStore: Send + Sync + 'static {
    /// Active statuses of one author, in display order.
    async fn list_timeline_items(&self, author_id: &str) -> Result<Vec<StatusItem>, StoreError>;

    async fn create_comment(&self, status_id: &StatusId, text: &str) -> Result<Comment, StoreError>;

    /// Newest first.
    async fn list_comments(
        &self,
        status_id: &StatusId,
        limit: usize,
        offset: usize,
    ) -> Result<CommentPage, StoreError>;

    async fn set_reaction(
        &self,
        status_id: &StatusId,
        reaction: Reaction,
    ) -> Result<Option<ItemCounters>, StoreError>;

    async fn clear_reaction(&self, status_id: &StatusId) -> Result<Option<ItemCounters>, StoreError>;

    /// Idempotent on the server.
    async fn record_view(&self, status_id: &StatusId) -> Result<Option<ItemCounters>, StoreError>;
}
