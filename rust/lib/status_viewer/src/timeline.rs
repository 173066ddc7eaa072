use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{AuthorRef, StatusId, StatusItem};

/// One author's statuses, in playback order.
///
/// The list is a snapshot: items that appear on the server after the
/// viewer opened it are not merged in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub author: AuthorRef,
    pub items: Vec<StatusItem>,
}

impl Timeline {
    pub fn new(author: AuthorRef, items: Vec<StatusItem>) -> Self {
        Self { author, items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&StatusItem> {
        self.items.get(index)
    }

    pub fn position(&self, id: &StatusId) -> Option<usize> {
        self.items.iter().position(|item| &item.id == id)
    }

    pub fn find_mut(&mut self, id: &StatusId) -> Option<&mut StatusItem> {
        self.items.iter_mut().find(|item| &item.id == id)
    }

    pub fn live_count(&self, now: DateTime<Utc>) -> usize {
        self.items.iter().filter(|item| !item.is_expired(now)).count()
    }

    /// Drop expired items. `start` is an index into the original list; the
    /// return value is the matching index into the filtered list (the next
    /// live item at or after it, else the last live item).
    pub fn retain_live(&mut self, start: usize, now: DateTime<Utc>) -> usize {
        let mut kept_before_start = 0;
        let mut index = 0;
        self.items.retain(|item| {
            let live = !item.is_expired(now);
            if live && index < start {
                kept_before_start += 1;
            }
            index += 1;
            live
        });
        kept_before_start.min(self.items.len().saturating_sub(1))
    }

    pub fn has_unviewed(&self) -> bool {
        self.items.iter().any(|item| !item.is_viewed)
    }

    pub fn latest_created_at(&self) -> Option<DateTime<Utc>> {
        self.items.iter().map(|item| item.created_at).max()
    }
}

/// Order timelines for a story tray: the viewer's own first, then authors
/// with unviewed statuses, then most recently updated. Stable otherwise.
pub fn order_timelines(timelines: &mut [Timeline], viewer_id: &str) {
    timelines.sort_by(|a, b| {
        let own = |t: &Timeline| t.author.id != viewer_id;
        let seen = |t: &Timeline| !t.has_unviewed();
        own(a)
            .cmp(&own(b))
            .then_with(|| seen(a).cmp(&seen(b)))
            .then_with(|| b.latest_created_at().cmp(&a.latest_created_at()))
    });
}
