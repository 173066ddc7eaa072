use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Why playback is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PauseReason {
    /// Comment panel open.
    CommentPanel,
    /// Reaction picker open.
    ReactionPicker,
    /// Press-and-hold on the content area.
    Hold,
    /// Drag gesture in progress.
    Drag,
    /// A text field has focus.
    TextInput,
}

/// Multiset of active pause reasons.
///
/// Sources overlap (the comment panel is open *and* its text field has
/// focus), so each reason is counted and playback resumes only when every
/// count is back to zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PauseReasons {
    counts: BTreeMap<PauseReason, u32>,
}

impl PauseReasons {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one hold for `reason`. Returns true if this paused playback.
    pub fn insert(&mut self, reason: PauseReason) -> bool {
        let was_empty = self.is_empty();
        *self.counts.entry(reason).or_insert(0) += 1;
        was_empty
    }

    /// Release one hold for `reason`. Returns true if nothing holds playback
    /// any more. Releasing an inactive reason is a no-op and returns false.
    pub fn remove(&mut self, reason: PauseReason) -> bool {
        let Some(count) = self.counts.get_mut(&reason) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            self.counts.remove(&reason);
        }
        self.is_empty()
    }

    /// Drop every hold for `reason`. Returns true if nothing holds playback
    /// any more and something was released.
    pub fn remove_all(&mut self, reason: PauseReason) -> bool {
        self.counts.remove(&reason).is_some() && self.is_empty()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    pub fn contains(&self, reason: PauseReason) -> bool {
        self.counts.contains_key(&reason)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Active reasons in a stable order.
    pub fn active(&self) -> Vec<PauseReason> {
        self.counts.keys().copied().collect()
    }
}
