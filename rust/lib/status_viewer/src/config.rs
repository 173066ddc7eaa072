use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ViewerError;

/// Viewer tuning knobs.
///
/// Every field has a default, so a host app can deserialize a partial
/// section from its own settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// How long each status stays on screen (milliseconds).
    pub item_duration_ms: u64,
    /// Frame timer period (milliseconds).
    pub frame_interval_ms: u64,
    /// Horizontal drag distance that counts as navigation (pixels).
    pub drag_threshold_px: f32,
    /// Longest accepted comment, in characters after trimming.
    pub max_comment_chars: usize,
    /// Comments fetched per page.
    pub comment_page_size: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            item_duration_ms: 5_000,
            frame_interval_ms: 16,
            drag_threshold_px: 100.0,
            max_comment_chars: 500,
            comment_page_size: 20,
        }
    }
}

impl ViewerConfig {
    pub fn item_duration(&self) -> Duration {
        Duration::from_millis(self.item_duration_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ViewerError> {
        if self.item_duration_ms == 0 {
            return Err(ViewerError::Config("item_duration_ms must be positive".into()));
        }
        if self.frame_interval_ms == 0 || self.frame_interval_ms > self.item_duration_ms {
            return Err(ViewerError::Config(format!(
                "frame_interval_ms must be in 1..={}",
                self.item_duration_ms
            )));
        }
        if !(self.drag_threshold_px.is_finite() && self.drag_threshold_px > 0.0) {
            return Err(ViewerError::Config("drag_threshold_px must be positive".into()));
        }
        if self.max_comment_chars == 0 {
            return Err(ViewerError::Config("max_comment_chars must be positive".into()));
        }
        if self.comment_page_size == 0 {
            return Err(ViewerError::Config("comment_page_size must be positive".into()));
        }
        Ok(())
    }
}
