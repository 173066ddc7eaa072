//! Status records as the remote store returns them.
//!
//! The store speaks flat JSON (`status_type` + optional `content` /
//! `media_url`); [`StatusItem`] decodes that into a closed [`StatusKind`]
//! so every consumer matches exhaustively instead of comparing strings.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Statuses live for 24 hours after creation (enforced server-side).
pub const STATUS_LIFETIME_HOURS: i64 = 24;

/// Background used when the author did not pick one.
pub const DEFAULT_BACKGROUND: &str = "#000000";

/// Opaque status identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusId(String);

impl StatusId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StatusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Author summary attached to timelines and comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRef {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl AuthorRef {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_url: None,
        }
    }
}

impl fmt::Display for AuthorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

/// What a status shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusKind {
    Text { content: String },
    Image { media_ref: String },
    Video { media_ref: String },
}

impl StatusKind {
    /// Wire discriminator used by the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Text { .. } => "text",
            StatusKind::Image { .. } => "image",
            StatusKind::Video { .. } => "video",
        }
    }

    pub fn media_ref(&self) -> Option<&str> {
        match self {
            StatusKind::Text { .. } => None,
            StatusKind::Image { media_ref } | StatusKind::Video { media_ref } => Some(media_ref),
        }
    }
}

/// The fixed reaction set offered by the picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reaction {
    #[serde(rename = "👍")]
    Like,
    #[serde(rename = "❤️")]
    Love,
    #[serde(rename = "😂")]
    Laugh,
    #[serde(rename = "😮")]
    Wow,
    #[serde(rename = "😢")]
    Sad,
}

impl Reaction {
    pub const ALL: [Reaction; 5] = [
        Reaction::Like,
        Reaction::Love,
        Reaction::Laugh,
        Reaction::Wow,
        Reaction::Sad,
    ];

    pub fn as_emoji(self) -> &'static str {
        match self {
            Reaction::Like => "👍",
            Reaction::Love => "❤️",
            Reaction::Laugh => "😂",
            Reaction::Wow => "😮",
            Reaction::Sad => "😢",
        }
    }

    pub fn from_emoji(emoji: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_emoji() == emoji)
    }
}

impl fmt::Display for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_emoji())
    }
}

/// Authoritative counters, when the store sends them back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCounters {
    pub view_count: u32,
    pub reaction_count: u32,
    pub comment_count: u32,
}

/// A single ephemeral status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StatusRecord", into = "StatusRecord")]
pub struct StatusItem {
    pub id: StatusId,
    pub author_id: String,
    pub kind: StatusKind,
    pub background_color: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub view_count: u32,
    pub reaction_count: u32,
    pub comment_count: u32,
    pub viewer_reaction: Option<Reaction>,
    pub is_viewed: bool,
}

impl StatusItem {
    /// Build a fresh status with zeroed counters and the standard lifetime.
    pub fn new(
        id: impl Into<String>,
        author_id: impl Into<String>,
        kind: StatusKind,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: StatusId::new(id),
            author_id: author_id.into(),
            kind,
            background_color: DEFAULT_BACKGROUND.to_string(),
            created_at,
            expires_at: created_at + Duration::hours(STATUS_LIFETIME_HOURS),
            view_count: 0,
            reaction_count: 0,
            comment_count: 0,
            viewer_reaction: None,
            is_viewed: false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Time left before the status disappears, never negative.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }

    pub fn counters(&self) -> ItemCounters {
        ItemCounters {
            view_count: self.view_count,
            reaction_count: self.reaction_count,
            comment_count: self.comment_count,
        }
    }

    pub fn apply_counters(&mut self, counters: ItemCounters) {
        self.view_count = counters.view_count;
        self.reaction_count = counters.reaction_count;
        self.comment_count = counters.comment_count;
    }
}

/// Flat wire shape of a status record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatusRecord {
    id: StatusId,
    author_id: String,
    status_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    media_url: Option<String>,
    #[serde(default)]
    background_color: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    view_count: u32,
    #[serde(default)]
    reaction_count: u32,
    #[serde(default)]
    comment_count: u32,
    #[serde(default)]
    viewer_reaction: Option<Reaction>,
    #[serde(default)]
    is_viewed: bool,
}

impl TryFrom<StatusRecord> for StatusItem {
    type Error = String;

    fn try_from(record: StatusRecord) -> Result<Self, Self::Error> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let kind = match record.status_type.as_str() {
            "text" => StatusKind::Text {
                content: non_empty(record.content)
                    .ok_or_else(|| format!("text status {} has no content", record.id))?,
            },
            "image" => StatusKind::Image {
                media_ref: non_empty(record.media_url)
                    .ok_or_else(|| format!("image status {} has no media_url", record.id))?,
            },
            "video" => StatusKind::Video {
                media_ref: non_empty(record.media_url)
                    .ok_or_else(|| format!("video status {} has no media_url", record.id))?,
            },
            other => return Err(format!("unknown status_type '{other}'")),
        };

        Ok(Self {
            id: record.id,
            author_id: record.author_id,
            kind,
            background_color: record
                .background_color
                .unwrap_or_else(|| DEFAULT_BACKGROUND.to_string()),
            expires_at: record
                .expires_at
                .unwrap_or(record.created_at + Duration::hours(STATUS_LIFETIME_HOURS)),
            created_at: record.created_at,
            view_count: record.view_count,
            reaction_count: record.reaction_count,
            comment_count: record.comment_count,
            viewer_reaction: record.viewer_reaction,
            is_viewed: record.is_viewed,
        })
    }
}

impl From<StatusItem> for StatusRecord {
    fn from(item: StatusItem) -> Self {
        let status_type = item.kind.as_str().to_string();
        let (content, media_url) = match item.kind {
            StatusKind::Text { content } => (Some(content), None),
            StatusKind::Image { media_ref } | StatusKind::Video { media_ref } => {
                (None, Some(media_ref))
            }
        };
        Self {
            id: item.id,
            author_id: item.author_id,
            status_type,
            content,
            media_url,
            background_color: Some(item.background_color),
            created_at: item.created_at,
            expires_at: Some(item.expires_at),
            view_count: item.view_count,
            reaction_count: item.reaction_count,
            comment_count: item.comment_count,
            viewer_reaction: item.viewer_reaction,
            is_viewed: item.is_viewed,
        }
    }
}

/// A comment on a status.
///
/// While a submission is in flight the list holds a local placeholder
/// (`pending == true`, id `local-N`) that is swapped for the server copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub status_id: StatusId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorRef>,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub pending: bool,
}

impl Comment {
    pub fn placeholder(seq: u64, status_id: StatusId, text: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("local-{seq}"),
            status_id,
            author: None,
            text: text.to_string(),
            created_at: now,
            pending: true,
        }
    }
}

/// One page of comments from `list_comments`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentPage {
    pub comments: Vec<Comment>,
    pub has_more: bool,
}
