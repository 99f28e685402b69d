use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{config::CommentRules, models::user::AuthorProfile};

/// A comment on an event. Replies point at their parent and at the top-level
/// comment of their thread, so a whole thread can be fetched with one filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub event_id: i64,
    pub author_id: i64,
    pub text: String,
    pub parent_id: Option<i64>,
    /// Depth-0 ancestor. `None` exactly when `depth == 0`.
    pub root_id: Option<i64>,
    pub depth: i32,
    pub attachments: Vec<Attachment>,
    pub is_deleted: bool,
    /// Bumped on every persisted mutation; updates must present the version they read.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl Comment {
    /// Id of the thread this comment belongs to.
    pub fn thread_root_id(&self) -> i64 {
        self.root_id.unwrap_or(self.id)
    }

    pub fn attachment(&self, attachment_id: Uuid) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.id == attachment_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    File,
}

impl AttachmentKind {
    pub fn from_mime(mimetype: &str) -> Self {
        if mimetype.starts_with("image/") {
            AttachmentKind::Image
        } else {
            AttachmentKind::File
        }
    }
}

/// Reference to a stored file, embedded in a comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub url: String,
    pub filename: String,
    pub size: i64,
    pub mimetype: String,
}

/// Record handed to `CommentRepository::insert`; id, version and timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub event_id: i64,
    pub author_id: i64,
    pub text: String,
    pub parent_id: Option<i64>,
    pub root_id: Option<i64>,
    pub depth: i32,
    pub attachments: Vec<Attachment>,
}

impl NewComment {
    /// Record invariants a store enforces on insert, whoever built the record.
    pub fn check_shape(&self, rules: &CommentRules) -> Result<(), String> {
        if self.depth < 0 {
            return Err("Comment depth cannot be negative".to_string());
        }
        if self.depth > rules.max_depth {
            return Err(format!(
                "Comment depth {} exceeds maximum {}",
                self.depth, rules.max_depth
            ));
        }
        if self.text.chars().count() > rules.max_text_length {
            return Err(format!(
                "Comment text exceeds {} characters",
                rules.max_text_length
            ));
        }
        if (self.depth == 0) != self.root_id.is_none() {
            return Err("Root reference must be set exactly for replies".to_string());
        }
        if (self.depth == 0) != self.parent_id.is_none() {
            return Err("Parent reference must be set exactly for replies".to_string());
        }
        if self.text.trim().is_empty() && self.attachments.is_empty() {
            return Err("Comment must have either text or attachments".to_string());
        }
        Ok(())
    }
}

/// Partial update applied by `CommentRepository::update`. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct CommentPatch {
    pub text: Option<String>,
    pub attachments: Option<Vec<Attachment>>,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: Option<bool>,
}

impl CommentPatch {
    pub fn apply(self, comment: &mut Comment) {
        if let Some(text) = self.text {
            comment.text = text;
        }
        if let Some(attachments) = self.attachments {
            comment.attachments = attachments;
        }
        if let Some(edited_at) = self.edited_at {
            comment.edited_at = Some(edited_at);
        }
        if let Some(is_deleted) = self.is_deleted {
            // Soft delete is one-way.
            comment.is_deleted = comment.is_deleted || is_deleted;
        }
    }
}

/// Comment as returned to callers, with the author projection attached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: i64,
    pub event_id: i64,
    pub author_id: i64,
    pub author: Option<AuthorProfile>,
    pub text: String,
    pub parent_id: Option<i64>,
    pub root_id: Option<i64>,
    pub depth: i32,
    pub attachments: Vec<Attachment>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl CommentResponse {
    pub fn new(comment: Comment, author: Option<AuthorProfile>) -> Self {
        Self {
            id: comment.id,
            event_id: comment.event_id,
            author_id: comment.author_id,
            author,
            text: comment.text,
            parent_id: comment.parent_id,
            root_id: comment.root_id,
            depth: comment.depth,
            attachments: comment.attachments,
            is_deleted: comment.is_deleted,
            created_at: comment.created_at,
            edited_at: comment.edited_at,
        }
    }
}

/// A file received from the client, not yet stored.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Text fields of the create/update multipart form.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CommentForm {
    pub text: Option<String>,

    /// Optional: the ID of the comment being replied to.
    #[validate(range(min = 1, message = "Parent comment id must be positive"))]
    pub parent_comment_id: Option<i64>,
}

/// Input for `CommentService::create_comment`.
#[derive(Debug, Clone, Default)]
pub struct CreateComment {
    pub text: String,
    pub parent_id: Option<i64>,
    pub uploads: Vec<UploadedFile>,
}

/// Input for `CommentService::update_comment`.
#[derive(Debug, Clone, Default)]
pub struct UpdateComment {
    /// Blank or missing text keeps the current text.
    pub text: Option<String>,
    pub uploads: Vec<UploadedFile>,
}

/// Root-level comments of an event with their nested replies.
#[derive(Debug, Clone, Serialize)]
pub struct EventCommentsResponse {
    pub comments: Vec<crate::services::thread::ThreadNode<CommentResponse>>,
    /// Number of non-deleted comments on the event.
    pub total: usize,
}

/// A single thread, rooted at its depth-0 comment.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadResponse {
    pub comment: crate::services::thread::ThreadNode<CommentResponse>,
    /// Thread members whose parent could not be found, shown as their own roots.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub detached: Vec<crate::services::thread::ThreadNode<CommentResponse>>,
    /// Number of non-deleted comments in the thread.
    pub total: usize,
}
