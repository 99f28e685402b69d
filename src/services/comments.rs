use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use uuid::Uuid;

use crate::{
    config::CommentRules,
    error::AppError,
    models::comment::{
        Attachment, AttachmentKind, Comment, CommentPatch, CommentResponse, CreateComment,
        EventCommentsResponse, NewComment, ThreadResponse, UpdateComment, UploadedFile,
    },
    repositories::{CommentRepository, EventLookup, ProfileLookup},
    services::{
        attachments::{AttachmentStore, StoredFile},
        thread::{ThreadRoots, build_threads},
    },
    utils::html::strip_markup,
};

/// Business rules and orchestration for event comments.
///
/// Callers go through this type only; it checks ownership, depth and content
/// rules, keeps attachment files in step with comment records, and reshapes
/// flat listings into reply trees.
#[derive(Clone)]
pub struct CommentService {
    comments: Arc<dyn CommentRepository>,
    events: Arc<dyn EventLookup>,
    profiles: Arc<dyn ProfileLookup>,
    attachments: Arc<dyn AttachmentStore>,
    rules: CommentRules,
}

impl CommentService {
    pub fn new(
        comments: Arc<dyn CommentRepository>,
        events: Arc<dyn EventLookup>,
        profiles: Arc<dyn ProfileLookup>,
        attachments: Arc<dyn AttachmentStore>,
        rules: CommentRules,
    ) -> Self {
        Self {
            comments,
            events,
            profiles,
            attachments,
            rules,
        }
    }

    pub fn rules(&self) -> &CommentRules {
        &self.rules
    }

    /// Create a comment or a reply.
    ///
    /// Uploads are stored before the record is inserted; if the insert fails the
    /// stored files are deleted again.
    pub async fn create_comment(
        &self,
        event_id: i64,
        author_id: i64,
        input: CreateComment,
    ) -> Result<CommentResponse, AppError> {
        let text = self.prepare_text(&input.text)?;
        if text.is_empty() && input.uploads.is_empty() {
            return Err(AppError::BadRequest(
                "Comment must have either text or attachments".to_string(),
            ));
        }
        self.check_uploads(0, &input.uploads)?;

        self.events
            .find_event_by_id(event_id)
            .await?
            .ok_or(AppError::NotFound("Event not found".to_string()))?;

        // Logic for root_id, parent_id and depth
        let (parent_id, root_id, depth) = match input.parent_id {
            Some(pid) => {
                let parent = self
                    .comments
                    .get_by_id(pid)
                    .await?
                    .filter(|parent| parent.event_id == event_id)
                    .ok_or(AppError::NotFound("Parent comment not found".to_string()))?;

                let depth = parent.depth + 1;
                if depth > self.rules.max_depth {
                    return Err(AppError::DepthExceeded {
                        depth,
                        max_depth: self.rules.max_depth,
                    });
                }

                // A reply's root is the parent's root, or the parent itself if it is top-level.
                (Some(parent.id), Some(parent.thread_root_id()), depth)
            }
            None => (None, None, 0),
        };

        let attachments = self.store_uploads(input.uploads).await?;

        let record = NewComment {
            event_id,
            author_id,
            text,
            parent_id,
            root_id,
            depth,
            attachments,
        };
        let stored = record.attachments.clone();

        let comment = match self.comments.insert(record).await {
            Ok(comment) => comment,
            Err(e) => {
                self.discard(&stored).await;
                return Err(e);
            }
        };

        tracing::info!(
            comment_id = comment.id,
            event_id,
            depth = comment.depth,
            attachments = comment.attachments.len(),
            "Comment created"
        );

        Ok(self.respond(comment).await)
    }

    /// All live comments of an event, nested under their top-level comments.
    pub async fn get_comments_for_event(
        &self,
        event_id: i64,
    ) -> Result<EventCommentsResponse, AppError> {
        self.events
            .find_event_by_id(event_id)
            .await?
            .ok_or(AppError::NotFound("Event not found".to_string()))?;

        let comments = self.comments.list_by_event(event_id, true).await?;
        let total = comments.len();
        let responses = self.respond_all(comments).await?;

        Ok(EventCommentsResponse {
            comments: build_threads(responses, ThreadRoots::TopLevel),
            total,
        })
    }

    /// The whole thread containing `comment_id`, rooted at its top-level comment.
    ///
    /// Deleted comments are kept as placeholders so the thread keeps its shape.
    pub async fn get_thread(&self, comment_id: i64) -> Result<ThreadResponse, AppError> {
        let comment = self.load(comment_id).await?;
        let root_id = comment.thread_root_id();

        let comments = self.comments.list_by_thread(root_id, false).await?;
        let total = comments.iter().filter(|c| !c.is_deleted).count();
        let responses = self.respond_all(comments).await?;

        let mut forest = build_threads(responses, ThreadRoots::Comment(root_id));
        let root_pos = forest
            .iter()
            .position(|node| node.item.id == root_id)
            .ok_or(AppError::NotFound("Thread root not found".to_string()))?;
        let root = forest.remove(root_pos);

        Ok(ThreadResponse {
            comment: root,
            detached: forest,
            total,
        })
    }

    /// Edit text and/or append attachments. Existing attachments are never replaced.
    pub async fn update_comment(
        &self,
        comment_id: i64,
        requester_id: i64,
        input: UpdateComment,
    ) -> Result<CommentResponse, AppError> {
        let comment = self.load(comment_id).await?;
        ensure_author(&comment, requester_id, "You can only edit your own comments")?;
        if comment.is_deleted {
            return Err(AppError::InvalidState(
                "Cannot edit a deleted comment".to_string(),
            ));
        }

        // Blank text keeps what is there.
        let new_text = match input.text {
            Some(raw) => Some(self.prepare_text(&raw)?).filter(|t| !t.is_empty()),
            None => None,
        };
        self.check_uploads(comment.attachments.len(), &input.uploads)?;

        let text_after = new_text.as_deref().unwrap_or(&comment.text);
        if text_after.trim().is_empty() && comment.attachments.is_empty() && input.uploads.is_empty()
        {
            return Err(AppError::BadRequest(
                "Comment must have either text or attachments".to_string(),
            ));
        }

        let added = self.store_uploads(input.uploads).await?;
        let attachments = if added.is_empty() {
            None
        } else {
            let mut all = comment.attachments.clone();
            all.extend(added.iter().cloned());
            Some(all)
        };

        let patch = CommentPatch {
            text: new_text,
            attachments,
            edited_at: Some(Utc::now()),
            is_deleted: None,
        };

        let updated = match self.comments.update(comment.id, patch, comment.version).await {
            Ok(updated) => updated,
            Err(e) => {
                self.discard(&added).await;
                return Err(e);
            }
        };

        tracing::info!(comment_id = updated.id, added = added.len(), "Comment updated");

        Ok(self.respond(updated).await)
    }

    /// Soft delete. The record keeps its thread links; text becomes the placeholder
    /// and attachments are dropped. Deleting twice is rejected.
    pub async fn delete_comment(&self, comment_id: i64, requester_id: i64) -> Result<(), AppError> {
        let comment = self.load(comment_id).await?;
        ensure_author(&comment, requester_id, "You can only delete your own comments")?;
        if comment.is_deleted {
            return Err(AppError::InvalidState(
                "Comment is already deleted".to_string(),
            ));
        }

        let patch = CommentPatch {
            text: Some(self.rules.deleted_placeholder.clone()),
            attachments: Some(Vec::new()),
            edited_at: None,
            is_deleted: Some(true),
        };
        self.comments.update(comment.id, patch, comment.version).await?;

        // Files go after the record so a failed update never leaves dangling references.
        self.discard(&comment.attachments).await;

        tracing::info!(
            comment_id = comment.id,
            event_id = comment.event_id,
            "Comment deleted"
        );

        Ok(())
    }

    /// Drop one attachment from a comment, as long as the comment keeps some content.
    pub async fn remove_attachment(
        &self,
        comment_id: i64,
        requester_id: i64,
        attachment_id: Uuid,
    ) -> Result<CommentResponse, AppError> {
        let comment = self.load(comment_id).await?;
        ensure_author(&comment, requester_id, "You can only modify your own comments")?;
        if comment.is_deleted {
            return Err(AppError::InvalidState(
                "Cannot modify a deleted comment".to_string(),
            ));
        }

        let removed = comment
            .attachment(attachment_id)
            .cloned()
            .ok_or(AppError::NotFound("Attachment not found".to_string()))?;

        let remaining: Vec<Attachment> = comment
            .attachments
            .iter()
            .filter(|a| a.id != attachment_id)
            .cloned()
            .collect();

        if comment.text.trim().is_empty() && remaining.is_empty() {
            return Err(AppError::BadRequest(
                "Cannot remove attachment. Comment must have either text or attachments."
                    .to_string(),
            ));
        }

        let patch = CommentPatch {
            attachments: Some(remaining),
            edited_at: Some(Utc::now()),
            ..Default::default()
        };
        let updated = self.comments.update(comment.id, patch, comment.version).await?;

        self.discard(std::slice::from_ref(&removed)).await;

        Ok(self.respond(updated).await)
    }

    /// Deletes stored files that no live comment references. Returns how many were removed.
    ///
    /// Meant to run while no uploads are in flight (e.g. at start-up): a file
    /// stored for a comment that is not inserted yet looks orphaned.
    pub async fn sweep_orphaned_attachments(&self) -> Result<usize, AppError> {
        let referenced: HashSet<String> = self
            .comments
            .referenced_attachment_urls()
            .await?
            .into_iter()
            .collect();

        let mut removed = 0;
        for url in self.attachments.list_urls().await? {
            if referenced.contains(&url) {
                continue;
            }
            match self.attachments.delete(&url).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to remove orphaned attachment {}: {:?}", url, e),
            }
        }

        Ok(removed)
    }

    async fn load(&self, comment_id: i64) -> Result<Comment, AppError> {
        self.comments
            .get_by_id(comment_id)
            .await?
            .ok_or(AppError::NotFound("Comment not found".to_string()))
    }

    /// Strip markup and trim, then bound the text that will be stored.
    fn prepare_text(&self, raw: &str) -> Result<String, AppError> {
        let text = strip_markup(raw.trim()).trim().to_string();
        if text.chars().count() > self.rules.max_text_length {
            return Err(AppError::BadRequest(format!(
                "Comment text exceeds {} characters",
                self.rules.max_text_length
            )));
        }

        Ok(text)
    }

    fn check_uploads(&self, existing: usize, uploads: &[UploadedFile]) -> Result<(), AppError> {
        if existing + uploads.len() > self.rules.max_attachments {
            return Err(AppError::BadRequest(format!(
                "A comment can have at most {} attachments",
                self.rules.max_attachments
            )));
        }

        for upload in uploads {
            if upload.bytes.is_empty() {
                return Err(AppError::BadRequest(format!(
                    "Attachment {} is empty",
                    upload.filename
                )));
            }
            if upload.bytes.len() > self.rules.max_attachment_bytes {
                return Err(AppError::BadRequest(format!(
                    "Attachment {} exceeds {} bytes",
                    upload.filename, self.rules.max_attachment_bytes
                )));
            }
            if !self
                .rules
                .allowed_mime_types
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(&upload.content_type))
            {
                return Err(AppError::BadRequest(format!(
                    "Unsupported attachment type {}",
                    upload.content_type
                )));
            }
        }

        Ok(())
    }

    /// Store every upload, or none: a failure removes the files already written.
    async fn store_uploads(&self, uploads: Vec<UploadedFile>) -> Result<Vec<Attachment>, AppError> {
        let mut stored = Vec::with_capacity(uploads.len());

        for upload in uploads {
            match self.attachments.store(upload).await {
                Ok(file) => stored.push(attachment_from(file)),
                Err(e) => {
                    self.discard(&stored).await;
                    return Err(e);
                }
            }
        }

        Ok(stored)
    }

    /// Best-effort removal of stored files. Failures are logged, never returned.
    async fn discard(&self, attachments: &[Attachment]) {
        for attachment in attachments {
            if let Err(e) = self.attachments.delete(&attachment.url).await {
                tracing::warn!(
                    "Failed to delete attachment file {}: {:?}",
                    attachment.url,
                    e
                );
            }
        }
    }

    /// Runs after a write has been committed, so a failed profile lookup only
    /// drops the author projection instead of failing the request.
    async fn respond(&self, comment: Comment) -> CommentResponse {
        let author = match self.profiles.profiles(&[comment.author_id]).await {
            Ok(mut profiles) => profiles.remove(&comment.author_id),
            Err(e) => {
                tracing::warn!(
                    comment_id = comment.id,
                    "Failed to load author profile: {:?}",
                    e
                );
                None
            }
        };
        CommentResponse::new(comment, author)
    }

    async fn respond_all(&self, comments: Vec<Comment>) -> Result<Vec<CommentResponse>, AppError> {
        let mut author_ids: Vec<i64> = comments.iter().map(|c| c.author_id).collect();
        author_ids.sort_unstable();
        author_ids.dedup();

        let profiles = self.profiles.profiles(&author_ids).await?;

        Ok(comments
            .into_iter()
            .map(|c| {
                let author = profiles.get(&c.author_id).cloned();
                CommentResponse::new(c, author)
            })
            .collect())
    }
}

fn ensure_author(comment: &Comment, requester_id: i64, message: &str) -> Result<(), AppError> {
    if comment.author_id != requester_id {
        return Err(AppError::Forbidden(message.to_string()));
    }
    Ok(())
}

fn attachment_from(file: StoredFile) -> Attachment {
    Attachment {
        id: Uuid::new_v4(),
        kind: AttachmentKind::from_mime(&file.mimetype),
        url: file.url,
        filename: file.filename,
        size: file.size,
        mimetype: file.mimetype,
    }
}
