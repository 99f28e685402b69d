//! In-memory collaborators for exercising `CommentService` without Postgres or a disk.
//!
//! Each fake can be told to fail so rollback paths can be driven from tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::{
    config::CommentRules,
    error::AppError,
    models::{
        comment::{Comment, CommentPatch, NewComment, UploadedFile},
        event::Event,
        user::AuthorProfile,
    },
    repositories::{CommentRepository, EventLookup, ProfileLookup},
    services::{
        CommentService,
        attachments::{AttachmentStore, PUBLIC_PREFIX, StoredFile},
    },
};

#[derive(Default)]
pub struct InMemoryCommentRepository {
    rows: Mutex<Vec<Comment>>,
    next_id: AtomicI64,
    rules: CommentRules,
    fail_inserts: AtomicBool,
    fail_updates: AtomicBool,
}

impl InMemoryCommentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: CommentRules) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    /// Make every following insert fail with `StoreUnavailable`.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make every following update fail with `StoreUnavailable`.
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub async fn all(&self) -> Vec<Comment> {
        self.rows.lock().await.clone()
    }

    async fn sorted(&self, keep: impl Fn(&Comment) -> bool) -> Vec<Comment> {
        let mut rows: Vec<Comment> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|c| keep(c))
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        rows.sort_by_key(|c| c.created_at);
        rows
    }
}

#[async_trait]
impl CommentRepository for InMemoryCommentRepository {
    async fn insert(&self, comment: NewComment) -> Result<Comment, AppError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable("insert failed".to_string()));
        }
        comment.check_shape(&self.rules).map_err(AppError::BadRequest)?;

        let mut rows = self.rows.lock().await;
        let created_at = match rows.last() {
            // Keep timestamps non-decreasing so order never depends on clock jitter.
            Some(last) => Utc::now().max(last.created_at),
            None => Utc::now(),
        };
        let record = Comment {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            event_id: comment.event_id,
            author_id: comment.author_id,
            text: comment.text,
            parent_id: comment.parent_id,
            root_id: comment.root_id,
            depth: comment.depth,
            attachments: comment.attachments,
            is_deleted: false,
            version: 1,
            created_at,
            edited_at: None,
        };
        rows.push(record.clone());

        Ok(record)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>, AppError> {
        Ok(self.rows.lock().await.iter().find(|c| c.id == id).cloned())
    }

    async fn list_by_event(
        &self,
        event_id: i64,
        exclude_deleted: bool,
    ) -> Result<Vec<Comment>, AppError> {
        Ok(self
            .sorted(|c| c.event_id == event_id && !(exclude_deleted && c.is_deleted))
            .await)
    }

    async fn list_by_thread(
        &self,
        root_id: i64,
        exclude_deleted: bool,
    ) -> Result<Vec<Comment>, AppError> {
        Ok(self
            .sorted(|c| {
                (c.id == root_id || c.root_id == Some(root_id)) && !(exclude_deleted && c.is_deleted)
            })
            .await)
    }

    async fn update(
        &self,
        id: i64,
        patch: CommentPatch,
        expected_version: i32,
    ) -> Result<Comment, AppError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable("update failed".to_string()));
        }
        let mut rows = self.rows.lock().await;
        let row = rows
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(AppError::NotFound("Comment not found".to_string()))?;

        if row.version != expected_version {
            return Err(AppError::Conflict(
                "Comment was modified concurrently, please retry".to_string(),
            ));
        }

        patch.apply(row);
        row.version += 1;
        Ok(row.clone())
    }

    async fn referenced_attachment_urls(&self) -> Result<Vec<String>, AppError> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|c| !c.is_deleted)
            .flat_map(|c| c.attachments.iter().map(|a| a.url.clone()))
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryEvents {
    events: Mutex<HashMap<i64, Event>>,
}

impl InMemoryEvents {
    pub async fn add(&self, id: i64, title: &str) {
        self.events.lock().await.insert(
            id,
            Event {
                id,
                title: title.to_string(),
            },
        );
    }
}

#[async_trait]
impl EventLookup for InMemoryEvents {
    async fn find_event_by_id(&self, id: i64) -> Result<Option<Event>, AppError> {
        Ok(self.events.lock().await.get(&id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryProfiles {
    profiles: Mutex<HashMap<i64, AuthorProfile>>,
    fail_lookups: AtomicBool,
}

impl InMemoryProfiles {
    /// Make every following lookup fail with `StoreUnavailable`.
    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub async fn add(&self, id: i64, username: &str) {
        self.profiles.lock().await.insert(
            id,
            AuthorProfile {
                id,
                username: username.to_string(),
                first_name: None,
                last_name: None,
                avatar_url: None,
            },
        );
    }
}

#[async_trait]
impl ProfileLookup for InMemoryProfiles {
    async fn profiles(&self, user_ids: &[i64]) -> Result<HashMap<i64, AuthorProfile>, AppError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable("profile lookup failed".to_string()));
        }
        let profiles = self.profiles.lock().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| profiles.get(id).map(|p| (*id, p.clone())))
            .collect())
    }
}

/// Keeps "files" as a set of URLs.
pub struct InMemoryAttachmentStore {
    files: Mutex<HashSet<String>>,
    counter: AtomicUsize,
    /// Number of successful stores allowed before failing; `usize::MAX` never fails.
    store_budget: AtomicUsize,
    fail_deletes: AtomicBool,
}

impl InMemoryAttachmentStore {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashSet::new()),
            counter: AtomicUsize::new(0),
            store_budget: AtomicUsize::new(usize::MAX),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// Let `count` stores succeed, then fail every following one.
    pub fn fail_stores_after(&self, count: usize) {
        self.store_budget.store(count, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub async fn urls(&self) -> HashSet<String> {
        self.files.lock().await.clone()
    }

    /// Put a file in the store without going through a comment.
    pub async fn plant(&self, name: &str) -> String {
        let url = format!("{PUBLIC_PREFIX}/{name}");
        self.files.lock().await.insert(url.clone());
        url
    }
}

impl Default for InMemoryAttachmentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn store(&self, file: UploadedFile) -> Result<StoredFile, AppError> {
        let allowed = self
            .store_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if !allowed {
            return Err(AppError::StoreUnavailable("attachment store is down".to_string()));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let url = format!("{PUBLIC_PREFIX}/{n}-{}", file.filename);
        self.files.lock().await.insert(url.clone());

        Ok(StoredFile {
            url,
            filename: file.filename,
            size: file.bytes.len() as i64,
            mimetype: file.content_type,
        })
    }

    async fn delete(&self, url: &str) -> Result<(), AppError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::StoreUnavailable("delete failed".to_string()));
        }
        self.files.lock().await.remove(url);
        Ok(())
    }

    async fn list_urls(&self) -> Result<Vec<String>, AppError> {
        Ok(self.files.lock().await.iter().cloned().collect())
    }
}

/// A `CommentService` wired to in-memory fakes, with handles to each fake.
pub struct InMemoryBackend {
    pub service: CommentService,
    pub comments: Arc<InMemoryCommentRepository>,
    pub events: Arc<InMemoryEvents>,
    pub profiles: Arc<InMemoryProfiles>,
    pub attachments: Arc<InMemoryAttachmentStore>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_rules(CommentRules::default())
    }

    pub fn with_rules(rules: CommentRules) -> Self {
        let comments = Arc::new(InMemoryCommentRepository::with_rules(rules.clone()));
        let events = Arc::new(InMemoryEvents::default());
        let profiles = Arc::new(InMemoryProfiles::default());
        let attachments = Arc::new(InMemoryAttachmentStore::new());

        let service = CommentService::new(
            comments.clone(),
            events.clone(),
            profiles.clone(),
            attachments.clone(),
            rules,
        );

        Self {
            service,
            comments,
            events,
            profiles,
            attachments,
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}
