// src/repositories/mod.rs

//! Storage ports used by the comment service, and their Postgres adapters.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        comment::{Comment, CommentPatch, NewComment},
        event::Event,
        user::AuthorProfile,
    },
};

pub mod comments;
pub mod events;
pub mod users;

pub use comments::PgCommentRepository;
pub use events::PgEventLookup;
pub use users::PgProfileLookup;

/// Durable storage for comment records.
///
/// Listing operations return records ordered by `created_at` ascending, ties
/// broken by insertion order. No authorization happens here.
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Persists a new record.
    ///
    /// # Errors
    ///
    /// - `BadRequest` if the record is structurally invalid
    /// - `StoreUnavailable` on persistence failure
    async fn insert(&self, comment: NewComment) -> Result<Comment, AppError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>, AppError>;

    /// All comments of an event.
    async fn list_by_event(
        &self,
        event_id: i64,
        exclude_deleted: bool,
    ) -> Result<Vec<Comment>, AppError>;

    /// The root comment plus every comment whose `root_id` equals it.
    async fn list_by_thread(
        &self,
        root_id: i64,
        exclude_deleted: bool,
    ) -> Result<Vec<Comment>, AppError>;

    /// Applies `patch` if the stored version still equals `expected_version`,
    /// then bumps the version.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the id does not exist
    /// - `Conflict` if the record changed since it was read
    async fn update(
        &self,
        id: i64,
        patch: CommentPatch,
        expected_version: i32,
    ) -> Result<Comment, AppError>;

    /// URLs of attachments still referenced by a non-deleted comment.
    async fn referenced_attachment_urls(&self) -> Result<Vec<String>, AppError>;
}

/// Read access to the externally owned events.
#[async_trait]
pub trait EventLookup: Send + Sync {
    async fn find_event_by_id(&self, id: i64) -> Result<Option<Event>, AppError>;
}

/// Read access to the public part of user profiles.
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    /// Profiles for the given ids; unknown ids are simply absent from the map.
    async fn profiles(&self, user_ids: &[i64]) -> Result<HashMap<i64, AuthorProfile>, AppError>;
}
