use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, types::Json};

use super::CommentRepository;
use crate::{
    config::CommentRules,
    error::AppError,
    models::comment::{Attachment, Comment, CommentPatch, NewComment},
};

/// Represents the 'comments' table in the database.
#[derive(Debug, FromRow)]
struct CommentRow {
    id: i64,
    event_id: i64,
    author_id: i64,
    text: String,
    parent_id: Option<i64>,
    root_id: Option<i64>,
    depth: i32,
    attachments: Json<Vec<Attachment>>,
    is_deleted: bool,
    version: i32,
    created_at: DateTime<Utc>,
    edited_at: Option<DateTime<Utc>>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: row.id,
            event_id: row.event_id,
            author_id: row.author_id,
            text: row.text,
            parent_id: row.parent_id,
            root_id: row.root_id,
            depth: row.depth,
            attachments: row.attachments.0,
            is_deleted: row.is_deleted,
            version: row.version,
            created_at: row.created_at,
            edited_at: row.edited_at,
        }
    }
}

#[derive(Clone)]
pub struct PgCommentRepository {
    pool: PgPool,
    rules: CommentRules,
}

impl PgCommentRepository {
    /// `rules` bound the depth and text length of inserted records.
    pub fn new(pool: PgPool, rules: CommentRules) -> Self {
        Self { pool, rules }
    }
}

#[async_trait]
impl CommentRepository for PgCommentRepository {
    async fn insert(&self, comment: NewComment) -> Result<Comment, AppError> {
        comment.check_shape(&self.rules).map_err(AppError::BadRequest)?;

        let row = sqlx::query_as::<_, CommentRow>(
            r#"
            INSERT INTO comments (event_id, author_id, text, parent_id, root_id, depth, attachments)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, event_id, author_id, text, parent_id, root_id, depth,
                      attachments, is_deleted, version, created_at, edited_at
            "#,
        )
        .bind(comment.event_id)
        .bind(comment.author_id)
        .bind(&comment.text)
        .bind(comment.parent_id)
        .bind(comment.root_id)
        .bind(comment.depth)
        .bind(Json(&comment.attachments))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert comment: {:?}", e);
            AppError::from(e)
        })?;

        Ok(row.into())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>, AppError> {
        let row = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT id, event_id, author_id, text, parent_id, root_id, depth,
                   attachments, is_deleted, version, created_at, edited_at
            FROM comments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_by_event(
        &self,
        event_id: i64,
        exclude_deleted: bool,
    ) -> Result<Vec<Comment>, AppError> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT id, event_id, author_id, text, parent_id, root_id, depth,
                   attachments, is_deleted, version, created_at, edited_at
            FROM comments
            WHERE event_id = $1
              AND ($2 = FALSE OR is_deleted = FALSE)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(event_id)
        .bind(exclude_deleted)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_by_thread(
        &self,
        root_id: i64,
        exclude_deleted: bool,
    ) -> Result<Vec<Comment>, AppError> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT id, event_id, author_id, text, parent_id, root_id, depth,
                   attachments, is_deleted, version, created_at, edited_at
            FROM comments
            WHERE (id = $1 OR root_id = $1)
              AND ($2 = FALSE OR is_deleted = FALSE)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(root_id)
        .bind(exclude_deleted)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update(
        &self,
        id: i64,
        patch: CommentPatch,
        expected_version: i32,
    ) -> Result<Comment, AppError> {
        let row = sqlx::query_as::<_, CommentRow>(
            r#"
            UPDATE comments
            SET text = COALESCE($2, text),
                attachments = COALESCE($3, attachments),
                edited_at = COALESCE($4, edited_at),
                is_deleted = is_deleted OR COALESCE($5, FALSE),
                version = version + 1
            WHERE id = $1 AND version = $6
            RETURNING id, event_id, author_id, text, parent_id, root_id, depth,
                      attachments, is_deleted, version, created_at, edited_at
            "#,
        )
        .bind(id)
        .bind(patch.text)
        .bind(patch.attachments.map(Json))
        .bind(patch.edited_at)
        .bind(patch.is_deleted)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(row.into());
        }

        // Nothing matched: either the row is gone or someone else wrote first.
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM comments WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        if exists {
            Err(AppError::Conflict(
                "Comment was modified concurrently, please retry".to_string(),
            ))
        } else {
            Err(AppError::NotFound("Comment not found".to_string()))
        }
    }

    async fn referenced_attachment_urls(&self) -> Result<Vec<String>, AppError> {
        let urls: Vec<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT a->>'url'
            FROM comments c
            CROSS JOIN LATERAL jsonb_array_elements(c.attachments) AS a
            WHERE c.is_deleted = FALSE
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(urls.into_iter().flatten().collect())
    }
}
