use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::comment::{CommentForm, CreateComment, UpdateComment, UploadedFile},
    services::CommentService,
    utils::jwt::Claims,
};

/// List all comments of an event as reply trees.
pub async fn list_event_comments(
    State(service): State<CommentService>,
    Path(event_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let comments = service.get_comments_for_event(event_id).await?;
    Ok(Json(comments))
}

/// Create a new comment or reply (multipart: `text`, `parentCommentId`, `attachments`).
pub async fn create_comment(
    State(service): State<CommentService>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<i64>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let (form, uploads) = read_comment_form(multipart).await?;
    form.validate()?;

    let comment = service
        .create_comment(
            event_id,
            user_id,
            CreateComment {
                text: form.text.unwrap_or_default(),
                parent_id: form.parent_comment_id,
                uploads,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "comment": comment })),
    ))
}

/// Get the full thread a comment belongs to.
pub async fn get_thread(
    State(service): State<CommentService>,
    Path(comment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let thread = service.get_thread(comment_id).await?;
    Ok(Json(thread))
}

/// Edit a comment's text and/or append attachments.
pub async fn update_comment(
    State(service): State<CommentService>,
    Extension(claims): Extension<Claims>,
    Path(comment_id): Path<i64>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let (form, uploads) = read_comment_form(multipart).await?;
    form.validate()?;

    if form.parent_comment_id.is_some() {
        return Err(AppError::BadRequest(
            "A comment cannot be moved to another parent".to_string(),
        ));
    }

    let comment = service
        .update_comment(
            comment_id,
            user_id,
            UpdateComment {
                text: form.text,
                uploads,
            },
        )
        .await?;

    Ok(Json(serde_json::json!({ "comment": comment })))
}

/// Delete a comment (Soft Delete).
/// Requires: Login + Author.
pub async fn delete_comment(
    State(service): State<CommentService>,
    Extension(claims): Extension<Claims>,
    Path(comment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    service.delete_comment(comment_id, user_id).await?;

    Ok(Json(
        serde_json::json!({ "message": "Comment deleted successfully" }),
    ))
}

/// Remove a single attachment from a comment.
pub async fn remove_attachment(
    State(service): State<CommentService>,
    Extension(claims): Extension<Claims>,
    Path((comment_id, attachment_id)): Path<(i64, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let comment = service
        .remove_attachment(comment_id, user_id, attachment_id)
        .await?;

    Ok(Json(serde_json::json!({ "comment": comment })))
}

/// Splits a comment multipart body into its text fields and uploaded files.
async fn read_comment_form(
    mut multipart: Multipart,
) -> Result<(CommentForm, Vec<UploadedFile>), AppError> {
    let mut form = CommentForm::default();
    let mut uploads = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "text" => form.text = Some(field.text().await?),
            "parentCommentId" => {
                let raw = field.text().await?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    let id = raw.parse::<i64>().map_err(|_| {
                        AppError::BadRequest("parentCommentId must be a number".to_string())
                    })?;
                    form.parent_comment_id = Some(id);
                }
            }
            "attachments" => {
                let filename = field.file_name().unwrap_or("attachment").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?.to_vec();

                uploads.push(UploadedFile {
                    filename,
                    content_type,
                    bytes,
                });
            }
            other => tracing::debug!("Ignoring unexpected form field {:?}", other),
        }
    }

    Ok((form, uploads))
}
