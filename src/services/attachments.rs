use std::{
    io::ErrorKind,
    path::PathBuf,
    sync::LazyLock,
};

use async_trait::async_trait;
use regex::Regex;
use uuid::Uuid;

use crate::{error::AppError, models::comment::UploadedFile};

/// Public URL prefix under which stored attachments are served.
pub const PUBLIC_PREFIX: &str = "/uploads/comments";

const MAX_STORED_NAME_CHARS: usize = 100;

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static filename pattern"));

/// Location descriptor returned by the store for one uploaded file.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub url: String,
    /// Original client-side file name.
    pub filename: String,
    pub size: i64,
    pub mimetype: String,
}

/// Binary storage for comment attachments.
///
/// Every `store` call creates a new object, so concurrent writers never share a file.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn store(&self, file: UploadedFile) -> Result<StoredFile, AppError>;

    /// Removes the object behind `url`. Removing an absent object succeeds.
    async fn delete(&self, url: &str) -> Result<(), AppError>;

    /// URLs of every object currently held.
    async fn list_urls(&self) -> Result<Vec<String>, AppError>;
}

/// Stores attachments as plain files in one directory.
#[derive(Debug, Clone)]
pub struct LocalAttachmentStore {
    root: PathBuf,
}

impl LocalAttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the storage directory if needed.
    pub async fn ensure_dir(&self) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    fn path_for(&self, url: &str) -> Result<PathBuf, AppError> {
        let name = url
            .strip_prefix(PUBLIC_PREFIX)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| AppError::BadRequest(format!("Not an attachment URL: {url}")))?;

        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(AppError::BadRequest(format!("Not an attachment URL: {url}")));
        }

        Ok(self.root.join(name))
    }
}

#[async_trait]
impl AttachmentStore for LocalAttachmentStore {
    async fn store(&self, file: UploadedFile) -> Result<StoredFile, AppError> {
        let stored_name = format!("{}-{}", Uuid::new_v4(), sanitize_filename(&file.filename));
        let path = self.root.join(&stored_name);

        tokio::fs::write(&path, &file.bytes).await.map_err(|e| {
            tracing::error!("Failed to write attachment {:?}: {:?}", path, e);
            AppError::from(e)
        })?;

        Ok(StoredFile {
            url: format!("{PUBLIC_PREFIX}/{stored_name}"),
            filename: file.filename,
            size: file.bytes.len() as i64,
            mimetype: file.content_type,
        })
    }

    async fn delete(&self, url: &str) -> Result<(), AppError> {
        let path = self.path_for(url)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_urls(&self) -> Result<Vec<String>, AppError> {
        let mut urls = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(urls),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                urls.push(format!("{PUBLIC_PREFIX}/{name}"));
            }
        }

        Ok(urls)
    }
}

/// Reduces a client file name to a safe single path component.
fn sanitize_filename(name: &str) -> String {
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(name.trim(), "_");
    let cleaned: String = cleaned
        .trim_start_matches('.')
        .chars()
        .take(MAX_STORED_NAME_CHARS)
        .collect();

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}
