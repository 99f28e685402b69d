// src/config.rs

use std::env;
use std::str::FromStr;

use dotenvy::dotenv;

/// Business limits for the comment subsystem.
/// Handed to `CommentService` at construction instead of living as literals in the logic.
#[derive(Debug, Clone)]
pub struct CommentRules {
    /// Deepest allowed reply level (root comments are depth 0).
    pub max_depth: i32,
    /// Maximum text length, counted in characters after trimming.
    pub max_text_length: usize,
    /// Maximum number of attachments a single comment may carry.
    pub max_attachments: usize,
    /// Maximum size of one uploaded file.
    pub max_attachment_bytes: usize,
    pub allowed_mime_types: Vec<String>,
    /// Text stored in place of a soft-deleted comment's content.
    pub deleted_placeholder: String,
}

impl Default for CommentRules {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_text_length: 1000,
            max_attachments: 5,
            max_attachment_bytes: 5 * 1024 * 1024,
            allowed_mime_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/gif".to_string(),
                "image/webp".to_string(),
            ],
            deleted_placeholder: "[This comment has been deleted]".to_string(),
        }
    }
}

impl CommentRules {
    /// Upper bound for a whole multipart request carrying a comment.
    pub fn request_body_limit(&self) -> usize {
        self.max_attachments * self.max_attachment_bytes + 64 * 1024
    }

    fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_depth: env_or("COMMENT_MAX_DEPTH", defaults.max_depth),
            max_text_length: env_or("COMMENT_MAX_TEXT_LENGTH", defaults.max_text_length),
            max_attachments: env_or("COMMENT_MAX_ATTACHMENTS", defaults.max_attachments),
            max_attachment_bytes: env_or(
                "COMMENT_MAX_ATTACHMENT_BYTES",
                defaults.max_attachment_bytes,
            ),
            ..defaults
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    /// Directory where comment attachments are written.
    pub upload_dir: String,
    pub server_port: u16,
    pub comments: CommentRules,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let upload_dir = env::var("UPLOAD_DIR")
            .unwrap_or_else(|_| "uploads/comments".to_string());

        Self {
            database_url,
            jwt_secret,
            rust_log,
            upload_dir,
            server_port: env_or("SERVER_PORT", 3000),
            comments: CommentRules::from_env(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring unparsable value for {}: {:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}
