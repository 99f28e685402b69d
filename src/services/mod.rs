// src/services/mod.rs

pub mod attachments;
pub mod comments;
pub mod thread;

pub use comments::CommentService;
