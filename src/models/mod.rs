// src/models/mod.rs

pub mod comment;
pub mod event;
pub mod user;
