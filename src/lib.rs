// src/lib.rs

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod testing;
pub mod utils;

// Entry points used by main.rs and the integration tests.
pub use routes::create_router;
pub use services::CommentService;
