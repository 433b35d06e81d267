//! LMS Core - course enrollment and access authorization
//!
//! Resolves course-scoped roles, gates course actions, and manages
//! enrollments including the prerequisite cascade, behind a REST API.

pub mod api;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod middleware;
pub mod openapi;
pub mod repository;
pub mod server;
pub mod service;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
