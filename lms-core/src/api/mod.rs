//! REST API handlers and shared response types

pub mod access;
pub mod categorization;
pub mod enrollment;
pub mod health;
pub mod metrics;
pub mod prerequisite;

use crate::domain::{Course, StringUuid};
use crate::error::Result;
use crate::state::HasServices;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SuccessResponse<T> {
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Message response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Load the course addressed by a path segment or fail with NotFound.
pub(crate) async fn load_course<S: HasServices>(state: &S, id: impl Into<StringUuid>) -> Result<Course> {
    state.enrollment_service().get_course(id.into()).await
}
