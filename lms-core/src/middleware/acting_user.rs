//! Acting user extractor
//!
//! Authentication happens upstream; the gateway forwards the authenticated
//! user's id in the `x-user-id` header and this extractor loads the user row.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::domain::{StringUuid, User};
use crate::error::AppError;
use crate::state::HasServices;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The user on whose behalf the request runs
#[derive(Debug, Clone)]
pub struct ActingUser(pub User);

impl ActingUser {
    pub fn id(&self) -> StringUuid {
        self.0.id
    }
}

/// Parse the acting user id out of the request headers.
fn user_id_from_parts(parts: &Parts) -> Result<StringUuid, AppError> {
    let raw = parts
        .headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| AppError::Unauthorized(format!("Missing {} header", USER_ID_HEADER)))?
        .to_str()
        .map_err(|_| AppError::Unauthorized(format!("Invalid {} header", USER_ID_HEADER)))?;

    raw.trim()
        .parse::<StringUuid>()
        .map_err(|_| AppError::Unauthorized(format!("Invalid {} header", USER_ID_HEADER)))
}

impl<S> FromRequestParts<S> for ActingUser
where
    S: HasServices + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user_id = user_id_from_parts(parts)?;

        match state.enrollment_service().get_user(user_id).await {
            Ok(user) => Ok(ActingUser(user)),
            Err(AppError::NotFound(_)) => {
                tracing::debug!(user_id = %user_id, "Acting user does not exist");
                Err(AppError::Unauthorized("Unknown user".to_string()))
            }
            Err(e) => Err(e),
        }
    }
}
