//! Course access API handlers

use crate::api::{load_course, SuccessResponse};
use crate::domain::{CoursePermissions, CourseRole, StringUuid};
use crate::error::Result;
use crate::middleware::ActingUser;
use crate::state::HasServices;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct UserCourseRole {
    pub user_id: StringUuid,
    pub course_id: StringUuid,
    pub role: CourseRole,
    pub display_role: &'static str,
    pub permissions: CoursePermissions,
}

/// Role and permissions of the acting user in a course
#[utoipa::path(
    get,
    path = "/api/v1/courses/{id}/access",
    tag = "Access",
    params(("id" = Uuid, Path, description = "Course id")),
    security(("acting_user" = [])),
    responses(
        (status = 200, description = "Permissions of the acting user", body = SuccessResponse<CoursePermissions>),
        (status = 401, description = "Missing or unknown acting user"),
        (status = 404, description = "Course not found")
    )
)]
pub async fn course_access<S: HasServices>(
    State(state): State<S>,
    ActingUser(user): ActingUser,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let course = load_course(&state, course_id).await?;
    let permissions = state.access_service().permissions(&user, &course).await;
    Ok(Json(SuccessResponse::new(permissions)))
}

/// Role of another user in a course; visible to anyone who can view the course
#[utoipa::path(
    get,
    path = "/api/v1/courses/{id}/users/{user_id}/role",
    tag = "Access",
    params(("id" = Uuid, Path, description = "Course id"), ("user_id" = Uuid, Path, description = "User id")),
    security(("acting_user" = [])),
    responses(
        (status = 200, description = "Resolved course role", body = SuccessResponse<UserCourseRole>),
        (status = 403, description = "Acting user cannot view the course")
    )
)]
pub async fn user_role<S: HasServices>(
    State(state): State<S>,
    ActingUser(actor): ActingUser,
    Path((course_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    let course = load_course(&state, course_id).await?;
    state
        .access_service()
        .require(&actor, &course, "view members", |p| p.can_view)
        .await?;

    let target = state.enrollment_service().get_user(user_id.into()).await?;
    let permissions = state.access_service().permissions(&target, &course).await;

    Ok(Json(SuccessResponse::new(UserCourseRole {
        user_id: target.id,
        course_id: course.id,
        role: permissions.role,
        display_role: permissions.role.display_name(),
        permissions,
    })))
}
