//! Course reporting API handlers

use crate::api::{load_course, SuccessResponse};
use crate::domain::{CourseUserCategories, ProgressSummary};
use crate::error::Result;
use crate::middleware::ActingUser;
use crate::state::HasServices;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

/// Enrolled users partitioned by their resolved course role
#[utoipa::path(
    get,
    path = "/api/v1/courses/{id}/users",
    tag = "Reporting",
    params(("id" = Uuid, Path, description = "Course id")),
    security(("acting_user" = [])),
    responses(
        (status = 200, description = "Enrolled users by role", body = SuccessResponse<CourseUserCategories>)
    )
)]
pub async fn course_users<S: HasServices>(
    State(state): State<S>,
    ActingUser(actor): ActingUser,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let course = load_course(&state, course_id).await?;
    state
        .access_service()
        .require(&actor, &course, "manage members", |p| p.can_modify)
        .await?;

    let categories = state
        .categorization_service()
        .categorize_course_users(&course)
        .await?;
    Ok(Json(SuccessResponse::new(categories)))
}

#[utoipa::path(
    get,
    path = "/api/v1/courses/{id}/progress-summary",
    tag = "Reporting",
    params(("id" = Uuid, Path, description = "Course id")),
    security(("acting_user" = [])),
    responses(
        (status = 200, description = "Completion totals", body = SuccessResponse<ProgressSummary>)
    )
)]
pub async fn progress_summary<S: HasServices>(
    State(state): State<S>,
    ActingUser(actor): ActingUser,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let course = load_course(&state, course_id).await?;
    state
        .access_service()
        .require(&actor, &course, "view reports", |p| p.can_modify)
        .await?;

    let summary = state
        .categorization_service()
        .course_progress_summary(course.id)
        .await?;
    Ok(Json(SuccessResponse::new(summary)))
}
