//! Prerequisite API handlers

use crate::api::{load_course, SuccessResponse};
use crate::domain::{PrerequisiteChangeReport, StringUuid, UpdatePrerequisitesInput};
use crate::error::Result;
use crate::middleware::ActingUser;
use crate::state::HasServices;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

/// Replace a course's prerequisites and reconcile existing enrollments
#[utoipa::path(
    put,
    path = "/api/v1/courses/{id}/prerequisites",
    tag = "Prerequisites",
    params(("id" = Uuid, Path, description = "Course id")),
    request_body = UpdatePrerequisitesInput,
    security(("acting_user" = [])),
    responses(
        (status = 200, description = "Prerequisites replaced and enrollments synced", body = SuccessResponse<PrerequisiteChangeReport>),
        (status = 422, description = "The new set would close a cycle")
    )
)]
pub async fn update<S: HasServices>(
    State(state): State<S>,
    ActingUser(actor): ActingUser,
    Path(course_id): Path<Uuid>,
    Json(input): Json<UpdatePrerequisitesInput>,
) -> Result<impl IntoResponse> {
    input.validate()?;
    let course = load_course(&state, course_id).await?;
    state
        .access_service()
        .require(&actor, &course, "edit prerequisites", |p| p.can_modify)
        .await?;

    let ids: Vec<StringUuid> = input
        .prerequisite_ids
        .into_iter()
        .map(StringUuid::from)
        .collect();
    let report = state
        .prerequisite_service()
        .update_course_prerequisites(&course, &ids)
        .await?;

    Ok(Json(SuccessResponse::new(report)))
}
