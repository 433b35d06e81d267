//! Enrollment API handlers

use crate::api::{load_course, MessageResponse, SuccessResponse};
use crate::domain::{
    BulkEnrollmentInput, BulkEnrollmentResult, CreateEnrollmentInput, EligibilityReport,
    requested_source, Enrollment, EnrollmentReport, EnrollmentSource, StringUuid,
    TopicProgress, TopicProgressUpdate, UpdateProgressInput,
};
use crate::error::{AppError, Result};
use crate::middleware::ActingUser;
use crate::state::HasServices;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::collections::HashSet;
use uuid::Uuid;
use validator::Validate;

fn created_or_ok(created: bool) -> StatusCode {
    if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

/// Enroll another user, running the prerequisite cascades for a new row
#[utoipa::path(
    post,
    path = "/api/v1/courses/{id}/enrollments",
    tag = "Enrollment",
    params(("id" = Uuid, Path, description = "Course id")),
    request_body = CreateEnrollmentInput,
    security(("acting_user" = [])),
    responses(
        (status = 201, description = "Enrollment created", body = SuccessResponse<EnrollmentReport>),
        (status = 200, description = "User was already enrolled", body = SuccessResponse<EnrollmentReport>),
        (status = 400, description = "Source tag reserved for automatic enrollments"),
        (status = 403, description = "Acting user cannot enroll users")
    )
)]
pub async fn enroll<S: HasServices>(
    State(state): State<S>,
    ActingUser(actor): ActingUser,
    Path(course_id): Path<Uuid>,
    Json(input): Json<CreateEnrollmentInput>,
) -> Result<impl IntoResponse> {
    input.validate()?;
    let source = requested_source(input.source, EnrollmentSource::Manual)?;
    let course = load_course(&state, course_id).await?;
    state
        .access_service()
        .require(&actor, &course, "enroll users", |p| p.can_enroll_users)
        .await?;

    let user = state.enrollment_service().get_user(input.user_id.into()).await?;
    let report = state
        .prerequisite_service()
        .enroll_user(&user, &course, source, None)
        .await?;

    Ok((
        created_or_ok(report.outcome.created),
        Json(SuccessResponse::new(report)),
    ))
}

/// Enroll many users at once
#[utoipa::path(
    post,
    path = "/api/v1/courses/{id}/enrollments/bulk",
    tag = "Enrollment",
    params(("id" = Uuid, Path, description = "Course id")),
    request_body = BulkEnrollmentInput,
    security(("acting_user" = [])),
    responses(
        (status = 200, description = "Bulk enrollment result", body = SuccessResponse<BulkEnrollmentResult>),
        (status = 422, description = "Invalid user list")
    )
)]
pub async fn bulk_enroll<S: HasServices>(
    State(state): State<S>,
    ActingUser(actor): ActingUser,
    Path(course_id): Path<Uuid>,
    Json(input): Json<BulkEnrollmentInput>,
) -> Result<impl IntoResponse> {
    input.validate()?;
    let source = requested_source(input.source, EnrollmentSource::Bulk)?;
    let course = load_course(&state, course_id).await?;
    state
        .access_service()
        .require(&actor, &course, "enroll users", |p| p.can_enroll_users)
        .await?;

    let ids: Vec<StringUuid> = input.user_ids.iter().copied().map(StringUuid::from).collect();
    let users = state.enrollment_service().get_users(&ids).await?;

    let mut result = state
        .enrollment_service()
        .bulk_create_enrollments(&users, &course, source)
        .await?;

    let mut reported = HashSet::new();
    for id in &ids {
        if !users.iter().any(|u| u.id == *id) && reported.insert(*id) {
            result.errors.push(format!("User {} not found", id));
        }
    }

    Ok(Json(SuccessResponse::new(result)))
}

/// Remove a user's enrollment
#[utoipa::path(
    delete,
    path = "/api/v1/courses/{id}/enrollments/{user_id}",
    tag = "Enrollment",
    params(("id" = Uuid, Path, description = "Course id"), ("user_id" = Uuid, Path, description = "User id")),
    security(("acting_user" = [])),
    responses(
        (status = 200, description = "Enrollment removed", body = MessageResponse),
        (status = 404, description = "User is not enrolled")
    )
)]
pub async fn unenroll<S: HasServices>(
    State(state): State<S>,
    ActingUser(actor): ActingUser,
    Path((course_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    let course = load_course(&state, course_id).await?;
    state
        .access_service()
        .require(&actor, &course, "enroll users", |p| p.can_enroll_users)
        .await?;

    let user = state.enrollment_service().get_user(user_id.into()).await?;
    state.enrollment_service().unenroll(&user, &course).await?;

    Ok(Json(MessageResponse::new(format!(
        "{} was unenrolled from {}",
        user.username, course.title
    ))))
}

/// Enroll the acting user after the eligibility checks pass
#[utoipa::path(
    post,
    path = "/api/v1/courses/{id}/self-enroll",
    tag = "Enrollment",
    params(("id" = Uuid, Path, description = "Course id")),
    security(("acting_user" = [])),
    responses(
        (status = 201, description = "Enrolled", body = SuccessResponse<EnrollmentReport>),
        (status = 422, description = "Not eligible; every violated rule is listed in details.reasons")
    )
)]
pub async fn self_enroll<S: HasServices>(
    State(state): State<S>,
    ActingUser(user): ActingUser,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let course = load_course(&state, course_id).await?;
    let report = state.prerequisite_service().self_enroll(&user, &course).await?;
    Ok((
        created_or_ok(report.outcome.created),
        Json(SuccessResponse::new(report)),
    ))
}

/// Every rule the acting user would violate by enrolling
#[utoipa::path(
    get,
    path = "/api/v1/courses/{id}/eligibility",
    tag = "Enrollment",
    params(("id" = Uuid, Path, description = "Course id")),
    security(("acting_user" = [])),
    responses(
        (status = 200, description = "Eligibility report", body = SuccessResponse<EligibilityReport>)
    )
)]
pub async fn eligibility<S: HasServices>(
    State(state): State<S>,
    ActingUser(user): ActingUser,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let course = load_course(&state, course_id).await?;
    let report = state
        .enrollment_service()
        .validate_enrollment_eligibility(&user, &course)
        .await?;
    Ok(Json(SuccessResponse::new(report)))
}

/// Report course progress; owners may update their own enrollment
#[utoipa::path(
    put,
    path = "/api/v1/enrollments/{id}/progress",
    tag = "Enrollment",
    params(("id" = Uuid, Path, description = "Enrollment id")),
    request_body = UpdateProgressInput,
    security(("acting_user" = [])),
    responses(
        (status = 200, description = "Updated enrollment", body = SuccessResponse<Enrollment>),
        (status = 403, description = "Not the owner and cannot modify the course")
    )
)]
pub async fn update_progress<S: HasServices>(
    State(state): State<S>,
    ActingUser(actor): ActingUser,
    Path(enrollment_id): Path<Uuid>,
    Json(input): Json<UpdateProgressInput>,
) -> Result<impl IntoResponse> {
    let enrollments = state.enrollment_service();
    let enrollment = enrollments.get_enrollment(enrollment_id.into()).await?;

    if enrollment.user_id != actor.id {
        let course = load_course(&state, enrollment.course_id).await?;
        state
            .access_service()
            .require(&actor, &course, "update progress", |p| p.can_modify)
            .await?;
    }

    let updated = enrollments
        .update_enrollment_progress(&enrollment, input.progress_percentage, input.force_completion)
        .await;
    if !updated {
        return Err(AppError::Internal(anyhow::anyhow!(
            "Progress update for enrollment {} did not apply",
            enrollment.id
        )));
    }

    let enrollment = enrollments.get_enrollment(enrollment.id).await?;
    Ok(Json(SuccessResponse::new(enrollment)))
}

/// Record the acting user's progress on a topic and stamp their course access
#[utoipa::path(
    put,
    path = "/api/v1/topics/{id}/progress",
    tag = "Enrollment",
    params(("id" = Uuid, Path, description = "Topic id")),
    request_body = TopicProgressUpdate,
    security(("acting_user" = [])),
    responses(
        (status = 201, description = "Progress row created", body = SuccessResponse<TopicProgress>),
        (status = 200, description = "Progress row updated", body = SuccessResponse<TopicProgress>)
    )
)]
pub async fn update_topic_progress<S: HasServices>(
    State(state): State<S>,
    ActingUser(user): ActingUser,
    Path(topic_id): Path<Uuid>,
    Json(update): Json<TopicProgressUpdate>,
) -> Result<impl IntoResponse> {
    let topic = state.enrollment_service().get_topic(topic_id.into()).await?;
    let course = load_course(&state, topic.course_id).await?;
    state
        .access_service()
        .require(&user, &course, "view", |p| p.can_view)
        .await?;

    let enrollments = state.enrollment_service();
    if let Some(enrollment) = enrollments.find_enrollment(user.id, course.id).await? {
        enrollments.touch_last_accessed(&enrollment).await?;
    }

    let outcome = enrollments
        .create_or_update_topic_progress(&user, topic.id, update)
        .await?;

    Ok((
        created_or_ok(outcome.created),
        Json(SuccessResponse::new(outcome.progress)),
    ))
}
