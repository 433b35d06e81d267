//! OpenAPI document for the REST surface
//!
//! Served as JSON at `/api-docs/openapi.json`.

use crate::middleware::acting_user::USER_ID_HEADER;
use axum::Json;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "LMS Core API",
        description = "Course access authorization, enrollment and prerequisite cascades",
        contact(name = "LMS Team")
    ),
    tags(
        (name = "System", description = "Health checks"),
        (name = "Access", description = "Course roles and permission gates"),
        (name = "Enrollment", description = "Enrollment lifecycle and progress"),
        (name = "Prerequisites", description = "Prerequisite graph edits and cascades"),
        (name = "Reporting", description = "Course population and completion views"),
    ),
    components(
        schemas(
            crate::api::MessageResponse,
            crate::api::health::HealthResponse,
            crate::api::access::UserCourseRole,
            crate::domain::StringUuid,
            crate::domain::User,
            crate::domain::UserRole,
            crate::domain::Course,
            crate::domain::Topic,
            crate::domain::CourseRole,
            crate::domain::CoursePermissions,
            crate::domain::CategorizedUser,
            crate::domain::CourseUserCategories,
            crate::domain::Enrollment,
            crate::domain::EnrollmentSource,
            crate::domain::EnrollmentOutcome,
            crate::domain::EnrollmentReport,
            crate::domain::BulkEnrollmentResult,
            crate::domain::CreateEnrollmentInput,
            crate::domain::BulkEnrollmentInput,
            crate::domain::UpdateProgressInput,
            crate::domain::EligibilityReport,
            crate::domain::ProgressSummary,
            crate::domain::TopicProgress,
            crate::domain::TopicProgressUpdate,
            crate::domain::UpdatePrerequisitesInput,
            crate::domain::PrerequisiteChangeReport,
        ),
    ),
    paths(
        crate::api::health::health,
        crate::api::health::ready,
        crate::api::access::course_access,
        crate::api::access::user_role,
        crate::api::enrollment::enroll,
        crate::api::enrollment::bulk_enroll,
        crate::api::enrollment::unenroll,
        crate::api::enrollment::self_enroll,
        crate::api::enrollment::eligibility,
        crate::api::enrollment::update_progress,
        crate::api::enrollment::update_topic_progress,
        crate::api::prerequisite::update,
        crate::api::categorization::course_users,
        crate::api::categorization::progress_summary,
    ),
)]
pub struct ApiDoc;

impl ApiDoc {
    /// The generated document plus the acting-user header scheme.
    pub fn build() -> utoipa::openapi::OpenApi {
        let mut doc = Self::openapi();
        if let Some(components) = doc.components.as_mut() {
            components.security_schemes.insert(
                "acting_user".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(USER_ID_HEADER))),
            );
        }
        doc
    }
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::build())
}
