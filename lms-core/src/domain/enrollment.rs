//! Enrollment domain models

use super::common::{string_enum_sqlx, StringUuid};
use super::user::User;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// How an enrollment row came to exist.
///
/// The auto-prerequisite tag together with `source_course_id` is what lets the
/// reactive cascade undo its own writes without touching manual enrollments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentSource {
    #[default]
    Manual,
    Bulk,
    AutoPrerequisite,
    AutoDependent,
    AutoInstructor,
    AutoAdmin,
    AutoGroup,
    #[serde(rename = "self")]
    SelfEnrolled,
}

impl EnrollmentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentSource::Manual => "manual",
            EnrollmentSource::Bulk => "bulk",
            EnrollmentSource::AutoPrerequisite => "auto_prerequisite",
            EnrollmentSource::AutoDependent => "auto_dependent",
            EnrollmentSource::AutoInstructor => "auto_instructor",
            EnrollmentSource::AutoAdmin => "auto_admin",
            EnrollmentSource::AutoGroup => "auto_group",
            EnrollmentSource::SelfEnrolled => "self",
        }
    }

    pub fn is_automatic(&self) -> bool {
        matches!(
            self,
            EnrollmentSource::AutoPrerequisite
                | EnrollmentSource::AutoDependent
                | EnrollmentSource::AutoInstructor
                | EnrollmentSource::AutoAdmin
                | EnrollmentSource::AutoGroup
        )
    }
}

impl std::str::FromStr for EnrollmentSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "manual" => Ok(EnrollmentSource::Manual),
            "bulk" => Ok(EnrollmentSource::Bulk),
            "auto_prerequisite" => Ok(EnrollmentSource::AutoPrerequisite),
            "auto_dependent" => Ok(EnrollmentSource::AutoDependent),
            "auto_instructor" => Ok(EnrollmentSource::AutoInstructor),
            "auto_admin" => Ok(EnrollmentSource::AutoAdmin),
            "auto_group" => Ok(EnrollmentSource::AutoGroup),
            "self" => Ok(EnrollmentSource::SelfEnrolled),
            _ => Err(format!("Unknown enrollment source: {}", s)),
        }
    }
}

impl std::fmt::Display for EnrollmentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

string_enum_sqlx!(EnrollmentSource);

/// Enrollment entity, unique per (user, course)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Enrollment {
    pub id: StringUuid,
    pub user_id: StringUuid,
    pub course_id: StringUuid,
    pub enrolled_at: DateTime<Utc>,
    pub enrollment_source: EnrollmentSource,
    /// Course whose prerequisite cascade created this row
    pub source_course_id: Option<StringUuid>,
    pub completed: bool,
    pub completion_date: Option<DateTime<Utc>>,
    pub last_accessed: Option<DateTime<Utc>>,
}

impl Enrollment {
    pub fn new(
        user_id: StringUuid,
        course_id: StringUuid,
        source: EnrollmentSource,
        source_course_id: Option<StringUuid>,
    ) -> Self {
        Self {
            id: StringUuid::new_v4(),
            user_id,
            course_id,
            enrolled_at: Utc::now(),
            enrollment_source: source,
            source_course_id,
            completed: false,
            completion_date: None,
            last_accessed: None,
        }
    }

    /// True when this row was created by the prerequisite cascade of `course_id`.
    pub fn is_auto_prerequisite_of(&self, course_id: StringUuid) -> bool {
        self.enrollment_source == EnrollmentSource::AutoPrerequisite
            && self.source_course_id == Some(course_id)
    }
}

/// Source tag carried by a request, or `default` when absent.
///
/// Only `manual` and `bulk` may come from a caller. Cascade tags carry a
/// `source_course_id` the engine relies on to reverse its own rows.
pub fn requested_source(
    source: Option<EnrollmentSource>,
    default: EnrollmentSource,
) -> Result<EnrollmentSource> {
    match source {
        None => Ok(default),
        Some(s @ (EnrollmentSource::Manual | EnrollmentSource::Bulk)) => Ok(s),
        Some(other) => Err(AppError::BadRequest(format!(
            "Enrollment source '{}' cannot be set by a request",
            other
        ))),
    }
}

/// Request body for enrolling another user
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateEnrollmentInput {
    pub user_id: Uuid,
    /// `manual` (default) or `bulk`
    #[serde(default)]
    pub source: Option<EnrollmentSource>,
}

/// Request body for bulk enrollment
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct BulkEnrollmentInput {
    #[validate(length(min = 1, max = 1000))]
    pub user_ids: Vec<Uuid>,
    /// `bulk` (default) or `manual`
    #[serde(default)]
    pub source: Option<EnrollmentSource>,
}

/// Request body for a course-level progress update
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateProgressInput {
    pub progress_percentage: f64,
    #[serde(default)]
    pub force_completion: bool,
}

/// Result of a single create-or-get
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EnrollmentOutcome {
    pub enrollment: Enrollment,
    pub created: bool,
    pub message: String,
}

/// Result of a bulk enrollment
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct BulkEnrollmentResult {
    pub created: usize,
    pub already_enrolled: usize,
    pub errors: Vec<String>,
    /// Rows for every requested user that ended up enrolled
    pub enrollments: Vec<Enrollment>,
}

/// Result of `enroll_user`: the enrollment plus cascade messages
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EnrollmentReport {
    #[serde(flatten)]
    pub outcome: EnrollmentOutcome,
    pub cascade_messages: Vec<String>,
}

/// Clamp a reported percentage into [0, 100]. NaN counts as no progress.
pub fn normalize_percentage(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 100.0)
    }
}

/// Completion columns that a progress report would change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionChange {
    pub completed: bool,
    pub completion_date: Option<DateTime<Utc>>,
}

impl CompletionChange {
    /// Work out the completion transition for `current`, or `None` when nothing changes.
    pub fn evaluate(
        current: &Enrollment,
        progress: f64,
        force_completion: bool,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let completed = force_completion || normalize_percentage(progress) >= 100.0;
        let completion_date = if completed {
            current.completion_date.or(Some(now))
        } else {
            None
        };

        if completed == current.completed && completion_date == current.completion_date {
            return None;
        }
        Some(Self {
            completed,
            completion_date,
        })
    }
}

/// Aggregate completion numbers for a course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProgressSummary {
    pub course_id: StringUuid,
    pub total_enrollments: i64,
    pub completed: i64,
    pub in_progress: i64,
    /// Percentage of enrollments completed, two decimals
    pub completion_rate: f64,
    pub generated_at: DateTime<Utc>,
}

impl ProgressSummary {
    pub fn from_counts(course_id: StringUuid, total: i64, completed: i64) -> Self {
        let completion_rate = if total > 0 {
            ((completed as f64 / total as f64) * 10_000.0).round() / 100.0
        } else {
            0.0
        };
        Self {
            course_id,
            total_enrollments: total,
            completed,
            in_progress: (total - completed).max(0),
            completion_rate,
            generated_at: Utc::now(),
        }
    }
}

/// Enrollment joined with its user, as used by reporting views
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrolledUser {
    pub user: User,
    pub enrollment: Enrollment,
}
