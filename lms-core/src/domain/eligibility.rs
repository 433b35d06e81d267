//! Enrollment eligibility rules

use super::common::StringUuid;
use super::course::Course;
use super::user::User;
use crate::error::{AppError, Result};
use serde::Serialize;
use utoipa::ToSchema;

/// Completion state of one prerequisite for the user being checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrerequisiteStatus {
    pub course_id: StringUuid,
    pub title: String,
    pub completed: bool,
}

/// Outcome of an eligibility check with every violated rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct EligibilityReport {
    pub eligible: bool,
    pub reasons: Vec<String>,
}

impl EligibilityReport {
    pub fn into_result(self) -> Result<()> {
        if self.eligible {
            Ok(())
        } else {
            Err(AppError::IneligibleEnrollment {
                reasons: self.reasons,
            })
        }
    }
}

/// Check every enrollment rule and collect all failures, in a fixed order.
pub fn evaluate_eligibility(
    user: &User,
    course: &Course,
    active_enrollments: i64,
    prerequisites: &[PrerequisiteStatus],
) -> EligibilityReport {
    let mut reasons = Vec::new();

    if !user.is_active {
        reasons.push("User account is not active".to_string());
    }

    if !course.is_active {
        reasons.push("Course is not active".to_string());
    }

    if course.is_full(active_enrollments) {
        if let Some(capacity) = course.enrollment_capacity {
            reasons.push(format!(
                "Course has reached maximum enrollment capacity ({})",
                capacity
            ));
        }
    }

    for prerequisite in prerequisites.iter().filter(|p| !p.completed) {
        reasons.push(format!(
            "Prerequisite course not completed: {}",
            prerequisite.title
        ));
    }

    if course.branch_id.is_some() && !user.is_branch_exempt() && user.branch_id != course.branch_id
    {
        reasons.push("User branch does not match course branch".to_string());
    }

    EligibilityReport {
        eligible: reasons.is_empty(),
        reasons,
    }
}
