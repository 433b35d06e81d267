//! Course access decisions over live data

use crate::domain::{
    resolve_role, AccessFacts, Course, CoursePermissions, CourseRole, User, UserRole,
};
use crate::error::{AppError, Result};
use crate::repository::{EnrollmentRepository, GroupRepository};
use std::sync::Arc;

/// Resolves course roles and permission gates.
///
/// Nothing here is cached: every call reads the enrollment and group rows
/// again. Lookups that fail are logged and treated as "no relationship", so a
/// decision is always produced and errs toward denying access.
pub struct AccessService<E: EnrollmentRepository, G: GroupRepository> {
    enrollment_repo: Arc<E>,
    group_repo: Arc<G>,
}

impl<E: EnrollmentRepository, G: GroupRepository> AccessService<E, G> {
    pub fn new(enrollment_repo: Arc<E>, group_repo: Arc<G>) -> Self {
        Self {
            enrollment_repo,
            group_repo,
        }
    }

    async fn load_facts(&self, user: &User, course: &Course) -> AccessFacts {
        let is_enrolled = match self.enrollment_repo.find(user.id, course.id).await {
            Ok(enrollment) => enrollment.is_some(),
            Err(e) => {
                tracing::warn!(
                    user_id = %user.id,
                    course_id = %course.id,
                    error = %e,
                    "Enrollment lookup failed during role resolution"
                );
                false
            }
        };

        let group_grants = match self
            .group_repo
            .find_user_course_grants(user.id, course.id)
            .await
        {
            Ok(grants) => grants,
            Err(e) => {
                tracing::warn!(
                    user_id = %user.id,
                    course_id = %course.id,
                    error = %e,
                    "Group access lookup failed during role resolution"
                );
                vec![]
            }
        };

        AccessFacts {
            is_enrolled,
            group_grants,
        }
    }

    pub async fn resolve_role(&self, user: &User, course: &Course) -> CourseRole {
        // The superuser tier does not depend on any relationship rows.
        let facts = if user.is_superuser || user.role == UserRole::Globaladmin {
            AccessFacts::default()
        } else {
            self.load_facts(user, course).await
        };
        resolve_role(user, course, &facts)
    }

    pub async fn permissions(&self, user: &User, course: &Course) -> CoursePermissions {
        CoursePermissions::from(self.resolve_role(user, course).await)
    }

    pub async fn can_access(&self, user: &User, course: &Course) -> bool {
        self.resolve_role(user, course).await.can_view()
    }

    pub async fn can_modify(&self, user: &User, course: &Course) -> bool {
        self.resolve_role(user, course).await.can_modify()
    }

    pub async fn can_enroll_users(&self, user: &User, course: &Course) -> bool {
        self.resolve_role(user, course).await.can_enroll_users()
    }

    pub async fn can_delete(&self, user: &User, course: &Course) -> bool {
        self.resolve_role(user, course).await.can_delete()
    }

    /// Return the permissions when `check` passes, `Forbidden` otherwise.
    pub async fn require<F>(
        &self,
        user: &User,
        course: &Course,
        action: &str,
        check: F,
    ) -> Result<CoursePermissions>
    where
        F: FnOnce(&CoursePermissions) -> bool,
    {
        let permissions = self.permissions(user, course).await;
        if check(&permissions) {
            Ok(permissions)
        } else {
            tracing::info!(
                user_id = %user.id,
                course_id = %course.id,
                role = %permissions.role,
                action,
                "Course permission denied"
            );
            Err(AppError::Forbidden(format!(
                "You do not have permission to {} in this course",
                action
            )))
        }
    }
}
