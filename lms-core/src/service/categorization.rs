//! Reporting views over a course's enrolled population

use crate::cache::CacheOperations;
use crate::domain::{
    resolve_role, AccessFacts, CategorizedUser, Course, CourseUserCategories, GroupAccessGrant,
    ProgressSummary, StringUuid, User,
};
use crate::error::Result;
use crate::repository::{EnrollmentRepository, GroupRepository, UserRepository};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct CategorizationService<U, E, G>
where
    U: UserRepository,
    E: EnrollmentRepository,
    G: GroupRepository,
{
    user_repo: Arc<U>,
    enrollment_repo: Arc<E>,
    group_repo: Arc<G>,
    cache: Option<Arc<dyn CacheOperations>>,
    summary_ttl: Duration,
}

impl<U, E, G> CategorizationService<U, E, G>
where
    U: UserRepository,
    E: EnrollmentRepository,
    G: GroupRepository,
{
    pub fn new(
        user_repo: Arc<U>,
        enrollment_repo: Arc<E>,
        group_repo: Arc<G>,
        cache: Option<Arc<dyn CacheOperations>>,
        summary_ttl: Duration,
    ) -> Self {
        Self {
            user_repo,
            enrollment_repo,
            group_repo,
            cache,
            summary_ttl,
        }
    }

    /// Partition every enrolled user of `course` by the role they resolve to.
    ///
    /// Uses the same role rules as the permission gate, fed with rows loaded
    /// in bulk rather than per user.
    pub async fn categorize_course_users(&self, course: &Course) -> Result<CourseUserCategories> {
        let enrollments = self
            .enrollment_repo
            .find_by_course(course.id)
            .await
            .map_err(|e| e.into_domain("Failed to load course enrollments"))?;

        let user_ids: Vec<StringUuid> = enrollments.iter().map(|e| e.user_id).collect();
        let users: HashMap<StringUuid, User> = self
            .user_repo
            .find_by_ids(&user_ids)
            .await
            .map_err(|e| e.into_domain("Failed to load enrolled users"))?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        let mut grants: HashMap<StringUuid, Vec<GroupAccessGrant>> = HashMap::new();
        for grant in self
            .group_repo
            .find_course_grants(course.id)
            .await
            .map_err(|e| e.into_domain("Failed to load group access"))?
        {
            grants.entry(grant.user_id).or_default().push(grant);
        }

        let mut categories = CourseUserCategories::default();
        for enrollment in enrollments {
            let Some(user) = users.get(&enrollment.user_id) else {
                tracing::warn!(
                    enrollment_id = %enrollment.id,
                    user_id = %enrollment.user_id,
                    "Enrollment references a missing user"
                );
                continue;
            };

            let facts = AccessFacts {
                is_enrolled: true,
                group_grants: grants.remove(&user.id).unwrap_or_default(),
            };
            let role = resolve_role(user, course, &facts);

            categories.push(CategorizedUser {
                user: user.clone(),
                enrollment,
                course_role: role,
                display_role: role.display_name().to_string(),
                can_modify: role.can_modify(),
            });
        }

        tracing::debug!(
            course_id = %course.id,
            total = categories.total(),
            "Categorized course users"
        );
        Ok(categories)
    }

    /// Completion totals for a course, cached for a short TTL.
    ///
    /// A cache failure is treated as a miss; the numbers are always computed
    /// from storage when the cache cannot answer.
    pub async fn course_progress_summary(&self, course_id: StringUuid) -> Result<ProgressSummary> {
        if let Some(cache) = &self.cache {
            match cache.get_progress_summary(course_id).await {
                Ok(Some(summary)) => return Ok(summary),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(course_id = %course_id, error = %e, "Progress summary cache read failed")
                }
            }
        }

        let total = self
            .enrollment_repo
            .count_by_course(course_id)
            .await
            .map_err(|e| e.into_domain("Failed to count enrollments"))?;
        let completed = self
            .enrollment_repo
            .count_completed_by_course(course_id)
            .await
            .map_err(|e| e.into_domain("Failed to count completions"))?;
        let summary = ProgressSummary::from_counts(course_id, total, completed);

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set_progress_summary(&summary, self.summary_ttl).await {
                tracing::warn!(course_id = %course_id, error = %e, "Progress summary cache write failed");
            }
        }

        Ok(summary)
    }
}
