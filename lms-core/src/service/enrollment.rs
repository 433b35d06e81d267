//! Enrollment business logic
//!
//! This service is the only writer of enrollment rows. Concurrent callers
//! racing on the same (user, course) pair converge on a single row: the
//! repository locks and inserts inside one transaction, and a loser of the
//! insert race re-reads the winner instead of failing.

use crate::cache::CacheOperations;
use crate::domain::{
    evaluate_eligibility, BulkEnrollmentResult, Course, EligibilityReport, Enrollment,
    EnrollmentOutcome, EnrollmentSource, PrerequisiteStatus, StringUuid, Topic, TopicProgressOutcome,
    TopicProgressUpdate, User,
};
use crate::error::{AppError, Result};
use crate::repository::{
    CourseRepository, EnrollmentRepository, TopicProgressRepository, UserRepository,
};
use crate::telemetry::metrics;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use validator::Validate;

/// Attempts at lock-then-insert before a conflict is reported as internal
const MAX_CREATE_ATTEMPTS: usize = 2;

pub struct EnrollmentService<U, C, E, T>
where
    U: UserRepository,
    C: CourseRepository,
    E: EnrollmentRepository,
    T: TopicProgressRepository,
{
    user_repo: Arc<U>,
    course_repo: Arc<C>,
    enrollment_repo: Arc<E>,
    topic_progress_repo: Arc<T>,
    cache: Option<Arc<dyn CacheOperations>>,
}

impl<U, C, E, T> EnrollmentService<U, C, E, T>
where
    U: UserRepository,
    C: CourseRepository,
    E: EnrollmentRepository,
    T: TopicProgressRepository,
{
    pub fn new(
        user_repo: Arc<U>,
        course_repo: Arc<C>,
        enrollment_repo: Arc<E>,
        topic_progress_repo: Arc<T>,
        cache: Option<Arc<dyn CacheOperations>>,
    ) -> Self {
        Self {
            user_repo,
            course_repo,
            enrollment_repo,
            topic_progress_repo,
            cache,
        }
    }

    // ==================== Lookups ====================

    pub async fn get_user(&self, id: StringUuid) -> Result<User> {
        self.user_repo
            .find_by_id(id)
            .await
            .map_err(|e| e.into_domain("Failed to load user"))?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    pub async fn get_users(&self, ids: &[StringUuid]) -> Result<Vec<User>> {
        self.user_repo
            .find_by_ids(ids)
            .await
            .map_err(|e| e.into_domain("Failed to load users"))
    }

    pub async fn get_course(&self, id: StringUuid) -> Result<Course> {
        self.course_repo
            .find_by_id(id)
            .await
            .map_err(|e| e.into_domain("Failed to load course"))?
            .ok_or_else(|| AppError::NotFound(format!("Course {} not found", id)))
    }

    pub async fn get_topic(&self, id: StringUuid) -> Result<Topic> {
        self.course_repo
            .find_topic(id)
            .await
            .map_err(|e| e.into_domain("Failed to load topic"))?
            .ok_or_else(|| AppError::NotFound(format!("Topic {} not found", id)))
    }

    pub async fn get_enrollment(&self, id: StringUuid) -> Result<Enrollment> {
        self.enrollment_repo
            .find_by_id(id)
            .await
            .map_err(|e| e.into_domain("Failed to load enrollment"))?
            .ok_or_else(|| AppError::NotFound(format!("Enrollment {} not found", id)))
    }

    pub async fn find_enrollment(
        &self,
        user_id: StringUuid,
        course_id: StringUuid,
    ) -> Result<Option<Enrollment>> {
        self.enrollment_repo
            .find(user_id, course_id)
            .await
            .map_err(|e| e.into_domain("Failed to load enrollment"))
    }

    // ==================== Create ====================

    /// Enroll `user` in `course`, or return the existing enrollment.
    ///
    /// Exactly one of any number of concurrent callers observes `created = true`.
    pub async fn create_or_get_enrollment(
        &self,
        user: &User,
        course: &Course,
        source: EnrollmentSource,
        source_course_id: Option<StringUuid>,
    ) -> Result<EnrollmentOutcome> {
        let mut attempt = 1;
        loop {
            let result = self
                .enrollment_repo
                .lock_or_create(user.id, course.id, source, source_course_id)
                .await;

            match result {
                Ok((enrollment, true)) => {
                    metrics::record_enrollments_created(source, 1);
                    tracing::info!(
                        user_id = %user.id,
                        course_id = %course.id,
                        source = %source,
                        "Enrollment created"
                    );
                    self.invalidate_summary(course.id).await;
                    return Ok(EnrollmentOutcome {
                        enrollment,
                        created: true,
                        message: format!(
                            "Successfully enrolled {} in {}",
                            user.username, course.title
                        ),
                    });
                }
                Ok((enrollment, false)) => return Ok(already_enrolled(user, course, enrollment)),
                Err(e) if e.is_unique_violation() || e.is_lock_conflict() => {
                    let winner = self
                        .enrollment_repo
                        .find(user.id, course.id)
                        .await
                        .map_err(|e| e.into_domain("Failed to re-read enrollment after conflict"))?;

                    if let Some(enrollment) = winner {
                        metrics::record_race_recovered();
                        tracing::debug!(
                            user_id = %user.id,
                            course_id = %course.id,
                            "Concurrent enrollment resolved to existing row"
                        );
                        return Ok(already_enrolled(user, course, enrollment));
                    }

                    if attempt >= MAX_CREATE_ATTEMPTS {
                        tracing::error!(
                            user_id = %user.id,
                            course_id = %course.id,
                            error = %e,
                            "Enrollment conflict did not resolve to a row"
                        );
                        return Err(AppError::Internal(anyhow::anyhow!(
                            "Enrollment of user {} in course {} conflicted without a winning row",
                            user.id,
                            course.id
                        )));
                    }
                    tracing::warn!(
                        user_id = %user.id,
                        course_id = %course.id,
                        attempt,
                        "Retrying enrollment after lock conflict"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e.into_domain("Failed to create enrollment")),
            }
        }
    }

    /// Enroll many users at once.
    ///
    /// Users already enrolled are counted, not reported as errors. Inactive
    /// accounts are skipped with an error entry each.
    pub async fn bulk_create_enrollments(
        &self,
        users: &[User],
        course: &Course,
        source: EnrollmentSource,
    ) -> Result<BulkEnrollmentResult> {
        let mut result = BulkEnrollmentResult::default();

        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(users.len());
        for user in users {
            if !seen.insert(user.id) {
                continue;
            }
            if !user.is_active {
                result
                    .errors
                    .push(format!("User {} is not active", user.username));
                continue;
            }
            candidates.push(user);
        }

        if candidates.is_empty() {
            return Ok(result);
        }

        let candidate_ids: Vec<StringUuid> = candidates.iter().map(|u| u.id).collect();
        let already: HashSet<StringUuid> = self
            .enrollment_repo
            .find_enrolled_user_ids(course.id, &candidate_ids)
            .await
            .map_err(|e| e.into_domain("Failed to load existing enrollments"))?
            .into_iter()
            .collect();

        let rows: Vec<Enrollment> = candidates
            .iter()
            .filter(|u| !already.contains(&u.id))
            .map(|u| Enrollment::new(u.id, course.id, source, None))
            .collect();
        result.already_enrolled = already.len();

        match self.enrollment_repo.insert_ignore_many(&rows).await {
            Ok(written) => {
                let written = written as usize;
                result.created = written;
                // Rows skipped by the unique key lost a race; they exist now.
                result.already_enrolled += rows.len().saturating_sub(written);
                metrics::record_enrollments_created(source, written as u64);
            }
            Err(e) => {
                tracing::error!(course_id = %course.id, error = %e, "Bulk enrollment insert failed");
                result
                    .errors
                    .push("Bulk enrollment failed, please try again".to_string());
            }
        }

        let wanted: HashSet<StringUuid> = candidate_ids.into_iter().collect();
        result.enrollments = self
            .enrollment_repo
            .find_by_course(course.id)
            .await
            .map_err(|e| e.into_domain("Failed to load enrollments"))?
            .into_iter()
            .filter(|e| wanted.contains(&e.user_id))
            .collect();

        tracing::info!(
            course_id = %course.id,
            created = result.created,
            already_enrolled = result.already_enrolled,
            errors = result.errors.len(),
            "Bulk enrollment finished"
        );
        if result.created > 0 {
            self.invalidate_summary(course.id).await;
        }
        Ok(result)
    }

    // ==================== Update ====================

    /// Apply a progress report to an enrollment.
    ///
    /// Returns false on any failure; callers treat that as "retry later".
    pub async fn update_enrollment_progress(
        &self,
        enrollment: &Enrollment,
        progress_percentage: f64,
        force_completion: bool,
    ) -> bool {
        match self
            .enrollment_repo
            .update_completion(enrollment.id, progress_percentage, force_completion)
            .await
        {
            Ok(Some(changed)) => {
                if changed {
                    self.invalidate_summary(enrollment.course_id).await;
                }
                true
            }
            Ok(None) => {
                tracing::warn!(enrollment_id = %enrollment.id, "Progress update for missing enrollment");
                false
            }
            Err(e) => {
                tracing::error!(
                    enrollment_id = %enrollment.id,
                    error = %e,
                    "Failed to update enrollment progress"
                );
                false
            }
        }
    }

    pub async fn touch_last_accessed(&self, enrollment: &Enrollment) -> Result<()> {
        self.enrollment_repo
            .touch_last_accessed(enrollment.id)
            .await
            .map_err(|e| e.into_domain("Failed to record course access"))
    }

    /// Get-or-create the user's progress row for a topic and fold `update` into it.
    pub async fn create_or_update_topic_progress(
        &self,
        user: &User,
        topic_id: StringUuid,
        update: TopicProgressUpdate,
    ) -> Result<TopicProgressOutcome> {
        update.validate()?;

        let first = self
            .topic_progress_repo
            .upsert_locked(user.id, topic_id, &update)
            .await;

        let (progress, created) = match first {
            Ok(written) => written,
            Err(e) if e.is_unique_violation() || e.is_lock_conflict() => {
                // The competing insert has committed; this pass updates it.
                metrics::record_race_recovered();
                self.topic_progress_repo
                    .upsert_locked(user.id, topic_id, &update)
                    .await
                    .map_err(|e| e.into_domain("Failed to record topic progress"))?
            }
            Err(e) => return Err(e.into_domain("Failed to record topic progress")),
        };

        Ok(TopicProgressOutcome { progress, created })
    }

    // ==================== Eligibility ====================

    /// Evaluate every enrollment rule and report all violations together.
    pub async fn validate_enrollment_eligibility(
        &self,
        user: &User,
        course: &Course,
    ) -> Result<EligibilityReport> {
        let active_enrollments = self
            .enrollment_repo
            .count_by_course(course.id)
            .await
            .map_err(|e| e.into_domain("Failed to count enrollments"))?;

        let prerequisites = self.prerequisite_statuses(user, course).await?;

        Ok(evaluate_eligibility(
            user,
            course,
            active_enrollments,
            &prerequisites,
        ))
    }

    async fn prerequisite_statuses(
        &self,
        user: &User,
        course: &Course,
    ) -> Result<Vec<PrerequisiteStatus>> {
        let prerequisite_ids = self
            .course_repo
            .find_prerequisite_ids(course.id)
            .await
            .map_err(|e| e.into_domain("Failed to load prerequisites"))?;
        if prerequisite_ids.is_empty() {
            return Ok(vec![]);
        }

        let courses = self
            .course_repo
            .find_by_ids(&prerequisite_ids)
            .await
            .map_err(|e| e.into_domain("Failed to load prerequisite courses"))?;
        let completed: HashMap<StringUuid, bool> = self
            .enrollment_repo
            .find_by_user_in_courses(user.id, &prerequisite_ids)
            .await
            .map_err(|e| e.into_domain("Failed to load prerequisite enrollments"))?
            .into_iter()
            .map(|e| (e.course_id, e.completed))
            .collect();

        Ok(courses
            .into_iter()
            .map(|c| PrerequisiteStatus {
                completed: completed.get(&c.id).copied().unwrap_or(false),
                course_id: c.id,
                title: c.title,
            })
            .collect())
    }

    // ==================== Delete ====================

    pub async fn unenroll(&self, user: &User, course: &Course) -> Result<()> {
        let deleted = self
            .enrollment_repo
            .delete(user.id, course.id)
            .await
            .map_err(|e| e.into_domain("Failed to remove enrollment"))?;

        if !deleted {
            return Err(AppError::NotFound(format!(
                "{} is not enrolled in {}",
                user.username, course.title
            )));
        }

        tracing::info!(user_id = %user.id, course_id = %course.id, "Enrollment removed");
        self.invalidate_summary(course.id).await;
        Ok(())
    }

    /// Drop enrollments in `prerequisite_id` created by the cascade of `source_course_id`.
    pub async fn remove_auto_prerequisite_enrollments(
        &self,
        prerequisite_id: StringUuid,
        source_course_id: StringUuid,
    ) -> Result<u64> {
        let removed = self
            .enrollment_repo
            .delete_auto_prerequisite(prerequisite_id, source_course_id)
            .await
            .map_err(|e| e.into_domain("Failed to remove automatic enrollments"))?;
        if removed > 0 {
            self.invalidate_summary(prerequisite_id).await;
        }
        Ok(removed)
    }

    async fn invalidate_summary(&self, course_id: StringUuid) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.invalidate_progress_summary(course_id).await {
                tracing::warn!(course_id = %course_id, error = %e, "Failed to invalidate progress summary");
            }
        }
    }
}

pub(super) fn already_enrolled(user: &User, course: &Course, enrollment: Enrollment) -> EnrollmentOutcome {
    EnrollmentOutcome {
        enrollment,
        created: false,
        message: format!("{} is already enrolled in {}", user.username, course.title),
    }
}
