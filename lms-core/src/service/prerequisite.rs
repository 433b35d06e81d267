//! Prerequisite cascade engine
//!
//! Walks the prerequisite graph to keep enrollments consistent with it. Every
//! individual write goes through `EnrollmentService`, each in its own short
//! transaction; no lock is held across a cascade.

use super::enrollment::{already_enrolled, EnrollmentService};
use crate::config::EnrollmentConfig;
use crate::domain::{
    Course, EnrollmentReport, EnrollmentSource, PrerequisiteChangeReport, PrerequisiteGraph,
    PrerequisiteReplacement, StringUuid, User,
};
use crate::error::{AppError, Result};
use crate::repository::{
    CourseRepository, EnrollmentRepository, TopicProgressRepository, UserRepository,
};
use crate::telemetry::metrics;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub struct PrerequisiteService<U, C, E, T>
where
    U: UserRepository,
    C: CourseRepository,
    E: EnrollmentRepository,
    T: TopicProgressRepository,
{
    course_repo: Arc<C>,
    enrollment_repo: Arc<E>,
    enrollments: Arc<EnrollmentService<U, C, E, T>>,
    config: EnrollmentConfig,
}

impl<U, C, E, T> PrerequisiteService<U, C, E, T>
where
    U: UserRepository,
    C: CourseRepository,
    E: EnrollmentRepository,
    T: TopicProgressRepository,
{
    pub fn new(
        course_repo: Arc<C>,
        enrollment_repo: Arc<E>,
        enrollments: Arc<EnrollmentService<U, C, E, T>>,
        config: EnrollmentConfig,
    ) -> Self {
        Self {
            course_repo,
            enrollment_repo,
            enrollments,
            config,
        }
    }

    fn max_depth(&self) -> usize {
        self.config.max_prerequisite_depth
    }

    /// Load every edge reachable from `roots`, one query per level.
    ///
    /// Stops one level past the depth cap, which is all the cycle check can see.
    async fn load_graph(&self, roots: &[StringUuid]) -> Result<PrerequisiteGraph> {
        let mut graph = PrerequisiteGraph::default();
        let mut seen: HashSet<StringUuid> = roots.iter().copied().collect();
        let mut frontier: Vec<StringUuid> = roots.to_vec();

        for _ in 0..=self.max_depth() {
            if frontier.is_empty() {
                break;
            }
            let edges = self
                .course_repo
                .find_prerequisite_edges(&frontier)
                .await
                .map_err(|e| e.into_domain("Failed to load prerequisite graph"))?;

            frontier = Vec::new();
            for edge in edges {
                graph.add_edge(edge.course_id, edge.prerequisite_id);
                if seen.insert(edge.prerequisite_id) {
                    frontier.push(edge.prerequisite_id);
                }
            }
        }

        Ok(graph)
    }

    pub async fn has_circular_dependency(&self, course_id: StringUuid) -> Result<bool> {
        let graph = self.load_graph(&[course_id]).await?;
        Ok(graph.has_circular_dependency(course_id, self.max_depth()))
    }

    // ==================== Forward cascade ====================

    /// Enroll `user` in every transitive prerequisite of `course`, deepest first.
    ///
    /// Nothing is written when the graph is cyclic; a warning message is
    /// returned instead.
    pub async fn handle_prerequisite_enrollments(
        &self,
        user: &User,
        course: &Course,
    ) -> Result<Vec<String>> {
        let graph = self.load_graph(&[course.id]).await?;

        if let Some(path) = graph.find_cycle(course.id, self.max_depth()) {
            tracing::warn!(
                course_id = %course.id,
                user_id = %user.id,
                path_len = path.len(),
                "Circular prerequisite dependency, skipping automatic enrollment"
            );
            metrics::record_cascade("forward", "cyclic");
            return Ok(vec![format!(
                "Circular prerequisite dependency detected for {}; automatic prerequisite enrollment skipped",
                course.title
            )]);
        }

        let plan = graph.cascade_plan(course.id, self.max_depth());
        if plan.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<StringUuid> = plan.iter().map(|step| step.course_id).collect();
        let courses: HashMap<StringUuid, Course> = self
            .course_repo
            .find_by_ids(&ids)
            .await
            .map_err(|e| e.into_domain("Failed to load prerequisite courses"))?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let mut messages = Vec::new();
        for step in plan {
            let Some(prerequisite) = courses.get(&step.course_id) else {
                tracing::warn!(course_id = %step.course_id, "Prerequisite course row missing");
                continue;
            };

            let outcome = self
                .enrollments
                .create_or_get_enrollment(
                    user,
                    prerequisite,
                    EnrollmentSource::AutoPrerequisite,
                    Some(step.required_by),
                )
                .await?;

            if outcome.created {
                messages.push(format!(
                    "Auto-enrolled in prerequisite course: {}",
                    prerequisite.title
                ));
            }
        }

        metrics::record_cascade("forward", "applied");
        Ok(messages)
    }

    // ==================== Dependent cascade ====================

    /// Enroll `user` in courses that require `course`, when it was the only
    /// prerequisite they lacked an enrollment for.
    pub async fn handle_dependent_enrollments(
        &self,
        user: &User,
        course: &Course,
    ) -> Result<Vec<String>> {
        let dependent_ids = self
            .course_repo
            .find_dependent_ids(course.id)
            .await
            .map_err(|e| e.into_domain("Failed to load dependent courses"))?;
        if dependent_ids.is_empty() {
            return Ok(vec![]);
        }

        let dependents = self
            .course_repo
            .find_by_ids(&dependent_ids)
            .await
            .map_err(|e| e.into_domain("Failed to load dependent courses"))?;

        let mut messages = Vec::new();
        for dependent in dependents.iter().filter(|d| d.is_active) {
            let others: Vec<StringUuid> = self
                .course_repo
                .find_prerequisite_ids(dependent.id)
                .await
                .map_err(|e| e.into_domain("Failed to load prerequisites"))?
                .into_iter()
                .filter(|id| *id != course.id)
                .collect();

            let held: HashSet<StringUuid> = self
                .enrollment_repo
                .find_by_user_in_courses(user.id, &others)
                .await
                .map_err(|e| e.into_domain("Failed to load user enrollments"))?
                .into_iter()
                .map(|e| e.course_id)
                .collect();

            if !others.iter().all(|id| held.contains(id)) {
                continue;
            }

            if self.has_circular_dependency(dependent.id).await? {
                tracing::warn!(
                    course_id = %dependent.id,
                    user_id = %user.id,
                    "Circular prerequisite dependency, skipping dependent enrollment"
                );
                metrics::record_cascade("dependent", "cyclic");
                continue;
            }

            let outcome = self
                .enrollments
                .create_or_get_enrollment(
                    user,
                    dependent,
                    EnrollmentSource::AutoDependent,
                    Some(course.id),
                )
                .await?;
            if outcome.created {
                messages.push(format!(
                    "Auto-enrolled in dependent course: {}",
                    dependent.title
                ));
            }
        }

        metrics::record_cascade("dependent", "applied");
        Ok(messages)
    }

    // ==================== Orchestration ====================

    /// Create-or-get the enrollment and, when it is new, run both cascades.
    ///
    /// The enrollment itself is committed before the cascades run. A cascade
    /// failure is logged and reported as a message rather than undoing it.
    pub async fn enroll_user(
        &self,
        user: &User,
        course: &Course,
        source: EnrollmentSource,
        source_course_id: Option<StringUuid>,
    ) -> Result<EnrollmentReport> {
        let outcome = self
            .enrollments
            .create_or_get_enrollment(user, course, source, source_course_id)
            .await?;

        let mut cascade_messages = Vec::new();
        if outcome.created {
            match self.handle_prerequisite_enrollments(user, course).await {
                Ok(messages) => cascade_messages.extend(messages),
                Err(e) => {
                    tracing::error!(user_id = %user.id, course_id = %course.id, error = %e, "Prerequisite cascade failed");
                    metrics::record_cascade("forward", "failed");
                    cascade_messages
                        .push("Prerequisite enrollment could not be completed".to_string());
                }
            }
            match self.handle_dependent_enrollments(user, course).await {
                Ok(messages) => cascade_messages.extend(messages),
                Err(e) => {
                    tracing::error!(user_id = %user.id, course_id = %course.id, error = %e, "Dependent cascade failed");
                    metrics::record_cascade("dependent", "failed");
                    cascade_messages
                        .push("Dependent course enrollment could not be completed".to_string());
                }
            }
        }

        Ok(EnrollmentReport {
            outcome,
            cascade_messages,
        })
    }

    /// Enroll the acting user after checking every eligibility rule.
    pub async fn self_enroll(&self, user: &User, course: &Course) -> Result<EnrollmentReport> {
        if let Some(enrollment) = self.enrollments.find_enrollment(user.id, course.id).await? {
            return Ok(EnrollmentReport {
                outcome: already_enrolled(user, course, enrollment),
                cascade_messages: vec![],
            });
        }

        self.enrollments
            .validate_enrollment_eligibility(user, course)
            .await?
            .into_result()?;

        self.enroll_user(user, course, EnrollmentSource::SelfEnrolled, None)
            .await
    }

    // ==================== Prerequisite edits ====================

    /// Replace the prerequisites of `course`, rejecting any set that would
    /// close a cycle, then bring existing enrollments in line.
    pub async fn update_course_prerequisites(
        &self,
        course: &Course,
        prerequisite_ids: &[StringUuid],
    ) -> Result<PrerequisiteChangeReport> {
        let mut requested = Vec::with_capacity(prerequisite_ids.len());
        for id in prerequisite_ids {
            if !requested.contains(id) {
                requested.push(*id);
            }
        }

        if requested.contains(&course.id) {
            return Err(AppError::CyclicPrerequisite(format!(
                "{} cannot be its own prerequisite",
                course.title
            )));
        }

        let found = self
            .course_repo
            .find_by_ids(&requested)
            .await
            .map_err(|e| e.into_domain("Failed to load prerequisite courses"))?;
        if let Some(missing) = requested
            .iter()
            .find(|id| !found.iter().any(|c| c.id == **id))
        {
            return Err(AppError::NotFound(format!("Course {} not found", missing)));
        }

        let mut graph = self.load_graph(&requested).await?;
        graph.set_prerequisites(course.id, &requested);
        if let Some(path) = graph.find_cycle(course.id, self.max_depth()) {
            return Err(AppError::CyclicPrerequisite(
                self.describe_path(&path, course).await,
            ));
        }

        let replacement = self
            .course_repo
            .replace_prerequisites(course.id, &requested, self.max_depth())
            .await
            .map_err(|e| e.into_domain("Failed to save prerequisites"))?;
        let previous = match replacement {
            PrerequisiteReplacement::Replaced { previous } => previous,
            PrerequisiteReplacement::Cyclic { path } => {
                // Another edit committed edges the graph read above did not see
                return Err(AppError::CyclicPrerequisite(
                    self.describe_path(&path, course).await,
                ));
            }
        };

        tracing::info!(
            course_id = %course.id,
            count = requested.len(),
            "Course prerequisites updated"
        );

        let mut report = self
            .sync_prerequisite_changes(course, &previous, &requested)
            .await?;

        // A later edit may have committed while this sync was writing. Diff
        // against what is stored now so no cascade row outlives its edge.
        let current = self
            .course_repo
            .find_prerequisite_ids(course.id)
            .await
            .map_err(|e| e.into_domain("Failed to load prerequisites"))?;
        if !same_set(&current, &requested) {
            tracing::warn!(
                course_id = %course.id,
                "Prerequisites changed during sync, reconciling enrollments"
            );
            metrics::record_cascade("sync", "reconciled");
            let follow_up = self
                .sync_prerequisite_changes(course, &requested, &current)
                .await?;
            report.messages.extend(follow_up.messages);
        }

        report.prerequisite_ids = requested;
        Ok(report)
    }

    /// Reactive cascade for an edited prerequisite set.
    ///
    /// Added prerequisites get an enrollment for everyone enrolled in `course`.
    /// Removed prerequisites lose only the rows this course's cascade created.
    pub async fn sync_prerequisite_changes(
        &self,
        course: &Course,
        previous: &[StringUuid],
        current: &[StringUuid],
    ) -> Result<PrerequisiteChangeReport> {
        let added: Vec<StringUuid> = current
            .iter()
            .filter(|id| !previous.contains(id))
            .copied()
            .collect();
        let removed: Vec<StringUuid> = previous
            .iter()
            .filter(|id| !current.contains(id))
            .copied()
            .collect();

        let touched: Vec<StringUuid> = added.iter().chain(removed.iter()).copied().collect();
        let titles: HashMap<StringUuid, String> = self
            .course_repo
            .find_by_ids(&touched)
            .await
            .map_err(|e| e.into_domain("Failed to load prerequisite courses"))?
            .into_iter()
            .map(|c| (c.id, c.title))
            .collect();
        let title_of = |id: &StringUuid| titles.get(id).cloned().unwrap_or_else(|| id.to_string());

        let mut messages = Vec::new();

        if !added.is_empty() {
            let enrolled_ids: Vec<StringUuid> = self
                .enrollment_repo
                .find_by_course(course.id)
                .await
                .map_err(|e| e.into_domain("Failed to load course enrollments"))?
                .into_iter()
                .map(|e| e.user_id)
                .collect();
            let users = self.enrollments.get_users(&enrolled_ids).await?;
            let prerequisites = self
                .course_repo
                .find_by_ids(&added)
                .await
                .map_err(|e| e.into_domain("Failed to load prerequisite courses"))?;

            for prerequisite in &prerequisites {
                let mut created = 0;
                for user in &users {
                    let outcome = self
                        .enrollments
                        .create_or_get_enrollment(
                            user,
                            prerequisite,
                            EnrollmentSource::AutoPrerequisite,
                            Some(course.id),
                        )
                        .await?;
                    if outcome.created {
                        created += 1;
                    }
                }
                if created > 0 {
                    messages.push(format!(
                        "Auto-enrolled {} user(s) in new prerequisite: {}",
                        created, prerequisite.title
                    ));
                }
            }
        }

        for prerequisite_id in &removed {
            let count = self
                .enrollments
                .remove_auto_prerequisite_enrollments(*prerequisite_id, course.id)
                .await?;
            if count > 0 {
                messages.push(format!(
                    "Removed {} automatic enrollment(s) from former prerequisite: {}",
                    count,
                    title_of(prerequisite_id)
                ));
            }
        }

        metrics::record_cascade("sync", "applied");
        Ok(PrerequisiteChangeReport {
            prerequisite_ids: current.to_vec(),
            added,
            removed,
            messages,
        })
    }

    async fn describe_path(&self, path: &[StringUuid], course: &Course) -> String {
        let titles: HashMap<StringUuid, String> = match self.course_repo.find_by_ids(path).await {
            Ok(courses) => courses.into_iter().map(|c| (c.id, c.title)).collect(),
            Err(_) => HashMap::new(),
        };
        let names: Vec<String> = path
            .iter()
            .map(|id| {
                if *id == course.id {
                    course.title.clone()
                } else {
                    titles.get(id).cloned().unwrap_or_else(|| id.to_string())
                }
            })
            .collect();

        let closes_loop = path
            .last()
            .is_some_and(|last| path[..path.len() - 1].contains(last));
        if closes_loop {
            format!("Prerequisite cycle: {}", names.join(" -> "))
        } else {
            format!(
                "Prerequisite chain deeper than {} levels: {}",
                self.max_depth(),
                names.join(" -> ")
            )
        }
    }
}

fn same_set(a: &[StringUuid], b: &[StringUuid]) -> bool {
    a.len() == b.len() && a.iter().all(|id| b.contains(id))
}
