//! Course and prerequisite repository

use super::placeholders;
use crate::domain::{Course, PrerequisiteEdge, PrerequisiteReplacement, StringUuid, Topic};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CourseRepository: Send + Sync {
    async fn find_by_id(&self, id: StringUuid) -> Result<Option<Course>>;
    async fn find_by_ids(&self, ids: &[StringUuid]) -> Result<Vec<Course>>;
    async fn find_topic(&self, topic_id: StringUuid) -> Result<Option<Topic>>;

    /// Direct prerequisite edges leaving any of `course_ids`
    async fn find_prerequisite_edges(
        &self,
        course_ids: &[StringUuid],
    ) -> Result<Vec<PrerequisiteEdge>>;
    async fn find_prerequisite_ids(&self, course_id: StringUuid) -> Result<Vec<StringUuid>>;
    /// Courses that list `course_id` as a prerequisite
    async fn find_dependent_ids(&self, course_id: StringUuid) -> Result<Vec<StringUuid>>;
    /// Replace the full prerequisite set of a course.
    ///
    /// Edits are serialized: the previous set is read and the cycle check runs
    /// against the whole graph under the same lock as the write, so two
    /// concurrent edits can neither both pass the check nor diff against a
    /// stale previous set. Nothing is written for a `Cyclic` outcome.
    async fn replace_prerequisites(
        &self,
        course_id: StringUuid,
        prerequisite_ids: &[StringUuid],
        max_depth: usize,
    ) -> Result<PrerequisiteReplacement>;
}

pub struct CourseRepositoryImpl {
    pool: MySqlPool,
}

impl CourseRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const COURSE_SELECT: &str = r#"
    SELECT c.id, c.title, c.instructor_id, c.branch_id, b.business_id, c.is_active,
           c.enrollment_capacity, c.created_at, c.updated_at
    FROM courses c
    LEFT JOIN branches b ON b.id = c.branch_id
"#;

#[async_trait]
impl CourseRepository for CourseRepositoryImpl {
    async fn find_by_id(&self, id: StringUuid) -> Result<Option<Course>> {
        let sql = format!("{} WHERE c.id = ?", COURSE_SELECT);
        let course = sqlx::query_as::<_, Course>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(course)
    }

    async fn find_by_ids(&self, ids: &[StringUuid]) -> Result<Vec<Course>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let sql = format!(
            "{} WHERE c.id IN ({})",
            COURSE_SELECT,
            placeholders(ids.len())
        );
        let mut query = sqlx::query_as::<_, Course>(&sql);
        for id in ids {
            query = query.bind(*id);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn find_topic(&self, topic_id: StringUuid) -> Result<Option<Topic>> {
        let topic = sqlx::query_as::<_, Topic>("SELECT id, course_id, title FROM topics WHERE id = ?")
            .bind(topic_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(topic)
    }

    async fn find_prerequisite_edges(
        &self,
        course_ids: &[StringUuid],
    ) -> Result<Vec<PrerequisiteEdge>> {
        if course_ids.is_empty() {
            return Ok(vec![]);
        }

        let sql = format!(
            "SELECT course_id, prerequisite_id FROM course_prerequisites WHERE course_id IN ({})",
            placeholders(course_ids.len())
        );
        let mut query = sqlx::query_as::<_, PrerequisiteEdge>(&sql);
        for id in course_ids {
            query = query.bind(*id);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn find_prerequisite_ids(&self, course_id: StringUuid) -> Result<Vec<StringUuid>> {
        let ids = sqlx::query_scalar::<_, StringUuid>(
            "SELECT prerequisite_id FROM course_prerequisites WHERE course_id = ?",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn find_dependent_ids(&self, course_id: StringUuid) -> Result<Vec<StringUuid>> {
        let ids = sqlx::query_scalar::<_, StringUuid>(
            "SELECT course_id FROM course_prerequisites WHERE prerequisite_id = ?",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn replace_prerequisites(
        &self,
        course_id: StringUuid,
        prerequisite_ids: &[StringUuid],
        max_depth: usize,
    ) -> Result<PrerequisiteReplacement> {
        let mut tx = self.pool.begin().await?;

        // Graph-wide lock: a cycle can span courses this edit never names.
        // Ordered by key so concurrent editors queue instead of deadlocking.
        sqlx::query("SELECT id FROM courses ORDER BY id FOR UPDATE")
            .execute(&mut *tx)
            .await?;

        let edges = sqlx::query_as::<_, PrerequisiteEdge>(
            "SELECT course_id, prerequisite_id FROM course_prerequisites FOR UPDATE",
        )
        .fetch_all(&mut *tx)
        .await?;

        let outcome =
            PrerequisiteReplacement::check(edges, course_id, prerequisite_ids, max_depth);
        if let PrerequisiteReplacement::Cyclic { .. } = outcome {
            tx.rollback().await?;
            return Ok(outcome);
        }

        sqlx::query("DELETE FROM course_prerequisites WHERE course_id = ?")
            .bind(course_id)
            .execute(&mut *tx)
            .await?;

        for prerequisite_id in prerequisite_ids {
            sqlx::query(
                "INSERT IGNORE INTO course_prerequisites (course_id, prerequisite_id) VALUES (?, ?)",
            )
            .bind(course_id)
            .bind(*prerequisite_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE courses SET updated_at = NOW() WHERE id = ?")
            .bind(course_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(outcome)
    }
}
