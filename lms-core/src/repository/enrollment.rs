//! Enrollment repository
//!
//! The `enrollments` table carries `UNIQUE(user_id, course_id)`. Single-row
//! writers lock the target row inside a transaction; bulk writers rely on
//! `INSERT IGNORE` and the unique key instead.

use super::placeholders;
use crate::domain::{CompletionChange, Enrollment, EnrollmentSource, StringUuid};
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySql, MySqlPool, QueryBuilder};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Lock the (user, course) row and create it when absent.
    ///
    /// Returns the row and whether it was inserted. A concurrent writer that
    /// inserts between the lock and the insert surfaces as a unique violation.
    async fn lock_or_create(
        &self,
        user_id: StringUuid,
        course_id: StringUuid,
        source: EnrollmentSource,
        source_course_id: Option<StringUuid>,
    ) -> Result<(Enrollment, bool)>;

    async fn find(&self, user_id: StringUuid, course_id: StringUuid)
        -> Result<Option<Enrollment>>;
    async fn find_by_id(&self, id: StringUuid) -> Result<Option<Enrollment>>;
    async fn find_by_course(&self, course_id: StringUuid) -> Result<Vec<Enrollment>>;
    /// Enrollments of one user restricted to `course_ids`
    async fn find_by_user_in_courses(
        &self,
        user_id: StringUuid,
        course_ids: &[StringUuid],
    ) -> Result<Vec<Enrollment>>;
    /// Subset of `user_ids` already enrolled in `course_id`
    async fn find_enrolled_user_ids(
        &self,
        course_id: StringUuid,
        user_ids: &[StringUuid],
    ) -> Result<Vec<StringUuid>>;

    /// Multi-row insert that skips rows hitting the unique key. Returns rows written.
    async fn insert_ignore_many(&self, enrollments: &[Enrollment]) -> Result<u64>;

    async fn count_by_course(&self, course_id: StringUuid) -> Result<i64>;
    async fn count_completed_by_course(&self, course_id: StringUuid) -> Result<i64>;

    /// Lock the row and apply a progress report.
    ///
    /// `None` when the enrollment does not exist, otherwise whether anything was written.
    async fn update_completion(
        &self,
        id: StringUuid,
        progress_percentage: f64,
        force_completion: bool,
    ) -> Result<Option<bool>>;
    async fn touch_last_accessed(&self, id: StringUuid) -> Result<()>;

    /// Returns false when there was nothing to delete
    async fn delete(&self, user_id: StringUuid, course_id: StringUuid) -> Result<bool>;
    /// Delete rows in `prerequisite_id` that the cascade of `source_course_id` created
    async fn delete_auto_prerequisite(
        &self,
        prerequisite_id: StringUuid,
        source_course_id: StringUuid,
    ) -> Result<u64>;
}

pub struct EnrollmentRepositoryImpl {
    pool: MySqlPool,
}

impl EnrollmentRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const ENROLLMENT_COLUMNS: &str = "id, user_id, course_id, enrolled_at, enrollment_source, \
     source_course_id, completed, completion_date, last_accessed";

#[async_trait]
impl EnrollmentRepository for EnrollmentRepositoryImpl {
    async fn lock_or_create(
        &self,
        user_id: StringUuid,
        course_id: StringUuid,
        source: EnrollmentSource,
        source_course_id: Option<StringUuid>,
    ) -> Result<(Enrollment, bool)> {
        let mut tx = self.pool.begin().await?;

        let select = format!(
            "SELECT {} FROM enrollments WHERE user_id = ? AND course_id = ? FOR UPDATE",
            ENROLLMENT_COLUMNS
        );
        let existing = sqlx::query_as::<_, Enrollment>(&select)
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(enrollment) = existing {
            tx.commit().await?;
            return Ok((enrollment, false));
        }

        let draft = Enrollment::new(user_id, course_id, source, source_course_id);
        sqlx::query(
            r#"
            INSERT INTO enrollments (id, user_id, course_id, enrolled_at, enrollment_source, source_course_id, completed)
            VALUES (?, ?, ?, ?, ?, ?, FALSE)
            "#,
        )
        .bind(draft.id)
        .bind(draft.user_id)
        .bind(draft.course_id)
        .bind(draft.enrolled_at)
        .bind(draft.enrollment_source)
        .bind(draft.source_course_id)
        .execute(&mut *tx)
        .await?;

        // Re-read so timestamps carry the column's precision.
        let created = sqlx::query_as::<_, Enrollment>(&format!(
            "SELECT {} FROM enrollments WHERE id = ?",
            ENROLLMENT_COLUMNS
        ))
        .bind(draft.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((created, true))
    }

    async fn find(
        &self,
        user_id: StringUuid,
        course_id: StringUuid,
    ) -> Result<Option<Enrollment>> {
        let sql = format!(
            "SELECT {} FROM enrollments WHERE user_id = ? AND course_id = ?",
            ENROLLMENT_COLUMNS
        );
        let enrollment = sqlx::query_as::<_, Enrollment>(&sql)
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(enrollment)
    }

    async fn find_by_id(&self, id: StringUuid) -> Result<Option<Enrollment>> {
        let sql = format!("SELECT {} FROM enrollments WHERE id = ?", ENROLLMENT_COLUMNS);
        let enrollment = sqlx::query_as::<_, Enrollment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(enrollment)
    }

    async fn find_by_course(&self, course_id: StringUuid) -> Result<Vec<Enrollment>> {
        let sql = format!(
            "SELECT {} FROM enrollments WHERE course_id = ? ORDER BY enrolled_at",
            ENROLLMENT_COLUMNS
        );
        let enrollments = sqlx::query_as::<_, Enrollment>(&sql)
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(enrollments)
    }

    async fn find_by_user_in_courses(
        &self,
        user_id: StringUuid,
        course_ids: &[StringUuid],
    ) -> Result<Vec<Enrollment>> {
        if course_ids.is_empty() {
            return Ok(vec![]);
        }

        let sql = format!(
            "SELECT {} FROM enrollments WHERE user_id = ? AND course_id IN ({})",
            ENROLLMENT_COLUMNS,
            placeholders(course_ids.len())
        );
        let mut query = sqlx::query_as::<_, Enrollment>(&sql).bind(user_id);
        for id in course_ids {
            query = query.bind(*id);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn find_enrolled_user_ids(
        &self,
        course_id: StringUuid,
        user_ids: &[StringUuid],
    ) -> Result<Vec<StringUuid>> {
        if user_ids.is_empty() {
            return Ok(vec![]);
        }

        let sql = format!(
            "SELECT user_id FROM enrollments WHERE course_id = ? AND user_id IN ({})",
            placeholders(user_ids.len())
        );
        let mut query = sqlx::query_scalar::<_, StringUuid>(&sql).bind(course_id);
        for id in user_ids {
            query = query.bind(*id);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn insert_ignore_many(&self, enrollments: &[Enrollment]) -> Result<u64> {
        if enrollments.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<MySql> = QueryBuilder::new(
            "INSERT IGNORE INTO enrollments \
             (id, user_id, course_id, enrolled_at, enrollment_source, source_course_id, completed) ",
        );
        builder.push_values(enrollments, |mut row, enrollment| {
            row.push_bind(enrollment.id)
                .push_bind(enrollment.user_id)
                .push_bind(enrollment.course_id)
                .push_bind(enrollment.enrolled_at)
                .push_bind(enrollment.enrollment_source)
                .push_bind(enrollment.source_course_id)
                .push_bind(enrollment.completed);
        });

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn count_by_course(&self, course_id: StringUuid) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM enrollments WHERE course_id = ?")
            .bind(course_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }

    async fn count_completed_by_course(&self, course_id: StringUuid) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM enrollments WHERE course_id = ? AND completed = TRUE",
        )
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }

    async fn update_completion(
        &self,
        id: StringUuid,
        progress_percentage: f64,
        force_completion: bool,
    ) -> Result<Option<bool>> {
        let mut tx = self.pool.begin().await?;

        let select = format!(
            "SELECT {} FROM enrollments WHERE id = ? FOR UPDATE",
            ENROLLMENT_COLUMNS
        );
        let Some(current) = sqlx::query_as::<_, Enrollment>(&select)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };

        let change =
            CompletionChange::evaluate(&current, progress_percentage, force_completion, Utc::now());

        if let Some(change) = change {
            sqlx::query("UPDATE enrollments SET completed = ?, completion_date = ? WHERE id = ?")
                .bind(change.completed)
                .bind(change.completion_date)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(Some(change.is_some()))
    }

    async fn touch_last_accessed(&self, id: StringUuid) -> Result<()> {
        sqlx::query("UPDATE enrollments SET last_accessed = NOW() WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete(&self, user_id: StringUuid, course_id: StringUuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM enrollments WHERE user_id = ? AND course_id = ?")
            .bind(user_id)
            .bind(course_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_auto_prerequisite(
        &self,
        prerequisite_id: StringUuid,
        source_course_id: StringUuid,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM enrollments
            WHERE course_id = ? AND enrollment_source = ? AND source_course_id = ?
            "#,
        )
        .bind(prerequisite_id)
        .bind(EnrollmentSource::AutoPrerequisite)
        .bind(source_course_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
