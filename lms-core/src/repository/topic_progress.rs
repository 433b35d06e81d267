//! Topic progress repository

use crate::domain::{StringUuid, TopicProgress, TopicProgressUpdate};
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TopicProgressRepository: Send + Sync {
    async fn find(
        &self,
        user_id: StringUuid,
        topic_id: StringUuid,
    ) -> Result<Option<TopicProgress>>;

    /// Lock the (user, topic) row, create it when absent, then apply `update`.
    ///
    /// Returns the stored row and whether it was created. Losing an insert race
    /// surfaces as a unique violation.
    async fn upsert_locked(
        &self,
        user_id: StringUuid,
        topic_id: StringUuid,
        update: &TopicProgressUpdate,
    ) -> Result<(TopicProgress, bool)>;
}

pub struct TopicProgressRepositoryImpl {
    pool: MySqlPool,
}

impl TopicProgressRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const PROGRESS_COLUMNS: &str = "id, user_id, topic_id, completed, completed_at, progress_data, \
     total_time_spent_secs, attempts, last_score, first_accessed, last_accessed";

#[async_trait]
impl TopicProgressRepository for TopicProgressRepositoryImpl {
    async fn find(
        &self,
        user_id: StringUuid,
        topic_id: StringUuid,
    ) -> Result<Option<TopicProgress>> {
        let sql = format!(
            "SELECT {} FROM topic_progress WHERE user_id = ? AND topic_id = ?",
            PROGRESS_COLUMNS
        );
        let progress = sqlx::query_as::<_, TopicProgress>(&sql)
            .bind(user_id)
            .bind(topic_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(progress)
    }

    async fn upsert_locked(
        &self,
        user_id: StringUuid,
        topic_id: StringUuid,
        update: &TopicProgressUpdate,
    ) -> Result<(TopicProgress, bool)> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let select = format!(
            "SELECT {} FROM topic_progress WHERE user_id = ? AND topic_id = ? FOR UPDATE",
            PROGRESS_COLUMNS
        );
        let existing = sqlx::query_as::<_, TopicProgress>(&select)
            .bind(user_id)
            .bind(topic_id)
            .fetch_optional(&mut *tx)
            .await?;

        let (mut progress, created) = match existing {
            Some(progress) => (progress, false),
            None => (TopicProgress::new(user_id, topic_id, now), true),
        };
        progress.apply(update, now);

        if created {
            sqlx::query(
                r#"
                INSERT INTO topic_progress (id, user_id, topic_id, completed, completed_at, progress_data,
                    total_time_spent_secs, attempts, last_score, first_accessed, last_accessed)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(progress.id)
            .bind(progress.user_id)
            .bind(progress.topic_id)
            .bind(progress.completed)
            .bind(progress.completed_at)
            .bind(&progress.progress_data)
            .bind(progress.total_time_spent_secs)
            .bind(progress.attempts)
            .bind(progress.last_score)
            .bind(progress.first_accessed)
            .bind(progress.last_accessed)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE topic_progress
                SET completed = ?, completed_at = ?, progress_data = ?, total_time_spent_secs = ?,
                    attempts = ?, last_score = ?, last_accessed = ?
                WHERE id = ?
                "#,
            )
            .bind(progress.completed)
            .bind(progress.completed_at)
            .bind(&progress.progress_data)
            .bind(progress.total_time_spent_secs)
            .bind(progress.attempts)
            .bind(progress.last_score)
            .bind(progress.last_accessed)
            .bind(progress.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok((progress, created))
    }
}
