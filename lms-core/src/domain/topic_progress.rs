//! Per-topic progress tracking

use super::common::StringUuid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Progress of one user through one topic, unique per (user, topic)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct TopicProgress {
    pub id: StringUuid,
    pub user_id: StringUuid,
    pub topic_id: StringUuid,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    /// Free-form content state (bookmark, interactions)
    #[schema(value_type = Object)]
    pub progress_data: Value,
    pub total_time_spent_secs: i64,
    pub attempts: i32,
    pub last_score: Option<f64>,
    pub first_accessed: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

/// Content state a freshly created progress row starts with.
pub fn initial_progress_data() -> Value {
    json!({
        "bookmark": null,
        "interactions": [],
    })
}

impl TopicProgress {
    pub fn new(user_id: StringUuid, topic_id: StringUuid, now: DateTime<Utc>) -> Self {
        Self {
            id: StringUuid::new_v4(),
            user_id,
            topic_id,
            completed: false,
            completed_at: None,
            progress_data: initial_progress_data(),
            total_time_spent_secs: 0,
            attempts: 0,
            last_score: None,
            first_accessed: now,
            last_accessed: now,
        }
    }

    /// Fold an update into this row. Always refreshes `last_accessed`.
    pub fn apply(&mut self, update: &TopicProgressUpdate, now: DateTime<Utc>) {
        self.last_accessed = now;

        match update.completed {
            Some(true) if !self.completed => {
                self.completed = true;
                self.completed_at = Some(now);
            }
            Some(false) => {
                self.completed = false;
                self.completed_at = None;
            }
            _ => {}
        }

        if let Some(secs) = update.time_spent_secs {
            self.total_time_spent_secs += i64::from(secs);
        }

        if let Some(score) = update.score {
            self.last_score = Some(score);
            self.attempts += 1;
        }

        if let Some(data) = &update.progress_data {
            merge_progress_data(&mut self.progress_data, data);
        }
    }
}

/// Shallow-merge object keys; anything else replaces the stored value.
fn merge_progress_data(stored: &mut Value, incoming: &Value) {
    match (stored.as_object_mut(), incoming.as_object()) {
        (Some(target), Some(source)) => {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        }
        _ => *stored = incoming.clone(),
    }
}

/// Fields a caller may report for a topic
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct TopicProgressUpdate {
    pub completed: Option<bool>,
    #[validate(range(max = 86400))]
    pub time_spent_secs: Option<u32>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub score: Option<f64>,
    #[schema(value_type = Option<Object>)]
    pub progress_data: Option<Value>,
}

/// Result of create-or-update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicProgressOutcome {
    pub progress: TopicProgress,
    pub created: bool,
}
