//! Redis cache layer
//!
//! Only aggregate reporting data is cached. Role and permission decisions are
//! always computed from the database.

use crate::config::RedisConfig;
use crate::domain::{ProgressSummary, StringUuid};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

/// Cache key prefixes
mod keys {
    pub const PROGRESS_SUMMARY: &str = "lms:progress_summary";
}

fn progress_summary_key(course_id: StringUuid) -> String {
    format!("{}:{}", keys::PROGRESS_SUMMARY, course_id)
}

/// Cache operations the services depend on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheOperations: Send + Sync {
    async fn ping(&self) -> Result<()>;
    async fn get_progress_summary(&self, course_id: StringUuid)
        -> Result<Option<ProgressSummary>>;
    async fn set_progress_summary(&self, summary: &ProgressSummary, ttl: Duration) -> Result<()>;
    async fn invalidate_progress_summary(&self, course_id: StringUuid) -> Result<()>;
}

/// Cache manager for Redis operations
#[derive(Clone)]
pub struct CacheManager {
    conn: ConnectionManager,
}

impl CacheManager {
    /// Create a new cache manager
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to create Redis client: {}", e))
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to connect to Redis: {}", e))
        })?;

        Ok(Self { conn })
    }

    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;

        match value {
            Some(v) => {
                let parsed = serde_json::from_str(&v)
                    .map_err(|e| AppError::Cache(format!("deserialize {}: {}", key, e)))?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let serialized = serde_json::to_string(value)
            .map_err(|e| AppError::Cache(format!("serialize {}: {}", key, e)))?;

        let _: () = conn.set_ex(key, serialized, ttl.as_secs()).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

#[async_trait]
impl CacheOperations for CacheManager {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn get_progress_summary(
        &self,
        course_id: StringUuid,
    ) -> Result<Option<ProgressSummary>> {
        self.get(&progress_summary_key(course_id)).await
    }

    async fn set_progress_summary(&self, summary: &ProgressSummary, ttl: Duration) -> Result<()> {
        self.set(&progress_summary_key(summary.course_id), summary, ttl)
            .await
    }

    async fn invalidate_progress_summary(&self, course_id: StringUuid) -> Result<()> {
        self.delete(&progress_summary_key(course_id)).await
    }
}

/// Cache that stores nothing, used when Redis is disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCacheManager;

impl NoOpCacheManager {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheOperations for NoOpCacheManager {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get_progress_summary(
        &self,
        _course_id: StringUuid,
    ) -> Result<Option<ProgressSummary>> {
        Ok(None)
    }

    async fn set_progress_summary(
        &self,
        _summary: &ProgressSummary,
        _ttl: Duration,
    ) -> Result<()> {
        Ok(())
    }

    async fn invalidate_progress_summary(&self, _course_id: StringUuid) -> Result<()> {
        Ok(())
    }
}
