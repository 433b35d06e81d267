//! User repository

use super::placeholders;
use crate::domain::{StringUuid, User};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::MySqlPool;
use std::collections::HashMap;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Load a user together with their business assignments
    async fn find_by_id(&self, id: StringUuid) -> Result<Option<User>>;
    async fn find_by_ids(&self, ids: &[StringUuid]) -> Result<Vec<User>>;
}

pub struct UserRepositoryImpl {
    pool: MySqlPool,
}

impl UserRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn load_business_assignments(
        &self,
        user_ids: &[StringUuid],
    ) -> Result<HashMap<StringUuid, Vec<StringUuid>>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            "SELECT user_id, business_id FROM user_business_assignments WHERE user_id IN ({})",
            placeholders(user_ids.len())
        );
        let mut query = sqlx::query_as::<_, (StringUuid, StringUuid)>(&sql);
        for id in user_ids {
            query = query.bind(*id);
        }

        let mut assignments: HashMap<StringUuid, Vec<StringUuid>> = HashMap::new();
        for (user_id, business_id) in query.fetch_all(&self.pool).await? {
            assignments.entry(user_id).or_default().push(business_id);
        }
        Ok(assignments)
    }
}

const USER_COLUMNS: &str =
    "id, username, email, role, is_superuser, is_active, branch_id, created_at";

#[async_trait]
impl UserRepository for UserRepositoryImpl {
    async fn find_by_id(&self, id: StringUuid) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match user {
            Some(mut user) => {
                let mut assignments = self.load_business_assignments(&[user.id]).await?;
                user.business_assignments = assignments.remove(&user.id).unwrap_or_default();
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    async fn find_by_ids(&self, ids: &[StringUuid]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let sql = format!(
            "SELECT {} FROM users WHERE id IN ({})",
            USER_COLUMNS,
            placeholders(ids.len())
        );
        let mut query = sqlx::query_as::<_, User>(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let mut users = query.fetch_all(&self.pool).await?;

        let user_ids: Vec<StringUuid> = users.iter().map(|u| u.id).collect();
        let mut assignments = self.load_business_assignments(&user_ids).await?;
        for user in &mut users {
            user.business_assignments = assignments.remove(&user.id).unwrap_or_default();
        }
        Ok(users)
    }
}
