//! Group access repository

use crate::domain::{GroupAccessGrant, StringUuid};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Active memberships of `user_id` in groups that can reach `course_id`
    async fn find_user_course_grants(
        &self,
        user_id: StringUuid,
        course_id: StringUuid,
    ) -> Result<Vec<GroupAccessGrant>>;
    /// Every active membership reaching `course_id`, across all users
    async fn find_course_grants(&self, course_id: StringUuid) -> Result<Vec<GroupAccessGrant>>;
}

pub struct GroupRepositoryImpl {
    pool: MySqlPool,
}

impl GroupRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const GRANT_SELECT: &str = r#"
    SELECT g.id AS group_id, g.name AS group_name, gm.user_id, cga.course_id,
           gm.custom_role_id, cr.can_view, cr.can_edit, cr.can_manage_members,
           cr.can_manage_content
    FROM group_memberships gm
    JOIN `groups` g ON g.id = gm.group_id
    JOIN course_group_access cga ON cga.group_id = g.id
    LEFT JOIN group_custom_roles cr ON cr.id = gm.custom_role_id
    WHERE gm.is_active = TRUE
"#;

#[async_trait]
impl GroupRepository for GroupRepositoryImpl {
    async fn find_user_course_grants(
        &self,
        user_id: StringUuid,
        course_id: StringUuid,
    ) -> Result<Vec<GroupAccessGrant>> {
        let sql = format!("{} AND gm.user_id = ? AND cga.course_id = ?", GRANT_SELECT);
        let grants = sqlx::query_as::<_, GroupAccessGrant>(&sql)
            .bind(user_id)
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(grants)
    }

    async fn find_course_grants(&self, course_id: StringUuid) -> Result<Vec<GroupAccessGrant>> {
        let sql = format!("{} AND cga.course_id = ?", GRANT_SELECT);
        let grants = sqlx::query_as::<_, GroupAccessGrant>(&sql)
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(grants)
    }
}
