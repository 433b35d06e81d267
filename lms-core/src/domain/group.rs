//! Group-based course access

use super::common::StringUuid;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Capability flags a group's custom role carries inside courses it can reach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CustomRoleCapabilities {
    pub can_view: bool,
    pub can_edit: bool,
    pub can_manage_members: bool,
    pub can_manage_content: bool,
}

/// One active membership of `user_id` in a group that has access to `course_id`.
///
/// Loaded from `group_memberships` joined with `course_group_access` and, when
/// present, `group_custom_roles`. The capability columns are NULL when the
/// group has no custom role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct GroupAccessGrant {
    pub group_id: StringUuid,
    pub group_name: String,
    pub user_id: StringUuid,
    pub course_id: StringUuid,
    pub custom_role_id: Option<StringUuid>,
    pub can_view: Option<bool>,
    pub can_edit: Option<bool>,
    pub can_manage_members: Option<bool>,
    pub can_manage_content: Option<bool>,
}

impl GroupAccessGrant {
    /// Capabilities of the custom role, or `None` for a plain access grant.
    pub fn custom_role(&self) -> Option<CustomRoleCapabilities> {
        self.custom_role_id?;
        Some(CustomRoleCapabilities {
            can_view: self.can_view.unwrap_or(false),
            can_edit: self.can_edit.unwrap_or(false),
            can_manage_members: self.can_manage_members.unwrap_or(false),
            can_manage_content: self.can_manage_content.unwrap_or(false),
        })
    }

    /// True when a custom role explicitly allows viewing.
    pub fn grants_view(&self) -> bool {
        self.custom_role().map(|r| r.can_view).unwrap_or(false)
    }
}

#[cfg(test)]
pub(crate) fn grant_for(
    user_id: StringUuid,
    course_id: StringUuid,
    can_view: Option<bool>,
) -> GroupAccessGrant {
    GroupAccessGrant {
        group_id: StringUuid::new_v4(),
        group_name: "Cohort".to_string(),
        user_id,
        course_id,
        custom_role_id: can_view.map(|_| StringUuid::new_v4()),
        can_view,
        can_edit: can_view.map(|_| false),
        can_manage_members: can_view.map(|_| false),
        can_manage_content: can_view.map(|_| false),
    }
}
