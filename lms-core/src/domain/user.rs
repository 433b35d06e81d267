//! User domain model

use super::common::{string_enum_sqlx, StringUuid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Global role tag carried by every account.
///
/// The tag alone never grants access to a course; authority inside a course is
/// resolved from live relationships by `domain::access::resolve_role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Learner,
    Instructor,
    Admin,
    Superadmin,
    Globaladmin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Learner => "learner",
            UserRole::Instructor => "instructor",
            UserRole::Admin => "admin",
            UserRole::Superadmin => "superadmin",
            UserRole::Globaladmin => "globaladmin",
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "learner" => Ok(UserRole::Learner),
            "instructor" => Ok(UserRole::Instructor),
            "admin" => Ok(UserRole::Admin),
            "superadmin" => Ok(UserRole::Superadmin),
            "globaladmin" => Ok(UserRole::Globaladmin),
            _ => Err(format!("Unknown user role: {}", s)),
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

string_enum_sqlx!(UserRole);

/// User entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: StringUuid,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    /// Platform override bit; outranks every role tag
    pub is_superuser: bool,
    pub is_active: bool,
    pub branch_id: Option<StringUuid>,
    /// Businesses a superadmin is scoped to (loaded separately)
    #[sqlx(skip)]
    #[serde(default)]
    pub business_assignments: Vec<StringUuid>,
    pub created_at: DateTime<Utc>,
}

impl Default for User {
    fn default() -> Self {
        Self {
            id: StringUuid::new_v4(),
            username: String::new(),
            email: String::new(),
            role: UserRole::Learner,
            is_superuser: false,
            is_active: true,
            branch_id: None,
            business_assignments: vec![],
            created_at: Utc::now(),
        }
    }
}

impl User {
    /// Superusers, global admins and superadmins operate above branch boundaries.
    pub fn is_branch_exempt(&self) -> bool {
        self.is_superuser || matches!(self.role, UserRole::Superadmin | UserRole::Globaladmin)
    }

    pub fn is_assigned_to_business(&self, business_id: StringUuid) -> bool {
        self.business_assignments.contains(&business_id)
    }
}
