//! Course-scoped role resolution and the capabilities derived from it.
//!
//! A user's global role tag never grants access to a course by itself. The
//! effective role is recomputed from live relationships (branch, primary
//! instructor link, enrollment row, group grants) every time it is asked for,
//! so it follows the data the moment a row changes.

use super::course::Course;
use super::enrollment::Enrollment;
use super::group::GroupAccessGrant;
use super::user::{User, UserRole};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Effective role of a user inside one course
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CourseRole {
    Superuser,
    Admin,
    PrimaryInstructor,
    InvitedInstructor,
    Learner,
    Viewer,
    None,
}

impl CourseRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseRole::Superuser => "superuser",
            CourseRole::Admin => "admin",
            CourseRole::PrimaryInstructor => "primary_instructor",
            CourseRole::InvitedInstructor => "invited_instructor",
            CourseRole::Learner => "learner",
            CourseRole::Viewer => "viewer",
            CourseRole::None => "none",
        }
    }

    /// Human readable label for reports
    pub fn display_name(&self) -> &'static str {
        match self {
            CourseRole::Superuser => "Superuser",
            CourseRole::Admin => "Administrator",
            CourseRole::PrimaryInstructor => "Primary Instructor",
            CourseRole::InvitedInstructor => "Invited Instructor",
            CourseRole::Learner => "Learner",
            CourseRole::Viewer => "Viewer",
            CourseRole::None => "No Access",
        }
    }

    pub fn can_view(&self) -> bool {
        *self != CourseRole::None
    }

    pub fn can_modify(&self) -> bool {
        matches!(
            self,
            CourseRole::Superuser
                | CourseRole::Admin
                | CourseRole::PrimaryInstructor
                | CourseRole::InvitedInstructor
        )
    }

    pub fn can_enroll_users(&self) -> bool {
        self.can_modify()
    }

    /// Invited instructors may edit but not delete.
    pub fn can_delete(&self) -> bool {
        matches!(
            self,
            CourseRole::Superuser | CourseRole::Admin | CourseRole::PrimaryInstructor
        )
    }
}

impl std::fmt::Display for CourseRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every capability gate for one (user, course) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct CoursePermissions {
    pub role: CourseRole,
    pub can_view: bool,
    pub can_modify: bool,
    pub can_enroll_users: bool,
    pub can_delete: bool,
}

impl From<CourseRole> for CoursePermissions {
    fn from(role: CourseRole) -> Self {
        Self {
            role,
            can_view: role.can_view(),
            can_modify: role.can_modify(),
            can_enroll_users: role.can_enroll_users(),
            can_delete: role.can_delete(),
        }
    }
}

/// Relationship rows between a user and a course, loaded fresh per decision.
#[derive(Debug, Clone, Default)]
pub struct AccessFacts {
    pub is_enrolled: bool,
    /// Active group memberships that reach the course
    pub group_grants: Vec<GroupAccessGrant>,
}

impl AccessFacts {
    fn has_group_access(&self) -> bool {
        !self.group_grants.is_empty()
    }

    fn has_group_view(&self) -> bool {
        self.group_grants.iter().any(GroupAccessGrant::grants_view)
    }
}

/// One enrolled user as seen by course management reports
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CategorizedUser {
    pub user: User,
    pub enrollment: Enrollment,
    pub course_role: CourseRole,
    pub display_role: String,
    pub can_modify: bool,
}

/// Enrolled population of a course partitioned by effective role
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct CourseUserCategories {
    pub learners: Vec<CategorizedUser>,
    pub instructors: Vec<CategorizedUser>,
    pub admins: Vec<CategorizedUser>,
    pub others: Vec<CategorizedUser>,
}

impl CourseUserCategories {
    pub fn push(&mut self, entry: CategorizedUser) {
        match entry.course_role {
            CourseRole::Superuser | CourseRole::Admin => self.admins.push(entry),
            CourseRole::PrimaryInstructor | CourseRole::InvitedInstructor => {
                self.instructors.push(entry)
            }
            CourseRole::Learner => self.learners.push(entry),
            CourseRole::Viewer | CourseRole::None => self.others.push(entry),
        }
    }

    pub fn total(&self) -> usize {
        self.learners.len() + self.instructors.len() + self.admins.len() + self.others.len()
    }
}

/// Resolve `user`'s role in `course`. First matching rule wins.
pub fn resolve_role(user: &User, course: &Course, facts: &AccessFacts) -> CourseRole {
    if user.is_superuser || user.role == UserRole::Globaladmin {
        return CourseRole::Superuser;
    }

    match user.role {
        UserRole::Admin if user.branch_id.is_some() && user.branch_id == course.branch_id => {
            return CourseRole::Admin;
        }
        UserRole::Superadmin
            if course
                .business_id
                .is_some_and(|business| user.is_assigned_to_business(business)) =>
        {
            return CourseRole::Admin;
        }
        _ => {}
    }

    match user.role {
        UserRole::Instructor => {
            if course.instructor_id == Some(user.id) {
                CourseRole::PrimaryInstructor
            } else if facts.is_enrolled || facts.has_group_access() {
                CourseRole::InvitedInstructor
            } else {
                // An instructor tag without a qualifying link grants nothing.
                CourseRole::None
            }
        }
        UserRole::Learner => {
            if course.is_active && (facts.is_enrolled || facts.has_group_view()) {
                CourseRole::Learner
            } else {
                CourseRole::None
            }
        }
        _ if facts.has_group_view() => CourseRole::Viewer,
        _ => CourseRole::None,
    }
}
