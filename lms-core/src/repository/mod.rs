//! Data access layer (Repository pattern)

pub mod course;
pub mod enrollment;
pub mod group;
pub mod topic_progress;
pub mod user;

pub use course::CourseRepository;
pub use enrollment::EnrollmentRepository;
pub use group::GroupRepository;
pub use topic_progress::TopicProgressRepository;
pub use user::UserRepository;

/// `?, ?, ?` for an `IN (...)` list of `count` bound values.
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
