//! Business logic layer

pub mod access;
pub mod categorization;
pub mod enrollment;
pub mod prerequisite;

pub use access::AccessService;
pub use categorization::CategorizationService;
pub use enrollment::EnrollmentService;
pub use prerequisite::PrerequisiteService;
