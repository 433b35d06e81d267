//! Domain models and pure rule engines for LMS Core

pub mod access;
pub mod common;
pub mod course;
pub mod eligibility;
pub mod enrollment;
pub mod group;
pub mod topic_progress;
pub mod user;

pub use access::*;
pub use common::StringUuid;
pub use course::*;
pub use eligibility::*;
pub use enrollment::*;
pub use group::*;
pub use topic_progress::*;
pub use user::*;
