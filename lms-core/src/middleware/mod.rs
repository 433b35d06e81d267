//! HTTP middleware for LMS Core
//!
//! - `ActingUser` extractor for the upstream-authenticated user
//! - request id propagation and HTTP metrics

pub mod acting_user;
pub mod observability;

pub use acting_user::ActingUser;
pub use observability::ObservabilityLayer;
