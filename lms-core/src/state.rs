//! Application state traits for dependency injection
//!
//! Handlers are generic over these traits so the same router runs against the
//! MySQL-backed `AppState` and against in-memory test states.

use crate::cache::CacheOperations;
use crate::repository::{
    CourseRepository, EnrollmentRepository, GroupRepository, TopicProgressRepository,
    UserRepository,
};
use crate::service::{
    AccessService, CategorizationService, EnrollmentService, PrerequisiteService,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for application state that provides access to all services.
pub trait HasServices: Clone + Send + Sync + 'static {
    /// The user repository type
    type UserRepo: UserRepository;
    /// The course repository type
    type CourseRepo: CourseRepository;
    /// The enrollment repository type
    type EnrollmentRepo: EnrollmentRepository;
    /// The topic progress repository type
    type TopicProgressRepo: TopicProgressRepository;
    /// The group repository type
    type GroupRepo: GroupRepository;

    /// Role resolution and permission gate
    fn access_service(&self) -> &AccessService<Self::EnrollmentRepo, Self::GroupRepo>;

    fn enrollment_service(
        &self,
    ) -> &EnrollmentService<
        Self::UserRepo,
        Self::CourseRepo,
        Self::EnrollmentRepo,
        Self::TopicProgressRepo,
    >;

    /// Prerequisite cascade engine
    fn prerequisite_service(
        &self,
    ) -> &PrerequisiteService<
        Self::UserRepo,
        Self::CourseRepo,
        Self::EnrollmentRepo,
        Self::TopicProgressRepo,
    >;

    fn categorization_service(
        &self,
    ) -> &CategorizationService<Self::UserRepo, Self::EnrollmentRepo, Self::GroupRepo>;
}

/// Trait for states that can report dependency health
#[async_trait]
pub trait HasHealthCheck: Clone + Send + Sync + 'static {
    /// Get the cache manager (Redis or no-op)
    fn cache(&self) -> &Arc<dyn CacheOperations>;

    /// True when the primary store answers a trivial query
    async fn database_ready(&self) -> bool;
}
