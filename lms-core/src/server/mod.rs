//! Server initialization and routing

use crate::api;
use crate::cache::{CacheManager, CacheOperations, NoOpCacheManager};
use crate::config::Config;
use crate::middleware::ObservabilityLayer;
use crate::openapi;
use crate::repository::{
    course::CourseRepositoryImpl, enrollment::EnrollmentRepositoryImpl,
    group::GroupRepositoryImpl, topic_progress::TopicProgressRepositoryImpl,
    user::UserRepositoryImpl,
};
use crate::service::{
    AccessService, CategorizationService, EnrollmentService, PrerequisiteService,
};
use crate::state::{HasHealthCheck, HasServices};
use anyhow::Result;
use async_trait::async_trait;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::{mysql::MySqlPoolOptions, MySqlPool};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

type ProdEnrollmentService = EnrollmentService<
    UserRepositoryImpl,
    CourseRepositoryImpl,
    EnrollmentRepositoryImpl,
    TopicProgressRepositoryImpl,
>;

type ProdPrerequisiteService = PrerequisiteService<
    UserRepositoryImpl,
    CourseRepositoryImpl,
    EnrollmentRepositoryImpl,
    TopicProgressRepositoryImpl,
>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_pool: MySqlPool,
    pub cache: Arc<dyn CacheOperations>,
    pub access_service: Arc<AccessService<EnrollmentRepositoryImpl, GroupRepositoryImpl>>,
    pub enrollment_service: Arc<ProdEnrollmentService>,
    pub prerequisite_service: Arc<ProdPrerequisiteService>,
    pub categorization_service: Arc<
        CategorizationService<UserRepositoryImpl, EnrollmentRepositoryImpl, GroupRepositoryImpl>,
    >,
}

impl HasServices for AppState {
    type UserRepo = UserRepositoryImpl;
    type CourseRepo = CourseRepositoryImpl;
    type EnrollmentRepo = EnrollmentRepositoryImpl;
    type TopicProgressRepo = TopicProgressRepositoryImpl;
    type GroupRepo = GroupRepositoryImpl;

    fn access_service(&self) -> &AccessService<Self::EnrollmentRepo, Self::GroupRepo> {
        &self.access_service
    }

    fn enrollment_service(&self) -> &ProdEnrollmentService {
        &self.enrollment_service
    }

    fn prerequisite_service(&self) -> &ProdPrerequisiteService {
        &self.prerequisite_service
    }

    fn categorization_service(
        &self,
    ) -> &CategorizationService<Self::UserRepo, Self::EnrollmentRepo, Self::GroupRepo> {
        &self.categorization_service
    }
}

#[async_trait]
impl HasHealthCheck for AppState {
    fn cache(&self) -> &Arc<dyn CacheOperations> {
        &self.cache
    }

    async fn database_ready(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.db_pool).await.is_ok()
    }
}

impl AppState {
    /// Wire repositories and services over an open pool.
    pub fn new(config: Config, db_pool: MySqlPool, cache: Arc<dyn CacheOperations>) -> Self {
        let user_repo = Arc::new(UserRepositoryImpl::new(db_pool.clone()));
        let course_repo = Arc::new(CourseRepositoryImpl::new(db_pool.clone()));
        let enrollment_repo = Arc::new(EnrollmentRepositoryImpl::new(db_pool.clone()));
        let topic_progress_repo = Arc::new(TopicProgressRepositoryImpl::new(db_pool.clone()));
        let group_repo = Arc::new(GroupRepositoryImpl::new(db_pool.clone()));

        let access_service = Arc::new(AccessService::new(
            enrollment_repo.clone(),
            group_repo.clone(),
        ));
        let enrollment_service = Arc::new(EnrollmentService::new(
            user_repo.clone(),
            course_repo.clone(),
            enrollment_repo.clone(),
            topic_progress_repo,
            Some(cache.clone()),
        ));
        let prerequisite_service = Arc::new(PrerequisiteService::new(
            course_repo,
            enrollment_repo.clone(),
            enrollment_service.clone(),
            config.enrollment.clone(),
        ));
        let categorization_service = Arc::new(CategorizationService::new(
            user_repo,
            enrollment_repo,
            group_repo,
            Some(cache.clone()),
            config.enrollment.progress_summary_ttl(),
        ));

        Self {
            config: Arc::new(config),
            db_pool,
            cache,
            access_service,
            enrollment_service,
            prerequisite_service,
            categorization_service,
        }
    }
}

/// Run the server
pub async fn run(config: Config, metrics_handle: Option<PrometheusHandle>) -> Result<()> {
    let db_pool = MySqlPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;
    info!("Connected to database");

    let cache: Arc<dyn CacheOperations> = if config.redis.enabled {
        let manager = CacheManager::new(&config.redis).await?;
        info!("Connected to Redis");
        Arc::new(manager)
    } else {
        info!("Cache disabled, progress summaries are computed on every request");
        Arc::new(NoOpCacheManager::new())
    };

    let http_addr = config.http_addr();
    let state = AppState::new(config, db_pool, cache);

    let metrics_router = Router::new()
        .route("/metrics", get(api::metrics::metrics_handler))
        .with_state(Arc::new(metrics_handle));
    let app = build_router(state).merge(metrics_router);

    let listener = TcpListener::bind(&http_addr).await?;
    info!("HTTP server started on {}", http_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the HTTP router with generic state type
///
/// Works with the production `AppState` and with test states backed by
/// in-memory repositories.
pub fn build_router<S>(state: S) -> Router
where
    S: HasServices + HasHealthCheck,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(api::health::health))
        .route("/ready", get(api::health::ready::<S>))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        // Access
        .route(
            "/api/v1/courses/{id}/access",
            get(api::access::course_access::<S>),
        )
        .route(
            "/api/v1/courses/{id}/users/{user_id}/role",
            get(api::access::user_role::<S>),
        )
        // Enrollment
        .route(
            "/api/v1/courses/{id}/enrollments",
            post(api::enrollment::enroll::<S>),
        )
        .route(
            "/api/v1/courses/{id}/enrollments/bulk",
            post(api::enrollment::bulk_enroll::<S>),
        )
        .route(
            "/api/v1/courses/{id}/enrollments/{user_id}",
            delete(api::enrollment::unenroll::<S>),
        )
        .route(
            "/api/v1/courses/{id}/self-enroll",
            post(api::enrollment::self_enroll::<S>),
        )
        .route(
            "/api/v1/courses/{id}/eligibility",
            get(api::enrollment::eligibility::<S>),
        )
        .route(
            "/api/v1/enrollments/{id}/progress",
            put(api::enrollment::update_progress::<S>),
        )
        .route(
            "/api/v1/topics/{id}/progress",
            put(api::enrollment::update_topic_progress::<S>),
        )
        // Prerequisites
        .route(
            "/api/v1/courses/{id}/prerequisites",
            put(api::prerequisite::update::<S>),
        )
        // Reporting
        .route(
            "/api/v1/courses/{id}/users",
            get(api::categorization::course_users::<S>),
        )
        .route(
            "/api/v1/courses/{id}/progress-summary",
            get(api::categorization::progress_summary::<S>),
        )
        .layer(ObservabilityLayer)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
