//! API integration tests infrastructure
//!
//! In-memory repositories and a `TestAppState` that drive the production
//! `build_router()` without MySQL or Redis.

pub mod categorization_http_test;
pub mod enrollment_http_test;
pub mod health_http_test;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use lms_core::cache::{CacheOperations, NoOpCacheManager};
use lms_core::config::EnrollmentConfig;
use lms_core::domain::{
    CompletionChange, Course, Enrollment, EnrollmentSource, GroupAccessGrant, PrerequisiteEdge,
    PrerequisiteReplacement, StringUuid, Topic, TopicProgress, TopicProgressUpdate, User,
    UserRole,
};
use lms_core::error::{AppError, Result};
use lms_core::repository::{
    CourseRepository, EnrollmentRepository, GroupRepository, TopicProgressRepository,
    UserRepository,
};
use lms_core::server::build_router;
use lms_core::service::{
    AccessService, CategorizationService, EnrollmentService, PrerequisiteService,
};
use lms_core::state::{HasHealthCheck, HasServices};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower::ServiceExt;

// ============================================================================
// Storage errors
// ============================================================================

/// Stand-in for the MySQL duplicate-key error raised by the unique index.
#[derive(Debug)]
pub struct DuplicateEntry(pub String);

impl std::fmt::Display for DuplicateEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Duplicate entry '{}' for key 'PRIMARY'", self.0)
    }
}

impl std::error::Error for DuplicateEntry {}

impl sqlx::error::DatabaseError for DuplicateEntry {
    fn message(&self) -> &str {
        "Duplicate entry for unique key"
    }
    fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self
    }
    fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
        self
    }
    fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
        self
    }
    fn kind(&self) -> sqlx::error::ErrorKind {
        sqlx::error::ErrorKind::UniqueViolation
    }
}

fn duplicate(key: String) -> AppError {
    AppError::Database(sqlx::Error::Database(Box::new(DuplicateEntry(key))))
}

// ============================================================================
// Test Repositories
// ============================================================================

pub struct TestUserRepository {
    users: RwLock<Vec<User>>,
}

impl TestUserRepository {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(vec![]),
        }
    }

    pub async fn add_user(&self, user: User) {
        self.users.write().await.push(user);
    }
}

#[async_trait]
impl UserRepository for TestUserRepository {
    async fn find_by_id(&self, id: StringUuid) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_ids(&self, ids: &[StringUuid]) -> Result<Vec<User>> {
        let users = self.users.read().await;
        Ok(users.iter().filter(|u| ids.contains(&u.id)).cloned().collect())
    }
}

pub struct TestCourseRepository {
    courses: RwLock<Vec<Course>>,
    topics: RwLock<Vec<Topic>>,
    edges: RwLock<Vec<PrerequisiteEdge>>,
}

impl TestCourseRepository {
    pub fn new() -> Self {
        Self {
            courses: RwLock::new(vec![]),
            topics: RwLock::new(vec![]),
            edges: RwLock::new(vec![]),
        }
    }

    pub async fn add_course(&self, course: Course) {
        self.courses.write().await.push(course);
    }

    pub async fn add_topic(&self, topic: Topic) {
        self.topics.write().await.push(topic);
    }

    /// Insert an edge without any cycle check, as raw data may contain them.
    pub async fn add_prerequisite(&self, course_id: StringUuid, prerequisite_id: StringUuid) {
        self.edges.write().await.push(PrerequisiteEdge {
            course_id,
            prerequisite_id,
        });
    }
}

#[async_trait]
impl CourseRepository for TestCourseRepository {
    async fn find_by_id(&self, id: StringUuid) -> Result<Option<Course>> {
        let courses = self.courses.read().await;
        Ok(courses.iter().find(|c| c.id == id).cloned())
    }

    async fn find_by_ids(&self, ids: &[StringUuid]) -> Result<Vec<Course>> {
        let courses = self.courses.read().await;
        Ok(courses.iter().filter(|c| ids.contains(&c.id)).cloned().collect())
    }

    async fn find_topic(&self, topic_id: StringUuid) -> Result<Option<Topic>> {
        let topics = self.topics.read().await;
        Ok(topics.iter().find(|t| t.id == topic_id).cloned())
    }

    async fn find_prerequisite_edges(
        &self,
        course_ids: &[StringUuid],
    ) -> Result<Vec<PrerequisiteEdge>> {
        let edges = self.edges.read().await;
        Ok(edges
            .iter()
            .filter(|e| course_ids.contains(&e.course_id))
            .copied()
            .collect())
    }

    async fn find_prerequisite_ids(&self, course_id: StringUuid) -> Result<Vec<StringUuid>> {
        let edges = self.edges.read().await;
        Ok(edges
            .iter()
            .filter(|e| e.course_id == course_id)
            .map(|e| e.prerequisite_id)
            .collect())
    }

    async fn find_dependent_ids(&self, course_id: StringUuid) -> Result<Vec<StringUuid>> {
        let edges = self.edges.read().await;
        Ok(edges
            .iter()
            .filter(|e| e.prerequisite_id == course_id)
            .map(|e| e.course_id)
            .collect())
    }

    async fn replace_prerequisites(
        &self,
        course_id: StringUuid,
        prerequisite_ids: &[StringUuid],
        max_depth: usize,
    ) -> Result<PrerequisiteReplacement> {
        let mut edges = self.edges.write().await;
        let outcome =
            PrerequisiteReplacement::check(edges.clone(), course_id, prerequisite_ids, max_depth);
        if let PrerequisiteReplacement::Replaced { .. } = outcome {
            edges.retain(|e| e.course_id != course_id);
            edges.extend(prerequisite_ids.iter().map(|p| PrerequisiteEdge {
                course_id,
                prerequisite_id: *p,
            }));
        }
        Ok(outcome)
    }
}

/// Enrollment store enforcing UNIQUE(user_id, course_id).
///
/// With `racy` set, `lock_or_create` checks and inserts under separate locks
/// with a yield in between, so concurrent callers really do collide on the
/// unique key the way unserialized database writers would.
pub struct TestEnrollmentRepository {
    enrollments: RwLock<Vec<Enrollment>>,
    racy: AtomicBool,
}

impl TestEnrollmentRepository {
    pub fn new() -> Self {
        Self {
            enrollments: RwLock::new(vec![]),
            racy: AtomicBool::new(false),
        }
    }

    pub fn set_racy(&self, racy: bool) {
        self.racy.store(racy, Ordering::SeqCst);
    }

    pub async fn add_enrollment(&self, enrollment: Enrollment) {
        self.enrollments.write().await.push(enrollment);
    }

    pub async fn all(&self) -> Vec<Enrollment> {
        self.enrollments.read().await.clone()
    }

    pub async fn get(&self, user_id: StringUuid, course_id: StringUuid) -> Option<Enrollment> {
        self.enrollments
            .read()
            .await
            .iter()
            .find(|e| e.user_id == user_id && e.course_id == course_id)
            .cloned()
    }
}

#[async_trait]
impl EnrollmentRepository for TestEnrollmentRepository {
    async fn lock_or_create(
        &self,
        user_id: StringUuid,
        course_id: StringUuid,
        source: EnrollmentSource,
        source_course_id: Option<StringUuid>,
    ) -> Result<(Enrollment, bool)> {
        if self.racy.load(Ordering::SeqCst) {
            if let Some(existing) = self.get(user_id, course_id).await {
                return Ok((existing, false));
            }
            tokio::task::yield_now().await;
        }

        let mut enrollments = self.enrollments.write().await;
        if let Some(existing) = enrollments
            .iter()
            .find(|e| e.user_id == user_id && e.course_id == course_id)
        {
            if self.racy.load(Ordering::SeqCst) {
                return Err(duplicate(format!("{}-{}", user_id, course_id)));
            }
            return Ok((existing.clone(), false));
        }

        let enrollment = Enrollment::new(user_id, course_id, source, source_course_id);
        enrollments.push(enrollment.clone());
        Ok((enrollment, true))
    }

    async fn find(
        &self,
        user_id: StringUuid,
        course_id: StringUuid,
    ) -> Result<Option<Enrollment>> {
        Ok(self.get(user_id, course_id).await)
    }

    async fn find_by_id(&self, id: StringUuid) -> Result<Option<Enrollment>> {
        let enrollments = self.enrollments.read().await;
        Ok(enrollments.iter().find(|e| e.id == id).cloned())
    }

    async fn find_by_course(&self, course_id: StringUuid) -> Result<Vec<Enrollment>> {
        let enrollments = self.enrollments.read().await;
        Ok(enrollments
            .iter()
            .filter(|e| e.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn find_by_user_in_courses(
        &self,
        user_id: StringUuid,
        course_ids: &[StringUuid],
    ) -> Result<Vec<Enrollment>> {
        let enrollments = self.enrollments.read().await;
        Ok(enrollments
            .iter()
            .filter(|e| e.user_id == user_id && course_ids.contains(&e.course_id))
            .cloned()
            .collect())
    }

    async fn find_enrolled_user_ids(
        &self,
        course_id: StringUuid,
        user_ids: &[StringUuid],
    ) -> Result<Vec<StringUuid>> {
        let enrollments = self.enrollments.read().await;
        Ok(enrollments
            .iter()
            .filter(|e| e.course_id == course_id && user_ids.contains(&e.user_id))
            .map(|e| e.user_id)
            .collect())
    }

    async fn insert_ignore_many(&self, rows: &[Enrollment]) -> Result<u64> {
        let mut enrollments = self.enrollments.write().await;
        let mut written = 0;
        for row in rows {
            let exists = enrollments
                .iter()
                .any(|e| e.user_id == row.user_id && e.course_id == row.course_id);
            if !exists {
                enrollments.push(row.clone());
                written += 1;
            }
        }
        Ok(written)
    }

    async fn count_by_course(&self, course_id: StringUuid) -> Result<i64> {
        let enrollments = self.enrollments.read().await;
        Ok(enrollments.iter().filter(|e| e.course_id == course_id).count() as i64)
    }

    async fn count_completed_by_course(&self, course_id: StringUuid) -> Result<i64> {
        let enrollments = self.enrollments.read().await;
        Ok(enrollments
            .iter()
            .filter(|e| e.course_id == course_id && e.completed)
            .count() as i64)
    }

    async fn update_completion(
        &self,
        id: StringUuid,
        progress_percentage: f64,
        force_completion: bool,
    ) -> Result<Option<bool>> {
        let mut enrollments = self.enrollments.write().await;
        let Some(enrollment) = enrollments.iter_mut().find(|e| e.id == id) else {
            return Ok(None);
        };

        match CompletionChange::evaluate(enrollment, progress_percentage, force_completion, Utc::now())
        {
            Some(change) => {
                enrollment.completed = change.completed;
                enrollment.completion_date = change.completion_date;
                Ok(Some(true))
            }
            None => Ok(Some(false)),
        }
    }

    async fn touch_last_accessed(&self, id: StringUuid) -> Result<()> {
        let mut enrollments = self.enrollments.write().await;
        if let Some(enrollment) = enrollments.iter_mut().find(|e| e.id == id) {
            enrollment.last_accessed = Some(Utc::now());
        }
        Ok(())
    }

    async fn delete(&self, user_id: StringUuid, course_id: StringUuid) -> Result<bool> {
        let mut enrollments = self.enrollments.write().await;
        let before = enrollments.len();
        enrollments.retain(|e| !(e.user_id == user_id && e.course_id == course_id));
        Ok(enrollments.len() < before)
    }

    async fn delete_auto_prerequisite(
        &self,
        prerequisite_id: StringUuid,
        source_course_id: StringUuid,
    ) -> Result<u64> {
        let mut enrollments = self.enrollments.write().await;
        let before = enrollments.len();
        enrollments.retain(|e| {
            !(e.course_id == prerequisite_id && e.is_auto_prerequisite_of(source_course_id))
        });
        Ok((before - enrollments.len()) as u64)
    }
}

pub struct TestTopicProgressRepository {
    rows: RwLock<Vec<TopicProgress>>,
}

impl TestTopicProgressRepository {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(vec![]),
        }
    }
}

#[async_trait]
impl TopicProgressRepository for TestTopicProgressRepository {
    async fn find(
        &self,
        user_id: StringUuid,
        topic_id: StringUuid,
    ) -> Result<Option<TopicProgress>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|p| p.user_id == user_id && p.topic_id == topic_id)
            .cloned())
    }

    async fn upsert_locked(
        &self,
        user_id: StringUuid,
        topic_id: StringUuid,
        update: &TopicProgressUpdate,
    ) -> Result<(TopicProgress, bool)> {
        let now = Utc::now();
        let mut rows = self.rows.write().await;
        if let Some(row) = rows
            .iter_mut()
            .find(|p| p.user_id == user_id && p.topic_id == topic_id)
        {
            row.apply(update, now);
            return Ok((row.clone(), false));
        }

        let mut row = TopicProgress::new(user_id, topic_id, now);
        row.apply(update, now);
        rows.push(row.clone());
        Ok((row, true))
    }
}

pub struct TestGroupRepository {
    grants: RwLock<Vec<GroupAccessGrant>>,
}

impl TestGroupRepository {
    pub fn new() -> Self {
        Self {
            grants: RwLock::new(vec![]),
        }
    }

    pub async fn add_grant(&self, grant: GroupAccessGrant) {
        self.grants.write().await.push(grant);
    }
}

#[async_trait]
impl GroupRepository for TestGroupRepository {
    async fn find_user_course_grants(
        &self,
        user_id: StringUuid,
        course_id: StringUuid,
    ) -> Result<Vec<GroupAccessGrant>> {
        let grants = self.grants.read().await;
        Ok(grants
            .iter()
            .filter(|g| g.user_id == user_id && g.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn find_course_grants(&self, course_id: StringUuid) -> Result<Vec<GroupAccessGrant>> {
        let grants = self.grants.read().await;
        Ok(grants
            .iter()
            .filter(|g| g.course_id == course_id)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Test AppState
// ============================================================================

type TestEnrollmentService = EnrollmentService<
    TestUserRepository,
    TestCourseRepository,
    TestEnrollmentRepository,
    TestTopicProgressRepository,
>;

type TestPrerequisiteService = PrerequisiteService<
    TestUserRepository,
    TestCourseRepository,
    TestEnrollmentRepository,
    TestTopicProgressRepository,
>;

#[derive(Clone)]
pub struct TestAppState {
    pub cache: Arc<dyn CacheOperations>,
    pub access_service: Arc<AccessService<TestEnrollmentRepository, TestGroupRepository>>,
    pub enrollment_service: Arc<TestEnrollmentService>,
    pub prerequisite_service: Arc<TestPrerequisiteService>,
    pub categorization_service: Arc<
        CategorizationService<TestUserRepository, TestEnrollmentRepository, TestGroupRepository>,
    >,
    // Raw repositories for test setup
    pub user_repo: Arc<TestUserRepository>,
    pub course_repo: Arc<TestCourseRepository>,
    pub enrollment_repo: Arc<TestEnrollmentRepository>,
    pub group_repo: Arc<TestGroupRepository>,
}

impl TestAppState {
    pub fn new() -> Self {
        let user_repo = Arc::new(TestUserRepository::new());
        let course_repo = Arc::new(TestCourseRepository::new());
        let enrollment_repo = Arc::new(TestEnrollmentRepository::new());
        let topic_repo = Arc::new(TestTopicProgressRepository::new());
        let group_repo = Arc::new(TestGroupRepository::new());
        let cache: Arc<dyn CacheOperations> = Arc::new(NoOpCacheManager::new());

        let access_service = Arc::new(AccessService::new(
            enrollment_repo.clone(),
            group_repo.clone(),
        ));
        let enrollment_service = Arc::new(EnrollmentService::new(
            user_repo.clone(),
            course_repo.clone(),
            enrollment_repo.clone(),
            topic_repo,
            Some(cache.clone()),
        ));
        let prerequisite_service = Arc::new(PrerequisiteService::new(
            course_repo.clone(),
            enrollment_repo.clone(),
            enrollment_service.clone(),
            EnrollmentConfig::default(),
        ));
        let categorization_service = Arc::new(CategorizationService::new(
            user_repo.clone(),
            enrollment_repo.clone(),
            group_repo.clone(),
            Some(cache.clone()),
            Duration::from_secs(300),
        ));

        Self {
            cache,
            access_service,
            enrollment_service,
            prerequisite_service,
            categorization_service,
            user_repo,
            course_repo,
            enrollment_repo,
            group_repo,
        }
    }

    pub async fn add_user(&self, username: &str, role: UserRole) -> User {
        let user = User {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            role,
            ..Default::default()
        };
        self.user_repo.add_user(user.clone()).await;
        user
    }

    pub async fn add_course(&self, title: &str) -> Course {
        self.add_course_with(Course {
            title: title.to_string(),
            ..Default::default()
        })
        .await
    }

    pub async fn add_course_with(&self, course: Course) -> Course {
        self.course_repo.add_course(course.clone()).await;
        course
    }

    /// Seed an enrollment directly, bypassing the services.
    pub async fn enroll(&self, user: &User, course: &Course) -> Enrollment {
        let enrollment = Enrollment::new(user.id, course.id, EnrollmentSource::Manual, None);
        self.enrollment_repo.add_enrollment(enrollment.clone()).await;
        enrollment
    }
}

impl HasServices for TestAppState {
    type UserRepo = TestUserRepository;
    type CourseRepo = TestCourseRepository;
    type EnrollmentRepo = TestEnrollmentRepository;
    type TopicProgressRepo = TestTopicProgressRepository;
    type GroupRepo = TestGroupRepository;

    fn access_service(&self) -> &AccessService<Self::EnrollmentRepo, Self::GroupRepo> {
        &self.access_service
    }

    fn enrollment_service(&self) -> &TestEnrollmentService {
        &self.enrollment_service
    }

    fn prerequisite_service(&self) -> &TestPrerequisiteService {
        &self.prerequisite_service
    }

    fn categorization_service(
        &self,
    ) -> &CategorizationService<Self::UserRepo, Self::EnrollmentRepo, Self::GroupRepo> {
        &self.categorization_service
    }
}

#[async_trait]
impl HasHealthCheck for TestAppState {
    fn cache(&self) -> &Arc<dyn CacheOperations> {
        &self.cache
    }

    async fn database_ready(&self) -> bool {
        true
    }
}

pub fn router(state: &TestAppState) -> Router {
    build_router(state.clone())
}

// ============================================================================
// HTTP helpers
// ============================================================================

/// Send a request as `user_id` and parse the JSON response body.
pub async fn send_json<T: Serialize, R: DeserializeOwned>(
    app: &Router,
    method: Method,
    path: &str,
    user_id: Option<StringUuid>,
    body: Option<&T>,
) -> (StatusCode, Option<R>) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(id) = user_id {
        builder = builder.header("x-user-id", id.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_string(body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap_or_default();

    if body_bytes.is_empty() {
        return (status, None);
    }

    match serde_json::from_slice(&body_bytes) {
        Ok(data) => (status, Some(data)),
        Err(_) => (status, None),
    }
}

pub async fn get_as(
    app: &Router,
    path: &str,
    user: &User,
) -> (StatusCode, Option<serde_json::Value>) {
    send_json::<(), _>(app, Method::GET, path, Some(user.id), None).await
}

pub async fn post_as<T: Serialize>(
    app: &Router,
    path: &str,
    user: &User,
    body: &T,
) -> (StatusCode, Option<serde_json::Value>) {
    send_json(app, Method::POST, path, Some(user.id), Some(body)).await
}

pub async fn put_as<T: Serialize>(
    app: &Router,
    path: &str,
    user: &User,
    body: &T,
) -> (StatusCode, Option<serde_json::Value>) {
    send_json(app, Method::PUT, path, Some(user.id), Some(body)).await
}

pub async fn delete_as(
    app: &Router,
    path: &str,
    user: &User,
) -> (StatusCode, Option<serde_json::Value>) {
    send_json::<(), _>(app, Method::DELETE, path, Some(user.id), None).await
}
