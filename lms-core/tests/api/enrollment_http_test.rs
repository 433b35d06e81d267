//! Enrollment HTTP tests

use super::{get_as, post_as, put_as, router, TestAppState};
use axum::http::StatusCode;
use lms_core::domain::{Course, StringUuid, Topic, UserRole};
use serde_json::json;

#[tokio::test]
async fn test_instructor_enrolls_user_once() {
    let state = TestAppState::new();
    let instructor = state.add_user("ivy", UserRole::Instructor).await;
    let learner = state.add_user("lee", UserRole::Learner).await;
    let course = state
        .add_course_with(Course {
            title: "Rust 101".to_string(),
            instructor_id: Some(instructor.id),
            ..Default::default()
        })
        .await;
    let app = router(&state);
    let path = format!("/api/v1/courses/{}/enrollments", course.id);
    let body = json!({ "user_id": learner.id.to_string() });

    let (status, response) = post_as(&app, &path, &instructor, &body).await;
    assert_eq!(status, StatusCode::CREATED);
    let data = &response.unwrap()["data"];
    assert_eq!(data["created"], true);
    assert_eq!(data["message"], "Successfully enrolled lee in Rust 101");
    assert_eq!(data["enrollment"]["enrollment_source"], "manual");

    let (status, response) = post_as(&app, &path, &instructor, &body).await;
    assert_eq!(status, StatusCode::OK);
    let data = &response.unwrap()["data"];
    assert_eq!(data["created"], false);
    assert_eq!(data["message"], "lee is already enrolled in Rust 101");

    assert_eq!(state.enrollment_repo.all().await.len(), 1);
}

#[tokio::test]
async fn test_enroll_rejects_cascade_source_tag() {
    let state = TestAppState::new();
    let root = state.add_user("root", UserRole::Globaladmin).await;
    let learner = state.add_user("lee", UserRole::Learner).await;
    let course = state.add_course("Rust 101").await;
    let app = router(&state);
    let path = format!("/api/v1/courses/{}/enrollments", course.id);

    let (status, response) = post_as(
        &app,
        &path,
        &root,
        &json!({ "user_id": learner.id.to_string(), "source": "auto_prerequisite" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response.unwrap()["error"], "bad_request");
    assert!(state.enrollment_repo.all().await.is_empty());

    let (status, _) = post_as(
        &app,
        &format!("{}/bulk", path),
        &root,
        &json!({ "user_ids": [learner.id.to_string()], "source": "auto_dependent" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(state.enrollment_repo.all().await.is_empty());
}

#[tokio::test]
async fn test_superuser_enrolls_user() {
    let state = TestAppState::new();
    let root = state.add_user("root", UserRole::Globaladmin).await;
    let learner = state.add_user("lee", UserRole::Learner).await;
    let course = state.add_course("Rust 101").await;
    let app = router(&state);

    let (status, _) = post_as(
        &app,
        &format!("/api/v1/courses/{}/enrollments", course.id),
        &root,
        &json!({ "user_id": learner.id.to_string() }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(state.enrollment_repo.get(learner.id, course.id).await.is_some());
}

#[tokio::test]
async fn test_learner_cannot_enroll_others() {
    let state = TestAppState::new();
    let learner = state.add_user("lee", UserRole::Learner).await;
    let other = state.add_user("sam", UserRole::Learner).await;
    let course = state.add_course("Rust 101").await;
    state.enroll(&learner, &course).await;
    let app = router(&state);

    let (status, response) = post_as(
        &app,
        &format!("/api/v1/courses/{}/enrollments", course.id),
        &learner,
        &json!({ "user_id": other.id.to_string() }),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response.unwrap()["error"], "forbidden");
    assert!(state.enrollment_repo.get(other.id, course.id).await.is_none());
}

#[tokio::test]
async fn test_bulk_enroll_counts() {
    let state = TestAppState::new();
    let root = state.add_user("root", UserRole::Globaladmin).await;
    let first = state.add_user("ann", UserRole::Learner).await;
    let second = state.add_user("bob", UserRole::Learner).await;
    let existing = state.add_user("cat", UserRole::Learner).await;
    let course = state.add_course("Rust 101").await;
    state.enroll(&existing, &course).await;
    let app = router(&state);
    let missing = StringUuid::new_v4();

    let (status, response) = post_as(
        &app,
        &format!("/api/v1/courses/{}/enrollments/bulk", course.id),
        &root,
        &json!({
            "user_ids": [
                first.id.to_string(),
                second.id.to_string(),
                existing.id.to_string(),
                missing.to_string(),
                missing.to_string(),
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let data = &response.unwrap()["data"];
    assert_eq!(data["created"], 2);
    assert_eq!(data["already_enrolled"], 1);
    assert_eq!(data["errors"], json!([format!("User {} not found", missing)]));

    let row = state.enrollment_repo.get(first.id, course.id).await.unwrap();
    assert_eq!(row.enrollment_source.as_str(), "bulk");
    assert_eq!(state.enrollment_repo.all().await.len(), 3);
}

#[tokio::test]
async fn test_bulk_enroll_rejects_empty_list() {
    let state = TestAppState::new();
    let root = state.add_user("root", UserRole::Globaladmin).await;
    let course = state.add_course("Rust 101").await;
    let app = router(&state);

    let (status, _) = post_as(
        &app,
        &format!("/api/v1/courses/{}/enrollments/bulk", course.id),
        &root,
        &json!({ "user_ids": [] }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_self_enroll_into_inactive_course_lists_reasons() {
    let state = TestAppState::new();
    let learner = state.add_user("lee", UserRole::Learner).await;
    let course = state
        .add_course_with(Course {
            title: "Archived".to_string(),
            is_active: false,
            ..Default::default()
        })
        .await;
    let app = router(&state);

    let (status, response) = post_as(
        &app,
        &format!("/api/v1/courses/{}/self-enroll", course.id),
        &learner,
        &json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let body = response.unwrap();
    assert_eq!(body["error"], "ineligible_enrollment");
    assert_eq!(body["details"]["reasons"], json!(["Course is not active"]));
    assert!(state.enrollment_repo.all().await.is_empty());
}

#[tokio::test]
async fn test_self_enroll_succeeds_for_eligible_user() {
    let state = TestAppState::new();
    let learner = state.add_user("lee", UserRole::Learner).await;
    let course = state.add_course("Rust 101").await;
    let app = router(&state);
    let path = format!("/api/v1/courses/{}/self-enroll", course.id);

    let (status, response) = post_as(&app, &path, &learner, &json!({})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(response.unwrap()["data"]["enrollment"]["enrollment_source"], "self");

    let (status, response) = post_as(&app, &path, &learner, &json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response.unwrap()["data"]["created"], false);
}

#[tokio::test]
async fn test_eligibility_reports_incomplete_prerequisite() {
    let state = TestAppState::new();
    let learner = state.add_user("lee", UserRole::Learner).await;
    let prerequisite = state.add_course("P").await;
    let course = state.add_course("Advanced").await;
    state
        .course_repo
        .add_prerequisite(course.id, prerequisite.id)
        .await;
    state.enroll(&learner, &prerequisite).await;
    let app = router(&state);

    let (status, response) = get_as(
        &app,
        &format!("/api/v1/courses/{}/eligibility", course.id),
        &learner,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let data = &response.unwrap()["data"];
    assert_eq!(data["eligible"], false);
    assert_eq!(
        data["reasons"],
        json!(["Prerequisite course not completed: P"])
    );
}

#[tokio::test]
async fn test_eligibility_passes_once_prerequisite_completed() {
    let state = TestAppState::new();
    let learner = state.add_user("lee", UserRole::Learner).await;
    let prerequisite = state.add_course("P").await;
    let course = state.add_course("Advanced").await;
    state
        .course_repo
        .add_prerequisite(course.id, prerequisite.id)
        .await;
    let enrollment = state.enroll(&learner, &prerequisite).await;
    let app = router(&state);

    let (status, _) = put_as(
        &app,
        &format!("/api/v1/enrollments/{}/progress", enrollment.id),
        &learner,
        &json!({ "progress_percentage": 100.0 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, response) = get_as(
        &app,
        &format!("/api/v1/courses/{}/eligibility", course.id),
        &learner,
    )
    .await;
    let data = &response.unwrap()["data"];
    assert_eq!(data["eligible"], true);
    assert_eq!(data["reasons"], json!([]));
}

#[tokio::test]
async fn test_owner_progress_update_marks_completion() {
    let state = TestAppState::new();
    let learner = state.add_user("lee", UserRole::Learner).await;
    let course = state.add_course("Rust 101").await;
    let enrollment = state.enroll(&learner, &course).await;
    let app = router(&state);
    let path = format!("/api/v1/enrollments/{}/progress", enrollment.id);

    let (status, response) = put_as(
        &app,
        &path,
        &learner,
        &json!({ "progress_percentage": 150.0 }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let data = &response.unwrap()["data"];
    assert_eq!(data["completed"], true);
    assert!(!data["completion_date"].is_null());

    let stored = state.enrollment_repo.get(learner.id, course.id).await.unwrap();
    assert!(stored.completed);
}

#[tokio::test]
async fn test_progress_update_by_stranger_is_forbidden() {
    let state = TestAppState::new();
    let learner = state.add_user("lee", UserRole::Learner).await;
    let classmate = state.add_user("sam", UserRole::Learner).await;
    let course = state.add_course("Rust 101").await;
    let enrollment = state.enroll(&learner, &course).await;
    state.enroll(&classmate, &course).await;
    let app = router(&state);

    let (status, _) = put_as(
        &app,
        &format!("/api/v1/enrollments/{}/progress", enrollment.id),
        &classmate,
        &json!({ "progress_percentage": 100.0 }),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    let stored = state.enrollment_repo.get(learner.id, course.id).await.unwrap();
    assert!(!stored.completed);
}

#[tokio::test]
async fn test_topic_progress_created_then_updated() {
    let state = TestAppState::new();
    let learner = state.add_user("lee", UserRole::Learner).await;
    let course = state.add_course("Rust 101").await;
    state.enroll(&learner, &course).await;
    let topic = Topic {
        id: StringUuid::new_v4(),
        course_id: course.id,
        title: "Ownership".to_string(),
    };
    state.course_repo.add_topic(topic.clone()).await;
    let app = router(&state);
    let path = format!("/api/v1/topics/{}/progress", topic.id);

    let (status, response) = put_as(
        &app,
        &path,
        &learner,
        &json!({ "time_spent_secs": 120, "score": 40.0 }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let data = &response.unwrap()["data"];
    assert_eq!(data["total_time_spent_secs"], 120);
    assert_eq!(data["completed"], false);

    let (status, response) = put_as(
        &app,
        &path,
        &learner,
        &json!({ "time_spent_secs": 60, "score": 90.0, "completed": true }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let data = &response.unwrap()["data"];
    assert_eq!(data["total_time_spent_secs"], 180);
    assert_eq!(data["completed"], true);
    assert_eq!(data["last_score"], 90.0);
}

#[tokio::test]
async fn test_topic_progress_records_course_access() {
    let state = TestAppState::new();
    let learner = state.add_user("lee", UserRole::Learner).await;
    let course = state.add_course("Rust 101").await;
    state.enroll(&learner, &course).await;
    let topic = Topic {
        id: StringUuid::new_v4(),
        course_id: course.id,
        title: "Borrowing".to_string(),
    };
    state.course_repo.add_topic(topic.clone()).await;
    let app = router(&state);

    let before = state.enrollment_repo.get(learner.id, course.id).await.unwrap();
    assert!(before.last_accessed.is_none());

    let (status, _) = put_as(
        &app,
        &format!("/api/v1/topics/{}/progress", topic.id),
        &learner,
        &json!({ "time_spent_secs": 30 }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let after = state.enrollment_repo.get(learner.id, course.id).await.unwrap();
    assert!(after.last_accessed.is_some());
    assert_eq!(after.id, before.id);
}

#[tokio::test]
async fn test_topic_progress_requires_course_access() {
    let state = TestAppState::new();
    let stranger = state.add_user("sam", UserRole::Learner).await;
    let course = state.add_course("Rust 101").await;
    let topic = Topic {
        id: StringUuid::new_v4(),
        course_id: course.id,
        title: "Ownership".to_string(),
    };
    state.course_repo.add_topic(topic.clone()).await;
    let app = router(&state);

    let (status, _) = put_as(
        &app,
        &format!("/api/v1/topics/{}/progress", topic.id),
        &stranger,
        &json!({ "completed": true }),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}
