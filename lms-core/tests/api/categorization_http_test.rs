//! Course reporting HTTP tests

use super::{get_as, router, TestAppState};
use axum::http::StatusCode;
use lms_core::domain::{Course, Enrollment, EnrollmentSource, UserRole};

#[tokio::test]
async fn test_course_users_are_bucketed_by_role() {
    let state = TestAppState::new();
    let owner = state.add_user("ivy", UserRole::Instructor).await;
    let invited = state.add_user("jay", UserRole::Instructor).await;
    let learner = state.add_user("lee", UserRole::Learner).await;
    let root = state.add_user("root", UserRole::Globaladmin).await;
    let outsider = state.add_user("otto", UserRole::Admin).await;
    let course = state
        .add_course_with(Course {
            title: "Rust 101".to_string(),
            instructor_id: Some(owner.id),
            ..Default::default()
        })
        .await;
    for user in [&owner, &invited, &learner, &root, &outsider] {
        state.enroll(user, &course).await;
    }
    let app = router(&state);

    let (status, response) = get_as(
        &app,
        &format!("/api/v1/courses/{}/users", course.id),
        &owner,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let data = &response.unwrap()["data"];
    assert_eq!(data["instructors"].as_array().unwrap().len(), 2);
    assert_eq!(data["learners"].as_array().unwrap().len(), 1);
    assert_eq!(data["learners"][0]["user"]["username"], "lee");
    assert_eq!(data["learners"][0]["display_role"], "Learner");
    assert_eq!(data["learners"][0]["can_modify"], false);
    assert_eq!(data["admins"][0]["course_role"], "superuser");
    assert_eq!(data["others"][0]["user"]["username"], "otto");
    assert_eq!(data["others"][0]["display_role"], "No Access");
}

#[tokio::test]
async fn test_course_users_requires_modify() {
    let state = TestAppState::new();
    let learner = state.add_user("lee", UserRole::Learner).await;
    let course = state.add_course("Rust 101").await;
    state.enroll(&learner, &course).await;
    let app = router(&state);

    let (status, _) = get_as(
        &app,
        &format!("/api/v1/courses/{}/users", course.id),
        &learner,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = get_as(
        &app,
        &format!("/api/v1/courses/{}/progress-summary", course.id),
        &learner,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_progress_summary_counts_completions() {
    let state = TestAppState::new();
    let root = state.add_user("root", UserRole::Globaladmin).await;
    let course = state.add_course("Rust 101").await;
    for i in 0..4 {
        let user = state.add_user(&format!("user{}", i), UserRole::Learner).await;
        let mut enrollment = Enrollment::new(user.id, course.id, EnrollmentSource::Bulk, None);
        enrollment.completed = i == 0;
        state.enrollment_repo.add_enrollment(enrollment).await;
    }
    let app = router(&state);

    let (status, response) = get_as(
        &app,
        &format!("/api/v1/courses/{}/progress-summary", course.id),
        &root,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let data = &response.unwrap()["data"];
    assert_eq!(data["total_enrollments"], 4);
    assert_eq!(data["completed"], 1);
    assert_eq!(data["in_progress"], 3);
    assert_eq!(data["completion_rate"], 25.0);
}
