//! Prometheus metrics setup and metric definitions

use crate::domain::EnrollmentSource;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

pub const ENROLLMENTS_CREATED: &str = "lms_enrollments_created_total";
pub const ENROLLMENT_RACES_RECOVERED: &str = "lms_enrollment_races_recovered_total";
pub const PREREQUISITE_CASCADE: &str = "lms_prerequisite_cascade_total";
pub const HTTP_REQUESTS: &str = "lms_http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "lms_http_request_duration_seconds";
pub const HTTP_REQUESTS_IN_FLIGHT: &str = "lms_http_requests_in_flight";

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, BuildError> {
    // Seconds; includes sub-millisecond buckets for fast permission checks.
    let buckets = [
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(&buckets)?
        .install_recorder()
}

/// Register metric descriptions so HELP/TYPE lines exist from startup.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS, "Total number of HTTP requests");
    describe_histogram!(HTTP_REQUEST_DURATION, "HTTP request duration in seconds");
    describe_gauge!(
        HTTP_REQUESTS_IN_FLIGHT,
        "Number of HTTP requests currently being processed"
    );

    describe_counter!(ENROLLMENTS_CREATED, "Enrollment rows created, by source");
    describe_counter!(
        ENROLLMENT_RACES_RECOVERED,
        "Concurrent enrollment inserts resolved by re-reading the winning row"
    );
    describe_counter!(
        PREREQUISITE_CASCADE,
        "Prerequisite cascade runs by direction and outcome"
    );

    counter!(ENROLLMENTS_CREATED, "source" => "manual").absolute(0);
    counter!(ENROLLMENT_RACES_RECOVERED).absolute(0);
    counter!(PREREQUISITE_CASCADE, "direction" => "forward", "outcome" => "applied").absolute(0);
    gauge!(HTTP_REQUESTS_IN_FLIGHT).set(0.0);
}

pub fn record_enrollments_created(source: EnrollmentSource, count: u64) {
    if count > 0 {
        counter!(ENROLLMENTS_CREATED, "source" => source.as_str()).increment(count);
    }
}

pub fn record_race_recovered() {
    counter!(ENROLLMENT_RACES_RECOVERED).increment(1);
}

/// `direction` is one of forward, dependent, sync; `outcome` is applied, cyclic or failed.
pub fn record_cascade(direction: &'static str, outcome: &'static str) {
    counter!(PREREQUISITE_CASCADE, "direction" => direction, "outcome" => outcome).increment(1);
}
