//! Configuration management for LMS Core

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Redis configuration
    pub redis: RedisConfig,
    /// Enrollment engine tunables
    pub enrollment: EnrollmentConfig,
    /// Logging, metrics and span export
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// When false the service runs with the no-op cache
    pub enabled: bool,
}

/// Settings passed explicitly into the enrollment and cascade services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentConfig {
    /// Depth past which a prerequisite walk is treated as cyclic
    pub max_prerequisite_depth: usize,
    /// TTL of the cached course progress summary
    pub progress_summary_ttl_secs: u64,
}

impl EnrollmentConfig {
    pub fn progress_summary_ttl(&self) -> Duration {
        Duration::from_secs(self.progress_summary_ttl_secs)
    }
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            max_prerequisite_depth: 10,
            progress_summary_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "text" or "json"
    pub log_format: String,
    pub metrics_enabled: bool,
    /// Export spans over OTLP
    pub tracing_enabled: bool,
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            metrics_enabled: true,
            tracing_enabled: false,
            otlp_endpoint: None,
            service_name: "lms-core".to_string(),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let enrollment_defaults = EnrollmentConfig::default();

        Ok(Self {
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid HTTP_PORT")?,
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
                enabled: env_flag("CACHE_ENABLED", true),
            },
            enrollment: EnrollmentConfig {
                max_prerequisite_depth: env::var("ENROLLMENT_MAX_PREREQUISITE_DEPTH")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|depth: &usize| *depth > 0)
                    .unwrap_or(enrollment_defaults.max_prerequisite_depth),
                progress_summary_ttl_secs: env::var("ENROLLMENT_PROGRESS_SUMMARY_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(enrollment_defaults.progress_summary_ttl_secs),
            },
            telemetry: TelemetryConfig {
                log_format: env::var("LOG_FORMAT")
                    .map(|s| s.to_lowercase())
                    .unwrap_or_else(|_| "text".to_string()),
                metrics_enabled: env_flag("METRICS_ENABLED", true),
                tracing_enabled: env_flag("OTEL_TRACING_ENABLED", false),
                otlp_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                    .ok()
                    .filter(|s| !s.is_empty()),
                service_name: env::var("OTEL_SERVICE_NAME")
                    .unwrap_or_else(|_| "lms-core".to_string()),
            },
        })
    }

    /// Get HTTP server address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}
