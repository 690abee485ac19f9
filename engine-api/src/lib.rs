// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Lifecycle contract for long-running background engines.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

pub trait Engine: Send + Sync {
    fn start(&self) -> EngineResult<()>;
    fn stop(&self) -> EngineResult<()>;
    fn health(&self) -> EngineHealth;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    Starting,
    Ready,
    Degraded,
    Failed,
    Stopped,
}

#[derive(Clone, Debug)]
pub struct EngineHealth {
    pub status: HealthStatus,
    pub detail: Option<String>,
}

impl EngineHealth {
    pub fn new(status: HealthStatus, detail: Option<String>) -> Self {
        Self { status, detail }
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.status,
            HealthStatus::Starting | HealthStatus::Ready | HealthStatus::Degraded
        )
    }
}

impl Default for EngineHealth {
    fn default() -> Self {
        Self {
            status: HealthStatus::Stopped,
            detail: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine already running")]
    AlreadyRunning,
    #[error("engine is not running")]
    NotRunning,
    #[error("engine encountered an error: {source}")]
    Failure {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl EngineError {
    pub fn failure<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        EngineError::Failure {
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_health_is_stopped() {
        let health = EngineHealth::default();
        assert_eq!(health.status, HealthStatus::Stopped);
        assert!(!health.is_running());
    }

    #[test]
    fn degraded_engines_still_count_as_running() {
        let health = EngineHealth::new(HealthStatus::Degraded, Some("settle failed".into()));
        assert!(health.is_running());
        assert_eq!(health.detail.as_deref(), Some("settle failed"));
    }

    #[test]
    fn failure_wraps_source_error() {
        let err = EngineError::failure(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(err.to_string(), "engine encountered an error: boom");
    }
}
