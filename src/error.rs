use thiserror::Error;

use crate::state_machine::OrchestrationStatus;
use crate::validation::ErrorKind;

#[derive(Debug, Error)]
pub enum ShiftSyncError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Scrape error: {0}")]
    Scrape(#[from] ScrapeError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Orchestration error: {0}")]
    Orchestration(#[from] OrchestrationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Synchronous failures of the worker pool. A job's own failure is never
/// reported through this type; it is captured in the pool's completion stats.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("job queue is full")]
    QueueFull,

    #[error("pool is closed")]
    PoolClosed,

    #[error("wait cancelled before all jobs completed")]
    Cancelled,

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}

/// Category of a per-unit scrape failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitErrorKind {
    Http,
    Network,
    Parse,
    Retry,
    Queue,
    Cancelled,
    Internal,
}

impl std::fmt::Display for UnitErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            UnitErrorKind::Http => "http",
            UnitErrorKind::Network => "network",
            UnitErrorKind::Parse => "parse",
            UnitErrorKind::Retry => "retry",
            UnitErrorKind::Queue => "queue",
            UnitErrorKind::Cancelled => "cancelled",
            UnitErrorKind::Internal => "internal",
        };
        write!(f, "{name}")
    }
}

/// Errors produced while fetching and extracting a single unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("HTTP {status} (URL: {url})")]
    Http { status: u16, url: String },

    #[error("network error: {message} (URL: {url})")]
    Network { url: String, message: String },

    #[error("parse error: {message} (URL: {url})")]
    Parse { url: String, message: String },

    #[error("failed after {attempts} attempts (last status: {last_status}) (URL: {url})")]
    Retry {
        url: String,
        attempts: u32,
        last_status: u16,
    },

    #[error("fetch cancelled (URL: {url})")]
    Cancelled { url: String },
}

impl FetchError {
    pub fn kind(&self) -> UnitErrorKind {
        match self {
            FetchError::Http { .. } => UnitErrorKind::Http,
            FetchError::Network { .. } => UnitErrorKind::Network,
            FetchError::Parse { .. } => UnitErrorKind::Parse,
            FetchError::Retry { .. } => UnitErrorKind::Retry,
            FetchError::Cancelled { .. } => UnitErrorKind::Cancelled,
        }
    }
}

/// Fetcher-level failures. Per-unit failures never surface here.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("period count must be at least 1, got {0}")]
    InvalidPeriodCount(i64),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("duplicate key violation: {entity} {id} already exists")]
    Duplicate { entity: &'static str, id: String },

    #[error("foreign key constraint violation: {0}")]
    Constraint(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl RepositoryError {
    /// Tag used when this failure is reported in a validation outcome.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            RepositoryError::NotFound { .. } => ErrorKind::MissingEntity,
            RepositoryError::Duplicate { .. } | RepositoryError::Constraint(_) => {
                ErrorKind::ConstraintViolation
            }
            RepositoryError::Storage(_) => ErrorKind::Connectivity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestrationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("orchestrator already used for a run (status {0})")]
    AlreadyStarted(OrchestrationStatus),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_kinds() {
        let http = FetchError::Http {
            status: 503,
            url: "/schedule/2025-11".into(),
        };
        assert_eq!(http.kind(), UnitErrorKind::Http);
        assert_eq!(http.to_string(), "HTTP 503 (URL: /schedule/2025-11)");

        let net = FetchError::Network {
            url: "/schedule/2025-12".into(),
            message: "connection reset".into(),
        };
        assert_eq!(net.kind(), UnitErrorKind::Network);
        assert_eq!(
            net.to_string(),
            "network error: connection reset (URL: /schedule/2025-12)"
        );
    }

    #[test]
    fn repository_duplicate_mentions_duplicate_key() {
        let err = RepositoryError::Duplicate {
            entity: "assignment",
            id: "abc".into(),
        };
        assert!(err.to_string().contains("duplicate key"));
    }

    #[test]
    fn repository_errors_map_to_kinds() {
        assert_eq!(
            RepositoryError::Constraint("fk".into()).error_kind(),
            ErrorKind::ConstraintViolation
        );
        assert_eq!(
            RepositoryError::Storage("pool exhausted".into()).error_kind(),
            ErrorKind::Connectivity
        );
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ShiftSyncError>();
        assert_send_sync::<FetchError>();
        assert_send_sync::<PoolError>();
    }
}
