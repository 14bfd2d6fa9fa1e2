use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryError;

/// Main error type for probe operations
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON decoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected status {status} from {url}: {body}")]
    UnexpectedStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("{0}")]
    Assertion(String),

    #[error("No metrics found for task {task} on host {host}. Task names seen: {seen}")]
    TaskNotFound {
        task: String,
        host: String,
        seen: String,
    },

    #[error("Task {task} of framework {framework} not found in cluster state")]
    MissingTask { framework: String, task: String },

    #[error("Gave up after {attempts} attempts in {elapsed:?}: {source}")]
    GaveUp {
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: Box<ProbeError>,
    },

    #[error("Timed out after {attempts} attempts in {elapsed:?} waiting for an acceptable result")]
    Timeout { attempts: u32, elapsed: Duration },

    #[error("Skipped: {0}")]
    Skipped(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ProbeError {
    pub fn assertion(message: impl Into<String>) -> Self {
        ProbeError::Assertion(message.into())
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, ProbeError::Skipped(_))
    }

    /// Innermost error once retry wrappers are peeled off.
    pub fn root(&self) -> &ProbeError {
        match self {
            ProbeError::GaveUp { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<RetryError<ProbeError>> for ProbeError {
    fn from(err: RetryError<ProbeError>) -> Self {
        match err {
            RetryError::Aborted { source, .. } => source,
            RetryError::Exhausted {
                attempts,
                elapsed,
                source,
                ..
            } => ProbeError::GaveUp {
                attempts,
                elapsed,
                source: Box::new(source),
            },
            RetryError::Rejected {
                attempts, elapsed, ..
            } => ProbeError::Timeout { attempts, elapsed },
        }
    }
}

/// Returns `ProbeError::Assertion` from the enclosing function when the condition is false.
#[macro_export]
macro_rules! verify {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::ProbeError::Assertion(format!($($arg)+)));
        }
    };
}
