//! Error types for every stage of the relay pipeline.
//!
//! Each stage gets its own enum so the run coordinator can decide, per
//! variant, whether a failure skips a post, skips an account, or is
//! swallowed entirely (translation).

use std::path::PathBuf;

use thiserror::Error;

/// Unified application error.
///
/// Only startup and run-level plumbing surfaces this type; per-account
/// failures are reported through [`AccountError`] and never abort a run.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while assembling [`crate::config::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {} could not be read: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config file {} is not valid JSON: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("{key} is required")]
    Missing { key: &'static str },

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    pub fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

/// Why a single mirror was skipped.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {message}")]
    Network { message: String },

    #[error("mirror returned HTTP {status}")]
    Status { status: u16 },

    #[error("mirror returned an empty body")]
    EmptyBody,

    #[error("feed could not be parsed: {message}")]
    Malformed { message: String },
}

impl From<reqwest::Error> for MirrorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network {
                message: err.to_string(),
            }
        }
    }
}

/// Raised by a feed source when no mirror produced a usable feed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("all {} mirrors failed for @{account}", .attempts.len())]
    AllMirrorsFailed {
        account: String,
        attempts: Vec<(String, MirrorError)>,
    },

    #[error("no mirrors configured")]
    NoMirrors,
}

/// Translation backend failures. Never escapes the translator adapter.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("translation timed out")]
    Timeout,

    #[error("network error: {message}")]
    Network { message: String },

    #[error("translation backend returned HTTP {status}")]
    Status { status: u16 },

    #[error("unexpected translation response: {message}")]
    Malformed { message: String },

    #[error("translator backend is not available: {message}")]
    Unavailable { message: String },
}

impl From<reqwest::Error> for TranslationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed {
                message: err.to_string(),
            }
        } else {
            Self::Network {
                message: err.to_string(),
            }
        }
    }
}

/// Push channel failures for a single message.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery timed out")]
    Timeout,

    #[error("network error: {message}")]
    Network { message: String },

    #[error("push channel returned HTTP {status}")]
    Status { status: u16 },

    #[error("push channel rejected message (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("unexpected push channel response: {message}")]
    Malformed { message: String },
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed {
                message: err.to_string(),
            }
        } else {
            Self::Network {
                message: err.to_string(),
            }
        }
    }
}

/// State file read/write failures.
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("state file {} I/O error: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("state file {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("state could not be serialised: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure of one account's pipeline. Other accounts are unaffected.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("state update failed after delivery: {0}")]
    StateWrite(#[from] StateStoreError),
}
