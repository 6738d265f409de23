use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("invalid {field} selector {selector:?}: {reason}")]
    InvalidSelector {
        field: &'static str,
        selector: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown category {0:?}")]
pub struct UnknownCategory(pub String);

/// A listing node that could not be turned into a record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntryError {
    #[error("listing node has no content to decompose")]
    Hollow,
}

/// Every way a search can fail. Callers render all of them the same way;
/// the variants only exist so the logs say what happened.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote returned {0}")]
    Status(StatusCode),
}
