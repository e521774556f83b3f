//! Error types for the conversion pipeline.
//!
//! Every fatal condition unwinds to the caller as an [`Error`] carrying the
//! kind of failure and the identifying context (entity id, source name).

use std::path::PathBuf;

use crate::creators::CreatorKind;

/// Errors that abort a conversion run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or missing configuration; the pipeline never starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// A fetch failed and no usable cache entry exists.
    #[error("data source '{source_name}' failed: {message}")]
    DataSource {
        source_name: String,
        message: String,
    },

    /// The configured selector has no registered creator strategy.
    #[error("no creator strategy registered for agency selector '{0}'")]
    UnsupportedAgency(String),

    /// A source entity could not be mapped to a valid feed record.
    #[error("cannot transform {entity}: {message}")]
    Transform { entity: String, message: String },

    /// A creator ran before the creator it depends on.
    #[error("{creator} creator ran before {requires} creator")]
    OutOfOrder {
        creator: CreatorKind,
        requires: CreatorKind,
    },

    /// Validation found problems classified as fatal.
    #[error("feed validation failed with {fatal} fatal problem(s), first: {first}")]
    Validation { fatal: usize, first: String },

    /// Writing the archive failed.
    #[error("failed to write archive {path:?}: {message}")]
    Write { path: PathBuf, message: String },

    /// The archive was written but the patch step failed.
    #[error("failed to patch archive {path:?}: {message}")]
    Patch { path: PathBuf, message: String },

    /// Persisting a cache entry failed.
    #[error("cache error: {message}")]
    Cache { message: String },
}

impl Error {
    pub fn transform(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Transform {
            entity: entity.into(),
            message: message.into(),
        }
    }

    pub fn data_source(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::DataSource {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_context() {
        let err = Error::transform("route r42", "fewer than two stops");
        assert_eq!(
            err.to_string(),
            "cannot transform route r42: fewer than two stops"
        );

        let err = Error::data_source("overpass", "timed out");
        assert_eq!(err.to_string(), "data source 'overpass' failed: timed out");

        let err = Error::UnsupportedAgency("nowhere".into());
        assert!(err.to_string().contains("'nowhere'"));

        let err = Error::OutOfOrder {
            creator: CreatorKind::Trips,
            requires: CreatorKind::Schedule,
        };
        assert_eq!(err.to_string(), "trips creator ran before schedule creator");
    }
}
