use std::io;

use thiserror::Error;

use crate::engine::models::Platform;

pub type Result<T> = std::result::Result<T, FetchError>;

#[derive(Debug, Error)]
pub enum FetchError {
    /// A version string was not exactly three dot-separated integers.
    #[error("invalid version {input:?}: {reason}")]
    Parse { input: String, reason: String },

    /// The latest-releases lookup failed before any download started.
    #[error("latest release lookup failed: {reason}")]
    RemoteQuery { reason: String },

    #[error("download of {platform} failed with status {status}")]
    DownloadStatus {
        platform: Platform,
        status: reqwest::StatusCode,
    },

    #[error("transfer of {platform} failed")]
    Transfer {
        platform: Platform,
        #[source]
        source: reqwest::Error,
    },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// A spawned download task panicked instead of returning.
    #[error("download task did not complete ({platform:?}): {reason}")]
    TaskFailed {
        platform: Option<Platform>,
        reason: String,
    },

    #[error(
        "environment variable {var} is not set; create a token at https://factorio.com/profile \
         and export FACTORIO_USERNAME and FACTORIO_TOKEN (a .env file works too)"
    )]
    MissingCredentials { var: &'static str },
}

impl FetchError {
    pub fn parse(input: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            input: input.to_owned(),
            reason: reason.into(),
        }
    }

    pub fn remote(reason: impl Into<String>) -> Self {
        Self::RemoteQuery {
            reason: reason.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
