use std::path::PathBuf;
use std::process::ExitCode;

use crate::engine::models::Version;

/// Exit status reported when the remote "latest" is older than what is on disk.
pub const ANOMALY_EXIT_CODE: u8 = 10;

// What a run ended up doing. Failures are `FetchError`s, not outcomes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Remote latest matches the recorded version.
    UpToDate { version: Version },
    /// The explicitly requested version is the recorded one.
    AlreadySatisfied { version: Version },
    /// Remote latest went backwards relative to the recorded version.
    Anomaly { latest: Version, downloaded: Version },
    Downloaded {
        version: Version,
        artifacts: Vec<PathBuf>,
    },
}

impl Outcome {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Outcome::Anomaly { .. } => ExitCode::from(ANOMALY_EXIT_CODE),
            _ => ExitCode::SUCCESS,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Outcome::UpToDate { version } => {
                format!("Latest version {version} is already downloaded, nothing to do.")
            }
            Outcome::AlreadySatisfied { version } => {
                format!("Requested version {version} is already downloaded, nothing to do.")
            }
            Outcome::Anomaly { latest, downloaded } => format!(
                "Latest version {latest} is older than the downloaded version {downloaded}; refusing to download."
            ),
            Outcome::Downloaded { version, artifacts } => {
                format!("Downloaded {} archive(s) for version {version}.", artifacts.len())
            }
        }
    }
}
