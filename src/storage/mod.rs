use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info};
use tokio::fs;

use crate::engine::models::Version;
use crate::error::{FetchError, Result};

const LOCAL_STATE_FILE: &str = "version.txt";

/// Owns the `version.txt` marker inside the output directory.
#[derive(Clone, Debug)]
pub struct StorageManager {
    base_dir: PathBuf,
}

impl StorageManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn marker_path(&self) -> PathBuf {
        self.base_dir.join(LOCAL_STATE_FILE)
    }

    /// Version recorded by the last fully successful run, if any.
    pub async fn read_marker(&self) -> Result<Option<Version>> {
        read_marker(&self.marker_path()).await
    }

    pub async fn write_marker(&self, version: Version) -> Result<()> {
        let path = self.marker_path();
        fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| FetchError::io(format!("unable to create {}", self.base_dir.display()), e))?;
        fs::write(&path, format!("{version}\n"))
            .await
            .map_err(|e| FetchError::io(format!("unable to persist version to {}", path.display()), e))?;
        info!("storage: recorded version {} in {}", version, path.display());
        Ok(())
    }

    pub async fn clear_marker(&self) -> Result<()> {
        let path = self.marker_path();
        remove_if_exists(&path).await?;
        debug!("storage: cleared {}", path.display());
        Ok(())
    }
}

pub async fn read_marker(path: &Path) -> Result<Option<Version>> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(FetchError::io(
                format!("unable to read {}", path.display()),
                err,
            ));
        }
    };
    let token = contents.split_whitespace().next().unwrap_or_default();
    token.parse().map(Some)
}

/// Remove a file, treating "already gone" as success.
pub async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(FetchError::io(
            format!("failed to remove {}", path.display()),
            err,
        )),
    }
}
