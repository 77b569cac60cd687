use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::engine::models::{BuildChannel, Endpoints, Platform, Version};
use crate::env::Credentials;
use crate::error::{FetchError, Result};
use crate::storage::remove_if_exists;
use crate::ui::{ProgressEntry, ProgressSink};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const WRITE_CHUNK_BYTES: usize = 160 * 1024;

#[derive(Debug, Deserialize)]
struct LatestReleases {
    stable: HashMap<String, String>,
}

/// One platform archive to fetch.
#[derive(Clone, Copy, Debug)]
pub struct ArtifactRequest<'a> {
    pub platform: Platform,
    pub build: BuildChannel,
    pub version: Version,
    pub endpoints: &'a Endpoints,
    pub output_dir: &'a Path,
    pub work_dir: &'a Path,
}

impl ArtifactRequest<'_> {
    pub fn final_path(&self) -> PathBuf {
        self.output_dir.join(self.platform.file_name())
    }

    pub fn temp_path(&self) -> PathBuf {
        self.work_dir
            .join(format!("{}.tmp", self.platform.file_name()))
    }

    fn describe(&self) -> String {
        format!("{}/{}/{}", self.version, self.build, self.platform)
    }
}

#[derive(Clone, Debug)]
pub struct NetworkClient {
    client: Client,
}

impl Default for NetworkClient {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkClient {
    pub fn new() -> Self {
        // No overall timeout: archives are large and the transfer can legitimately take a while.
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("factorio-fetch/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|err| {
                warn!("network client: falling back to default HTTP client configuration ({err})");
                Client::new()
            });
        Self { client }
    }

    /// Ask the release API which stable version `build` is currently at.
    pub async fn resolve_latest(&self, endpoints: &Endpoints, build: BuildChannel) -> Result<Version> {
        let url = &endpoints.latest_releases;
        debug!("resolve_latest: GET {url}");
        let releases: LatestReleases = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::remote(format!("request to {url} failed: {e}")))?
            .error_for_status()
            .map_err(|e| FetchError::remote(format!("bad status from {url}: {e}")))?
            .json()
            .await
            .map_err(|e| FetchError::remote(format!("unexpected response body: {e}")))?;

        let raw = releases.stable.get(build.as_str()).ok_or_else(|| {
            FetchError::remote(format!("no stable release listed for build {build}"))
        })?;
        let version = raw.trim().parse()?;
        info!("resolve_latest: stable {build} is {version}");
        Ok(version)
    }

    /// Stream one archive into its temp file, then move it over the final path.
    pub async fn download_artifact(
        &self,
        request: &ArtifactRequest<'_>,
        credentials: &Credentials,
        progress: &dyn ProgressSink,
    ) -> Result<PathBuf> {
        let platform = request.platform;
        let save_path = request.final_path();
        let temp_path = request.temp_path();
        remove_if_exists(&temp_path).await?;

        let url = request
            .endpoints
            .download_url(request.version, request.build, platform);
        debug!("download: GET {url} -> {}", temp_path.display());
        let response = self
            .client
            .get(&url)
            .query(&[
                ("username", credentials.username()),
                ("token", credentials.token()),
            ])
            .send()
            .await
            .map_err(|e| transfer_error(platform, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::DownloadStatus { platform, status });
        }

        let total = response.content_length().unwrap_or(0);
        let entry = ProgressEntry::start(
            progress,
            format!("Downloading {}", request.describe()),
            total,
        );

        let file = File::create(&temp_path)
            .await
            .map_err(|e| FetchError::io(format!("failed to create {}", temp_path.display()), e))?;
        let mut writer = BufWriter::with_capacity(WRITE_CHUNK_BYTES, file);
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transfer_error(platform, e))?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| FetchError::io(format!("write error on {}", temp_path.display()), e))?;
            downloaded += chunk.len() as u64;
            entry.advance(chunk.len() as u64);
        }

        writer
            .flush()
            .await
            .map_err(|e| FetchError::io(format!("flush error on {}", temp_path.display()), e))?;
        drop(writer);
        debug!("download: {platform} received {downloaded} of {total} bytes");

        remove_if_exists(&save_path).await?;
        publish(&temp_path, &save_path).await?;

        entry.finish(&format!(
            "Saved {} to {}",
            request.describe(),
            save_path.display()
        ));
        info!("download: saved {}", save_path.display());
        Ok(save_path)
    }
}

/// The request URL carries the account token in its query string, so it is dropped from the error.
fn transfer_error(platform: Platform, source: reqwest::Error) -> FetchError {
    FetchError::Transfer {
        platform,
        source: source.without_url(),
    }
}

/// Rename `from` onto `to`. When they sit on different filesystems the data is
/// copied next to `to` first so the final step is still a rename.
async fn publish(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::CrossesDevices => {
            let staged = to.with_file_name(format!(
                "{}.tmp",
                to.file_name().unwrap_or_default().to_string_lossy()
            ));
            debug!(
                "publish: {} is on another device, staging via {}",
                from.display(),
                staged.display()
            );
            fs::copy(from, &staged)
                .await
                .map_err(|e| FetchError::io(format!("failed to copy into {}", staged.display()), e))?;
            fs::rename(&staged, to)
                .await
                .map_err(|e| FetchError::io(format!("failed to move into {}", to.display()), e))?;
            remove_if_exists(from).await
        }
        Err(err) => Err(FetchError::io(
            format!("failed to move {} to {}", from.display(), to.display()),
            err,
        )),
    }
}
