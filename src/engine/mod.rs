use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::fs;
use tokio::task::JoinSet;

use crate::engine::models::{FetchConfig, Platform, RequestedVersion, Version};
use crate::engine::state::Outcome;
use crate::env::Credentials;
use crate::error::{FetchError, Result};
use crate::networking::{ArtifactRequest, NetworkClient};
use crate::storage::{StorageManager, remove_if_exists};
use crate::ui::ProgressSink;

pub mod models;
pub mod state;

enum Decision {
    Stop(Outcome),
    Download(Version),
}

/// Read-only state every download task shares.
struct DownloadContext {
    network: NetworkClient,
    credentials: Credentials,
    config: FetchConfig,
    version: Version,
    progress: Arc<dyn ProgressSink>,
}

impl DownloadContext {
    fn request(&self, platform: Platform) -> ArtifactRequest<'_> {
        ArtifactRequest {
            platform,
            build: self.config.build,
            version: self.version,
            endpoints: &self.config.endpoints,
            output_dir: &self.config.output_dir,
            work_dir: &self.config.work_dir,
        }
    }

    async fn download(&self, platform: Platform) -> Result<PathBuf> {
        self.network
            .download_artifact(&self.request(platform), &self.credentials, self.progress.as_ref())
            .await
    }
}

pub struct FetchEngine {
    config: FetchConfig,
    network: NetworkClient,
    storage: StorageManager,
    credentials: Credentials,
    progress: Arc<dyn ProgressSink>,
}

impl FetchEngine {
    pub fn new(config: FetchConfig, credentials: Credentials, progress: Arc<dyn ProgressSink>) -> Self {
        let storage = StorageManager::new(&config.output_dir);
        Self {
            config,
            network: NetworkClient::new(),
            storage,
            credentials,
            progress,
        }
    }

    /// Bring the output directory up to the requested version.
    pub async fn run(&self) -> Result<Outcome> {
        let downloaded = self.storage.read_marker().await?;
        debug!(
            "fetch: recorded version {:?}, requested {}",
            downloaded.map(|v| v.to_string()),
            self.config.requested
        );

        let version = match self.reconcile(downloaded).await? {
            Decision::Stop(outcome) => {
                info!("fetch: {}", outcome.message());
                return Ok(outcome);
            }
            Decision::Download(version) => version,
        };

        // Without a marker a crash mid-download reads as "unknown state" on the next run.
        self.storage.clear_marker().await?;
        self.prepare_dirs().await?;

        let artifacts = self.download_all(version).await?;
        self.storage.write_marker(version).await?;
        Ok(Outcome::Downloaded { version, artifacts })
    }

    async fn reconcile(&self, downloaded: Option<Version>) -> Result<Decision> {
        let build = self.config.build;
        let Some(downloaded) = downloaded else {
            // Either a first run or an interrupted one; both mean download.
            let version = match self.config.requested {
                RequestedVersion::Latest => {
                    self.network
                        .resolve_latest(&self.config.endpoints, build)
                        .await?
                }
                RequestedVersion::Exact(version) => version,
            };
            return Ok(Decision::Download(version));
        };

        match self.config.requested {
            RequestedVersion::Latest => {
                let latest = self
                    .network
                    .resolve_latest(&self.config.endpoints, build)
                    .await?;
                if latest == downloaded {
                    Ok(Decision::Stop(Outcome::UpToDate { version: latest }))
                } else if latest < downloaded {
                    warn!("fetch: remote latest {latest} is older than recorded {downloaded}");
                    Ok(Decision::Stop(Outcome::Anomaly { latest, downloaded }))
                } else {
                    info!("fetch: updating {downloaded} -> {latest}");
                    Ok(Decision::Download(latest))
                }
            }
            RequestedVersion::Exact(version) if version == downloaded => {
                Ok(Decision::Stop(Outcome::AlreadySatisfied { version }))
            }
            // An explicit request is trusted even when it goes backwards.
            RequestedVersion::Exact(version) => {
                info!("fetch: switching {downloaded} -> {version}");
                Ok(Decision::Download(version))
            }
        }
    }

    async fn prepare_dirs(&self) -> Result<()> {
        for dir in [&self.config.output_dir, &self.config.work_dir] {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| FetchError::io(format!("unable to create {}", dir.display()), e))?;
        }
        Ok(())
    }

    /// Run one task per platform and wait for all of them. The first failure
    /// cancels whatever is still in flight and is returned once every task is accounted for.
    async fn download_all(&self, version: Version) -> Result<Vec<PathBuf>> {
        let platforms = self.config.unique_platforms();
        let context = Arc::new(DownloadContext {
            network: self.network.clone(),
            credentials: self.credentials.clone(),
            config: self.config.clone(),
            version,
            progress: Arc::clone(&self.progress),
        });

        info!(
            "fetch: downloading {} {} for {} platform(s)",
            self.config.build,
            version,
            platforms.len()
        );
        let mut tasks = JoinSet::new();
        let mut task_platforms = HashMap::new();
        for &platform in &platforms {
            let context = Arc::clone(&context);
            let handle = tasks.spawn(async move { (platform, context.download(platform).await) });
            task_platforms.insert(handle.id(), platform);
        }

        let mut saved: HashMap<Platform, PathBuf> = HashMap::new();
        let mut first_error: Option<FetchError> = None;
        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok((platform, Ok(path))) => {
                    saved.insert(platform, path);
                    continue;
                }
                Ok((platform, Err(err))) => {
                    error!("fetch: {platform} failed: {err}");
                    err
                }
                Err(join_err) if join_err.is_cancelled() => continue,
                Err(join_err) => FetchError::TaskFailed {
                    platform: task_platforms.get(&join_err.id()).copied(),
                    reason: join_err.to_string(),
                },
            };
            if first_error.is_none() {
                tasks.abort_all();
                first_error = Some(failure);
            }
        }

        if let Some(err) = first_error {
            for platform in platforms.iter().filter(|p| !saved.contains_key(*p)) {
                discard_temp(&context.request(*platform).temp_path()).await;
            }
            return Err(err);
        }

        Ok(platforms
            .iter()
            .filter_map(|platform| saved.remove(platform))
            .collect())
    }
}

async fn discard_temp(path: &Path) {
    if let Err(err) = remove_if_exists(path).await {
        warn!("fetch: could not remove {}: {err}", path.display());
    }
}
