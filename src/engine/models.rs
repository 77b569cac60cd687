use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;

use crate::error::FetchError;

const LATEST_RELEASES_URL: &str = "https://factorio.com/api/latest-releases";
const DOWNLOAD_BASE_URL: &str = "https://www.factorio.com/get-download";

/// A `major.minor.patch` release number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for Version {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split('.')
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|e| FetchError::parse(s, format!("component {part:?}: {e}")))
            })
            .collect::<Result<Vec<u32>, _>>()?;

        match parts.as_slice() {
            [major, minor, patch] => Ok(Self::new(*major, *minor, *patch)),
            _ => Err(FetchError::parse(
                s,
                format!("expected 3 components, found {}", parts.len()),
            )),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Distribution line of the game. Each has its own binaries but shares version numbering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum)]
pub enum BuildChannel {
    /// Base game without the expansion.
    Alpha,
    /// Base game bundled with Space Age.
    #[default]
    Expansion,
    Demo,
    /// Dedicated server.
    Headless,
}

impl BuildChannel {
    /// Key in the latest-releases map and path segment of download URLs.
    pub fn as_str(self) -> &'static str {
        match self {
            BuildChannel::Alpha => "alpha",
            BuildChannel::Expansion => "expansion",
            BuildChannel::Demo => "demo",
            BuildChannel::Headless => "headless",
        }
    }
}

impl fmt::Display for BuildChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum)]
pub enum Platform {
    Win64,
    #[value(name = "win64-manual")]
    Win64Manual,
    Osx,
    Linux64,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Win64,
        Platform::Win64Manual,
        Platform::Osx,
        Platform::Linux64,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Win64 => "win64",
            Platform::Win64Manual => "win64-manual",
            Platform::Osx => "osx",
            Platform::Linux64 => "linux64",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Platform::Win64 => "exe",
            Platform::Win64Manual => "zip",
            Platform::Osx => "dmg",
            Platform::Linux64 => "tar.gz",
        }
    }

    /// Name of the published archive, e.g. `linux64.tar.gz`.
    pub fn file_name(self) -> String {
        format!("{}.{}", self.as_str(), self.extension())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RequestedVersion {
    #[default]
    Latest,
    Exact(Version),
}

impl FromStr for RequestedVersion {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            Ok(RequestedVersion::Latest)
        } else {
            s.parse().map(RequestedVersion::Exact)
        }
    }
}

impl fmt::Display for RequestedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestedVersion::Latest => f.write_str("latest"),
            RequestedVersion::Exact(version) => version.fmt(f),
        }
    }
}

/// Vendor endpoints. Overridable so mirrors and tests can stand in for the real API.
#[derive(Clone, Debug)]
pub struct Endpoints {
    pub latest_releases: String,
    pub download_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            latest_releases: LATEST_RELEASES_URL.into(),
            download_base: DOWNLOAD_BASE_URL.into(),
        }
    }
}

impl Endpoints {
    pub fn download_url(&self, version: Version, build: BuildChannel, platform: Platform) -> String {
        format!(
            "{}/{}/{}/{}",
            self.download_base.trim_end_matches('/'),
            version,
            build,
            platform
        )
    }
}

/// Everything the engine needs to know about one run.
#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub build: BuildChannel,
    pub requested: RequestedVersion,
    pub platforms: Vec<Platform>,
    pub output_dir: PathBuf,
    /// Where `.tmp` files are streamed before being moved into `output_dir`.
    pub work_dir: PathBuf,
    pub endpoints: Endpoints,
}

impl FetchConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        Self {
            build: BuildChannel::default(),
            requested: RequestedVersion::default(),
            platforms: Platform::ALL.to_vec(),
            work_dir: output_dir.clone(),
            output_dir,
            endpoints: Endpoints::default(),
        }
    }

    /// Requested platforms with duplicates removed, first occurrence wins.
    pub fn unique_platforms(&self) -> Vec<Platform> {
        let mut seen = Vec::with_capacity(self.platforms.len());
        for platform in &self.platforms {
            if !seen.contains(platform) {
                seen.push(*platform);
            }
        }
        seen
    }
}
