//! Locating and installing solc releases.
//!
//! Releases are fetched from the official binary mirror, verified against the
//! SHA-256 published in the mirror's `list.json`, and cached per version.

use std::{
    collections::BTreeMap,
    fs::{self, File},
    path::{Path, PathBuf},
};

use fs2::FileExt;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::DeployError;

/// Root of the official solc binary mirror.
pub const DEFAULT_MIRROR: &str = "https://binaries.soliditylang.org";

/// One entry of the mirror's `list.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolcBuild {
    pub path: String,
    pub version: String,
    #[serde(default)]
    pub long_version: String,
    /// `0x`-prefixed hex digest of the binary.
    pub sha256: String,
}

/// The mirror's `list.json` document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolcReleaseList {
    pub builds: Vec<SolcBuild>,
    /// version → file name.
    #[serde(default)]
    pub releases: BTreeMap<String, String>,
}

impl SolcReleaseList {
    /// Find the release build for `version`.
    pub fn find(&self, version: &str) -> Option<&SolcBuild> {
        let path = self.releases.get(version)?;
        self.builds.iter().find(|b| &b.path == path)
    }
}

/// Mirror directory name for the host platform.
pub fn platform() -> Option<&'static str> {
    if cfg!(all(target_os = "linux", target_arch = "x86_64")) {
        Some("linux-amd64")
    } else if cfg!(target_os = "macos") {
        Some("macosx-amd64")
    } else if cfg!(all(target_os = "windows", target_arch = "x86_64")) {
        Some("windows-amd64")
    } else {
        None
    }
}

/// Take the exclusive install lock in `dir`, waiting on a blocking thread.
async fn acquire_install_lock(dir: &Path) -> Result<File, DeployError> {
    let path = dir.join(".lock");
    tokio::task::spawn_blocking(move || {
        let lock = File::create(path)?;
        lock.lock_exclusive()?;
        Ok::<_, DeployError>(lock)
    })
    .await
    .map_err(|e| DeployError::Io(std::io::Error::other(e)))?
}

/// Validate a plain `major.minor.patch` version string.
pub fn validate_version(version: &str) -> Result<(), DeployError> {
    let parts: Vec<&str> = version.split('.').collect();
    let well_formed = parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));

    if !well_formed {
        return Err(DeployError::VersionUnavailable {
            version: version.to_string(),
            reason: "expected a release version like 0.8.24".to_string(),
        });
    }

    Ok(())
}

/// Hex SHA-256 of `bytes`, without prefix.
fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Check a downloaded binary against the digest published in `list.json`.
pub fn verify_checksum(bytes: &[u8], expected: &str) -> bool {
    let expected = expected.trim_start_matches("0x").to_lowercase();
    sha256_hex(bytes) == expected
}

/// Installs solc releases into a per-version cache directory.
#[derive(Debug, Clone)]
pub struct SolcInstaller {
    root: PathBuf,
    mirror: String,
}

impl SolcInstaller {
    /// Installer rooted at `<data dir>/soldeploy/solc`.
    pub fn new() -> Result<Self, DeployError> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            DeployError::Config("could not determine the user data directory".to_string())
        })?;

        Ok(Self::with_root(data_dir.join("soldeploy").join("solc")))
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mirror: DEFAULT_MIRROR.to_string(),
        }
    }

    /// Where the binary for `version` lives once installed.
    pub fn binary_path(&self, version: &str) -> PathBuf {
        let name = if cfg!(windows) { "solc.exe" } else { "solc" };
        self.root.join(version).join(name)
    }

    /// Return the cached binary for `version`, or `None` if it is not installed.
    pub fn cached(&self, version: &str) -> Option<PathBuf> {
        let path = self.binary_path(version);
        path.is_file().then_some(path)
    }

    /// Return the binary for `version`, downloading it if needed.
    pub async fn ensure(&self, version: &str) -> Result<PathBuf, DeployError> {
        validate_version(version)?;

        if let Some(path) = self.cached(version) {
            tracing::debug!(version, path = %path.display(), "Using cached solc");
            return Ok(path);
        }

        let platform = platform().ok_or_else(|| DeployError::VersionUnavailable {
            version: version.to_string(),
            reason: "no prebuilt solc for this platform".to_string(),
        })?;

        let version_dir = self.root.join(version);
        fs::create_dir_all(&version_dir)?;

        // Serialize concurrent installs of the same version.
        let lock = acquire_install_lock(&version_dir).await?;

        let result = self.install(platform, version).await;

        if let Err(e) = FileExt::unlock(&lock) {
            tracing::warn!(error = %e, "Failed to release solc install lock");
        }

        result
    }

    async fn install(&self, platform: &str, version: &str) -> Result<PathBuf, DeployError> {
        // Another process may have finished while we waited for the lock.
        if let Some(path) = self.cached(version) {
            return Ok(path);
        }

        let unavailable = |reason: String| DeployError::VersionUnavailable {
            version: version.to_string(),
            reason,
        };

        let client = reqwest::Client::new();
        let list_url = format!("{}/{}/list.json", self.mirror, platform);

        tracing::info!(version, url = %list_url, "Fetching solc release list...");

        let list: SolcReleaseList = client
            .get(&list_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unavailable(format!("failed to fetch {list_url}: {e}")))?
            .json()
            .await
            .map_err(|e| unavailable(format!("failed to parse {list_url}: {e}")))?;

        let build = list
            .find(version)
            .ok_or_else(|| unavailable(format!("not listed for {platform}")))?;

        let binary_url = format!("{}/{}/{}", self.mirror, platform, build.path);
        tracing::info!(version, long_version = %build.long_version, url = %binary_url, "Downloading solc...");

        let bytes = client
            .get(&binary_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unavailable(format!("failed to download {binary_url}: {e}")))?
            .bytes()
            .await
            .map_err(|e| unavailable(format!("failed to read {binary_url}: {e}")))?;

        if !verify_checksum(&bytes, &build.sha256) {
            return Err(unavailable(format!(
                "checksum mismatch for {} (expected {})",
                build.path, build.sha256
            )));
        }

        let path = self.binary_path(version);
        let partial = path.with_extension("partial");
        fs::write(&partial, &bytes)?;
        make_executable(&partial)?;
        fs::rename(&partial, &path)?;

        tracing::info!(version, path = %path.display(), "solc installed");

        Ok(path)
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
