use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::credential::Credential;
use crate::error::{MirrorError, Result};

/// Name of the directory created on a removable device to hold the mirror
pub const MIRROR_DIR_NAME: &str = "github";

/// Durable state of the mirror, persisted as a small JSON record
///
/// Every field falls back to its empty default when missing from the file or
/// set to `null`, so records written by older versions keep their present
/// values.
#[derive(Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct MirrorConfig {
    /// Mirror root; empty until a storage location has been resolved
    #[serde(deserialize_with = "null_as_default")]
    pub save_path: String,

    /// Account whose repositories are mirrored
    #[serde(deserialize_with = "null_as_default")]
    pub github_name: String,

    /// Access token, empty for public-only mirroring
    #[serde(deserialize_with = "null_as_default")]
    pub token: String,

    /// Names of tracked repositories
    #[serde(deserialize_with = "null_as_default")]
    pub existing_files: BTreeSet<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl MirrorConfig {
    /// The resolved mirror root, with `~` expanded. `None` while unresolved.
    pub fn storage_path(&self) -> Option<PathBuf> {
        let raw = self.save_path.trim();
        if raw.is_empty() {
            return None;
        }
        Some(PathBuf::from(shellexpand::tilde(raw).as_ref()))
    }

    pub fn set_storage_path(&mut self, path: &Path) {
        self.save_path = path.to_string_lossy().into_owned();
    }

    pub fn credential(&self) -> Option<Credential> {
        Credential::from_token(&self.token)
    }
}

impl fmt::Debug for MirrorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorConfig")
            .field("save_path", &self.save_path)
            .field("github_name", &self.github_name)
            .field("token", &self.credential())
            .field("existing_files", &self.existing_files)
            .finish()
    }
}

/// Result of [`ConfigStore::load`]
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: MirrorConfig,
    /// No record existed; a default one was just written
    pub created: bool,
    /// The record was unreadable and has been replaced by defaults
    pub reset: bool,
}

/// Reads and writes the [`MirrorConfig`] record at a fixed path
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record, creating or resetting it when needed
    pub fn load(&self) -> Result<LoadedConfig> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "Config file {} does not exist, creating a default one",
                    self.path.display()
                );
                let config = MirrorConfig::default();
                self.save(&config)?;
                return Ok(LoadedConfig {
                    config,
                    created: true,
                    reset: false,
                });
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return self.reset_to_defaults(format!("file is not valid UTF-8: {}", e));
            }
            Err(e) => {
                return Err(MirrorError::Config {
                    path: self.path.clone(),
                    message: format!("failed to read file: {}", e),
                });
            }
        };

        match serde_json::from_str::<MirrorConfig>(&content) {
            Ok(config) => {
                debug!(
                    "Loaded config from {} ({} tracked repositories)",
                    self.path.display(),
                    config.existing_files.len()
                );
                Ok(LoadedConfig {
                    config,
                    created: false,
                    reset: false,
                })
            }
            Err(e) => self.reset_to_defaults(e.to_string()),
        }
    }

    fn reset_to_defaults(&self, reason: String) -> Result<LoadedConfig> {
        let error = MirrorError::Config {
            path: self.path.clone(),
            message: reason,
        };
        warn!("{}; resetting to defaults, previous content is discarded", error);

        let config = MirrorConfig::default();
        self.save(&config)?;

        Ok(LoadedConfig {
            config,
            created: false,
            reset: true,
        })
    }

    /// Write the full record, replacing the previous file atomically
    pub fn save(&self, config: &MirrorConfig) -> Result<()> {
        let persist_error = |source: std::io::Error| MirrorError::Persist {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(persist_error)?;
            }
        }

        let mut content = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut content, formatter);
        config
            .serialize(&mut serializer)
            .map_err(|e| persist_error(e.into()))?;
        content.push(b'\n');

        let tmp_path = self.temp_path();
        let written = File::create(&tmp_path).and_then(|mut file| {
            file.write_all(&content)?;
            file.sync_all()
        });
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(persist_error(e));
        }
        if let Err(e) = std::fs::rename(&tmp_path, &self.path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(persist_error(e));
        }

        debug!("Saved config to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut file_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "config.json".into());
        file_name.push(".tmp");
        self.path.with_file_name(file_name)
    }
}

/// Per-run settings that are not persisted, normally taken from the command line
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Directories whose subdirectories are treated as mounted devices, in priority order
    pub mount_roots: Vec<PathBuf>,

    /// Mirror root used when no removable device is usable
    pub fallback_root: PathBuf,

    /// Directory created on the selected device to hold the mirror
    pub mirror_dir_name: String,

    /// Base URL of the GitHub REST API
    pub api_url: String,

    /// Upper bound for a single clone or update
    pub operation_timeout: Duration,
}

// Default value functions
fn default_mount_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("/media/Raspi"), PathBuf::from("/mnt")]
}

fn default_fallback_root() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("backups")
}

pub fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            mount_roots: default_mount_roots(),
            fallback_root: default_fallback_root(),
            mirror_dir_name: MIRROR_DIR_NAME.to_string(),
            api_url: default_api_url(),
            operation_timeout: default_timeout(),
        }
    }
}
