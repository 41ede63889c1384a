//! Storage resolution - picks the directory that holds the mirror
//!
//! Removable media is preferred: every immediate subdirectory of a mount root
//! (`/media/<user>`, `/mnt`, ...) is treated as a mounted device, and the mirror
//! lives in a fixed-name directory on the first usable one. When nothing is
//! mounted the resolver degrades to a local fallback directory instead of
//! failing, since backup drives are expected to come and go.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::error::MirrorError;

pub struct StorageResolver {
    mirror_dir_name: String,
}

impl StorageResolver {
    pub fn new(mirror_dir_name: impl Into<String>) -> Self {
        Self {
            mirror_dir_name: mirror_dir_name.into(),
        }
    }

    /// Return an existing directory to mirror into, creating it if needed
    ///
    /// Never fails. Repeated calls with an unchanged mount state return the
    /// same path.
    pub fn resolve(&self, candidate_mount_roots: &[PathBuf], fallback_root: &Path) -> PathBuf {
        if let Some(mirror_root) = self.find_removable(candidate_mount_roots) {
            info!("Using removable storage at {}", mirror_root.display());
            return mirror_root;
        }

        let unavailable = MirrorError::StorageUnavailable {
            candidates: candidate_mount_roots.to_vec(),
        };
        warn!(
            "{}; using local directory {}",
            unavailable,
            fallback_root.display()
        );
        self.ensure_fallback(fallback_root)
    }

    fn find_removable(&self, candidate_mount_roots: &[PathBuf]) -> Option<PathBuf> {
        for root in candidate_mount_roots {
            if !root.is_dir() {
                debug!("Mount root {} does not exist", root.display());
                continue;
            }

            let devices = match list_devices(root) {
                Ok(devices) => devices,
                Err(e) => {
                    warn!("Failed to list mount root {}: {}", root.display(), e);
                    continue;
                }
            };

            for device in devices {
                let mirror_root = device.join(&self.mirror_dir_name);
                match std::fs::create_dir_all(&mirror_root) {
                    Ok(()) => return Some(mirror_root),
                    Err(e) => {
                        warn!(
                            "Skipping device {}: cannot create {}: {}",
                            device.display(),
                            mirror_root.display(),
                            e
                        );
                    }
                }
            }
        }

        None
    }

    fn ensure_fallback(&self, fallback_root: &Path) -> PathBuf {
        match std::fs::create_dir_all(fallback_root) {
            Ok(()) => fallback_root.to_path_buf(),
            Err(e) => {
                let last_resort = std::env::temp_dir().join(&self.mirror_dir_name);
                error!(
                    "Cannot create fallback directory {}: {}; using {}",
                    fallback_root.display(),
                    e,
                    last_resort.display()
                );
                match std::fs::create_dir_all(&last_resort) {
                    Ok(()) => last_resort,
                    Err(_) => std::env::temp_dir(),
                }
            }
        }
    }
}

/// Immediate subdirectories of `root`, sorted by name
fn list_devices(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut devices = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            devices.push(path);
        }
    }
    devices.sort();
    Ok(devices)
}
