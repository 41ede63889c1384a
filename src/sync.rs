//! Sync Engine - reconciles the remote catalog with the mirror
//!
//! Repositories are processed one at a time in catalog order. Clone versus
//! update is decided purely by whether `<storage root>/<name>` exists; the
//! tracked set is an index of names that have been attempted, not a record of
//! healthy local copies, so a failed repository is retried as an update on
//! every later run.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::credential::Credential;
use crate::discovery::RepoDescriptor;
use crate::error::MirrorError;
use crate::git::{VcsOutcome, VcsProvider};

/// The VCS operation chosen for a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    Clone,
    Update,
}

impl SyncOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::Clone => "clone",
            SyncOperation::Update => "update",
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of synchronizing one catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResult {
    /// Repository was successfully cloned
    Cloned { name: String, path: PathBuf },
    /// Existing copy was successfully updated
    Updated { name: String, path: PathBuf },
    /// Clone or update was attempted and failed
    Failed {
        name: String,
        path: PathBuf,
        operation: SyncOperation,
        error: String,
    },
    /// Entry was not attempted and is not tracked
    Skipped { name: String, reason: String },
}

impl SyncResult {
    pub fn name(&self) -> &str {
        match self {
            SyncResult::Cloned { name, .. }
            | SyncResult::Updated { name, .. }
            | SyncResult::Failed { name, .. }
            | SyncResult::Skipped { name, .. } => name,
        }
    }
}

/// Results from a complete reconciliation
#[derive(Debug, Clone)]
pub struct SyncSummary {
    /// Updated set of tracked repository names, to be persisted
    pub mirrored: BTreeSet<String>,
    pub cloned: usize,
    pub updated: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration: Duration,
    pub results: Vec<SyncResult>,
}

impl SyncSummary {
    fn compile(mirrored: BTreeSet<String>, results: Vec<SyncResult>, duration: Duration) -> Self {
        let mut summary = SyncSummary {
            mirrored,
            cloned: 0,
            updated: 0,
            failed: 0,
            skipped: 0,
            duration,
            results: Vec::new(),
        };

        for result in &results {
            match result {
                SyncResult::Cloned { .. } => summary.cloned += 1,
                SyncResult::Updated { .. } => summary.updated += 1,
                SyncResult::Failed { .. } => summary.failed += 1,
                SyncResult::Skipped { .. } => summary.skipped += 1,
            }
        }

        summary.results = results;
        summary
    }

    /// Number of VCS operations that were issued
    pub fn operations(&self) -> usize {
        self.cloned + self.updated + self.failed
    }
}

/// Drives one VCS operation per catalog entry
pub struct SyncEngine<V> {
    vcs: V,
    operation_timeout: Duration,
}

impl<V: VcsProvider> SyncEngine<V> {
    pub fn new(vcs: V, operation_timeout: Duration) -> Self {
        Self {
            vcs,
            operation_timeout,
        }
    }

    /// Reconcile `catalog` against the tracked set under `storage_root`
    ///
    /// Every attempted repository is added to the returned set whatever the
    /// outcome of its operation. A failure never stops the loop.
    pub async fn reconcile(
        &self,
        catalog: &[RepoDescriptor],
        mirrored: &BTreeSet<String>,
        storage_root: &Path,
        credential: Option<&Credential>,
    ) -> SyncSummary {
        let start_time = Instant::now();

        if catalog.is_empty() {
            info!("No repositories in the catalog, nothing to synchronize");
            return SyncSummary::compile(mirrored.clone(), Vec::new(), start_time.elapsed());
        }

        info!(
            "Synchronizing {} repositories into {}",
            catalog.len(),
            storage_root.display()
        );

        let mut tracked = mirrored.clone();
        let mut results = Vec::with_capacity(catalog.len());

        for repo in catalog {
            let result = self.sync_repository(repo, storage_root, credential).await;
            if !matches!(result, SyncResult::Skipped { .. }) {
                tracked.insert(repo.name.clone());
            }
            results.push(result);
        }

        let summary = SyncSummary::compile(tracked, results, start_time.elapsed());

        info!(
            "Sync completed in {:.2}s: {} cloned, {} updated, {} failed, {} skipped, {} tracked",
            summary.duration.as_secs_f64(),
            summary.cloned,
            summary.updated,
            summary.failed,
            summary.skipped,
            summary.mirrored.len()
        );

        summary
    }

    async fn sync_repository(
        &self,
        repo: &RepoDescriptor,
        storage_root: &Path,
        credential: Option<&Credential>,
    ) -> SyncResult {
        if !is_plain_name(&repo.name) {
            warn!("Skipping repository with unusable name {:?}", repo.name);
            return SyncResult::Skipped {
                name: repo.name.clone(),
                reason: "name is not a single path component".to_string(),
            };
        }

        let target_dir = storage_root.join(&repo.name);
        let operation = if target_dir.exists() {
            SyncOperation::Update
        } else {
            SyncOperation::Clone
        };

        let call = async {
            match operation {
                SyncOperation::Clone => {
                    self.vcs
                        .clone_repo(&repo.remote_url, credential, &target_dir)
                        .await
                }
                SyncOperation::Update => self.vcs.update_repo(&target_dir, credential).await,
            }
        };

        let outcome = match timeout(self.operation_timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => VcsOutcome::failure(format!(
                "Operation timed out after {}s",
                self.operation_timeout.as_secs()
            )),
        };

        if outcome.succeeded {
            info!(
                "{} {} -> {}: {}",
                match operation {
                    SyncOperation::Clone => "Cloned",
                    SyncOperation::Update => "Updated",
                },
                repo.name,
                target_dir.display(),
                outcome.diagnostic
            );
            match operation {
                SyncOperation::Clone => SyncResult::Cloned {
                    name: repo.name.clone(),
                    path: target_dir,
                },
                SyncOperation::Update => SyncResult::Updated {
                    name: repo.name.clone(),
                    path: target_dir,
                },
            }
        } else {
            let error = MirrorError::VcsOperation {
                repo: repo.name.clone(),
                operation: operation.as_str(),
                diagnostic: outcome.diagnostic.clone(),
            };
            warn!("{}", error);
            SyncResult::Failed {
                name: repo.name.clone(),
                path: target_dir,
                operation,
                error: outcome.diagnostic,
            }
        }
    }
}

/// A repository name usable as exactly one directory under the mirror root
fn is_plain_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
