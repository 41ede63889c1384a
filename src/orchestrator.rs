//! Orchestrator - one complete mirror pass
//!
//! A run walks `Start → ConfigLoaded → StorageResolved → CatalogFetched →
//! Reconciled → ConfigPersisted → Done` exactly once. Nothing is retried within
//! a run; the external scheduler provides re-runs. Failures are turned into a
//! [`RunOutcome`] at this boundary instead of propagating.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigStore, MirrorConfig, RunSettings};
use crate::discovery::{CatalogFetcher, CatalogProvider, RepoDescriptor};
use crate::git::VcsProvider;
use crate::storage::StorageResolver;
use crate::sync::{SyncEngine, SyncSummary};

/// Progress marker of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Start,
    ConfigLoaded,
    StorageResolved,
    CatalogFetched,
    Reconciled,
    ConfigPersisted,
    Done,
}

/// What a completed run reports
#[derive(Debug, Clone)]
pub struct RunReport {
    pub storage_root: PathBuf,
    pub catalog_size: usize,
    pub summary: SyncSummary,
}

/// Final result of [`Orchestrator::run`]
#[derive(Debug)]
pub enum RunOutcome {
    Success(RunReport),
    /// A fresh config file was written; the operator has to fill it in first
    SetupRequired { config_path: PathBuf },
    Failure {
        reason: String,
        /// Last state reached before the failure
        reached: RunState,
    },
}

impl RunOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failure { .. })
    }
}

pub struct Orchestrator<C, V> {
    store: ConfigStore,
    settings: RunSettings,
    resolver: StorageResolver,
    fetcher: CatalogFetcher<C>,
    engine: SyncEngine<V>,
    state: RunState,
}

impl<C: CatalogProvider, V: VcsProvider> Orchestrator<C, V> {
    pub fn new(store: ConfigStore, settings: RunSettings, catalog: C, vcs: V) -> Self {
        let resolver = StorageResolver::new(settings.mirror_dir_name.clone());
        let engine = SyncEngine::new(vcs, settings.operation_timeout);

        Self {
            store,
            settings,
            resolver,
            fetcher: CatalogFetcher::new(catalog),
            engine,
            state: RunState::Start,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Perform one mirror pass. Always ends in [`RunState::Done`].
    pub async fn run(&mut self) -> RunOutcome {
        self.state = RunState::Start;
        info!("Starting mirror run with config {}", self.store.path().display());

        let outcome = match self.run_states().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Mirror run failed after {:?}: {:#}", self.state, e);
                RunOutcome::Failure {
                    reason: format!("{:#}", e),
                    reached: self.state,
                }
            }
        };

        self.advance(RunState::Done);
        outcome
    }

    async fn run_states(&mut self) -> Result<RunOutcome> {
        let loaded = self
            .store
            .load()
            .context("Failed to load configuration")?;
        let mut config = loaded.config;
        self.advance(RunState::ConfigLoaded);

        if loaded.created {
            warn!(
                "Created {}; fill in github_name and token, then run again",
                self.store.path().display()
            );
            return Ok(RunOutcome::SetupRequired {
                config_path: self.store.path().to_path_buf(),
            });
        }

        let storage_root = self.ensure_storage(&mut config)?;
        self.advance(RunState::StorageResolved);

        let credential = config.credential();
        let catalog = self
            .fetcher
            .fetch_all(&config.github_name, credential.as_ref())
            .await;
        self.advance(RunState::CatalogFetched);

        let summary = self
            .engine
            .reconcile(
                &catalog,
                &config.existing_files,
                &storage_root,
                credential.as_ref(),
            )
            .await;
        config.existing_files = summary.mirrored.clone();
        self.advance(RunState::Reconciled);

        self.store
            .save(&config)
            .context("Failed to persist configuration at end of run")?;
        self.advance(RunState::ConfigPersisted);

        Ok(RunOutcome::Success(RunReport {
            storage_root,
            catalog_size: catalog.len(),
            summary,
        }))
    }

    /// Resolve the mirror root when unset, otherwise make sure it exists
    fn ensure_storage(&self, config: &mut MirrorConfig) -> Result<PathBuf> {
        if let Some(path) = config.storage_path() {
            if !path.is_dir() {
                warn!("Storage path {} is missing, creating it", path.display());
                std::fs::create_dir_all(&path)
                    .with_context(|| format!("Failed to create storage path {}", path.display()))?;
            }
            debug!("Using configured storage path {}", path.display());
            return Ok(path);
        }

        let path = self
            .resolver
            .resolve(&self.settings.mount_roots, &self.settings.fallback_root);
        config.set_storage_path(&path);

        match self.store.save(config) {
            Ok(()) => info!("Storage path set to {}", path.display()),
            Err(e) => warn!("{}; it will be saved again at the end of the run", e),
        }

        Ok(path)
    }

    /// Load the config and fetch the catalog without touching the mirror
    pub async fn preview_catalog(&self) -> Result<Vec<RepoDescriptor>> {
        let loaded = self
            .store
            .load()
            .context("Failed to load configuration")?;
        if loaded.created {
            bail!(
                "Created {}; fill in github_name and token first",
                self.store.path().display()
            );
        }
        let config = loaded.config;
        let credential = config.credential();

        Ok(self
            .fetcher
            .fetch_all(&config.github_name, credential.as_ref())
            .await)
    }

    fn advance(&mut self, state: RunState) {
        debug!("Run state {:?} -> {:?}", self.state, state);
        self.state = state;
    }
}
