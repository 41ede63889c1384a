//! repo-mirror - keeps a local mirror of every repository of a GitHub account
//!
//! Each invocation performs one pass: load the persisted config, pick a mirror
//! root (a removable device when one is mounted, a local fallback otherwise),
//! list the account's repositories, clone the missing ones and update the rest,
//! then persist the tracked set. Scheduling is left to cron or a systemd timer.
//!
//! ## Modules
//!
//! - [`config`]: persisted record and per-run settings
//! - [`storage`]: mirror root selection
//! - [`discovery`]: catalog fetching with the unauthenticated fallback
//! - [`github`]: GitHub REST catalog provider
//! - [`git`]: git command line VCS provider
//! - [`sync`]: per-repository reconciliation
//! - [`orchestrator`]: the single-pass run state machine
//! - [`logging`]: stderr and rotating file logging

pub mod config;
pub mod credential;
pub mod discovery;
pub mod error;
pub mod git;
pub mod github;
pub mod logging;
pub mod orchestrator;
pub mod storage;
pub mod sync;

pub use config::{ConfigStore, MirrorConfig, RunSettings};
pub use credential::Credential;
pub use discovery::{CatalogFetcher, CatalogProvider, CatalogResponse, RepoDescriptor};
pub use error::{MirrorError, Result};
pub use git::{GitCli, VcsOutcome, VcsProvider};
pub use github::GitHubCatalog;
pub use orchestrator::{Orchestrator, RunOutcome, RunReport, RunState};
pub use storage::StorageResolver;
pub use sync::{SyncEngine, SyncOperation, SyncResult, SyncSummary};
