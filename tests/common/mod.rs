//! Common test utilities and fakes for repo-mirror tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use repo_mirror::{
    CatalogProvider, CatalogResponse, Credential, MirrorConfig, RepoDescriptor, VcsOutcome,
    VcsProvider,
};

/// A VCS call as seen by [`RecordingVcs`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcsCall {
    Clone {
        remote_url: String,
        target_dir: PathBuf,
        had_credential: bool,
    },
    Update {
        target_dir: PathBuf,
        had_credential: bool,
    },
}

impl VcsCall {
    pub fn is_clone(&self) -> bool {
        matches!(self, VcsCall::Clone { .. })
    }

    pub fn target_dir(&self) -> &Path {
        match self {
            VcsCall::Clone { target_dir, .. } | VcsCall::Update { target_dir, .. } => target_dir,
        }
    }
}

/// Records every call; a successful clone creates the target directory
#[derive(Default)]
pub struct RecordingVcs {
    calls: Mutex<Vec<VcsCall>>,
    failing: HashSet<String>,
}

impl RecordingVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations on repositories with these directory names fail
    pub fn failing_for(names: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: names.iter().map(|name| name.to_string()).collect(),
        }
    }

    pub fn calls(&self) -> Vec<VcsCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clone_count(&self) -> usize {
        self.calls().iter().filter(|call| call.is_clone()).count()
    }

    pub fn update_count(&self) -> usize {
        self.calls().iter().filter(|call| !call.is_clone()).count()
    }

    fn should_fail(&self, target_dir: &Path) -> bool {
        target_dir
            .file_name()
            .map(|name| self.failing.contains(name.to_string_lossy().as_ref()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl VcsProvider for RecordingVcs {
    async fn clone_repo(
        &self,
        remote_url: &str,
        credential: Option<&Credential>,
        target_dir: &Path,
    ) -> VcsOutcome {
        self.calls.lock().unwrap().push(VcsCall::Clone {
            remote_url: remote_url.to_string(),
            target_dir: target_dir.to_path_buf(),
            had_credential: credential.is_some(),
        });

        if self.should_fail(target_dir) {
            return VcsOutcome::failure("fatal: repository not found");
        }
        std::fs::create_dir_all(target_dir).unwrap();
        VcsOutcome::success("cloned")
    }

    async fn update_repo(&self, target_dir: &Path, credential: Option<&Credential>) -> VcsOutcome {
        self.calls.lock().unwrap().push(VcsCall::Update {
            target_dir: target_dir.to_path_buf(),
            had_credential: credential.is_some(),
        });

        if self.should_fail(target_dir) {
            return VcsOutcome::failure("fatal: not a git repository");
        }
        VcsOutcome::success("Already up to date.")
    }
}

/// Answers queries from a queue of scripted responses; the last one keeps answering
#[derive(Default)]
pub struct StaticCatalog {
    responses: Mutex<Vec<CatalogResponse>>,
    calls: Mutex<Vec<(String, bool)>>,
}

impl StaticCatalog {
    /// Always answers with the given repositories
    pub fn with_repos(repos: Vec<RepoDescriptor>) -> Self {
        Self::scripted(vec![CatalogResponse::Ok(repos)])
    }

    pub fn scripted(responses: Vec<CatalogResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Recorded `(account, had_credential)` pairs
    pub fn calls(&self) -> Vec<(String, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogProvider for StaticCatalog {
    async fn list_repositories(
        &self,
        account: &str,
        credential: Option<&Credential>,
    ) -> CatalogResponse {
        self.calls
            .lock()
            .unwrap()
            .push((account.to_string(), credential.is_some()));

        let mut responses = self.responses.lock().unwrap();
        match responses.len() {
            0 => CatalogResponse::Ok(Vec::new()),
            // The last scripted response keeps answering
            1 => responses[0].clone(),
            _ => responses.remove(0),
        }
    }

    fn provider_name(&self) -> &'static str {
        "static"
    }
}

pub fn repo(name: &str) -> RepoDescriptor {
    RepoDescriptor::new(name, format!("https://github.com/octocat/{}.git", name), false)
}

/// A filled-in record pointing at `storage`
pub fn configured(storage: &Path, names: &[&str]) -> MirrorConfig {
    MirrorConfig {
        save_path: storage.to_string_lossy().into_owned(),
        github_name: "octocat".to_string(),
        token: "ghp_test".to_string(),
        existing_files: names.iter().map(|name| name.to_string()).collect(),
    }
}

/// Assertion helpers for test validation
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
