use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

use crate::credential::Credential;

/// Environment variable the inline credential helper reads the token from
const TOKEN_ENV: &str = "REPO_MIRROR_TOKEN";

/// Answers git's `get` requests with the token from [`TOKEN_ENV`], so the token
/// is kept out of argv and out of the clone's `.git/config`.
const CREDENTIAL_HELPER: &str = "!f() { test \"$1\" = get || return 0; \
     echo username=x-access-token; echo \"password=$REPO_MIRROR_TOKEN\"; }; f";

/// Result of a single clone or update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcsOutcome {
    pub succeeded: bool,
    pub diagnostic: String,
}

impl VcsOutcome {
    pub fn success(diagnostic: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            diagnostic: diagnostic.into(),
        }
    }

    pub fn failure(diagnostic: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Performs clone and update of a single repository
///
/// Implementations report failures in the returned [`VcsOutcome`] and never
/// panic or error out.
#[async_trait]
pub trait VcsProvider: Send + Sync {
    async fn clone_repo(
        &self,
        remote_url: &str,
        credential: Option<&Credential>,
        target_dir: &Path,
    ) -> VcsOutcome;

    async fn update_repo(&self, target_dir: &Path, credential: Option<&Credential>)
        -> VcsOutcome;
}

#[async_trait]
impl<T: VcsProvider + ?Sized> VcsProvider for Arc<T> {
    async fn clone_repo(
        &self,
        remote_url: &str,
        credential: Option<&Credential>,
        target_dir: &Path,
    ) -> VcsOutcome {
        (**self).clone_repo(remote_url, credential, target_dir).await
    }

    async fn update_repo(
        &self,
        target_dir: &Path,
        credential: Option<&Credential>,
    ) -> VcsOutcome {
        (**self).update_repo(target_dir, credential).await
    }
}

/// [`VcsProvider`] backed by the `git` command line
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    fn git_command(&self, credential: Option<&Credential>) -> AsyncCommand {
        let mut command = AsyncCommand::new("git");
        command
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(credential) = credential {
            command
                .env(TOKEN_ENV, credential.expose())
                .args(["-c", "credential.helper="])
                .arg("-c")
                .arg(format!("credential.helper={}", CREDENTIAL_HELPER));
        }

        command
    }

    async fn run(
        &self,
        mut command: AsyncCommand,
        operation: &str,
        credential: Option<&Credential>,
    ) -> VcsOutcome {
        let output = match command.output().await {
            Ok(output) => output,
            Err(e) => return VcsOutcome::failure(format!("Failed to execute git {}: {}", operation, e)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let outcome = if output.status.success() {
            let message = first_non_empty(&[stdout.as_ref(), stderr.as_ref()]).unwrap_or("done");
            VcsOutcome::success(message)
        } else {
            let message = match first_non_empty(&[stderr.as_ref(), stdout.as_ref()]) {
                Some(message) => format!("Git {} failed: {}", operation, message),
                None => format!("Git {} failed with {}", operation, output.status),
            };
            VcsOutcome::failure(message)
        };

        VcsOutcome {
            diagnostic: scrub(outcome.diagnostic, credential),
            ..outcome
        }
    }
}

#[async_trait]
impl VcsProvider for GitCli {
    async fn clone_repo(
        &self,
        remote_url: &str,
        credential: Option<&Credential>,
        target_dir: &Path,
    ) -> VcsOutcome {
        if let Some(parent) = target_dir.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return VcsOutcome::failure(format!(
                    "Failed to create parent directory {}: {}",
                    parent.display(),
                    e
                ));
            }
        }

        debug!("git clone {} {}", remote_url, target_dir.display());

        let mut command = self.git_command(credential);
        command.arg("clone").arg(remote_url).arg(target_dir);

        self.run(command, "clone", credential).await
    }

    async fn update_repo(
        &self,
        target_dir: &Path,
        credential: Option<&Credential>,
    ) -> VcsOutcome {
        debug!("git pull in {}", target_dir.display());

        let mut command = self.git_command(credential);
        command
            .arg("-C")
            .arg(target_dir)
            .args(["pull", "--ff-only"]);

        self.run(command, "pull", credential).await
    }
}

/// Last line of the first non-blank stream; git puts the useful part at the end
fn first_non_empty<'a>(streams: &[&'a str]) -> Option<&'a str> {
    streams
        .iter()
        .copied()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .and_then(|s| s.lines().map(str::trim).filter(|l| !l.is_empty()).last())
}

fn scrub(diagnostic: String, credential: Option<&Credential>) -> String {
    match credential {
        Some(credential) => diagnostic.replace(credential.expose(), "***"),
        None => diagnostic,
    }
}
