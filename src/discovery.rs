//! Repository discovery abstraction layer
//!
//! [`CatalogProvider`] is the seam to the remote hosting service. The
//! [`CatalogFetcher`] on top of it owns the fallback policy: a rejected
//! credential downgrades to the public listing, and any other failure becomes
//! an empty catalog so the run simply has nothing to do.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::credential::Credential;
use crate::error::MirrorError;

/// One repository as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoDescriptor {
    /// Repository name, also the name of its directory under the mirror root
    pub name: String,

    /// URL to clone from
    pub remote_url: String,

    pub is_private: bool,
}

impl RepoDescriptor {
    pub fn new(name: impl Into<String>, remote_url: impl Into<String>, is_private: bool) -> Self {
        Self {
            name: name.into(),
            remote_url: remote_url.into(),
            is_private,
        }
    }
}

/// Outcome of a single catalog query
#[derive(Debug, Clone)]
pub enum CatalogResponse {
    Ok(Vec<RepoDescriptor>),
    /// The credential was rejected
    Unauthorized,
    Failed(String),
}

/// A remote hosting service that can list an account's repositories
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// List repositories. With a credential the listing belongs to the
    /// credential's own principal and includes private repositories; without
    /// one it is the public listing of `account`.
    async fn list_repositories(
        &self,
        account: &str,
        credential: Option<&Credential>,
    ) -> CatalogResponse;

    /// Provider name for display/logging
    fn provider_name(&self) -> &'static str;
}

#[async_trait]
impl<T: CatalogProvider + ?Sized> CatalogProvider for Arc<T> {
    async fn list_repositories(
        &self,
        account: &str,
        credential: Option<&Credential>,
    ) -> CatalogResponse {
        (**self).list_repositories(account, credential).await
    }

    fn provider_name(&self) -> &'static str {
        (**self).provider_name()
    }
}

/// Fetches the catalog for a run, applying the downgrade and empty-on-failure policy
pub struct CatalogFetcher<P> {
    provider: P,
}

impl<P: CatalogProvider> CatalogFetcher<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Fetch every repository visible for `account_name`
    ///
    /// Never fails: an empty list means there is nothing to do this run.
    pub async fn fetch_all(
        &self,
        account_name: &str,
        credential: Option<&Credential>,
    ) -> Vec<RepoDescriptor> {
        let provider = self.provider.provider_name();
        debug!(
            "Fetching catalog for {} from {} ({})",
            account_name,
            provider,
            if credential.is_some() {
                "authenticated"
            } else {
                "public"
            }
        );

        let mut response = self
            .provider
            .list_repositories(account_name, credential)
            .await;

        if matches!(response, CatalogResponse::Unauthorized) && credential.is_some() {
            warn!(
                "{} rejected the configured token; falling back to public repositories of {}",
                provider, account_name
            );
            response = self.provider.list_repositories(account_name, None).await;
        }

        match response {
            CatalogResponse::Ok(repos) => {
                let repos = dedupe_by_name(repos);
                info!("Fetched {} repositories from {}", repos.len(), provider);
                repos
            }
            CatalogResponse::Unauthorized => {
                warn!(
                    "{}",
                    MirrorError::CatalogFetch(format!("{} denied the public listing", provider))
                );
                Vec::new()
            }
            CatalogResponse::Failed(reason) => {
                warn!("{}", MirrorError::CatalogFetch(reason));
                Vec::new()
            }
        }
    }
}

fn dedupe_by_name(repos: Vec<RepoDescriptor>) -> Vec<RepoDescriptor> {
    let mut seen = HashSet::new();
    repos
        .into_iter()
        .filter(|repo| {
            let first = seen.insert(repo.name.clone());
            if !first {
                warn!(
                    "Ignoring duplicate repository name {} ({})",
                    repo.name, repo.remote_url
                );
            }
            first
        })
        .collect()
}
