use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::credential::Credential;
use crate::discovery::{CatalogProvider, CatalogResponse, RepoDescriptor};

/// Page size requested from the listing endpoints (the API maximum)
const PER_PAGE: usize = 100;

/// Hard stop for pagination
const MAX_PAGES: u32 = 100;

/// GitHub REST API catalog provider
pub struct GitHubCatalog {
    client: reqwest::Client,
    api_url: String,
}

/// The subset of the repository payload the mirror needs
#[derive(Debug, Deserialize)]
struct ApiRepository {
    name: String,
    #[serde(default)]
    private: bool,
    clone_url: Option<String>,
    html_url: Option<String>,
}

impl ApiRepository {
    fn into_descriptor(self) -> Option<RepoDescriptor> {
        match self.clone_url.or(self.html_url) {
            Some(url) => Some(RepoDescriptor::new(self.name, url, self.private)),
            None => {
                warn!("Repository {} has no clone URL, ignoring it", self.name);
                None
            }
        }
    }
}

impl GitHubCatalog {
    /// Create a provider talking to `api_url` (normally `https://api.github.com`)
    pub fn new(api_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("repo-mirror/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn listing_url(&self, account: &str, authenticated: bool) -> String {
        if authenticated {
            format!("{}/user/repos", self.api_url)
        } else {
            format!("{}/users/{}/repos", self.api_url, account)
        }
    }
}

#[async_trait]
impl CatalogProvider for GitHubCatalog {
    async fn list_repositories(
        &self,
        account: &str,
        credential: Option<&Credential>,
    ) -> CatalogResponse {
        if credential.is_none() && account.trim().is_empty() {
            return CatalogResponse::Failed(
                "no GitHub account configured and no token to list with".to_string(),
            );
        }

        let url = self.listing_url(account.trim(), credential.is_some());
        let mut repositories = Vec::new();

        for page in 1..=MAX_PAGES {
            debug!("Fetching {} page {}", url, page);

            let mut request = self
                .client
                .get(&url)
                .header(ACCEPT, "application/vnd.github+json")
                .query(&[("per_page", PER_PAGE as u32), ("page", page)]);
            if let Some(credential) = credential {
                request = request.header(AUTHORIZATION, format!("token {}", credential.expose()));
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => return CatalogResponse::Failed(format!("request to {} failed: {}", url, e)),
            };

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                return CatalogResponse::Unauthorized;
            }
            if !status.is_success() {
                return CatalogResponse::Failed(format!("{} returned HTTP {}", url, status));
            }

            let items: Vec<ApiRepository> = match response.json().await {
                Ok(items) => items,
                Err(e) => {
                    return CatalogResponse::Failed(format!(
                        "unexpected response body from {}: {}",
                        url, e
                    ))
                }
            };

            let page_len = items.len();
            repositories.extend(items.into_iter().filter_map(ApiRepository::into_descriptor));

            if page_len < PER_PAGE {
                return CatalogResponse::Ok(repositories);
            }
        }

        warn!("Reached maximum pagination limit ({} pages)", MAX_PAGES);
        CatalogResponse::Ok(repositories)
    }

    fn provider_name(&self) -> &'static str {
        "GitHub"
    }
}
