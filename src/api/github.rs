//! Source-hosting content API client
//!
//! Lists and downloads files from a repository without a local checkout.
//! Because the hosting API answers 404 for both a missing repository and a
//! private one the token cannot see, those cases collapse into a single
//! [`ApiError::AuthOrNotFound`], distinct from generic network failures.

use super::{ApiError, REQUEST_TIMEOUT, USER_AGENT};
use log::debug;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;

/// Production API URL
const GITHUB_API_URL: &str = "https://api.github.com";

const SERVICE: &str = "github";

#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
}

/// Client for the repository content API
pub struct GitHubClient {
    http: Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubClient {
    /// Create a client against the production API URL
    pub fn new(token: Option<String>) -> Result<Self, ApiError> {
        Self::with_url(GITHUB_API_URL, token)
    }

    /// Create a client with a custom API URL
    pub fn with_url(
        api_url: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            token,
        })
    }

    /// The configured API URL
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn contents_url(&self, repository: &str, path: &str) -> String {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            format!("{}/repos/{}/contents", self.api_url, repository)
        } else {
            format!("{}/repos/{}/contents/{}", self.api_url, repository, trimmed)
        }
    }

    async fn get_contents(
        &self,
        repository: &str,
        path: &str,
        accept: &str,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.contents_url(repository, path);
        debug!("GET {}", url);
        let mut request = self.http.get(&url).header(ACCEPT, accept);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status().as_u16();
        match status {
            200..=299 => Ok(response),
            // Private repositories answer 404 for unauthenticated callers,
            // so auth failure and missing repository are indistinguishable
            401 | 403 | 404 => Err(ApiError::AuthOrNotFound {
                resource: repository.to_string(),
            }),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(ApiError::Api {
                    service: SERVICE,
                    status,
                    message: body,
                })
            }
        }
    }

    /// List the file names at a path inside a repository
    pub async fn list_files(
        &self,
        repository: &str,
        path: &str,
    ) -> Result<Vec<String>, ApiError> {
        let response = self
            .get_contents(repository, path, "application/vnd.github+json")
            .await?;
        let entries: Vec<ContentEntry> =
            response.json().await.map_err(|e| ApiError::Parse {
                service: SERVICE,
                message: e.to_string(),
            })?;
        Ok(entries.into_iter().map(|entry| entry.name).collect())
    }

    /// Download one file's raw contents
    pub async fn download_file(
        &self,
        repository: &str,
        path: &str,
    ) -> Result<String, ApiError> {
        let response = self
            .get_contents(repository, path, "application/vnd.github.raw+json")
            .await?;
        response.text().await.map_err(|e| ApiError::Parse {
            service: SERVICE,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contents_urls_handle_empty_and_nested_paths() {
        let client = GitHubClient::with_url("https://api.example.com", None).unwrap();
        assert_eq!(
            client.contents_url("acme/theme", ""),
            "https://api.example.com/repos/acme/theme/contents"
        );
        assert_eq!(
            client.contents_url("acme/theme", "/config/deploy.sh"),
            "https://api.example.com/repos/acme/theme/contents/config/deploy.sh"
        );
    }
}
