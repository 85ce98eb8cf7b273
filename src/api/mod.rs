//! External resource API clients
//!
//! Thin contract wrappers around the server-provisioning API (Forge-style),
//! the DNS API (Cloudflare-style), and the source-hosting content API
//! (GitHub-style). Each client owns a configured `reqwest::Client` with a
//! bounded timeout and maps HTTP failures into the shared [`ApiError`]
//! taxonomy; workflow code never sees raw responses.

pub mod cloudflare;
pub mod forge;
pub mod github;

pub use cloudflare::CloudflareClient;
pub use forge::ForgeClient;
pub use github::GitHubClient;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Default timeout for any single API request
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent for API requests
pub(crate) const USER_AGENT: &str = concat!("wpforge-cli/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur when talking to an external API
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (network error, timeout, etc.)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response
    #[error("{service} error ({status}): {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// The request was rejected with field-level validation problems
    #[error("{service} rejected the request:\n{}", render_validation(.errors))]
    Validation {
        service: &'static str,
        errors: BTreeMap<String, Vec<String>>,
    },

    /// Failed to parse the API response
    #[error("failed to parse {service} response: {message}")]
    Parse {
        service: &'static str,
        message: String,
    },

    /// The stored token was rejected
    #[error("{service} rejected the stored token - run `wpforge config delete {token_key}` and re-run to enter a new one")]
    Unauthorized {
        service: &'static str,
        token_key: &'static str,
    },

    /// Requested resource was not found
    #[error("{service} resource not found: {resource}")]
    NotFound {
        service: &'static str,
        resource: String,
    },

    /// Repository is missing or the token lacks access; the two are not
    /// distinguishable from the hosting API's response
    #[error("repository {resource} not found or the token lacks access to it")]
    AuthOrNotFound { resource: String },

    /// Rate limit exceeded
    #[error("{service} rate limit exceeded - please try again later")]
    RateLimited { service: &'static str },

    /// Server error
    #[error("{service} server error ({status}): {message}")]
    Server {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// A remote site command reached a terminal non-success status
    #[error("remote command ended with status {status}\n{output}")]
    RemoteCommand { status: String, output: String },

    /// A remote site command never reached a terminal status
    #[error("remote command did not finish within {seconds}s")]
    PollingExhausted { seconds: u64 },
}

fn render_validation(errors: &BTreeMap<String, Vec<String>>) -> String {
    let mut lines = Vec::new();
    for (field, problems) in errors {
        for problem in problems {
            lines.push(format!("  {}: {}", field, problem));
        }
    }
    lines.join("\n")
}

/// Laravel-style error body: `{"message": "...", "errors": {"field": ["..."]}}`
#[derive(Debug, Deserialize)]
struct ValidationBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: BTreeMap<String, Vec<String>>,
}

/// Map a non-success response to the matching [`ApiError`] variant.
///
/// Returns the response untouched when the status is a success, so callers
/// can decode the body however the service requires.
pub(crate) async fn check_status(
    service: &'static str,
    token_key: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let status_code = status.as_u16();
    let url_path = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();

    match status_code {
        401 | 403 => Err(ApiError::Unauthorized { service, token_key }),
        404 => Err(ApiError::NotFound {
            service,
            resource: url_path,
        }),
        422 => {
            let parsed = serde_json::from_str::<ValidationBody>(&body).ok();
            match parsed {
                Some(detail) if !detail.errors.is_empty() => Err(ApiError::Validation {
                    service,
                    errors: detail.errors,
                }),
                Some(detail) => Err(ApiError::Api {
                    service,
                    status: status_code,
                    message: detail.message.unwrap_or(body),
                }),
                None => Err(ApiError::Api {
                    service,
                    status: status_code,
                    message: body,
                }),
            }
        }
        429 => Err(ApiError::RateLimited { service }),
        500..=599 => Err(ApiError::Server {
            service,
            status: status_code,
            message: body,
        }),
        _ => Err(ApiError::Api {
            service,
            status: status_code,
            message: body,
        }),
    }
}

/// Check the status, then decode the JSON body
pub(crate) async fn decode_json<T: DeserializeOwned>(
    service: &'static str,
    token_key: &'static str,
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let response = check_status(service, token_key, response).await?;
    response.json::<T>().await.map_err(|e| ApiError::Parse {
        service,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_render_field_per_line() {
        let mut errors = BTreeMap::new();
        errors.insert(
            "domain".to_string(),
            vec!["The domain has already been taken.".to_string()],
        );
        errors.insert(
            "username".to_string(),
            vec![
                "The username may only contain letters and numbers.".to_string(),
                "The username must not be longer than 32 characters.".to_string(),
            ],
        );
        let err = ApiError::Validation {
            service: "forge",
            errors,
        };
        let message = err.to_string();
        assert!(message.contains("  domain: The domain has already been taken."));
        assert!(message.contains("  username: The username must not be longer than 32 characters."));
    }

    #[test]
    fn unauthorized_points_at_the_config_key() {
        let err = ApiError::Unauthorized {
            service: "cloudflare",
            token_key: "cloudflare_token",
        };
        assert!(err.to_string().contains("config delete cloudflare_token"));
    }
}
