//! DNS API client
//!
//! Minimal Cloudflare v4 wrapper for the A records the workflows manage.
//! The check-then-create-or-update idempotency dance belongs to the caller;
//! this client only exposes list/add/update.

use super::{ApiError, REQUEST_TIMEOUT, USER_AGENT, check_status};
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Production API URL
const CLOUDFLARE_API_URL: &str = "https://api.cloudflare.com/client/v4";

const SERVICE: &str = "cloudflare";
const TOKEN_KEY: &str = "cloudflare_token";

/// An existing DNS record
#[derive(Debug, Clone, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub content: String,
    pub ttl: u32,
    #[serde(default)]
    pub proxied: bool,
}

/// The fields of a record to create or overwrite
#[derive(Debug, Clone, Serialize)]
pub struct DnsRecordSpec {
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
}

/// Cloudflare wraps every payload in a result envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<EnvelopeError>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeError {
    #[serde(default)]
    code: i64,
    message: String,
}

/// Client for the DNS API
pub struct CloudflareClient {
    http: Client,
    api_url: String,
    token: String,
}

impl CloudflareClient {
    /// Create a client against the production API URL
    pub fn new(token: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_url(CLOUDFLARE_API_URL, token)
    }

    /// Create a client with a custom API URL
    pub fn with_url(api_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.into(),
            token: token.into(),
        })
    }

    /// The configured API URL
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn unwrap_envelope<T>(&self, envelope: Envelope<T>) -> Result<T, ApiError> {
        if envelope.success {
            envelope.result.ok_or(ApiError::Parse {
                service: SERVICE,
                message: "successful response carried no result".to_string(),
            })
        } else {
            let message = envelope
                .errors
                .iter()
                .map(|e| format!("{} (code {})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ");
            Err(ApiError::Api {
                service: SERVICE,
                status: 400,
                message,
            })
        }
    }

    /// List records of one type and name in a zone
    pub async fn list_records(
        &self,
        zone_id: &str,
        record_type: &str,
        name: &str,
    ) -> Result<Vec<DnsRecord>, ApiError> {
        let url = format!("{}/zones/{}/dns_records", self.api_url, zone_id);
        debug!("GET {} type={} name={}", url, record_type, name);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("type", record_type), ("name", name)])
            .send()
            .await?;
        let response = check_status(SERVICE, TOKEN_KEY, response).await?;
        let envelope: Envelope<Vec<DnsRecord>> =
            response.json().await.map_err(|e| ApiError::Parse {
                service: SERVICE,
                message: e.to_string(),
            })?;
        self.unwrap_envelope(envelope)
    }

    /// Create a new record in a zone
    pub async fn add_record(
        &self,
        zone_id: &str,
        spec: &DnsRecordSpec,
    ) -> Result<DnsRecord, ApiError> {
        let url = format!("{}/zones/{}/dns_records", self.api_url, zone_id);
        debug!("POST {} name={}", url, spec.name);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(spec)
            .send()
            .await?;
        let response = check_status(SERVICE, TOKEN_KEY, response).await?;
        let envelope: Envelope<DnsRecord> =
            response.json().await.map_err(|e| ApiError::Parse {
                service: SERVICE,
                message: e.to_string(),
            })?;
        self.unwrap_envelope(envelope)
    }

    /// Overwrite an existing record
    pub async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        spec: &DnsRecordSpec,
    ) -> Result<DnsRecord, ApiError> {
        let url = format!("{}/zones/{}/dns_records/{}", self.api_url, zone_id, record_id);
        debug!("PUT {}", url);
        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .json(spec)
            .send()
            .await?;
        let response = check_status(SERVICE, TOKEN_KEY, response).await?;
        let envelope: Envelope<DnsRecord> =
            response.json().await.map_err(|e| ApiError::Parse {
                service: SERVICE,
                message: e.to_string(),
            })?;
        self.unwrap_envelope(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_envelopes_surface_their_messages() {
        let client = CloudflareClient::with_url("https://example.com", "token").unwrap();
        let envelope: Envelope<Vec<DnsRecord>> = Envelope {
            success: false,
            errors: vec![EnvelopeError {
                code: 9109,
                message: "Invalid access token".to_string(),
            }],
            result: None,
        };
        let err = client.unwrap_envelope(envelope).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Invalid access token"));
        assert!(message.contains("9109"));
    }

    #[test]
    fn successful_envelopes_unwrap_the_result() {
        let client = CloudflareClient::with_url("https://example.com", "token").unwrap();
        let envelope = Envelope {
            success: true,
            errors: Vec::new(),
            result: Some(vec![]),
        };
        let records: Vec<DnsRecord> = client.unwrap_envelope(envelope).unwrap();
        assert!(records.is_empty());
    }
}
