//! Server-provisioning API client
//!
//! Wraps the Forge HTTP API for everything the workflows need: servers,
//! sites, databases, SSH keys, git installation, deployment scripts, TLS
//! certificates, quick deploy, and remote site commands. Remote commands are
//! asynchronous on the provider side; [`ForgeClient::run_site_command`]
//! polls until the command reaches a terminal status.

use super::{ApiError, REQUEST_TIMEOUT, USER_AGENT, check_status, decode_json};
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Production API URL
const FORGE_API_URL: &str = "https://forge.laravel.com/api/v1";

const SERVICE: &str = "forge";
const TOKEN_KEY: &str = "forge_token";

/// How often a pending remote command is re-checked
const COMMAND_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Upper bound on polling; remote WP-CLI installs are slow but bounded
const COMMAND_POLL_ATTEMPTS: u64 = 90;

/// A server on the provisioning account
#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub ip_address: Option<String>,
}

/// A site created on a server
#[derive(Debug, Clone, Deserialize)]
pub struct Site {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub directory: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// One remote command executed inside a site's directory.
///
/// `status` transitions through `running`/`waiting` before settling on
/// `finished` or `failed`.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteCommand {
    pub id: u64,
    pub status: String,
    #[serde(default)]
    pub output: Option<String>,
}

impl SiteCommand {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "finished" | "failed")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSiteRequest {
    pub domain: String,
    pub project_type: String,
    pub directory: String,
    pub isolated: bool,
    pub username: String,
    pub php_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateDatabaseRequest {
    pub name: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSshKeyRequest {
    pub name: String,
    pub key: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GitRepositoryRequest {
    pub provider: String,
    pub repository: String,
    pub branch: String,
    pub composer: bool,
}

#[derive(Debug, Deserialize)]
struct ServersResponse {
    servers: Vec<Server>,
}

#[derive(Debug, Deserialize)]
struct ServerResponse {
    server: Server,
}

#[derive(Debug, Deserialize)]
struct SiteResponse {
    site: Site,
}

#[derive(Debug, Deserialize)]
struct SiteCommandResponse {
    command: SiteCommand,
}

/// Client for the server-provisioning API
pub struct ForgeClient {
    http: Client,
    api_url: String,
    token: String,
}

impl ForgeClient {
    /// Create a client against the production API URL
    pub fn new(token: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_url(FORGE_API_URL, token)
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

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.api_url, path);
        debug!("GET {}", url);
        let response = self.http.get(&url).bearer_auth(&self.token).send().await?;
        decode_json(SERVICE, TOKEN_KEY, response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.api_url, path);
        debug!("POST {}", url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        decode_json(SERVICE, TOKEN_KEY, response).await
    }

    /// POST where only the status matters
    async fn post_unit<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let url = format!("{}{}", self.api_url, path);
        debug!("POST {}", url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        check_status(SERVICE, TOKEN_KEY, response).await.map(|_| ())
    }

    /// PUT where only the status matters
    async fn put_unit<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let url = format!("{}{}", self.api_url, path);
        debug!("PUT {}", url);
        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        check_status(SERVICE, TOKEN_KEY, response).await.map(|_| ())
    }

    /// List all servers on the account
    pub async fn list_servers(&self) -> Result<Vec<Server>, ApiError> {
        let response: ServersResponse = self.get("/servers").await?;
        Ok(response.servers)
    }

    /// Fetch a single server, including its public IP
    pub async fn get_server(&self, server_id: u64) -> Result<Server, ApiError> {
        let response: ServerResponse = self.get(&format!("/servers/{}", server_id)).await?;
        Ok(response.server)
    }

    /// Create a site on a server
    pub async fn create_site(
        &self,
        server_id: u64,
        request: &CreateSiteRequest,
    ) -> Result<Site, ApiError> {
        let response: SiteResponse = self
            .post(&format!("/servers/{}/sites", server_id), request)
            .await?;
        Ok(response.site)
    }

    /// Create a database with its own user
    pub async fn create_database(
        &self,
        server_id: u64,
        request: &CreateDatabaseRequest,
    ) -> Result<(), ApiError> {
        self.post_unit(&format!("/servers/{}/databases", server_id), request)
            .await
    }

    /// Register an SSH public key for a site user
    pub async fn create_ssh_key(
        &self,
        server_id: u64,
        request: &CreateSshKeyRequest,
    ) -> Result<(), ApiError> {
        self.post_unit(&format!("/servers/{}/keys", server_id), request)
            .await
    }

    /// Attach a git repository to a site
    pub async fn install_git_repository(
        &self,
        server_id: u64,
        site_id: u64,
        request: &GitRepositoryRequest,
    ) -> Result<(), ApiError> {
        self.post_unit(
            &format!("/servers/{}/sites/{}/git", server_id, site_id),
            request,
        )
        .await
    }

    /// Change the repository or branch attached to a site
    pub async fn update_git_repository(
        &self,
        server_id: u64,
        site_id: u64,
        request: &GitRepositoryRequest,
    ) -> Result<(), ApiError> {
        self.put_unit(
            &format!("/servers/{}/sites/{}/git", server_id, site_id),
            request,
        )
        .await
    }

    /// Replace the site's deployment script
    pub async fn update_deployment_script(
        &self,
        server_id: u64,
        site_id: u64,
        script: &str,
    ) -> Result<(), ApiError> {
        self.put_unit(
            &format!("/servers/{}/sites/{}/deployment/script", server_id, site_id),
            &serde_json::json!({ "content": script }),
        )
        .await
    }

    /// Trigger a deployment
    pub async fn deploy_site(&self, server_id: u64, site_id: u64) -> Result<(), ApiError> {
        self.post_unit(
            &format!("/servers/{}/sites/{}/deployment/deploy", server_id, site_id),
            &serde_json::json!({}),
        )
        .await
    }

    /// Request a certificate for the given domains
    pub async fn obtain_tls_certificate(
        &self,
        server_id: u64,
        site_id: u64,
        domains: &[String],
    ) -> Result<(), ApiError> {
        self.post_unit(
            &format!(
                "/servers/{}/sites/{}/certificates/letsencrypt",
                server_id, site_id
            ),
            &serde_json::json!({ "domains": domains }),
        )
        .await
    }

    /// Enable automatic redeployment on upstream pushes
    pub async fn enable_quick_deploy(&self, server_id: u64, site_id: u64) -> Result<(), ApiError> {
        self.post_unit(
            &format!("/servers/{}/sites/{}/deployment", server_id, site_id),
            &serde_json::json!({}),
        )
        .await
    }

    /// Start a command inside the site's directory
    pub async fn execute_site_command(
        &self,
        server_id: u64,
        site_id: u64,
        command: &str,
    ) -> Result<SiteCommand, ApiError> {
        let response: SiteCommandResponse = self
            .post(
                &format!("/servers/{}/sites/{}/commands", server_id, site_id),
                &serde_json::json!({ "command": command }),
            )
            .await?;
        Ok(response.command)
    }

    /// Fetch the current state of a previously started command
    pub async fn get_site_command(
        &self,
        server_id: u64,
        site_id: u64,
        command_id: u64,
    ) -> Result<SiteCommand, ApiError> {
        let response: SiteCommandResponse = self
            .get(&format!(
                "/servers/{}/sites/{}/commands/{}",
                server_id, site_id, command_id
            ))
            .await?;
        Ok(response.command)
    }

    /// Execute a command and poll until it reaches a terminal status
    pub async fn run_site_command(
        &self,
        server_id: u64,
        site_id: u64,
        command: &str,
    ) -> Result<SiteCommand, ApiError> {
        let created = self.execute_site_command(server_id, site_id, command).await?;
        if created.is_terminal() {
            return finished_or_error(created);
        }

        for _ in 0..COMMAND_POLL_ATTEMPTS {
            tokio::time::sleep(COMMAND_POLL_INTERVAL).await;
            let current = self
                .get_site_command(server_id, site_id, created.id)
                .await?;
            debug!("command {} status: {}", current.id, current.status);
            if current.is_terminal() {
                return finished_or_error(current);
            }
        }

        Err(ApiError::PollingExhausted {
            seconds: COMMAND_POLL_INTERVAL.as_secs() * COMMAND_POLL_ATTEMPTS,
        })
    }
}

fn finished_or_error(command: SiteCommand) -> Result<SiteCommand, ApiError> {
    if command.status == "finished" {
        Ok(command)
    } else {
        Err(ApiError::RemoteCommand {
            status: command.status,
            output: command.output.unwrap_or_default(),
        })
    }
}
