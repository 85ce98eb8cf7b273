//! Fill-on-demand credential resolution
//!
//! Every required configuration key is resolved through `require`: read the
//! store, and on a miss prompt the operator once, persist the answer, and
//! return it. A key resolved once is never prompted for again unless it is
//! explicitly deleted through the `config delete` maintenance command.
//!
//! The Forge server id gets a specialized path: instead of free text, the
//! candidate list is fetched live from the provisioning API and offered as a
//! select prompt.

use crate::api::forge::{ForgeClient, Server};
use crate::config::ConfigStore;
use crate::error::{ProvisionError, Result};
use inquire::{InquireError, Password, PasswordDisplayMode, Select, Text};
use log::debug;
use std::fmt;

/// Configuration key holding the selected Forge server id
pub const SERVER_KEY: &str = "forge_server";

fn prompt_error(err: InquireError) -> ProvisionError {
    match err {
        InquireError::OperationCanceled | InquireError::OperationInterrupted => {
            ProvisionError::Cancelled
        }
        other => ProvisionError::Prompt(other.to_string()),
    }
}

/// Resolve a required key, prompting and persisting on first use
pub fn require(store: &mut ConfigStore, key: &str, help: &str) -> Result<String> {
    if let Some(value) = store.get(key) {
        debug!("{} resolved from {}", key, store.path().display());
        return Ok(value.to_string());
    }

    let value = Text::new(&format!("{}:", key))
        .with_help_message(help)
        .prompt()
        .map_err(prompt_error)?;
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(ProvisionError::Prompt(format!("{} cannot be empty", key)));
    }

    store.set(key, &value)?;
    Ok(value)
}

/// Resolve a required secret, prompting with masked input on first use
pub fn require_secret(store: &mut ConfigStore, key: &str, help: &str) -> Result<String> {
    if let Some(value) = store.get(key) {
        debug!("{} resolved from {}", key, store.path().display());
        return Ok(value.to_string());
    }

    let value = Password::new(&format!("{}:", key))
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .with_help_message(help)
        .prompt()
        .map_err(prompt_error)?;
    if value.is_empty() {
        return Err(ProvisionError::Prompt(format!("{} cannot be empty", key)));
    }

    store.set(key, &value)?;
    Ok(value)
}

struct ServerChoice(Server);

impl fmt::Display for ServerChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.ip_address {
            Some(ip) => write!(f, "{} ({})", self.0.name, ip),
            None => write!(f, "{}", self.0.name),
        }
    }
}

/// Resolve the target server id, listing candidates live from the API
pub async fn require_server(store: &mut ConfigStore, forge: &ForgeClient) -> Result<u64> {
    if let Some(value) = store.get(SERVER_KEY) {
        if let Ok(id) = value.parse::<u64>() {
            return Ok(id);
        }
        // A hand-edited non-numeric value falls through to re-selection
    }

    let servers = forge.list_servers().await?;
    if servers.is_empty() {
        return Err(ProvisionError::Verification(
            "the Forge account has no servers to provision onto".to_string(),
        ));
    }

    let choices: Vec<ServerChoice> = servers.into_iter().map(ServerChoice).collect();
    let picked = Select::new("Which server should sites be provisioned on?", choices)
        .with_help_message("↑↓ to move, Enter to select, Esc to cancel")
        .prompt()
        .map_err(prompt_error)?;

    store.set(SERVER_KEY, &picked.0.id.to_string())?;
    Ok(picked.0.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn present_keys_resolve_without_prompting() {
        let dir = tempdir().unwrap();
        let mut store = ConfigStore::open_at(dir.path().join("config.toml")).unwrap();
        store.set("forge_token", "tok_abc").unwrap();

        // With the key present, require() must return without touching the
        // terminal; a prompt here would hang the test.
        let value = require(&mut store, "forge_token", "unused").unwrap();
        assert_eq!(value, "tok_abc");
    }

    #[test]
    fn stored_server_id_short_circuits_the_api() {
        let dir = tempdir().unwrap();
        let mut store = ConfigStore::open_at(dir.path().join("config.toml")).unwrap();
        store.set(SERVER_KEY, "42").unwrap();

        // An unroutable endpoint proves the client is never called
        let forge = ForgeClient::with_url("http://127.0.0.1:1", "token").unwrap();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let id = rt.block_on(require_server(&mut store, &forge)).unwrap();
        assert_eq!(id, 42);
    }
}
