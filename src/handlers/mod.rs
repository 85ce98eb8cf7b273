//! Command handlers
//!
//! One handler per subcommand: assemble the store, clients, and workflow
//! state, run the step sequence, and render the outcome. API tokens are
//! resolved fill-on-demand here, before the first step runs, so remote
//! resource creation is never interrupted by a credential prompt.

use crate::api::{CloudflareClient, ForgeClient, GitHubClient};
use crate::cli::ConfigCommand;
use crate::config::{ConfigStore, RESERVED_KEYS, resolve};
use crate::error::{ConfigError, ProvisionError, Result};
use crate::runner::{CommandRunner, Decoration};
use crate::workflow;
use crate::workflow::local::LocalProvisioner;
use crate::workflow::remote::{EnvironmentProfile, RemoteProvisioner};
use colored::Colorize;
use inquire::{InquireError, Text};
use log::debug;
use std::path::{Path, PathBuf};

fn prompt_name(message: &str) -> Result<String> {
    let value = Text::new(message)
        .with_help_message("Lowercase letters, digits, and dashes work best")
        .prompt()
        .map_err(|err| match err {
            InquireError::OperationCanceled | InquireError::OperationInterrupted => {
                ProvisionError::Cancelled
            }
            other => ProvisionError::Prompt(other.to_string()),
        })?;
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(ProvisionError::Prompt("a site name is required".to_string()));
    }
    Ok(value)
}

fn optional_github_client(store: &ConfigStore) -> Result<GitHubClient> {
    let token = store.get("github_token").map(str::to_string);
    if token.is_none() {
        debug!("no github_token stored; private repositories will not be readable");
    }
    Ok(GitHubClient::new(token)?)
}

/// Expand a leading `~/` against the home directory
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Provision a staging or production environment
pub async fn handle_remote(
    subdomain: Option<String>,
    profile: EnvironmentProfile,
    config: Option<&Path>,
) -> Result<()> {
    let mut store = ConfigStore::open(config)?;
    let subdomain = match subdomain {
        Some(subdomain) => subdomain,
        None => prompt_name(&format!("Subdomain for the new {} site:", profile.name))?,
    };

    let forge_token = resolve::require_secret(
        &mut store,
        "forge_token",
        "API token for the server-provisioning account",
    )?;
    let cloudflare_token = resolve::require_secret(
        &mut store,
        "cloudflare_token",
        "API token with DNS edit access for the parent zone",
    )?;
    let domain_suffix = resolve::require(
        &mut store,
        profile.domain_key,
        "Parent domain new sites are created under, e.g. staging.example.com",
    )?;
    let github = optional_github_client(&store)?;
    let forge = ForgeClient::new(forge_token)?;
    let dns = CloudflareClient::new(cloudflare_token)?;

    println!(
        "\n{} Provisioning {} environment for {}\n",
        "→".cyan(),
        profile.name,
        subdomain.bold()
    );

    let mut provisioner = RemoteProvisioner::new(
        subdomain,
        domain_suffix,
        profile,
        store,
        forge,
        dns,
        github,
    );
    workflow::execute(&mut provisioner, RemoteProvisioner::steps()).await?;

    let ctx = provisioner.context_mut();
    println!("\n{}", "Site ready".green().bold());
    println!("  URL:       https://{}", ctx.full_domain());
    println!("  Admin:     {}", ctx.admin_username());
    println!("  Password:  {}", ctx.admin_password());
    println!("  Email:     {}", ctx.admin_email());
    Ok(())
}

/// Provision a local development environment
pub async fn handle_local(
    name: Option<String>,
    config: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let mut store = ConfigStore::open(config)?;
    let name = match name {
        Some(name) => name,
        None => prompt_name("Name of the new local site:")?,
    };

    let local_domain = resolve::require(
        &mut store,
        "local_domain",
        "Suffix for local development domains, e.g. test",
    )?;
    let sites_root = resolve::require(
        &mut store,
        "local_sites_root",
        "Directory local sites are created in, e.g. ~/Sites",
    )?;
    let github = optional_github_client(&store)?;
    let runner = CommandRunner::new(Decoration::detect(quiet));

    println!(
        "\n{} Provisioning local environment for {}\n",
        "→".cyan(),
        name.bold()
    );

    let mut provisioner = LocalProvisioner::new(
        name,
        local_domain,
        expand_home(&sites_root),
        store,
        runner,
        github,
    );
    workflow::execute(&mut provisioner, LocalProvisioner::steps()).await?;

    let site_dir = provisioner.site_dir().display().to_string();
    let ctx = provisioner.context_mut();
    println!("\n{}", "Site ready".green().bold());
    println!("  URL:       http://{}", ctx.full_domain());
    println!("  Directory: {}", site_dir);
    println!("  Admin:     {}", ctx.admin_username());
    println!("  Password:  {}", ctx.admin_password());
    Ok(())
}

fn reject_reserved(key: &str) -> Result<()> {
    if RESERVED_KEYS.contains(&key) {
        return Err(ConfigError::ReservedKey(key.to_string()).into());
    }
    Ok(())
}

/// Maintain the configuration store
pub fn handle_config(command: ConfigCommand, config: Option<&Path>) -> Result<()> {
    let mut store = ConfigStore::open(config)?;
    match command {
        ConfigCommand::List => {
            for (key, value) in store.visible_entries() {
                println!("{} = {}", key, value);
            }
        }
        ConfigCommand::Get { key } => {
            reject_reserved(&key)?;
            match store.get(&key) {
                Some(value) => println!("{}", value),
                None => return Err(ConfigError::UnknownKey(key).into()),
            }
        }
        ConfigCommand::Set { key, value } => {
            reject_reserved(&key)?;
            store.set(&key, &value)?;
            println!("{} {} saved to {}", "✓".green(), key, store.path().display());
        }
        ConfigCommand::Delete { key } => {
            reject_reserved(&key)?;
            if store.delete(&key)? {
                println!("{} {} deleted", "✓".green(), key);
            } else {
                return Err(ConfigError::UnknownKey(key).into());
            }
        }
    }
    Ok(())
}
