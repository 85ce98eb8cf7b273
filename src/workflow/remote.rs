//! Remote environment provisioning
//!
//! One parameterized workflow covers staging and production: the
//! [`EnvironmentProfile`] carries the per-environment domain-suffix config
//! key, deploy branch, and PHP version, and everything else is shared.
//! Steps create billable remote resources, so there is no automatic retry
//! and no rollback of earlier steps on failure; the operator re-runs after
//! fixing the cause. Database identifiers carry a generation stamp exactly
//! so a re-run does not collide with the first attempt's leftovers.

use crate::api::ApiError;
use crate::api::cloudflare::{CloudflareClient, DnsRecordSpec};
use crate::api::forge::{
    CreateDatabaseRequest, CreateSiteRequest, CreateSshKeyRequest, ForgeClient,
    GitRepositoryRequest,
};
use crate::api::github::GitHubClient;
use crate::config::{ConfigStore, resolve};
use crate::error::ProvisionError;
use crate::workflow::{ProvisioningContext, Step, StepFuture};
use indicatif::ProgressBar;
use log::{debug, info};
use std::time::Duration;

/// TTL for managed A records
const DNS_TTL: u32 = 300;

/// Environment-specific policy for the shared remote workflow
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentProfile {
    /// Display label: "staging" or "production"
    pub name: &'static str,
    /// Config key holding the fixed domain suffix for this environment
    pub domain_key: &'static str,
    /// Branch the site deploys from
    pub branch: &'static str,
    pub php_version: &'static str,
}

pub const STAGING: EnvironmentProfile = EnvironmentProfile {
    name: "staging",
    domain_key: "staging_domain",
    branch: "develop",
    php_version: "php83",
};

pub const PRODUCTION: EnvironmentProfile = EnvironmentProfile {
    name: "production",
    domain_key: "production_domain",
    branch: "main",
    php_version: "php83",
};

/// State for one remote provisioning run: the derived-value context plus
/// the clients and store the steps work through
pub struct RemoteProvisioner {
    profile: EnvironmentProfile,
    ctx: ProvisioningContext,
    store: ConfigStore,
    forge: ForgeClient,
    dns: CloudflareClient,
    github: GitHubClient,
}

impl RemoteProvisioner {
    pub fn new(
        subdomain: impl Into<String>,
        domain_suffix: impl Into<String>,
        profile: EnvironmentProfile,
        store: ConfigStore,
        forge: ForgeClient,
        dns: CloudflareClient,
        github: GitHubClient,
    ) -> Self {
        Self {
            profile,
            ctx: ProvisioningContext::new(subdomain, domain_suffix),
            store,
            forge,
            dns,
            github,
        }
    }

    pub fn profile(&self) -> &EnvironmentProfile {
        &self.profile
    }

    pub fn context_mut(&mut self) -> &mut ProvisioningContext {
        &mut self.ctx
    }

    /// The ordered step sequence for a remote run
    pub fn steps() -> Vec<Step<Self>> {
        vec![
            Step::new("Resolving server and repository", Self::resolve_parameters),
            Step::new("Creating site", Self::create_site),
            Step::new("Creating database", Self::create_database),
            Step::new("Authorizing SSH key", Self::register_ssh_key),
            Step::new("Pointing DNS", Self::point_dns),
            Step::new("Installing repository", Self::install_repository),
            Step::new("Writing deployment script", Self::write_deployment_script),
            Step::new("Deploying site", Self::deploy_site),
            Step::new("Securing site with TLS", Self::obtain_certificate),
            Step::new("Enabling quick deploy", Self::enable_quick_deploy),
            Step::new("Installing WordPress", Self::install_wordpress),
        ]
    }

    /// Resolve every remaining required parameter before the first remote
    /// side effect, so later steps never stall on a prompt
    fn resolve_parameters(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            let server_id = resolve::require_server(&mut self.store, &self.forge).await?;
            let server = self.forge.get_server(server_id).await?;
            info!("provisioning onto {} (id {})", server.name, server.id);
            self.ctx.set_server(server.id, server.ip_address.clone());

            let repository = resolve::require(
                &mut self.store,
                "theme_repository",
                "owner/name of the theme repository, e.g. acme/starter-theme",
            )?;
            match self.github.list_files(&repository, "").await {
                Ok(files) => debug!("{} lists {} top-level entries", repository, files.len()),
                Err(ApiError::AuthOrNotFound { resource }) => {
                    return Err(ProvisionError::Authentication(format!(
                        "cannot read {}: check the coordinate, or store a github_token with access to it",
                        resource
                    )));
                }
                Err(other) => return Err(other.into()),
            }
            self.ctx.set_repository(repository);
            Ok(())
        })
    }

    fn create_site(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            let server_id = self.ctx.server_id()?;
            let request = CreateSiteRequest {
                domain: self.ctx.full_domain(),
                project_type: "php".to_string(),
                directory: "/public".to_string(),
                isolated: true,
                username: self.ctx.site_username(),
                php_version: self.profile.php_version.to_string(),
            };
            let site = self.forge.create_site(server_id, &request).await?;
            info!("site {} created at {}", site.id, site.directory);
            self.ctx.set_site(site);
            Ok(())
        })
    }

    fn create_database(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            let server_id = self.ctx.server_id()?;
            let request = CreateDatabaseRequest {
                name: self.ctx.database_name(),
                user: self.ctx.database_username(),
                password: self.ctx.database_password(),
            };
            self.forge.create_database(server_id, &request).await?;
            info!("database {} created", request.name);
            Ok(())
        })
    }

    fn register_ssh_key(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            let server_id = self.ctx.server_id()?;
            let key = resolve::require(
                &mut self.store,
                "deploy_key",
                "Public key to authorize for the site user (contents of ~/.ssh/id_ed25519.pub)",
            )?;
            let request = CreateSshKeyRequest {
                name: format!("wpforge-{}", self.ctx.full_domain()),
                key,
                username: self.ctx.site_username(),
            };
            self.forge.create_ssh_key(server_id, &request).await?;
            Ok(())
        })
    }

    /// Check-then-create-or-update keeps this re-runnable for the same
    /// subdomain
    fn point_dns(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            let zone_id = resolve::require(
                &mut self.store,
                "cloudflare_zone",
                "Zone id of the parent domain in Cloudflare",
            )?;
            let name = self.ctx.full_domain();
            let content = self.ctx.server_ip()?.to_string();
            let spec = DnsRecordSpec {
                record_type: "A".to_string(),
                name: name.clone(),
                content,
                ttl: DNS_TTL,
                proxied: false,
            };

            let existing = self.dns.list_records(&zone_id, "A", &name).await?;
            match existing.first() {
                Some(record) => {
                    self.dns.update_record(&zone_id, &record.id, &spec).await?;
                    info!("updated A record for {}", name);
                }
                None => {
                    self.dns.add_record(&zone_id, &spec).await?;
                    info!("created A record for {}", name);
                }
            }
            Ok(())
        })
    }

    fn install_repository(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            let server_id = self.ctx.server_id()?;
            let site_id = self.ctx.site()?.id;
            let request = GitRepositoryRequest {
                provider: "github".to_string(),
                repository: self.ctx.repository()?.to_string(),
                branch: self.profile.branch.to_string(),
                composer: false,
            };
            self.forge
                .install_git_repository(server_id, site_id, &request)
                .await?;
            Ok(())
        })
    }

    /// The theme repository may ship its own `deploy.sh`; otherwise a
    /// conventional pull-build script is written
    fn write_deployment_script(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            let server_id = self.ctx.server_id()?;
            let site = self.ctx.site()?;
            let site_id = site.id;
            let directory = site.directory.clone();
            let repository = self.ctx.repository()?.to_string();

            let script = match self.github.download_file(&repository, "deploy.sh").await {
                Ok(script) => {
                    info!("using deploy.sh from {}", repository);
                    script
                }
                Err(ApiError::AuthOrNotFound { .. }) => {
                    debug!("{} ships no deploy.sh, writing the default", repository);
                    default_deployment_script(&directory)
                }
                Err(other) => return Err(other.into()),
            };
            self.forge
                .update_deployment_script(server_id, site_id, &script)
                .await?;
            Ok(())
        })
    }

    fn deploy_site(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            let server_id = self.ctx.server_id()?;
            let site_id = self.ctx.site()?.id;
            self.forge.deploy_site(server_id, site_id).await?;
            Ok(())
        })
    }

    fn obtain_certificate(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            let server_id = self.ctx.server_id()?;
            let site_id = self.ctx.site()?.id;
            let domains = vec![self.ctx.full_domain()];
            self.forge
                .obtain_tls_certificate(server_id, site_id, &domains)
                .await?;
            Ok(())
        })
    }

    fn enable_quick_deploy(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            let server_id = self.ctx.server_id()?;
            let site_id = self.ctx.site()?.id;
            self.forge.enable_quick_deploy(server_id, site_id).await?;
            Ok(())
        })
    }

    /// Configure and install WordPress through a remote site command,
    /// polling until the provider reports a terminal status
    fn install_wordpress(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            let server_id = self.ctx.server_id()?;
            let site_id = self.ctx.site()?.id;

            let configure = format!(
                "wp config create --dbname={} --dbuser={} --dbpass={} --force",
                self.ctx.database_name(),
                self.ctx.database_username(),
                self.ctx.database_password()
            );
            let title = self.ctx.subdomain().to_string();
            let install = format!(
                "wp core install --url=https://{} --title={} --admin_user={} --admin_password={} --admin_email={} --skip-email",
                self.ctx.full_domain(),
                title,
                self.ctx.admin_username(),
                self.ctx.admin_password(),
                self.ctx.admin_email()
            );
            let command = format!("{} && {}", configure, install);

            let spinner = ProgressBar::new_spinner();
            spinner.set_message("waiting for the remote install to finish");
            spinner.enable_steady_tick(Duration::from_millis(120));
            let result = self.forge.run_site_command(server_id, site_id, &command).await;
            spinner.finish_and_clear();

            let finished = result?;
            debug!(
                "remote install finished: {}",
                finished.output.unwrap_or_default()
            );
            Ok(())
        })
    }
}

fn default_deployment_script(directory: &str) -> String {
    format!(
        "cd {}\n\
         git pull origin $FORGE_SITE_BRANCH\n\
         npm ci --no-audit\n\
         npm run build\n\
         wp cache flush\n",
        directory
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_differ_only_in_policy() {
        assert_eq!(STAGING.domain_key, "staging_domain");
        assert_eq!(PRODUCTION.domain_key, "production_domain");
        assert_ne!(STAGING.branch, PRODUCTION.branch);
    }

    #[test]
    fn step_sequence_starts_with_resolution_and_ends_with_install() {
        let steps = RemoteProvisioner::steps();
        assert_eq!(steps.len(), 11);
        assert_eq!(steps[0].name(), "Resolving server and repository");
        assert_eq!(steps[1].name(), "Creating site");
        assert_eq!(steps.last().unwrap().name(), "Installing WordPress");
    }

    #[test]
    fn default_deployment_script_changes_into_the_site_directory() {
        let script = default_deployment_script("/home/wp_demo/demo.example.com");
        assert!(script.starts_with("cd /home/wp_demo/demo.example.com\n"));
        assert!(script.contains("git pull origin $FORGE_SITE_BRANCH"));
    }
}
