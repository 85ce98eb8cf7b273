//! Local development environment provisioning
//!
//! Stands up a WordPress site on the operator's machine entirely through
//! WP-CLI, git, and npm pipelines. The theme comes in through the resilient
//! clone strategy, the same one the remote workflow's provider performs on
//! its side of the fence.

use crate::api::ApiError;
use crate::api::github::GitHubClient;
use crate::config::{ConfigStore, resolve};
use crate::error::ProvisionError;
use crate::git;
use crate::runner::{CommandRunner, Decoration, OutputMode};
use crate::workflow::{ProvisioningContext, Step, StepFuture};
use log::{debug, info};
use std::path::PathBuf;

/// Tools the local workflow shells out to, with install hints
const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("wp", "install WP-CLI from https://wp-cli.org"),
    ("git", "install git from https://git-scm.com"),
    ("npm", "install Node.js from https://nodejs.org"),
];

/// State for one local provisioning run
pub struct LocalProvisioner {
    ctx: ProvisioningContext,
    store: ConfigStore,
    runner: CommandRunner,
    github: GitHubClient,
    site_dir: PathBuf,
}

impl LocalProvisioner {
    pub fn new(
        name: impl Into<String>,
        local_domain: impl Into<String>,
        sites_root: impl Into<PathBuf>,
        store: ConfigStore,
        runner: CommandRunner,
        github: GitHubClient,
    ) -> Self {
        let name = name.into();
        let site_dir = sites_root.into().join(&name);
        Self {
            ctx: ProvisioningContext::new(name, local_domain),
            store,
            runner,
            github,
            site_dir,
        }
    }

    pub fn context_mut(&mut self) -> &mut ProvisioningContext {
        &mut self.ctx
    }

    pub fn site_dir(&self) -> &PathBuf {
        &self.site_dir
    }

    fn theme_dir(&self) -> PathBuf {
        self.site_dir
            .join("wp-content")
            .join("themes")
            .join(self.ctx.subdomain())
    }

    /// The ordered step sequence for a local run
    pub fn steps() -> Vec<Step<Self>> {
        vec![
            Step::new("Checking local tooling", Self::check_tooling),
            Step::new("Resolving theme repository", Self::resolve_parameters),
            Step::new("Downloading WordPress", Self::download_core),
            Step::new("Configuring database", Self::configure_database),
            Step::new("Installing WordPress", Self::install_wordpress),
            Step::new("Cloning theme", Self::clone_theme),
            Step::new("Building theme assets", Self::build_assets),
            Step::new("Activating theme", Self::activate_theme),
        ]
    }

    fn check_tooling(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            // Probes bypass decoration; `command -v` understands no flags
            let probe = CommandRunner::new(Decoration::Full).output_mode(OutputMode::Suppress);
            let mut missing = Vec::new();
            for (tool, hint) in REQUIRED_TOOLS {
                let result = probe.run(&[format!("command -v {}", tool)]).await?;
                if result.succeeded {
                    debug!("{} available", tool);
                } else {
                    missing.push(format!("{} ({})", tool, hint));
                }
            }
            if !missing.is_empty() {
                return Err(ProvisionError::Verification(format!(
                    "missing local tooling: {}",
                    missing.join(", ")
                )));
            }
            Ok(())
        })
    }

    fn resolve_parameters(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
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

    fn download_core(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            std::fs::create_dir_all(&self.site_dir)?;
            self.runner
                .clone()
                .in_dir(&self.site_dir)
                .run_checked(&["wp core download".to_string()])
                .await?;
            Ok(())
        })
    }

    fn configure_database(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            let db_user = resolve::require(
                &mut self.store,
                "local_db_user",
                "Local MySQL user with permission to create databases",
            )?;
            let db_password = resolve::require_secret(
                &mut self.store,
                "local_db_password",
                "Password for the local MySQL user",
            )?;
            let commands = vec![
                format!(
                    "wp config create --dbname={} --dbuser={} --dbpass={}",
                    self.ctx.database_name(),
                    db_user,
                    db_password
                ),
                "wp db create".to_string(),
            ];
            self.runner
                .clone()
                .in_dir(&self.site_dir)
                .run_checked(&commands)
                .await?;
            info!("database {} ready", self.ctx.database_name());
            Ok(())
        })
    }

    fn install_wordpress(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            let title = self.ctx.subdomain().to_string();
            let install = format!(
                "wp core install --url=http://{} --title={} --admin_user={} --admin_password={} --admin_email={} --skip-email",
                self.ctx.full_domain(),
                title,
                self.ctx.admin_username(),
                self.ctx.admin_password(),
                self.ctx.admin_email()
            );
            self.runner
                .clone()
                .in_dir(&self.site_dir)
                .run_checked(&[install])
                .await?;
            Ok(())
        })
    }

    fn clone_theme(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            let repository = self.ctx.repository()?.to_string();
            let destination = self.theme_dir();
            git::clone_repository(&self.runner, &repository, &destination).await
        })
    }

    fn build_assets(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            let commands = vec![
                "npm install --no-audit".to_string(),
                "npm run build".to_string(),
            ];
            self.runner
                .clone()
                .in_dir(self.theme_dir())
                .run_checked(&commands)
                .await?;
            Ok(())
        })
    }

    fn activate_theme(&mut self) -> StepFuture<'_> {
        Box::pin(async move {
            let activate = format!("wp theme activate {}", self.ctx.subdomain());
            self.runner
                .clone()
                .in_dir(&self.site_dir)
                .run_checked(&[activate])
                .await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn provisioner(sites_root: &std::path::Path) -> LocalProvisioner {
        let store =
            ConfigStore::open_at(sites_root.join("config.toml")).unwrap();
        let runner = CommandRunner::new(Decoration::Full).output_mode(OutputMode::Suppress);
        let github = GitHubClient::with_url("http://127.0.0.1:1", None).unwrap();
        LocalProvisioner::new("demo", "test", sites_root, store, runner, github)
    }

    #[test]
    fn site_and_theme_directories_derive_from_the_name() {
        let dir = tempdir().unwrap();
        let p = provisioner(dir.path());
        assert_eq!(p.site_dir(), &dir.path().join("demo"));
        assert_eq!(
            p.theme_dir(),
            dir.path().join("demo").join("wp-content").join("themes").join("demo")
        );
    }

    #[test]
    fn step_sequence_checks_tooling_before_anything_else() {
        let steps = LocalProvisioner::steps();
        assert_eq!(steps.len(), 8);
        assert_eq!(steps[0].name(), "Checking local tooling");
        assert_eq!(steps.last().unwrap().name(), "Activating theme");
    }
}
