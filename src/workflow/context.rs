//! Derived-state bag threaded through a provisioning run
//!
//! Every resource name and credential is derived from the project
//! identifier exactly once and memoized for the remainder of the run:
//! later steps read the same values earlier steps configured with, which
//! matters most for the generated passwords — recomputing one mid-run
//! would leave WordPress configured against a password nothing knows.
//!
//! Database identifiers carry a generation timestamp so re-running the same
//! project does not collide with the remains of an earlier attempt.

use crate::api::forge::Site;
use crate::error::{ProvisionError, Result};
use chrono::Local;
use rand::{Rng, distr::Alphanumeric};

/// MySQL identifier limit for database name and user, before the stamp
const DATABASE_IDENT_MAX: usize = 16;
/// System username limit for the isolated site user
const SITE_USERNAME_MAX: usize = 32;
const DATABASE_PASSWORD_LEN: usize = 32;
const ADMIN_PASSWORD_LEN: usize = 9;

const DATABASE_PREFIX: &str = "db_";
const DATABASE_USER_PREFIX: &str = "u_";
const SITE_USER_PREFIX: &str = "wp_";

/// Lowercase and replace anything outside `[a-z0-9]` with underscores
fn identifier_slug(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn random_string(len: usize) -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Mutable derived-state bag for one provisioning run.
///
/// Owned by the workflow; mutated by steps that create remote resources,
/// read by the steps that depend on them.
#[derive(Debug)]
pub struct ProvisioningContext {
    subdomain: String,
    domain_suffix: String,

    full_domain: Option<String>,
    stamp: Option<String>,
    database_name: Option<String>,
    database_username: Option<String>,
    database_password: Option<String>,
    site_username: Option<String>,
    admin_username: Option<String>,
    admin_password: Option<String>,
    admin_email: Option<String>,

    server_id: Option<u64>,
    server_ip: Option<String>,
    site: Option<Site>,
    repository: Option<String>,
}

impl ProvisioningContext {
    pub fn new(subdomain: impl Into<String>, domain_suffix: impl Into<String>) -> Self {
        Self {
            subdomain: subdomain.into(),
            domain_suffix: domain_suffix.into(),
            full_domain: None,
            stamp: None,
            database_name: None,
            database_username: None,
            database_password: None,
            site_username: None,
            admin_username: None,
            admin_password: None,
            admin_email: None,
            server_id: None,
            server_ip: None,
            site: None,
            repository: None,
        }
    }

    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }

    /// `subdomain.suffix`, e.g. `demo` → `demo.staging.example.com`
    pub fn full_domain(&mut self) -> String {
        if let Some(domain) = &self.full_domain {
            return domain.clone();
        }
        let domain = format!("{}.{}", self.subdomain, self.domain_suffix);
        self.full_domain = Some(domain.clone());
        domain
    }

    /// Generation stamp shared by the database name and user, so both carry
    /// the same suffix
    fn stamp(&mut self) -> String {
        if let Some(stamp) = &self.stamp {
            return stamp.clone();
        }
        let stamp = Local::now().format("%Y%m%d%H%M%S").to_string();
        self.stamp = Some(stamp.clone());
        stamp
    }

    pub fn database_name(&mut self) -> String {
        if let Some(name) = &self.database_name {
            return name.clone();
        }
        let mut base = format!("{}{}", DATABASE_PREFIX, identifier_slug(&self.full_domain()));
        base.truncate(DATABASE_IDENT_MAX);
        let name = format!("{}_{}", base, self.stamp());
        self.database_name = Some(name.clone());
        name
    }

    pub fn database_username(&mut self) -> String {
        if let Some(user) = &self.database_username {
            return user.clone();
        }
        let mut base = format!(
            "{}{}",
            DATABASE_USER_PREFIX,
            identifier_slug(&self.full_domain())
        );
        base.truncate(DATABASE_IDENT_MAX);
        let user = format!("{}_{}", base, self.stamp());
        self.database_username = Some(user.clone());
        user
    }

    pub fn database_password(&mut self) -> String {
        if let Some(password) = &self.database_password {
            return password.clone();
        }
        let password = random_string(DATABASE_PASSWORD_LEN);
        self.database_password = Some(password.clone());
        password
    }

    /// Isolated system user the site runs as
    pub fn site_username(&mut self) -> String {
        if let Some(user) = &self.site_username {
            return user.clone();
        }
        let mut user = format!(
            "{}{}",
            SITE_USER_PREFIX,
            identifier_slug(&self.full_domain())
        );
        user.truncate(SITE_USERNAME_MAX);
        self.site_username = Some(user.clone());
        user
    }

    pub fn admin_username(&mut self) -> String {
        if let Some(user) = &self.admin_username {
            return user.clone();
        }
        let user = format!("{}_admin", identifier_slug(&self.subdomain));
        self.admin_username = Some(user.clone());
        user
    }

    /// Generated independently of the database password
    pub fn admin_password(&mut self) -> String {
        if let Some(password) = &self.admin_password {
            return password.clone();
        }
        let password = random_string(ADMIN_PASSWORD_LEN);
        self.admin_password = Some(password.clone());
        password
    }

    pub fn admin_email(&mut self) -> String {
        if let Some(email) = &self.admin_email {
            return email.clone();
        }
        let email = format!("admin@{}", self.full_domain());
        self.admin_email = Some(email.clone());
        email
    }

    pub fn set_server(&mut self, id: u64, ip: Option<String>) {
        self.server_id = Some(id);
        self.server_ip = ip;
    }

    pub fn server_id(&self) -> Result<u64> {
        self.server_id.ok_or(ProvisionError::Unresolved("server id"))
    }

    pub fn server_ip(&self) -> Result<&str> {
        self.server_ip
            .as_deref()
            .ok_or(ProvisionError::Unresolved("server IP"))
    }

    pub fn set_site(&mut self, site: Site) {
        self.site = Some(site);
    }

    pub fn site(&self) -> Result<&Site> {
        self.site.as_ref().ok_or(ProvisionError::Unresolved("site"))
    }

    pub fn set_repository(&mut self, repository: impl Into<String>) {
        self.repository = Some(repository.into());
    }

    pub fn repository(&self) -> Result<&str> {
        self.repository
            .as_deref()
            .ok_or(ProvisionError::Unresolved("theme repository"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ProvisioningContext {
        ProvisioningContext::new("demo", "staging.example.com")
    }

    #[test]
    fn full_domain_appends_the_fixed_suffix() {
        let mut ctx = context();
        assert_eq!(ctx.full_domain(), "demo.staging.example.com");
    }

    #[test]
    fn derivations_are_memoized() {
        let mut ctx = context();
        // Byte-identical on repeated reads, including the random values
        assert_eq!(ctx.database_name(), ctx.database_name());
        assert_eq!(ctx.database_username(), ctx.database_username());
        assert_eq!(ctx.database_password(), ctx.database_password());
        assert_eq!(ctx.site_username(), ctx.site_username());
        assert_eq!(ctx.admin_password(), ctx.admin_password());
    }

    #[test]
    fn database_identifiers_share_one_stamp() {
        let mut ctx = context();
        let name = ctx.database_name();
        let user = ctx.database_username();
        let name_stamp = name.rsplit('_').next().unwrap();
        let user_stamp = user.rsplit('_').next().unwrap();
        assert_eq!(name_stamp, user_stamp);
        assert_eq!(name_stamp.len(), 14);
    }

    #[test]
    fn database_identifiers_respect_the_length_limits() {
        let mut ctx = ProvisioningContext::new(
            "a-very-long-subdomain-name-indeed",
            "staging.example.com",
        );
        let stamp_len = 14 + 1;
        assert!(ctx.database_name().len() <= DATABASE_IDENT_MAX + stamp_len);
        assert!(ctx.database_username().len() <= DATABASE_IDENT_MAX + stamp_len);
        assert!(ctx.site_username().len() <= SITE_USERNAME_MAX);
    }

    #[test]
    fn slugs_are_identifier_safe() {
        let mut ctx = ProvisioningContext::new("My-Site", "staging.example.com");
        let name = ctx.database_name();
        assert!(
            name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
            "unexpected character in {}",
            name
        );
    }

    #[test]
    fn passwords_have_their_fixed_lengths_and_are_independent() {
        let mut ctx = context();
        let db = ctx.database_password();
        let admin = ctx.admin_password();
        assert_eq!(db.len(), 32);
        assert_eq!(admin.len(), 9);
        assert_ne!(db, admin);
        assert!(db.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn admin_identity_derives_from_the_project() {
        let mut ctx = context();
        assert_eq!(ctx.admin_username(), "demo_admin");
        assert_eq!(ctx.admin_email(), "admin@demo.staging.example.com");
    }

    #[test]
    fn unresolved_values_error_instead_of_panicking() {
        let ctx = context();
        assert!(ctx.server_id().is_err());
        assert!(ctx.site().is_err());
        assert!(ctx.repository().is_err());
    }
}
