//! # WPForge CLI
//!
//! A Rust-based command-line application that provisions local, staging,
//! and production WordPress environments: it sequences WP-CLI, git, and npm
//! pipelines together with a server-provisioning API, a DNS API, and a
//! source-hosting content API to take a bare subdomain to a running site.
//!
//! ## How a run works
//!
//! - **Derivation**: resource names and credentials are derived once from
//!   the project identifier and memoized for the whole run
//! - **Sequencing**: each workflow is an ordered list of named steps that
//!   executes strictly in order and aborts on the first failure
//! - **Resolution**: required configuration is filled on demand - missing
//!   keys are prompted for once and persisted for every later run
//!
//! ## Example
//!
//! ```rust,no_run
//! use wpforge_cli::workflow::{self, local::LocalProvisioner};
//! # async fn run(mut provisioner: LocalProvisioner) -> wpforge_cli::Result<()> {
//! workflow::execute(&mut provisioner, LocalProvisioner::steps()).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod handlers;
pub mod runner;
pub mod workflow;

// Re-export commonly used types
pub use error::{ProvisionError, Result};

/// The current version of the CLI tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
