//! Error types for the provisioning CLI
//!
//! One top-level error with a variant per failure class. Step failures wrap
//! the underlying cause together with the 1-based index and name of the step
//! that raised it, so the operator always learns which numbered step aborted
//! the run.

use std::path::PathBuf;
use thiserror::Error;

use crate::api::ApiError;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Errors that can abort a provisioning run
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Filesystem or process-spawn failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration store failure (read/write/parse)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An external API rejected or failed a request
    #[error(transparent)]
    Api(#[from] ApiError),

    /// An interactive prompt failed for a reason other than cancellation
    #[error("prompt failed: {0}")]
    Prompt(String),

    /// The operator cancelled an interactive prompt
    #[error("operation cancelled")]
    Cancelled,

    /// A shell pipeline exited non-zero
    #[error("command exited with status {}: {command}", .exit_code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    Subprocess {
        /// The joined pipeline that was executed
        command: String,
        /// Exit code, if the process was not killed by a signal
        exit_code: Option<i32>,
    },

    /// A step postcondition was not met even though its commands succeeded
    #[error("verification failed: {0}")]
    Verification(String),

    /// Pre-flight network probe failed; nothing was attempted
    #[error("no internet connection: {0}")]
    Connectivity(String),

    /// Access was denied by a remote endpoint
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Every clone transport was tried and none succeeded
    #[error(
        "all clone transports failed for {repository}\nlast failure: {diagnostic}\n\n\
         Troubleshooting checklist:\n  \
         1. Check your internet connection\n  \
         2. Confirm you can open https://github.com/{repository} in a browser\n  \
         3. Corporate firewalls and proxies often block git transports\n  \
         4. Try cloning by hand: git clone https://github.com/{repository}.git\n  \
         5. Generate an SSH key and add it to your hosting account: ssh-keygen -t ed25519\n  \
         6. Authenticate the GitHub CLI: gh auth login"
    )]
    CloneExhausted {
        /// `owner/name` coordinate of the repository
        repository: String,
        /// Captured diagnostics from the final attempt
        diagnostic: String,
    },

    /// A step read a context value no earlier step has produced
    #[error("{0} has not been resolved yet")]
    Unresolved(&'static str),

    /// A workflow step failed; carries the failing step's position and name
    #[error("step {index} ({name}) failed: {source}")]
    Step {
        index: usize,
        name: String,
        #[source]
        source: Box<ProvisionError>,
    },
}

impl ProvisionError {
    /// Exit code the process should terminate with for this error.
    ///
    /// Subprocess failures propagate the child's exit code so calling
    /// scripts can distinguish them; everything else is a generic 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProvisionError::Subprocess {
                exit_code: Some(code),
                ..
            } => *code,
            ProvisionError::Step { source, .. } => source.exit_code(),
            _ => 1,
        }
    }
}

/// Errors raised by the configuration store
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {} is not valid TOML: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write config file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("no home directory available to locate the configuration file")]
    NoHome,

    #[error("unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("{0} is managed automatically and cannot be edited")]
    ReservedKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subprocess_exit_code_is_propagated() {
        let err = ProvisionError::Subprocess {
            command: "wp core install".to_string(),
            exit_code: Some(3),
        };
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn step_failures_propagate_inner_exit_code() {
        let err = ProvisionError::Step {
            index: 4,
            name: "Installing WordPress".to_string(),
            source: Box::new(ProvisionError::Subprocess {
                command: "wp core install".to_string(),
                exit_code: Some(7),
            }),
        };
        assert_eq!(err.exit_code(), 7);
        assert!(err.to_string().contains("step 4"));
        assert!(err.to_string().contains("Installing WordPress"));
    }

    #[test]
    fn non_subprocess_errors_exit_with_one() {
        let err = ProvisionError::Verification("missing .git directory".to_string());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn clone_exhaustion_lists_the_checklist_in_order() {
        let err = ProvisionError::CloneExhausted {
            repository: "acme/starter-theme".to_string(),
            diagnostic: "exit code 128".to_string(),
        };
        let message = err.to_string();
        let connectivity = message.find("internet connection").unwrap();
        let manual = message.find("cloning by hand").unwrap();
        let ssh = message.find("ssh-keygen").unwrap();
        assert!(connectivity < manual && manual < ssh);
        assert!(message.contains("git clone https://github.com/acme/starter-theme.git"));
    }
}
