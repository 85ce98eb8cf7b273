//! Network-resilient repository cloning
//!
//! Private-theme cloning is the highest-variance step of a provisioning run:
//! it depends on the operator's network, credentials, and transport. The
//! strategy here is an explicit ordered-attempt loop rather than exception
//! chaining: probe connectivity once, then try each transport in priority
//! order with a cheap access pre-check before committing to a full clone.
//! The first success wins; exhaustion surfaces the last diagnostic plus a
//! troubleshooting checklist.

use crate::error::{ProvisionError, Result};
use crate::runner::{CommandRunner, OutputMode};
use log::{info, warn};
use std::path::Path;
use std::time::Duration;

const CONNECTIVITY_PROBE_URL: &str = "https://github.com";
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(10);
const ACCESS_CHECK_TIMEOUT: Duration = Duration::from_secs(30);
const CLONE_TIMEOUT: Duration = Duration::from_secs(300);

/// Substrings that mark an authentication failure in git's stderr
const AUTH_FAILURE_MARKERS: &[&str] = &[
    "Username",
    "Authentication",
    "Permission denied",
    "publickey",
    "access rights",
];

/// One endpoint form for fetching the same logical repository
#[derive(Debug, Clone)]
pub struct CloneTransport {
    pub label: &'static str,
    pub endpoint: String,
}

/// Candidate transports in fixed priority order: HTTPS first, SSH second
pub fn transports_for(repository: &str) -> Vec<CloneTransport> {
    vec![
        CloneTransport {
            label: "HTTPS",
            endpoint: format!("https://github.com/{}.git", repository),
        },
        CloneTransport {
            label: "SSH",
            endpoint: format!("git@github.com:{}.git", repository),
        },
    ]
}

/// Outcome of one clone attempt over one transport
#[derive(Debug)]
pub enum CloneOutcome {
    Cloned,
    /// The endpoint could not be reached or refused the pre-check for a
    /// non-authentication reason
    Unreachable { diagnostic: String },
    /// The pre-check or clone failed in an authentication-shaped way
    AccessDenied { diagnostic: String },
    /// The clone itself failed, or its result did not verify
    CloneFailed {
        exit_code: Option<i32>,
        diagnostic: String,
    },
}

/// Heuristic: does this error text look like an authentication failure?
pub fn looks_like_authentication_failure(text: &str) -> bool {
    AUTH_FAILURE_MARKERS.iter().any(|marker| text.contains(marker))
}

fn classify_clone_failure(exit_code: Option<i32>, output: &str) -> CloneOutcome {
    if looks_like_authentication_failure(output) {
        CloneOutcome::AccessDenied {
            diagnostic: output.trim().to_string(),
        }
    } else {
        CloneOutcome::CloneFailed {
            exit_code,
            diagnostic: output.trim().to_string(),
        }
    }
}

/// Clone `repository` into `destination`, falling back across transports.
///
/// Succeeds silently from the caller's perspective as soon as any transport
/// works; only the failed attempts' warnings are visible.
pub async fn clone_repository(
    runner: &CommandRunner,
    repository: &str,
    destination: &Path,
) -> Result<()> {
    probe_connectivity().await?;

    let transports = transports_for(repository);
    let mut last_diagnostic = String::from("no transport was attempted");

    for transport in &transports {
        info!("cloning via {}: {}", transport.label, transport.endpoint);
        match attempt(runner, transport, destination).await? {
            CloneOutcome::Cloned => {
                info!("cloned {} into {}", repository, destination.display());
                return Ok(());
            }
            CloneOutcome::AccessDenied { diagnostic } => {
                warn!(
                    "{} transport needs authentication: {}",
                    transport.label, diagnostic
                );
                warn!(
                    "set up an SSH key, use an access token, or run `gh auth login`, then re-run"
                );
                last_diagnostic = format!("authentication required: {}", diagnostic);
            }
            CloneOutcome::Unreachable { diagnostic } => {
                warn!(
                    "{} endpoint not accessible: {}",
                    transport.label, diagnostic
                );
                last_diagnostic = format!("endpoint not accessible: {}", diagnostic);
            }
            CloneOutcome::CloneFailed {
                exit_code,
                diagnostic,
            } => {
                warn!(
                    "{} clone failed (exit code {}): {}",
                    transport.label,
                    exit_code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string()),
                    diagnostic
                );
                last_diagnostic = format!(
                    "clone failed with exit code {}: {}",
                    exit_code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string()),
                    diagnostic
                );
            }
        }
    }

    Err(ProvisionError::CloneExhausted {
        repository: repository.to_string(),
        diagnostic: last_diagnostic,
    })
}

/// Lightweight reachability probe; aborts the whole strategy when the
/// hosting provider cannot be reached at all
async fn probe_connectivity() -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(CONNECTIVITY_TIMEOUT)
        .user_agent(concat!("wpforge-cli/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ProvisionError::Api(e.into()))?;

    match client.head(CONNECTIVITY_PROBE_URL).send().await {
        Ok(_) => Ok(()),
        Err(e) => Err(ProvisionError::Connectivity(format!(
            "could not reach {}: {}",
            CONNECTIVITY_PROBE_URL, e
        ))),
    }
}

async fn attempt(
    runner: &CommandRunner,
    transport: &CloneTransport,
    destination: &Path,
) -> Result<CloneOutcome> {
    // Access pre-check: a remote listing detects authentication problems
    // cheaply, before committing to a full clone
    let check = runner
        .clone()
        .output_mode(OutputMode::Suppress)
        .with_timeout(ACCESS_CHECK_TIMEOUT)
        .run(&[format!("git ls-remote {} HEAD", transport.endpoint)])
        .await?;
    if !check.succeeded {
        if looks_like_authentication_failure(&check.output) {
            return Ok(CloneOutcome::AccessDenied {
                diagnostic: check.output.trim().to_string(),
            });
        }
        return Ok(CloneOutcome::Unreachable {
            diagnostic: check.output.trim().to_string(),
        });
    }

    // A pre-existing partial clone poisons `git clone`
    if destination.exists() {
        std::fs::remove_dir_all(destination)?;
    }

    let clone = runner
        .clone()
        .with_timeout(CLONE_TIMEOUT)
        .run(&[format!(
            "git clone {} {}",
            transport.endpoint,
            destination.display()
        )])
        .await?;
    if !clone.succeeded {
        remove_partial(destination);
        return Ok(classify_clone_failure(clone.exit_code, &clone.output));
    }

    // A clone that "succeeded" without version-control metadata is not a
    // clone; never accept a partially-written directory as output
    if !destination.join(".git").is_dir() {
        remove_partial(destination);
        return Ok(CloneOutcome::CloneFailed {
            exit_code: clone.exit_code,
            diagnostic: format!(
                "{} exists but contains no .git metadata directory",
                destination.display()
            ),
        });
    }

    Ok(CloneOutcome::Cloned)
}

fn remove_partial(destination: &Path) {
    if destination.exists() {
        if let Err(e) = std::fs::remove_dir_all(destination) {
            warn!(
                "could not remove partial clone at {}: {}",
                destination.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transports_are_ordered_https_then_ssh() {
        let transports = transports_for("acme/starter-theme");
        assert_eq!(transports.len(), 2);
        assert_eq!(transports[0].label, "HTTPS");
        assert_eq!(
            transports[0].endpoint,
            "https://github.com/acme/starter-theme.git"
        );
        assert_eq!(transports[1].label, "SSH");
        assert_eq!(transports[1].endpoint, "git@github.com:acme/starter-theme.git");
    }

    #[test]
    fn authentication_failures_are_recognized() {
        assert!(looks_like_authentication_failure(
            "fatal: could not read Username for 'https://github.com': terminal prompts disabled"
        ));
        assert!(looks_like_authentication_failure(
            "fatal: Authentication failed for 'https://github.com/acme/theme.git/'"
        ));
        assert!(looks_like_authentication_failure(
            "git@github.com: Permission denied (publickey)."
        ));
    }

    #[test]
    fn unrelated_failures_are_not_authentication() {
        assert!(!looks_like_authentication_failure(
            "fatal: unable to access: Could not resolve host: github.com"
        ));
        assert!(!looks_like_authentication_failure(""));
    }

    #[test]
    fn clone_failures_classify_by_error_shape() {
        match classify_clone_failure(Some(128), "fatal: Authentication failed") {
            CloneOutcome::AccessDenied { .. } => {}
            other => panic!("expected access denied, got {:?}", other),
        }
        match classify_clone_failure(Some(128), "fatal: early EOF") {
            CloneOutcome::CloneFailed { exit_code, .. } => assert_eq!(exit_code, Some(128)),
            other => panic!("expected clone failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_access_checks_do_not_reach_the_clone() {
        // `git ls-remote` against a local path that does not exist fails
        // fast; the destination must stay untouched
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("theme");
        let runner = CommandRunner::new(crate::runner::Decoration::Full)
            .output_mode(OutputMode::Suppress);
        let transport = CloneTransport {
            label: "HTTPS",
            endpoint: dir.path().join("missing-repo.git").display().to_string(),
        };
        let outcome = attempt(&runner, &transport, &destination).await.unwrap();
        match outcome {
            CloneOutcome::Unreachable { .. } | CloneOutcome::AccessDenied { .. } => {}
            other => panic!("expected a pre-check failure, got {:?}", other),
        }
        assert!(!destination.exists());
    }
}
