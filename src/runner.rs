//! Shell command runner
//!
//! Executes an ordered list of command lines as one logical pipeline, joined
//! with `&&` so the shell stops on the first failure. Output is streamed
//! line-by-line as it is produced. A non-zero exit is reported in the
//! [`RunResult`], never raised as an error here; deciding that a failed
//! pipeline aborts the workflow is the sequencer's job.

use crate::error::{ProvisionError, Result};
use colored::Colorize;
use log::{debug, warn};
use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Commands that choke on the decoration flags and are left unmodified
pub const FLAG_EXEMPT_PREFIXES: &[&str] = &["chmod", "git"];

/// How each command line is augmented before execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoration {
    /// Interactive terminal: leave commands untouched
    Full,
    /// Non-interactive/non-color environment: append a no-decoration flag
    NoAnsi,
    /// Quiet preference: append a quiet flag instead
    Quiet,
}

impl Decoration {
    /// Pick the decoration from the quiet preference and the terminal
    pub fn detect(quiet: bool) -> Self {
        if quiet {
            Decoration::Quiet
        } else if std::io::stdout().is_terminal() {
            Decoration::Full
        } else {
            Decoration::NoAnsi
        }
    }

    fn flag(self) -> Option<&'static str> {
        match self {
            Decoration::Full => None,
            Decoration::NoAnsi => Some("--no-ansi"),
            Decoration::Quiet => Some("--quiet"),
        }
    }
}

/// Whether subprocess output reaches the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Stream each line as it is produced, prefixed for readability
    #[default]
    Stream,
    /// Capture only; nothing is printed
    Suppress,
}

/// Outcome of one pipeline run
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Exit code, absent when the process was killed (signal or timeout)
    pub exit_code: Option<i32>,
    pub succeeded: bool,
    /// Captured stdout and stderr, merged in arrival order
    pub output: String,
}

/// Executes shell pipelines with optional working-directory, environment,
/// and timeout overrides
#[derive(Debug, Clone)]
pub struct CommandRunner {
    working_dir: Option<PathBuf>,
    env: HashMap<String, String>,
    decoration: Decoration,
    output_mode: OutputMode,
    timeout: Option<Duration>,
}

impl CommandRunner {
    pub fn new(decoration: Decoration) -> Self {
        Self {
            working_dir: None,
            env: HashMap::new(),
            decoration,
            output_mode: OutputMode::Stream,
            timeout: None,
        }
    }

    /// Run commands from this directory
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment override for spawned processes
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    /// Kill the pipeline if it outlives this duration
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Join the command lines into the pipeline the shell will execute
    pub fn compose(&self, commands: &[String]) -> String {
        commands
            .iter()
            .map(|command| self.decorate(command))
            .collect::<Vec<_>>()
            .join(" && ")
    }

    fn decorate(&self, command: &str) -> String {
        let trimmed = command.trim();
        let Some(flag) = self.decoration.flag() else {
            return trimmed.to_string();
        };
        let exempt = FLAG_EXEMPT_PREFIXES
            .iter()
            .any(|prefix| trimmed == *prefix || trimmed.starts_with(&format!("{} ", prefix)));
        if exempt {
            trimmed.to_string()
        } else {
            format!("{} {}", trimmed, flag)
        }
    }

    /// Execute the pipeline, blocking until the underlying process exits.
    ///
    /// stdin stays attached to the controlling terminal so interactive
    /// sub-programs (credential prompts from wrapped tools) still function.
    pub async fn run(&self, commands: &[String]) -> Result<RunResult> {
        let pipeline = self.compose(commands);
        debug!("running: {}", pipeline);

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&pipeline)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command.envs(&self.env);

        let mut child = command.spawn()?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Fan both streams into one channel so lines appear in arrival order
        let (tx, mut rx) = mpsc::channel::<String>(100);

        if let Some(stdout) = stdout {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    let _ = tx.send(line).await;
                }
            });
        }

        if let Some(stderr) = stderr {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    let _ = tx.send(line).await;
                }
            });
        }
        drop(tx);

        let deadline = tokio::time::Instant::now()
            + self.timeout.unwrap_or(Duration::from_secs(60 * 60 * 24));
        let mut output = String::new();
        let mut timed_out = false;

        loop {
            tokio::select! {
                maybe_line = rx.recv() => {
                    match maybe_line {
                        Some(line) => {
                            if self.output_mode == OutputMode::Stream {
                                println!("{} {}", "│".dimmed(), line);
                            }
                            output.push_str(&line);
                            output.push('\n');
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep_until(deadline), if self.timeout.is_some() => {
                    warn!(
                        "pipeline exceeded {}s, killing: {}",
                        self.timeout.unwrap_or_default().as_secs(),
                        pipeline
                    );
                    let _ = child.start_kill();
                    timed_out = true;
                    break;
                }
            }
        }

        let status = child.wait().await?;
        if timed_out {
            return Ok(RunResult {
                exit_code: None,
                succeeded: false,
                output,
            });
        }

        Ok(RunResult {
            exit_code: status.code(),
            succeeded: status.success(),
            output,
        })
    }

    /// Execute the pipeline and turn a non-zero exit into a fatal error
    pub async fn run_checked(&self, commands: &[String]) -> Result<RunResult> {
        let result = self.run(commands).await?;
        if !result.succeeded {
            return Err(ProvisionError::Subprocess {
                command: self.compose(commands),
                exit_code: result.exit_code,
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_ansi_mode_decorates_every_command() {
        let runner = CommandRunner::new(Decoration::NoAnsi);
        let pipeline = runner.compose(&commands(&["echo a", "echo b"]));
        assert_eq!(pipeline, "echo a --no-ansi && echo b --no-ansi");
    }

    #[test]
    fn quiet_mode_appends_the_quiet_flag_instead() {
        let runner = CommandRunner::new(Decoration::Quiet);
        let pipeline = runner.compose(&commands(&["wp core download"]));
        assert_eq!(pipeline, "wp core download --quiet");
    }

    #[test]
    fn git_and_chmod_are_exempt_from_decoration() {
        let runner = CommandRunner::new(Decoration::NoAnsi);
        let pipeline = runner.compose(&commands(&[
            "git clone https://example.com/theme.git",
            "chmod +x deploy.sh",
            "wp theme activate custom",
        ]));
        assert_eq!(
            pipeline,
            "git clone https://example.com/theme.git && chmod +x deploy.sh && wp theme activate custom --no-ansi"
        );
    }

    #[test]
    fn exemption_matches_whole_words_only() {
        // "gitea" starts with "git" but is not the exempt command
        let runner = CommandRunner::new(Decoration::NoAnsi);
        let pipeline = runner.compose(&commands(&["gitea admin"]));
        assert_eq!(pipeline, "gitea admin --no-ansi");
    }

    #[test]
    fn interactive_mode_leaves_commands_untouched() {
        let runner = CommandRunner::new(Decoration::Full);
        let pipeline = runner.compose(&commands(&["echo a", "echo b"]));
        assert_eq!(pipeline, "echo a && echo b");
    }

    #[tokio::test]
    async fn run_captures_output_and_exit_code() {
        let runner = CommandRunner::new(Decoration::Full).output_mode(OutputMode::Suppress);
        let result = runner.run(&commands(&["echo hello"])).await.unwrap();
        assert!(result.succeeded);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.output.contains("hello"));
    }

    #[tokio::test]
    async fn run_reports_failure_without_erroring() {
        let runner = CommandRunner::new(Decoration::Full).output_mode(OutputMode::Suppress);
        let result = runner.run(&commands(&["exit 3"])).await.unwrap();
        assert!(!result.succeeded);
        assert_eq!(result.exit_code, Some(3));
    }

    #[tokio::test]
    async fn pipeline_stops_at_the_first_failing_command() {
        let runner = CommandRunner::new(Decoration::Full).output_mode(OutputMode::Suppress);
        let result = runner
            .run(&commands(&["echo first", "exit 1", "echo second"]))
            .await
            .unwrap();
        assert!(!result.succeeded);
        assert!(result.output.contains("first"));
        assert!(!result.output.contains("second"));
    }

    #[tokio::test]
    async fn run_checked_raises_subprocess_errors() {
        let runner = CommandRunner::new(Decoration::Full).output_mode(OutputMode::Suppress);
        let err = runner.run_checked(&commands(&["exit 2"])).await.unwrap_err();
        match err {
            ProvisionError::Subprocess { exit_code, .. } => assert_eq!(exit_code, Some(2)),
            other => panic!("expected subprocess error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn timed_out_pipelines_are_killed_and_reported() {
        let runner = CommandRunner::new(Decoration::Full)
            .output_mode(OutputMode::Suppress)
            .with_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let result = runner.run(&commands(&["sleep 5"])).await.unwrap();
        assert!(!result.succeeded);
        assert_eq!(result.exit_code, None);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn environment_overrides_reach_the_subprocess() {
        let runner = CommandRunner::new(Decoration::Full)
            .output_mode(OutputMode::Suppress)
            .with_env("WPFORGE_TEST_VALUE", "present");
        let result = runner
            .run(&commands(&["printenv WPFORGE_TEST_VALUE"]))
            .await
            .unwrap();
        assert!(result.output.contains("present"));
    }
}
