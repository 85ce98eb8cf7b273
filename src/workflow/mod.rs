//! Provisioning workflow engine
//!
//! A workflow is an ordered list of named steps over one mutable state
//! value. Steps are plain function pointers captured at construction time,
//! so the full sequence is visible as data before anything runs. Execution
//! is strictly sequential and fail-fast: the first step that errors aborts
//! the run, and no later step starts. Timing is recorded per step and for
//! the whole run.

pub mod context;
pub mod local;
pub mod remote;

pub use context::ProvisioningContext;

use crate::error::{ProvisionError, Result};
use colored::Colorize;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

/// Future returned by a step action, borrowing the workflow state
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a>>;

/// A step action: one side-effecting operation over the workflow state
pub type StepFn<W> = for<'a> fn(&'a mut W) -> StepFuture<'a>;

/// One named, ordered unit of provisioning work
pub struct Step<W> {
    name: &'static str,
    run: StepFn<W>,
}

impl<W> Step<W> {
    pub fn new(name: &'static str, run: StepFn<W>) -> Self {
        Self { name, run }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Timing for one completed step
#[derive(Debug, Clone)]
pub struct StepReport {
    pub name: &'static str,
    pub elapsed: Duration,
}

/// Outcome of a fully successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
    pub total: Duration,
}

/// Execute the steps in declared order against the shared state.
///
/// A step never begins before all prior steps have completed successfully.
/// On failure the error is wrapped with the failing step's 1-based index
/// and name; elapsed time up to that point has already been printed. The
/// total elapsed time is reported only after every step succeeds.
pub async fn execute<W>(state: &mut W, steps: Vec<Step<W>>) -> Result<RunReport> {
    let started = Instant::now();
    let total_steps = steps.len();
    let mut reports = Vec::with_capacity(total_steps);

    for (index, step) in steps.into_iter().enumerate() {
        let position = index + 1;
        println!(
            "{} [{}/{}] {}",
            "→".cyan(),
            position,
            total_steps,
            step.name
        );

        let step_started = Instant::now();
        match (step.run)(state).await {
            Ok(()) => {
                let elapsed = step_started.elapsed();
                println!(
                    "{} {} {}",
                    "✓".green(),
                    step.name,
                    format!("({:.1}s)", elapsed.as_secs_f64()).dimmed()
                );
                reports.push(StepReport {
                    name: step.name,
                    elapsed,
                });
            }
            Err(source) => {
                let elapsed = step_started.elapsed();
                println!(
                    "{} {} {}",
                    "✗".red(),
                    step.name,
                    format!("(failed after {:.1}s)", elapsed.as_secs_f64()).dimmed()
                );
                return Err(ProvisionError::Step {
                    index: position,
                    name: step.name.to_string(),
                    source: Box::new(source),
                });
            }
        }
    }

    let total = started.elapsed();
    println!(
        "\n{} {} steps completed in {:.1}s",
        "✓".green().bold(),
        total_steps,
        total.as_secs_f64()
    );
    Ok(RunReport {
        steps: reports,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Trace {
        executed: Vec<&'static str>,
    }

    fn record_first(state: &mut Trace) -> StepFuture<'_> {
        Box::pin(async move {
            state.executed.push("first");
            Ok(())
        })
    }

    fn record_second(state: &mut Trace) -> StepFuture<'_> {
        Box::pin(async move {
            state.executed.push("second");
            Ok(())
        })
    }

    fn blow_up(state: &mut Trace) -> StepFuture<'_> {
        Box::pin(async move {
            state.executed.push("third");
            Err(ProvisionError::Verification("postcondition not met".to_string()))
        })
    }

    fn record_fourth(state: &mut Trace) -> StepFuture<'_> {
        Box::pin(async move {
            state.executed.push("fourth");
            Ok(())
        })
    }

    fn record_fifth(state: &mut Trace) -> StepFuture<'_> {
        Box::pin(async move {
            state.executed.push("fifth");
            Ok(())
        })
    }

    #[tokio::test]
    async fn all_steps_run_in_declared_order() {
        let mut trace = Trace::default();
        let report = execute(
            &mut trace,
            vec![
                Step::new("one", record_first),
                Step::new("two", record_second),
            ],
        )
        .await
        .unwrap();

        assert_eq!(trace.executed, vec!["first", "second"]);
        assert_eq!(report.steps.len(), 2);
        assert_eq!(report.steps[0].name, "one");
    }

    #[tokio::test]
    async fn failure_halts_the_run_and_names_the_step() {
        let mut trace = Trace::default();
        let err = execute(
            &mut trace,
            vec![
                Step::new("one", record_first),
                Step::new("two", record_second),
                Step::new("three", blow_up),
                Step::new("four", record_fourth),
                Step::new("five", record_fifth),
            ],
        )
        .await
        .unwrap_err();

        // Steps 1-2 ran, step 3 failed, steps 4-5 never started
        assert_eq!(trace.executed, vec!["first", "second", "third"]);
        match err {
            ProvisionError::Step { index, name, .. } => {
                assert_eq!(index, 3);
                assert_eq!(name, "three");
            }
            other => panic!("expected step failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_workflows_succeed_immediately() {
        let mut trace = Trace::default();
        let report = execute(&mut trace, Vec::<Step<Trace>>::new()).await.unwrap();
        assert!(report.steps.is_empty());
        assert!(trace.executed.is_empty());
    }
}
