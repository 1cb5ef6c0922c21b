//! Offloading work to a batch-job scheduler.
//!
//! The [`Dispatcher`] writes a job script for a [`CommandLine`], hands it to a
//! [`Scheduler`], and later polls the scheduler until the job no longer
//! appears in its state. The scheduler never tells us whether a job
//! succeeded; a job that disappeared is simply finished, and a failed job is
//! noticed when its expected output is missing.
//!
//! By default waiting blocks until every job is gone, however long that
//! takes. [`WaitOptions`] adds an optional timeout and a
//! [`CancellationToken`] for callers that need a way out.

pub mod local;
pub mod script;
pub mod sge;

use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use anyhow::bail;
use tracing::debug;
use tracing::info;

use crate::cache;
use crate::cache::Outcome;
use crate::config::ClusterType;
use crate::errors::PipelineError;
use crate::utils::command::CommandLine;

use self::script::JobScript;

/// The scheduler's identifier for a submitted job. Only ever used to ask the
/// scheduler about the job again.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct JobHandle(String);

impl JobHandle {
    /// Wraps a scheduler-assigned identifier.
    pub fn new<S>(id: S) -> Self
    where
        S: Into<String>,
    {
        Self(id.into())
    }

    /// The identifier as the scheduler reported it.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A batch-job scheduler.
pub trait Scheduler {
    /// Submits the job script at `script` and returns the job's handle.
    fn submit(&mut self, script: &Path) -> anyhow::Result<JobHandle>;

    /// Whether the scheduler still knows about the job. Errors only when the
    /// scheduler cannot be asked at all.
    fn is_present(&mut self, handle: &JobHandle) -> anyhow::Result<bool>;
}

impl<S> Scheduler for Box<S>
where
    S: Scheduler + ?Sized,
{
    fn submit(&mut self, script: &Path) -> anyhow::Result<JobHandle> {
        (**self).submit(script)
    }

    fn is_present(&mut self, handle: &JobHandle) -> anyhow::Result<bool> {
        (**self).is_present(handle)
    }
}

/// Creates the scheduler for a cluster type.
pub fn scheduler_for(cluster_type: ClusterType) -> Box<dyn Scheduler> {
    match cluster_type {
        ClusterType::Sge => Box::new(sge::Sge::default()),
        ClusterType::Local => Box::new(local::Local::default()),
    }
}

/// A flag that asks a waiting [`Dispatcher`] to stop. Clones share the flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How [`Dispatcher::wait_all`] waits.
#[derive(Clone, Debug)]
pub struct WaitOptions {
    /// Pause between two polls of a job that is still present.
    pub interval: Duration,

    /// Give up once this much time has passed since waiting started. `None`
    /// waits forever.
    pub timeout: Option<Duration>,

    /// Give up once this token is cancelled.
    pub cancel: Option<CancellationToken>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: None,
            cancel: None,
        }
    }
}

/// What happened while waiting.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WaitSummary {
    /// How many times a job was found still present (and waited on).
    pub polls: usize,
}

/// Submits commands as scheduler jobs and waits for them to finish.
pub struct Dispatcher<S = Box<dyn Scheduler>> {
    scheduler: S,
    logs_dir: PathBuf,
    working_dir: PathBuf,
    wait: WaitOptions,
}

impl<S> Dispatcher<S>
where
    S: Scheduler,
{
    /// Creates a dispatcher that writes job scripts to `logs_dir` and runs
    /// jobs from `working_dir`.
    pub fn new<L, W>(scheduler: S, logs_dir: L, working_dir: W) -> Self
    where
        L: Into<PathBuf>,
        W: Into<PathBuf>,
    {
        Self {
            scheduler,
            logs_dir: logs_dir.into(),
            working_dir: working_dir.into(),
            wait: WaitOptions::default(),
        }
    }

    /// Replaces the wait options.
    pub fn with_wait_options(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    /// The scheduler jobs are submitted to.
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Submits `command` as a job named `name` without waiting for it.
    pub fn submit_async(&mut self, command: &CommandLine, name: &str) -> anyhow::Result<JobHandle> {
        let script = JobScript::new(name, command, &self.logs_dir, &self.working_dir);
        let script_path = self
            .logs_dir
            .join(format!("{}.{}.sh", name, std::process::id()));
        script.write(&script_path)?;

        debug!("Submitting {}: {}", name, command);
        let handle = self.scheduler.submit(&script_path)?;
        info!("Submitted job {} ({})", name, handle);

        Ok(handle)
    }

    /// Blocks until the scheduler no longer reports any of `handles`.
    /// Handles are polled one after the other, each until it disappears.
    pub fn wait_all(&mut self, handles: &[JobHandle]) -> anyhow::Result<WaitSummary> {
        let started = Instant::now();
        let mut summary = WaitSummary::default();

        for handle in handles {
            info!("Waiting on job {}", handle);

            while self.scheduler.is_present(handle)? {
                if let Some(token) = &self.wait.cancel {
                    if token.is_cancelled() {
                        bail!(PipelineError::WaitInterrupted {
                            handle: handle.to_string(),
                            reason: String::from("cancelled"),
                        });
                    }
                }

                if let Some(timeout) = self.wait.timeout {
                    if started.elapsed() >= timeout {
                        bail!(PipelineError::WaitInterrupted {
                            handle: handle.to_string(),
                            reason: format!("timed out after {:?}", timeout),
                        });
                    }
                }

                thread::sleep(self.wait.interval);
                summary.polls += 1;
            }

            debug!("Job {} is done", handle);
        }

        Ok(summary)
    }

    /// Submits `command` and waits for it. If `skip_if_exists` names a path
    /// that already exists, nothing is submitted.
    pub fn submit_and_wait(
        &mut self,
        command: &CommandLine,
        name: &str,
        skip_if_exists: Option<&Path>,
    ) -> anyhow::Result<Outcome> {
        let mut run = || -> anyhow::Result<()> {
            let handle = self.submit_async(command, name)?;
            self.wait_all(&[handle])?;
            Ok(())
        };

        match skip_if_exists {
            Some(target) => cache::cached(target, |_| run()),
            None => run().map(|_| Outcome::Produced),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::utils::command::Invocation;

    use super::*;

    /// Reports every job as present for a fixed number of polls.
    #[derive(Default)]
    struct FakeScheduler {
        present_for: usize,
        submitted: Vec<PathBuf>,
        queries: HashMap<String, usize>,
    }

    impl Scheduler for FakeScheduler {
        fn submit(&mut self, script: &Path) -> anyhow::Result<JobHandle> {
            self.submitted.push(script.to_path_buf());
            Ok(JobHandle::new(self.submitted.len().to_string()))
        }

        fn is_present(&mut self, handle: &JobHandle) -> anyhow::Result<bool> {
            let seen = self.queries.entry(handle.to_string()).or_insert(0);
            *seen += 1;
            Ok(*seen <= self.present_for)
        }
    }

    fn dispatcher(present_for: usize, dir: &Path) -> Dispatcher<FakeScheduler> {
        let scheduler = FakeScheduler {
            present_for,
            ..Default::default()
        };

        Dispatcher::new(scheduler, dir, dir).with_wait_options(WaitOptions {
            interval: Duration::from_millis(1),
            ..Default::default()
        })
    }

    fn command() -> CommandLine {
        CommandLine::new(Invocation::new("true"))
    }

    #[test]
    fn test_wait_all_returns_after_job_disappears() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = dispatcher(2, dir.path());

        let summary = dispatcher.wait_all(&[JobHandle::new("H")]).unwrap();
        assert_eq!(summary.polls, 2);
        assert_eq!(dispatcher.scheduler().queries["H"], 3);
    }

    #[test]
    fn test_wait_all_polls_each_handle() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = dispatcher(1, dir.path());

        let handles = [JobHandle::new("1"), JobHandle::new("2")];
        let summary = dispatcher.wait_all(&handles).unwrap();
        assert_eq!(summary.polls, 2);
    }

    #[test]
    fn test_wait_all_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = dispatcher(usize::MAX, dir.path()).with_wait_options(WaitOptions {
            interval: Duration::from_millis(1),
            timeout: Some(Duration::ZERO),
            cancel: None,
        });

        let err = dispatcher.wait_all(&[JobHandle::new("H")]).unwrap_err();
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::WaitInterrupted { handle, .. }) => assert_eq!(handle, "H"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_wait_all_can_be_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let mut dispatcher = dispatcher(usize::MAX, dir.path()).with_wait_options(WaitOptions {
            interval: Duration::from_millis(1),
            timeout: None,
            cancel: Some(token.clone()),
        });

        token.cancel();
        assert!(dispatcher.wait_all(&[JobHandle::new("H")]).is_err());
    }

    #[test]
    fn test_cancelled_token_ignored_for_finished_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let mut dispatcher = dispatcher(0, dir.path()).with_wait_options(WaitOptions {
            cancel: Some(token),
            ..Default::default()
        });

        assert!(dispatcher.wait_all(&[JobHandle::new("H")]).is_ok());
    }

    #[test]
    fn test_submit_async_writes_a_script() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = dispatcher(0, dir.path());

        let handle = dispatcher.submit_async(&command(), "map_A").unwrap();
        assert_eq!(handle, JobHandle::new("1"));

        let script = &dispatcher.scheduler().submitted[0];
        assert_eq!(
            script.file_name().unwrap().to_str().unwrap(),
            format!("map_A.{}.sh", std::process::id())
        );
        assert!(std::fs::read_to_string(script).unwrap().contains("#$ -N map_A"));
    }

    #[test]
    fn test_submit_and_wait_skips_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("A.bam");
        let mut dispatcher = dispatcher(1, dir.path());

        let outcome = dispatcher
            .submit_and_wait(&command(), "map_A", Some(&target))
            .unwrap();
        assert_eq!(outcome, Outcome::Produced);

        std::fs::write(&target, b"").unwrap();
        let outcome = dispatcher
            .submit_and_wait(&command(), "map_A", Some(&target))
            .unwrap();
        assert_eq!(outcome, Outcome::Reused);
        assert_eq!(dispatcher.scheduler().submitted.len(), 1);
    }
}
