//! Sun Grid Engine, driven through `qsub` and `qstat`.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;
use std::process::Output;
use std::sync::OnceLock;

use anyhow::Context;
use regex::Regex;

use super::JobHandle;
use super::Scheduler;
use crate::errors::PipelineError;
use crate::utils::command::Invocation;

/// What `qstat -j` prints to stderr for a job it no longer knows.
const JOB_GONE: &str = "Following jobs do not exist";

/// Submits with `qsub` and polls with `qstat -j <id>`.
#[derive(Clone, Debug)]
pub struct Sge {
    qsub: Invocation,
    qstat: Invocation,
}

impl Default for Sge {
    fn default() -> Self {
        Self {
            qsub: Invocation::new("qsub"),
            qstat: Invocation::new("qstat"),
        }
    }
}

impl Sge {
    /// Uses the given invocations in place of plain `qsub` and `qstat`. The
    /// script path, or `-j <id>`, is appended to them.
    pub fn with_programs(qsub: Invocation, qstat: Invocation) -> Self {
        Self { qsub, qstat }
    }
}

fn run(invocation: &Invocation, extra: &[&OsStr]) -> Result<Output, PipelineError> {
    Command::new(invocation.program())
        .args(invocation.arguments())
        .args(extra)
        .output()
        .map_err(|e| {
            PipelineError::SchedulerCommunication(format!(
                "launching `{}`: {}",
                invocation.program(),
                e
            ))
        })
}

/// Extracts the job id from `qsub`'s acknowledgment, e.g.
/// `Your job 4711 ("pipeline_run_A") has been submitted`.
pub fn parse_acknowledgment(ack: &str) -> Result<JobHandle, PipelineError> {
    static ACK: OnceLock<Regex> = OnceLock::new();
    let re = ACK.get_or_init(|| Regex::new(r"^Your job (\d+)").unwrap());

    re.captures(ack.trim_start())
        .and_then(|captures| captures.get(1))
        .map(|id| JobHandle::new(id.as_str()))
        .ok_or_else(|| {
            PipelineError::SchedulerCommunication(format!(
                "unrecognized qsub acknowledgment: {:?}",
                ack.trim()
            ))
        })
}

impl Scheduler for Sge {
    fn submit(&mut self, script: &Path) -> anyhow::Result<JobHandle> {
        let output = run(&self.qsub, &[script.as_os_str()])?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        parse_acknowledgment(&stdout)
            .with_context(|| format!("submitting job script {}", script.display()))
    }

    fn is_present(&mut self, handle: &JobHandle) -> anyhow::Result<bool> {
        let output = run(&self.qstat, &[OsStr::new("-j"), OsStr::new(handle.as_str())])?;

        // Anything other than the explicit "gone" answer, including errors,
        // counts as still running.
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(!stderr.contains(JOB_GONE))
    }
}
