//! Running jobs on the current machine.

use std::fs::File;
use std::path::Path;
use std::process::Command;
use std::process::Stdio;

use anyhow::Context;
use tracing::warn;

use super::JobHandle;
use super::Scheduler;

/// Runs each job script with `bash` to completion at submission time, so a
/// job is already gone by the time anyone asks about it. The script's
/// combined output is written next to it with a `.log` extension.
#[derive(Clone, Debug, Default)]
pub struct Local {
    submitted: usize,
}

impl Scheduler for Local {
    fn submit(&mut self, script: &Path) -> anyhow::Result<JobHandle> {
        let log_path = script.with_extension("log");
        let log = File::create(&log_path)
            .with_context(|| format!("creating job log: {}", log_path.display()))?;
        let log_err = log
            .try_clone()
            .with_context(|| format!("opening job log: {}", log_path.display()))?;

        let status = Command::new("bash")
            .arg(script)
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .status()
            .with_context(|| format!("running job script {}", script.display()))?;

        if !status.success() {
            warn!(
                "job script {} exited unsuccessfully ({}); see {}",
                script.display(),
                status,
                log_path.display()
            );
        }

        self.submitted += 1;
        Ok(JobHandle::new(format!("local-{}", self.submitted)))
    }

    fn is_present(&mut self, _: &JobHandle) -> anyhow::Result<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_job_runs_at_submission() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("job.1.sh");
        let marker = dir.path().join("marker");
        fs::write(&script, format!("echo ran > '{}'\necho hello\n", marker.display())).unwrap();

        let mut local = Local::default();
        let handle = local.submit(&script).unwrap();

        assert!(marker.exists());
        assert!(!local.is_present(&handle).unwrap());
        assert_eq!(
            fs::read_to_string(dir.path().join("job.1.log")).unwrap(),
            "hello\n"
        );
    }
}
