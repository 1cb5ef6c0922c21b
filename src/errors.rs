//! Error kinds raised by the pipeline and the process exit codes they map to.

use std::path::PathBuf;

use thiserror::Error;
use tracing::error;

/// Failures that callers need to tell apart from generic I/O errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The settings file is missing, malformed, or fails validation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required input file does not exist.
    #[error("missing input: {}", .0.display())]
    MissingInput(PathBuf),

    /// No sample carries the requested label.
    #[error("cannot find sample `{0}` in the settings")]
    MissingSample(String),

    /// The scheduler could not be reached, or it answered in a format we do
    /// not recognize.
    #[error("scheduler communication error: {0}")]
    SchedulerCommunication(String),

    /// Waiting on a job stopped before the scheduler reported it finished.
    #[error("stopped waiting on job {handle}: {reason}")]
    WaitInterrupted {
        /// The job that was still present.
        handle: String,
        /// Why waiting stopped (timeout or cancellation).
        reason: String,
    },
}

/// Process exit codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitCode {
    /// Any failure without a more specific code.
    Failure = 1,

    /// The settings could not be loaded or validated.
    InvalidConfiguration = 2,

    /// `--run-on-sample` named a label that does not exist.
    MissingSample = 3,
}

impl ExitCode {
    /// Picks the exit code for an error by looking for a [`PipelineError`]
    /// anywhere in its chain.
    pub fn for_error(err: &anyhow::Error) -> Self {
        let kind = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<PipelineError>());

        match kind {
            Some(PipelineError::Configuration(_)) => ExitCode::InvalidConfiguration,
            Some(PipelineError::MissingSample(_)) => ExitCode::MissingSample,
            _ => ExitCode::Failure,
        }
    }
}

/// Logs the message at the error level and exits with the given code.
pub fn exit<M>(message: M, code: ExitCode) -> !
where
    M: std::fmt::Display,
{
    error!("{}", message);
    std::process::exit(code as i32);
}
