//! Idempotent "skip if the output exists" wrapper around every file-producing
//! pipeline step.
//!
//! Re-running the pipeline over an existing output directory must never redo
//! expensive work such as alignment. Each step therefore names its target
//! path up front and is only executed when that path is absent.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::utils::command::CommandLine;
use crate::utils::pathbuf::file_name_str;

/// What happened when a cached step was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The target was absent and the step ran.
    Produced,

    /// The target already existed and was reused as is.
    Reused,

    /// The step ran but did not leave a target behind.
    Failed,
}

/// Runs `produce` only if `target` does not exist yet. The closure receives
/// the target path and is expected to write it.
pub fn cached<F>(target: &Path, produce: F) -> anyhow::Result<Outcome>
where
    F: FnOnce(&Path) -> anyhow::Result<()>,
{
    if target.exists() {
        info!("Found {}, skipping.", target.display());
        return Ok(Outcome::Reused);
    }

    produce(target)?;
    Ok(Outcome::Produced)
}

/// Like [`cached`], but `produce` writes to a staging path next to `target`
/// which is renamed onto `target` only after `produce` succeeds. A failed step
/// leaves no partial target behind.
pub fn cached_staged<F>(target: &Path, produce: F) -> anyhow::Result<Outcome>
where
    F: FnOnce(&Path) -> anyhow::Result<()>,
{
    if target.exists() {
        info!("Found {}, skipping.", target.display());
        return Ok(Outcome::Reused);
    }

    let staging = staging_path(target)?;
    if staging.exists() {
        debug!("removing stale staging file: {}", staging.display());
        fs::remove_file(&staging)
            .with_context(|| format!("removing stale file: {}", staging.display()))?;
    }

    if let Err(err) = produce(&staging) {
        let _ = fs::remove_file(&staging);
        return Err(err);
    }

    fs::rename(&staging, target).with_context(|| {
        format!(
            "moving {} into place as {}",
            staging.display(),
            target.display()
        )
    })?;

    Ok(Outcome::Produced)
}

/// Runs the external command built by `command` unless `target` exists.
///
/// The command is pointed at a staging path, and the staged output replaces
/// `target` only when every stage exited successfully. A failed tool is
/// logged and leaves no target, so the next consumer of `target` reports it
/// missing and a later run tries the step again.
pub fn cached_command<F>(target: &Path, command: F) -> anyhow::Result<Outcome>
where
    F: FnOnce(&Path) -> CommandLine,
{
    if target.exists() {
        info!("Found {}, skipping.", target.display());
        return Ok(Outcome::Reused);
    }

    let staging = staging_path(target)?;
    if staging.exists() {
        debug!("removing stale staging file: {}", staging.display());
        fs::remove_file(&staging)
            .with_context(|| format!("removing stale file: {}", staging.display()))?;
    }

    let command = command(&staging);
    let succeeded = match command.run() {
        Ok(succeeded) => succeeded,
        Err(err) => {
            let _ = fs::remove_file(&staging);
            return Err(err);
        }
    };

    if !succeeded {
        warn!("Not keeping the output of a failed step: {}", command);
        let _ = fs::remove_file(&staging);
        return Ok(Outcome::Failed);
    }

    if !staging.exists() {
        warn!("Step finished without writing {}: {}", target.display(), command);
        return Ok(Outcome::Failed);
    }

    fs::rename(&staging, target).with_context(|| {
        format!(
            "moving {} into place as {}",
            staging.display(),
            target.display()
        )
    })?;

    Ok(Outcome::Produced)
}

/// The staging path used by [`cached_staged`] and [`cached_command`]: a
/// hidden sibling of `target` that keeps the original file name as its
/// suffix.
fn staging_path(target: &Path) -> anyhow::Result<PathBuf> {
    let name = file_name_str(target)?;
    Ok(target.with_file_name(format!(".partial-{}", name)))
}
