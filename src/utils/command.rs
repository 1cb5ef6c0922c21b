//! Structured descriptions of external tool invocations.
//!
//! Every external tool the pipeline drives (aligners, `samtools`, `bedtools`,
//! `cutadapt`, ...) is described as a [`CommandLine`]: one or more
//! [`Invocation`]s (executable plus argument list) connected by pipes, with an
//! optional file receiving the final standard output. A command line can be
//! rendered into a shell string for a job script or executed directly.

use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::path::PathBuf;
use std::process::Child;
use std::process::ChildStdout;
use std::process::Command;
use std::process::Stdio;

use anyhow::Context;
use tracing::debug;
use tracing::warn;

/// A single executable together with its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
}

impl Invocation {
    /// Creates an invocation of `program` with no arguments.
    pub fn new<S>(program: S) -> Self
    where
        S: Into<String>,
    {
        Invocation {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg<S>(mut self, arg: S) -> Self
    where
        S: Into<String>,
    {
        self.args.push(arg.into());
        self
    }

    /// Appends a path argument.
    pub fn path_arg<P>(self, path: P) -> Self
    where
        P: AsRef<Path>,
    {
        let rendered = path.as_ref().display().to_string();
        self.arg(rendered)
    }

    /// Appends every argument in `args`.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The executable name or path.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The arguments, in order.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

/// A pipeline of invocations with an optional standard output redirect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLine {
    stages: Vec<Invocation>,
    stdout: Option<PathBuf>,
}

impl CommandLine {
    /// Creates a command line consisting of a single invocation.
    pub fn new(first: Invocation) -> Self {
        CommandLine {
            stages: vec![first],
            stdout: None,
        }
    }

    /// Pipes the standard output of the current last stage into `next`.
    pub fn pipe(mut self, next: Invocation) -> Self {
        self.stages.push(next);
        self
    }

    /// Sends the standard output of the last stage to `path`.
    pub fn stdout_to<P>(mut self, path: P) -> Self
    where
        P: Into<PathBuf>,
    {
        self.stdout = Some(path.into());
        self
    }

    /// The invocations, in pipe order.
    pub fn stages(&self) -> &[Invocation] {
        &self.stages
    }

    /// The file receiving the final standard output, if any.
    pub fn stdout(&self) -> Option<&Path> {
        self.stdout.as_deref()
    }

    /// Runs the command line to completion on this machine and reports
    /// whether every stage exited successfully.
    ///
    /// Failing to launch an executable is an error, after any stages that
    /// were already launched are stopped. A non-zero exit status is only
    /// logged and reported: callers decide whether the output still counts.
    pub fn run(&self) -> anyhow::Result<bool> {
        debug!("Executing: {}", self);

        let last = self.stages.len() - 1;
        let mut children: Vec<(&str, Child)> = Vec::with_capacity(self.stages.len());
        let mut upstream: Option<ChildStdout> = None;

        for (i, stage) in self.stages.iter().enumerate() {
            let mut command = Command::new(&stage.program);
            command.args(&stage.args);

            if let Some(stdout) = upstream.take() {
                command.stdin(Stdio::from(stdout));
            }

            if i < last {
                command.stdout(Stdio::piped());
            } else if let Some(path) = &self.stdout {
                let file = match File::create(path) {
                    Ok(file) => file,
                    Err(err) => {
                        stop_all(children);
                        return Err(err)
                            .with_context(|| format!("creating output file: {}", path.display()));
                    }
                };
                command.stdout(Stdio::from(file));
            }

            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(err) => {
                    stop_all(children);
                    return Err(err).with_context(|| format!("launching `{}`", stage.program));
                }
            };
            upstream = child.stdout.take();
            children.push((stage.program.as_str(), child));
        }

        let mut succeeded = true;
        for (program, mut child) in children {
            let status = child
                .wait()
                .with_context(|| format!("waiting on `{}`", program))?;

            if !status.success() {
                warn!("`{}` exited unsuccessfully ({})", program, status);
                succeeded = false;
            }
        }

        Ok(succeeded)
    }
}

/// Kills and reaps stages launched before a later stage failed to launch.
fn stop_all(children: Vec<(&str, Child)>) {
    for (program, mut child) in children {
        if let Err(err) = child.kill() {
            debug!("killing `{}`: {}", program, err);
        }
        let _ = child.wait();
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", stage)?;
        }

        if let Some(path) = &self.stdout {
            write!(f, " > {}", quote(&path.display().to_string()))?;
        }

        Ok(())
    }
}

/// Quotes `arg` for a POSIX shell if it contains anything beyond a
/// conservative set of safe characters.
pub fn quote(arg: &str) -> Cow<'_, str> {
    let safe = |c: char| c.is_ascii_alphanumeric() || "_-./=:,+@%".contains(c);

    if !arg.is_empty() && arg.chars().all(safe) {
        return Cow::Borrowed(arg);
    }

    Cow::Owned(format!("'{}'", arg.replace('\'', r"'\''")))
}
