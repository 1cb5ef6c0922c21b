//! Job scripts handed to the scheduler.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;

use crate::utils::command::quote;
use crate::utils::command::CommandLine;

/// A shell script that runs one command under scheduler directives.
#[derive(Clone, Debug)]
pub struct JobScript {
    name: String,
    command: String,
    logs_dir: PathBuf,
    working_dir: PathBuf,
}

impl JobScript {
    /// Creates a script for `command`. Scheduler output goes to `logs_dir`
    /// and the command runs from `working_dir`.
    pub fn new<L, W>(name: &str, command: &CommandLine, logs_dir: L, working_dir: W) -> Self
    where
        L: Into<PathBuf>,
        W: Into<PathBuf>,
    {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            logs_dir: logs_dir.into(),
            working_dir: working_dir.into(),
        }
    }

    /// Renders the script text.
    pub fn render(&self) -> String {
        let logs_dir = self.logs_dir.display().to_string();
        let working_dir = self.working_dir.display().to_string();

        format!(
            "#!/bin/bash\n\
             \n\
             #$ -N {name}\n\
             #$ -S /bin/bash\n\
             #$ -V\n\
             #$ -j y\n\
             #$ -cwd\n\
             #$ -o {logs}\n\
             \n\
             echo $HOSTNAME\n\
             cd {wd}\n\
             \n\
             {command}\n",
            name = self.name,
            logs = quote(&logs_dir),
            wd = quote(&working_dir),
            command = self.command,
        )
    }

    /// Writes the script to `path`.
    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        fs::write(path, self.render())
            .with_context(|| format!("writing job script: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use crate::utils::command::Invocation;

    use super::*;

    #[test]
    fn test_render() {
        let command = CommandLine::new(
            Invocation::new("/opt/bin/seqflow")
                .args(["--run-on-sample", "A"])
                .args(["--settings", "/data/settings.toml"]),
        );
        let script = JobScript::new("pipeline_run_A", &command, "/out/logs", "/work dir");

        assert_eq!(
            script.render(),
            "#!/bin/bash\n\
             \n\
             #$ -N pipeline_run_A\n\
             #$ -S /bin/bash\n\
             #$ -V\n\
             #$ -j y\n\
             #$ -cwd\n\
             #$ -o /out/logs\n\
             \n\
             echo $HOSTNAME\n\
             cd '/work dir'\n\
             \n\
             /opt/bin/seqflow --run-on-sample A --settings /data/settings.toml\n"
        );
    }
}
