use std::path::Path;
use std::process::Stdio;

use crate::error::WsfusionError;

/// Exit code and captured output of a finished child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the child was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Run `executable` with `args` (no shell) and wait for it to exit.
///
/// A process that cannot be spawned is an error; a process that runs and
/// exits nonzero is not.
pub async fn run(executable: &Path, args: &[String]) -> Result<CommandOutput, WsfusionError> {
    let command_line = format!("{} {}", executable.display(), args.join(" "));
    tracing::debug!("running {command_line}");

    let output = tokio::process::Command::new(executable)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| WsfusionError::Spawn {
            command: command_line.clone(),
            source,
        })?;

    let result = CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    tracing::debug!("... stdout: {{{}}}", result.stdout);
    tracing::debug!("... stderr: {{{}}}", result.stderr);
    tracing::debug!("... exit code: {:?}", result.code);

    Ok(result)
}
