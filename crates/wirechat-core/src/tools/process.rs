//! Subprocess invocation shared by description probing and tool calls.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::ToolError;

/// How a tool file is launched: directly, or through an interpreter.
#[derive(Debug, Clone)]
pub struct Launcher {
    pub program: PathBuf,
    pub interpreter: Option<String>,
}

impl Launcher {
    pub fn new(program: impl Into<PathBuf>, interpreter: Option<String>) -> Self {
        Self {
            program: program.into(),
            interpreter,
        }
    }

    fn command(&self) -> Command {
        match &self.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(&self.program);
                cmd
            }
            None => Command::new(&self.program),
        }
    }

    /// Run the tool with `args` and collect stdout followed by stderr.
    ///
    /// A non-zero exit status is a `ToolError::Failed` carrying the output.
    pub async fn run(
        &self,
        tool: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<String, ToolError> {
        let mut cmd = self.command();
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(tool, program = %self.program.display(), ?args, "Spawning tool");

        let child = cmd.spawn().map_err(|e| ToolError::Spawn {
            tool: tool.to_string(),
            reason: e.to_string(),
        })?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::Spawn {
                    tool: tool.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(ToolError::Timeout {
                    tool: tool.to_string(),
                    seconds: timeout.as_secs(),
                })
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(text)
        } else {
            Err(ToolError::Failed {
                tool: tool.to_string(),
                status: output.status.to_string(),
                output: text,
            })
        }
    }
}
