use super::{parse_args, schema_for, Tool, ToolError};
use crate::config::PythonConfig;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunArgs {
    /// Python source code to execute.
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutcome {
    /// Last non-empty stdout line, or trimmed stderr when stdout is empty.
    pub fn summary(&self) -> String {
        let stdout = self.stdout.replace('\r', "");
        match stdout.split('\n').filter(|l| !l.is_empty()).last() {
            Some(line) => line.to_string(),
            None => self.stderr.replace('\r', "").trim().to_string(),
        }
    }
}

/// Run `program` with `args`, killing it after `timeout`.
///
/// Returns `Ok(None)` on timeout; spawn failures (e.g. `NotFound`) are
/// returned as errors.
pub async fn run_command(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> io::Result<Option<RunOutcome>> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => {
            let output = output?;
            Ok(Some(RunOutcome {
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }))
        }
        Err(_) => Ok(None),
    }
}

pub struct RunPythonCodeTool {
    config: PythonConfig,
}

impl RunPythonCodeTool {
    pub fn new(config: PythonConfig) -> Self {
        Self { config }
    }

    async fn run(&self, code: &str, timeout: Duration) -> io::Result<Option<RunOutcome>> {
        let conda_args = ["run", "-n", self.config.conda_env.as_str(), "python", "-c", code];
        match run_command(&self.config.conda_executable, &conda_args, timeout).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(
                    "{} not found, using {}",
                    self.config.conda_executable,
                    self.config.fallback_interpreter
                );
                run_command(&self.config.fallback_interpreter, &["-c", code], timeout).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl Tool for RunPythonCodeTool {
    fn name(&self) -> &str {
        "run_python_code"
    }

    fn description(&self) -> &str {
        "Executes Python code inside the configured conda environment"
    }

    fn input_schema(&self) -> Value {
        schema_for::<RunArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: RunArgs = parse_args(args)?;
        if args.code.is_empty() {
            return Err(ToolError::invalid("code is required"));
        }

        let timeout = Duration::from_secs(self.config.timeout_secs.max(1));
        let started = Instant::now();
        let outcome = self.run(&args.code, timeout).await?;
        let elapsed = started.elapsed().as_secs_f64();

        Ok(match outcome {
            Some(outcome) => json!({
                "time": elapsed,
                "is_successful": i32::from(outcome.success),
                "result": outcome.summary(),
            }),
            None => json!({
                "time": elapsed,
                "is_successful": 0,
                "result": format!("timed out after {}s", timeout.as_secs()),
            }),
        })
    }
}
