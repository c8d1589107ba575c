use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::capabilities::{CapabilityHandler, CapabilityOutput};
use crate::triggers::TriggerContext;

/// Capability backed by an external command.
///
/// The trigger context is written to the command's stdin as JSON. Stdout
/// becomes the artifact: parsed as JSON when possible, otherwise kept as text.
pub struct CommandCapability {
    pub name: String,
    pub description: String,
    pub cmd: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl CommandCapability {
    pub fn new(name: &str, cmd: &str) -> Self {
        Self {
            name: name.to_string(),
            description: format!("Run `{}`", cmd),
            cmd: cmd.to_string(),
            args: Vec::new(),
            cwd: None,
            timeout: Duration::from_secs(300),
        }
    }
}

#[async_trait]
impl CapabilityHandler for CommandCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, ctx: &TriggerContext) -> Result<CapabilityOutput> {
        let input = serde_json::to_vec(ctx)?;

        let mut command = tokio::process::Command::new(&self.cmd);
        command
            .args(&self.args)
            .env("IDEAFLOW_CAPABILITY", &self.name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'", self.cmd))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A command that ignores stdin may close it early
            if let Err(e) = stdin.write_all(&input).await {
                debug!(capability = %self.name, error = %e, "Command closed stdin early");
            }
        }

        // wait_with_output drains stdout/stderr while waiting, avoiding pipe deadlocks
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.with_context(|| format!("Failed to run '{}'", self.cmd))?,
            Err(_) => bail!(
                "Command '{}' timed out after {}s",
                self.cmd,
                self.timeout.as_secs_f64()
            ),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            bail!(
                "Command '{}' exited with code {}: {}",
                self.cmd,
                output.status.code().unwrap_or(-1),
                stderr
            );
        }

        let (artifact_type, data) = match serde_json::from_str::<serde_json::Value>(&stdout) {
            Ok(value) => ("json", value),
            Err(_) => ("text", serde_json::Value::String(stdout.clone())),
        };

        let summary = match &data {
            serde_json::Value::Object(map) => map
                .get("summary")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            serde_json::Value::String(text) => text.lines().next().map(str::to_string),
            _ => None,
        }
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("{} completed", self.name));

        Ok(CapabilityOutput {
            summary,
            artifact_type: format!("{}_{}", self.name, artifact_type),
            data,
        })
    }
}
