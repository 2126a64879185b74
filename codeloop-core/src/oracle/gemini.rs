//! Oracle backed by the `gemini` CLI tool

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::{Oracle, OracleError, OracleRequest};

/// Configuration for the gemini CLI oracle. Explicit fields instead of
/// ambient environment state so the adapter stays a pure function of
/// (request, config, filesystem).
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub command: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            command: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// The gemini CLI wraps its answer in a JSON envelope.
#[derive(Debug, Deserialize)]
struct CliEnvelope {
    #[serde(default)]
    response: String,
}

/// Oracle that shells out to the gemini CLI with `--output-format json`.
pub struct GeminiOracle {
    config: GeminiConfig,
    available: bool,
}

impl GeminiOracle {
    pub async fn new(config: GeminiConfig) -> Self {
        let available = Command::new(&config.command)
            .arg("--version")
            .output()
            .await
            .map(|output| output.status.success() || !output.stdout.is_empty())
            .unwrap_or(false);

        if available {
            debug!(command = %config.command, "gemini CLI tool found");
        } else {
            debug!(command = %config.command, "gemini CLI tool not found");
        }

        Self { config, available }
    }
}

#[async_trait]
impl Oracle for GeminiOracle {
    fn name(&self) -> &str {
        "gemini-cli"
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let mut cmd = Command::new(&self.config.command);
        cmd.arg("-m")
            .arg(&self.config.model)
            .arg("-p")
            .arg(&request.prompt)
            .arg("--output-format")
            .arg("json");

        if let Some(dir) = &request.working_dir {
            cmd.current_dir(dir);
        }

        let output = tokio::time::timeout(self.config.timeout, cmd.output())
            .await
            .map_err(|_| OracleError::timeout(self.config.timeout))?
            .map_err(|e| OracleError::exec(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OracleError::command_failed(
                output.status.code().unwrap_or(-1),
                stderr.trim().to_string(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let envelope: CliEnvelope = serde_json::from_str(stdout.trim())
            .map_err(|e| OracleError::decode(format!("bad CLI envelope: {e}"), &stdout))?;

        debug!(chars = envelope.response.len(), "gemini CLI response received");
        Ok(envelope.response)
    }
}
