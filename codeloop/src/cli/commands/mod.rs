pub mod apply;
pub mod batch;
pub mod detect;
pub mod run;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use codeloop_core::oracle::{GeminiConfig, GeminiOracle, Oracle};

// Feature workflows run several oracle calls per attempt; give each one
// more room than the interactive default.
const WORKFLOW_ORACLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Build the gemini-backed oracle, failing fast when the CLI tool is
/// not installed.
pub async fn build_oracle(model: Option<String>) -> Result<Arc<dyn Oracle>> {
    let mut config = GeminiConfig { timeout: WORKFLOW_ORACLE_TIMEOUT, ..GeminiConfig::default() };
    if let Some(model) = model {
        config.model = model;
    }

    let oracle = GeminiOracle::new(config).await;
    if !oracle.is_available().await {
        bail!("gemini CLI tool not found; install it and make sure it is on PATH");
    }
    Ok(Arc::new(oracle))
}
