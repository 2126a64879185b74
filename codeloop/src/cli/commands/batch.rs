use std::fs;

use anyhow::{bail, Context, Result};
use codeloop_core::workflow::{run_batch, FeatureRequest};

use crate::cli::app::BatchArgs;

pub async fn execute(args: BatchArgs) -> Result<()> {
    let text = fs::read_to_string(&args.features)
        .with_context(|| format!("cannot read feature file: {}", args.features.display()))?;
    let requests: Vec<FeatureRequest> =
        serde_json::from_str(&text).context("feature file must be a JSON array of requests")?;

    if requests.is_empty() {
        bail!("feature file contains no requests");
    }

    let oracle = super::build_oracle(args.model).await?;
    let report = run_batch(oracle, requests).await;

    println!("Batch finished: {}/{} features succeeded", report.successful, report.total);
    for (index, outcome) in report.results.iter().enumerate() {
        let mark = if outcome.success { "ok" } else { "FAILED" };
        println!(
            "  [{mark}] feature {} ({} retries): {}",
            index + 1,
            outcome.retry_count,
            outcome.message
        );
    }

    if report.failed > 0 {
        bail!("{} feature(s) failed", report.failed);
    }
    Ok(())
}
