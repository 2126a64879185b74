use anyhow::{bail, Result};
use codeloop_core::workflow::{run_feature_workflow, FeatureRequest};

use crate::cli::app::RunArgs;

pub async fn execute(args: RunArgs) -> Result<()> {
    let oracle = super::build_oracle(args.model).await?;

    let mut request = FeatureRequest::new(args.description)
        .base_dir(&args.dir)
        .max_retries(args.max_retries);
    for file in args.files {
        request = request.file(file);
    }

    let outcome = run_feature_workflow(oracle, request).await;

    for line in &outcome.logs {
        println!("{line}");
    }
    println!();
    println!("{}", outcome.message);
    if outcome.retry_count > 0 {
        println!("Retries used: {}", outcome.retry_count);
    }

    if !outcome.success {
        for error in &outcome.errors {
            eprintln!("error: {error}");
        }
        bail!("feature was not implemented successfully");
    }
    Ok(())
}
