use std::fs;

use anyhow::{bail, Context, Result};
use codeloop_core::patch::{self, PatchApplier};

use crate::cli::app::ApplyArgs;

pub fn execute(args: ApplyArgs) -> Result<()> {
    let diff = fs::read_to_string(&args.diff)
        .with_context(|| format!("cannot read diff file: {}", args.diff.display()))?;

    let patch = patch::parse(&diff).context("diff file is not a valid unified diff")?;
    let report = PatchApplier::new(&args.dir).dry_run(args.dry_run).apply(&patch);

    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.success {
        bail!("{} file(s) failed to apply", report.failed_files);
    }
    Ok(())
}
