use anyhow::Result;
use codeloop_core::testing::{detect_framework, find_config_files, find_test_files};

use crate::cli::app::DetectArgs;

pub fn execute(args: DetectArgs) -> Result<()> {
    let framework = detect_framework(&args.dir);
    let test_files = find_test_files(&args.dir);
    let config_files = find_config_files(&args.dir);

    println!("Framework: {framework}");

    println!("Config files ({}):", config_files.len());
    for (name, _) in &config_files {
        println!("  {name}");
    }

    println!("Test files ({}):", test_files.len());
    for file in &test_files {
        let rel = file.strip_prefix(&args.dir).unwrap_or(file);
        println!("  {}", rel.display());
    }

    Ok(())
}
