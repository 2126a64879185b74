use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "codeloop",
    version,
    about = "Codeloop - automated feature implementation with test-driven retries",
    long_about = "Codeloop modifies code through an external model, generates unit tests for \
                  the changes, runs them, and retries the modification with the failures as \
                  context until the tests pass or retries run out."
)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Implement a single feature
    #[command(about = "Run the workflow for one feature description")]
    Run(RunArgs),

    /// Implement a list of features sequentially
    #[command(about = "Run the workflow for every feature in a JSON file")]
    Batch(BatchArgs),

    /// Apply a unified diff to a directory
    #[command(about = "Parse and apply a unified-diff file")]
    Apply(ApplyArgs),

    /// Inspect a project's test setup
    #[command(about = "Detect the test framework, test files, and config files")]
    Detect(DetectArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// What to implement
    pub description: String,

    /// Files the feature touches (relative to the project directory)
    #[arg(short, long = "file")]
    pub files: Vec<PathBuf>,

    /// Project directory
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    /// Maximum retries after failed tests
    #[arg(long, default_value_t = 3)]
    pub max_retries: usize,

    /// Model passed to the gemini CLI
    #[arg(long)]
    pub model: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct BatchArgs {
    /// JSON file holding an array of feature requests
    pub features: PathBuf,

    /// Model passed to the gemini CLI
    #[arg(long)]
    pub model: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ApplyArgs {
    /// Unified-diff file to apply
    pub diff: PathBuf,

    /// Directory to apply the diff in
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    /// Verify the whole diff in memory without writing anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(clap::Args, Debug)]
pub struct DetectArgs {
    /// Directory to inspect
    #[arg(default_value = ".")]
    pub dir: PathBuf,
}
