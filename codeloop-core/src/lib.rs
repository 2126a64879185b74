//! Core functionality for codeloop
//!
//! This crate contains the building blocks for the automated
//! modify-then-test cycle: a structured patch model with a parser and
//! applier, adapters around the external text-generation oracle, test
//! detection and execution, git baseline tracking, and the workflow
//! state machine that sequences them.

pub mod oracle;
pub mod patch;
pub mod testing;
pub mod vcs;
pub mod workflow;

pub use patch::{ApplyError, ApplyReport, ParseError, PatchApplier, PatchSet};
pub use workflow::{FeatureOutcome, FeatureRequest, WorkflowEngine};
