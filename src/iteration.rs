//! Crawl iteration lifecycle: liveness detection at start, deletion safety
//! and closing stats at the end.

pub mod controller;
pub mod deletion;

pub use controller::{ControllerSettings, IterationController, IterationReport, RunStart};
pub use deletion::{DeletionDecision, DeletionInputs, DeletionOutcome};
