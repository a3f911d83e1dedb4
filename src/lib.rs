//! product-ingest - site-configured product item pipeline
//!
//! Turns crawled product pages into validated, normalized items, persists
//! them to a remote product store and tracks crawl iterations per merchant
//! (liveness, deletion safety, closing stats, alerts).
//!
//! Layout:
//! - [`domain`]: items, site schemas, run bookkeeping and collaborator traits
//! - [`extraction`]: selector evaluation, transforms, item assembly
//! - [`pipeline`]: validity gate, duplicate filter, sink, site run
//! - [`iteration`]: iteration lifecycle controller and deletion decision
//! - [`infrastructure`]: configuration, logging and HTTP/filesystem adapters

pub mod domain;
pub mod error;
pub mod extraction;
pub mod infrastructure;
pub mod iteration;
pub mod pipeline;
pub mod test_utils;

pub use error::{ConfigError, PipelineError, Rejection, RemoteError};
pub use pipeline::{RunSummary, SiteRun};
