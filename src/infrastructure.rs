//! Infrastructure layer: configuration, logging and the collaborator adapters
//!
//! Everything that talks to the network or the filesystem lives here, behind
//! the traits in [`crate::domain::services`].

pub mod alerting;
pub mod config; // Process-level configuration
pub mod image_store;
pub mod job_status;
pub mod logging; // Logging infrastructure
pub mod marker_store;
pub mod network_context;
pub mod remote_store;

pub use alerting::{LogAlerter, WebhookAlerter};
pub use config::AppConfig;
pub use image_store::{HttpImageStore, LogImageStore};
pub use job_status::ScrapydJobStatus;
pub use logging::{init_logging, init_logging_with_config};
pub use marker_store::FsMarkerStore;
pub use network_context::NetworkContext;
pub use remote_store::HttpRemoteStore;
