//! Item pipeline: validity gate, duplicate filter, persistence sink, image
//! dispatch, page feeds and the site run that strings them together.

pub mod duplicates;
pub mod feed;
pub mod image_dispatch;
pub mod sink;
pub mod site_run;
pub mod validity;

pub use duplicates::DuplicateFilter;
pub use image_dispatch::ImageDispatcher;
pub use sink::{PersistenceSink, SinkBackend, SinkConfig};
pub use site_run::{Collaborators, PageOutcome, RunOptions, RunSummary, SiteRun};
pub use validity::{ValidityGate, Verdict};
