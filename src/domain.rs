//! Domain module - items, site schemas and run bookkeeping
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod attribute;
pub mod item;
pub mod run_state;
pub mod services;
pub mod site;
pub mod value_objects;

pub use attribute::{Attribute, AttributeConfig, CallbackKind, InlineCheck, ProcessorKind, Query};
pub use item::{AttrValue, Item};
pub use run_state::{IterationStatus, RunCounters, RunState};
pub use services::{
    Alerter, ImageJob, ImageStore, IterationInfo, JobState, JobStatusProvider, MarkerStore,
    RemoteStore, Severity, StoreReceipt,
};
pub use site::{SiteConfig, SiteSchema};
pub use value_objects::{JobId, Language, StockStatus};
