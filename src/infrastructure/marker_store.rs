//! Filesystem first-run marker: `<dir>/<merchant>/.already_ran`

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::domain::services::MarkerStore;
use crate::error::RemoteError;

pub const MARKER_FILE: &str = ".already_ran";

#[derive(Debug, Clone)]
pub struct FsMarkerStore {
    root: PathBuf,
}

impl FsMarkerStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn marker_path(&self, merchant: &str) -> PathBuf {
        self.root.join(merchant).join(MARKER_FILE)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl MarkerStore for FsMarkerStore {
    async fn exists(&self, merchant: &str) -> Result<bool, RemoteError> {
        fs::try_exists(self.marker_path(merchant))
            .await
            .map_err(|e| RemoteError::storage(&e))
    }

    async fn create(&self, merchant: &str) -> Result<(), RemoteError> {
        let path = self.marker_path(merchant);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| RemoteError::storage(&e))?;
        }
        fs::write(&path, b"")
            .await
            .map_err(|e| RemoteError::storage(&e))?;
        info!("First-run marker written to {}", path.display());
        Ok(())
    }
}
