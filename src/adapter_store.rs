//! Space adapter persistence.
//!
//! The artifact is written to a sibling temporary file and renamed into
//! place, so a reader never observes a half-written adapter.

use std::path::Path;

use tracing::info;

use vector_bridge_core::adapter::SpaceAdapter;
use vector_bridge_core::error::{BridgeError, Result};

/// Read and decode an adapter artifact.
///
/// A missing file or an invalid artifact is a [`BridgeError::Configuration`]
/// error naming the path.
pub async fn load_adapter(path: &Path) -> Result<SpaceAdapter> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BridgeError::Configuration(format!(
                "space adapter not found at {}; train one with `vbr adapter train`",
                path.display()
            )))
        }
        Err(e) => return Err(e.into()),
    };
    let adapter = SpaceAdapter::from_bytes(&bytes).map_err(|e| match e {
        BridgeError::Configuration(msg) => {
            BridgeError::Configuration(format!("invalid space adapter {}: {msg}", path.display()))
        }
        other => other,
    })?;
    info!(
        path = %path.display(),
        small_dim = adapter.small_dim(),
        target_dim = adapter.target_dim(),
        "space adapter loaded"
    );
    Ok(adapter)
}

/// Encode and write an adapter artifact, creating parent directories.
pub async fn save_adapter(path: &Path, adapter: &SpaceAdapter) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, adapter.to_bytes()).await?;
    tokio::fs::rename(&tmp, path).await?;
    info!(path = %path.display(), "space adapter saved");
    Ok(())
}
