use crate::config::ExtensionPaths;
use crate::error::lifecycle::LifecycleError;

use common::ErrorLocation;

use std::panic::Location;
use std::path::Path;

use log::debug;
use tokio::fs::create_dir_all;

/// Create the cache and working directories, parents included.
pub(crate) async fn prepare(paths: &ExtensionPaths) -> Result<(), LifecycleError> {
    create(&paths.cache).await?;
    create(&paths.working).await?;
    Ok(())
}

async fn create(dir: &Path) -> Result<(), LifecycleError> {
    create_dir_all(dir).await.map_err(|e| LifecycleError::Setup {
        message: format!("Failed to create {}: {e}", dir.display()),
        location: ErrorLocation::from(Location::caller()),
    })?;
    debug!("Prepared {}", dir.display());
    Ok(())
}
