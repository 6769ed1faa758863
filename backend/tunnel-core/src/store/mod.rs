//! Profile persistence contract.
//!
//! The core only reads from the store, and always from a blocking-pool thread
//! (see [`blocking`]), so implementations are free to do synchronous I/O.

pub mod json;

pub use json::JsonProfileStore;

use crate::error::store::StoreError;

use common::ErrorLocation;
use models::Profile;

use std::panic::Location;
use std::sync::Arc;

/// Durable profile storage.
///
/// Implementations must be safe to share between tasks. `list` returns records
/// in insertion (id) order.
pub trait ProfileStore: Send + Sync + 'static {
    fn get(&self, id: i64) -> Result<Option<Profile>, StoreError>;

    fn list(&self) -> Result<Vec<Profile>, StoreError>;

    fn read_content(&self, profile: &Profile) -> Result<String, StoreError>;
}

/// Run a store call on the blocking pool.
pub(crate) async fn blocking<T, F>(store: &Arc<dyn ProfileStore>, call: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn ProfileStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || call(store.as_ref()))
        .await
        .map_err(|e| StoreError::Unavailable {
            location: ErrorLocation::from(Location::caller()),
            reason: format!("Store task failed: {e}"),
        })?
}
