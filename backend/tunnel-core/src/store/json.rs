use crate::error::store::StoreError;
use crate::store::ProfileStore;

use common::ErrorLocation;
use models::{Profile, ProfileBuilder};

use std::fs;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, info};
use serde::{Deserialize, Serialize};

const INDEX_FILE_NAME: &str = "profiles.json";
const CONTENT_DIR_NAME: &str = "content";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileIndex {
    next_id: i64,
    profiles: Vec<Profile>,
}

impl Default for ProfileIndex {
    fn default() -> Self {
        Self {
            next_id: 1,
            profiles: Vec::new(),
        }
    }
}

/// File-backed profile store.
///
/// Layout under the root directory:
///
/// - `profiles.json`: ordered records plus the next id to hand out
/// - `content/<id>.json`: configuration text of each profile
///
/// Ids grow monotonically and are never reused, even after deletes.
pub struct JsonProfileStore {
    root: PathBuf,
    index: Mutex<ProfileIndex>,
}

impl JsonProfileStore {
    /// Open (or initialize) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let content_dir = root.join(CONTENT_DIR_NAME);
        fs::create_dir_all(&content_dir).map_err(|e| StoreError::Write {
            location: ErrorLocation::from(Location::caller()),
            path: content_dir.clone(),
            source: e,
        })?;

        let index_path = root.join(INDEX_FILE_NAME);
        let index = if index_path.exists() {
            let contents = fs::read_to_string(&index_path).map_err(|e| StoreError::Read {
                location: ErrorLocation::from(Location::caller()),
                path: index_path.clone(),
                source: e,
            })?;
            serde_json::from_str(&contents).map_err(|e| StoreError::Parse {
                location: ErrorLocation::from(Location::caller()),
                path: index_path.clone(),
                reason: e.to_string(),
            })?
        } else {
            ProfileIndex::default()
        };

        info!(
            "Opened profile store at {} ({} profiles)",
            root.display(),
            index.profiles.len()
        );

        Ok(Self {
            root,
            index: Mutex::new(index),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a profile, assigning the next id. Any id set on `builder` is replaced.
    pub fn create(&self, builder: ProfileBuilder, content: &str) -> Result<Profile, StoreError> {
        let mut index = self.lock()?;
        let profile = builder
            .with_id(index.next_id)
            .build()
            .map_err(|e| StoreError::Validation {
                location: ErrorLocation::from(Location::caller()),
                reason: e.to_string(),
            })?;

        self.write_content(profile.id, content)?;

        let mut next = index.clone();
        next.next_id += 1;
        next.profiles.push(profile.clone());
        self.persist(&next)?;
        *index = next;

        debug!("Created profile {} ({})", profile.id, profile.name);
        Ok(profile)
    }

    /// Replace a stored record. The profile type cannot change.
    pub fn update(&self, profile: &Profile) -> Result<(), StoreError> {
        let mut index = self.lock()?;
        let position = index
            .profiles
            .iter()
            .position(|p| p.id == profile.id)
            .ok_or_else(|| StoreError::NotFound {
                id: profile.id,
                location: ErrorLocation::from(Location::caller()),
            })?;

        if index.profiles[position].profile_type != profile.profile_type {
            return Err(StoreError::Validation {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Profile {} type is {} and cannot change to {}",
                    profile.id, index.profiles[position].profile_type, profile.profile_type
                ),
            });
        }

        let validated = ProfileBuilder::from(profile)
            .build()
            .map_err(|e| StoreError::Validation {
                location: ErrorLocation::from(Location::caller()),
                reason: e.to_string(),
            })?;

        let mut next = index.clone();
        next.profiles[position] = validated;
        self.persist(&next)?;
        *index = next;
        Ok(())
    }

    /// Replace the configuration text of a stored profile.
    pub fn update_content(&self, id: i64, content: &str) -> Result<(), StoreError> {
        let index = self.lock()?;
        if !index.profiles.iter().any(|p| p.id == id) {
            return Err(StoreError::NotFound {
                id,
                location: ErrorLocation::from(Location::caller()),
            });
        }
        self.write_content(id, content)
    }

    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut index = self.lock()?;
        let mut next = index.clone();
        next.profiles.retain(|p| p.id != id);
        if next.profiles.len() == index.profiles.len() {
            return Err(StoreError::NotFound {
                id,
                location: ErrorLocation::from(Location::caller()),
            });
        }
        self.persist(&next)?;
        *index = next;

        let content_path = self.content_path(id);
        if let Err(e) = fs::remove_file(&content_path) {
            debug!(
                "Content file {} not removed: {e}",
                content_path.display()
            );
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ProfileIndex>, StoreError> {
        self.index.lock().map_err(|e| StoreError::Unavailable {
            location: ErrorLocation::from(Location::caller()),
            reason: format!("Profile index lock poisoned: {e}"),
        })
    }

    fn content_path(&self, id: i64) -> PathBuf {
        self.root.join(CONTENT_DIR_NAME).join(format!("{id}.json"))
    }

    fn write_content(&self, id: i64, content: &str) -> Result<(), StoreError> {
        let path = self.content_path(id);
        fs::write(&path, content).map_err(|e| StoreError::Write {
            location: ErrorLocation::from(Location::caller()),
            path,
            source: e,
        })
    }

    fn persist(&self, index: &ProfileIndex) -> Result<(), StoreError> {
        let index_path = self.root.join(INDEX_FILE_NAME);
        let temp_path = self.root.join(format!("{INDEX_FILE_NAME}.tmp"));

        let json = serde_json::to_string_pretty(index).map_err(|e| StoreError::Parse {
            location: ErrorLocation::from(Location::caller()),
            path: index_path.clone(),
            reason: e.to_string(),
        })?;

        fs::write(&temp_path, json).map_err(|e| StoreError::Write {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, &index_path).map_err(|e| StoreError::Write {
            location: ErrorLocation::from(Location::caller()),
            path: index_path,
            source: e,
        })
    }
}

impl ProfileStore for JsonProfileStore {
    fn get(&self, id: i64) -> Result<Option<Profile>, StoreError> {
        Ok(self.lock()?.profiles.iter().find(|p| p.id == id).cloned())
    }

    fn list(&self) -> Result<Vec<Profile>, StoreError> {
        Ok(self.lock()?.profiles.clone())
    }

    fn read_content(&self, profile: &Profile) -> Result<String, StoreError> {
        let path = self.content_path(profile.id);
        fs::read_to_string(&path).map_err(|e| StoreError::Read {
            location: ErrorLocation::from(Location::caller()),
            path,
            source: e,
        })
    }
}
