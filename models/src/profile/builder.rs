use crate::error::model_error::ModelError;
use crate::profile::{Profile, ProfileType, RemoteSettings};

use common::ErrorLocation;

use std::panic::Location;

/// Builder for creating validated Profile instances.
///
/// Enforces the shape rules tying optional fields to the profile type:
/// local profiles carry no remote location, cloud-synced profiles carry a
/// location but no auto-update settings, and remote profiles carry both.
#[derive(Debug, Default, Clone)]
pub struct ProfileBuilder {
    id: Option<i64>,
    name: Option<String>,
    profile_type: Option<ProfileType>,
    remote_location: Option<String>,
    remote: Option<RemoteSettings>,
}

impl ProfileBuilder {
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_type(mut self, profile_type: ProfileType) -> Self {
        self.profile_type = Some(profile_type);
        self
    }

    pub fn with_remote_location(mut self, location: impl Into<String>) -> Self {
        self.remote_location = Some(location.into());
        self
    }

    pub fn with_remote_settings(mut self, remote: RemoteSettings) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Build the Profile with validation.
    ///
    /// Remote profiles without explicit settings get [`RemoteSettings::default`].
    #[track_caller]
    pub fn build(self) -> Result<Profile, ModelError> {
        let id = self.id.ok_or_else(|| ModelError::Validation {
            message: String::from("Profile id is required"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        if id <= 0 {
            return Err(ModelError::Validation {
                message: format!("Profile id must be positive, got {id}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let name = self.name.ok_or_else(|| ModelError::Validation {
            message: String::from("Profile name is required"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        if name.trim().is_empty() {
            return Err(ModelError::Validation {
                message: String::from("Profile name cannot be empty"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let profile_type = self.profile_type.ok_or_else(|| ModelError::Validation {
            message: String::from("Profile type is required"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let remote_location = match (profile_type.has_remote_location(), self.remote_location) {
            (false, Some(_)) => {
                return Err(ModelError::Validation {
                    message: String::from("Local profiles cannot have a remote location"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
            (false, None) => None,
            (true, None) => {
                return Err(ModelError::Validation {
                    message: format!("Remote location is required for {profile_type} profiles"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
            (true, Some(location)) if location.trim().is_empty() => {
                return Err(ModelError::Validation {
                    message: String::from("Remote location cannot be empty"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
            (true, Some(location)) => Some(location),
        };

        let remote = match (profile_type, self.remote) {
            (ProfileType::Remote, settings) => {
                let settings = settings.unwrap_or_default();
                if settings.auto_update_interval <= 0 {
                    return Err(ModelError::Validation {
                        message: format!(
                            "Auto-update interval must be positive, got {}",
                            settings.auto_update_interval
                        ),
                        location: ErrorLocation::from(Location::caller()),
                    });
                }
                Some(settings)
            }
            (_, Some(_)) => {
                return Err(ModelError::Validation {
                    message: format!("Auto-update settings are only valid for remote profiles, not {profile_type}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
            (_, None) => None,
        };

        Ok(Profile {
            id,
            name,
            profile_type,
            remote_location,
            remote,
        })
    }
}

impl From<&Profile> for ProfileBuilder {
    fn from(profile: &Profile) -> Self {
        Self {
            id: Some(profile.id),
            name: Some(profile.name.clone()),
            profile_type: Some(profile.profile_type),
            remote_location: profile.remote_location.clone(),
            remote: profile.remote.clone(),
        }
    }
}
