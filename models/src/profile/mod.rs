pub mod builder;
pub mod preview;

use std::fmt::{Display, Formatter, Result as FormatResult};

use serde::{Deserialize, Serialize};

/// Default auto-update period for remote profiles, in minutes.
pub const DEFAULT_AUTO_UPDATE_INTERVAL: i32 = 60;

/// Where a profile's configuration text comes from.
///
/// Fixed when the profile is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProfileType {
    Local,
    CloudSynced,
    Remote,
}

impl ProfileType {
    /// Stable numeric code used on the wire.
    pub const fn code(self) -> i32 {
        match self {
            ProfileType::Local => 0,
            ProfileType::CloudSynced => 1,
            ProfileType::Remote => 2,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ProfileType::Local),
            1 => Some(ProfileType::CloudSynced),
            2 => Some(ProfileType::Remote),
            _ => None,
        }
    }

    /// Whether profiles of this type carry a remote location.
    pub const fn has_remote_location(self) -> bool {
        !matches!(self, ProfileType::Local)
    }
}

impl Display for ProfileType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        match self {
            ProfileType::Local => write!(f, "local"),
            ProfileType::CloudSynced => write!(f, "cloudSynced"),
            ProfileType::Remote => write!(f, "remote"),
        }
    }
}

/// Auto-update bookkeeping, only present on remote profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSettings {
    pub auto_update: bool,
    /// Minutes between refreshes.
    pub auto_update_interval: i32,
    /// Epoch seconds of the last successful refresh. `None` means never updated.
    #[serde(default)]
    pub last_updated_at: Option<i64>,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            auto_update: false,
            auto_update_interval: DEFAULT_AUTO_UPDATE_INTERVAL,
            last_updated_at: None,
        }
    }
}

/// A stored configuration record.
///
/// The configuration text itself is not part of the record; stores load it on
/// demand. Build validated instances with [`ProfileBuilder`](builder::ProfileBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub profile_type: ProfileType,
    #[serde(default)]
    pub remote_location: Option<String>,
    #[serde(default)]
    pub remote: Option<RemoteSettings>,
}
