use crate::profile::{Profile, ProfileType};

use serde::{Deserialize, Serialize};

/// Catalogue entry sent to peers when they connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePreview {
    pub id: i64,
    pub name: String,
    pub profile_type: ProfileType,
    pub is_selected: bool,
}

impl ProfilePreview {
    pub fn from_profile(profile: &Profile, selected_id: i64) -> Self {
        Self {
            id: profile.id,
            name: profile.name.clone(),
            profile_type: profile.profile_type,
            is_selected: profile.id == selected_id,
        }
    }
}
