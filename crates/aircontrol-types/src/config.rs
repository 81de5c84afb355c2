//! Session game configuration.

use serde::{Deserialize, Serialize};

/// A fully resolved session configuration. Both ids always name entries
/// that exist in the catalog the config was resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    pub game_profile_id: String,
    pub layout_id: String,
}

/// A requested configuration, possibly partial or naming unknown ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_profile_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_id: Option<String>,
}

impl ConfigRequest {
    pub fn new(game_profile_id: impl Into<String>, layout_id: impl Into<String>) -> Self {
        Self {
            game_profile_id: Some(game_profile_id.into()),
            layout_id: Some(layout_id.into()),
        }
    }
}

impl From<&GameConfig> for ConfigRequest {
    fn from(config: &GameConfig) -> Self {
        Self::new(config.game_profile_id.clone(), config.layout_id.clone())
    }
}
