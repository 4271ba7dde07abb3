// Pet data as returned by the backend, plus the playlist entries the popup edits.
// Field names follow the JSON the backend and the store use.

use serde::{Deserialize, Deserializer, Serialize};

use crate::defaults;
use crate::error::CompanionError;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pet {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Asset {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<u32>,
    /// Only meaningful for animated display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<String>,
}

/// A pet and its equipped assets. Replaced wholesale on every fetch.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PetData {
    pub pet: Pet,
    pub assets: Vec<Asset>,
}

impl PetData {
    pub fn asset(&self, id: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id == id)
    }

    /// Like [`PetData::asset`] but reports a stale playlist reference as an error.
    pub fn require_asset(&self, id: &str) -> Result<&Asset, CompanionError> {
        self.asset(id)
            .ok_or_else(|| CompanionError::AssetMissing(id.to_string()))
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrbitMode {
    #[default]
    Static,
    Animated,
}

/// One playlist entry as stored. Animated-only fields may be absent;
/// [`defaults::resolve`] fills them in.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrbitAssetConfig {
    pub id: String,
    #[serde(default)]
    pub mode: OrbitMode,
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<u32>,
    /// Cells per row in the sprite sheet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<u32>,
}

fn default_duration() -> u32 {
    defaults::DEFAULT_DURATION_SECS
}

/// Partial edit of a playlist entry coming from the popup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigPatch {
    pub mode: Option<OrbitMode>,
    pub duration: Option<u32>,
    pub frame_size: Option<u32>,
    pub frame_count: Option<u32>,
    pub frame_rate: Option<u32>,
    pub columns: Option<u32>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == ConfigPatch::default()
    }

    pub fn apply(&self, entry: &mut OrbitAssetConfig) {
        if let Some(mode) = self.mode {
            entry.mode = mode;
            if mode == OrbitMode::Animated {
                defaults::fill_animated(entry);
            }
        }
        if let Some(duration) = self.duration {
            entry.duration = duration.max(1);
        }
        if let Some(size) = self.frame_size {
            entry.frame_size = Some(size.max(1));
        }
        if let Some(count) = self.frame_count {
            entry.frame_count = Some(count.max(1));
        }
        if let Some(rate) = self.frame_rate {
            entry.frame_rate = Some(rate.max(1));
        }
        if let Some(columns) = self.columns {
            entry.columns = Some(columns.max(1));
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_asset_tolerates_nulls_from_backend() {
        let asset: Asset = serde_json::from_value(json!({
            "id": "0xa1",
            "url": "http://x/a1.png",
            "name": "Hat",
            "description": null,
            "action": 2,
            "frames": null
        }))
        .unwrap();

        assert_eq!(asset.description, "");
        assert_eq!(asset.action, Some(2));
        assert_eq!(asset.frames, None);
    }

    #[test]
    fn test_static_entry_keeps_minimal_shape() {
        let entry = defaults::new_entry("a1");
        let value = serde_json::to_value(&entry).unwrap();

        assert_eq!(value, json!({"id": "a1", "mode": "static", "duration": 5}));
    }

    #[test]
    fn test_switching_to_animated_fills_sheet_fields() {
        let mut entry = defaults::new_entry("a1");
        ConfigPatch {
            mode: Some(OrbitMode::Animated),
            frame_count: Some(6),
            ..Default::default()
        }
        .apply(&mut entry);

        assert_eq!(entry.mode, OrbitMode::Animated);
        assert_eq!(entry.frame_size, Some(500));
        assert_eq!(entry.frame_count, Some(6));
        assert_eq!(entry.frame_rate, Some(4));
        assert_eq!(entry.columns, Some(2));
    }

    #[test]
    fn test_patch_clamps_zero_duration() {
        let mut entry = defaults::new_entry("a1");
        ConfigPatch {
            duration: Some(0),
            ..Default::default()
        }
        .apply(&mut entry);

        assert_eq!(entry.duration, 1);
    }

    #[test]
    fn test_require_asset_reports_stale_reference() {
        let data = PetData {
            pet: Pet {
                id: "p1".into(),
                name: "Fluffy".into(),
                image_url: None,
            },
            assets: vec![],
        };

        let err = data.require_asset("gone").unwrap_err();
        assert!(matches!(err, CompanionError::AssetMissing(id) if id == "gone"));
    }
}
