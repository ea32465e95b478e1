//! Manifest of educational-game art and narration (`data/game-assets.json`).

use kinder_core::OpsError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::{Validate, ValidationError};

pub const GAME_IMAGE_DIR: &str = "games/images";
pub const GAME_AUDIO_DIR: &str = "games/audio";

fn validate_asset_key(key: &str) -> Result<(), ValidationError> {
    if key
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        Ok(())
    } else {
        Err(ValidationError::new("asset_key_format"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ImageAsset {
    /// File stem under `games/images/`.
    #[validate(length(min = 1, max = 80), custom(function = "validate_asset_key"))]
    pub key: String,

    pub game: String,

    #[validate(length(min = 1, max = 1000))]
    pub prompt: String,

    /// Provider size override, e.g. `1024x1024`.
    #[serde(default)]
    pub size: Option<String>,
}

impl ImageAsset {
    pub fn storage_key(&self) -> String {
        format!("{}/{}.png", GAME_IMAGE_DIR, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AudioAsset {
    /// File stem under `games/audio/`.
    #[validate(length(min = 1, max = 80), custom(function = "validate_asset_key"))]
    pub key: String,

    pub game: String,

    #[validate(length(min = 1, max = 4096))]
    pub text: String,

    #[serde(default)]
    pub voice: Option<String>,

    #[serde(default)]
    #[validate(range(min = 0.25, max = 4.0))]
    pub speed: Option<f32>,
}

impl AudioAsset {
    pub fn storage_key(&self) -> String {
        format!("{}/{}.mp3", GAME_AUDIO_DIR, self.key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct AssetManifest {
    #[serde(default)]
    #[validate(nested)]
    pub images: Vec<ImageAsset>,

    #[serde(default)]
    #[validate(nested)]
    pub audio: Vec<AudioAsset>,
}

impl AssetManifest {
    pub fn from_json(raw: &str) -> Result<Self, OpsError> {
        let manifest: AssetManifest = serde_json::from_str(raw)
            .map_err(|e| OpsError::invalid_seed(format!("malformed asset manifest: {}", e)))?;
        manifest
            .validate()
            .map_err(|e| OpsError::invalid_seed(e.to_string().replace('\n', "; ")))?;

        let mut seen = HashSet::new();
        for key in manifest
            .images
            .iter()
            .map(ImageAsset::storage_key)
            .chain(manifest.audio.iter().map(AudioAsset::storage_key))
        {
            if !seen.insert(key.clone()) {
                return Err(OpsError::invalid_seed(format!("duplicate asset '{}'", key)));
            }
        }

        Ok(manifest)
    }

    /// Keeps only entries for one game.
    pub fn for_game(&self, game: &str) -> AssetManifest {
        AssetManifest {
            images: self.images.iter().filter(|a| a.game == game).cloned().collect(),
            audio: self.audio.iter().filter(|a| a.game == game).cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "images": [
            { "key": "fruit-apple", "game": "fruit-sorting", "prompt": "a shiny red apple, flat cartoon" },
            { "key": "animal-cat", "game": "animal-match", "prompt": "a smiling orange cat", "size": "512x512" }
        ],
        "audio": [
            { "key": "fruit-welcome", "game": "fruit-sorting", "text": "Let's sort the fruit!", "speed": 0.9 }
        ]
    }"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = AssetManifest::from_json(SAMPLE).unwrap();
        assert_eq!(manifest.images.len(), 2);
        assert_eq!(manifest.images[0].storage_key(), "games/images/fruit-apple.png");
        assert_eq!(manifest.audio[0].storage_key(), "games/audio/fruit-welcome.mp3");
        assert_eq!(manifest.images[1].size.as_deref(), Some("512x512"));
    }

    #[test]
    fn test_rejects_bad_key() {
        let raw = SAMPLE.replace("fruit-apple", "../apple");
        assert!(AssetManifest::from_json(&raw).is_err());
    }

    #[test]
    fn test_rejects_duplicate_keys() {
        let raw = SAMPLE.replace("animal-cat", "fruit-apple");
        let err = AssetManifest::from_json(&raw).unwrap_err();
        assert!(err.to_string().contains("duplicate asset"));
    }

    #[test]
    fn test_rejects_out_of_range_speed() {
        let raw = SAMPLE.replace("0.9", "9.0");
        assert!(AssetManifest::from_json(&raw).is_err());
    }

    #[test]
    fn test_for_game_filters() {
        let manifest = AssetManifest::from_json(SAMPLE).unwrap().for_game("fruit-sorting");
        assert_eq!(manifest.images.len(), 1);
        assert_eq!(manifest.audio.len(), 1);
    }
}
