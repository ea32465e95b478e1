//! Provider configuration rows from `ai_model_configs`.
//!
//! The application stores endpoint URL and key per model in the database
//! rather than in static config.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Text,
    Image,
    Speech,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Speech => "speech",
        }
    }

    /// Column values that denote this type; rows written by older admin
    /// screens use `tts`/`audio` for speech models.
    pub fn column_values(&self) -> &'static [&'static str] {
        match self {
            Self::Text => &["text"],
            Self::Image => &["image"],
            Self::Speech => &["speech", "tts", "audio"],
        }
    }

    pub fn parse_column(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        [Self::Text, Self::Image, Self::Speech]
            .into_iter()
            .find(|t| t.column_values().contains(&value.as_str()))
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AiModelConfig {
    pub id: i64,
    pub name: String,
    pub display_name: Option<String>,
    pub provider: Option<String>,
    pub model_type: String,
    pub endpoint_url: String,
    pub api_key: Option<String>,
    pub model_parameters: Option<serde_json::Value>,
    pub is_default: bool,
    pub status: String,
}

impl fmt::Debug for AiModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiModelConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("model_type", &self.model_type)
            .field("endpoint_url", &self.endpoint_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("is_default", &self.is_default)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl AiModelConfig {
    pub fn kind(&self) -> Option<ModelType> {
        ModelType::parse_column(&self.model_type)
    }

    /// Reads a string entry from `model_parameters` (e.g. `voice`).
    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.model_parameters.as_ref()?.get(key)?.as_str()
    }

    /// Endpoint base URL with any operation suffix stripped, so the
    /// operation path can be appended uniformly.
    pub fn base_url(&self) -> &str {
        let url = self.endpoint_url.trim_end_matches('/');
        for suffix in ["/chat/completions", "/images/generations", "/audio/speech"] {
            if let Some(stripped) = url.strip_suffix(suffix) {
                return stripped;
            }
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(endpoint: &str, model_type: &str) -> AiModelConfig {
        AiModelConfig {
            id: 1,
            name: "doubao-seedream".into(),
            display_name: None,
            provider: Some("volcengine".into()),
            model_type: model_type.into(),
            endpoint_url: endpoint.into(),
            api_key: Some("secret".into()),
            model_parameters: Some(json!({"voice": "zh_female_cancan"})),
            is_default: true,
            status: "active".into(),
        }
    }

    #[test]
    fn test_model_type_aliases() {
        assert_eq!(ModelType::parse_column("TTS"), Some(ModelType::Speech));
        assert_eq!(ModelType::parse_column("image"), Some(ModelType::Image));
        assert_eq!(ModelType::parse_column("video"), None);
    }

    #[test]
    fn test_base_url_strips_operation_suffix() {
        let c = config("https://ark.example.com/api/v3/images/generations", "image");
        assert_eq!(c.base_url(), "https://ark.example.com/api/v3");
        let c = config("https://ark.example.com/api/v3/", "image");
        assert_eq!(c.base_url(), "https://ark.example.com/api/v3");
    }

    #[test]
    fn test_parameter_lookup() {
        let c = config("https://x", "speech");
        assert_eq!(c.parameter_str("voice"), Some("zh_female_cancan"));
        assert_eq!(c.parameter_str("speed"), None);
        assert_eq!(c.kind(), Some(ModelType::Speech));
    }

    #[test]
    fn test_debug_masks_key() {
        let debug = format!("{:?}", config("https://x", "image"));
        assert!(!debug.contains("secret"));
    }
}
