//! Fallback AI provider settings.
//!
//! Model credentials normally come from the `ai_model_configs` table. When no
//! active row exists for a model type these variables are used instead:
//!
//! - `AI_BASE_URL`: OpenAI-compatible base URL (default: `https://api.openai.com/v1`)
//! - `AI_API_KEY`: bearer token
//! - `AI_IMAGE_MODEL`: text-to-image model name
//! - `AI_IMAGE_SIZE`: requested image size (default: `1024x1024`)
//! - `AI_TTS_MODEL`: text-to-speech model name
//! - `AI_TTS_VOICE`: default voice (default: `alloy`)
//! - `AI_MAX_RETRIES`: attempts on HTTP 503 (default: 3)
//! - `AI_RETRY_DELAY_MS`: base delay between attempts (default: 2000)

use std::fmt;
use std::time::Duration;

use crate::{env_lookup, parse_or};

#[derive(Clone, PartialEq, Eq)]
pub struct AiProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub image_model: String,
    pub image_size: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl fmt::Debug for AiProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("image_model", &self.image_model)
            .field("image_size", &self.image_size)
            .field("tts_model", &self.tts_model)
            .field("tts_voice", &self.tts_voice)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish()
    }
}

impl Default for AiProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            image_model: "dall-e-3".to_string(),
            image_size: "1024x1024".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            max_retries: 3,
            retry_delay_ms: 2000,
        }
    }
}

impl AiProviderConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            base_url: lookup("AI_BASE_URL").unwrap_or(defaults.base_url),
            api_key: lookup("AI_API_KEY").filter(|k| !k.is_empty()),
            image_model: lookup("AI_IMAGE_MODEL").unwrap_or(defaults.image_model),
            image_size: lookup("AI_IMAGE_SIZE").unwrap_or(defaults.image_size),
            tts_model: lookup("AI_TTS_MODEL").unwrap_or(defaults.tts_model),
            tts_voice: lookup("AI_TTS_VOICE").unwrap_or(defaults.tts_voice),
            max_retries: parse_or(&lookup, "AI_MAX_RETRIES", defaults.max_retries).max(1),
            retry_delay_ms: parse_or(&lookup, "AI_RETRY_DELAY_MS", defaults.retry_delay_ms),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AiProviderConfig::from_lookup(|_| None);
        assert_eq!(config, AiProviderConfig::default());
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_empty_api_key_is_none() {
        let config = AiProviderConfig::from_lookup(|key| (key == "AI_API_KEY").then(String::new));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_debug_masks_api_key() {
        let config = AiProviderConfig {
            api_key: Some("sk-live-123".into()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-live-123"));
    }
}
