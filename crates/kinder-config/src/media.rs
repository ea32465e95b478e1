//! Post-processing parameters for generated media.
//!
//! - `FFMPEG_BIN`: ffmpeg executable (default: `ffmpeg`)
//! - `IMAGE_CROP_PERCENT`: border trimmed from each edge, in percent (default: 5)
//! - `IMAGE_WIDTH` / `IMAGE_HEIGHT`: output resolution (default: 1024x1024)
//! - `VIDEO_MAX_SECONDS`: duration ceiling when transcoding (default: 60)

use crate::{env_lookup, parse_or};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaConfig {
    pub ffmpeg_bin: String,
    pub crop_percent: u32,
    pub image_width: u32,
    pub image_height: u32,
    pub video_max_seconds: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            crop_percent: 5,
            image_width: 1024,
            image_height: 1024,
            video_max_seconds: 60,
        }
    }
}

impl MediaConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            ffmpeg_bin: lookup("FFMPEG_BIN").unwrap_or(defaults.ffmpeg_bin),
            // Trimming half the image or more from each side leaves nothing.
            crop_percent: parse_or(&lookup, "IMAGE_CROP_PERCENT", defaults.crop_percent).min(49),
            image_width: parse_or(&lookup, "IMAGE_WIDTH", defaults.image_width),
            image_height: parse_or(&lookup, "IMAGE_HEIGHT", defaults.image_height),
            video_max_seconds: parse_or(&lookup, "VIDEO_MAX_SECONDS", defaults.video_max_seconds),
        }
    }
}
