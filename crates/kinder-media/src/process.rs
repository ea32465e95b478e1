//! ffmpeg-based post-processing.
//!
//! Generated illustrations carry a provider watermark and uneven margins
//! near the edges; trimming a fixed border and rescaling gives every
//! question image the same framing. Videos are re-encoded to H.264/AAC
//! with a hard duration ceiling so they stream in the parent app.

use kinder_config::MediaConfig;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::error::MediaError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePostProcess {
    /// Border removed from each edge, in percent of that dimension.
    pub crop_percent: u32,
    pub width: u32,
    pub height: u32,
}

impl ImagePostProcess {
    pub fn from_config(config: &MediaConfig) -> Self {
        Self {
            crop_percent: config.crop_percent.min(49),
            width: config.image_width,
            height: config.image_height,
        }
    }

    /// The `-vf` filter chain: centered crop, then scale.
    pub fn filter(&self) -> String {
        let scale = format!("scale={}:{}", self.width, self.height);
        if self.crop_percent == 0 {
            return scale;
        }
        let keep = f64::from(100 - 2 * self.crop_percent.min(49)) / 100.0;
        format!("crop=iw*{keep}:ih*{keep},{scale}")
    }

    pub fn args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args = base_args(input);
        args.extend(["-vf".to_string(), self.filter(), "-frames:v".to_string(), "1".to_string()]);
        args.push(output.display().to_string());
        args
    }

    /// Runs the crop/scale over in-memory image bytes.
    #[instrument(skip(self, image), fields(bytes = image.len()))]
    pub async fn apply(&self, ffmpeg_bin: &str, image: &[u8]) -> Result<Vec<u8>, MediaError> {
        let scratch = tempfile::tempdir()?;
        let input = scratch.path().join("source");
        let output = scratch.path().join("processed.png");

        tokio::fs::write(&input, image).await?;
        run_ffmpeg(ffmpeg_bin, &self.args(&input, &output)).await?;
        let processed = tokio::fs::read(&output).await?;

        debug!(before = image.len(), after = processed.len(), "Image post-processed");
        Ok(processed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTranscode {
    pub max_seconds: u32,
    pub crf: u8,
    pub preset: String,
    pub audio_bitrate: String,
}

impl VideoTranscode {
    pub fn from_config(config: &MediaConfig) -> Self {
        Self {
            max_seconds: config.video_max_seconds,
            crf: 23,
            preset: "medium".to_string(),
            audio_bitrate: "128k".to_string(),
        }
    }

    pub fn args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args = base_args(input);
        args.extend(
            [
                "-t",
                &self.max_seconds.to_string(),
                "-c:v",
                "libx264",
                "-preset",
                &self.preset,
                "-crf",
                &self.crf.to_string(),
                "-pix_fmt",
                "yuv420p",
                "-c:a",
                "aac",
                "-b:a",
                &self.audio_bitrate,
                "-movflags",
                "+faststart",
            ]
            .map(str::to_string),
        );
        args.push(output.display().to_string());
        args
    }

    pub async fn transcode(&self, ffmpeg_bin: &str, input: &Path, output: &Path) -> Result<(), MediaError> {
        if !tokio::fs::try_exists(input).await? {
            return Err(MediaError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("input video {} not found", input.display()),
            )));
        }
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        run_ffmpeg(ffmpeg_bin, &self.args(input, output)).await?;

        let size = tokio::fs::metadata(output).await?.len();
        info!(output = %output.display(), bytes = size, max_seconds = self.max_seconds, "Video transcoded");
        Ok(())
    }
}

fn base_args(input: &Path) -> Vec<String> {
    ["-y", "-hide_banner", "-loglevel", "error", "-i"]
        .map(str::to_string)
        .into_iter()
        .chain(std::iter::once(input.display().to_string()))
        .collect()
}

/// Runs ffmpeg to completion; a non-zero exit carries the tail of stderr.
pub async fn run_ffmpeg(bin: &str, args: &[String]) -> Result<(), MediaError> {
    debug!(bin, args = ?args, "Running ffmpeg");
    let output = Command::new(bin).args(args).kill_on_drop(true).output().await?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
    Err(MediaError::Ffmpeg {
        code: output.status.code(),
        stderr: tail.into_iter().rev().collect::<Vec<_>>().join(" | "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn image_step() -> ImagePostProcess {
        ImagePostProcess::from_config(&MediaConfig::default())
    }

    #[test]
    fn test_filter_crops_then_scales() {
        assert_eq!(image_step().filter(), "crop=iw*0.9:ih*0.9,scale=1024:1024");
    }

    #[test]
    fn test_zero_crop_only_scales() {
        let step = ImagePostProcess {
            crop_percent: 0,
            width: 800,
            height: 600,
        };
        assert_eq!(step.filter(), "scale=800:600");
    }

    #[test]
    fn test_image_args() {
        let args = image_step().args(&PathBuf::from("in.png"), &PathBuf::from("out.png"));
        assert_eq!(args[..6], ["-y", "-hide_banner", "-loglevel", "error", "-i", "in.png"]);
        assert!(args.windows(2).any(|w| w == ["-vf", "crop=iw*0.9:ih*0.9,scale=1024:1024"]));
        assert!(args.windows(2).any(|w| w == ["-frames:v", "1"]));
        assert_eq!(args.last().map(String::as_str), Some("out.png"));
    }

    #[test]
    fn test_video_args_enforce_ceiling_and_codecs() {
        let step = VideoTranscode::from_config(&MediaConfig::default());
        let args = step.args(&PathBuf::from("raw.mov"), &PathBuf::from("out.mp4"));
        assert!(args.windows(2).any(|w| w == ["-t", "60"]));
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "aac"]));
        assert!(args.windows(2).any(|w| w == ["-movflags", "+faststart"]));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let err = run_ffmpeg("kinder-no-such-ffmpeg", &["-version".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Io(_)));
    }

    #[tokio::test]
    async fn test_transcode_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let step = VideoTranscode::from_config(&MediaConfig::default());
        let err = step
            .transcode("ffmpeg", &dir.path().join("nope.mov"), &dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_apply_produces_scaled_png() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.png");
        run_ffmpeg(
            "ffmpeg",
            &[
                "-y", "-f", "lavfi", "-i", "color=c=red:s=200x100", "-frames:v", "1",
                &source.display().to_string(),
            ]
            .map(|s| s.to_string()),
        )
        .await
        .unwrap();

        let bytes = tokio::fs::read(&source).await.unwrap();
        let processed = image_step().apply("ffmpeg", &bytes).await.unwrap();
        assert!(processed.starts_with(b"\x89PNG"));
    }
}
