//! Asset generation jobs.
//!
//! Database variants enumerate `assessment_questions` rows that still lack
//! media, generate it, store it under `uploads/` and write the relative URL
//! back onto the row. The file variant works from the game asset manifest
//! and only checks the uploads tree afterwards.

use kinder_core::{FileStorage, LocalFileStorage};
use kinder_models::assets::{GAME_AUDIO_DIR, GAME_IMAGE_DIR};
use kinder_models::{AssessmentQuestion, AssetManifest, AudioAsset, ImageAsset, QuestionId};
use sqlx::MySqlPool;
use std::fmt;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::ai::{GeneratedImage, ImageClient, TtsClient};
use crate::download::fetch_bytes;
use crate::error::MediaError;
use crate::process::ImagePostProcess;
use crate::scan::{ScanReport, scan};
use crate::throttle::{BatchThrottle, RunSummary, WorkItem};

/// Everything a generator needs besides the provider clients.
#[derive(Debug)]
pub struct MediaContext {
    pub storage: LocalFileStorage,
    pub http: reqwest::Client,
    pub throttle: BatchThrottle,
    pub download_timeout: Duration,
    /// Applied to images before they are stored; `None` stores them as
    /// delivered.
    pub post_process: Option<ImagePostProcess>,
    pub ffmpeg_bin: String,
    /// Provider image size, e.g. `1024x1024`.
    pub image_size: String,
}

impl MediaContext {
    async fn store(&self, key: &str, bytes: &[u8]) -> Result<String, MediaError> {
        self.storage.save(key, bytes).await?;
        Ok(self.storage.get_url(key)?)
    }

    async fn image_bytes(&self, image: GeneratedImage) -> Result<Vec<u8>, MediaError> {
        let raw = match image {
            GeneratedImage::Url(url) => fetch_bytes(&self.http, &url, self.download_timeout).await?,
            GeneratedImage::Bytes(bytes) => bytes,
        };
        match &self.post_process {
            Some(step) => step.apply(&self.ffmpeg_bin, &raw).await,
            None => Ok(raw),
        }
    }
}

#[derive(Debug, Clone)]
struct QuestionImageJob {
    id: QuestionId,
    key: String,
    prompt: String,
}

impl WorkItem for QuestionImageJob {
    fn label(&self) -> String {
        format!("question-{}", self.id)
    }
}

#[derive(Debug, Clone)]
struct QuestionAudioJob {
    id: QuestionId,
    key: String,
    text: String,
}

impl WorkItem for QuestionAudioJob {
    fn label(&self) -> String {
        format!("question-{}", self.id)
    }
}

impl WorkItem for ImageAsset {
    fn label(&self) -> String {
        format!("{}/{}", self.game, self.key)
    }
}

impl WorkItem for AudioAsset {
    fn label(&self) -> String {
        format!("{}/{}", self.game, self.key)
    }
}

const PENDING_IMAGES_SQL: &str = r#"
    SELECT id, title, dimension, age_group, image_url, image_prompt, audio_url, audio_text
    FROM assessment_questions
    WHERE image_prompt IS NOT NULL AND TRIM(image_prompt) <> ''
      AND (image_url IS NULL OR TRIM(image_url) = '')
    ORDER BY id
"#;

const PENDING_AUDIO_SQL: &str = r#"
    SELECT id, title, dimension, age_group, image_url, image_prompt, audio_url, audio_text
    FROM assessment_questions
    WHERE audio_text IS NOT NULL AND TRIM(audio_text) <> ''
      AND (audio_url IS NULL OR TRIM(audio_url) = '')
    ORDER BY id
"#;

// The URL guard keeps a concurrent editor's value.
const SET_IMAGE_URL_SQL: &str = "UPDATE assessment_questions SET image_url = ? \
     WHERE id = ? AND (image_url IS NULL OR TRIM(image_url) = '')";

const SET_AUDIO_URL_SQL: &str = "UPDATE assessment_questions SET audio_url = ? \
     WHERE id = ? AND (audio_url IS NULL OR TRIM(audio_url) = '')";

fn image_jobs(questions: &[AssessmentQuestion], limit: Option<usize>) -> Vec<QuestionImageJob> {
    questions
        .iter()
        .filter_map(|q| {
            q.pending_image_prompt().map(|prompt| QuestionImageJob {
                id: q.id,
                key: q.image_key(),
                prompt: prompt.to_string(),
            })
        })
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

fn audio_jobs(questions: &[AssessmentQuestion], limit: Option<usize>) -> Vec<QuestionAudioJob> {
    questions
        .iter()
        .filter_map(|q| {
            q.pending_audio_text().map(|text| QuestionAudioJob {
                id: q.id,
                key: q.audio_key(),
                text: text.to_string(),
            })
        })
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Points rows at files that exist on disk but were never recorded, e.g.
/// after a run died between the write and the update.
async fn backfill_urls(
    pool: &MySqlPool,
    ctx: &MediaContext,
    sql: &str,
    rows: impl Iterator<Item = (QuestionId, String)>,
) -> Result<u64, MediaError> {
    let mut updated = 0;
    for (id, key) in rows {
        if !ctx.storage.exists(&key).await {
            continue;
        }
        let url = ctx.storage.get_url(&key)?;
        updated += sqlx::query(sql)
            .bind(&url)
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected();
    }
    Ok(updated)
}

/// Illustrations for questions that have a prompt but no image.
#[instrument(skip_all)]
pub async fn question_images(
    pool: &MySqlPool,
    ctx: &MediaContext,
    images: &ImageClient,
    limit: Option<usize>,
) -> Result<RunSummary, MediaError> {
    let questions = sqlx::query_as::<_, AssessmentQuestion>(PENDING_IMAGES_SQL)
        .fetch_all(pool)
        .await?;
    let jobs = image_jobs(&questions, limit);
    info!(pending = jobs.len(), "Questions awaiting images");

    let summary = ctx
        .throttle
        .run(
            jobs.clone(),
            |job: QuestionImageJob| async move { ctx.storage.exists(&job.key).await },
            |job: QuestionImageJob| async move {
                let image = images.generate(&job.prompt, &ctx.image_size).await?;
                let bytes = ctx.image_bytes(image).await?;
                let url = ctx.store(&job.key, &bytes).await?;
                sqlx::query(SET_IMAGE_URL_SQL)
                    .bind(&url)
                    .bind(job.id)
                    .execute(pool)
                    .await?;
                Ok::<(), MediaError>(())
            },
        )
        .await;

    let backfilled = backfill_urls(
        pool,
        ctx,
        SET_IMAGE_URL_SQL,
        jobs.into_iter().map(|j| (j.id, j.key)),
    )
    .await?;
    if backfilled > 0 {
        info!(backfilled, "Recorded URLs for images already on disk");
    }

    Ok(summary)
}

/// Narration for questions that have audio text but no audio.
#[instrument(skip_all)]
pub async fn question_audio(
    pool: &MySqlPool,
    ctx: &MediaContext,
    tts: &TtsClient,
    voice: Option<&str>,
    limit: Option<usize>,
) -> Result<RunSummary, MediaError> {
    let questions = sqlx::query_as::<_, AssessmentQuestion>(PENDING_AUDIO_SQL)
        .fetch_all(pool)
        .await?;
    let jobs = audio_jobs(&questions, limit);
    info!(pending = jobs.len(), "Questions awaiting audio");

    let summary = ctx
        .throttle
        .run(
            jobs.clone(),
            |job: QuestionAudioJob| async move { ctx.storage.exists(&job.key).await },
            |job: QuestionAudioJob| async move {
                let audio = tts.synthesize(&job.text, voice, None).await?;
                let url = ctx.store(&job.key, &audio).await?;
                sqlx::query(SET_AUDIO_URL_SQL)
                    .bind(&url)
                    .bind(job.id)
                    .execute(pool)
                    .await?;
                Ok::<(), MediaError>(())
            },
        )
        .await;

    let backfilled = backfill_urls(
        pool,
        ctx,
        SET_AUDIO_URL_SQL,
        jobs.into_iter().map(|j| (j.id, j.key)),
    )
    .await?;
    if backfilled > 0 {
        info!(backfilled, "Recorded URLs for audio already on disk");
    }

    Ok(summary)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameAssetReport {
    pub images: RunSummary,
    pub audio: RunSummary,
    pub image_scan: ScanReport,
    pub audio_scan: ScanReport,
}

impl GameAssetReport {
    pub fn is_clean(&self) -> bool {
        self.images.is_clean()
            && self.audio.is_clean()
            && self.image_scan.is_complete()
            && self.audio_scan.is_complete()
    }
}

impl fmt::Display for GameAssetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "🖼️  Images: {}", self.images)?;
        writeln!(f, "🔊 Audio:  {}", self.audio)?;
        writeln!(f, "{}", self.image_scan)?;
        write!(f, "{}", self.audio_scan)
    }
}

/// Game art and narration from the manifest. Either client may be absent,
/// in which case that half is left untouched and only scanned.
#[instrument(skip_all, fields(images = manifest.images.len(), audio = manifest.audio.len()))]
pub async fn game_assets(
    ctx: &MediaContext,
    manifest: &AssetManifest,
    images: Option<&ImageClient>,
    tts: Option<&TtsClient>,
) -> Result<GameAssetReport, MediaError> {
    let image_summary = match images {
        Some(client) => {
            ctx.throttle
                .run(
                    manifest.images.clone(),
                    |asset: ImageAsset| async move { ctx.storage.exists(&asset.storage_key()).await },
                    |asset: ImageAsset| async move {
                        let size = asset.size.as_deref().unwrap_or(ctx.image_size.as_str());
                        let image = client.generate(&asset.prompt, size).await?;
                        let bytes = ctx.image_bytes(image).await?;
                        ctx.store(&asset.storage_key(), &bytes).await?;
                        Ok::<(), MediaError>(())
                    },
                )
                .await
        }
        None => {
            warn!("No image model available; skipping game images");
            RunSummary::default()
        }
    };

    let audio_summary = match tts {
        Some(client) => {
            ctx.throttle
                .run(
                    manifest.audio.clone(),
                    |asset: AudioAsset| async move { ctx.storage.exists(&asset.storage_key()).await },
                    |asset: AudioAsset| async move {
                        let audio = client
                            .synthesize(&asset.text, asset.voice.as_deref(), asset.speed)
                            .await?;
                        ctx.store(&asset.storage_key(), &audio).await?;
                        Ok::<(), MediaError>(())
                    },
                )
                .await
        }
        None => {
            warn!("No speech model available; skipping game audio");
            RunSummary::default()
        }
    };

    let image_keys: Vec<String> = manifest.images.iter().map(ImageAsset::storage_key).collect();
    let audio_keys: Vec<String> = manifest.audio.iter().map(AudioAsset::storage_key).collect();
    let image_scan = scan(&ctx.storage, GAME_IMAGE_DIR, "png", &image_keys).await?;
    let audio_scan = scan(&ctx.storage, GAME_AUDIO_DIR, "mp3", &audio_keys).await?;

    Ok(GameAssetReport {
        images: image_summary,
        audio: audio_summary,
        image_scan,
        audio_scan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{EndpointSource, ProviderEndpoint, RetryPolicy};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn question(id: i64, image_url: Option<&str>, prompt: Option<&str>) -> AssessmentQuestion {
        AssessmentQuestion {
            id: QuestionId::new(id),
            title: format!("Question {}", id),
            dimension: None,
            age_group: None,
            image_url: image_url.map(str::to_string),
            image_prompt: prompt.map(str::to_string),
            audio_url: None,
            audio_text: Some(format!("Read question {}", id)),
        }
    }

    #[test]
    fn test_image_jobs_only_for_pending_rows() {
        let questions = vec![
            question(1, None, Some("apples")),
            question(2, Some("/uploads/assessment-images/question-2.png"), Some("pears")),
            question(3, None, None),
            question(4, Some(""), Some("grapes")),
        ];
        let jobs = image_jobs(&questions, None);
        let ids: Vec<i64> = jobs.iter().map(|j| j.id.into_inner()).collect();
        assert_eq!(ids, vec![1, 4]);
        assert_eq!(jobs[0].key, "assessment-images/question-1.png");
        assert_eq!(jobs[0].label(), "question-1");
    }

    #[test]
    fn test_jobs_respect_limit() {
        let questions: Vec<_> = (1..=10).map(|i| question(i, None, Some("p"))).collect();
        assert_eq!(image_jobs(&questions, Some(3)).len(), 3);
        assert_eq!(audio_jobs(&questions, Some(4)).len(), 4);
        assert_eq!(audio_jobs(&questions, None)[0].key, "assessment-audio/question-1.mp3");
    }

    fn context(storage_dir: &std::path::Path) -> MediaContext {
        MediaContext {
            storage: LocalFileStorage::new(storage_dir.to_path_buf(), "/uploads".into()),
            http: reqwest::Client::new(),
            throttle: BatchThrottle::new(2, Duration::ZERO),
            download_timeout: Duration::from_secs(5),
            post_process: None,
            ffmpeg_bin: "ffmpeg".into(),
            image_size: "1024x1024".into(),
        }
    }

    fn endpoint(base: &str) -> ProviderEndpoint {
        ProviderEndpoint {
            base_url: base.to_string(),
            api_key: None,
            model: "test-model".to_string(),
            voice: None,
            source: EndpointSource::Environment,
        }
    }

    fn manifest() -> AssetManifest {
        AssetManifest::from_json(
            &json!({
                "images": [
                    {"key": "fruit-apple", "game": "fruit-sorting", "prompt": "an apple"},
                    {"key": "fruit-pear", "game": "fruit-sorting", "prompt": "a pear"},
                    {"key": "fruit-plum", "game": "fruit-sorting", "prompt": "a plum"}
                ],
                "audio": [
                    {"key": "fruit-welcome", "game": "fruit-sorting", "text": "Welcome!"}
                ]
            })
            .to_string(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_game_assets_generate_download_and_scan() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"url": format!("{}/files/image.png", server.uri())}]
            })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/image.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\x89PNG-data".to_vec()))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/audio/speech"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3-data".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        // One image is already on disk from an earlier run, plus art of another game.
        ctx.storage.save("games/images/fruit-pear.png", b"old").await.unwrap();
        ctx.storage.save("games/images/color-red.png", b"other").await.unwrap();

        let images = ImageClient::new(ctx.http.clone(), endpoint(&server.uri()), RetryPolicy::none());
        let tts = TtsClient::new(ctx.http.clone(), endpoint(&server.uri()), "alloy", RetryPolicy::none());

        let report = game_assets(&ctx, &manifest(), Some(&images), Some(&tts)).await.unwrap();

        assert_eq!(report.images.success, 2);
        assert_eq!(report.images.skipped, 1);
        assert_eq!(report.audio.success, 1);
        assert_eq!(report.image_scan.present, 3);
        assert_eq!(report.image_scan.other_files, 1);
        assert_eq!(report.audio_scan.present, 1);
        assert!(report.is_clean());

        let stored = tokio::fs::read(dir.path().join("games/images/fruit-apple.png")).await.unwrap();
        assert_eq!(stored, b"\x89PNG-data");
    }

    #[tokio::test]
    async fn test_game_assets_count_failures_and_report_missing_files() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let images = ImageClient::new(ctx.http.clone(), endpoint(&server.uri()), RetryPolicy::none());

        let report = game_assets(&ctx, &manifest(), Some(&images), None).await.unwrap();

        assert_eq!(report.images.failed, 3);
        assert_eq!(report.images.batches, 2);
        assert_eq!(report.audio, RunSummary::default());
        assert_eq!(report.image_scan.missing(), 3);
        assert_eq!(report.audio_scan.missing(), 1);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_game_assets_rerun_calls_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let manifest = manifest();
        for asset in &manifest.images {
            ctx.storage.save(&asset.storage_key(), b"png").await.unwrap();
        }
        for asset in &manifest.audio {
            ctx.storage.save(&asset.storage_key(), b"mp3").await.unwrap();
        }

        let images = ImageClient::new(ctx.http.clone(), endpoint(&server.uri()), RetryPolicy::none());
        let tts = TtsClient::new(ctx.http.clone(), endpoint(&server.uri()), "alloy", RetryPolicy::none());
        let report = game_assets(&ctx, &manifest, Some(&images), Some(&tts)).await.unwrap();

        assert_eq!(report.images.skipped, 3);
        assert_eq!(report.audio.skipped, 1);
        assert!(report.is_clean());
    }
}
