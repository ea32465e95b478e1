//! OpenAI-compatible image and speech clients.
//!
//! Endpoints come from the active `ai_model_configs` row for the model
//! type, default row first; the environment fallback applies only when the
//! table has no usable row.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use kinder_config::AiProviderConfig;
use kinder_db::ddl::{ER_NO_SUCH_TABLE, mysql_error_number};
use kinder_models::{AiModelConfig, ModelType};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::MediaError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointSource {
    Database { name: String },
    Environment,
}

#[derive(Clone, PartialEq)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Voice from `model_parameters`, speech models only.
    pub voice: Option<String>,
    pub source: EndpointSource,
}

impl fmt::Debug for ProviderEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEndpoint")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("source", &self.source)
            .finish()
    }
}

impl ProviderEndpoint {
    fn url(&self, operation: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), operation)
    }

    fn from_row(row: &AiModelConfig) -> Self {
        Self {
            base_url: row.base_url().to_string(),
            api_key: row.api_key.clone().filter(|k| !k.is_empty()),
            model: row.name.clone(),
            voice: row.parameter_str("voice").map(str::to_string),
            source: EndpointSource::Database {
                name: row.name.clone(),
            },
        }
    }
}

const MODEL_CONFIG_SQL: &str = r#"
    SELECT id, name, display_name, provider, model_type, endpoint_url, api_key,
           model_parameters, is_default, status
    FROM ai_model_configs
    WHERE status = 'active'
    ORDER BY is_default DESC, id ASC
"#;

#[derive(Debug, Clone)]
pub struct ModelResolver {
    fallback: AiProviderConfig,
}

impl ModelResolver {
    pub fn new(fallback: AiProviderConfig) -> Self {
        Self { fallback }
    }

    pub fn fallback(&self) -> &AiProviderConfig {
        &self.fallback
    }

    /// Picks the row to use for `kind`: active, matching type, default
    /// rows before others, then lowest id.
    pub fn pick(rows: &[AiModelConfig], kind: ModelType) -> Option<&AiModelConfig> {
        rows.iter()
            .filter(|r| r.status.eq_ignore_ascii_case("active") && r.kind() == Some(kind))
            .min_by_key(|r| (!r.is_default, r.id))
    }

    pub fn fallback_endpoint(&self, kind: ModelType) -> ProviderEndpoint {
        let (model, voice) = match kind {
            ModelType::Image => (self.fallback.image_model.clone(), None),
            ModelType::Speech => (
                self.fallback.tts_model.clone(),
                Some(self.fallback.tts_voice.clone()),
            ),
            ModelType::Text => (String::new(), None),
        };
        ProviderEndpoint {
            base_url: self.fallback.base_url.clone(),
            api_key: self.fallback.api_key.clone(),
            model,
            voice,
            source: EndpointSource::Environment,
        }
    }

    /// Resolves the endpoint for `kind`.
    ///
    /// A deployment without the `ai_model_configs` table uses the
    /// environment fallback; any other query failure is returned.
    #[instrument(skip(self, pool))]
    pub async fn resolve(&self, pool: &MySqlPool, kind: ModelType) -> Result<ProviderEndpoint, MediaError> {
        let rows = match sqlx::query_as::<_, AiModelConfig>(MODEL_CONFIG_SQL)
            .fetch_all(pool)
            .await
        {
            Ok(rows) => rows,
            Err(e) if mysql_error_number(&e) == Some(ER_NO_SUCH_TABLE) => {
                warn!("ai_model_configs table missing; using environment settings");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let endpoint = match Self::pick(&rows, kind) {
            Some(row) => ProviderEndpoint::from_row(row),
            None => {
                if self.fallback.api_key.is_none() {
                    return Err(MediaError::MissingModel(kind.as_str()));
                }
                self.fallback_endpoint(kind)
            }
        };

        info!(kind = %kind, model = %endpoint.model, source = ?endpoint.source, "Resolved AI model");
        Ok(endpoint)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, at least one.
    pub max_attempts: u32,
    /// Attempt `n` (1-based) waits `n * base_delay` before retrying.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &AiProviderConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: config.retry_delay(),
        }
    }

    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }
}

async fn send_json<B: Serialize>(
    http: &reqwest::Client,
    endpoint: &ProviderEndpoint,
    url: &str,
    body: &B,
    retry: RetryPolicy,
) -> Result<reqwest::Response, MediaError> {
    let mut attempt = 1;
    loop {
        let mut request = http.post(url).json(body);
        if let Some(key) = &endpoint.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = MediaError::Status {
            status: status.as_u16(),
            body: truncate(&body, 300),
        };
        if !error.is_unavailable() || attempt >= retry.max_attempts {
            return Err(error);
        }

        let wait = retry.base_delay * attempt;
        warn!(url = %url, attempt, wait_ms = wait.as_millis() as u64, "Provider unavailable, retrying");
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedImage {
    /// Provider-hosted URL, usually short-lived.
    Url(String),
    Bytes(Vec<u8>),
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    response_format: &'a str,
    watermark: bool,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    url: Option<String>,
    b64_json: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImageClient {
    http: reqwest::Client,
    endpoint: ProviderEndpoint,
    retry: RetryPolicy,
}

impl ImageClient {
    pub fn new(http: reqwest::Client, endpoint: ProviderEndpoint, retry: RetryPolicy) -> Self {
        Self {
            http,
            endpoint,
            retry,
        }
    }

    pub fn endpoint(&self) -> &ProviderEndpoint {
        &self.endpoint
    }

    /// `POST {base}/images/generations`; returns the first image.
    #[instrument(skip(self, prompt), fields(model = %self.endpoint.model))]
    pub async fn generate(&self, prompt: &str, size: &str) -> Result<GeneratedImage, MediaError> {
        let body = ImageRequest {
            model: &self.endpoint.model,
            prompt,
            n: 1,
            size,
            response_format: "url",
            watermark: false,
        };
        let url = self.endpoint.url("images/generations");
        let response = send_json(&self.http, &self.endpoint, &url, &body, self.retry).await?;
        let parsed: ImageResponse = response.json().await?;

        let datum = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| MediaError::Provider("no image in response".to_string()))?;

        match (datum.url, datum.b64_json) {
            (Some(url), _) if !url.is_empty() => {
                debug!(image_url = %url, "Image generated");
                Ok(GeneratedImage::Url(url))
            }
            (_, Some(encoded)) => Ok(GeneratedImage::Bytes(BASE64.decode(encoded.trim())?)),
            _ => Err(MediaError::Provider("image entry has neither url nor b64_json".to_string())),
        }
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct TtsClient {
    http: reqwest::Client,
    endpoint: ProviderEndpoint,
    default_voice: String,
    retry: RetryPolicy,
}

impl TtsClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: ProviderEndpoint,
        default_voice: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            endpoint,
            default_voice: default_voice.into(),
            retry,
        }
    }

    pub fn endpoint(&self) -> &ProviderEndpoint {
        &self.endpoint
    }

    /// `POST {base}/audio/speech`; returns MP3 bytes.
    ///
    /// Voice precedence: argument, the model row's configured voice, then
    /// the client default.
    #[instrument(skip(self, text), fields(model = %self.endpoint.model, chars = text.chars().count()))]
    pub async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        speed: Option<f32>,
    ) -> Result<Vec<u8>, MediaError> {
        let voice = voice
            .or(self.endpoint.voice.as_deref())
            .unwrap_or(&self.default_voice);
        let body = SpeechRequest {
            model: &self.endpoint.model,
            input: text,
            voice,
            response_format: "mp3",
            speed,
        };
        let url = self.endpoint.url("audio/speech");
        let response = send_json(&self.http, &self.endpoint, &url, &body, self.retry).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(MediaError::Provider("empty audio response".to_string()));
        }
        Ok(bytes.to_vec())
    }
}
