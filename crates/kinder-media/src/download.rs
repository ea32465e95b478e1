//! Fetching generated files from provider URLs.

use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::MediaError;

/// Downloads `url` fully into memory.
///
/// `timeout` bounds the whole exchange, connect through last byte. Non-2xx
/// answers and empty bodies are errors.
#[instrument(skip(client))]
pub async fn fetch_bytes(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, MediaError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| classify(e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        return Err(MediaError::Status {
            status: status.as_u16(),
            body: format!("download of {} failed", url),
        });
    }

    let bytes = response.bytes().await.map_err(|e| classify(e, timeout))?;
    if bytes.is_empty() {
        return Err(MediaError::Provider(format!("{} returned an empty body", url)));
    }

    debug!(bytes = bytes.len(), "Downloaded");
    Ok(bytes.to_vec())
}

fn classify(e: reqwest::Error, timeout: Duration) -> MediaError {
    if e.is_timeout() {
        MediaError::Timeout(timeout)
    } else {
        MediaError::Http(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_bytes_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img/1.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\x89PNG".to_vec()))
            .mount(&server)
            .await;

        let bytes = fetch_bytes(
            &reqwest::Client::new(),
            &format!("{}/img/1.png", server.uri()),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(bytes, b"\x89PNG");
    }

    #[tokio::test]
    async fn test_fetch_bytes_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late".to_vec())
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let err = fetch_bytes(
            &reqwest::Client::new(),
            &format!("{}/slow.png", server.uri()),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_fetch_bytes_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetch_bytes(
            &reqwest::Client::new(),
            &format!("{}/gone.png", server.uri()),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_bytes_rejects_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = fetch_bytes(
            &reqwest::Client::new(),
            &format!("{}/empty.png", server.uri()),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::Provider(_)));
    }
}
