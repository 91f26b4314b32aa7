//! Narration stream fetcher
//!
//! Opens `POST /generate-tts` and exposes the response body as a pull-based
//! sequence of binary chunks. The caller asks for the next chunk only after it
//! has finished with the current one, so the network is never read ahead of
//! the buffer.
//!
//! The fetcher does not retry; retry policy belongs to the caller.

use crate::error::{Error, Result, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Path of the narration endpoint relative to the backend base URL
pub const TTS_PATH: &str = "/generate-tts";

/// Text to narrate; sent once per playback session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NarrationRequest {
    text: String,
}

impl NarrationRequest {
    /// Rejects empty or whitespace-only text
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::EmptyNarration);
        }
        Ok(Self { text })
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Finite, non-restartable sequence of audio chunks
///
/// `Ok(None)` marks the end of the stream. Once the end has been reached or
/// an error returned, every further call returns `Ok(None)`.
#[async_trait]
pub trait ChunkStream: Send {
    async fn next_chunk(&mut self) -> std::result::Result<Option<Bytes>, TransportError>;
}

/// Opens narration streams
#[async_trait]
pub trait StreamFetcher: Send + Sync {
    /// Fails with `TransportError` when the request cannot be sent or the
    /// response status is not a success.
    async fn open(
        &self,
        request: &NarrationRequest,
    ) -> std::result::Result<Box<dyn ChunkStream>, TransportError>;
}

/// reqwest-backed fetcher for the narration endpoint
#[derive(Debug, Clone)]
pub struct HttpStreamFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpStreamFetcher {
    /// Build a fetcher for `{base_url}/generate-tts`
    ///
    /// Only the connection phase has a timeout; the body may stream for as
    /// long as the producer keeps generating.
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("narrator-player/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), TTS_PATH),
        })
    }

    /// Full URL of the narration endpoint
    pub fn endpoint_url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl StreamFetcher for HttpStreamFetcher {
    async fn open(
        &self,
        request: &NarrationRequest,
    ) -> std::result::Result<Box<dyn ChunkStream>, TransportError> {
        debug!(
            url = %self.url,
            chars = request.text().chars().count(),
            "Opening narration stream"
        );

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Connect {
                url: self.url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %self.url, status = status.as_u16(), "Narration endpoint refused request");
            return Err(TransportError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        info!(url = %self.url, "Narration stream opened");
        Ok(Box::new(HttpChunkStream {
            response: Some(response),
            bytes_received: 0,
        }))
    }
}

/// Body of an open narration response
struct HttpChunkStream {
    /// None once the stream ended or failed
    response: Option<reqwest::Response>,
    bytes_received: u64,
}

#[async_trait]
impl ChunkStream for HttpChunkStream {
    async fn next_chunk(&mut self) -> std::result::Result<Option<Bytes>, TransportError> {
        loop {
            let Some(response) = self.response.as_mut() else {
                return Ok(None);
            };

            match response.chunk().await {
                Ok(Some(chunk)) if chunk.is_empty() => continue,
                Ok(Some(chunk)) => {
                    self.bytes_received += chunk.len() as u64;
                    return Ok(Some(chunk));
                }
                Ok(None) => {
                    debug!(bytes = self.bytes_received, "Narration stream ended");
                    self.response = None;
                    return Ok(None);
                }
                Err(e) => {
                    self.response = None;
                    return Err(TransportError::Interrupted {
                        bytes_received: self.bytes_received,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_rejects_empty_text() {
        assert!(matches!(NarrationRequest::new(""), Err(Error::EmptyNarration)));
        assert!(matches!(NarrationRequest::new(" \n\t"), Err(Error::EmptyNarration)));
    }

    #[test]
    fn test_request_serializes_as_text_object() {
        let request = NarrationRequest::new("Good morning.").unwrap();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({ "text": "Good morning." }));
    }

    #[test]
    fn test_endpoint_url_joins_base() {
        let fetcher =
            HttpStreamFetcher::new("http://localhost:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(fetcher.endpoint_url(), "http://localhost:8000/generate-tts");

        let fetcher =
            HttpStreamFetcher::new("http://tts.internal:9000", Duration::from_secs(1)).unwrap();
        assert_eq!(fetcher.endpoint_url(), "http://tts.internal:9000/generate-tts");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connect_error() {
        // Port 9 (discard) on localhost is expected to refuse connections
        let fetcher =
            HttpStreamFetcher::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let request = NarrationRequest::new("hello").unwrap();

        match fetcher.open(&request).await {
            Err(TransportError::Connect { url, .. }) => {
                assert_eq!(url, "http://127.0.0.1:9/generate-tts");
            }
            Err(other) => panic!("Expected Connect error, got {:?}", other),
            Ok(_) => panic!("Expected Connect error, got a stream"),
        }
    }
}
