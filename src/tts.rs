//! The text-to-speech collaborator seam.
//!
//! The registry only needs "text + voice + optional previous line in, compressed audio out".
//! `TtsClient` captures that contract; `HttpTtsClient` (feature `http`) speaks it over HTTP
//! to a voice generation endpoint such as `skitvoice-server`.

use std::future::Future;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Result;

/// One synthesis request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsRequest {
    pub text: String,
    pub voice_id: String,
    /// Text of the line immediately before this one. Absent for the first line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_text: Option<String>,
}

/// A TTS service that turns a `TtsRequest` into a compressed audio payload (`audio/mpeg`).
///
/// Failures should be reported as `Error::Collaborator`.
pub trait TtsClient {
    fn synthesize(&self, request: &TtsRequest) -> impl Future<Output = Result<Bytes>>;
}

impl<T: TtsClient> TtsClient for &T {
    fn synthesize(&self, request: &TtsRequest) -> impl Future<Output = Result<Bytes>> {
        (**self).synthesize(request)
    }
}

#[cfg(feature = "http")]
pub use http::HttpTtsClient;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use bytes::Bytes;
    use reqwest::header::CONTENT_TYPE;
    use tracing::{debug, warn};

    use super::{TtsClient, TtsRequest};
    use crate::{Error, Result};

    /// `TtsClient` that POSTs JSON requests to a voice generation endpoint.
    #[derive(Debug, Clone)]
    pub struct HttpTtsClient {
        client: reqwest::Client,
        endpoint: String,
        api_key: Option<String>,
    }

    impl HttpTtsClient {
        /// Build a client for `endpoint` (the full URL of the generate-voice route).
        pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|err| Error::msg(format!("failed to build HTTP client: {err}")))?;

            Ok(Self {
                client,
                endpoint: endpoint.into(),
                api_key: None,
            })
        }

        /// Send `Authorization: Bearer <key>` and `apikey: <key>` with every request.
        pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
            self.api_key = Some(api_key.into());
            self
        }

        pub fn endpoint(&self) -> &str {
            &self.endpoint
        }
    }

    impl TtsClient for HttpTtsClient {
        async fn synthesize(&self, request: &TtsRequest) -> Result<Bytes> {
            debug!(voice_id = %request.voice_id, chars = request.text.len(), "requesting voice");

            let mut builder = self.client.post(&self.endpoint).json(request);
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key).header("apikey", key);
            }

            let response = builder.send().await.map_err(|err| {
                let message = if err.is_timeout() {
                    format!("request timed out: {err}")
                } else {
                    err.to_string()
                };
                Error::collaborator(err.status().map(|s| s.as_u16()), message)
            })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), %body, "voice endpoint returned an error");
                return Err(Error::collaborator(Some(status.as_u16()), body));
            }

            if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
                debug!(content_type = ?content_type, "voice payload received");
            }

            response
                .bytes()
                .await
                .map_err(|err| Error::collaborator(Some(status.as_u16()), err.to_string()))
        }
    }
}
