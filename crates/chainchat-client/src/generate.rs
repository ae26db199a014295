use std::pin::Pin;
use std::time::Duration;

use async_stream::stream;
use chainchat_core::config::DEFAULT_GENERATE_TIMEOUT_SECS;
use chainchat_core::{ChainChatConfig, Result};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::deadline::Deadline;
use crate::decode::Utf8ChunkDecoder;
use crate::http::{http_error, open_stream};

/// Decoded text fragments in arrival order. Ends when the body ends.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    /// Chained in order by the server
    pub models: Vec<String>,
    #[serde(rename = "needReasoning")]
    pub need_reasoning: bool,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, models: Vec<String>, need_reasoning: bool) -> Self {
        Self {
            prompt: prompt.into(),
            models,
            need_reasoning,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl GenerationClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(DEFAULT_GENERATE_TIMEOUT_SECS),
        }
    }

    pub fn from_config(config: &ChainChatConfig) -> Self {
        Self::new(config.server.base_url()).with_timeout(config.timeouts.generate())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stream the chained response for `request`.
    ///
    /// The deadline starts when the stream is first polled and covers the
    /// whole exchange, body included. Hitting it cancels `cancel` and yields
    /// `Timeout`; cancelling `cancel` from outside yields `Cancelled`.
    pub fn generate(&self, request: GenerateRequest, cancel: CancellationToken) -> TextStream {
        let url = format!("{}/generate", self.base_url);
        let timeout = self.timeout;
        info!(models = ?request.models, need_reasoning = request.need_reasoning, "Starting generation");
        let http = self.client.post(url).json(&request);

        Box::pin(stream! {
            let deadline = Deadline::after(timeout, cancel);
            let response = match open_stream(http, &deadline, "Generate").await {
                Ok(response) => response,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut body = Box::pin(response.bytes_stream());
            let mut decoder = Utf8ChunkDecoder::new();
            let mut chunks = 0usize;

            loop {
                match deadline.run(body.next()).await {
                    Ok(Some(Ok(bytes))) => {
                        let text = decoder.decode(&bytes);
                        if !text.is_empty() {
                            chunks += 1;
                            yield Ok(text);
                        }
                    }
                    Ok(Some(Err(e))) => {
                        yield Err(http_error(e));
                        return;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            let tail = decoder.finish();
            if !tail.is_empty() {
                yield Ok(tail);
            }
            debug!(chunks, "Generation stream finished");
        })
    }
}
