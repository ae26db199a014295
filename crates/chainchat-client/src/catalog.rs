use std::pin::Pin;
use std::time::Duration;

use async_stream::stream;
use chainchat_core::config::DEFAULT_PULL_TIMEOUT_SECS;
use chainchat_core::{
    AvailableModels, ChainChatConfig, ChainChatError, PullProgress, Result, MODEL_NAME_REQUIRED,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::deadline::Deadline;
use crate::decode::LineFramer;
use crate::http::{http_error, open_stream};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Pull progress records in arrival order. The `success` record is the last item.
pub type ProgressStream = Pin<Box<dyn Stream<Item = Result<PullProgress>> + Send>>;

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CatalogClient {
    base_url: String,
    client: reqwest::Client,
    pull_timeout: Duration,
}

impl CatalogClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            pull_timeout: Duration::from_secs(DEFAULT_PULL_TIMEOUT_SECS),
        }
    }

    pub fn from_config(config: &ChainChatConfig) -> Self {
        Self::new(config.server.base_url()).with_pull_timeout(config.timeouts.pull())
    }

    pub fn with_pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn try_fetch_available_models(&self) -> Result<AvailableModels> {
        let url = format!("{}/models", self.base_url);
        debug!("Fetching available models");

        let resp = self
            .client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(http_error)?;

        if !resp.status().is_success() {
            return Err(ChainChatError::Server(format!(
                "Failed to list models: {}",
                resp.status()
            )));
        }

        let body = resp.text().await.map_err(http_error)?;
        let parsed: ModelsResponse = serde_json::from_str(&body)?;
        info!(count = parsed.models.len(), "Fetched available models");
        Ok(AvailableModels::new(parsed.models))
    }

    /// Installed models, or an empty set when the server can't be reached or answers oddly
    pub async fn fetch_available_models(&self) -> AvailableModels {
        self.try_fetch_available_models().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to fetch available models");
            AvailableModels::default()
        })
    }

    /// Start downloading `name` on the server and stream its progress.
    ///
    /// An empty name yields `Validation` without any request. A record
    /// carrying `error` ends the stream with `Server`.
    pub fn pull_model(&self, name: &str, cancel: CancellationToken) -> ProgressStream {
        let name = name.trim().to_string();
        let url = format!("{}/pull-model?model_name={}", self.base_url, urlencoding::encode(&name));
        let http = self.client.get(url);
        let timeout = self.pull_timeout;

        Box::pin(stream! {
            if name.is_empty() {
                yield Err(ChainChatError::validation(MODEL_NAME_REQUIRED));
                return;
            }

            info!(model = %name, "Starting model pull");
            let deadline = Deadline::after(timeout, cancel);
            let response = match open_stream(http, &deadline, "Pull").await {
                Ok(response) => response,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut body = Box::pin(response.bytes_stream());
            let mut framer = LineFramer::new();

            loop {
                let lines = match deadline.run(body.next()).await {
                    Ok(Some(Ok(bytes))) => framer.push(&bytes),
                    Ok(Some(Err(e))) => {
                        yield Err(http_error(e));
                        return;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                for line in lines {
                    match parse_record(&line) {
                        Ok(record) => {
                            let done = record.is_success();
                            yield Ok(record);
                            if done {
                                info!(model = %name, "Model pull completed");
                                return;
                            }
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            if let Some(line) = framer.finish() {
                let result = parse_record(&line);
                if matches!(&result, Ok(record) if record.is_success()) {
                    info!(model = %name, "Model pull completed");
                }
                yield result;
            }
        })
    }
}

fn parse_record(line: &str) -> Result<PullProgress> {
    let record: PullProgress = serde_json::from_str(line)?;
    if let Some(error) = &record.error {
        return Err(ChainChatError::Server(error.clone()));
    }
    debug!(status = %record.status, completed = ?record.completed, total = ?record.total, "Pull progress");
    Ok(record)
}
