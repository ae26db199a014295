use chainchat_core::{ChainChatError, Result};
use serde::Deserialize;

use crate::deadline::Deadline;

const MAX_ERROR_BODY: usize = 500;

/// FastAPI reports `detail`, Ollama reports `error`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
    error: Option<String>,
}

/// Map reqwest errors, calling out the common "gateway not running" case
pub(crate) fn http_error(e: reqwest::Error) -> ChainChatError {
    if e.is_connect() {
        tracing::error!("Connection refused - is the ChainChat server running?");
        return ChainChatError::Http(format!("connection refused - is the server running? ({})", e));
    }
    tracing::error!("HTTP error: {}", e);
    ChainChatError::Http(e.to_string())
}

/// Send under the deadline and reject non-2xx responses, keeping the server's reason.
pub(crate) async fn open_stream(
    request: reqwest::RequestBuilder,
    deadline: &Deadline,
    what: &str,
) -> Result<reqwest::Response> {
    let response = deadline.run(request.send()).await?.map_err(http_error)?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = deadline.run(response.text()).await?.unwrap_or_default();
    Err(ChainChatError::Server(format!(
        "{} failed: {} - {}",
        what,
        status,
        error_detail(&body)
    )))
}

pub(crate) fn error_detail(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(reason) = parsed.detail.or(parsed.error) {
            return reason;
        }
    }
    body.chars().take(MAX_ERROR_BODY).collect()
}
