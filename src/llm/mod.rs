pub mod chat;
pub mod images;
pub mod tags;

use futures::Stream;
use reqwest::StatusCode;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

use crate::models::ollama::ResponseChunk;

/// Text typed out in place of a reply when the request fails.
pub const ERROR_MARKER: &str = "Error in generating response";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Http {
        url: String,
        status: StatusCode,
    },
    #[error("malformed response line {line:?}: {source}")]
    Decode {
        line: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One decoded line of a streamed reply, or the terminal failure of the request.
#[derive(Debug)]
pub enum StreamItem {
    Chunk(ResponseChunk),
    Failure(LlmError),
}

impl StreamItem {
    /// Text to show for this item. Failures render as [`ERROR_MARKER`].
    pub fn text(&self) -> Option<&str> {
        match self {
            StreamItem::Chunk(chunk) => chunk.text(),
            StreamItem::Failure(_) => Some(ERROR_MARKER),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StreamItem::Failure(_))
    }
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = StreamItem> + Send>>;

/// Shared HTTP client for every call to the server.
pub fn build_http_client(connect_timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().connect_timeout(connect_timeout).build()
}

pub fn endpoint(base_url: &str, route: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), route)
}
