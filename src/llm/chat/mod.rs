pub mod ollama;

use async_trait::async_trait;
use futures::{ stream, StreamExt };
use log::{ debug, error, warn };
use reqwest::RequestBuilder;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ ChunkStream, LlmError, StreamItem };
use crate::llm::images::EncodedImage;
use crate::models::chat::ChatMessage;
use crate::models::ollama::ResponseChunk;

#[derive(Debug, Clone)]
pub struct GenerateParams {
    pub model: String,
    pub prompt: String,
    pub images: Vec<EncodedImage>,
}

#[derive(Debug, Clone)]
pub struct ChatParams {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub images: Vec<EncodedImage>,
}

/// A server that streams replies line by line.
///
/// Neither call fails directly: every transport, status or decode problem arrives as a
/// single terminal [`StreamItem::Failure`] on the returned stream.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn generate_stream(&self, params: GenerateParams) -> ChunkStream;

    async fn chat_stream(&self, params: ChatParams) -> ChunkStream;

    fn base_url(&self) -> &str;
}

/// Decodes the newline-delimited JSON body of `request`.
///
/// Nothing is sent until the stream is first polled; the request then runs on a background
/// task feeding a bounded channel.
pub fn ndjson_stream(request: RequestBuilder, url: String) -> ChunkStream {
    let started = stream::once(async move {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(pump_lines(request, url, tx));
        ReceiverStream::new(rx)
    });

    Box::pin(started.flatten())
}

async fn pump_lines(request: RequestBuilder, url: String, tx: mpsc::Sender<StreamItem>) {
    let resp = match request.send().await {
        Ok(r) => r,
        Err(source) => {
            error!("Request to {} failed: {}", url, source);
            let _ = tx.send(StreamItem::Failure(LlmError::Network { url, source })).await;
            return;
        }
    };

    let status = resp.status();
    if !status.is_success() {
        error!("Error: {} from {}", status, url);
        let _ = tx.send(StreamItem::Failure(LlmError::Http { url, status })).await;
        return;
    }

    let mut pending: Vec<u8> = Vec::new();
    let mut body = resp.bytes_stream();

    while let Some(chunk_result) = body.next().await {
        match chunk_result {
            Ok(chunk) => {
                pending.extend_from_slice(&chunk);
                while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=pos).collect();
                    if !forward_line(&tx, &line).await {
                        return;
                    }
                }
            }
            Err(source) => {
                error!("Reading stream from {} failed: {}", url, source);
                let _ = tx.send(StreamItem::Failure(LlmError::Network { url, source })).await;
                return;
            }
        }
    }

    // last line may lack its newline
    if !pending.is_empty() {
        forward_line(&tx, &pending).await;
    }
    debug!("Stream from {} finished", url);
}

/// Returns false once the stream must stop.
async fn forward_line(tx: &mpsc::Sender<StreamItem>, raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();
    if line.is_empty() {
        return true;
    }

    match serde_json::from_str::<ResponseChunk>(line) {
        Ok(chunk) => {
            let done = chunk.done;
            if tx.send(StreamItem::Chunk(chunk)).await.is_err() {
                return false;
            }
            !done
        }
        Err(source) => {
            warn!("JSON parse error: {} for line: {}", source, line);
            let _ = tx.send(
                StreamItem::Failure(LlmError::Decode { line: line.to_string(), source })
            ).await;
            false
        }
    }
}
