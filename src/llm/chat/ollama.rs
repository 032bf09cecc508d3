use async_trait::async_trait;
use log::debug;
use reqwest::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;

use super::{ ndjson_stream, ChatClient, ChatParams, GenerateParams };
use crate::llm::{ endpoint, ChunkStream };
use crate::models::chat::Role;
use crate::models::ollama::{ non_empty, ChatRequest, ChatRequestMessage, GenerateRequest };

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
}

impl OllamaClient {
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn generate_stream(&self, params: GenerateParams) -> ChunkStream {
        let url = endpoint(&self.base_url, "/api/generate");
        let req = GenerateRequest {
            model: &params.model,
            prompt: &params.prompt,
            images: non_empty(&params.images),
            stream: true,
        };
        debug!(
            "Requesting {} with model {} ({} images)",
            url,
            params.model,
            params.images.len()
        );

        let request = self.http.post(&url).header(CONTENT_TYPE, "application/json").json(&req);
        ndjson_stream(request, url)
    }

    async fn chat_stream(&self, params: ChatParams) -> ChunkStream {
        let url = endpoint(&self.base_url, "/api/chat");
        let last_user = params.messages.iter().rposition(|m| m.role == Role::User);
        let messages = params.messages
            .iter()
            .enumerate()
            .map(|(idx, m)| ChatRequestMessage {
                role: m.role.as_str(),
                content: &m.content,
                images: if Some(idx) == last_user { non_empty(&params.images) } else { None },
            })
            .collect();
        let req = ChatRequest {
            model: &params.model,
            messages,
            stream: true,
        };
        debug!(
            "Requesting {} with model {} ({} messages)",
            url,
            params.model,
            params.messages.len()
        );

        let request = self.http.post(&url).header(CONTENT_TYPE, "application/json").json(&req);
        ndjson_stream(request, url)
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
