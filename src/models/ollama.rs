use serde::{ Deserialize, Serialize };

use crate::llm::images::EncodedImage;

pub(crate) fn non_empty(images: &[EncodedImage]) -> Option<&[EncodedImage]> {
    if images.is_empty() { None } else { Some(images) }
}

#[derive(Serialize, Debug)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<&'a [EncodedImage]>,
    pub stream: bool,
}

#[derive(Serialize, Debug)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatRequestMessage<'a>>,
    pub stream: bool,
}

#[derive(Serialize, Debug)]
pub struct ChatRequestMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<&'a [EncodedImage]>,
}

/// One line of a streamed `/api/generate` or `/api/chat` reply.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ResponseChunk {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub message: Option<ChunkMessage>,
    #[serde(default)]
    pub done: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ChunkMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: String,
}

impl ResponseChunk {
    pub fn text(&self) -> Option<&str> {
        self.response
            .as_deref()
            .or_else(|| self.message.as_ref().map(|m| m.content.as_str()))
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelTag>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ModelTag {
    pub name: String,
}
