pub mod chat;
pub mod ollama;
