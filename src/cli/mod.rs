use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Base URL of the Ollama server API (e.g., http://localhost:11434)
    #[arg(long, env = "OLLAMA_API_URL", default_value = "http://localhost:11434")]
    pub api_endpoint_url: String,

    /// Seconds to wait for a connection to the server before giving up.
    #[arg(long, env = "CONNECT_TIMEOUT_SECS", default_value = "10")]
    pub connect_timeout_secs: u64,

    // --- Chat Args ---
    /// Model to select on startup. Falls back to the first model the server lists.
    #[arg(long, env = "OLLAMA_MODEL")]
    pub model: Option<String>,

    /// Typing animation speed for replies (slow, fast)
    #[arg(long, env = "TYPING_MODE", default_value = "fast")]
    pub typing_mode: String,

    /// Type of chat (generate, conversation). Conversation sends the full history.
    #[arg(long, env = "CHAT_TYPE", default_value = "generate")]
    pub chat_type: String,

    /// Image (jpg, jpeg, png) to attach to the first prompt. Repeatable.
    #[arg(long = "image", value_name = "PATH")]
    pub images: Vec<PathBuf>,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}
