use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::cli::Args;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid API endpoint URL '{url}': {reason}")]
    InvalidUrl {
        url: String,
        reason: String,
    },
    #[error("invalid typing mode '{0}' (expected slow or fast)")]
    UnknownTypingMode(String),
    #[error("invalid chat type '{0}' (expected generate or conversation)")]
    UnknownChatMode(String),
}

/// Speed of the typing animation used to render replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypingMode {
    Slow,
    #[default]
    Fast,
}

impl TypingMode {
    pub fn char_delay(&self) -> Duration {
        match self {
            TypingMode::Slow => Duration::from_millis(30),
            TypingMode::Fast => Duration::from_millis(8),
        }
    }
}

impl FromStr for TypingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "slow" => Ok(TypingMode::Slow),
            "fast" => Ok(TypingMode::Fast),
            _ => Err(ConfigError::UnknownTypingMode(s.to_string())),
        }
    }
}

impl fmt::Display for TypingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypingMode::Slow => write!(f, "slow"),
            TypingMode::Fast => write!(f, "fast"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatMode {
    /// Single-turn completion of the latest prompt.
    #[default]
    Generate,
    /// Multi-turn chat; the whole conversation is sent with every prompt.
    Conversation,
}

impl FromStr for ChatMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "generate" => Ok(ChatMode::Generate),
            "conversation" | "chat" => Ok(ChatMode::Conversation),
            _ => Err(ConfigError::UnknownChatMode(s.to_string())),
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatMode::Generate => write!(f, "generate"),
            ChatMode::Conversation => write!(f, "conversation"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_endpoint_url: String,
    pub default_model: Option<String>,
    pub typing_mode: TypingMode,
    pub chat_mode: ChatMode,
    pub connect_timeout: Duration,
}

impl AppConfig {
    pub fn new(api_endpoint_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_endpoint_url: validate_url(api_endpoint_url)?,
            default_model: None,
            typing_mode: TypingMode::default(),
            chat_mode: ChatMode::default(),
            connect_timeout: Duration::from_secs(10),
        })
    }

    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        Ok(Self {
            api_endpoint_url: validate_url(&args.api_endpoint_url)?,
            default_model: args.model.clone().filter(|m| !m.trim().is_empty()),
            typing_mode: args.typing_mode.parse()?,
            chat_mode: args.chat_type.parse()?,
            connect_timeout: Duration::from_secs(args.connect_timeout_secs),
        })
    }
}

fn validate_url(raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl { url: raw.to_string(), reason };
    let parsed = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(invalid(format!("unsupported scheme '{}'", other)));
        }
    }
    Ok(raw.trim().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn slow_is_slower_than_fast() {
        assert!(TypingMode::Slow.char_delay() >= TypingMode::Fast.char_delay());
        assert_eq!(TypingMode::Slow.char_delay(), Duration::from_millis(30));
        assert_eq!(TypingMode::Fast.char_delay(), Duration::from_millis(8));
    }

    #[test]
    fn parses_modes_case_insensitively() {
        assert_eq!("SLOW".parse::<TypingMode>().unwrap(), TypingMode::Slow);
        assert_eq!("Conversation".parse::<ChatMode>().unwrap(), ChatMode::Conversation);
        assert!(matches!("medium".parse::<TypingMode>(), Err(ConfigError::UnknownTypingMode(_))));
        assert!(matches!("stream".parse::<ChatMode>(), Err(ConfigError::UnknownChatMode(_))));
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(matches!(AppConfig::new("not a url"), Err(ConfigError::InvalidUrl { .. })));
        assert!(matches!(AppConfig::new("ftp://host"), Err(ConfigError::InvalidUrl { .. })));
        let config = AppConfig::new("http://127.0.0.1:11434/").unwrap();
        assert_eq!(config.api_endpoint_url, "http://127.0.0.1:11434");
    }

    #[test]
    fn builds_from_args() {
        let args = Args::try_parse_from([
            "ollama-companion",
            "--api-endpoint-url",
            "http://gpu-box:11434",
            "--model",
            "llava:7b",
            "--typing-mode",
            "slow",
            "--chat-type",
            "conversation",
        ]).unwrap();
        let config = AppConfig::from_args(&args).unwrap();
        assert_eq!(config.api_endpoint_url, "http://gpu-box:11434");
        assert_eq!(config.default_model.as_deref(), Some("llava:7b"));
        assert_eq!(config.typing_mode, TypingMode::Slow);
        assert_eq!(config.chat_mode, ChatMode::Conversation);
    }
}
