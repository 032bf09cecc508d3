use log::{ debug, info, warn };
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{ AppConfig, ChatMode, TypingMode };
use crate::llm::build_http_client;
use crate::llm::chat::ollama::OllamaClient;
use crate::llm::chat::{ ChatClient, ChatParams, GenerateParams };
use crate::llm::images::{ images_to_base64, EncodedImage };
use crate::llm::tags::ModelCache;
use crate::models::chat::{ ChatMessage, Conversation };
use crate::render::{ render_into, TypingSink };

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("an exchange is already in progress ({0})")]
    Busy(ExchangeState),
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("no model selected")]
    NoModelSelected,
    #[error("model '{0}' is not available on the server")]
    UnknownModel(String),
}

/// Where the session is within one prompt/reply exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    Sending,
    Streaming,
    Committing,
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExchangeState::Idle => "idle",
            ExchangeState::Sending => "sending",
            ExchangeState::Streaming => "streaming",
            ExchangeState::Committing => "committing",
        };
        write!(f, "{}", name)
    }
}

/// Everything one interactive user owns: settings, server handles and the conversation.
pub struct ChatSession {
    config: AppConfig,
    client: Arc<dyn ChatClient>,
    model_cache: Arc<ModelCache>,
    available_models: Vec<String>,
    selected_model: Option<String>,
    pending_images: Vec<EncodedImage>,
    conversation: Conversation,
    state: ExchangeState,
}

impl ChatSession {
    pub fn new(config: AppConfig, client: Arc<dyn ChatClient>, model_cache: Arc<ModelCache>) -> Self {
        let conversation = Conversation::new();
        info!("Session {} started against {}", conversation.id, config.api_endpoint_url);
        Self {
            config,
            client,
            model_cache,
            available_models: Vec::new(),
            selected_model: None,
            pending_images: Vec::new(),
            conversation,
            state: ExchangeState::Idle,
        }
    }

    /// Builds a session talking to the Ollama server named in `config`.
    pub fn connect(config: AppConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let http = build_http_client(config.connect_timeout)?;
        let client = Arc::new(OllamaClient::new(http.clone(), config.api_endpoint_url.clone()));
        let model_cache = Arc::new(ModelCache::new(http));
        Ok(Self::new(config, client, model_cache))
    }

    /// Lists the server's models and picks one if nothing is selected yet.
    pub async fn refresh_models(&mut self) -> &[String] {
        self.available_models = self.model_cache.fetch_or_get(&self.config.api_endpoint_url).await;

        if self.selected_model.is_none() {
            let preferred = self.config.default_model
                .as_ref()
                .filter(|name| self.available_models.contains(name))
                .or_else(|| self.available_models.first())
                .cloned();
            if let Some(name) = &preferred {
                info!("Selected model {}", name);
            }
            self.selected_model = preferred;
        }
        &self.available_models
    }

    /// Drops the cached model list and asks the server again.
    pub async fn reload_models(&mut self) -> &[String] {
        self.model_cache.invalidate(&self.config.api_endpoint_url).await;
        self.refresh_models().await
    }

    pub fn available_models(&self) -> &[String] {
        &self.available_models
    }

    /// Selects `name`. While the server's list is unknown any name is accepted.
    pub fn select_model(&mut self, name: &str) -> Result<(), SessionError> {
        let name = name.trim();
        if !self.available_models.is_empty() && !self.available_models.iter().any(|m| m == name) {
            return Err(SessionError::UnknownModel(name.to_string()));
        }
        self.selected_model = Some(name.to_string());
        Ok(())
    }

    pub fn selected_model(&self) -> Option<&str> {
        self.selected_model.as_deref()
    }

    /// Encodes and queues images for the next prompt. Returns how many were attached.
    pub fn attach_images<I, B>(&mut self, blobs: I) -> usize
        where I: IntoIterator<Item = Option<B>>, B: AsRef<[u8]>
    {
        let encoded = images_to_base64(blobs);
        let count = encoded.len();
        self.pending_images.extend(encoded);
        count
    }

    pub fn pending_images(&self) -> &[EncodedImage] {
        &self.pending_images
    }

    pub fn typing_mode(&self) -> TypingMode {
        self.config.typing_mode
    }

    pub fn set_typing_mode(&mut self, mode: TypingMode) {
        self.config.typing_mode = mode;
    }

    pub fn chat_mode(&self) -> ChatMode {
        self.config.chat_mode
    }

    pub fn set_chat_mode(&mut self, mode: ChatMode) {
        self.config.chat_mode = mode;
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn clear(&mut self) {
        debug!("Clearing {} messages from session {}", self.conversation.len(), self.conversation.id);
        self.conversation.clear();
    }

    /// Fails with the reason `prompt` could not be submitted right now, without sending anything.
    pub fn check_ready(&self, prompt: &str) -> Result<(), SessionError> {
        self.ready_model(prompt).map(|_| ())
    }

    fn ready_model(&self, prompt: &str) -> Result<String, SessionError> {
        if self.state != ExchangeState::Idle {
            return Err(SessionError::Busy(self.state));
        }
        if prompt.trim().is_empty() {
            return Err(SessionError::EmptyPrompt);
        }
        self.selected_model.clone().ok_or(SessionError::NoModelSelected)
    }

    /// Runs one full exchange: records the prompt, streams the reply into `sink` and
    /// commits it as a single assistant message.
    ///
    /// Dropping the returned future mid-exchange leaves the session idle. Text typed so far
    /// is committed as the reply; if nothing arrived the prompt is rolled back.
    pub async fn submit(
        &mut self,
        prompt: &str,
        sink: &mut dyn TypingSink
    ) -> Result<&ChatMessage, SessionError> {
        let model = self.ready_model(prompt)?;
        let prompt = prompt.trim();
        let client = Arc::clone(&self.client);
        let typing_mode = self.config.typing_mode;
        let chat_mode = self.config.chat_mode;
        let images = std::mem::take(&mut self.pending_images);
        debug!(
            "Sending prompt ({} chars, {} images) to {} at {} in {} mode",
            prompt.len(),
            images.len(),
            model,
            client.base_url(),
            chat_mode
        );

        self.conversation.push(ChatMessage::user(prompt));
        self.state = ExchangeState::Sending;
        let mut exchange = Exchange {
            state: &mut self.state,
            conversation: &mut self.conversation,
            partial: String::new(),
            finished: false,
        };

        let stream = match chat_mode {
            ChatMode::Generate => {
                client.generate_stream(GenerateParams {
                    model,
                    prompt: prompt.to_string(),
                    images,
                }).await
            }
            ChatMode::Conversation => {
                client.chat_stream(ChatParams {
                    model,
                    messages: exchange.conversation.messages().to_vec(),
                    images,
                }).await
            }
        };

        *exchange.state = ExchangeState::Streaming;
        render_into(stream, typing_mode, sink, &mut exchange.partial).await;
        if exchange.partial.is_empty() {
            warn!("Server returned an empty reply");
        }

        *exchange.state = ExchangeState::Committing;
        let reply = std::mem::take(&mut exchange.partial);
        exchange.conversation.push(ChatMessage::assistant(reply));
        exchange.finished = true;
        drop(exchange);

        let messages = self.conversation.messages();
        Ok(&messages[messages.len() - 1])
    }
}

/// Borrow of the session held for the length of one exchange.
///
/// Restores `Idle` when dropped, whether the exchange finished or its future was abandoned.
struct Exchange<'a> {
    state: &'a mut ExchangeState,
    conversation: &'a mut Conversation,
    partial: String,
    finished: bool,
}

impl Drop for Exchange<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if self.partial.is_empty() {
                warn!("Exchange abandoned while {}, rolling back the prompt", self.state);
                self.conversation.rollback_unanswered();
            } else {
                warn!(
                    "Exchange abandoned while {}, keeping {} chars of partial reply",
                    self.state,
                    self.partial.chars().count()
                );
                let partial = std::mem::take(&mut self.partial);
                self.conversation.push(ChatMessage::assistant(partial));
            }
        }
        *self.state = ExchangeState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ ChunkStream, StreamItem };
    use crate::models::chat::Role;
    use crate::models::ollama::ResponseChunk;
    use async_trait::async_trait;
    use futures::{ stream, StreamExt };
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct ScriptedClient {
        reply: Vec<&'static str>,
        // next reply never ends after its chunks
        stall_once: Mutex<bool>,
        generate_calls: Mutex<Vec<GenerateParams>>,
        chat_calls: Mutex<Vec<ChatParams>>,
    }

    impl ScriptedClient {
        fn replying(reply: Vec<&'static str>) -> Self {
            Self { reply, ..Default::default() }
        }

        fn stalling_once(reply: Vec<&'static str>) -> Self {
            Self { reply, stall_once: Mutex::new(true), ..Default::default() }
        }

        fn stream(&self) -> ChunkStream {
            let items: Vec<StreamItem> = self.reply
                .iter()
                .map(|text| StreamItem::Chunk(ResponseChunk {
                    response: Some(text.to_string()),
                    ..Default::default()
                }))
                .collect();
            let stall = std::mem::replace(&mut *self.stall_once.lock().unwrap(), false);
            if stall {
                Box::pin(stream::iter(items).chain(stream::pending()))
            } else {
                Box::pin(stream::iter(items))
            }
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn generate_stream(&self, params: GenerateParams) -> ChunkStream {
            self.generate_calls.lock().unwrap().push(params);
            self.stream()
        }

        async fn chat_stream(&self, params: ChatParams) -> ChunkStream {
            self.chat_calls.lock().unwrap().push(params);
            self.stream()
        }

        fn base_url(&self) -> &str {
            "http://scripted"
        }
    }

    fn session_with(client: Arc<ScriptedClient>) -> ChatSession {
        let config = AppConfig::new("http://scripted").unwrap();
        let cache = Arc::new(ModelCache::new(reqwest::Client::new()));
        let mut session = ChatSession::new(config, client, cache);
        session.select_model("llava").unwrap();
        session
    }

    #[tokio::test(start_paused = true)]
    async fn submit_commits_one_assistant_message() {
        let client = Arc::new(ScriptedClient::replying(vec!["Hi", " there"]));
        let mut session = session_with(client.clone());
        let mut sink = crate::render::RecordingSink::default();

        let committed = session.submit("hello", &mut sink).await.unwrap().clone();

        assert_eq!(committed.role, Role::Assistant);
        assert_eq!(committed.content, "Hi there");
        assert_eq!(session.conversation().len(), 2);
        assert_eq!(session.conversation().messages()[0].content, "hello");
        assert_eq!(session.state(), ExchangeState::Idle);
        assert_eq!(client.generate_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn images_are_sent_once() {
        let client = Arc::new(ScriptedClient::replying(vec!["ok"]));
        let mut session = session_with(client.clone());
        let attached = session.attach_images(vec![Some(b"png".to_vec()), None]);
        assert_eq!(attached, 1);

        let mut sink = crate::render::RecordingSink::default();
        session.submit("describe", &mut sink).await.unwrap();
        session.submit("again", &mut sink).await.unwrap();

        let calls = client.generate_calls.lock().unwrap();
        assert_eq!(calls[0].images.len(), 1);
        assert!(calls[1].images.is_empty());
        assert!(session.pending_images().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn conversation_mode_sends_history() {
        let client = Arc::new(ScriptedClient::replying(vec!["sure"]));
        let mut session = session_with(client.clone());
        session.set_chat_mode(ChatMode::Conversation);
        let mut sink = crate::render::RecordingSink::default();

        session.submit("first", &mut sink).await.unwrap();
        session.submit("second", &mut sink).await.unwrap();

        let calls = client.chat_calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        let contents: Vec<&str> = calls[1].messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "sure", "second"]);
        assert!(client.generate_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_empty_prompt_and_missing_model() {
        let client = Arc::new(ScriptedClient::replying(vec!["x"]));
        let config = AppConfig::new("http://scripted").unwrap();
        let cache = Arc::new(ModelCache::new(reqwest::Client::new()));
        let mut session = ChatSession::new(config, client, cache);
        let mut sink = crate::render::RecordingSink::default();

        assert!(matches!(session.submit("hi", &mut sink).await, Err(SessionError::NoModelSelected)));
        session.select_model("llava").unwrap();
        assert!(matches!(session.submit("   ", &mut sink).await, Err(SessionError::EmptyPrompt)));
        assert!(session.conversation().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_empties_history() {
        let client = Arc::new(ScriptedClient::replying(vec!["done"]));
        let mut session = session_with(client);
        let mut sink = crate::render::RecordingSink::default();
        session.submit("go", &mut sink).await.unwrap();

        session.clear();
        assert_eq!(session.conversation().len(), 0);
        session.clear();
        assert_eq!(session.conversation().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_exchange_keeps_partial_reply_and_goes_idle() {
        let client = Arc::new(ScriptedClient::stalling_once(vec!["part"]));
        let mut session = session_with(client.clone());
        let mut sink = crate::render::RecordingSink::default();

        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            session.submit("hi", &mut sink)
        ).await;
        assert!(outcome.is_err());

        assert_eq!(session.state(), ExchangeState::Idle);
        let contents: Vec<&str> = session
            .conversation()
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["hi", "part"]);

        let committed = session.submit("again", &mut sink).await.unwrap().clone();
        assert_eq!(committed.content, "part");
        assert_eq!(session.conversation().len(), 4);
        assert_eq!(client.generate_calls.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_exchange_without_reply_rolls_back_prompt() {
        let client = Arc::new(ScriptedClient::stalling_once(vec![]));
        let mut session = session_with(client);
        let mut sink = crate::render::RecordingSink::default();

        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            session.submit("hi", &mut sink)
        ).await;
        assert!(outcome.is_err());

        assert_eq!(session.state(), ExchangeState::Idle);
        assert!(session.conversation().is_empty());

        session.submit("retry", &mut sink).await.unwrap();
        let roles: Vec<Role> = session.conversation().messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[test]
    fn check_ready_reports_without_touching_history() {
        let client = Arc::new(ScriptedClient::replying(vec!["x"]));
        let config = AppConfig::new("http://scripted").unwrap();
        let cache = Arc::new(ModelCache::new(reqwest::Client::new()));
        let mut session = ChatSession::new(config, client, cache);

        assert!(matches!(session.check_ready("hi"), Err(SessionError::NoModelSelected)));
        session.select_model("llava").unwrap();
        assert!(matches!(session.check_ready(" "), Err(SessionError::EmptyPrompt)));
        assert!(session.check_ready("hi").is_ok());
        assert!(session.conversation().is_empty());
    }
}
