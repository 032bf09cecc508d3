pub mod cli;
pub mod config;
pub mod console;
pub mod llm;
pub mod models;
pub mod render;
pub mod session;

use cli::Args;
use config::AppConfig;
use console::run_console;
use llm::images::load_images;
use log::{ info, warn };
use render::TerminalSink;
use session::ChatSession;
use std::error::Error;
use tokio::io::BufReader;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = AppConfig::from_args(&args)?;

    info!("--- Core Configuration ---");
    info!("API Endpoint URL: {}", config.api_endpoint_url);
    info!("Default Model: {}", config.default_model.as_deref().unwrap_or("first listed"));
    info!("Typing Mode: {}", config.typing_mode);
    info!("Chat Type: {}", config.chat_mode);
    info!("Connect Timeout: {:?}", config.connect_timeout);
    info!("Startup Images: {}", args.images.len());
    info!("-------------------------");

    let mut session = ChatSession::connect(config)?;
    if session.refresh_models().await.is_empty() {
        warn!("No models listed by the server; use /model <name> once it is reachable");
    }
    if !args.images.is_empty() {
        session.attach_images(load_images(&args.images));
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let mut sink = TerminalSink::stdout();
    let mut out = std::io::stdout();
    run_console(&mut session, stdin, &mut sink, &mut out).await?;

    Ok(())
}
