use log::{ debug, error };
use std::io::{ self, Write };
use std::path::PathBuf;
use tokio::io::{ AsyncBufRead, AsyncBufReadExt };

use crate::config::{ ChatMode, TypingMode };
use crate::llm::images::load_images;
use crate::render::TypingSink;
use crate::session::ChatSession;

const HELP: &str = "\
Commands:
  /models [refresh]          list models (refresh asks the server again)
  /model <name>              select a model
  /image <path>...           attach jpg/jpeg/png images to the next prompt
  /mode slow|fast            typing speed
  /chat generate|conversation
                             single-turn completion or multi-turn chat
  /clear                     clear chat history
  /history                   show chat history
  /help                      show this help
  /quit                      leave
Anything else is sent as a prompt.";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Prompt(String),
    Models {
        refresh: bool,
    },
    Model(String),
    Images(Vec<PathBuf>),
    Typing(TypingMode),
    Chat(ChatMode),
    Clear,
    History,
    Help,
    Quit,
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Some(Command::Prompt(line.to_string()));
        };

        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or("");
        let args: Vec<&str> = parts.collect();

        let command = match name {
            "models" =>
                match args.as_slice() {
                    [] => Command::Models { refresh: false },
                    ["refresh"] => Command::Models { refresh: true },
                    _ => Command::Invalid("usage: /models [refresh]".into()),
                }
            "model" =>
                match args.as_slice() {
                    [model] => Command::Model(model.to_string()),
                    _ => Command::Invalid("usage: /model <name>".into()),
                }
            "image" | "images" => {
                if args.is_empty() {
                    Command::Invalid("usage: /image <path>...".into())
                } else {
                    Command::Images(args.iter().map(PathBuf::from).collect())
                }
            }
            "mode" =>
                match args.first().map(|a| a.parse::<TypingMode>()) {
                    Some(Ok(mode)) => Command::Typing(mode),
                    Some(Err(e)) => Command::Invalid(e.to_string()),
                    None => Command::Invalid("usage: /mode slow|fast".into()),
                }
            "chat" =>
                match args.first().map(|a| a.parse::<ChatMode>()) {
                    Some(Ok(mode)) => Command::Chat(mode),
                    Some(Err(e)) => Command::Invalid(e.to_string()),
                    None => Command::Invalid("usage: /chat generate|conversation".into()),
                }
            "clear" => Command::Clear,
            "history" => Command::History,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => Command::Invalid(format!("unknown command '/{}', try /help", other)),
        };
        Some(command)
    }
}

/// Reads prompts and commands from `input` until EOF or `/quit`.
pub async fn run_console<R>(
    session: &mut ChatSession,
    input: R,
    sink: &mut dyn TypingSink,
    out: &mut dyn Write
) -> io::Result<()>
    where R: AsyncBufRead + Unpin
{
    writeln!(out, "Chat Interface (type /help for commands)")?;
    print_selection(session, out)?;

    let mut lines = input.lines();
    loop {
        write!(out, "> ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let Some(command) = Command::parse(&line) else {
            continue;
        };
        debug!("Console command: {:?}", command);

        match command {
            Command::Quit => {
                break;
            }
            Command::Prompt(prompt) => {
                let sent = match session.check_ready(&prompt) {
                    Ok(()) => {
                        writeln!(out, "Processing...")?;
                        out.flush()?;
                        session.submit(&prompt, sink).await.map(|_| ())
                    }
                    Err(e) => Err(e),
                };
                if let Err(e) = sent {
                    error!("Prompt not sent: {}", e);
                    writeln!(out, "! {}", e)?;
                }
            }
            Command::Models { refresh } => {
                let models = if refresh {
                    session.reload_models().await.to_vec()
                } else {
                    session.refresh_models().await.to_vec()
                };
                if models.is_empty() {
                    writeln!(out, "No models available")?;
                }
                for name in &models {
                    let marker = if session.selected_model() == Some(name.as_str()) { "*" } else { " " };
                    writeln!(out, "{} {}", marker, name)?;
                }
            }
            Command::Model(name) => {
                match session.select_model(&name) {
                    Ok(()) => writeln!(out, "Model: {}", name)?,
                    Err(e) => writeln!(out, "! {}", e)?,
                }
            }
            Command::Images(paths) => {
                let attached = session.attach_images(load_images(&paths));
                writeln!(
                    out,
                    "Attached {} of {} images ({} pending)",
                    attached,
                    paths.len(),
                    session.pending_images().len()
                )?;
            }
            Command::Typing(mode) => {
                session.set_typing_mode(mode);
                writeln!(out, "Typing mode: {}", mode)?;
            }
            Command::Chat(mode) => {
                session.set_chat_mode(mode);
                writeln!(out, "Chat type: {}", mode)?;
            }
            Command::Clear => {
                session.clear();
                writeln!(out, "Chat history cleared")?;
            }
            Command::History => {
                for message in session.conversation().messages() {
                    writeln!(out, "{}: {}", message.role, message.content)?;
                }
            }
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Invalid(msg) => writeln!(out, "! {}", msg)?,
        }
    }

    writeln!(out, "Bye")?;
    Ok(())
}

fn print_selection(session: &ChatSession, out: &mut dyn Write) -> io::Result<()> {
    writeln!(
        out,
        "Model: {} | typing: {} | chat: {}",
        session.selected_model().unwrap_or("<none>"),
        session.typing_mode(),
        session.chat_mode()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_prompt() {
        assert_eq!(Command::parse("  why is the sky blue? "), Some(Command::Prompt("why is the sky blue?".into())));
        assert_eq!(Command::parse("   "), None);
    }

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("/models"), Some(Command::Models { refresh: false }));
        assert_eq!(Command::parse("/models refresh"), Some(Command::Models { refresh: true }));
        assert_eq!(Command::parse("/model llava:7b"), Some(Command::Model("llava:7b".into())));
        assert_eq!(Command::parse("/mode slow"), Some(Command::Typing(TypingMode::Slow)));
        assert_eq!(Command::parse("/chat conversation"), Some(Command::Chat(ChatMode::Conversation)));
        assert_eq!(
            Command::parse("/image a.png b.jpg"),
            Some(Command::Images(vec![PathBuf::from("a.png"), PathBuf::from("b.jpg")]))
        );
        assert_eq!(Command::parse("/clear"), Some(Command::Clear));
        assert_eq!(Command::parse("/exit"), Some(Command::Quit));
    }

    #[test]
    fn bad_arguments_are_invalid() {
        assert!(matches!(Command::parse("/mode turbo"), Some(Command::Invalid(_))));
        assert!(matches!(Command::parse("/model"), Some(Command::Invalid(_))));
        assert!(matches!(Command::parse("/image"), Some(Command::Invalid(_))));
        assert!(matches!(Command::parse("/frobnicate"), Some(Command::Invalid(_))));
        assert!(
            matches!(Command::parse("/models foo"), Some(Command::Invalid(usage)) if usage == "usage: /models [refresh]")
        );
        assert!(matches!(Command::parse("/models refresh now"), Some(Command::Invalid(_))));
    }
}
