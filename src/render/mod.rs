use futures::{ Stream, StreamExt };
use log::{ debug, warn };
use std::io::{ self, Write };

use crate::config::TypingMode;
use crate::llm::StreamItem;

const CURSOR: &str = "▌";

/// Receives the growing reply while it is typed out.
pub trait TypingSink: Send {
    /// Called after every character with everything typed so far.
    fn update(&mut self, buffer: &str);

    /// Called once with the complete text when the stream is exhausted.
    fn finish(&mut self, buffer: &str);
}

/// Types out every chunk of `stream` one character at a time and returns the full reply.
///
/// Failure items are typed like any other text. The loop ends when the stream does.
pub async fn render_response<S>(stream: S, mode: TypingMode, sink: &mut dyn TypingSink) -> String
    where S: Stream<Item = StreamItem> + Unpin
{
    let mut full_response = String::new();
    render_into(stream, mode, sink, &mut full_response).await;
    full_response
}

/// Same as [`render_response`], typing into a caller-owned buffer.
///
/// If the future is dropped early, `buffer` still holds everything typed so far.
pub async fn render_into<S>(
    mut stream: S,
    mode: TypingMode,
    sink: &mut dyn TypingSink,
    buffer: &mut String
)
    where S: Stream<Item = StreamItem> + Unpin
{
    let delay = mode.char_delay();
    let mut chunks = 0usize;

    while let Some(item) = stream.next().await {
        chunks += 1;
        if let StreamItem::Failure(e) = &item {
            warn!("Reply stream failed: {}", e);
        }
        let text = match item.text() {
            Some(text) => text,
            None => continue,
        };
        for ch in text.chars() {
            buffer.push(ch);
            tokio::time::sleep(delay).await;
            sink.update(buffer);
        }
    }

    debug!("Rendered {} chunks, {} chars", chunks, buffer.chars().count());
    sink.finish(buffer);
}

/// Writes the reply to a terminal with a block cursor trailing the text.
pub struct TerminalSink<W: Write + Send> {
    out: W,
    shown: usize,
}

impl TerminalSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, shown: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_delta(&mut self, buffer: &str) {
        // a sink reused across replies starts over when the buffer shrinks
        if buffer.len() < self.shown {
            self.shown = 0;
        }
        let _ = self.out.write_all(buffer[self.shown..].as_bytes());
        self.shown = buffer.len();
    }
}

impl<W: Write + Send> TypingSink for TerminalSink<W> {
    fn update(&mut self, buffer: &str) {
        self.write_delta(buffer);
        let _ = write!(self.out, "{}\u{8}", CURSOR);
        let _ = self.out.flush();
    }

    fn finish(&mut self, buffer: &str) {
        self.write_delta(buffer);
        let _ = writeln!(self.out, " ");
        let _ = self.out.flush();
        self.shown = 0;
    }
}

/// Keeps every intermediate buffer. Useful for tests and for embedding the loop elsewhere.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub updates: Vec<String>,
    pub finished: Option<String>,
}

impl TypingSink for RecordingSink {
    fn update(&mut self, buffer: &str) {
        self.updates.push(buffer.to_string());
    }

    fn finish(&mut self, buffer: &str) {
        self.finished = Some(buffer.to_string());
    }
}
