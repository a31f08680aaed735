//! Console transcript of an agent reply.
//!
//! Only `model` steps are printed. Each of their messages is framed by separator lines
//! and introduced by a header naming its kind; messages that could not be recognized
//! are printed raw rather than treated as an error.
use anyhow::Result;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::io::{self, Write};

use crate::models::chunk::StreamChunk;
use crate::models::message::Message;

const SEPARATOR_WIDTH: usize = 30;

pub struct TranscriptRenderer<W: Write> {
    out: W,
}

impl<W: Write> TranscriptRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Print every message of the chunk's model step; other steps print nothing
    pub fn render_chunk(&mut self, chunk: &StreamChunk) -> io::Result<()> {
        let Some(messages) = chunk.model_messages() else {
            return Ok(());
        };
        for message in messages {
            self.render_message(message)?;
        }
        self.out.flush()
    }

    pub fn render_message(&mut self, message: &Message) -> io::Result<()> {
        self.separator()?;
        match message {
            Message::User(user) => self.block("User Message:", &user.content)?,
            Message::Assistant(assistant) if !assistant.tool_calls.is_empty() => {
                for tool_call in &assistant.tool_calls {
                    self.block("Tool Call:", &to_json(tool_call)?)?;
                }
            }
            Message::Assistant(assistant) => self.block("AI Message:", &assistant.content)?,
            Message::System(system) => self.block("System Instruction:", &system.content)?,
            Message::Tool(_) => self.block("Tool Result:", &to_json(message)?)?,
            Message::Function(_) => self.block("Function Result:", &to_json(message)?)?,
            Message::Unknown(raw) => self.block("Unknown message", &raw.to_string())?,
        }
        self.separator()
    }

    fn block(&mut self, header: &str, body: &str) -> io::Result<()> {
        writeln!(self.out, "{}", header)?;
        writeln!(self.out, "{}", body)
    }

    fn separator(&mut self) -> io::Result<()> {
        writeln!(self.out, "{}", "-".repeat(SEPARATOR_WIDTH))
    }
}

fn to_json<T: Serialize>(value: &T) -> io::Result<String> {
    serde_json::to_string(value).map_err(io::Error::other)
}

/// Pull chunks one at a time and render each as it arrives.
/// The first error yielded by the stream stops rendering and is returned.
pub async fn render_stream<S, W>(stream: S, renderer: &mut TranscriptRenderer<W>) -> Result<()>
where
    S: Stream<Item = Result<StreamChunk>>,
    W: Write,
{
    futures::pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        renderer.render_chunk(&chunk?)?;
    }
    Ok(())
}
