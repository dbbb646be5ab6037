//! Message sinks
//!
//! The engine hands every record and checkpoint to a [`MessageSink`] in
//! emission order. [`JsonLinesSink`] writes one JSON document per line,
//! [`MemorySink`] keeps everything for inspection.

use super::types::Message;
use crate::error::Result;
use crate::state::State;
use serde_json::Value;
use std::io::{BufWriter, Stdout, Write};

/// Consumer of the output message stream
pub trait MessageSink: Send {
    /// Accept one message
    fn emit(&mut self, message: Message) -> Result<()>;

    /// Push buffered output through
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes messages as JSON lines
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

/// JSON lines on standard output
pub type StdoutSink = JsonLinesSink<BufWriter<Stdout>>;

impl<W: Write> JsonLinesSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl StdoutSink {
    /// Sink writing to standard output
    pub fn stdout() -> Self {
        Self::new(BufWriter::new(std::io::stdout()))
    }
}

impl<W: Write + Send> MessageSink for JsonLinesSink<W> {
    fn emit(&mut self, message: Message) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &message)?;
        self.writer.write_all(b"\n")?;
        // Checkpoints must reach the consumer before later records
        if message.is_state() {
            self.writer.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Collects messages in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    messages: Vec<Message>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Records emitted on `stream`
    pub fn records(&self, stream: &str) -> Vec<&Value> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::Record {
                    stream: s, record, ..
                } if s == stream => Some(record),
                _ => None,
            })
            .collect()
    }

    /// Checkpoint documents emitted so far
    pub fn states(&self) -> Vec<&State> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::State { value } => Some(value),
                Message::Record { .. } => None,
            })
            .collect()
    }

    /// Most recent checkpoint document
    pub fn last_state(&self) -> Option<&State> {
        self.states().pop()
    }
}

impl MessageSink for MemorySink {
    fn emit(&mut self, message: Message) -> Result<()> {
        self.messages.push(message);
        Ok(())
    }
}
