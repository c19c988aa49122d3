//! Writes decoded responses to the terminal.

use async_trait::async_trait;
use restkit_http::{Decode, HttpError, TextStreamEvent};
use std::io::Write;
use tokio::io::AsyncWrite;

/// JSON values are pretty-printed one after another; every other body is
/// copied through unchanged.
pub struct Printer<J, R> {
    json: J,
    raw: R,
}

impl Printer<std::io::Stdout, tokio::io::Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self {
            json: std::io::stdout(),
            raw: tokio::io::stdout(),
        }
    }
}

#[async_trait]
impl<J, R> Decode for Printer<J, R>
where
    J: Write + Send,
    R: AsyncWrite + Send + Unpin,
{
    fn decode_json(&mut self, raw: &[u8]) -> Result<(), HttpError> {
        let value: serde_json::Value = serde_json::from_slice(raw)?;
        serde_json::to_writer_pretty(&mut self.json, &value)?;
        writeln!(self.json)?;
        self.json.flush()?;
        Ok(())
    }

    fn sink(&mut self) -> Option<&mut (dyn AsyncWrite + Send + Unpin)> {
        Some(&mut self.raw)
    }
}

/// Print the data of each server-sent event on its own line.
pub fn print_event(event: TextStreamEvent) -> Result<(), HttpError> {
    if event.data.is_empty() {
        return Ok(());
    }
    let mut out = std::io::stdout().lock();
    writeln!(out, "{}", event.data)?;
    out.flush()?;
    Ok(())
}
