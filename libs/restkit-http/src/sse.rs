//! `text/event-stream` decoding.
//!
//! Frames are lines of `key: value` pairs separated by blank lines. Only the
//! `id`, `event`, `data` and `retry` keys are interpreted; `data` lines are
//! concatenated without a separator.

use crate::error::{HttpError, from_io};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// One decoded server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextStreamEvent {
    pub id: String,
    pub event: String,
    pub data: String,
    /// Reconnection delay requested by the server
    pub retry: Option<Duration>,
}

impl TextStreamEvent {
    /// Decode `data` as JSON. Empty data yields `Ok(None)`.
    ///
    /// # Errors
    /// Returns the `serde_json` error when `data` is not a valid `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        if self.data.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&self.data).map(Some)
    }

    fn is_empty(&self) -> bool {
        self.id.is_empty() && self.event.is_empty() && self.data.is_empty() && self.retry.is_none()
    }
}

/// Decode events from `reader`, invoking `callback` for each one.
///
/// The callback may return [`HttpError::EndOfStream`] to stop decoding
/// without error. A pending event is delivered when the stream ends.
///
/// # Errors
/// - `HttpError::UnexpectedResponse` for a non-empty line without `:`
/// - read failures and any other callback error
pub async fn decode<R, F>(reader: R, mut callback: F) -> Result<(), HttpError>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(TextStreamEvent) -> Result<(), HttpError>,
{
    let mut lines = reader.lines();
    let mut pending = TextStreamEvent::default();

    loop {
        let line = lines.next_line().await.map_err(from_io)?;
        let Some(line) = line else { break };

        if line.is_empty() {
            if !pending.is_empty() {
                match callback(std::mem::take(&mut pending)) {
                    Err(HttpError::EndOfStream) => return Ok(()),
                    other => other?,
                }
            }
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            return Err(HttpError::UnexpectedResponse(format!(
                "event stream line without ':': {line:?}"
            )));
        };
        let value = value.trim();

        match key.trim().to_ascii_lowercase().as_str() {
            "id" => value.clone_into(&mut pending.id),
            "event" => value.clone_into(&mut pending.event),
            "data" => pending.data.push_str(value),
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    pending.retry = Some(Duration::from_millis(ms));
                }
            }
            // comments (empty key) and extensions
            _ => {}
        }
    }

    if !pending.is_empty() {
        match callback(pending) {
            Ok(()) | Err(HttpError::EndOfStream) => {}
            Err(e) => return Err(e),
        }
    }

    Ok(())
}
