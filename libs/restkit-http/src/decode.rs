//! Response decoding targets and the media-type dispatch over them.

use crate::body::{BodyReader, ResponseBody, into_reader};
use crate::error::{HttpError, from_io};
use crate::options::{EventCallback, JsonCallback};
use crate::sse;
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use http::HeaderMap;
use http_body_util::BodyExt;
use serde::de::{DeserializeOwned, IgnoredAny};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Destination of a response body.
///
/// Every method has a default, so implementors only override what they
/// handle. Decoding proceeds as follows:
///
/// 1. [`Decode::unmarshal`] gets the raw body first. Returning
///    [`HttpError::NotImplemented`] (the default) falls through to the
///    media-type handling below; it must not consume the body in that case.
/// 2. JSON and NDJSON values go to [`Decode::decode_json`], XML documents to
///    [`Decode::decode_xml`].
/// 3. Any other media type, and JSON/XML a target declines with
///    `NotImplemented`, is copied to [`Decode::sink`].
#[async_trait]
pub trait Decode: Send {
    /// Take over decoding of the whole body.
    async fn unmarshal(
        &mut self,
        _headers: &HeaderMap,
        _body: &mut BodyReader,
    ) -> Result<(), HttpError> {
        Err(HttpError::NotImplemented)
    }

    /// Decode one JSON value.
    fn decode_json(&mut self, _raw: &[u8]) -> Result<(), HttpError> {
        Err(HttpError::NotImplemented)
    }

    /// Decode one XML document.
    fn decode_xml(&mut self, _raw: &[u8]) -> Result<(), HttpError> {
        Err(HttpError::NotImplemented)
    }

    /// Byte sink for bodies that are not decoded.
    fn sink(&mut self) -> Option<&mut (dyn AsyncWrite + Send + Unpin)> {
        None
    }
}

/// Decodes a JSON or XML body into `T`.
///
/// For NDJSON and JSON streams the last value wins.
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(Option<T>);

impl<T> Json<T> {
    #[must_use]
    pub fn new() -> Self {
        Self(None)
    }

    /// The decoded value, if the body held one.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.0.as_ref()
    }

    #[must_use]
    pub fn into_inner(self) -> Option<T> {
        self.0
    }
}

impl<T> Default for Json<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: DeserializeOwned + Send> Decode for Json<T> {
    fn decode_json(&mut self, raw: &[u8]) -> Result<(), HttpError> {
        self.0 = Some(serde_json::from_slice(raw)?);
        Ok(())
    }

    fn decode_xml(&mut self, raw: &[u8]) -> Result<(), HttpError> {
        self.0 = Some(quick_xml::de::from_reader(raw)?);
        Ok(())
    }
}

/// Copies the body, whatever its media type, into a writer.
#[derive(Debug)]
pub struct Sink<W>(pub W);

impl<W> Sink<W> {
    #[must_use]
    pub fn into_inner(self) -> W {
        self.0
    }
}

#[async_trait]
impl<W: AsyncWrite + Send + Unpin> Decode for Sink<W> {
    fn sink(&mut self) -> Option<&mut (dyn AsyncWrite + Send + Unpin)> {
        Some(&mut self.0)
    }
}

/// Reads and drops the body.
#[derive(Debug)]
pub struct Discard(tokio::io::Sink);

impl Default for Discard {
    fn default() -> Self {
        Self(tokio::io::sink())
    }
}

#[async_trait]
impl Decode for Discard {
    fn decode_json(&mut self, _raw: &[u8]) -> Result<(), HttpError> {
        Ok(())
    }

    fn decode_xml(&mut self, _raw: &[u8]) -> Result<(), HttpError> {
        Ok(())
    }

    fn sink(&mut self) -> Option<&mut (dyn AsyncWrite + Send + Unpin)> {
        Some(&mut self.0)
    }
}

/// Per-call stream callbacks.
pub(crate) struct Callbacks<'a> {
    pub(crate) on_json: Option<&'a mut JsonCallback>,
    pub(crate) on_event: Option<&'a mut EventCallback>,
}

/// Decode `body` of media type `essence` into `out`.
pub(crate) async fn decode_body(
    essence: &str,
    headers: &HeaderMap,
    body: ResponseBody,
    out: Option<&mut dyn Decode>,
    callbacks: Callbacks<'_>,
) -> Result<(), HttpError> {
    let mut discard = Discard::default();
    let out: &mut dyn Decode = match out {
        Some(out) => out,
        None if callbacks.on_json.is_none() && callbacks.on_event.is_none() => {
            return drain(body).await;
        }
        None => &mut discard,
    };

    let mut reader = into_reader(body);
    match out.unmarshal(headers, &mut reader).await {
        Err(HttpError::NotImplemented) => {}
        other => return other,
    }

    match essence {
        "application/json" => match callbacks.on_json {
            Some(callback) => each_json(&mut reader, out, callback).await,
            None => {
                let raw = read_all(&mut reader).await?;
                if raw.iter().all(u8::is_ascii_whitespace) {
                    return Ok(());
                }
                let decoded = out.decode_json(&raw);
                or_sink(decoded, out, &raw, essence).await
            }
        },
        "application/x-ndjson" => match callbacks.on_json {
            Some(callback) => each_json(&mut reader, out, callback).await,
            None => json_stream(&mut reader, |raw| out.decode_json(raw)).await,
        },
        "text/event-stream" => {
            let Some(callback) = callbacks.on_event else {
                return Err(HttpError::BadRequest(
                    "event stream response requires an on_event callback".to_owned(),
                ));
            };
            sse::decode(&mut reader, |event| callback(event)).await
        }
        "application/xml" | "text/xml" => {
            let raw = read_all(&mut reader).await?;
            let decoded = out.decode_xml(&raw);
            or_sink(decoded, out, &raw, essence).await
        }
        _ => match out.sink() {
            Some(sink) => {
                tokio::io::copy(&mut reader, sink).await.map_err(from_io)?;
                sink.flush().await?;
                Ok(())
            }
            None => Err(HttpError::NoDecoder {
                media_type: essence.to_owned(),
            }),
        },
    }
}

/// Decode every value into `out`, then hand it to `callback`.
///
/// Targets that decline JSON only see the callback.
async fn each_json(
    reader: &mut BodyReader,
    out: &mut dyn Decode,
    callback: &mut JsonCallback,
) -> Result<(), HttpError> {
    json_stream(reader, |raw| {
        match out.decode_json(raw) {
            Err(HttpError::NotImplemented) => {}
            other => other?,
        }
        callback(raw)
    })
    .await
}

/// Fall back to the sink when a target declines a decoded media type.
async fn or_sink(
    decoded: Result<(), HttpError>,
    out: &mut dyn Decode,
    raw: &[u8],
    essence: &str,
) -> Result<(), HttpError> {
    match decoded {
        Err(HttpError::NotImplemented) => match out.sink() {
            Some(sink) => {
                sink.write_all(raw).await?;
                sink.flush().await?;
                Ok(())
            }
            None => Err(HttpError::NoDecoder {
                media_type: essence.to_owned(),
            }),
        },
        other => other,
    }
}

async fn drain(body: ResponseBody) -> Result<(), HttpError> {
    let mut body = std::pin::pin!(body);
    while let Some(frame) = body.frame().await {
        frame.map_err(HttpError::Transport)?;
    }
    Ok(())
}

async fn read_all(reader: &mut BodyReader) -> Result<Vec<u8>, HttpError> {
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw).await.map_err(from_io)?;
    Ok(raw)
}

async fn fill(reader: &mut BodyReader, buf: &mut BytesMut) -> Result<bool, HttpError> {
    let n = reader.read_buf(buf).await.map_err(from_io)?;
    Ok(n > 0)
}

/// Split a stream of concatenated or newline-delimited JSON values and hand
/// each raw value to `each`.
///
/// `HttpError::EndOfStream` from `each` stops early without error.
pub(crate) async fn json_stream<F>(reader: &mut BodyReader, mut each: F) -> Result<(), HttpError>
where
    F: FnMut(&[u8]) -> Result<(), HttpError>,
{
    let mut buf = BytesMut::with_capacity(8 * 1024);
    let mut eof = false;

    loop {
        let skip = buf
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(buf.len());
        buf.advance(skip);

        if buf.is_empty() {
            if eof || !fill(reader, &mut buf).await? {
                return Ok(());
            }
            continue;
        }

        let parsed = {
            let mut values = serde_json::Deserializer::from_slice(&buf).into_iter::<IgnoredAny>();
            match values.next() {
                Some(Ok(_)) => Ok(values.byte_offset()),
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        };

        match parsed {
            // a number running into the end of the buffer may continue
            Ok(end) if end == buf.len() && !eof && matches!(buf[0], b'-' | b'0'..=b'9') => {
                eof = !fill(reader, &mut buf).await?;
            }
            Ok(0) => {
                eof = !fill(reader, &mut buf).await?;
            }
            Ok(end) => {
                let raw = buf.split_to(end);
                match each(&raw) {
                    Err(HttpError::EndOfStream) => return Ok(()),
                    other => other?,
                }
            }
            Err(e) if e.is_eof() && !eof => {
                eof = !fill(reader, &mut buf).await?;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
