//! Request payloads.
//!
//! A [`Payload`] is a readable byte source carrying the HTTP method, the
//! outgoing content type and the media type accepted in response. It is
//! built per call and consumed by the dispatch.

mod fields;
mod multipart;

pub use fields::{Field, FieldValue, FilePart, FileSource, to_fields};

use crate::body::{self, RequestBody};
use crate::error::{BoxError, HttpError};
use bytes::{Bytes, BytesMut};
use futures_util::TryStreamExt;
use http::Method;
use http_body::Frame;
use http_body_util::{BodyExt, StreamBody};
use serde::Serialize;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use url::form_urlencoded;

/// Chunks buffered between a streaming producer and the reader
const PIPE_CAPACITY: usize = 4;

/// Content type of JSON payloads
pub const JSON: &str = "application/json";

/// Content type of URL-encoded form payloads
pub const FORM: &str = "application/x-www-form-urlencoded";

enum Source {
    Empty,
    Full(Bytes),
    Pipe {
        rx: mpsc::Receiver<io::Result<Bytes>>,
        pending: Bytes,
    },
    Closed,
}

/// Outbound request payload.
///
/// Implements [`AsyncRead`]; reads return EOF once drained. Streaming
/// multipart payloads are fed by a background producer task which is joined
/// by [`Payload::close`] and aborted when the payload is dropped.
pub struct Payload {
    method: Method,
    content_type: Option<String>,
    accept: String,
    source: Source,
    producer: Option<JoinHandle<()>>,
}

impl Payload {
    fn new(
        method: Method,
        content_type: Option<String>,
        accept: impl Into<String>,
        source: Source,
    ) -> Self {
        Self {
            method,
            content_type,
            accept: accept.into(),
            source,
            producer: None,
        }
    }

    /// No body; reading yields EOF immediately.
    #[must_use]
    pub fn empty(method: Method, accept: impl Into<String>) -> Self {
        Self::new(method, None, accept, Source::Empty)
    }

    /// An opaque body with the given content type.
    #[must_use]
    pub fn raw(
        method: Method,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
        accept: impl Into<String>,
    ) -> Self {
        let content_type = Some(content_type.into()).filter(|ct| !ct.is_empty());
        Self::new(method, content_type, accept, Source::Full(bytes.into()))
    }

    /// `value` serialized as JSON.
    ///
    /// # Errors
    /// `HttpError::Json` if serialization fails.
    pub fn json<T: Serialize + ?Sized>(
        method: Method,
        value: &T,
        accept: impl Into<String>,
    ) -> Result<Self, HttpError> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self::new(
            method,
            Some(JSON.to_owned()),
            accept,
            Source::Full(Bytes::from(bytes)),
        ))
    }

    /// `value` URL-form encoded, sent with `POST`.
    ///
    /// See [`to_fields`] for how fields are named and skipped. Byte string
    /// fields are percent-encoded byte for byte.
    ///
    /// # Errors
    /// `HttpError::Encode` for unsupported shapes and file parts.
    pub fn form<T: Serialize + ?Sized>(
        value: &T,
        accept: impl Into<String>,
    ) -> Result<Self, HttpError> {
        let encoded = encode_form(to_fields(value)?)?;
        Ok(Self::new(
            Method::POST,
            Some(FORM.to_owned()),
            accept,
            Source::Full(Bytes::from(encoded)),
        ))
    }

    /// `value` encoded as `multipart/form-data`, buffered in memory.
    ///
    /// [`FilePart`] fields become file parts; files on disk are read here.
    ///
    /// # Errors
    /// - `HttpError::Encode` for unsupported shapes
    /// - `HttpError::Io` if a file cannot be read
    pub async fn multipart<T: Serialize + ?Sized>(
        value: &T,
        accept: impl Into<String>,
    ) -> Result<Self, HttpError> {
        let fields = to_fields(value)?;
        let boundary = multipart::boundary();
        let mut buf = BytesMut::new();
        multipart::encode(fields, &boundary, &mut multipart::Output::Buffer(&mut buf)).await?;
        Ok(Self::new(
            Method::POST,
            Some(multipart::content_type(&boundary)),
            accept,
            Source::Full(buf.freeze()),
        ))
    }

    /// Like [`Payload::multipart`], but parts are produced while the body is
    /// read, so large files are never held in memory.
    ///
    /// Must be called within a Tokio runtime. Failures of the producer (an
    /// unreadable file) surface as read errors.
    ///
    /// # Errors
    /// `HttpError::Encode` for unsupported shapes.
    pub fn streaming_multipart<T: Serialize + ?Sized>(
        value: &T,
        accept: impl Into<String>,
    ) -> Result<Self, HttpError> {
        let fields = to_fields(value)?;
        let boundary = multipart::boundary();
        let content_type = multipart::content_type(&boundary);
        let (tx, rx) = mpsc::channel(PIPE_CAPACITY);

        let producer = tokio::spawn(async move {
            let mut out = multipart::Output::Channel(&tx);
            let result = multipart::encode(fields, &boundary, &mut out).await;
            if let Err(err) = result {
                if err.kind() == io::ErrorKind::BrokenPipe {
                    return;
                }
                tracing::debug!(error = %err, "multipart producer failed");
                _ = tx.send(Err(err)).await;
            }
        });

        let mut payload = Self::new(
            Method::POST,
            Some(content_type),
            accept,
            Source::Pipe {
                rx,
                pending: Bytes::new(),
            },
        );
        payload.producer = Some(producer);
        Ok(payload)
    }

    /// Send with `method` instead; form and multipart payloads default to `POST`.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Outgoing content type; `None` lets the client pick its default.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Media type accepted in response (may be empty).
    #[must_use]
    pub fn accept(&self) -> &str {
        &self.accept
    }

    /// Whether the payload carries a body at all.
    #[must_use]
    pub fn has_body(&self) -> bool {
        !matches!(self.source, Source::Empty)
    }

    /// Body length when known up front.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        match &self.source {
            Source::Empty => Some(0),
            Source::Full(bytes) => Some(bytes.len() as u64),
            Source::Pipe { .. } | Source::Closed => None,
        }
    }

    /// Close the pipe of a streaming payload and wait for its producer.
    ///
    /// Subsequent reads fail with `io::ErrorKind::BrokenPipe`.
    pub async fn close(&mut self) {
        if let Source::Pipe { rx, .. } = &mut self.source {
            rx.close();
        }
        self.source = Source::Closed;
        if let Some(producer) = self.producer.take()
            && let Err(err) = producer.await
            && err.is_panic()
        {
            tracing::warn!(error = %err, "multipart producer panicked");
        }
    }

    /// Convert into the body sent over the wire.
    pub(crate) fn into_body(self) -> Result<RequestBody, HttpError> {
        match &self.source {
            Source::Empty => return Ok(body::empty()),
            Source::Full(bytes) => return Ok(body::full(bytes.clone())),
            Source::Closed => return Err(HttpError::Io(closed())),
            Source::Pipe { .. } => {}
        }
        let frames = ReaderStream::with_capacity(self, multipart::CHUNK_SIZE).map_ok(Frame::data);
        let body = BodyExt::map_err(StreamBody::new(frames), |e| -> BoxError { Box::new(e) });
        Ok(body.boxed_unsync())
    }
}

fn encode_form(fields: Vec<Field>) -> Result<String, HttpError> {
    let mut encoded = String::new();
    for field in fields {
        let value: &[u8] = match &field.value {
            FieldValue::Text(text) => text.as_bytes(),
            FieldValue::Bytes(bytes) => bytes,
            FieldValue::File(_) => {
                return Err(HttpError::Encode(format!(
                    "file field {} requires a multipart payload",
                    field.name
                )));
            }
        };
        if !encoded.is_empty() {
            encoded.push('&');
        }
        encoded.extend(form_urlencoded::byte_serialize(field.name.as_bytes()));
        encoded.push('=');
        encoded.extend(form_urlencoded::byte_serialize(value));
    }
    Ok(encoded)
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "payload closed")
}

impl AsyncRead for Payload {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            match &mut this.source {
                Source::Full(bytes) | Source::Pipe { pending: bytes, .. } if !bytes.is_empty() => {
                    let n = buf.remaining().min(bytes.len());
                    buf.put_slice(&bytes.split_to(n));
                    return Poll::Ready(Ok(()));
                }
                Source::Empty | Source::Full(_) => return Poll::Ready(Ok(())),
                Source::Pipe { rx, pending } => match ready!(rx.poll_recv(cx)) {
                    Some(Ok(chunk)) => *pending = chunk,
                    Some(Err(err)) => return Poll::Ready(Err(err)),
                    None => return Poll::Ready(Ok(())),
                },
                Source::Closed => return Poll::Ready(Err(closed())),
            }
        }
    }
}

impl Default for Payload {
    /// An empty `GET` accepting any media type.
    fn default() -> Self {
        Self::empty(Method::GET, "*/*")
    }
}

impl Drop for Payload {
    fn drop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match &self.source {
            Source::Empty => "empty",
            Source::Full(_) => "buffered",
            Source::Pipe { .. } => "streaming",
            Source::Closed => "closed",
        };
        f.debug_struct("Payload")
            .field("method", &self.method)
            .field("content_type", &self.content_type)
            .field("accept", &self.accept)
            .field("body", &body)
            .finish()
    }
}
