//! Request and response body types shared by the client and its layers.

use crate::error::{BoxError, HttpError};
use bytes::Bytes;
use futures_util::TryStreamExt;
use futures_util::stream::{BoxStream, StreamExt};
use http::HeaderMap;
use http_body_util::{BodyExt, Empty, Full};
use std::io;
use std::time::{Duration, SystemTime};
use tokio_util::io::StreamReader;

/// Maximum body preview size for error messages (8KB).
///
/// When a request returns a non-2xx status, at most this many bytes of the
/// response body are read into [`HttpError::HttpStatus::body_preview`].
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Outbound body type carried through the transport chain.
///
/// Not `Sync`: streaming payloads are backed by a channel receiver.
pub type RequestBody = http_body_util::combinators::UnsyncBoxBody<Bytes, BoxError>;

/// Type alias for the boxed response body that supports decompression.
///
/// This type can hold either a raw body or a decompressed body (gzip/br/deflate).
pub type ResponseBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;

/// Buffered async reader over a response body, as handed to decoders.
pub type BodyReader = StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>;

/// An empty request body
#[must_use]
pub fn empty() -> RequestBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// A request body holding `bytes`
#[must_use]
pub fn full(bytes: impl Into<Bytes>) -> RequestBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// A response body holding `bytes`
#[must_use]
pub fn full_response(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Turn a response body into a buffered reader.
///
/// Body errors surface as `io::Error` wrapping [`HttpError::Transport`], so
/// `error::from_io` recovers them.
#[must_use]
pub fn into_reader(body: ResponseBody) -> BodyReader {
    let stream = TryStreamExt::map_err(body.into_data_stream(), |e| {
        io::Error::other(HttpError::Transport(e))
    });
    StreamReader::new(StreamExt::boxed(stream))
}

/// Read at most `limit` bytes of `body`, dropping the rest.
///
/// # Errors
/// Propagates body (transport) failures.
pub async fn read_preview(body: ResponseBody, limit: usize) -> Result<Bytes, HttpError> {
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            let room = limit - collected.len();
            if chunk.len() >= room {
                collected.extend_from_slice(&chunk[..room]);
                break;
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}

/// Parse `Retry-After` header value into a `Duration`.
///
/// Supports two formats per RFC 7231:
/// - Seconds: "120" → 120 seconds
/// - HTTP-date (RFC 1123): "Wed, 21 Oct 2015 07:28:00 GMT" → duration until that time
///
/// Returns `None` if the header is missing, unparsable, negative or in the past.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?;
    let trimmed = value.trim();

    if let Ok(seconds) = trimmed.parse::<i64>() {
        if seconds < 0 {
            return None;
        }
        return Some(Duration::from_secs(seconds.cast_unsigned()));
    }

    let parsed = httpdate::parse_http_date(trimmed).ok()?;
    parsed.duration_since(SystemTime::now()).ok()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http::HeaderValue;
    use tokio::io::AsyncReadExt;

    fn headers_with_retry_after(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::RETRY_AFTER,
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let headers = headers_with_retry_after(" 120 ");
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_parse_retry_after_invalid_or_negative() {
        assert_eq!(parse_retry_after(&headers_with_retry_after("soon")), None);
        assert_eq!(parse_retry_after(&headers_with_retry_after("-5")), None);
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let past = headers_with_retry_after("Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(parse_retry_after(&past), None);

        let future = SystemTime::now() + Duration::from_secs(3600);
        let headers = headers_with_retry_after(&httpdate::fmt_http_date(future));
        let parsed = parse_retry_after(&headers).unwrap();
        assert!(parsed > Duration::from_secs(3500));
    }

    #[tokio::test]
    async fn test_read_preview_truncates() {
        let body = full_response(vec![b'x'; ERROR_BODY_PREVIEW_LIMIT + 100]);
        let preview = read_preview(body, ERROR_BODY_PREVIEW_LIMIT).await.unwrap();
        assert_eq!(preview.len(), ERROR_BODY_PREVIEW_LIMIT);

        let short = read_preview(full_response("oops"), ERROR_BODY_PREVIEW_LIMIT)
            .await
            .unwrap();
        assert_eq!(&short[..], b"oops");
    }

    #[tokio::test]
    async fn test_into_reader_yields_body() {
        let mut reader = into_reader(full_response("hello world"));
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hello world");
    }
}
