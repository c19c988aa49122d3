#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Uri};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use restkit_http::{HttpError, RequestBody, Transport, body};
use std::sync::Arc;
use std::time::Instant;
use tower::{Service, ServiceExt};

/// One request as it left the client.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub at: Instant,
    /// When the transport returned the response (or failed)
    pub answered: Instant,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub type Log = Arc<Mutex<Vec<Recorded>>>;

/// Layer recording every request it hands on unchanged.
///
/// Bodies are buffered so they can be inspected, which also means the
/// recorded instant is when the body was fully produced. Entries are
/// appended once the transport has answered.
pub fn recording(log: &Log) -> impl FnOnce(Transport) -> Transport + Send + 'static {
    let log = Arc::clone(log);
    move |inner: Transport| {
        Transport::new(tower::service_fn(move |req: Request<RequestBody>| {
            let log = Arc::clone(&log);
            let mut inner = inner.clone();
            async move {
                let at = Instant::now();
                let (parts, body) = req.into_parts();
                let raw = body.collect().await.map_err(HttpError::Transport)?.to_bytes();
                let mut recorded = Recorded {
                    at,
                    answered: at,
                    method: parts.method.clone(),
                    uri: parts.uri.clone(),
                    headers: parts.headers.clone(),
                    body: raw.clone(),
                };
                let req = Request::from_parts(parts, body::full(raw));
                let result = inner.ready().await?.call(req).await;
                recorded.answered = Instant::now();
                log.lock().push(recorded);
                result
            }
        }))
    }
}
