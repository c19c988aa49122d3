use crate::body::{self, RequestBody, ResponseBody};
use crate::error::HttpError;
use crate::trace::redact_url;
use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode, header};
use http_body::Body as _;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};

/// Header values never written to the dump
const MASKED_HEADERS: &[header::HeaderName] = &[
    header::AUTHORIZATION,
    header::PROXY_AUTHORIZATION,
    header::COOKIE,
    header::SET_COOKIE,
];

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Tower layer writing each request/response exchange to a writer.
///
/// Always writes the request line, the response status and the elapsed
/// time. In verbose mode it also writes headers (credentials masked) and
/// bodies: JSON pretty-printed, form and text bodies as is, other request
/// bodies as a hex dump. Binary and streaming (SSE, NDJSON) response bodies
/// are only annotated. Bodies that are read are handed on unchanged.
#[derive(Clone)]
pub struct DumpLayer {
    writer: SharedWriter,
    verbose: bool,
}

impl DumpLayer {
    #[must_use]
    pub fn new<W: Write + Send + 'static>(writer: W, verbose: bool) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
            verbose,
        }
    }
}

impl<S> Layer<S> for DumpLayer {
    type Service = DumpService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DumpService {
            inner,
            writer: Arc::clone(&self.writer),
            verbose: self.verbose,
        }
    }
}

/// Service produced by [`DumpLayer`]
#[derive(Clone)]
pub struct DumpService<S> {
    inner: S,
    writer: SharedWriter,
    verbose: bool,
}

impl<S> Service<Request<RequestBody>> for DumpService<S>
where
    S: Service<Request<RequestBody>, Response = Response<ResponseBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = Response<ResponseBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<RequestBody>) -> Self::Future {
        // Swap so we call the instance that was poll_ready'd, leaving a fresh clone
        // for the next poll_ready cycle.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let writer = Arc::clone(&self.writer);
        let verbose = self.verbose;

        Box::pin(async move {
            let method = req.method().clone();
            let url = redact_url(&req.uri().to_string());

            let (req, request) = if verbose {
                let headers = req.headers().clone();
                let (req, body) = view_request_body(req).await?;
                (req, Some(Details { headers, body }))
            } else {
                (req, None)
            };

            let start = Instant::now();
            let fut: Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>> =
                Box::pin(inner.call(req));
            let result = fut.await;
            let elapsed_ms = start.elapsed().as_millis();

            let (outcome, result) = match result {
                Ok(response) => {
                    let status = response.status();
                    tracing::debug!(
                        method = %method,
                        url = %url,
                        status = status.as_u16(),
                        elapsed_ms,
                        "http exchange"
                    );
                    if verbose {
                        let headers = response.headers().clone();
                        match view_response_body(response).await {
                            Ok((response, body)) => (
                                Outcome::Status(status, Some(Details { headers, body })),
                                Ok(response),
                            ),
                            Err(err) => {
                                let body = BodyView::Note(format!("body read failed: {err}"));
                                (
                                    Outcome::Status(status, Some(Details { headers, body })),
                                    Err(err),
                                )
                            }
                        }
                    } else {
                        (Outcome::Status(status, None), Ok(response))
                    }
                }
                Err(err) => {
                    tracing::debug!(method = %method, url = %url, error = %err, elapsed_ms, "http exchange failed");
                    (Outcome::Failed(err.to_string()), Err(err))
                }
            };

            let exchange = Exchange {
                method,
                url,
                request,
                outcome,
                elapsed_ms,
            };
            let mut w = writer.lock();
            if let Err(e) = write!(w, "{exchange}").and_then(|()| w.flush()) {
                tracing::warn!(error = %e, "failed to write traffic dump");
            }
            result
        })
    }
}

/// One request/response pair as written to the dump
struct Exchange {
    method: Method,
    url: String,
    request: Option<Details>,
    outcome: Outcome,
    elapsed_ms: u128,
}

enum Outcome {
    Status(StatusCode, Option<Details>),
    Failed(String),
}

/// Headers and body shown in verbose mode
struct Details {
    headers: HeaderMap,
    body: BodyView,
}

enum BodyView {
    Note(String),
    Text { essence: String, raw: Bytes },
    Hex(Bytes),
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--> {} {}", self.method, self.url)?;
        if let Some(request) = &self.request {
            write!(f, "{request}")?;
        }
        match &self.outcome {
            Outcome::Status(status, response) => {
                writeln!(f, "<-- {status} ({} ms)", self.elapsed_ms)?;
                if let Some(response) = response {
                    write!(f, "{response}")?;
                }
                Ok(())
            }
            Outcome::Failed(err) => writeln!(f, "<-- error: {err} ({} ms)", self.elapsed_ms),
        }
    }
}

impl fmt::Display for Details {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.headers {
            if MASKED_HEADERS.contains(name) {
                writeln!(f, "{name}: ***")?;
            } else {
                writeln!(f, "{name}: {}", String::from_utf8_lossy(value.as_bytes()))?;
            }
        }
        write!(f, "{}", self.body)
    }
}

impl fmt::Display for BodyView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Note(note) => writeln!(f, "({note})"),
            Self::Text { raw, .. } if raw.is_empty() => Ok(()),
            Self::Text { essence, raw } => {
                if is_json(essence)
                    && let Ok(value) = serde_json::from_slice::<serde_json::Value>(raw)
                    && let Ok(pretty) = serde_json::to_string_pretty(&value)
                {
                    return writeln!(f, "{pretty}");
                }
                writeln!(f, "{}", String::from_utf8_lossy(raw))
            }
            Self::Hex(raw) => {
                for (i, chunk) in raw.chunks(16).enumerate() {
                    writeln!(f, "{:08x}  {}", i * 16, hex::encode(chunk))?;
                }
                Ok(())
            }
        }
    }
}

fn essence(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<mime::Mime>().ok())
        .map(|m| m.essence_str().to_owned())
        .unwrap_or_default()
}

fn is_json(essence: &str) -> bool {
    essence == "application/json" || essence.ends_with("+json")
}

fn is_text(essence: &str) -> bool {
    is_json(essence)
        || essence.starts_with("text/")
        || essence == "application/xml"
        || essence == "application/x-www-form-urlencoded"
}

fn is_streaming(essence: &str) -> bool {
    essence == "text/event-stream" || essence == "application/x-ndjson"
}

async fn view_request_body(
    req: Request<RequestBody>,
) -> Result<(Request<RequestBody>, BodyView), HttpError> {
    if req.body().size_hint().exact().is_none() {
        return Ok((req, BodyView::Note("streaming body not shown".to_owned())));
    }
    let essence = essence(req.headers());
    let (parts, body) = req.into_parts();
    let raw: Bytes = body.collect().await.map_err(HttpError::Transport)?.to_bytes();
    let view = if is_text(&essence) {
        BodyView::Text {
            essence,
            raw: raw.clone(),
        }
    } else {
        BodyView::Hex(raw.clone())
    };
    Ok((Request::from_parts(parts, body::full(raw)), view))
}

async fn view_response_body(
    response: Response<ResponseBody>,
) -> Result<(Response<ResponseBody>, BodyView), HttpError> {
    let essence = essence(response.headers());
    if is_streaming(&essence) {
        let note = format!("{essence} stream not buffered");
        return Ok((response, BodyView::Note(note)));
    }
    if !is_text(&essence) {
        let note = match response.body().size_hint().exact() {
            Some(n) => format!("binary body, {n} bytes"),
            None => "binary body".to_owned(),
        };
        return Ok((response, BodyView::Note(note)));
    }
    let (parts, body) = response.into_parts();
    let raw = body.collect().await.map_err(HttpError::Transport)?.to_bytes();
    let view = BodyView::Text {
        essence,
        raw: raw.clone(),
    };
    Ok((Response::from_parts(parts, body::full_response(raw)), view))
}
