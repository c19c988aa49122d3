use crate::body::{self, ERROR_BODY_PREVIEW_LIMIT, RequestBody, ResponseBody};
use crate::builder::{self, ClientBuilder};
use crate::connector::Transport;
use crate::decode::{self, Callbacks, Decode};
use crate::error::{HttpError, InvalidUriKind};
use crate::options::{Call, EventCallback, JsonCallback, RequestOption, parse_endpoint};
use crate::payload::{JSON, Payload};
use crate::redirect::{self, Hop};
use crate::token::Token;
use crate::trace::{self, redact_url};
use http::{Extensions, HeaderMap, HeaderName, HeaderValue, Request, Response, Uri, header};
use http_body::Body as _;
use opentelemetry::Context;
use opentelemetry::KeyValue;
use opentelemetry::global::BoxedTracer;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use url::Url;

/// Media type assumed when a response carries no `Content-Type`
const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Accepted media type when the payload names none
const ANY_MEDIA_TYPE: &str = "*/*";

/// A fixed header; `None` deletes the header from every request.
pub(crate) type FixedHeader = (HeaderName, Option<HeaderValue>);

/// Settings that never change after construction.
pub(crate) struct ClientInner {
    pub(crate) endpoint: Url,
    pub(crate) user_agent: String,
    pub(crate) user_agent_value: HeaderValue,
    pub(crate) tracer: Option<BoxedTracer>,
    pub(crate) strict: bool,
    pub(crate) max_redirects: usize,
    pub(crate) extensions: Extensions,
    pub(crate) state: Mutex<State>,
}

/// Everything guarded by the dispatch lock.
pub(crate) struct State {
    pub(crate) transport: Transport,
    pub(crate) token: Option<Token>,
    pub(crate) headers: Vec<FixedHeader>,
    pub(crate) rate: f64,
    pub(crate) timeout: Option<Duration>,
    pub(crate) last_dispatch: Option<Instant>,
}

/// REST client bound to one base endpoint.
///
/// Cheap to clone; clones share the transport, the settings and the dispatch
/// lock. Each client serialises its own dispatches: a call holds the lock
/// from the rate gate until the response body is decoded, so requests leave
/// in lock-acquisition order and never overlap.
///
/// # Example
///
/// ```rust,ignore
/// use restkit_http::{Client, Json, Payload};
///
/// let client = Client::builder()
///     .endpoint("https://api.example.com/v1")
///     .bearer(api_key)
///     .rate(2.0)
///     .build()?;
///
/// let mut out = Json::<Forecast>::new();
/// client
///     .call(
///         Payload::empty(Method::GET, "application/json"),
///         Some(&mut out),
///         vec![options::path(["forecast"]), options::query([("city", "Oslo")])],
///     )
///     .await?;
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub(crate) fn new(inner: ClientInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Create a builder with default configuration
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.inner.user_agent
    }

    /// Typed values attached with [`ClientBuilder::extension`]
    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.inner.extensions
    }

    /// Replace (or with `None`, clear) the static token.
    ///
    /// # Errors
    /// `HttpError::InvalidHeaderValue` if the credential is not a valid header value.
    pub async fn set_token(&self, token: Option<Token>) -> Result<(), HttpError> {
        if let Some(token) = &token {
            token.header_value()?;
        }
        self.inner.state.lock().await.token = token;
        Ok(())
    }

    /// Set a fixed header; an empty `value` deletes `name` from every request.
    ///
    /// # Errors
    /// `HttpError::InvalidHeaderName`/`InvalidHeaderValue` for malformed input.
    pub async fn set_header(&self, name: &str, value: &str) -> Result<(), HttpError> {
        let (name, value) = builder::fixed_header(name, value)?;
        let mut state = self.inner.state.lock().await;
        state.headers.retain(|(existing, _)| *existing != name);
        state.headers.push((name, value));
        Ok(())
    }

    /// Change the dispatch rate; `0` disables the rate gate.
    ///
    /// # Errors
    /// `HttpError::BadRequest` for negative, non-finite or vanishing rates.
    pub async fn set_rate(&self, rate: f64) -> Result<(), HttpError> {
        builder::validate_rate(rate)?;
        self.inner.state.lock().await.rate = rate;
        Ok(())
    }

    /// Change the dispatch timeout; `None` disables it.
    pub async fn set_timeout(&self, timeout: Option<Duration>) {
        self.inner.state.lock().await.timeout = timeout;
    }

    /// Send `payload` to the client endpoint and decode the response into `out`.
    ///
    /// `out == None` discards the body (stream callbacks still run).
    ///
    /// # Errors
    /// See [`HttpError`]; non-2xx responses become `HttpError::HttpStatus`.
    pub async fn call(
        &self,
        payload: Payload,
        out: Option<&mut dyn Decode>,
        options: Vec<RequestOption>,
    ) -> Result<(), HttpError> {
        self.call_with_cancel(&CancellationToken::new(), payload, out, options)
            .await
    }

    /// Like [`Client::call`], aborting with `HttpError::Cancelled` once
    /// `cancel` fires, including while waiting on the rate gate.
    ///
    /// # Errors
    /// See [`Client::call`].
    pub async fn call_with_cancel(
        &self,
        cancel: &CancellationToken,
        payload: Payload,
        out: Option<&mut dyn Decode>,
        options: Vec<RequestOption>,
    ) -> Result<(), HttpError> {
        let mut headers = HeaderMap::new();
        if let Some(content_type) = payload.content_type() {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type)?);
        }
        if !payload.accept().is_empty() {
            headers.insert(header::ACCEPT, HeaderValue::from_str(payload.accept())?);
        }
        if payload.has_body()
            && let Some(len) = payload.content_length()
        {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        }

        let mut request = Request::builder()
            .method(payload.method().clone())
            .body(())?;
        *request.headers_mut() = headers;
        let (parts, ()) = request.into_parts();
        let body = payload.into_body()?;

        let outbound = Outbound {
            parts,
            body,
            url: self.inner.endpoint.clone(),
            out,
            options,
        };
        self.dispatch(cancel, outbound).await
    }

    /// Send a prepared request.
    ///
    /// A URI without scheme and host (`/v1/items`) takes them from the
    /// client endpoint. Client defaults (user agent, accept, fixed headers,
    /// static token) and `options` apply on top of the request's own headers.
    ///
    /// # Errors
    /// See [`Client::call`].
    pub async fn request(
        &self,
        request: Request<RequestBody>,
        out: Option<&mut dyn Decode>,
        options: Vec<RequestOption>,
    ) -> Result<(), HttpError> {
        self.request_with_cancel(&CancellationToken::new(), request, out, options)
            .await
    }

    /// Like [`Client::request`] with cancellation.
    ///
    /// # Errors
    /// See [`Client::call`].
    pub async fn request_with_cancel(
        &self,
        cancel: &CancellationToken,
        request: Request<RequestBody>,
        out: Option<&mut dyn Decode>,
        options: Vec<RequestOption>,
    ) -> Result<(), HttpError> {
        let (parts, body) = request.into_parts();
        let url = self.resolve(&parts.uri)?;
        let outbound = Outbound {
            parts,
            body,
            url,
            out,
            options,
        };
        self.dispatch(cancel, outbound).await
    }

    fn resolve(&self, uri: &Uri) -> Result<Url, HttpError> {
        let raw = uri.to_string();
        if uri.scheme().is_some() {
            return parse_endpoint(&raw);
        }
        self.inner
            .endpoint
            .join(&raw)
            .map_err(|e| HttpError::InvalidUri {
                url: redact_url(&raw),
                kind: InvalidUriKind::ParseError,
                reason: e.to_string(),
            })
    }

    async fn dispatch(
        &self,
        cancel: &CancellationToken,
        outbound: Outbound<'_>,
    ) -> Result<(), HttpError> {
        let mut state = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(HttpError::Cancelled),
            state = self.inner.state.lock() => state,
        };
        let result = self
            .dispatch_locked(&mut state, cancel, outbound)
            .await;
        state.last_dispatch = Some(Instant::now());
        result
    }

    async fn dispatch_locked(
        &self,
        state: &mut State,
        cancel: &CancellationToken,
        outbound: Outbound<'_>,
    ) -> Result<(), HttpError> {
        let Outbound {
            mut parts,
            body,
            url,
            out,
            options,
        } = outbound;
        if let Some(deadline) = next_slot(state) {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(HttpError::Cancelled),
                () = tokio::time::sleep_until(deadline) => {}
            }
        }

        let mut headers = std::mem::take(&mut parts.headers);
        headers.insert(header::USER_AGENT, self.inner.user_agent_value.clone());
        if !headers.contains_key(header::ACCEPT) {
            headers.insert(header::ACCEPT, HeaderValue::from_static(ANY_MEDIA_TYPE));
        }
        if !body.is_end_stream() && !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON));
        }
        for (name, value) in &state.headers {
            match value {
                Some(value) => {
                    headers.insert(name.clone(), value.clone());
                }
                None => {
                    headers.remove(name);
                }
            }
        }

        let mut call = Call::new(url, headers);
        if let Some(token) = &state.token {
            call.apply(RequestOption::Token(token.clone()))?;
        }
        for option in options {
            call.apply(option)?;
        }
        let Call {
            url,
            headers,
            on_json,
            on_event,
            no_timeout,
        } = call;

        let redacted = redact_url(url.as_str());
        parts.uri = url
            .as_str()
            .parse()
            .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
                url: redacted.clone(),
                kind: InvalidUriKind::ParseError,
                reason: e.to_string(),
            })?;
        parts.headers = headers;
        let request = Request::from_parts(parts, body);

        let timeout = if no_timeout { None } else { state.timeout };
        tracing::debug!(
            method = %request.method(),
            url = %redacted,
            timeout = ?timeout,
            "dispatch"
        );

        let (cx, span) = trace::start_span(
            self.inner.tracer.as_ref(),
            format!("{} {}", request.method(), url.path()),
            vec![
                KeyValue::new("http.request.method", request.method().as_str().to_owned()),
                KeyValue::new("url.full", redacted),
            ],
        );

        let exchange = self.exchange(&mut state.transport, &cx, request, out, on_json, on_event);
        let bounded = async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, exchange)
                    .await
                    .map_err(|_| HttpError::Timeout(limit))?,
                None => exchange.await,
            }
        };
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(HttpError::Cancelled),
            result = bounded => result,
        };

        span.finish(result.as_ref().err());
        result
    }

    /// Round trips plus decoding of the final response.
    async fn exchange(
        &self,
        transport: &mut Transport,
        cx: &Context,
        request: Request<RequestBody>,
        out: Option<&mut dyn Decode>,
        mut on_json: Option<JsonCallback>,
        mut on_event: Option<EventCallback>,
    ) -> Result<(), HttpError> {
        let accept = request
            .headers()
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(ANY_MEDIA_TYPE)
            .to_owned();

        let response = self.round_trips(transport, cx, request).await?;
        let (parts, body) = response.into_parts();
        let essence = media_type(&parts.headers)?;

        if !parts.status.is_success() {
            let preview = match body::read_preview(body, ERROR_BODY_PREVIEW_LIMIT).await {
                Ok(raw) => String::from_utf8_lossy(&raw).into_owned(),
                Err(err) => {
                    tracing::debug!(error = %err, "failed to read error body preview");
                    String::new()
                }
            };
            return Err(HttpError::HttpStatus {
                status: parts.status,
                body_preview: preview,
                content_type: parts
                    .headers
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned),
                retry_after: body::parse_retry_after(&parts.headers),
            });
        }

        if self.inner.strict
            && let Some(expected) = specific_media_type(&accept)
            && expected != essence
        {
            return Err(HttpError::NotAcceptable {
                expected,
                actual: essence,
            });
        }

        decode::decode_body(
            &essence,
            &parts.headers,
            body,
            out,
            Callbacks {
                on_json: on_json.as_mut(),
                on_event: on_event.as_mut(),
            },
        )
        .await
    }

    /// Send `request`, following redirects for GET/HEAD.
    async fn round_trips(
        &self,
        transport: &mut Transport,
        cx: &Context,
        mut request: Request<RequestBody>,
    ) -> Result<Response<ResponseBody>, HttpError> {
        let follows = redirect::follows(request.method());
        let mut hop = Hop::of(&request);
        let mut hops = 0;

        loop {
            let (traced, span) = trace::start_client_span(
                self.inner.tracer.as_ref(),
                cx,
                request,
                &self.inner.user_agent,
            );
            let result = match transport.ready().await {
                Ok(service) => service.call(traced).await,
                Err(err) => Err(err),
            };
            span.finish(&result);
            let response = result?;

            if !follows || !redirect::is_redirect(response.status(), response.headers()) {
                return Ok(response);
            }
            if hops == self.inner.max_redirects {
                return Err(HttpError::TooManyRedirects {
                    limit: self.inner.max_redirects,
                });
            }
            let Some(location) = response.headers().get(header::LOCATION) else {
                return Ok(response);
            };
            hop = hop.redirect(location)?;
            hops += 1;
            tracing::debug!(
                status = response.status().as_u16(),
                location = %redact_url(&hop.uri().to_string()),
                hop = hops,
                "following redirect"
            );
            request = hop.to_request()?;
        }
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.inner.user_agent,
            redact_url(self.inner.endpoint.as_str())
        )
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &redact_url(self.inner.endpoint.as_str()))
            .field("user_agent", &self.inner.user_agent)
            .field("strict", &self.inner.strict)
            .field("max_redirects", &self.inner.max_redirects)
            .finish_non_exhaustive()
    }
}

/// A request on its way out, before client defaults and options apply.
struct Outbound<'a> {
    parts: http::request::Parts,
    body: RequestBody,
    url: Url,
    out: Option<&'a mut dyn Decode>,
    options: Vec<RequestOption>,
}

/// When the rate gate opens for the next dispatch, if it is closed at all.
fn next_slot(state: &State) -> Option<Instant> {
    if state.rate <= 0.0 {
        return None;
    }
    let interval = Duration::try_from_secs_f64(state.rate.recip()).ok()?;
    state.last_dispatch?.checked_add(interval)
}

/// Essence of the response media type.
fn media_type(headers: &HeaderMap) -> Result<String, HttpError> {
    let Some(value) = headers.get(header::CONTENT_TYPE) else {
        return Ok(DEFAULT_MEDIA_TYPE.to_owned());
    };
    let raw = String::from_utf8_lossy(value.as_bytes());
    let mime: mime::Mime = raw
        .parse()
        .map_err(|_| HttpError::UnsupportedMediaType(raw.to_string()))?;
    Ok(mime.essence_str().to_owned())
}

/// Essence of `accept` unless it is empty or a wildcard.
fn specific_media_type(accept: &str) -> Option<String> {
    let accept = accept.trim();
    if accept.is_empty() || accept.contains('*') {
        return None;
    }
    Some(match accept.parse::<mime::Mime>() {
        Ok(mime) => mime.essence_str().to_owned(),
        Err(_) => accept.to_ascii_lowercase(),
    })
}
