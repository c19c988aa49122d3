//! Per-call request options.
//!
//! Options are applied in the order given, after the client's static token,
//! so later options overwrite earlier ones.
//!
//! ```ignore
//! use restkit_http::options;
//!
//! client
//!     .call(
//!         Payload::empty(Method::GET, "application/json"),
//!         Some(&mut out),
//!         vec![
//!             options::path(["v1", "items"]),
//!             options::query([("page", "2")]),
//!             options::bearer(token),
//!         ],
//!     )
//!     .await?;
//! ```

use crate::error::{HttpError, InvalidUriKind};
use crate::sse::TextStreamEvent;
use crate::token::Token;
use crate::trace::redact_url;
use http::{HeaderMap, HeaderName, HeaderValue, header};
use serde::de::DeserializeOwned;
use std::fmt;
use url::Url;

/// Callback receiving each raw JSON value of a JSON/NDJSON stream
pub type JsonCallback = Box<dyn FnMut(&[u8]) -> Result<(), HttpError> + Send>;

/// Callback receiving each server-sent event
pub type EventCallback = Box<dyn FnMut(TextStreamEvent) -> Result<(), HttpError> + Send>;

/// One per-call mutation of the outgoing request.
pub enum RequestOption {
    /// Replace the request URL
    Endpoint(String),
    /// Append path segments to the URL
    Path(Vec<String>),
    /// Replace the query string
    Query(Vec<(String, String)>),
    /// Set one header
    Header(String, String),
    /// Set (or, when empty, remove) `Authorization`
    Token(Token),
    /// Handle each decoded JSON value
    OnJson(JsonCallback),
    /// Handle each server-sent event
    OnEvent(EventCallback),
    /// Disable the client timeout for this call
    NoTimeout,
}

impl fmt::Debug for RequestOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Endpoint(url) => f.debug_tuple("Endpoint").field(&redact_url(url)).finish(),
            Self::Path(segments) => f.debug_tuple("Path").field(segments).finish(),
            Self::Query(pairs) => f.debug_tuple("Query").field(pairs).finish(),
            Self::Header(name, _) => f.debug_tuple("Header").field(name).field(&"***").finish(),
            Self::Token(token) => f.debug_tuple("Token").field(token).finish(),
            Self::OnJson(_) => f.write_str("OnJson(..)"),
            Self::OnEvent(_) => f.write_str("OnEvent(..)"),
            Self::NoTimeout => f.write_str("NoTimeout"),
        }
    }
}

/// Replace the request URL. Must be an absolute `http`/`https` URL with a host.
pub fn endpoint(url: impl Into<String>) -> RequestOption {
    RequestOption::Endpoint(url.into())
}

/// Append path segments. Empty segments and duplicate `/` collapse.
pub fn path<I, S>(segments: I) -> RequestOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    RequestOption::Path(segments.into_iter().map(Into::into).collect())
}

/// Replace the query string with `pairs` (keys may repeat).
pub fn query<I, K, V>(pairs: I) -> RequestOption
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    RequestOption::Query(
        pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect(),
    )
}

/// Set one header, leaving the others untouched.
pub fn header(name: impl Into<String>, value: impl Into<String>) -> RequestOption {
    RequestOption::Header(name.into(), value.into())
}

/// Set `Authorization` from `token`; an empty token removes it.
pub fn token(token: Token) -> RequestOption {
    RequestOption::Token(token)
}

/// Shorthand for a `Bearer` token.
pub fn bearer(value: impl Into<String>) -> RequestOption {
    RequestOption::Token(Token::bearer(value))
}

/// Decode each JSON value of the response as `T` and hand it to `f`.
///
/// With this option a JSON response is read as a stream of values until EOF.
/// Returning [`HttpError::EndOfStream`] stops reading without error.
pub fn on_json<T, F>(mut f: F) -> RequestOption
where
    T: DeserializeOwned,
    F: FnMut(T) -> Result<(), HttpError> + Send + 'static,
{
    RequestOption::OnJson(Box::new(move |raw| f(serde_json::from_slice(raw)?)))
}

/// Handle each event of a `text/event-stream` response.
pub fn on_event<F>(f: F) -> RequestOption
where
    F: FnMut(TextStreamEvent) -> Result<(), HttpError> + Send + 'static,
{
    RequestOption::OnEvent(Box::new(f))
}

/// Disable the client timeout for this call only.
pub fn no_timeout() -> RequestOption {
    RequestOption::NoTimeout
}

/// Parse and validate an endpoint URL.
///
/// # Errors
/// `HttpError::InvalidUri` for unparsable URLs, schemes other than
/// `http`/`https`, and URLs without a host.
pub fn parse_endpoint(raw: &str) -> Result<Url, HttpError> {
    let url = Url::parse(raw).map_err(|e| HttpError::InvalidUri {
        url: redact_url(raw),
        kind: InvalidUriKind::ParseError,
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(HttpError::InvalidUri {
            url: redact_url(raw),
            kind: InvalidUriKind::UnsupportedScheme,
            reason: format!("scheme {:?} is not http or https", url.scheme()),
        });
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(HttpError::InvalidUri {
            url: redact_url(raw),
            kind: InvalidUriKind::MissingAuthority,
            reason: "URL has no host".to_owned(),
        });
    }
    Ok(url)
}

/// The request being prepared, as options see it.
pub(crate) struct Call {
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) on_json: Option<JsonCallback>,
    pub(crate) on_event: Option<EventCallback>,
    pub(crate) no_timeout: bool,
}

impl Call {
    pub(crate) fn new(url: Url, headers: HeaderMap) -> Self {
        Self {
            url,
            headers,
            on_json: None,
            on_event: None,
            no_timeout: false,
        }
    }

    pub(crate) fn apply(&mut self, option: RequestOption) -> Result<(), HttpError> {
        match option {
            RequestOption::Endpoint(raw) => self.url = parse_endpoint(&raw)?,
            RequestOption::Path(segments) => {
                let mut parts = self.url.path_segments_mut().map_err(|()| {
                    HttpError::BadRequest("URL cannot take path segments".to_owned())
                })?;
                parts.pop_if_empty();
                for segment in &segments {
                    parts.extend(segment.split('/').filter(|s| !s.is_empty()));
                }
            }
            RequestOption::Query(pairs) => {
                if pairs.is_empty() {
                    self.url.set_query(None);
                } else {
                    self.url.query_pairs_mut().clear().extend_pairs(&pairs);
                }
            }
            RequestOption::Header(name, value) => {
                let name = HeaderName::from_bytes(name.as_bytes())?;
                let value = HeaderValue::from_str(&value)?;
                self.headers.insert(name, value);
            }
            RequestOption::Token(token) => match token.header_value()? {
                Some(value) => {
                    self.headers.insert(header::AUTHORIZATION, value);
                }
                None => {
                    self.headers.remove(header::AUTHORIZATION);
                }
            },
            RequestOption::OnJson(callback) => self.on_json = Some(callback),
            RequestOption::OnEvent(callback) => self.on_event = Some(callback),
            RequestOption::NoTimeout => self.no_timeout = true,
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn call(base: &str) -> Call {
        Call::new(Url::parse(base).unwrap(), HeaderMap::new())
    }

    #[test]
    fn test_path_appends_and_collapses() {
        let mut c = call("https://api.example.com/v1/");
        c.apply(path(["/chat//", "completions"])).unwrap();
        assert_eq!(c.url.as_str(), "https://api.example.com/v1/chat/completions");

        let mut c = call("https://api.example.com");
        c.apply(path(["a/b", "c"])).unwrap();
        assert_eq!(c.url.as_str(), "https://api.example.com/a/b/c");
    }

    #[test]
    fn test_path_keeps_base_path() {
        let mut c = call("https://api.example.com/base");
        c.apply(path(["x"])).unwrap();
        c.apply(path(["y"])).unwrap();
        assert_eq!(c.url.path(), "/base/x/y");
    }

    #[test]
    fn test_query_replaces() {
        let mut c = call("https://api.example.com/s?old=1");
        c.apply(query([("q", "a b"), ("tag", "x"), ("tag", "y")]))
            .unwrap();
        assert_eq!(c.url.query(), Some("q=a+b&tag=x&tag=y"));

        c.apply(query(Vec::<(String, String)>::new())).unwrap();
        assert_eq!(c.url.query(), None);
    }

    #[test]
    fn test_endpoint_validation() {
        let mut c = call("https://api.example.com/");
        c.apply(endpoint("http://other.example.com:8080/x")).unwrap();
        assert_eq!(c.url.as_str(), "http://other.example.com:8080/x");

        let err = c.apply(endpoint("ftp://files.example.com")).unwrap_err();
        assert!(matches!(
            err,
            HttpError::InvalidUri {
                kind: InvalidUriKind::UnsupportedScheme,
                ..
            }
        ));
        assert!(matches!(
            c.apply(endpoint("not a url")),
            Err(HttpError::InvalidUri {
                kind: InvalidUriKind::ParseError,
                ..
            })
        ));
        assert!(matches!(
            parse_endpoint("http://"),
            Err(HttpError::InvalidUri { .. })
        ));
    }

    #[test]
    fn test_header_and_token_order() {
        let mut c = call("https://api.example.com/");
        c.apply(bearer("first")).unwrap();
        c.apply(header("x-trace", "1")).unwrap();
        c.apply(token(Token::new("Basic", "second"))).unwrap();
        assert_eq!(c.headers[header::AUTHORIZATION], "Basic second");
        assert_eq!(c.headers["x-trace"], "1");

        c.apply(bearer("")).unwrap();
        assert!(!c.headers.contains_key(header::AUTHORIZATION));
    }

    #[test]
    fn test_invalid_header_rejected() {
        let mut c = call("https://api.example.com/");
        assert!(matches!(
            c.apply(header("bad header", "x")),
            Err(HttpError::InvalidHeaderName(_))
        ));
        assert!(matches!(
            c.apply(header("x-ok", "line\nbreak")),
            Err(HttpError::InvalidHeaderValue(_))
        ));
    }

    #[test]
    fn test_callbacks_and_no_timeout() {
        let mut c = call("https://api.example.com/");
        let mut seen = Vec::new();
        let (tx, rx) = std::sync::mpsc::channel();
        c.apply(on_json(move |v: serde_json::Value| {
            tx.send(v).map_err(|e| HttpError::BadRequest(e.to_string()))
        }))
        .unwrap();
        c.apply(no_timeout()).unwrap();
        assert!(c.no_timeout);

        let callback = c.on_json.as_mut().unwrap();
        callback(br#"{"n":1}"#).unwrap();
        assert!(matches!(callback(b"not json"), Err(HttpError::Json(_))));
        seen.extend(rx.try_iter());
        assert_eq!(seen, vec![serde_json::json!({"n": 1})]);
    }
}
