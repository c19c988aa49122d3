//! Manual redirect following with credential scrubbing.
//!
//! Only `GET` and `HEAD` follow redirects; every hop is resent with an empty
//! body and without the headers describing one. When a hop changes host or
//! port, the headers in [`SENSITIVE_HEADERS`] are dropped so credentials
//! never reach a different origin.

use crate::body::{self, RequestBody};
use crate::error::{HttpError, InvalidUriKind};
use crate::trace::redact_url;
use http::{HeaderMap, HeaderValue, Method, Request, StatusCode, Uri, Version, header};

/// Headers that are stripped on cross-origin redirects to prevent credential leakage
pub const SENSITIVE_HEADERS: &[header::HeaderName] = &[
    header::AUTHORIZATION,
    header::COOKIE,
    header::PROXY_AUTHORIZATION,
];

/// Headers describing a request body, meaningless on a bodiless hop
const BODY_HEADERS: &[header::HeaderName] = &[
    header::CONTENT_LENGTH,
    header::CONTENT_TYPE,
    header::TRANSFER_ENCODING,
];

/// Get the default port for a scheme
fn default_port(scheme: &str) -> u16 {
    match scheme {
        "http" => 80,
        "https" => 443,
        _ => 0,
    }
}

/// Whether a response asks to be redirected: a 3xx status with `Location`.
#[must_use]
pub fn is_redirect(status: StatusCode, headers: &HeaderMap) -> bool {
    status.is_redirection() && headers.contains_key(header::LOCATION)
}

/// Whether requests with `method` follow redirects at all.
#[must_use]
pub fn follows(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

/// Everything of a sent request needed to resend it elsewhere.
#[derive(Debug, Clone)]
pub struct Hop {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
}

impl Hop {
    /// Snapshot the parts of `request` that survive a redirect.
    #[must_use]
    pub fn of<B>(request: &Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            headers: request.headers().clone(),
        }
    }

    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    #[cfg(test)]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The hop that follows this one given the response `Location`.
    ///
    /// Relative locations resolve against the current URL. Any explicit
    /// `Host` header and the body headers are dropped, and sensitive headers
    /// are dropped when the target host or port differs.
    ///
    /// # Errors
    /// `HttpError::InvalidUri` when the location cannot be resolved.
    pub fn redirect(&self, location: &HeaderValue) -> Result<Self, HttpError> {
        let location = location.to_str().map_err(|e| HttpError::InvalidUri {
            url: String::from_utf8_lossy(location.as_bytes()).into_owned(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;

        let current = url::Url::parse(&self.uri.to_string()).map_err(|e| HttpError::InvalidUri {
            url: redact_url(&self.uri.to_string()),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;
        let target = current.join(location).map_err(|e| HttpError::InvalidUri {
            url: redact_url(location),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;
        if !matches!(target.scheme(), "http" | "https") {
            return Err(HttpError::InvalidUri {
                url: redact_url(target.as_str()),
                kind: InvalidUriKind::UnsupportedScheme,
                reason: "redirect target must be http or https".to_owned(),
            });
        }
        let uri: Uri = target.as_str().parse().map_err(|e: http::uri::InvalidUri| {
            HttpError::InvalidUri {
                url: redact_url(target.as_str()),
                kind: InvalidUriKind::ParseError,
                reason: e.to_string(),
            }
        })?;

        let mut headers = self.headers.clone();
        headers.remove(header::HOST);
        for name in BODY_HEADERS {
            headers.remove(name);
        }
        if !same_host_and_port(&self.uri, &uri) {
            let stripped: Vec<&str> = SENSITIVE_HEADERS
                .iter()
                .filter(|name| headers.remove(*name).is_some())
                .map(header::HeaderName::as_str)
                .collect();
            if !stripped.is_empty() {
                tracing::warn!(
                    target = %redact_url(target.as_str()),
                    headers = ?stripped,
                    "cross-origin redirect: dropping credentials"
                );
            }
        }

        Ok(Self {
            method: self.method.clone(),
            uri,
            version: self.version,
            headers,
        })
    }

    /// Build the request for this hop with an empty body.
    ///
    /// # Errors
    /// `HttpError::RequestBuild` if the parts are rejected by `http`.
    pub fn to_request(&self) -> Result<Request<RequestBody>, HttpError> {
        let mut request = Request::builder()
            .method(self.method.clone())
            .uri(self.uri.clone())
            .version(self.version)
            .body(body::empty())?;
        *request.headers_mut() = self.headers.clone();
        Ok(request)
    }
}

fn same_host_and_port(a: &Uri, b: &Uri) -> bool {
    let port = |uri: &Uri| {
        uri.port_u16()
            .unwrap_or_else(|| default_port(uri.scheme_str().unwrap_or("https")))
    };
    let host = |uri: &Uri| uri.host().map(str::to_ascii_lowercase);
    host(a) == host(b) && port(a) == port(b)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn hop(uri: &str) -> Hop {
        let request = Request::get(uri)
            .header(header::AUTHORIZATION, "Bearer t")
            .header(header::COOKIE, "session=1")
            .header(header::PROXY_AUTHORIZATION, "Basic p")
            .header(header::HOST, "override.example")
            .header("x-custom", "kept")
            .body(())
            .unwrap();
        Hop::of(&request)
    }

    #[test]
    fn test_is_redirect() {
        let mut headers = HeaderMap::new();
        assert!(!is_redirect(StatusCode::FOUND, &headers));
        headers.insert(header::LOCATION, HeaderValue::from_static("/next"));
        assert!(is_redirect(StatusCode::FOUND, &headers));
        assert!(is_redirect(StatusCode::PERMANENT_REDIRECT, &headers));
        assert!(!is_redirect(StatusCode::OK, &headers));
    }

    #[test]
    fn test_follows_only_get_and_head() {
        assert!(follows(&Method::GET));
        assert!(follows(&Method::HEAD));
        assert!(!follows(&Method::POST));
        assert!(!follows(&Method::DELETE));
    }

    #[test]
    fn test_same_origin_keeps_credentials() {
        let next = hop("http://api.example.com/a/b")
            .redirect(&HeaderValue::from_static("../c?x=1"))
            .unwrap();
        assert_eq!(next.uri().to_string(), "http://api.example.com/c?x=1");
        assert!(next.headers().contains_key(header::AUTHORIZATION));
        assert!(next.headers().contains_key(header::COOKIE));
        assert!(!next.headers().contains_key(header::HOST));
        assert_eq!(next.headers()["x-custom"], "kept");
    }

    #[test]
    fn test_cross_host_strips_credentials() {
        let next = hop("http://api.example.com/a")
            .redirect(&HeaderValue::from_static("http://other.example.com/b"))
            .unwrap();
        for name in SENSITIVE_HEADERS {
            assert!(!next.headers().contains_key(name), "{name} should be stripped");
        }
        assert_eq!(next.headers()["x-custom"], "kept");
    }

    #[test]
    fn test_cross_host_scrub_warns() {
        use parking_lot::Mutex;
        use std::sync::Arc;
        use tracing_subscriber::layer::SubscriberExt;

        #[derive(Clone, Default)]
        struct WarningCapture(Arc<Mutex<Vec<String>>>);

        impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarningCapture {
            fn on_event(
                &self,
                event: &tracing::Event<'_>,
                _ctx: tracing_subscriber::layer::Context<'_, S>,
            ) {
                if *event.metadata().level() == tracing::Level::WARN {
                    let mut visitor = MessageVisitor(String::new());
                    event.record(&mut visitor);
                    self.0.lock().push(visitor.0);
                }
            }
        }

        struct MessageVisitor(String);
        impl tracing::field::Visit for MessageVisitor {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.0 = format!("{value:?}");
                }
            }
        }

        let capture = WarningCapture::default();
        let warnings = Arc::clone(&capture.0);
        let subscriber = tracing_subscriber::registry().with(capture);
        tracing::subscriber::with_default(subscriber, || {
            hop("http://api.example.com/a")
                .redirect(&HeaderValue::from_static("/b"))
                .unwrap();
            hop("http://api.example.com/a")
                .redirect(&HeaderValue::from_static("http://other.example.com/b"))
                .unwrap();
        });

        let captured = warnings.lock();
        assert_eq!(captured.len(), 1, "{:?}", *captured);
        assert!(captured[0].contains("dropping credentials"));
    }

    #[test]
    fn test_port_change_strips_credentials() {
        let next = hop("http://127.0.0.1:8080/a")
            .redirect(&HeaderValue::from_static("http://127.0.0.1:9090/a"))
            .unwrap();
        assert!(!next.headers().contains_key(header::AUTHORIZATION));
    }

    #[test]
    fn test_default_port_is_same_origin() {
        let next = hop("https://api.example.com/a")
            .redirect(&HeaderValue::from_static("https://api.example.com:443/b"))
            .unwrap();
        assert!(next.headers().contains_key(header::AUTHORIZATION));
    }

    #[test]
    fn test_rejects_non_http_target() {
        let err = hop("http://api.example.com/a")
            .redirect(&HeaderValue::from_static("ftp://files.example.com/x"))
            .unwrap_err();
        assert!(matches!(
            err,
            HttpError::InvalidUri {
                kind: InvalidUriKind::UnsupportedScheme,
                ..
            }
        ));
    }

    #[test]
    fn test_body_headers_are_dropped() {
        let request = Request::get("http://api.example.com/search")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, "11")
            .header(header::ACCEPT, "application/json")
            .body(())
            .unwrap();
        let next = Hop::of(&request)
            .redirect(&HeaderValue::from_static("/results"))
            .unwrap();
        for name in BODY_HEADERS {
            assert!(!next.headers().contains_key(name), "{name} should be dropped");
        }
        assert_eq!(next.headers()[header::ACCEPT], "application/json");
    }

    #[test]
    fn test_to_request_has_empty_body() {
        use http_body::Body as _;

        let request = hop("http://api.example.com/a").to_request().unwrap();
        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.body().size_hint().exact(), Some(0));
    }
}
