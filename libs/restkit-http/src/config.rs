use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Default User-Agent string for HTTP requests
pub const DEFAULT_USER_AGENT: &str = concat!("restkit-http/", env!("CARGO_PKG_VERSION"));

/// Default per-dispatch timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum redirect hops followed after the original request
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// TLS root certificate source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsRootConfig {
    /// Mozilla root certificates bundled at build time
    #[default]
    WebPki,
    /// Root certificates from the operating system store
    Native,
}

/// Authorization credentials as they appear in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenConfig {
    /// Authorization scheme (default: `Bearer`)
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Opaque credential
    pub value: String,
}

fn default_scheme() -> String {
    crate::token::DEFAULT_SCHEME.to_owned()
}

/// Client configuration
///
/// Every field has a default, so partial YAML/env documents deserialize.
/// Durations use humantime notation (`"30s"`, `"1m 30s"`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Base endpoint (absolute `http`/`https` URL); required at build time
    pub endpoint: Option<String>,

    /// User-Agent header value (default: `restkit-http/<version>`)
    pub user_agent: String,

    /// Timeout covering one whole dispatch, body decoding included.
    /// `None` disables it (default: 30s)
    #[serde(with = "duration_serde")]
    pub timeout: Option<Duration>,

    /// Static credentials sent on every request unless overridden per call
    pub token: Option<TokenConfig>,

    /// Fixed headers; an empty value removes the header from every request
    pub headers: BTreeMap<String, String>,

    /// Requests per second; `0` disables the rate gate
    pub rate: f64,

    /// Require the response media type to match the requested `Accept`
    pub strict: bool,

    /// Redirect hops followed for GET/HEAD (default: 10)
    pub max_redirects: usize,

    /// TLS root certificate source
    pub tls_roots: TlsRootConfig,

    /// Idle timeout for pooled connections (default: 90s)
    #[serde(with = "duration_serde")]
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum idle connections kept per host (default: 32)
    pub pool_max_idle_per_host: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            timeout: Some(DEFAULT_TIMEOUT),
            token: None,
            headers: BTreeMap::new(),
            rate: 0.0,
            strict: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            tls_roots: TlsRootConfig::default(),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl ClientConfig {
    /// Configuration for a given endpoint with all other defaults
    #[must_use]
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Default::default()
        }
    }

    /// Short timeout, no redirects, small pool
    ///
    /// Suited to health probes and control-plane calls.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            timeout: Some(Duration::from_secs(10)),
            max_redirects: 0,
            pool_max_idle_per_host: 1,
            ..Default::default()
        }
    }

    /// Long-lived streams (SSE, NDJSON): no dispatch timeout
    #[must_use]
    pub fn streaming() -> Self {
        Self {
            timeout: None,
            ..Default::default()
        }
    }
}

/// Serde adapter for `Option<Duration>` in humantime notation.
///
/// `null`, an empty string, `"0"` and `"off"` all mean `None`.
mod duration_serde {
    use serde::{Deserialize, Deserializer, de};
    use std::time::Duration;

    pub fn deserialize<'de, D>(d: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<String>::deserialize(d)? else {
            return Ok(None);
        };
        let raw = raw.trim();
        if raw.is_empty() || raw == "0" || raw.eq_ignore_ascii_case("off") {
            return Ok(None);
        }
        humantime::parse_duration(raw)
            .map(Some)
            .map_err(|e| de::Error::custom(format!("invalid duration {raw:?}: {e}")))
    }
}
