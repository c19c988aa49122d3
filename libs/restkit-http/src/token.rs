use crate::error::HttpError;
use http::HeaderValue;
use std::fmt;

/// Authorization scheme used when none is given
pub const DEFAULT_SCHEME: &str = "Bearer";

/// Authorization credentials: a scheme and an opaque value.
///
/// Renders as `"<scheme> <value>"` in the `Authorization` header. A token with
/// an empty value removes the header instead of sending it.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    scheme: String,
    value: String,
}

impl Token {
    /// Credentials with an explicit scheme (`Basic`, `Token`, ...)
    #[must_use]
    pub fn new(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
        }
    }

    /// `Bearer` credentials
    #[must_use]
    pub fn bearer(value: impl Into<String>) -> Self {
        Self::new(DEFAULT_SCHEME, value)
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// True when applying this token deletes `Authorization`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// The `Authorization` header value, or `None` for an empty token.
    ///
    /// The value is marked sensitive so it is hidden from `Debug` output.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderValue` if the credential contains
    /// characters not allowed in a header.
    pub fn header_value(&self) -> Result<Option<HeaderValue>, HttpError> {
        if self.is_empty() {
            return Ok(None);
        }
        let mut value = HeaderValue::try_from(self.to_string())?;
        value.set_sensitive(true);
        Ok(Some(value))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.scheme, self.value)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("scheme", &self.scheme)
            .field("value", &"***")
            .finish()
    }
}

impl From<crate::config::TokenConfig> for Token {
    fn from(config: crate::config::TokenConfig) -> Self {
        Self::new(config.scheme, config.value)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        assert_eq!(Token::bearer("abc").to_string(), "Bearer abc");
        assert_eq!(Token::new("Basic", "dXNlcg==").to_string(), "Basic dXNlcg==");
    }

    #[test]
    fn test_empty_token_has_no_header() {
        let token = Token::bearer("");
        assert!(token.is_empty());
        assert!(token.header_value().unwrap().is_none());
    }

    #[test]
    fn test_header_value_is_sensitive() {
        let value = Token::bearer("secret").header_value().unwrap().unwrap();
        assert!(value.is_sensitive());
        assert_eq!(value, "Bearer secret");
    }

    #[test]
    fn test_debug_hides_value() {
        let debug = format!("{:?}", Token::bearer("secret"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_invalid_header_value() {
        let result = Token::bearer("bad\nvalue").header_value();
        assert!(matches!(result, Err(HttpError::InvalidHeaderValue(_))));
    }
}
