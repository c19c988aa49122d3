//! TLS setup and the pooled hyper transport under every client.
//!
//! Native root certificates are loaded once per process and cached, since
//! OS certificate store lookups can be slow on some platforms.

use crate::body::{RequestBody, ResponseBody};
use crate::config::TlsRootConfig;
use crate::error::{BoxError, HttpError};
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::BodyExt;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls_pki_types::CertificateDer;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tower::util::BoxCloneService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

/// Type-erased request/response service the client dispatches through.
///
/// Layers added with [`crate::ClientBuilder::layer`] wrap this type; tests
/// replace it entirely with a `tower::service_fn`.
pub type Transport = BoxCloneService<Request<RequestBody>, Response<ResponseBody>, HttpError>;

/// Always stores Ok; empty vec means no certs found (warned, not errored).
static NATIVE_ROOTS_CACHE: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

#[cfg(test)]
static LOAD_COUNT: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

fn load_native_certs() -> Vec<CertificateDer<'static>> {
    #[cfg(test)]
    LOAD_COUNT.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

    let result = rustls_native_certs::load_native_certs();
    for err in &result.errors {
        tracing::warn!(error = %err, "error loading native root certificate");
    }
    if result.certs.is_empty() {
        tracing::warn!("no native root CA certificates found");
    } else {
        tracing::debug!(count = result.certs.len(), "loaded native root certificates");
    }
    result.certs
}

/// Cached native root certificates (may be empty).
pub fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS_CACHE.get_or_init(load_native_certs).as_slice()
}

/// The globally installed crypto provider, or aws-lc-rs without installing it.
pub fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// rustls configuration trusting the cached native roots.
///
/// # Errors
/// `HttpError::Tls` when the OS store is empty or none of its certificates
/// parse, so a broken store fails at build time rather than at handshake.
pub fn native_roots_client_config() -> Result<rustls::ClientConfig, HttpError> {
    let certs = native_root_certs();
    if certs.is_empty() {
        return Err(HttpError::Tls(
            "no native root CA certificates found in OS certificate store".into(),
        ));
    }

    let mut root_store = rustls::RootCertStore::empty();
    let (added, ignored) = root_store.add_parsable_certificates(certs.iter().cloned());
    if ignored > 0 {
        tracing::warn!(added, ignored, "some native root certificates could not be parsed");
    }
    if added == 0 {
        return Err(HttpError::Tls(
            format!(
                "no valid native root CA certificates parsed (found {}, all failed to parse)",
                certs.len()
            )
            .into(),
        ));
    }

    Ok(
        rustls::ClientConfig::builder_with_provider(crypto_provider())
            .with_safe_default_protocol_versions()
            .map_err(|e| HttpError::Tls(Box::new(e)))?
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    )
}

/// HTTPS connector that also speaks plain HTTP; endpoints pick the scheme.
///
/// ALPN advertises both h2 and http/1.1.
///
/// # Errors
/// `HttpError::Tls` if the root store cannot be set up.
pub fn https_connector(
    tls_roots: TlsRootConfig,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let connector = match tls_roots {
        TlsRootConfig::WebPki => hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(crypto_provider())
            .map_err(|e| HttpError::Tls(Box::new(e)))?
            .https_or_http()
            .enable_all_versions()
            .build(),
        TlsRootConfig::Native => hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(native_roots_client_config()?)
            .https_or_http()
            .enable_all_versions()
            .build(),
    };
    Ok(connector)
}

/// Connection pool settings of the hyper client.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PoolSettings {
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) max_idle_per_host: usize,
}

/// Pooled hyper client with transparent response decompression.
///
/// Redirects, timeouts and the rate gate live in the client, not here, so
/// the service sees exactly one round trip per call.
///
/// # Errors
/// `HttpError::Tls` if the connector cannot be built.
pub(crate) fn hyper_transport(
    tls_roots: TlsRootConfig,
    pool: PoolSettings,
) -> Result<Transport, HttpError> {
    let https = https_connector(tls_roots)?;

    let mut builder = Client::builder(TokioExecutor::new());
    // pool_timer is required for pool_idle_timeout to take effect
    builder
        .pool_timer(TokioTimer::new())
        .pool_max_idle_per_host(pool.max_idle_per_host)
        .http2_only(false);
    if let Some(idle) = pool.idle_timeout {
        builder.pool_idle_timeout(idle);
    }
    let client = builder.build::<_, RequestBody>(https);

    let service = ServiceBuilder::new()
        .layer(DecompressionLayer::new())
        .service(client)
        .map_response(boxed_response)
        .map_err(HttpError::from);
    Ok(service.boxed_clone())
}

fn boxed_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: http_body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError>,
{
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, body.map_err(Into::into).boxed())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_native_roots_loaded_at_most_once() {
        let before = LOAD_COUNT.load(Ordering::SeqCst);
        let a = native_root_certs().len();
        let b = native_root_certs().len();
        assert_eq!(a, b);
        assert!(LOAD_COUNT.load(Ordering::SeqCst) <= before + 1);
    }

    #[test]
    fn test_crypto_provider_available() {
        let provider = crypto_provider();
        assert!(!provider.cipher_suites.is_empty());
    }

    #[test]
    fn test_webpki_connector_builds() {
        assert!(https_connector(TlsRootConfig::WebPki).is_ok());
    }

    #[tokio::test]
    async fn test_hyper_transport_builds() {
        let transport = hyper_transport(
            TlsRootConfig::WebPki,
            PoolSettings {
                idle_timeout: Some(Duration::from_secs(5)),
                max_idle_per_host: 1,
            },
        );
        assert!(transport.is_ok());
    }
}
