#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Generic REST transport core
//!
//! A hyper-based client for talking to heterogeneous third-party HTTP
//! services, with:
//! - Payload encoders: raw, JSON, URL-form, multipart (buffered or streamed)
//! - Per-call options: endpoint override, path, query, headers, token
//! - A per-client rate gate and dispatch timeout, both cancellable
//! - Manual GET/HEAD redirects that drop credentials across origins
//! - Content negotiation and response decoding: JSON, NDJSON, server-sent
//!   events, XML, or raw bytes into any `AsyncWrite`
//! - **Transparent response decompression** (gzip, brotli, deflate)
//! - OpenTelemetry client spans with W3C trace-context propagation
//! - An optional redacted traffic dump
//!
//! # Example
//!
//! ```ignore
//! use restkit_http::{Client, Json, Payload, options};
//! use http::Method;
//!
//! let client = Client::builder()
//!     .endpoint("https://api.example.com/v1")
//!     .bearer(api_key)
//!     .build()?;
//!
//! let mut reply = Json::<Completion>::new();
//! client
//!     .call(
//!         Payload::json(Method::POST, &request, "application/json")?,
//!         Some(&mut reply),
//!         vec![options::path(["chat", "completions"])],
//!     )
//!     .await?;
//!
//! // token-by-token streaming
//! client
//!     .call(
//!         Payload::json(Method::POST, &streaming_request, "text/event-stream")?,
//!         None,
//!         vec![options::on_event(|event| {
//!             print!("{}", event.data);
//!             Ok(())
//!         })],
//!     )
//!     .await?;
//! ```

pub mod body;
mod builder;
mod client;
mod config;
mod connector;
mod decode;
mod error;
pub mod layers;
pub mod options;
mod payload;
mod redirect;
pub mod sse;
mod token;
pub mod trace;

pub use body::{BodyReader, ERROR_BODY_PREVIEW_LIMIT, RequestBody, ResponseBody};
pub use builder::ClientBuilder;
pub use client::Client;
pub use config::{
    ClientConfig, DEFAULT_MAX_REDIRECTS, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, TlsRootConfig,
    TokenConfig,
};
pub use connector::{Transport, crypto_provider, native_root_certs};
pub use decode::{Decode, Discard, Json, Sink};
pub use error::{BoxError, ErrorClass, HttpError, InvalidUriKind};
pub use layers::DumpLayer;
pub use options::RequestOption;
pub use payload::{Field, FieldValue, FilePart, FileSource, Payload, to_fields};
pub use redirect::SENSITIVE_HEADERS;
pub use sse::TextStreamEvent;
pub use token::Token;
pub use tokio_util::sync::CancellationToken;
