//! Translate command-line flags into a payload and per-call options.

use crate::Cli;
use anyhow::{Context, Result, anyhow};
use http::Method;
use restkit_http::{FilePart, Payload, RequestOption, options};
use serde::Serialize;
use std::collections::BTreeMap;

/// A multipart field: text or a file on disk.
#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text(String),
    File(FilePart),
}

pub fn split_pair<'a>(raw: &'a str, sep: char, what: &str) -> Result<(&'a str, &'a str)> {
    raw.split_once(sep)
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| anyhow!("invalid {what} {raw:?}, expected KEY{sep}VALUE"))
}

fn method(cli: &Cli) -> Result<Option<Method>> {
    cli.method
        .as_deref()
        .map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()))
        .transpose()
        .context("invalid method")
}

/// Build the request payload from `-d`, `-f` and `--file`.
pub async fn payload(cli: &Cli) -> Result<Payload> {
    let accept = cli.accept.clone().unwrap_or_default();
    let method = method(cli)?;

    let payload = if !cli.file.is_empty() {
        let mut fields: BTreeMap<String, Vec<Part>> = BTreeMap::new();
        for raw in &cli.form {
            let (key, value) = split_pair(raw, '=', "form field")?;
            fields
                .entry(key.to_owned())
                .or_default()
                .push(Part::Text(value.to_owned()));
        }
        for raw in &cli.file {
            let (key, path) = split_pair(raw, '=', "file")?;
            fields
                .entry(key.to_owned())
                .or_default()
                .push(Part::File(FilePart::path(path)));
        }
        Payload::streaming_multipart(&fields, accept)?
    } else if !cli.form.is_empty() {
        let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for raw in &cli.form {
            let (key, value) = split_pair(raw, '=', "form field")?;
            fields.entry(key.to_owned()).or_default().push(value.to_owned());
        }
        Payload::form(&fields, accept)?
    } else if let Some(data) = &cli.data {
        let body = match data.strip_prefix('@') {
            Some(path) => tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read {path}"))?,
            None => data.clone().into_bytes(),
        };
        serde_json::from_slice::<serde_json::Value>(&body).context("request body is not JSON")?;
        Payload::raw(
            method.clone().unwrap_or(Method::POST),
            "application/json",
            body,
            accept,
        )
    } else {
        return Ok(Payload::empty(method.unwrap_or(Method::GET), accept));
    };

    Ok(match method {
        Some(method) => payload.with_method(method),
        None => payload,
    })
}

/// Path, query and header options; valueless headers are removed client-wide
/// instead (see `config::apply_flags`).
pub fn options(cli: &Cli) -> Result<Vec<RequestOption>> {
    let mut opts = Vec::new();
    if !cli.path.is_empty() {
        opts.push(options::path(cli.path.iter().map(String::as_str)));
    }
    if !cli.query.is_empty() {
        let pairs = cli
            .query
            .iter()
            .map(|raw| split_pair(raw, '=', "query parameter"))
            .collect::<Result<Vec<_>>>()?;
        opts.push(options::query(pairs));
    }
    for raw in &cli.headers {
        let (name, value) = split_pair(raw, ':', "header")?;
        if !value.is_empty() {
            opts.push(options::header(name, value));
        }
    }
    Ok(opts)
}
