//! Layered client configuration: defaults, then YAML, then `RESTKIT_*`
//! environment, then command-line flags.

use crate::Cli;
use crate::request::split_pair;
use anyhow::{Context, Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use restkit_http::{ClientConfig, TokenConfig};
use std::path::Path;

/// Environment prefix; nested keys use `__` (`RESTKIT_HEADERS__X_API_KEY`).
pub const ENV_PREFIX: &str = "RESTKIT_";

/// Load the client configuration from `path` (if any) and the environment.
pub fn load(path: Option<&Path>) -> Result<ClientConfig> {
    let mut figment = Figment::new();
    if let Some(path) = path {
        if !path.is_file() {
            bail!("config file does not exist: {}", path.display());
        }
        figment = figment.merge(Yaml::file(path));
    }
    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("failed to load configuration")
}

/// Flags win over every other source.
///
/// A `-H NAME:` without a value removes `NAME` from the request, defaults
/// included.
pub fn apply_flags(config: &mut ClientConfig, cli: &Cli) -> Result<()> {
    config.endpoint = Some(cli.url.clone());
    for raw in &cli.headers {
        let (name, value) = split_pair(raw, ':', "header")?;
        if value.is_empty() {
            config.headers.insert(name.to_owned(), String::new());
        }
    }
    if let Some(token) = &cli.token {
        config.token = Some(TokenConfig {
            scheme: "Bearer".to_owned(),
            value: token.clone(),
        });
    }
    if let Some(rate) = cli.rate {
        config.rate = rate;
    }
    if cli.strict {
        config.strict = true;
    }
    if cli.no_timeout {
        config.timeout = None;
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_yaml_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("restkit.yaml");
        std::fs::write(
            &path,
            "endpoint: https://ignored.example.com\n\
             timeout: 5s\n\
             rate: 1.5\n\
             headers:\n  X-Team: weather\n\
             token:\n  value: from-file\n",
        )
        .unwrap();

        let mut config = load(Some(&path)).unwrap();
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.headers["X-Team"], "weather");
        assert_eq!(config.token.as_ref().unwrap().scheme, "Bearer");

        let cli = Cli::try_parse_from([
            "restkit",
            "https://api.example.com",
            "--token",
            "from-flag",
            "--no-timeout",
            "--strict",
        ])
        .unwrap();
        apply_flags(&mut config, &cli).unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("https://api.example.com"));
        assert_eq!(config.token.unwrap().value, "from-flag");
        assert_eq!(config.timeout, None);
        assert!(config.strict);
        assert!((config.rate - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_header_flag_removes_header() {
        let cli = Cli::try_parse_from([
            "restkit",
            "https://api.example.com",
            "-H",
            "User-Agent:",
            "-H",
            "X-Trace: on",
        ])
        .unwrap();
        let mut config = ClientConfig::default();
        apply_flags(&mut config, &cli).unwrap();
        assert_eq!(config.headers.get("User-Agent").map(String::as_str), Some(""));
        assert!(!config.headers.contains_key("X-Trace"));

        let bad = Cli::try_parse_from(["restkit", "https://api.example.com", "-H", "nocolon"])
            .unwrap();
        assert!(apply_flags(&mut ClientConfig::default(), &bad).is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "retries: 3\n").unwrap();
        assert!(load(Some(&path)).is_err());
    }
}
