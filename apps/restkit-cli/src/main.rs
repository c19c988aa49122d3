mod config;
mod output;
mod request;

use anyhow::{Context, Result};
use clap::Parser;
use restkit_http::{ClientBuilder, options};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// restkit - call REST services from the command line
#[derive(Parser, Debug)]
#[command(name = "restkit")]
#[command(about = "Call REST services from the command line")]
#[command(version)]
struct Cli {
    /// Endpoint URL
    url: String,

    /// Path segments appended to the endpoint (escaped individually)
    path: Vec<String>,

    /// HTTP method (default: GET, or POST when a body is given)
    #[arg(short = 'X', long)]
    method: Option<String>,

    /// Extra request header; `NAME:` without a value removes it, defaults included
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
    headers: Vec<String>,

    /// Query parameter, repeatable
    #[arg(short, long = "query", value_name = "KEY=VALUE")]
    query: Vec<String>,

    /// JSON request body; `@path` reads it from a file
    #[arg(short, long, conflicts_with_all = ["form", "file"])]
    data: Option<String>,

    /// URL-encoded form field, repeatable
    #[arg(short, long = "form", value_name = "KEY=VALUE")]
    form: Vec<String>,

    /// File part of a multipart upload, repeatable
    #[arg(long = "file", value_name = "NAME=PATH")]
    file: Vec<String>,

    /// Bearer token sent with the request
    #[arg(long)]
    token: Option<String>,

    /// Media type requested in `Accept` (default: */*)
    #[arg(long)]
    accept: Option<String>,

    /// Requests per second
    #[arg(long)]
    rate: Option<f64>,

    /// Fail when the response media type differs from `--accept`
    #[arg(long)]
    strict: bool,

    /// Disable the request timeout
    #[arg(long)]
    no_timeout: bool,

    /// Path to a YAML client configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log verbosity (-v info, -vv debug and traffic dump, -vvv trace and full dump)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "request failed");
            eprintln!("restkit: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,restkit={level},restkit_http={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: &Cli) -> Result<()> {
    let mut config = config::load(cli.config.as_deref())?;
    config::apply_flags(&mut config, cli)?;

    let mut builder = ClientBuilder::with_config(config);
    if cli.verbose >= 2 {
        builder = builder.trace_transport(std::io::stderr(), cli.verbose >= 3);
    }
    let client = builder.build().context("invalid client configuration")?;
    tracing::info!(client = %client, "client ready");

    let payload = request::payload(cli).await?;
    let mut call_options = request::options(cli)?;
    call_options.push(options::on_event(output::print_event));

    let mut printer = output::Printer::stdout();
    client
        .call(payload, Some(&mut printer), call_options)
        .await
        .context("request failed")?;
    Ok(())
}
