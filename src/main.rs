//! mock-intercept - CLI Entry Point
//!
//! Validates mock files and probes them with a request without touching
//! the network.

use anyhow::Result;
use clap::Parser;
use http::Method;
use mock_intercept::{ClientConfig, HttpClient, InterceptionRegistry, MockFileConfig, Request};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "mock-intercept",
    about = "Validate HTTP mock files and probe them with requests",
    version
)]
struct Args {
    /// Path to the mock file
    #[arg(short, long, default_value = "mocks.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print a sample mock file and exit
    #[arg(long)]
    print_config: bool,

    /// Validate the mock file and exit
    #[arg(long)]
    validate: bool,

    /// Send a request through the mocks: METHOD URL
    #[arg(long, num_args = 2, value_names = ["METHOD", "URL"])]
    probe: Option<Vec<String>>,

    /// Request header for --probe, as NAME:VALUE (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
    headers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let sample = include_str!("../demos/default-config.yaml");
        println!("{}", sample);
        return Ok(());
    }

    if !args.config.exists() {
        anyhow::bail!("Mock file not found: {:?}", args.config);
    }
    info!(path = ?args.config, "Loading mock file");
    let config = MockFileConfig::from_file(&args.config)?;

    if args.validate {
        // Building catches unreadable body files too
        config.to_specs()?;
        println!("Mock file is valid ({} mocks defined)", config.mocks.len());
        return Ok(());
    }

    let Some(probe) = args.probe else {
        anyhow::bail!("Nothing to do: pass --validate, --probe or --print-config");
    };

    let request = build_request(&probe, &args.headers)?;
    let client_config = Arc::new(ClientConfig::new());
    let registry =
        InterceptionRegistry::with_settings(Arc::clone(&client_config), config.registry_settings());
    config.register_all(&registry)?;

    let client = HttpClient::with_config(client_config);
    let response = client.send(request).await;
    registry.reset();

    let response = response?;
    println!("{} {}", response.status, response.url);
    let mut headers: Vec<_> = response.headers.iter().collect();
    headers.sort();
    for (name, value) in headers {
        println!("{}: {}", name, value);
    }
    if !response.body.is_empty() {
        println!();
        println!("{}", String::from_utf8_lossy(&response.body));
    }

    Ok(())
}

fn build_request(probe: &[String], headers: &[String]) -> Result<Request> {
    let [method, url] = probe else {
        anyhow::bail!("--probe takes METHOD and URL");
    };
    let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid method {:?}: {}", method, e))?;
    let mut request = Request::new(method, url)?;

    for header in headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("Header must be NAME:VALUE, got {:?}", header))?;
        request = request.with_header(name.trim(), value.trim());
    }

    Ok(request)
}
