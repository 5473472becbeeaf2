//! pooled-http command-line client
//!
//! Issues one or more requests to a single host over a pooled connection
//! and prints each response body.
//!
//! # Architecture Overview
//!
//! ```text
//!     CLI args + settings file
//!              │
//!              ▼
//!     ┌──────────────────────────────────────────────┐
//!     │                 HttpClient                   │
//!     │                                              │
//!     │  ┌────────────┐   lease   ┌───────────────┐  │
//!     │  │    pool    │──────────▶│  transaction  │  │
//!     │  │ idle set   │◀──────────│   executor    │  │
//!     │  └─────┬──────┘  release  └───────┬───────┘  │
//!     │        │ connect                  │ send     │
//!     │        ▼                          ▼          │
//!     │  ┌────────────────────────────────────────┐  │
//!     │  │     net endpoints (hyper http1 conn)   │  │
//!     │  └────────────────────────────────────────┘  │
//!     └──────────────────────────────────────────────┘
//!              │
//!              ▼
//!        Remote server
//! ```

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use hyper::Method;
use url::Url;

use pooled_http::config::{load_settings, Settings};
use pooled_http::observability::{logging, metrics};
use pooled_http::HttpClient;

#[derive(Parser)]
#[command(name = "pooled-http")]
#[command(about = "Send HTTP/1.1 requests over a pooled connection", long_about = None)]
struct Cli {
    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Request URL; its host and port override the settings file
    #[arg(short, long)]
    url: Option<Url>,

    /// Request path, used when no URL is given
    #[arg(short, long, default_value = "/")]
    path: String,

    /// Raw query string, used when no URL is given
    #[arg(short, long, default_value = "")]
    query: String,

    #[arg(short = 'X', long, default_value = "GET")]
    method: Method,

    /// Request body
    #[arg(short, long)]
    data: Option<String>,

    /// Number of sequential requests
    #[arg(short = 'n', long, default_value_t = 1)]
    repeat: u32,

    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long)]
    max_open_endpoints: Option<usize>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => load_settings(path)?,
        None => Settings::default(),
    };
    logging::init_logging(&settings.logging)?;

    tracing::info!("pooled-http v{} starting", env!("CARGO_PKG_VERSION"));

    let (path, query) = match &cli.url {
        Some(url) => {
            if url.scheme() != "http" {
                return Err(format!("unsupported scheme {:?}, only http is supported", url.scheme()).into());
            }
            let host = url.host_str().ok_or("URL has no host")?;
            settings.client.host = host.to_string();
            settings.client.port = url.port_or_known_default().unwrap_or(80);
            (url.path().to_string(), url.query().unwrap_or("").to_string())
        }
        None => (cli.path.clone(), cli.query.clone()),
    };
    if let Some(timeout_ms) = cli.timeout_ms {
        settings.client = settings.client.with_timeout(Duration::from_millis(timeout_ms));
    }
    if let Some(max) = cli.max_open_endpoints {
        settings.client = settings.client.with_max_open_endpoints(max);
    }

    let metrics_addr = match cli.metrics_addr {
        Some(addr) => Some(addr),
        None if settings.metrics.enabled => match settings.metrics.address.parse() {
            Ok(addr) => Some(addr),
            Err(_) => {
                tracing::error!(
                    metrics_address = %settings.metrics.address,
                    "Failed to parse metrics address"
                );
                None
            }
        },
        None => None,
    };
    if let Some(addr) = metrics_addr {
        metrics::init_metrics(addr)?;
    }

    let client = HttpClient::new(settings.client)?;
    let body = cli.data.map(Bytes::from);

    let mut failures = 0u32;
    let mut stdout = std::io::stdout();
    for attempt in 1..=cli.repeat {
        match client.request(&path, &query, cli.method.clone(), body.clone()).await {
            Ok(body) => {
                stdout.write_all(&body)?;
                if !body.ends_with(b"\n") {
                    stdout.write_all(b"\n")?;
                }
            }
            Err(e) => {
                failures += 1;
                tracing::error!(attempt, kind = e.kind(), error = %e, "Request failed");
            }
        }
    }
    stdout.flush()?;

    let stats = client.stats();
    tracing::info!(
        requests = cli.repeat,
        failures,
        opened = stats.opened,
        closed = stats.closed,
        idle = stats.idle,
        "Pool statistics"
    );

    client.shutdown();
    tracing::info!("Shutdown complete");

    if failures > 0 {
        return Err(format!("{failures} of {} requests failed", cli.repeat).into());
    }
    Ok(())
}
