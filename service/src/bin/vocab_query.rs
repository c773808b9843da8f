//! vocab-query: run one request against a Neo4j vocabulary graph.
//!
//! ```bash
//! vocab-query '{"method":"descendants","params":{"vocab":"icd10cm","code":"Q90"}}'
//! echo '{"method":"get","params":{"vocab":"icd10cm","code":"Q90"}}' | vocab-query -
//! RUST_LOG=vocab_graph=debug vocab-query --neo4j db.internal:7687 --max-connections 4 -
//! ```
//!
//! Settings come from the command line, then `VOCAB_GRAPH_*` variables,
//! then defaults. The response is printed to stdout as JSON; failures print
//! `{"error": "..."}` and exit with status 1. Ctrl-C stops a running
//! traversal and prints what was received so far.

use std::io::{self, Read};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use vocab_graph::{dispatch, error_body, CancelToken, Request, ServiceConfig, VocabError, VocabService};

#[derive(Debug, Parser)]
#[command(name = "vocab-query", version, about = "Query a vocabulary hierarchy graph")]
struct Cli {
    /// Neo4j address, `host:port` or a full `bolt://` URI [default: 127.0.0.1:7687]
    #[arg(long)]
    neo4j: Option<String>,

    /// Neo4j user [default: neo4j]
    #[arg(long)]
    user: Option<String>,

    /// Neo4j password
    #[arg(long)]
    password: Option<String>,

    /// Maximum simultaneous connections; zero or less selects 20
    #[arg(long, allow_negative_numbers = true)]
    max_connections: Option<i64>,

    /// JSON request, or `-` to read it from stdin
    request: String,
}

impl Cli {
    fn config(&self) -> Result<ServiceConfig> {
        let mut config = ServiceConfig::from_env().context("reading VOCAB_GRAPH_* settings")?;
        if let Some(addr) = &self.neo4j {
            config = config.with_uri(addr);
        }
        if self.user.is_some() || self.password.is_some() {
            let user = self.user.clone().unwrap_or_else(|| config.user.clone());
            let password = self.password.clone().unwrap_or_else(|| config.password.clone());
            config = config.with_credentials(user, password);
        }
        if let Some(n) = self.max_connections {
            config = config.with_max_connections(n);
        }
        config.validate()?;
        Ok(config)
    }

    fn request_text(&self) -> Result<String> {
        if self.request != "-" {
            return Ok(self.request.clone());
        }
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("reading request from stdin")?;
        Ok(text)
    }
}

async fn run(cli: &Cli, cancel: &CancelToken) -> Result<serde_json::Value> {
    let request = Request::from_json(&cli.request_text()?)?;
    let config = cli.config()?;

    info!(uri = %config.uri, method = request.method(), "connecting");
    let service = VocabService::connect(config).await?;
    let response = dispatch(&service, request, cancel).await;
    service.pool().close();
    Ok(response?)
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vocab_graph=info"));
    fmt().with_writer(io::stderr).with_env_filter(filter).init();

    let cli = Cli::parse();

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping traversal");
                cancel.cancel();
            }
        });
    }

    match run(&cli, &cancel).await {
        Ok(response) => println!("{response}"),
        Err(err) => {
            let body = match err.downcast_ref::<VocabError>() {
                Some(err) => error_body(err),
                None => serde_json::json!({ "error": format!("{err:#}") }),
            };
            println!("{body}");
            std::process::exit(1);
        }
    }
}
