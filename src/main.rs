//! CLI entrypoint: serve the router over stdio or HTTP, run the indexer, or show status.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mcp_scout::{
    config,
    embedding::HttpEmbedder,
    indexer::ServiceBag,
    lifecycle::{self, Supervisor},
    logging,
    mcp::ScoutMcpServer,
    registry::CapabilityRegistry,
    store::QdrantToolStore,
    transport::RmcpSessionFactory,
};
use rmcp::{ServiceExt, transport::stdio};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mcp-scout", version, about = "Semantic tool discovery router for MCP servers")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the MCP router (stdio by default).
    Serve {
        /// Serve over streamable HTTP on HOST:PORT instead of stdio.
        #[arg(long)]
        http: Option<String>,
    },
    /// Run one indexing pass and print the report.
    Index {
        /// Re-index a single server instead of all of them.
        #[arg(long)]
        server: Option<String>,
    },
    /// Print the status summary of the last indexing run.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let cli = Cli::parse();
    let config = Arc::new(config::resolve().context("failed to resolve configuration")?);
    let state_dir = config.state_dir.clone();

    match cli.command.unwrap_or(Command::Serve { http: None }) {
        Command::Serve { http } => {
            let supervisor = Arc::new(Supervisor::new(build_bag(config)?));
            supervisor.start().await;
            let server = ScoutMcpServer::new(supervisor);
            match http {
                None => serve_stdio(server).await,
                Some(address) => serve_http(server, &address).await,
            }
        }
        Command::Index { server } => {
            let supervisor = Arc::new(Supervisor::new(build_bag(config)?));
            match supervisor.run_once(server.as_deref()).await {
                Some(report) => {
                    println!(
                        "indexed {} tools across {} servers ({} failed)",
                        report.indexed,
                        report.servers.len(),
                        report.failed
                    );
                    for entry in &report.servers {
                        match &entry.error {
                            Some(error) => {
                                println!("  {}: failed ({error})", entry.name);
                            }
                            None => println!(
                                "  {}: {} indexed, {} failed",
                                entry.name, entry.indexed, entry.failed
                            ),
                        }
                    }
                    Ok(())
                }
                None => {
                    eprintln!(
                        "server '{}' is not present in the configuration",
                        server.as_deref().unwrap_or_default()
                    );
                    std::process::exit(1);
                }
            }
        }
        Command::Status => {
            match lifecycle::read_status(&state_dir) {
                Some(summary) => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&summary)
                            .unwrap_or_else(|_| "{}".to_string())
                    );
                }
                None => println!(
                    "no status recorded yet; run `mcp-scout index` first (state dir: {})",
                    state_dir.display()
                ),
            }
            Ok(())
        }
    }
}

fn build_bag(config: Arc<config::ResolvedConfig>) -> Result<ServiceBag> {
    let embedder = Arc::new(
        HttpEmbedder::new(&config.embedding).context("failed to build embedding client")?,
    );
    let store = Arc::new(
        QdrantToolStore::new(&config.vector_db, embedder.clone())
            .context("failed to build vector store client")?,
    );
    Ok(ServiceBag {
        config,
        store,
        embedder,
        registry: Arc::new(CapabilityRegistry::new()),
        sessions: Arc::new(RmcpSessionFactory::new()),
    })
}

async fn serve_stdio(server: ScoutMcpServer) -> Result<()> {
    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server over stdio")?;
    service
        .waiting()
        .await
        .context("MCP server terminated unexpectedly")?;
    Ok(())
}

async fn serve_http(server: ScoutMcpServer, address: &str) -> Result<()> {
    use rmcp::transport::streamable_http_server::{
        StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
    };

    let service = StreamableHttpService::new(
        move || Ok::<_, std::io::Error>(server.clone()),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    tracing::info!(address, "MCP router listening on /mcp");

    axum::serve(listener, router)
        .await
        .context("HTTP server terminated unexpectedly")?;
    Ok(())
}
