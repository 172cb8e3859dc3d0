use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kb_server::{KbServer, KnowledgeBase, Result};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "kb-server")]
#[command(about = "Knowledge-base MCP tool host", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Knowledge base JSON file
    #[arg(long, default_value = "data/kb.json", global = true)]
    data: PathBuf,

    /// Log level (debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve tools over stdio, or TCP with --listen (default)
    Serve {
        /// Accept MCP connections on this address instead of stdio
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Write the sample knowledge base first if the file is missing
        #[arg(long)]
        seed_if_missing: bool,

        /// Do not expose the `add` tool
        #[arg(long)]
        no_add: bool,
    },
    /// Write the sample knowledge base
    Seed {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // stdout carries the protocol; logs go to stderr.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "kb-server failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let knowledge = KnowledgeBase::new(cli.data);

    match cli.command {
        Some(Commands::Seed { force }) => cmd_seed(&knowledge, force).await,
        Some(Commands::Serve {
            listen,
            seed_if_missing,
            no_add,
        }) => {
            if seed_if_missing {
                knowledge.seed(false).await?;
            }
            let mut server = KbServer::new(knowledge);
            if no_add {
                server = server.without_arithmetic();
            }
            match listen {
                Some(addr) => serve_tcp(server, addr).await,
                None => serve_stdio(server).await,
            }
        }
        None => serve_stdio(KbServer::new(knowledge)).await,
    }
}

async fn cmd_seed(knowledge: &KnowledgeBase, force: bool) -> Result<()> {
    if knowledge.seed(force).await? {
        eprintln!("Wrote sample knowledge base to {}", knowledge.path().display());
    } else {
        eprintln!(
            "{} already exists; use --force to replace it",
            knowledge.path().display()
        );
    }
    Ok(())
}

async fn serve_stdio(server: KbServer) -> Result<()> {
    tracing::info!(data = %server.knowledge().path().display(), "serving on stdio");
    mcp::serve(&server, tokio::io::stdin(), tokio::io::stdout()).await?;
    tracing::info!("client closed stdin; exiting");
    Ok(())
}

async fn serve_tcp(server: KbServer, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        data = %server.knowledge().path().display(),
        "serving on tcp"
    );
    let server = Arc::new(server);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let server = server.clone();
                tokio::spawn(async move {
                    tracing::info!(%peer, "client connected");
                    let (reader, writer) = stream.into_split();
                    match mcp::serve(server.as_ref(), reader, writer).await {
                        Ok(()) => tracing::info!(%peer, "client disconnected"),
                        Err(e) => tracing::warn!(%peer, error = %e, "connection failed"),
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                return Ok(());
            }
        }
    }
}
