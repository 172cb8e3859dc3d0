mod config;
mod error;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use runtime::{
    McpSession, OpenAiProvider, Orchestrator, ToolInvocationRequest, ToolSession, lifecycle,
};
use serde_json::json;

use config::{Config, ServerConfig, ServerTarget};
use error::{Error, Result};

const CONFIG_FILE: &str = "mcp-chat.toml";

const DEMO_QUERIES: [&str; 4] = [
    "What is the default transport protocol for MCP?",
    "What is MCP?",
    "How does the calculator tool work?",
    "What transport protocols are supported?",
];

#[derive(Parser)]
#[command(name = "mcp-chat")]
#[command(about = "Chat with a model backed by MCP knowledge-base tools", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: ./mcp-chat.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured model
    #[arg(long, global = true)]
    model: Option<String>,

    /// Do not start or contact the tool host
    #[arg(long, global = true)]
    no_tools: bool,

    /// Log level (debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,
    /// Answer a single question
    Ask {
        /// The question
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Run the sample queries
    Demo,
    /// List the tool host's tools and try `add(1, 2)`
    Tools,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(model) = cli.model {
        config.provider.model = Some(model);
    }
    if cli.no_tools {
        config.server = None;
    }

    match cli.command {
        Some(Commands::Chat) | None => cmd_chat(&config).await,
        Some(Commands::Ask { query }) => cmd_ask(&config, &query.join(" ")).await,
        Some(Commands::Demo) => cmd_demo(&config).await,
        Some(Commands::Tools) => cmd_tools(&config).await,
    }
}

async fn cmd_chat(config: &Config) -> Result<()> {
    println!("mcp-chat v{}", env!("CARGO_PKG_VERSION"));
    let orchestrator = build_orchestrator(config).await?;
    println!("Type 'quit' or Ctrl+D to exit.\n");

    lifecycle::scoped(orchestrator, async |orchestrator| -> Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("> ");
            stdout.flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                // EOF
                break;
            }

            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            if input == "quit" || input == "exit" {
                break;
            }

            match orchestrator.resolve(input).await {
                Ok(response) => println!("\n{response}\n"),
                Err(e) => eprintln!("Error: {e}\n"),
            }
        }
        Ok(())
    })
    .await?;

    println!("\nSession ended.");
    Ok(())
}

async fn cmd_ask(config: &Config, query: &str) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let answer = lifecycle::scoped(orchestrator, async |o| o.resolve(query).await).await?;
    println!("{answer}");
    Ok(())
}

async fn cmd_demo(config: &Config) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;

    lifecycle::scoped(orchestrator, async |orchestrator| {
        for query in DEMO_QUERIES {
            println!("\n{}", "=".repeat(60));
            println!("Query: {query}");
            println!("{}", "=".repeat(60));

            match orchestrator.resolve(query).await {
                Ok(response) => println!("\nResponse: {response}"),
                Err(e) => eprintln!("\nError: {e}"),
            }
        }
    })
    .await;

    Ok(())
}

async fn cmd_tools(config: &Config) -> Result<()> {
    let server = config.server.as_ref().ok_or(Error::NoServer)?;
    let mut session = connect(server, server.target()?).await?;

    let listed = list_and_try_add(&session).await;
    let report = session.close().await;
    if !report.is_clean() {
        eprintln!("Warning: tool host cleanup reported {} failure(s)", report.failures().len());
    }
    listed
}

async fn list_and_try_add(session: &McpSession) -> Result<()> {
    let catalog = session.list_tools().await?;
    println!("Available tools:");
    for tool in &catalog {
        println!("- {}: {}", tool.name, tool.description);
    }

    if catalog.get("add").is_some() {
        let arguments = json!({"a": 1, "b": 2});
        let request = ToolInvocationRequest {
            call_id: "tools-command".to_string(),
            tool_name: "add".to_string(),
            arguments: arguments.as_object().cloned().unwrap_or_default(),
        };
        let result = session.invoke(&request).await?;
        println!("Result of add(1, 2): {}", result.text());
    }
    Ok(())
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) if !path.exists() => Err(Error::ConfigNotFound {
            path: path.to_path_buf(),
        }),
        Some(path) => Ok(Config::load(path)?),
        None if Path::new(CONFIG_FILE).exists() => Ok(Config::load(CONFIG_FILE)?),
        None => Ok(Config::default_config(|var| std::env::var(var).ok())),
    }
}

fn build_provider(config: &Config) -> Result<OpenAiProvider> {
    let endpoint = config.endpoint()?;
    let api_key = config.api_key(&endpoint, |var| std::env::var(var).ok())?;
    let model = config.model(&endpoint);

    let mut builder = OpenAiProvider::builder(endpoint, api_key).model(model);
    if let Some(max_tokens) = config.provider.max_tokens {
        builder = builder.max_tokens(max_tokens);
    }
    if let Some(temperature) = config.provider.temperature {
        builder = builder.temperature(temperature);
    }
    Ok(builder.build()?)
}

async fn build_orchestrator(config: &Config) -> Result<Orchestrator<OpenAiProvider>> {
    let provider = build_provider(config)?;
    println!("Using {provider}");

    let session = match &config.server {
        Some(server) => {
            // A bad [server] section is a config error, not a degraded run.
            let target = server.target()?;
            match connect(server, target).await {
                Ok(session) => Some(session),
                Err(e) => {
                    eprintln!("Failed to connect to MCP server: {e}");
                    eprintln!("Continuing without MCP tools...");
                    None
                }
            }
        }
        None => {
            println!("No tool host configured, continuing without MCP tools");
            None
        }
    };

    if let Some(session) = &session {
        let count = session.list_tools().await.map(|c| c.len()).unwrap_or_default();
        println!("Connected to {} with {count} tools", session.endpoint());
    }

    Ok(Orchestrator::new(provider, session).with_config(config.orchestrator_config()))
}

async fn connect(server: &ServerConfig, target: ServerTarget) -> Result<McpSession> {
    let mut session = McpSession::new().with_request_timeout(server.request_timeout());
    let timeout = server.connect_timeout();

    match target {
        ServerTarget::Process(process) => session.connect(process, timeout).await?,
        ServerTarget::Tcp(tcp) => session.connect(tcp, timeout).await?,
    }
    Ok(session)
}
