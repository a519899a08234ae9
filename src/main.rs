use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process;
use std::sync::Mutex;

use serde_json::Value;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fdep_mcp::config::{load_config, save_config, ServerConfig, CONFIG_FILENAME};
use fdep_mcp::db::{Database, KNOWN_TABLES};
use fdep_mcp::errors::{FdepError, Result};
use fdep_mcp::mcp::{get_tool_definitions, handle_tool_call, McpServer};
use fdep_mcp::service::CodeService;

/// Query tools over an fdep code-analysis database.
#[derive(Parser)]
#[command(name = "fdep-mcp", version, about = "MCP server for fdep code-analysis databases")]
struct Cli {
    /// Configuration file (default: ./fdep-mcp.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Database path, overriding the configuration
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over stdin/stdout
    Serve,
    /// Create an empty database with the full schema and write a config file
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },
    /// Show table counts of the database
    Status {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
    /// List the available tools
    Tools,
    /// Run one tool and print its output
    Call {
        /// Tool name
        tool: String,
        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        arguments: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(config: &ServerConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("fdep_mcp={}", config.log_level)))
        .map_err(|e| FdepError::Config {
            message: format!("invalid log filter: {e}"),
        })?;

    // stdout carries the protocol, so logs go to stderr or a file.
    match config.log_file {
        Some(ref path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false)
                        .with_file(true)
                        .with_line_number(true),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
                .init();
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    init_logging(&config)?;

    match cli.command {
        Commands::Serve => {
            info!(version = env!("CARGO_PKG_VERSION"), "starting fdep-mcp");
            let mut service = CodeService::new(config);
            // A failed open is not fatal; tools report the store as unavailable
            // and retry on the next call.
            let _ = service.initialize();
            let mut server = McpServer::new(service);
            server.run().await?;
        }
        Commands::Init { force } => {
            let config_path = cli.config.unwrap_or_else(|| PathBuf::from(CONFIG_FILENAME));
            let db = Database::initialize(&config.db_path)?;
            db.close();
            println!("Initialized database at {}", config.db_path.display());
            if config_path.exists() && !force {
                println!("Kept existing config {}", config_path.display());
            } else {
                save_config(&config_path, &config)?;
                println!("Wrote config {}", config_path.display());
            }
        }
        Commands::Status { json } => {
            let db = Database::open(&config.db_path)?;
            let mut counts = serde_json::Map::new();
            for table in KNOWN_TABLES {
                if let Some(n) = db.count_table(table)? {
                    counts.insert(table.to_string(), Value::from(n));
                }
            }
            let size = db.size()?;
            if json {
                let status = serde_json::json!({
                    "db_path": config.db_path.display().to_string(),
                    "db_size_bytes": size,
                    "tables": counts,
                });
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("fdep-mcp status");
                println!("  Database: {}", config.db_path.display());
                println!("  Size:     {size} bytes");
                println!("\n  Tables:");
                for table in KNOWN_TABLES {
                    match counts.get(table) {
                        Some(n) => println!("    {table}: {n}"),
                        None => println!("    {table}: (missing)"),
                    }
                }
            }
        }
        Commands::Tools => {
            for tool in get_tool_definitions() {
                println!("{:<30} {}", tool.name, tool.description);
            }
        }
        Commands::Call { tool, arguments } => {
            let args: Value = serde_json::from_str(&arguments)?;
            let max_chars = config.max_response_chars;
            let mut service = CodeService::new(config);
            let _ = service.initialize();
            let outcome = handle_tool_call(&mut service, &tool, args);
            println!("{}", fdep_mcp::mcp::truncate_response(outcome.text(), max_chars));
            if outcome.is_error() {
                process::exit(2);
            }
        }
    }

    Ok(())
}
