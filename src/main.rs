//! # Triage CLI (`triage`)
//!
//! ## Usage
//!
//! ```bash
//! triage --config ./config/triage.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `triage init` | Create the SQLite database and run schema migrations |
//! | `triage serve` | Start the webhook and query HTTP server |
//! | `triage suggestion <number>` | Print the current suggestion and similar issues |
//! | `triage apply <number>` | Append an `APPLY_SUGGESTION` decision log |
//! | `triage decisions <number>` | Print the decision audit trail |

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use issue_triage::config::{self, Config, Mode};
use issue_triage::sqlite_store::SqliteStore;
use issue_triage::{db, migrate, server, suggestions};

/// Embedding-based issue triage.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/triage.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "triage",
    about = "Embedding-based issue triage for GitHub webhooks",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/triage.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` and runs in the mode set by `[pipeline].mode`.
    Serve,

    /// Show the current suggestion and similar issues for an issue number.
    Suggestion {
        number: u64,
    },

    /// Record that the current suggestion for an issue was applied.
    ///
    /// Each call appends a new decision log entry.
    Apply {
        number: u64,
    },

    /// Print the decision audit trail for an issue.
    Decisions {
        number: u64,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

async fn open_store(cfg: &Config) -> Result<SqliteStore> {
    if cfg.pipeline.mode == Mode::Live {
        anyhow::bail!("live mode keeps no database; nothing to query");
    }
    let pool = db::connect(cfg).await?;
    migrate::migrate_pool(&pool).await?;
    Ok(SqliteStore::new(pool))
}

async fn print_suggestion(store: &SqliteStore, number: u64) -> Result<()> {
    let report = suggestions::issue_report(store, number).await?;
    println!(
        "#{} {} [{}]",
        report.issue.number, report.issue.title, report.issue.state
    );
    match &report.suggestion {
        Some(s) => {
            println!("  suggestion {} ({})", s.id, s.rationale);
            println!(
                "  labels: {:?}  assignees: {:?}  priority: {}",
                s.labels, s.assignees, s.priority_score
            );
        }
        None => println!("  no suggestion yet"),
    }
    if report.similar.is_empty() {
        println!("  no similar issues");
    }
    for link in &report.similar {
        println!(
            "  similar #{} (score {:.3})",
            link.similar_issue_number, link.score
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Suggestion { number } => {
            let store = open_store(&cfg).await?;
            print_suggestion(&store, number).await?;
            store.close().await;
        }
        Commands::Apply { number } => {
            let store = open_store(&cfg).await?;
            let log = suggestions::apply_suggestion(&store, number).await?;
            println!("Applied suggestion for #{} (decision {})", number, log.id);
            store.close().await;
        }
        Commands::Decisions { number } => {
            let store = open_store(&cfg).await?;
            let report = suggestions::issue_report(&store, number).await?;
            if report.decisions.is_empty() {
                println!("No decisions recorded for #{}", number);
            }
            for log in &report.decisions {
                let at = chrono::DateTime::from_timestamp_millis(log.created_at)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| log.created_at.to_string());
                println!("{}  {}  {}  {}", at, log.action, log.actor, log.id);
            }
            store.close().await;
        }
    }

    Ok(())
}
