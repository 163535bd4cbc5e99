//! TradeMind journal sync
//!
//! Keeps the device-local trading journal and its single JSON backup in
//! the user's Google Drive converged across devices and offline edits.

mod db;
mod drive;
mod models;
mod sync;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::db::JournalDb;
use crate::drive::DriveClient;
use crate::models::{BackupDocument, PreMarketNotes, Trade, TradeDirection};
use crate::sync::{
    CredentialSupplier, ReconcileEngine, ReconcileKind, RefreshTokenSupplier, RemoteStore,
    StaticTokenSupplier, SyncConfig, SyncSession,
};

/// TradeMind journal sync CLI.
#[derive(Parser)]
#[command(name = "trademind")]
#[command(about = "Sync your trading journal with its cloud backup", long_about = None)]
struct Cli {
    /// Local journal database
    #[arg(short, long, env = "TRADEMIND_DATABASE", default_value = "sqlite:./trademind.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the local journal with the cloud backup
    Sync,

    /// Show the local journal
    Status,

    /// Show the cloud backup without changing anything
    Remote,

    /// Replace the local journal with a backup JSON file
    Import {
        /// Path to a backup file
        file: PathBuf,
    },

    /// Write the local journal as backup JSON
    Export {
        /// Output path
        file: PathBuf,
    },

    /// Record a trade
    AddTrade {
        /// Instrument symbol
        symbol: String,

        /// LONG or SHORT
        #[arg(long, default_value = "LONG")]
        direction: String,

        #[arg(long)]
        entry: Decimal,

        #[arg(long)]
        exit: Option<Decimal>,

        #[arg(short, long, default_value = "1")]
        quantity: Decimal,

        /// Recorded P&L (derived from prices when omitted)
        #[arg(long)]
        pnl: Option<Decimal>,

        /// Comma-separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Set today's (or a given day's) pre-market notes
    SetNotes {
        text: String,

        /// YYYY-MM-DD, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Rename the strategy profile
    SetStrategy {
        name: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = SyncConfig::from_env()?;
    let db = JournalDb::open(&cli.database).await?;

    match cli.command {
        Commands::Sync => {
            let local = db.load_snapshot().await?;
            info!(trades = local.trade_count(), "Starting sync");

            let Some(session) = login(&config).await? else {
                return Ok(());
            };
            let engine = ReconcileEngine::new(drive_store(&config)?);

            // Dropping the reconcile future leaves the local journal untouched
            let result = tokio::select! {
                r = engine.reconcile(&session, &local) => Some(r),
                _ = tokio::signal::ctrl_c() => None,
            };

            match result {
                None => println!("\nSync cancelled. Local journal unchanged."),
                Some(Ok(outcome)) => {
                    db.replace_snapshot(&outcome.snapshot).await?;

                    let summary = match outcome.kind {
                        ReconcileKind::Bootstrapped => "Backup created from local journal",
                        ReconcileKind::Merged => "Journal merged with backup",
                        ReconcileKind::RemoteUnreadable => "Backup unreadable, kept local journal",
                    };
                    println!("\n{}", summary);
                    println!("Backup file:  {}", outcome.handle);
                    println!("Trades:       {}", outcome.snapshot.trade_count());
                    println!("Strategy:     {}", outcome.snapshot.strategy.name);

                    if let Some(soft) = outcome.soft_error() {
                        println!("\n{}", soft.user_message());
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Sync failed");
                    println!("\n{}", e.user_message());
                }
            }

            session.logout();
        }

        Commands::Status => {
            let stats = db.stats().await?;

            println!("\n=== Local Journal ===");
            println!("Trades:         {}", stats.trade_count);
            println!("Closed:         {}", stats.closed_trades);
            println!("Total P&L:      ${:.2}", stats.total_pnl);
            println!("Strategy:       {}", stats.strategy_name);
            println!(
                "Notes:          {}",
                stats
                    .notes_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "None".to_string())
            );
            println!("Last Updated:   {}", stats.last_updated.to_rfc3339());
        }

        Commands::Remote => {
            let Some(session) = login(&config).await? else {
                return Ok(());
            };
            let engine = ReconcileEngine::new(drive_store(&config)?);
            let adapter = engine.adapter();

            match adapter.locate(&session).await {
                Ok(None) => println!("No backup named '{}' found.", config.backup_file_name),
                Ok(Some(handle)) => match adapter.download(&session, &handle).await {
                    Ok(Some(doc)) => {
                        println!("\n=== Cloud Backup ===");
                        println!("File:           {}", handle);
                        println!("Trades:         {}", doc.trades.len());
                        println!(
                            "Strategy:       {}",
                            doc.strategy
                                .as_ref()
                                .map(|s| s.name.as_str())
                                .unwrap_or("None")
                        );
                        println!(
                            "Last Updated:   {}",
                            doc.last_updated
                                .map(|t| t.to_rfc3339())
                                .unwrap_or_else(|| "Unknown".to_string())
                        );
                    }
                    Ok(None) => println!("Backup {} exists but could not be read.", handle),
                    Err(e) => println!("{}", e.user_message()),
                },
                Err(e) => println!("{}", e.user_message()),
            }

            session.logout();
        }

        Commands::Import { file } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let doc = BackupDocument::parse(&bytes)
                .with_context(|| format!("{} is not a journal backup", file.display()))?;

            let snapshot = doc.into_snapshot(Utc::now());
            db.replace_snapshot(&snapshot).await?;

            println!("Imported {} trades from {}", snapshot.trade_count(), file.display());
        }

        Commands::Export { file } => {
            let snapshot = db.load_snapshot().await?;
            let bytes = BackupDocument::from_snapshot(&snapshot).to_bytes()?;
            std::fs::write(&file, bytes)
                .with_context(|| format!("Failed to write {}", file.display()))?;

            println!("Exported {} trades to {}", snapshot.trade_count(), file.display());
        }

        Commands::AddTrade {
            symbol,
            direction,
            entry,
            exit,
            quantity,
            pnl,
            tags,
        } => {
            let direction = TradeDirection::parse(&direction)
                .with_context(|| format!("Unknown direction '{}'", direction))?;

            let now = Utc::now();
            let mut trade = Trade::new(symbol, direction, now, entry, quantity);
            trade.exit_price = exit;
            trade.exit_time = exit.map(|_| now);
            trade.pnl = pnl;
            trade.tags = tags;

            db.upsert_trade(&trade).await?;
            println!("Recorded trade {}", trade.id);
        }

        Commands::SetNotes { text, date } => {
            let notes = PreMarketNotes {
                date: date.unwrap_or_else(|| Utc::now().date_naive()),
                notes: text,
            };
            db.set_notes(&notes).await?;
            println!("Notes saved for {}", notes.date);
        }

        Commands::SetStrategy { name, description } => {
            let mut profile = db.get_strategy().await?;
            profile.name = name;
            if let Some(d) = description {
                profile.description = d;
            }
            db.set_strategy(&profile).await?;
            println!("Strategy renamed to '{}'", profile.name);
        }

        Commands::Config => {
            println!("\n=== Sync Configuration ===\n");
            println!("Backup File:      {}", config.backup_file_name);
            println!("Drive API:        {}", config.drive_api_base);
            println!("Upload API:       {}", config.drive_upload_base);
            println!("HTTP Timeout:     {}s", config.request_timeout_secs);
            println!("Template Marker:  {}", config.template_marker);
            println!("Database:         {}", cli.database);
        }
    }

    Ok(())
}

/// Pick a credential supplier from the environment.
fn credential_supplier(config: &SyncConfig) -> Result<Arc<dyn CredentialSupplier>> {
    if let Ok(token) = std::env::var("TRADEMIND_ACCESS_TOKEN") {
        return Ok(Arc::new(StaticTokenSupplier::new(token)));
    }

    let supplier =
        RefreshTokenSupplier::from_env(Duration::from_secs(config.request_timeout_secs))
            .context("No credentials: set TRADEMIND_ACCESS_TOKEN or the GOOGLE_* refresh variables")?;
    Ok(Arc::new(supplier))
}

/// Start a sync session. Prints the user-facing message and returns `None` on auth failure.
async fn login(config: &SyncConfig) -> Result<Option<SyncSession>> {
    let supplier = credential_supplier(config)?;

    match SyncSession::login(supplier, config.clone(), true).await {
        Ok(session) => Ok(Some(session)),
        Err(e) => {
            warn!(error = %e, "Sign-in failed");
            println!("{}", e.user_message());
            Ok(None)
        }
    }
}

fn drive_store(config: &SyncConfig) -> Result<Arc<dyn RemoteStore>> {
    Ok(Arc::new(DriveClient::new(config)?))
}
