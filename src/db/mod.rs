//! Device-local journal storage.
//!
//! Holds the most recently edited copy of the journal:
//! - Trades, in display order
//! - The strategy profile (seeded with the template on first open)
//! - The current pre-market note
//! - When the journal was last replaced by a sync

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::{debug, info};

use crate::models::{JournalSnapshot, PreMarketNotes, StrategyProfile, Trade, TradeDirection};

/// SQLite-backed local journal.
pub struct JournalDb {
    pool: SqlitePool,
}

/// Stored trade row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredTrade {
    pub id: String,
    pub symbol: String,
    pub direction: String,
    pub entry_time: String,
    pub exit_time: Option<String>,
    pub entry_price: String,
    pub exit_price: Option<String>,
    pub quantity: String,
    pub pnl: Option<String>,
    pub tags: String,
    pub notes: String,
    pub extra: String,
}

impl TryFrom<StoredTrade> for Trade {
    type Error = anyhow::Error;

    fn try_from(row: StoredTrade) -> Result<Self> {
        let direction = TradeDirection::parse(&row.direction)
            .with_context(|| format!("Unknown direction '{}' for trade {}", row.direction, row.id))?;

        Ok(Trade {
            direction,
            entry_time: parse_time(&row.entry_time)?,
            exit_time: row.exit_time.as_deref().map(parse_time).transpose()?,
            entry_price: parse_decimal(&row.entry_price)?,
            exit_price: row.exit_price.as_deref().map(parse_decimal).transpose()?,
            quantity: parse_decimal(&row.quantity)?,
            pnl: row.pnl.as_deref().map(parse_decimal).transpose()?,
            tags: serde_json::from_str(&row.tags).context("Corrupt tags column")?,
            notes: row.notes,
            extra: serde_json::from_str(&row.extra).context("Corrupt extra column")?,
            symbol: row.symbol,
            id: row.id,
        })
    }
}

/// Summary numbers for the status screen.
#[derive(Debug, Clone)]
pub struct JournalStats {
    pub trade_count: usize,
    pub closed_trades: usize,
    pub total_pnl: Decimal,
    pub strategy_name: String,
    pub notes_date: Option<NaiveDate>,
    pub last_updated: DateTime<Utc>,
}

impl JournalDb {
    /// Open (or create) the journal database.
    pub async fn open(database_url: &str) -> Result<Self> {
        // Every in-memory connection is its own database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;
        db.seed_defaults().await?;

        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                direction TEXT NOT NULL,
                entry_time TEXT NOT NULL,
                exit_time TEXT,
                entry_price TEXT NOT NULL,
                exit_price TEXT,
                quantity TEXT NOT NULL,
                pnl TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                notes TEXT NOT NULL DEFAULT '',
                extra TEXT NOT NULL DEFAULT '{}',
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strategy_profile (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                name TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pre_market_notes (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                date TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS journal_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_updated TEXT NOT NULL,
                extra TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_position ON trades(position)")
            .execute(&self.pool)
            .await?;

        // Journals created before unmodelled fields were kept
        self.ensure_column("trades", "extra", "TEXT NOT NULL DEFAULT '{}'").await?;
        self.ensure_column("journal_meta", "extra", "TEXT NOT NULL DEFAULT '{}'").await?;

        Ok(())
    }

    async fn ensure_column(&self, table: &str, column: &str, definition: &str) -> Result<()> {
        let (present,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
                .bind(table)
                .bind(column)
                .fetch_one(&self.pool)
                .await?;

        if present == 0 {
            sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition))
                .execute(&self.pool)
                .await?;
            info!(table = %table, column = %column, "Added column");
        }
        Ok(())
    }

    async fn seed_defaults(&self) -> Result<()> {
        let profile = StrategyProfile::default();
        let body = serde_json::to_string(&profile)?;

        let seeded = sqlx::query("INSERT OR IGNORE INTO strategy_profile (id, name, body) VALUES (1, ?, ?)")
            .bind(&profile.name)
            .bind(body)
            .execute(&self.pool)
            .await?;

        sqlx::query("INSERT OR IGNORE INTO journal_meta (id, last_updated) VALUES (1, ?)")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        if seeded.rows_affected() > 0 {
            info!("Seeded template strategy profile");
        }
        Ok(())
    }

    // ==================== Snapshot ====================

    /// Read the whole journal.
    pub async fn load_snapshot(&self) -> Result<JournalSnapshot> {
        let rows = sqlx::query_as::<_, StoredTrade>(
            r#"
            SELECT id, symbol, direction, entry_time, exit_time, entry_price,
                   exit_price, quantity, pnl, tags, notes, extra
            FROM trades ORDER BY position ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let trades = rows
            .into_iter()
            .map(Trade::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(JournalSnapshot::new(
            trades,
            self.get_strategy().await?,
            self.get_notes().await?,
            self.get_last_updated().await?,
        )
        .with_extra(self.get_extra().await?))
    }

    /// Overwrite the journal with `snapshot` in one transaction.
    pub async fn replace_snapshot(&self, snapshot: &JournalSnapshot) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM trades").execute(&mut *tx).await?;

        for (position, trade) in snapshot.trades.iter().enumerate() {
            sqlx::query(INSERT_TRADE)
                .bind(&trade.id)
                .bind(position as i64)
                .bind(&trade.symbol)
                .bind(trade.direction.as_str())
                .bind(trade.entry_time.to_rfc3339())
                .bind(trade.exit_time.map(|t| t.to_rfc3339()))
                .bind(trade.entry_price.to_string())
                .bind(trade.exit_price.map(|d| d.to_string()))
                .bind(trade.quantity.to_string())
                .bind(trade.pnl.map(|d| d.to_string()))
                .bind(serde_json::to_string(&trade.tags)?)
                .bind(&trade.notes)
                .bind(serde_json::to_string(&trade.extra)?)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(UPSERT_STRATEGY)
            .bind(&snapshot.strategy.name)
            .bind(serde_json::to_string(&snapshot.strategy)?)
            .execute(&mut *tx)
            .await?;

        match &snapshot.notes {
            Some(n) => {
                sqlx::query(UPSERT_NOTES)
                    .bind(n.date.to_string())
                    .bind(&n.notes)
                    .execute(&mut *tx)
                    .await?;
            }
            None => {
                sqlx::query("DELETE FROM pre_market_notes")
                    .execute(&mut *tx)
                    .await?;
            }
        }

        sqlx::query("UPDATE journal_meta SET last_updated = ?, extra = ? WHERE id = 1")
            .bind(snapshot.last_updated.to_rfc3339())
            .bind(serde_json::to_string(&snapshot.extra)?)
            .execute(&mut *tx)
            .await?;

        tx.commit().await.context("Failed to commit journal")?;

        debug!(trades = snapshot.trade_count(), "Local journal replaced");
        Ok(())
    }

    // ==================== Trades ====================

    /// Insert a trade at the end, or update it in place.
    pub async fn upsert_trade(&self, trade: &Trade) -> Result<()> {
        let (next,): (i64,) = sqlx::query_as("SELECT COALESCE(MAX(position) + 1, 0) FROM trades")
            .fetch_one(&self.pool)
            .await?;

        sqlx::query(INSERT_TRADE)
            .bind(&trade.id)
            .bind(next)
            .bind(&trade.symbol)
            .bind(trade.direction.as_str())
            .bind(trade.entry_time.to_rfc3339())
            .bind(trade.exit_time.map(|t| t.to_rfc3339()))
            .bind(trade.entry_price.to_string())
            .bind(trade.exit_price.map(|d| d.to_string()))
            .bind(trade.quantity.to_string())
            .bind(trade.pnl.map(|d| d.to_string()))
            .bind(serde_json::to_string(&trade.tags)?)
            .bind(&trade.notes)
            .bind(serde_json::to_string(&trade.extra)?)
            .execute(&self.pool)
            .await?;

        self.touch().await
    }

    // ==================== Strategy ====================

    pub async fn get_strategy(&self) -> Result<StrategyProfile> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT body FROM strategy_profile WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((body,)) => serde_json::from_str(&body).context("Corrupt strategy profile"),
            None => Ok(StrategyProfile::default()),
        }
    }

    pub async fn set_strategy(&self, profile: &StrategyProfile) -> Result<()> {
        sqlx::query(UPSERT_STRATEGY)
            .bind(&profile.name)
            .bind(serde_json::to_string(profile)?)
            .execute(&self.pool)
            .await?;

        self.touch().await
    }

    // ==================== Notes ====================

    pub async fn get_notes(&self) -> Result<Option<PreMarketNotes>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT date, notes FROM pre_market_notes WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(date, notes)| {
            Ok(PreMarketNotes {
                date: NaiveDate::from_str(&date).context("Corrupt notes date")?,
                notes,
            })
        })
        .transpose()
    }

    pub async fn set_notes(&self, notes: &PreMarketNotes) -> Result<()> {
        sqlx::query(UPSERT_NOTES)
            .bind(notes.date.to_string())
            .bind(&notes.notes)
            .execute(&self.pool)
            .await?;

        self.touch().await
    }

    // ==================== Meta ====================

    pub async fn get_last_updated(&self) -> Result<DateTime<Utc>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT last_updated FROM journal_meta WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((ts,)) => parse_time(&ts),
            None => Ok(Utc::now()),
        }
    }

    /// Top-level backup fields kept from the last sync.
    pub async fn get_extra(&self) -> Result<Map<String, Value>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT extra FROM journal_meta WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((extra,)) => serde_json::from_str(&extra).context("Corrupt journal extra"),
            None => Ok(Map::new()),
        }
    }

    async fn touch(&self) -> Result<()> {
        sqlx::query("UPDATE journal_meta SET last_updated = ? WHERE id = 1")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Summary of the local journal.
    pub async fn stats(&self) -> Result<JournalStats> {
        let snapshot = self.load_snapshot().await?;

        let closed: Vec<&Trade> = snapshot.trades.iter().filter(|t| t.is_closed()).collect();
        let total_pnl: Decimal = snapshot
            .trades
            .iter()
            .filter_map(|t| t.realized_pnl())
            .sum();

        Ok(JournalStats {
            trade_count: snapshot.trade_count(),
            closed_trades: closed.len(),
            total_pnl,
            strategy_name: snapshot.strategy.name,
            notes_date: snapshot.notes.map(|n| n.date),
            last_updated: snapshot.last_updated,
        })
    }
}

const INSERT_TRADE: &str = r#"
    INSERT INTO trades (id, position, symbol, direction, entry_time, exit_time, entry_price,
                        exit_price, quantity, pnl, tags, notes, extra, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
    ON CONFLICT(id) DO UPDATE SET
        symbol = excluded.symbol,
        direction = excluded.direction,
        entry_time = excluded.entry_time,
        exit_time = excluded.exit_time,
        entry_price = excluded.entry_price,
        exit_price = excluded.exit_price,
        quantity = excluded.quantity,
        pnl = excluded.pnl,
        tags = excluded.tags,
        notes = excluded.notes,
        extra = excluded.extra,
        updated_at = datetime('now')
"#;

const UPSERT_STRATEGY: &str = r#"
    INSERT INTO strategy_profile (id, name, body, updated_at)
    VALUES (1, ?, ?, datetime('now'))
    ON CONFLICT(id) DO UPDATE SET
        name = excluded.name,
        body = excluded.body,
        updated_at = datetime('now')
"#;

const UPSERT_NOTES: &str = r#"
    INSERT INTO pre_market_notes (id, date, notes) VALUES (1, ?, ?)
    ON CONFLICT(id) DO UPDATE SET date = excluded.date, notes = excluded.notes
"#;

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp '{}'", s))?
        .with_timezone(&Utc))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s).with_context(|| format!("Invalid decimal '{}'", s))
}
