//! Trade model representing a single journal entry.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Direction of a trade. Reads accept the same spellings as [`TradeDirection::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Long => "LONG",
            TradeDirection::Short => "SHORT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LONG" | "BUY" => Some(TradeDirection::Long),
            "SHORT" | "SELL" => Some(TradeDirection::Short),
            _ => None,
        }
    }
}

impl TryFrom<String> for TradeDirection {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown trade direction '{}'", value))
    }
}

/// Individual journal trade.
///
/// The `id` is generated on the device that created the trade and never
/// changes afterwards; sync merges by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Client-generated unique identifier
    pub id: String,

    /// Instrument symbol (e.g. "NQ", "AAPL")
    pub symbol: String,

    /// Long or short
    pub direction: TradeDirection,

    /// When the position was opened
    pub entry_time: DateTime<Utc>,

    /// When the position was closed, if it has been
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_time: Option<DateTime<Utc>>,

    pub entry_price: Decimal,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<Decimal>,

    /// Contracts or shares
    pub quantity: Decimal,

    /// Realized P&L as recorded by the user or the broker import
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnl: Option<Decimal>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub notes: String,

    /// Fields written by other clients (screenshots, AI analysis, ...), kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Trade {
    /// Create an open trade with a freshly generated id.
    pub fn new(
        symbol: impl Into<String>,
        direction: TradeDirection,
        entry_time: DateTime<Utc>,
        entry_price: Decimal,
        quantity: Decimal,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            direction,
            entry_time,
            exit_time: None,
            entry_price,
            exit_price: None,
            quantity,
            pnl: None,
            tags: Vec::new(),
            notes: String::new(),
            extra: Map::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.exit_price.is_some()
    }

    /// Calculate P&L if position were closed at given price.
    pub fn calculate_pnl(&self, exit_price: Decimal) -> Decimal {
        let price_diff = exit_price - self.entry_price;
        match self.direction {
            TradeDirection::Long => self.quantity * price_diff,
            TradeDirection::Short => self.quantity * -price_diff,
        }
    }

    /// Recorded P&L, or the price-derived one for closed trades without it.
    pub fn realized_pnl(&self) -> Option<Decimal> {
        self.pnl
            .or_else(|| self.exit_price.map(|exit| self.calculate_pnl(exit)))
    }
}
