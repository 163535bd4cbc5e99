//! Strategy profile: the user's written trading plan.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name marker carried by the seeded, never-edited profile.
pub const TEMPLATE_MARKER: &str = "(Template)";

/// Singleton trading-plan record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyProfile {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub entry_rules: Vec<String>,

    #[serde(default)]
    pub exit_rules: Vec<String>,

    #[serde(default)]
    pub risk_rules: Vec<String>,

    /// Max account risk per trade, in percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_risk_per_trade_pct: Option<Decimal>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StrategyProfile {
    /// Whether this profile is still the untouched seed.
    pub fn is_template(&self, marker: &str) -> bool {
        !marker.is_empty() && self.name.contains(marker)
    }
}

impl Default for StrategyProfile {
    fn default() -> Self {
        Self {
            name: format!("My Trading Plan {}", TEMPLATE_MARKER),
            description: "Describe your edge here.".to_string(),
            entry_rules: vec![
                "Wait for the opening range to form".to_string(),
                "Enter only with higher-timeframe trend".to_string(),
            ],
            exit_rules: vec!["Stop below the last swing".to_string()],
            risk_rules: vec!["Stop trading after three losses".to_string()],
            max_risk_per_trade_pct: Some(Decimal::ONE),
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_is_template() {
        let profile = StrategyProfile::default();
        assert!(profile.is_template(TEMPLATE_MARKER));
    }

    #[test]
    fn test_renamed_profile_is_custom() {
        let profile = StrategyProfile {
            name: "ORB Breakout".to_string(),
            ..Default::default()
        };
        assert!(!profile.is_template(TEMPLATE_MARKER));
        assert!(!profile.is_template(""));
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let json = r##"{"name": "ORB", "setupChecklist": ["VWAP reclaim"], "color": "#ff0"}"##;
        let profile: StrategyProfile = serde_json::from_str(json).unwrap();

        assert_eq!(profile.name, "ORB");
        assert_eq!(profile.extra.len(), 2);

        let out = serde_json::to_value(&profile).unwrap();
        assert_eq!(out["setupChecklist"][0], "VWAP reclaim");
        assert_eq!(out["color"], "#ff0");
    }
}
