//! Trading decisions consumed by the runner.
//!
//! Decisions arrive as JSON from an external source, often wrapped in prose
//! or a fenced code block. [`parse_decisions`] extracts the JSON payload and
//! accepts a single object, an array, or an object with a `decisions` array.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use super::account::Position;
use super::types::{Kline, Side, TimestampMs};

/// Action requested by a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DecisionAction {
    /// Open or add to a long position.
    OpenLong,
    /// Open or add to a short position.
    OpenShort,
    /// Close the long position.
    CloseLong,
    /// Close the short position.
    CloseShort,
    /// Close whichever side is held.
    Close,
    /// Do nothing.
    Hold,
}

impl DecisionAction {
    /// Canonical label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenLong => "open_long",
            Self::OpenShort => "open_short",
            Self::CloseLong => "close_long",
            Self::CloseShort => "close_short",
            Self::Close => "close",
            Self::Hold => "hold",
        }
    }

    /// Side opened by this action.
    #[must_use]
    pub const fn open_side(&self) -> Option<Side> {
        match self {
            Self::OpenLong => Some(Side::Long),
            Self::OpenShort => Some(Side::Short),
            _ => None,
        }
    }

    /// Whether this action opens exposure.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open_side().is_some()
    }
}

impl fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionAction {
    type Err = DecisionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "long" | "open_long" => Ok(Self::OpenLong),
            "sell" | "short" | "open_short" => Ok(Self::OpenShort),
            "close_long" => Ok(Self::CloseLong),
            "close_short" => Ok(Self::CloseShort),
            "close" => Ok(Self::Close),
            "hold" | "wait" | "" => Ok(Self::Hold),
            other => Err(DecisionParseError::UnknownAction {
                action: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for DecisionAction {
    type Error = DecisionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DecisionAction> for String {
    fn from(action: DecisionAction) -> Self {
        action.as_str().to_string()
    }
}

/// One trading decision for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Target symbol. Empty means the symbol the source was asked about.
    #[serde(default)]
    pub symbol: String,
    /// Requested action.
    pub action: DecisionAction,
    /// Confidence, 0-100. Missing means 0.
    #[serde(default)]
    pub confidence: Decimal,
    /// Requested leverage. Fractional values such as `5.0` are truncated.
    #[serde(default, deserialize_with = "deserialize_leverage")]
    pub leverage: Option<i64>,
    /// Fraction of equity to commit as margin.
    #[serde(default, alias = "position_size")]
    pub position_fraction: Option<Decimal>,
    /// Stop-loss distance in percent of entry.
    #[serde(default)]
    pub stop_loss_pct: Option<Decimal>,
    /// Take-profit distance in percent of entry.
    #[serde(default)]
    pub take_profit_pct: Option<Decimal>,
    /// Free-text rationale.
    #[serde(default)]
    pub reasoning: String,
}

impl Decision {
    /// Decision with only symbol and action set.
    #[must_use]
    pub fn new(symbol: &str, action: DecisionAction) -> Self {
        Self {
            symbol: symbol.to_string(),
            action,
            confidence: Decimal::ZERO,
            leverage: None,
            position_fraction: None,
            stop_loss_pct: None,
            take_profit_pct: None,
            reasoning: String::new(),
        }
    }

    /// Set confidence.
    #[must_use]
    pub const fn with_confidence(mut self, confidence: Decimal) -> Self {
        self.confidence = confidence;
        self
    }

    /// Set leverage.
    #[must_use]
    pub const fn with_leverage(mut self, leverage: i64) -> Self {
        self.leverage = Some(leverage);
        self
    }

    /// Set the margin fraction of equity.
    #[must_use]
    pub const fn with_position_fraction(mut self, fraction: Decimal) -> Self {
        self.position_fraction = Some(fraction);
        self
    }

    /// Set stop-loss and take-profit percentages.
    #[must_use]
    pub const fn with_protection(
        mut self,
        stop_loss_pct: Option<Decimal>,
        take_profit_pct: Option<Decimal>,
    ) -> Self {
        self.stop_loss_pct = stop_loss_pct;
        self.take_profit_pct = take_profit_pct;
        self
    }
}

fn deserialize_leverage<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(value) = Option::<Decimal>::deserialize(deserializer)? else {
        return Ok(None);
    };
    value
        .trunc()
        .to_i64()
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("leverage out of range: {value}")))
}

/// Market state handed to the decision source each cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Simulated time.
    pub timestamp: TimestampMs,
    /// Cycle index.
    pub cycle: u64,
    /// Recent candles per symbol, oldest first.
    pub klines: BTreeMap<String, Vec<Kline>>,
    /// Open positions.
    pub positions: Vec<Position>,
    /// Total equity.
    pub equity: Decimal,
    /// Free cash.
    pub cash: Decimal,
}

impl MarketSnapshot {
    /// Close of the most recent candle for `symbol`.
    #[must_use]
    pub fn latest_close(&self, symbol: &str) -> Option<Decimal> {
        self.klines.get(symbol)?.last().map(|k| k.close)
    }
}

/// Failure to interpret a decision payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecisionParseError {
    /// No JSON object or array found.
    #[error("no JSON payload found in response")]
    NoPayload,

    /// JSON did not match the decision shape.
    #[error("malformed decision payload: {message}")]
    Malformed {
        /// Parser message.
        message: String,
    },

    /// Unrecognized action label.
    #[error("unknown decision action: {action}")]
    UnknownAction {
        /// Rejected label.
        action: String,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    Many(Vec<Decision>),
    Wrapped { decisions: Vec<Decision> },
    One(Decision),
}

/// Extract decisions from a raw response.
///
/// The payload spans from the first `{` or `[` to the matching last closing
/// bracket, so surrounding prose and code fences are ignored. Symbols are
/// upper-cased.
pub fn parse_decisions(text: &str) -> Result<Vec<Decision>, DecisionParseError> {
    let json = extract_json(text).ok_or(DecisionParseError::NoPayload)?;
    let payload: Payload =
        serde_json::from_str(json).map_err(|e| DecisionParseError::Malformed {
            message: e.to_string(),
        })?;

    let mut decisions = match payload {
        Payload::Many(list) | Payload::Wrapped { decisions: list } => list,
        Payload::One(decision) => vec![decision],
    };
    for decision in &mut decisions {
        decision.symbol = decision.symbol.trim().to_uppercase();
    }
    Ok(decisions)
}

fn extract_json(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('[') { ']' } else { '}' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use test_case::test_case;

    use super::*;

    #[test_case("BUY", DecisionAction::OpenLong ; "buy")]
    #[test_case("open_long", DecisionAction::OpenLong ; "open long")]
    #[test_case("Sell", DecisionAction::OpenShort ; "sell")]
    #[test_case("open_short", DecisionAction::OpenShort ; "open short")]
    #[test_case("close_long", DecisionAction::CloseLong ; "close long")]
    #[test_case("CLOSE_SHORT", DecisionAction::CloseShort ; "close short")]
    #[test_case("close", DecisionAction::Close ; "close")]
    #[test_case(" hold ", DecisionAction::Hold ; "hold")]
    #[test_case("wait", DecisionAction::Hold ; "wait")]
    fn test_action_parsing(label: &str, expected: DecisionAction) {
        assert_eq!(label.parse::<DecisionAction>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_action() {
        let err = "moon".parse::<DecisionAction>().unwrap_err();
        assert_eq!(
            err,
            DecisionParseError::UnknownAction {
                action: "moon".to_string()
            }
        );
    }

    #[test]
    fn test_parse_single_object_in_markdown() {
        let text = r#"Analysis done.
```json
{"symbol": "btcusdt", "action": "BUY", "confidence": 82, "leverage": 5,
 "position_fraction": 0.1, "stop_loss_pct": 2, "take_profit_pct": 6,
 "reasoning": "breakout"}
```
"#;
        let decisions = parse_decisions(text).unwrap();
        assert_eq!(decisions.len(), 1);
        let decision = &decisions[0];
        assert_eq!(decision.symbol, "BTCUSDT");
        assert_eq!(decision.action, DecisionAction::OpenLong);
        assert_eq!(decision.confidence, dec!(82));
        assert_eq!(decision.leverage, Some(5));
        assert_eq!(decision.position_fraction, Some(dec!(0.1)));
        assert_eq!(decision.stop_loss_pct, Some(dec!(2)));
        assert_eq!(decision.take_profit_pct, Some(dec!(6)));
        assert_eq!(decision.reasoning, "breakout");
    }

    #[test]
    fn test_parse_array_and_wrapper() {
        let array = r#"[{"symbol":"ETHUSDT","action":"close"},{"symbol":"BTCUSDT","action":"hold"}]"#;
        let decisions = parse_decisions(array).unwrap();
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].action, DecisionAction::Close);
        assert_eq!(decisions[0].confidence, Decimal::ZERO);

        let wrapped = r#"{"decisions":[{"symbol":"SOLUSDT","action":"open_short"}]}"#;
        let decisions = parse_decisions(wrapped).unwrap();
        assert_eq!(decisions[0].action, DecisionAction::OpenShort);
    }

    #[test]
    fn test_parse_failures() {
        assert_eq!(
            parse_decisions("no json here"),
            Err(DecisionParseError::NoPayload)
        );
        assert!(matches!(
            parse_decisions(r#"{"symbol": "BTCUSDT", "action": "teleport"}"#),
            Err(DecisionParseError::Malformed { .. })
        ));
        assert!(matches!(
            parse_decisions("{ not json }"),
            Err(DecisionParseError::Malformed { .. })
        ));
    }

    #[test]
    fn test_fractional_leverage_is_truncated() {
        let text = r#"[{"symbol":"BTCUSDT","action":"buy","leverage":5.0},
                       {"symbol":"ETHUSDT","action":"sell","leverage":"3.7"},
                       {"symbol":"SOLUSDT","action":"buy","leverage":null}]"#;
        let decisions = parse_decisions(text).unwrap();
        assert_eq!(decisions[0].leverage, Some(5));
        assert_eq!(decisions[1].leverage, Some(3));
        assert_eq!(decisions[2].leverage, None);
    }

    #[test]
    fn test_snapshot_latest_close() {
        let snapshot = MarketSnapshot {
            timestamp: 2,
            cycle: 1,
            klines: BTreeMap::from([(
                "BTCUSDT".to_string(),
                vec![Kline::flat(1, dec!(100)), Kline::flat(2, dec!(101))],
            )]),
            positions: Vec::new(),
            equity: dec!(1000),
            cash: dec!(1000),
        };
        assert_eq!(snapshot.latest_close("BTCUSDT"), Some(dec!(101)));
        assert_eq!(snapshot.latest_close("ETHUSDT"), None);
    }
}
