//! Risk controls applied to decision-driven opens.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backtest::account::normalize_leverage;
use crate::backtest::decision::Decision;

/// Decimal places kept on computed order quantities.
const QUANTITY_DP: u32 = 8;

/// Strategy risk limits. Closes are never restricted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskControls {
    /// Maximum concurrently open positions.
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    /// Requested leverage is clamped to this.
    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,
    /// Cap on the fraction of equity committed as margin per open.
    #[serde(default = "default_max_position_fraction")]
    pub max_position_fraction: Decimal,
    /// Locked margin after the open, in percent of equity.
    #[serde(default = "default_max_margin_usage_pct")]
    pub max_margin_usage_pct: Decimal,
    /// Smallest notional worth opening.
    #[serde(default = "default_min_position_usd")]
    pub min_position_usd: Decimal,
    /// Opens below this confidence (0-100) are ignored.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: Decimal,
    /// Minimum take-profit / stop-loss distance ratio, checked when both are set.
    #[serde(default)]
    pub min_risk_reward: Option<Decimal>,
}

impl Default for RiskControls {
    fn default() -> Self {
        Self {
            max_positions: default_max_positions(),
            max_leverage: default_max_leverage(),
            max_position_fraction: default_max_position_fraction(),
            max_margin_usage_pct: default_max_margin_usage_pct(),
            min_position_usd: default_min_position_usd(),
            min_confidence: default_min_confidence(),
            min_risk_reward: None,
        }
    }
}

const fn default_max_positions() -> usize {
    3
}

const fn default_max_leverage() -> u32 {
    10
}

const fn default_max_position_fraction() -> Decimal {
    Decimal::from_parts(2, 0, 0, false, 1) // 0.2
}

const fn default_max_margin_usage_pct() -> Decimal {
    Decimal::from_parts(80, 0, 0, false, 0)
}

const fn default_min_position_usd() -> Decimal {
    Decimal::TEN
}

const fn default_min_confidence() -> Decimal {
    Decimal::from_parts(70, 0, 0, false, 0)
}

/// Why an open was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskRejection {
    /// Confidence under the threshold.
    #[error("confidence {confidence} below minimum {minimum}")]
    LowConfidence {
        /// Decision confidence.
        confidence: Decimal,
        /// Threshold.
        minimum: Decimal,
    },

    /// Reward/risk ratio under the threshold.
    #[error("risk/reward {ratio} below minimum {minimum}")]
    RiskReward {
        /// Take-profit / stop-loss.
        ratio: Decimal,
        /// Threshold.
        minimum: Decimal,
    },

    /// Opening a new position would exceed the position limit.
    #[error("max positions reached ({limit})")]
    MaxPositions {
        /// Limit.
        limit: usize,
    },

    /// No equity left to size from.
    #[error("no equity available")]
    NoEquity,

    /// Order too small.
    #[error("notional {notional} below minimum {minimum}")]
    BelowMinNotional {
        /// Computed notional.
        notional: Decimal,
        /// Threshold.
        minimum: Decimal,
    },

    /// Margin usage would exceed the cap.
    #[error("margin usage {usage_pct}% above limit {limit_pct}%")]
    MarginUsage {
        /// Usage after the open.
        usage_pct: Decimal,
        /// Cap.
        limit_pct: Decimal,
    },
}

/// Sizing defaults for decisions that omit leverage or size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizingDefaults {
    /// Leverage used when the decision has none.
    pub leverage: i64,
    /// Margin fraction of equity used when the decision has none.
    pub position_fraction: Decimal,
}

/// Account figures needed to size an open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountView {
    /// Mark price of the symbol.
    pub price: Decimal,
    /// Total equity.
    pub equity: Decimal,
    /// Margin already locked.
    pub total_margin: Decimal,
    /// Open positions.
    pub position_count: usize,
    /// Whether the open adds to an existing position.
    pub adds_to_existing: bool,
}

/// Sized open order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderPlan {
    /// Quantity to open.
    pub quantity: Decimal,
    /// Leverage after clamping.
    pub leverage: u32,
    /// Margin the plan was sized for.
    pub margin: Decimal,
    /// Notional the plan was sized for.
    pub notional: Decimal,
}

impl RiskControls {
    /// Size an open request or explain why it is refused.
    ///
    /// Margin is `equity * fraction`, notional is `margin * leverage`.
    /// Fractions above 1 are read as percentages.
    pub fn plan_open(
        &self,
        decision: &Decision,
        account: &AccountView,
        defaults: &SizingDefaults,
    ) -> Result<OrderPlan, RiskRejection> {
        if decision.confidence < self.min_confidence {
            return Err(RiskRejection::LowConfidence {
                confidence: decision.confidence,
                minimum: self.min_confidence,
            });
        }

        if let (Some(minimum), Some(stop), Some(target)) = (
            self.min_risk_reward,
            decision.stop_loss_pct.filter(|p| *p > Decimal::ZERO),
            decision.take_profit_pct.filter(|p| *p > Decimal::ZERO),
        ) {
            let ratio = target / stop;
            if ratio < minimum {
                return Err(RiskRejection::RiskReward { ratio, minimum });
            }
        }

        if !account.adds_to_existing && account.position_count >= self.max_positions {
            return Err(RiskRejection::MaxPositions {
                limit: self.max_positions,
            });
        }

        if account.equity <= Decimal::ZERO || account.price <= Decimal::ZERO {
            return Err(RiskRejection::NoEquity);
        }

        let leverage = normalize_leverage(decision.leverage.unwrap_or(defaults.leverage))
            .min(self.max_leverage.max(1));

        let fraction = decision
            .position_fraction
            .filter(|f| *f > Decimal::ZERO)
            .map(|f| {
                if f > Decimal::ONE {
                    f / Decimal::ONE_HUNDRED
                } else {
                    f
                }
            })
            .unwrap_or(defaults.position_fraction)
            .min(self.max_position_fraction);

        let margin = account.equity * fraction;
        let notional = margin * Decimal::from(leverage);
        if notional < self.min_position_usd {
            return Err(RiskRejection::BelowMinNotional {
                notional,
                minimum: self.min_position_usd,
            });
        }

        let usage_pct = (account.total_margin + margin) / account.equity * Decimal::ONE_HUNDRED;
        if usage_pct > self.max_margin_usage_pct {
            return Err(RiskRejection::MarginUsage {
                usage_pct,
                limit_pct: self.max_margin_usage_pct,
            });
        }

        let quantity =
            (notional / account.price).round_dp_with_strategy(QUANTITY_DP, RoundingStrategy::ToZero);
        if quantity.is_zero() {
            return Err(RiskRejection::BelowMinNotional {
                notional,
                minimum: self.min_position_usd,
            });
        }

        Ok(OrderPlan {
            quantity,
            leverage,
            margin,
            notional,
        })
    }
}
