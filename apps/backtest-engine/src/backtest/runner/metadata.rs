//! Run lifecycle status and metadata.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ErrorReport;

/// Lifecycle of a run.
///
/// `Pending -> Running -> {Completed | Failed | Cancelled}`. A pending run
/// may also be cancelled directly. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, accepting klines.
    Pending,
    /// Simulation loop active.
    Running,
    /// Every tick processed.
    Completed,
    /// Aborted by a structural failure.
    Failed,
    /// Stopped by request.
    Cancelled,
}

impl RunStatus {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Lowercase label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether `next` is a legal successor.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (*self, next),
            (Self::Pending, Self::Running | Self::Cancelled | Self::Failed)
                | (
                    Self::Running,
                    Self::Completed | Self::Failed | Self::Cancelled
                )
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally visible state of a run. Always handed out as a copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Run identifier.
    pub run_id: String,
    /// Current status.
    pub status: RunStatus,
    /// Symbols being traded.
    pub symbols: Vec<String>,
    /// Registration time.
    pub created_at: DateTime<Utc>,
    /// Loop start time.
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal transition time.
    pub finished_at: Option<DateTime<Utc>>,
    /// Cycles completed.
    pub current_cycle: u64,
    /// Ticks on the simulation clock.
    pub total_cycles: u64,
    /// Equity after the last completed cycle.
    pub last_equity: Decimal,
    /// Failure reason, set when status is `Failed`.
    pub error: Option<ErrorReport>,
}

impl RunMetadata {
    /// Metadata for a freshly created run.
    #[must_use]
    pub fn new(run_id: &str, symbols: Vec<String>, initial_equity: Decimal) -> Self {
        Self {
            run_id: run_id.to_string(),
            status: RunStatus::Pending,
            symbols,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            current_cycle: 0,
            total_cycles: 0,
            last_equity: initial_equity,
            error: None,
        }
    }

    /// Completed share of the clock, 0-100.
    #[must_use]
    pub fn progress_pct(&self) -> Decimal {
        if self.total_cycles == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.current_cycle) / Decimal::from(self.total_cycles)
            * Decimal::ONE_HUNDRED
    }

    /// Apply a status transition, stamping times. Illegal transitions are ignored.
    pub fn transition(&mut self, next: RunStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        match next {
            RunStatus::Running => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => self.finished_at = Some(Utc::now()),
            _ => {}
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use test_case::test_case;

    use super::*;

    #[test_case(RunStatus::Pending, RunStatus::Running, true ; "pending to running")]
    #[test_case(RunStatus::Pending, RunStatus::Cancelled, true ; "pending to cancelled")]
    #[test_case(RunStatus::Running, RunStatus::Completed, true ; "running to completed")]
    #[test_case(RunStatus::Running, RunStatus::Pending, false ; "running to pending")]
    #[test_case(RunStatus::Completed, RunStatus::Running, false ; "completed is final")]
    #[test_case(RunStatus::Cancelled, RunStatus::Failed, false ; "cancelled is final")]
    fn test_transitions(from: RunStatus, to: RunStatus, allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn test_transition_stamps_times() {
        let mut meta = RunMetadata::new("bt_1", vec!["BTCUSDT".to_string()], dec!(1000));
        assert!(meta.started_at.is_none());

        assert!(meta.transition(RunStatus::Running));
        assert!(meta.started_at.is_some());
        assert!(meta.finished_at.is_none());

        assert!(meta.transition(RunStatus::Completed));
        assert!(meta.finished_at.is_some());

        assert!(!meta.transition(RunStatus::Failed));
        assert_eq!(meta.status, RunStatus::Completed);
    }

    #[test]
    fn test_progress() {
        let mut meta = RunMetadata::new("bt_1", Vec::new(), dec!(1000));
        assert_eq!(meta.progress_pct(), Decimal::ZERO);

        meta.total_cycles = 8;
        meta.current_cycle = 2;
        assert_eq!(meta.progress_pct(), dec!(25));
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }
}
