use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::errors::{EngineError, Result};
use crate::common::types::{normalize_address, SeasonId, TradeSide};

/// Step of a flow that sends a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    Approve,
    Submit,
}

/// Stage of a trade flow
///
/// Buys go `Created -> Approving -> Approved -> Submitting -> Confirmed`;
/// sells go straight from `Created` to `Submitting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlowStage {
    Created,
    Approving,
    Approved,
    Submitting,
    Confirmed,
    Failed { stage: FlowStep },
}

impl FlowStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowStage::Confirmed | FlowStage::Failed { .. })
    }

    /// Forward moves a flow may make
    pub fn can_advance_to(&self, next: FlowStage, kind: TradeSide) -> bool {
        use FlowStage::*;
        match (self, next) {
            (Confirmed, _) | (Failed { .. }, _) => false,
            (_, Failed { .. }) => true,
            (Created, Approving) | (Created, Approved) => kind == TradeSide::Buy,
            (Created, Submitting) => kind == TradeSide::Sell,
            (Approving, Approved) => true,
            (Approved, Submitting) => true,
            (Submitting, Confirmed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for FlowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowStage::Created => write!(f, "created"),
            FlowStage::Approving => write!(f, "approving"),
            FlowStage::Approved => write!(f, "approved"),
            FlowStage::Submitting => write!(f, "submitting"),
            FlowStage::Confirmed => write!(f, "confirmed"),
            FlowStage::Failed { stage } => write!(f, "failed ({:?})", stage),
        }
    }
}

/// A persisted approve-then-trade flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeFlow {
    pub id: Uuid,
    pub kind: TradeSide,
    pub season_id: SeasonId,
    pub curve: String,
    pub account: String,
    pub tickets: u64,
    /// Maximum total cost for a buy, minimum proceeds for a sell
    #[serde(with = "amount_string")]
    pub limit: u128,
    pub stage: FlowStage,
    #[serde(default)]
    pub approval_tx: Option<String>,
    #[serde(default)]
    pub action_tx: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TradeFlow {
    pub fn new(
        kind: TradeSide,
        season_id: SeasonId,
        curve: &str,
        account: &str,
        tickets: u64,
        limit: u128,
    ) -> Result<Self> {
        if tickets == 0 {
            return Err(EngineError::Validation("tickets must be positive".to_string()));
        }
        if kind == TradeSide::Buy && limit == 0 {
            return Err(EngineError::Validation("max cost must be positive".to_string()));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            kind,
            season_id,
            curve: normalize_address(curve),
            account: normalize_address(account),
            tickets,
            limit,
            stage: FlowStage::Created,
            approval_tx: None,
            action_tx: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Move to `next`, rejecting moves the state machine does not allow
    pub fn advance(&mut self, next: FlowStage) -> Result<()> {
        if !self.stage.can_advance_to(next, self.kind) {
            return Err(EngineError::Validation(format!(
                "flow {} cannot move from {} to {}",
                self.id, self.stage, next
            )));
        }
        self.stage = next;
        self.last_error = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn fail(&mut self, step: FlowStep, reason: impl Into<String>) {
        self.stage = FlowStage::Failed { stage: step };
        self.last_error = Some(reason.into());
        self.updated_at = Utc::now();
    }

    /// Record a recoverable error without leaving the current stage
    pub fn note_error(&mut self, reason: impl Into<String>) {
        self.last_error = Some(reason.into());
        self.updated_at = Utc::now();
    }

    /// Reset a failed flow to the stage before the step that failed
    ///
    /// The reverted transaction hash is cleared so the step is sent again.
    pub fn reset_for_retry(&mut self) -> Result<()> {
        let FlowStage::Failed { stage } = self.stage else {
            return Err(EngineError::Validation(format!(
                "flow {} is {}, only failed flows can be retried",
                self.id, self.stage
            )));
        };
        self.stage = match (stage, self.kind) {
            (FlowStep::Approve, _) => {
                self.approval_tx = None;
                FlowStage::Created
            }
            (FlowStep::Submit, TradeSide::Buy) => {
                self.action_tx = None;
                FlowStage::Approved
            }
            (FlowStep::Submit, TradeSide::Sell) => {
                self.action_tx = None;
                FlowStage::Created
            }
        };
        self.last_error = None;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Serialize `u128` amounts as decimal strings
mod amount_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy() -> TradeFlow {
        TradeFlow::new(TradeSide::Buy, 1, "0xCurve", "0xMe", 10, 1_000).unwrap()
    }

    #[test]
    fn test_new_flow_validation() {
        assert!(TradeFlow::new(TradeSide::Buy, 1, "0xc", "0xa", 0, 10).is_err());
        assert!(TradeFlow::new(TradeSide::Buy, 1, "0xc", "0xa", 5, 0).is_err());
        let sell = TradeFlow::new(TradeSide::Sell, 1, "0xc", "0xa", 5, 0).unwrap();
        assert_eq!(sell.stage, FlowStage::Created);
    }

    #[test]
    fn test_buy_path() {
        let mut flow = buy();
        assert_eq!(flow.curve, "0xcurve");
        flow.advance(FlowStage::Approving).unwrap();
        flow.advance(FlowStage::Approved).unwrap();
        flow.advance(FlowStage::Submitting).unwrap();
        flow.advance(FlowStage::Confirmed).unwrap();
        assert!(flow.is_terminal());
        assert!(flow.advance(FlowStage::Submitting).is_err());
    }

    #[test]
    fn test_sell_skips_approval() {
        let mut flow = TradeFlow::new(TradeSide::Sell, 1, "0xc", "0xa", 5, 0).unwrap();
        assert!(flow.advance(FlowStage::Approving).is_err());
        flow.advance(FlowStage::Submitting).unwrap();
    }

    #[test]
    fn test_retry_resets_to_step_before_failure() {
        let mut flow = buy();
        flow.advance(FlowStage::Approved).unwrap();
        flow.advance(FlowStage::Submitting).unwrap();
        flow.action_tx = Some("0xdead".to_string());
        flow.fail(FlowStep::Submit, "reverted");

        flow.reset_for_retry().unwrap();
        assert_eq!(flow.stage, FlowStage::Approved);
        assert!(flow.action_tx.is_none());
        assert!(flow.last_error.is_none());

        assert!(flow.reset_for_retry().is_err());
    }

    #[test]
    fn test_json_shape() {
        let mut flow = buy();
        flow.limit = u128::MAX;
        flow.fail(FlowStep::Approve, "reverted");

        let json = serde_json::to_value(&flow).unwrap();
        assert_eq!(json["kind"], "buy");
        assert_eq!(json["stage"]["status"], "failed");
        assert_eq!(json["stage"]["stage"], "approve");
        assert_eq!(json["limit"], u128::MAX.to_string());

        let back: TradeFlow = serde_json::from_value(json).unwrap();
        assert_eq!(back, flow);
    }
}
