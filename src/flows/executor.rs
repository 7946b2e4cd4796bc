//! Sequential approve-then-trade execution with resumable state

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::store::FlowStore;
use super::types::{FlowStage, FlowStep, TradeFlow};
use crate::common::errors::{EngineError, Result};
use crate::common::traits::ChainGateway;
use crate::common::types::{SeasonId, TradeSide};
use crate::config::types::FlowConfig;
use crate::curve::{apply_slippage, TradeQuote};

/// Confirmation wait settings
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub confirmation_timeout: Duration,
    pub receipt_poll: Duration,
}

impl From<&FlowConfig> for ExecutorConfig {
    fn from(config: &FlowConfig) -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(config.confirmation_timeout_seconds),
            receipt_poll: Duration::from_millis(config.receipt_poll_ms),
        }
    }
}

/// Price limit for a quoted trade after slippage
///
/// Buys get an upper bound on total cost, sells a lower bound on proceeds.
pub fn limit_for_quote(quote: &TradeQuote, slippage_bps: u32) -> Result<u128> {
    apply_slippage(quote.total, slippage_bps, quote.side)
}

/// Drives trade flows through their stages
///
/// Every transition is persisted before the next step starts. Running a flow
/// again resumes it: a sufficient on-chain allowance is not re-approved and a
/// recorded transaction is awaited instead of re-sent. Failed flows only move
/// again through [`FlowExecutor::retry`].
pub struct FlowExecutor<G: ChainGateway + ?Sized, S: FlowStore + ?Sized> {
    gateway: Arc<G>,
    store: Arc<S>,
    config: ExecutorConfig,
}

impl<G: ChainGateway + ?Sized, S: FlowStore + ?Sized> FlowExecutor<G, S> {
    pub fn new(gateway: Arc<G>, store: Arc<S>, config: ExecutorConfig) -> Self {
        Self {
            gateway,
            store,
            config,
        }
    }

    /// Create and persist a flow without running it
    pub async fn create(
        &self,
        kind: TradeSide,
        season_id: SeasonId,
        curve: &str,
        account: &str,
        tickets: u64,
        limit: u128,
    ) -> Result<TradeFlow> {
        let flow = TradeFlow::new(kind, season_id, curve, account, tickets, limit)?;
        self.store.save(&flow).await?;
        info!(flow = %flow.id, kind = ?kind, tickets, "Trade flow created");
        Ok(flow)
    }

    pub async fn load(&self, id: Uuid) -> Result<TradeFlow> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| EngineError::Validation(format!("unknown flow {}", id)))
    }

    /// Run a flow from its persisted stage until it is confirmed or failed
    ///
    /// Transport errors and confirmation timeouts leave the flow in its
    /// current stage and are returned; calling `run` again picks up there.
    #[instrument(skip(self))]
    pub async fn run(&self, id: Uuid) -> Result<TradeFlow> {
        let mut flow = self.load(id).await?;

        while !flow.is_terminal() {
            if let Err(e) = self.step(&mut flow).await {
                warn!(flow = %flow.id, stage = %flow.stage, "Flow step failed: {}", e);
                flow.note_error(e.to_string());
                self.store.save(&flow).await?;
                return Err(e);
            }
        }

        info!(flow = %flow.id, stage = %flow.stage, "Flow finished");
        Ok(flow)
    }

    /// Reset a failed flow to the step that failed and run it again
    #[instrument(skip(self))]
    pub async fn retry(&self, id: Uuid) -> Result<TradeFlow> {
        let mut flow = self.load(id).await?;
        flow.reset_for_retry()?;
        self.store.save(&flow).await?;
        info!(flow = %flow.id, stage = %flow.stage, "Retrying flow");
        self.run(id).await
    }

    pub async fn list(&self) -> Result<Vec<TradeFlow>> {
        self.store.list().await
    }

    /// Perform one transition and persist it
    async fn step(&self, flow: &mut TradeFlow) -> Result<()> {
        match flow.stage {
            FlowStage::Created => match flow.kind {
                TradeSide::Buy => {
                    let next = if self.allowance_covers(flow).await? {
                        FlowStage::Approved
                    } else {
                        FlowStage::Approving
                    };
                    self.advance(flow, next).await
                }
                TradeSide::Sell => self.advance(flow, FlowStage::Submitting).await,
            },
            FlowStage::Approving => {
                let tx = match flow.approval_tx.clone() {
                    Some(tx) => tx,
                    None => {
                        // a crash between entering this stage and sending leaves no hash
                        if self.allowance_covers(flow).await? {
                            return self.advance(flow, FlowStage::Approved).await;
                        }
                        let tx = self.gateway.approve(&flow.curve, flow.limit).await?;
                        flow.approval_tx = Some(tx.clone());
                        self.store.save(flow).await?;
                        tx
                    }
                };
                if self.await_confirmation(&tx).await? {
                    self.advance(flow, FlowStage::Approved).await
                } else {
                    self.mark_failed(flow, FlowStep::Approve, &tx).await
                }
            }
            FlowStage::Approved => self.advance(flow, FlowStage::Submitting).await,
            FlowStage::Submitting => {
                let tx = match flow.action_tx.clone() {
                    Some(tx) => tx,
                    None => {
                        let tx = match flow.kind {
                            TradeSide::Buy => {
                                self.gateway
                                    .buy_tickets(&flow.curve, flow.tickets, flow.limit)
                                    .await?
                            }
                            TradeSide::Sell => {
                                self.gateway
                                    .sell_tickets(&flow.curve, flow.tickets, flow.limit)
                                    .await?
                            }
                        };
                        flow.action_tx = Some(tx.clone());
                        self.store.save(flow).await?;
                        tx
                    }
                };
                if self.await_confirmation(&tx).await? {
                    self.advance(flow, FlowStage::Confirmed).await
                } else {
                    self.mark_failed(flow, FlowStep::Submit, &tx).await
                }
            }
            FlowStage::Confirmed | FlowStage::Failed { .. } => Ok(()),
        }
    }

    async fn allowance_covers(&self, flow: &TradeFlow) -> Result<bool> {
        let allowance = self.gateway.allowance(&flow.account, &flow.curve).await?;
        debug!(flow = %flow.id, %allowance, needed = %flow.limit, "Allowance checked");
        Ok(allowance >= flow.limit)
    }

    async fn advance(&self, flow: &mut TradeFlow, next: FlowStage) -> Result<()> {
        flow.advance(next)?;
        self.store.save(flow).await?;
        debug!(flow = %flow.id, stage = %flow.stage, "Flow advanced");
        Ok(())
    }

    async fn mark_failed(&self, flow: &mut TradeFlow, step: FlowStep, tx: &str) -> Result<()> {
        warn!(flow = %flow.id, tx, ?step, "Transaction reverted");
        flow.fail(step, format!("transaction {} reverted", tx));
        self.store.save(flow).await
    }

    /// Poll for a receipt; `Ok(false)` when the transaction reverted
    async fn await_confirmation(&self, tx: &str) -> Result<bool> {
        let poll = async {
            loop {
                match self.gateway.receipt(tx).await? {
                    Some(receipt) => return Ok::<bool, EngineError>(receipt.success),
                    None => sleep(self.config.receipt_poll).await,
                }
            }
        };
        timeout(self.config.confirmation_timeout, poll)
            .await
            .map_err(|_| {
                EngineError::Timeout(format!(
                    "transaction {} not mined within {:?}",
                    tx, self.config.confirmation_timeout
                ))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::traits::MockChainGateway;
    use crate::common::types::TxReceipt;
    use crate::flows::store::InMemoryFlowStore;
    use mockall::Sequence;

    fn config() -> ExecutorConfig {
        ExecutorConfig {
            confirmation_timeout: Duration::from_millis(200),
            receipt_poll: Duration::from_millis(5),
        }
    }

    fn receipt(tx: &str, success: bool) -> Option<TxReceipt> {
        Some(TxReceipt {
            tx_hash: tx.to_string(),
            success,
            block_number: Some(1),
        })
    }

    fn executor(
        gateway: MockChainGateway,
    ) -> (FlowExecutor<MockChainGateway, InMemoryFlowStore>, Arc<InMemoryFlowStore>) {
        let store = Arc::new(InMemoryFlowStore::new());
        (
            FlowExecutor::new(Arc::new(gateway), store.clone(), config()),
            store,
        )
    }

    #[test]
    fn test_limit_for_quote() {
        let buy = TradeQuote {
            side: TradeSide::Buy,
            tickets: 1,
            base: 10_000,
            fee: 0,
            total: 10_000,
        };
        assert_eq!(limit_for_quote(&buy, 100).unwrap(), 10_100);

        let sell = TradeQuote {
            side: TradeSide::Sell,
            ..buy
        };
        assert_eq!(limit_for_quote(&sell, 100).unwrap(), 9_900);
    }

    #[tokio::test]
    async fn test_buy_with_approval() {
        let mut gateway = MockChainGateway::new();
        let mut seq = Sequence::new();
        gateway
            .expect_allowance()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(0));
        gateway
            .expect_approve()
            .withf(|spender, amount| spender == "0xcurve" && *amount == 1_000)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("0xapprove".to_string()));
        gateway
            .expect_receipt()
            .withf(|tx| tx == "0xapprove")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|tx| Ok(receipt(tx, true)));
        gateway
            .expect_buy_tickets()
            .withf(|curve, tickets, max_cost| {
                curve == "0xcurve" && *tickets == 10 && *max_cost == 1_000
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok("0xbuy".to_string()));
        gateway
            .expect_receipt()
            .withf(|tx| tx == "0xbuy")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|tx| Ok(receipt(tx, true)));
        let (exec, store) = executor(gateway);

        let flow = exec
            .create(TradeSide::Buy, 1, "0xCurve", "0xMe", 10, 1_000)
            .await
            .unwrap();
        let done = exec.run(flow.id).await.unwrap();

        assert_eq!(done.stage, FlowStage::Confirmed);
        assert_eq!(done.approval_tx.as_deref(), Some("0xapprove"));
        assert_eq!(done.action_tx.as_deref(), Some("0xbuy"));
        assert_eq!(store.load(flow.id).await.unwrap(), Some(done));
    }

    #[tokio::test]
    async fn test_sufficient_allowance_skips_approve() {
        let mut gateway = MockChainGateway::new();
        gateway.expect_allowance().returning(|_, _| Ok(5_000));
        gateway.expect_approve().never();
        gateway
            .expect_buy_tickets()
            .returning(|_, _, _| Ok("0xbuy".to_string()));
        gateway.expect_receipt().returning(|tx| Ok(receipt(tx, true)));
        let (exec, _) = executor(gateway);

        let flow = exec
            .create(TradeSide::Buy, 1, "0xcurve", "0xme", 10, 1_000)
            .await
            .unwrap();
        let done = exec.run(flow.id).await.unwrap();
        assert_eq!(done.stage, FlowStage::Confirmed);
        assert!(done.approval_tx.is_none());
    }

    #[tokio::test]
    async fn test_sell_never_touches_allowance() {
        let mut gateway = MockChainGateway::new();
        gateway.expect_allowance().never();
        gateway
            .expect_sell_tickets()
            .withf(|curve, tickets, min| curve == "0xcurve" && *tickets == 4 && *min == 900)
            .returning(|_, _, _| Ok("0xsell".to_string()));
        gateway.expect_receipt().returning(|tx| Ok(receipt(tx, true)));
        let (exec, _) = executor(gateway);

        let flow = exec
            .create(TradeSide::Sell, 1, "0xcurve", "0xme", 4, 900)
            .await
            .unwrap();
        assert_eq!(exec.run(flow.id).await.unwrap().stage, FlowStage::Confirmed);
    }

    #[tokio::test]
    async fn test_recorded_tx_is_awaited_not_resent() {
        let mut gateway = MockChainGateway::new();
        gateway.expect_buy_tickets().never();
        gateway
            .expect_receipt()
            .withf(|tx| tx == "0xpending")
            .returning(|tx| Ok(receipt(tx, true)));
        let (exec, store) = executor(gateway);

        let mut flow = TradeFlow::new(TradeSide::Buy, 1, "0xcurve", "0xme", 10, 1_000).unwrap();
        flow.advance(FlowStage::Approved).unwrap();
        flow.advance(FlowStage::Submitting).unwrap();
        flow.action_tx = Some("0xpending".to_string());
        store.save(&flow).await.unwrap();

        let done = exec.run(flow.id).await.unwrap();
        assert_eq!(done.stage, FlowStage::Confirmed);
    }

    #[tokio::test]
    async fn test_revert_fails_and_retry_resubmits() {
        let mut gateway = MockChainGateway::new();
        let mut seq = Sequence::new();
        gateway
            .expect_sell_tickets()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok("0xfirst".to_string()));
        gateway
            .expect_receipt()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|tx| Ok(receipt(tx, false)));
        gateway
            .expect_sell_tickets()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok("0xsecond".to_string()));
        gateway
            .expect_receipt()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|tx| Ok(receipt(tx, true)));
        let (exec, _) = executor(gateway);

        let flow = exec
            .create(TradeSide::Sell, 1, "0xcurve", "0xme", 4, 900)
            .await
            .unwrap();

        let failed = exec.run(flow.id).await.unwrap();
        assert_eq!(
            failed.stage,
            FlowStage::Failed {
                stage: FlowStep::Submit
            }
        );
        assert!(failed.last_error.unwrap().contains("0xfirst"));

        // running a failed flow is a no-op
        assert_eq!(exec.run(flow.id).await.unwrap().action_tx.as_deref(), Some("0xfirst"));

        let done = exec.retry(flow.id).await.unwrap();
        assert_eq!(done.stage, FlowStage::Confirmed);
        assert_eq!(done.action_tx.as_deref(), Some("0xsecond"));
    }

    #[tokio::test]
    async fn test_timeout_keeps_stage_for_resume() {
        let mut gateway = MockChainGateway::new();
        gateway
            .expect_sell_tickets()
            .times(1)
            .returning(|_, _, _| Ok("0xslow".to_string()));
        gateway.expect_receipt().returning(|_| Ok(None));
        let (exec, store) = executor(gateway);

        let flow = exec
            .create(TradeSide::Sell, 1, "0xcurve", "0xme", 4, 900)
            .await
            .unwrap();
        let err = exec.run(flow.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)));

        let saved = store.load(flow.id).await.unwrap().unwrap();
        assert_eq!(saved.stage, FlowStage::Submitting);
        assert_eq!(saved.action_tx.as_deref(), Some("0xslow"));
        assert!(saved.last_error.is_some());
    }

    #[tokio::test]
    async fn test_retry_requires_failed_flow() {
        let (exec, _) = executor(MockChainGateway::new());
        let flow = exec
            .create(TradeSide::Sell, 1, "0xcurve", "0xme", 4, 900)
            .await
            .unwrap();
        assert!(matches!(
            exec.retry(flow.id).await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            exec.run(Uuid::new_v4()).await,
            Err(EngineError::Validation(_))
        ));
    }
}
