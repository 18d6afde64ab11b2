//! 借贷编排引擎
//!
//! 一次尝试的完整闭环: 防护入口检查 -> 请求校验 -> 开会话 ->
//! 账本检查点 -> 借贷放款回调 -> 两腿顺序 swap -> 结算分润 ->
//! commit; 任何致命条件回滚到检查点, 会话无条件清除。
//! 尝试内部严格串行, 不可重入, 只有单一特权调用方可以发起。

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use ethers::types::{Address, H256, U256};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

use models::{ArbitrageRequest, AuditEvent, AuditSink, SessionState};
use services::GasOracle;
use utils::swap_deadline;

use crate::errors::EngineError;
use crate::guardrails::GuardrailController;
use crate::lending::{LendingFacility, LoanReceiver};
use crate::session::SessionTable;
use crate::settlement::{SettlementEngine, SettlementReport};
use dex::{AssetLedger, SwapRouter};

/// 配置项到路由兜底策略的映射
pub fn quote_fallback_policy(cfg: config_crate::QuoteFallback) -> dex::QuoteFallbackPolicy {
    match cfg {
        config_crate::QuoteFallback::AnyNonZero => dex::QuoteFallbackPolicy::AnyNonZero,
        config_crate::QuoteFallback::OracleFloor => dex::QuoteFallbackPolicy::OracleFloor,
    }
}

/// 引擎接线
pub struct EngineWiring {
    /// 特权调用方即利润归集方
    pub owner: Address,
    /// 引擎资产账户
    pub account: Address,
    pub guardrails: Arc<GuardrailController>,
    pub router: Arc<SwapRouter>,
    pub ledger: Arc<dyn AssetLedger>,
    pub lender: Arc<dyn LendingFacility>,
    pub gas_oracle: Arc<dyn GasOracle>,
    pub settlement: SettlementEngine,
    pub audit: Arc<dyn AuditSink>,
    pub swap_deadline_secs: u64,
}

pub struct ArbEngine {
    owner: Address,
    account: Address,
    guardrails: Arc<GuardrailController>,
    sessions: SessionTable,
    router: Arc<SwapRouter>,
    ledger: Arc<dyn AssetLedger>,
    lender: Arc<dyn LendingFacility>,
    gas_oracle: Arc<dyn GasOracle>,
    settlement: SettlementEngine,
    audit: Arc<dyn AuditSink>,
    swap_deadline_secs: u64,
    /// 不可重入保护: 同一引擎同一时刻至多一次在途尝试
    in_flight: AsyncMutex<()>,
    /// 回调里捕获的终态, 让发起侧拿到精确的领域错误而非笼统包装
    callback_outcome: Mutex<Option<Result<SettlementReport, EngineError>>>,
}

impl ArbEngine {
    pub fn new(wiring: EngineWiring) -> Self {
        Self {
            owner: wiring.owner,
            account: wiring.account,
            guardrails: wiring.guardrails,
            sessions: SessionTable::new(),
            router: wiring.router,
            ledger: wiring.ledger,
            lender: wiring.lender,
            gas_oracle: wiring.gas_oracle,
            settlement: wiring.settlement,
            audit: wiring.audit,
            swap_deadline_secs: wiring.swap_deadline_secs,
            in_flight: AsyncMutex::new(()),
            callback_outcome: Mutex::new(None),
        }
    }

    pub fn guardrails(&self) -> &GuardrailController {
        &self.guardrails
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// 发起一次套利尝试
    ///
    /// 整个调用是一个显式事务: 放款前打检查点, 致命条件回滚,
    /// 只有分润落账后 commit。会话在每条路径上都被清除。
    pub async fn execute_arbitrage(
        &self,
        caller: Address,
        request: ArbitrageRequest,
    ) -> Result<SettlementReport, EngineError> {
        if caller != self.owner {
            return Err(EngineError::Unauthorized { caller });
        }
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| EngineError::AttemptInFlight)?;

        // 防护检查无副作用, 先于一切外部调用; 熔断短路掉 gas 查询
        if !self.guardrails.is_active() {
            return Err(EngineError::EnginePaused);
        }
        let gas_price = self
            .gas_oracle
            .gas_price()
            .await
            .map_err(EngineError::GasPriceUnavailable)?;
        self.guardrails.check_entry(gas_price)?;

        if !request.pair_is_valid() {
            return Err(EngineError::InvalidTokenPair {
                token_borrow: request.token_borrow,
                token_target: request.token_target,
            });
        }

        let deadline = swap_deadline(self.swap_deadline_secs);
        let session = self.sessions.open(caller, request.clone(), deadline)?;
        info!(
            target: "arbitrage_execution",
            "开始套利尝试: session={:?} borrow={:?} target={:?} amount={} direction={}",
            session.id, request.token_borrow, request.token_target, request.amount,
            request.direction.as_str()
        );

        let checkpoint = match self.ledger.checkpoint().await {
            Ok(cp) => cp,
            Err(e) => {
                self.sessions.clear(session.id);
                return Err(EngineError::LedgerFailure(e));
            }
        };
        self.callback_outcome.lock().take();

        let borrow_result = self
            .lender
            .borrow_and_callback(
                self,
                &[request.token_borrow],
                &[request.amount],
                session.id.as_bytes(),
            )
            .await;
        let outcome = self.callback_outcome.lock().take();

        // 回调记录的领域错误优先于借贷方的笼统失败
        let attempt: Result<SettlementReport, EngineError> = match (borrow_result, outcome) {
            (Ok(()), Some(Ok(report))) => Ok(report),
            (_, Some(Err(e))) => Err(e),
            // 结算成功但借贷方仍报失败 (如还款核验未过), 以借贷方为准
            (Err(e), Some(Ok(_))) | (Err(e), None) => Err(EngineError::FlashLoanFailed(e)),
            (Ok(()), None) => Err(EngineError::FlashLoanFailed(anyhow!(
                "lending facility returned without invoking the callback"
            ))),
        };

        let result = match attempt {
            Ok(report) => match self.ledger.commit(checkpoint).await {
                Ok(()) => {
                    self.sessions.mark(session.id, SessionState::Settled);
                    info!(
                        target: "arbitrage_execution",
                        "尝试成功: session={:?} 净利 {}", session.id, report.net_profit
                    );
                    Ok(report)
                }
                Err(e) => {
                    self.sessions.mark(session.id, SessionState::Aborted);
                    Err(EngineError::LedgerFailure(e))
                }
            },
            Err(e) => {
                if let Err(rollback_err) = self.ledger.rollback(checkpoint).await {
                    error!("回滚失败, 账本可能不一致: {rollback_err:?}");
                }
                self.sessions.mark(session.id, SessionState::Aborted);
                warn!(
                    target: "arbitrage_execution",
                    "尝试中止: session={:?} 原因: {e}", session.id
                );
                self.audit.record(AuditEvent::ArbitrageFailed {
                    token_borrow: request.token_borrow,
                    token_target: request.token_target,
                    amount: request.amount,
                    reason: e.to_string(),
                });
                Err(e)
            }
        };

        self.sessions.clear(session.id);
        result
    }

    /// 紧急资产回收 - owner 专用, 在途尝试期间拒绝
    pub async fn recover_assets(
        &self,
        caller: Address,
        token: Address,
        to: Address,
    ) -> Result<U256, EngineError> {
        if caller != self.owner {
            return Err(EngineError::Unauthorized { caller });
        }
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| EngineError::AttemptInFlight)?;

        let balance = self
            .ledger
            .balance_of(token, self.account)
            .await
            .map_err(EngineError::LedgerFailure)?;
        if !balance.is_zero() {
            self.ledger
                .transfer(token, self.account, to, balance)
                .await
                .map_err(EngineError::LedgerFailure)?;
        }
        warn!("紧急回收: token={token:?} amount={balance} to={to:?}");
        Ok(balance)
    }

    /// 回调主体: 校验 -> 两腿严格顺序执行 -> 结算
    async fn run_loan_callback(
        &self,
        caller: Address,
        tokens: &[Address],
        amounts: &[U256],
        fees: &[U256],
        payload: &[u8],
    ) -> Result<SettlementReport, EngineError> {
        if caller != self.lender.account() {
            return Err(EngineError::Unauthorized { caller });
        }
        if payload.len() != 32 {
            return Err(EngineError::InvalidCallback {
                session_id: H256::zero(),
            });
        }
        let session_id = H256::from_slice(payload);
        let session = self.sessions.validate_callback(session_id, Utc::now())?;
        let request = &session.request;

        // 放款内容必须与会话一致
        if tokens.len() != 1
            || amounts.len() != 1
            || fees.len() != 1
            || tokens[0] != request.token_borrow
            || amounts[0] != request.amount
        {
            return Err(EngineError::InvalidCallback { session_id });
        }
        let principal = amounts[0];
        let loan_fee = fees[0];
        let guardrails = self.guardrails.snapshot();

        let venue1 = request.direction.venue_for_leg(0);
        let leg1 = self
            .router
            .prepare_leg(
                request.token_borrow,
                request.token_target,
                principal,
                venue1,
                request.pool_fee_hint,
                guardrails.slippage_tolerance_bps,
            )
            .await;
        let out1 = self
            .router
            .execute(&leg1)
            .await
            .map_err(|cause| EngineError::SwapLegFailed { leg: 1, cause })?;
        info!(
            target: "arbitrage_execution",
            "第一腿完成: {} -> {} (venue={})", principal, out1, venue1.as_str()
        );

        // 第二腿只在第一腿产出已知后开始
        let venue2 = request.direction.venue_for_leg(1);
        let leg2 = self
            .router
            .prepare_leg(
                request.token_target,
                request.token_borrow,
                out1,
                venue2,
                request.pool_fee_hint,
                guardrails.slippage_tolerance_bps,
            )
            .await;
        let out2 = self
            .router
            .execute(&leg2)
            .await
            .map_err(|cause| EngineError::SwapLegFailed { leg: 2, cause })?;
        info!(
            target: "arbitrage_execution",
            "第二腿完成: {} -> {} (venue={})", out1, out2, venue2.as_str()
        );

        self.settlement
            .settle(
                request,
                principal,
                loan_fee,
                self.lender.account(),
                guardrails.min_profit_threshold,
                &[venue1, venue2],
            )
            .await
    }
}

#[async_trait]
impl LoanReceiver for ArbEngine {
    fn account(&self) -> Address {
        self.account
    }

    async fn on_loan(
        &self,
        caller: Address,
        tokens: &[Address],
        amounts: &[U256],
        fees: &[U256],
        payload: &[u8],
    ) -> Result<()> {
        let result = self
            .run_loan_callback(caller, tokens, amounts, fees, payload)
            .await;
        match result {
            Ok(report) => {
                *self.callback_outcome.lock() = Some(Ok(report));
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                *self.callback_outcome.lock() = Some(Err(e));
                Err(anyhow!(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;
    use crate::guardrails::GuardrailSnapshot;
    use crate::lending::InMemoryLendingPool;
    use crate::testkit::{addr, MisdeliveringLender, MockPathVenue, MockTieredVenue, RecordingSink};
    use dex::{InMemoryLedger, PoolFeePreferences, QuoteFallbackPolicy};
    use models::TradeDirection;
    use services::{ExecutionCostModel, FixedGasOracle, OracleRouter, PriceFeedRegistry};

    struct HarnessParams {
        tiered_rate: (u64, u64),
        path_rate: (u64, u64),
        lender_fee_ppm: u32,
        min_profit_threshold: U256,
        max_gas_price_gwei: u64,
        gas_price_gwei: u64,
        pool_liquidity: U256,
    }

    impl Default for HarnessParams {
        /// 有价差的基准行情: 1.0 借入 -> 3050 目标 -> 1.0164 借入
        fn default() -> Self {
            Self {
                tiered_rate: (3050, 1),
                path_rate: (10_164, 30_500_000),
                lender_fee_ppm: 0,
                min_profit_threshold: U256::zero(),
                max_gas_price_gwei: 100,
                gas_price_gwei: 1,
                pool_liquidity: U256::exp10(19),
            }
        }
    }

    struct Harness {
        engine: ArbEngine,
        ledger: Arc<InMemoryLedger>,
        audit: Arc<RecordingSink>,
        guardrails: Arc<GuardrailController>,
        owner: Address,
        engine_account: Address,
        pool_account: Address,
        tiered_account: Address,
        path_account: Address,
        token_borrow: Address,
        token_target: Address,
    }

    impl Harness {
        fn build(params: HarnessParams) -> Self {
            let ledger = Arc::new(InMemoryLedger::new());
            let audit = Arc::new(RecordingSink::new());
            let owner = addr(1);
            let engine_account = addr(2);
            let pool_account = addr(3);
            let tiered_account = addr(4);
            let path_account = addr(5);
            let token_borrow = addr(0x100);
            let token_target = addr(0x200);

            ledger.credit(token_borrow, pool_account, params.pool_liquidity);
            ledger.credit(token_target, tiered_account, U256::exp10(24));
            ledger.credit(token_borrow, path_account, U256::exp10(24));

            let tiered = Arc::new(MockTieredVenue {
                ledger: ledger.clone(),
                account: tiered_account,
                rate_num: params.tiered_rate.0,
                rate_den: params.tiered_rate.1,
            });
            let path = Arc::new(MockPathVenue {
                ledger: ledger.clone(),
                account: path_account,
                rate_num: params.path_rate.0,
                rate_den: params.path_rate.1,
            });
            let router = Arc::new(SwapRouter::new(
                tiered,
                path,
                ledger.clone(),
                Arc::new(PoolFeePreferences::new()),
                engine_account,
                300,
                QuoteFallbackPolicy::AnyNonZero,
            ));

            let guardrails = Arc::new(
                GuardrailController::new(
                    GuardrailSnapshot {
                        min_profit_threshold: params.min_profit_threshold,
                        slippage_tolerance_bps: 100,
                        max_gas_price: U256::from(params.max_gas_price_gwei) * U256::exp10(9),
                        active: true,
                    },
                    audit.clone(),
                )
                .expect("valid guardrails"),
            );

            // 原生代币即借入代币, gas 成本直接成立; 缓冲凑满 500k 单位
            let oracle = Arc::new(OracleRouter::new(Arc::new(PriceFeedRegistry::new())));
            let cost_model = Arc::new(ExecutionCostModel::new(oracle, token_borrow, 29_000));
            let gas_oracle = Arc::new(FixedGasOracle::from_gwei(params.gas_price_gwei));

            let lender = Arc::new(InMemoryLendingPool::new(
                ledger.clone(),
                pool_account,
                params.lender_fee_ppm,
            ));
            let settlement = SettlementEngine::new(
                ledger.clone(),
                cost_model,
                gas_oracle.clone(),
                audit.clone(),
                engine_account,
                owner,
            );
            let engine = ArbEngine::new(EngineWiring {
                owner,
                account: engine_account,
                guardrails: guardrails.clone(),
                router,
                ledger: ledger.clone(),
                lender,
                gas_oracle,
                settlement,
                audit: audit.clone(),
                swap_deadline_secs: 300,
            });

            Self {
                engine,
                ledger,
                audit,
                guardrails,
                owner,
                engine_account,
                pool_account,
                tiered_account,
                path_account,
                token_borrow,
                token_target,
            }
        }

        fn request(&self) -> ArbitrageRequest {
            ArbitrageRequest::new(
                self.token_borrow,
                self.token_target,
                U256::exp10(18),
                TradeDirection::TieredThenPath,
            )
        }

        async fn balance(&self, token: Address, holder: Address) -> U256 {
            self.ledger.balance_of(token, holder).await.unwrap()
        }
    }

    /// 基准行情的净利: 毛利 0.0164, 成本 500k gas x 1 gwei = 0.0005
    fn expected_net() -> U256 {
        U256::from(159u64) * U256::exp10(14)
    }

    #[tokio::test]
    async fn test_spread_yields_profit_to_owner() {
        let h = Harness::build(HarnessParams::default());

        let report = h.engine.execute_arbitrage(h.owner, h.request()).await.unwrap();

        assert_eq!(report.gross_profit, U256::from(164u64) * U256::exp10(14));
        assert_eq!(report.cost_used, U256::from(5u64) * U256::exp10(14));
        assert_eq!(report.net_profit, expected_net());

        // owner 进账净利, 借贷池毫发无损
        assert_eq!(h.balance(h.token_borrow, h.owner).await, expected_net());
        assert_eq!(h.balance(h.token_borrow, h.pool_account).await, U256::exp10(19));
        assert_eq!(h.engine.open_sessions(), 0);
        assert!(h.audit.kinds().contains(&"arbitrage_executed"));
    }

    #[tokio::test]
    async fn test_no_spread_fails_solvency() {
        // 两边有效汇率相同 (含费率), 回程不足以还本
        let h = Harness::build(HarnessParams {
            tiered_rate: (3000, 1),
            path_rate: (997, 3_000_000),
            ..HarnessParams::default()
        });

        let err = h.engine.execute_arbitrage(h.owner, h.request()).await.unwrap_err();

        match &err {
            EngineError::InsufficientFundsForRepayment { available, required } => {
                assert_eq!(*available, U256::from(997u64) * U256::exp10(15));
                assert_eq!(*required, U256::exp10(18));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.category(), ErrorCategory::SolvencyFailure);
        assert_eq!(h.balance(h.token_borrow, h.owner).await, U256::zero());
        assert!(h.audit.kinds().contains(&"arbitrage_failed"));
    }

    #[tokio::test]
    async fn test_unauthorized_caller_rejected_before_any_contact() {
        let h = Harness::build(HarnessParams::default());

        let err = h
            .engine
            .execute_arbitrage(addr(99), h.request())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Unauthorized { .. }));
        // 未触达任何协作方: 无事件, 无余额变动, 无会话
        assert!(h.audit.events().is_empty());
        assert_eq!(h.balance(h.token_borrow, h.pool_account).await, U256::exp10(19));
        assert_eq!(h.engine.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_circuit_breaker_blocks_until_toggled_back() {
        let h = Harness::build(HarnessParams::default());

        h.guardrails.toggle_active();
        let err = h.engine.execute_arbitrage(h.owner, h.request()).await.unwrap_err();
        assert!(matches!(err, EngineError::EnginePaused));
        assert_eq!(h.balance(h.token_borrow, h.owner).await, U256::zero());

        h.guardrails.toggle_active();
        assert!(h.engine.execute_arbitrage(h.owner, h.request()).await.is_ok());
    }

    #[tokio::test]
    async fn test_gas_ceiling_enforced() {
        let h = Harness::build(HarnessParams {
            max_gas_price_gwei: 10,
            gas_price_gwei: 50,
            ..HarnessParams::default()
        });

        let err = h.engine.execute_arbitrage(h.owner, h.request()).await.unwrap_err();
        match err {
            EngineError::AbnormalGasPrice { current, ceiling } => {
                assert_eq!(current, U256::from(50u64) * U256::exp10(9));
                assert_eq!(ceiling, U256::from(10u64) * U256::exp10(9));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_token_pair_rejected() {
        let h = Harness::build(HarnessParams::default());

        let same = ArbitrageRequest::new(
            h.token_borrow,
            h.token_borrow,
            U256::exp10(18),
            TradeDirection::TieredThenPath,
        );
        assert!(matches!(
            h.engine.execute_arbitrage(h.owner, same).await.unwrap_err(),
            EngineError::InvalidTokenPair { .. }
        ));

        let zero = ArbitrageRequest::new(
            h.token_borrow,
            h.token_target,
            U256::zero(),
            TradeDirection::TieredThenPath,
        );
        assert!(matches!(
            h.engine.execute_arbitrage(h.owner, zero).await.unwrap_err(),
            EngineError::InvalidTokenPair { .. }
        ));
    }

    #[tokio::test]
    async fn test_profit_gating_is_monotonic() {
        // 阈值恰好等于净利: 通过
        let h = Harness::build(HarnessParams {
            min_profit_threshold: expected_net(),
            ..HarnessParams::default()
        });
        assert!(h.engine.execute_arbitrage(h.owner, h.request()).await.is_ok());

        // 阈值高出 1 wei: 拒绝, 资金原样回滚
        let h = Harness::build(HarnessParams {
            min_profit_threshold: expected_net() + U256::one(),
            ..HarnessParams::default()
        });
        let err = h.engine.execute_arbitrage(h.owner, h.request()).await.unwrap_err();
        match &err {
            EngineError::ProfitBelowThreshold { actual, threshold } => {
                assert_eq!(*actual, expected_net());
                assert_eq!(*threshold, expected_net() + U256::one());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.category(), ErrorCategory::PolicyShortfall);
        assert_eq!(h.balance(h.token_borrow, h.owner).await, U256::zero());
        assert_eq!(h.balance(h.token_borrow, h.pool_account).await, U256::exp10(19));
    }

    #[tokio::test]
    async fn test_abort_restores_balances_and_allowances() {
        let h = Harness::build(HarnessParams {
            tiered_rate: (3000, 1),
            path_rate: (997, 3_000_000),
            ..HarnessParams::default()
        });

        assert!(h.engine.execute_arbitrage(h.owner, h.request()).await.is_err());

        // 余额回到尝试之前
        assert_eq!(h.balance(h.token_borrow, h.pool_account).await, U256::exp10(19));
        assert_eq!(h.balance(h.token_borrow, h.engine_account).await, U256::zero());
        assert_eq!(h.balance(h.token_target, h.engine_account).await, U256::zero());
        assert_eq!(h.balance(h.token_target, h.tiered_account).await, U256::exp10(24));
        assert_eq!(h.balance(h.token_borrow, h.path_account).await, U256::exp10(24));
        // 授权同样没有残留
        assert_eq!(
            h.ledger
                .allowance(h.token_borrow, h.engine_account, h.tiered_account)
                .await
                .unwrap(),
            U256::zero()
        );
        assert_eq!(
            h.ledger
                .allowance(h.token_target, h.engine_account, h.path_account)
                .await
                .unwrap(),
            U256::zero()
        );
        assert_eq!(h.engine.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_flash_loan_failure_surfaces_with_cause() {
        // 池子流动性不足, 借贷原语在回调发生前就失败
        let h = Harness::build(HarnessParams {
            pool_liquidity: U256::exp10(17),
            ..HarnessParams::default()
        });

        let err = h.engine.execute_arbitrage(h.owner, h.request()).await.unwrap_err();
        assert!(matches!(err, EngineError::FlashLoanFailed(_)));
        assert_eq!(err.category(), ErrorCategory::ProtocolFailure);
        assert!(h.audit.kinds().contains(&"arbitrage_failed"));
        assert_eq!(h.balance(h.token_borrow, h.pool_account).await, U256::exp10(17));
        assert_eq!(h.engine.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_loan_fee_is_repaid_from_proceeds() {
        // 500 ppm 借贷费: 还款 1.0005, 净利相应缩水
        let h = Harness::build(HarnessParams {
            lender_fee_ppm: 500,
            ..HarnessParams::default()
        });

        let report = h.engine.execute_arbitrage(h.owner, h.request()).await.unwrap();

        let fee = U256::from(5u64) * U256::exp10(14);
        assert_eq!(report.repaid, U256::exp10(18) + fee);
        assert_eq!(report.gross_profit, U256::from(164u64) * U256::exp10(14) - fee);
        // 池子赚到费用
        assert_eq!(
            h.balance(h.token_borrow, h.pool_account).await,
            U256::exp10(19) + fee
        );
    }

    #[tokio::test]
    async fn test_unsolicited_callback_rejected() {
        let h = Harness::build(HarnessParams::default());
        let payload = [0u8; 32];

        let result = h
            .engine
            .on_loan(
                addr(66),
                &[h.token_borrow],
                &[U256::exp10(18)],
                &[U256::zero()],
                &payload,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(h.balance(h.token_borrow, h.owner).await, U256::zero());
    }

    #[tokio::test]
    async fn test_callback_with_unknown_session_rejected() {
        let h = Harness::build(HarnessParams::default());
        let payload = [7u8; 32];

        // caller 合法但会话不存在
        let result = h
            .engine
            .on_loan(
                h.pool_account,
                &[h.token_borrow],
                &[U256::exp10(18)],
                &[U256::zero()],
                &payload,
            )
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_misdelivering_lender_fails_attempt() {
        // 借基准接线, 把借贷方换成谎报金额的替身
        let h = Harness::build(HarnessParams::default());
        let gas_oracle = Arc::new(FixedGasOracle::from_gwei(1));
        let engine = ArbEngine::new(EngineWiring {
            owner: h.owner,
            account: h.engine_account,
            guardrails: h.guardrails.clone(),
            router: Arc::new(SwapRouter::new(
                Arc::new(MockTieredVenue {
                    ledger: h.ledger.clone(),
                    account: h.tiered_account,
                    rate_num: 3050,
                    rate_den: 1,
                }),
                Arc::new(MockPathVenue {
                    ledger: h.ledger.clone(),
                    account: h.path_account,
                    rate_num: 10_164,
                    rate_den: 30_500_000,
                }),
                h.ledger.clone(),
                Arc::new(PoolFeePreferences::new()),
                h.engine_account,
                300,
                QuoteFallbackPolicy::AnyNonZero,
            )),
            ledger: h.ledger.clone(),
            lender: Arc::new(MisdeliveringLender { account: addr(30) }),
            gas_oracle: gas_oracle.clone(),
            settlement: SettlementEngine::new(
                h.ledger.clone(),
                Arc::new(ExecutionCostModel::new(
                    Arc::new(OracleRouter::new(Arc::new(PriceFeedRegistry::new()))),
                    h.token_borrow,
                    29_000,
                )),
                gas_oracle,
                h.audit.clone(),
                h.engine_account,
                h.owner,
            ),
            audit: h.audit.clone(),
            swap_deadline_secs: 300,
        });

        let err = engine.execute_arbitrage(h.owner, h.request()).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidCallback { .. }));
        assert_eq!(engine.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_recover_assets_owner_only() {
        let h = Harness::build(HarnessParams::default());
        let dust = addr(0x300);
        h.ledger.credit(dust, h.engine_account, U256::from(777u64));

        assert!(matches!(
            h.engine.recover_assets(addr(99), dust, h.owner).await.unwrap_err(),
            EngineError::Unauthorized { .. }
        ));

        let recovered = h.engine.recover_assets(h.owner, dust, h.owner).await.unwrap();
        assert_eq!(recovered, U256::from(777u64));
        assert_eq!(h.balance(dust, h.owner).await, U256::from(777u64));
        assert_eq!(h.balance(dust, h.engine_account).await, U256::zero());
    }

    #[test]
    fn test_quote_fallback_policy_mapping() {
        assert_eq!(
            quote_fallback_policy(config_crate::QuoteFallback::AnyNonZero),
            QuoteFallbackPolicy::AnyNonZero
        );
        assert_eq!(
            quote_fallback_policy(config_crate::QuoteFallback::OracleFloor),
            QuoteFallbackPolicy::OracleFloor
        );
    }

    #[tokio::test]
    async fn test_session_cleared_on_every_path() {
        // 成功路径
        let h = Harness::build(HarnessParams::default());
        h.engine.execute_arbitrage(h.owner, h.request()).await.unwrap();
        assert_eq!(h.engine.open_sessions(), 0);

        // 策略拒绝路径
        let h = Harness::build(HarnessParams {
            min_profit_threshold: U256::max_value(),
            ..HarnessParams::default()
        });
        assert!(h.engine.execute_arbitrage(h.owner, h.request()).await.is_err());
        assert_eq!(h.engine.open_sessions(), 0);

        // 协议失败路径
        let h = Harness::build(HarnessParams {
            pool_liquidity: U256::zero(),
            ..HarnessParams::default()
        });
        assert!(h.engine.execute_arbitrage(h.owner, h.request()).await.is_err());
        assert_eq!(h.engine.open_sessions(), 0);
    }
}
