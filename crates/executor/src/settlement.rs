//! 结算与利润引擎
//!
//! 两腿完成后: 先验偿付能力 (廉价的早退路径, 借贷方还会独立核验),
//! 再算毛利/净利并过利润闸门, 最后还款与分润。利润闸门与偿付闸门
//! 截然不同: 前者拒绝 "成了但不值得" 的交易, 避免为低于阈值的
//! 收益占用资金。

use ethers::types::{Address, U256};
use models::{ArbitrageRequest, AuditEvent, AuditSink, VenueKind};
use serde::Serialize;
use services::{attempt_gas_used, ExecutionCostModel, GasOracle};
use std::sync::Arc;
use tracing::info;

use crate::errors::EngineError;
use dex::AssetLedger;

/// 一次成功结算的账目
#[derive(Debug, Clone, Serialize)]
pub struct SettlementReport {
    pub gross_profit: U256,
    pub net_profit: U256,
    pub cost_used: U256,
    pub repaid: U256,
}

pub struct SettlementEngine {
    ledger: Arc<dyn AssetLedger>,
    cost_model: Arc<ExecutionCostModel>,
    gas_oracle: Arc<dyn GasOracle>,
    audit: Arc<dyn AuditSink>,
    /// 引擎资产账户
    account: Address,
    /// 利润归集账户
    owner: Address,
}

impl SettlementEngine {
    pub fn new(
        ledger: Arc<dyn AssetLedger>,
        cost_model: Arc<ExecutionCostModel>,
        gas_oracle: Arc<dyn GasOracle>,
        audit: Arc<dyn AuditSink>,
        account: Address,
        owner: Address,
    ) -> Self {
        Self {
            ledger,
            cost_model,
            gas_oracle,
            audit,
            account,
            owner,
        }
    }

    pub async fn settle(
        &self,
        request: &ArbitrageRequest,
        principal: U256,
        loan_fee: U256,
        lender: Address,
        min_profit_threshold: U256,
        legs: &[VenueKind],
    ) -> Result<SettlementReport, EngineError> {
        let final_balance = self
            .ledger
            .balance_of(request.token_borrow, self.account)
            .await
            .map_err(EngineError::LedgerFailure)?;
        let repay = principal + loan_fee;

        // 偿付能力闸门 - 致命
        if final_balance < repay {
            return Err(EngineError::InsufficientFundsForRepayment {
                available: final_balance,
                required: repay,
            });
        }
        let gross_profit = final_balance - repay;

        // 已消耗资源 + 固定缓冲, 按现行 gas 价格换算成借入代币
        let gas_used = attempt_gas_used(legs);
        let gas_price = self
            .gas_oracle
            .gas_price()
            .await
            .map_err(EngineError::GasPriceUnavailable)?;
        let cost_used = self
            .cost_model
            .cost_in_token(gas_used, gas_price, request.token_borrow)
            .await?;
        let net_profit = gross_profit.saturating_sub(cost_used);

        // 利润闸门
        if net_profit < min_profit_threshold {
            return Err(EngineError::ProfitBelowThreshold {
                actual: net_profit,
                threshold: min_profit_threshold,
            });
        }

        // 还款优先于分润
        self.ledger
            .transfer(request.token_borrow, self.account, lender, repay)
            .await
            .map_err(EngineError::LedgerFailure)?;
        if !net_profit.is_zero() {
            self.ledger
                .transfer(request.token_borrow, self.account, self.owner, net_profit)
                .await
                .map_err(EngineError::LedgerFailure)?;
        }

        info!(
            target: "arbitrage_execution",
            "结算完成: 毛利 {} 净利 {} 成本 {} 还款 {}",
            gross_profit, net_profit, cost_used, repay
        );
        self.audit.record(AuditEvent::ArbitrageExecuted {
            token_borrow: request.token_borrow,
            token_target: request.token_target,
            amount: principal,
            gross_profit,
            net_profit,
            cost_used,
            direction: request.direction,
        });

        Ok(SettlementReport {
            gross_profit,
            net_profit,
            cost_used,
            repaid: repay,
        })
    }
}
