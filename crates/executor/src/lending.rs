//! 借贷设施接口与参考实现
//!
//! 借贷方在同一工作单元内放款并同步调用回调, 随后独立核验还款,
//! 未还清则整个单元失败。费率以 ppm 计。

use anyhow::{bail, Result};
use async_trait::async_trait;
use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::{debug, info};

use dex::AssetLedger;

/// 费率基数 (ppm)
pub const FEE_SCALE_PPM: u64 = 1_000_000;

/// amount 对应的借贷费用
pub fn loan_fee(amount: U256, fee_ppm: u32) -> U256 {
    amount * U256::from(fee_ppm) / U256::from(FEE_SCALE_PPM)
}

/// 资金接收方 - 放款后在同一工作单元内被同步回调
#[async_trait]
pub trait LoanReceiver: Send + Sync {
    /// 资金落账的账户
    fn account(&self) -> Address;

    /// 放款回调; caller 是实际发起回调的主体, 接收方必须验证
    async fn on_loan(
        &self,
        caller: Address,
        tokens: &[Address],
        amounts: &[U256],
        fees: &[U256],
        payload: &[u8],
    ) -> Result<()>;
}

/// 借贷设施
#[async_trait]
pub trait LendingFacility: Send + Sync {
    /// 借贷方自身账户, 回调 caller 的校验基准
    fn account(&self) -> Address;

    /// 借贷费率 (ppm)
    fn fee_ppm(&self) -> u32;

    /// 放款并回调, 随后独立核验还款
    async fn borrow_and_callback(
        &self,
        receiver: &dyn LoanReceiver,
        tokens: &[Address],
        amounts: &[U256],
        payload: &[u8],
    ) -> Result<()>;
}

/// 账本之上的借贷池参考实现
pub struct InMemoryLendingPool {
    ledger: Arc<dyn AssetLedger>,
    account: Address,
    fee_ppm: u32,
}

impl InMemoryLendingPool {
    pub fn new(ledger: Arc<dyn AssetLedger>, account: Address, fee_ppm: u32) -> Self {
        Self {
            ledger,
            account,
            fee_ppm,
        }
    }
}

#[async_trait]
impl LendingFacility for InMemoryLendingPool {
    fn account(&self) -> Address {
        self.account
    }

    fn fee_ppm(&self) -> u32 {
        self.fee_ppm
    }

    async fn borrow_and_callback(
        &self,
        receiver: &dyn LoanReceiver,
        tokens: &[Address],
        amounts: &[U256],
        payload: &[u8],
    ) -> Result<()> {
        if tokens.is_empty() || tokens.len() != amounts.len() {
            bail!(
                "malformed loan request: {} tokens, {} amounts",
                tokens.len(),
                amounts.len()
            );
        }

        let mut balances_before = Vec::with_capacity(tokens.len());
        for (token, amount) in tokens.iter().zip(amounts) {
            let balance = self.ledger.balance_of(*token, self.account).await?;
            if balance < *amount {
                bail!(
                    "insufficient pool liquidity: have {balance}, need {amount} of token {token:?}"
                );
            }
            balances_before.push(balance);
        }

        let fees: Vec<U256> = amounts.iter().map(|a| loan_fee(*a, self.fee_ppm)).collect();

        for (token, amount) in tokens.iter().zip(amounts) {
            self.ledger
                .transfer(*token, self.account, receiver.account(), *amount)
                .await?;
        }
        debug!("放款完成, 进入回调");

        receiver
            .on_loan(self.account, tokens, amounts, &fees, payload)
            .await?;

        // 独立核验还款: 余额必须回到放款前水平加上费用
        for ((token, before), fee) in tokens.iter().zip(&balances_before).zip(&fees) {
            let now = self.ledger.balance_of(*token, self.account).await?;
            let required = *before + *fee;
            if now < required {
                bail!("flash loan not repaid: token {token:?} balance {now}, required {required}");
            }
        }
        info!("借贷已还清 (含费用)");
        Ok(())
    }
}
