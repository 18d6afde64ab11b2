//! 测试基底: 协作方的内存替身与审计事件记录器

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use ethers::types::{Address, U256};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::lending::{LendingFacility, LoanReceiver};
use dex::{AssetLedger, FeeTieredVenue, InMemoryLedger, PathVenue};
use models::{AuditEvent, AuditSink};

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

/// 记录型审计出口
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.kind()).collect()
    }
}

impl AuditSink for RecordingSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

/// 固定兑换率的费率分层场所替身: out = in * num / den
pub struct MockTieredVenue {
    pub ledger: Arc<InMemoryLedger>,
    pub account: Address,
    pub rate_num: u64,
    pub rate_den: u64,
}

#[async_trait]
impl FeeTieredVenue for MockTieredVenue {
    fn spender(&self) -> Address {
        self.account
    }

    async fn quote(
        &self,
        _token_in: Address,
        _token_out: Address,
        _fee: u32,
        amount_in: U256,
    ) -> Result<U256> {
        Ok(amount_in * U256::from(self.rate_num) / U256::from(self.rate_den))
    }

    async fn swap_exact_in(
        &self,
        token_in: Address,
        token_out: Address,
        _fee: u32,
        amount_in: U256,
        min_out: U256,
        recipient: Address,
        deadline: U256,
    ) -> Result<U256> {
        if U256::from(Utc::now().timestamp()) > deadline {
            bail!("deadline passed");
        }
        let out = amount_in * U256::from(self.rate_num) / U256::from(self.rate_den);
        if out < min_out {
            bail!("insufficient output amount");
        }
        self.ledger
            .transfer_from(token_in, self.account, recipient, self.account, amount_in)
            .await?;
        self.ledger.transfer(token_out, self.account, recipient, out).await?;
        Ok(out)
    }
}

/// 固定兑换率的路径路由场所替身
pub struct MockPathVenue {
    pub ledger: Arc<InMemoryLedger>,
    pub account: Address,
    pub rate_num: u64,
    pub rate_den: u64,
}

#[async_trait]
impl PathVenue for MockPathVenue {
    fn spender(&self) -> Address {
        self.account
    }

    async fn amounts_out(&self, amount_in: U256, _path: &[Address]) -> Result<Vec<U256>> {
        let out = amount_in * U256::from(self.rate_num) / U256::from(self.rate_den);
        Ok(vec![amount_in, out])
    }

    async fn swap_exact_in(
        &self,
        amount_in: U256,
        min_out: U256,
        path: &[Address],
        recipient: Address,
        deadline: U256,
    ) -> Result<Vec<U256>> {
        if U256::from(Utc::now().timestamp()) > deadline {
            bail!("deadline passed");
        }
        let out = amount_in * U256::from(self.rate_num) / U256::from(self.rate_den);
        if out < min_out {
            bail!("insufficient output amount");
        }
        self.ledger
            .transfer_from(path[0], self.account, recipient, self.account, amount_in)
            .await?;
        self.ledger
            .transfer(path[path.len() - 1], self.account, recipient, out)
            .await?;
        Ok(vec![amount_in, out])
    }
}

/// 不放款却谎报金额的借贷方, 用来验证回调内容校验
pub struct MisdeliveringLender {
    pub account: Address,
}

#[async_trait]
impl LendingFacility for MisdeliveringLender {
    fn account(&self) -> Address {
        self.account
    }

    fn fee_ppm(&self) -> u32 {
        0
    }

    async fn borrow_and_callback(
        &self,
        receiver: &dyn LoanReceiver,
        tokens: &[Address],
        amounts: &[U256],
        payload: &[u8],
    ) -> Result<()> {
        // 金额 +1, 与会话记录不符
        let wrong: Vec<U256> = amounts.iter().map(|a| *a + U256::one()).collect();
        let fees = vec![U256::zero(); amounts.len()];
        receiver
            .on_loan(self.account, tokens, &wrong, &fees, payload)
            .await
    }
}
