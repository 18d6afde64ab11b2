//! 资产账本 - 一次尝试的事务边界
//!
//! 链上部署里原子性由交易回滚保证; 服务化部署必须用显式的
//! checkpoint/rollback 替代: 尝试开始时打检查点, 任何致命条件
//! 把余额与授权恢复到检查点, 只有成功落账才 commit。

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::types::{Address, U256};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// 检查点句柄
pub type CheckpointId = u64;

/// 代币余额与授权的统一视图
#[async_trait]
pub trait AssetLedger: Send + Sync {
    async fn balance_of(&self, token: Address, holder: Address) -> Result<U256>;

    /// 持有人主动转账
    async fn transfer(&self, token: Address, from: Address, to: Address, amount: U256) -> Result<()>;

    /// 花费授权额度的转账 (场所拉取资金的路径)
    async fn transfer_from(
        &self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()>;

    /// 设置授权额度 (覆盖语义, 设 0 即撤销)
    async fn approve(&self, token: Address, owner: Address, spender: Address, amount: U256) -> Result<()>;

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256>;

    /// 开启事务边界
    async fn checkpoint(&self) -> Result<CheckpointId>;

    /// 恢复到检查点 - 余额与授权全部还原
    async fn rollback(&self, checkpoint: CheckpointId) -> Result<()>;

    /// 放弃检查点, 保留当前状态
    async fn commit(&self, checkpoint: CheckpointId) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    balances: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
}

/// 内存账本 - 参考实现与测试基底
///
/// 链上部署用结算后端实现同一 trait, checkpoint/rollback 映射到
/// 外层事务。
#[derive(Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
    checkpoints: Mutex<HashMap<CheckpointId, LedgerState>>,
    next_checkpoint: AtomicU64,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注入初始余额 (接线与测试用)
    pub fn credit(&self, token: Address, holder: Address, amount: U256) {
        let mut state = self.state.write();
        let entry = state.balances.entry((token, holder)).or_insert_with(U256::zero);
        *entry = *entry + amount;
    }

    fn debit_inner(state: &mut LedgerState, token: Address, holder: Address, amount: U256) -> Result<()> {
        let balance = state
            .balances
            .get(&(token, holder))
            .copied()
            .unwrap_or_else(U256::zero);
        if balance < amount {
            return Err(anyhow!(
                "insufficient balance: holder {holder:?} has {balance} of token {token:?}, needs {amount}"
            ));
        }
        state.balances.insert((token, holder), balance - amount);
        Ok(())
    }

    fn credit_inner(state: &mut LedgerState, token: Address, holder: Address, amount: U256) {
        let entry = state.balances.entry((token, holder)).or_insert_with(U256::zero);
        *entry = *entry + amount;
    }
}

#[async_trait]
impl AssetLedger for InMemoryLedger {
    async fn balance_of(&self, token: Address, holder: Address) -> Result<U256> {
        Ok(self
            .state
            .read()
            .balances
            .get(&(token, holder))
            .copied()
            .unwrap_or_else(U256::zero))
    }

    async fn transfer(&self, token: Address, from: Address, to: Address, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let mut state = self.state.write();
        Self::debit_inner(&mut state, token, from, amount)?;
        Self::credit_inner(&mut state, token, to, amount);
        Ok(())
    }

    async fn transfer_from(
        &self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let mut state = self.state.write();
        let allowance = state
            .allowances
            .get(&(token, from, spender))
            .copied()
            .unwrap_or_else(U256::zero);
        if allowance < amount {
            return Err(anyhow!(
                "insufficient allowance: spender {spender:?} allowed {allowance} of token {token:?}, needs {amount}"
            ));
        }
        Self::debit_inner(&mut state, token, from, amount)?;
        Self::credit_inner(&mut state, token, to, amount);
        state.allowances.insert((token, from, spender), allowance - amount);
        Ok(())
    }

    async fn approve(&self, token: Address, owner: Address, spender: Address, amount: U256) -> Result<()> {
        let mut state = self.state.write();
        if amount.is_zero() {
            state.allowances.remove(&(token, owner, spender));
        } else {
            state.allowances.insert((token, owner, spender), amount);
        }
        Ok(())
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        Ok(self
            .state
            .read()
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_else(U256::zero))
    }

    async fn checkpoint(&self) -> Result<CheckpointId> {
        let id = self.next_checkpoint.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.state.read().clone();
        self.checkpoints.lock().insert(id, snapshot);
        Ok(id)
    }

    async fn rollback(&self, checkpoint: CheckpointId) -> Result<()> {
        let snapshot = self
            .checkpoints
            .lock()
            .remove(&checkpoint)
            .ok_or_else(|| anyhow!("unknown checkpoint {checkpoint}"))?;
        *self.state.write() = snapshot;
        Ok(())
    }

    async fn commit(&self, checkpoint: CheckpointId) -> Result<()> {
        self.checkpoints
            .lock()
            .remove(&checkpoint)
            .ok_or_else(|| anyhow!("unknown checkpoint {checkpoint}"))?;
        Ok(())
    }
}
