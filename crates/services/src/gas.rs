//! Gas 价格与 gas 用量估算

use anyhow::Result;
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::U256;
use models::VenueKind;
use std::sync::Arc;

/// 基础交易消耗
pub const BASE_GAS: u64 = 21_000;
/// 闪电贷开销
pub const FLASH_LOAN_GAS: u64 = 150_000;

/// 单腿 swap 的 gas 估算
///
/// 费率分层场所 tick 跨越可能消耗更多, 取保守值。
pub fn leg_gas(venue: VenueKind) -> u64 {
    match venue {
        VenueKind::FeeTiered => 180_000,
        VenueKind::PathBased => 120_000,
    }
}

/// 一次尝试到当前为止的 gas 用量 (按已执行的腿累计)
pub fn attempt_gas_used(legs: &[VenueKind]) -> u64 {
    BASE_GAS + FLASH_LOAN_GAS + legs.iter().map(|v| leg_gas(*v)).sum::<u64>()
}

/// 当前 gas 价格来源
#[async_trait]
pub trait GasOracle: Send + Sync {
    async fn gas_price(&self) -> Result<U256>;
}

/// 走节点 RPC 的 gas 价格
pub struct ProviderGasOracle<M: Middleware> {
    provider: Arc<M>,
}

impl<M: Middleware + 'static> ProviderGasOracle<M> {
    pub fn new(provider: Arc<M>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<M: Middleware + 'static> GasOracle for ProviderGasOracle<M> {
    async fn gas_price(&self) -> Result<U256> {
        let price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| anyhow::anyhow!("{e:?}"))?;
        Ok(price)
    }
}

/// 固定 gas 价格 - 干运行与测试用
pub struct FixedGasOracle {
    price: U256,
}

impl FixedGasOracle {
    pub fn new(price: U256) -> Self {
        Self { price }
    }

    /// 以 Gwei 为单位构造
    pub fn from_gwei(gwei: u64) -> Self {
        Self {
            price: U256::from(gwei) * U256::exp10(9),
        }
    }
}

#[async_trait]
impl GasOracle for FixedGasOracle {
    async fn gas_price(&self) -> Result<U256> {
        Ok(self.price)
    }
}
