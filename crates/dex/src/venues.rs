//! 交易场所的通用 trait
//!
//! 两类异构场所的能力面: 报价 (非承诺) 与成交。场所在
//! `amount_out < min_out` 或截止时间已过时必须报错整体失败。

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::{Address, U256};

/// 费率分层场所 - 单池交易由显式 fee tier 标识
#[async_trait]
pub trait FeeTieredVenue: Send + Sync {
    /// 从本场所拉取资金的地址 (授权的 spender)
    fn spender(&self) -> Address;

    /// 报价设施 - 可能过期或失败, 不构成承诺
    async fn quote(
        &self,
        token_in: Address,
        token_out: Address,
        fee: u32,
        amount_in: U256,
    ) -> Result<U256>;

    async fn swap_exact_in(
        &self,
        token_in: Address,
        token_out: Address,
        fee: u32,
        amount_in: U256,
        min_out: U256,
        recipient: Address,
        deadline: U256,
    ) -> Result<U256>;
}

/// 路径路由场所 - 沿显式 token path 路由, 费率固定隐含
#[async_trait]
pub trait PathVenue: Send + Sync {
    fn spender(&self) -> Address;

    /// 沿路径的逐跳输出估算
    async fn amounts_out(&self, amount_in: U256, path: &[Address]) -> Result<Vec<U256>>;

    /// 返回逐跳成交量, 最终输出取最后一个元素
    async fn swap_exact_in(
        &self,
        amount_in: U256,
        min_out: U256,
        path: &[Address],
        recipient: Address,
        deadline: U256,
    ) -> Result<Vec<U256>>;
}
