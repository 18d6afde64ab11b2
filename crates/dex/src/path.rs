//! 路径路由场所的链上绑定 (Uniswap V2 风格 router)

use anyhow::Result;
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::debug;

use crate::venues::PathVenue;

abigen!(
    PathSwapRouter,
    r#"[
        function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] calldata path, address to, uint256 deadline) external returns (uint256[] memory amounts)
        function getAmountsOut(uint256 amountIn, address[] calldata path) external view returns (uint256[] memory amounts)
    ]"#
);

/// 路径路由场所实现
pub struct RouterStylePathVenue<M: Middleware> {
    router: PathSwapRouter<M>,
    router_address: Address,
    executor: Address,
}

impl<M: Middleware + 'static> RouterStylePathVenue<M> {
    pub fn new(provider: Arc<M>, router_address: Address, executor: Address) -> Self {
        Self {
            router: PathSwapRouter::new(router_address, provider),
            router_address,
            executor,
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> PathVenue for RouterStylePathVenue<M> {
    fn spender(&self) -> Address {
        self.router_address
    }

    async fn amounts_out(&self, amount_in: U256, path: &[Address]) -> Result<Vec<U256>> {
        let amounts = self
            .router
            .get_amounts_out(amount_in, path.to_vec())
            .call()
            .await?;
        Ok(amounts)
    }

    async fn swap_exact_in(
        &self,
        amount_in: U256,
        min_out: U256,
        path: &[Address],
        recipient: Address,
        deadline: U256,
    ) -> Result<Vec<U256>> {
        let call = self
            .router
            .swap_exact_tokens_for_tokens(amount_in, min_out, path.to_vec(), recipient, deadline)
            .from(self.executor);

        // 先模拟取得逐跳成交量, 再上链执行
        let amounts = call.call().await?;
        debug!("路径路由场所模拟输出: {:?}", amounts);

        let pending = call.send().await?;
        pending.await?;

        Ok(amounts)
    }
}
