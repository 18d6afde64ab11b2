//! 费率分层场所的链上绑定 (Uniswap V3 风格 router + quoter)

use anyhow::Result;
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::debug;

use crate::venues::FeeTieredVenue;

// 单池 exact-in swap, 参数与合约的 ExactInputSingleParams 一一对应
abigen!(
    TieredSwapRouter,
    r#"[
        {
            "inputs": [
                {
                    "components": [
                        {"name": "tokenIn", "type": "address"},
                        {"name": "tokenOut", "type": "address"},
                        {"name": "fee", "type": "uint24"},
                        {"name": "recipient", "type": "address"},
                        {"name": "deadline", "type": "uint256"},
                        {"name": "amountIn", "type": "uint256"},
                        {"name": "amountOutMinimum", "type": "uint256"},
                        {"name": "sqrtPriceLimitX96", "type": "uint160"}
                    ],
                    "name": "params",
                    "type": "tuple"
                }
            ],
            "name": "exactInputSingle",
            "outputs": [{"name": "amountOut", "type": "uint256"}],
            "stateMutability": "payable",
            "type": "function"
        }
    ]"#
);

// Quoter ABI
abigen!(
    TieredQuoter,
    r#"[
        function quoteExactInputSingle(address tokenIn, address tokenOut, uint24 fee, uint256 amountIn, uint160 sqrtPriceLimitX96) external returns (uint256 amountOut)
    ]"#
);

/// 费率分层场所实现
pub struct UniswapStyleTieredVenue<M: Middleware> {
    router: TieredSwapRouter<M>,
    quoter: TieredQuoter<M>,
    router_address: Address,
    /// 发起 swap 的资产账户 (from 地址)
    executor: Address,
}

impl<M: Middleware + 'static> UniswapStyleTieredVenue<M> {
    pub fn new(
        provider: Arc<M>,
        router_address: Address,
        quoter_address: Address,
        executor: Address,
    ) -> Self {
        Self {
            router: TieredSwapRouter::new(router_address, provider.clone()),
            quoter: TieredQuoter::new(quoter_address, provider),
            router_address,
            executor,
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> FeeTieredVenue for UniswapStyleTieredVenue<M> {
    fn spender(&self) -> Address {
        self.router_address
    }

    async fn quote(
        &self,
        token_in: Address,
        token_out: Address,
        fee: u32,
        amount_in: U256,
    ) -> Result<U256> {
        // 用 call 模拟交易获取报价, sqrtPriceLimitX96 = 0 表示无限制
        let amount_out = self
            .quoter
            .quote_exact_input_single(token_in, token_out, fee, amount_in, U256::zero())
            .call()
            .await?;

        Ok(amount_out)
    }

    async fn swap_exact_in(
        &self,
        token_in: Address,
        token_out: Address,
        fee: u32,
        amount_in: U256,
        min_out: U256,
        recipient: Address,
        deadline: U256,
    ) -> Result<U256> {
        let params = (
            token_in,
            token_out,
            fee,
            recipient,
            deadline,
            amount_in,
            min_out,
            U256::zero(),
        );

        let call = self.router.exact_input_single(params).from(self.executor);

        // 先模拟取得返回值, 再上链执行
        let amount_out = call.call().await?;
        debug!("费率分层场所模拟输出: {}", amount_out);

        let pending = call.send().await?;
        pending.await?;

        Ok(amount_out)
    }
}
