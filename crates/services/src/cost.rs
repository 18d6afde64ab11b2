//! 执行成本模型
//!
//! 把 (已消耗 gas + 结算缓冲) × 当前 gas 价格 换算成借入代币计价的
//! 成本。换算走预言机路由, 不再使用写死的汇率常量; 任一价格源缺失
//! 时跳过换算 (成本按 0 计) 并告警。

use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::warn;

use crate::oracle::{OracleError, OracleRouter};

pub struct ExecutionCostModel {
    oracle: Arc<OracleRouter>,
    /// gas 以原生代币计价, 换算的起点
    native_token: Address,
    /// 剩余工作 (结算/归还/转账) 的固定 gas 缓冲
    settlement_gas_buffer: u64,
}

impl ExecutionCostModel {
    pub fn new(oracle: Arc<OracleRouter>, native_token: Address, settlement_gas_buffer: u64) -> Self {
        Self {
            oracle,
            native_token,
            settlement_gas_buffer,
        }
    }

    /// 借入代币计价的执行成本估算
    ///
    /// gas_used 是已执行步骤的累计用量, 缓冲覆盖剩余工作。
    pub async fn cost_in_token(
        &self,
        gas_used: u64,
        gas_price: U256,
        token: Address,
    ) -> Result<U256, OracleError> {
        let total_units = U256::from(gas_used + self.settlement_gas_buffer);
        let cost_wei = total_units * gas_price;

        if token == self.native_token {
            return Ok(cost_wei);
        }

        match self.oracle.convert(cost_wei, self.native_token, token).await {
            Ok(cost) => Ok(cost),
            Err(OracleError::FeedMissing(missing)) => {
                warn!("成本换算跳过: 代币 {:?} 无价格源, 本次成本按 0 计", missing);
                Ok(U256::zero())
            }
            Err(OracleError::FeedUnavailable { token, reason }) => {
                warn!("成本换算跳过: 代币 {:?} 价格源查询失败 ({}), 本次成本按 0 计", token, reason);
                Ok(U256::zero())
            }
            // 异常价格必须向上冒泡, 不允许带病结算
            Err(e) => Err(e),
        }
    }
}
