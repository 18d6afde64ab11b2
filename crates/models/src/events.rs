use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::TradeDirection;

/// 审计事件 - 引擎对外发出的可观测信号
///
/// 每次失败都必须带有可区分的 reason, 监控方能够区分
/// "无机会" / "未授权" / "已暂停" 等情况, 绝不静默吞掉。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuditEvent {
    /// 套利成功结算
    ArbitrageExecuted {
        token_borrow: Address,
        token_target: Address,
        amount: U256,
        gross_profit: U256,
        net_profit: U256,
        cost_used: U256,
        direction: TradeDirection,
    },
    /// 套利尝试失败, 全部副作用已回滚
    ArbitrageFailed {
        token_borrow: Address,
        token_target: Address,
        amount: U256,
        reason: String,
    },
    /// 防护参数变更 (携带旧值与新值)
    ConfigUpdated {
        parameter: String,
        old: String,
        new: String,
    },
    /// 熔断器状态翻转
    CircuitBreakerTriggered { active: bool },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::ArbitrageExecuted { .. } => "arbitrage_executed",
            AuditEvent::ArbitrageFailed { .. } => "arbitrage_failed",
            AuditEvent::ConfigUpdated { .. } => "config_updated",
            AuditEvent::CircuitBreakerTriggered { .. } => "circuit_breaker_triggered",
        }
    }
}

/// 审计事件接收端
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}
