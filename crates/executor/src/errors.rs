//! 引擎错误分类
//!
//! 每个失败都是一个可区分的具名条件, 绝不静默吞掉。致命条件由
//! 编排器统一回滚全部副作用; 是否重试完全是外部调用方的决定。

use ethers::types::{Address, H256, U256};
use services::OracleError;
use thiserror::Error;

/// 错误大类 - 监控方用来区分 "没机会" / "未授权" / "已暂停"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 策略拒绝 - 在任何外部调用之前挡下
    PolicyRejection,
    /// 参数校验失败 - 在任何外部调用之前挡下
    ValidationError,
    /// 协议失败 - 借贷/场所/账本等协作方失败
    ProtocolFailure,
    /// 偿付能力不足 - 致命, 整个尝试回滚
    SolvencyFailure,
    /// 有利可图但低于阈值 - 设计上的致命拒绝
    PolicyShortfall,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine is paused by circuit breaker")]
    EnginePaused,

    #[error("Abnormal gas price: current {current}, ceiling {ceiling}")]
    AbnormalGasPrice { current: U256, ceiling: U256 },

    #[error("Unauthorized caller: {caller:?}")]
    Unauthorized { caller: Address },

    #[error("Another arbitrage attempt is in flight")]
    AttemptInFlight,

    #[error("Invalid token pair: borrow {token_borrow:?}, target {token_target:?}")]
    InvalidTokenPair {
        token_borrow: Address,
        token_target: Address,
    },

    #[error("Slippage too high: requested {requested}, max {max}")]
    SlippageTooHigh { requested: u32, max: u32 },

    #[error("Flash loan failed: {0}")]
    FlashLoanFailed(#[source] anyhow::Error),

    #[error("Invalid loan callback for session {session_id:?}")]
    InvalidCallback { session_id: H256 },

    #[error("Session {session_id:?} deadline elapsed")]
    SessionExpired { session_id: H256 },

    #[error("Swap leg {leg} failed: {cause}")]
    SwapLegFailed {
        leg: usize,
        #[source]
        cause: anyhow::Error,
    },

    #[error("Insufficient funds for repayment: available {available}, required {required}")]
    InsufficientFundsForRepayment { available: U256, required: U256 },

    #[error("Profit below threshold: actual {actual}, threshold {threshold}")]
    ProfitBelowThreshold { actual: U256, threshold: U256 },

    #[error("Abnormal price detected for token {token:?}: {price}")]
    AbnormalPriceDetected { token: Address, price: U256 },

    #[error("Oracle query failed: {0}")]
    OracleUnavailable(#[source] OracleError),

    #[error("Gas price query failed: {0}")]
    GasPriceUnavailable(#[source] anyhow::Error),

    #[error("Ledger operation failed: {0}")]
    LedgerFailure(#[source] anyhow::Error),
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::EnginePaused
            | EngineError::AbnormalGasPrice { .. }
            | EngineError::Unauthorized { .. }
            | EngineError::AttemptInFlight => ErrorCategory::PolicyRejection,

            EngineError::InvalidTokenPair { .. } | EngineError::SlippageTooHigh { .. } => {
                ErrorCategory::ValidationError
            }

            EngineError::FlashLoanFailed(_)
            | EngineError::InvalidCallback { .. }
            | EngineError::SessionExpired { .. }
            | EngineError::SwapLegFailed { .. }
            | EngineError::AbnormalPriceDetected { .. }
            | EngineError::OracleUnavailable(_)
            | EngineError::GasPriceUnavailable(_)
            | EngineError::LedgerFailure(_) => ErrorCategory::ProtocolFailure,

            EngineError::InsufficientFundsForRepayment { .. } => ErrorCategory::SolvencyFailure,

            EngineError::ProfitBelowThreshold { .. } => ErrorCategory::PolicyShortfall,
        }
    }
}

impl From<OracleError> for EngineError {
    fn from(e: OracleError) -> Self {
        match e {
            OracleError::AbnormalPriceDetected { token, price } => {
                EngineError::AbnormalPriceDetected { token, price }
            }
            other => EngineError::OracleUnavailable(other),
        }
    }
}
