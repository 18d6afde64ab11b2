//! 套利编排引擎
//!
//! 自筹资金的跨场所套利闭环: 防护入口检查, 借贷会话编排, 两腿
//! 顺序 swap, 偿付校验与利润闸门, 全程一个显式事务边界, 要么
//! 完整结算要么不留痕迹。

pub mod audit;
pub mod errors;
pub mod guardrails;
pub mod lending;
pub mod orchestrator;
pub mod session;
pub mod settlement;

#[cfg(test)]
pub(crate) mod testkit;

pub use audit::TracingAuditSink;
pub use errors::{EngineError, ErrorCategory};
pub use guardrails::{GuardrailController, GuardrailSnapshot, MAX_SLIPPAGE_BPS};
pub use lending::{loan_fee, InMemoryLendingPool, LendingFacility, LoanReceiver};
pub use orchestrator::{quote_fallback_policy, ArbEngine, EngineWiring};
pub use session::SessionTable;
pub use settlement::{SettlementEngine, SettlementReport};
