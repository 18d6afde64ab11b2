//! 审计事件出口
//!
//! 生产实现把事件写进 audit 专用日志 target (见 utils::LoggerManager),
//! 测试用记录型 sink 断言事件序列。

use models::{AuditEvent, AuditSink};
use tracing::{info, warn};

/// 走 tracing 的审计出口 (audit.log)
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let detail =
            serde_json::to_string(&event).unwrap_or_else(|e| format!("<serialize failed: {e}>"));
        match &event {
            AuditEvent::ArbitrageFailed { .. } => {
                warn!(target: "arbitrage_audit", kind = event.kind(), "{detail}");
            }
            _ => {
                info!(target: "arbitrage_audit", kind = event.kind(), "{detail}");
            }
        }
    }
}
