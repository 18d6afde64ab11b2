//! 防护参数控制器
//!
//! 持有可变策略状态 (熔断器/gas 上限/滑点容忍度/最低利润),
//! 仅 owner 可变更, 每次变更携带旧值与新值进审计流。
//! 入口检查无副作用, 先于任何外部调用执行。

use config_crate::GuardrailDefaults;
use ethers::types::U256;
use models::{AuditEvent, AuditSink};
use parking_lot::RwLock;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::errors::EngineError;

/// 滑点容忍度上限 (基点)
pub const MAX_SLIPPAGE_BPS: u32 = 1000;

/// 当前防护参数的一致性快照
#[derive(Debug, Clone)]
pub struct GuardrailSnapshot {
    /// 最低净利润阈值 (借入代币最小单位)
    pub min_profit_threshold: U256,
    pub slippage_tolerance_bps: u32,
    /// 最大可接受 gas 价格 (wei)
    pub max_gas_price: U256,
    /// 熔断器: false 时拒绝一切尝试
    pub active: bool,
}

pub struct GuardrailController {
    state: RwLock<GuardrailSnapshot>,
    audit: Arc<dyn AuditSink>,
}

impl GuardrailController {
    pub fn new(initial: GuardrailSnapshot, audit: Arc<dyn AuditSink>) -> Result<Self, EngineError> {
        if initial.slippage_tolerance_bps > MAX_SLIPPAGE_BPS {
            return Err(EngineError::SlippageTooHigh {
                requested: initial.slippage_tolerance_bps,
                max: MAX_SLIPPAGE_BPS,
            });
        }
        Ok(Self {
            state: RwLock::new(initial),
            audit,
        })
    }

    /// 从环境配置构造
    pub fn from_defaults(
        defaults: &GuardrailDefaults,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, EngineError> {
        Self::new(
            GuardrailSnapshot {
                min_profit_threshold: U256::from(defaults.min_profit_threshold_wei),
                slippage_tolerance_bps: defaults.slippage_tolerance_bps,
                max_gas_price: gwei_to_wei(defaults.max_gas_price_gwei),
                active: defaults.active,
            },
            audit,
        )
    }

    pub fn snapshot(&self) -> GuardrailSnapshot {
        self.state.read().clone()
    }

    pub fn set_min_profit_threshold(&self, value: U256) {
        let old = {
            let mut state = self.state.write();
            std::mem::replace(&mut state.min_profit_threshold, value)
        };
        self.audit.record(AuditEvent::ConfigUpdated {
            parameter: "min_profit_threshold".to_string(),
            old: old.to_string(),
            new: value.to_string(),
        });
    }

    pub fn set_slippage_tolerance(&self, bps: u32) -> Result<(), EngineError> {
        if bps > MAX_SLIPPAGE_BPS {
            return Err(EngineError::SlippageTooHigh {
                requested: bps,
                max: MAX_SLIPPAGE_BPS,
            });
        }
        let old = {
            let mut state = self.state.write();
            std::mem::replace(&mut state.slippage_tolerance_bps, bps)
        };
        self.audit.record(AuditEvent::ConfigUpdated {
            parameter: "slippage_tolerance_bps".to_string(),
            old: old.to_string(),
            new: bps.to_string(),
        });
        Ok(())
    }

    pub fn set_max_gas_price(&self, value: U256) {
        let old = {
            let mut state = self.state.write();
            std::mem::replace(&mut state.max_gas_price, value)
        };
        self.audit.record(AuditEvent::ConfigUpdated {
            parameter: "max_gas_price".to_string(),
            old: old.to_string(),
            new: value.to_string(),
        });
    }

    /// 熔断器翻转, 返回新状态
    pub fn toggle_active(&self) -> bool {
        let active = {
            let mut state = self.state.write();
            state.active = !state.active;
            state.active
        };
        self.audit.record(AuditEvent::CircuitBreakerTriggered { active });
        active
    }

    pub fn is_active(&self) -> bool {
        self.state.read().active
    }

    /// 尝试入口检查 - 无副作用, 先于任何外部调用
    pub fn check_entry(&self, gas_price: U256) -> Result<(), EngineError> {
        let state = self.state.read();
        if !state.active {
            return Err(EngineError::EnginePaused);
        }
        if gas_price > state.max_gas_price {
            return Err(EngineError::AbnormalGasPrice {
                current: gas_price,
                ceiling: state.max_gas_price,
            });
        }
        Ok(())
    }
}

/// Gwei (允许小数) 换算成 wei, 走 Decimal 避免浮点误差
fn gwei_to_wei(gwei: f64) -> U256 {
    let wei = Decimal::from_f64(gwei).unwrap_or_default() * Decimal::from(1_000_000_000u64);
    U256::from(wei.trunc().to_u128().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::RecordingSink;

    fn controller(sink: Arc<RecordingSink>) -> GuardrailController {
        GuardrailController::new(
            GuardrailSnapshot {
                min_profit_threshold: U256::zero(),
                slippage_tolerance_bps: 50,
                max_gas_price: U256::from(100u64) * U256::exp10(9),
                active: true,
            },
            sink,
        )
        .expect("valid initial state")
    }

    #[test]
    fn test_slippage_bound() {
        let sink = Arc::new(RecordingSink::new());
        let guardrails = controller(sink);

        assert!(guardrails.set_slippage_tolerance(0).is_ok());
        assert!(guardrails.set_slippage_tolerance(1000).is_ok());

        let err = guardrails.set_slippage_tolerance(1001).unwrap_err();
        match err {
            EngineError::SlippageTooHigh { requested, max } => {
                assert_eq!(requested, 1001);
                assert_eq!(max, 1000);
            }
            other => panic!("unexpected error: {other}"),
        }
        // 被拒绝的变更不得生效
        assert_eq!(guardrails.snapshot().slippage_tolerance_bps, 1000);
    }

    #[test]
    fn test_mutations_emit_old_and_new() {
        let sink = Arc::new(RecordingSink::new());
        let guardrails = controller(sink.clone());

        guardrails.set_min_profit_threshold(U256::from(5u64));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            AuditEvent::ConfigUpdated { parameter, old, new } => {
                assert_eq!(parameter, "min_profit_threshold");
                assert_eq!(old, "0");
                assert_eq!(new, "5");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_toggle_flips_and_emits() {
        let sink = Arc::new(RecordingSink::new());
        let guardrails = controller(sink.clone());

        assert!(!guardrails.toggle_active());
        assert!(!guardrails.is_active());
        assert!(guardrails.toggle_active());
        assert!(guardrails.is_active());

        let kinds = sink.kinds();
        assert_eq!(kinds, vec!["circuit_breaker_triggered", "circuit_breaker_triggered"]);
    }

    #[test]
    fn test_entry_checks() {
        let sink = Arc::new(RecordingSink::new());
        let guardrails = controller(sink);
        let gwei = U256::exp10(9);

        assert!(guardrails.check_entry(U256::from(50u64) * gwei).is_ok());

        let err = guardrails.check_entry(U256::from(101u64) * gwei).unwrap_err();
        assert!(matches!(err, EngineError::AbnormalGasPrice { .. }));

        guardrails.toggle_active();
        // 熔断优先于 gas 检查
        let err = guardrails.check_entry(U256::from(1u64)).unwrap_err();
        assert!(matches!(err, EngineError::EnginePaused));
    }

    #[test]
    fn test_gwei_to_wei_fractional() {
        assert_eq!(gwei_to_wei(0.08), U256::from(80_000_000u64));
        assert_eq!(gwei_to_wei(100.0), U256::from(100u64) * U256::exp10(9));
    }
}
