use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// 场所类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VenueKind {
    /// 费率分层场所 - 单池交易由显式 fee tier 标识
    FeeTiered,
    /// 路径路由场所 - 交易沿显式 token path 路由, 费率固定隐含
    PathBased,
}

impl VenueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueKind::FeeTiered => "fee_tiered",
            VenueKind::PathBased => "path_based",
        }
    }
}

/// 两腿交易的执行方向 - 决定第一腿打到哪个场所
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    /// 第一腿走费率分层场所, 第二腿走路径路由场所
    TieredThenPath,
    /// 第一腿走路径路由场所, 第二腿走费率分层场所
    PathThenTiered,
}

impl TradeDirection {
    /// 第 leg 腿 (从 0 开始) 对应的场所
    pub fn venue_for_leg(&self, leg: usize) -> VenueKind {
        match (self, leg % 2) {
            (TradeDirection::TieredThenPath, 0) => VenueKind::FeeTiered,
            (TradeDirection::TieredThenPath, _) => VenueKind::PathBased,
            (TradeDirection::PathThenTiered, 0) => VenueKind::PathBased,
            (TradeDirection::PathThenTiered, _) => VenueKind::FeeTiered,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::TieredThenPath => "tiered_then_path",
            TradeDirection::PathThenTiered => "path_then_tiered",
        }
    }
}

/// 套利请求 - 提交后不可变
///
/// 机会发现由外部调用方负责, 引擎只负责校验与执行。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageRequest {
    /// 借入并归还的代币
    pub token_borrow: Address,
    /// 中间代币
    pub token_target: Address,
    /// 借入本金
    pub amount: U256,
    /// 费率分层场所的 fee tier 提示 (None 时走偏好表/默认值)
    pub pool_fee_hint: Option<u32>,
    pub direction: TradeDirection,
}

impl ArbitrageRequest {
    pub fn new(
        token_borrow: Address,
        token_target: Address,
        amount: U256,
        direction: TradeDirection,
    ) -> Self {
        Self {
            token_borrow,
            token_target,
            amount,
            pool_fee_hint: None,
            direction,
        }
    }

    pub fn with_fee_hint(mut self, fee: u32) -> Self {
        self.pool_fee_hint = Some(fee);
        self
    }

    /// 代币对是否形态合法 (不同且非零地址, 金额非零)
    pub fn pair_is_valid(&self) -> bool {
        self.token_borrow != self.token_target
            && self.token_borrow != Address::zero()
            && self.token_target != Address::zero()
            && !self.amount.is_zero()
    }
}
