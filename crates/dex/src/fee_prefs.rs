//! 代币对 -> 费率分层场所偏好 fee tier

use dashmap::DashMap;
use ethers::types::Address;

/// 默认 fee tier (3000 = 0.3%)
pub const DEFAULT_FEE_TIER: u32 = 3000;

/// 费率偏好表
///
/// 键与顺序无关, (A,B) 与 (B,A) 命中同一条目。
/// 解析顺序: 偏好表 > 请求提示 > 默认值。
#[derive(Default)]
pub struct PoolFeePreferences {
    prefs: DashMap<(Address, Address), u32>,
    default_tier: u32,
}

impl PoolFeePreferences {
    pub fn new() -> Self {
        Self {
            prefs: DashMap::new(),
            default_tier: DEFAULT_FEE_TIER,
        }
    }

    pub fn with_default_tier(default_tier: u32) -> Self {
        Self {
            prefs: DashMap::new(),
            default_tier,
        }
    }

    fn key(a: Address, b: Address) -> (Address, Address) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn set_preference(&self, token_a: Address, token_b: Address, fee: u32) {
        self.prefs.insert(Self::key(token_a, token_b), fee);
    }

    /// 解析本次交易使用的 fee tier
    pub fn fee_for(&self, token_a: Address, token_b: Address, hint: Option<u32>) -> u32 {
        if let Some(fee) = self.prefs.get(&Self::key(token_a, token_b)) {
            return *fee;
        }
        hint.unwrap_or(self.default_tier)
    }
}
