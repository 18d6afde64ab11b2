//! 时间工具模块
//!
//! 统一生成 swap 截止时间, 限制陈旧路由状态的暴露窗口

use chrono::{DateTime, Duration, Utc};
use ethers::types::U256;

/// 当前时间 + secs 的截止时间
pub fn swap_deadline(secs: u64) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(secs as i64)
}

/// 当前时间 + secs 的 unix 时间戳 (秒), 场所调用参数用
pub fn unix_deadline(secs: u64) -> U256 {
    U256::from(Utc::now().timestamp() as u64 + secs)
}
