use chrono::{DateTime, Utc};
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

use crate::ArbitrageRequest;

/// 借贷会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// 已开启, 等待借贷回调
    Pending,
    /// 结算完成
    Settled,
    /// 中止, 所有副作用已回滚
    Aborted,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Pending => "pending",
            SessionState::Settled => "settled",
            SessionState::Aborted => "aborted",
        }
    }
}

/// 借贷会话 - 把一次尝试与异步借贷回调关联起来
///
/// 请求校验时创建, 回调恰好消费一次, 尝试结束时无条件清除。
/// 同一引擎实例同一时刻最多只有一个 Pending 会话。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanSession {
    pub id: H256,
    pub request: ArbitrageRequest,
    pub deadline: DateTime<Utc>,
    pub initiator: Address,
    pub state: SessionState,
}

impl LoanSession {
    pub fn open(id: H256, request: ArbitrageRequest, initiator: Address, deadline: DateTime<Utc>) -> Self {
        Self {
            id,
            request,
            deadline,
            initiator,
            state: SessionState::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == SessionState::Pending
    }

    /// 会话截止时间是否已过
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TradeDirection;
    use chrono::Duration;
    use ethers::types::U256;

    fn sample_session(deadline: DateTime<Utc>) -> LoanSession {
        let req = ArbitrageRequest::new(
            Address::from_low_u64_be(1),
            Address::from_low_u64_be(2),
            U256::from(1000),
            TradeDirection::TieredThenPath,
        );
        LoanSession::open(H256::from_low_u64_be(7), req, Address::from_low_u64_be(9), deadline)
    }

    #[test]
    fn test_session_expiry() {
        let now = Utc::now();
        let session = sample_session(now + Duration::seconds(300));
        assert!(session.is_pending());
        assert!(!session.is_expired(now));
        assert!(session.is_expired(now + Duration::seconds(301)));
    }
}
