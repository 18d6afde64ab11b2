//! 借贷会话表
//!
//! 会话把一次调用与异步借贷回调关联起来, 是对未经请求或重放回调
//! 的防御: 回调只有命中唯一的 Pending 会话且未过期才被接受。
//! id 从调用上下文与参数派生, 每次尝试唯一。

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ethers::types::{Address, H256};
use ethers::utils::keccak256;
use models::{ArbitrageRequest, LoanSession, SessionState};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::EngineError;

#[derive(Default)]
pub struct SessionTable {
    sessions: DashMap<H256, LoanSession>,
    nonce: AtomicU64,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开启新会话; 同一时刻最多一个 Pending
    pub fn open(
        &self,
        initiator: Address,
        request: ArbitrageRequest,
        deadline: DateTime<Utc>,
    ) -> Result<LoanSession, EngineError> {
        if self.sessions.iter().any(|entry| entry.value().is_pending()) {
            return Err(EngineError::AttemptInFlight);
        }
        let id = self.derive_id(initiator, &request);
        let session = LoanSession::open(id, request, initiator, deadline);
        self.sessions.insert(id, session.clone());
        Ok(session)
    }

    /// 回调侧校验: 必须命中 Pending 会话且截止时间未过
    pub fn validate_callback(
        &self,
        id: H256,
        now: DateTime<Utc>,
    ) -> Result<LoanSession, EngineError> {
        let session = self
            .sessions
            .get(&id)
            .ok_or(EngineError::InvalidCallback { session_id: id })?;
        if !session.is_pending() {
            return Err(EngineError::InvalidCallback { session_id: id });
        }
        if session.is_expired(now) {
            return Err(EngineError::SessionExpired { session_id: id });
        }
        Ok(session.clone())
    }

    pub fn mark(&self, id: H256, state: SessionState) {
        if let Some(mut session) = self.sessions.get_mut(&id) {
            session.state = state;
        }
    }

    /// 尝试结束时无条件清除, 任何结局都不留孤儿会话
    pub fn clear(&self, id: H256) -> Option<LoanSession> {
        self.sessions.remove(&id).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// id = keccak256(发起者, 请求参数, 单调 nonce, 当前时间戳)
    fn derive_id(&self, initiator: Address, request: &ArbitrageRequest) -> H256 {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(initiator.as_bytes());
        buf.extend_from_slice(request.token_borrow.as_bytes());
        buf.extend_from_slice(request.token_target.as_bytes());
        let mut amount = [0u8; 32];
        request.amount.to_big_endian(&mut amount);
        buf.extend_from_slice(&amount);
        buf.extend_from_slice(request.direction.as_str().as_bytes());
        buf.extend_from_slice(&nonce.to_be_bytes());
        buf.extend_from_slice(&Utc::now().timestamp_millis().to_be_bytes());
        H256::from(keccak256(&buf))
    }
}
