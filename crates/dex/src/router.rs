//! 场所统一路由
//!
//! 把两类异构场所包成统一的 {报价, 成交} 能力面。执行路径上的
//! 授权是精确额度的: swap 前按成交量授权, swap 后立即撤销归零,
//! 成败路径都不留存量授权。

use anyhow::{anyhow, Result};
use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::{debug, warn};

use models::VenueKind;
use services::OracleRouter;
use utils::unix_deadline;

use crate::fee_prefs::PoolFeePreferences;
use crate::ledger::AssetLedger;
use crate::venues::{FeeTieredVenue, PathVenue};

/// 路径路由场所的隐含固定费率 (ppm)
pub const PATH_VENUE_FEE_PPM: u32 = 3000;

/// 报价设施失效时的 minOut 兜底策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteFallbackPolicy {
    /// 接受任何非零输出。报价失效恰好是行情最不确定的时刻,
    /// 此时滑点保护同时失效; 这是显式保留的策略选择, 不是安全保证。
    AnyNonZero,
    /// 用预言机参考价推导保底输出; 任一价格源缺失时退回 AnyNonZero。
    OracleFloor,
}

/// 单腿 swap 的执行参数
#[derive(Debug, Clone)]
pub struct SwapLeg {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub min_out: U256,
    pub venue: VenueKind,
    /// 已解析的 fee tier (仅费率分层场所使用)
    pub fee: u32,
}

pub struct SwapRouter {
    tiered: Arc<dyn FeeTieredVenue>,
    path: Arc<dyn PathVenue>,
    ledger: Arc<dyn AssetLedger>,
    fee_prefs: Arc<PoolFeePreferences>,
    oracle: Option<Arc<OracleRouter>>,
    /// 持有资产并发起 swap 的账户
    trader: Address,
    deadline_secs: u64,
    fallback: QuoteFallbackPolicy,
}

impl SwapRouter {
    pub fn new(
        tiered: Arc<dyn FeeTieredVenue>,
        path: Arc<dyn PathVenue>,
        ledger: Arc<dyn AssetLedger>,
        fee_prefs: Arc<PoolFeePreferences>,
        trader: Address,
        deadline_secs: u64,
        fallback: QuoteFallbackPolicy,
    ) -> Self {
        Self {
            tiered,
            path,
            ledger,
            fee_prefs,
            oracle: None,
            trader,
            deadline_secs,
            fallback,
        }
    }

    /// 接入预言机 (OracleFloor 兜底的前提)
    pub fn with_oracle(mut self, oracle: Arc<OracleRouter>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// 组装一条腿: 解析 fee tier 并计算 minOut
    pub async fn prepare_leg(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        venue: VenueKind,
        fee_hint: Option<u32>,
        slippage_bps: u32,
    ) -> SwapLeg {
        let fee = self.fee_prefs.fee_for(token_in, token_out, fee_hint);
        let min_out = self
            .quote_min_output(token_in, token_out, amount_in, venue, fee, slippage_bps)
            .await;
        SwapLeg {
            token_in,
            token_out,
            amount_in,
            min_out,
            venue,
            fee,
        }
    }

    /// minOut 策略: 场所自身报价按滑点容忍度折减, 报价失效走兜底链
    pub async fn quote_min_output(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        venue: VenueKind,
        fee: u32,
        slippage_bps: u32,
    ) -> U256 {
        let quoted = match venue {
            VenueKind::FeeTiered => self.tiered.quote(token_in, token_out, fee, amount_in).await,
            VenueKind::PathBased => self
                .path
                .amounts_out(amount_in, &[token_in, token_out])
                .await
                .and_then(|amounts| {
                    amounts
                        .last()
                        .copied()
                        .ok_or_else(|| anyhow!("venue returned empty amounts"))
                }),
        };

        match quoted {
            Ok(expected) if !expected.is_zero() => {
                let min_out = derate(expected, slippage_bps);
                debug!(
                    "场所报价 {} -> minOut {} (venue={}, slippage={}bps)",
                    expected,
                    min_out,
                    venue.as_str(),
                    slippage_bps
                );
                min_out
            }
            Ok(_) => {
                self.fallback_min_out(token_in, token_out, amount_in, venue, fee, slippage_bps, "quote returned zero")
                    .await
            }
            Err(e) => {
                self.fallback_min_out(
                    token_in,
                    token_out,
                    amount_in,
                    venue,
                    fee,
                    slippage_bps,
                    &format!("{e:#}"),
                )
                .await
            }
        }
    }

    async fn fallback_min_out(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        venue: VenueKind,
        fee: u32,
        slippage_bps: u32,
        reason: &str,
    ) -> U256 {
        if self.fallback == QuoteFallbackPolicy::OracleFloor {
            if let Some(oracle) = &self.oracle {
                let fee_ppm = match venue {
                    VenueKind::FeeTiered => fee,
                    VenueKind::PathBased => PATH_VENUE_FEE_PPM,
                };
                match oracle
                    .expected_output(token_in, token_out, amount_in, fee_ppm, slippage_bps)
                    .await
                {
                    Ok(floor) if !floor.is_zero() => {
                        warn!("报价设施失效 ({}), 改用预言机保底输出 {}", reason, floor);
                        return floor;
                    }
                    Ok(_) => warn!("预言机保底输出为零, 退回 AnyNonZero"),
                    Err(e) => warn!("预言机保底不可用 ({e}), 退回 AnyNonZero"),
                }
            }
        }
        // 滑点保护在此失效, 只拒绝零输出
        warn!("报价设施失效 ({}), minOut 兜底为任何非零输出", reason);
        U256::one()
    }

    /// 执行一条腿
    ///
    /// 授权恰好等于成交量, 成败路径都立即撤销归零。
    pub async fn execute(&self, leg: &SwapLeg) -> Result<U256> {
        let spender = match leg.venue {
            VenueKind::FeeTiered => self.tiered.spender(),
            VenueKind::PathBased => self.path.spender(),
        };
        let deadline = unix_deadline(self.deadline_secs);

        self.ledger
            .approve(leg.token_in, self.trader, spender, leg.amount_in)
            .await?;

        let swapped = match leg.venue {
            VenueKind::FeeTiered => {
                self.tiered
                    .swap_exact_in(
                        leg.token_in,
                        leg.token_out,
                        leg.fee,
                        leg.amount_in,
                        leg.min_out,
                        self.trader,
                        deadline,
                    )
                    .await
            }
            VenueKind::PathBased => self
                .path
                .swap_exact_in(
                    leg.amount_in,
                    leg.min_out,
                    &[leg.token_in, leg.token_out],
                    self.trader,
                    deadline,
                )
                .await
                .and_then(|amounts| {
                    amounts
                        .last()
                        .copied()
                        .ok_or_else(|| anyhow!("venue returned empty amounts"))
                }),
        };

        // 成败都撤销授权, swap 错误优先上抛
        let revoked = self
            .ledger
            .approve(leg.token_in, self.trader, spender, U256::zero())
            .await;
        let amount_out = swapped?;
        revoked?;

        if amount_out < leg.min_out {
            return Err(anyhow!("venue under-delivered: {amount_out} < {}", leg.min_out));
        }
        debug!(
            "腿执行完成: {} (in) -> {} (out), venue={}",
            leg.amount_in,
            amount_out,
            leg.venue.as_str()
        );
        Ok(amount_out)
    }
}

/// 预期输出按滑点容忍度折减
fn derate(expected: U256, slippage_bps: u32) -> U256 {
    expected * U256::from(10_000u64 - slippage_bps as u64) / U256::from(10_000u64)
}
