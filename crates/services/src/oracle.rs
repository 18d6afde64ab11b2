//! 价格预言机适配层
//!
//! 把外部参考价格归一到统一的 1e18 定点基准, 用于滑点保底输出
//! 与 gas 成本换算。价格源按代币注册, 缺失是合法状态, 依赖价格的
//! 路径此时被跳过, 预言机永远不是唯一的真值来源。

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use ethers::prelude::*;
use ethers::types::{Address, U256};
use std::sync::Arc;
use thiserror::Error;

/// 1e18 定点基准
const PRICE_SCALE: u32 = 18;

/// 一次价格读数
#[derive(Debug, Clone)]
pub struct PricePoint {
    pub price: U256,
    /// 该价格源自身的小数位精度
    pub decimals: u8,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Abnormal price detected for token {token:?}: {price}")]
    AbnormalPriceDetected { token: Address, price: U256 },

    #[error("No price feed registered for token {0:?}")]
    FeedMissing(Address),

    #[error("Price feed query failed for token {token:?}: {reason}")]
    FeedUnavailable { token: Address, reason: String },
}

/// 单个代币的价格源
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn latest_price(&self) -> Result<PricePoint>;
}

struct FeedEntry {
    feed: Arc<dyn PriceFeed>,
    /// 代币本身的小数位 (换算代币数量时用, 与价格源精度无关)
    token_decimals: u8,
}

/// 代币 -> 价格源 的注册表
#[derive(Default)]
pub struct PriceFeedRegistry {
    feeds: DashMap<Address, FeedEntry>,
}

impl PriceFeedRegistry {
    pub fn new() -> Self {
        Self {
            feeds: DashMap::new(),
        }
    }

    pub fn register(&self, token: Address, feed: Arc<dyn PriceFeed>, token_decimals: u8) {
        self.feeds.insert(
            token,
            FeedEntry {
                feed,
                token_decimals,
            },
        );
    }

    pub fn contains(&self, token: &Address) -> bool {
        self.feeds.contains_key(token)
    }

    fn get(&self, token: &Address) -> Option<(Arc<dyn PriceFeed>, u8)> {
        self.feeds
            .get(token)
            .map(|e| (e.feed.clone(), e.token_decimals))
    }
}

/// 预言机路由 - 跨价格源的归一化换算
pub struct OracleRouter {
    registry: Arc<PriceFeedRegistry>,
}

impl OracleRouter {
    pub fn new(registry: Arc<PriceFeedRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PriceFeedRegistry {
        &self.registry
    }

    /// 读取单个代币的价格, 拒绝非正值
    pub async fn price_of(&self, token: Address) -> Result<PricePoint, OracleError> {
        let (feed, _) = self
            .registry
            .get(&token)
            .ok_or(OracleError::FeedMissing(token))?;

        let point = feed
            .latest_price()
            .await
            .map_err(|e| OracleError::FeedUnavailable {
                token,
                reason: format!("{e:?}"),
            })?;

        if point.price.is_zero() {
            return Err(OracleError::AbnormalPriceDetected {
                token,
                price: point.price,
            });
        }

        Ok(point)
    }

    /// base/quote 的相对价格, 1e18 定点
    ///
    /// 两个价格源的精度可能不同, 先各自归一到 1e18 再相除。
    pub async fn relative_price(&self, base: Address, quote: Address) -> Result<U256, OracleError> {
        let base_point = self.price_of(base).await?;
        let quote_point = self.price_of(quote).await?;

        let base_norm = normalize(base_point.price, base_point.decimals);
        let quote_norm = normalize(quote_point.price, quote_point.decimals);

        if quote_norm.is_zero() {
            return Err(OracleError::AbnormalPriceDetected {
                token: quote,
                price: quote_norm,
            });
        }

        Ok(base_norm * U256::exp10(PRICE_SCALE as usize) / quote_norm)
    }

    /// 按参考价把 from 代币数量换算成 to 代币数量
    pub async fn convert(
        &self,
        amount: U256,
        from: Address,
        to: Address,
    ) -> Result<U256, OracleError> {
        if amount.is_zero() || from == to {
            return Ok(amount);
        }

        let (_, from_decimals) = self
            .registry
            .get(&from)
            .ok_or(OracleError::FeedMissing(from))?;
        let (_, to_decimals) = self.registry.get(&to).ok_or(OracleError::FeedMissing(to))?;

        let ratio = self.relative_price(from, to).await?;

        // amount * ratio / 1e18, 再补齐两侧代币自身的小数位差
        let converted = amount * ratio * U256::exp10(to_decimals as usize)
            / U256::exp10(PRICE_SCALE as usize)
            / U256::exp10(from_decimals as usize);

        Ok(converted)
    }

    /// 预言机推导的预期输出: 参考价换算 + 场所费率折减 + 滑点折减
    ///
    /// fee_ppm 以 1e6 为基数 (3000 = 0.3%), slippage_bps 以 1e4 为基数。
    pub async fn expected_output(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        fee_ppm: u32,
        slippage_bps: u32,
    ) -> Result<U256, OracleError> {
        let converted = self.convert(amount_in, token_in, token_out).await?;

        let after_fee = converted * U256::from(1_000_000u64 - fee_ppm as u64) / U256::from(1_000_000u64);
        let after_slippage =
            after_fee * U256::from(10_000u64 - slippage_bps as u64) / U256::from(10_000u64);

        Ok(after_slippage)
    }
}

/// 价格归一到 1e18 定点
fn normalize(price: U256, decimals: u8) -> U256 {
    if (decimals as u32) <= PRICE_SCALE {
        price * U256::exp10((PRICE_SCALE - decimals as u32) as usize)
    } else {
        price / U256::exp10((decimals as u32 - PRICE_SCALE) as usize)
    }
}

// Chainlink 风格聚合器 ABI
abigen!(
    AggregatorV3,
    r#"[
        function latestRoundData() external view returns (uint80 roundId, int256 answer, uint256 startedAt, uint256 updatedAt, uint80 answeredInRound)
        function decimals() external view returns (uint8)
    ]"#
);

/// 链上聚合器价格源
pub struct ChainlinkFeed<M: Middleware> {
    contract: AggregatorV3<M>,
}

impl<M: Middleware + 'static> ChainlinkFeed<M> {
    pub fn new(feed_address: Address, provider: Arc<M>) -> Self {
        Self {
            contract: AggregatorV3::new(feed_address, provider),
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> PriceFeed for ChainlinkFeed<M> {
    async fn latest_price(&self) -> Result<PricePoint> {
        let (_, answer, _, updated_at, _) = self.contract.latest_round_data().call().await?;
        let decimals = self.contract.decimals().call().await?;

        if answer.is_negative() {
            anyhow::bail!("aggregator returned negative answer: {answer}");
        }

        let timestamp = Utc
            .timestamp_opt(updated_at.as_u64() as i64, 0)
            .single()
            .unwrap_or_else(Utc::now);

        Ok(PricePoint {
            price: answer.into_raw(),
            decimals,
            timestamp,
        })
    }
}

/// 固定价格源 - 锚定资产与测试用
pub struct StaticPriceFeed {
    price: U256,
    decimals: u8,
}

impl StaticPriceFeed {
    pub fn new(price: U256, decimals: u8) -> Self {
        Self { price, decimals }
    }
}

#[async_trait]
impl PriceFeed for StaticPriceFeed {
    async fn latest_price(&self) -> Result<PricePoint> {
        Ok(PricePoint {
            price: self.price,
            decimals: self.decimals,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn router_with(feeds: &[(Address, u128, u8, u8)]) -> OracleRouter {
        let registry = Arc::new(PriceFeedRegistry::new());
        for (addr, price, feed_decimals, token_decimals) in feeds {
            registry.register(
                *addr,
                Arc::new(StaticPriceFeed::new(U256::from(*price), *feed_decimals)),
                *token_decimals,
            );
        }
        OracleRouter::new(registry)
    }

    #[tokio::test]
    async fn test_rejects_zero_price() {
        let router = router_with(&[(token(1), 0, 8, 18)]);
        let err = router.price_of(token(1)).await.unwrap_err();
        assert!(matches!(err, OracleError::AbnormalPriceDetected { .. }));
    }

    #[tokio::test]
    async fn test_missing_feed_is_reported() {
        let router = router_with(&[]);
        let err = router.price_of(token(1)).await.unwrap_err();
        assert!(matches!(err, OracleError::FeedMissing(_)));
    }

    #[tokio::test]
    async fn test_relative_price_normalizes_decimals() {
        // base: $3000 with 8 decimals, quote: $1 with 18 decimals
        let base = token(1);
        let quote = token(2);
        let router = router_with(&[
            (base, 3_000_00000000, 8, 18),
            (quote, 1_000000000000000000, 18, 18),
        ]);

        let ratio = router.relative_price(base, quote).await.unwrap();
        assert_eq!(ratio, U256::from(3000u64) * U256::exp10(18));
    }

    #[tokio::test]
    async fn test_convert_respects_token_decimals() {
        // 1 unit of an 18-decimals token at $3000 into a 6-decimals token at $1
        let base = token(1);
        let quote = token(2);
        let router = router_with(&[
            (base, 3_000_00000000, 8, 18),
            (quote, 1_00000000, 8, 6),
        ]);

        let out = router
            .convert(U256::exp10(18), base, quote)
            .await
            .unwrap();
        assert_eq!(out, U256::from(3000u64) * U256::exp10(6));
    }

    #[tokio::test]
    async fn test_expected_output_applies_haircuts() {
        let base = token(1);
        let quote = token(2);
        let router = router_with(&[
            (base, 2_00000000, 8, 18),
            (quote, 1_00000000, 8, 18),
        ]);

        // 1e18 in at ratio 2.0 => 2e18, 0.3% fee then 1% slippage
        let out = router
            .expected_output(base, quote, U256::exp10(18), 3000, 100)
            .await
            .unwrap();

        let after_fee = U256::from(2u64) * U256::exp10(18) * U256::from(997_000u64) / U256::from(1_000_000u64);
        let expected = after_fee * U256::from(9_900u64) / U256::from(10_000u64);
        assert_eq!(out, expected);
    }
}
