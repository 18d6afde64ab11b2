use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub guardrails: GuardrailDefaults,
    pub execution: ExecutionConfig,
    pub venues: VenueContracts,
    pub chain: ChainConfig,
    pub log: LogConfig,
}

/// 防护参数默认值 - 引擎启动时的初始策略, 运行期由 owner 调整
#[derive(Debug, Clone, Deserialize)]
pub struct GuardrailDefaults {
    /// 最低净利润阈值 (借入代币最小单位)
    pub min_profit_threshold_wei: u128,
    /// 滑点容忍度 (基点, 上限 1000)
    pub slippage_tolerance_bps: u32,
    /// 最大可接受 gas 价格 (Gwei) - 支持小数, 如 0.08
    pub max_gas_price_gwei: f64,
    /// 熔断器初始状态
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// 单腿 swap 截止时间 (秒), 限制陈旧路由状态的暴露窗口
    pub swap_deadline_secs: u64,
    /// 费率分层场所的默认 fee tier (3000 = 0.3%)
    pub default_fee_tier: u32,
    /// 结算阶段预留的固定 gas 缓冲
    pub settlement_gas_buffer: u64,
    /// 报价失败时的 minOut 兜底策略
    pub quote_fallback: QuoteFallback,
}

/// 报价设施失效时的兜底策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum QuoteFallback {
    /// 接受任何非零输出 (参考行为, 滑点保护此时失效)
    AnyNonZero,
    /// 用预言机推导的保底输出 (无价格源时退回 AnyNonZero)
    OracleFloor,
}

/// 链上合约地址配置
#[derive(Debug, Clone, Deserialize)]
pub struct VenueContracts {
    /// 费率分层场所的 router 地址
    pub tiered_router: String,
    /// 费率分层场所的 quoter 地址
    pub tiered_quoter: String,
    /// 路径路由场所的 router 地址
    pub path_router: String,
    /// 借贷设施 (闪电贷池) 地址
    pub lending_pool: String,
    /// Wrapped Native Token 地址 (gas 成本换算基准)
    pub wrapped_native: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub rpc_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub file_path: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // 加载 .env 文件
        dotenv::dotenv().ok();

        let guardrails = GuardrailDefaults {
            min_profit_threshold_wei: env::var("MIN_PROFIT_THRESHOLD_WEI")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
            slippage_tolerance_bps: env::var("SLIPPAGE_TOLERANCE_BPS")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),
            max_gas_price_gwei: env::var("MAX_GAS_PRICE_GWEI")
                .unwrap_or_else(|_| "100.0".to_string())
                .parse()
                .unwrap_or(100.0),
            active: env::var("ENGINE_ACTIVE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        };

        let quote_fallback = match env::var("QUOTE_FALLBACK")
            .unwrap_or_else(|_| "any_nonzero".to_string())
            .to_lowercase()
            .as_str()
        {
            "oracle_floor" => QuoteFallback::OracleFloor,
            _ => QuoteFallback::AnyNonZero,
        };

        let execution = ExecutionConfig {
            swap_deadline_secs: env::var("SWAP_DEADLINE_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
            default_fee_tier: env::var("DEFAULT_FEE_TIER")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),
            settlement_gas_buffer: env::var("SETTLEMENT_GAS_BUFFER")
                .unwrap_or_else(|_| "120000".to_string())
                .parse()
                .unwrap_or(120_000),
            quote_fallback,
        };

        let venues = VenueContracts {
            tiered_router: env::var("TIERED_ROUTER_ADDRESS")
                .unwrap_or_else(|_| "0xE592427A0AEce92De3Edee1F18E0157C05861564".to_string()),
            tiered_quoter: env::var("TIERED_QUOTER_ADDRESS")
                .unwrap_or_else(|_| "0x61fFE014bA17989E743c5F6cB21bF9697530B21e".to_string()),
            path_router: env::var("PATH_ROUTER_ADDRESS")
                .unwrap_or_else(|_| "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D".to_string()),
            lending_pool: env::var("LENDING_POOL_ADDRESS")
                .unwrap_or_else(|_| "0x87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2".to_string()),
            wrapped_native: env::var("WRAPPED_NATIVE_ADDRESS")
                .unwrap_or_else(|_| "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".to_string()),
        };

        let chain = ChainConfig {
            chain_id: env::var("CHAIN_ID")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .context("Invalid CHAIN_ID")?,
            rpc_url: env::var("ETH_RPC_URL")
                .unwrap_or_else(|_| "https://eth-mainnet.g.alchemy.com/v2/demo".to_string()),
        };

        let log = LogConfig {
            level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            file_path: env::var("LOG_FILE_PATH")
                .unwrap_or_else(|_| "./logs/arb_engine.log".to_string()),
        };

        Ok(Self {
            guardrails,
            execution,
            venues,
            chain,
            log,
        })
    }
}
