use std::fs;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, fmt, Layer};
use tracing_subscriber::filter::{LevelFilter, FilterFn};
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_appender::{non_blocking, rolling};
use time::macros::offset;

/// 日志管理器 - 基于target分类的日志系统
pub struct LoggerManager {
    _guards: Vec<non_blocking::WorkerGuard>,
}

impl LoggerManager {
    /// 初始化日志系统
    ///
    /// 日志分类：
    /// - app.log: 通用应用日志
    /// - trade.log: 套利执行日志 (逐腿 swap 与结算)
    /// - audit.log: 审计事件日志 (配置变更/熔断/结算结果)
    pub fn init() -> Self {
        let mut guards = Vec::new();

        // 创建日志目录
        fs::create_dir_all("logs").ok();

        // 配置时区为东八区 (UTC+8 上海时间)
        let timer = OffsetTime::new(
            offset!(+8),
            time::format_description::well_known::Rfc3339,
        );

        // 1. 控制台输出 - 显示INFO级别
        let console_layer = fmt::layer()
            .compact()
            .with_target(true)
            .with_timer(timer.clone())
            .with_filter(LevelFilter::INFO);

        // 2. 通用应用日志 (app.log)
        let (app_writer, app_guard) = {
            let appender = rolling::daily("logs", "app.log");
            non_blocking(appender)
        };
        guards.push(app_guard);

        let app_layer = fmt::layer()
            .compact()
            .with_writer(app_writer)
            .with_ansi(false)
            .with_target(true)
            .with_timer(timer.clone())
            .with_filter(LevelFilter::INFO)
            .with_filter(FilterFn::new(|metadata| {
                // 排除专用 target 的日志
                !matches!(metadata.target(), "arbitrage_execution" | "arbitrage_audit")
            }));

        // 3. 套利执行日志 (trade.log)
        let (trade_writer, trade_guard) = {
            let appender = rolling::daily("logs", "trade.log");
            non_blocking(appender)
        };
        guards.push(trade_guard);

        let trade_layer = fmt::layer()
            .compact()
            .with_writer(trade_writer)
            .with_ansi(false)
            .with_target(true)
            .with_timer(timer.clone())
            .with_filter(FilterFn::new(|metadata| {
                metadata.target() == "arbitrage_execution"
            }));

        // 4. 审计事件日志 (audit.log)
        let (audit_writer, audit_guard) = {
            let appender = rolling::daily("logs", "audit.log");
            non_blocking(appender)
        };
        guards.push(audit_guard);

        let audit_layer = fmt::layer()
            .compact()
            .with_writer(audit_writer)
            .with_ansi(false)
            .with_target(true)
            .with_timer(timer)
            .with_filter(FilterFn::new(|metadata| {
                metadata.target() == "arbitrage_audit"
            }));

        // 初始化tracing订阅器
        tracing_subscriber::registry()
            .with(console_layer)
            .with(app_layer)
            .with(trade_layer)
            .with(audit_layer)
            .init();

        Self { _guards: guards }
    }
}
