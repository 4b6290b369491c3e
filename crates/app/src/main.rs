use std::path::PathBuf;
use std::sync::Arc;

use daicho_api::server::{AppState, start_server};
use daicho_core::common::time::RealTimeProvider;
use daicho_core::config::AppConfig;
use daicho_core::notify::port::Notifier;
use daicho_feed::yahoo::YahooQuoteProvider;
use daicho_notify::email::EmailNotifier;
use daicho_notify::telegram::TelegramNotifier;
use daicho_settle::loyalty::LoyaltyService;
use daicho_settle::pricing::PricingService;
use daicho_settle::service::SettlementService;
use daicho_store::instrument::SqliteInstrumentStore;
use daicho_store::ledger::SqliteLedgerStore;
use daicho_store::loyalty::SqliteLoyaltyStore;
use tracing::{info, warn};

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责实例化所有具体实现组件并通过 Arc<dyn Trait> 注入到各服务。
///
/// # Logic
/// 1. 初始化全局日志。
/// 2. 加载外部配置（daicho.toml + DAICHO_ 环境变量），失败则用默认值。
/// 3. 实例化基础设施层（SQLite 存储、行情 Feed、通知通道）。
/// 4. 构造应用服务层（Pricing / Settlement / Loyalty）。
/// 5. 启动 API 网关，等待外部信号退出。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    info!("Daicho settlement ledger starting...");

    // 2. 加载配置
    let app_config = load_config();
    daicho_store::config::set_root_dir(PathBuf::from(&app_config.database.data_dir));

    // 3. 实例化基础设施层
    let ledger = Arc::new(SqliteLedgerStore::new().await?);
    let instruments = Arc::new(SqliteInstrumentStore::new(ledger.pool()));
    let loyalty_store = Arc::new(SqliteLoyaltyStore::new().await?);
    let feed = Arc::new(YahooQuoteProvider::new()?);
    let clock = Arc::new(RealTimeProvider);
    let notifier = build_notifier(&app_config);

    // 4. 构造应用服务层（注入 Core Trait 抽象）
    let pricing = Arc::new(PricingService::new(
        instruments.clone(),
        feed,
        app_config.pricing.growth_bps_per_unit,
    ));
    let settlement = Arc::new(SettlementService::new(
        ledger.clone(),
        ledger.clone(),
        pricing.clone(),
        notifier,
        clock.clone(),
    ));
    let loyalty = Arc::new(LoyaltyService::new(loyalty_store, clock));

    let state = AppState {
        settlement,
        pricing,
        loyalty,
        holdings: ledger.clone(),
        instruments,
        jwt_secret: Arc::new(app_config.server.jwt_secret.clone()),
    };

    // 5. 启动 API 网关并挂起等待退出信号
    let bind_addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    tokio::select! {
        result = start_server(state, &bind_addr) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting...");
        }
    }

    Ok(())
}

/// 读取外部配置文件与环境变量覆盖；解析失败回退到默认配置。
fn load_config() -> AppConfig {
    let loaded = config::Config::builder()
        .add_source(config::File::with_name("daicho").required(false))
        .add_source(config::Environment::with_prefix("DAICHO").separator("__"))
        .build()
        .and_then(|c| c.try_deserialize::<AppConfig>());

    match loaded {
        Ok(config) => config,
        Err(e) => {
            warn!("未能加载外部配置, 使用默认值: {}", e);
            AppConfig::default()
        }
    }
}

/// 依配置选择通知通道：SMTP 优先，其次 Telegram，都未配置则关闭通知。
fn build_notifier(config: &AppConfig) -> Option<Arc<dyn Notifier>> {
    if let Some(smtp) = &config.notify.smtp {
        match EmailNotifier::from_config(smtp) {
            Ok(notifier) => {
                info!("Settlement notifications via SMTP ({})", smtp.host);
                return Some(Arc::new(notifier));
            }
            Err(e) => warn!("SMTP 通知初始化失败, 已禁用: {}", e),
        }
    }
    if let Some(telegram) = &config.notify.telegram {
        info!("Settlement notifications via Telegram");
        return Some(Arc::new(TelegramNotifier::from_config(telegram)));
    }
    None
}
