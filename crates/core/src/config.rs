use serde::{Deserialize, Serialize};

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub pricing: PricingConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub data_dir: String,
}

/// 自营挂牌标的的价格增长参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// 每买入一个单位对价格施加的基点数 (1 bp = 0.01%)
    pub growth_bps_per_unit: u32,
}

/// 结算结果通知通道配置。未配置任何通道时通知静默关闭。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub smtp: Option<SmtpConfig>,
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                jwt_secret: "YOUR_SUPER_SECRET_KEY".to_string(), // Default for dev, should be overwritten by config
            },
            database: DatabaseConfig {
                data_dir: "data".to_string(),
            },
            pricing: PricingConfig {
                growth_bps_per_unit: 5,
            },
            notify: NotifyConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.data_dir, "data");
        assert_eq!(config.pricing.growth_bps_per_unit, 5);
        assert!(config.notify.smtp.is_none());
        assert!(config.notify.telegram.is_none());
    }
}
