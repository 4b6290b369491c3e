use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub mod time;

/// # Summary
/// 系统内的唯一账户标识，用于隔离不同用户的持仓、结算请求与积分体系。
///
/// # Invariants
/// - AccountId 在整个系统中必须全局唯一。
/// - 核心层信任外部鉴权协作方下发的 AccountId，不做二次认证。
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// # Summary
/// 资产大类枚举。平台同时挂牌股票、加密货币、外汇与 ETF，
/// 持仓与结算请求都按 (symbol, asset_type) 二元组定位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    // 股票
    Stock,
    // 加密货币
    Crypto,
    // 外汇
    Forex,
    // 交易型开放式基金
    Etf,
}

impl FromStr for AssetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stock" => Ok(AssetType::Stock),
            "crypto" => Ok(AssetType::Crypto),
            "forex" => Ok(AssetType::Forex),
            "etf" => Ok(AssetType::Etf),
            _ => Err(format!("Unknown AssetType: {}", s)),
        }
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetType::Stock => write!(f, "stock"),
            AssetType::Crypto => write!(f, "crypto"),
            AssetType::Forex => write!(f, "forex"),
            AssetType::Etf => write!(f, "etf"),
        }
    }
}
