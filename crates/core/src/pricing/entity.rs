use crate::common::AssetType;
use crate::pricing::error::PricingError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// # Summary
/// 平台挂牌标的。`house_listed = true` 的标的（自营盘）以 `unit_price`
/// 为唯一权威价格，且只能被买压结算修改；外部定价标的的 `unit_price`
/// 仅作参考展示，权威报价永远走外部行情端口。
///
/// # Invariants
/// - `symbol` 全局唯一。
/// - 自营盘价格只升不降（买压因子恒 >= 1）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub asset_type: AssetType,
    pub unit_price: Decimal,
    pub house_listed: bool,
}

/// # Summary
/// 报价来源标记，区分自营盘持久价与外部行情价。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    HouseListed,
    External,
}

/// # Summary
/// 一次成功的报价解析结果。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: Decimal,
    pub source: PriceSource,
}

/// # Summary
/// 一次买压生效后的价格变动记录，供前端展示涨幅。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceImpact {
    pub symbol: String,
    pub previous_price: Decimal,
    pub updated_price: Decimal,
    /// 涨幅百分比，(updated - previous) / previous * 100
    pub change_pct: Decimal,
}

impl PriceImpact {
    /// 由前后价格构造变动记录。previous 为零时涨幅记为零（防御除零）。
    pub fn between(symbol: &str, previous: Decimal, updated: Decimal) -> Self {
        let change_pct = if previous.is_zero() {
            Decimal::ZERO
        } else {
            (updated - previous) / previous * Decimal::ONE_HUNDRED
        };
        Self {
            symbol: symbol.to_string(),
            previous_price: previous,
            updated_price: updated,
            change_pct,
        }
    }
}

/// # Summary
/// 买压增长因子：`1 + quantity * bps / 10_000`。
/// 乘法叠加使并发买压的聚合效果与先后次序无关。
///
/// # Logic
/// 1. 校验数量为正，非正数直接拒绝。
/// 2. 由配置的每单位基点数换算增长比例。
///
/// # Returns
/// * `Ok(factor)` - 恒大于 1 的价格乘数。
/// * `Err(PricingError::Validation)` - 数量 <= 0。
pub fn pressure_factor(quantity: Decimal, growth_bps_per_unit: u32) -> Result<Decimal, PricingError> {
    if quantity <= Decimal::ZERO {
        return Err(PricingError::Validation(format!(
            "buy pressure quantity must be positive, got {}",
            quantity
        )));
    }
    let bps = Decimal::from(growth_bps_per_unit);
    Ok(Decimal::ONE + quantity * bps / Decimal::from(10_000u32))
}
