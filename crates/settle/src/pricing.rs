use daicho_core::common::AssetType;
use daicho_core::pricing::entity::{PriceImpact, PriceQuote, PriceSource, pressure_factor};
use daicho_core::pricing::error::PricingError;
use daicho_core::pricing::port::{InstrumentStore, MarketDataPort};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/// # Summary
/// `PricingService` 是全平台报价的唯一门面：
/// 自营盘标的读持久价并独占其变更权（买压抬升），
/// 其余标的的报价一律转发外部行情端口，本服务不落地、不兜底。
pub struct PricingService {
    instruments: Arc<dyn InstrumentStore>,
    market_data: Arc<dyn MarketDataPort>,
    /// 自营盘每单位买入的价格增长基点数
    growth_bps_per_unit: u32,
}

impl PricingService {
    pub fn new(
        instruments: Arc<dyn InstrumentStore>,
        market_data: Arc<dyn MarketDataPort>,
        growth_bps_per_unit: u32,
    ) -> Self {
        Self {
            instruments,
            market_data,
            growth_bps_per_unit,
        }
    }

    /// # Logic
    /// 1. 未挂牌标的直接拒绝。
    /// 2. 自营盘返回持久化的权威价。
    /// 3. 其余标的请求外部行情；行情失败原样上抛 `Unavailable`，
    ///    绝不以零价或陈旧价冒充成功。
    pub async fn get_price(
        &self,
        symbol: &str,
        asset_type: AssetType,
    ) -> Result<PriceQuote, PricingError> {
        let instrument = self
            .instruments
            .get(symbol)
            .await?
            .ok_or_else(|| PricingError::UnknownSymbol(symbol.to_string()))?;

        if instrument.house_listed {
            return Ok(PriceQuote {
                symbol: symbol.to_string(),
                price: instrument.unit_price,
                source: PriceSource::HouseListed,
            });
        }

        let price = self.market_data.latest_price(symbol, asset_type).await?;
        Ok(PriceQuote {
            symbol: symbol.to_string(),
            price,
            source: PriceSource::External,
        })
    }

    /// # Summary
    /// 对自营盘标的施加一次买压。
    ///
    /// # Logic
    /// 1. 数量 <= 0 由 `pressure_factor` 校验拒绝。
    /// 2. 存储端口以原子读-改-写落地 `price * factor`，
    ///    并发买压按乘法叠加，聚合效果与先后次序无关。
    pub async fn apply_buy_pressure(
        &self,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<PriceImpact, PricingError> {
        let factor = pressure_factor(quantity, self.growth_bps_per_unit)?;
        let impact = self.instruments.apply_pressure(symbol, factor).await?;
        info!(
            "Buy pressure on {}: {} -> {} ({:+}%)",
            symbol, impact.previous_price, impact.updated_price, impact.change_pct
        );
        Ok(impact)
    }

    /// # Summary
    /// 为买入结算预计算增长因子：自营盘返回 `Some(factor)`，
    /// 外部定价标的返回 `None`（其价格不归本平台所有）。
    pub async fn buy_pressure_factor(
        &self,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<Option<Decimal>, PricingError> {
        let factor = pressure_factor(quantity, self.growth_bps_per_unit)?;
        match self.instruments.get(symbol).await? {
            Some(instrument) if instrument.house_listed => Ok(Some(factor)),
            Some(_) => Ok(None),
            None => Err(PricingError::UnknownSymbol(symbol.to_string())),
        }
    }
}
