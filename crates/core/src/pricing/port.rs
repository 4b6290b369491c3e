use crate::common::AssetType;
use crate::pricing::entity::{Instrument, PriceImpact};
use crate::pricing::error::PricingError;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// # Summary
/// 挂牌标的存储端口。
///
/// # Invariants
/// - `apply_pressure` 必须是对当前价格的单次原子读-改-写：
///   并发调用同一 symbol 时不允许出现基于陈旧读数的覆盖写（丢失更新）。
#[async_trait]
pub trait InstrumentStore: Send + Sync {
    /// 查询挂牌标的，未挂牌返回 `None`。
    async fn get(&self, symbol: &str) -> Result<Option<Instrument>, PricingError>;

    /// 新增或整体更新一个挂牌标的（管理员操作）。
    async fn upsert(&self, instrument: &Instrument) -> Result<(), PricingError>;

    /// # Summary
    /// 对自营盘标的施加一次价格乘数并返回变动记录。
    ///
    /// # Logic
    /// 1. 在单个写事务（或等价的写锁）内读出当前价格。
    /// 2. 校验标的存在且为自营盘、因子 >= 1（价格只升不降）。
    /// 3. 写回 `price * factor` 并产出 `PriceImpact`。
    ///
    /// # Arguments
    /// * `symbol` - 自营盘标的代码。
    /// * `factor` - 由 `pressure_factor` 产出的增长乘数。
    async fn apply_pressure(
        &self,
        symbol: &str,
        factor: Decimal,
    ) -> Result<PriceImpact, PricingError>;
}

/// # Summary
/// 外部行情协作方端口，仅服务于非自营盘标的的报价。
///
/// # Invariants
/// - 行情失败必须以 `PricingError::Unavailable` 显式上抛，
///   实现不得以零价或缓存脏值冒充成功。
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// 获取标的的最新市场单价。
    ///
    /// # Arguments
    /// * `symbol` - 标的代码。
    /// * `asset_type` - 资产大类（供实现方选择行情通道）。
    async fn latest_price(&self, symbol: &str, asset_type: AssetType)
    -> Result<Decimal, PricingError>;
}
