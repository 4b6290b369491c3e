use crate::common::{AccountId, AssetType};
use crate::holding::entity::{Lot, PositionView};
use crate::settlement::error::SettleError;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// # Summary
/// 持仓批次的只读查询端口。
/// 批次的一切写入都发生在结算端口的原子事务内部（核准买入追加、
/// 核准提取扣减），本端口刻意不暴露任何变更方法。
///
/// # Invariants
/// - 实现必须是 `Send + Sync`。
/// - `lots` 返回的批次必须按 (acquired_at, id) 升序排列。
#[async_trait]
pub trait HoldingsPort: Send + Sync {
    /// 查询账户在单一标的上的全部批次（FIFO 序）。
    ///
    /// # Arguments
    /// * `account_id` - 归属账户。
    /// * `symbol` / `asset_type` - 标的定位二元组。
    async fn lots(
        &self,
        account_id: &AccountId,
        symbol: &str,
        asset_type: AssetType,
    ) -> Result<Vec<Lot>, SettleError>;

    /// 查询账户全部批次（跨标的，FIFO 序）。
    async fn all_lots(&self, account_id: &AccountId) -> Result<Vec<Lot>, SettleError>;

    /// 汇总账户在单一标的上的总头寸（批次数量之和，空仓为 0）。
    async fn position(
        &self,
        account_id: &AccountId,
        symbol: &str,
        asset_type: AssetType,
    ) -> Result<Decimal, SettleError>;

    /// 按标的聚合的账户头寸总览。
    async fn portfolio(&self, account_id: &AccountId) -> Result<Vec<PositionView>, SettleError>;
}
