use crate::common::AccountId;
use crate::loyalty::entity::{LoyaltyTransaction, RedeemedItem};
use crate::loyalty::error::LoyaltyError;
use async_trait::async_trait;

/// # Summary
/// 积分台账存储端口："余额 + 不可变流水" 模式。
///
/// # Invariants
/// - 余额列是流水之和的投影，必须与流水在同一原子单元内更新。
/// - 可去重来源的唯一性必须由存储层约束（唯一索引）保证，
///   而不是应用层先查后插——并发下先查后插会双记同一事件。
#[async_trait]
pub trait LoyaltyStore: Send + Sync {
    /// # Summary
    /// 入账一笔获取流水并同步增加余额。
    ///
    /// # Logic
    /// 1. 插入流水；可去重来源命中唯一索引时上抛 `DuplicateEvent`。
    /// 2. 同一事务内把余额加上 `points`。
    ///
    /// # Returns
    /// * `Ok(balance)` - 更新后的余额。
    async fn credit(&self, tx: LoyaltyTransaction) -> Result<i64, LoyaltyError>;

    /// # Summary
    /// 兑换：校验余额、入账负向流水、扣减余额并追加库存记录，
    /// 四步在同一原子单元内完成。
    ///
    /// # Arguments
    /// * `tx` - points 为负的 Redeem 流水。
    /// * `item` - 兑换产生的库存条目。
    ///
    /// # Returns
    /// * `Ok(balance)` - 更新后的余额。
    /// * `Err(InsufficientPoints)` - 余额不足，整体回滚。
    async fn redeem(
        &self,
        tx: LoyaltyTransaction,
        item: RedeemedItem,
    ) -> Result<i64, LoyaltyError>;

    /// 查询账户当前余额（无记录视为 0）。
    async fn balance(&self, account_id: &AccountId) -> Result<i64, LoyaltyError>;

    /// 查询账户全部流水，按创建时间升序。
    async fn transactions(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<LoyaltyTransaction>, LoyaltyError>;

    /// 查询账户兑换库存。
    async fn inventory(&self, account_id: &AccountId) -> Result<Vec<RedeemedItem>, LoyaltyError>;
}
