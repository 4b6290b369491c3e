use daicho_core::common::AccountId;
use daicho_core::common::time::TimeProvider;
use daicho_core::loyalty::entity::{
    LoyaltyKind, LoyaltyTransaction, PointSource, RedeemedItem,
};
use daicho_core::loyalty::error::LoyaltyError;
use daicho_core::loyalty::port::LoyaltyStore;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// # Summary
/// 积分台账服务："余额 + 不可变流水" 的业务门面。
/// 推荐注册与任务完成流程经 `credit` 入账，商城兑换经 `redeem` 扣减。
///
/// # Invariants
/// - 余额永远等于流水之和，`reconcile` 随时可验证。
/// - 同一可去重事件 (account, source, source_ref) 只入账一次，
///   由存储层唯一约束兜底。
pub struct LoyaltyService {
    store: Arc<dyn LoyaltyStore>,
    clock: Arc<dyn TimeProvider>,
}

impl LoyaltyService {
    pub fn new(store: Arc<dyn LoyaltyStore>, clock: Arc<dyn TimeProvider>) -> Self {
        Self { store, clock }
    }

    /// # Summary
    /// 为一个积分事件入账。
    ///
    /// # Logic
    /// 1. 积分必须为正；兑换来源不允许走入账通道。
    /// 2. 构造 Earn 流水并交存储层原子追加（含去重与余额更新）。
    ///
    /// # Returns
    /// * `Ok(balance)` - 入账后的新余额。
    pub async fn credit(
        &self,
        account_id: AccountId,
        source: PointSource,
        source_ref: &str,
        points: i64,
        description: &str,
    ) -> Result<i64, LoyaltyError> {
        if points <= 0 {
            return Err(LoyaltyError::Validation(format!(
                "入账积分必须为正, 实际: {}",
                points
            )));
        }
        if source == PointSource::Redemption {
            return Err(LoyaltyError::Validation(
                "兑换来源不允许入账正向积分".to_string(),
            ));
        }
        if source.dedupable() && source_ref.trim().is_empty() {
            return Err(LoyaltyError::Validation(
                "可去重来源必须携带事件引用".to_string(),
            ));
        }

        let tx = LoyaltyTransaction {
            id: Uuid::new_v4().to_string(),
            account_id,
            kind: LoyaltyKind::Earn,
            source,
            source_ref: source_ref.to_string(),
            points,
            description: description.to_string(),
            created_at: self.clock.now(),
        };
        self.store.credit(tx).await
    }

    /// # Summary
    /// 用积分兑换一件物品。
    ///
    /// # Logic
    /// 1. 校验积分与物品编码。
    /// 2. 构造负向 Redeem 流水与库存条目，交存储层在同一原子单元内
    ///    完成余额校验、流水追加、余额扣减与库存落地。
    ///
    /// # Returns
    /// * `Ok((balance, item))` - 兑换后的余额与库存条目。
    pub async fn redeem(
        &self,
        account_id: AccountId,
        item_code: &str,
        points: i64,
    ) -> Result<(i64, RedeemedItem), LoyaltyError> {
        if points <= 0 {
            return Err(LoyaltyError::Validation(format!(
                "兑换积分必须为正, 实际: {}",
                points
            )));
        }
        if item_code.trim().is_empty() {
            return Err(LoyaltyError::Validation("物品编码不能为空".to_string()));
        }

        let redemption_ref = Uuid::new_v4().to_string();
        let now = self.clock.now();
        let tx = LoyaltyTransaction {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.clone(),
            kind: LoyaltyKind::Redeem,
            source: PointSource::Redemption,
            source_ref: redemption_ref.clone(),
            points: -points,
            description: format!("兑换物品 {}", item_code),
            created_at: now,
        };
        let item = RedeemedItem {
            id: redemption_ref,
            account_id: account_id.clone(),
            item_code: item_code.to_string(),
            points_spent: points,
            redeemed_at: now,
        };

        let balance = self.store.redeem(tx, item.clone()).await?;
        info!(
            "Account {} redeemed {} for {} points",
            account_id.0, item.item_code, points
        );
        Ok((balance, item))
    }

    pub async fn balance(&self, account_id: &AccountId) -> Result<i64, LoyaltyError> {
        self.store.balance(account_id).await
    }

    pub async fn history(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<LoyaltyTransaction>, LoyaltyError> {
        self.store.transactions(account_id).await
    }

    pub async fn inventory(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<RedeemedItem>, LoyaltyError> {
        self.store.inventory(account_id).await
    }

    /// # Summary
    /// 对账：返回 (余额投影, 流水之和)。二者在任何时刻必须相等，
    /// 这是直接可测的系统性质而非默认信任。
    pub async fn reconcile(&self, account_id: &AccountId) -> Result<(i64, i64), LoyaltyError> {
        let balance = self.store.balance(account_id).await?;
        let sum: i64 = self
            .store
            .transactions(account_id)
            .await?
            .iter()
            .map(|t| t.points)
            .sum();
        Ok((balance, sum))
    }
}
