use crate::common::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// # Summary
/// 积分流水方向。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoyaltyKind {
    /// 获取积分 (points > 0)
    Earn,
    /// 消耗积分 (points < 0)
    Redeem,
}

impl std::fmt::Display for LoyaltyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoyaltyKind::Earn => write!(f, "earn"),
            LoyaltyKind::Redeem => write!(f, "redeem"),
        }
    }
}

impl FromStr for LoyaltyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earn" => Ok(LoyaltyKind::Earn),
            "redeem" => Ok(LoyaltyKind::Redeem),
            _ => Err(format!("Unknown LoyaltyKind: {}", s)),
        }
    }
}

/// # Summary
/// 积分事件来源。`Task` 与 `Referral` 是可去重来源：同一
/// (account, source, source_ref) 的事件只允许入账一次。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointSource {
    /// 任务完成奖励
    Task,
    /// 推荐注册奖励
    Referral,
    /// 积分兑换（消耗）
    Redemption,
    /// 人工调整
    Adjustment,
}

impl PointSource {
    /// 该来源是否参与 (account, source, source_ref) 唯一性去重。
    pub fn dedupable(&self) -> bool {
        matches!(self, PointSource::Task | PointSource::Referral)
    }
}

impl std::fmt::Display for PointSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointSource::Task => write!(f, "task"),
            PointSource::Referral => write!(f, "referral"),
            PointSource::Redemption => write!(f, "redemption"),
            PointSource::Adjustment => write!(f, "adjustment"),
        }
    }
}

impl FromStr for PointSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task" => Ok(PointSource::Task),
            "referral" => Ok(PointSource::Referral),
            "redemption" => Ok(PointSource::Redemption),
            "adjustment" => Ok(PointSource::Adjustment),
            _ => Err(format!("Unknown PointSource: {}", s)),
        }
    }
}

/// # Summary
/// 积分流水记录。只追加，永不修改或删除。
///
/// # Invariants
/// - `points` 带符号：Earn 为正，Redeem 为负。
/// - 账户余额在任何时刻都等于其全部流水 `points` 之和。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltyTransaction {
    pub id: String,
    pub account_id: AccountId,
    pub kind: LoyaltyKind,
    pub source: PointSource,
    /// 来源事件引用（任务 ID / 推荐事件 ID / 兑换单 ID）
    pub source_ref: String,
    pub points: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// # Summary
/// 积分兑换产生的物品库存记录。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemedItem {
    pub id: String,
    pub account_id: AccountId,
    pub item_code: String,
    pub points_spent: i64,
    pub redeemed_at: DateTime<Utc>,
}
