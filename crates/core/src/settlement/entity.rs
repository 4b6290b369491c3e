use crate::common::{AccountId, AssetType};
use crate::holding::entity::{Lot, LotId};
use crate::pricing::entity::PriceImpact;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// # Summary
/// 买入订单的系统内唯一标识。
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct OrderId(pub String);

/// # Summary
/// 提取请求的系统内唯一标识。
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalId(pub String);

/// # Summary
/// 预付折扣凭证的系统内唯一标识。
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct VoucherId(pub String);

/// # Summary
/// 结算请求的生命周期状态。
/// `Pending` 是唯一的非终态；`Verified` / `Rejected` 为终态，
/// 进入终态后请求不可再变更。
///
/// # Invariants
/// - 合法迁移只有 `Pending -> Verified` 与 `Pending -> Rejected`。
/// - 只有 `Pending -> Verified` 的迁移允许携带持仓/价格副作用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// 等待管理员裁决
    Pending,
    /// 已核准并完成结算
    Verified,
    /// 已驳回，无任何副作用
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Verified | RequestStatus::Rejected)
    }

    /// # Logic
    /// 状态机迁移守卫：仅接受从 `Pending` 出发的迁移，
    /// 其余情况返回当前（终）态供调用方构造幂等的 "已处理" 应答。
    pub fn transition(self, to: RequestStatus) -> Result<RequestStatus, RequestStatus> {
        if self == RequestStatus::Pending && to.is_terminal() {
            Ok(to)
        } else {
            Err(self)
        }
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "verified" => Ok(RequestStatus::Verified),
            "rejected" => Ok(RequestStatus::Rejected),
            _ => Err(format!("Unknown RequestStatus: {}", s)),
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Verified => write!(f, "verified"),
            RequestStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// # Summary
/// 买入结算请求。由用户端流程创建，只能被管理员裁决一次；
/// 核准时以 `unit_price` 形成新的持仓批次。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyOrder {
    /// 系统内全局唯一的订单 ID
    pub id: OrderId,
    /// 归属账户
    pub account_id: AccountId,
    /// 资产标的
    pub symbol: String,
    /// 资产大类
    pub asset_type: AssetType,
    /// 买入数量（绝对值，> 0）
    pub quantity: Decimal,
    /// 下单时锁定的单价
    pub unit_price: Decimal,
    /// 总金额 = quantity * unit_price，创建时一次性固化
    pub total_amount: Decimal,
    /// 可选关联的预付折扣凭证
    pub voucher_id: Option<VoucherId>,
    /// 生命周期状态
    pub status: RequestStatus,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl BuyOrder {
    /// # Logic
    /// 创建一笔全新的买入请求，初始状态为 Pending，总额由单价与数量固化。
    pub fn new(
        id: OrderId,
        account_id: AccountId,
        symbol: String,
        asset_type: AssetType,
        quantity: Decimal,
        unit_price: Decimal,
        voucher_id: Option<VoucherId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            account_id,
            symbol,
            asset_type,
            quantity,
            unit_price,
            total_amount: quantity * unit_price,
            voucher_id,
            status: RequestStatus::Pending,
            created_at,
        }
    }
}

/// # Summary
/// 提取（卖出）结算请求。创建时做建议性头寸检查，核准时以当时的
/// 批次快照做权威校验并执行 FIFO 扣减。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub account_id: AccountId,
    pub symbol: String,
    pub asset_type: AssetType,
    /// 提取数量（> 0）
    pub quantity: Decimal,
    /// 提取去向（外部地址 / 银行账户等，仅透传）
    pub payout_destination: String,
    /// 管理员备注（驳回理由等）
    pub remarks: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

impl Withdrawal {
    pub fn new(
        id: WithdrawalId,
        account_id: AccountId,
        symbol: String,
        asset_type: AssetType,
        quantity: Decimal,
        payout_destination: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            account_id,
            symbol,
            asset_type,
            quantity,
            payout_destination,
            remarks: None,
            status: RequestStatus::Pending,
            created_at,
        }
    }
}

/// # Summary
/// 预付折扣凭证：订单可引用一张凭证，核准时按凭证自身 id 做
/// CAS 消费，同一张凭证永远只能被消费一次。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountVoucher {
    pub id: VoucherId,
    pub account_id: AccountId,
    pub description: String,
    pub consumed: bool,
    pub created_at: DateTime<Utc>,
}

/// # Summary
/// 买入核准成功后的结算回执。
#[derive(Debug, Clone)]
pub struct BuySettlement {
    pub order: BuyOrder,
    /// 本次核准新生成的持仓批次
    pub lot: Lot,
    /// 自营盘标的的价格变动（非自营盘为 None）
    pub price_impact: Option<PriceImpact>,
    /// 关联凭证是否在本次结算中被消费
    pub voucher_consumed: bool,
}

/// # Summary
/// 提取核准成功后的结算回执。
#[derive(Debug, Clone)]
pub struct WithdrawalSettlement {
    pub withdrawal: Withdrawal,
    /// 被整批移除的批次数
    pub removed_lots: usize,
    /// 被部分扣减的批次（若有）
    pub shrunk_lot: Option<LotId>,
    /// 扣减后该标的的剩余头寸
    pub remaining_position: Decimal,
}

/// # Summary
/// 裁决操作的统一出参：要么真正发生了结算/驳回，要么请求早已处于
/// 终态 —— 后者是良性的幂等空操作，不是错误。
#[derive(Debug, Clone)]
pub enum VerifyOutcome<T> {
    /// 本次调用完成了状态迁移（及其副作用）
    Settled(T),
    /// 请求已处于终态，本次调用未做任何事
    AlreadyProcessed { status: RequestStatus },
}

impl<T> VerifyOutcome<T> {
    pub fn is_settled(&self) -> bool {
        matches!(self, VerifyOutcome::Settled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_transitions() {
        assert_eq!(
            RequestStatus::Pending.transition(RequestStatus::Verified),
            Ok(RequestStatus::Verified)
        );
        assert_eq!(
            RequestStatus::Pending.transition(RequestStatus::Rejected),
            Ok(RequestStatus::Rejected)
        );
        // 终态不可再迁移，返回当前状态
        assert_eq!(
            RequestStatus::Verified.transition(RequestStatus::Rejected),
            Err(RequestStatus::Verified)
        );
        assert_eq!(
            RequestStatus::Rejected.transition(RequestStatus::Verified),
            Err(RequestStatus::Rejected)
        );
        // Pending -> Pending 不是合法迁移
        assert_eq!(
            RequestStatus::Pending.transition(RequestStatus::Pending),
            Err(RequestStatus::Pending)
        );
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for s in [
            RequestStatus::Pending,
            RequestStatus::Verified,
            RequestStatus::Rejected,
        ] {
            assert_eq!(s.to_string().parse::<RequestStatus>(), Ok(s));
        }
        assert!("settled".parse::<RequestStatus>().is_err());
    }
}
