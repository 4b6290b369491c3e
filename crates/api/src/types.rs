//! # DTO (Data Transfer Object) 层
//!
//! 将内部领域模型转化为面向前端 JSON 输出的轻量结构体。
//! 所有 DTO 必须派生 `utoipa::ToSchema` 以自动进入 Swagger 文档。

use daicho_core::holding::entity::{Lot, PositionView};
use daicho_core::loyalty::entity::{LoyaltyTransaction, RedeemedItem};
use daicho_core::pricing::entity::{PriceImpact, PriceQuote, PriceSource};
use daicho_core::settlement::entity::{
    BuyOrder, BuySettlement, DiscountVoucher, VerifyOutcome, Withdrawal, WithdrawalSettlement,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============================================================
//  通用响应信封
// ============================================================

/// 统一成功响应信封
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    /// 业务码, 0 表示成功
    pub code: i32,
    /// 人类可读信息
    pub message: String,
    /// 业务数据
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: 0,
            message: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn ok_with_msg(message: impl Into<String>, data: T) -> Self {
        Self {
            code: 0,
            message: message.into(),
            data: Some(data),
        }
    }
}

/// 统一错误响应体
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorResponse {
    pub code: i32,
    pub message: String,
}

impl ApiErrorResponse {
    pub fn from_msg(message: impl Into<String>) -> Self {
        Self {
            code: 1,
            message: message.into(),
        }
    }
}

/// JWT Claims。`sub` 为外部鉴权服务下发的账户 ID，`role` 区分普通用户与管理员。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

// ============================================================
//  请求 DTO
// ============================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct PlaceOrderRequest {
    /// 标的代码
    #[schema(example = "GLD-HOUSE")]
    pub symbol: String,
    /// 资产大类 (stock/crypto/forex/etf)
    #[schema(example = "etf")]
    pub asset_type: String,
    /// 买入数量
    pub quantity: Decimal,
    /// 可选折扣凭证 ID
    pub voucher_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PlaceWithdrawalRequest {
    #[schema(example = "GLD-HOUSE")]
    pub symbol: String,
    #[schema(example = "etf")]
    pub asset_type: String,
    /// 提取数量
    pub quantity: Decimal,
    /// 提取去向 (银行账户 / 链上地址)
    #[schema(example = "bank:XX-0001")]
    pub payout_destination: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RejectRequest {
    /// 驳回理由 (仅提取请求落盘)
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpsertInstrumentRequest {
    #[schema(example = "GLD-HOUSE")]
    pub symbol: String,
    #[schema(example = "etf")]
    pub asset_type: String,
    /// 挂牌价 (自营盘的权威价, 外部标的仅展示)
    pub unit_price: Decimal,
    /// 是否自营盘
    pub house_listed: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreditPointsRequest {
    /// 目标账户
    pub account_id: String,
    /// 积分来源 (task/referral/adjustment)
    #[schema(example = "referral")]
    pub source: String,
    /// 来源事件引用 (去重键)
    #[schema(example = "ref-evt-42")]
    pub source_ref: String,
    /// 入账积分 (> 0)
    pub points: i64,
    /// 描述
    pub description: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RedeemRequest {
    /// 兑换物品编码
    #[schema(example = "MUG-01")]
    pub item_code: String,
    /// 消耗积分 (> 0)
    pub points: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrantVoucherRequest {
    pub account_id: String,
    pub description: String,
}

// ============================================================
//  结算相关 DTO
// ============================================================

/// 买入订单 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: String,
    pub account_id: String,
    #[schema(example = "GLD-HOUSE")]
    pub symbol: String,
    #[schema(example = "etf")]
    pub asset_type: String,
    /// 买入数量
    #[schema(example = "10")]
    pub quantity: String,
    /// 下单锁定单价
    #[schema(example = "50.00")]
    pub unit_price: String,
    /// 总金额
    #[schema(example = "500.00")]
    pub total_amount: String,
    pub voucher_id: Option<String>,
    /// 状态 (pending/verified/rejected)
    #[schema(example = "pending")]
    pub status: String,
    /// 创建时间 (ISO 8601)
    pub created_at: String,
}

impl From<&BuyOrder> for OrderResponse {
    fn from(order: &BuyOrder) -> Self {
        Self {
            id: order.id.0.clone(),
            account_id: order.account_id.0.clone(),
            symbol: order.symbol.clone(),
            asset_type: order.asset_type.to_string(),
            quantity: order.quantity.to_string(),
            unit_price: order.unit_price.to_string(),
            total_amount: order.total_amount.to_string(),
            voucher_id: order.voucher_id.as_ref().map(|v| v.0.clone()),
            status: order.status.to_string(),
            created_at: order.created_at.to_rfc3339(),
        }
    }
}

/// 提取请求 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WithdrawalResponse {
    pub id: String,
    pub account_id: String,
    pub symbol: String,
    pub asset_type: String,
    pub quantity: String,
    pub payout_destination: String,
    pub remarks: Option<String>,
    pub status: String,
    pub created_at: String,
}

impl From<&Withdrawal> for WithdrawalResponse {
    fn from(withdrawal: &Withdrawal) -> Self {
        Self {
            id: withdrawal.id.0.clone(),
            account_id: withdrawal.account_id.0.clone(),
            symbol: withdrawal.symbol.clone(),
            asset_type: withdrawal.asset_type.to_string(),
            quantity: withdrawal.quantity.to_string(),
            payout_destination: withdrawal.payout_destination.clone(),
            remarks: withdrawal.remarks.clone(),
            status: withdrawal.status.to_string(),
            created_at: withdrawal.created_at.to_rfc3339(),
        }
    }
}

/// 价格变动 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PriceImpactResponse {
    pub symbol: String,
    #[schema(example = "50.00")]
    pub previous_price: String,
    #[schema(example = "50.25")]
    pub updated_price: String,
    /// 涨幅百分比
    #[schema(example = "0.5")]
    pub change_pct: String,
}

impl From<&PriceImpact> for PriceImpactResponse {
    fn from(impact: &PriceImpact) -> Self {
        Self {
            symbol: impact.symbol.clone(),
            previous_price: impact.previous_price.to_string(),
            updated_price: impact.updated_price.to_string(),
            change_pct: impact.change_pct.to_string(),
        }
    }
}

/// 买入裁决结果 DTO。`outcome = already_processed` 表示请求早已处于
/// 终态, 本次调用没有产生任何副作用。
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BuyVerifyResponse {
    /// settled | already_processed
    #[schema(example = "settled")]
    pub outcome: String,
    /// 请求当前状态
    #[schema(example = "verified")]
    pub status: String,
    /// 新批次 ID (仅 settled)
    pub lot_id: Option<String>,
    /// 自营盘价格变动 (仅 settled 且自营盘)
    pub price_impact: Option<PriceImpactResponse>,
    /// 凭证是否在本次被消费
    pub voucher_consumed: Option<bool>,
}

impl From<&VerifyOutcome<BuySettlement>> for BuyVerifyResponse {
    fn from(outcome: &VerifyOutcome<BuySettlement>) -> Self {
        match outcome {
            VerifyOutcome::Settled(s) => Self {
                outcome: "settled".to_string(),
                status: s.order.status.to_string(),
                lot_id: Some(s.lot.id.0.clone()),
                price_impact: s.price_impact.as_ref().map(PriceImpactResponse::from),
                voucher_consumed: Some(s.voucher_consumed),
            },
            VerifyOutcome::AlreadyProcessed { status } => Self {
                outcome: "already_processed".to_string(),
                status: status.to_string(),
                lot_id: None,
                price_impact: None,
                voucher_consumed: None,
            },
        }
    }
}

/// 提取裁决结果 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WithdrawalVerifyResponse {
    #[schema(example = "settled")]
    pub outcome: String,
    #[schema(example = "verified")]
    pub status: String,
    /// 被整批移除的批次数 (仅 settled)
    pub removed_lots: Option<usize>,
    /// 扣减后的剩余头寸 (仅 settled)
    pub remaining_position: Option<String>,
}

impl From<&VerifyOutcome<WithdrawalSettlement>> for WithdrawalVerifyResponse {
    fn from(outcome: &VerifyOutcome<WithdrawalSettlement>) -> Self {
        match outcome {
            VerifyOutcome::Settled(s) => Self {
                outcome: "settled".to_string(),
                status: s.withdrawal.status.to_string(),
                removed_lots: Some(s.removed_lots),
                remaining_position: Some(s.remaining_position.to_string()),
            },
            VerifyOutcome::AlreadyProcessed { status } => Self {
                outcome: "already_processed".to_string(),
                status: status.to_string(),
                removed_lots: None,
                remaining_position: None,
            },
        }
    }
}

// ============================================================
//  持仓相关 DTO
// ============================================================

/// 持仓批次 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LotResponse {
    pub id: String,
    pub symbol: String,
    pub asset_type: String,
    #[schema(example = "10")]
    pub quantity: String,
    #[schema(example = "50.00")]
    pub unit_price: String,
    pub acquired_at: String,
}

impl From<&Lot> for LotResponse {
    fn from(lot: &Lot) -> Self {
        Self {
            id: lot.id.0.clone(),
            symbol: lot.symbol.clone(),
            asset_type: lot.asset_type.to_string(),
            quantity: lot.quantity.to_string(),
            unit_price: lot.unit_price.to_string(),
            acquired_at: lot.acquired_at.to_rfc3339(),
        }
    }
}

/// 单标的头寸汇总 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PositionResponse {
    pub symbol: String,
    pub asset_type: String,
    #[schema(example = "15")]
    pub total_quantity: String,
    pub lot_count: usize,
}

impl From<&PositionView> for PositionResponse {
    fn from(view: &PositionView) -> Self {
        Self {
            symbol: view.symbol.clone(),
            asset_type: view.asset_type.to_string(),
            total_quantity: view.total_quantity.to_string(),
            lot_count: view.lot_count,
        }
    }
}

/// 账户持仓总览 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PortfolioResponse {
    pub account_id: String,
    pub positions: Vec<PositionResponse>,
    pub lots: Vec<LotResponse>,
}

// ============================================================
//  行情相关 DTO
// ============================================================

/// 报价 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuoteResponse {
    pub symbol: String,
    #[schema(example = "50.00")]
    pub price: String,
    /// house_listed | external
    #[schema(example = "external")]
    pub source: String,
}

impl From<&PriceQuote> for QuoteResponse {
    fn from(quote: &PriceQuote) -> Self {
        Self {
            symbol: quote.symbol.clone(),
            price: quote.price.to_string(),
            source: match quote.source {
                PriceSource::HouseListed => "house_listed".to_string(),
                PriceSource::External => "external".to_string(),
            },
        }
    }
}

// ============================================================
//  积分相关 DTO
// ============================================================

/// 积分余额 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoyaltyBalanceResponse {
    pub account_id: String,
    pub balance: i64,
}

/// 积分流水 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoyaltyTransactionResponse {
    pub id: String,
    /// earn | redeem
    pub kind: String,
    pub source: String,
    pub source_ref: String,
    pub points: i64,
    pub description: String,
    pub created_at: String,
}

impl From<&LoyaltyTransaction> for LoyaltyTransactionResponse {
    fn from(tx: &LoyaltyTransaction) -> Self {
        Self {
            id: tx.id.clone(),
            kind: tx.kind.to_string(),
            source: tx.source.to_string(),
            source_ref: tx.source_ref.clone(),
            points: tx.points,
            description: tx.description.clone(),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// 兑换库存条目 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RedeemedItemResponse {
    pub id: String,
    pub item_code: String,
    pub points_spent: i64,
    pub redeemed_at: String,
}

impl From<&RedeemedItem> for RedeemedItemResponse {
    fn from(item: &RedeemedItem) -> Self {
        Self {
            id: item.id.clone(),
            item_code: item.item_code.clone(),
            points_spent: item.points_spent,
            redeemed_at: item.redeemed_at.to_rfc3339(),
        }
    }
}

/// 兑换结果 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RedeemResponse {
    pub balance: i64,
    pub item: RedeemedItemResponse,
}

/// 折扣凭证 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VoucherResponse {
    pub id: String,
    pub account_id: String,
    pub description: String,
    pub consumed: bool,
    pub created_at: String,
}

impl From<&DiscountVoucher> for VoucherResponse {
    fn from(voucher: &DiscountVoucher) -> Self {
        Self {
            id: voucher.id.0.clone(),
            account_id: voucher.account_id.0.clone(),
            description: voucher.description.clone(),
            consumed: voucher.consumed,
            created_at: voucher.created_at.to_rfc3339(),
        }
    }
}
