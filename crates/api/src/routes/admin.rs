//! # 管理员专有路由控制器
//!
//! 结算裁决（核准/驳回）、标的挂牌与积分入账。
//! 对应的路由受 `auth_middleware` 和 `require_admin` 中间件验证保护。
//! 重复裁决终态请求返回 200 + `already_processed`，而不是错误——
//! 管理后台的重试按钮不应该制造红色告警。

use axum::Json;
use axum::extract::{Path, State};

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{
    ApiResponse, BuyVerifyResponse, CreditPointsRequest, GrantVoucherRequest,
    LoyaltyBalanceResponse, OrderResponse, RejectRequest, UpsertInstrumentRequest,
    VoucherResponse, WithdrawalResponse, WithdrawalVerifyResponse,
};
use daicho_core::common::{AccountId, AssetType};
use daicho_core::loyalty::entity::PointSource;
use daicho_core::pricing::entity::Instrument;
use daicho_core::settlement::entity::{OrderId, VerifyOutcome, WithdrawalId};

/// 待裁决买入订单列表
#[utoipa::path(
    get,
    path = "/api/v1/admin/orders/pending",
    tag = "系统管理 (Admin)",
    security(("bearer_jwt" = [])),
    responses(
        (status = 200, description = "查询成功", body = ApiResponse<Vec<OrderResponse>>),
        (status = 403, description = "无权限执行此操作")
    )
)]
pub async fn pending_orders(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ApiError> {
    let orders = state.settlement.pending_orders().await?;
    Ok(Json(ApiResponse::ok(
        orders.iter().map(OrderResponse::from).collect(),
    )))
}

/// 核准买入订单
///
/// 状态迁移、批次落地、凭证消费与自营盘抬价在一个原子单元内完成。
/// 对终态订单重复调用是良性空操作。
#[utoipa::path(
    post,
    path = "/api/v1/admin/orders/{order_id}/verify",
    tag = "系统管理 (Admin)",
    security(("bearer_jwt" = [])),
    params(
        ("order_id" = String, Path, description = "订单 ID")
    ),
    responses(
        (status = 200, description = "结算完成或已处理", body = ApiResponse<BuyVerifyResponse>),
        (status = 404, description = "订单不存在")
    )
)]
pub async fn verify_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<ApiResponse<BuyVerifyResponse>>, ApiError> {
    let outcome = state.settlement.verify_buy(&OrderId(order_id)).await?;
    let response = BuyVerifyResponse::from(&outcome);

    let message = match &outcome {
        VerifyOutcome::Settled(_) => "已核准",
        VerifyOutcome::AlreadyProcessed { .. } => "该订单已处理",
    };
    Ok(Json(ApiResponse::ok_with_msg(message, response)))
}

/// 驳回买入订单（仅状态迁移，无副作用）
#[utoipa::path(
    post,
    path = "/api/v1/admin/orders/{order_id}/reject",
    tag = "系统管理 (Admin)",
    security(("bearer_jwt" = [])),
    params(
        ("order_id" = String, Path, description = "订单 ID")
    ),
    responses(
        (status = 200, description = "驳回完成或已处理", body = ApiResponse<OrderResponse>),
        (status = 404, description = "订单不存在")
    )
)]
pub async fn reject_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<ApiResponse<OrderResponse>>, ApiError> {
    let outcome = state.settlement.reject_buy(&OrderId(order_id.clone())).await?;
    match outcome {
        VerifyOutcome::Settled(order) => {
            Ok(Json(ApiResponse::ok(OrderResponse::from(&order))))
        }
        VerifyOutcome::AlreadyProcessed { .. } => {
            let order = state
                .settlement
                .get_order(&OrderId(order_id.clone()))
                .await?
                .ok_or_else(|| ApiError::NotFound(order_id))?;
            Ok(Json(ApiResponse::ok_with_msg(
                "该订单已处理",
                OrderResponse::from(&order),
            )))
        }
    }
}

/// 待裁决提取请求列表
#[utoipa::path(
    get,
    path = "/api/v1/admin/withdrawals/pending",
    tag = "系统管理 (Admin)",
    security(("bearer_jwt" = [])),
    responses(
        (status = 200, description = "查询成功", body = ApiResponse<Vec<WithdrawalResponse>>)
    )
)]
pub async fn pending_withdrawals(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<WithdrawalResponse>>>, ApiError> {
    let withdrawals = state.settlement.pending_withdrawals().await?;
    Ok(Json(ApiResponse::ok(
        withdrawals.iter().map(WithdrawalResponse::from).collect(),
    )))
}

/// 核准提取请求
///
/// 余量校验基于核准时刻的批次快照而非请求时刻；不足时返回 400，
/// 错误信息携带 "请求量 vs 当前持有量"，请求保持 Pending 可再裁决。
#[utoipa::path(
    post,
    path = "/api/v1/admin/withdrawals/{withdrawal_id}/verify",
    tag = "系统管理 (Admin)",
    security(("bearer_jwt" = [])),
    params(
        ("withdrawal_id" = String, Path, description = "提取请求 ID")
    ),
    responses(
        (status = 200, description = "结算完成或已处理", body = ApiResponse<WithdrawalVerifyResponse>),
        (status = 400, description = "当前持仓不足, 请求保持 Pending"),
        (status = 404, description = "提取请求不存在")
    )
)]
pub async fn verify_withdrawal(
    State(state): State<AppState>,
    Path(withdrawal_id): Path<String>,
) -> Result<Json<ApiResponse<WithdrawalVerifyResponse>>, ApiError> {
    let outcome = state
        .settlement
        .verify_withdrawal(&WithdrawalId(withdrawal_id))
        .await?;
    let response = WithdrawalVerifyResponse::from(&outcome);

    let message = match &outcome {
        VerifyOutcome::Settled(_) => "已核准",
        VerifyOutcome::AlreadyProcessed { .. } => "该请求已处理",
    };
    Ok(Json(ApiResponse::ok_with_msg(message, response)))
}

/// 驳回提取请求，可附驳回理由
#[utoipa::path(
    post,
    path = "/api/v1/admin/withdrawals/{withdrawal_id}/reject",
    tag = "系统管理 (Admin)",
    security(("bearer_jwt" = [])),
    params(
        ("withdrawal_id" = String, Path, description = "提取请求 ID")
    ),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "驳回完成或已处理", body = ApiResponse<WithdrawalResponse>),
        (status = 404, description = "提取请求不存在")
    )
)]
pub async fn reject_withdrawal(
    State(state): State<AppState>,
    Path(withdrawal_id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<ApiResponse<WithdrawalResponse>>, ApiError> {
    let id = WithdrawalId(withdrawal_id.clone());
    let outcome = state.settlement.reject_withdrawal(&id, req.remarks).await?;
    match outcome {
        VerifyOutcome::Settled(withdrawal) => Ok(Json(ApiResponse::ok(
            WithdrawalResponse::from(&withdrawal),
        ))),
        VerifyOutcome::AlreadyProcessed { .. } => {
            let withdrawal = state
                .settlement
                .get_withdrawal(&id)
                .await?
                .ok_or_else(|| ApiError::NotFound(withdrawal_id))?;
            Ok(Json(ApiResponse::ok_with_msg(
                "该请求已处理",
                WithdrawalResponse::from(&withdrawal),
            )))
        }
    }
}

/// 挂牌或更新标的
///
/// `house_listed = true` 的标的以 `unit_price` 为权威价，
/// 其后只能被买入结算的买压抬升。
#[utoipa::path(
    put,
    path = "/api/v1/admin/instruments",
    tag = "系统管理 (Admin)",
    security(("bearer_jwt" = [])),
    request_body = UpsertInstrumentRequest,
    responses(
        (status = 200, description = "挂牌成功", body = ApiResponse<String>),
        (status = 400, description = "参数非法")
    )
)]
pub async fn upsert_instrument(
    State(state): State<AppState>,
    Json(req): Json<UpsertInstrumentRequest>,
) -> Result<Json<ApiResponse<String>>, ApiError> {
    let asset_type = req
        .asset_type
        .parse::<AssetType>()
        .map_err(ApiError::BadRequest)?;
    if req.unit_price <= rust_decimal::Decimal::ZERO {
        return Err(ApiError::BadRequest("挂牌价必须为正".to_string()));
    }

    state
        .instruments
        .upsert(&Instrument {
            symbol: req.symbol.clone(),
            asset_type,
            unit_price: req.unit_price,
            house_listed: req.house_listed,
        })
        .await?;

    tracing::info!("Admin upserted instrument {}", req.symbol);
    Ok(Json(ApiResponse::ok(req.symbol)))
}

/// 为账户入账积分（任务完成 / 推荐注册等流程的回调入口）
///
/// 同一 (account, source, source_ref) 事件只会入账一次，
/// 重复提交返回 409。
#[utoipa::path(
    post,
    path = "/api/v1/admin/loyalty/credit",
    tag = "系统管理 (Admin)",
    security(("bearer_jwt" = [])),
    request_body = CreditPointsRequest,
    responses(
        (status = 200, description = "入账成功", body = ApiResponse<LoyaltyBalanceResponse>),
        (status = 409, description = "重复的积分事件")
    )
)]
pub async fn credit_points(
    State(state): State<AppState>,
    Json(req): Json<CreditPointsRequest>,
) -> Result<Json<ApiResponse<LoyaltyBalanceResponse>>, ApiError> {
    let source = req
        .source
        .parse::<PointSource>()
        .map_err(ApiError::BadRequest)?;

    let account_id = AccountId(req.account_id.clone());
    let balance = state
        .loyalty
        .credit(
            account_id,
            source,
            &req.source_ref,
            req.points,
            &req.description,
        )
        .await?;

    Ok(Json(ApiResponse::ok(LoyaltyBalanceResponse {
        account_id: req.account_id,
        balance,
    })))
}

/// 为账户发放折扣凭证
#[utoipa::path(
    post,
    path = "/api/v1/admin/vouchers",
    tag = "系统管理 (Admin)",
    security(("bearer_jwt" = [])),
    request_body = GrantVoucherRequest,
    responses(
        (status = 200, description = "发放成功", body = ApiResponse<VoucherResponse>)
    )
)]
pub async fn grant_voucher(
    State(state): State<AppState>,
    Json(req): Json<GrantVoucherRequest>,
) -> Result<Json<ApiResponse<VoucherResponse>>, ApiError> {
    let voucher = state
        .settlement
        .grant_voucher(AccountId(req.account_id), &req.description)
        .await?;
    Ok(Json(ApiResponse::ok(VoucherResponse::from(&voucher))))
}
