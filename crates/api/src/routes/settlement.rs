//! # 用户端结算请求路由控制器
//!
//! 创建与查询买入订单 / 提取请求。创建即 Pending，
//! 一切副作用都要等管理员在 Admin 路由组里裁决。

use axum::Json;
use axum::extract::State;

use crate::error::ApiError;
use crate::middleware::auth::CurrentAccount;
use crate::server::AppState;
use crate::types::{
    ApiResponse, OrderResponse, PlaceOrderRequest, PlaceWithdrawalRequest, WithdrawalResponse,
};
use daicho_core::common::AssetType;
use daicho_core::settlement::entity::VoucherId;

/// 提交买入订单
///
/// 报价在创建时锁定并固化到订单上；外部行情不可用时创建失败，
/// 不会留下没有价格的半成品订单。
#[utoipa::path(
    post,
    path = "/api/v1/user/orders",
    tag = "结算 (Settlement)",
    security(("bearer_jwt" = [])),
    request_body = PlaceOrderRequest,
    responses(
        (status = 200, description = "订单已创建 (Pending)", body = ApiResponse<OrderResponse>),
        (status = 400, description = "参数非法"),
        (status = 503, description = "报价不可用")
    )
)]
pub async fn place_order(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ApiError> {
    let asset_type = req
        .asset_type
        .parse::<AssetType>()
        .map_err(ApiError::BadRequest)?;

    let order = state
        .settlement
        .submit_buy(
            account_id,
            &req.symbol,
            asset_type,
            req.quantity,
            req.voucher_id.map(VoucherId),
        )
        .await?;

    Ok(Json(ApiResponse::ok(OrderResponse::from(&order))))
}

/// 查询当前账户的全部买入订单
#[utoipa::path(
    get,
    path = "/api/v1/user/orders",
    tag = "结算 (Settlement)",
    security(("bearer_jwt" = [])),
    responses(
        (status = 200, description = "查询成功", body = ApiResponse<Vec<OrderResponse>>)
    )
)]
pub async fn list_orders(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ApiError> {
    let orders = state.settlement.orders_of(&account_id, None).await?;
    Ok(Json(ApiResponse::ok(
        orders.iter().map(OrderResponse::from).collect(),
    )))
}

/// 提交提取请求
///
/// 创建时做建议性余量检查；权威校验发生在管理员核准时刻，
/// 因为持仓在等待裁决期间可能被其他结算改变。
#[utoipa::path(
    post,
    path = "/api/v1/user/withdrawals",
    tag = "结算 (Settlement)",
    security(("bearer_jwt" = [])),
    request_body = PlaceWithdrawalRequest,
    responses(
        (status = 200, description = "提取请求已创建 (Pending)", body = ApiResponse<WithdrawalResponse>),
        (status = 400, description = "参数非法或当前持仓不足")
    )
)]
pub async fn place_withdrawal(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
    Json(req): Json<PlaceWithdrawalRequest>,
) -> Result<Json<ApiResponse<WithdrawalResponse>>, ApiError> {
    let asset_type = req
        .asset_type
        .parse::<AssetType>()
        .map_err(ApiError::BadRequest)?;

    let withdrawal = state
        .settlement
        .submit_withdrawal(
            account_id,
            &req.symbol,
            asset_type,
            req.quantity,
            &req.payout_destination,
        )
        .await?;

    Ok(Json(ApiResponse::ok(WithdrawalResponse::from(&withdrawal))))
}

/// 查询当前账户的全部提取请求
#[utoipa::path(
    get,
    path = "/api/v1/user/withdrawals",
    tag = "结算 (Settlement)",
    security(("bearer_jwt" = [])),
    responses(
        (status = 200, description = "查询成功", body = ApiResponse<Vec<WithdrawalResponse>>)
    )
)]
pub async fn list_withdrawals(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
) -> Result<Json<ApiResponse<Vec<WithdrawalResponse>>>, ApiError> {
    let withdrawals = state.settlement.withdrawals_of(&account_id, None).await?;
    Ok(Json(ApiResponse::ok(
        withdrawals.iter().map(WithdrawalResponse::from).collect(),
    )))
}
