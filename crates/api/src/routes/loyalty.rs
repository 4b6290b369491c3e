//! # 积分路由控制器 (用户端)

use axum::Json;
use axum::extract::State;

use crate::error::ApiError;
use crate::middleware::auth::CurrentAccount;
use crate::server::AppState;
use crate::types::{
    ApiResponse, LoyaltyBalanceResponse, LoyaltyTransactionResponse, RedeemRequest,
    RedeemResponse, RedeemedItemResponse,
};

/// 查询当前账户的积分余额
#[utoipa::path(
    get,
    path = "/api/v1/user/loyalty/balance",
    tag = "积分 (Loyalty)",
    security(("bearer_jwt" = [])),
    responses(
        (status = 200, description = "查询成功", body = ApiResponse<LoyaltyBalanceResponse>)
    )
)]
pub async fn get_balance(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
) -> Result<Json<ApiResponse<LoyaltyBalanceResponse>>, ApiError> {
    let balance = state.loyalty.balance(&account_id).await?;
    Ok(Json(ApiResponse::ok(LoyaltyBalanceResponse {
        account_id: account_id.0,
        balance,
    })))
}

/// 查询当前账户的积分流水（只追加，时间升序）
#[utoipa::path(
    get,
    path = "/api/v1/user/loyalty/history",
    tag = "积分 (Loyalty)",
    security(("bearer_jwt" = [])),
    responses(
        (status = 200, description = "查询成功", body = ApiResponse<Vec<LoyaltyTransactionResponse>>)
    )
)]
pub async fn get_history(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
) -> Result<Json<ApiResponse<Vec<LoyaltyTransactionResponse>>>, ApiError> {
    let history = state.loyalty.history(&account_id).await?;
    Ok(Json(ApiResponse::ok(
        history.iter().map(LoyaltyTransactionResponse::from).collect(),
    )))
}

/// 查询当前账户的兑换库存
#[utoipa::path(
    get,
    path = "/api/v1/user/loyalty/inventory",
    tag = "积分 (Loyalty)",
    security(("bearer_jwt" = [])),
    responses(
        (status = 200, description = "查询成功", body = ApiResponse<Vec<RedeemedItemResponse>>)
    )
)]
pub async fn get_inventory(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
) -> Result<Json<ApiResponse<Vec<RedeemedItemResponse>>>, ApiError> {
    let inventory = state.loyalty.inventory(&account_id).await?;
    Ok(Json(ApiResponse::ok(
        inventory.iter().map(RedeemedItemResponse::from).collect(),
    )))
}

/// 用积分兑换物品
///
/// 余额校验、负向流水、余额扣减与库存追加在同一原子单元内完成；
/// 余额不足返回 400 且不产生任何变更。
#[utoipa::path(
    post,
    path = "/api/v1/user/loyalty/redeem",
    tag = "积分 (Loyalty)",
    security(("bearer_jwt" = [])),
    request_body = RedeemRequest,
    responses(
        (status = 200, description = "兑换成功", body = ApiResponse<RedeemResponse>),
        (status = 400, description = "参数非法或积分不足")
    )
)]
pub async fn redeem(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
    Json(req): Json<RedeemRequest>,
) -> Result<Json<ApiResponse<RedeemResponse>>, ApiError> {
    let (balance, item) = state
        .loyalty
        .redeem(account_id, &req.item_code, req.points)
        .await?;
    Ok(Json(ApiResponse::ok(RedeemResponse {
        balance,
        item: RedeemedItemResponse::from(&item),
    })))
}
