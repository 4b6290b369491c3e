//! # 持仓查询路由控制器

use axum::Json;
use axum::extract::State;

use crate::error::ApiError;
use crate::middleware::auth::CurrentAccount;
use crate::server::AppState;
use crate::types::{ApiResponse, LotResponse, PortfolioResponse, PositionResponse};

/// 查询当前账户的持仓总览
///
/// 返回按标的聚合的头寸与全部批次明细（FIFO 序）。
#[utoipa::path(
    get,
    path = "/api/v1/user/portfolio",
    tag = "持仓 (Portfolio)",
    security(("bearer_jwt" = [])),
    responses(
        (status = 200, description = "查询成功", body = ApiResponse<PortfolioResponse>),
        (status = 401, description = "未认证")
    )
)]
pub async fn get_portfolio(
    State(state): State<AppState>,
    CurrentAccount(account_id): CurrentAccount,
) -> Result<Json<ApiResponse<PortfolioResponse>>, ApiError> {
    let positions = state.holdings.portfolio(&account_id).await?;
    let lots = state.holdings.all_lots(&account_id).await?;

    Ok(Json(ApiResponse::ok(PortfolioResponse {
        account_id: account_id.0,
        positions: positions.iter().map(PositionResponse::from).collect(),
        lots: lots.iter().map(LotResponse::from).collect(),
    })))
}
