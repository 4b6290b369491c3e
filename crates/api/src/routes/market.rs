//! # 行情查询路由控制器
//!
//! 只读报价接口：自营盘返回平台持久价，其余标的转发外部行情。

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{ApiResponse, QuoteResponse};
use daicho_core::common::AssetType;

#[derive(Deserialize, utoipa::IntoParams)]
pub struct QuoteQuery {
    /// 资产大类 (stock/crypto/forex/etf)
    pub asset_type: String,
}

/// 查询标的最新报价
///
/// 自营盘标的返回平台权威价；其余标的实时转发外部行情，
/// 行情不可用时返回 503 而不是零价。
#[utoipa::path(
    get,
    path = "/api/v1/market/quote/{symbol}",
    tag = "行情 (Market)",
    params(
        ("symbol" = String, Path, description = "标的代码"),
        QuoteQuery
    ),
    responses(
        (status = 200, description = "报价成功", body = ApiResponse<QuoteResponse>),
        (status = 404, description = "标的未挂牌"),
        (status = 503, description = "外部行情不可用")
    )
)]
pub async fn get_quote(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<ApiResponse<QuoteResponse>>, ApiError> {
    let asset_type = query
        .asset_type
        .parse::<AssetType>()
        .map_err(ApiError::BadRequest)?;

    let quote = state.pricing.get_price(&symbol, asset_type).await?;
    Ok(Json(ApiResponse::ok(QuoteResponse::from(&quote))))
}
