//! # API 统一错误处理
//!
//! 将下层各 crate 的错误类型统一映射到 HTTP 状态码与 JSON 响应体。

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::types::ApiErrorResponse;

/// API 层统一错误枚举
#[derive(Error, Debug)]
pub enum ApiError {
    /// 认证失败 (401)
    #[error("认证失败: {0}")]
    Unauthorized(String),

    /// 权限不足 (403)
    #[error("权限不足: {0}")]
    Forbidden(String),

    /// 资源未找到 (404)
    #[error("资源未找到: {0}")]
    NotFound(String),

    /// 请求参数或业务规则错误 (400)
    #[error("请求参数错误: {0}")]
    BadRequest(String),

    /// 并发冲突或重复事件 (409)
    #[error("冲突: {0}")]
    Conflict(String),

    /// 下游依赖不可用 (503)
    #[error("依赖服务不可用: {0}")]
    ServiceUnavailable(String),

    /// 下层业务错误 (500)
    #[error("内部服务错误: {0}")]
    Internal(String),
}

/// 将 `ApiError` 转换为 axum 的 HTTP 响应
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::Internal(msg) => {
                // 内部错误只记录日志，不向客户端透传细节
                tracing::error!("内部服务错误: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "服务器内部错误".to_string(),
                )
            }
        };

        let body = Json(ApiErrorResponse::from_msg(message));
        (status, body).into_response()
    }
}

/// 从 `SettleError` 转换
impl From<daicho_core::settlement::error::SettleError> for ApiError {
    fn from(err: daicho_core::settlement::error::SettleError) -> Self {
        use daicho_core::settlement::error::SettleError;
        match &err {
            SettleError::Validation(_) => ApiError::BadRequest(err.to_string()),
            SettleError::RequestNotFound(msg) => ApiError::NotFound(msg.clone()),
            // 业务规则拒绝: 请求仍可被驳回或重试, 错误体里带当前持有量
            SettleError::InsufficientHoldings { .. } => ApiError::BadRequest(err.to_string()),
            SettleError::Conflict(msg) => ApiError::Conflict(msg.clone()),
            SettleError::DependencyUnavailable { .. } => {
                ApiError::ServiceUnavailable(err.to_string())
            }
            SettleError::Store(_) => ApiError::Internal(err.to_string()),
        }
    }
}

/// 从 `LoyaltyError` 转换
impl From<daicho_core::loyalty::error::LoyaltyError> for ApiError {
    fn from(err: daicho_core::loyalty::error::LoyaltyError) -> Self {
        use daicho_core::loyalty::error::LoyaltyError;
        match &err {
            LoyaltyError::InsufficientPoints { .. } => ApiError::BadRequest(err.to_string()),
            LoyaltyError::DuplicateEvent { .. } => ApiError::Conflict(err.to_string()),
            LoyaltyError::Validation(_) => ApiError::BadRequest(err.to_string()),
            LoyaltyError::Store(_) => ApiError::Internal(err.to_string()),
        }
    }
}

/// 从 `PricingError` 转换
impl From<daicho_core::pricing::error::PricingError> for ApiError {
    fn from(err: daicho_core::pricing::error::PricingError) -> Self {
        use daicho_core::pricing::error::PricingError;
        match &err {
            PricingError::UnknownSymbol(symbol) => ApiError::NotFound(symbol.clone()),
            PricingError::Validation(_) => ApiError::BadRequest(err.to_string()),
            PricingError::Unavailable(_) => ApiError::ServiceUnavailable(err.to_string()),
            PricingError::Store(_) => ApiError::Internal(err.to_string()),
        }
    }
}
