//! # 鉴权中间件
//!
//! 验证外部鉴权服务签发的 JWT 并提取账户身份。
//! 本平台信任 token 里的 `sub` (账户 ID) 与 `role` 声明，
//! 不做独立的用户名/密码认证——那是外部协作方的职责。

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{DecodingKey, Validation, decode};

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::Claims;
use daicho_core::common::AccountId;

/// 提取并验证 Authorization: Bearer <token>
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req.headers().get(axum::http::header::AUTHORIZATION);

    let token = match auth_header {
        Some(header_val) => {
            let s = header_val
                .to_str()
                .map_err(|_| ApiError::Unauthorized("Invalid auth header".into()))?;
            if !s.starts_with("Bearer ") {
                tracing::warn!("Invalid Bearer format: {}", s);
                return Err(ApiError::Unauthorized("Invalid Bearer format".into()));
            }
            s[7..].to_string()
        }
        None => {
            tracing::warn!("Missing Authorization header");
            return Err(ApiError::Unauthorized("Missing Authorization header".into()));
        }
    };

    let claims = match verify_jwt(&token, &state.jwt_secret) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("JWT verification failed: {:?}", e);
            return Err(e);
        }
    };

    // 将账户身份注入 request extensions,
    // 以便 downstream handlers 用 `CurrentAccount` 提取
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Admin 级别权限校验中间件
/// 必须在 `auth_middleware` 之后应用！
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| ApiError::Unauthorized("Auth context not found".into()))?;

    if claims.role != "admin" {
        return Err(ApiError::Forbidden("Admin privileges required".into()));
    }

    Ok(next.run(req).await)
}

/// 验证 JWT 返回强类型 Claims
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, ApiError> {
    let mut validation = Validation::default();
    validation.set_required_spec_claims(&["exp", "sub"]);

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )
    .map_err(|_| ApiError::Unauthorized("Invalid or expired token".into()))?;

    Ok(token_data.claims)
}

// 在提取器中获取当前账户的快捷方式
pub struct CurrentAccount(pub AccountId);

impl<S> FromRequestParts<S> for CurrentAccount
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<Claims>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Missing auth context".into()))?;
        Ok(CurrentAccount(AccountId(claims.sub)))
    }
}
