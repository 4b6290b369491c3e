//! # API 服务启动器
//!
//! 组装 axum 路由、挂载 Swagger UI、配置 CORS 并绑定 TCP 端口对外提供服务。
//! 本模块不直接启动 `main()`, 而是由 `crates/app` 的 DI 容器持有并调用。

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_swagger_ui::SwaggerUi;

use daicho_core::holding::port::HoldingsPort;
use daicho_core::pricing::port::InstrumentStore;
use daicho_settle::loyalty::LoyaltyService;
use daicho_settle::pricing::PricingService;
use daicho_settle::service::SettlementService;

use crate::routes::{admin, loyalty, market, portfolio, settlement};

// ============================================================
//  共享应用状态
// ============================================================

/// 全局应用状态，通过 axum 的 `State` 提取器注入到每个 Handler 中。
///
/// # Invariants
/// - 各服务在启动前由 DI 容器注入，生命周期与进程等同。
#[derive(Clone)]
pub struct AppState {
    /// 结算服务（订单/提取的创建与裁决）
    pub settlement: Arc<SettlementService>,
    /// 报价服务
    pub pricing: Arc<PricingService>,
    /// 积分服务
    pub loyalty: Arc<LoyaltyService>,
    /// 持仓只读查询端口
    pub holdings: Arc<dyn HoldingsPort>,
    /// 挂牌标的存储端口（管理员挂牌用）
    pub instruments: Arc<dyn InstrumentStore>,
    /// 外部鉴权服务共享的 JWT 签名密钥
    pub jwt_secret: Arc<String>,
}

// ============================================================
//  OpenAPI 文档定义
// ============================================================

/// 全局 OpenAPI 文档结构
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Daicho 结算台账 API",
        version = "0.1.0",
        description = "模拟多资产交易平台的结算台账网关。提供持仓查询、结算请求创建与管理员裁决、积分台账功能。",
        contact(name = "Daicho Team"),
        license(name = "MIT")
    ),
    tags(
        (name = "行情 (Market)", description = "标的报价查询"),
        (name = "持仓 (Portfolio)", description = "账户批次与头寸查询"),
        (name = "结算 (Settlement)", description = "买入订单 / 提取请求的创建与查询"),
        (name = "积分 (Loyalty)", description = "积分余额、流水与兑换"),
        (name = "系统管理 (Admin)", description = "结算裁决、标的挂牌、积分入账")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// 为 OpenAPI 文档注入全局 Bearer JWT 鉴权方案。
///
/// 注册后，Swagger UI 页面顶部将显示 🔒 Authorize 按钮，
/// 用户可以填入外部鉴权服务签发的 JWT 后对所有标记了
/// `security` 的接口进行鉴权测试。
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        // 若 components 不存在则创建
        let components = openapi.components.get_or_insert_with(Default::default);

        // 注册名为 "bearer_jwt" 的 HTTP Bearer 鉴权方案
        components.add_security_scheme(
            "bearer_jwt",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .description(Some(
                        "在此处填入外部鉴权服务签发的 JWT Token（无需 'Bearer ' 前缀）",
                    ))
                    .build(),
            ),
        );
    }
}

// ============================================================
//  服务构建与启动
// ============================================================

/// 组装完整的 axum 应用路由树（公开 / 用户 / 管理员三个路由组）。
///
/// 独立成函数以便集成测试直接拿到 Router 而不必占用真实端口配置。
pub fn build_router(state: AppState) -> Router {
    // 1. 无需鉴权的公开路由
    let public_router = OpenApiRouter::new().routes(routes!(market::get_quote));

    // 2. 只需要合法 JWT 鉴权的路由 (普通用户)
    let user_protected_router = OpenApiRouter::new()
        .routes(routes!(portfolio::get_portfolio))
        .routes(routes!(settlement::place_order))
        .routes(routes!(settlement::list_orders))
        .routes(routes!(settlement::place_withdrawal))
        .routes(routes!(settlement::list_withdrawals))
        .routes(routes!(loyalty::get_balance))
        .routes(routes!(loyalty::get_history))
        .routes(routes!(loyalty::get_inventory))
        .routes(routes!(loyalty::redeem))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth::auth_middleware,
        ));

    // 3. 需要 Admin 角色鉴权的路由
    let admin_protected_router = OpenApiRouter::new()
        .routes(routes!(admin::pending_orders))
        .routes(routes!(admin::verify_order))
        .routes(routes!(admin::reject_order))
        .routes(routes!(admin::pending_withdrawals))
        .routes(routes!(admin::verify_withdrawal))
        .routes(routes!(admin::reject_withdrawal))
        .routes(routes!(admin::upsert_instrument))
        .routes(routes!(admin::credit_points))
        .routes(routes!(admin::grant_voucher))
        .layer(axum::middleware::from_fn(
            crate::middleware::auth::require_admin,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth::auth_middleware,
        ));

    // 4. 合并所有路由与自动收集的 OpenAPI Doc
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(public_router)
        .merge(user_protected_router)
        .merge(admin_protected_router)
        .with_state(state)
        .split_for_parts();

    // 5. 配置 CORS (开发阶段允许所有来源) 并挂载 Swagger UI
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(cors)
}

/// 构建路由并启动 HTTP 监听，直到进程退出。
///
/// # Arguments
/// * `state` - 由外部 DI 容器注入的共享状态
/// * `bind_addr` - 监听的地址与端口，如 `"0.0.0.0:8080"`
pub async fn start_server(
    state: AppState,
    bind_addr: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("API server listening on {}", bind_addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", bind_addr);

    axum::serve(listener, router).await?;
    Ok(())
}
