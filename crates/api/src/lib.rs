//! # `daicho-api` - HTTP API 网关
//!
//! 本 crate 是结算台账平台的 HTTP/REST 服务入口。
//! 使用 `axum` 构建路由与控制器，通过 `utoipa` 自动生成 OpenAPI 3.0 Swagger 文档。
//!
//! ## 架构职责
//! - 接收来自前端或管理后台的 HTTP 请求
//! - 验证外部鉴权服务签发的 JWT 后分发至 User / Admin 路由组
//! - 调用下层 `SettlementService` / `PricingService` / `LoyaltyService` 完成业务操作
//! - 将领域模型转换为 DTO 返回给前端

pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod types;
