use thiserror::Error;

/// # Summary
/// 定价域错误枚举，处理报价获取、参数校验与存储问题。
///
/// # Invariants
/// - 外部行情失败必须显式表达为 `Unavailable`，绝不允许静默回退为零价。
#[derive(Error, Debug)]
pub enum PricingError {
    // 请求的标的未在平台挂牌
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),
    // 外部行情源不可用或未返回有效报价
    #[error("Price unavailable: {0}")]
    Unavailable(String),
    // 参数非法（如买压数量 <= 0）
    #[error("Validation error: {0}")]
    Validation(String),
    // 底层存储错误
    #[error("Store error: {0}")]
    Store(String),
}
