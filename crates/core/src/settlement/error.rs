use crate::pricing::error::PricingError;
use crate::store::error::StoreError;
use rust_decimal::Decimal;
use thiserror::Error;

/// # Summary
/// 结算环节中可能发生的错误。
///
/// # Invariants
/// - `InsufficientHoldings` 属于业务规则拒绝：对应的提取请求必须停留在
///   Pending 状态，保持可被管理员驳回或重试。
/// - 重复裁决终态请求不是错误（见 `VerifyOutcome::AlreadyProcessed`），
///   因此本枚举刻意不包含 "已处理" 变体。
#[derive(Error, Debug)]
pub enum SettleError {
    #[error("请求参数非法: {0}")]
    Validation(String),
    #[error("结算请求未找到: {0}")]
    RequestNotFound(String),
    #[error("持仓不足. 标的: {symbol}, 请求: {requested}, 当前持有: {held}")]
    InsufficientHoldings {
        symbol: String,
        requested: Decimal,
        /// 校验时刻的实际头寸。与请求创建时的建议性检查可能不一致，
        /// 差值即 "请求后持仓已变化" 的信号，直接透传给管理员。
        held: Decimal,
    },
    #[error("并发修改冲突, 请重试: {0}")]
    Conflict(String),
    #[error("依赖服务不可用 ({dependency}): {reason}")]
    DependencyUnavailable { dependency: String, reason: String },
    #[error("存储层错误: {0}")]
    Store(String),
}

impl From<StoreError> for SettleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => SettleError::RequestNotFound("record not found".to_string()),
            StoreError::Duplicate(msg) => SettleError::Conflict(msg),
            other => SettleError::Store(other.to_string()),
        }
    }
}

impl From<PricingError> for SettleError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::UnknownSymbol(symbol) => {
                SettleError::Validation(format!("未知标的: {}", symbol))
            }
            PricingError::Validation(msg) => SettleError::Validation(msg),
            PricingError::Unavailable(reason) => SettleError::DependencyUnavailable {
                dependency: "pricing".to_string(),
                reason,
            },
            PricingError::Store(msg) => SettleError::Store(msg),
        }
    }
}
