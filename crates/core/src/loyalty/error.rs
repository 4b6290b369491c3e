use crate::store::error::StoreError;
use thiserror::Error;

/// # Summary
/// 积分台账错误枚举。
#[derive(Error, Debug)]
pub enum LoyaltyError {
    #[error("积分不足. 需要: {required}, 当前: {actual}")]
    InsufficientPoints { required: i64, actual: i64 },
    #[error("重复的积分事件: {source_kind}/{source_ref}")]
    DuplicateEvent { source_kind: String, source_ref: String },
    #[error("请求参数非法: {0}")]
    Validation(String),
    #[error("存储层错误: {0}")]
    Store(String),
}

impl From<StoreError> for LoyaltyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(msg) => {
                // 存储层唯一约束命中即事件重复，具体来源信息由消息携带
                LoyaltyError::DuplicateEvent {
                    source_kind: "store".to_string(),
                    source_ref: msg,
                }
            }
            other => LoyaltyError::Store(other.to_string()),
        }
    }
}
