use thiserror::Error;

/// # Summary
/// 通知服务错误枚举。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 通知失败只允许被记录，绝不允许回滚或阻塞结算主流程。
#[derive(Error, Debug)]
pub enum NotifyError {
    /// 网络连接或传输错误
    #[error("Network error: {0}")]
    Network(String),

    /// 配置错误 (如缺少 Token 或非法地址)
    #[error("Configuration error: {0}")]
    Config(String),

    /// 推送平台返回的错误 (如 Telegram API Error / SMTP 拒信)
    #[error("Platform error: {0}")]
    Platform(String),
}
