use crate::notify::error::NotifyError;
use async_trait::async_trait;

/// # Summary
/// 结算结果外发通知的接口定义。结算服务对订单/提取的终态变化
/// 以 fire-and-forget 方式调用本端口，失败只记录日志。
///
/// # Invariants
/// - 实现必须是 `Send` 和 `Sync` 以支持并发调用。
/// - 实现不得持有结算事务的任何锁或连接。
#[async_trait]
pub trait Notifier: Send + Sync {
    /// # Summary
    /// 发送带有主题和内容的通知。
    ///
    /// # Logic
    /// 1. 根据目标平台要求格式化消息。
    /// 2. 通过底层传输协议发送消息。
    /// 3. 返回成功或失败状态。
    ///
    /// # Arguments
    /// * `subject` - 通知标题或主题。
    /// * `content` - 通知的具体内容。
    ///
    /// # Returns
    /// * 成功返回 `Ok(())`。
    /// * 失败返回 `Err(NotifyError)`。
    async fn notify(&self, subject: &str, content: &str) -> Result<(), NotifyError>;
}
