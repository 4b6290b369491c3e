//! # `daicho-notify` - 通知适配层
//!
//! `Notifier` 端口的具体实现：SMTP 邮件与 Telegram 机器人。
//! 结算服务以 fire-and-forget 方式调用，本层的任何失败都不会
//! 传播回结算流程。

pub mod email;
pub mod telegram;
