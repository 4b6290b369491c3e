//! # `daicho-settle` - 结算服务层
//!
//! 把管理员裁决翻译成对存储端口的原子结算调用：
//! - `pricing`: 报价解析（自营盘持久价 / 外部行情）与买压因子
//! - `service`: 买入/提取请求的创建、核准与驳回
//! - `loyalty`: 积分的获取、兑换与对账

pub mod loyalty;
pub mod pricing;
pub mod service;
