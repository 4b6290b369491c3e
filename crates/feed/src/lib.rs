//! # `daicho-feed` - 外部行情适配层
//!
//! 非自营盘标的的权威报价来源。实现 `MarketDataPort`，
//! 行情失败一律显式上抛 "price unavailable"，绝不回退为零价。

pub mod yahoo;
