use async_trait::async_trait;
use daicho_core::common::AssetType;
use daicho_core::pricing::error::PricingError;
use daicho_core::pricing::port::MarketDataPort;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// # Summary
/// Yahoo Finance 实时报价提供者实现。
///
/// # Invariants
/// - 使用 `reqwest` 异步客户端进行通讯。
/// - 任何网络/解析失败、缺失报价或非正报价都表达为
///   `PricingError::Unavailable`，调用方不会拿到静默的零价。
#[derive(Clone)]
pub struct YahooQuoteProvider {
    /// 内部使用的 HTTP 客户端
    client: Client,
}

impl YahooQuoteProvider {
    /// # Summary
    /// 创建一个新的 YahooQuoteProvider 实例。
    ///
    /// # Logic
    /// 1. 配置 10 秒超时。
    /// 2. 设置伪装浏览器 Header (User-Agent) 以减少被拦截风险。
    /// 3. 初始化 reqwest 客户端，构建失败上抛配置错误。
    pub fn new() -> Result<Self, PricingError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let agent = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
            .parse()
            .map_err(|_| PricingError::Store("invalid user-agent header".to_string()))?;
        headers.insert(reqwest::header::USER_AGENT, agent);

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()
            .map_err(|e| PricingError::Store(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// # Summary
    /// 把平台内部标的映射为 Yahoo 识别的行情代码。
    ///
    /// # Logic
    /// 1. 外汇对补 `=X` 后缀 (EURUSD -> EURUSD=X)。
    /// 2. 股票 / ETF / 加密货币 (BTC-USD 形式) 原样透传。
    fn market_symbol(symbol: &str, asset_type: AssetType) -> String {
        match asset_type {
            AssetType::Forex if !symbol.ends_with("=X") => format!("{}=X", symbol),
            _ => symbol.to_string(),
        }
    }
}

/// # Summary
/// Yahoo API 响应顶层结构。
///
/// # Invariants
/// - 映射自 Yahoo v8 chart 接口。
#[derive(Deserialize, Debug)]
struct YahooResponse {
    chart: YahooChart,
}

/// # Summary
/// Yahoo API 图表数据部分。
#[derive(Deserialize, Debug)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

/// # Summary
/// Yahoo API 错误详情。
#[derive(Deserialize, Debug)]
struct YahooError {
    description: String,
}

/// # Summary
/// Yahoo API 单个标的结果，只取 meta 里的实时报价。
#[derive(Deserialize, Debug)]
struct YahooResult {
    meta: YahooMeta,
}

/// # Summary
/// Yahoo API meta 段。
#[derive(Deserialize, Debug)]
struct YahooMeta {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
}

#[async_trait]
impl MarketDataPort for YahooQuoteProvider {
    /// # Summary
    /// 抓取标的的最新市场单价。
    ///
    /// # Logic
    /// 1. 把内部标的映射为 Yahoo 行情代码。
    /// 2. 请求 v8 chart 接口并解析嵌套 JSON。
    /// 3. 提取 `meta.regularMarketPrice`；缺失、非法精度或非正值
    ///    一律视为报价不可用。
    async fn latest_price(
        &self,
        symbol: &str,
        asset_type: AssetType,
    ) -> Result<Decimal, PricingError> {
        let market_symbol = Self::market_symbol(symbol, asset_type);
        let url = format!(
            "https://query1.finance.yahoo.com/v8/finance/chart/{}",
            market_symbol
        );

        let response = self
            .client
            .get(&url)
            .query(&[("range", "1d"), ("interval", "1m")])
            .send()
            .await
            .map_err(|e| PricingError::Unavailable(format!("network error: {}", e)))?;

        if !response.status().is_success() {
            return Err(PricingError::Unavailable(format!(
                "quote endpoint returned {}",
                response.status()
            )));
        }

        let body: YahooResponse = response
            .json()
            .await
            .map_err(|e| PricingError::Unavailable(format!("parse error: {}", e)))?;

        if let Some(err) = body.chart.error {
            return Err(PricingError::Unavailable(err.description));
        }

        let price = body
            .chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .and_then(|r| r.meta.regular_market_price)
            .ok_or_else(|| {
                PricingError::Unavailable(format!("no market price for {}", market_symbol))
            })?;

        let price = Decimal::from_f64_retain(price)
            .ok_or_else(|| PricingError::Unavailable(format!("invalid price value: {}", price)))?;
        if price <= Decimal::ZERO {
            return Err(PricingError::Unavailable(format!(
                "non-positive price {} for {}",
                price, market_symbol
            )));
        }

        debug!("Quote {} ({}) = {}", symbol, market_symbol, price);
        Ok(price)
    }
}
