//! 端到端工作流测试: 启动真实 HTTP 服务, 用 reqwest 走完
//! "挂牌 -> 下单 -> 裁决 -> 提取 -> 积分" 的完整闭环。

use async_trait::async_trait;
use daicho_api::server::{AppState, build_router};
use daicho_api::types::Claims;
use daicho_core::common::AssetType;
use daicho_core::common::time::RealTimeProvider;
use daicho_core::pricing::error::PricingError;
use daicho_core::pricing::port::MarketDataPort;
use daicho_settle::loyalty::LoyaltyService;
use daicho_settle::pricing::PricingService;
use daicho_settle::service::SettlementService;
use daicho_store::memory::{MemoryLedgerStore, MemoryLoyaltyStore};
use jsonwebtoken::{EncodingKey, Header, encode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::sync::Arc;

const TEST_SECRET: &str = "workflow-test-secret";

struct FixedFeed(Decimal);

#[async_trait]
impl MarketDataPort for FixedFeed {
    async fn latest_price(
        &self,
        _symbol: &str,
        _asset_type: AssetType,
    ) -> Result<Decimal, PricingError> {
        Ok(self.0)
    }
}

fn token(sub: &str, role: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        role: role.to_string(),
        exp: 4_102_444_800, // 2100-01-01, 测试用不过期
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_ref()),
    )
    .unwrap()
}

/// 启动真实监听的测试服务, 返回 base url
async fn spawn_server() -> String {
    // reqwest 以 `rustls-no-provider` 构建, 需进程内预装 rustls 加密 provider,
    // 否则 `reqwest::Client::new()` 会 panic。与 core 一致使用 ring。
    let _ = rustls::crypto::ring::default_provider().install_default();

    let store = Arc::new(MemoryLedgerStore::new());
    let loyalty_store = Arc::new(MemoryLoyaltyStore::new());
    let clock = Arc::new(RealTimeProvider);

    let pricing = Arc::new(PricingService::new(
        store.clone(),
        Arc::new(FixedFeed(dec!(150.0))),
        5,
    ));
    let settlement = Arc::new(SettlementService::new(
        store.clone(),
        store.clone(),
        pricing.clone(),
        None,
        clock.clone(),
    ));
    let loyalty = Arc::new(LoyaltyService::new(loyalty_store, clock));

    let state = AppState {
        settlement,
        pricing,
        loyalty,
        holdings: store.clone(),
        instruments: store,
        jwt_secret: Arc::new(TEST_SECRET.to_string()),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_settlement_workflow() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let user = token("alice", "user");
    let admin = token("ops-1", "admin");

    // 1. 管理员挂牌一个自营盘 ETF
    let resp = client
        .put(format!("{}/api/v1/admin/instruments", base))
        .bearer_auth(&admin)
        .json(&json!({
            "symbol": "GLD-HOUSE",
            "asset_type": "etf",
            "unit_price": "50.0",
            "house_listed": true
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // 2. 公开报价无需鉴权, 自营盘返回权威价
    let body: Value = client
        .get(format!(
            "{}/api/v1/market/quote/GLD-HOUSE?asset_type=etf",
            base
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["source"], "house_listed");
    assert_eq!(body["data"]["price"], "50.0");

    // 3. 未认证下单被拒
    let resp = client
        .post(format!("{}/api/v1/user/orders", base))
        .json(&json!({ "symbol": "GLD-HOUSE", "asset_type": "etf", "quantity": "10" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // 4. 普通用户 token 不能访问 Admin 路由
    let resp = client
        .get(format!("{}/api/v1/admin/orders/pending", base))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // 5. 用户下单 -> Pending
    let body: Value = client
        .post(format!("{}/api/v1/user/orders", base))
        .bearer_auth(&user)
        .json(&json!({ "symbol": "GLD-HOUSE", "asset_type": "etf", "quantity": "10" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["status"], "pending");
    let order_id = body["data"]["id"].as_str().unwrap().to_string();

    // 6. 管理员看到待裁决订单并核准
    let body: Value = client
        .get(format!("{}/api/v1/admin/orders/pending", base))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let body: Value = client
        .post(format!("{}/api/v1/admin/orders/{}/verify", base, order_id))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["outcome"], "settled");
    // 自营盘买压: 50 * (1 + 10*5bp) = 50.25
    assert_eq!(body["data"]["price_impact"]["updated_price"], "50.2500");

    // 7. 重复核准: 200 + already_processed, 不产生第二个批次
    let body: Value = client
        .post(format!("{}/api/v1/admin/orders/{}/verify", base, order_id))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["outcome"], "already_processed");

    // 8. 用户持仓出现 10 个单位、1 个批次
    let body: Value = client
        .get(format!("{}/api/v1/user/portfolio", base))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["positions"][0]["total_quantity"], "10");
    assert_eq!(body["data"]["lots"].as_array().unwrap().len(), 1);

    // 9. 用户提取 6 -> 管理员核准 -> 剩余 4
    let body: Value = client
        .post(format!("{}/api/v1/user/withdrawals", base))
        .bearer_auth(&user)
        .json(&json!({
            "symbol": "GLD-HOUSE",
            "asset_type": "etf",
            "quantity": "6",
            "payout_destination": "bank:XX-0001"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let withdrawal_id = body["data"]["id"].as_str().unwrap().to_string();

    let body: Value = client
        .post(format!(
            "{}/api/v1/admin/withdrawals/{}/verify",
            base, withdrawal_id
        ))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["outcome"], "settled");
    assert_eq!(body["data"]["remaining_position"], "4");

    // 10. 超出剩余头寸的提取在创建时就被建议性检查拦下
    let resp = client
        .post(format!("{}/api/v1/user/withdrawals", base))
        .bearer_auth(&user)
        .json(&json!({
            "symbol": "GLD-HOUSE",
            "asset_type": "etf",
            "quantity": "6",
            "payout_destination": "bank:XX-0001"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_loyalty_workflow_with_dedup() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let user = token("bob", "user");
    let admin = token("ops-1", "admin");

    // 推荐事件入账 50 分
    let resp = client
        .post(format!("{}/api/v1/admin/loyalty/credit", base))
        .bearer_auth(&admin)
        .json(&json!({
            "account_id": "bob",
            "source": "referral",
            "source_ref": "ref-evt-1",
            "points": 50,
            "description": "推荐好友注册"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // 同一事件重复入账 -> 409
    let resp = client
        .post(format!("{}/api/v1/admin/loyalty/credit", base))
        .bearer_auth(&admin)
        .json(&json!({
            "account_id": "bob",
            "source": "referral",
            "source_ref": "ref-evt-1",
            "points": 50,
            "description": "推荐好友注册"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // 兑换 20 分 -> 余额 30, 库存一件
    let body: Value = client
        .post(format!("{}/api/v1/user/loyalty/redeem", base))
        .bearer_auth(&user)
        .json(&json!({ "item_code": "MUG-01", "points": 20 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["balance"], 30);

    let body: Value = client
        .get(format!("{}/api/v1/user/loyalty/balance", base))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["balance"], 30);

    // 流水: 一正一负, 和等于余额
    let body: Value = client
        .get(format!("{}/api/v1/user/loyalty/history", base))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let txs = body["data"].as_array().unwrap();
    assert_eq!(txs.len(), 2);
    let sum: i64 = txs.iter().map(|t| t["points"].as_i64().unwrap()).sum();
    assert_eq!(sum, 30);
}
