use async_trait::async_trait;
use chrono::TimeZone;
use daicho_core::common::time::FakeClockProvider;
use daicho_core::common::{AccountId, AssetType};
use daicho_core::holding::port::HoldingsPort;
use daicho_core::notify::error::NotifyError;
use daicho_core::notify::port::Notifier;
use daicho_core::pricing::entity::Instrument;
use daicho_core::pricing::error::PricingError;
use daicho_core::pricing::port::{InstrumentStore, MarketDataPort};
use daicho_core::settlement::entity::{RequestStatus, VerifyOutcome};
use daicho_core::settlement::error::SettleError;
use daicho_settle::pricing::PricingService;
use daicho_settle::service::SettlementService;
use daicho_store::memory::MemoryLedgerStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

/// 返回固定报价的外部行情桩
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

/// 始终故障的外部行情桩
struct DownFeed;

#[async_trait]
impl MarketDataPort for DownFeed {
    async fn latest_price(
        &self,
        _symbol: &str,
        _asset_type: AssetType,
    ) -> Result<Decimal, PricingError> {
        Err(PricingError::Unavailable("feed offline".to_string()))
    }
}

/// 永远发送失败的通知桩
struct BrokenNotifier;

#[async_trait]
impl Notifier for BrokenNotifier {
    async fn notify(&self, _subject: &str, _content: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Network("smtp down".to_string()))
    }
}

struct Harness {
    store: Arc<MemoryLedgerStore>,
    pricing: Arc<PricingService>,
    service: Arc<SettlementService>,
    clock: Arc<FakeClockProvider>,
}

async fn harness_with(feed: Arc<dyn MarketDataPort>, notifier: Option<Arc<dyn Notifier>>) -> Harness {
    let store = Arc::new(MemoryLedgerStore::new());
    let clock = Arc::new(FakeClockProvider::new(
        chrono::Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    ));
    let pricing = Arc::new(PricingService::new(store.clone(), feed, 5));
    let service = Arc::new(SettlementService::new(
        store.clone(),
        store.clone(),
        pricing.clone(),
        notifier,
        clock.clone(),
    ));

    // 平台挂牌: 一个自营盘 ETF, 一个外部定价股票
    store
        .upsert(&Instrument {
            symbol: "GLD-HOUSE".to_string(),
            asset_type: AssetType::Etf,
            unit_price: dec!(50.0),
            house_listed: true,
        })
        .await
        .unwrap();
    store
        .upsert(&Instrument {
            symbol: "AAPL".to_string(),
            asset_type: AssetType::Stock,
            unit_price: Decimal::ZERO,
            house_listed: false,
        })
        .await
        .unwrap();

    Harness {
        store,
        pricing,
        service,
        clock,
    }
}

async fn harness() -> Harness {
    harness_with(Arc::new(FixedFeed(dec!(150.0))), None).await
}

fn acct(id: &str) -> AccountId {
    AccountId(id.to_string())
}

fn at(secs: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::Utc.timestamp_opt(secs, 0).unwrap()
}

/// 买入并立即核准，返回订单 ID
async fn funded_position(h: &Harness, account: &str, symbol: &str, asset: AssetType, qty: Decimal) {
    let order = h
        .service
        .submit_buy(acct(account), symbol, asset, qty, None)
        .await
        .unwrap();
    let outcome = h.service.verify_buy(&order.id).await.unwrap();
    assert!(outcome.is_settled());
}

#[tokio::test]
async fn test_verify_buy_is_idempotent() {
    let h = harness().await;
    let order = h
        .service
        .submit_buy(acct("alice"), "AAPL", AssetType::Stock, dec!(10), None)
        .await
        .unwrap();

    let first = h.service.verify_buy(&order.id).await.unwrap();
    assert!(first.is_settled());

    // 重复核准: 良性空操作, 不产生第二个批次
    let replay = h.service.verify_buy(&order.id).await.unwrap();
    match replay {
        VerifyOutcome::AlreadyProcessed { status } => {
            assert_eq!(status, RequestStatus::Verified)
        }
        _ => panic!("replay must be a no-op"),
    }

    let lots = h.store.lots(&acct("alice"), "AAPL", AssetType::Stock).await.unwrap();
    assert_eq!(lots.len(), 1);
    assert_eq!(lots[0].quantity, dec!(10));
    assert_eq!(lots[0].unit_price, dec!(150.0), "外部报价固化到批次");
}

#[tokio::test]
async fn test_rejected_order_has_no_side_effects() {
    let h = harness().await;
    let order = h
        .service
        .submit_buy(acct("alice"), "GLD-HOUSE", AssetType::Etf, dec!(10), None)
        .await
        .unwrap();

    let outcome = h.service.reject_buy(&order.id).await.unwrap();
    assert!(outcome.is_settled());

    // 无批次、价格不动
    assert!(h.store.all_lots(&acct("alice")).await.unwrap().is_empty());
    let price = h.store.get("GLD-HOUSE").await.unwrap().unwrap().unit_price;
    assert_eq!(price, dec!(50.0));

    // 驳回后再核准: 终态不可迁移
    let replay = h.service.verify_buy(&order.id).await.unwrap();
    assert!(matches!(
        replay,
        VerifyOutcome::AlreadyProcessed {
            status: RequestStatus::Rejected
        }
    ));
}

#[tokio::test]
async fn test_house_listed_buy_bumps_price_external_does_not() {
    let h = harness().await;

    // 自营盘: 核准附带抬价 (10 单位 * 5bp = 1.005)
    let order = h
        .service
        .submit_buy(acct("alice"), "GLD-HOUSE", AssetType::Etf, dec!(10), None)
        .await
        .unwrap();
    let outcome = h.service.verify_buy(&order.id).await.unwrap();
    match outcome {
        VerifyOutcome::Settled(s) => {
            let impact = s.price_impact.expect("house-listed settle must carry impact");
            assert_eq!(impact.previous_price, dec!(50.0));
            assert_eq!(impact.updated_price, dec!(50.0) * dec!(1.005));
        }
        _ => panic!("should settle"),
    }

    // 外部定价: 核准不触碰任何价格
    let order = h
        .service
        .submit_buy(acct("alice"), "AAPL", AssetType::Stock, dec!(10), None)
        .await
        .unwrap();
    match h.service.verify_buy(&order.id).await.unwrap() {
        VerifyOutcome::Settled(s) => assert!(s.price_impact.is_none()),
        _ => panic!("should settle"),
    }
}

#[tokio::test]
async fn test_fifo_withdrawal_determinism() {
    let h = harness().await;

    // L1(5, t1) 先入账
    h.clock.set_time(at(1_700_000_100));
    funded_position(&h, "bob", "AAPL", AssetType::Stock, dec!(5)).await;
    // L2(5, t2 > t1) 后入账
    h.clock.set_time(at(1_700_000_200));
    funded_position(&h, "bob", "AAPL", AssetType::Stock, dec!(5)).await;

    // 提取 7: 必须 L1 整批移除、L2 剩 3, 绝不允许反序
    let withdrawal = h
        .service
        .submit_withdrawal(acct("bob"), "AAPL", AssetType::Stock, dec!(7), "bank:XX-1")
        .await
        .unwrap();
    let outcome = h.service.verify_withdrawal(&withdrawal.id).await.unwrap();
    match outcome {
        VerifyOutcome::Settled(s) => {
            assert_eq!(s.removed_lots, 1);
            assert!(s.shrunk_lot.is_some());
            assert_eq!(s.remaining_position, dec!(3));
        }
        _ => panic!("should settle"),
    }

    let lots = h.store.lots(&acct("bob"), "AAPL", AssetType::Stock).await.unwrap();
    assert_eq!(lots.len(), 1);
    assert_eq!(lots[0].quantity, dec!(3));
    assert_eq!(lots[0].acquired_at, at(1_700_000_200), "留下的必须是较新的批次");

    // 重复核准同一笔提取: 空操作, 不会扣第二次
    let replay = h.service.verify_withdrawal(&withdrawal.id).await.unwrap();
    assert!(matches!(
        replay,
        VerifyOutcome::AlreadyProcessed {
            status: RequestStatus::Verified
        }
    ));
    let position = h
        .store
        .position(&acct("bob"), "AAPL", AssetType::Stock)
        .await
        .unwrap();
    assert_eq!(position, dec!(3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_exactly_one_succeeds() {
    let h = harness().await;
    funded_position(&h, "carol", "AAPL", AssetType::Stock, dec!(10)).await;

    // 两笔各 6 的提取在创建时都通过建议性检查 (10 >= 6)
    let w1 = h
        .service
        .submit_withdrawal(acct("carol"), "AAPL", AssetType::Stock, dec!(6), "bank:XX-1")
        .await
        .unwrap();
    let w2 = h
        .service
        .submit_withdrawal(acct("carol"), "AAPL", AssetType::Stock, dec!(6), "bank:XX-2")
        .await
        .unwrap();

    // 并发核准: 权威校验必须观察串行化后的一致快照
    let s1 = h.service.clone();
    let s2 = h.service.clone();
    let h1 = tokio::spawn(async move { s1.verify_withdrawal(&w1.id).await });
    let h2 = tokio::spawn(async move { s2.verify_withdrawal(&w2.id).await });
    let results = [h1.await.unwrap(), h2.await.unwrap()];

    let settled = results
        .iter()
        .filter(|r| matches!(r, Ok(VerifyOutcome::Settled(_))))
        .count();
    let shortfall = results
        .iter()
        .filter(|r| matches!(r, Err(SettleError::InsufficientHoldings { held, .. }) if *held == dec!(4)))
        .count();
    assert_eq!(settled, 1, "恰好一笔成功");
    assert_eq!(shortfall, 1, "另一笔被拒且看到的是扣减后的头寸 4");

    let position = h
        .store
        .position(&acct("carol"), "AAPL", AssetType::Stock)
        .await
        .unwrap();
    assert_eq!(position, dec!(4));
}

#[tokio::test]
async fn test_insufficient_withdrawal_stays_pending_and_actionable() {
    let h = harness().await;
    funded_position(&h, "dave", "AAPL", AssetType::Stock, dec!(10)).await;

    let w1 = h
        .service
        .submit_withdrawal(acct("dave"), "AAPL", AssetType::Stock, dec!(6), "bank:XX-1")
        .await
        .unwrap();
    let w2 = h
        .service
        .submit_withdrawal(acct("dave"), "AAPL", AssetType::Stock, dec!(6), "bank:XX-2")
        .await
        .unwrap();

    assert!(h.service.verify_withdrawal(&w1.id).await.unwrap().is_settled());

    // 第二笔在核准时刻余量不足: 报错但保持 Pending
    let err = h.service.verify_withdrawal(&w2.id).await.unwrap_err();
    match err {
        SettleError::InsufficientHoldings { requested, held, .. } => {
            assert_eq!(requested, dec!(6));
            assert_eq!(held, dec!(4), "错误必须携带当前持有量供管理员比对");
        }
        other => panic!("unexpected error: {other}"),
    }
    let reloaded = h.service.get_withdrawal(&w2.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, RequestStatus::Pending);

    // 管理员仍可驳回这笔搁浅的请求
    let outcome = h
        .service
        .reject_withdrawal(&w2.id, Some("持仓已不足".to_string()))
        .await
        .unwrap();
    assert!(outcome.is_settled());
}

#[tokio::test]
async fn test_conservation_across_settlement_sequence() {
    let h = harness().await;
    let mut bought = Decimal::ZERO;
    let mut withdrawn = Decimal::ZERO;

    for qty in [dec!(10), dec!(5)] {
        funded_position(&h, "erin", "AAPL", AssetType::Stock, qty).await;
        bought += qty;
    }
    for qty in [dec!(3), dec!(6)] {
        let w = h
            .service
            .submit_withdrawal(acct("erin"), "AAPL", AssetType::Stock, qty, "bank:XX-1")
            .await
            .unwrap();
        assert!(h.service.verify_withdrawal(&w.id).await.unwrap().is_settled());
        withdrawn += qty;

        // 每一步之后守恒式都成立且不为负
        let position = h
            .store
            .position(&acct("erin"), "AAPL", AssetType::Stock)
            .await
            .unwrap();
        assert_eq!(position, bought - withdrawn);
        assert!(position >= Decimal::ZERO);
    }

    funded_position(&h, "erin", "AAPL", AssetType::Stock, dec!(2)).await;
    bought += dec!(2);

    let position = h
        .store
        .position(&acct("erin"), "AAPL", AssetType::Stock)
        .await
        .unwrap();
    assert_eq!(position, bought - withdrawn);
    assert_eq!(position, dec!(8));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_buy_pressure_is_monotonic_and_order_independent() {
    let h = harness().await;

    // 连续买压严格抬价
    let i1 = h.pricing.apply_buy_pressure("GLD-HOUSE", dec!(3)).await.unwrap();
    assert!(i1.updated_price > i1.previous_price);
    let i2 = h.pricing.apply_buy_pressure("GLD-HOUSE", dec!(7)).await.unwrap();
    assert!(i2.updated_price > i2.previous_price);
    let sequential_final = i2.updated_price;

    // 并发施加 3 与 7: 终价必须与顺序执行一致 (乘法可交换)
    let h2 = harness().await;
    let p1 = h2.pricing.clone();
    let p2 = h2.pricing.clone();
    let t1 = tokio::spawn(async move { p1.apply_buy_pressure("GLD-HOUSE", dec!(3)).await });
    let t2 = tokio::spawn(async move { p2.apply_buy_pressure("GLD-HOUSE", dec!(7)).await });
    t1.await.unwrap().unwrap();
    t2.await.unwrap().unwrap();

    let concurrent_final = h2.store.get("GLD-HOUSE").await.unwrap().unwrap().unit_price;
    assert_eq!(concurrent_final, sequential_final);
    assert_eq!(concurrent_final, dec!(50.0) * dec!(1.0015) * dec!(1.0035));
}

#[tokio::test]
async fn test_buy_pressure_rejects_non_positive_quantity() {
    let h = harness().await;
    assert!(matches!(
        h.pricing.apply_buy_pressure("GLD-HOUSE", Decimal::ZERO).await,
        Err(PricingError::Validation(_))
    ));
    assert!(matches!(
        h.pricing.apply_buy_pressure("GLD-HOUSE", dec!(-1)).await,
        Err(PricingError::Validation(_))
    ));
    // 外部定价标的不接受买压
    assert!(matches!(
        h.pricing.apply_buy_pressure("AAPL", dec!(1)).await,
        Err(PricingError::Validation(_))
    ));
}

#[tokio::test]
async fn test_pricing_outage_aborts_order_creation() {
    let h = harness_with(Arc::new(DownFeed), None).await;

    let err = h
        .service
        .submit_buy(acct("frank"), "AAPL", AssetType::Stock, dec!(1), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SettleError::DependencyUnavailable { ref dependency, .. } if dependency == "pricing"
    ));

    // 没有价格就没有订单: 不存在半成品落盘
    assert!(h.service.pending_orders().await.unwrap().is_empty());

    // 自营盘标的不依赖外部行情, 行情瘫痪期间照常可买
    let order = h
        .service
        .submit_buy(acct("frank"), "GLD-HOUSE", AssetType::Etf, dec!(1), None)
        .await
        .unwrap();
    assert_eq!(order.unit_price, dec!(50.0));
}

#[tokio::test]
async fn test_unknown_symbol_rejected_at_creation() {
    let h = harness().await;
    let err = h
        .service
        .submit_buy(acct("frank"), "NOPE", AssetType::Stock, dec!(1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SettleError::Validation(_)));

    let err = h
        .service
        .submit_buy(acct("frank"), "AAPL", AssetType::Stock, Decimal::ZERO, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SettleError::Validation(_)));
}

#[tokio::test]
async fn test_withdrawal_advisory_check_at_creation() {
    let h = harness().await;
    funded_position(&h, "grace", "AAPL", AssetType::Stock, dec!(4)).await;

    let err = h
        .service
        .submit_withdrawal(acct("grace"), "AAPL", AssetType::Stock, dec!(6), "bank:XX-1")
        .await
        .unwrap_err();
    assert!(matches!(err, SettleError::InsufficientHoldings { .. }));
    assert!(h.service.pending_withdrawals().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_voucher_lifecycle() {
    let h = harness().await;
    let voucher = h
        .service
        .grant_voucher(acct("henry"), "新人折扣")
        .await
        .unwrap();

    let order = h
        .service
        .submit_buy(
            acct("henry"),
            "AAPL",
            AssetType::Stock,
            dec!(1),
            Some(voucher.id.clone()),
        )
        .await
        .unwrap();
    match h.service.verify_buy(&order.id).await.unwrap() {
        VerifyOutcome::Settled(s) => assert!(s.voucher_consumed),
        _ => panic!("should settle"),
    }

    // 已消费凭证不能再挂到新订单上
    let err = h
        .service
        .submit_buy(
            acct("henry"),
            "AAPL",
            AssetType::Stock,
            dec!(1),
            Some(voucher.id.clone()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SettleError::Validation(_)));

    // 他人的凭证同样被拒
    let other = h.service.grant_voucher(acct("iris"), "折扣").await.unwrap();
    let err = h
        .service
        .submit_buy(acct("henry"), "AAPL", AssetType::Stock, dec!(1), Some(other.id))
        .await
        .unwrap_err();
    assert!(matches!(err, SettleError::Validation(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_notification_failure_never_blocks_settlement() {
    let h = harness_with(
        Arc::new(FixedFeed(dec!(150.0))),
        Some(Arc::new(BrokenNotifier)),
    )
    .await;

    let order = h
        .service
        .submit_buy(acct("judy"), "AAPL", AssetType::Stock, dec!(2), None)
        .await
        .unwrap();
    let outcome = h.service.verify_buy(&order.id).await.unwrap();
    assert!(outcome.is_settled(), "通知通道故障不得影响结算");

    // 留一个调度间隙让失败的通知任务跑完 (只会打 warn 日志)
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    let position = h
        .store
        .position(&acct("judy"), "AAPL", AssetType::Stock)
        .await
        .unwrap();
    assert_eq!(position, dec!(2));
}
