use chrono::TimeZone;
use daicho_core::common::AccountId;
use daicho_core::common::time::FakeClockProvider;
use daicho_core::loyalty::entity::PointSource;
use daicho_core::loyalty::error::LoyaltyError;
use daicho_settle::loyalty::LoyaltyService;
use daicho_store::memory::MemoryLoyaltyStore;
use std::sync::Arc;

fn acct(id: &str) -> AccountId {
    AccountId(id.to_string())
}

fn service() -> LoyaltyService {
    let clock = Arc::new(FakeClockProvider::new(
        chrono::Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    ));
    LoyaltyService::new(Arc::new(MemoryLoyaltyStore::new()), clock)
}

#[tokio::test]
async fn test_referral_event_credits_exactly_once() {
    let svc = service();

    let balance = svc
        .credit(acct("alice"), PointSource::Referral, "ref-evt-1", 50, "推荐好友注册")
        .await
        .unwrap();
    assert_eq!(balance, 50);

    // 同一推荐事件重复入账被拒, 余额不变
    let err = svc
        .credit(acct("alice"), PointSource::Referral, "ref-evt-1", 50, "推荐好友注册")
        .await
        .unwrap_err();
    assert!(matches!(err, LoyaltyError::DuplicateEvent { .. }));
    assert_eq!(svc.balance(&acct("alice")).await.unwrap(), 50);
    assert_eq!(svc.history(&acct("alice")).await.unwrap().len(), 1);

    // 不同事件正常入账
    let balance = svc
        .credit(acct("alice"), PointSource::Referral, "ref-evt-2", 50, "推荐好友注册")
        .await
        .unwrap();
    assert_eq!(balance, 100);
}

#[tokio::test]
async fn test_balance_always_equals_transaction_sum() {
    let svc = service();
    let account = acct("bob");

    svc.credit(account.clone(), PointSource::Task, "task-1", 30, "完成新手任务")
        .await
        .unwrap();
    let (balance, sum) = svc.reconcile(&account).await.unwrap();
    assert_eq!(balance, sum);

    svc.credit(account.clone(), PointSource::Referral, "ref-1", 70, "推荐奖励")
        .await
        .unwrap();
    let (balance, sum) = svc.reconcile(&account).await.unwrap();
    assert_eq!(balance, sum);

    svc.redeem(account.clone(), "MUG-01", 40).await.unwrap();
    let (balance, sum) = svc.reconcile(&account).await.unwrap();
    assert_eq!(balance, sum);
    assert_eq!(balance, 60);
}

#[tokio::test]
async fn test_redeem_rejects_insufficient_points() {
    let svc = service();
    let account = acct("carol");

    svc.credit(account.clone(), PointSource::Task, "task-1", 30, "任务奖励")
        .await
        .unwrap();

    let err = svc.redeem(account.clone(), "MUG-01", 50).await.unwrap_err();
    assert!(matches!(
        err,
        LoyaltyError::InsufficientPoints {
            required: 50,
            actual: 30
        }
    ));

    // 拒绝后余额与流水均未被触碰
    let (balance, sum) = svc.reconcile(&account).await.unwrap();
    assert_eq!(balance, 30);
    assert_eq!(sum, 30);
    assert!(svc.inventory(&account).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_redeem_appends_inventory_entry() {
    let svc = service();
    let account = acct("dave");

    svc.credit(account.clone(), PointSource::Task, "task-1", 100, "任务奖励")
        .await
        .unwrap();

    let (balance, item) = svc.redeem(account.clone(), "MUG-01", 40).await.unwrap();
    assert_eq!(balance, 60);
    assert_eq!(item.item_code, "MUG-01");
    assert_eq!(item.points_spent, 40);

    let inventory = svc.inventory(&account).await.unwrap();
    assert_eq!(inventory.len(), 1);
    assert_eq!(inventory[0].item_code, "MUG-01");

    // 流水里留下负向 Redeem 记录
    let history = svc.history(&account).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().any(|t| t.points == -40));
}

#[tokio::test]
async fn test_credit_validation() {
    let svc = service();

    // 非正积分
    assert!(matches!(
        svc.credit(acct("erin"), PointSource::Task, "t-1", 0, "x").await,
        Err(LoyaltyError::Validation(_))
    ));
    assert!(matches!(
        svc.credit(acct("erin"), PointSource::Task, "t-1", -5, "x").await,
        Err(LoyaltyError::Validation(_))
    ));
    // 可去重来源必须带事件引用
    assert!(matches!(
        svc.credit(acct("erin"), PointSource::Referral, "  ", 10, "x").await,
        Err(LoyaltyError::Validation(_))
    ));
    // 兑换来源不允许入账
    assert!(matches!(
        svc.credit(acct("erin"), PointSource::Redemption, "r-1", 10, "x").await,
        Err(LoyaltyError::Validation(_))
    ));

    // 兑换侧校验
    assert!(matches!(
        svc.redeem(acct("erin"), "", 10).await,
        Err(LoyaltyError::Validation(_))
    ));
    assert!(matches!(
        svc.redeem(acct("erin"), "MUG-01", 0).await,
        Err(LoyaltyError::Validation(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_of_same_task_credit_once() {
    let svc = Arc::new(service());

    // 两个并发请求同时认领同一个任务完成事件
    let s1 = svc.clone();
    let s2 = svc.clone();
    let h1 = tokio::spawn(async move {
        s1.credit(acct("frank"), PointSource::Task, "task-42", 25, "任务奖励")
            .await
    });
    let h2 = tokio::spawn(async move {
        s2.credit(acct("frank"), PointSource::Task, "task-42", 25, "任务奖励")
            .await
    });
    let results = [h1.await.unwrap(), h2.await.unwrap()];

    let ok = results.iter().filter(|r| r.is_ok()).count();
    let dup = results
        .iter()
        .filter(|r| matches!(r, Err(LoyaltyError::DuplicateEvent { .. })))
        .count();
    assert_eq!(ok, 1);
    assert_eq!(dup, 1);
    assert_eq!(svc.balance(&acct("frank")).await.unwrap(), 25);
}
