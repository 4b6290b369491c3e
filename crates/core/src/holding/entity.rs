use crate::common::{AccountId, AssetType};
use crate::settlement::entity::OrderId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// # Summary
/// 持仓批次的系统内唯一标识。
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct LotId(pub String);

/// # Summary
/// 持仓批次 (Lot)：一次已核准买入形成的带日期的离散持仓记录，
/// 是 FIFO 扣减的最小单位。
///
/// # Invariants
/// - `quantity` 恒为正数。数量被扣减到零的批次必须从存储中删除，不得保留。
/// - 同一 `origin_order_id` 至多产生一个批次（幂等回放的兜底约束）。
/// - 对任意 (account, symbol, asset_type)，批次数量之和即该账户的总头寸，
///   且永不为负。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    /// 批次唯一 ID
    pub id: LotId,
    /// 归属账户
    pub account_id: AccountId,
    /// 资产标的代码
    pub symbol: String,
    /// 资产大类
    pub asset_type: AssetType,
    /// 当前剩余数量 (> 0)
    pub quantity: Decimal,
    /// 取得单价（买入时的成交价）
    pub unit_price: Decimal,
    /// 取得时间，FIFO 排序的主键
    pub acquired_at: DateTime<Utc>,
    /// 产生此批次的已核准订单
    pub origin_order_id: OrderId,
}

/// # Summary
/// 对外展示用的单标的头寸汇总视图。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionView {
    pub symbol: String,
    pub asset_type: AssetType,
    /// 所有批次数量之和
    pub total_quantity: Decimal,
    /// 组成头寸的批次个数
    pub lot_count: usize,
}

/// # Summary
/// 单个批次的扣减动作。`Remove` 表示整批吃掉，`Shrink` 表示把批次数量
/// 改写为给定的新值（恒为正，否则应当是 Remove）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LotDepletion {
    Remove(LotId),
    Shrink(LotId, Decimal),
}

/// # Summary
/// 一次提取对批次集合的完整扣减规划。
#[derive(Debug, Clone)]
pub struct DepletionPlan {
    /// 按执行顺序排列的扣减步骤
    pub steps: Vec<LotDepletion>,
    /// 规划覆盖的总扣减数量（等于请求数量）
    pub depleted: Decimal,
}

/// # Summary
/// 头寸不足以覆盖请求数量时的规划失败信息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepletionShortfall {
    pub requested: Decimal,
    /// 规划时刻的实际持有总量
    pub held: Decimal,
}

/// # Summary
/// 纯函数化的 FIFO 扣减规划：`(批次快照, 请求数量) -> 扣减计划`。
/// 不触碰任何存储，调用方负责在自己的原子性保护内执行计划。
///
/// # Logic
/// 1. 将批次按 (acquired_at, id) 升序排序，保证重试时次序确定。
/// 2. 求和校验：持有总量 < 请求数量则直接返回 Shortfall，不产生半计划。
/// 3. 从最老的批次开始吃：批次数量 <= 剩余需求时整批 Remove，
///    否则对最后一个批次做 Shrink，新数量 = 原数量 - 剩余需求。
///
/// # Invariants
/// - 请求数量必须为正，非正数由上层校验拦截。
/// - 计划执行后不会留下数量为零或为负的批次。
pub fn plan_fifo_depletion(
    lots: &[Lot],
    requested: Decimal,
) -> Result<DepletionPlan, DepletionShortfall> {
    let mut ordered: Vec<&Lot> = lots.iter().collect();
    ordered.sort_by(|a, b| {
        a.acquired_at
            .cmp(&b.acquired_at)
            .then_with(|| a.id.0.cmp(&b.id.0))
    });

    let held: Decimal = ordered.iter().map(|l| l.quantity).sum();
    if held < requested {
        return Err(DepletionShortfall { requested, held });
    }

    let mut steps = Vec::new();
    let mut remaining = requested;
    for lot in ordered {
        if remaining.is_zero() {
            break;
        }
        if lot.quantity <= remaining {
            remaining -= lot.quantity;
            steps.push(LotDepletion::Remove(lot.id.clone()));
        } else {
            steps.push(LotDepletion::Shrink(lot.id.clone(), lot.quantity - remaining));
            remaining = Decimal::ZERO;
        }
    }

    Ok(DepletionPlan {
        steps,
        depleted: requested,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn lot(id: &str, qty: Decimal, ts_secs: i64) -> Lot {
        Lot {
            id: LotId(id.to_string()),
            account_id: AccountId("acct".to_string()),
            symbol: "GLD-HOUSE".to_string(),
            asset_type: AssetType::Etf,
            quantity: qty,
            unit_price: dec!(10.0),
            acquired_at: chrono::Utc.timestamp_opt(ts_secs, 0).unwrap(),
            origin_order_id: OrderId(format!("ord-{}", id)),
        }
    }

    #[test]
    fn test_fifo_consumes_oldest_first() {
        // L1(5, t1) + L2(5, t2>t1)，提取 7：L1 整批移除，L2 缩为 3
        let lots = vec![lot("l2", dec!(5), 200), lot("l1", dec!(5), 100)];
        let plan = plan_fifo_depletion(&lots, dec!(7)).unwrap();

        assert_eq!(plan.depleted, dec!(7));
        assert_eq!(
            plan.steps,
            vec![
                LotDepletion::Remove(LotId("l1".to_string())),
                LotDepletion::Shrink(LotId("l2".to_string()), dec!(3)),
            ]
        );
    }

    #[test]
    fn test_exact_boundary_removes_without_shrink() {
        let lots = vec![lot("l1", dec!(5), 100), lot("l2", dec!(5), 200)];
        let plan = plan_fifo_depletion(&lots, dec!(5)).unwrap();
        assert_eq!(plan.steps, vec![LotDepletion::Remove(LotId("l1".to_string()))]);
    }

    #[test]
    fn test_full_position_depletion() {
        let lots = vec![lot("l1", dec!(2.5), 100), lot("l2", dec!(7.5), 200)];
        let plan = plan_fifo_depletion(&lots, dec!(10)).unwrap();
        assert_eq!(
            plan.steps,
            vec![
                LotDepletion::Remove(LotId("l1".to_string())),
                LotDepletion::Remove(LotId("l2".to_string())),
            ]
        );
    }

    #[test]
    fn test_shortfall_reports_current_position() {
        let lots = vec![lot("l1", dec!(4), 100)];
        let err = plan_fifo_depletion(&lots, dec!(6)).unwrap_err();
        assert_eq!(err.requested, dec!(6));
        assert_eq!(err.held, dec!(4));
    }

    #[test]
    fn test_empty_snapshot_is_shortfall() {
        let err = plan_fifo_depletion(&[], dec!(1)).unwrap_err();
        assert_eq!(err.held, dec!(0));
    }

    #[test]
    fn test_same_timestamp_breaks_tie_by_id() {
        // 同一时刻入账的批次按 id 排序，重试必须得到同一计划
        let lots = vec![lot("b", dec!(3), 100), lot("a", dec!(3), 100)];
        let p1 = plan_fifo_depletion(&lots, dec!(4)).unwrap();
        let p2 = plan_fifo_depletion(&lots, dec!(4)).unwrap();
        assert_eq!(p1.steps, p2.steps);
        assert_eq!(p1.steps[0], LotDepletion::Remove(LotId("a".to_string())));
    }
}
