use async_trait::async_trait;
use dashmap::DashMap;
use daicho_core::common::{AccountId, AssetType};
use daicho_core::holding::entity::{
    Lot, LotDepletion, PositionView, plan_fifo_depletion,
};
use daicho_core::holding::port::HoldingsPort;
use daicho_core::loyalty::entity::{LoyaltyTransaction, RedeemedItem};
use daicho_core::loyalty::error::LoyaltyError;
use daicho_core::loyalty::port::LoyaltyStore;
use daicho_core::pricing::entity::{Instrument, PriceImpact};
use daicho_core::pricing::error::PricingError;
use daicho_core::pricing::port::InstrumentStore;
use daicho_core::settlement::entity::{
    BuyOrder, BuySettlement, DiscountVoucher, OrderId, RequestStatus, VerifyOutcome, VoucherId,
    Withdrawal, WithdrawalId, WithdrawalSettlement,
};
use daicho_core::settlement::error::SettleError;
use daicho_core::settlement::port::SettlementStore;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

#[derive(Default)]
struct LedgerInner {
    orders: HashMap<String, BuyOrder>,
    withdrawals: HashMap<String, Withdrawal>,
    lots: Vec<Lot>,
    vouchers: HashMap<String, DiscountVoucher>,
}

/// # Summary
/// 结算台账的内存实现，供测试与纸面环境使用。
///
/// # Invariants
/// - 订单/提取/批次/凭证共用一把 `RwLock`：核准操作在一次写锁内
///   完成全部读写，与 SQLite 实现的单事务语义等价。
/// - 挂牌标的放在 `DashMap` 分段锁里，`get_mut` 即单标的的
///   原子读-改-写，买压抬价不会发生丢失更新。
pub struct MemoryLedgerStore {
    inner: Arc<RwLock<LedgerInner>>,
    instruments: DashMap<String, Instrument>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(LedgerInner::default())),
            instruments: DashMap::new(),
        }
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted_fifo(mut lots: Vec<Lot>) -> Vec<Lot> {
    lots.sort_by(|a, b| {
        a.acquired_at
            .cmp(&b.acquired_at)
            .then_with(|| a.id.0.cmp(&b.id.0))
    });
    lots
}

#[async_trait]
impl SettlementStore for MemoryLedgerStore {
    async fn save_order(&self, order: &BuyOrder) -> Result<(), SettleError> {
        self.inner
            .write()
            .await
            .orders
            .insert(order.id.0.clone(), order.clone());
        Ok(())
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<BuyOrder>, SettleError> {
        Ok(self.inner.read().await.orders.get(&id.0).cloned())
    }

    async fn orders_of(
        &self,
        account_id: &AccountId,
        status: Option<RequestStatus>,
    ) -> Result<Vec<BuyOrder>, SettleError> {
        let guard = self.inner.read().await;
        let mut orders: Vec<BuyOrder> = guard
            .orders
            .values()
            .filter(|o| o.account_id == *account_id)
            .filter(|o| status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn pending_orders(&self) -> Result<Vec<BuyOrder>, SettleError> {
        let guard = self.inner.read().await;
        let mut orders: Vec<BuyOrder> = guard
            .orders
            .values()
            .filter(|o| o.status == RequestStatus::Pending)
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    async fn settle_buy(
        &self,
        order_id: &OrderId,
        lot: Lot,
        price_factor: Option<Decimal>,
    ) -> Result<VerifyOutcome<BuySettlement>, SettleError> {
        let mut guard = self.inner.write().await;

        let order = guard
            .orders
            .get(&order_id.0)
            .cloned()
            .ok_or_else(|| SettleError::RequestNotFound(order_id.0.clone()))?;

        if let Err(current) = order.status.transition(RequestStatus::Verified) {
            return Ok(VerifyOutcome::AlreadyProcessed { status: current });
        }

        if guard.lots.iter().any(|l| l.origin_order_id == order.id) {
            return Err(SettleError::Conflict(format!(
                "order {} already produced a lot",
                order_id.0
            )));
        }

        if let Some(stored) = guard.orders.get_mut(&order_id.0) {
            stored.status = RequestStatus::Verified;
        }

        let mut voucher_consumed = false;
        if let Some(voucher_id) = &order.voucher_id {
            match guard.vouchers.get_mut(&voucher_id.0) {
                Some(voucher) if !voucher.consumed => {
                    voucher.consumed = true;
                    voucher_consumed = true;
                }
                _ => {
                    warn!(
                        "订单 {} 引用的凭证 {} 已被消费, 本次结算不再重复抵扣",
                        order_id.0, voucher_id.0
                    );
                }
            }
        }

        let mut price_impact = None;
        if let Some(factor) = price_factor
            && let Some(mut instrument) = self.instruments.get_mut(&order.symbol)
            && instrument.house_listed
            && factor >= Decimal::ONE
        {
            let previous = instrument.unit_price;
            instrument.unit_price = previous * factor;
            price_impact = Some(PriceImpact::between(
                &order.symbol,
                previous,
                instrument.unit_price,
            ));
        }

        guard.lots.push(lot.clone());

        let mut settled = order;
        settled.status = RequestStatus::Verified;
        Ok(VerifyOutcome::Settled(BuySettlement {
            order: settled,
            lot,
            price_impact,
            voucher_consumed,
        }))
    }

    async fn reject_order(
        &self,
        order_id: &OrderId,
    ) -> Result<VerifyOutcome<BuyOrder>, SettleError> {
        let mut guard = self.inner.write().await;
        let order = guard
            .orders
            .get_mut(&order_id.0)
            .ok_or_else(|| SettleError::RequestNotFound(order_id.0.clone()))?;

        match order.status.transition(RequestStatus::Rejected) {
            Ok(next) => {
                order.status = next;
                Ok(VerifyOutcome::Settled(order.clone()))
            }
            Err(current) => Ok(VerifyOutcome::AlreadyProcessed { status: current }),
        }
    }

    async fn save_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), SettleError> {
        self.inner
            .write()
            .await
            .withdrawals
            .insert(withdrawal.id.0.clone(), withdrawal.clone());
        Ok(())
    }

    async fn get_withdrawal(
        &self,
        id: &WithdrawalId,
    ) -> Result<Option<Withdrawal>, SettleError> {
        Ok(self.inner.read().await.withdrawals.get(&id.0).cloned())
    }

    async fn withdrawals_of(
        &self,
        account_id: &AccountId,
        status: Option<RequestStatus>,
    ) -> Result<Vec<Withdrawal>, SettleError> {
        let guard = self.inner.read().await;
        let mut withdrawals: Vec<Withdrawal> = guard
            .withdrawals
            .values()
            .filter(|w| w.account_id == *account_id)
            .filter(|w| status.is_none_or(|s| w.status == s))
            .cloned()
            .collect();
        withdrawals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(withdrawals)
    }

    async fn pending_withdrawals(&self) -> Result<Vec<Withdrawal>, SettleError> {
        let guard = self.inner.read().await;
        let mut withdrawals: Vec<Withdrawal> = guard
            .withdrawals
            .values()
            .filter(|w| w.status == RequestStatus::Pending)
            .cloned()
            .collect();
        withdrawals.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(withdrawals)
    }

    /// # Logic
    /// 写锁内完成 "状态迁移 + 快照读取 + 规划 + 扣减" 全部步骤；
    /// 余量不足时不做任何修改直接上抛，请求保持 Pending。
    async fn settle_withdrawal(
        &self,
        withdrawal_id: &WithdrawalId,
    ) -> Result<VerifyOutcome<WithdrawalSettlement>, SettleError> {
        let mut guard = self.inner.write().await;

        let withdrawal = guard
            .withdrawals
            .get(&withdrawal_id.0)
            .cloned()
            .ok_or_else(|| SettleError::RequestNotFound(withdrawal_id.0.clone()))?;

        if let Err(current) = withdrawal.status.transition(RequestStatus::Verified) {
            return Ok(VerifyOutcome::AlreadyProcessed { status: current });
        }

        let snapshot: Vec<Lot> = sorted_fifo(
            guard
                .lots
                .iter()
                .filter(|l| {
                    l.account_id == withdrawal.account_id
                        && l.symbol == withdrawal.symbol
                        && l.asset_type == withdrawal.asset_type
                })
                .cloned()
                .collect(),
        );

        let plan = plan_fifo_depletion(&snapshot, withdrawal.quantity).map_err(|shortfall| {
            SettleError::InsufficientHoldings {
                symbol: withdrawal.symbol.clone(),
                requested: shortfall.requested,
                held: shortfall.held,
            }
        })?;

        let mut removed_lots = 0usize;
        let mut shrunk_lot = None;
        for step in &plan.steps {
            match step {
                LotDepletion::Remove(lot_id) => {
                    guard.lots.retain(|l| l.id != *lot_id);
                    removed_lots += 1;
                }
                LotDepletion::Shrink(lot_id, new_qty) => {
                    if let Some(lot) = guard.lots.iter_mut().find(|l| l.id == *lot_id) {
                        lot.quantity = *new_qty;
                    }
                    shrunk_lot = Some(lot_id.clone());
                }
            }
        }

        if let Some(stored) = guard.withdrawals.get_mut(&withdrawal_id.0) {
            stored.status = RequestStatus::Verified;
        }

        let held: Decimal = snapshot.iter().map(|l| l.quantity).sum();
        let mut settled = withdrawal;
        settled.status = RequestStatus::Verified;
        let remaining_position = held - settled.quantity;

        Ok(VerifyOutcome::Settled(WithdrawalSettlement {
            withdrawal: settled,
            removed_lots,
            shrunk_lot,
            remaining_position,
        }))
    }

    async fn reject_withdrawal(
        &self,
        withdrawal_id: &WithdrawalId,
        remarks: Option<String>,
    ) -> Result<VerifyOutcome<Withdrawal>, SettleError> {
        let mut guard = self.inner.write().await;
        let withdrawal = guard
            .withdrawals
            .get_mut(&withdrawal_id.0)
            .ok_or_else(|| SettleError::RequestNotFound(withdrawal_id.0.clone()))?;

        match withdrawal.status.transition(RequestStatus::Rejected) {
            Ok(next) => {
                withdrawal.status = next;
                withdrawal.remarks = remarks;
                Ok(VerifyOutcome::Settled(withdrawal.clone()))
            }
            Err(current) => Ok(VerifyOutcome::AlreadyProcessed { status: current }),
        }
    }

    async fn save_voucher(&self, voucher: &DiscountVoucher) -> Result<(), SettleError> {
        self.inner
            .write()
            .await
            .vouchers
            .insert(voucher.id.0.clone(), voucher.clone());
        Ok(())
    }

    async fn get_voucher(
        &self,
        id: &VoucherId,
    ) -> Result<Option<DiscountVoucher>, SettleError> {
        Ok(self.inner.read().await.vouchers.get(&id.0).cloned())
    }
}

#[async_trait]
impl HoldingsPort for MemoryLedgerStore {
    async fn lots(
        &self,
        account_id: &AccountId,
        symbol: &str,
        asset_type: AssetType,
    ) -> Result<Vec<Lot>, SettleError> {
        let guard = self.inner.read().await;
        Ok(sorted_fifo(
            guard
                .lots
                .iter()
                .filter(|l| {
                    l.account_id == *account_id
                        && l.symbol == symbol
                        && l.asset_type == asset_type
                })
                .cloned()
                .collect(),
        ))
    }

    async fn all_lots(&self, account_id: &AccountId) -> Result<Vec<Lot>, SettleError> {
        let guard = self.inner.read().await;
        Ok(sorted_fifo(
            guard
                .lots
                .iter()
                .filter(|l| l.account_id == *account_id)
                .cloned()
                .collect(),
        ))
    }

    async fn position(
        &self,
        account_id: &AccountId,
        symbol: &str,
        asset_type: AssetType,
    ) -> Result<Decimal, SettleError> {
        let lots = self.lots(account_id, symbol, asset_type).await?;
        Ok(lots.iter().map(|l| l.quantity).sum())
    }

    async fn portfolio(&self, account_id: &AccountId) -> Result<Vec<PositionView>, SettleError> {
        let lots = self.all_lots(account_id).await?;
        let mut grouped: BTreeMap<(String, String), PositionView> = BTreeMap::new();
        for lot in lots {
            let key = (lot.symbol.clone(), lot.asset_type.to_string());
            let entry = grouped.entry(key).or_insert_with(|| PositionView {
                symbol: lot.symbol.clone(),
                asset_type: lot.asset_type,
                total_quantity: Decimal::ZERO,
                lot_count: 0,
            });
            entry.total_quantity += lot.quantity;
            entry.lot_count += 1;
        }
        Ok(grouped.into_values().collect())
    }
}

#[async_trait]
impl InstrumentStore for MemoryLedgerStore {
    async fn get(&self, symbol: &str) -> Result<Option<Instrument>, PricingError> {
        Ok(self.instruments.get(symbol).map(|i| i.value().clone()))
    }

    async fn upsert(&self, instrument: &Instrument) -> Result<(), PricingError> {
        self.instruments
            .insert(instrument.symbol.clone(), instrument.clone());
        Ok(())
    }

    /// `DashMap::get_mut` 对单 key 互斥，读-改-写天然原子。
    async fn apply_pressure(
        &self,
        symbol: &str,
        factor: Decimal,
    ) -> Result<PriceImpact, PricingError> {
        if factor < Decimal::ONE {
            return Err(PricingError::Validation(format!(
                "pressure factor must not lower price, got {}",
                factor
            )));
        }

        let mut instrument = self
            .instruments
            .get_mut(symbol)
            .ok_or_else(|| PricingError::UnknownSymbol(symbol.to_string()))?;

        if !instrument.house_listed {
            return Err(PricingError::Validation(format!(
                "{} is not house-listed, its price is externally owned",
                symbol
            )));
        }

        let previous = instrument.unit_price;
        instrument.unit_price = previous * factor;
        Ok(PriceImpact::between(symbol, previous, instrument.unit_price))
    }
}

#[derive(Default)]
struct LoyaltyInner {
    transactions: Vec<LoyaltyTransaction>,
    balances: HashMap<String, i64>,
    items: Vec<RedeemedItem>,
}

/// # Summary
/// 积分台账的内存实现。单把写锁让 "查重 + 追加 + 改余额"
/// 成为一个不可分割的步骤，与 SQLite 实现的唯一索引语义对齐。
pub struct MemoryLoyaltyStore {
    inner: Arc<RwLock<LoyaltyInner>>,
}

impl MemoryLoyaltyStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(LoyaltyInner::default())),
        }
    }
}

impl Default for MemoryLoyaltyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoyaltyStore for MemoryLoyaltyStore {
    async fn credit(&self, tx: LoyaltyTransaction) -> Result<i64, LoyaltyError> {
        let mut guard = self.inner.write().await;

        if tx.source.dedupable()
            && guard.transactions.iter().any(|t| {
                t.account_id == tx.account_id
                    && t.source == tx.source
                    && t.source_ref == tx.source_ref
            })
        {
            return Err(LoyaltyError::DuplicateEvent {
                source_kind: tx.source.to_string(),
                source_ref: tx.source_ref,
            });
        }

        let balance = guard
            .balances
            .entry(tx.account_id.0.clone())
            .or_insert(0);
        *balance += tx.points;
        let new_balance = *balance;
        guard.transactions.push(tx);
        Ok(new_balance)
    }

    async fn redeem(
        &self,
        tx: LoyaltyTransaction,
        item: RedeemedItem,
    ) -> Result<i64, LoyaltyError> {
        let required = -tx.points;
        if required <= 0 {
            return Err(LoyaltyError::Validation(
                "兑换流水的积分必须为负".to_string(),
            ));
        }

        let mut guard = self.inner.write().await;
        let current = *guard.balances.get(&tx.account_id.0).unwrap_or(&0);
        if current < required {
            return Err(LoyaltyError::InsufficientPoints {
                required,
                actual: current,
            });
        }

        guard
            .balances
            .insert(tx.account_id.0.clone(), current - required);
        guard.transactions.push(tx);
        guard.items.push(item);
        Ok(current - required)
    }

    async fn balance(&self, account_id: &AccountId) -> Result<i64, LoyaltyError> {
        Ok(*self
            .inner
            .read()
            .await
            .balances
            .get(&account_id.0)
            .unwrap_or(&0))
    }

    async fn transactions(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<LoyaltyTransaction>, LoyaltyError> {
        Ok(self
            .inner
            .read()
            .await
            .transactions
            .iter()
            .filter(|t| t.account_id == *account_id)
            .cloned()
            .collect())
    }

    async fn inventory(&self, account_id: &AccountId) -> Result<Vec<RedeemedItem>, LoyaltyError> {
        Ok(self
            .inner
            .read()
            .await
            .items
            .iter()
            .filter(|i| i.account_id == *account_id)
            .cloned()
            .collect())
    }
}
