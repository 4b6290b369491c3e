use daicho_core::common::{AccountId, AssetType};
use daicho_core::common::time::TimeProvider;
use daicho_core::holding::entity::{Lot, LotId};
use daicho_core::holding::port::HoldingsPort;
use daicho_core::notify::port::Notifier;
use daicho_core::settlement::entity::{
    BuyOrder, BuySettlement, DiscountVoucher, OrderId, RequestStatus, VerifyOutcome, VoucherId,
    Withdrawal, WithdrawalId, WithdrawalSettlement,
};
use daicho_core::settlement::error::SettleError;
use daicho_core::settlement::port::SettlementStore;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::pricing::PricingService;

/// # Summary
/// `SettlementService` 是结算台账的入口调度者：
/// 用户端流程经它创建 Pending 请求，管理员裁决经它转译为
/// 存储端口上的原子核准/驳回调用。
///
/// # Invariants
/// - 服务层不持有任何可变结算状态；原子性与串行化全部由
///   `SettlementStore` 实现承担。
/// - 通知是 fire-and-forget：发送失败只记日志，不回滚结算。
pub struct SettlementService {
    store: Arc<dyn SettlementStore>,
    holdings: Arc<dyn HoldingsPort>,
    pricing: Arc<PricingService>,
    notifier: Option<Arc<dyn Notifier>>,
    clock: Arc<dyn TimeProvider>,
}

impl SettlementService {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        holdings: Arc<dyn HoldingsPort>,
        pricing: Arc<PricingService>,
        notifier: Option<Arc<dyn Notifier>>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            store,
            holdings,
            pricing,
            notifier,
            clock,
        }
    }

    /// 外发结算结果通知。spawn 出去立即返回，失败只留一条 warn。
    fn notify_outcome(&self, subject: String, content: String) {
        if let Some(notifier) = &self.notifier {
            let notifier = notifier.clone();
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(&subject, &content).await {
                    tracing::warn!("结算通知发送失败 (不影响结算结果): {}", e);
                }
            });
        }
    }

    // --- 买入 ---

    /// # Summary
    /// 创建一笔买入结算请求。
    ///
    /// # Logic
    /// 1. 数量必须为正。
    /// 2. 解析当前报价并固化到订单上；报价不可用则中止创建——
    ///    没有价格就没有订单，不存在半成品落盘。
    /// 3. 若引用折扣凭证，校验其存在、归属与未消费。
    /// 4. 以 Pending 状态落盘。
    pub async fn submit_buy(
        &self,
        account_id: AccountId,
        symbol: &str,
        asset_type: AssetType,
        quantity: Decimal,
        voucher_id: Option<VoucherId>,
    ) -> Result<BuyOrder, SettleError> {
        if quantity <= Decimal::ZERO {
            return Err(SettleError::Validation(format!(
                "买入数量必须为正, 实际: {}",
                quantity
            )));
        }

        let quote = self.pricing.get_price(symbol, asset_type).await?;

        if let Some(vid) = &voucher_id {
            let voucher = self
                .store
                .get_voucher(vid)
                .await?
                .ok_or_else(|| SettleError::Validation(format!("凭证不存在: {}", vid.0)))?;
            if voucher.account_id != account_id {
                return Err(SettleError::Validation(format!(
                    "凭证 {} 不属于账户 {}",
                    vid.0, account_id
                )));
            }
            if voucher.consumed {
                return Err(SettleError::Validation(format!("凭证 {} 已被使用", vid.0)));
            }
        }

        let order = BuyOrder::new(
            OrderId(Uuid::new_v4().to_string()),
            account_id,
            symbol.to_string(),
            asset_type,
            quantity,
            quote.price,
            voucher_id,
            self.clock.now(),
        );
        self.store.save_order(&order).await?;

        info!(
            "Buy order {} created: {} x {} @ {} for account {}",
            order.id.0, order.quantity, order.symbol, order.unit_price, order.account_id.0
        );
        Ok(order)
    }

    /// # Summary
    /// 管理员核准买入。
    ///
    /// # Logic
    /// 1. 终态订单直接返回 `AlreadyProcessed`（良性幂等，无副作用）。
    /// 2. 预构造新批次与自营盘增长因子。
    /// 3. 交由存储端口在单个原子单元内完成状态迁移、批次落地、
    ///    凭证消费与抬价。
    /// 4. 成功后异步外发通知。
    pub async fn verify_buy(
        &self,
        order_id: &OrderId,
    ) -> Result<VerifyOutcome<BuySettlement>, SettleError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| SettleError::RequestNotFound(order_id.0.clone()))?;

        if order.status.is_terminal() {
            return Ok(VerifyOutcome::AlreadyProcessed {
                status: order.status,
            });
        }

        let price_factor = self
            .pricing
            .buy_pressure_factor(&order.symbol, order.quantity)
            .await?;

        let lot = Lot {
            id: LotId(Uuid::new_v4().to_string()),
            account_id: order.account_id.clone(),
            symbol: order.symbol.clone(),
            asset_type: order.asset_type,
            quantity: order.quantity,
            unit_price: order.unit_price,
            acquired_at: self.clock.now(),
            origin_order_id: order.id.clone(),
        };

        let outcome = self.store.settle_buy(order_id, lot, price_factor).await?;

        if let VerifyOutcome::Settled(settlement) = &outcome {
            self.notify_outcome(
                "买入结算完成".to_string(),
                format!(
                    "账户 {} 的订单 {} 已核准: {} x {} @ {}",
                    settlement.order.account_id.0,
                    settlement.order.id.0,
                    settlement.order.quantity,
                    settlement.order.symbol,
                    settlement.order.unit_price
                ),
            );
        }
        Ok(outcome)
    }

    /// 管理员驳回买入：仅状态迁移。
    pub async fn reject_buy(
        &self,
        order_id: &OrderId,
    ) -> Result<VerifyOutcome<BuyOrder>, SettleError> {
        let outcome = self.store.reject_order(order_id).await?;
        if let VerifyOutcome::Settled(order) = &outcome {
            self.notify_outcome(
                "买入请求已驳回".to_string(),
                format!("账户 {} 的订单 {} 已被驳回", order.account_id.0, order.id.0),
            );
        }
        Ok(outcome)
    }

    // --- 提取 ---

    /// # Summary
    /// 创建一笔提取请求。
    ///
    /// # Logic
    /// 1. 基本参数校验。
    /// 2. 对当前头寸做建议性余量检查——它只拦截明显无效的请求，
    ///    权威校验发生在核准时刻（持仓在等待裁决期间可能变化）。
    /// 3. 以 Pending 状态落盘。
    pub async fn submit_withdrawal(
        &self,
        account_id: AccountId,
        symbol: &str,
        asset_type: AssetType,
        quantity: Decimal,
        payout_destination: &str,
    ) -> Result<Withdrawal, SettleError> {
        if quantity <= Decimal::ZERO {
            return Err(SettleError::Validation(format!(
                "提取数量必须为正, 实际: {}",
                quantity
            )));
        }
        if payout_destination.trim().is_empty() {
            return Err(SettleError::Validation("提取去向不能为空".to_string()));
        }

        let held = self.holdings.position(&account_id, symbol, asset_type).await?;
        if held < quantity {
            return Err(SettleError::InsufficientHoldings {
                symbol: symbol.to_string(),
                requested: quantity,
                held,
            });
        }

        let withdrawal = Withdrawal::new(
            WithdrawalId(Uuid::new_v4().to_string()),
            account_id,
            symbol.to_string(),
            asset_type,
            quantity,
            payout_destination.to_string(),
            self.clock.now(),
        );
        self.store.save_withdrawal(&withdrawal).await?;

        info!(
            "Withdrawal {} created: {} x {} for account {}",
            withdrawal.id.0, withdrawal.quantity, withdrawal.symbol, withdrawal.account_id.0
        );
        Ok(withdrawal)
    }

    /// # Summary
    /// 管理员核准提取。权威余量校验与 FIFO 扣减在存储端口的
    /// 原子单元内基于当时快照执行；余量不足时请求保持 Pending，
    /// 错误里带上 "请求量 vs 当前持有量" 供管理员判断。
    pub async fn verify_withdrawal(
        &self,
        withdrawal_id: &WithdrawalId,
    ) -> Result<VerifyOutcome<WithdrawalSettlement>, SettleError> {
        let outcome = self.store.settle_withdrawal(withdrawal_id).await?;

        if let VerifyOutcome::Settled(settlement) = &outcome {
            self.notify_outcome(
                "提取结算完成".to_string(),
                format!(
                    "账户 {} 的提取 {} 已核准: {} x {}, 剩余头寸 {}",
                    settlement.withdrawal.account_id.0,
                    settlement.withdrawal.id.0,
                    settlement.withdrawal.quantity,
                    settlement.withdrawal.symbol,
                    settlement.remaining_position
                ),
            );
        }
        Ok(outcome)
    }

    /// 管理员驳回提取，可附驳回理由。
    pub async fn reject_withdrawal(
        &self,
        withdrawal_id: &WithdrawalId,
        remarks: Option<String>,
    ) -> Result<VerifyOutcome<Withdrawal>, SettleError> {
        let outcome = self.store.reject_withdrawal(withdrawal_id, remarks).await?;
        if let VerifyOutcome::Settled(withdrawal) = &outcome {
            self.notify_outcome(
                "提取请求已驳回".to_string(),
                format!(
                    "账户 {} 的提取 {} 已被驳回",
                    withdrawal.account_id.0, withdrawal.id.0
                ),
            );
        }
        Ok(outcome)
    }

    // --- 查询与凭证 ---

    pub async fn get_order(&self, id: &OrderId) -> Result<Option<BuyOrder>, SettleError> {
        self.store.get_order(id).await
    }

    pub async fn get_withdrawal(
        &self,
        id: &WithdrawalId,
    ) -> Result<Option<Withdrawal>, SettleError> {
        self.store.get_withdrawal(id).await
    }

    pub async fn orders_of(
        &self,
        account_id: &AccountId,
        status: Option<RequestStatus>,
    ) -> Result<Vec<BuyOrder>, SettleError> {
        self.store.orders_of(account_id, status).await
    }

    pub async fn withdrawals_of(
        &self,
        account_id: &AccountId,
        status: Option<RequestStatus>,
    ) -> Result<Vec<Withdrawal>, SettleError> {
        self.store.withdrawals_of(account_id, status).await
    }

    pub async fn pending_orders(&self) -> Result<Vec<BuyOrder>, SettleError> {
        self.store.pending_orders().await
    }

    pub async fn pending_withdrawals(&self) -> Result<Vec<Withdrawal>, SettleError> {
        self.store.pending_withdrawals().await
    }

    /// 为账户发放一张折扣凭证（管理员操作）。
    pub async fn grant_voucher(
        &self,
        account_id: AccountId,
        description: &str,
    ) -> Result<DiscountVoucher, SettleError> {
        let voucher = DiscountVoucher {
            id: VoucherId(Uuid::new_v4().to_string()),
            account_id,
            description: description.to_string(),
            consumed: false,
            created_at: self.clock.now(),
        };
        self.store.save_voucher(&voucher).await?;
        Ok(voucher)
    }
}
