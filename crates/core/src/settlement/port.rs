use crate::common::AccountId;
use crate::holding::entity::Lot;
use crate::settlement::entity::{
    BuyOrder, BuySettlement, DiscountVoucher, OrderId, RequestStatus, VerifyOutcome, VoucherId,
    Withdrawal, WithdrawalId, WithdrawalSettlement,
};
use crate::settlement::error::SettleError;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// # Summary
/// 结算台账存储端口：订单、提取请求、凭证的持久化，以及两个
/// 必须以单一原子单元执行的核准操作。
///
/// # Invariants
/// - 状态迁移一律是 CAS 语义（仅当当前状态为 Pending 时生效），
///   迁移失败返回 `AlreadyProcessed` 而非重复施加副作用。
/// - `settle_buy` / `settle_withdrawal` 的全部写入要么同时生效、
///   要么同时回滚，不允许出现 "批次已写入但状态仍为 Pending"
///   之类的中间态落盘。
/// - 同一 (account, symbol, asset_type) 上的并发提取核准必须被
///   实现串行化：余量校验与扣减写入观察同一个一致快照。
#[async_trait]
pub trait SettlementStore: Send + Sync {
    // --- 买入订单 ---

    /// 保存一笔新创建的 Pending 订单。
    async fn save_order(&self, order: &BuyOrder) -> Result<(), SettleError>;

    /// 按 ID 查询订单。
    async fn get_order(&self, id: &OrderId) -> Result<Option<BuyOrder>, SettleError>;

    /// 查询账户名下订单（可按状态过滤），按创建时间倒序。
    async fn orders_of(
        &self,
        account_id: &AccountId,
        status: Option<RequestStatus>,
    ) -> Result<Vec<BuyOrder>, SettleError>;

    /// 全平台待裁决订单列表（管理员视角）。
    async fn pending_orders(&self) -> Result<Vec<BuyOrder>, SettleError>;

    /// # Summary
    /// 核准买入：在一个原子单元内完成状态 CAS、批次追加、
    /// 凭证消费与自营盘价格抬升。
    ///
    /// # Logic
    /// 1. CAS `pending -> verified`；失败则返回请求当前终态。
    /// 2. 插入 `lot`（`origin_order_id` 唯一约束兜底幂等）。
    /// 3. 若订单引用凭证，按凭证 id CAS 置为已消费。
    /// 4. 若 `price_factor` 为 Some 且标的为自营盘，原子抬价并记录变动。
    ///
    /// # Arguments
    /// * `order_id` - 待核准订单。
    /// * `lot` - 由服务层预构造的新批次（含取得时间与来源订单）。
    /// * `price_factor` - 自营盘增长乘数，非自营盘传 None。
    async fn settle_buy(
        &self,
        order_id: &OrderId,
        lot: Lot,
        price_factor: Option<Decimal>,
    ) -> Result<VerifyOutcome<BuySettlement>, SettleError>;

    /// 驳回买入：仅状态 CAS，无任何副作用。
    async fn reject_order(&self, order_id: &OrderId)
    -> Result<VerifyOutcome<BuyOrder>, SettleError>;

    // --- 提取请求 ---

    /// 保存一笔新创建的 Pending 提取请求。
    async fn save_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), SettleError>;

    /// 按 ID 查询提取请求。
    async fn get_withdrawal(&self, id: &WithdrawalId)
    -> Result<Option<Withdrawal>, SettleError>;

    /// 查询账户名下提取请求（可按状态过滤），按创建时间倒序。
    async fn withdrawals_of(
        &self,
        account_id: &AccountId,
        status: Option<RequestStatus>,
    ) -> Result<Vec<Withdrawal>, SettleError>;

    /// 全平台待裁决提取列表（管理员视角）。
    async fn pending_withdrawals(&self) -> Result<Vec<Withdrawal>, SettleError>;

    /// # Summary
    /// 核准提取：在一个原子单元内完成状态 CAS、权威余量校验与
    /// FIFO 扣减。
    ///
    /// # Logic
    /// 1. CAS `pending -> verified`；失败则返回请求当前终态。
    /// 2. 读取 (account, symbol, asset_type) 当前批次快照（FIFO 序）。
    /// 3. 以纯函数规划扣减；余量不足则整体回滚——请求保持 Pending，
    ///    并上抛含 "请求量 vs 当前持有量" 的 `InsufficientHoldings`。
    /// 4. 依计划删除/改写批次后提交。
    async fn settle_withdrawal(
        &self,
        withdrawal_id: &WithdrawalId,
    ) -> Result<VerifyOutcome<WithdrawalSettlement>, SettleError>;

    /// 驳回提取：状态 CAS 并落盘管理员备注。
    async fn reject_withdrawal(
        &self,
        withdrawal_id: &WithdrawalId,
        remarks: Option<String>,
    ) -> Result<VerifyOutcome<Withdrawal>, SettleError>;

    // --- 折扣凭证 ---

    /// 保存一张新凭证。
    async fn save_voucher(&self, voucher: &DiscountVoucher) -> Result<(), SettleError>;

    /// 按 ID 查询凭证。
    async fn get_voucher(&self, id: &VoucherId)
    -> Result<Option<DiscountVoucher>, SettleError>;
}
