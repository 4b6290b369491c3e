use async_trait::async_trait;
use chrono::{DateTime, Utc};
use daicho_core::common::{AccountId, AssetType};
use daicho_core::holding::entity::{
    Lot, LotDepletion, LotId, PositionView, plan_fifo_depletion,
};
use daicho_core::holding::port::HoldingsPort;
use daicho_core::pricing::entity::PriceImpact;
use daicho_core::settlement::entity::{
    BuyOrder, BuySettlement, DiscountVoucher, OrderId, RequestStatus, VerifyOutcome, VoucherId,
    Withdrawal, WithdrawalId, WithdrawalSettlement,
};
use daicho_core::settlement::error::SettleError;
use daicho_core::settlement::port::SettlementStore;
use rust_decimal::Decimal;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// 默认台账数据库文件名
const DEFAULT_LEDGER_DB: &str = "ledger.db";

type OrderRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    DateTime<Utc>,
);
type WithdrawalRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    DateTime<Utc>,
);
type LotRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    DateTime<Utc>,
    String,
);

/// # Summary
/// 结算台账的 SQLite 单库实现。订单、提取、批次、凭证与挂牌标的
/// 落在同一个数据库文件里，核准操作因此可以用一个写事务覆盖
/// "状态 CAS + 批次写入 + 凭证消费 + 抬价" 的全部步骤。
///
/// # Invariants
/// - 连接池固定为单连接：所有写事务天然串行化，同一标的上的
///   并发提取核准不可能交错观察到彼此的中间态。
/// - 状态迁移一律 `UPDATE ... WHERE status = 'pending'`，受影响行数
///   为零即请求已处于终态。
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

fn db(e: sqlx::Error) -> SettleError {
    SettleError::Store(e.to_string())
}

fn parse_dec(raw: &str) -> Result<Decimal, SettleError> {
    Decimal::from_str(raw)
        .map_err(|e| SettleError::Store(format!("corrupt decimal '{}': {}", raw, e)))
}

fn parse_asset(raw: &str) -> Result<AssetType, SettleError> {
    raw.parse().map_err(SettleError::Store)
}

fn parse_status(raw: &str) -> Result<RequestStatus, SettleError> {
    raw.parse().map_err(SettleError::Store)
}

fn row_to_order(row: OrderRow) -> Result<BuyOrder, SettleError> {
    Ok(BuyOrder {
        id: OrderId(row.0),
        account_id: AccountId(row.1),
        symbol: row.2,
        asset_type: parse_asset(&row.3)?,
        quantity: parse_dec(&row.4)?,
        unit_price: parse_dec(&row.5)?,
        total_amount: parse_dec(&row.6)?,
        voucher_id: row.7.map(VoucherId),
        status: parse_status(&row.8)?,
        created_at: row.9,
    })
}

fn row_to_withdrawal(row: WithdrawalRow) -> Result<Withdrawal, SettleError> {
    Ok(Withdrawal {
        id: WithdrawalId(row.0),
        account_id: AccountId(row.1),
        symbol: row.2,
        asset_type: parse_asset(&row.3)?,
        quantity: parse_dec(&row.4)?,
        payout_destination: row.5,
        remarks: row.6,
        status: parse_status(&row.7)?,
        created_at: row.8,
    })
}

fn row_to_lot(row: LotRow) -> Result<Lot, SettleError> {
    Ok(Lot {
        id: LotId(row.0),
        account_id: AccountId(row.1),
        symbol: row.2,
        asset_type: parse_asset(&row.3)?,
        quantity: parse_dec(&row.4)?,
        unit_price: parse_dec(&row.5)?,
        acquired_at: row.6,
        origin_order_id: OrderId(row.7),
    })
}

impl SqliteLedgerStore {
    /// 在配置的数据根目录下打开（或创建）台账数据库。
    pub async fn new() -> Result<Self, SettleError> {
        Self::open_at(&crate::config::get_root_dir()).await
    }

    /// # Summary
    /// 在指定目录下打开台账数据库并初始化表结构。
    ///
    /// # Logic
    /// 1. 确保目录存在，配置 WAL + busy_timeout 的 SQLite 连接。
    /// 2. 连接池上限设为 1，写事务在池层面即串行。
    /// 3. 执行 DDL 建表（幂等）。
    pub async fn open_at(dir: &Path) -> Result<Self, SettleError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| SettleError::Store(format!("Failed to create data dir: {}", e)))?;

        let db_path = dir.join(DEFAULT_LEDGER_DB);
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(db)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                asset_type TEXT NOT NULL,
                quantity TEXT NOT NULL,
                unit_price TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                voucher_id TEXT,
                status TEXT NOT NULL,
                created_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS withdrawals (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                asset_type TEXT NOT NULL,
                quantity TEXT NOT NULL,
                payout_destination TEXT NOT NULL,
                remarks TEXT,
                status TEXT NOT NULL,
                created_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS lots (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                asset_type TEXT NOT NULL,
                quantity TEXT NOT NULL,
                unit_price TEXT NOT NULL,
                acquired_at DATETIME NOT NULL,
                origin_order_id TEXT NOT NULL UNIQUE
            );

            CREATE INDEX IF NOT EXISTS idx_lots_position
                ON lots (account_id, symbol, asset_type);

            CREATE TABLE IF NOT EXISTS vouchers (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                description TEXT NOT NULL,
                consumed INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS instruments (
                symbol TEXT PRIMARY KEY,
                asset_type TEXT NOT NULL,
                unit_price TEXT NOT NULL,
                house_listed INTEGER NOT NULL,
                updated_at DATETIME NOT NULL
            );
            "#,
        )
        .execute(&pool)
        .await
        .map_err(db)?;

        info!("Ledger database ready at {}", db_path.display());
        Ok(Self { pool })
    }

    /// 暴露共享连接池，供同库的挂牌标的存储复用。
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }
}

#[async_trait]
impl SettlementStore for SqliteLedgerStore {
    async fn save_order(&self, order: &BuyOrder) -> Result<(), SettleError> {
        sqlx::query(
            r#"
            INSERT INTO orders
                (id, account_id, symbol, asset_type, quantity, unit_price,
                 total_amount, voucher_id, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order.id.0)
        .bind(&order.account_id.0)
        .bind(&order.symbol)
        .bind(order.asset_type.to_string())
        .bind(order.quantity.to_string())
        .bind(order.unit_price.to_string())
        .bind(order.total_amount.to_string())
        .bind(order.voucher_id.as_ref().map(|v| v.0.clone()))
        .bind(order.status.to_string())
        .bind(order.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<BuyOrder>, SettleError> {
        sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, account_id, symbol, asset_type, quantity, unit_price,
                   total_amount, voucher_id, status, created_at
            FROM orders WHERE id = ?
            "#,
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .map(row_to_order)
        .transpose()
    }

    async fn orders_of(
        &self,
        account_id: &AccountId,
        status: Option<RequestStatus>,
    ) -> Result<Vec<BuyOrder>, SettleError> {
        let rows = match status {
            Some(s) => {
                sqlx::query_as::<_, OrderRow>(
                    r#"
                    SELECT id, account_id, symbol, asset_type, quantity, unit_price,
                           total_amount, voucher_id, status, created_at
                    FROM orders WHERE account_id = ? AND status = ?
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(&account_id.0)
                .bind(s.to_string())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, OrderRow>(
                    r#"
                    SELECT id, account_id, symbol, asset_type, quantity, unit_price,
                           total_amount, voucher_id, status, created_at
                    FROM orders WHERE account_id = ?
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(&account_id.0)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(db)?;

        rows.into_iter().map(row_to_order).collect()
    }

    async fn pending_orders(&self) -> Result<Vec<BuyOrder>, SettleError> {
        sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, account_id, symbol, asset_type, quantity, unit_price,
                   total_amount, voucher_id, status, created_at
            FROM orders WHERE status = 'pending'
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(row_to_order)
        .collect()
    }

    /// # Logic
    /// 1. CAS 状态迁移，零行命中则查出当前状态作幂等应答。
    /// 2. 插入新批次（`origin_order_id` 唯一约束兜底）。
    /// 3. 按凭证 id CAS 消费折扣凭证。
    /// 4. 若给出增长因子且标的为自营盘，读-改-写抬升价格。
    /// 5. 提交。任何一步失败整体回滚，重试安全。
    async fn settle_buy(
        &self,
        order_id: &OrderId,
        lot: Lot,
        price_factor: Option<Decimal>,
    ) -> Result<VerifyOutcome<BuySettlement>, SettleError> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        let flipped =
            sqlx::query("UPDATE orders SET status = 'verified' WHERE id = ? AND status = 'pending'")
                .bind(&order_id.0)
                .execute(&mut *tx)
                .await
                .map_err(db)?;

        if flipped.rows_affected() == 0 {
            let current: Option<(String,)> =
                sqlx::query_as("SELECT status FROM orders WHERE id = ?")
                    .bind(&order_id.0)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db)?;
            tx.rollback().await.map_err(db)?;
            return match current {
                Some((raw,)) => Ok(VerifyOutcome::AlreadyProcessed {
                    status: parse_status(&raw)?,
                }),
                None => Err(SettleError::RequestNotFound(order_id.0.clone())),
            };
        }

        let order_row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, account_id, symbol, asset_type, quantity, unit_price,
                   total_amount, voucher_id, status, created_at
            FROM orders WHERE id = ?
            "#,
        )
        .bind(&order_id.0)
        .fetch_one(&mut *tx)
        .await
        .map_err(db)?;
        let order = row_to_order(order_row)?;

        sqlx::query(
            r#"
            INSERT INTO lots
                (id, account_id, symbol, asset_type, quantity, unit_price,
                 acquired_at, origin_order_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&lot.id.0)
        .bind(&lot.account_id.0)
        .bind(&lot.symbol)
        .bind(lot.asset_type.to_string())
        .bind(lot.quantity.to_string())
        .bind(lot.unit_price.to_string())
        .bind(lot.acquired_at)
        .bind(&lot.origin_order_id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if e.to_string().contains("UNIQUE") {
                SettleError::Conflict(format!("order {} already produced a lot", order_id.0))
            } else {
                db(e)
            }
        })?;

        let mut voucher_consumed = false;
        if let Some(voucher_id) = &order.voucher_id {
            let consumed =
                sqlx::query("UPDATE vouchers SET consumed = 1 WHERE id = ? AND consumed = 0")
                    .bind(&voucher_id.0)
                    .execute(&mut *tx)
                    .await
                    .map_err(db)?;
            voucher_consumed = consumed.rows_affected() > 0;
            if !voucher_consumed {
                warn!(
                    "订单 {} 引用的凭证 {} 已被消费, 本次结算不再重复抵扣",
                    order_id.0, voucher_id.0
                );
            }
        }

        let mut price_impact = None;
        if let Some(factor) = price_factor {
            let instrument: Option<(String, i64)> =
                sqlx::query_as("SELECT unit_price, house_listed FROM instruments WHERE symbol = ?")
                    .bind(&order.symbol)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db)?;

            if let Some((raw_price, house_listed)) = instrument
                && house_listed != 0
                && factor >= Decimal::ONE
            {
                let previous = parse_dec(&raw_price)?;
                let updated = previous * factor;
                sqlx::query("UPDATE instruments SET unit_price = ?, updated_at = ? WHERE symbol = ?")
                    .bind(updated.to_string())
                    .bind(Utc::now())
                    .bind(&order.symbol)
                    .execute(&mut *tx)
                    .await
                    .map_err(db)?;
                price_impact = Some(PriceImpact::between(&order.symbol, previous, updated));
            }
        }

        tx.commit().await.map_err(db)?;

        info!(
            "Order {} settled: lot {} ({} x {} @ {}) for account {}",
            order.id.0, lot.id.0, order.symbol, order.quantity, order.unit_price, order.account_id.0
        );

        Ok(VerifyOutcome::Settled(BuySettlement {
            order,
            lot,
            price_impact,
            voucher_consumed,
        }))
    }

    async fn reject_order(
        &self,
        order_id: &OrderId,
    ) -> Result<VerifyOutcome<BuyOrder>, SettleError> {
        let flipped =
            sqlx::query("UPDATE orders SET status = 'rejected' WHERE id = ? AND status = 'pending'")
                .bind(&order_id.0)
                .execute(&self.pool)
                .await
                .map_err(db)?;

        let order = self
            .get_order(order_id)
            .await?
            .ok_or_else(|| SettleError::RequestNotFound(order_id.0.clone()))?;

        if flipped.rows_affected() == 0 {
            return Ok(VerifyOutcome::AlreadyProcessed {
                status: order.status,
            });
        }
        Ok(VerifyOutcome::Settled(order))
    }

    async fn save_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), SettleError> {
        sqlx::query(
            r#"
            INSERT INTO withdrawals
                (id, account_id, symbol, asset_type, quantity, payout_destination,
                 remarks, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&withdrawal.id.0)
        .bind(&withdrawal.account_id.0)
        .bind(&withdrawal.symbol)
        .bind(withdrawal.asset_type.to_string())
        .bind(withdrawal.quantity.to_string())
        .bind(&withdrawal.payout_destination)
        .bind(&withdrawal.remarks)
        .bind(withdrawal.status.to_string())
        .bind(withdrawal.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn get_withdrawal(
        &self,
        id: &WithdrawalId,
    ) -> Result<Option<Withdrawal>, SettleError> {
        sqlx::query_as::<_, WithdrawalRow>(
            r#"
            SELECT id, account_id, symbol, asset_type, quantity, payout_destination,
                   remarks, status, created_at
            FROM withdrawals WHERE id = ?
            "#,
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .map(row_to_withdrawal)
        .transpose()
    }

    async fn withdrawals_of(
        &self,
        account_id: &AccountId,
        status: Option<RequestStatus>,
    ) -> Result<Vec<Withdrawal>, SettleError> {
        let rows = match status {
            Some(s) => {
                sqlx::query_as::<_, WithdrawalRow>(
                    r#"
                    SELECT id, account_id, symbol, asset_type, quantity, payout_destination,
                           remarks, status, created_at
                    FROM withdrawals WHERE account_id = ? AND status = ?
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(&account_id.0)
                .bind(s.to_string())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, WithdrawalRow>(
                    r#"
                    SELECT id, account_id, symbol, asset_type, quantity, payout_destination,
                           remarks, status, created_at
                    FROM withdrawals WHERE account_id = ?
                    ORDER BY created_at DESC
                    "#,
                )
                .bind(&account_id.0)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(db)?;

        rows.into_iter().map(row_to_withdrawal).collect()
    }

    async fn pending_withdrawals(&self) -> Result<Vec<Withdrawal>, SettleError> {
        sqlx::query_as::<_, WithdrawalRow>(
            r#"
            SELECT id, account_id, symbol, asset_type, quantity, payout_destination,
                   remarks, status, created_at
            FROM withdrawals WHERE status = 'pending'
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(row_to_withdrawal)
        .collect()
    }

    /// # Logic
    /// 1. CAS 状态迁移，零行命中则作幂等应答。
    /// 2. 同一事务内读取该标的批次快照（FIFO 序）并规划扣减。
    /// 3. 余量不足：回滚（请求保持 Pending）并上抛含当前持有量的错误。
    /// 4. 余量充足：按计划删除/改写批次后提交。
    ///
    /// 单连接池意味着两笔并发提取的事务串行执行，后到者必然看到
    /// 先到者扣减后的快照——余量校验不可能基于陈旧头寸通过。
    async fn settle_withdrawal(
        &self,
        withdrawal_id: &WithdrawalId,
    ) -> Result<VerifyOutcome<WithdrawalSettlement>, SettleError> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        let flipped = sqlx::query(
            "UPDATE withdrawals SET status = 'verified' WHERE id = ? AND status = 'pending'",
        )
        .bind(&withdrawal_id.0)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        if flipped.rows_affected() == 0 {
            let current: Option<(String,)> =
                sqlx::query_as("SELECT status FROM withdrawals WHERE id = ?")
                    .bind(&withdrawal_id.0)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db)?;
            tx.rollback().await.map_err(db)?;
            return match current {
                Some((raw,)) => Ok(VerifyOutcome::AlreadyProcessed {
                    status: parse_status(&raw)?,
                }),
                None => Err(SettleError::RequestNotFound(withdrawal_id.0.clone())),
            };
        }

        let withdrawal_row = sqlx::query_as::<_, WithdrawalRow>(
            r#"
            SELECT id, account_id, symbol, asset_type, quantity, payout_destination,
                   remarks, status, created_at
            FROM withdrawals WHERE id = ?
            "#,
        )
        .bind(&withdrawal_id.0)
        .fetch_one(&mut *tx)
        .await
        .map_err(db)?;
        let withdrawal = row_to_withdrawal(withdrawal_row)?;

        let lot_rows = sqlx::query_as::<_, LotRow>(
            r#"
            SELECT id, account_id, symbol, asset_type, quantity, unit_price,
                   acquired_at, origin_order_id
            FROM lots
            WHERE account_id = ? AND symbol = ? AND asset_type = ?
            ORDER BY acquired_at ASC, id ASC
            "#,
        )
        .bind(&withdrawal.account_id.0)
        .bind(&withdrawal.symbol)
        .bind(withdrawal.asset_type.to_string())
        .fetch_all(&mut *tx)
        .await
        .map_err(db)?;

        let lots: Vec<Lot> = lot_rows
            .into_iter()
            .map(row_to_lot)
            .collect::<Result<_, _>>()?;

        let plan = match plan_fifo_depletion(&lots, withdrawal.quantity) {
            Ok(plan) => plan,
            Err(shortfall) => {
                tx.rollback().await.map_err(db)?;
                return Err(SettleError::InsufficientHoldings {
                    symbol: withdrawal.symbol,
                    requested: shortfall.requested,
                    held: shortfall.held,
                });
            }
        };

        let mut removed_lots = 0usize;
        let mut shrunk_lot = None;
        for step in &plan.steps {
            match step {
                LotDepletion::Remove(lot_id) => {
                    sqlx::query("DELETE FROM lots WHERE id = ?")
                        .bind(&lot_id.0)
                        .execute(&mut *tx)
                        .await
                        .map_err(db)?;
                    removed_lots += 1;
                }
                LotDepletion::Shrink(lot_id, new_qty) => {
                    sqlx::query("UPDATE lots SET quantity = ? WHERE id = ?")
                        .bind(new_qty.to_string())
                        .bind(&lot_id.0)
                        .execute(&mut *tx)
                        .await
                        .map_err(db)?;
                    shrunk_lot = Some(lot_id.clone());
                }
            }
        }

        let held: Decimal = lots.iter().map(|l| l.quantity).sum();
        let remaining_position = held - withdrawal.quantity;

        tx.commit().await.map_err(db)?;

        info!(
            "Withdrawal {} settled: {} x {} depleted for account {}, {} left",
            withdrawal.id.0,
            withdrawal.quantity,
            withdrawal.symbol,
            withdrawal.account_id.0,
            remaining_position
        );

        Ok(VerifyOutcome::Settled(WithdrawalSettlement {
            withdrawal,
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
        let flipped = sqlx::query(
            "UPDATE withdrawals SET status = 'rejected', remarks = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(&remarks)
        .bind(&withdrawal_id.0)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        let withdrawal = self
            .get_withdrawal(withdrawal_id)
            .await?
            .ok_or_else(|| SettleError::RequestNotFound(withdrawal_id.0.clone()))?;

        if flipped.rows_affected() == 0 {
            return Ok(VerifyOutcome::AlreadyProcessed {
                status: withdrawal.status,
            });
        }
        Ok(VerifyOutcome::Settled(withdrawal))
    }

    async fn save_voucher(&self, voucher: &DiscountVoucher) -> Result<(), SettleError> {
        sqlx::query(
            r#"
            INSERT INTO vouchers (id, account_id, description, consumed, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&voucher.id.0)
        .bind(&voucher.account_id.0)
        .bind(&voucher.description)
        .bind(i64::from(voucher.consumed))
        .bind(voucher.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn get_voucher(
        &self,
        id: &VoucherId,
    ) -> Result<Option<DiscountVoucher>, SettleError> {
        let row: Option<(String, String, String, i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, account_id, description, consumed, created_at FROM vouchers WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        Ok(row.map(|r| DiscountVoucher {
            id: VoucherId(r.0),
            account_id: AccountId(r.1),
            description: r.2,
            consumed: r.3 != 0,
            created_at: r.4,
        }))
    }
}

#[async_trait]
impl HoldingsPort for SqliteLedgerStore {
    async fn lots(
        &self,
        account_id: &AccountId,
        symbol: &str,
        asset_type: AssetType,
    ) -> Result<Vec<Lot>, SettleError> {
        sqlx::query_as::<_, LotRow>(
            r#"
            SELECT id, account_id, symbol, asset_type, quantity, unit_price,
                   acquired_at, origin_order_id
            FROM lots
            WHERE account_id = ? AND symbol = ? AND asset_type = ?
            ORDER BY acquired_at ASC, id ASC
            "#,
        )
        .bind(&account_id.0)
        .bind(symbol)
        .bind(asset_type.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(row_to_lot)
        .collect()
    }

    async fn all_lots(&self, account_id: &AccountId) -> Result<Vec<Lot>, SettleError> {
        sqlx::query_as::<_, LotRow>(
            r#"
            SELECT id, account_id, symbol, asset_type, quantity, unit_price,
                   acquired_at, origin_order_id
            FROM lots WHERE account_id = ?
            ORDER BY acquired_at ASC, id ASC
            "#,
        )
        .bind(&account_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(row_to_lot)
        .collect()
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
