use async_trait::async_trait;
use chrono::{DateTime, Utc};
use daicho_core::common::AccountId;
use daicho_core::loyalty::entity::{LoyaltyTransaction, RedeemedItem};
use daicho_core::loyalty::error::LoyaltyError;
use daicho_core::loyalty::port::LoyaltyStore;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::path::Path;
use tracing::info;

/// 默认积分数据库文件名
const DEFAULT_LOYALTY_DB: &str = "loyalty.db";

type TxRow = (
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    DateTime<Utc>,
);

/// # Summary
/// 积分台账的 SQLite 实现："余额投影 + 只追加流水" 双表结构。
///
/// # Invariants
/// - 可去重来源的唯一性由部分唯一索引保证（存储层约束），
///   并发双记同一任务/推荐事件时后到者命中约束失败。
/// - 余额列与流水在同一事务内更新，任何时刻余额等于流水之和。
pub struct SqliteLoyaltyStore {
    pool: SqlitePool,
}

fn db(e: sqlx::Error) -> LoyaltyError {
    LoyaltyError::Store(e.to_string())
}

fn row_to_tx(row: TxRow) -> Result<LoyaltyTransaction, LoyaltyError> {
    Ok(LoyaltyTransaction {
        id: row.0,
        account_id: AccountId(row.1),
        kind: row.2.parse().map_err(LoyaltyError::Store)?,
        source: row.3.parse().map_err(LoyaltyError::Store)?,
        source_ref: row.4,
        points: row.5,
        description: row.6,
        created_at: row.7,
    })
}

impl SqliteLoyaltyStore {
    /// 在配置的数据根目录下打开（或创建）积分数据库。
    pub async fn new() -> Result<Self, LoyaltyError> {
        Self::open_at(&crate::config::get_root_dir()).await
    }

    /// 在指定目录下打开积分数据库并初始化表结构。
    pub async fn open_at(dir: &Path) -> Result<Self, LoyaltyError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| LoyaltyError::Store(format!("Failed to create data dir: {}", e)))?;

        let options = SqliteConnectOptions::new()
            .filename(dir.join(DEFAULT_LOYALTY_DB))
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
            CREATE TABLE IF NOT EXISTS loyalty_transactions (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                source TEXT NOT NULL,
                source_ref TEXT NOT NULL,
                points INTEGER NOT NULL,
                description TEXT NOT NULL,
                created_at DATETIME NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_loyalty_dedup
                ON loyalty_transactions (account_id, source, source_ref)
                WHERE source IN ('task', 'referral');

            CREATE TABLE IF NOT EXISTS loyalty_balances (
                account_id TEXT PRIMARY KEY,
                balance INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS redeemed_items (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                item_code TEXT NOT NULL,
                points_spent INTEGER NOT NULL,
                redeemed_at DATETIME NOT NULL
            );
            "#,
        )
        .execute(&pool)
        .await
        .map_err(db)?;

        Ok(Self { pool })
    }

    async fn read_balance(
        executor: &mut sqlx::SqliteConnection,
        account_id: &str,
    ) -> Result<i64, LoyaltyError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT balance FROM loyalty_balances WHERE account_id = ?")
                .bind(account_id)
                .fetch_optional(executor)
                .await
                .map_err(db)?;
        Ok(row.map(|r| r.0).unwrap_or(0))
    }
}

#[async_trait]
impl LoyaltyStore for SqliteLoyaltyStore {
    /// # Logic
    /// 1. 插入流水；可去重来源命中唯一索引时翻译为 `DuplicateEvent`。
    /// 2. 同一事务内 Upsert 余额（balance += points）。
    /// 3. 读出新余额并提交。
    async fn credit(&self, tx: LoyaltyTransaction) -> Result<i64, LoyaltyError> {
        let mut dbtx = self.pool.begin().await.map_err(db)?;

        sqlx::query(
            r#"
            INSERT INTO loyalty_transactions
                (id, account_id, kind, source, source_ref, points, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tx.id)
        .bind(&tx.account_id.0)
        .bind(tx.kind.to_string())
        .bind(tx.source.to_string())
        .bind(&tx.source_ref)
        .bind(tx.points)
        .bind(&tx.description)
        .bind(tx.created_at)
        .execute(&mut *dbtx)
        .await
        .map_err(|e| {
            if e.to_string().contains("UNIQUE") {
                LoyaltyError::DuplicateEvent {
                    source_kind: tx.source.to_string(),
                    source_ref: tx.source_ref.clone(),
                }
            } else {
                db(e)
            }
        })?;

        sqlx::query(
            r#"
            INSERT INTO loyalty_balances (account_id, balance) VALUES (?, ?)
            ON CONFLICT(account_id) DO UPDATE SET balance = balance + excluded.balance
            "#,
        )
        .bind(&tx.account_id.0)
        .bind(tx.points)
        .execute(&mut *dbtx)
        .await
        .map_err(db)?;

        let balance = Self::read_balance(&mut *dbtx, &tx.account_id.0).await?;
        dbtx.commit().await.map_err(db)?;

        info!(
            "Credited {} points to account {} ({}/{})",
            tx.points, tx.account_id.0, tx.source, tx.source_ref
        );
        Ok(balance)
    }

    /// # Logic
    /// 1. 事务内读出当前余额，不足则回滚并上抛 `InsufficientPoints`。
    /// 2. 插入负向流水、扣减余额、追加库存条目。
    /// 3. 提交并返回新余额。
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

        let mut dbtx = self.pool.begin().await.map_err(db)?;

        let balance = Self::read_balance(&mut *dbtx, &tx.account_id.0).await?;
        if balance < required {
            dbtx.rollback().await.map_err(db)?;
            return Err(LoyaltyError::InsufficientPoints {
                required,
                actual: balance,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO loyalty_transactions
                (id, account_id, kind, source, source_ref, points, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tx.id)
        .bind(&tx.account_id.0)
        .bind(tx.kind.to_string())
        .bind(tx.source.to_string())
        .bind(&tx.source_ref)
        .bind(tx.points)
        .bind(&tx.description)
        .bind(tx.created_at)
        .execute(&mut *dbtx)
        .await
        .map_err(db)?;

        sqlx::query("UPDATE loyalty_balances SET balance = balance - ? WHERE account_id = ?")
            .bind(required)
            .bind(&tx.account_id.0)
            .execute(&mut *dbtx)
            .await
            .map_err(db)?;

        sqlx::query(
            r#"
            INSERT INTO redeemed_items (id, account_id, item_code, points_spent, redeemed_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.account_id.0)
        .bind(&item.item_code)
        .bind(item.points_spent)
        .bind(item.redeemed_at)
        .execute(&mut *dbtx)
        .await
        .map_err(db)?;

        let new_balance = Self::read_balance(&mut *dbtx, &tx.account_id.0).await?;
        dbtx.commit().await.map_err(db)?;

        info!(
            "Account {} redeemed {} for {} points, {} left",
            tx.account_id.0, item.item_code, required, new_balance
        );
        Ok(new_balance)
    }

    async fn balance(&self, account_id: &AccountId) -> Result<i64, LoyaltyError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT balance FROM loyalty_balances WHERE account_id = ?")
                .bind(&account_id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(db)?;
        Ok(row.map(|r| r.0).unwrap_or(0))
    }

    async fn transactions(
        &self,
        account_id: &AccountId,
    ) -> Result<Vec<LoyaltyTransaction>, LoyaltyError> {
        sqlx::query_as::<_, TxRow>(
            r#"
            SELECT id, account_id, kind, source, source_ref, points, description, created_at
            FROM loyalty_transactions WHERE account_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(&account_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(row_to_tx)
        .collect()
    }

    async fn inventory(&self, account_id: &AccountId) -> Result<Vec<RedeemedItem>, LoyaltyError> {
        let rows: Vec<(String, String, String, i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, account_id, item_code, points_spent, redeemed_at
            FROM redeemed_items WHERE account_id = ?
            ORDER BY redeemed_at ASC
            "#,
        )
        .bind(&account_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        Ok(rows
            .into_iter()
            .map(|r| RedeemedItem {
                id: r.0,
                account_id: AccountId(r.1),
                item_code: r.2,
                points_spent: r.3,
                redeemed_at: r.4,
            })
            .collect())
    }
}
