use async_trait::async_trait;
use chrono::Utc;
use daicho_core::pricing::entity::{Instrument, PriceImpact};
use daicho_core::pricing::error::PricingError;
use daicho_core::pricing::port::InstrumentStore;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

/// # Summary
/// 挂牌标的的 SQLite 实现。与台账库共用同一个连接池（同一数据库
/// 文件），买入核准事务因此能在抬价的同时落批次。
///
/// # Invariants
/// - `apply_pressure` 的读-改-写发生在单个写事务内；单连接池保证
///   并发抬价串行执行，不存在基于陈旧价的覆盖写。
pub struct SqliteInstrumentStore {
    pool: SqlitePool,
}

fn db(e: sqlx::Error) -> PricingError {
    PricingError::Store(e.to_string())
}

fn parse_dec(raw: &str) -> Result<Decimal, PricingError> {
    Decimal::from_str(raw)
        .map_err(|e| PricingError::Store(format!("corrupt decimal '{}': {}", raw, e)))
}

impl SqliteInstrumentStore {
    /// 复用台账库的连接池创建实例（表结构由台账库初始化）。
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InstrumentStore for SqliteInstrumentStore {
    async fn get(&self, symbol: &str) -> Result<Option<Instrument>, PricingError> {
        let row: Option<(String, String, String, i64)> = sqlx::query_as(
            "SELECT symbol, asset_type, unit_price, house_listed FROM instruments WHERE symbol = ?",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.map(|r| {
            Ok(Instrument {
                symbol: r.0,
                asset_type: r.1.parse().map_err(PricingError::Store)?,
                unit_price: parse_dec(&r.2)?,
                house_listed: r.3 != 0,
            })
        })
        .transpose()
    }

    async fn upsert(&self, instrument: &Instrument) -> Result<(), PricingError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO instruments
                (symbol, asset_type, unit_price, house_listed, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&instrument.symbol)
        .bind(instrument.asset_type.to_string())
        .bind(instrument.unit_price.to_string())
        .bind(i64::from(instrument.house_listed))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db)?;
        info!(
            "Instrument {} upserted (house_listed: {})",
            instrument.symbol, instrument.house_listed
        );
        Ok(())
    }

    /// # Logic
    /// 1. 写事务内读出当前价格与挂牌属性。
    /// 2. 非自营盘或因子 < 1 直接拒绝（价格只升不降）。
    /// 3. 写回 `price * factor` 并返回变动记录。
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

        let mut tx = self.pool.begin().await.map_err(db)?;

        let row: Option<(String, i64)> = sqlx::query_as(
            "SELECT unit_price, house_listed FROM instruments WHERE symbol = ?",
        )
        .bind(symbol)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db)?;

        let (raw_price, house_listed) = match row {
            Some(r) => r,
            None => {
                tx.rollback().await.map_err(db)?;
                return Err(PricingError::UnknownSymbol(symbol.to_string()));
            }
        };
        if house_listed == 0 {
            tx.rollback().await.map_err(db)?;
            return Err(PricingError::Validation(format!(
                "{} is not house-listed, its price is externally owned",
                symbol
            )));
        }

        let previous = parse_dec(&raw_price)?;
        let updated = previous * factor;

        sqlx::query("UPDATE instruments SET unit_price = ?, updated_at = ? WHERE symbol = ?")
            .bind(updated.to_string())
            .bind(Utc::now())
            .bind(symbol)
            .execute(&mut *tx)
            .await
            .map_err(db)?;

        tx.commit().await.map_err(db)?;

        Ok(PriceImpact::between(symbol, previous, updated))
    }
}
