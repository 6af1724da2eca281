//! Append-only persistence for canonical executions.
//!
//! The database stores only the execution log; wheel state is always
//! rebuilt from it at startup, never persisted. Duplicate ids are absorbed
//! by the primary key, mirroring the engine's in-memory dedup.

use crate::db::DatabasePool;
use crate::engine::execution::{Execution, InstrumentKind, Side};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::postgres::PgRow;
use tracing::info;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS executions (
    account     TEXT        NOT NULL,
    exec_id     TEXT        NOT NULL,
    executed_at TIMESTAMPTZ NOT NULL,
    symbol      TEXT        NOT NULL,
    instrument  TEXT        NOT NULL,
    side        TEXT        NOT NULL,
    strike      NUMERIC,
    expiry      DATE,
    quantity    NUMERIC     NOT NULL,
    price       NUMERIC     NOT NULL,
    commission  NUMERIC     NOT NULL,
    multiplier  NUMERIC     NOT NULL,
    assignment  BOOLEAN     NOT NULL DEFAULT FALSE,
    PRIMARY KEY (account, exec_id)
)"#;

const INSERT: &str = r#"
INSERT INTO executions
    (account, exec_id, executed_at, symbol, instrument, side, strike,
     expiry, quantity, price, commission, multiplier, assignment)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
ON CONFLICT (account, exec_id) DO NOTHING"#;

const SELECT_FOR_ACCOUNT: &str = r#"
SELECT exec_id, executed_at, symbol, instrument, side, strike, expiry,
       quantity, price, commission, multiplier, assignment
FROM executions WHERE account = $1 ORDER BY executed_at ASC"#;

const SELECT_ACCOUNTS: &str = "SELECT DISTINCT account FROM executions";

/// Execution log store on top of the shared pool.
#[derive(Clone)]
pub struct ExecutionStore {
    db: DatabasePool,
}

impl ExecutionStore {
    /// Creates a store over an established pool.
    #[must_use]
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    /// Creates the executions table when missing.
    ///
    /// # Errors
    /// Returns an error if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(CREATE_TABLE).execute(self.db.pool()).await?;
        info!("execution schema ensured");
        Ok(())
    }

    /// Appends executions for an account; already-known ids are skipped.
    /// Returns the number of rows actually inserted.
    ///
    /// # Errors
    /// Returns an error if a statement fails.
    pub async fn insert(
        &self,
        account: &str,
        executions: &[Execution],
    ) -> Result<u64, sqlx::Error> {
        let mut inserted = 0u64;
        for exec in executions {
            let result = sqlx::query(INSERT)
                .bind(account)
                .bind(&exec.exec_id)
                .bind(exec.timestamp)
                .bind(&exec.symbol)
                .bind(exec.instrument.to_string())
                .bind(exec.side.to_string())
                .bind(exec.strike)
                .bind(exec.expiry)
                .bind(exec.quantity)
                .bind(exec.price)
                .bind(exec.commission)
                .bind(exec.multiplier)
                .bind(exec.assignment)
                .execute(self.db.pool())
                .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    /// Loads the full execution log for an account, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query or row decoding fails.
    pub async fn load(&self, account: &str) -> Result<Vec<Execution>, sqlx::Error> {
        let rows = sqlx::query(SELECT_FOR_ACCOUNT)
            .bind(account)
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(row_to_execution).collect()
    }

    /// Lists account ids present in the store.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn accounts(&self) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query(SELECT_ACCOUNTS)
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(|row| row.try_get("account")).collect()
    }
}

fn row_to_execution(row: &PgRow) -> Result<Execution, sqlx::Error> {
    let instrument: String = row.try_get("instrument")?;
    let side: String = row.try_get("side")?;

    Ok(Execution {
        exec_id: row.try_get("exec_id")?,
        timestamp: row.try_get::<DateTime<Utc>, _>("executed_at")?,
        symbol: row.try_get("symbol")?,
        instrument: instrument
            .parse::<InstrumentKind>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?,
        side: side
            .parse::<Side>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?,
        strike: row.try_get::<Option<Decimal>, _>("strike")?,
        expiry: row.try_get::<Option<NaiveDate>, _>("expiry")?,
        quantity: row.try_get("quantity")?,
        price: row.try_get("price")?,
        commission: row.try_get("commission")?,
        multiplier: row.try_get("multiplier")?,
        assignment: row.try_get("assignment")?,
    })
}
