//! # PostgreSQL Store
//!
//! sqlx-backed implementation of the payload ledger, reply store, and dedup
//! ledger. Schema lives in `migrations/0001_init.sql`:
//!
//! - `payload_table(payload PK, last_save_payload)`
//! - `response_record(id PK, currency UNIQUE, base_currency, date,
//!   request_id)` with child `exchange_rates(response_id FK, currency, rate)`
//! - `request_ids(request_id PK, expiration_date, created_at)`
//!
//! `store_fetch_result` runs the reply upsert, the rate rewrite, and the
//! payload-ledger touch in one transaction.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::models::RateReply;
use crate::storage::errors::{StorageError, StorageResult};

#[derive(Debug, FromRow)]
struct ReplyRow {
    id: i64,
    currency: String,
    base_currency: String,
    date: String,
    request_id: String,
}

/// PostgreSQL storage backend.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect a pool using the database section of the relay config.
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| StorageError::connection(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn payload_last_saved(
        &self,
        payload: &str,
    ) -> StorageResult<Option<DateTime<Utc>>> {
        sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT last_save_payload FROM payload_table WHERE payload = $1",
        )
        .bind(payload)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::from_sqlx("payload_last_saved", e))
    }

    pub async fn touch_payload(&self, payload: &str, now: DateTime<Utc>) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO payload_table (payload, last_save_payload) VALUES ($1, $2) \
             ON CONFLICT (payload) DO UPDATE SET last_save_payload = EXCLUDED.last_save_payload",
        )
        .bind(payload)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::from_sqlx("touch_payload", e))?;
        Ok(())
    }

    pub async fn find_reply(&self, cache_key: &str) -> StorageResult<Option<RateReply>> {
        let row = sqlx::query_as::<_, ReplyRow>(
            "SELECT id, currency, base_currency, date, request_id \
             FROM response_record WHERE currency = $1",
        )
        .bind(cache_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::from_sqlx("find_reply", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let rate_rows = sqlx::query(
            "SELECT currency, rate FROM exchange_rates WHERE response_id = $1",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::from_sqlx("find_reply_rates", e))?;

        let mut rates = HashMap::with_capacity(rate_rows.len());
        for rate_row in rate_rows {
            let code: String = rate_row
                .try_get("currency")
                .map_err(|e| StorageError::from_sqlx("find_reply_rates", e))?;
            let rate: f64 = rate_row
                .try_get("rate")
                .map_err(|e| StorageError::from_sqlx("find_reply_rates", e))?;
            rates.insert(code, rate);
        }

        Ok(Some(RateReply {
            rates,
            base_currency: row.base_currency,
            date: row.date,
            currency: row.currency,
            request_id: row.request_id,
        }))
    }

    pub async fn store_fetch_result(
        &self,
        payload: &str,
        reply: &RateReply,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::from_sqlx("store_fetch_result_begin", e))?;

        let response_id: i64 = sqlx::query_scalar(
            "INSERT INTO response_record (currency, base_currency, date, request_id) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (currency) DO UPDATE SET \
                 base_currency = EXCLUDED.base_currency, \
                 date = EXCLUDED.date, \
                 request_id = EXCLUDED.request_id \
             RETURNING id",
        )
        .bind(&reply.currency)
        .bind(&reply.base_currency)
        .bind(&reply.date)
        .bind(&reply.request_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StorageError::from_sqlx("upsert_reply", e))?;

        sqlx::query("DELETE FROM exchange_rates WHERE response_id = $1")
            .bind(response_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::from_sqlx("clear_rates", e))?;

        for (code, rate) in &reply.rates {
            sqlx::query(
                "INSERT INTO exchange_rates (response_id, currency, rate) VALUES ($1, $2, $3)",
            )
            .bind(response_id)
            .bind(code)
            .bind(rate)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::from_sqlx("insert_rate", e))?;
        }

        sqlx::query(
            "INSERT INTO payload_table (payload, last_save_payload) VALUES ($1, $2) \
             ON CONFLICT (payload) DO UPDATE SET last_save_payload = EXCLUDED.last_save_payload",
        )
        .bind(payload)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::from_sqlx("touch_payload", e))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::from_sqlx("store_fetch_result_commit", e))
    }

    pub async fn dedup_exists(&self, rid: Uuid) -> StorageResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM request_ids WHERE request_id = $1)",
        )
        .bind(rid)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::from_sqlx("dedup_exists", e))
    }

    pub async fn dedup_insert(
        &self,
        rid: Uuid,
        expiration_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO request_ids (request_id, expiration_date, created_at) \
             VALUES ($1, $2, $3) ON CONFLICT (request_id) DO NOTHING",
        )
        .bind(rid)
        .bind(expiration_date)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::from_sqlx("dedup_insert", e))?;
        Ok(())
    }

    pub async fn dedup_purge_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM request_ids WHERE expiration_date < $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::from_sqlx("dedup_purge_expired", e))?;
        Ok(result.rows_affected())
    }

    pub async fn dedup_purge_older_than(
        &self,
        days: i64,
        now: DateTime<Utc>,
    ) -> StorageResult<u64> {
        let threshold = now - Duration::days(days);
        let result = sqlx::query("DELETE FROM request_ids WHERE created_at < $1")
            .bind(threshold)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::from_sqlx("dedup_purge_older_than", e))?;
        Ok(result.rows_affected())
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}
