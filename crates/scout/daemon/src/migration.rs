//! One-time data migration run before a unit's first repair

use crate::error::MigrationError;
use alloy::primitives::hex;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use scout_types::{UnitName, UnitRecord};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// A data fix applied once per unit; success is recorded as `upgraded`
#[async_trait]
pub trait Migration: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run against the unit's database. Returns the number of rows touched.
    async fn run(&self, name: &UnitName, record: &UnitRecord) -> Result<u64, MigrationError>;
}

/// Migration that succeeds without doing anything
#[derive(Debug, Default)]
pub struct NoopMigration;

#[async_trait]
impl Migration for NoopMigration {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn run(&self, _name: &UnitName, _record: &UnitRecord) -> Result<u64, MigrationError> {
        Ok(0)
    }
}

/// Backfills `transactions.revert_reason` from the chain's receipts
#[derive(Debug, Clone)]
pub struct RevertReasonMigration {
    db_host: String,
    connect_timeout: Duration,
}

impl RevertReasonMigration {
    pub fn new(db_host: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            db_host: db_host.into(),
            connect_timeout,
        }
    }

    fn database_url(&self, db_port: u16) -> String {
        format!("postgres://postgres@{}:{}/explorer", self.db_host, db_port)
    }
}

#[async_trait]
impl Migration for RevertReasonMigration {
    fn name(&self) -> &'static str {
        "revert_reason_backfill"
    }

    async fn run(&self, name: &UnitName, record: &UnitRecord) -> Result<u64, MigrationError> {
        let url: Url = record
            .rpc_endpoint
            .parse()
            .map_err(|_| MigrationError::InvalidEndpoint(record.rpc_endpoint.clone()))?;
        let provider = ProviderBuilder::new().connect_http(url);

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(self.connect_timeout)
            .connect(&self.database_url(record.db_port))
            .await?;

        let hashes: Vec<Vec<u8>> = sqlx::query_scalar(
            "SELECT hash FROM transactions WHERE status = 0 AND revert_reason IS NULL",
        )
        .fetch_all(&pool)
        .await?;

        tracing::info!(unit = %name, transactions = hashes.len(), "Backfilling revert reasons");

        let mut updated = 0;
        for hash in hashes {
            let tx_hash = format!("0x{}", hex::encode(&hash));
            let receipt: Option<Value> = provider
                .raw_request("eth_getTransactionReceipt".into(), (tx_hash.clone(),))
                .await
                .map_err(|e| MigrationError::Rpc(e.to_string()))?;

            let Some(reason) = receipt
                .as_ref()
                .and_then(|r| r.get("revertReason"))
                .and_then(Value::as_str)
            else {
                tracing::debug!(unit = %name, tx = %tx_hash, "No revert reason in receipt");
                continue;
            };

            let result = sqlx::query("UPDATE transactions SET revert_reason = $1 WHERE hash = $2")
                .bind(reason)
                .bind(&hash)
                .execute(&pool)
                .await?;
            updated += result.rows_affected();
        }

        pool.close().await;
        Ok(updated)
    }
}
