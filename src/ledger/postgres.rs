//! PostgreSQL Ledger Store
//!
//! All multi-row mutations run inside one `sqlx::Transaction`; dropping it
//! without commit rolls back, so an early `?` never leaves partial writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row};
use tracing::{debug, info, warn};

use crate::core_types::{ClientId, TransactionId};
use crate::transfer::error::TransferError;
use crate::transfer::state::TransactionStatus;
use crate::transfer::types::TransferRequest;

use super::models::{Client, NewClient, Transaction, TransactionHistory};
use super::store::{ApplyOutcome, LedgerStore};

const TRANSACTION_COLUMNS: &str =
    "id, from_client_id, to_client_id, amount, status, created_at, processed_at";

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_transactions(
        &self,
        where_clause: &str,
        binds: TransactionFilter,
    ) -> Result<Vec<Transaction>, TransferError> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE {} ORDER BY id ASC",
            TRANSACTION_COLUMNS, where_clause
        );
        let query = sqlx::query(&sql);
        let query = match binds {
            TransactionFilter::Client(client_id) => query.bind(client_id),
            TransactionFilter::Status(status) => query.bind(status.as_str()),
            TransactionFilter::ClientAndStatus(client_id, status) => {
                query.bind(client_id).bind(status.as_str())
            }
            TransactionFilter::StaleStatus(status, cutoff) => {
                query.bind(status.as_str()).bind(cutoff)
            }
        };

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_transaction).collect()
    }

    /// Lock one client row and return its balance, `None` if absent
    async fn lock_client(
        conn: &mut sqlx::PgConnection,
        client_id: ClientId,
    ) -> Result<Option<Decimal>, TransferError> {
        let balance = sqlx::query_scalar::<_, Decimal>(
            "SELECT balance FROM clients WHERE id = $1 FOR UPDATE",
        )
        .bind(client_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(balance)
    }

    async fn insert_history(
        conn: &mut sqlx::PgConnection,
        transaction_id: TransactionId,
        client_id: ClientId,
        delta: Decimal,
        balance_before: Decimal,
        status: TransactionStatus,
    ) -> Result<(), TransferError> {
        sqlx::query(
            r#"
            INSERT INTO transaction_history
                (transaction_id, client_id, delta, balance_before, balance_after, status, event_time)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            "#,
        )
        .bind(transaction_id)
        .bind(client_id)
        .bind(delta)
        .bind(balance_before)
        .bind(balance_before + delta)
        .bind(status.as_str())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn finalize(
        conn: &mut sqlx::PgConnection,
        transaction_id: TransactionId,
        status: TransactionStatus,
    ) -> Result<(), TransferError> {
        sqlx::query("UPDATE transactions SET status = $1, processed_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(transaction_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

enum TransactionFilter {
    Client(ClientId),
    Status(TransactionStatus),
    ClientAndStatus(ClientId, TransactionStatus),
    StaleStatus(TransactionStatus, DateTime<Utc>),
}

fn parse_status(raw: &str) -> Result<TransactionStatus, TransferError> {
    raw.parse()
        .map_err(|e: crate::transfer::state::UnknownStatus| TransferError::Data(e.to_string()))
}

fn row_to_transaction(row: &PgRow) -> Result<Transaction, TransferError> {
    let status: String = row.try_get("status")?;
    Ok(Transaction {
        id: row.try_get("id")?,
        from_client_id: row.try_get("from_client_id")?,
        to_client_id: row.try_get("to_client_id")?,
        amount: row.try_get("amount")?,
        status: parse_status(&status)?,
        created_at: row.try_get("created_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

fn row_to_client(row: &PgRow) -> Result<Client, TransferError> {
    Ok(Client {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        balance: row.try_get("balance")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_history(row: &PgRow) -> Result<TransactionHistory, TransferError> {
    let status: String = row.try_get("status")?;
    Ok(TransactionHistory {
        id: row.try_get("id")?,
        transaction_id: row.try_get("transaction_id")?,
        client_id: row.try_get("client_id")?,
        delta: row.try_get("delta")?,
        balance_before: row.try_get("balance_before")?,
        balance_after: row.try_get("balance_after")?,
        status: parse_status(&status)?,
        event_time: row.try_get("event_time")?,
    })
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn add_client(&self, client: &NewClient) -> Result<ClientId, TransferError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO clients (name, balance, created_at) VALUES ($1, $2, NOW()) RETURNING id",
        )
        .bind(&client.name)
        .bind(client.balance)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get_client(&self, client_id: ClientId) -> Result<Client, TransferError> {
        let row = sqlx::query("SELECT id, name, balance, created_at FROM clients WHERE id = $1")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_client(&row),
            None => Err(TransferError::ClientNotFound(client_id)),
        }
    }

    async fn get_client_balance(&self, client_id: ClientId) -> Result<Decimal, TransferError> {
        sqlx::query_scalar::<_, Decimal>("SELECT balance FROM clients WHERE id = $1")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(TransferError::ClientNotFound(client_id))
    }

    async fn add_transaction(
        &self,
        request: &TransferRequest,
    ) -> Result<TransactionId, TransferError> {
        // Clients are never deleted, so an existence check ahead of the insert
        // cannot race into a dangling reference.
        let ids = [request.from_client_id, request.to_client_id];
        let existing: Vec<i64> = sqlx::query_scalar("SELECT id FROM clients WHERE id = ANY($1)")
            .bind(&ids[..])
            .fetch_all(&self.pool)
            .await?;
        if let Some(missing) = ids.iter().find(|id| !existing.contains(id)) {
            return Err(TransferError::ClientNotFound(*missing));
        }

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO transactions (from_client_id, to_client_id, amount, status, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id
            "#,
        )
        .bind(request.from_client_id)
        .bind(request.to_client_id)
        .bind(request.amount)
        .bind(TransactionStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Transaction, TransferError> {
        let sql = format!("SELECT {} FROM transactions WHERE id = $1", TRANSACTION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_transaction(&row),
            None => Err(TransferError::TransactionNotFound(transaction_id)),
        }
    }

    async fn get_transactions_by_client_id(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<Transaction>, TransferError> {
        self.fetch_transactions(
            "from_client_id = $1 OR to_client_id = $1",
            TransactionFilter::Client(client_id),
        )
        .await
    }

    async fn get_transactions_by_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, TransferError> {
        self.fetch_transactions("status = $1", TransactionFilter::Status(status))
            .await
    }

    async fn get_transactions_by_status_and_client_id(
        &self,
        client_id: ClientId,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, TransferError> {
        self.fetch_transactions(
            "(from_client_id = $1 OR to_client_id = $1) AND status = $2",
            TransactionFilter::ClientAndStatus(client_id, status),
        )
        .await
    }

    async fn get_stale_transactions(
        &self,
        status: TransactionStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, TransferError> {
        self.fetch_transactions(
            "status = $1 AND processed_at IS NOT NULL AND processed_at < $2",
            TransactionFilter::StaleStatus(status, cutoff),
        )
        .await
    }

    async fn update_transaction_status(
        &self,
        transaction_id: TransactionId,
        status: TransactionStatus,
    ) -> Result<(), TransferError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM transactions WHERE id = $1 FOR UPDATE")
                .bind(transaction_id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = match current {
            Some(raw) => parse_status(&raw)?,
            None => return Err(TransferError::TransactionNotFound(transaction_id)),
        };

        if !current.can_transition_to(status) {
            return Err(TransferError::InvalidStateTransition {
                from: current,
                to: status,
            });
        }

        let sql = if status.stamps_processed_at() {
            "UPDATE transactions SET status = $1, processed_at = NOW() WHERE id = $2"
        } else {
            "UPDATE transactions SET status = $1 WHERE id = $2"
        };
        sqlx::query(sql)
            .bind(status.as_str())
            .bind(transaction_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(transaction_id, from = %current, to = %status, "Transaction status updated");
        Ok(())
    }

    async fn update_status_if(
        &self,
        transaction_id: TransactionId,
        expected: TransactionStatus,
        new_status: TransactionStatus,
    ) -> Result<bool, TransferError> {
        if !expected.can_transition_to(new_status) {
            return Err(TransferError::InvalidStateTransition {
                from: expected,
                to: new_status,
            });
        }

        let sql = if new_status.stamps_processed_at() {
            "UPDATE transactions SET status = $1, processed_at = NOW() WHERE id = $2 AND status = $3"
        } else {
            "UPDATE transactions SET status = $1 WHERE id = $2 AND status = $3"
        };
        let result = sqlx::query(sql)
            .bind(new_status.as_str())
            .bind(transaction_id)
            .bind(expected.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn process_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<ApplyOutcome, TransferError> {
        let mut tx: sqlx::Transaction<'_, Postgres> = self.pool.begin().await?;

        // 1. Applied marker: lock the transaction row and re-read its status
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM transactions WHERE id = $1 FOR UPDATE")
                .bind(transaction.id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = match current {
            Some(raw) => parse_status(&raw)?,
            None => return Err(TransferError::TransactionNotFound(transaction.id)),
        };
        if current.is_terminal() {
            debug!(transaction_id = transaction.id, status = %current, "Already applied");
            return Ok(ApplyOutcome::AlreadyApplied(current));
        }

        // 2. Lock both clients in ascending id order, whatever their role
        let (first, second) = transaction.lock_order();
        let first_balance = Self::lock_client(&mut *tx, first)
            .await?
            .ok_or(TransferError::ClientNotFound(first))?;
        let second_balance = Self::lock_client(&mut *tx, second)
            .await?
            .ok_or(TransferError::ClientNotFound(second))?;

        let (sender_balance, receiver_balance) = if first == transaction.from_client_id {
            (first_balance, second_balance)
        } else {
            (second_balance, first_balance)
        };

        // 3. Funds check under lock
        if sender_balance < transaction.amount {
            Self::finalize(&mut *tx, transaction.id, TransactionStatus::Failed).await?;
            Self::insert_history(
                &mut *tx,
                transaction.id,
                transaction.from_client_id,
                Decimal::ZERO,
                sender_balance,
                TransactionStatus::Failed,
            )
            .await?;
            tx.commit().await?;

            warn!(
                transaction_id = transaction.id,
                client_id = transaction.from_client_id,
                balance = %sender_balance,
                amount = %transaction.amount,
                "Insufficient funds, transaction failed"
            );
            return Ok(ApplyOutcome::InsufficientFunds);
        }

        // 4. Move funds and complete
        sqlx::query("UPDATE clients SET balance = balance - $1 WHERE id = $2")
            .bind(transaction.amount)
            .bind(transaction.from_client_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE clients SET balance = balance + $1 WHERE id = $2")
            .bind(transaction.amount)
            .bind(transaction.to_client_id)
            .execute(&mut *tx)
            .await?;
        Self::finalize(&mut *tx, transaction.id, TransactionStatus::Completed).await?;
        Self::insert_history(
            &mut *tx,
            transaction.id,
            transaction.from_client_id,
            -transaction.amount,
            sender_balance,
            TransactionStatus::Completed,
        )
        .await?;
        Self::insert_history(
            &mut *tx,
            transaction.id,
            transaction.to_client_id,
            transaction.amount,
            receiver_balance,
            TransactionStatus::Completed,
        )
        .await?;

        tx.commit().await?;
        info!(
            transaction_id = transaction.id,
            from = transaction.from_client_id,
            to = transaction.to_client_id,
            amount = %transaction.amount,
            "Transaction committed"
        );
        Ok(ApplyOutcome::Completed)
    }

    async fn get_history_by_client_id(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<TransactionHistory>, TransferError> {
        let rows = sqlx::query(
            r#"
            SELECT id, transaction_id, client_id, delta, balance_before, balance_after, status, event_time
            FROM transaction_history
            WHERE client_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_history).collect()
    }

    async fn health_check(&self) -> Result<(), TransferError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
