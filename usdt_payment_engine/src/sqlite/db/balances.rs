use chrono::Utc;
use log::{debug, trace};
use sqlx::SqliteConnection;
use upg_common::MicroUsdt;

use crate::{
    db_types::{AccountBalance, LedgerEntry, LedgerReason, OrderId},
    traits::{CreditResult, PaymentGatewayError},
};

/// Credits the account, appending the audit ledger entry first.
///
/// The UNIQUE (order_id, reason) constraint on the ledger is what makes this idempotent: a replayed credit for the
/// same order inserts nothing and the balance is left untouched. Embed in a transaction (`&mut *tx`) so that the
/// ledger entry and the balance mutation commit together.
pub async fn credit(
    account_id: &str,
    amount: MicroUsdt,
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<CreditResult, PaymentGatewayError> {
    if amount.value() < 0 {
        return Err(PaymentGatewayError::ValidationError(format!("Cannot credit a negative amount ({amount})")));
    }
    let inserted = sqlx::query(
        "INSERT INTO ledger_entries (account_id, delta, reason, order_id) VALUES ($1, $2, $3, $4) ON CONFLICT \
         (order_id, reason) DO NOTHING",
    )
    .bind(account_id)
    .bind(amount)
    .bind(LedgerReason::Deposit)
    .bind(order_id.as_str())
    .execute(&mut *conn)
    .await?
    .rows_affected();
    if inserted == 0 {
        debug!("💳️ Account {account_id} was already credited for order {order_id}. No-op.");
        let balance = fetch_balance(account_id, conn)
            .await?
            .ok_or_else(|| PaymentGatewayError::AccountNotFound(account_id.to_string()))?;
        return Ok(CreditResult { balance, applied: false });
    }
    let balance: AccountBalance = sqlx::query_as(
        r#"
        INSERT INTO account_balances (account_id, balance, updated_at) VALUES ($1, $2, $3)
        ON CONFLICT (account_id) DO UPDATE
            SET balance = account_balances.balance + excluded.balance, updated_at = excluded.updated_at
        RETURNING *
        "#,
    )
    .bind(account_id)
    .bind(amount)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    debug!("💳️ Credited {amount} to account {account_id} for order {order_id}. New balance: {}", balance.balance);
    Ok(CreditResult { balance, applied: true })
}

/// Debits the account if the balance covers the amount.
///
/// The balance check and the decrement are one conditional UPDATE, so two concurrent debits can never jointly
/// overdraw: the second one matches no row and fails with `InsufficientBalance`. The audit entry is appended in the
/// same transaction as the mutation.
pub async fn debit(
    account_id: &str,
    amount: MicroUsdt,
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<AccountBalance, PaymentGatewayError> {
    if amount.value() <= 0 {
        return Err(PaymentGatewayError::ValidationError(format!("Debit amount must be positive, got {amount}")));
    }
    let balance: Option<AccountBalance> = sqlx::query_as(
        "UPDATE account_balances SET balance = balance - $1, updated_at = $2 WHERE account_id = $3 AND balance >= $1 \
         RETURNING *",
    )
    .bind(amount)
    .bind(Utc::now())
    .bind(account_id)
    .fetch_optional(&mut *conn)
    .await?;
    let balance = match balance {
        Some(b) => b,
        None => {
            return match fetch_balance(account_id, conn).await? {
                Some(_) => Err(PaymentGatewayError::InsufficientBalance(account_id.to_string())),
                None => Err(PaymentGatewayError::AccountNotFound(account_id.to_string())),
            };
        },
    };
    sqlx::query("INSERT INTO ledger_entries (account_id, delta, reason, order_id) VALUES ($1, $2, $3, $4)")
        .bind(account_id)
        .bind(-amount)
        .bind(LedgerReason::Debit)
        .bind(order_id.as_str())
        .execute(conn)
        .await?;
    debug!("💳️ Debited {amount} from account {account_id} for order {order_id}. New balance: {}", balance.balance);
    Ok(balance)
}

pub async fn fetch_balance(
    account_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<AccountBalance>, PaymentGatewayError> {
    let balance = sqlx::query_as("SELECT * FROM account_balances WHERE account_id = $1")
        .bind(account_id)
        .fetch_optional(conn)
        .await?;
    Ok(balance)
}

pub async fn fetch_ledger_entries(
    account_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, PaymentGatewayError> {
    let entries = sqlx::query_as("SELECT * FROM ledger_entries WHERE account_id = $1 ORDER BY id ASC")
        .bind(account_id)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}

/// Independently reconstructs the balance by summing the audit trail.
pub async fn reconstruct_balance(
    account_id: &str,
    conn: &mut SqliteConnection,
) -> Result<MicroUsdt, PaymentGatewayError> {
    let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(delta), 0) FROM ledger_entries WHERE account_id = $1")
        .bind(account_id)
        .fetch_one(conn)
        .await?;
    trace!("💳️ Reconstructed balance for account {account_id}: {total} microUSDT");
    Ok(MicroUsdt::from(total))
}
