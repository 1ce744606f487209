//! Accounts receivable: one ledger entry per movement plus a running
//! balance per customer. Postings take the caller's transaction executor
//! so they commit together with the invoice change.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use fabrica_core::{now_rfc3339, ServiceError};
use fabrica_sql::{Executor, Row, SQLStore, Value};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS receivable_entries (
    seq            INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id     TEXT NOT NULL,
    customer_id    TEXT NOT NULL,
    document_id    TEXT NOT NULL,
    entry_type     TEXT NOT NULL,
    amount_cents   INTEGER NOT NULL,
    balance_after  INTEGER NOT NULL,
    memo           TEXT NOT NULL,
    actor          TEXT NOT NULL,
    at             TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_receivables_customer
    ON receivable_entries(company_id, customer_id, seq);

CREATE TABLE IF NOT EXISTS customer_balances (
    company_id     TEXT NOT NULL,
    customer_id    TEXT NOT NULL,
    balance_cents  INTEGER NOT NULL,
    updated_at     TEXT NOT NULL,
    PRIMARY KEY (company_id, customer_id)
);
";

/// DEBIT raises what the customer owes, CREDIT lowers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    Debit,
    Credit,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Debit => "DEBIT",
            EntryType::Credit => "CREDIT",
        }
    }

    fn parse(s: &str) -> Result<Self, ServiceError> {
        match s {
            "DEBIT" => Ok(EntryType::Debit),
            "CREDIT" => Ok(EntryType::Credit),
            other => Err(ServiceError::Storage(format!("unknown entry type {other}"))),
        }
    }

    fn signed(&self, amount: i64) -> i64 {
        match self {
            EntryType::Debit => amount,
            EntryType::Credit => -amount,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub seq: i64,
    pub customer_id: String,
    pub document_id: String,
    pub entry_type: EntryType,
    pub amount_cents: i64,
    pub balance_after: i64,
    pub memo: String,
    pub actor: String,
    pub at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerBalance {
    pub customer_id: String,
    pub balance_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// A movement to post.
#[derive(Debug)]
pub struct Posting<'a> {
    pub company_id: &'a str,
    pub customer_id: &'a str,
    pub document_id: &'a str,
    pub entry_type: EntryType,
    pub amount_cents: i64,
    pub memo: &'a str,
    pub actor: &'a str,
}

pub struct Receivables {
    db: Arc<dyn SQLStore>,
}

impl Receivables {
    pub fn new(db: Arc<dyn SQLStore>) -> Result<Self, ServiceError> {
        db.exec_batch(SCHEMA)
            .map_err(|e| ServiceError::Storage(format!("receivables schema init: {e}")))?;
        Ok(Self { db })
    }

    /// Append an entry and move the customer balance. Returns the new balance.
    pub fn post(&self, tx: &dyn Executor, posting: &Posting<'_>) -> Result<i64, ServiceError> {
        if posting.amount_cents <= 0 {
            return Err(ServiceError::Validation(format!(
                "{} amount must be positive",
                posting.entry_type.as_str()
            )));
        }

        let rows = tx.query(
            "SELECT balance_cents FROM customer_balances WHERE company_id = ?1 AND customer_id = ?2",
            &[posting.company_id.into(), posting.customer_id.into()],
        )?;
        let current = rows.first().and_then(|r| r.get_i64("balance_cents")).unwrap_or(0);
        let next = current
            .checked_add(posting.entry_type.signed(posting.amount_cents))
            .ok_or_else(|| {
                ServiceError::Validation(format!(
                    "balance of customer {} would overflow",
                    posting.customer_id
                ))
            })?;

        let now = now_rfc3339();
        tx.exec(
            "INSERT INTO customer_balances (company_id, customer_id, balance_cents, updated_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(company_id, customer_id) \
             DO UPDATE SET balance_cents = excluded.balance_cents, updated_at = excluded.updated_at",
            &[
                posting.company_id.into(),
                posting.customer_id.into(),
                Value::Integer(next),
                now.as_str().into(),
            ],
        )?;
        tx.exec(
            "INSERT INTO receivable_entries (company_id, customer_id, document_id, entry_type, \
             amount_cents, balance_after, memo, actor, at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            &[
                posting.company_id.into(),
                posting.customer_id.into(),
                posting.document_id.into(),
                posting.entry_type.as_str().into(),
                Value::Integer(posting.amount_cents),
                Value::Integer(next),
                posting.memo.into(),
                posting.actor.into(),
                now.as_str().into(),
            ],
        )?;

        debug!(
            "receivable {}/{} {} {}: {current} -> {next}",
            posting.company_id,
            posting.customer_id,
            posting.entry_type.as_str(),
            posting.amount_cents
        );
        Ok(next)
    }

    pub fn balance(&self, company_id: &str, customer_id: &str) -> Result<CustomerBalance, ServiceError> {
        let rows = self.db.query(
            "SELECT balance_cents, updated_at FROM customer_balances \
             WHERE company_id = ?1 AND customer_id = ?2",
            &[company_id.into(), customer_id.into()],
        )?;
        Ok(match rows.first() {
            Some(row) => CustomerBalance {
                customer_id: customer_id.to_string(),
                balance_cents: row.get_i64("balance_cents").unwrap_or_default(),
                updated_at: row.get_str("updated_at").map(str::to_string),
            },
            None => CustomerBalance {
                customer_id: customer_id.to_string(),
                balance_cents: 0,
                updated_at: None,
            },
        })
    }

    /// Entries of one customer, oldest first.
    pub fn entries(
        &self,
        company_id: &str,
        customer_id: &str,
        limit: usize,
    ) -> Result<Vec<LedgerEntry>, ServiceError> {
        let rows = self.db.query(
            "SELECT seq, customer_id, document_id, entry_type, amount_cents, balance_after, \
             memo, actor, at FROM receivable_entries \
             WHERE company_id = ?1 AND customer_id = ?2 ORDER BY seq ASC LIMIT ?3",
            &[company_id.into(), customer_id.into(), Value::Integer(limit as i64)],
        )?;
        rows.iter().map(row_to_entry).collect()
    }
}

fn text(row: &Row, name: &str) -> Result<String, ServiceError> {
    row.get_str(name)
        .map(str::to_string)
        .ok_or_else(|| ServiceError::Storage(format!("missing {name} column")))
}

fn row_to_entry(row: &Row) -> Result<LedgerEntry, ServiceError> {
    Ok(LedgerEntry {
        seq: row.get_i64("seq").unwrap_or_default(),
        customer_id: text(row, "customer_id")?,
        document_id: text(row, "document_id")?,
        entry_type: EntryType::parse(&text(row, "entry_type")?)?,
        amount_cents: row.get_i64("amount_cents").unwrap_or_default(),
        balance_after: row.get_i64("balance_after").unwrap_or_default(),
        memo: text(row, "memo")?,
        actor: text(row, "actor")?,
        at: text(row, "at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabrica_sql::{transaction, SqliteStore};

    fn posting(entry_type: EntryType, amount_cents: i64) -> Posting<'static> {
        Posting {
            company_id: "c1",
            customer_id: "cust-1",
            document_id: "doc-1",
            entry_type,
            amount_cents,
            memo: "test",
            actor: "u1",
        }
    }

    #[test]
    fn debits_and_credits_move_the_balance() {
        let db: Arc<dyn SQLStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let ar = Receivables::new(Arc::clone(&db)).unwrap();

        transaction(db.as_ref(), |tx| {
            assert_eq!(ar.post(tx, &posting(EntryType::Debit, 1_000))?, 1_000);
            assert_eq!(ar.post(tx, &posting(EntryType::Credit, 400))?, 600);
            Ok::<_, ServiceError>(())
        })
        .unwrap();

        assert_eq!(ar.balance("c1", "cust-1").unwrap().balance_cents, 600);
        assert_eq!(ar.balance("c2", "cust-1").unwrap().balance_cents, 0);
        let entries = ar.entries("c1", "cust-1", 10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].entry_type, EntryType::Credit);
        assert_eq!(entries[1].balance_after, 600);
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let db: Arc<dyn SQLStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let ar = Receivables::new(Arc::clone(&db)).unwrap();
        let err = transaction(db.as_ref(), |tx| ar.post(tx, &posting(EntryType::Debit, 0))).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn balance_overflow_rolls_back() {
        let db: Arc<dyn SQLStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let ar = Receivables::new(Arc::clone(&db)).unwrap();
        transaction(db.as_ref(), |tx| ar.post(tx, &posting(EntryType::Debit, i64::MAX))).unwrap();

        let err = transaction(db.as_ref(), |tx| ar.post(tx, &posting(EntryType::Debit, 1))).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(ar.balance("c1", "cust-1").unwrap().balance_cents, i64::MAX);
        assert_eq!(ar.entries("c1", "cust-1", 10).unwrap().len(), 1);
    }
}
