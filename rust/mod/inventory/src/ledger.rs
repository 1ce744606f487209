use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use fabrica_core::{now_rfc3339, ServiceError};
use fabrica_sql::{Executor, Row, SQLStore, Value};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS stock_levels (
    company_id    TEXT NOT NULL,
    warehouse_id  TEXT NOT NULL,
    item_id       TEXT NOT NULL,
    qty           INTEGER NOT NULL,
    updated_at    TEXT NOT NULL,
    PRIMARY KEY (company_id, warehouse_id, item_id)
);

CREATE TABLE IF NOT EXISTS stock_moves (
    seq           INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id    TEXT NOT NULL,
    warehouse_id  TEXT NOT NULL,
    item_id       TEXT NOT NULL,
    delta         INTEGER NOT NULL,
    qty_after     INTEGER NOT NULL,
    reason        TEXT NOT NULL,
    document_id   TEXT,
    actor         TEXT NOT NULL,
    at            TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_moves_item ON stock_moves(company_id, item_id, seq);
";

/// On-hand quantity of one item in one warehouse.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub warehouse_id: String,
    pub item_id: String,
    pub qty: i64,
    pub updated_at: String,
}

/// A recorded stock movement.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMoveRecord {
    pub seq: i64,
    pub warehouse_id: String,
    pub item_id: String,
    pub delta: i64,
    pub qty_after: i64,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    pub actor: String,
    pub at: String,
}

/// A movement to apply.
#[derive(Debug)]
pub struct StockMove<'a> {
    pub company_id: &'a str,
    pub warehouse_id: &'a str,
    pub item_id: &'a str,
    pub delta: i64,
    /// Short reason code, e.g. `adjustment`, `po_receipt`, `return`.
    pub reason: &'a str,
    pub document_id: Option<&'a str>,
    pub actor: &'a str,
}

/// Stock levels and their movement history.
///
/// Writers take the executor of the caller's transaction, so a stock
/// movement commits or rolls back with the document that caused it.
pub struct StockLedger {
    db: Arc<dyn SQLStore>,
}

impl StockLedger {
    pub fn new(db: Arc<dyn SQLStore>) -> Result<Self, ServiceError> {
        db.exec_batch(SCHEMA)
            .map_err(|e| ServiceError::Storage(format!("stock schema init: {e}")))?;
        Ok(Self { db })
    }

    /// Apply one movement. Fails without writing when the level would go
    /// negative. Returns the new on-hand quantity.
    pub fn apply_move(&self, tx: &dyn Executor, mv: &StockMove<'_>) -> Result<i64, ServiceError> {
        if mv.delta == 0 {
            return Err(ServiceError::Validation(format!(
                "stock move of {} has zero quantity",
                mv.item_id
            )));
        }

        let current = self.qty_in(tx, mv.company_id, mv.warehouse_id, mv.item_id)?;
        let next = current.checked_add(mv.delta).ok_or_else(|| {
            ServiceError::Validation(format!(
                "stock of {} in {} would overflow",
                mv.item_id, mv.warehouse_id
            ))
        })?;
        if next < 0 {
            return Err(ServiceError::Validation(format!(
                "insufficient stock of {} in {}: on hand {current}, requested {}",
                mv.item_id,
                mv.warehouse_id,
                -mv.delta
            )));
        }

        let now = now_rfc3339();
        tx.exec(
            "INSERT INTO stock_levels (company_id, warehouse_id, item_id, qty, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(company_id, warehouse_id, item_id) \
             DO UPDATE SET qty = excluded.qty, updated_at = excluded.updated_at",
            &[
                mv.company_id.into(),
                mv.warehouse_id.into(),
                mv.item_id.into(),
                Value::Integer(next),
                now.as_str().into(),
            ],
        )?;
        tx.exec(
            "INSERT INTO stock_moves (company_id, warehouse_id, item_id, delta, qty_after, \
             reason, document_id, actor, at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            &[
                mv.company_id.into(),
                mv.warehouse_id.into(),
                mv.item_id.into(),
                Value::Integer(mv.delta),
                Value::Integer(next),
                mv.reason.into(),
                mv.document_id.into(),
                mv.actor.into(),
                now.as_str().into(),
            ],
        )?;

        debug!(
            "stock {}/{}/{}: {current} -> {next} ({})",
            mv.company_id, mv.warehouse_id, mv.item_id, mv.reason
        );
        Ok(next)
    }

    /// On-hand quantity (0 when never stocked).
    pub fn qty_in(
        &self,
        tx: &dyn Executor,
        company_id: &str,
        warehouse_id: &str,
        item_id: &str,
    ) -> Result<i64, ServiceError> {
        let rows = tx.query(
            "SELECT qty FROM stock_levels WHERE company_id = ?1 AND warehouse_id = ?2 AND item_id = ?3",
            &[company_id.into(), warehouse_id.into(), item_id.into()],
        )?;
        Ok(rows.first().and_then(|r| r.get_i64("qty")).unwrap_or(0))
    }

    /// Stock levels of a company, optionally narrowed to a warehouse or item.
    pub fn levels(
        &self,
        company_id: &str,
        warehouse_id: Option<&str>,
        item_id: Option<&str>,
    ) -> Result<Vec<StockLevel>, ServiceError> {
        let mut sql = String::from(
            "SELECT warehouse_id, item_id, qty, updated_at FROM stock_levels WHERE company_id = ?1",
        );
        let mut params: Vec<Value> = vec![company_id.into()];
        if let Some(w) = warehouse_id {
            params.push(w.into());
            sql.push_str(&format!(" AND warehouse_id = ?{}", params.len()));
        }
        if let Some(i) = item_id {
            params.push(i.into());
            sql.push_str(&format!(" AND item_id = ?{}", params.len()));
        }
        sql.push_str(" ORDER BY warehouse_id, item_id");

        let rows = self.db.query(&sql, &params)?;
        rows.iter().map(row_to_level).collect()
    }

    /// Movement history of an item, newest first.
    pub fn moves(
        &self,
        company_id: &str,
        item_id: &str,
        limit: usize,
    ) -> Result<Vec<StockMoveRecord>, ServiceError> {
        let rows = self.db.query(
            "SELECT seq, warehouse_id, item_id, delta, qty_after, reason, document_id, actor, at \
             FROM stock_moves WHERE company_id = ?1 AND item_id = ?2 ORDER BY seq DESC LIMIT ?3",
            &[company_id.into(), item_id.into(), Value::Integer(limit as i64)],
        )?;
        rows.iter().map(row_to_move).collect()
    }
}

fn text(row: &Row, name: &str) -> Result<String, ServiceError> {
    row.get_str(name)
        .map(str::to_string)
        .ok_or_else(|| ServiceError::Storage(format!("missing {name} column")))
}

fn row_to_level(row: &Row) -> Result<StockLevel, ServiceError> {
    Ok(StockLevel {
        warehouse_id: text(row, "warehouse_id")?,
        item_id: text(row, "item_id")?,
        qty: row.get_i64("qty").unwrap_or_default(),
        updated_at: text(row, "updated_at")?,
    })
}

fn row_to_move(row: &Row) -> Result<StockMoveRecord, ServiceError> {
    Ok(StockMoveRecord {
        seq: row.get_i64("seq").unwrap_or_default(),
        warehouse_id: text(row, "warehouse_id")?,
        item_id: text(row, "item_id")?,
        delta: row.get_i64("delta").unwrap_or_default(),
        qty_after: row.get_i64("qty_after").unwrap_or_default(),
        reason: text(row, "reason")?,
        document_id: row.get_str("document_id").map(str::to_string),
        actor: text(row, "actor")?,
        at: text(row, "at")?,
    })
}
