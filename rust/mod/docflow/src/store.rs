use std::sync::Arc;

use fabrica_core::{ListParams, ServiceError, ViewMode};
use fabrica_sql::{Executor, Row, SQLStore, Value};

use crate::model::AuditEntry;

/// SQL schema shared by every document kind.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    id          TEXT NOT NULL UNIQUE,
    company_id  TEXT NOT NULL,
    kind        TEXT NOT NULL,
    number      TEXT NOT NULL,
    view_mode   TEXT NOT NULL,
    status      TEXT NOT NULL,
    version     INTEGER NOT NULL,
    parent_id   TEXT,
    data        TEXT NOT NULL,
    created_by  TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_doc_scope ON documents(company_id, kind, status);
CREATE INDEX IF NOT EXISTS idx_doc_parent ON documents(parent_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_doc_number ON documents(company_id, kind, number);

CREATE TABLE IF NOT EXISTS doc_sequences (
    company_id  TEXT NOT NULL,
    kind        TEXT NOT NULL,
    view_mode   TEXT NOT NULL,
    last        INTEGER NOT NULL,
    PRIMARY KEY (company_id, kind, view_mode)
);

CREATE TABLE IF NOT EXISTS audit_log (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id   TEXT NOT NULL,
    document_id  TEXT NOT NULL,
    kind         TEXT NOT NULL,
    action       TEXT NOT NULL,
    from_status  TEXT,
    to_status    TEXT NOT NULL,
    actor        TEXT NOT NULL,
    note         TEXT,
    at           TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_document ON audit_log(document_id, seq);

CREATE TABLE IF NOT EXISTS idempotency_keys (
    company_id    TEXT NOT NULL,
    scope         TEXT NOT NULL,
    key           TEXT NOT NULL,
    request_hash  TEXT NOT NULL,
    response      TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    PRIMARY KEY (company_id, scope, key)
);
";

const DOC_COLUMNS: &str = "seq, id, company_id, kind, number, view_mode, status, version, \
                           parent_id, data, created_by, created_at, updated_at";

/// A document row with untyped status and data.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub seq: i64,
    pub id: String,
    pub company_id: String,
    pub kind: String,
    pub number: String,
    pub view_mode: ViewMode,
    pub status: String,
    pub version: i64,
    pub parent_id: Option<String>,
    pub data: serde_json::Value,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Audit row to append.
#[derive(Debug)]
pub struct NewAuditEntry<'a> {
    pub company_id: &'a str,
    pub document_id: &'a str,
    pub kind: &'a str,
    pub action: &'a str,
    pub from_status: Option<&'a str>,
    pub to_status: &'a str,
    pub actor: &'a str,
    pub note: Option<&'a str>,
    pub at: &'a str,
}

/// Stored idempotency record.
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    pub request_hash: String,
    pub response: String,
}

/// Filters for [`DocumentStore::list`].
#[derive(Debug)]
pub struct ListFilter<'a> {
    pub company_id: &'a str,
    pub kind: &'a str,
    pub view_mode: ViewMode,
    pub status: Option<&'a str>,
    pub parent_id: Option<&'a str>,
}

/// Persistent storage for documents, audit entries, numbering and
/// idempotency keys, backed by SQLStore (SQLite).
///
/// Every method takes the executor to run on, so callers decide the
/// transaction boundary.
pub struct DocumentStore {
    db: Arc<dyn SQLStore>,
}

impl DocumentStore {
    /// Create the store and initialise the schema.
    pub fn new(db: Arc<dyn SQLStore>) -> Result<Self, ServiceError> {
        db.exec_batch(SCHEMA)
            .map_err(|e| ServiceError::Storage(format!("document schema init: {e}")))?;
        Ok(Self { db })
    }

    pub fn db(&self) -> &Arc<dyn SQLStore> {
        &self.db
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    /// Allocate the next number for (company, kind, view mode).
    ///
    /// Extended-view documents get their own series, marked with an `X`
    /// after the prefix: `PO-000001` vs `POX-000001`.
    pub fn next_number(
        &self,
        ex: &dyn Executor,
        company_id: &str,
        kind: &str,
        prefix: &str,
        view_mode: ViewMode,
    ) -> Result<String, ServiceError> {
        ex.exec(
            "INSERT INTO doc_sequences (company_id, kind, view_mode, last) VALUES (?1, ?2, ?3, 1) \
             ON CONFLICT(company_id, kind, view_mode) DO UPDATE SET last = last + 1",
            &[company_id.into(), kind.into(), view_mode.as_str().into()],
        )?;
        let rows = ex.query(
            "SELECT last FROM doc_sequences WHERE company_id = ?1 AND kind = ?2 AND view_mode = ?3",
            &[company_id.into(), kind.into(), view_mode.as_str().into()],
        )?;
        let last = rows
            .first()
            .and_then(|r| r.get_i64("last"))
            .ok_or_else(|| ServiceError::Storage("document sequence missing".into()))?;

        let series = match view_mode {
            ViewMode::Standard => prefix.to_string(),
            ViewMode::Extended => format!("{prefix}X"),
        };
        Ok(format!("{series}-{last:06}"))
    }

    /// Insert a new document row.
    pub fn insert(&self, ex: &dyn Executor, doc: &StoredDocument) -> Result<(), ServiceError> {
        ex.exec(
            "INSERT INTO documents (id, company_id, kind, number, view_mode, status, version, \
             parent_id, data, created_by, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            &[
                doc.id.as_str().into(),
                doc.company_id.as_str().into(),
                doc.kind.as_str().into(),
                doc.number.as_str().into(),
                doc.view_mode.as_str().into(),
                doc.status.as_str().into(),
                Value::Integer(doc.version),
                doc.parent_id.clone().into(),
                Value::Text(doc.data.to_string()),
                doc.created_by.as_str().into(),
                doc.created_at.as_str().into(),
                doc.updated_at.as_str().into(),
            ],
        )?;
        Ok(())
    }

    /// Get a document by ID, regardless of tenant.
    pub fn get(&self, ex: &dyn Executor, id: &str) -> Result<Option<StoredDocument>, ServiceError> {
        let rows = ex.query(
            &format!("SELECT {DOC_COLUMNS} FROM documents WHERE id = ?1"),
            &[id.into()],
        )?;
        rows.first().map(row_to_document).transpose()
    }

    /// Compare-and-swap update of status, data and version.
    ///
    /// Returns `false` when the row no longer has `expected_version`.
    pub fn update_if_version(
        &self,
        ex: &dyn Executor,
        doc: &StoredDocument,
        expected_version: i64,
    ) -> Result<bool, ServiceError> {
        let affected = ex.exec(
            "UPDATE documents SET status = ?1, version = ?2, data = ?3, updated_at = ?4 \
             WHERE id = ?5 AND version = ?6",
            &[
                doc.status.as_str().into(),
                Value::Integer(doc.version),
                Value::Text(doc.data.to_string()),
                doc.updated_at.as_str().into(),
                doc.id.as_str().into(),
                Value::Integer(expected_version),
            ],
        )?;
        Ok(affected > 0)
    }

    /// List documents of one kind visible to a tenant and view mode.
    ///
    /// Newest first. A numeric cursor (the `seq` of the last item of the
    /// previous page) takes precedence over page/offset.
    pub fn list(
        &self,
        ex: &dyn Executor,
        filter: &ListFilter<'_>,
        params: &ListParams,
    ) -> Result<(Vec<StoredDocument>, usize), ServiceError> {
        let mut where_clauses: Vec<String> = vec!["company_id = ?1".into(), "kind = ?2".into()];
        let mut bind: Vec<Value> = vec![filter.company_id.into(), filter.kind.into()];
        let mut idx = 3;

        let (view_clause, view_values) = filter.view_mode.sql_filter("view_mode", idx);
        idx += view_values.len();
        where_clauses.push(view_clause);
        bind.extend(view_values.into_iter().map(Value::Text));

        if let Some(status) = filter.status {
            where_clauses.push(format!("status = ?{idx}"));
            bind.push(status.into());
            idx += 1;
        }
        if let Some(parent) = filter.parent_id {
            where_clauses.push(format!("parent_id = ?{idx}"));
            bind.push(parent.into());
            idx += 1;
        }

        let where_sql = where_clauses.join(" AND ");

        let count_rows = ex.query(
            &format!("SELECT COUNT(*) AS cnt FROM documents WHERE {where_sql}"),
            &bind,
        )?;
        let total = count_rows
            .first()
            .and_then(|r| r.get_i64("cnt"))
            .unwrap_or(0) as usize;

        let limit = params.effective_limit();
        let mut page_sql = format!("SELECT {DOC_COLUMNS} FROM documents WHERE {where_sql}");
        let mut page_bind = bind;

        match params.cursor.as_deref() {
            Some(cursor) => {
                let seq: i64 = cursor
                    .parse()
                    .map_err(|_| ServiceError::Validation(format!("invalid cursor '{cursor}'")))?;
                page_sql.push_str(&format!(" AND seq < ?{idx} ORDER BY seq DESC LIMIT ?{}", idx + 1));
                page_bind.push(Value::Integer(seq));
                page_bind.push(Value::Integer(limit as i64));
            }
            None => {
                page_sql.push_str(&format!(
                    " ORDER BY seq DESC LIMIT ?{idx} OFFSET ?{}",
                    idx + 1
                ));
                page_bind.push(Value::Integer(limit as i64));
                page_bind.push(Value::Integer(params.offset() as i64));
            }
        }

        let rows = ex.query(&page_sql, &page_bind)?;
        let items = rows
            .iter()
            .map(row_to_document)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((items, total))
    }

    /// Documents of `kind` attached to `parent_id` within a company, all view modes.
    pub fn children(
        &self,
        ex: &dyn Executor,
        company_id: &str,
        kind: &str,
        parent_id: &str,
    ) -> Result<Vec<StoredDocument>, ServiceError> {
        let rows = ex.query(
            &format!(
                "SELECT {DOC_COLUMNS} FROM documents \
                 WHERE company_id = ?1 AND kind = ?2 AND parent_id = ?3 ORDER BY seq ASC"
            ),
            &[company_id.into(), kind.into(), parent_id.into()],
        )?;
        rows.iter().map(row_to_document).collect()
    }

    /// Documents of `kind` in any of `statuses`, across all tenants.
    pub fn by_status(
        &self,
        ex: &dyn Executor,
        kind: &str,
        statuses: &[&str],
    ) -> Result<Vec<StoredDocument>, ServiceError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = (0..statuses.len()).map(|i| format!("?{}", i + 2)).collect();
        let mut bind: Vec<Value> = vec![kind.into()];
        bind.extend(statuses.iter().map(|s| Value::from(*s)));

        let rows = ex.query(
            &format!(
                "SELECT {DOC_COLUMNS} FROM documents WHERE kind = ?1 AND status IN ({}) \
                 ORDER BY seq ASC",
                placeholders.join(", ")
            ),
            &bind,
        )?;
        rows.iter().map(row_to_document).collect()
    }

    // -----------------------------------------------------------------------
    // Audit log
    // -----------------------------------------------------------------------

    pub fn append_audit(&self, ex: &dyn Executor, entry: &NewAuditEntry<'_>) -> Result<(), ServiceError> {
        ex.exec(
            "INSERT INTO audit_log (company_id, document_id, kind, action, from_status, \
             to_status, actor, note, at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            &[
                entry.company_id.into(),
                entry.document_id.into(),
                entry.kind.into(),
                entry.action.into(),
                entry.from_status.into(),
                entry.to_status.into(),
                entry.actor.into(),
                entry.note.into(),
                entry.at.into(),
            ],
        )?;
        Ok(())
    }

    /// Audit trail of a document, oldest first.
    pub fn audit_trail(&self, ex: &dyn Executor, document_id: &str) -> Result<Vec<AuditEntry>, ServiceError> {
        let rows = ex.query(
            "SELECT seq, document_id, kind, action, from_status, to_status, actor, note, at \
             FROM audit_log WHERE document_id = ?1 ORDER BY seq ASC",
            &[document_id.into()],
        )?;
        rows.iter().map(row_to_audit).collect()
    }

    // -----------------------------------------------------------------------
    // Idempotency keys
    // -----------------------------------------------------------------------

    pub fn find_idempotency(
        &self,
        ex: &dyn Executor,
        company_id: &str,
        scope: &str,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, ServiceError> {
        let rows = ex.query(
            "SELECT request_hash, response FROM idempotency_keys \
             WHERE company_id = ?1 AND scope = ?2 AND key = ?3",
            &[company_id.into(), scope.into(), key.into()],
        )?;
        Ok(rows.first().and_then(|r| {
            Some(IdempotencyRecord {
                request_hash: r.get_str("request_hash")?.to_string(),
                response: r.get_str("response")?.to_string(),
            })
        }))
    }

    pub fn save_idempotency(
        &self,
        ex: &dyn Executor,
        company_id: &str,
        scope: &str,
        key: &str,
        request_hash: &str,
        response: &str,
        at: &str,
    ) -> Result<(), ServiceError> {
        ex.exec(
            "INSERT INTO idempotency_keys (company_id, scope, key, request_hash, response, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            &[
                company_id.into(),
                scope.into(),
                key.into(),
                request_hash.into(),
                response.into(),
                at.into(),
            ],
        )?;
        Ok(())
    }
}

fn text(row: &Row, name: &str) -> Result<String, ServiceError> {
    row.get_str(name)
        .map(str::to_string)
        .ok_or_else(|| ServiceError::Storage(format!("missing {name} column")))
}

fn row_to_document(row: &Row) -> Result<StoredDocument, ServiceError> {
    let view_mode = ViewMode::parse(&text(row, "view_mode")?)
        .map_err(|e| ServiceError::Storage(format!("bad view mode: {e}")))?;
    let data = serde_json::from_str(&text(row, "data")?)
        .map_err(|e| ServiceError::Storage(format!("bad document json: {e}")))?;

    Ok(StoredDocument {
        seq: row.get_i64("seq").unwrap_or_default(),
        id: text(row, "id")?,
        company_id: text(row, "company_id")?,
        kind: text(row, "kind")?,
        number: text(row, "number")?,
        view_mode,
        status: text(row, "status")?,
        version: row
            .get_i64("version")
            .ok_or_else(|| ServiceError::Storage("missing version column".into()))?,
        parent_id: row.get_str("parent_id").map(str::to_string),
        data,
        created_by: text(row, "created_by")?,
        created_at: text(row, "created_at")?,
        updated_at: text(row, "updated_at")?,
    })
}

fn row_to_audit(row: &Row) -> Result<AuditEntry, ServiceError> {
    Ok(AuditEntry {
        seq: row.get_i64("seq").unwrap_or_default(),
        document_id: text(row, "document_id")?,
        kind: text(row, "kind")?,
        action: text(row, "action")?,
        from_status: row.get_str("from_status").map(str::to_string),
        to_status: text(row, "to_status")?,
        actor: text(row, "actor")?,
        note: row.get_str("note").map(str::to_string),
        at: text(row, "at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabrica_sql::{transaction, SqliteStore};

    fn test_store() -> DocumentStore {
        let db: Arc<dyn SQLStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        DocumentStore::new(db).unwrap()
    }

    fn make_doc(id: &str, company: &str, mode: ViewMode, status: &str) -> StoredDocument {
        StoredDocument {
            seq: 0,
            id: id.into(),
            company_id: company.into(),
            kind: "test.doc".into(),
            number: format!("T-{id}"),
            view_mode: mode,
            status: status.into(),
            version: 1,
            parent_id: None,
            data: serde_json::json!({"title": id}),
            created_by: "u1".into(),
            created_at: fabrica_core::now_rfc3339(),
            updated_at: fabrica_core::now_rfc3339(),
        }
    }

    #[test]
    fn numbering_is_per_company_and_view_mode() {
        let store = test_store();
        let numbers: Vec<String> = transaction(store.db().as_ref(), |tx| {
            Ok::<_, ServiceError>(vec![
                store.next_number(tx, "c1", "k", "PO", ViewMode::Standard)?,
                store.next_number(tx, "c1", "k", "PO", ViewMode::Standard)?,
                store.next_number(tx, "c2", "k", "PO", ViewMode::Standard)?,
                store.next_number(tx, "c1", "k", "PO", ViewMode::Extended)?,
            ])
        })
        .unwrap();
        assert_eq!(numbers, vec!["PO-000001", "PO-000002", "PO-000001", "POX-000001"]);
    }

    #[test]
    fn cas_update_detects_stale_version() {
        let store = test_store();
        transaction(store.db().as_ref(), |tx| {
            let mut doc = make_doc("d1", "c1", ViewMode::Standard, "DRAFT");
            store.insert(tx, &doc)?;

            doc.status = "SUBMITTED".into();
            doc.version = 2;
            assert!(store.update_if_version(tx, &doc, 1)?);
            // Second writer still believes version 1.
            doc.version = 2;
            assert!(!store.update_if_version(tx, &doc, 1)?);

            let got = store.get(tx, "d1")?.unwrap();
            assert_eq!(got.status, "SUBMITTED");
            assert_eq!(got.version, 2);
            Ok::<_, ServiceError>(())
        })
        .unwrap();
    }

    #[test]
    fn list_filters_tenant_view_and_status() {
        let store = test_store();
        transaction(store.db().as_ref(), |tx| {
            store.insert(tx, &make_doc("a", "c1", ViewMode::Standard, "DRAFT"))?;
            store.insert(tx, &make_doc("b", "c1", ViewMode::Extended, "DRAFT"))?;
            store.insert(tx, &make_doc("c", "c1", ViewMode::Standard, "CLOSED"))?;
            store.insert(tx, &make_doc("d", "c2", ViewMode::Standard, "DRAFT"))?;

            let base = ListFilter {
                company_id: "c1",
                kind: "test.doc",
                view_mode: ViewMode::Standard,
                status: None,
                parent_id: None,
            };
            let (items, total) = store.list(tx, &base, &ListParams::default())?;
            assert_eq!(total, 2);
            assert_eq!(items[0].id, "c"); // newest first

            let extended = ListFilter { view_mode: ViewMode::Extended, ..base };
            let (_, total) = store.list(tx, &extended, &ListParams::default())?;
            assert_eq!(total, 3);

            let drafts = ListFilter { status: Some("DRAFT"), ..extended };
            let (items, total) = store.list(tx, &drafts, &ListParams::default())?;
            assert_eq!(total, 2);
            assert!(items.iter().all(|d| d.status == "DRAFT"));
            Ok::<_, ServiceError>(())
        })
        .unwrap();
    }

    #[test]
    fn cursor_pagination_walks_all_rows() {
        let store = test_store();
        transaction(store.db().as_ref(), |tx| {
            for i in 0..5 {
                store.insert(tx, &make_doc(&format!("d{i}"), "c1", ViewMode::Standard, "DRAFT"))?;
            }
            let filter = ListFilter {
                company_id: "c1",
                kind: "test.doc",
                view_mode: ViewMode::Standard,
                status: None,
                parent_id: None,
            };
            let first = ListParams { limit: 2, page: None, cursor: None };
            let (page1, _) = store.list(tx, &filter, &first)?;
            assert_eq!(page1.len(), 2);

            let next = ListParams { limit: 2, page: None, cursor: Some(page1[1].seq.to_string()) };
            let (page2, _) = store.list(tx, &filter, &next)?;
            assert_eq!(page2.len(), 2);
            assert!(page2[0].seq < page1[1].seq);

            let bad = ListParams { cursor: Some("nope".into()), ..Default::default() };
            assert!(store.list(tx, &filter, &bad).is_err());
            Ok::<_, ServiceError>(())
        })
        .unwrap();
    }

    #[test]
    fn idempotency_record_roundtrip() {
        let store = test_store();
        transaction(store.db().as_ref(), |tx| {
            assert!(store.find_idempotency(tx, "c1", "pay", "k1")?.is_none());
            store.save_idempotency(tx, "c1", "pay", "k1", "hash", "{}", "2026-01-01T00:00:00Z")?;
            let rec = store.find_idempotency(tx, "c1", "pay", "k1")?.unwrap();
            assert_eq!(rec.request_hash, "hash");
            // Keys are scoped per company.
            assert!(store.find_idempotency(tx, "c2", "pay", "k1")?.is_none());
            Ok::<_, ServiceError>(())
        })
        .unwrap();
    }
}
