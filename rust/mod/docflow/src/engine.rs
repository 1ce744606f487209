use std::sync::Arc;

use tracing::{info, warn};

use fabrica_core::{merge_patch, new_id, now_rfc3339, ListResult, Principal, ServiceError};
use fabrica_sql::{transaction, Executor, SQLStore};

use crate::model::{AuditEntry, Doc, DocQuery, DocState, Document, IdempotencyKey, Lifecycle};
use crate::rules::{may_run, require_rule, resolve};
use crate::store::{DocumentStore, ListFilter, NewAuditEntry, StoredDocument};

// ---------------------------------------------------------------------------
// TxContext: what an effect sees
// ---------------------------------------------------------------------------

/// Handle given to side effects running inside a document transaction.
///
/// Everything done through it (and through [`executor`](Self::executor))
/// commits or rolls back together with the document change. Effects must
/// not call the non-`_in` methods of [`DocFlow`]: the connection is held
/// for the whole transaction.
pub struct TxContext<'a> {
    flow: &'a DocFlow,
    tx: &'a dyn Executor,
    principal: &'a Principal,
    action: &'a str,
}

impl<'a> TxContext<'a> {
    pub fn executor(&self) -> &'a dyn Executor {
        self.tx
    }

    pub fn principal(&self) -> &'a Principal {
        self.principal
    }

    /// Action being performed (`create` for creations).
    pub fn action(&self) -> &'a str {
        self.action
    }

    /// Load another document visible to the caller.
    pub fn load<L: Lifecycle>(&self, id: &str) -> Result<Doc<L>, ServiceError> {
        self.flow.load_in::<L>(self.tx, self.principal, id)
    }

    /// Documents of kind `L` attached to `parent_id`.
    pub fn children<L: Lifecycle>(&self, parent_id: &str) -> Result<Vec<Doc<L>>, ServiceError> {
        self.flow.children_in::<L>(self.tx, self.principal, parent_id)
    }

    /// Transition another document within the same transaction.
    pub fn transition<L, F>(
        &self,
        id: &str,
        action: &str,
        note: Option<&str>,
        effect: F,
    ) -> Result<Doc<L>, ServiceError>
    where
        L: Lifecycle,
        F: FnOnce(&TxContext<'_>, &mut Doc<L>) -> Result<(), ServiceError>,
    {
        self.flow
            .transition_in::<L, F>(self.tx, self.principal, id, action, note, effect)
    }
}

// ---------------------------------------------------------------------------
// DocFlow: the lifecycle engine
// ---------------------------------------------------------------------------

/// The document lifecycle engine.
///
/// Stateless apart from its storage; one instance serves every
/// [`Lifecycle`] in the process.
pub struct DocFlow {
    db: Arc<dyn SQLStore>,
    store: DocumentStore,
}

impl DocFlow {
    /// Create the engine and initialise its tables.
    pub fn new(db: Arc<dyn SQLStore>) -> Result<Self, ServiceError> {
        let store = DocumentStore::new(Arc::clone(&db))?;
        Ok(Self { db, store })
    }

    /// The shared SQL store, for domain tables living next to documents.
    pub fn db(&self) -> &Arc<dyn SQLStore> {
        &self.db
    }

    /// Run `body` in one transaction with no document involved.
    pub fn run<T, F>(&self, body: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&dyn Executor) -> Result<T, ServiceError>,
    {
        transaction(self.db.as_ref(), body)
    }

    // =======================================================================
    // Create / read
    // =======================================================================

    /// Create a document with no side effect.
    pub fn create<L: Lifecycle>(
        &self,
        principal: &Principal,
        data: L::Data,
        parent_id: Option<String>,
    ) -> Result<Doc<L>, ServiceError> {
        self.create_with::<L, _>(principal, data, parent_id, |_, _| Ok(()))
    }

    /// Create a document, running `effect` in the same transaction before
    /// the row is written. The effect may adjust `data` or reject creation.
    pub fn create_with<L, F>(
        &self,
        principal: &Principal,
        mut data: L::Data,
        parent_id: Option<String>,
        effect: F,
    ) -> Result<Doc<L>, ServiceError>
    where
        L: Lifecycle,
        F: FnOnce(&TxContext<'_>, &mut Doc<L>) -> Result<(), ServiceError>,
    {
        principal.require(L::CREATE_PERMISSION)?;
        L::prepare(&mut data)?;

        let result = self.run(|tx| {
            let number = self.store.next_number(
                tx,
                &principal.company_id,
                L::KIND,
                L::NUMBER_PREFIX,
                principal.view_mode,
            )?;
            let now = now_rfc3339();
            let mut doc: Doc<L> = Document {
                id: new_id(),
                company_id: principal.company_id.clone(),
                kind: L::KIND.to_string(),
                number,
                view_mode: principal.view_mode,
                status: L::INITIAL,
                version: 1,
                parent_id,
                data,
                created_by: principal.user_id.clone(),
                created_at: now.clone(),
                updated_at: now,
            };

            let ctx = TxContext { flow: self, tx, principal, action: "create" };
            effect(&ctx, &mut doc)?;

            self.store.insert(tx, &encode::<L>(&doc)?)?;
            self.store.append_audit(
                tx,
                &NewAuditEntry {
                    company_id: &doc.company_id,
                    document_id: &doc.id,
                    kind: L::KIND,
                    action: "create",
                    from_status: None,
                    to_status: doc.status.as_str(),
                    actor: &principal.user_id,
                    note: None,
                    at: &doc.created_at,
                },
            )?;
            Ok(doc)
        });

        match &result {
            Ok(doc) => info!("{} {} created by {} ({})", L::KIND, doc.number, principal.user_id, doc.id),
            Err(e) => warn!("{} create by {} failed: {e}", L::KIND, principal.user_id),
        }
        result
    }

    /// Get a document visible to the caller.
    pub fn get<L: Lifecycle>(&self, principal: &Principal, id: &str) -> Result<Doc<L>, ServiceError> {
        principal.require(L::READ_PERMISSION)?;
        self.run(|tx| self.load_in::<L>(tx, principal, id))
    }

    /// Load a document on an open transaction.
    ///
    /// Documents of another company, another kind or a view mode the caller
    /// cannot see are reported as not found. No permission is checked.
    pub fn load_in<L: Lifecycle>(
        &self,
        tx: &dyn Executor,
        principal: &Principal,
        id: &str,
    ) -> Result<Doc<L>, ServiceError> {
        let not_found = || ServiceError::NotFound(format!("{} {id} not found", L::KIND));
        let stored = self.store.get(tx, id)?.ok_or_else(not_found)?;
        if stored.company_id != principal.company_id
            || stored.kind != L::KIND
            || !principal.view_mode.can_see(stored.view_mode)
        {
            return Err(not_found());
        }
        decode::<L>(stored)
    }

    /// List documents of kind `L`, newest first.
    pub fn list<L: Lifecycle>(
        &self,
        principal: &Principal,
        query: &DocQuery,
    ) -> Result<ListResult<Doc<L>>, ServiceError> {
        principal.require(L::READ_PERMISSION)?;

        if let Some(status) = query.status.as_deref() {
            if L::State::parse(status).is_none() {
                return Err(ServiceError::Validation(format!(
                    "unknown {} status '{status}'",
                    L::KIND
                )));
            }
        }

        let params = query.params();
        let filter = ListFilter {
            company_id: &principal.company_id,
            kind: L::KIND,
            view_mode: principal.view_mode,
            status: query.status.as_deref(),
            parent_id: query.parent_id.as_deref(),
        };
        let (rows, total) = self.run(|tx| self.store.list(tx, &filter, &params))?;

        let next_cursor = if rows.len() == params.effective_limit() {
            rows.last().map(|d| d.seq.to_string())
        } else {
            None
        };
        let items = rows
            .into_iter()
            .map(decode::<L>)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ListResult { items, total, next_cursor })
    }

    /// Documents of kind `L` attached to `parent_id`, across view modes.
    ///
    /// Used by guards ("all LOTOs of this work order are released"), which
    /// must not be fooled by documents hidden from the caller's view.
    pub fn children_in<L: Lifecycle>(
        &self,
        tx: &dyn Executor,
        principal: &Principal,
        parent_id: &str,
    ) -> Result<Vec<Doc<L>>, ServiceError> {
        self.store
            .children(tx, &principal.company_id, L::KIND, parent_id)?
            .into_iter()
            .map(decode::<L>)
            .collect()
    }

    /// Audit trail of a document, oldest first.
    pub fn history<L: Lifecycle>(
        &self,
        principal: &Principal,
        id: &str,
    ) -> Result<Vec<AuditEntry>, ServiceError> {
        principal.require(L::READ_PERMISSION)?;
        self.run(|tx| {
            let doc = self.load_in::<L>(tx, principal, id)?;
            self.store.audit_trail(tx, &doc.id)
        })
    }

    /// Documents of kind `L` in any of `statuses`, across every company.
    ///
    /// For background jobs only; the result is not tenant-filtered.
    pub fn expire_candidates<L: Lifecycle>(
        &self,
        statuses: &[L::State],
    ) -> Result<Vec<Doc<L>>, ServiceError> {
        let names: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        self.run(|tx| self.store.by_status(tx, L::KIND, &names))?
            .into_iter()
            .map(decode::<L>)
            .collect()
    }

    // =======================================================================
    // Update
    // =======================================================================

    /// Apply a JSON merge patch to `data` while the status is editable.
    pub fn update<L: Lifecycle>(
        &self,
        principal: &Principal,
        id: &str,
        expected_version: Option<i64>,
        patch: &serde_json::Value,
    ) -> Result<Doc<L>, ServiceError> {
        principal.require(L::UPDATE_PERMISSION)?;

        let result = self.run(|tx| {
            let mut doc = self.load_in::<L>(tx, principal, id)?;
            if !L::EDITABLE.contains(&doc.status) {
                return Err(ServiceError::ReadOnly(format!(
                    "{} {} cannot be edited in status {}",
                    L::KIND, doc.number, doc.status
                )));
            }
            if let Some(expected) = expected_version {
                if expected != doc.version {
                    return Err(ServiceError::Conflict(format!(
                        "{} {} is at version {}, not {expected}",
                        L::KIND, doc.number, doc.version
                    )));
                }
            }

            let mut value = serde_json::to_value(&doc.data)?;
            merge_patch(&mut value, patch);
            let mut data: L::Data = serde_json::from_value(value)
                .map_err(|e| ServiceError::Validation(format!("invalid {} data: {e}", L::KIND)))?;
            L::on_update(&doc.data, &mut data);
            L::prepare(&mut data)?;
            doc.data = data;

            let status = doc.status;
            self.commit_change::<L>(tx, principal, doc, status, "update", None)
        });

        if let Err(e) = &result {
            warn!("{} {id} update by {} failed: {e}", L::KIND, principal.user_id);
        }
        result
    }

    // =======================================================================
    // Transitions
    // =======================================================================

    /// Perform `action` on a document in its own transaction.
    ///
    /// With an idempotency key, a repeated call with the same key and the
    /// same request returns the stored result without running again; the
    /// same key with a different request is a conflict.
    pub fn transition<L, F>(
        &self,
        principal: &Principal,
        id: &str,
        action: &str,
        note: Option<&str>,
        idempotency: Option<&IdempotencyKey>,
        effect: F,
    ) -> Result<Doc<L>, ServiceError>
    where
        L: Lifecycle,
        F: FnOnce(&TxContext<'_>, &mut Doc<L>) -> Result<(), ServiceError>,
    {
        let result = self.run(|tx| match idempotency {
            None => self.transition_in::<L, F>(tx, principal, id, action, note, effect),
            Some(key) => {
                let scope = format!("{}:{action}", L::KIND);
                let fingerprint = key.fingerprint_for(id);

                if let Some(record) =
                    self.store
                        .find_idempotency(tx, &principal.company_id, &scope, &key.key)?
                {
                    self.check_replay::<L>(tx, principal, id, action)?;
                    if record.request_hash != fingerprint {
                        return Err(ServiceError::Conflict(format!(
                            "idempotency key '{}' was used for a different request",
                            key.key
                        )));
                    }
                    info!("{} {id} {action} replayed for key {}", L::KIND, key.key);
                    return Ok(serde_json::from_str(&record.response)?);
                }

                let doc = self.transition_in::<L, F>(tx, principal, id, action, note, effect)?;
                self.store.save_idempotency(
                    tx,
                    &principal.company_id,
                    &scope,
                    &key.key,
                    &fingerprint,
                    &serde_json::to_string(&doc)?,
                    &doc.updated_at,
                )?;
                Ok(doc)
            }
        });

        match &result {
            Ok(doc) => info!(
                "{} {} {action} by {} -> {}",
                L::KIND, doc.number, principal.user_id, doc.status
            ),
            Err(e) => warn!("{} {id} {action} by {} rejected: {e}", L::KIND, principal.user_id),
        }
        result
    }

    /// A replayed result is only returned to callers who could have run
    /// the action now: the document must be visible to them and they must
    /// hold a permission of a rule for `action`.
    fn check_replay<L: Lifecycle>(
        &self,
        tx: &dyn Executor,
        principal: &Principal,
        id: &str,
        action: &str,
    ) -> Result<(), ServiceError> {
        self.load_in::<L>(tx, principal, id)?;
        if L::RULES.iter().any(|r| r.action == action && may_run(principal, r)) {
            return Ok(());
        }
        Err(ServiceError::PermissionDenied(format!(
            "{} may not {action} {}",
            principal.user_id,
            L::KIND
        )))
    }

    /// Perform `action` on an open transaction.
    ///
    /// Load, resolve the rule, check its permission, move to the rule's
    /// default target, run `effect`, check the resulting status is one the
    /// rule allows, then compare-and-swap the row and append the audit entry.
    pub fn transition_in<L, F>(
        &self,
        tx: &dyn Executor,
        principal: &Principal,
        id: &str,
        action: &str,
        note: Option<&str>,
        effect: F,
    ) -> Result<Doc<L>, ServiceError>
    where
        L: Lifecycle,
        F: FnOnce(&TxContext<'_>, &mut Doc<L>) -> Result<(), ServiceError>,
    {
        let mut doc = self.load_in::<L>(tx, principal, id)?;
        let from = doc.status;
        let rule = resolve(L::RULES, L::KIND, from, action)?;
        require_rule(principal, L::KIND, rule)?;

        doc.status = rule.to[0];
        let ctx = TxContext { flow: self, tx, principal, action };
        effect(&ctx, &mut doc)?;

        if !rule.to.contains(&doc.status) {
            return Err(ServiceError::Internal(format!(
                "{action} on {} ended in status {}, which the rule does not allow",
                L::KIND, doc.status
            )));
        }

        self.commit_change::<L>(tx, principal, doc, from, action, note)
    }

    /// Write a changed document (CAS on version) and its audit entry.
    fn commit_change<L: Lifecycle>(
        &self,
        tx: &dyn Executor,
        principal: &Principal,
        mut doc: Doc<L>,
        from: L::State,
        action: &str,
        note: Option<&str>,
    ) -> Result<Doc<L>, ServiceError> {
        let expected = doc.version;
        doc.version += 1;
        doc.updated_at = now_rfc3339();

        if !self.store.update_if_version(tx, &encode::<L>(&doc)?, expected)? {
            return Err(ServiceError::Conflict(format!(
                "{} {} was modified concurrently",
                L::KIND, doc.number
            )));
        }

        self.store.append_audit(
            tx,
            &NewAuditEntry {
                company_id: &doc.company_id,
                document_id: &doc.id,
                kind: L::KIND,
                action,
                from_status: Some(from.as_str()),
                to_status: doc.status.as_str(),
                actor: &principal.user_id,
                note,
                at: &doc.updated_at,
            },
        )?;
        Ok(doc)
    }
}

fn encode<L: Lifecycle>(doc: &Doc<L>) -> Result<StoredDocument, ServiceError> {
    Ok(StoredDocument {
        seq: 0,
        id: doc.id.clone(),
        company_id: doc.company_id.clone(),
        kind: doc.kind.clone(),
        number: doc.number.clone(),
        view_mode: doc.view_mode,
        status: doc.status.as_str().to_string(),
        version: doc.version,
        parent_id: doc.parent_id.clone(),
        data: serde_json::to_value(&doc.data)?,
        created_by: doc.created_by.clone(),
        created_at: doc.created_at.clone(),
        updated_at: doc.updated_at.clone(),
    })
}

fn decode<L: Lifecycle>(stored: StoredDocument) -> Result<Doc<L>, ServiceError> {
    let status = L::State::parse(&stored.status).ok_or_else(|| {
        ServiceError::Storage(format!("unknown {} status '{}'", L::KIND, stored.status))
    })?;
    let data: L::Data = serde_json::from_value(stored.data)
        .map_err(|e| ServiceError::Storage(format!("bad {} data: {e}", L::KIND)))?;

    Ok(Document {
        id: stored.id,
        company_id: stored.company_id,
        kind: stored.kind,
        number: stored.number,
        view_mode: stored.view_mode,
        status,
        version: stored.version,
        parent_id: stored.parent_id,
        data,
        created_by: stored.created_by,
        created_at: stored.created_at,
        updated_at: stored.updated_at,
    })
}
