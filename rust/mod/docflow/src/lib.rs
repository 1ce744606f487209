//! Document lifecycle engine.
//!
//! Every business document (permit, purchase order, invoice, ...) is a
//! [`Document`] whose status moves through a declared table of [`Rule`]s.
//! The engine owns everything that is the same for all of them:
//!
//! - transition validation and permission checks,
//! - tenant and view-mode scoping,
//! - per-company document numbering,
//! - optimistic concurrency on `version`,
//! - the audit log,
//! - idempotency keys,
//! - running domain side effects inside the same SQL transaction.
//!
//! Domain crates implement [`Lifecycle`] and supply effect closures.

pub mod api;
pub mod engine;
pub mod model;
pub mod rules;
pub mod store;

pub use api::document_routes;
pub use engine::{DocFlow, TxContext};
pub use model::{
    AuditEntry, Doc, DocQuery, DocState, Document, IdempotencyKey, Lifecycle, NoteRequest,
    ReasonRequest, Rule, UpdateRequest, IDEMPOTENCY_HEADER,
};
pub use rules::{
    available_actions, may_run, permissions_of, require_rule, resolve, SYSTEM_PERMISSION,
};
