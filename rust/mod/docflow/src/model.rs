use std::fmt;

use fabrica_core::{ListParams, ServiceError, ViewMode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Status contract
// ---------------------------------------------------------------------------

/// A document status enum.
///
/// Statuses are persisted and serialized as SCREAMING_SNAKE_CASE strings.
/// Use [`doc_state!`](crate::doc_state) to declare one.
pub trait DocState:
    Copy + Eq + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn as_str(&self) -> &'static str;

    fn parse(s: &str) -> Option<Self>;

    /// Whether the document has reached a final state.
    fn is_terminal(&self) -> bool;
}

/// Declare a status enum implementing [`DocState`].
///
/// ```ignore
/// doc_state! {
///     /// Work order status.
///     pub enum WorkOrderStatus {
///         Pending = "PENDING",
///         Completed = "COMPLETED",
///     }
///     terminal = [Completed];
/// }
/// ```
#[macro_export]
macro_rules! doc_state {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $variant:ident = $text:literal ),+ $(,)?
        }
        terminal = [ $( $terminal:ident ),* $(,)? ];
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $crate::DocState for $name {
            fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $text, )+
                }
            }

            fn parse(s: &str) -> Option<Self> {
                match s {
                    $( $text => Some(Self::$variant), )+
                    _ => None,
                }
            }

            #[allow(unreachable_patterns)]
            fn is_terminal(&self) -> bool {
                match self {
                    $( Self::$terminal => true, )*
                    _ => false,
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str($crate::DocState::as_str(self))
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// One allowed transition.
///
/// `to` lists the statuses the action may end in. The engine moves the
/// document to `to[0]` before running the effect; an effect may choose
/// any other listed status (e.g. PARTIAL vs UNLOCKED after a release).
#[derive(Debug)]
pub struct Rule<S: 'static> {
    pub action: &'static str,
    pub from: &'static [S],
    pub to: &'static [S],
    pub permission: &'static str,
}

/// A document type: its status machine, data shape and permissions.
pub trait Lifecycle: Send + Sync + 'static {
    type State: DocState;
    type Data: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static;

    /// Stable kind identifier, e.g. `cmms.permit`.
    const KIND: &'static str;
    /// Human document number prefix, e.g. `PTW` for `PTW-000042`.
    const NUMBER_PREFIX: &'static str;

    const CREATE_PERMISSION: &'static str;
    const READ_PERMISSION: &'static str;
    const UPDATE_PERMISSION: &'static str;

    /// Status of a freshly created document.
    const INITIAL: Self::State;
    /// Statuses in which `data` may still be edited through `update`.
    const EDITABLE: &'static [Self::State];
    /// The transition table.
    const RULES: &'static [Rule<Self::State>];

    /// Validate and normalise data before it is stored by create or update.
    fn prepare(_data: &mut Self::Data) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Restore fields a merge patch must not change: values written by
    /// actions (approver, reasons, notes) and links checked at creation.
    /// Runs on `update` after the patch and before `prepare`.
    fn on_update(_stored: &Self::Data, _patched: &mut Self::Data) {}
}

// ---------------------------------------------------------------------------
// Document envelope
// ---------------------------------------------------------------------------

/// A stored business document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document<D, S> {
    pub id: String,
    pub company_id: String,
    pub kind: String,
    /// Sequential number per company, kind and view mode.
    pub number: String,
    pub view_mode: ViewMode,
    pub status: S,
    /// Incremented on every change; used for compare-and-swap updates.
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub data: D,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

/// The document type of a lifecycle.
pub type Doc<L> = Document<<L as Lifecycle>::Data, <L as Lifecycle>::State>;

/// One row of the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub seq: i64,
    pub document_id: String,
    pub kind: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_status: Option<String>,
    pub to_status: String,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub at: String,
}

// ---------------------------------------------------------------------------
// Queries and requests
// ---------------------------------------------------------------------------

/// Query parameters for document list endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocQuery {
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub limit: Option<usize>,

    #[serde(default)]
    pub page: Option<usize>,

    #[serde(default)]
    pub cursor: Option<String>,
}

impl DocQuery {
    pub fn params(&self) -> ListParams {
        let defaults = ListParams::default();
        ListParams {
            limit: self.limit.unwrap_or(defaults.limit),
            page: self.page,
            cursor: self.cursor.clone(),
        }
    }
}

/// Body for `PATCH /<documents>/{id}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    /// Reject the update with 409 if the document moved past this version.
    #[serde(default)]
    pub expected_version: Option<i64>,
    /// JSON merge patch applied to `data`.
    pub data: serde_json::Value,
}

/// Body accepted by simple action endpoints (`@cancel`, `@resume`, ...).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRequest {
    #[serde(default)]
    pub note: Option<String>,
}

/// Body for actions that require a reason (`@reject`, `@hold`, ...).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonRequest {
    pub reason: String,
}

impl ReasonRequest {
    /// The trimmed reason, or a validation error when blank.
    pub fn required(&self, action: &str) -> Result<String, ServiceError> {
        let reason = self.reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::Validation(format!("{action} requires a reason")));
        }
        Ok(reason.to_string())
    }
}

// ---------------------------------------------------------------------------
// Idempotency
// ---------------------------------------------------------------------------

/// Request header carrying the caller's idempotency key.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// A caller-supplied idempotency key plus a fingerprint of the request.
#[derive(Debug, Clone)]
pub struct IdempotencyKey {
    pub key: String,
    request_hash: String,
}

impl IdempotencyKey {
    /// Fingerprint `request` (canonical JSON, SHA-256) under `key`.
    pub fn new(key: &str, request: &serde_json::Value) -> Result<Self, ServiceError> {
        let key = key.trim();
        if key.is_empty() || key.len() > 128 {
            return Err(ServiceError::Validation(
                "idempotency key must be 1..=128 characters".into(),
            ));
        }
        let canonical = serde_json::to_vec(request)?;
        Ok(Self {
            key: key.to_string(),
            request_hash: hex::encode(Sha256::digest(&canonical)),
        })
    }

    /// Read the key from request headers, if present.
    pub fn from_headers(
        headers: &axum::http::HeaderMap,
        request: &serde_json::Value,
    ) -> Result<Option<Self>, ServiceError> {
        match headers.get(IDEMPOTENCY_HEADER) {
            None => Ok(None),
            Some(v) => {
                let key = v.to_str().map_err(|_| {
                    ServiceError::Validation("idempotency key must be visible ASCII".into())
                })?;
                Self::new(key, request).map(Some)
            }
        }
    }

    /// Fingerprint bound to one target document.
    pub fn fingerprint_for(&self, document_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(document_id.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.request_hash.as_bytes());
        hex::encode(hasher.finalize())
    }
}
