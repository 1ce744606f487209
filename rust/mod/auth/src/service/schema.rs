use fabrica_sql::SQLStore;

use crate::service::AuthError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id             TEXT PRIMARY KEY,
    username       TEXT NOT NULL UNIQUE,
    company_id     TEXT NOT NULL,
    password_hash  TEXT NOT NULL,
    roles          TEXT NOT NULL,
    extended_view  INTEGER NOT NULL DEFAULT 0,
    active         INTEGER NOT NULL DEFAULT 1,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_users_company ON users(company_id);

CREATE TABLE IF NOT EXISTS roles (
    company_id     TEXT NOT NULL,
    id             TEXT NOT NULL,
    description    TEXT NOT NULL,
    permissions    TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    PRIMARY KEY (company_id, id)
);
";

/// Initialize the SQLite schema for users and roles.
pub fn init_schema(sql: &dyn SQLStore) -> Result<(), AuthError> {
    sql.exec_batch(SCHEMA)
        .map_err(|e| AuthError::Storage(format!("auth schema init: {e}")))
}
