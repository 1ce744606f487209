use crate::error::SQLError;

/// A dynamically-typed SQL parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A row returned from a SQL query: column name to value.
#[derive(Debug, Clone)]
pub struct Row {
    pub columns: Vec<(String, Value)>,
}

impl Row {
    /// Get a column value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Get a text column value by name.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(Value::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get an integer column value by name.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(Value::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    /// Get a real column value by name.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.get(name) {
            Some(Value::Real(f)) => Some(*f),
            Some(Value::Integer(i)) => Some(*i as f64),
            _ => None,
        }
    }
}

/// Statement execution against one connection.
///
/// Transaction bodies receive an `&dyn Executor`; every statement issued
/// through it commits or rolls back together.
pub trait Executor {
    /// Execute a query and return rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError>;

    /// Execute a statement (INSERT/UPDATE/DELETE) and return affected row count.
    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError>;
}

/// SQLStore provides a SQL execution interface backed by an embedded database.
pub trait SQLStore: Send + Sync {
    /// Execute a query and return rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError>;

    /// Execute a statement (INSERT/UPDATE/DELETE) and return affected row count.
    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError>;

    /// Execute several `;`-separated statements without parameters (schema setup).
    fn exec_batch(&self, sql: &str) -> Result<(), SQLError>;

    /// Run `body` inside one transaction.
    ///
    /// The transaction commits when `body` returns `true` and rolls back
    /// otherwise. The store's connection is held for the whole body, so the
    /// body must only use the executor it is given.
    fn run_in_transaction(
        &self,
        body: &mut dyn FnMut(&dyn Executor) -> bool,
    ) -> Result<(), SQLError>;
}

/// Run `body` in a transaction: commit on `Ok`, roll back on `Err`.
pub fn transaction<T, E, F>(db: &dyn SQLStore, body: F) -> Result<T, E>
where
    F: FnOnce(&dyn Executor) -> Result<T, E>,
    E: From<SQLError>,
{
    let mut body = Some(body);
    let mut outcome: Option<Result<T, E>> = None;

    db.run_in_transaction(&mut |tx| match body.take() {
        Some(f) => {
            let result = f(tx);
            let commit = result.is_ok();
            outcome = Some(result);
            commit
        }
        None => false,
    })?;

    match outcome {
        Some(result) => result,
        None => Err(SQLError::Transaction("transaction body did not run".into()).into()),
    }
}
