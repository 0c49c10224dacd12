//! Store interface and its SQLite implementation.
//!
//! The template engine only ever talks to a [`Store`]: parameterized
//! statements in, typed records out, and [`Store::execute_batch`] as the
//! atomic unit of work every mutating operation runs inside.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::debug;
use rusqlite::{
    Connection, params_from_iter,
    types::{Value as SqlValue, ValueRef},
};

use crate::{
    config::StoreConfig,
    data::Value,
    error::{Result, TemplateError},
    kind::{DERIVED_ARTIFACT_TABLE, TEMPLATE_REGISTRY_TABLE, TemplateKind},
    schema::ColumnType,
};

pub type Param = Option<Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Param>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Schema statements carry no parameters.
    pub fn ddl(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }
}

/// One result row, with the column names the engine reported.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Vec<String>,
    values: Vec<Option<Value>>,
}

impl Record {
    pub fn new(columns: Vec<String>, values: Vec<Option<Value>>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Option<Value>] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.values[index].as_ref()
    }

    pub fn at(&self, index: usize) -> Option<&Value> {
        self.values.get(index).and_then(Option::as_ref)
    }

    pub fn into_values(self) -> Vec<Option<Value>> {
        self.values
    }
}

pub trait Store {
    /// Runs one statement, returning the number of affected rows.
    fn execute(&self, statement: &Statement) -> Result<usize>;

    /// Runs every statement inside one transaction; nothing persists on failure.
    fn execute_batch(&self, statements: &[Statement]) -> Result<()>;

    fn fetch_all(&self, sql: &str, params: &[Param]) -> Result<Vec<Record>>;

    fn fetch_one(&self, sql: &str, params: &[Param]) -> Result<Option<Record>> {
        Ok(self.fetch_all(sql, params)?.into_iter().next())
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        let found = self.fetch_one(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
            &[Some(Value::text(table))],
        )?;
        Ok(found.is_some())
    }
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()
        } else {
            Connection::open(&config.path)
        }
        .map_err(|err| TemplateError::execution("open", err))?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(|err| TemplateError::execution("busy_timeout", err))?;
        if config.foreign_keys {
            conn.pragma_update(None, "foreign_keys", "ON")
                .map_err(|err| TemplateError::execution("PRAGMA foreign_keys", err))?;
        }
        debug!("Opened store at {}", config.path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Fresh in-memory store with the shared relations installed.
    pub fn in_memory() -> Result<Self> {
        let store = Self::open(&StoreConfig::in_memory())?;
        bootstrap(&store)?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TemplateError::execution("lock", "store connection poisoned"))
    }
}

fn to_sql(param: &Param) -> SqlValue {
    match param {
        None => SqlValue::Null,
        Some(Value::Boolean(b)) => SqlValue::Integer(i64::from(*b)),
        Some(Value::Integer(i)) => SqlValue::Integer(*i),
        Some(Value::Float(f)) => SqlValue::Real(*f),
        Some(Value::Text(s)) => SqlValue::Text(s.clone()),
        Some(ts @ Value::Timestamp(_)) => match ColumnType::to_stored(ts) {
            Value::Text(s) => SqlValue::Text(s),
            _ => SqlValue::Null,
        },
    }
}

fn from_sql(value: ValueRef<'_>) -> Option<Value> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(Value::Integer(i)),
        ValueRef::Real(f) => Some(Value::Float(f)),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(Value::Text(String::from_utf8_lossy(bytes).into_owned()))
        }
    }
}

fn run(conn: &Connection, statement: &Statement) -> Result<usize> {
    let values: Vec<SqlValue> = statement.params.iter().map(to_sql).collect();
    conn.execute(&statement.sql, params_from_iter(values.iter()))
        .map_err(|err| TemplateError::execution(&statement.sql, err))
}

impl Store for SqliteStore {
    fn execute(&self, statement: &Statement) -> Result<usize> {
        let conn = self.lock()?;
        run(&conn, statement)
    }

    fn execute_batch(&self, statements: &[Statement]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|err| TemplateError::execution("BEGIN", err))?;
        debug!("Executing {} statement(s) in one transaction", statements.len());
        for statement in statements {
            // Dropping `tx` on the error path rolls the whole batch back.
            run(&tx, statement)?;
        }
        tx.commit()
            .map_err(|err| TemplateError::execution("COMMIT", err))
    }

    fn fetch_all(&self, sql: &str, params: &[Param]) -> Result<Vec<Record>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|err| TemplateError::execution(sql, err))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let values: Vec<SqlValue> = params.iter().map(to_sql).collect();
        let mut rows = stmt
            .query(params_from_iter(values.iter()))
            .map_err(|err| TemplateError::execution(sql, err))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(|err| TemplateError::execution(sql, err))? {
            let mut cells = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                let value = row
                    .get_ref(index)
                    .map_err(|err| TemplateError::execution(sql, err))?;
                cells.push(from_sql(value));
            }
            records.push(Record::new(columns.clone(), cells));
        }
        Ok(records)
    }
}

/// Installs the shared relations every template kind relies on.
///
/// Idempotent: existing tables and vocabulary rows are left in place.
pub fn bootstrap(store: &dyn Store) -> Result<()> {
    let mut statements = vec![
        Statement::ddl(format!(
            "CREATE TABLE IF NOT EXISTS {TEMPLATE_REGISTRY_TABLE} (template_kind varchar NOT NULL, \
             owner_id integer NOT NULL, PRIMARY KEY (template_kind, owner_id))"
        )),
        Statement::ddl(format!(
            "CREATE TABLE IF NOT EXISTS {DERIVED_ARTIFACT_TABLE} (artifact_id integer PRIMARY KEY \
             AUTOINCREMENT, template_kind varchar NOT NULL, owner_id integer NOT NULL, \
             description varchar)"
        )),
    ];
    for kind in TemplateKind::all() {
        for lookup in kind.lookups() {
            statements.push(Statement::ddl(lookup.table_ddl()));
            for (index, label) in lookup.labels.iter().enumerate() {
                statements.push(Statement::new(
                    format!(
                        "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?, ?)",
                        lookup.table, lookup.id_column, lookup.label_column
                    ),
                    vec![Some(Value::Integer(index as i64 + 1)), Some(Value::text(*label))],
                ));
            }
        }
        statements.push(Statement::ddl(kind.required_table_ddl()));
        statements.push(Statement::ddl(kind.catalog_table_ddl()));
    }
    store.execute_batch(&statements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_rolls_back_on_failure() {
        let store = SqliteStore::in_memory().unwrap();
        let result = store.execute_batch(&[
            Statement::ddl("CREATE TABLE t (a integer)"),
            Statement::new("INSERT INTO t (a) VALUES (?)", vec![Some(Value::Integer(1))]),
            Statement::ddl("CREATE TABLE t (a integer)"),
        ]);
        assert!(matches!(result, Err(TemplateError::ExecutionFailure { .. })));
        assert!(!store.table_exists("t").unwrap());
    }

    #[test]
    fn values_round_trip_through_engine() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .execute_batch(&[
                Statement::ddl("CREATE TABLE t (b bool, f float, s varchar)"),
                Statement::new(
                    "INSERT INTO t (b, f, s) VALUES (?, ?, ?)",
                    vec![Some(Value::Boolean(true)), Some(Value::Integer(15)), None],
                ),
            ])
            .unwrap();
        let record = store.fetch_one("SELECT b, f, s FROM t", &[]).unwrap().unwrap();
        assert_eq!(record.get("b"), Some(&Value::Integer(1)));
        assert_eq!(record.get("f"), Some(&Value::Float(15.0)));
        assert_eq!(record.get("s"), None);
    }

    #[test]
    fn bootstrap_is_idempotent_and_seeds_vocabularies() {
        let store = SqliteStore::in_memory().unwrap();
        bootstrap(&store).unwrap();
        let rows = store
            .fetch_all(
                "SELECT status FROM required_sample_info_status ORDER BY required_sample_info_status_id",
                &[],
            )
            .unwrap();
        let labels: Vec<String> = rows
            .iter()
            .filter_map(|r| r.at(0).map(Value::as_display))
            .collect();
        assert_eq!(labels, ["received", "in_preparation", "running", "completed"]);
    }
}
