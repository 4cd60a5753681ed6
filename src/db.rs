use crate::store::{Collection, DocumentStore, Filter};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = include_str!("../db/schema.sql");

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// SQLite-backed [`DocumentStore`]. Documents are kept as JSON text and
/// queried through SQLite's JSON functions.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("sqlite connection lock poisoned"))
    }
}

fn parse_body(collection: Collection, id: &str, body: &str) -> Result<Value> {
    serde_json::from_str(body)
        .with_context(|| format!("decoding {} document {}", collection.name(), id))
}

impl DocumentStore for SqliteStore {
    fn put(&self, collection: Collection, id: &str, doc: &Value) -> Result<()> {
        let body = serde_json::to_string(doc)?;
        let now = Utc::now().timestamp_millis();
        self.conn()?.execute(
            "INSERT INTO documents (collection, id, body, updated_at) VALUES (?1, ?2, ?3, ?4) ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![collection.name(), id, body, now],
        )?;
        Ok(())
    }

    fn insert_new(&self, collection: Collection, id: &str, doc: &Value) -> Result<bool> {
        let body = serde_json::to_string(doc)?;
        let now = Utc::now().timestamp_millis();
        let inserted = self.conn()?.execute(
            "INSERT INTO documents (collection, id, body, updated_at) VALUES (?1, ?2, ?3, ?4) ON CONFLICT(collection, id) DO NOTHING",
            params![collection.name(), id, body, now],
        )?;
        Ok(inserted == 1)
    }

    fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>> {
        let conn = self.conn()?;
        let body = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2 LIMIT 1",
                params![collection.name(), id],
                |r| r.get::<_, String>(0),
            )
            .optional()?;
        body.map(|b| parse_body(collection, id, &b)).transpose()
    }

    fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Value>> {
        let mut args = vec![SqlValue::Text(collection.name().to_string())];
        let clause = compile(filter, &mut args);
        let sql = format!(
            "SELECT id, body FROM documents WHERE collection = ? AND ({}) ORDER BY id",
            clause
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?;
        let mut docs = Vec::new();
        for row in rows {
            let (id, body) = row?;
            docs.push(parse_body(collection, &id, &body)?);
        }
        Ok(docs)
    }

    fn count(&self, collection: Collection, filter: &Filter) -> Result<usize> {
        let mut args = vec![SqlValue::Text(collection.name().to_string())];
        let clause = compile(filter, &mut args);
        let sql = format!(
            "SELECT COUNT(*) FROM documents WHERE collection = ? AND ({})",
            clause
        );
        let conn = self.conn()?;
        let n: i64 = conn.query_row(&sql, params_from_iter(args.iter()), |r| r.get(0))?;
        Ok(n as usize)
    }
}

fn json_path(field: &str) -> SqlValue {
    SqlValue::Text(format!("$.{}", field))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// JSON types a comparison operand may be ordered against. SQLite would
/// otherwise order integers before all text.
fn comparable_types(value: &Value) -> &'static str {
    match value {
        Value::Number(_) => "('integer', 'real')",
        Value::Bool(_) => "('true', 'false')",
        _ => "('text')",
    }
}

fn compare(field: &str, op: &str, value: &Value, args: &mut Vec<SqlValue>) -> String {
    args.push(json_path(field));
    args.push(json_path(field));
    args.push(to_sql(value));
    format!(
        "(json_type(body, ?) IN {} AND json_extract(body, ?) {} ?)",
        comparable_types(value),
        op
    )
}

/// Translates a [`Filter`] into a SQL boolean expression over `body`,
/// appending its bound parameters to `args` in order.
fn compile(filter: &Filter, args: &mut Vec<SqlValue>) -> String {
    match filter {
        Filter::All => "1".to_string(),
        Filter::Eq(field, value) => compare(field, "=", value, args),
        Filter::Lt(field, value) => compare(field, "<", value, args),
        Filter::Lte(field, value) => compare(field, "<=", value, args),
        Filter::Gte(field, value) => compare(field, ">=", value, args),
        Filter::In(field, values) => {
            if values.is_empty() {
                return "0".to_string();
            }
            args.push(json_path(field));
            let marks = vec!["?"; values.len()].join(", ");
            args.extend(values.iter().map(to_sql));
            format!("json_extract(body, ?) IN ({})", marks)
        }
        Filter::Exists(field) => {
            args.push(json_path(field));
            "json_extract(body, ?) IS NOT NULL".to_string()
        }
        Filter::Absent(field) => {
            args.push(json_path(field));
            "json_extract(body, ?) IS NULL".to_string()
        }
        Filter::AnyEq { array, field, value } => {
            args.push(json_path(array));
            args.push(json_path(field));
            args.push(to_sql(value));
            "EXISTS (SELECT 1 FROM json_each(body, ?) AS item WHERE json_extract(item.value, ?) = ?)"
                .to_string()
        }
        Filter::And(parts) => join(parts, " AND ", "1", args),
        Filter::Or(parts) => join(parts, " OR ", "0", args),
    }
}

fn join(parts: &[Filter], sep: &str, empty: &str, args: &mut Vec<SqlValue>) -> String {
    if parts.is_empty() {
        return empty.to_string();
    }
    let clauses: Vec<String> = parts.iter().map(|p| compile(p, args)).collect();
    format!("({})", clauses.join(sep))
}
