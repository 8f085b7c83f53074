//! Parameterized SQL assembly for the row helpers, plus JSON-to-bind-value
//! conversion for both engines. Statements use `$n` placeholders, which both
//! PostgreSQL and SQLite accept.

use crate::error::DbError;
use crate::schema::{quoted, TableDef};
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::sqlite::Sqlite;
use sqlx::Database;

pub(crate) struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

/// SELECT list: every declared column, in declaration order.
fn column_list(table: &TableDef) -> String {
    table
        .column_names()
        .map(quoted)
        .collect::<Vec<_>>()
        .join(", ")
}

fn where_clause(lookup: &[(&str, Value)], first_param: usize) -> (String, Vec<Value>) {
    let mut conds = Vec::with_capacity(lookup.len());
    let mut params = Vec::with_capacity(lookup.len());
    for (i, (col, value)) in lookup.iter().enumerate() {
        conds.push(format!("{} = ${}", quoted(col), first_param + i));
        params.push(value.clone());
    }
    (conds.join(" AND "), params)
}

/// SELECT matching `lookup`, LIMIT 2 so the caller can tell "one" from
/// "more than one" without scanning the table.
pub(crate) fn select_one(table: &TableDef, lookup: &[(&str, Value)]) -> Result<QueryBuf, DbError> {
    if lookup.is_empty() {
        return Err(DbError::Validation("lookup fields must not be empty".into()));
    }
    let (conds, params) = where_clause(lookup, 1);
    Ok(QueryBuf {
        sql: format!(
            "SELECT {} FROM {} WHERE {} LIMIT 2",
            column_list(table),
            table.quoted_name(),
            conds
        ),
        params,
    })
}

/// SELECT by single-column primary key.
pub(crate) fn select_by_pk(table: &TableDef, pk: &Value) -> Result<QueryBuf, DbError> {
    let pk_col = table.single_pk()?;
    Ok(QueryBuf {
        sql: format!(
            "SELECT {} FROM {} WHERE {} = $1",
            column_list(table),
            table.quoted_name(),
            quoted(pk_col)
        ),
        params: vec![pk.clone()],
    })
}

/// INSERT the given columns, returning the full row.
pub(crate) fn insert(table: &TableDef, values: &[(&str, Value)]) -> Result<QueryBuf, DbError> {
    if values.is_empty() {
        return Err(DbError::Validation("insert fields must not be empty".into()));
    }
    let cols: Vec<String> = values.iter().map(|(c, _)| quoted(c)).collect();
    let placeholders: Vec<String> = (1..=values.len()).map(|n| format!("${}", n)).collect();
    let params: Vec<Value> = values.iter().map(|(_, v)| v.clone()).collect();
    Ok(QueryBuf {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table.quoted_name(),
            cols.join(", "),
            placeholders.join(", "),
            column_list(table)
        ),
        params,
    })
}

/// UPDATE by primary key, returning the full row.
pub(crate) fn update_by_pk(
    table: &TableDef,
    pk: &Value,
    updates: &[(&str, Value)],
) -> Result<QueryBuf, DbError> {
    if updates.is_empty() {
        return Err(DbError::Validation("update fields must not be empty".into()));
    }
    let pk_col = table.single_pk()?;
    let mut sets = Vec::with_capacity(updates.len());
    let mut params = Vec::with_capacity(updates.len() + 1);
    for (i, (col, value)) in updates.iter().enumerate() {
        sets.push(format!("{} = ${}", quoted(col), i + 1));
        params.push(value.clone());
    }
    params.push(pk.clone());
    Ok(QueryBuf {
        sql: format!(
            "UPDATE {} SET {} WHERE {} = ${} RETURNING {}",
            table.quoted_name(),
            sets.join(", "),
            quoted(pk_col),
            updates.len() + 1,
            column_list(table)
        ),
        params,
    })
}

/// A value that can be bound to a PostgreSQL query. Converts from serde_json::Value.
#[derive(Clone, Debug)]
pub(crate) enum PgBindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Uuid(uuid::Uuid),
    Json(Value),
}

impl PgBindValue {
    pub(crate) fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            Value::Bool(b) => PgBindValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    PgBindValue::I64(i)
                } else {
                    PgBindValue::F64(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => {
                if let Ok(u) = uuid::Uuid::parse_str(s) {
                    PgBindValue::Uuid(u)
                } else {
                    PgBindValue::String(s.clone())
                }
            }
            Value::Array(_) | Value::Object(_) => PgBindValue::Json(v.clone()),
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            PgBindValue::Null => <Option<i32> as Encode<Postgres>>::encode_by_ref(&None, buf)?,
            PgBindValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf)?,
            PgBindValue::I64(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::F64(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::String(s) => {
                let s_ref: &str = s.as_str();
                <&str as Encode<Postgres>>::encode_by_ref(&s_ref, buf)?
            }
            PgBindValue::Uuid(u) => {
                let u_str = u.to_string();
                <&str as Encode<Postgres>>::encode_by_ref(&u_str.as_str(), buf)?
            }
            PgBindValue::Json(v) => <Value as Encode<Postgres>>::encode_by_ref(v, buf)?,
        })
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}

/// A value that can be bound to a SQLite query. Converts from serde_json::Value.
#[derive(Clone, Debug)]
pub(crate) enum SqliteBindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
}

impl SqliteBindValue {
    pub(crate) fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => SqliteBindValue::Null,
            Value::Bool(b) => SqliteBindValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqliteBindValue::I64(i)
                } else {
                    SqliteBindValue::F64(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => SqliteBindValue::String(s.clone()),
            // Nested structures are stored as their JSON text.
            Value::Array(_) | Value::Object(_) => SqliteBindValue::String(v.to_string()),
        }
    }
}

impl<'q> Encode<'q, Sqlite> for SqliteBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Sqlite as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            SqliteBindValue::Null => <Option<i32> as Encode<Sqlite>>::encode_by_ref(&None, buf)?,
            SqliteBindValue::Bool(b) => <bool as Encode<Sqlite>>::encode_by_ref(b, buf)?,
            SqliteBindValue::I64(n) => <i64 as Encode<Sqlite>>::encode_by_ref(n, buf)?,
            SqliteBindValue::F64(n) => <f64 as Encode<Sqlite>>::encode_by_ref(n, buf)?,
            SqliteBindValue::String(s) => {
                <String as Encode<Sqlite>>::encode_by_ref(&s.clone(), buf)?
            }
        })
    }
}

impl sqlx::Type<Sqlite> for SqliteBindValue {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <&str as sqlx::Type<Sqlite>>::type_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDef;
    use serde_json::json;

    fn users() -> TableDef {
        TableDef::new("users")
            .column(ColumnDef::new("id", "INTEGER"))
            .column(ColumnDef::new("name", "TEXT"))
            .column(ColumnDef::new("full_name", "TEXT").nullable())
            .primary_key(&["id"])
            .unique(&["name"])
    }

    #[test]
    fn select_one_limits_to_two() {
        let q = select_one(&users(), &[("name", json!("alice"))]).unwrap();
        assert_eq!(
            q.sql,
            "SELECT \"id\", \"name\", \"full_name\" FROM \"users\" WHERE \"name\" = $1 LIMIT 2"
        );
        assert_eq!(q.params, vec![json!("alice")]);
    }

    #[test]
    fn select_one_rejects_empty_lookup() {
        assert!(select_one(&users(), &[]).is_err());
    }

    #[test]
    fn select_by_pk_uses_declared_pk() {
        let q = select_by_pk(&users(), &json!(7)).unwrap();
        assert!(q.sql.ends_with("WHERE \"id\" = $1"));
        assert_eq!(q.params, vec![json!(7)]);
    }

    #[test]
    fn insert_returns_declared_columns() {
        let q = insert(&users(), &[("name", json!("alice")), ("full_name", json!("Alice"))])
            .unwrap();
        assert_eq!(
            q.sql,
            "INSERT INTO \"users\" (\"name\", \"full_name\") VALUES ($1, $2) \
             RETURNING \"id\", \"name\", \"full_name\""
        );
        assert_eq!(q.params.len(), 2);
    }

    #[test]
    fn update_by_pk_places_pk_last() {
        let q = update_by_pk(&users(), &json!(7), &[("full_name", json!("Alice"))]).unwrap();
        assert_eq!(
            q.sql,
            "UPDATE \"users\" SET \"full_name\" = $1 WHERE \"id\" = $2 \
             RETURNING \"id\", \"name\", \"full_name\""
        );
        assert_eq!(q.params, vec![json!("Alice"), json!(7)]);
    }
}
