//! Table definitions and DDL assembly.
//!
//! Applications declare their tables explicitly and register them in a
//! [`ModelRegistry`]; the managers use the registry to create a fresh schema
//! (and to know which columns a row has). Registration order is creation
//! order; tables are dropped in reverse.

use crate::naming;

/// Quote identifier (safe: only from declarations).
pub(crate) fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// One column of a declared table.
#[derive(Clone, Debug)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

impl ColumnDef {
    /// A NOT NULL column with no default.
    pub fn new(name: &str, sql_type: &str) -> Self {
        ColumnDef {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            nullable: false,
            default: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Raw SQL default expression, e.g. `now()` or `0`.
    pub fn default_expr(mut self, expression: &str) -> Self {
        self.default = Some(expression.to_string());
        self
    }
}

#[derive(Clone, Debug)]
pub struct CheckDef {
    pub name: String,
    pub expression: String,
}

#[derive(Clone, Debug)]
pub struct ForeignKeyDef {
    pub column: String,
    pub referred_table: String,
    pub referred_column: String,
    pub on_delete: Option<String>,
}

#[derive(Clone, Debug)]
pub struct IndexDef {
    pub column: String,
    pub unique: bool,
}

/// A declared table: columns, primary key, constraints, and indexes.
///
/// ```
/// use sqlx_helpers::{ColumnDef, TableDef};
///
/// let users = TableDef::new("users")
///     .column(ColumnDef::new("id", "INTEGER"))
///     .column(ColumnDef::new("name", "TEXT"))
///     .column(ColumnDef::new("full_name", "TEXT").nullable())
///     .primary_key(&["id"])
///     .unique(&["name"]);
/// assert!(users.create_sql().contains("uq_users_name"));
/// ```
#[derive(Clone, Debug)]
pub struct TableDef {
    name: String,
    columns: Vec<ColumnDef>,
    primary_key: Vec<String>,
    uniques: Vec<Vec<String>>,
    checks: Vec<CheckDef>,
    foreign_keys: Vec<ForeignKeyDef>,
    indexes: Vec<IndexDef>,
}

impl TableDef {
    pub fn new(name: &str) -> Self {
        TableDef {
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            uniques: Vec::new(),
            checks: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn unique(mut self, columns: &[&str]) -> Self {
        self.uniques
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn check(mut self, constraint: &str, expression: &str) -> Self {
        self.checks.push(CheckDef {
            name: constraint.to_string(),
            expression: expression.to_string(),
        });
        self
    }

    pub fn foreign_key(mut self, column: &str, referred_table: &str, referred_column: &str) -> Self {
        self.foreign_keys.push(ForeignKeyDef {
            column: column.to_string(),
            referred_table: referred_table.to_string(),
            referred_column: referred_column.to_string(),
            on_delete: None,
        });
        self
    }

    pub fn foreign_key_on_delete(
        mut self,
        column: &str,
        referred_table: &str,
        referred_column: &str,
        on_delete: &str,
    ) -> Self {
        self.foreign_keys.push(ForeignKeyDef {
            column: column.to_string(),
            referred_table: referred_table.to_string(),
            referred_column: referred_column.to_string(),
            on_delete: Some(on_delete.to_string()),
        });
        self
    }

    pub fn index(mut self, column: &str) -> Self {
        self.indexes.push(IndexDef {
            column: column.to_string(),
            unique: false,
        });
        self
    }

    pub fn unique_index(mut self, column: &str) -> Self {
        self.indexes.push(IndexDef {
            column: column.to_string(),
            unique: true,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn primary_key_columns(&self) -> &[String] {
        &self.primary_key
    }

    /// The single primary-key column, for the row helpers. Composite keys are
    /// supported in DDL but not by the by-pk lookups.
    pub(crate) fn single_pk(&self) -> Result<&str, crate::error::DbError> {
        match self.primary_key.as_slice() {
            [pk] => Ok(pk.as_str()),
            [] => Err(crate::error::DbError::Validation(format!(
                "table {} has no primary key",
                self.name
            ))),
            _ => Err(crate::error::DbError::Validation(format!(
                "table {} has a composite primary key",
                self.name
            ))),
        }
    }

    pub(crate) fn quoted_name(&self) -> String {
        quoted(&self.name)
    }

    /// CREATE TABLE IF NOT EXISTS with named constraints. Foreign keys are
    /// inline so the same statement works on engines without ALTER ADD
    /// CONSTRAINT.
    pub fn create_sql(&self) -> String {
        let mut defs: Vec<String> = Vec::new();
        for c in &self.columns {
            let mut def = format!("{} {}", quoted(&c.name), c.sql_type);
            if !c.nullable {
                def.push_str(" NOT NULL");
            }
            if let Some(ref d) = c.default {
                def.push_str(" DEFAULT ");
                def.push_str(d);
            }
            defs.push(def);
        }

        if !self.primary_key.is_empty() {
            let cols: Vec<String> = self.primary_key.iter().map(|c| quoted(c)).collect();
            defs.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                quoted(&naming::primary_key_name(&self.name)),
                cols.join(", ")
            ));
        }

        for u in &self.uniques {
            let cols: Vec<String> = u.iter().map(|c| quoted(c)).collect();
            defs.push(format!(
                "CONSTRAINT {} UNIQUE ({})",
                quoted(&naming::unique_name(&self.name, &u[0])),
                cols.join(", ")
            ));
        }

        for ch in &self.checks {
            defs.push(format!(
                "CONSTRAINT {} CHECK ({})",
                quoted(&naming::check_name(&self.name, &ch.name)),
                ch.expression
            ));
        }

        for fk in &self.foreign_keys {
            let mut def = format!(
                "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                quoted(&naming::foreign_key_name(
                    &self.name,
                    &fk.column,
                    &fk.referred_table
                )),
                quoted(&fk.column),
                quoted(&fk.referred_table),
                quoted(&fk.referred_column)
            );
            if let Some(ref action) = fk.on_delete {
                def.push_str(" ON DELETE ");
                def.push_str(action);
            }
            defs.push(def);
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            self.quoted_name(),
            defs.join(",\n  ")
        )
    }

    /// CREATE INDEX IF NOT EXISTS statements for the declared indexes.
    pub fn index_sql(&self) -> Vec<String> {
        self.indexes
            .iter()
            .map(|idx| {
                let unique = if idx.unique { "UNIQUE " } else { "" };
                format!(
                    "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
                    unique,
                    quoted(&naming::index_name(&self.name, &idx.column)),
                    self.quoted_name(),
                    quoted(&idx.column)
                )
            })
            .collect()
    }

    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quoted_name())
    }
}

/// The application's declared tables, in creation order.
#[derive(Clone, Debug, Default)]
pub struct ModelRegistry {
    tables: Vec<TableDef>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        ModelRegistry { tables: Vec::new() }
    }

    pub fn register(&mut self, table: TableDef) {
        self.tables.push(table);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, table: TableDef) -> Self {
        self.tables.push(table);
        self
    }

    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    pub fn get(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableDef {
        TableDef::new("users")
            .column(ColumnDef::new("id", "INTEGER"))
            .column(ColumnDef::new("name", "TEXT"))
            .column(ColumnDef::new("full_name", "TEXT").nullable())
            .primary_key(&["id"])
            .unique(&["name"])
    }

    #[test]
    fn create_sql_names_constraints() {
        let sql = users().create_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"users\""));
        assert!(sql.contains("\"id\" INTEGER NOT NULL"));
        assert!(sql.contains("\"full_name\" TEXT,"));
        assert!(sql.contains("CONSTRAINT \"pk_users\" PRIMARY KEY (\"id\")"));
        assert!(sql.contains("CONSTRAINT \"uq_users_name\" UNIQUE (\"name\")"));
    }

    #[test]
    fn create_sql_inlines_foreign_keys() {
        let posts = TableDef::new("posts")
            .column(ColumnDef::new("id", "INTEGER"))
            .column(ColumnDef::new("author_id", "INTEGER"))
            .primary_key(&["id"])
            .foreign_key_on_delete("author_id", "users", "id", "CASCADE");
        let sql = posts.create_sql();
        assert!(sql.contains(
            "CONSTRAINT \"fk_posts_author_id_users\" FOREIGN KEY (\"author_id\") \
             REFERENCES \"users\" (\"id\") ON DELETE CASCADE"
        ));
    }

    #[test]
    fn check_constraints_are_named() {
        let t = TableDef::new("items")
            .column(ColumnDef::new("qty", "INTEGER"))
            .check("qty_positive", "qty > 0");
        assert!(t
            .create_sql()
            .contains("CONSTRAINT \"ck_items_qty_positive\" CHECK (qty > 0)"));
    }

    #[test]
    fn index_sql_uses_templates() {
        let t = TableDef::new("users")
            .column(ColumnDef::new("email", "TEXT"))
            .index("email");
        assert_eq!(
            t.index_sql(),
            vec!["CREATE INDEX IF NOT EXISTS \"ix_users_email\" ON \"users\" (\"email\")".to_string()]
        );
    }

    #[test]
    fn column_defaults_are_rendered() {
        let t = TableDef::new("events")
            .column(ColumnDef::new("at", "TIMESTAMPTZ").default_expr("now()"));
        assert!(t.create_sql().contains("\"at\" TIMESTAMPTZ NOT NULL DEFAULT now()"));
    }

    #[test]
    fn registry_preserves_order_and_lookup() {
        let reg = ModelRegistry::new()
            .with(users())
            .with(TableDef::new("posts").column(ColumnDef::new("id", "INTEGER")));
        assert_eq!(reg.tables().len(), 2);
        assert_eq!(reg.tables()[0].name(), "users");
        assert!(reg.get("posts").is_some());
        assert!(reg.get("missing").is_none());
    }

    #[test]
    fn single_pk_rejects_composite_and_missing() {
        assert!(users().single_pk().is_ok());
        let none = TableDef::new("t").column(ColumnDef::new("a", "TEXT"));
        assert!(none.single_pk().is_err());
        let composite = TableDef::new("t")
            .column(ColumnDef::new("a", "TEXT"))
            .column(ColumnDef::new("b", "TEXT"))
            .primary_key(&["a", "b"]);
        assert!(composite.single_pk().is_err());
    }
}
