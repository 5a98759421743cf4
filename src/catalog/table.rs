//! Tables and columns, fetched from `pg_catalog`. Mirrors the teacher's
//! `fetch_table_columns`/`populate_primary_keys` split, narrowed to the data model
//! spec §3/§4.1 needs: no generated-column dependency tracking, no extension/type
//! resolution, just name/type/nullability/default.

use itertools::Itertools;
use sqlx::postgres::PgConnection;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default_expression: Option<String>,
}

impl Column {
    /// A column can be omitted from an export/import column subset: nullable
    /// columns or columns with a server-side default (spec §3).
    pub fn is_skippable(&self) -> bool {
        self.nullable || self.default_expression.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKey {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Table {
    pub schema: String,
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: Option<PrimaryKey>,
    pub unique_constraints: Vec<super::constraint::UniqueConstraint>,
    pub foreign_keys: Vec<super::constraint::ForeignKey>,
}

impl Table {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The identifier column set used for matching during merge: the alternate
    /// key if configured by the caller, otherwise the primary key (spec §4.6,
    /// §GLOSSARY "Identifier columns").
    pub fn has_identifier(&self) -> bool {
        self.primary_key.is_some() || !self.unique_constraints.is_empty()
    }
}

async fn list_table_names(conn: &mut PgConnection, schema: &str) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT c.relname
        FROM pg_class c
        JOIN pg_namespace n ON c.relnamespace = n.oid
        WHERE c.relkind = 'r' AND n.nspname = $1
        ORDER BY c.relname
        "#,
    )
    .bind(schema)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

pub async fn list_tables(conn: &mut PgConnection, schema: &str) -> Result<Vec<String>> {
    list_table_names(conn, schema).await
}

pub async fn table_exists(conn: &mut PgConnection, schema: &str, table: &str) -> Result<bool> {
    let row: (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM pg_class c
            JOIN pg_namespace n ON c.relnamespace = n.oid
            WHERE c.relkind = 'r' AND n.nspname = $1 AND c.relname = $2
        )
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.0)
}

#[derive(Debug)]
struct ColumnRow {
    table_name: String,
    column_name: String,
    data_type: String,
    not_null: bool,
    column_expr: Option<String>,
}

async fn fetch_all_columns(conn: &mut PgConnection, schema: &str) -> Result<Vec<ColumnRow>> {
    let rows = sqlx::query!(
        r#"
        SELECT
            c.relname AS "table_name!",
            a.attname AS "column_name!",
            pg_catalog.format_type(a.atttypid, a.atttypmod) AS "data_type!",
            a.attnotnull AS "not_null!",
            pg_catalog.pg_get_expr(ad.adbin, ad.adrelid) AS column_expr
        FROM pg_attribute a
        JOIN pg_class c ON a.attrelid = c.oid
        JOIN pg_namespace n ON c.relnamespace = n.oid
        LEFT JOIN pg_attrdef ad ON a.attrelid = ad.adrelid AND a.attnum = ad.adnum
        WHERE a.attnum > 0
          AND NOT a.attisdropped
          AND c.relkind = 'r'
          AND n.nspname = $1
        ORDER BY c.relname, a.attnum
        "#,
        schema
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| ColumnRow {
            table_name: r.table_name,
            column_name: r.column_name,
            data_type: r.data_type,
            not_null: r.not_null,
            column_expr: r.column_expr,
        })
        .collect())
}

/// Ordered columns for one table (spec §4.1 `columns(schema, table)`).
pub async fn columns(conn: &mut PgConnection, schema: &str, table: &str) -> Result<Vec<Column>> {
    let rows = sqlx::query!(
        r#"
        SELECT
            a.attname AS "column_name!",
            pg_catalog.format_type(a.atttypid, a.atttypmod) AS "data_type!",
            a.attnotnull AS "not_null!",
            pg_catalog.pg_get_expr(ad.adbin, ad.adrelid) AS column_expr
        FROM pg_attribute a
        JOIN pg_class c ON a.attrelid = c.oid
        JOIN pg_namespace n ON c.relnamespace = n.oid
        LEFT JOIN pg_attrdef ad ON a.attrelid = ad.adrelid AND a.attnum = ad.adnum
        WHERE a.attnum > 0
          AND NOT a.attisdropped
          AND c.relkind = 'r'
          AND n.nspname = $1
          AND c.relname = $2
        ORDER BY a.attnum
        "#,
        schema,
        table
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Column {
            name: r.column_name,
            data_type: r.data_type,
            nullable: !r.not_null,
            default_expression: r.column_expr,
        })
        .collect())
}

/// Primary key for one table, if any (spec §4.1 `primary_key(schema, table)`).
pub async fn primary_key(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<Option<PrimaryKey>> {
    let row = sqlx::query!(
        r#"
        SELECT
            c.conname AS "name!",
            array_agg(a.attname ORDER BY array_position(c.conkey, a.attnum)) AS "columns!"
        FROM pg_constraint c
        JOIN pg_class cl ON c.conrelid = cl.oid
        JOIN pg_namespace n ON cl.relnamespace = n.oid
        JOIN pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = ANY(c.conkey)
        WHERE c.contype = 'p' AND n.nspname = $1 AND cl.relname = $2
        GROUP BY c.conname
        "#,
        schema,
        table
    )
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|r| PrimaryKey {
        name: r.name,
        columns: r.columns,
    }))
}

fn initialize_tables(names: Vec<String>, schema: &str) -> Vec<Table> {
    names
        .into_iter()
        .map(|name| Table {
            schema: schema.to_string(),
            name,
            columns: Vec::new(),
            primary_key: None,
            unique_constraints: Vec::new(),
            foreign_keys: Vec::new(),
        })
        .collect()
}

fn populate_columns(tables: &mut [Table], rows: Vec<ColumnRow>) {
    let by_name: std::collections::BTreeMap<&str, usize> = tables
        .iter()
        .enumerate()
        .map(|(i, t)| (t.name.as_str(), i))
        .collect();

    for (table_name, group) in &rows.into_iter().chunk_by(|r| r.table_name.clone()) {
        let Some(&idx) = by_name.get(table_name.as_str()) else {
            continue;
        };
        tables[idx].columns = group
            .map(|r| Column {
                name: r.column_name,
                data_type: r.data_type,
                nullable: !r.not_null,
                default_expression: r.column_expr,
            })
            .collect();
    }
}

/// Fetch every table in `schema` with columns, primary key, unique constraints and
/// foreign keys populated, as `Catalog::load` needs.
pub async fn fetch(conn: &mut PgConnection, schema: &str) -> Result<Vec<Table>> {
    tracing::info!(schema, "fetching tables");
    let names = list_table_names(conn, schema).await?;
    let mut tables = initialize_tables(names, schema);

    tracing::debug!("fetching columns");
    let column_rows = fetch_all_columns(conn, schema).await?;
    populate_columns(&mut tables, column_rows);

    tracing::debug!("fetching primary keys");
    for table in &mut tables {
        table.primary_key = primary_key(conn, schema, &table.name).await?;
    }

    tracing::debug!("fetching unique constraints and foreign keys");
    let constraints = super::constraint::fetch(conn, schema).await?;
    for table in &mut tables {
        table.unique_constraints = constraints
            .unique
            .iter()
            .filter(|u| u.table == table.name)
            .cloned()
            .collect();
        table.foreign_keys = constraints
            .foreign
            .iter()
            .filter(|f| f.table == table.name)
            .cloned()
            .collect();
    }

    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_column(name: &str, nullable: bool, default: Option<&str>) -> Column {
        Column {
            name: name.to_string(),
            data_type: "text".to_string(),
            nullable,
            default_expression: default.map(str::to_string),
        }
    }

    #[test]
    fn skippable_requires_nullable_or_default() {
        assert!(make_column("a", true, None).is_skippable());
        assert!(make_column("a", false, Some("0")).is_skippable());
        assert!(!make_column("a", false, None).is_skippable());
    }

    #[test]
    fn has_identifier_via_pk_or_unique() {
        let mut table = Table {
            schema: "public".into(),
            name: "t".into(),
            columns: vec![],
            primary_key: None,
            unique_constraints: vec![],
            foreign_keys: vec![],
        };
        assert!(!table.has_identifier());

        table.primary_key = Some(PrimaryKey {
            name: "t_pkey".into(),
            columns: vec!["id".into()],
        });
        assert!(table.has_identifier());
    }
}
