//! Unique constraints and foreign keys, fetched from `pg_constraint`. Column order
//! within each constraint is preserved via `array_position(conkey, attnum)`, matching
//! the teacher's `catalog/constraint.rs` ordering trick.

use sqlx::postgres::PgConnection;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraint {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: String,
    pub name: String,
    pub local_columns: Vec<String>,
    pub referred_schema: String,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
    pub on_delete: Option<String>,
    pub on_update: Option<String>,
}

pub struct Constraints {
    pub unique: Vec<UniqueConstraint>,
    pub foreign: Vec<ForeignKey>,
}

struct ConstraintRow {
    table_name: String,
    constraint_name: String,
    constraint_type: String,
    column_names: Vec<String>,
    foreign_schema: Option<String>,
    foreign_table: Option<String>,
    foreign_columns: Option<Vec<String>>,
    on_delete: Option<String>,
    on_update: Option<String>,
}

async fn fetch_rows(conn: &mut PgConnection, schema: &str) -> Result<Vec<ConstraintRow>> {
    let rows = sqlx::query!(
        r#"
        SELECT
            cl.relname AS "table_name!",
            c.conname AS "constraint_name!",
            c.contype::text AS "constraint_type!",
            ARRAY(
                SELECT a.attname
                FROM pg_attribute a
                WHERE a.attrelid = c.conrelid AND a.attnum = ANY(c.conkey)
                ORDER BY array_position(c.conkey, a.attnum)
            ) AS "column_names!",
            fn.nspname AS "foreign_schema?",
            fcl.relname AS "foreign_table?",
            CASE
                WHEN c.contype = 'f' THEN
                    ARRAY(
                        SELECT a.attname
                        FROM pg_attribute a
                        WHERE a.attrelid = c.confrelid AND a.attnum = ANY(c.confkey)
                        ORDER BY array_position(c.confkey, a.attnum)
                    )
                ELSE NULL
            END AS "foreign_columns?",
            CASE c.confdeltype
                WHEN 'r' THEN 'RESTRICT' WHEN 'c' THEN 'CASCADE'
                WHEN 'n' THEN 'SET NULL' WHEN 'd' THEN 'SET DEFAULT'
                ELSE NULL
            END AS "on_delete?",
            CASE c.confupdtype
                WHEN 'r' THEN 'RESTRICT' WHEN 'c' THEN 'CASCADE'
                WHEN 'n' THEN 'SET NULL' WHEN 'd' THEN 'SET DEFAULT'
                ELSE NULL
            END AS "on_update?"
        FROM pg_constraint c
        JOIN pg_class cl ON c.conrelid = cl.oid
        JOIN pg_namespace n ON cl.relnamespace = n.oid
        LEFT JOIN pg_class fcl ON c.confrelid = fcl.oid
        LEFT JOIN pg_namespace fn ON fcl.relnamespace = fn.oid
        WHERE n.nspname = $1
          AND cl.relkind = 'r'
          AND c.contype IN ('u', 'f')
        ORDER BY cl.relname, c.conname
        "#,
        schema
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| ConstraintRow {
            table_name: r.table_name,
            constraint_name: r.constraint_name,
            constraint_type: r.constraint_type,
            column_names: r.column_names,
            foreign_schema: r.foreign_schema,
            foreign_table: r.foreign_table,
            foreign_columns: r.foreign_columns,
            on_delete: r.on_delete,
            on_update: r.on_update,
        })
        .collect())
}

/// All unique constraints and foreign keys for every table in `schema`.
///
/// Foreign keys whose referent lives outside `schema` are still returned here (the
/// Dependency Graph is responsible for dropping edges outside the working table set,
/// per spec §4.2); this layer only rejects a referent that isn't queryable at all.
pub async fn fetch(conn: &mut PgConnection, schema: &str) -> Result<Constraints> {
    let rows = fetch_rows(conn, schema).await?;

    let mut unique = Vec::new();
    let mut foreign = Vec::new();

    for row in rows {
        match row.constraint_type.as_str() {
            "u" => unique.push(UniqueConstraint {
                table: row.table_name,
                name: row.constraint_name,
                columns: row.column_names,
            }),
            "f" => foreign.push(ForeignKey {
                table: row.table_name,
                name: row.constraint_name,
                local_columns: row.column_names,
                referred_schema: row.foreign_schema.unwrap_or_default(),
                referred_table: row.foreign_table.unwrap_or_default(),
                referred_columns: row.foreign_columns.unwrap_or_default(),
                on_delete: row.on_delete,
                on_update: row.on_update,
            }),
            _ => {}
        }
    }

    Ok(Constraints { unique, foreign })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_key_column_pairing_invariant() {
        let fk = ForeignKey {
            table: "orders".into(),
            name: "orders_customer_fkey".into(),
            local_columns: vec!["customer_id".into()],
            referred_schema: "public".into(),
            referred_table: "customers".into(),
            referred_columns: vec!["id".into()],
            on_delete: None,
            on_update: None,
        };
        assert_eq!(fk.local_columns.len(), fk.referred_columns.len());
    }
}
