//! The Exporter: one `COPY (SELECT ...) TO STDOUT` per table (or subset), streamed
//! to a CSV file in the output directory (spec §4.5).

use sqlx::postgres::PgConnection;
use std::path::Path;

use crate::catalog::utils::quote_ident;
use crate::catalog::{Catalog, Table};
use crate::config::{EffectiveConfig, TablesConfig};
use crate::db::copy::copy_out_to_file;
use crate::error::Result;
use crate::resolver::{export_rewrite, export_select_sql};

/// The identifier column set (PK, else first unique constraint) restricted to the
/// columns actually being exported, used to produce a stable `ORDER BY` so repeat
/// exports diff cleanly (spec §4.5).
fn order_by_columns(table: &Table, exported: &[String]) -> Vec<String> {
    let candidates: Vec<String> = if let Some(pk) = &table.primary_key {
        pk.columns.clone()
    } else if let Some(uc) = table.unique_constraints.first() {
        uc.columns.clone()
    } else {
        Vec::new()
    };
    candidates.into_iter().filter(|c| exported.contains(c)).collect()
}

/// Export one table or subset to `<out_dir>/<file_stem>.csv`. Returns the number of
/// bytes written (for logging; row counts aren't reported by `COPY TO`).
pub async fn export_table(
    conn: &mut PgConnection,
    table: &Table,
    catalog: &Catalog,
    config: &TablesConfig,
    effective: &EffectiveConfig,
    out_dir: &Path,
) -> Result<u64> {
    let columns = effective.columns.clone().unwrap_or_else(|| table.column_names());
    let paths = export_rewrite(table, &columns, config)?;
    let select = export_select_sql(table, &paths, catalog, config)?;

    let mut sql = select.select_sql();
    if let Some(where_clause) = &effective.where_clause {
        sql.push_str(" WHERE ");
        sql.push_str(where_clause);
    }
    let order_cols = order_by_columns(table, &columns);
    if !order_cols.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(
            &order_cols
                .iter()
                .map(|c| quote_ident(c).to_string())
                .collect::<Vec<_>>()
                .join(", "),
        );
    }

    let copy_sql = format!("COPY ({sql}) TO STDOUT WITH (FORMAT CSV, HEADER, ENCODING 'UTF8')");
    let dest = out_dir.join(format!("{}.csv", effective.file_stem));
    copy_out_to_file(conn, &copy_sql, &dest).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::table::{Column, PrimaryKey};

    fn table() -> Table {
        Table {
            schema: "public".into(),
            name: "country".into(),
            columns: vec![
                Column { name: "code".into(), data_type: "character(2)".into(), nullable: false, default_expression: None },
                Column { name: "name".into(), data_type: "text".into(), nullable: false, default_expression: None },
            ],
            primary_key: Some(PrimaryKey { name: "country_pkey".into(), columns: vec!["code".into()] }),
            unique_constraints: vec![],
            foreign_keys: vec![],
        }
    }

    #[test]
    fn order_by_restricted_to_exported_columns() {
        let t = table();
        assert_eq!(order_by_columns(&t, &["code".to_string(), "name".to_string()]), vec!["code".to_string()]);
        assert!(order_by_columns(&t, &["name".to_string()]).is_empty());
    }
}
