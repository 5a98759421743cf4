//! The Merge Engine: the idempotent upsert algorithm (spec §4.6). One call merges
//! one CSV file into one table, inside the caller's transaction (the Orchestrator
//! wraps each call in a savepoint so a single file's failure doesn't poison the
//! whole run).

use sqlx::{Postgres, Transaction};
use std::path::Path;

use crate::catalog::utils::quote_ident;
use crate::catalog::{Catalog, Table};
use crate::config::TablesConfig;
use crate::constants::{STAGING_FINAL_PREFIX, STAGING_RAW_PREFIX};
use crate::db::copy::copy_in_from_file;
use crate::error::{PgmergeError, Result};
use crate::resolver::{export_rewrite, export_select_sql, import_rewrite};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub skip: u64,
    pub insert: u64,
    pub update: u64,
    pub total: u64,
}

impl MergeStats {
    /// `skip + insert + update == total` must hold for any successful merge (spec §3).
    pub fn is_consistent(&self) -> bool {
        self.skip + self.insert + self.update == self.total
    }

    pub fn accumulate(&mut self, other: &MergeStats) {
        self.skip += other.skip;
        self.insert += other.insert;
        self.update += other.update;
        self.total += other.total;
    }
}

/// The resolved parameters for merging one CSV file into one table: the effective
/// column subset and identifier columns (spec §4.6 "Inputs").
pub struct MergeRequest<'a> {
    pub table: &'a Table,
    pub catalog: &'a Catalog,
    pub config: &'a TablesConfig,
    pub columns: Vec<String>,
    pub alternate_key: Option<Vec<String>>,
    pub csv_path: &'a Path,
}

/// Identifier columns used for matching during merge: the alternate key if
/// configured, otherwise the primary key (spec §GLOSSARY "Identifier columns").
fn identifier_columns(request: &MergeRequest<'_>) -> Vec<String> {
    if let Some(ak) = &request.alternate_key {
        ak.clone()
    } else {
        request
            .table
            .primary_key
            .as_ref()
            .map(|pk| pk.columns.clone())
            .unwrap_or_default()
    }
}

fn check_preconditions(request: &MergeRequest<'_>) -> Result<Vec<String>> {
    let id_columns = identifier_columns(request);
    if id_columns.is_empty() {
        return Err(PgmergeError::UnsupportedSchema(
            "Table has no primary key or unique columns!".to_string(),
        ));
    }

    let all_columns = request.table.column_names();
    let unknown: Vec<&String> = request
        .columns
        .iter()
        .filter(|c| !all_columns.contains(c))
        .collect();
    if !unknown.is_empty() {
        return Err(PgmergeError::InputParameters(format!(
            "Columns provided do not exist in table '{}': {}",
            request.table.name,
            unknown.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        )));
    }

    let missing_id: Vec<&String> = id_columns
        .iter()
        .filter(|c| !request.columns.contains(c))
        .collect();
    if !missing_id.is_empty() {
        return Err(PgmergeError::InputParameters(format!(
            "Columns provided do not include required id columns for table '{}': {}",
            request.table.name,
            missing_id.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        )));
    }

    Ok(id_columns)
}

/// NULL-safe equality over every column in `columns`, used both to delete rows
/// already identical and to delete the rows just inserted (spec §4.6 steps 5/7, §9).
fn sql_delete_identical(delete_table: &str, reference_table: &str, columns: &[String]) -> String {
    let where_clause = columns
        .iter()
        .map(|col| {
            let col = quote_ident(col);
            format!(
                "({reference_table}.{col} = {delete_table}.{col} OR ({reference_table}.{col} IS NULL AND {delete_table}.{col} IS NULL))"
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    format!("DELETE FROM {delete_table} USING {reference_table} WHERE {where_clause}")
}

/// Insert rows from `reference_table` that don't already exist in `insert_table`
/// (by identifier columns), preserving file order via `ROW_NUMBER() OVER ()` so
/// self-referential rows can reference earlier rows from the same file (spec §4.6
/// step 6, §9 "Self-referencing insert order").
fn sql_insert_missing(
    insert_table: &str,
    reference_table: &str,
    id_columns: &[String],
    columns: &[String],
) -> String {
    let insert_cols = id_columns
        .iter()
        .map(|c| format!("{insert_table}.{}", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let reference_cols = id_columns
        .iter()
        .map(|c| format!("_tft.{}", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let subselect = format!("SELECT ROW_NUMBER() OVER () AS __row_number, * FROM {reference_table}");
    let select_cols = columns
        .iter()
        .map(|c| format!("_tft.{}", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let columns_sql = columns.iter().map(|c| quote_ident(c).to_string()).collect::<Vec<_>>().join(", ");

    format!(
        "INSERT INTO {insert_table}({columns_sql}) \
         SELECT {select_cols} FROM ({subselect}) AS _tft \
         LEFT JOIN {insert_table} ON ({insert_cols}) = ({reference_cols}) \
         WHERE ({insert_cols}) IS NULL ORDER BY _tft.__row_number"
    )
}

fn sql_update_remaining(
    update_table: &str,
    reference_table: &str,
    id_columns: &[String],
    columns: &[String],
) -> String {
    let set_columns = columns
        .iter()
        .map(|c| format!("{col} = {reference_table}.{col}", col = quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let where_clause = id_columns
        .iter()
        .map(|c| {
            format!(
                "{update_table}.{col} = {reference_table}.{col}",
                col = quote_ident(c)
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    format!("UPDATE {update_table} SET {set_columns} FROM {reference_table} WHERE {where_clause}")
}

/// Run the full nine-step staged upsert for one file into one table (spec §4.6).
pub async fn merge_file(tx: &mut Transaction<'_, Postgres>, request: MergeRequest<'_>) -> Result<MergeStats> {
    let id_columns = check_preconditions(&request)?;

    let dest_table = format!(
        "{}.{}",
        quote_ident(&request.table.schema),
        quote_ident(&request.table.name)
    );
    let staging_raw = format!("{STAGING_RAW_PREFIX}{}", request.table.name);
    let staging_final = format!("{STAGING_FINAL_PREFIX}{}", request.table.name);

    let paths = export_rewrite(request.table, &request.columns, request.config)?;

    // Step 1: stage raw CSV shape.
    let raw_select = export_select_sql(request.table, &paths, request.catalog, request.config)?;
    sqlx::query(&format!(
        "CREATE TEMP TABLE {staging_raw} AS {} LIMIT 0",
        raw_select.select_sql()
    ))
    .execute(&mut **tx)
    .await?;

    // Step 2: load. COPY's row count (the "COPY n" command tag) already excludes
    // the header line, so it's exactly the CSV's data row count.
    let copy_sql = format!("COPY {staging_raw} FROM STDIN WITH (FORMAT CSV, HEADER, ENCODING 'UTF8')");
    let total = copy_in_from_file(&mut **tx, &copy_sql, request.csv_path).await?;

    // Step 3: analyze.
    sqlx::query(&format!("ANALYZE {staging_raw}")).execute(&mut **tx).await?;

    // Step 4: translate into destination shape.
    let import_plan = import_rewrite(request.table, &paths, &staging_raw, request.catalog, request.config)?;
    sqlx::query(&format!("CREATE TEMP TABLE {staging_final} AS {}", import_plan.select_sql))
        .execute(&mut **tx)
        .await?;
    let index_cols = id_columns
        .iter()
        .map(|c| quote_ident(c).to_string())
        .collect::<Vec<_>>()
        .join(", ");
    sqlx::query(&format!("CREATE INDEX ON {staging_final} ({index_cols})"))
        .execute(&mut **tx)
        .await?;

    // Step 5: diff-out identical.
    let delete_sql = sql_delete_identical(&staging_final, &dest_table, &request.columns);
    let skip = sqlx::query(&delete_sql).execute(&mut **tx).await?.rows_affected();

    // Step 6: insert missing.
    let insert_sql = sql_insert_missing(&dest_table, &staging_final, &id_columns, &request.columns);
    let insert = sqlx::query(&insert_sql).execute(&mut **tx).await?.rows_affected();

    // Step 7: diff-out just-inserted.
    sqlx::query(&delete_sql).execute(&mut **tx).await?;

    // Step 8: update remaining.
    let update_sql = sql_update_remaining(&dest_table, &staging_final, &id_columns, &request.columns);
    let update = sqlx::query(&update_sql).execute(&mut **tx).await?.rows_affected();

    // Step 9: clean up.
    sqlx::query(&format!("DROP TABLE {staging_raw}")).execute(&mut **tx).await?;
    sqlx::query(&format!("DROP TABLE {staging_final}")).execute(&mut **tx).await?;
    sqlx::query(&format!("ANALYZE {dest_table}")).execute(&mut **tx).await?;

    Ok(MergeStats { skip, insert, update, total })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_identical_uses_null_safe_equality() {
        let sql = sql_delete_identical("staging_final", "dest", &["code".to_string()]);
        assert!(sql.contains("OR (dest.\"code\" IS NULL AND staging_final.\"code\" IS NULL)"));
    }

    #[test]
    fn insert_missing_preserves_file_order() {
        let sql = sql_insert_missing("dest", "staging_final", &["id".to_string()], &["id".to_string(), "name".to_string()]);
        assert!(sql.contains("ROW_NUMBER() OVER ()"));
        assert!(sql.contains("ORDER BY _tft.__row_number"));
    }

    #[test]
    fn update_remaining_sets_every_column() {
        let sql = sql_update_remaining("dest", "staging_final", &["id".to_string()], &["id".to_string(), "name".to_string()]);
        assert!(sql.contains("SET \"id\" = staging_final.\"id\", \"name\" = staging_final.\"name\""));
    }

    #[test]
    fn merge_stats_consistency() {
        let stats = MergeStats { skip: 1, insert: 2, update: 3, total: 6 };
        assert!(stats.is_consistent());
        let bad = MergeStats { skip: 1, insert: 2, update: 3, total: 7 };
        assert!(!bad.is_consistent());
    }
}
