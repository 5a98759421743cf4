//! Column Path Resolver: translates between a table's real surrogate foreign-key
//! columns and the alternate-key columns of referenced tables (spec §4.4).
//!
//! `export_rewrite` decides *which* columns a query should project (collapsing an
//! FK's local columns down to its referent's alternate-key columns, when configured).
//! `export_select_sql`/`import_rewrite` turn that decision into the actual joined
//! `SELECT`, used respectively by the Exporter and by the Merge Engine's staging
//! steps (spec §4.6 steps 1 and 4).

use std::collections::HashMap;

use crate::catalog::{Catalog, Table};
use crate::catalog::utils::quote_ident;
use crate::config::TablesConfig;
use crate::error::{PgmergeError, Result};

/// `(column name or alias, foreign-key name path)`. An empty path is a local column;
/// a single-element path names the foreign key whose referent's alternate key this
/// column came from (spec §3 "Foreign-column path").
pub type ForeignColumnPath = (String, Vec<String>);

fn find_fk<'a>(table: &'a Table, fk_name: &str) -> Result<&'a crate::catalog::ForeignKey> {
    table
        .foreign_keys
        .iter()
        .find(|fk| fk.name == fk_name)
        .ok_or_else(|| PgmergeError::InputParameters(format!("unknown foreign key: {fk_name}")))
}

/// Plan which columns to project for `table`, given the ordered subset `columns`
/// to export/import. Any column that is part of an FK whose referent has a
/// configured `alternate_key` is replaced with one path entry per alternate-key
/// column, aliased `join_<fk>_<ak_column>`; the replacement happens at the first
/// replaced position, keeping overall column order (spec §4.4 "Export rewrite").
pub fn export_rewrite(
    table: &Table,
    columns: &[String],
    config: &TablesConfig,
) -> Result<Vec<ForeignColumnPath>> {
    let mut out = Vec::new();
    let mut consumed: HashMap<String, bool> = columns.iter().map(|c| (c.clone(), false)).collect();

    for col in columns {
        if *consumed.get(col).unwrap_or(&false) {
            continue;
        }

        let fk = table.foreign_keys.iter().find(|fk| fk.local_columns.contains(col));
        let alternate_key = fk.and_then(|fk| {
            config
                .get(&fk.referred_table)
                .and_then(|c| c.alternate_key.as_ref())
        });

        match (fk, alternate_key) {
            (Some(fk), Some(ak)) => {
                for local in &fk.local_columns {
                    consumed.insert(local.clone(), true);
                }
                for ak_col in ak {
                    out.push((format!("join_{}_{}", fk.name, ak_col), vec![fk.name.clone()]));
                }
            }
            _ => {
                consumed.insert(col.clone(), true);
                out.push((col.clone(), vec![]));
            }
        }
    }

    Ok(out)
}

/// The `SELECT` projection and `FROM`-clause (including any alternate-key joins)
/// that realizes an export-rewrite plan, shared by the Exporter (which appends
/// `WHERE`/`ORDER BY`) and the Merge Engine's staging-shape step (spec §4.5, §4.6
/// step 1).
pub struct ExportSelect {
    pub projection_sql: String,
    pub from_sql: String,
}

impl ExportSelect {
    pub fn select_sql(&self) -> String {
        format!("SELECT {} FROM {}", self.projection_sql, self.from_sql)
    }
}

pub fn export_select_sql(
    table: &Table,
    paths: &[ForeignColumnPath],
    catalog: &Catalog,
    config: &TablesConfig,
) -> Result<ExportSelect> {
    let table_ref = format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.name));
    let mut projections = Vec::new();
    let mut joins = Vec::new();
    let mut joined_fks: HashMap<String, ()> = HashMap::new();
    let mut position_in_group: HashMap<String, usize> = HashMap::new();

    for (alias, path) in paths {
        match path.len() {
            0 => {
                projections.push(format!(
                    "{table_ref}.{col} AS {alias}",
                    col = quote_ident(alias),
                    alias = quote_ident(alias)
                ));
            }
            1 => {
                let fk_name = &path[0];
                let fk = find_fk(table, fk_name)?;
                let referent = catalog.require_table(&fk.referred_table)?;
                let alternate_key = config
                    .get(&fk.referred_table)
                    .and_then(|c| c.alternate_key.as_ref())
                    .ok_or_else(|| {
                        PgmergeError::InputParameters(format!(
                            "no alternate_key configured for {}",
                            fk.referred_table
                        ))
                    })?;

                let join_alias = format!("join_{fk_name}");
                if joined_fks.insert(fk_name.clone(), ()).is_none() {
                    let on_clause = fk
                        .local_columns
                        .iter()
                        .zip(&fk.referred_columns)
                        .map(|(l, r)| {
                            format!(
                                "{table_ref}.{l} = {join_alias}.{r}",
                                l = quote_ident(l),
                                r = quote_ident(r)
                            )
                        })
                        .collect::<Vec<_>>()
                        .join(" AND ");
                    joins.push(format!(
                        "LEFT JOIN {schema}.{name} AS {join_alias} ON {on_clause}",
                        schema = quote_ident(&referent.schema),
                        name = quote_ident(&referent.name)
                    ));
                }

                let pos = position_in_group.entry(fk_name.clone()).or_insert(0);
                let ak_col = alternate_key.get(*pos).ok_or_else(|| {
                    PgmergeError::InputParameters(format!(
                        "alternate_key for {} has fewer columns than referenced",
                        fk.referred_table
                    ))
                })?;
                *pos += 1;

                projections.push(format!(
                    "{join_alias}.{ak_col} AS {alias}",
                    ak_col = quote_ident(ak_col),
                    alias = quote_ident(alias)
                ));
            }
            _ => {
                return Err(PgmergeError::InputParameters(format!(
                    "foreign-column paths of length >= 2 are not supported: {path:?}"
                )));
            }
        }
    }

    let mut from_sql = table_ref;
    if !joins.is_empty() {
        from_sql.push(' ');
        from_sql.push_str(&joins.join(" "));
    }

    Ok(ExportSelect {
        projection_sql: projections.join(", "),
        from_sql,
    })
}

/// The `SELECT` that reshapes a staging table holding an export-rewrite plan's
/// columns back into `table`'s real local column names, joining the alternate-key
/// columns back to their referent (NULL-safe) and projecting the referent's real
/// FK-target columns (spec §4.4 "Import rewrite", §4.6 step 4).
pub struct ImportPlan {
    pub select_sql: String,
}

pub fn import_rewrite(
    table: &Table,
    paths: &[ForeignColumnPath],
    src_table: &str,
    catalog: &Catalog,
    config: &TablesConfig,
) -> Result<ImportPlan> {
    let src_ref = quote_ident(src_table);
    let mut projections = Vec::new();
    let mut joins = Vec::new();
    let mut joined_fks: HashMap<String, String> = HashMap::new();
    let mut group_cols: HashMap<String, Vec<String>> = HashMap::new();

    for (alias, path) in paths {
        match path.len() {
            0 => {
                projections.push(format!(
                    "{src_ref}.{col} AS {col}",
                    col = quote_ident(alias)
                ));
            }
            1 => {
                let fk_name = path[0].clone();
                group_cols.entry(fk_name).or_default().push(alias.clone());
            }
            _ => {
                return Err(PgmergeError::InputParameters(format!(
                    "foreign-column paths of length >= 2 are not supported: {path:?}"
                )));
            }
        }
    }

    // Build one join per FK, in the deterministic order its alternate-key columns
    // were registered, then project its real local/referred column pairs back.
    let mut fk_names: Vec<&String> = group_cols.keys().collect();
    fk_names.sort();
    for fk_name in fk_names {
        let fk = find_fk(table, fk_name)?;
        let referent = catalog.require_table(&fk.referred_table)?;
        let alternate_key = config
            .get(&fk.referred_table)
            .and_then(|c| c.alternate_key.as_ref())
            .ok_or_else(|| {
                PgmergeError::InputParameters(format!(
                    "no alternate_key configured for {}",
                    fk.referred_table
                ))
            })?;

        let alias_cols = &group_cols[fk_name];
        if alias_cols.len() != alternate_key.len() {
            return Err(PgmergeError::InputParameters(format!(
                "foreign-column group for {fk_name} doesn't match alternate_key arity"
            )));
        }

        let join_alias = format!("join_{fk_name}");
        let on_clause = alternate_key
            .iter()
            .zip(alias_cols)
            .map(|(ak_col, alias_col)| {
                format!(
                    "({src_ref}.{a} = {join_alias}.{ak} OR ({src_ref}.{a} IS NULL AND {join_alias}.{ak} IS NULL))",
                    a = quote_ident(alias_col),
                    ak = quote_ident(ak_col)
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ");
        joins.push(format!(
            "LEFT JOIN {schema}.{name} AS {join_alias} ON {on_clause}",
            schema = quote_ident(&referent.schema),
            name = quote_ident(&referent.name)
        ));
        joined_fks.insert(fk_name.clone(), join_alias.clone());

        for (local_col, referred_col) in fk.local_columns.iter().zip(&fk.referred_columns) {
            projections.push(format!(
                "{join_alias}.{referred_col} AS {local_col}",
                referred_col = quote_ident(referred_col),
                local_col = quote_ident(local_col)
            ));
        }
    }

    let select_sql = format!(
        "SELECT {cols} FROM {src_ref} {joins}",
        cols = projections.join(", "),
        joins = joins.join(" ")
    );

    Ok(ImportPlan { select_sql })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::table::{Column, PrimaryKey};
    use crate::catalog::{ForeignKey, UniqueConstraint};
    use crate::config::TableConfig;

    fn other_table() -> Table {
        Table {
            schema: "public".into(),
            name: "other_table".into(),
            columns: vec![
                Column { name: "id".into(), data_type: "integer".into(), nullable: false, default_expression: None },
                Column { name: "code".into(), data_type: "text".into(), nullable: false, default_expression: None },
                Column { name: "name".into(), data_type: "text".into(), nullable: true, default_expression: None },
            ],
            primary_key: Some(PrimaryKey { name: "other_table_pkey".into(), columns: vec!["id".into()] }),
            unique_constraints: vec![UniqueConstraint {
                table: "other_table".into(),
                name: "other_table_code_key".into(),
                columns: vec!["code".into()],
            }],
            foreign_keys: vec![],
        }
    }

    fn the_table() -> Table {
        Table {
            schema: "public".into(),
            name: "the_table".into(),
            columns: vec![
                Column { name: "id".into(), data_type: "integer".into(), nullable: false, default_expression: None },
                Column { name: "code".into(), data_type: "text".into(), nullable: true, default_expression: None },
                Column { name: "name".into(), data_type: "text".into(), nullable: true, default_expression: None },
                Column { name: "ref_other_table".into(), data_type: "integer".into(), nullable: true, default_expression: None },
            ],
            primary_key: Some(PrimaryKey { name: "the_table_pkey".into(), columns: vec!["id".into()] }),
            unique_constraints: vec![],
            foreign_keys: vec![ForeignKey {
                table: "the_table".into(),
                name: "the_table_ref_other_table_fkey".into(),
                local_columns: vec!["ref_other_table".into()],
                referred_schema: "public".into(),
                referred_table: "other_table".into(),
                referred_columns: vec!["id".into()],
                on_delete: None,
                on_update: None,
            }],
        }
    }

    fn catalog() -> Catalog {
        Catalog {
            schema: "public".into(),
            tables: vec![other_table(), the_table()],
        }
    }

    fn config_with_alternate_key() -> TablesConfig {
        let mut config = TablesConfig::new();
        config.insert(
            "other_table".into(),
            TableConfig { alternate_key: Some(vec!["code".into()]), ..Default::default() },
        );
        config
    }

    #[test]
    fn export_rewrite_expands_fk_with_alternate_key() {
        let table = the_table();
        let config = config_with_alternate_key();
        let columns = vec!["id".to_string(), "name".to_string(), "ref_other_table".to_string()];
        let paths = export_rewrite(&table, &columns, &config).unwrap();

        assert_eq!(
            paths,
            vec![
                ("id".to_string(), vec![]),
                ("name".to_string(), vec![]),
                (
                    "join_the_table_ref_other_table_fkey_code".to_string(),
                    vec!["the_table_ref_other_table_fkey".to_string()]
                ),
            ]
        );
    }

    #[test]
    fn export_rewrite_leaves_fk_without_alternate_key_untouched() {
        let table = the_table();
        let config = TablesConfig::new();
        let columns = vec!["id".to_string(), "ref_other_table".to_string()];
        let paths = export_rewrite(&table, &columns, &config).unwrap();
        assert_eq!(
            paths,
            vec![("id".to_string(), vec![]), ("ref_other_table".to_string(), vec![])]
        );
    }

    #[test]
    fn export_select_sql_joins_on_real_fk_and_projects_alternate_key() {
        let table = the_table();
        let config = config_with_alternate_key();
        let cat = catalog();
        let paths = export_rewrite(&table, &vec!["id".into(), "ref_other_table".into()], &config).unwrap();
        let select = export_select_sql(&table, &paths, &cat, &config).unwrap();
        assert!(select.from_sql.contains("LEFT JOIN \"public\".\"other_table\" AS join_the_table_ref_other_table_fkey"));
        assert!(select.from_sql.contains("\"the_table\".\"ref_other_table\" = join_the_table_ref_other_table_fkey.\"id\""));
        assert!(select.projection_sql.contains("join_the_table_ref_other_table_fkey.\"code\""));
    }

    #[test]
    fn import_rewrite_rejects_deep_paths() {
        let table = the_table();
        let cat = catalog();
        let config = config_with_alternate_key();
        let paths = vec![("x".to_string(), vec!["fk1".to_string(), "fk2".to_string()])];
        let result = import_rewrite(&table, &paths, "staging_raw", &cat, &config);
        assert!(result.is_err());
    }

    #[test]
    fn import_rewrite_builds_null_safe_join_and_projects_real_fk_column() {
        let table = the_table();
        let cat = catalog();
        let config = config_with_alternate_key();
        let paths = export_rewrite(&table, &vec!["id".into(), "ref_other_table".into()], &config).unwrap();
        let plan = import_rewrite(&table, &paths, "staging_raw", &cat, &config).unwrap();
        assert!(plan.select_sql.contains("IS NULL AND"));
        assert!(plan.select_sql.contains("AS \"ref_other_table\""));
    }
}
