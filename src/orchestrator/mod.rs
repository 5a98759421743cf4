//! The Orchestrator: resolves CSV files to tables, orders them by FK dependency,
//! and drives the Merge Engine across all of them inside one transaction (spec §4.7).

use sqlx::PgPool;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::catalog::{Catalog, TableRef};
use crate::config::{expand_subsets, EffectiveConfig, TablesConfig};
use crate::error::{PgmergeError, Result};
use crate::graph::DependencyGraph;
use crate::merge::{merge_file, MergeRequest, MergeStats};

/// One file on disk paired with the effective config of the table or subset it
/// feeds (spec §4.7 "resolve the set of files to process").
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    pub effective: EffectiveConfig,
    pub path: PathBuf,
}

/// Every effective file-level target known to the schema: every catalog table
/// (configured or not) plus every configured subset, keyed by file stem.
fn known_targets(catalog: &Catalog, config: &TablesConfig) -> BTreeMap<String, EffectiveConfig> {
    let mut targets = expand_subsets(config);
    for table in &catalog.tables {
        targets.entry(table.name.clone()).or_insert_with(|| EffectiveConfig {
            table: table.name.clone(),
            file_stem: table.name.clone(),
            columns: None,
            alternate_key: None,
            where_clause: None,
        });
    }
    targets
}

/// Resolve which files to process, in insertion order (spec §4.7). When `requested`
/// is `Some`, only those tables (and, if `include_dependents`, their transitive
/// dependents) are considered, every one of them required to have a matching CSV
/// file. Otherwise every `*.csv` in `dir` whose stem names a known table or subset
/// is picked up, missing ones silently excluded. Unknown requested table names are
/// reported and dropped rather than failing the whole run (spec supplement, grounded
/// on `get_and_warn_about_any_unknown_tables`).
pub fn resolve_files(
    dir: &Path,
    requested: Option<&[String]>,
    config: &TablesConfig,
    catalog: &Catalog,
    include_dependents: bool,
) -> Result<(Vec<ResolvedFile>, DependencyGraph, Vec<String>)> {
    let targets = known_targets(catalog, config);
    let mut warnings = Vec::new();

    let wanted_tables: Option<std::collections::BTreeSet<TableRef>> = match requested {
        None => None,
        Some(names) => {
            let full_graph = DependencyGraph::build(catalog, None);
            let mut known = Vec::new();
            for name in names {
                if catalog.find_table(name).is_some() {
                    known.push(name.clone());
                } else {
                    warnings.push(format!("unknown table, skipping: {name}"));
                }
            }
            if include_dependents {
                Some(full_graph.all_dependents(&known))
            } else {
                Some(known.into_iter().collect())
            }
        }
    };

    let mut missing = Vec::new();
    let mut resolved = Vec::new();
    for (stem, effective) in &targets {
        if let Some(wanted) = &wanted_tables {
            if !wanted.contains(&effective.table) {
                continue;
            }
        }

        let path = dir.join(format!("{stem}.csv"));
        if path.exists() {
            resolved.push(ResolvedFile { effective: effective.clone(), path });
        } else if wanted_tables.is_some() {
            missing.push(stem.clone());
        }
    }

    if !missing.is_empty() {
        return Err(PgmergeError::FileMissing(missing));
    }

    let table_set: Vec<TableRef> = resolved
        .iter()
        .map(|f| f.effective.table.clone())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    let graph = DependencyGraph::build(catalog, Some(&table_set));
    let order = graph.insertion_order();
    resolved.sort_by_key(|f| {
        order
            .iter()
            .position(|t| *t == f.effective.table)
            .unwrap_or(usize::MAX)
    });

    Ok((resolved, graph, warnings))
}

/// Every table involved in a self-reference (length-one cycle), for the "self-
/// referencing tables found that could prevent import" warning (spec §8 scenario 6).
pub fn self_referencing_tables(graph: &DependencyGraph) -> Vec<TableRef> {
    graph
        .simple_cycles()
        .into_iter()
        .filter(|c| c.len() == 1)
        .map(|c| c[0].clone())
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    pub ignore_cycles: bool,
    pub disable_foreign_keys: bool,
}

/// The outcome of a full import run: per-file stats for everything that succeeded,
/// and the error message for everything that was skipped (spec §7 "skip the
/// offending table; continue others").
#[derive(Debug, Default)]
pub struct ImportReport {
    pub stats: BTreeMap<String, MergeStats>,
    pub failed: Vec<(String, String)>,
}

impl ImportReport {
    pub fn totals(&self) -> MergeStats {
        let mut total = MergeStats::default();
        for stats in self.stats.values() {
            total.accumulate(stats);
        }
        total
    }
}

/// Run every resolved file's merge inside one transaction, in `files`' order (the
/// caller is expected to have sorted it via `resolve_files`). Each file's merge runs
/// under its own `SAVEPOINT` so a single bad file can't poison the whole transaction
/// (spec §7 per-table skip policy, reconciled with §9's "one transaction" rule).
pub async fn run_import(
    pool: &PgPool,
    catalog: &Catalog,
    config: &TablesConfig,
    files: Vec<ResolvedFile>,
    graph: &DependencyGraph,
    options: ImportOptions,
) -> Result<ImportReport> {
    let cycles = graph.simple_cycles();
    if !cycles.is_empty() {
        for cycle in &cycles {
            tracing::warn!(?cycle, "dependency cycle detected in import set");
        }
        if !options.ignore_cycles && !options.disable_foreign_keys {
            return Err(PgmergeError::UnsupportedSchema(format!(
                "cycles detected in the import set; pass --ignore-cycles or --disable-foreign-keys to proceed ({} cycle(s))",
                cycles.len()
            )));
        }
    }

    let mut tx = pool.begin().await?;
    sqlx::query(&format!(
        "SET LOCAL search_path = {}, pg_catalog",
        crate::catalog::utils::quote_ident(&catalog.schema)
    ))
    .execute(&mut *tx)
    .await?;

    if options.disable_foreign_keys {
        sqlx::query("SET session_replication_role = REPLICA").execute(&mut *tx).await?;
    }

    let mut report = ImportReport::default();

    for file in files {
        let table = catalog.require_table(&file.effective.table)?;
        let savepoint = format!(
            "sp_{}",
            file.effective
                .file_stem
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect::<String>()
        );

        sqlx::query(&format!("SAVEPOINT {savepoint}")).execute(&mut *tx).await?;

        let columns = file
            .effective
            .columns
            .clone()
            .unwrap_or_else(|| table.column_names());
        let request = MergeRequest {
            table,
            catalog,
            config,
            columns,
            alternate_key: file.effective.alternate_key.clone(),
            csv_path: &file.path,
        };

        match merge_file(&mut tx, request).await {
            Ok(stats) => {
                sqlx::query(&format!("RELEASE SAVEPOINT {savepoint}")).execute(&mut *tx).await?;
                report.stats.entry(file.effective.file_stem.clone()).or_default().accumulate(&stats);
            }
            Err(err) => {
                sqlx::query(&format!("ROLLBACK TO SAVEPOINT {savepoint}")).execute(&mut *tx).await?;
                sqlx::query(&format!("RELEASE SAVEPOINT {savepoint}")).execute(&mut *tx).await?;
                tracing::warn!(table = %file.effective.file_stem, error = %err, "skipping table after merge failure");
                report.failed.push((file.effective.file_stem.clone(), err.to_string()));
            }
        }
    }

    if options.disable_foreign_keys {
        sqlx::query("SET session_replication_role = DEFAULT").execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(report)
}

/// Resolve export targets the same way `resolve_files` does for import, minus the
/// filesystem check (export always writes, never reads, the CSV).
pub fn resolve_export_targets(
    requested: Option<&[String]>,
    config: &TablesConfig,
    catalog: &Catalog,
    include_dependents: bool,
) -> (Vec<EffectiveConfig>, Vec<String>) {
    let targets = known_targets(catalog, config);
    let mut warnings = Vec::new();

    let wanted_tables: Option<std::collections::BTreeSet<TableRef>> = requested.map(|names| {
        let full_graph = DependencyGraph::build(catalog, None);
        let mut known = Vec::new();
        for name in names {
            if catalog.find_table(name).is_some() {
                known.push(name.clone());
            } else {
                warnings.push(format!("unknown table, skipping: {name}"));
            }
        }
        if include_dependents {
            full_graph.all_dependents(&known)
        } else {
            known.into_iter().collect()
        }
    });

    let mut selected: Vec<EffectiveConfig> = targets
        .into_values()
        .filter(|effective| {
            wanted_tables
                .as_ref()
                .map(|w| w.contains(&effective.table))
                .unwrap_or(true)
        })
        .collect();
    selected.sort_by(|a, b| a.file_stem.cmp(&b.file_stem));

    (selected, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::table::{Column, PrimaryKey, Table};
    use crate::catalog::ForeignKey;
    use crate::config::TableConfig;
    use tempfile::tempdir;

    fn catalog() -> Catalog {
        Catalog {
            schema: "public".into(),
            tables: vec![
                Table {
                    schema: "public".into(),
                    name: "country".into(),
                    columns: vec![Column { name: "code".into(), data_type: "text".into(), nullable: false, default_expression: None }],
                    primary_key: Some(PrimaryKey { name: "country_pkey".into(), columns: vec!["code".into()] }),
                    unique_constraints: vec![],
                    foreign_keys: vec![],
                },
                Table {
                    schema: "public".into(),
                    name: "places_to_go".into(),
                    columns: vec![
                        Column { name: "id".into(), data_type: "integer".into(), nullable: false, default_expression: None },
                        Column { name: "place_code".into(), data_type: "text".into(), nullable: true, default_expression: None },
                    ],
                    primary_key: Some(PrimaryKey { name: "places_to_go_pkey".into(), columns: vec!["id".into()] }),
                    unique_constraints: vec![],
                    foreign_keys: vec![ForeignKey {
                        table: "places_to_go".into(),
                        name: "places_to_go_country_fkey".into(),
                        local_columns: vec!["place_code".into()],
                        referred_schema: "public".into(),
                        referred_table: "country".into(),
                        referred_columns: vec!["code".into()],
                        on_delete: None,
                        on_update: None,
                    }],
                },
            ],
        }
    }

    #[test]
    fn resolve_files_picks_up_known_csvs_when_unrestricted() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("country.csv"), "code\n").unwrap();
        let cat = catalog();
        let config = TablesConfig::new();
        let (files, _graph, warnings) = resolve_files(dir.path(), None, &config, &cat, false).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].effective.table, "country");
        assert!(warnings.is_empty());
    }

    #[test]
    fn resolve_files_expands_dependents_and_orders_referents_first() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("country.csv"), "code\n").unwrap();
        std::fs::write(dir.path().join("places_to_go.csv"), "id,place_code\n").unwrap();
        let cat = catalog();
        let config = TablesConfig::new();
        let requested = vec!["places_to_go".to_string()];
        let (files, _graph, _warnings) =
            resolve_files(dir.path(), Some(&requested), &config, &cat, true).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].effective.table, "country");
        assert_eq!(files[1].effective.table, "places_to_go");
    }

    #[test]
    fn resolve_files_reports_missing_csv_for_explicit_request() {
        let dir = tempdir().unwrap();
        let cat = catalog();
        let config = TablesConfig::new();
        let requested = vec!["country".to_string()];
        let err = resolve_files(dir.path(), Some(&requested), &config, &cat, false).unwrap_err();
        assert!(matches!(err, PgmergeError::FileMissing(_)));
    }

    #[test]
    fn resolve_files_warns_and_drops_unknown_table() {
        let dir = tempdir().unwrap();
        let cat = catalog();
        let config = TablesConfig::new();
        let requested = vec!["nonexistent".to_string()];
        let (files, _graph, warnings) =
            resolve_files(dir.path(), Some(&requested), &config, &cat, false).unwrap();
        assert!(files.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn known_targets_include_subsets() {
        let cat = catalog();
        let mut config = TablesConfig::new();
        config.insert(
            "country".into(),
            TableConfig {
                subsets: vec![crate::config::SubsetConfig {
                    name: "big_countries".into(),
                    where_clause: Some("true".into()),
                    columns: None,
                }],
                ..Default::default()
            },
        );
        let targets = known_targets(&cat, &config);
        assert!(targets.contains_key("big_countries"));
        assert_eq!(targets["big_countries"].table, "country");
    }

    #[test]
    fn self_referencing_tables_reports_length_one_cycles() {
        let cat = Catalog {
            schema: "public".into(),
            tables: vec![Table {
                schema: "public".into(),
                name: "the_table".into(),
                columns: vec![Column { name: "id".into(), data_type: "integer".into(), nullable: false, default_expression: None }],
                primary_key: Some(PrimaryKey { name: "the_table_pkey".into(), columns: vec!["id".into()] }),
                unique_constraints: vec![],
                foreign_keys: vec![ForeignKey {
                    table: "the_table".into(),
                    name: "the_table_parent_fkey".into(),
                    local_columns: vec!["parent_id".into()],
                    referred_schema: "public".into(),
                    referred_table: "the_table".into(),
                    referred_columns: vec!["id".into()],
                    on_delete: None,
                    on_update: None,
                }],
            }],
        };
        let graph = DependencyGraph::build(&cat, None);
        assert_eq!(self_referencing_tables(&graph), vec!["the_table".to_string()]);
    }

    #[test]
    fn import_report_totals_accumulate() {
        let mut report = ImportReport::default();
        report.stats.insert("a".into(), MergeStats { skip: 1, insert: 2, update: 0, total: 3 });
        report.stats.insert("b".into(), MergeStats { skip: 0, insert: 1, update: 1, total: 2 });
        let totals = report.totals();
        assert_eq!(totals, MergeStats { skip: 1, insert: 3, update: 1, total: 5 });
    }
}
