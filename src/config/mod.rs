//! Per-table configuration: YAML loading, JSON-schema shape validation, and the
//! semantic cross-checks against the live catalog (spec §4.3).

pub mod types;

pub use types::{EffectiveConfig, SubsetConfig, TableConfig, TablesConfig, expand_subsets};

use std::collections::BTreeMap;
use std::path::Path;

use crate::catalog::Catalog;
use crate::error::{PgmergeError, Result};

const SCHEMA_DOCUMENT: &str = include_str!("schema.json");

/// Parse a YAML config file into `TablesConfig`, validating its shape against the
/// bundled JSON schema before returning it. A missing file yields an empty config.
pub fn load(path: &Path) -> Result<TablesConfig> {
    if !path.exists() {
        return Ok(TablesConfig::new());
    }

    let contents = std::fs::read_to_string(path)?;
    let raw: serde_json::Value = serde_yaml::from_str(&contents)
        .map_err(|e| PgmergeError::ConfigInvalid(format!("invalid YAML in {}: {e}", path.display())))?;

    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_DOCUMENT).expect("bundled config schema.json is valid JSON");
    let validator =
        jsonschema::validator_for(&schema).expect("bundled config schema.json is a valid JSON schema");
    if let Err(error) = validator.validate(&raw) {
        return Err(PgmergeError::ConfigInvalid(format!(
            "config file {} doesn't match schema: {error}",
            path.display()
        )));
    }

    serde_json::from_value(raw)
        .map_err(|e| PgmergeError::ConfigInvalid(format!("invalid config shape in {}: {e}", path.display())))
}

/// Cross-check `config` against the live schema, in the fail-fast order of spec
/// §4.3's rule table. The first violated rule raises `ConfigInvalid`.
pub fn validate(catalog: &Catalog, config: &TablesConfig) -> Result<()> {
    let table_names: std::collections::BTreeSet<&str> =
        catalog.tables.iter().map(|t| t.name.as_str()).collect();

    let mut seen_subset_names: BTreeMap<String, String> = BTreeMap::new();

    for (table_name, table_config) in config {
        let table = catalog
            .require_table(table_name)
            .map_err(|_| PgmergeError::ConfigInvalid(format!("table not found in database: {table_name}")))?;
        let all_columns: std::collections::BTreeSet<&str> =
            table.columns.iter().map(|c| c.name.as_str()).collect();

        if let Some(columns) = &table_config.columns {
            let unknown: Vec<&String> =
                columns.iter().filter(|c| !all_columns.contains(c.as_str())).collect();
            if !unknown.is_empty() {
                return Err(PgmergeError::ConfigInvalid(format!(
                    "'columns' not found in table: {} {}",
                    table_name,
                    unknown.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                )));
            }

            let skipped: Vec<&str> = table
                .columns
                .iter()
                .filter(|c| !columns.contains(&c.name) && !c.is_skippable())
                .map(|c| c.name.as_str())
                .collect();
            if !skipped.is_empty() {
                return Err(PgmergeError::ConfigInvalid(format!(
                    "'columns' can't skip columns that aren't nullable or don't have defaults: {} {}",
                    table_name,
                    skipped.join(", ")
                )));
            }

            let identifier_columns: Vec<&str> = if let Some(ak) = &table_config.alternate_key {
                ak.iter().map(|s| s.as_str()).collect()
            } else {
                table
                    .primary_key
                    .as_ref()
                    .map(|pk| pk.columns.iter().map(|s| s.as_str()).collect())
                    .unwrap_or_default()
            };
            let missing_id: Vec<&str> = identifier_columns
                .iter()
                .filter(|c| !columns.iter().any(|col| col == *c))
                .copied()
                .collect();
            if !missing_id.is_empty() {
                return Err(PgmergeError::ConfigInvalid(format!(
                    "'columns' has to also contain primary/alternate keys, but doesn't contain: {} {}",
                    table_name,
                    missing_id.join(", ")
                )));
            }
        }

        if let Some(ak) = &table_config.alternate_key {
            let unknown: Vec<&String> = ak.iter().filter(|c| !all_columns.contains(c.as_str())).collect();
            if !unknown.is_empty() {
                return Err(PgmergeError::ConfigInvalid(format!(
                    "'alternate_key' columns not found in table: {} {}",
                    table_name,
                    unknown.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                )));
            }
        }

        let mut per_table_subset_names = std::collections::BTreeSet::new();
        for subset in &table_config.subsets {
            if !per_table_subset_names.insert(subset.name.clone()) {
                return Err(PgmergeError::ConfigInvalid(format!(
                    "duplicate subset names: {}",
                    subset.name
                )));
            }
            if table_names.contains(subset.name.as_str()) {
                return Err(PgmergeError::ConfigInvalid(format!(
                    "subset name can't be the same as that of a table in the schema: {}",
                    subset.name
                )));
            }
            if let Some(owner) = seen_subset_names.get(&subset.name) {
                return Err(PgmergeError::ConfigInvalid(format!(
                    "subset names already in use: {} (already used by {owner})",
                    subset.name
                )));
            }
            seen_subset_names.insert(subset.name.clone(), table_name.clone());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::table::{Column, PrimaryKey};
    use crate::catalog::Table;

    fn catalog() -> Catalog {
        Catalog {
            schema: "public".into(),
            tables: vec![Table {
                schema: "public".into(),
                name: "country".into(),
                columns: vec![
                    Column { name: "code".into(), data_type: "text".into(), nullable: false, default_expression: None },
                    Column { name: "name".into(), data_type: "text".into(), nullable: false, default_expression: None },
                ],
                primary_key: Some(PrimaryKey { name: "country_pkey".into(), columns: vec!["code".into()] }),
                unique_constraints: vec![],
                foreign_keys: vec![],
            }],
        }
    }

    #[test]
    fn rejects_unknown_table() {
        let mut config = TablesConfig::new();
        config.insert("nope".into(), TableConfig::default());
        let err = validate(&catalog(), &config).unwrap_err();
        assert!(err.to_string().contains("table not found in database"));
    }

    #[test]
    fn rejects_columns_missing_identifier() {
        let mut config = TablesConfig::new();
        config.insert(
            "country".into(),
            TableConfig { columns: Some(vec!["name".into()]), ..Default::default() },
        );
        let err = validate(&catalog(), &config).unwrap_err();
        assert!(err.to_string().contains("primary/alternate keys"));
    }

    #[test]
    fn rejects_subset_name_colliding_with_table() {
        let mut config = TablesConfig::new();
        config.insert(
            "country".into(),
            TableConfig {
                subsets: vec![SubsetConfig { name: "country".into(), where_clause: None, columns: None }],
                ..Default::default()
            },
        );
        let err = validate(&catalog(), &config).unwrap_err();
        assert!(err.to_string().contains("subset name can't be the same"));
    }

    #[test]
    fn accepts_valid_config() {
        let mut config = TablesConfig::new();
        config.insert(
            "country".into(),
            TableConfig { columns: Some(vec!["code".into(), "name".into()]), ..Default::default() },
        );
        assert!(validate(&catalog(), &config).is_ok());
    }
}
