//! The per-table configuration shape loaded from YAML (spec §3 "Per-Table Config").

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubsetConfig {
    pub name: String,
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub alternate_key: Option<Vec<String>>,
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
    #[serde(default)]
    pub subsets: Vec<SubsetConfig>,
}

pub type TablesConfig = BTreeMap<String, TableConfig>;

/// A fully-resolved config for one file on disk: either a table itself or one of its
/// subsets, with the subset's overrides already merged over the parent (spec §4.3
/// `expand_subsets`).
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    /// The real table this file maps to (the subset's parent, or itself).
    pub table: String,
    /// The CSV file stem: the table name, or the subset's name.
    pub file_stem: String,
    pub columns: Option<Vec<String>>,
    pub alternate_key: Option<Vec<String>>,
    pub where_clause: Option<String>,
}

/// Resolve every table and subset in `config` into its effective, file-level form.
pub fn expand_subsets(config: &TablesConfig) -> BTreeMap<String, EffectiveConfig> {
    let mut out = BTreeMap::new();

    for (table_name, table_config) in config {
        out.insert(
            table_name.clone(),
            EffectiveConfig {
                table: table_name.clone(),
                file_stem: table_name.clone(),
                columns: table_config.columns.clone(),
                alternate_key: table_config.alternate_key.clone(),
                where_clause: table_config.where_clause.clone(),
            },
        );

        for subset in &table_config.subsets {
            out.insert(
                subset.name.clone(),
                EffectiveConfig {
                    table: table_name.clone(),
                    file_stem: subset.name.clone(),
                    columns: subset
                        .columns
                        .clone()
                        .or_else(|| table_config.columns.clone()),
                    alternate_key: table_config.alternate_key.clone(),
                    where_clause: subset
                        .where_clause
                        .clone()
                        .or_else(|| table_config.where_clause.clone()),
                },
            );
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subset_inherits_parent_where_when_unset() {
        let mut config = TablesConfig::new();
        config.insert(
            "animals".to_string(),
            TableConfig {
                columns: Some(vec!["type".into(), "name".into()]),
                alternate_key: Some(vec!["type".into(), "name".into()]),
                where_clause: Some("type not in ('FISH','MAMMAL')".into()),
                subsets: vec![SubsetConfig {
                    name: "fish".into(),
                    where_clause: Some("type='FISH'".into()),
                    columns: None,
                }],
            },
        );

        let expanded = expand_subsets(&config);
        let fish = &expanded["fish"];
        assert_eq!(fish.table, "animals");
        assert_eq!(fish.where_clause.as_deref(), Some("type='FISH'"));
        assert_eq!(fish.columns, Some(vec!["type".to_string(), "name".to_string()]));
    }
}
