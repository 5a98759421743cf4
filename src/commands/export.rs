//! `pgmerge export`: write one CSV per selected table (and per configured subset)
//! into a directory (spec §6).

use std::path::Path;

use anyhow::{Context, Result};

use crate::catalog::Catalog;
use crate::commands::connection::ConnectionArgs;
use crate::config;
use crate::db::connection::{connect_with_retry, initialize_session};
use crate::export::export_table;
use crate::graph::DependencyGraph;
use crate::orchestrator::{resolve_export_targets, self_referencing_tables};

pub async fn cmd_export(args: &ConnectionArgs, directory: &Path, tables: &[String]) -> Result<()> {
    let db_url = crate::commands::connection::resolve_database_url(args)?;
    let pool = connect_with_retry(&db_url).await?;
    initialize_session(&pool, &args.schema).await?;

    let catalog = Catalog::load(&pool, &args.schema).await?;
    let config_path = Path::new(&args.config);
    let table_config = config::load(config_path)?;
    config::validate(&catalog, &table_config)?;

    std::fs::create_dir_all(directory)
        .with_context(|| format!("creating output directory {}", directory.display()))?;

    if tables.is_empty() && args.include_dependent_tables {
        println!("Option to specifically include dependent tables has been ignored as all tables will be exported.");
    }
    let requested = if tables.is_empty() { None } else { Some(tables) };
    let (targets, warnings) = resolve_export_targets(
        requested,
        &table_config,
        &catalog,
        args.include_dependent_tables,
    );
    for warning in &warnings {
        eprintln!("Warning: {warning}");
    }

    let export_table_set: Vec<String> = targets.iter().map(|t| t.table.clone()).collect();
    let graph = DependencyGraph::build(&catalog, Some(&export_table_set));
    let self_refs = self_referencing_tables(&graph);
    if !self_refs.is_empty() {
        println!(
            "Self-referencing tables found that could prevent import: {}",
            self_refs.join(" ")
        );
    }

    let mut conn = pool.acquire().await?;
    for effective in &targets {
        let table = catalog.require_table(&effective.table)?;
        let bytes = export_table(&mut conn, table, &catalog, &table_config, effective, directory)
            .await
            .with_context(|| format!("exporting {}", effective.file_stem))?;
        println!("{}: wrote {} bytes", effective.file_stem, bytes);
    }

    println!("\n{} files exported to {}", targets.len(), directory.display());
    Ok(())
}
