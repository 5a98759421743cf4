//! `pgmerge inspect`: read-only schema queries (spec §6). Out of scope for the core
//! per spec §1 ("the `inspect` sub-command's pretty-printing of schema facts"); this
//! is a thin driver over the Catalog Inspector and Dependency Graph.

use anyhow::Result;

use crate::catalog::Catalog;
use crate::commands::connection::ConnectionArgs;
use crate::db::connection::{connect_with_retry, initialize_session};
use crate::graph::DependencyGraph;

#[derive(Debug, Default, Clone, Copy)]
pub struct InspectOpts {
    pub warnings: bool,
    pub list_tables: bool,
    pub table_details: bool,
    pub cycles: bool,
    pub insert_order: bool,
    pub partition: bool,
    pub export_graph: bool,
    pub transferable: bool,
}

pub async fn cmd_inspect(args: &ConnectionArgs, opts: InspectOpts) -> Result<()> {
    let db_url = crate::commands::connection::resolve_database_url(args)?;
    let pool = connect_with_retry(&db_url).await?;
    initialize_session(&pool, &args.schema).await?;

    let catalog = Catalog::load(&pool, &args.schema).await?;

    if opts.transferable {
        print_transferability(&catalog);
        return Ok(());
    }

    let mut tables = catalog.table_names();
    tables.sort();

    if opts.list_tables {
        for table in &tables {
            println!("{table}");
        }
    } else if opts.table_details {
        for name in &tables {
            let table = catalog.require_table(name)?;
            println!("\ntable: {name}");
            if !table.columns.is_empty() {
                println!("\tcolumns: {}", table.column_names().join(", "));
            }
            if !table.foreign_keys.is_empty() {
                for fk in &table.foreign_keys {
                    println!(
                        "\tfk: {} ({}) -> {}.{} ({})",
                        fk.name,
                        fk.local_columns.join(", "),
                        fk.referred_schema,
                        fk.referred_table,
                        fk.referred_columns.join(", ")
                    );
                }
            }
        }
    } else if !opts.export_graph {
        println!("Found {} tables in schema '{}'", tables.len(), args.schema);
    }

    if opts.warnings {
        print_missing_primary_keys(&catalog);
    }

    if opts.partition || opts.cycles || opts.insert_order || opts.export_graph {
        let graph = DependencyGraph::build(&catalog, None);
        if opts.partition {
            print_partition_info(&graph);
        }
        if opts.cycles {
            print_cycle_info(&graph);
        }
        if opts.insert_order {
            println!("\nInsertion order:");
            println!("{:?}", graph.insertion_order());
        }
        if opts.export_graph {
            print_dot(&graph);
        }
    }

    Ok(())
}

fn print_missing_primary_keys(catalog: &Catalog) {
    let no_pks: Vec<&str> = catalog
        .tables
        .iter()
        .filter(|t| t.primary_key.is_none())
        .map(|t| t.name.as_str())
        .collect();
    if !no_pks.is_empty() {
        println!("\n{} tables have no primary key:", no_pks.len());
        println!("{no_pks:?}");
    }
}

fn print_partition_info(graph: &DependencyGraph) {
    let partitions = graph.partitions();
    if partitions.len() > 1 {
        println!("\nDependency graph can be partitioned into {} sub-graphs:", partitions.len());
        for partition in &partitions {
            println!("{partition:?}");
        }
    }
}

fn print_cycle_info(graph: &DependencyGraph) {
    let cycles = graph.simple_cycles();
    if !cycles.is_empty() {
        println!("\n{} self-references and simple cycles found:", cycles.len());
        println!("{cycles:?}");
    }

    let (broken, _) = graph.break_cycles();
    if !broken.simple_cycles().is_empty() {
        println!("\nAnother cycle was detected after breaking simple cycles:");
        println!("{:?}", broken.simple_cycles());
    }
}

fn print_dot(graph: &DependencyGraph) {
    println!("digraph dependency_graph {{");
    println!("node[shape=plaintext];");
    println!("rankdir=LR; ranksep=1.0; size=\"16.5, 11.7\";\n");
    for table in graph.tables() {
        println!("{table} [label=\"{table}\"];");
    }
    for (from, to, fk_name) in graph.edges() {
        println!("\"{from}\" -> \"{to}\" [label=\"{fk_name}\"];");
    }
    println!("\n}}");
}

/// Classify every table as surrogate-key, natural-key, or auto-transformable for
/// the alternate-key import feature, the way `transferability()` does.
fn print_transferability(catalog: &Catalog) {
    let mut surrogate_key_tables = Vec::new();
    let mut natural_key_tables = Vec::new();
    let mut transformable = Vec::new();
    let mut pk_contains_fk = Vec::new();

    let mut names = catalog.table_names();
    names.sort();

    for name in &names {
        let table = catalog.require_table(name).expect("name came from catalog");
        let pk_columns: Vec<&str> = table
            .primary_key
            .as_ref()
            .map(|pk| pk.columns.iter().map(String::as_str).collect())
            .unwrap_or_default();

        for fk in &table.foreign_keys {
            if fk.local_columns.iter().any(|c| pk_columns.contains(&c.as_str())) {
                pk_contains_fk.push(name.clone());
            }
        }

        let default_columns: Vec<&str> = table
            .columns
            .iter()
            .filter(|c| c.default_expression.is_some())
            .map(|c| c.name.as_str())
            .collect();
        let auto_id = table
            .columns
            .iter()
            .any(|c| pk_columns.contains(&c.name.as_str()) && c.default_expression.is_some());

        let auto_transformable = table
            .unique_constraints
            .iter()
            .any(|uc| uc.columns.iter().all(|c| !default_columns.contains(&c.as_str())));

        if auto_id && !auto_transformable {
            surrogate_key_tables.push(name.clone());
        } else if auto_id && auto_transformable {
            transformable.push(name.clone());
        } else {
            natural_key_tables.push(name.clone());
        }
    }

    println!("\nSurrogate keys:\n{surrogate_key_tables:?}");
    println!("\nNatural keys:\n{natural_key_tables:?}");
    println!("\nAuto-transformable to natural keys:\n{transformable:?}");
    println!("\nPK contains FK:\n{pk_contains_fk:?}");
}
