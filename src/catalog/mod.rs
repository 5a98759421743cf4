pub mod constraint;
pub mod schema;
pub mod table;
pub mod utils;

pub use constraint::{ForeignKey, UniqueConstraint};
pub use table::{Column, PrimaryKey, Table};

use sqlx::PgPool;

use crate::error::{PgmergeError, Result};

/// A schema-qualified table name, the node type of the Dependency Graph.
pub type TableRef = String;

#[derive(Debug, Clone)]
pub struct Catalog {
    pub schema: String,
    pub tables: Vec<Table>,
}

impl Catalog {
    /// Load every table in `schema` with columns, keys and constraints populated.
    pub async fn load(pool: &PgPool, schema: &str) -> Result<Self> {
        let mut conn = pool.acquire().await?;
        sqlx::query(&format!(
            "SET search_path = {}, pg_catalog",
            crate::catalog::utils::quote_ident(schema)
        ))
        .execute(&mut *conn)
        .await?;

        let tables = table::fetch(&mut conn, schema).await?;
        Ok(Self {
            schema: schema.to_string(),
            tables,
        })
    }

    pub fn find_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn require_table(&self, name: &str) -> Result<&Table> {
        self.find_table(name).ok_or_else(|| {
            PgmergeError::CatalogError(format!("table not found in database: {name}"))
        })
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::table::{Column, PrimaryKey};

    fn make_table(name: &str) -> Table {
        Table {
            schema: "public".into(),
            name: name.into(),
            columns: vec![Column {
                name: "id".into(),
                data_type: "integer".into(),
                nullable: false,
                default_expression: None,
            }],
            primary_key: Some(PrimaryKey {
                name: format!("{name}_pkey"),
                columns: vec!["id".into()],
            }),
            unique_constraints: vec![],
            foreign_keys: vec![],
        }
    }

    #[test]
    fn find_and_require_table() {
        let catalog = Catalog {
            schema: "public".into(),
            tables: vec![make_table("users")],
        };
        assert!(catalog.find_table("users").is_some());
        assert!(catalog.find_table("missing").is_none());
        assert!(catalog.require_table("missing").is_err());
    }
}
