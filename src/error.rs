//! Typed errors for the core (catalog, graph, config, resolver, merge, orchestrator).
//!
//! The command layer converts these to `anyhow::Error` at the CLI boundary and maps
//! them to process exit codes per the error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PgmergeError {
    /// Bad CLI arguments caught before any connection attempt (spec §6's
    /// "argument/validation error", exit code 2) - e.g. neither `--dbname` nor
    /// `--uri` given.
    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    ConfigInvalid(String),

    #[error("{0}")]
    CatalogError(String),

    #[error("{0}")]
    UnsupportedSchema(String),

    #[error("{0}")]
    InputParameters(String),

    #[error("missing CSV files for requested tables: {}", .0.join(", "))]
    FileMissing(Vec<String>),

    #[error(transparent)]
    Sql(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PgmergeError {
    /// Process exit code for this error kind, per the CLI's error-taxonomy table.
    pub fn exit_code(&self) -> i32 {
        match self {
            PgmergeError::Usage(_) => 2,
            PgmergeError::ConfigInvalid(_) => 2,
            PgmergeError::CatalogError(_) => 2,
            PgmergeError::UnsupportedSchema(_) => 2,
            PgmergeError::InputParameters(_) => 2,
            PgmergeError::FileMissing(_) => 4,
            PgmergeError::Sql(_) => 3,
            PgmergeError::Io(_) => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, PgmergeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_taxonomy() {
        assert_eq!(PgmergeError::Usage("x".into()).exit_code(), 2);
        assert_eq!(PgmergeError::ConfigInvalid("x".into()).exit_code(), 2);
        assert_eq!(PgmergeError::CatalogError("x".into()).exit_code(), 2);
        assert_eq!(PgmergeError::UnsupportedSchema("x".into()).exit_code(), 2);
        assert_eq!(PgmergeError::InputParameters("x".into()).exit_code(), 2);
        assert_eq!(
            PgmergeError::FileMissing(vec!["a".into()]).exit_code(),
            4
        );
    }

    #[test]
    fn file_missing_lists_names() {
        let err = PgmergeError::FileMissing(vec!["foo".into(), "bar".into()]);
        assert_eq!(err.to_string(), "missing CSV files for requested tables: foo, bar");
    }
}
