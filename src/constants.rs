pub const APP_NAME: &str = "pgmerge";

/// Default per-table configuration file name, looked for in the current directory
/// unless `--config` overrides it.
pub const CONFIG_FILENAME: &str = "pgmerge.yaml";

/// Rotating log file name, written under the OS-conventional user log directory.
pub const LOG_FILENAME: &str = "pgmerge.log";

/// Prefix for the session-scoped staging table holding the raw CSV shape.
pub const STAGING_RAW_PREFIX: &str = "_tmp_copy_";

/// Prefix for the session-scoped staging table holding the destination-shaped rows.
pub const STAGING_FINAL_PREFIX: &str = "_tmp_final_";

pub const DEFAULT_SCHEMA: &str = "public";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_prefixes_are_distinct() {
        assert_ne!(STAGING_RAW_PREFIX, STAGING_FINAL_PREFIX);
    }
}
