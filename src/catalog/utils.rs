/// True for PostgreSQL's built-in schemas, which the Catalog Inspector never
/// reports tables from.
pub fn is_system_schema(schema: &str) -> bool {
    matches!(schema, "pg_catalog" | "information_schema" | "pg_toast")
        || schema.starts_with("pg_temp_")
}

/// Double-quote an identifier, escaping embedded quotes, for safe interpolation
/// into dynamically built SQL.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Escape a string literal for safe interpolation into dynamically built SQL.
pub fn escape_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Reject identifiers that aren't safe to interpolate unquoted-adjacent into SQL
/// (catalog-derived names should already satisfy this; this is a defensive check
/// for anything that also flows in from user-supplied config).
pub fn is_valid_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_schemas() {
        assert!(is_system_schema("pg_catalog"));
        assert!(is_system_schema("information_schema"));
        assert!(is_system_schema("pg_toast"));
        assert!(is_system_schema("pg_temp_12"));
        assert!(!is_system_schema("public"));
    }

    #[test]
    fn quoting_escapes_embedded_quotes() {
        assert_eq!(quote_ident("foo"), "\"foo\"");
        assert_eq!(quote_ident("fo\"o"), "\"fo\"\"o\"");
    }

    #[test]
    fn string_escaping() {
        assert_eq!(escape_string("o'clock"), "'o''clock'");
    }

    #[test]
    fn identifier_validation() {
        assert!(is_valid_sql_identifier("users"));
        assert!(is_valid_sql_identifier("_users"));
        assert!(is_valid_sql_identifier("users_2"));
        assert!(!is_valid_sql_identifier("2users"));
        assert!(!is_valid_sql_identifier("users; DROP TABLE x"));
        assert!(!is_valid_sql_identifier(""));
    }
}
