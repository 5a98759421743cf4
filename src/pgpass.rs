//! `.pgpass` file lookup, mirroring libpq's own wildcard/escape rules.
//!
//! Field order in a pgpass line is `hostname:port:database:username:password`. A
//! field of `*` matches anything. `:` and `\` inside a field are escaped as `\:`
//! and `\\` respectively.

use std::path::{Path, PathBuf};

const COLON_PLACEHOLDER: &str = "\u{0}COLON\u{0}";

fn unescape_field(field: &str) -> String {
    field
        .replace("\\:", COLON_PLACEHOLDER)
        .replace("\\\\", "\\")
        .replace(COLON_PLACEHOLDER, ":")
}

/// Split a pgpass line on unescaped colons. Returns `None` if the line doesn't
/// have exactly five fields once unescaped.
fn split_line(line: &str) -> Option<[String; 5]> {
    let mut fields = Vec::with_capacity(5);
    let mut current = String::new();
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(&next) = chars.peek() {
                    if next == ':' || next == '\\' {
                        current.push('\\');
                        current.push(next);
                        chars.next();
                        continue;
                    }
                }
                current.push('\\');
            }
            ':' => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);

    if fields.len() != 5 {
        return None;
    }

    let mut out: [String; 5] = Default::default();
    for (i, field) in fields.into_iter().enumerate() {
        out[i] = unescape_field(&field);
    }
    Some(out)
}

fn field_matches(pattern: &str, value: &str) -> bool {
    pattern == "*" || pattern == value
}

fn line_matches(fields: &[String; 5], hostname: &str, port: &str, database: &str, username: &str) -> bool {
    field_matches(&fields[0], hostname)
        && field_matches(&fields[1], port)
        && field_matches(&fields[2], database)
        && field_matches(&fields[3], username)
}

/// Look up a password for `hostname:port:database:username` in the given pgpass
/// file (or the OS default if `pgpass_path` is `None`).
pub fn load_pgpass(
    hostname: &str,
    port: &str,
    database: &str,
    username: &str,
    pgpass_path: Option<&Path>,
) -> Option<String> {
    let path = match pgpass_path {
        Some(p) => p.to_path_buf(),
        None => default_pgpass_path()?,
    };

    let contents = std::fs::read_to_string(&path).ok()?;
    for line in contents.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(fields) = split_line(line)
            && line_matches(&fields, hostname, port, database, username)
        {
            return Some(fields[4].clone());
        }
    }
    None
}

/// The OS-appropriate default `.pgpass` location, honoring `$PGPASSFILE`.
pub fn default_pgpass_path() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var("PGPASSFILE") {
        return Some(PathBuf::from(explicit));
    }

    if cfg!(windows) {
        dirs::config_dir().map(|d| d.join("postgresql").join("pgpass.conf"))
    } else {
        dirs::home_dir().map(|d| d.join(".pgpass"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_pgpass(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn exact_match() {
        let f = write_pgpass("localhost:5432:mydb:myuser:secret\n");
        let pw = load_pgpass("localhost", "5432", "mydb", "myuser", Some(f.path()));
        assert_eq!(pw, Some("secret".to_string()));
    }

    #[test]
    fn wildcard_fields_match_anything() {
        let f = write_pgpass("*:*:*:*:wildcardpw\n");
        let pw = load_pgpass("anyhost", "1234", "anydb", "anyuser", Some(f.path()));
        assert_eq!(pw, Some("wildcardpw".to_string()));
    }

    #[test]
    fn first_matching_line_wins() {
        let f = write_pgpass("host:5432:db:user:first\nhost:5432:db:user:second\n");
        let pw = load_pgpass("host", "5432", "db", "user", Some(f.path()));
        assert_eq!(pw, Some("first".to_string()));
    }

    #[test]
    fn no_match_returns_none() {
        let f = write_pgpass("otherhost:5432:db:user:pw\n");
        let pw = load_pgpass("host", "5432", "db", "user", Some(f.path()));
        assert_eq!(pw, None);
    }

    #[test]
    fn escaped_colon_in_password() {
        let f = write_pgpass("host:5432:db:user:pa\\:ss\n");
        let pw = load_pgpass("host", "5432", "db", "user", Some(f.path()));
        assert_eq!(pw, Some("pa:ss".to_string()));
    }

    #[test]
    fn escaped_backslash_in_password() {
        let f = write_pgpass("host:5432:db:user:pa\\\\ss\n");
        let pw = load_pgpass("host", "5432", "db", "user", Some(f.path()));
        assert_eq!(pw, Some("pa\\ss".to_string()));
    }

    #[test]
    fn comments_and_blank_lines_skipped() {
        let f = write_pgpass("# a comment\n\nhost:5432:db:user:pw\n");
        let pw = load_pgpass("host", "5432", "db", "user", Some(f.path()));
        assert_eq!(pw, Some("pw".to_string()));
    }

    #[test]
    fn malformed_line_is_skipped() {
        let f = write_pgpass("not:enough:fields\nhost:5432:db:user:pw\n");
        let pw = load_pgpass("host", "5432", "db", "user", Some(f.path()));
        assert_eq!(pw, Some("pw".to_string()));
    }
}
