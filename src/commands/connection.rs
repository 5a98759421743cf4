//! Shared connection/auth options for every subcommand, and the password
//! resolution chain of spec §6: explicit flag, then `pgpass`, then interactive
//! prompt (unless `--no-password` or `--uri`).

use clap::Args;
use dialoguer::Password;

use crate::error::PgmergeError;
use crate::pgpass;

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Database name
    #[arg(long)]
    pub dbname: Option<String>,

    /// Database server host
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Database server port
    #[arg(long, default_value_t = 5432)]
    pub port: u16,

    /// Database user name
    #[arg(long, short = 'U', default_value = "postgres")]
    pub username: String,

    /// Database password (prefer `pgpass` or the interactive prompt over this)
    #[arg(long)]
    pub password: Option<String>,

    /// Never prompt for a password
    #[arg(long)]
    pub no_password: bool,

    /// Full connection URI, overriding dbname/host/port/username/password
    #[arg(long)]
    pub uri: Option<String>,

    /// Schema to operate on
    #[arg(long, default_value = crate::constants::DEFAULT_SCHEMA)]
    pub schema: String,

    /// Per-table configuration file
    #[arg(long, default_value = crate::constants::CONFIG_FILENAME)]
    pub config: String,

    /// Expand the requested tables to include their transitive FK dependents
    #[arg(long, short = 'i')]
    pub include_dependent_tables: bool,
}

fn resolve_password(args: &ConnectionArgs) -> anyhow::Result<Option<String>> {
    if let Some(password) = &args.password {
        return Ok(Some(password.clone()));
    }

    let dbname = args.dbname.as_deref().unwrap_or(&args.username);
    if let Some(password) = pgpass::load_pgpass(&args.host, &args.port.to_string(), dbname, &args.username, None) {
        return Ok(Some(password));
    }

    if args.no_password {
        return Ok(None);
    }

    let password = Password::new()
        .with_prompt(format!("Password for user {}", args.username))
        .allow_empty_password(true)
        .interact()?;
    Ok(Some(password))
}

/// Build the `postgres://` connection URL `sqlx` connects with, resolving the
/// password per spec §6 unless `--uri` is given (which is used verbatim).
pub fn resolve_database_url(args: &ConnectionArgs) -> anyhow::Result<String> {
    if let Some(uri) = &args.uri {
        return Ok(uri.clone());
    }

    let dbname = args
        .dbname
        .as_deref()
        .ok_or_else(|| PgmergeError::Usage("--dbname is required unless --uri is given".to_string()))?;

    let mut url = format!("postgres://{}", args.username);
    if let Some(password) = resolve_password(args)? {
        url.push(':');
        url.push_str(&password);
    }
    url.push('@');
    url.push_str(&args.host);
    url.push(':');
    url.push_str(&args.port.to_string());
    url.push('/');
    url.push_str(dbname);
    Ok(url)
}
