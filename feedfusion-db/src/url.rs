use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct PostgresEnv {
    user: String,
    password: Option<String>,
    password_file: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    db: String,
}

/// Assembles the connection URL from `POSTGRES_*` environment variables.
/// The password comes inline or from a secret file, whichever is set.
pub fn postgres_url_from_environment() -> String {
    let env: PostgresEnv =
        figment::Figment::from(figment::providers::Env::prefixed("POSTGRES_"))
            .extract()
            .expect("POSTGRES_* environment is missing or invalid");

    let raw_password = match (env.password, env.password_file) {
        (Some(password), _) => password,
        (None, Some(file)) => std::fs::read_to_string(&file)
            .unwrap_or_else(|err| panic!("Failed to read {}: {err}", file.display())),
        (None, None) => panic!("Set POSTGRES_PASSWORD or POSTGRES_PASSWORD_FILE"),
    };

    // Secret files routinely end in a newline; drop it. A newline anywhere
    // else would be silently cut off by the server's auth path, leaving a
    // weaker password than the operator intended, so refuse it instead of
    // connecting.
    let password = raw_password.trim_end_matches('\n');
    if password.contains('\n') {
        panic!("Postgres password contains an interior newline; refusing to truncate it");
    }

    format!(
        "postgres://{}:{}@{}:{}/{}",
        env.user,
        utf8_percent_encode(password, NON_ALPHANUMERIC),
        env.host.as_deref().unwrap_or("localhost"),
        env.port.unwrap_or(5432),
        env.db,
    )
}
