use std::path::PathBuf;

/// Dispatcher configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development; override via
/// environment variables (a `.env` file is honoured).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8250`).
    pub port: u16,
    /// Queue store URL (default: `sqlite://simdock.db`).
    pub database_url: String,
    /// Config staging area: one subdirectory per active job.
    pub staging_root: PathBuf,
    /// Results archive area: `<root>/YYYY/M/D/<sid>/`.
    pub results_root: PathBuf,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Grace period for in-flight handlers during shutdown (default: `5`).
    pub shutdown_grace_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default               |
    /// |------------------------|-----------------------|
    /// | `HOST`                 | `0.0.0.0`             |
    /// | `PORT`                 | `8250`                |
    /// | `DATABASE_URL`         | `sqlite://simdock.db` |
    /// | `STAGING_DIR`          | `./staging`           |
    /// | `RESULTS_DIR`          | `./results`           |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                  |
    /// | `SHUTDOWN_GRACE_SECS`  | `5`                   |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8250".into())
            .parse()
            .expect("PORT must be a valid u16");

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://simdock.db".into());

        let staging_root = PathBuf::from(
            std::env::var("STAGING_DIR").unwrap_or_else(|_| "./staging".into()),
        );

        let results_root = PathBuf::from(
            std::env::var("RESULTS_DIR").unwrap_or_else(|_| "./results".into()),
        );

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_grace_secs: u64 = std::env::var("SHUTDOWN_GRACE_SECS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("SHUTDOWN_GRACE_SECS must be a valid u64");

        Self {
            host,
            port,
            database_url,
            staging_root,
            results_root,
            request_timeout_secs,
            shutdown_grace_secs,
        }
    }
}
