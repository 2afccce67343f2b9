use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Shared dispatcher state available to all handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is an `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Queue store connection pool (single connection; the dispatcher is
    /// the sole writer).
    pub pool: simdock_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Serialises the select-config-send-commit sequence of `Book` and
    /// `Rebook`. The owned guard travels into the response body stream,
    /// so the lock is held until the lease either commits or dies with
    /// the connection.
    pub booking: Arc<Mutex<()>>,
    /// Serialises staging writes and result extraction. Two tarballs
    /// must never extract interleaved, and ingest must not overlap
    /// staging for the same job.
    pub fs_lock: Arc<Mutex<()>>,
    /// Trips when a `Shutdown` command (or a signal) asks the server to
    /// stop accepting work.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(pool: simdock_db::DbPool, config: ServerConfig) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            booking: Arc::new(Mutex::new(())),
            fs_lock: Arc::new(Mutex::new(())),
            shutdown: CancellationToken::new(),
        }
    }
}
