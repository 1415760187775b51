use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tracing::error;

use murmur_db::Database;
use murmur_gateway::WaitRegistry;

use crate::error::{ApiError, ApiResult};
use crate::responder::{Responder, ResponderConfig};
use crate::session::SessionManager;

pub type AppState = Arc<AppStateInner>;

/// Everything a handler needs, built once at startup and shared.
pub struct AppStateInner {
    pub db: Arc<Database>,
    pub sessions: SessionManager,
    pub waiters: WaitRegistry,
    pub responder: Option<Responder>,
    /// Upper bound on a single `wait_events` call.
    pub max_wait: Duration,
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub session_ttl: chrono::Duration,
    pub max_wait: Duration,
    pub responder: Option<ResponderConfig>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            session_ttl: chrono::Duration::hours(24),
            max_wait: Duration::from_secs(30),
            responder: None,
        }
    }
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, settings: ServiceSettings) -> anyhow::Result<AppState> {
        let responder = settings.responder.map(Responder::new).transpose()?;
        Ok(Arc::new(Self {
            sessions: SessionManager::new(db.clone(), settings.session_ttl),
            db,
            waiters: WaitRegistry::new(),
            responder,
            max_wait: settings.max_wait,
        }))
    }
}

/// Run store work on the blocking pool so SQLite and argon2 never stall the
/// async runtime.
pub(crate) async fn run_blocking<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&AppStateInner) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&*state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow!("blocking task failed: {}", e))
        })?
}
