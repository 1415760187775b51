use std::time::Duration;

use tracing::{debug, info, warn};

use murmur_api::AppState;

/// Background task that drops expired sessions.
///
/// Expired tokens are already refused on lookup; this only keeps the
/// sessions table from growing without bound.
pub async fn run_session_sweep_loop(state: AppState, every: Duration) {
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;

        let sessions = state.clone();
        match tokio::task::spawn_blocking(move || sessions.sessions.sweep_expired()).await {
            Ok(Ok(0)) => debug!("Session sweep: nothing expired"),
            Ok(Ok(count)) => info!("Session sweep: removed {} expired sessions", count),
            Ok(Err(e)) => warn!("Session sweep error: {:#}", e),
            Err(e) => warn!("Session sweep task failed: {}", e),
        }
    }
}
