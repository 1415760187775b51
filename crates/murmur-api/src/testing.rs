use std::sync::Arc;

use tempfile::TempDir;

use murmur_db::Database;
use murmur_types::UserId;

use crate::state::{AppState, AppStateInner, ServiceSettings};

pub fn open_db() -> (Arc<Database>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("murmur.db")).unwrap();
    (Arc::new(db), dir)
}

pub fn state_with(settings: ServiceSettings) -> (AppState, TempDir) {
    let (db, dir) = open_db();
    (AppStateInner::new(db, settings).unwrap(), dir)
}

pub fn state() -> (AppState, TempDir) {
    state_with(ServiceSettings::default())
}

/// Register and log in; returns (token, user id).
pub async fn signup(state: &AppState, email: &str, name: &str) -> (String, UserId) {
    crate::auth::register(state, email.into(), name.into(), "secret-pw".into())
        .await
        .unwrap();
    let login = crate::auth::login(state, email.into(), "secret-pw".into())
        .await
        .unwrap();
    (login.token, login.user_id)
}
