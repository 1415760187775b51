use murmur_types::api::{LoginResponse, RegisterResponse};

use crate::error::{ApiError, ApiResult};
use crate::responder::BOT_EMAIL;
use crate::state::{AppState, run_blocking};

pub async fn register(
    state: &AppState,
    email: String,
    name: String,
    password: String,
) -> ApiResult<RegisterResponse> {
    // the responder's synthetic sender owns this address
    if email.trim() == BOT_EMAIL {
        return Err(ApiError::EmailInUse);
    }
    let user_id = run_blocking(state, move |s| s.sessions.register(&email, &name, &password)).await?;
    Ok(RegisterResponse { user_id })
}

pub async fn login(state: &AppState, email: String, password: String) -> ApiResult<LoginResponse> {
    run_blocking(state, move |s| s.sessions.login(&email, &password)).await
}

pub async fn logout(state: &AppState, token: String) -> ApiResult<()> {
    run_blocking(state, move |s| s.sessions.logout(&token)).await
}
