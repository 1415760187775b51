use murmur_types::api::UsersResponse;

use crate::error::ApiResult;
use crate::state::{AppState, run_blocking};

/// Every registered user, ordered by name, for picking group members.
pub async fn list_users(state: &AppState, token: String) -> ApiResult<UsersResponse> {
    run_blocking(state, move |s| {
        s.sessions.resolve(&token)?;
        let users = s.db.list_users()?.into_iter().map(Into::into).collect();
        Ok(UsersResponse { users })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn lists_everyone_without_password_hashes() {
        let (state, _dir) = testing::state();
        let (token, _) = testing::signup(&state, "b@test", "Bob").await;
        testing::signup(&state, "a@test", "Alice").await;

        let res = list_users(&state, token).await.unwrap();
        let names: Vec<_> = res.users.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);

        let json = serde_json::to_string(&res).unwrap();
        assert!(!json.contains("argon2"));
    }
}
