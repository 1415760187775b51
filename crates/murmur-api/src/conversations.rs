use tracing::{debug, info};

use murmur_db::conversations::{CreateGroupOutcome, LeaveOutcome, PairOutcome};
use murmur_types::api::{
    ConversationsResponse, CreateGroupResponse, LeaveResponse, LeaveStatus, PairGroupResponse,
};
use murmur_types::{ConversationId, UserId};

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, run_blocking};

/// Create a group of the caller plus `member_ids`. Everyone but the caller
/// gets a `group_added` event.
pub async fn create_group(
    state: &AppState,
    token: String,
    title: Option<String>,
    member_ids: Vec<UserId>,
) -> ApiResult<CreateGroupResponse> {
    run_blocking(state, move |s| {
        let me = s.sessions.resolve(&token)?;

        let others: Vec<UserId> = member_ids.into_iter().filter(|&id| id != me).collect();
        if others.is_empty() {
            return Err(ApiError::EmptyMembership);
        }
        let title = title.as_deref().map(str::trim).filter(|t| !t.is_empty());

        match s.db.create_group(me, title, &others)? {
            CreateGroupOutcome::Created { conversation_id, recipients } => {
                s.waiters.notify_users(recipients.iter().copied());
                info!(conversation_id, creator = me, members = recipients.len() + 1, "group created");
                Ok(CreateGroupResponse { conversation_id })
            }
            CreateGroupOutcome::UnknownUsers(ids) => Err(ApiError::UnknownUser(ids)),
        }
    })
    .await
}

/// Find or create the direct conversation between the caller and `other`.
pub async fn ensure_pair_group(
    state: &AppState,
    token: String,
    other: UserId,
) -> ApiResult<PairGroupResponse> {
    run_blocking(state, move |s| {
        let me = s.sessions.resolve(&token)?;
        if other == me {
            return Err(ApiError::InvalidInput(
                "cannot start a direct conversation with yourself".into(),
            ));
        }

        match s.db.ensure_pair(me, other)? {
            PairOutcome::Existing(conversation_id) => Ok(PairGroupResponse {
                conversation_id,
                created: false,
            }),
            PairOutcome::Created { conversation_id, recipient } => {
                s.waiters.notify_user(recipient);
                info!(conversation_id, a = me, b = other, "direct conversation created");
                Ok(PairGroupResponse {
                    conversation_id,
                    created: true,
                })
            }
            PairOutcome::UnknownUser => Err(ApiError::UnknownUser(vec![other])),
        }
    })
    .await
}

pub async fn list_conversations(state: &AppState, token: String) -> ApiResult<ConversationsResponse> {
    run_blocking(state, move |s| {
        let me = s.sessions.resolve(&token)?;
        let conversations = s
            .db
            .list_conversations(me)?
            .into_iter()
            .map(Into::into)
            .collect();
        Ok(ConversationsResponse { conversations })
    })
    .await
}

/// Leave a conversation. The last member out deletes it, history included.
pub async fn leave_group(
    state: &AppState,
    token: String,
    conversation_id: ConversationId,
) -> ApiResult<LeaveResponse> {
    run_blocking(state, move |s| {
        let me = s.sessions.resolve(&token)?;

        let status = match s.db.leave_conversation(conversation_id, me)? {
            LeaveOutcome::Left { remaining } => {
                s.waiters.notify_users(remaining.iter().copied());
                debug!(conversation_id, user_id = me, remaining = remaining.len(), "member left");
                LeaveStatus::Left
            }
            LeaveOutcome::Removed => {
                info!(conversation_id, "last member left, conversation deleted");
                LeaveStatus::ConversationRemoved
            }
            LeaveOutcome::NotMember => return Err(ApiError::NotAMember(conversation_id)),
            LeaveOutcome::ConversationMissing => {
                return Err(ApiError::ConversationNotFound(conversation_id));
            }
        };
        Ok(LeaveResponse { status })
    })
    .await
}
