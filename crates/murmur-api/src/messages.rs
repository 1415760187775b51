use tracing::debug;

use murmur_db::conversations::{Access, PostOutcome};
use murmur_types::api::{MessagesResponse, SendMessageResponse};
use murmur_types::{ConversationId, MessageId};

use crate::error::{ApiError, ApiResult};
use crate::responder;
use crate::state::{AppState, AppStateInner, run_blocking};

const DEFAULT_PAGE: i64 = 100;
const MAX_PAGE: i64 = 500;

/// Post a message. The message row and its `message` events commit
/// together; waiters are woken afterwards.
pub async fn send_message(
    state: &AppState,
    token: String,
    conversation_id: ConversationId,
    content: String,
) -> ApiResult<SendMessageResponse> {
    let (message_id, content) = run_blocking(state, move |s| {
        let me = s.sessions.resolve(&token)?;
        require_member(s, conversation_id, me)?;
        if content.trim().is_empty() {
            return Err(ApiError::EmptyContent);
        }

        match s.db.post_message(conversation_id, me, &content, true)? {
            PostOutcome::Posted { message_id, recipients } => {
                s.waiters.notify_users(recipients.iter().copied());
                debug!(conversation_id, message_id, sender = me, fanout = recipients.len(), "message posted");
                Ok((message_id, content))
            }
            // membership changed between the check and the write
            PostOutcome::NotMember => Err(ApiError::NotAMember(conversation_id)),
            PostOutcome::ConversationMissing => Err(ApiError::ConversationNotFound(conversation_id)),
        }
    })
    .await?;

    // the reply is produced outside the request and never fails the send
    let prompt = state.responder.as_ref().and_then(|r| r.prompt_for(&content));
    let triggered = prompt.is_some();
    if let Some(prompt) = prompt {
        tokio::spawn(responder::reply(state.clone(), conversation_id, prompt));
    }

    Ok(SendMessageResponse {
        message_id,
        responder: triggered,
    })
}

/// A page of history, oldest first within the page.
pub async fn get_messages(
    state: &AppState,
    token: String,
    conversation_id: ConversationId,
    limit: Option<i64>,
    offset: Option<i64>,
) -> ApiResult<MessagesResponse> {
    let limit = limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE) as u32;
    let offset = offset.unwrap_or(0).clamp(0, i64::from(u32::MAX)) as u32;

    run_blocking(state, move |s| {
        let me = s.sessions.resolve(&token)?;
        require_member(s, conversation_id, me)?;
        let messages = s
            .db
            .get_messages(conversation_id, limit, offset)?
            .into_iter()
            .map(Into::into)
            .collect();
        Ok(MessagesResponse { messages })
    })
    .await
}

/// Every message after `last_message_id`, ascending. Safe to call again
/// with a stale cursor: it simply returns more.
pub async fn get_messages_since(
    state: &AppState,
    token: String,
    conversation_id: ConversationId,
    last_message_id: MessageId,
) -> ApiResult<MessagesResponse> {
    run_blocking(state, move |s| {
        let me = s.sessions.resolve(&token)?;
        require_member(s, conversation_id, me)?;
        let messages = s
            .db
            .get_messages_since(conversation_id, last_message_id)?
            .into_iter()
            .map(Into::into)
            .collect();
        Ok(MessagesResponse { messages })
    })
    .await
}

fn require_member(s: &AppStateInner, conversation_id: ConversationId, user_id: i64) -> ApiResult<()> {
    match s.db.access(conversation_id, user_id)? {
        Access::Member => Ok(()),
        Access::NotMember => Err(ApiError::NotAMember(conversation_id)),
        Access::ConversationMissing => Err(ApiError::ConversationNotFound(conversation_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::create_group;
    use crate::testing;

    async fn group_of_three(state: &AppState) -> ([String; 3], ConversationId) {
        let (a, _) = testing::signup(state, "a@test", "Alice").await;
        let (b, bob) = testing::signup(state, "b@test", "Bob").await;
        let (c, carol) = testing::signup(state, "c@test", "Carol").await;
        let cid = create_group(state, a.clone(), Some("G".into()), vec![bob, carol])
            .await
            .unwrap()
            .conversation_id;
        ([a, b, c], cid)
    }

    #[tokio::test]
    async fn send_and_read_back() {
        let (state, _dir) = testing::state();
        let ([alice, bob, _], cid) = group_of_three(&state).await;

        let sent = send_message(&state, alice, cid, "hi".into()).await.unwrap();
        assert!(!sent.responder);

        let msgs = get_messages_since(&state, bob, cid, 0).await.unwrap().messages;
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].id, sent.message_id);
        assert_eq!(msgs[0].content, "hi");
        assert_eq!(msgs[0].sender_name, "Alice");
    }

    #[tokio::test]
    async fn blank_content_is_rejected() {
        let (state, _dir) = testing::state();
        let ([alice, _, _], cid) = group_of_three(&state).await;
        let err = send_message(&state, alice, cid, " \n\t ".into()).await.unwrap_err();
        assert!(matches!(err, ApiError::EmptyContent));
    }

    #[tokio::test]
    async fn outsiders_are_denied() {
        let (state, _dir) = testing::state();
        let ([alice, _, _], cid) = group_of_three(&state).await;
        let (dave, _) = testing::signup(&state, "d@test", "Dave").await;

        send_message(&state, alice, cid, "secret".into()).await.unwrap();
        assert!(matches!(
            send_message(&state, dave.clone(), cid, "let me in".into()).await,
            Err(ApiError::NotAMember(_))
        ));
        assert!(matches!(
            get_messages(&state, dave.clone(), cid, None, None).await,
            Err(ApiError::NotAMember(_))
        ));
        assert!(matches!(
            get_messages_since(&state, dave.clone(), cid, 0).await,
            Err(ApiError::NotAMember(_))
        ));
        assert!(matches!(
            get_messages(&state, dave, cid + 1000, None, None).await,
            Err(ApiError::ConversationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn paging_clamps_limit_and_orders_oldest_first() {
        let (state, _dir) = testing::state();
        let ([alice, bob, _], cid) = group_of_three(&state).await;
        for i in 0..4 {
            send_message(&state, alice.clone(), cid, format!("m{}", i)).await.unwrap();
        }

        let page = get_messages(&state, bob.clone(), cid, Some(2), Some(0)).await.unwrap();
        let contents: Vec<_> = page.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3"]);

        // zero and negative limits still return a page
        let one = get_messages(&state, bob.clone(), cid, Some(0), None).await.unwrap();
        assert_eq!(one.messages.len(), 1);
        let all = get_messages(&state, bob, cid, None, Some(-5)).await.unwrap();
        assert_eq!(all.messages.len(), 4);
    }

    #[tokio::test]
    async fn concurrent_senders_leave_no_gaps() {
        let (state, _dir) = testing::state();
        let ([alice, bob, carol], cid) = group_of_three(&state).await;

        let mut handles = Vec::new();
        for (who, token) in [("a", alice), ("b", bob.clone()), ("c", carol)] {
            for i in 0..10 {
                let s = state.clone();
                let token = token.clone();
                handles.push(tokio::spawn(async move {
                    send_message(&s, token, cid, format!("{}{}", who, i)).await.unwrap().message_id
                }));
            }
        }
        let mut sent = Vec::new();
        for h in handles {
            sent.push(h.await.unwrap());
        }
        sent.sort_unstable();

        let got: Vec<_> = get_messages_since(&state, bob.clone(), cid, 0)
            .await
            .unwrap()
            .messages
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(got, sent);

        let cursor = sent[14];
        let tail: Vec<_> = get_messages_since(&state, bob, cid, cursor)
            .await
            .unwrap()
            .messages
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(tail, sent[15..].to_vec());
    }
}
