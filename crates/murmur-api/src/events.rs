use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use murmur_types::EventId;
use murmur_types::api::EventsResponse;
use murmur_types::events::Event;

use crate::error::ApiResult;
use crate::state::{AppState, run_blocking};

/// Long-poll the caller's event log.
///
/// Returns as soon as at least one event with id greater than `since_id`
/// exists, or with an empty list once `timeout_ms` (clamped to the
/// configured maximum) has elapsed. The waiter is registered before the
/// first query, so a commit landing between the query and the sleep still
/// wakes this call.
pub async fn wait_events(
    state: &AppState,
    token: String,
    since_id: EventId,
    timeout_ms: i64,
) -> ApiResult<EventsResponse> {
    let me = run_blocking(state, move |s| s.sessions.resolve(&token)).await?;

    let timeout = Duration::from_millis(timeout_ms.max(0) as u64).min(state.max_wait);
    let deadline = Instant::now() + timeout;
    let waiter = state.waiters.register(me);

    loop {
        let events = fetch(state, me, since_id).await?;
        if !events.is_empty() {
            trace!(user_id = me, since_id, count = events.len(), "events delivered");
            return Ok(EventsResponse { events });
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || !waiter.wait(remaining).await {
            return Ok(EventsResponse { events: Vec::new() });
        }
    }
}

async fn fetch(state: &AppState, user_id: i64, since_id: EventId) -> ApiResult<Vec<Event>> {
    run_blocking(state, move |s| {
        Ok(s.db
            .events_since(user_id, since_id)?
            .into_iter()
            .map(Into::into)
            .collect())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::{create_group, ensure_pair_group, leave_group};
    use crate::error::ApiError;
    use crate::messages::send_message;
    use crate::state::ServiceSettings;
    use crate::testing;
    use murmur_types::events::EventKind;

    #[tokio::test]
    async fn returns_pending_events_immediately() {
        let (state, _dir) = testing::state();
        let (alice, _) = testing::signup(&state, "a@test", "Alice").await;
        let (bob_token, bob) = testing::signup(&state, "b@test", "Bob").await;
        let cid = create_group(&state, alice, Some("G".into()), vec![bob])
            .await
            .unwrap()
            .conversation_id;

        let started = Instant::now();
        let res = wait_events(&state, bob_token, 0, 25_000).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(res.events.len(), 1);
        assert_eq!(res.events[0].kind, EventKind::GroupAdded);
        assert_eq!(res.events[0].conversation_id, Some(cid));
    }

    #[tokio::test]
    async fn empty_after_timeout() {
        let (state, _dir) = testing::state();
        let (token, me) = testing::signup(&state, "a@test", "Alice").await;

        let started = Instant::now();
        let res = wait_events(&state, token, 0, 100).await.unwrap();
        let elapsed = started.elapsed();
        assert!(res.events.is_empty());
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(5));
        assert_eq!(state.waiters.waiter_count(me), 0);
    }

    #[tokio::test]
    async fn zero_and_negative_timeouts_do_not_block() {
        let (state, _dir) = testing::state();
        let (token, _) = testing::signup(&state, "a@test", "Alice").await;

        let started = Instant::now();
        assert!(wait_events(&state, token.clone(), 0, 0).await.unwrap().events.is_empty());
        assert!(wait_events(&state, token, 0, -50).await.unwrap().events.is_empty());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn timeout_is_capped_by_settings() {
        let (state, _dir) = testing::state_with(ServiceSettings {
            max_wait: Duration::from_millis(50),
            ..ServiceSettings::default()
        });
        let (token, _) = testing::signup(&state, "a@test", "Alice").await;

        let started = Instant::now();
        let res = wait_events(&state, token, 0, 60_000).await.unwrap();
        assert!(res.events.is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn rejects_bad_token() {
        let (state, _dir) = testing::state();
        let err = wait_events(&state, "nope".into(), 0, 10).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated));
    }

    #[tokio::test]
    async fn wakes_when_a_message_arrives() {
        let (state, _dir) = testing::state();
        let (alice, _) = testing::signup(&state, "a@test", "Alice").await;
        let (bob_token, bob) = testing::signup(&state, "b@test", "Bob").await;
        let cid = ensure_pair_group(&state, alice.clone(), bob).await.unwrap().conversation_id;
        let cursor = wait_events(&state, bob_token.clone(), 0, 0).await.unwrap().events[0].id;

        let s = state.clone();
        let poll = tokio::spawn(async move { wait_events(&s, bob_token, cursor, 10_000).await });

        // let the poller park before sending
        tokio::time::sleep(Duration::from_millis(100)).await;
        let started = Instant::now();
        let sent = send_message(&state, alice, cid, "hi".into()).await.unwrap();

        let res = poll.await.unwrap().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(res.events.len(), 1);
        assert_eq!(res.events[0].kind, EventKind::Message);
        assert_eq!(res.events[0].message_id, Some(sent.message_id));
        assert_eq!(state.waiters.waiter_count(bob), 0);
    }

    #[tokio::test]
    async fn every_open_poll_for_a_user_wakes() {
        let (state, _dir) = testing::state();
        let (alice, _) = testing::signup(&state, "a@test", "Alice").await;
        let (bob_token, bob) = testing::signup(&state, "b@test", "Bob").await;

        let mut polls = Vec::new();
        for _ in 0..3 {
            let s = state.clone();
            let t = bob_token.clone();
            polls.push(tokio::spawn(async move { wait_events(&s, t, 0, 10_000).await }));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        create_group(&state, alice, None, vec![bob]).await.unwrap();

        for p in polls {
            let res = p.await.unwrap().unwrap();
            assert_eq!(res.events.len(), 1);
        }
    }

    #[tokio::test]
    async fn replaying_from_a_cursor_sees_everything_in_order() {
        let (state, _dir) = testing::state();
        let (alice, _) = testing::signup(&state, "a@test", "Alice").await;
        let (bob_token, bob) = testing::signup(&state, "b@test", "Bob").await;
        let (carol, carol_id) = testing::signup(&state, "c@test", "Carol").await;

        let cid = create_group(&state, alice.clone(), Some("G".into()), vec![bob, carol_id])
            .await
            .unwrap()
            .conversation_id;
        for i in 0..5 {
            send_message(&state, alice.clone(), cid, format!("m{}", i)).await.unwrap();
        }
        leave_group(&state, carol, cid).await.unwrap();

        let mut seen = Vec::new();
        let mut cursor = 0;
        loop {
            let res = wait_events(&state, bob_token.clone(), cursor, 0).await.unwrap();
            if res.events.is_empty() {
                break;
            }
            cursor = res.events.last().unwrap().id;
            seen.extend(res.events);
        }

        let kinds: Vec<_> = seen.iter().map(|e| e.kind).collect();
        assert_eq!(kinds.len(), 7);
        assert_eq!(kinds[0], EventKind::GroupAdded);
        assert!(kinds[1..6].iter().all(|k| *k == EventKind::Message));
        assert_eq!(kinds[6], EventKind::GroupRemoved);
        assert!(seen.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn polling_during_concurrent_sends_misses_nothing() {
        let (state, _dir) = testing::state();
        let (alice, _) = testing::signup(&state, "a@test", "Alice").await;
        let (bob_token, bob) = testing::signup(&state, "b@test", "Bob").await;
        let (carol, carol_id) = testing::signup(&state, "c@test", "Carol").await;
        let cid = create_group(&state, alice.clone(), None, vec![bob, carol_id])
            .await
            .unwrap()
            .conversation_id;

        const PER_SENDER: usize = 100;
        // one group_added plus every message from both senders
        let expected = 1 + 2 * PER_SENDER;

        let s = state.clone();
        let poller = tokio::spawn(async move {
            let mut seen = Vec::new();
            let mut cursor = 0;
            while seen.len() < expected {
                let res = wait_events(&s, bob_token.clone(), cursor, 2_000).await.unwrap();
                if let Some(last) = res.events.last() {
                    cursor = last.id;
                }
                seen.extend(res.events.into_iter().map(|e| e.id));
            }
            seen
        });

        let mut sends = Vec::new();
        for token in [alice, carol] {
            for i in 0..PER_SENDER {
                let s = state.clone();
                let token = token.clone();
                sends.push(tokio::spawn(async move {
                    send_message(&s, token, cid, format!("m{}", i)).await.unwrap();
                }));
            }
        }
        for send in sends {
            send.await.unwrap();
        }

        let seen = tokio::time::timeout(Duration::from_secs(30), poller)
            .await
            .expect("poller stalled")
            .unwrap();
        let stored: Vec<_> = state.db.events_since(bob, 0).unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(seen.len(), expected);
        assert_eq!(seen, stored);
    }
}
