use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::trace;

use murmur_types::UserId;

/// Tracks parked long-poll callers per user and wakes them when new events
/// are committed for that user.
///
/// The registry never carries event data. A wake-up only means "re-read the
/// store"; the store stays the source of truth.
#[derive(Clone, Default)]
pub struct WaitRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_slot: AtomicU64,
    /// user_id -> (slot_id -> wake handle)
    slots: Mutex<HashMap<UserId, HashMap<u64, Arc<Notify>>>>,
}

impl RegistryInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, HashMap<u64, Arc<Notify>>>> {
        // the map stays consistent even if a holder panicked
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl WaitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a wake slot for `user_id`.
    ///
    /// Register before reading the store: a signal that lands between the
    /// read and the wait is kept as a permit, so it cannot be lost.
    pub fn register(&self, user_id: UserId) -> Waiter {
        let slot_id = self.inner.next_slot.fetch_add(1, Ordering::Relaxed);
        let notify = Arc::new(Notify::new());
        self.inner
            .lock()
            .entry(user_id)
            .or_default()
            .insert(slot_id, notify.clone());
        trace!(user_id, slot_id, "waiter registered");

        Waiter {
            inner: self.inner.clone(),
            user_id,
            slot_id,
            notify,
        }
    }

    /// Wake every waiter of `user_id`. Returns how many were signalled.
    pub fn notify_user(&self, user_id: UserId) -> usize {
        let slots = self.inner.lock();
        let Some(waiters) = slots.get(&user_id) else {
            return 0;
        };
        for notify in waiters.values() {
            notify.notify_one();
        }
        waiters.len()
    }

    /// Wake the waiters of each user in `user_ids`.
    pub fn notify_users<I>(&self, user_ids: I) -> usize
    where
        I: IntoIterator<Item = UserId>,
    {
        user_ids.into_iter().map(|uid| self.notify_user(uid)).sum()
    }

    /// Number of parked or about-to-park callers for `user_id`.
    pub fn waiter_count(&self, user_id: UserId) -> usize {
        self.inner.lock().get(&user_id).map_or(0, HashMap::len)
    }
}

/// One registered long-poll caller. Dropping it releases the slot, which
/// covers timeouts, early returns and cancelled requests alike.
pub struct Waiter {
    inner: Arc<RegistryInner>,
    user_id: UserId,
    slot_id: u64,
    notify: Arc<Notify>,
}

impl Waiter {
    /// Park until signalled or until `timeout` elapses. Returns `true` when
    /// woken by a signal (including one stored before this call).
    pub async fn wait(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.notify.notified()).await.is_ok()
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        let mut slots = self.inner.lock();
        if let Some(waiters) = slots.get_mut(&self.user_id) {
            waiters.remove(&self.slot_id);
            if waiters.is_empty() {
                slots.remove(&self.user_id);
            }
        }
        trace!(user_id = self.user_id, slot_id = self.slot_id, "waiter released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn signal_before_wait_is_not_lost() {
        let registry = WaitRegistry::new();
        let waiter = registry.register(1);
        assert_eq!(registry.notify_user(1), 1);
        assert!(waiter.wait(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn wait_times_out_without_signal() {
        let registry = WaitRegistry::new();
        let waiter = registry.register(1);
        let start = Instant::now();
        assert!(!waiter.wait(Duration::from_millis(50)).await);
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn every_waiter_of_a_user_is_woken() {
        let registry = WaitRegistry::new();
        let tab_one = registry.register(7);
        let tab_two = registry.register(7);
        let other_user = registry.register(8);

        let r = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            r.notify_users([7]);
        });

        let (one, two) = tokio::join!(
            tab_one.wait(Duration::from_secs(5)),
            tab_two.wait(Duration::from_secs(5))
        );
        assert!(one && two);
        assert!(!other_user.wait(Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn dropped_waiters_release_their_slots() {
        let registry = WaitRegistry::new();
        let first = registry.register(3);
        let second = registry.register(3);
        assert_eq!(registry.waiter_count(3), 2);

        drop(first);
        assert_eq!(registry.waiter_count(3), 1);
        assert!(!second.wait(Duration::from_millis(10)).await);
        drop(second);

        assert_eq!(registry.waiter_count(3), 0);
        // the emptied user entry is gone too
        assert!(registry.inner.lock().is_empty());
        assert_eq!(registry.notify_user(3), 0);
    }

    #[tokio::test]
    async fn cancelled_wait_releases_slot() {
        let registry = WaitRegistry::new();
        let r = registry.clone();
        let handle = tokio::spawn(async move {
            let waiter = r.register(5);
            waiter.wait(Duration::from_secs(30)).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(registry.waiter_count(5), 1);

        handle.abort();
        let _ = handle.await;
        assert_eq!(registry.waiter_count(5), 0);
    }
}
