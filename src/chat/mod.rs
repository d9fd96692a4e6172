//! The messaging core. [`Chat`] exposes every conversation, ledger,
//! history, read-state, fan-out and thread operation as one call surface
//! over a [`Store`] and a [`Directory`].

mod conversations;
mod fanout;
mod history;
mod ledger;
mod threads;
mod unread;
mod users;

use std::future::Future;

use tokio::sync::broadcast;

use crate::{
    error::{ChatError, ChatResult},
    model::{Identity, Notification, Role, UserId},
    policy::{self, Action, Decision, DenyReason, Resource},
    store::{Directory, Store},
};

pub use users::Purged;

pub const DEFAULT_PAGE_SIZE: usize = 20;

const FEED_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct Chat<S, D> {
    store: S,
    directory: D,
    page_size: usize,
    feed: broadcast::Sender<Notification>,
}

impl<S: Store, D: Directory> Chat<S, D> {
    pub fn new(store: S, directory: D) -> Self {
        Self {
            store,
            directory,
            page_size: DEFAULT_PAGE_SIZE,
            feed: broadcast::channel(FEED_CAPACITY).0,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Live feed of notifications, delivered after the message that caused
    /// them has committed. Slow subscribers lag rather than block writers.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.feed.subscribe()
    }

    fn publish(&self, notification: Notification) {
        // no subscribers is fine
        let _ = self.feed.send(notification);
    }

    /// Directory view of a caller. Unknown handles act as guests.
    async fn actor(&self, user: UserId) -> ChatResult<Identity> {
        Ok(self
            .directory
            .resolve(user)
            .await?
            .unwrap_or(Identity {
                id: user,
                role: Role::Guest,
            }))
    }

    /// Runs one whole transactional attempt, and once more if the first
    /// attempt failed on a transient storage error.
    async fn atomically<T, F, Fut>(&self, op: &'static str, mut attempt: F) -> ChatResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ChatResult<T>>,
    {
        match attempt().await {
            Err(err) if err.is_transient() => {
                tracing::warn!(op, error = %err, "transient storage failure, retrying once");
                attempt().await.map_err(ChatError::exhausted)
            }
            outcome => outcome,
        }
    }
}

fn check(decision: Decision, deny: impl FnOnce(DenyReason) -> ChatError) -> ChatResult<()> {
    match decision {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => Err(deny(reason)),
    }
}

fn check_read(actor: &Identity, resource: Resource<'_>) -> ChatResult<()> {
    check(policy::authorize(actor, resource, Action::Read), |reason| {
        ChatError::Forbidden(reason.to_string())
    })
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::testing::*;
    use crate::error::{ChatError, StoreError};

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let chat = chat().await;
        let calls = AtomicUsize::new(0);

        let out = chat
            .atomically("retry_test", || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call == 0 {
                        Err(ChatError::Storage(StoreError::Transient("busy".into())))
                    } else {
                        Ok(call)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(out, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_transient_failure_surfaces_as_unavailable() {
        let chat = chat().await;
        let calls = AtomicUsize::new(0);

        let err = chat
            .atomically("retry_test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ChatError::Storage(StoreError::Transient("busy".into()))) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::StorageUnavailable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let chat = chat().await;
        let calls = AtomicUsize::new(0);

        let err = chat
            .atomically("retry_test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ChatError::EmptyBody) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::EmptyBody));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
