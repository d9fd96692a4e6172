use serde::Serialize;

use crate::{
    error::{ChatError, ChatResult},
    model::UserId,
    policy::{self, Action, Resource},
    store::{Directory, Store, StoreTx},
};

use super::{Chat, check, threads};

/// What an account purge removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Purged {
    pub messages: usize,
    pub notifications: u64,
}

impl<S: Store, D: Directory> Chat<S, D> {
    /// Removes every message `user` sent (with the replies under them, their
    /// history and notifications) plus every notification addressed to
    /// `user`. Memberships are left to the caller.
    pub async fn purge_user(&self, user: UserId, requester: UserId) -> ChatResult<Purged> {
        let actor = self.actor(requester).await?;
        check(
            policy::authorize(&actor, Resource::User(user), Action::Purge),
            |reason| ChatError::Forbidden(reason.to_string()),
        )?;

        let purged = self
            .atomically("purge_user", move || async move {
                let mut tx = self.store.begin_write().await?;
                let mut purged = Purged::default();
                for id in tx.sent_by(user).await? {
                    purged.messages += threads::delete_thread(&mut tx, id).await?;
                }
                purged.notifications = tx.delete_notifications_for(user).await?;
                tx.commit().await?;
                Ok(purged)
            })
            .await?;

        tracing::info!(
            %user,
            by = %requester,
            messages = purged.messages,
            notifications = purged.notifications,
            "user purged"
        );
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::Purged;
    use crate::{
        error::ChatError,
        model::{MessageQuery, Role},
    };

    #[tokio::test]
    async fn purge_removes_what_the_user_sent_and_received() {
        let (chat, convo, a, b) = pair().await;
        let m1 = chat.append(convo.id, a, b, "hi", None).await.unwrap();
        chat.edit(m1.id, a, "hi!").await.unwrap();
        let reply = chat.append(convo.id, b, a, "yo", Some(m1.id)).await.unwrap();
        let kept = chat.append(convo.id, b, a, "still here", None).await.unwrap();
        chat.append(convo.id, a, b, "bye", None).await.unwrap();

        let purged = chat.purge_user(a, a).await.unwrap();
        assert_eq!(
            purged,
            Purged {
                messages: 3,
                notifications: 1,
            }
        );

        let left = chat.list_all(convo.id, b, MessageQuery::default()).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, kept.id);
        assert!(chat.history_for(m1.id).await.unwrap().is_empty());
        assert!(chat.notifications_for(a).await.unwrap().is_empty());
        assert!(chat.notifications_for(b).await.unwrap().is_empty());
        assert!(chat.get_message(reply.id, b).await.is_err());
        // membership survives the purge
        assert!(chat.participants_of(convo.id).await.unwrap().contains(&a));
    }

    #[tokio::test]
    async fn only_self_or_admin_may_purge() {
        let (chat, convo, a, b) = pair().await;
        chat.append(convo.id, a, b, "hi", None).await.unwrap();

        assert!(matches!(chat.purge_user(a, b).await, Err(ChatError::Forbidden(_))));

        let admin = chat.store().register_user("root", Role::Admin).await.unwrap().id;
        let purged = chat.purge_user(a, admin).await.unwrap();
        assert_eq!(purged.messages, 1);
        assert!(chat.unread_for(b).await.unwrap().is_empty());
    }
}
