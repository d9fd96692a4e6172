use crate::{
    error::{ChatError, ChatResult},
    model::{Message, MessageId, UserId},
    policy::{self, Action, Resource},
    store::{Directory, Store, StoreTx},
};

use super::{Chat, check};

impl<S: Store, D: Directory> Chat<S, D> {
    pub async fn unread_for(&self, user: UserId) -> ChatResult<Vec<Message>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.unread_for(user).await?)
    }

    /// Marks everything currently unread for `user` as read. A message that
    /// lands after the unread set was taken stays unread.
    pub async fn mark_all_read(&self, user: UserId) -> ChatResult<usize> {
        Ok(self.take_unread(user).await?.len())
    }

    /// Like [`Chat::mark_all_read`], but hands back the messages it marked.
    pub async fn take_unread(&self, user: UserId) -> ChatResult<Vec<Message>> {
        let taken = self
            .atomically("take_unread", move || async move {
                let mut tx = self.store.begin_write().await?;
                let mut unread = tx.unread_for(user).await?;
                for message in &mut unread {
                    tx.mark_read(message.id).await?;
                    message.read = true;
                }
                tx.commit().await?;
                Ok(unread)
            })
            .await?;

        if !taken.is_empty() {
            tracing::debug!(%user, count = taken.len(), "marked unread messages read");
        }
        Ok(taken)
    }

    /// Marks one message read. Only its receiver may; returns whether the
    /// flag actually changed.
    pub async fn mark_read(&self, id: MessageId, user: UserId) -> ChatResult<bool> {
        let actor = self.actor(user).await?;

        self.atomically("mark_read", move || async move {
            let mut tx = self.store.begin_write().await?;
            let message = tx
                .message(id)
                .await?
                .ok_or_else(|| ChatError::not_found("message", id))?;

            check(
                policy::authorize(&actor, Resource::Message(&message), Action::MarkRead),
                |reason| ChatError::Forbidden(reason.to_string()),
            )?;

            let changed = tx.mark_read(id).await?;
            tx.commit().await?;
            Ok(changed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use crate::{error::ChatError, model::MessageId};

    #[tokio::test]
    async fn unread_tracks_the_receiver_only() {
        let (chat, convo, a, b) = pair().await;
        let first = chat.append(convo.id, a, b, "one", None).await.unwrap();
        let second = chat.append(convo.id, a, b, "two", None).await.unwrap();
        chat.append(convo.id, b, a, "back", None).await.unwrap();

        assert_eq!(chat.unread_for(b).await.unwrap(), vec![first, second]);
        assert_eq!(chat.unread_for(a).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mark_all_read_empties_the_inbox() {
        let (chat, convo, a, b) = pair().await;
        chat.append(convo.id, a, b, "one", None).await.unwrap();
        chat.append(convo.id, a, b, "two", None).await.unwrap();

        assert_eq!(chat.mark_all_read(b).await.unwrap(), 2);
        assert!(chat.unread_for(b).await.unwrap().is_empty());
        assert_eq!(chat.mark_all_read(b).await.unwrap(), 0);

        let later = chat.append(convo.id, a, b, "three", None).await.unwrap();
        assert_eq!(chat.unread_for(b).await.unwrap(), vec![later]);
    }

    #[tokio::test]
    async fn take_unread_returns_what_it_marked() {
        let (chat, convo, a, b) = pair().await;
        let sent = chat.append(convo.id, a, b, "one", None).await.unwrap();

        let taken = chat.take_unread(b).await.unwrap();
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].id, sent.id);
        assert!(taken[0].read);
        assert!(chat.get_message(sent.id, a).await.unwrap().read);
    }

    #[tokio::test]
    async fn only_the_receiver_marks_a_message() {
        let (chat, convo, a, b) = pair().await;
        let sent = chat.append(convo.id, a, b, "one", None).await.unwrap();

        assert!(matches!(chat.mark_read(sent.id, a).await, Err(ChatError::Forbidden(_))));
        assert!(chat.mark_read(sent.id, b).await.unwrap());
        assert!(!chat.mark_read(sent.id, b).await.unwrap());
        assert!(matches!(
            chat.mark_read(MessageId::new(), b).await,
            Err(ChatError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn edits_leave_read_state_alone() {
        let (chat, convo, a, b) = pair().await;
        let sent = chat.append(convo.id, a, b, "one", None).await.unwrap();
        chat.mark_read(sent.id, b).await.unwrap();

        let edited = chat.edit(sent.id, a, "uno").await.unwrap();
        assert!(edited.read);
        assert!(chat.unread_for(b).await.unwrap().is_empty());
    }
}
