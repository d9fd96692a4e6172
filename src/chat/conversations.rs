use std::collections::BTreeSet;

use crate::{
    error::{ChatError, ChatResult},
    model::{Conversation, ConversationId, MIN_PARTICIPANTS, Timestamp, UserId},
    policy::{self, Action, Resource},
    store::{Directory, Store, StoreTx},
};

use super::{Chat, check, check_read};

impl<S: Store, D: Directory> Chat<S, D> {
    /// Opens a conversation between at least two distinct users.
    pub async fn create(
        &self,
        participants: impl IntoIterator<Item = UserId>,
        name: Option<String>,
    ) -> ChatResult<Conversation> {
        let participants: BTreeSet<UserId> = participants.into_iter().collect();
        if participants.len() < MIN_PARTICIPANTS {
            return Err(ChatError::InsufficientParticipants {
                remaining: participants.len(),
            });
        }

        let conversation = Conversation {
            id: ConversationId::new(),
            name,
            participants,
            created_at: Timestamp::now(),
        };

        let created = &conversation;
        self.atomically("create_conversation", move || async move {
            let mut tx = self.store.begin_write().await?;
            tx.insert_conversation(created).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        tracing::info!(
            conversation = %conversation.id,
            participants = conversation.participants.len(),
            "conversation created"
        );
        Ok(conversation)
    }

    pub async fn conversation(
        &self,
        id: ConversationId,
        requester: UserId,
    ) -> ChatResult<Conversation> {
        let actor = self.actor(requester).await?;
        let mut tx = self.store.begin().await?;
        let conversation = tx
            .conversation(id)
            .await?
            .ok_or_else(|| ChatError::not_found("conversation", id))?;

        check_read(
            &actor,
            Resource::Conversation {
                participants: &conversation.participants,
            },
        )?;
        Ok(conversation)
    }

    /// Conversations `user` takes part in, most recently active first.
    pub async fn conversations_of(&self, user: UserId) -> ChatResult<Vec<Conversation>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.conversations_of(user).await?)
    }

    pub async fn participants_of(&self, id: ConversationId) -> ChatResult<BTreeSet<UserId>> {
        let mut tx = self.store.begin().await?;
        tx.conversation(id)
            .await?
            .map(|conversation| conversation.participants)
            .ok_or_else(|| ChatError::not_found("conversation", id))
    }

    pub async fn add_participant(
        &self,
        id: ConversationId,
        actor: UserId,
        user: UserId,
    ) -> ChatResult<Conversation> {
        let actor = self.actor(actor).await?;

        let conversation = self
            .atomically("add_participant", move || async move {
                let now = Timestamp::now();
                let mut tx = self.store.begin_write().await?;
                let mut conversation = locked_conversation(&mut tx, id, now).await?;

                check(
                    policy::authorize(
                        &actor,
                        Resource::Conversation {
                            participants: &conversation.participants,
                        },
                        Action::ManageParticipants,
                    ),
                    |reason| ChatError::Forbidden(reason.to_string()),
                )?;

                if tx.insert_participant(id, user, now).await? {
                    conversation.participants.insert(user);
                }
                tx.commit().await?;
                Ok(conversation)
            })
            .await?;

        tracing::info!(conversation = %id, %user, "participant added");
        Ok(conversation)
    }

    /// Removes `user`, refusing to leave fewer than two participants behind.
    pub async fn remove_participant(
        &self,
        id: ConversationId,
        actor: UserId,
        user: UserId,
    ) -> ChatResult<Conversation> {
        let actor = self.actor(actor).await?;

        let conversation = self
            .atomically("remove_participant", move || async move {
                let mut tx = self.store.begin_write().await?;
                let mut conversation = locked_conversation(&mut tx, id, Timestamp::now()).await?;

                check(
                    policy::authorize(
                        &actor,
                        Resource::Conversation {
                            participants: &conversation.participants,
                        },
                        Action::ManageParticipants,
                    ),
                    |reason| ChatError::Forbidden(reason.to_string()),
                )?;

                if !conversation.has_participant(user) {
                    return Err(ChatError::NotParticipant {
                        user,
                        conversation: id,
                    });
                }
                let remaining = conversation.participants.len() - 1;
                if remaining < MIN_PARTICIPANTS {
                    return Err(ChatError::InsufficientParticipants { remaining });
                }

                tx.delete_participant(id, user).await?;
                tx.commit().await?;
                conversation.participants.remove(&user);
                Ok(conversation)
            })
            .await?;

        tracing::info!(conversation = %id, %user, "participant removed");
        Ok(conversation)
    }
}

/// Takes the conversation's write lock, then reads it.
pub(super) async fn locked_conversation<T: StoreTx>(
    tx: &mut T,
    id: ConversationId,
    now: Timestamp,
) -> ChatResult<Conversation> {
    if !tx.touch_conversation(id, now).await? {
        return Err(ChatError::not_found("conversation", id));
    }
    tx.conversation(id)
        .await?
        .ok_or_else(|| ChatError::not_found("conversation", id))
}
