use futures_util::{
    StreamExt, TryStreamExt,
    stream::{self, BoxStream},
};

use crate::{
    error::{ChatError, ChatResult},
    model::{ConversationId, Cursor, Message, MessageId, MessageQuery, Timestamp, UserId},
    policy::{self, Action, Resource},
    store::{Directory, Store, StoreTx},
};

use super::{Chat, check, check_read, conversations::locked_conversation, fanout, history, threads};

impl<S: Store, D: Directory> Chat<S, D> {
    /// Appends a message to a conversation and notifies its receiver, both in
    /// one transaction. The message is stamped after every message already in
    /// the conversation, so read order is append order.
    pub async fn append(
        &self,
        conversation: ConversationId,
        sender: UserId,
        receiver: UserId,
        body: &str,
        parent: Option<MessageId>,
    ) -> ChatResult<Message> {
        if body.trim().is_empty() {
            return Err(ChatError::EmptyBody);
        }
        let actor = self.actor(sender).await?;

        let (message, notification) = self
            .atomically("append", move || async move {
                let now = Timestamp::now();
                let mut tx = self.store.begin_write().await?;
                let convo = locked_conversation(&mut tx, conversation, now).await?;

                let participants = Resource::Conversation {
                    participants: &convo.participants,
                };
                check(policy::authorize(&actor, participants, Action::Post), |_| {
                    ChatError::NotParticipant {
                        user: sender,
                        conversation,
                    }
                })?;
                if !convo.has_participant(receiver) {
                    return Err(ChatError::NotParticipant {
                        user: receiver,
                        conversation,
                    });
                }

                if let Some(parent) = parent {
                    match tx.message(parent).await? {
                        Some(found) if found.conversation == conversation => {}
                        _ => return Err(ChatError::InvalidParent { parent, conversation }),
                    }
                }

                let created_at = match tx.latest_timestamp(conversation).await? {
                    Some(latest) if latest >= now => latest.successor(),
                    _ => now,
                };

                let message = Message {
                    id: MessageId::new(),
                    conversation,
                    sender,
                    receiver,
                    body: body.to_owned(),
                    created_at,
                    edited: None,
                    read: false,
                    parent,
                };
                tx.insert_message(&message).await?;
                let notification = fanout::on_message_created(&mut tx, &message).await?;
                tx.commit().await?;

                Ok((message, notification))
            })
            .await?;

        tracing::info!(
            %conversation,
            message = %message.id,
            %sender,
            reply = message.parent.is_some(),
            "message appended"
        );
        self.publish(notification);
        Ok(message)
    }

    /// Replaces a message body. A different body archives the old one in the
    /// message's history; the same body changes nothing.
    pub async fn edit(&self, id: MessageId, editor: UserId, new_body: &str) -> ChatResult<Message> {
        let actor = self.actor(editor).await?;

        self.atomically("edit", move || async move {
            let now = Timestamp::now();
            let mut tx = self.store.begin_write().await?;
            let mut message = tx
                .message(id)
                .await?
                .ok_or_else(|| ChatError::not_found("message", id))?;

            check(
                policy::authorize(&actor, Resource::Message(&message), Action::Edit),
                |_| ChatError::NotSender {
                    user: editor,
                    message: id,
                },
            )?;

            if new_body.trim().is_empty() {
                return Err(ChatError::EmptyBody);
            }
            if message.body == new_body {
                return Ok(message);
            }

            tx.touch_conversation(message.conversation, now).await?;
            let record = history::record_edit(&mut tx, &mut message, editor, new_body, now).await?;
            tx.commit().await?;

            tracing::info!(message = %id, version = record.version, "message edited");
            Ok(message)
        })
        .await
    }

    pub async fn get_message(&self, id: MessageId, requester: UserId) -> ChatResult<Message> {
        let actor = self.actor(requester).await?;
        let mut tx = self.store.begin().await?;
        let message = tx
            .message(id)
            .await?
            .ok_or_else(|| ChatError::not_found("message", id))?;

        let participants = tx.participants(message.conversation).await?;
        check_read(
            &actor,
            Resource::Conversation {
                participants: &participants,
            },
        )?;
        Ok(message)
    }

    /// Lazily walks a conversation oldest first, one page per fetch. Each
    /// call starts over from the beginning; dropping the stream is free.
    pub async fn list(
        &self,
        conversation: ConversationId,
        requester: UserId,
        query: MessageQuery,
    ) -> ChatResult<BoxStream<'static, ChatResult<Message>>> {
        let actor = self.actor(requester).await?;
        {
            let mut tx = self.store.begin().await?;
            let participants = tx
                .conversation(conversation)
                .await?
                .map(|convo| convo.participants)
                .ok_or_else(|| ChatError::not_found("conversation", conversation))?;
            check_read(
                &actor,
                Resource::Conversation {
                    participants: &participants,
                },
            )?;
        }

        let store = self.store.clone();
        let page_size = self.page_size;
        let pages = stream::try_unfold(Some(None), move |state: Option<Option<Cursor>>| {
            let store = store.clone();
            async move {
                let Some(after) = state else {
                    return Ok(None);
                };
                next_page(store, conversation, query, after, page_size)
                    .await
                    .map(|(page, next)| {
                        let page = page.into_iter().map(Ok::<_, ChatError>);
                        Some((stream::iter(page), next))
                    })
            }
        });

        Ok(pages.try_flatten().boxed())
    }

    pub async fn list_all(
        &self,
        conversation: ConversationId,
        requester: UserId,
        query: MessageQuery,
    ) -> ChatResult<Vec<Message>> {
        self.list(conversation, requester, query)
            .await?
            .try_collect()
            .await
    }

    /// Deletes a message together with its replies, their history and their
    /// notifications. Returns how many messages went away.
    pub async fn delete(&self, id: MessageId, requester: UserId) -> ChatResult<usize> {
        let actor = self.actor(requester).await?;

        let removed = self
            .atomically("delete_message", move || async move {
                let mut tx = self.store.begin_write().await?;
                let message = tx
                    .message(id)
                    .await?
                    .ok_or_else(|| ChatError::not_found("message", id))?;

                check(
                    policy::authorize(&actor, Resource::Message(&message), Action::Delete),
                    |reason| ChatError::Forbidden(reason.to_string()),
                )?;

                tx.touch_conversation(message.conversation, Timestamp::now())
                    .await?;
                let removed = threads::delete_thread(&mut tx, id).await?;
                tx.commit().await?;
                Ok(removed)
            })
            .await?;

        tracing::info!(message = %id, removed, by = %requester, "message deleted");
        Ok(removed)
    }
}

type Page = (Vec<Message>, Option<Option<Cursor>>);

/// Fetches one page and the unfold state for the next: `None` once a short
/// page shows the log is exhausted.
async fn next_page<S: Store>(
    store: S,
    conversation: ConversationId,
    query: MessageQuery,
    after: Option<Cursor>,
    page_size: usize,
) -> ChatResult<Page> {
    let page = store
        .messages_page(conversation, query, after, page_size)
        .await?;
    let next = match page.last() {
        Some(last) if page.len() >= page_size => Some(Some(last.cursor())),
        _ => None,
    };
    Ok((page, next))
}
