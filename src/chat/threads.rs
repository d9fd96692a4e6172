use std::collections::VecDeque;

use crate::{
    error::ChatResult,
    model::{Message, MessageId},
    store::{Directory, Store, StoreTx},
};

use super::Chat;

impl<S: Store, D: Directory> Chat<S, D> {
    /// Direct replies only.
    pub async fn replies_of(&self, id: MessageId) -> ChatResult<Vec<Message>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.replies_of(id).await?)
    }
}

/// Deletes `root` and every reply beneath it, leaves first, along with
/// their history and notifications. Returns the number of messages removed.
pub(super) async fn delete_thread<T: StoreTx>(tx: &mut T, root: MessageId) -> ChatResult<usize> {
    let mut order = vec![root];
    let mut queue = VecDeque::from([root]);
    while let Some(id) = queue.pop_front() {
        for reply in tx.replies_of(id).await? {
            order.push(reply.id);
            queue.push_back(reply.id);
        }
    }

    let mut removed = 0;
    for id in order.into_iter().rev() {
        tx.delete_history(id).await?;
        tx.delete_notification(id).await?;
        if tx.delete_message(id).await? {
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use crate::model::MessageQuery;

    #[tokio::test]
    async fn replies_are_listed_under_their_parent() {
        let (chat, convo, a, b) = pair().await;
        let root = chat.append(convo.id, a, b, "hi", None).await.unwrap();
        let first = chat.append(convo.id, b, a, "yo", Some(root.id)).await.unwrap();
        let second = chat.append(convo.id, a, b, "sup", Some(root.id)).await.unwrap();
        let nested = chat.append(convo.id, b, a, "nm", Some(second.id)).await.unwrap();

        assert_eq!(chat.replies_of(root.id).await.unwrap(), vec![first, second.clone()]);
        assert_eq!(chat.replies_of(second.id).await.unwrap(), vec![nested.clone()]);
        assert!(chat.replies_of(nested.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_root_takes_the_whole_thread() {
        let (chat, convo, a, b) = pair().await;
        let root = chat.append(convo.id, a, b, "hi", None).await.unwrap();
        let reply = chat.append(convo.id, b, a, "yo", Some(root.id)).await.unwrap();
        chat.append(convo.id, a, b, "deeper", Some(reply.id)).await.unwrap();
        let bystander = chat.append(convo.id, b, a, "unrelated", None).await.unwrap();
        chat.edit(reply.id, b, "yo!").await.unwrap();

        assert_eq!(chat.delete(root.id, a).await.unwrap(), 3);

        let left = chat.list_all(convo.id, a, MessageQuery::default()).await.unwrap();
        assert_eq!(left, vec![bystander.clone()]);
        assert!(chat.history_for(reply.id).await.unwrap().is_empty());

        let inbox = chat.notifications_for(a).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].message, bystander.id);
    }
}
