use std::mem;

use crate::{
    error::ChatResult,
    model::{Edit, History, HistoryId, HistoryRecord, Message, MessageId, Timestamp, UserId},
    store::{Directory, Store, StoreTx},
};

use super::Chat;

impl<S: Store, D: Directory> Chat<S, D> {
    /// Unknown messages report [`History::NotEdited`] too.
    pub async fn history_for(&self, id: MessageId) -> ChatResult<History> {
        let mut tx = self.store.begin().await?;
        Ok(History::from_records(tx.history(id).await?))
    }
}

/// Archives the current body of `message` and replaces it with `new_body`.
/// The caller has already checked that the bodies differ.
pub(super) async fn record_edit<T: StoreTx>(
    tx: &mut T,
    message: &mut Message,
    editor: UserId,
    new_body: &str,
    at: Timestamp,
) -> ChatResult<HistoryRecord> {
    let version = tx.history(message.id).await?.len() as u32 + 1;
    let record = HistoryRecord {
        id: HistoryId::new(),
        message: message.id,
        version,
        body: mem::replace(&mut message.body, new_body.to_owned()),
        edited_at: at,
        edited_by: editor,
    };

    message.edited.get_or_insert(Edit { at, by: editor });
    tx.insert_history(&record).await?;
    tx.update_message(message).await?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use crate::model::{History, MessageId};

    #[tokio::test]
    async fn unknown_and_unedited_messages_have_no_history() {
        let (chat, convo, a, b) = pair().await;
        let message = chat.append(convo.id, a, b, "hi", None).await.unwrap();

        assert_eq!(chat.history_for(message.id).await.unwrap(), History::NotEdited);
        assert_eq!(chat.history_for(MessageId::new()).await.unwrap(), History::NotEdited);
    }

    #[tokio::test]
    async fn each_content_change_archives_the_previous_body() {
        let (chat, convo, a, b) = pair().await;
        let message = chat.append(convo.id, a, b, "hi", None).await.unwrap();

        chat.edit(message.id, a, "hi!").await.unwrap();
        chat.edit(message.id, a, "hi!").await.unwrap();
        chat.edit(message.id, a, "hello").await.unwrap();

        let history = chat.history_for(message.id).await.unwrap();
        let records = history.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].body, "hi");
        assert_eq!(records[0].version, 1);
        assert_eq!(records[1].body, "hi!");
        assert_eq!(records[1].version, 2);
        assert!(records.iter().all(|r| r.edited_by == a && r.message == message.id));
        assert!(records[0].edited_at <= records[1].edited_at);
    }

    #[tokio::test]
    async fn deleting_a_message_drops_its_history() {
        let (chat, convo, a, b) = pair().await;
        let message = chat.append(convo.id, a, b, "draft", None).await.unwrap();
        chat.edit(message.id, a, "final").await.unwrap();

        chat.delete(message.id, a).await.unwrap();
        assert!(chat.history_for(message.id).await.unwrap().is_empty());
    }
}
