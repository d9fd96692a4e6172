//! Storage seams the chat core is written against.
//!
//! [`Store`] hands out [`StoreTx`] units of work; everything a single chat
//! operation reads and writes goes through one of them, so an operation
//! either commits as a whole or leaves no trace. Dropping a transaction
//! without calling [`StoreTx::commit`] rolls it back.

use std::{collections::BTreeSet, future::Future};

use crate::{
    error::StoreResult,
    model::{
        Conversation, ConversationId, Cursor, HistoryRecord, Identity, Message, MessageId,
        MessageQuery, Notification, Timestamp, UserId,
    },
};

pub mod sqlite;

pub use sqlite::SqliteStore;

pub trait Store: Clone + Send + Sync + 'static {
    type Tx: StoreTx + Send;

    fn begin(&self) -> impl Future<Output = StoreResult<Self::Tx>> + Send;

    /// Like [`Store::begin`], but holds the write lock from the start, so a
    /// read-then-write unit waits for other writers instead of failing.
    fn begin_write(&self) -> impl Future<Output = StoreResult<Self::Tx>> + Send;

    /// One page of a conversation's log in `(created_at, id)` order,
    /// strictly after `after` when given.
    fn messages_page(
        &self,
        conversation: ConversationId,
        query: MessageQuery,
        after: Option<Cursor>,
        limit: usize,
    ) -> impl Future<Output = StoreResult<Vec<Message>>> + Send;
}

pub trait StoreTx: Send {
    fn commit(self) -> impl Future<Output = StoreResult<()>> + Send;

    // conversations

    fn insert_conversation(
        &mut self,
        conversation: &Conversation,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn conversation(
        &mut self,
        id: ConversationId,
    ) -> impl Future<Output = StoreResult<Option<Conversation>>> + Send;

    /// Bumps the conversation's activity stamp. This is the first write of
    /// any operation that mutates a conversation, which serializes it against
    /// every other writer of the same conversation. `false` if it does not exist.
    fn touch_conversation(
        &mut self,
        id: ConversationId,
        at: Timestamp,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    fn conversations_of(
        &mut self,
        user: UserId,
    ) -> impl Future<Output = StoreResult<Vec<Conversation>>> + Send;

    fn participants(
        &mut self,
        conversation: ConversationId,
    ) -> impl Future<Output = StoreResult<BTreeSet<UserId>>> + Send;

    /// `false` if the user already was a participant.
    fn insert_participant(
        &mut self,
        conversation: ConversationId,
        user: UserId,
        at: Timestamp,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// `false` if the user was not a participant.
    fn delete_participant(
        &mut self,
        conversation: ConversationId,
        user: UserId,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    // messages

    fn message(&mut self, id: MessageId)
    -> impl Future<Output = StoreResult<Option<Message>>> + Send;

    fn latest_timestamp(
        &mut self,
        conversation: ConversationId,
    ) -> impl Future<Output = StoreResult<Option<Timestamp>>> + Send;

    fn insert_message(&mut self, message: &Message) -> impl Future<Output = StoreResult<()>> + Send;

    /// Writes back the mutable fields: body, edit marker, read flag.
    fn update_message(&mut self, message: &Message) -> impl Future<Output = StoreResult<()>> + Send;

    fn delete_message(&mut self, id: MessageId) -> impl Future<Output = StoreResult<bool>> + Send;

    fn replies_of(
        &mut self,
        parent: MessageId,
    ) -> impl Future<Output = StoreResult<Vec<Message>>> + Send;

    fn sent_by(&mut self, sender: UserId) -> impl Future<Output = StoreResult<Vec<MessageId>>> + Send;

    // read state

    fn unread_for(&mut self, user: UserId) -> impl Future<Output = StoreResult<Vec<Message>>> + Send;

    /// Flips one message to read. `false` if it was already read or is gone.
    fn mark_read(&mut self, id: MessageId) -> impl Future<Output = StoreResult<bool>> + Send;

    // history

    fn insert_history(
        &mut self,
        record: &HistoryRecord,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn history(
        &mut self,
        message: MessageId,
    ) -> impl Future<Output = StoreResult<Vec<HistoryRecord>>> + Send;

    fn delete_history(&mut self, message: MessageId) -> impl Future<Output = StoreResult<u64>> + Send;

    // notifications

    /// Inserts unless the message already has a notification; `false` then.
    fn insert_notification(
        &mut self,
        notification: &Notification,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    fn notification_for(
        &mut self,
        message: MessageId,
    ) -> impl Future<Output = StoreResult<Option<Notification>>> + Send;

    fn notifications_for(
        &mut self,
        recipient: UserId,
    ) -> impl Future<Output = StoreResult<Vec<Notification>>> + Send;

    fn delete_notification(
        &mut self,
        message: MessageId,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    fn delete_notifications_for(
        &mut self,
        recipient: UserId,
    ) -> impl Future<Output = StoreResult<u64>> + Send;
}

/// The identity directory: resolves handles, owns roles. Authentication
/// happens before the core is called.
pub trait Directory: Clone + Send + Sync + 'static {
    fn resolve(&self, user: UserId) -> impl Future<Output = StoreResult<Option<Identity>>> + Send;
}
