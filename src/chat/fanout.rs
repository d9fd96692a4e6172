use crate::{
    error::{ChatError, ChatResult, StoreError},
    model::{Message, Notification, NotificationId, UserId},
    store::{Directory, Store, StoreTx},
};

use super::Chat;

/// Turns a freshly inserted message into its receiver's notification, inside
/// the transaction that inserted it. Running it twice for one message leaves
/// one notification and returns that one.
pub(super) async fn on_message_created<T: StoreTx>(
    tx: &mut T,
    message: &Message,
) -> ChatResult<Notification> {
    let notification = Notification {
        id: NotificationId::new(),
        recipient: message.receiver,
        message: message.id,
        created_at: message.created_at,
    };

    let fanout_failed = |source: StoreError| ChatError::FanoutFailed {
        message: message.id,
        source,
    };

    if tx
        .insert_notification(&notification)
        .await
        .map_err(fanout_failed)?
    {
        tracing::debug!(message = %message.id, recipient = %message.receiver, "notification created");
        return Ok(notification);
    }

    tracing::debug!(message = %message.id, "notification already present");
    tx.notification_for(message.id)
        .await
        .map_err(fanout_failed)?
        .ok_or_else(|| ChatError::not_found("notification for message", message.id))
}

impl<S: Store, D: Directory> Chat<S, D> {
    pub async fn notifications_for(&self, user: UserId) -> ChatResult<Vec<Notification>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.notifications_for(user).await?)
    }
}
