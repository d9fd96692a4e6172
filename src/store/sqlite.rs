use std::{collections::BTreeSet, str::FromStr, time::Duration};

use sqlx::{
    QueryBuilder, Sqlite, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

use crate::{
    error::{StoreError, StoreResult},
    model::{
        Conversation, ConversationId, Cursor, Edit, HistoryRecord, Identity, Message, MessageId,
        MessageQuery, Notification, Role, Timestamp, UserId,
    },
};

use super::{Directory, Store, StoreTx};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY NOT NULL,
        username TEXT NOT NULL UNIQUE,
        role TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS participants (
        conversation_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        joined_at INTEGER NOT NULL,
        PRIMARY KEY (conversation_id, user_id),
        FOREIGN KEY (conversation_id) REFERENCES conversations (id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS participants_by_user ON participants (user_id)",
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY NOT NULL,
        conversation_id TEXT NOT NULL,
        sender_id TEXT NOT NULL,
        receiver_id TEXT NOT NULL,
        body TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        edited_at INTEGER,
        edited_by TEXT,
        is_read INTEGER NOT NULL DEFAULT 0,
        parent_id TEXT,
        FOREIGN KEY (conversation_id) REFERENCES conversations (id) ON DELETE CASCADE,
        FOREIGN KEY (parent_id) REFERENCES messages (id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS messages_by_conversation ON messages (conversation_id, created_at, id)",
    "CREATE INDEX IF NOT EXISTS messages_unread ON messages (receiver_id, is_read, created_at)",
    "CREATE INDEX IF NOT EXISTS messages_by_parent ON messages (parent_id, created_at)",
    "CREATE INDEX IF NOT EXISTS messages_by_sender ON messages (sender_id)",
    r#"
    CREATE TABLE IF NOT EXISTS message_history (
        id TEXT PRIMARY KEY NOT NULL,
        message_id TEXT NOT NULL,
        version INTEGER NOT NULL,
        body TEXT NOT NULL,
        edited_at INTEGER NOT NULL,
        edited_by TEXT NOT NULL,
        UNIQUE (message_id, version),
        FOREIGN KEY (message_id) REFERENCES messages (id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id TEXT PRIMARY KEY NOT NULL,
        recipient_id TEXT NOT NULL,
        message_id TEXT NOT NULL UNIQUE,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (message_id) REFERENCES messages (id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS notifications_by_recipient ON notifications (recipient_id, created_at)",
];

const MESSAGE_COLUMNS: &str =
    "id,conversation_id,sender_id,receiver_id,body,created_at,edited_at,edited_by,is_read,parent_id";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let transient = match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
            // SQLITE_BUSY and SQLITE_LOCKED, including their extended codes
            sqlx::Error::Database(db) => db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
            _ => false,
        };

        if transient {
            StoreError::Transient(Box::new(err))
        } else {
            StoreError::Backend(Box::new(err))
        }
    }
}

fn parse_id<T: FromStr<Err = uuid::Error>>(column: &str, raw: &str) -> StoreResult<T> {
    raw.parse()
        .map_err(|err| StoreError::Corrupt(format!("{column} {raw:?}: {err}")))
}

fn parse_opt_id<T: FromStr<Err = uuid::Error>>(
    column: &str,
    raw: Option<&str>,
) -> StoreResult<Option<T>> {
    raw.map(|raw| parse_id(column, raw)).transpose()
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    conversation_id: String,
    sender_id: String,
    receiver_id: String,
    body: String,
    created_at: i64,
    edited_at: Option<i64>,
    edited_by: Option<String>,
    is_read: bool,
    parent_id: Option<String>,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> StoreResult<Self> {
        let edited = match (row.edited_at, row.edited_by.as_deref()) {
            (Some(at), Some(by)) => Some(Edit {
                at: Timestamp::from_micros(at),
                by: parse_id("edited_by", by)?,
            }),
            (None, None) => None,
            _ => {
                return Err(StoreError::Corrupt(format!(
                    "message {} has a partial edit marker",
                    row.id
                )));
            }
        };

        Ok(Message {
            id: parse_id("id", &row.id)?,
            conversation: parse_id("conversation_id", &row.conversation_id)?,
            sender: parse_id("sender_id", &row.sender_id)?,
            receiver: parse_id("receiver_id", &row.receiver_id)?,
            body: row.body,
            created_at: Timestamp::from_micros(row.created_at),
            edited,
            read: row.is_read,
            parent: parse_opt_id("parent_id", row.parent_id.as_deref())?,
        })
    }
}

fn into_messages(rows: Vec<MessageRow>) -> StoreResult<Vec<Message>> {
    rows.into_iter().map(Message::try_from).collect()
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: String,
    message_id: String,
    version: i64,
    body: String,
    edited_at: i64,
    edited_by: String,
}

impl TryFrom<HistoryRow> for HistoryRecord {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> StoreResult<Self> {
        Ok(HistoryRecord {
            id: parse_id("id", &row.id)?,
            message: parse_id("message_id", &row.message_id)?,
            version: u32::try_from(row.version)
                .map_err(|_| StoreError::Corrupt(format!("history version {}", row.version)))?,
            body: row.body,
            edited_at: Timestamp::from_micros(row.edited_at),
            edited_by: parse_id("edited_by", &row.edited_by)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    recipient_id: String,
    message_id: String,
    created_at: i64,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> StoreResult<Self> {
        Ok(Notification {
            id: parse_id("id", &row.id)?,
            recipient: parse_id("recipient_id", &row.recipient_id)?,
            message: parse_id("message_id", &row.message_id)?,
            created_at: Timestamp::from_micros(row.created_at),
        })
    }
}

/// SQLite-backed [`Store`] and [`Directory`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(
        url: &str,
        max_connections: u32,
        busy_timeout: Duration,
    ) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// A private in-memory database. One connection that never expires,
    /// since every connection to `:memory:` sees its own database.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!(tables = 6, "schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn register_user(&self, username: &str, role: Role) -> StoreResult<Identity> {
        let identity = Identity {
            id: UserId::new(),
            role,
        };
        sqlx::query("INSERT INTO users (id,username,role,created_at) VALUES (?,?,?,?)")
            .bind(identity.id.to_string())
            .bind(username)
            .bind(role.as_str())
            .bind(Timestamp::now().as_micros())
            .execute(&self.pool)
            .await?;

        tracing::info!(user = %identity.id, %role, "registered user");
        Ok(identity)
    }

    pub async fn remove_user(&self, user: UserId) -> StoreResult<bool> {
        let removed = sqlx::query("DELETE FROM users WHERE id=?")
            .bind(user.to_string())
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed > 0)
    }
}

impl Directory for SqliteStore {
    async fn resolve(&self, user: UserId) -> StoreResult<Option<Identity>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT role FROM users WHERE id=?")
            .bind(user.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(role,)| {
            Ok(Identity {
                id: user,
                role: role.parse().map_err(StoreError::Corrupt)?,
            })
        })
        .transpose()
    }
}

impl Store for SqliteStore {
    type Tx = SqliteTx;

    async fn begin(&self) -> StoreResult<SqliteTx> {
        Ok(SqliteTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn begin_write(&self) -> StoreResult<SqliteTx> {
        Ok(SqliteTx {
            tx: self.pool.begin_with("BEGIN IMMEDIATE").await?,
        })
    }

    async fn messages_page(
        &self,
        conversation: ConversationId,
        query: MessageQuery,
        after: Option<Cursor>,
        limit: usize,
    ) -> StoreResult<Vec<Message>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = "
        ));
        qb.push_bind(conversation.to_string());

        if let Some(sender) = query.sender {
            qb.push(" AND sender_id = ").push_bind(sender.to_string());
        }
        if let Some(since) = query.since {
            qb.push(" AND created_at >= ").push_bind(since.as_micros());
        }
        if let Some(until) = query.until {
            qb.push(" AND created_at < ").push_bind(until.as_micros());
        }
        if let Some(Cursor { created_at, id }) = after {
            qb.push(" AND (created_at > ")
                .push_bind(created_at.as_micros())
                .push(" OR (created_at = ")
                .push_bind(created_at.as_micros())
                .push(" AND id > ")
                .push_bind(id.to_string())
                .push("))");
        }
        qb.push(" ORDER BY created_at, id LIMIT ")
            .push_bind(limit as i64);

        let rows = qb
            .build_query_as::<MessageRow>()
            .fetch_all(&self.pool)
            .await?;
        into_messages(rows)
    }
}

pub struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
}

impl SqliteTx {
    async fn load_conversation(
        &mut self,
        (id, name, created_at): (String, Option<String>, i64),
    ) -> StoreResult<Conversation> {
        let id: ConversationId = parse_id("id", &id)?;
        let participants = self.participants(id).await?;
        Ok(Conversation {
            id,
            name,
            participants,
            created_at: Timestamp::from_micros(created_at),
        })
    }
}

impl StoreTx for SqliteTx {
    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn insert_conversation(&mut self, conversation: &Conversation) -> StoreResult<()> {
        let created_at = conversation.created_at.as_micros();
        sqlx::query("INSERT INTO conversations (id,name,created_at,updated_at) VALUES (?,?,?,?)")
            .bind(conversation.id.to_string())
            .bind(conversation.name.as_deref())
            .bind(created_at)
            .bind(created_at)
            .execute(&mut *self.tx)
            .await?;

        for user in &conversation.participants {
            self.insert_participant(conversation.id, *user, conversation.created_at)
                .await?;
        }
        Ok(())
    }

    async fn conversation(&mut self, id: ConversationId) -> StoreResult<Option<Conversation>> {
        let row: Option<(String, Option<String>, i64)> =
            sqlx::query_as("SELECT id,name,created_at FROM conversations WHERE id=?")
                .bind(id.to_string())
                .fetch_optional(&mut *self.tx)
                .await?;

        match row {
            Some(row) => Ok(Some(self.load_conversation(row).await?)),
            None => Ok(None),
        }
    }

    async fn touch_conversation(&mut self, id: ConversationId, at: Timestamp) -> StoreResult<bool> {
        let touched = sqlx::query("UPDATE conversations SET updated_at=MAX(updated_at,?) WHERE id=?")
            .bind(at.as_micros())
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
        Ok(touched > 0)
    }

    async fn conversations_of(&mut self, user: UserId) -> StoreResult<Vec<Conversation>> {
        let rows: Vec<(String, Option<String>, i64)> = sqlx::query_as(
            r#"
            SELECT c.id,c.name,c.created_at FROM conversations c
            JOIN participants p ON p.conversation_id = c.id
            WHERE p.user_id=?
            ORDER BY c.updated_at DESC, c.id DESC
            "#,
        )
        .bind(user.to_string())
        .fetch_all(&mut *self.tx)
        .await?;

        let mut conversations = Vec::with_capacity(rows.len());
        for row in rows {
            conversations.push(self.load_conversation(row).await?);
        }
        Ok(conversations)
    }

    async fn participants(&mut self, conversation: ConversationId) -> StoreResult<BTreeSet<UserId>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT user_id FROM participants WHERE conversation_id=?")
                .bind(conversation.to_string())
                .fetch_all(&mut *self.tx)
                .await?;

        rows.iter()
            .map(|(user,)| parse_id("user_id", user))
            .collect()
    }

    async fn insert_participant(
        &mut self,
        conversation: ConversationId,
        user: UserId,
        at: Timestamp,
    ) -> StoreResult<bool> {
        let inserted = sqlx::query(
            "INSERT INTO participants (conversation_id,user_id,joined_at) VALUES (?,?,?) ON CONFLICT DO NOTHING",
        )
        .bind(conversation.to_string())
        .bind(user.to_string())
        .bind(at.as_micros())
        .execute(&mut *self.tx)
        .await?
        .rows_affected();
        Ok(inserted > 0)
    }

    async fn delete_participant(
        &mut self,
        conversation: ConversationId,
        user: UserId,
    ) -> StoreResult<bool> {
        let deleted = sqlx::query("DELETE FROM participants WHERE conversation_id=? AND user_id=?")
            .bind(conversation.to_string())
            .bind(user.to_string())
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    async fn message(&mut self, id: MessageId) -> StoreResult<Option<Message>> {
        sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id=?"
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(Message::try_from)
        .transpose()
    }

    async fn latest_timestamp(
        &mut self,
        conversation: ConversationId,
    ) -> StoreResult<Option<Timestamp>> {
        let (latest,): (Option<i64>,) =
            sqlx::query_as("SELECT MAX(created_at) FROM messages WHERE conversation_id=?")
                .bind(conversation.to_string())
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(latest.map(Timestamp::from_micros))
    }

    async fn insert_message(&mut self, message: &Message) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?,?,?,?,?,?,?,?,?,?)"
        ))
        .bind(message.id.to_string())
        .bind(message.conversation.to_string())
        .bind(message.sender.to_string())
        .bind(message.receiver.to_string())
        .bind(&message.body)
        .bind(message.created_at.as_micros())
        .bind(message.edited.map(|edit| edit.at.as_micros()))
        .bind(message.edited.map(|edit| edit.by.to_string()))
        .bind(message.read)
        .bind(message.parent.as_ref().map(MessageId::to_string))
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_message(&mut self, message: &Message) -> StoreResult<()> {
        sqlx::query("UPDATE messages SET body=?,edited_at=?,edited_by=?,is_read=? WHERE id=?")
            .bind(&message.body)
            .bind(message.edited.map(|edit| edit.at.as_micros()))
            .bind(message.edited.map(|edit| edit.by.to_string()))
            .bind(message.read)
            .bind(message.id.to_string())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_message(&mut self, id: MessageId) -> StoreResult<bool> {
        let deleted = sqlx::query("DELETE FROM messages WHERE id=?")
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    async fn replies_of(&mut self, parent: MessageId) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE parent_id=? ORDER BY created_at, id"
        ))
        .bind(parent.to_string())
        .fetch_all(&mut *self.tx)
        .await?;
        into_messages(rows)
    }

    async fn sent_by(&mut self, sender: UserId) -> StoreResult<Vec<MessageId>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM messages WHERE sender_id=? ORDER BY created_at, id")
                .bind(sender.to_string())
                .fetch_all(&mut *self.tx)
                .await?;

        rows.iter().map(|(id,)| parse_id("id", id)).collect()
    }

    async fn unread_for(&mut self, user: UserId) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE receiver_id=? AND is_read=0 ORDER BY created_at, id"
        ))
        .bind(user.to_string())
        .fetch_all(&mut *self.tx)
        .await?;
        into_messages(rows)
    }

    async fn mark_read(&mut self, id: MessageId) -> StoreResult<bool> {
        let marked = sqlx::query("UPDATE messages SET is_read=1 WHERE id=? AND is_read=0")
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
        Ok(marked > 0)
    }

    async fn insert_history(&mut self, record: &HistoryRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO message_history (id,message_id,version,body,edited_at,edited_by) VALUES (?,?,?,?,?,?)",
        )
        .bind(record.id.to_string())
        .bind(record.message.to_string())
        .bind(i64::from(record.version))
        .bind(&record.body)
        .bind(record.edited_at.as_micros())
        .bind(record.edited_by.to_string())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn history(&mut self, message: MessageId) -> StoreResult<Vec<HistoryRecord>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT id,message_id,version,body,edited_at,edited_by FROM message_history WHERE message_id=? ORDER BY version",
        )
        .bind(message.to_string())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(HistoryRecord::try_from).collect()
    }

    async fn delete_history(&mut self, message: MessageId) -> StoreResult<u64> {
        let deleted = sqlx::query("DELETE FROM message_history WHERE message_id=?")
            .bind(message.to_string())
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    async fn insert_notification(&mut self, notification: &Notification) -> StoreResult<bool> {
        let inserted = sqlx::query(
            "INSERT INTO notifications (id,recipient_id,message_id,created_at) VALUES (?,?,?,?) ON CONFLICT (message_id) DO NOTHING",
        )
        .bind(notification.id.to_string())
        .bind(notification.recipient.to_string())
        .bind(notification.message.to_string())
        .bind(notification.created_at.as_micros())
        .execute(&mut *self.tx)
        .await?
        .rows_affected();
        Ok(inserted > 0)
    }

    async fn notification_for(&mut self, message: MessageId) -> StoreResult<Option<Notification>> {
        sqlx::query_as::<_, NotificationRow>(
            "SELECT id,recipient_id,message_id,created_at FROM notifications WHERE message_id=?",
        )
        .bind(message.to_string())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(Notification::try_from)
        .transpose()
    }

    async fn notifications_for(&mut self, recipient: UserId) -> StoreResult<Vec<Notification>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            "SELECT id,recipient_id,message_id,created_at FROM notifications WHERE recipient_id=? ORDER BY created_at, id",
        )
        .bind(recipient.to_string())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn delete_notification(&mut self, message: MessageId) -> StoreResult<bool> {
        let deleted = sqlx::query("DELETE FROM notifications WHERE message_id=?")
            .bind(message.to_string())
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    async fn delete_notifications_for(&mut self, recipient: UserId) -> StoreResult<u64> {
        let deleted = sqlx::query("DELETE FROM notifications WHERE recipient_id=?")
            .bind(recipient.to_string())
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NotificationId;

    async fn store() -> SqliteStore {
        SqliteStore::in_memory().await.unwrap()
    }

    fn message(conversation: ConversationId, sender: UserId, receiver: UserId, at: i64) -> Message {
        Message {
            id: MessageId::new(),
            conversation,
            sender,
            receiver,
            body: format!("at {at}"),
            created_at: Timestamp::from_micros(at),
            edited: None,
            read: false,
            parent: None,
        }
    }

    async fn seeded_conversation(store: &SqliteStore) -> (Conversation, UserId, UserId) {
        let (a, b) = (UserId::new(), UserId::new());
        let conversation = Conversation {
            id: ConversationId::new(),
            name: Some("general".into()),
            participants: BTreeSet::from([a, b]),
            created_at: Timestamp::now(),
        };
        let mut tx = store.begin().await.unwrap();
        tx.insert_conversation(&conversation).await.unwrap();
        tx.commit().await.unwrap();
        (conversation, a, b)
    }

    #[tokio::test]
    async fn conversation_round_trip() {
        let store = store().await;
        let (conversation, a, _) = seeded_conversation(&store).await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.conversation(conversation.id).await.unwrap(), Some(conversation.clone()));
        assert_eq!(tx.conversations_of(a).await.unwrap(), vec![conversation.clone()]);
        assert!(tx.conversation(ConversationId::new()).await.unwrap().is_none());
        assert!(!tx.insert_participant(conversation.id, a, Timestamp::now()).await.unwrap());
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = store().await;
        let (conversation, a, b) = seeded_conversation(&store).await;
        let msg = message(conversation.id, a, b, 10);

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_message(&msg).await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        assert!(tx.message(msg.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pages_follow_keyset_order() {
        let store = store().await;
        let (conversation, a, b) = seeded_conversation(&store).await;

        let mut tx = store.begin().await.unwrap();
        let mut written = vec![];
        for at in [30, 10, 20, 20] {
            let msg = message(conversation.id, a, b, at);
            tx.insert_message(&msg).await.unwrap();
            written.push(msg);
        }
        tx.commit().await.unwrap();
        written.sort_by_key(Message::cursor);

        let first = store
            .messages_page(conversation.id, MessageQuery::default(), None, 3)
            .await
            .unwrap();
        assert_eq!(first, written[..3]);

        let rest = store
            .messages_page(
                conversation.id,
                MessageQuery::default(),
                Some(first[2].cursor()),
                3,
            )
            .await
            .unwrap();
        assert_eq!(rest, written[3..]);
    }

    #[tokio::test]
    async fn page_filters_by_sender_and_window() {
        let store = store().await;
        let (conversation, a, b) = seeded_conversation(&store).await;

        let mut tx = store.begin().await.unwrap();
        for (sender, receiver, at) in [(a, b, 10), (b, a, 20), (a, b, 30)] {
            tx.insert_message(&message(conversation.id, sender, receiver, at))
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();

        let from_a = MessageQuery {
            sender: Some(a),
            ..Default::default()
        };
        let page = store
            .messages_page(conversation.id, from_a, None, 10)
            .await
            .unwrap();
        assert_eq!(page.len(), 2);

        let window = MessageQuery {
            since: Some(Timestamp::from_micros(20)),
            until: Some(Timestamp::from_micros(30)),
            ..Default::default()
        };
        let page = store
            .messages_page(conversation.id, window, None, 10)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].sender, b);
    }

    #[tokio::test]
    async fn one_notification_per_message() {
        let store = store().await;
        let (conversation, a, b) = seeded_conversation(&store).await;
        let msg = message(conversation.id, a, b, 10);

        let mut tx = store.begin().await.unwrap();
        tx.insert_message(&msg).await.unwrap();
        let notification = |id: NotificationId| Notification {
            id,
            recipient: b,
            message: msg.id,
            created_at: Timestamp::from_micros(10),
        };
        assert!(tx.insert_notification(&notification(Default::default())).await.unwrap());
        assert!(!tx.insert_notification(&notification(Default::default())).await.unwrap());
        assert_eq!(tx.notifications_for(b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn directory_resolves_registered_users() {
        let store = store().await;
        let admin = store.register_user("root", Role::Admin).await.unwrap();

        assert_eq!(store.resolve(admin.id).await.unwrap(), Some(admin));
        assert_eq!(store.resolve(UserId::new()).await.unwrap(), None);
        assert!(store.register_user("root", Role::Guest).await.is_err());

        assert!(store.remove_user(admin.id).await.unwrap());
        assert_eq!(store.resolve(admin.id).await.unwrap(), None);
    }

    #[test]
    fn pool_timeouts_are_transient() {
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!StoreError::from(sqlx::Error::RowNotFound).is_transient());
    }
}
