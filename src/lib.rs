pub mod chat;
pub mod config;
pub mod error;
pub mod http;
pub mod model;
pub mod policy;
pub mod store;

mod appresult;

use axum::extract::FromRef;

pub use appresult::{AppError, AppResult, Unauthenticated};
pub use chat::Chat;
pub use config::Config;

use store::SqliteStore;

/// The chat core as the server runs it: SQLite for storage and for the
/// identity directory.
pub type SqliteChat = Chat<SqliteStore, SqliteStore>;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub chat: SqliteChat,
    pub store: SqliteStore,
}

impl AppState {
    pub fn new(store: SqliteStore, page_size: usize) -> Self {
        Self {
            chat: Chat::new(store.clone(), store.clone()).with_page_size(page_size),
            store,
        }
    }
}
