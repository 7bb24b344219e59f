use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};

/// Local storage manager backed by SQLite.
///
/// Writes to a given user's rows are only ever performed by that user's own
/// sync job; the connection pool serializes concurrent writes to the same
/// record.
pub struct LocalStorage {
    pub conn: DatabaseConnection,
}

impl LocalStorage {
    /// Open (or create) the database at `database_url` and ensure the schema.
    pub async fn new(database_url: &str) -> Result<Self> {
        let mut options = ConnectOptions::new(database_url.to_owned());
        options
            .min_connections(1)
            .max_connections(4)
            .sqlx_logging(false);

        let conn = Database::connect(options).await?;
        let storage = LocalStorage { conn };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// In-memory database, used by tests.
    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    /// Initialize database schema.
    async fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_unprepared(
                r"
                CREATE TABLE IF NOT EXISTS projects (
                    uuid TEXT PRIMARY KEY,
                    user_uuid TEXT NOT NULL,
                    remote_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    color TEXT NOT NULL,
                    is_favorite BOOLEAN NOT NULL DEFAULT 0,
                    is_inbox_project BOOLEAN NOT NULL DEFAULT 0,
                    order_index INTEGER NOT NULL DEFAULT 0,
                    parent_uuid TEXT,
                    is_pinned BOOLEAN NOT NULL DEFAULT 0,
                    is_deleted BOOLEAN NOT NULL DEFAULT 0,
                    UNIQUE (user_uuid, remote_id)
                )
                ",
            )
            .await?;

        self.conn
            .execute_unprepared(
                r"
                CREATE TABLE IF NOT EXISTS sections (
                    uuid TEXT PRIMARY KEY,
                    user_uuid TEXT NOT NULL,
                    remote_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    project_uuid TEXT NOT NULL,
                    order_index INTEGER NOT NULL DEFAULT 0,
                    is_deleted BOOLEAN NOT NULL DEFAULT 0,
                    UNIQUE (user_uuid, remote_id)
                )
                ",
            )
            .await?;

        self.conn
            .execute_unprepared(
                r"
                CREATE TABLE IF NOT EXISTS tasks (
                    uuid TEXT PRIMARY KEY,
                    user_uuid TEXT NOT NULL,
                    remote_id TEXT NOT NULL,
                    content TEXT NOT NULL,
                    description TEXT,
                    project_uuid TEXT NOT NULL,
                    section_uuid TEXT,
                    parent_uuid TEXT,
                    priority INTEGER NOT NULL DEFAULT 1,
                    order_index INTEGER NOT NULL DEFAULT 0,
                    due_date TEXT,
                    due_datetime TEXT,
                    is_recurring BOOLEAN NOT NULL DEFAULT 0,
                    is_completed BOOLEAN NOT NULL DEFAULT 0,
                    is_pinned BOOLEAN NOT NULL DEFAULT 0,
                    is_deleted BOOLEAN NOT NULL DEFAULT 0,
                    UNIQUE (user_uuid, remote_id)
                )
                ",
            )
            .await?;

        self.conn
            .execute_unprepared(
                r"
                CREATE TABLE IF NOT EXISTS labels (
                    uuid TEXT PRIMARY KEY,
                    user_uuid TEXT NOT NULL,
                    remote_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    color TEXT NOT NULL,
                    order_index INTEGER NOT NULL DEFAULT 0,
                    is_favorite BOOLEAN NOT NULL DEFAULT 0,
                    is_deleted BOOLEAN NOT NULL DEFAULT 0,
                    UNIQUE (user_uuid, remote_id)
                )
                ",
            )
            .await?;

        self.conn
            .execute_unprepared(
                r"
                CREATE TABLE IF NOT EXISTS task_labels (
                    task_uuid TEXT NOT NULL,
                    label_uuid TEXT NOT NULL,
                    PRIMARY KEY (task_uuid, label_uuid)
                )
                ",
            )
            .await?;

        self.conn
            .execute_unprepared(
                r"
                CREATE TABLE IF NOT EXISTS sync_states (
                    user_uuid TEXT PRIMARY KEY,
                    api_token TEXT NOT NULL,
                    sync_token TEXT,
                    full_sync_required BOOLEAN NOT NULL DEFAULT 1,
                    status TEXT NOT NULL DEFAULT 'idle',
                    error_count INTEGER NOT NULL DEFAULT 0,
                    consecutive_failures INTEGER NOT NULL DEFAULT 0,
                    auto_sync_enabled BOOLEAN NOT NULL DEFAULT 1,
                    sync_frequency_minutes INTEGER NOT NULL DEFAULT 30,
                    last_sync_at TEXT,
                    next_sync_at TEXT
                )
                ",
            )
            .await?;

        self.conn
            .execute_unprepared(
                r"
                CREATE TABLE IF NOT EXISTS id_mappings (
                    user_uuid TEXT NOT NULL,
                    item_kind TEXT NOT NULL,
                    remote_id TEXT NOT NULL,
                    local_uuid TEXT NOT NULL,
                    PRIMARY KEY (user_uuid, item_kind, remote_id)
                )
                ",
            )
            .await?;

        Ok(())
    }
}
