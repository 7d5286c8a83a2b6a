use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Error as SqlxError, Row};
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{DurableStore, MembershipChecker};
use crate::error::StoreError;
use crate::models::{ChatAuthor, ChatRecord, DocumentSnapshot};

/// PostgreSQL backed document, chat and membership store.
pub struct DbRoom {
    pool: PgPool,
}

impl DbRoom {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn new(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    fn log_pool_state(&self, what: &str, room_id: &str) {
        let pool_idle = self.pool.num_idle() as u32;
        let pool_size = self.pool.size();
        debug!(
            "{} for room {}. Pool connections: {} idle, {} in use",
            what,
            room_id,
            pool_idle,
            pool_size.saturating_sub(pool_idle)
        );
    }
}

/// Versions are stored as BIGINT; a negative one means the row is corrupt.
fn stored_version(room_id: &str, version: i64) -> Result<u64, StoreError> {
    u64::try_from(version).map_err(|_| {
        error!("Room {} has a negative stored version {}", room_id, version);
        StoreError::Unavailable(format!("stored version {} for room {} is invalid", version, room_id))
    })
}

#[async_trait]
impl DurableStore for DbRoom {
    async fn load_document(&self, room_id: &str) -> Result<Option<DocumentSnapshot>, StoreError> {
        self.log_pool_state("Loading document", room_id);

        let row = sqlx::query(
            r#"
            SELECT content, version
            FROM code_documents
            WHERE room_id = $1
            "#,
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let content: String = row.try_get("content")?;
                let version: i64 = row.try_get("version")?;
                Ok(Some(DocumentSnapshot {
                    content,
                    version: stored_version(room_id, version)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn save_document(&self, room_id: &str, content: &str, version: u64) -> Result<(), StoreError> {
        self.log_pool_state("Saving document", room_id);

        let version = i64::try_from(version)
            .map_err(|_| StoreError::Unavailable(format!("version {} out of range", version)))?;

        // Never let a late write roll the stored version backwards.
        sqlx::query(
            r#"
            INSERT INTO code_documents (room_id, content, version, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (room_id) DO UPDATE
                SET content = EXCLUDED.content,
                    version = EXCLUDED.version,
                    updated_at = NOW()
                WHERE code_documents.version <= EXCLUDED.version
            "#,
        )
        .bind(room_id)
        .bind(content)
        .bind(version)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to save document for room {}: {}", room_id, e);
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn create_chat_message(
        &self,
        room_id: &str,
        user_id: &str,
        content: &str,
    ) -> Result<ChatRecord, StoreError> {
        let row = sqlx::query(
            r#"
            WITH inserted AS (
                INSERT INTO messages (id, room_id, user_id, content, created_at)
                VALUES ($1, $2, $3, $4, NOW())
                RETURNING id, room_id, user_id, content, created_at
            )
            SELECT i.id, i.room_id, i.user_id, i.content, i.created_at,
                   u.display_name, u.avatar_url
            FROM inserted i
                LEFT JOIN users u ON u.id = i.user_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(room_id)
        .bind(user_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        let user_id: String = row.try_get("user_id")?;
        let display_name: Option<String> = row.try_get("display_name")?;
        let avatar_url: Option<String> = row.try_get("avatar_url")?;
        let user = display_name.map(|display_name| ChatAuthor {
            id: user_id.clone(),
            display_name,
            avatar_url,
        });
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        Ok(ChatRecord {
            id: row.try_get("id")?,
            room_id: row.try_get("room_id")?,
            user_id,
            content: row.try_get("content")?,
            created_at,
            user,
        })
    }
}

#[async_trait]
impl MembershipChecker for DbRoom {
    async fn is_member(&self, user_id: &str, room_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM room_memberships
                WHERE user_id = $1 AND room_id = $2
            ) AS member
            "#,
        )
        .bind(user_id)
        .bind(room_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("member")?)
    }
}
