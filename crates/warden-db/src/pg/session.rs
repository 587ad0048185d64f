//! PostgreSQL session repository implementation

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::SessionRow;
use crate::repo::{CreateSession, RefreshRotation, SessionRepository};

/// PostgreSQL session repository
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    /// Create a new session repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn find_by_id(&self, user_id: Uuid, id: Uuid) -> DbResult<Option<SessionRow>> {
        let session = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, device_id_hash, refresh_credential_hash,
                   access_expires_at, refresh_expires_at, remember,
                   device_label, origin_address, created_at
            FROM sessions
            WHERE id = $1 AND user_id = $2 AND refresh_expires_at > NOW()
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn find_by_device(
        &self,
        user_id: Uuid,
        device_id_hash: &str,
    ) -> DbResult<Option<SessionRow>> {
        let session = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, device_id_hash, refresh_credential_hash,
                   access_expires_at, refresh_expires_at, remember,
                   device_label, origin_address, created_at
            FROM sessions
            WHERE user_id = $1 AND device_id_hash = $2 AND refresh_expires_at > NOW()
            "#,
        )
        .bind(user_id)
        .bind(device_id_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> DbResult<Vec<SessionRow>> {
        let sessions = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, device_id_hash, refresh_credential_hash,
                   access_expires_at, refresh_expires_at, remember,
                   device_label, origin_address, created_at
            FROM sessions
            WHERE user_id = $1 AND refresh_expires_at > NOW()
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn upsert(&self, session: CreateSession) -> DbResult<SessionRow> {
        // Single statement: a concurrent reader sees either the old record
        // or the new one, never a mix.
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            INSERT INTO sessions (id, user_id, device_id_hash, refresh_credential_hash,
                                  access_expires_at, refresh_expires_at, remember,
                                  device_label, origin_address)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id, device_id_hash) DO UPDATE SET
                id = EXCLUDED.id,
                refresh_credential_hash = EXCLUDED.refresh_credential_hash,
                access_expires_at = EXCLUDED.access_expires_at,
                refresh_expires_at = EXCLUDED.refresh_expires_at,
                remember = EXCLUDED.remember,
                device_label = EXCLUDED.device_label,
                origin_address = EXCLUDED.origin_address,
                created_at = NOW()
            RETURNING id, user_id, device_id_hash, refresh_credential_hash,
                      access_expires_at, refresh_expires_at, remember,
                      device_label, origin_address, created_at
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.device_id_hash)
        .bind(&session.refresh_credential_hash)
        .bind(session.access_expires_at)
        .bind(session.refresh_expires_at)
        .bind(session.remember)
        .bind(&session.device_label)
        .bind(&session.origin_address)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn rotate_refresh(
        &self,
        user_id: Uuid,
        device_id_hash: &str,
        expected_hash: &str,
        rotation: RefreshRotation,
    ) -> DbResult<Option<SessionRow>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            UPDATE sessions SET
                refresh_credential_hash = $4,
                access_expires_at = $5,
                refresh_expires_at = $6
            WHERE user_id = $1
              AND device_id_hash = $2
              AND refresh_credential_hash = $3
              AND refresh_expires_at > NOW()
            RETURNING id, user_id, device_id_hash, refresh_credential_hash,
                      access_expires_at, refresh_expires_at, remember,
                      device_label, origin_address, created_at
            "#,
        )
        .bind(user_id)
        .bind(device_id_hash)
        .bind(expected_hash)
        .bind(&rotation.refresh_credential_hash)
        .bind(rotation.access_expires_at)
        .bind(rotation.refresh_expires_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn delete_by_device(&self, user_id: Uuid, device_id_hash: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1 AND device_id_hash = $2")
            .bind(user_id)
            .bind(device_id_hash)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_id(&self, user_id: Uuid, id: Uuid) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_all_except(&self, user_id: Uuid, keep_device_hash: &str) -> DbResult<u64> {
        let result =
            sqlx::query("DELETE FROM sessions WHERE user_id = $1 AND device_id_hash <> $2")
                .bind(user_id)
                .bind(keep_device_hash)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    async fn delete_expired(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE refresh_expires_at <= NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
