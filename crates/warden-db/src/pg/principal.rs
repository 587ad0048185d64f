//! PostgreSQL principal repository implementation

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::models::PrincipalRow;
use crate::repo::{CreatePrincipal, PrincipalRepository};

/// PostgreSQL principal repository
#[derive(Clone)]
pub struct PgPrincipalRepository {
    pool: PgPool,
}

impl PgPrincipalRepository {
    /// Create a new principal repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrincipalRepository for PgPrincipalRepository {
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<PrincipalRow>> {
        let principal = sqlx::query_as::<_, PrincipalRow>(
            r#"
            SELECT id, email, display_name, federated_subject, role,
                   password_hash, created_at, updated_at
            FROM principals
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(principal)
    }

    async fn find_by_email(&self, email: &str) -> DbResult<Option<PrincipalRow>> {
        let principal = sqlx::query_as::<_, PrincipalRow>(
            r#"
            SELECT id, email, display_name, federated_subject, role,
                   password_hash, created_at, updated_at
            FROM principals
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(principal)
    }

    async fn find_by_federated_subject(&self, subject: &str) -> DbResult<Option<PrincipalRow>> {
        let principal = sqlx::query_as::<_, PrincipalRow>(
            r#"
            SELECT id, email, display_name, federated_subject, role,
                   password_hash, created_at, updated_at
            FROM principals
            WHERE federated_subject = $1
            "#,
        )
        .bind(subject)
        .fetch_optional(&self.pool)
        .await?;

        Ok(principal)
    }

    async fn create(&self, principal: CreatePrincipal) -> DbResult<PrincipalRow> {
        sqlx::query_as::<_, PrincipalRow>(
            r#"
            INSERT INTO principals (id, email, display_name, federated_subject, role, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, email, display_name, federated_subject, role,
                      password_hash, created_at, updated_at
            "#,
        )
        .bind(principal.id)
        .bind(&principal.email)
        .bind(&principal.display_name)
        .bind(&principal.federated_subject)
        .bind(&principal.role)
        .bind(&principal.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::from_write(e, "principal already exists"))
    }

    async fn link_federated_subject(&self, id: Uuid, subject: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE principals SET federated_subject = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(subject)
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::from_write(e, "federated subject already linked"))?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE principals SET password_hash = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}
