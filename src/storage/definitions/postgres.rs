//! Persistent definition backend using PostgreSQL.

use super::DefinitionBackend;
use crate::domain::definition::{EndpointDefinition, MiddlewareSettings};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

const COLUMNS: &str = "id, namespace, version, route, http_method, callback_type, callback_ref, \
                       status, is_safe, validation_errors, settings, updated_at";

/// Definitions stored in the `api_endpoints` table; middleware settings live in one JSONB column.
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and creates the table if needed.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let backend = Self::new(pool);
        backend.ensure_schema().await?;
        Ok(backend)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS api_endpoints (
                id UUID PRIMARY KEY,
                namespace TEXT NOT NULL,
                version TEXT NOT NULL,
                route TEXT NOT NULL,
                http_method TEXT NOT NULL,
                callback_type TEXT NOT NULL,
                callback_ref TEXT NOT NULL,
                status TEXT NOT NULL,
                is_safe BOOLEAN NOT NULL DEFAULT FALSE,
                validation_errors TEXT,
                settings JSONB NOT NULL DEFAULT '{}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS api_endpoints_status_idx ON api_endpoints (status)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_definition(row: &PgRow) -> Result<EndpointDefinition> {
    let callback_type: String = row.try_get("callback_type")?;
    let status: String = row.try_get("status")?;
    let settings: JsonValue = row.try_get("settings")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(EndpointDefinition {
        id: row.try_get("id")?,
        namespace: row.try_get("namespace")?,
        version: row.try_get("version")?,
        route: row.try_get("route")?,
        http_method: row.try_get("http_method")?,
        callback_type: callback_type.parse().map_err(|e: String| anyhow!(e))?,
        callback_ref: row.try_get("callback_ref")?,
        status: status.parse().map_err(|e: String| anyhow!(e))?,
        is_safe: row.try_get("is_safe")?,
        validation_errors: row.try_get("validation_errors")?,
        settings: serde_json::from_value::<MiddlewareSettings>(settings)?,
        updated_at,
    })
}

#[async_trait]
impl DefinitionBackend for PostgresBackend {
    async fn insert(&self, d: &EndpointDefinition) -> Result<()> {
        sqlx::query(
            "INSERT INTO api_endpoints
                (id, namespace, version, route, http_method, callback_type, callback_ref,
                 status, is_safe, validation_errors, settings, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(d.id)
        .bind(&d.namespace)
        .bind(&d.version)
        .bind(&d.route)
        .bind(&d.http_method)
        .bind(d.callback_type.as_str())
        .bind(&d.callback_ref)
        .bind(d.status.as_str())
        .bind(d.is_safe)
        .bind(&d.validation_errors)
        .bind(serde_json::to_value(&d.settings)?)
        .bind(d.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, d: &EndpointDefinition) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE api_endpoints SET
                namespace = $2, version = $3, route = $4, http_method = $5, callback_type = $6,
                callback_ref = $7, status = $8, is_safe = $9, validation_errors = $10,
                settings = $11, updated_at = $12
             WHERE id = $1",
        )
        .bind(d.id)
        .bind(&d.namespace)
        .bind(&d.version)
        .bind(&d.route)
        .bind(&d.http_method)
        .bind(d.callback_type.as_str())
        .bind(&d.callback_ref)
        .bind(d.status.as_str())
        .bind(d.is_safe)
        .bind(&d.validation_errors)
        .bind(serde_json::to_value(&d.settings)?)
        .bind(d.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, id: Uuid) -> Result<Option<EndpointDefinition>> {
        let sql = format!("SELECT {} FROM api_endpoints WHERE id = $1", COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_definition).transpose()
    }

    async fn list(&self) -> Result<Vec<EndpointDefinition>> {
        let sql = format!("SELECT {} FROM api_endpoints ORDER BY created_at, id", COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_definition).collect()
    }

    async fn list_active(&self) -> Result<Vec<EndpointDefinition>> {
        let sql = format!(
            "SELECT {} FROM api_endpoints WHERE status = 'active' ORDER BY created_at, id",
            COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_definition).collect()
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_endpoints WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_unsafe(&self, id: Uuid, message: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE api_endpoints SET is_safe = FALSE, validation_errors = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
