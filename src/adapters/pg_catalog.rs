//! PostgreSQL catalog adapter over `sqlx`.
//!
//! Talks to the server over the native wire protocol. Identifier and literal
//! quoting for the statements that cannot take bind parameters (`ALTER ROLE`,
//! `COPY`) is done server-side with `format()` / `quote_literal()`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::error::{SyncError, SyncResult};
use crate::traits::{CatalogClient, CatalogRow};

const AGGREGATE_QUERY: &str = r#"
SELECT COALESCE(
    json_agg(
        json_build_object(
            'username', rolname,
            'hash', rolpassword,
            'can_login', rolcanlogin,
            'valid_until', CASE WHEN isfinite(rolvaliduntil) THEN rolvaliduntil END
        )
        ORDER BY rolname
    ),
    '[]'::json
)::text
FROM pg_authid
WHERE NOT (rolname ~ ANY($1::text[]))
  AND rolname IS DISTINCT FROM $2::text
"#;

const ROWS_QUERY: &str = r#"
SELECT rolname,
       rolpassword,
       rolcanlogin,
       CASE WHEN isfinite(rolvaliduntil) THEN rolvaliduntil END
FROM pg_authid
ORDER BY rolname
"#;

type RoleRow = (String, Option<String>, bool, Option<DateTime<Utc>>);

/// [`CatalogClient`] backed by a lazily-connecting `PgPool`.
#[derive(Debug, Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    /// Build a catalog client for `database_url`.
    ///
    /// No connection is opened until the first query, so an unreachable
    /// server surfaces as a retryable connectivity error at snapshot time.
    /// Statement logging is disabled because `ALTER ROLE ... PASSWORD`
    /// carries a plaintext secret.
    pub fn connect_lazy(database_url: &str, acquire_timeout: Duration) -> SyncResult<Self> {
        let options = PgConnectOptions::from_str(database_url)
            .map_err(|e| SyncError::Config(format!("invalid database_url: {}", e)))?
            .application_name("pgbsync")
            .disable_statement_logging();

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(acquire_timeout)
            .connect_lazy_with(options);

        Ok(Self { pool })
    }
}

fn validate_setting(setting: &str) -> SyncResult<&str> {
    match setting {
        "scram-sha-256" | "md5" => Ok(setting),
        other => Err(SyncError::Internal(format!(
            "refusing to apply password_encryption '{}'",
            other
        ))),
    }
}

fn export_io_error(dest: &Path, e: std::io::Error) -> SyncError {
    SyncError::Catalog {
        message: format!("cannot write export to {}: {}", dest.display(), e),
    }
}

#[async_trait]
impl CatalogClient for PgCatalog {
    async fn ping(&self) -> SyncResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn fetch_principals_json(
        &self,
        excluded_patterns: &[String],
        metrics_account: Option<&str>,
    ) -> SyncResult<String> {
        let json: String = sqlx::query_scalar(AGGREGATE_QUERY)
            .bind(excluded_patterns.to_vec())
            .bind(metrics_account)
            .fetch_one(&self.pool)
            .await?;
        Ok(json)
    }

    async fn fetch_principal_rows(&self) -> SyncResult<Vec<CatalogRow>> {
        let rows: Vec<RoleRow> = sqlx::query_as(ROWS_QUERY).fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(username, hash, can_login, valid_until)| CatalogRow {
                username,
                hash,
                can_login,
                valid_until,
            })
            .collect())
    }

    async fn read_stored_hash(&self, username: &str) -> SyncResult<Option<String>> {
        let hash: Option<Option<String>> =
            sqlx::query_scalar("SELECT rolpassword FROM pg_authid WHERE rolname = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        Ok(hash.flatten())
    }

    async fn read_shadow_hash(&self, username: &str) -> SyncResult<Option<String>> {
        let hash: Option<Option<String>> =
            sqlx::query_scalar("SELECT passwd FROM pg_shadow WHERE usename = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        Ok(hash.flatten())
    }

    async fn export_entry(&self, username: &str, dest: &Path) -> SyncResult<()> {
        let literal: String = sqlx::query_scalar("SELECT quote_literal($1::text)")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        let statement = format!(
            "COPY (SELECT rolname, rolpassword FROM pg_authid WHERE rolname = {}) \
             TO STDOUT WITH (FORMAT csv, DELIMITER ' ', FORCE_QUOTE *)",
            literal
        );

        let mut conn = self.pool.acquire().await?;
        let mut stream = conn.copy_out_raw(&statement).await?;
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| export_io_error(dest, e))?;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| export_io_error(dest, e))?;
        }
        file.flush().await.map_err(|e| export_io_error(dest, e))?;
        Ok(())
    }

    async fn default_scheme(&self) -> SyncResult<String> {
        let setting: String = sqlx::query_scalar("SELECT current_setting('password_encryption')")
            .fetch_one(&self.pool)
            .await?;
        Ok(setting)
    }

    async fn set_default_scheme(&self, setting: &str) -> SyncResult<()> {
        let setting = validate_setting(setting)?;
        let statement = format!("ALTER SYSTEM SET password_encryption = '{}'", setting);
        sqlx::raw_sql(&statement).execute(&self.pool).await?;
        sqlx::query("SELECT pg_reload_conf()")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset_credential(
        &self,
        username: &str,
        plaintext: &str,
        setting: &str,
    ) -> SyncResult<()> {
        let setting = validate_setting(setting)?;
        let mut conn = self.pool.acquire().await?;

        let set_statement = format!("SET password_encryption = '{}'", setting);
        sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(&set_statement)).await?;

        let alter: String =
            sqlx::query_scalar("SELECT format('ALTER ROLE %I PASSWORD %L', $1::text, $2::text)")
                .bind(username)
                .bind(plaintext)
                .fetch_one(&mut *conn)
                .await?;
        let result = sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(&alter)).await;

        // Pooled session must not keep the override.
        sqlx::Executor::execute(&mut *conn, sqlx::raw_sql("RESET password_encryption")).await?;
        result?;
        Ok(())
    }
}
