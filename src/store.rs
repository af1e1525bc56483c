use anyhow::{Context, Result};
use deadpool_postgres::{Config as PgConfig, Pool, Runtime};
use serde::Serialize;
use tokio_postgres::NoTls;
use tracing::error;

use crate::config::{Credentials, DbConfig};
use crate::error::AppError;
use crate::types::CaptureRecord;

/// History is capped at the 50 most recent captures.
pub const HISTORY_LIMIT: i64 = 50;

/// Process-wide datastore client: one backend address, two credential tiers.
///
/// The service pool owns the schema and all capture reads/writes; the anon
/// pool exists for the restricted tier and is exercised by the connectivity
/// probe. Built once at startup and injected into handlers.
#[derive(Clone)]
pub struct Datastore {
    anon: Pool,
    service: Pool,
}

impl Datastore {
    pub async fn connect(cfg: &DbConfig) -> Result<Self> {
        let anon = build_pool(cfg, &cfg.anon).context("anon pool init failed")?;
        let service = build_pool(cfg, &cfg.service).context("service pool init failed")?;

        let store = Self { anon, service };
        store.ensure_schema().await.context("schema init failed")?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        // Safe to run on every boot
        const SQL: &str = r#"
        CREATE TABLE IF NOT EXISTS captures (
          id          bigserial PRIMARY KEY,
          url         text NOT NULL,
          html        text NOT NULL,
          created_at  timestamptz NOT NULL DEFAULT now()
        );
        CREATE INDEX IF NOT EXISTS idx_captures_created_at ON captures (created_at DESC);
        "#;

        let conn = self.service.get().await?;
        conn.batch_execute(SQL).await?;
        Ok(())
    }

    /// Insert one capture; Postgres assigns `id` and `created_at`.
    pub async fn insert_capture(&self, url: &str, html: &str) -> Result<CaptureRecord, AppError> {
        const SQL: &str =
            "INSERT INTO captures (url, html) VALUES ($1, $2) RETURNING id, created_at";

        let conn = self.service.get().await.map_err(persistence)?;
        let row = conn
            .query_one(SQL, &[&url, &html])
            .await
            .map_err(persistence)?;

        Ok(CaptureRecord {
            id: row.get(0),
            url: url.to_string(),
            html: html.to_string(),
            created_at: row.get(1),
        })
    }

    /// The most recent captures, newest first. `id` breaks ties so the order
    /// stays aligned with insertion order.
    pub async fn recent_captures(&self) -> Result<Vec<CaptureRecord>, AppError> {
        const SQL: &str = "SELECT id, url, html, created_at FROM captures \
             ORDER BY created_at DESC, id DESC LIMIT $1";

        let conn = self.service.get().await.map_err(persistence)?;
        let rows = conn
            .query(SQL, &[&HISTORY_LIMIT])
            .await
            .map_err(persistence)?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    pub async fn capture_by_id(&self, id: i64) -> Result<CaptureRecord, AppError> {
        const SQL: &str = "SELECT id, url, html, created_at FROM captures WHERE id = $1";

        let conn = self.service.get().await.map_err(persistence)?;
        let row = conn.query_opt(SQL, &[&id]).await.map_err(persistence)?;

        row.as_ref().map(record_from_row).ok_or(AppError::NotFound)
    }

    /// Round-trip `SELECT 1` through both pools.
    pub async fn probe(&self) -> ConnectivityReport {
        ConnectivityReport {
            anon: probe_pool(&self.anon, "anon").await,
            service: probe_pool(&self.service, "service").await,
        }
    }

    /// Read-only shape check of the captures table.
    pub async fn schema_info(&self) -> Result<SchemaInfo, AppError> {
        const COLUMNS_SQL: &str = "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_name = 'captures' ORDER BY ordinal_position";

        let conn = self.service.get().await.map_err(persistence)?;
        let rows = conn.query(COLUMNS_SQL, &[]).await.map_err(persistence)?;
        let columns: Vec<ColumnInfo> = rows
            .iter()
            .map(|r| ColumnInfo {
                name: r.get(0),
                data_type: r.get(1),
            })
            .collect();

        let record_count: i64 = conn
            .query_one("SELECT count(*) FROM captures", &[])
            .await
            .map_err(persistence)?
            .get(0);

        Ok(SchemaInfo {
            table_exists: !columns.is_empty(),
            columns,
            record_count,
        })
    }
}

fn build_pool(cfg: &DbConfig, creds: &Credentials) -> Result<Pool> {
    let mut pg = PgConfig::new();
    pg.host = Some(cfg.host.clone());
    pg.port = Some(cfg.port);
    pg.dbname = Some(cfg.dbname.clone());
    pg.user = Some(creds.user.clone());
    pg.password = Some(creds.password.clone());

    Ok(pg.create_pool(Some(Runtime::Tokio1), NoTls)?)
}

fn record_from_row(row: &tokio_postgres::Row) -> CaptureRecord {
    CaptureRecord {
        id: row.get(0),
        url: row.get(1),
        html: row.get(2),
        created_at: row.get(3),
    }
}

fn persistence(e: impl std::fmt::Display) -> AppError {
    AppError::Persistence(e.to_string())
}

async fn probe_pool(pool: &Pool, tier: &str) -> TierStatus {
    let result = async {
        let conn = pool.get().await.map_err(|e| e.to_string())?;
        conn.query_one("SELECT 1", &[])
            .await
            .map_err(|e| e.to_string())?;
        Ok::<_, String>(())
    }
    .await;

    match result {
        Ok(()) => TierStatus {
            ok: true,
            error: None,
        },
        Err(e) => {
            error!(tier, error = %e, "datastore probe failed");
            TierStatus {
                ok: false,
                error: Some(e),
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConnectivityReport {
    pub anon: TierStatus,
    pub service: TierStatus,
}

impl ConnectivityReport {
    pub fn ok(&self) -> bool {
        self.anon.ok && self.service.ok
    }
}

#[derive(Debug, Serialize)]
pub struct TierStatus {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Serialize)]
pub struct SchemaInfo {
    #[serde(rename = "tableExists")]
    pub table_exists: bool,
    pub columns: Vec<ColumnInfo>,
    #[serde(rename = "recordCount")]
    pub record_count: i64,
}
