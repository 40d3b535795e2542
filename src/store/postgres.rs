use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{
    postgres::PgPoolOptions, types::Json, FromRow, PgPool, Postgres, QueryBuilder,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::{effective_limit, strip_reserved, Document, DocumentStore, Filter, StoreError};
use crate::clock::Clock;

const COLUMNS: &str = "id, body, created_at, updated_at";

/// All collections share one JSONB table keyed by `(collection, id)`;
/// `seq` gives the natural order.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: Uuid,
    body: Json<Map<String, Value>>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: row.id.to_string(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            fields: row.body.0,
        }
    }
}

impl PgDocumentStore {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connect to database")?;

        run_migrations(&pool).await?;
        Ok(Self::new(pool, clock))
    }
}

/// Without the `documents` table every call fails, so a failed migration
/// stops startup.
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("run migrations")?;
    debug!("migrations applied");
    Ok(())
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}

/// Appends ` AND ...` clauses for every filter entry.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    for (key, expected) in filter.iter() {
        match key.as_str() {
            "id" => match expected.as_str().and_then(|s| Uuid::parse_str(s).ok()) {
                Some(id) => {
                    qb.push(" AND id = ").push_bind(id);
                }
                None => {
                    qb.push(" AND FALSE");
                }
            },
            column @ ("created_at" | "updated_at") => {
                match expected
                    .as_str()
                    .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
                {
                    Some(ts) => {
                        qb.push(format_args!(" AND {column} = ")).push_bind(ts);
                    }
                    None => {
                        qb.push(" AND FALSE");
                    }
                }
            }
            _ => {
                qb.push(" AND (body -> ")
                    .push_bind(key.clone())
                    .push("::text) = ")
                    .push_bind(Json(expected.clone()))
                    .push("::jsonb");
            }
        }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn create(
        &self,
        collection: &str,
        fields: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        let now = self.clock.now();
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            INSERT INTO documents (id, collection, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id, body, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(collection)
        .bind(Json(strip_reserved(fields)))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;
        debug!(collection, id = %row.id, "document created");
        Ok(row.into())
    }

    async fn list(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM documents"));
        qb.push(" WHERE collection = ").push_bind(collection.to_owned());
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY seq");
        if let Some(n) = effective_limit(limit) {
            qb.push(" LIMIT ").push_bind(n as i64);
        }

        let rows = qb
            .build_query_as::<DocumentRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(Document::from).collect())
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        fields: Map<String, Value>,
    ) -> Result<Option<Document>, StoreError> {
        let now = self.clock.now();
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE documents SET body = body || ");
        qb.push_bind(Json(strip_reserved(fields)))
            .push("::jsonb, updated_at = GREATEST(")
            .push_bind(now)
            .push(", updated_at) WHERE seq = (SELECT seq FROM documents WHERE collection = ")
            .push_bind(collection.to_owned());
        push_filter(&mut qb, filter);
        qb.push(format_args!(" ORDER BY seq LIMIT 1 FOR UPDATE) RETURNING {COLUMNS}"));

        let row = qb
            .build_query_as::<DocumentRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        if let Some(row) = &row {
            debug!(collection, id = %row.id, "document updated");
        }
        Ok(row.map(Document::from))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
