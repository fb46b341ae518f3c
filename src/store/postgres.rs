use super::LikeStore;
use crate::config::{DatabaseConfig, DatabaseConnection};
use crate::error::{LikeBridgeError, Result};
use crate::models::{AppliedBatch, CounterDelta, LikeAction, LikeBatchPlan, ToggleOutcome};
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio_postgres::{Config as PgConfig, NoTls, Transaction};
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS subject_like_count (
    subject_id BIGINT PRIMARY KEY,
    like_count BIGINT NOT NULL DEFAULT 0 CHECK (like_count >= 0),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS like_relation (
    id BIGSERIAL PRIMARY KEY,
    actor_id BIGINT NOT NULL,
    subject_id BIGINT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT like_relation_actor_subject_key UNIQUE (actor_id, subject_id)
);
CREATE INDEX IF NOT EXISTS like_relation_subject_idx ON like_relation (subject_id);
"#;

#[derive(Clone)]
pub struct PostgresLikeStore {
    pool: Pool,
}

impl PostgresLikeStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to PostgreSQL...");
        let pg_config = build_pg_config(&config.connection)?;

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(config.pool.max_size)
            .runtime(Runtime::Tokio1)
            .wait_timeout(Some(Duration::from_secs(config.pool.acquire_timeout)))
            .create_timeout(Some(Duration::from_secs(config.pool.acquire_timeout)))
            .build()
            .map_err(|e| LikeBridgeError::Database(format!("Failed to create pool: {}", e)))?;

        let client = pool.get().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| LikeBridgeError::Database(format!("Connection test failed: {}", e)))?;

        info!("Successfully connected to PostgreSQL");
        Ok(Self { pool })
    }
}

fn build_pg_config(connection: &DatabaseConnection) -> Result<PgConfig> {
    let mut config = match connection {
        DatabaseConnection::ConnectionString { url } => url
            .parse::<PgConfig>()
            .map_err(|e| LikeBridgeError::Config(format!("Invalid connection string: {}", e)))?,
        DatabaseConnection::Parameters {
            host,
            port,
            database,
            username,
            password,
        } => {
            let mut config = PgConfig::new();
            config
                .host(host)
                .port(*port)
                .dbname(database)
                .user(username)
                .password(password);
            config
        }
    };
    config.application_name("likebridge");
    Ok(config)
}

/// Apply summed deltas inside an open transaction
async fn update_counters(tx: &Transaction<'_>, deltas: &CounterDelta) -> Result<()> {
    let (subjects, amounts): (Vec<i64>, Vec<i64>) = deltas
        .iter()
        .filter(|(_, delta)| **delta != 0)
        .map(|(subject, delta)| (*subject, *delta))
        .unzip();
    if subjects.is_empty() {
        return Ok(());
    }

    tx.execute(
        "INSERT INTO subject_like_count (subject_id, like_count) \
         SELECT subject_id, 0 FROM unnest($1::bigint[]) AS s(subject_id) \
         ON CONFLICT (subject_id) DO NOTHING",
        &[&subjects],
    )
    .await?;

    tx.execute(
        "UPDATE subject_like_count c \
         SET like_count = GREATEST(c.like_count + d.delta, 0), updated_at = now() \
         FROM unnest($1::bigint[], $2::bigint[]) AS d(subject_id, delta) \
         WHERE c.subject_id = d.subject_id",
        &[&subjects, &amounts],
    )
    .await?;

    Ok(())
}

#[async_trait]
impl LikeStore for PostgresLikeStore {
    async fn ensure_schema(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client.batch_execute(SCHEMA).await?;
        info!("Like tables are in place");
        Ok(())
    }

    async fn toggle(
        &self,
        actor_id: i64,
        subject_id: i64,
        action: LikeAction,
    ) -> Result<ToggleOutcome> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let existing = tx
            .query_opt(
                "SELECT id FROM like_relation WHERE actor_id = $1 AND subject_id = $2 FOR UPDATE",
                &[&actor_id, &subject_id],
            )
            .await?;

        let outcome = match (action, existing) {
            (LikeAction::Like, Some(_)) | (LikeAction::Unlike, None) => {
                return Ok(ToggleOutcome::AlreadyInState);
            }
            (LikeAction::Like, None) => {
                let inserted = tx
                    .query_opt(
                        "INSERT INTO like_relation (actor_id, subject_id) VALUES ($1, $2) \
                         ON CONFLICT (actor_id, subject_id) DO NOTHING RETURNING id",
                        &[&actor_id, &subject_id],
                    )
                    .await?;
                let Some(row) = inserted else {
                    return Ok(ToggleOutcome::AlreadyInState);
                };
                ToggleOutcome::Applied {
                    relation_id: Some(row.get::<_, i64>(0)),
                }
            }
            (LikeAction::Unlike, Some(_)) => {
                tx.execute(
                    "DELETE FROM like_relation WHERE actor_id = $1 AND subject_id = $2",
                    &[&actor_id, &subject_id],
                )
                .await?;
                ToggleOutcome::Applied { relation_id: None }
            }
        };

        let delta = match action {
            LikeAction::Like => 1,
            LikeAction::Unlike => -1,
        };
        update_counters(&tx, &CounterDelta::from([(subject_id, delta)])).await?;
        tx.commit().await?;

        Ok(outcome)
    }

    async fn apply_batch(&self, plan: &LikeBatchPlan) -> Result<AppliedBatch> {
        if plan.is_empty() {
            return Ok(AppliedBatch::default());
        }

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let mut applied = AppliedBatch::default();

        if !plan.inserts.is_empty() {
            let (actors, subjects): (Vec<i64>, Vec<i64>) = plan
                .inserts
                .iter()
                .map(|key| (key.actor_id, key.subject_id))
                .unzip();
            let rows = tx
                .query(
                    "INSERT INTO like_relation (actor_id, subject_id) \
                     SELECT * FROM unnest($1::bigint[], $2::bigint[]) \
                     ON CONFLICT (actor_id, subject_id) DO NOTHING \
                     RETURNING subject_id",
                    &[&actors, &subjects],
                )
                .await?;
            applied.inserted = rows.len();
            applied.skipped += plan.inserts.len() - rows.len();
            for row in rows {
                *applied.deltas.entry(row.get::<_, i64>(0)).or_insert(0) += 1;
            }
        }

        if !plan.removals.is_empty() {
            let (actors, subjects): (Vec<i64>, Vec<i64>) = plan
                .removals
                .iter()
                .map(|key| (key.actor_id, key.subject_id))
                .unzip();
            let rows = tx
                .query(
                    "DELETE FROM like_relation r \
                     USING unnest($1::bigint[], $2::bigint[]) AS d(actor_id, subject_id) \
                     WHERE r.actor_id = d.actor_id AND r.subject_id = d.subject_id \
                     RETURNING r.subject_id",
                    &[&actors, &subjects],
                )
                .await?;
            applied.removed = rows.len();
            applied.skipped += plan.removals.len() - rows.len();
            for row in rows {
                *applied.deltas.entry(row.get::<_, i64>(0)).or_insert(0) -= 1;
            }
        }

        applied.deltas.retain(|_, delta| *delta != 0);
        update_counters(&tx, &applied.deltas).await?;
        tx.commit().await?;

        debug!(
            "Applied batch: {} inserted, {} removed, {} skipped",
            applied.inserted, applied.removed, applied.skipped
        );
        Ok(applied)
    }

    async fn batch_update_counter(&self, deltas: &CounterDelta) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        update_counters(&tx, deltas).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn liked_subjects(&self, actor_id: i64) -> Result<BTreeSet<i64>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT subject_id FROM like_relation WHERE actor_id = $1",
                &[&actor_id],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get::<_, i64>(0)).collect())
    }

    async fn actors_of_subject(&self, subject_id: i64, limit: usize) -> Result<Vec<i64>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT actor_id FROM like_relation WHERE subject_id = $1 \
                 ORDER BY created_at DESC LIMIT $2",
                &[&subject_id, &(limit as i64)],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get::<_, i64>(0)).collect())
    }

    async fn has_relation(&self, actor_id: i64, subject_id: i64) -> Result<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT 1 FROM like_relation WHERE actor_id = $1 AND subject_id = $2",
                &[&actor_id, &subject_id],
            )
            .await?;
        Ok(row.is_some())
    }

    async fn like_count(&self, subject_id: i64) -> Result<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT like_count FROM subject_like_count WHERE subject_id = $1",
                &[&subject_id],
            )
            .await?;
        Ok(row.map(|row| row.get::<_, i64>(0)).unwrap_or(0))
    }

    async fn is_healthy(&self) -> bool {
        match self.pool.get().await {
            Ok(client) => client.simple_query("SELECT 1").await.is_ok(),
            Err(_) => false,
        }
    }
}
