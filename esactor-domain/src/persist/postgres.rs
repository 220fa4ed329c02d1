//! Postgres 事件存储（需启用 `infra-sqlx` 特性）
//!
//! 期望的表结构（由外部迁移工具负责创建）：
//!
//! ```sql
//! create table {schema}.events (
//!     aggregate_id   uuid   not null,
//!     version_number bigint not null,
//!     data           json   not null,
//!     primary key (aggregate_id, version_number)
//! );
//! create table {schema}.snapshots (
//!     aggregate_id   uuid   not null,
//!     version_number bigint not null,
//!     data           json   not null,
//!     primary key (aggregate_id, version_number)
//! );
//! ```
//!
//! 每行存放一条 JSON 编码的 `SerializedEvent`/`SerializedSnapshot`。
//!
use crate::{
    error::{DomainError, DomainResult as Result},
    persist::{EventStore, SerializedEvent, SerializedSnapshot},
    value_object::{AggregateId, AggregateVersion},
};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

pub struct PostgresEventStore {
    pool: PgPool,
    select_events: String,
    select_snapshot: String,
    select_head: String,
    insert_event: String,
    insert_snapshot: String,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            select_events: format!(
                "select data from {schema}.events \
                 where aggregate_id = $1 and version_number >= $2 \
                 order by version_number"
            ),
            select_snapshot: format!(
                "select data from {schema}.snapshots \
                 where aggregate_id = $1 \
                 order by version_number desc limit 1"
            ),
            insert_event: format!(
                "insert into {schema}.events (aggregate_id, version_number, data) \
                 values ($1, $2, $3)"
            ),
            select_head: format!(
                "select max(version_number) from {schema}.events where aggregate_id = $1"
            ),
            insert_snapshot: format!(
                "insert into {schema}.snapshots (aggregate_id, version_number, data) \
                 values ($1, $2, $3)"
            ),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 已落库的最高事件版本
    async fn head_version(&self, aggregate_id: AggregateId) -> Result<AggregateVersion> {
        let (head,): (Option<i64>,) = sqlx::query_as(&self.select_head)
            .bind(*aggregate_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
        Ok(AggregateVersion::from_value(head.unwrap_or(0)))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// 与内存存储一致：`expected` 为存储可接受的下一版本，`actual` 为写入方给出的版本
fn version_conflict(
    aggregate_id: AggregateId,
    head: AggregateVersion,
    offered: AggregateVersion,
) -> DomainError {
    DomainError::VersionConflict {
        aggregate_id: aggregate_id.to_string(),
        expected: head.next().value(),
        actual: offered.value(),
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn load_latest_snapshot(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Option<SerializedSnapshot>> {
        let row: Option<(Value,)> = sqlx::query_as(&self.select_snapshot)
            .bind(*aggregate_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(data,)| serde_json::from_value(data))
            .transpose()
            .map_err(Into::into)
    }

    async fn load_events(
        &self,
        aggregate_id: AggregateId,
        from_version: AggregateVersion,
    ) -> Result<Vec<SerializedEvent>> {
        let rows: Vec<(Value,)> = sqlx::query_as(&self.select_events)
            .bind(*aggregate_id.as_uuid())
            .bind(from_version.value())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(data,)| serde_json::from_value(data).map_err(Into::into))
            .collect()
    }

    async fn append_events(
        &self,
        aggregate_id: AggregateId,
        events: Vec<SerializedEvent>,
    ) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut stored = 0usize;
        for event in &events {
            let data = serde_json::to_value(event)?;
            let inserted = sqlx::query(&self.insert_event)
                .bind(*aggregate_id.as_uuid())
                .bind(event.aggregate_version().value())
                .bind(data)
                .execute(&mut *tx)
                .await;
            let result = match inserted {
                Ok(result) => result,
                Err(err) if is_unique_violation(&err) => {
                    tx.rollback().await?;
                    let head = self.head_version(aggregate_id).await?;
                    return Err(version_conflict(
                        aggregate_id,
                        head,
                        event.aggregate_version(),
                    ));
                }
                Err(err) => return Err(err.into()),
            };
            stored += result.rows_affected() as usize;
        }

        if stored != events.len() {
            // 事务在 drop 时回滚
            return Err(DomainError::StoreCountMismatch {
                expected: events.len(),
                stored,
            });
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn append_snapshot(&self, snapshot: SerializedSnapshot) -> Result<usize> {
        let data = serde_json::to_value(&snapshot)?;
        let result = sqlx::query(&self.insert_snapshot)
            .bind(*snapshot.aggregate_id().as_uuid())
            .bind(snapshot.aggregate_version().value())
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    DomainError::SnapshotExists {
                        aggregate_id: snapshot.aggregate_id().to_string(),
                        version: snapshot.aggregate_version().value(),
                    }
                } else {
                    err.into()
                }
            })?;

        Ok(result.rows_affected() as usize)
    }
}
