//! Postgres-backed [`FleetStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;
use trove_torrent_core::{
    DownloadLocation, LocationId, NewQueuedAddition, PersistedTorrentRecord, QueuedAddition,
    RecordId, RecordKey, TorrentRecord, TrackerTorrent, WorkerId, WorkerInstance,
};

use crate::contract::{FleetStore, RecordFilter};
use crate::error::{DataError, Result};

const SELECT_WORKER_RECORDS_SQL: &str = r"
    SELECT id, announce_set_hash, content_hash, worker_id, location_id, name,
           size_bytes, uploaded_bytes, done, date_added, error, announces
    FROM fleet_torrents
    WHERE worker_id = $1
    ORDER BY id
";

const SELECT_INCOMPLETE_RECORDS_SQL: &str = r"
    SELECT id, announce_set_hash, content_hash, worker_id, location_id, name,
           size_bytes, uploaded_bytes, done, date_added, error, announces
    FROM fleet_torrents
    WHERE worker_id = $1 AND done < 1
    ORDER BY id
";

const SELECT_WORKER_HASH_RECORDS_SQL: &str = r"
    SELECT id, announce_set_hash, content_hash, worker_id, location_id, name,
           size_bytes, uploaded_bytes, done, date_added, error, announces
    FROM fleet_torrents
    WHERE worker_id = $1 AND content_hash = ANY($2)
    ORDER BY id
";

const SELECT_HASH_RECORDS_SQL: &str = r"
    SELECT id, announce_set_hash, content_hash, worker_id, location_id, name,
           size_bytes, uploaded_bytes, done, date_added, error, announces
    FROM fleet_torrents
    WHERE content_hash = ANY($1)
    ORDER BY id
";

const SELECT_KEY_RECORDS_SQL: &str = r"
    SELECT id, announce_set_hash, content_hash, worker_id, location_id, name,
           size_bytes, uploaded_bytes, done, date_added, error, announces
    FROM fleet_torrents
    WHERE (announce_set_hash, content_hash) IN (
        SELECT * FROM UNNEST($1::text[], $2::text[])
    )
    ORDER BY id
";

const SELECT_RECORD_SQL: &str = r"
    SELECT id, announce_set_hash, content_hash, worker_id, location_id, name,
           size_bytes, uploaded_bytes, done, date_added, error, announces
    FROM fleet_torrents
    WHERE id = $1
";

const SELECT_WORKERS_SQL: &str = r"SELECT id, backend, params FROM fleet_workers ORDER BY id";

const SELECT_LOCATIONS_SQL: &str =
    r"SELECT id, path, source_affinity, is_primary FROM fleet_locations ORDER BY id";

const INSERT_WORKER_SQL: &str =
    r"INSERT INTO fleet_workers (backend, params) VALUES ($1, $2) RETURNING id";

const INSERT_LOCATION_SQL: &str = r"
    INSERT INTO fleet_locations (path, source_affinity, is_primary)
    VALUES ($1, $2, $3)
    RETURNING id
";

const INSERT_RECORD_SQL: &str = r"
    INSERT INTO fleet_torrents (
        announce_set_hash, content_hash, worker_id, location_id, name,
        size_bytes, uploaded_bytes, done, date_added, error, announces
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    RETURNING id
";

const UPDATE_RECORD_SQL: &str = r"
    UPDATE fleet_torrents
    SET announce_set_hash = $2,
        content_hash = $3,
        worker_id = $4,
        location_id = $5,
        name = $6,
        size_bytes = $7,
        uploaded_bytes = $8,
        done = $9,
        date_added = $10,
        error = $11,
        announces = $12
    WHERE id = $1
";

const DELETE_WORKER_RECORDS_SQL: &str =
    r"DELETE FROM fleet_torrents WHERE worker_id = $1 AND content_hash = ANY($2)";

const DELETE_RECORD_SQL: &str = r"DELETE FROM fleet_torrents WHERE id = $1";

const RECORD_COUNTS_SQL: &str =
    r"SELECT worker_id, COUNT(*) AS total FROM fleet_torrents GROUP BY worker_id";

const ENQUEUE_SQL: &str = r"
    INSERT INTO fleet_queue (announce_set_hash, content_hash, priority_delay, destination_path)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT ON CONSTRAINT fleet_queue_identity DO NOTHING
";

const QUEUE_HEAD_SQL: &str = r"
    SELECT id, announce_set_hash, content_hash, enqueued_at, priority_delay, destination_path
    FROM fleet_queue
    ORDER BY priority_delay ASC, enqueued_at DESC, id DESC
    LIMIT 1
";

const REMOVE_QUEUED_SQL: &str = r"DELETE FROM fleet_queue WHERE id = $1";

const QUEUE_LEN_SQL: &str = r"SELECT COUNT(*) AS total FROM fleet_queue";

const UPSERT_TRACKER_TORRENT_SQL: &str = r"
    INSERT INTO tracker_torrents (
        tracker, torrent_id, announce_set_hash, content_hash, announces, retrieved_at
    )
    VALUES ($1, $2, $3, $4, $5, $6)
    ON CONFLICT (tracker, torrent_id) DO UPDATE
    SET announce_set_hash = EXCLUDED.announce_set_hash,
        content_hash = EXCLUDED.content_hash,
        announces = EXCLUDED.announces,
        retrieved_at = EXCLUDED.retrieved_at
";

const SELECT_TRACKER_TORRENTS_SQL: &str = r"
    SELECT tracker, torrent_id, announce_set_hash, content_hash, announces, retrieved_at
    FROM tracker_torrents
    WHERE tracker = $1 AND torrent_id = ANY($2)
    ORDER BY torrent_id
";

const KNOWN_CONSTRAINTS: [&str; 5] = [
    "fleet_torrents_identity",
    "fleet_torrents_worker_content",
    "fleet_locations_path_key",
    "fleet_locations_single_primary",
    "fleet_queue_identity",
];

/// Record store persisted in Postgres.
#[derive(Clone)]
pub struct PgFleetStore {
    pool: PgPool,
}

impl PgFleetStore {
    /// Initialise the store, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail or the database is unreachable.
    pub async fn new(pool: PgPool) -> Result<Self> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator
            .run(&pool)
            .await
            .map_err(|source| DataError::MigrationFailed { source })?;
        Ok(Self { pool })
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Register a worker and return its identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn register_worker(
        &self,
        backend: &str,
        params: &serde_json::Value,
    ) -> Result<WorkerId> {
        let id: i64 = sqlx::query_scalar(INSERT_WORKER_SQL)
            .bind(backend)
            .bind(Json(params))
            .fetch_one(&self.pool)
            .await
            .map_err(|err| DataError::query("register_worker", err))?;
        Ok(WorkerId(id))
    }

    /// Register a download location and return its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::ConstraintViolation`] when the path is taken or a
    /// second primary location is flagged.
    pub async fn register_location(
        &self,
        path: &str,
        source_affinity: Option<&str>,
        is_primary: bool,
    ) -> Result<LocationId> {
        let id: i64 = sqlx::query_scalar(INSERT_LOCATION_SQL)
            .bind(path)
            .bind(source_affinity)
            .bind(is_primary)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| classify("register_location", path, err))?;
        Ok(LocationId(id))
    }
}

#[async_trait]
impl FleetStore for PgFleetStore {
    async fn workers(&self) -> Result<Vec<WorkerInstance>> {
        let rows = sqlx::query(SELECT_WORKERS_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| DataError::query("workers", err))?;
        rows.iter()
            .map(|row| -> Result<WorkerInstance> {
                let Json(params): Json<serde_json::Value> = row.try_get("params")?;
                Ok(WorkerInstance {
                    id: WorkerId(row.try_get("id")?),
                    backend: row.try_get("backend")?,
                    params,
                })
            })
            .collect()
    }

    async fn locations(&self) -> Result<Vec<DownloadLocation>> {
        let rows = sqlx::query(SELECT_LOCATIONS_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| DataError::query("locations", err))?;
        rows.iter()
            .map(|row| -> Result<DownloadLocation> {
                Ok(DownloadLocation {
                    id: LocationId(row.try_get("id")?),
                    path: row.try_get("path")?,
                    source_affinity: row.try_get("source_affinity")?,
                    is_primary: row.try_get("is_primary")?,
                })
            })
            .collect()
    }

    async fn records_for_worker(
        &self,
        worker: WorkerId,
        filter: &RecordFilter,
    ) -> Result<Vec<PersistedTorrentRecord>> {
        let query = match filter {
            RecordFilter::All => sqlx::query(SELECT_WORKER_RECORDS_SQL).bind(worker.0),
            RecordFilter::Incomplete => sqlx::query(SELECT_INCOMPLETE_RECORDS_SQL).bind(worker.0),
            RecordFilter::ContentHashes(hashes) => sqlx::query(SELECT_WORKER_HASH_RECORDS_SQL)
                .bind(worker.0)
                .bind(hashes.clone()),
        };
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|err| DataError::query("records_for_worker", err))?;
        rows.iter().map(record_from_row).collect()
    }

    async fn records_by_content_hashes(
        &self,
        hashes: &[String],
    ) -> Result<Vec<PersistedTorrentRecord>> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(SELECT_HASH_RECORDS_SQL)
            .bind(hashes.to_vec())
            .fetch_all(&self.pool)
            .await
            .map_err(|err| DataError::query("records_by_content_hashes", err))?;
        rows.iter().map(record_from_row).collect()
    }

    async fn records_by_keys(&self, keys: &[RecordKey]) -> Result<Vec<PersistedTorrentRecord>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let announce: Vec<String> = keys.iter().map(|key| key.announce_set_hash.clone()).collect();
        let content: Vec<String> = keys.iter().map(|key| key.content_hash.clone()).collect();
        let rows = sqlx::query(SELECT_KEY_RECORDS_SQL)
            .bind(announce)
            .bind(content)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| DataError::query("records_by_keys", err))?;
        rows.iter().map(record_from_row).collect()
    }

    async fn record(&self, id: RecordId) -> Result<Option<PersistedTorrentRecord>> {
        let row = sqlx::query(SELECT_RECORD_SQL)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| DataError::query("record", err))?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn record_counts(&self) -> Result<HashMap<WorkerId, u64>> {
        let rows = sqlx::query(RECORD_COUNTS_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| DataError::query("record_counts", err))?;
        rows.iter()
            .map(|row| -> Result<(WorkerId, u64)> {
                let worker: i64 = row.try_get("worker_id")?;
                let total: i64 = row.try_get("total")?;
                Ok((WorkerId(worker), to_u64("total", total)?))
            })
            .collect()
    }

    async fn insert_records(&self, records: &[TorrentRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| DataError::query("insert_records", err))?;
        for record in records {
            insert_in(&mut tx, "insert_records", record).await?;
        }
        tx.commit()
            .await
            .map_err(|err| DataError::query("insert_records", err))?;
        debug!(count = records.len(), "inserted torrent records");
        Ok(())
    }

    async fn insert_record(&self, record: &TorrentRecord) -> Result<RecordId> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| DataError::query("insert_record", err))?;
        let id = insert_in(&mut tx, "insert_record", record).await?;
        tx.commit()
            .await
            .map_err(|err| DataError::query("insert_record", err))?;
        Ok(id)
    }

    async fn update_records(&self, records: &[PersistedTorrentRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| DataError::query("update_records", err))?;
        for persisted in records {
            let record = &persisted.record;
            sqlx::query(UPDATE_RECORD_SQL)
                .bind(persisted.id.0)
                .bind(&record.announce_set_hash)
                .bind(&record.content_hash)
                .bind(record.worker_id.0)
                .bind(record.location_id.0)
                .bind(&record.name)
                .bind(clamp_i64(record.size_bytes))
                .bind(clamp_i64(record.uploaded_bytes))
                .bind(record.done)
                .bind(record.date_added)
                .bind(record.error.as_deref())
                .bind(&record.announces)
                .execute(&mut *tx)
                .await
                .map_err(|err| classify("update_records", &record.key().to_string(), err))?;
        }
        tx.commit()
            .await
            .map_err(|err| DataError::query("update_records", err))?;
        debug!(count = records.len(), "updated torrent records");
        Ok(())
    }

    async fn delete_records(&self, worker: WorkerId, content_hashes: &[String]) -> Result<u64> {
        if content_hashes.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(DELETE_WORKER_RECORDS_SQL)
            .bind(worker.0)
            .bind(content_hashes.to_vec())
            .execute(&self.pool)
            .await
            .map_err(|err| DataError::query("delete_records", err))?;
        Ok(result.rows_affected())
    }

    async fn delete_record(&self, id: RecordId) -> Result<bool> {
        let result = sqlx::query(DELETE_RECORD_SQL)
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|err| DataError::query("delete_record", err))?;
        Ok(result.rows_affected() > 0)
    }

    async fn enqueue(&self, entry: &NewQueuedAddition) -> Result<bool> {
        let result = sqlx::query(ENQUEUE_SQL)
            .bind(&entry.key.announce_set_hash)
            .bind(&entry.key.content_hash)
            .bind(entry.priority_delay)
            .bind(&entry.destination_path)
            .execute(&self.pool)
            .await
            .map_err(|err| DataError::query("enqueue", err))?;
        Ok(result.rows_affected() > 0)
    }

    async fn queue_head(&self) -> Result<Option<QueuedAddition>> {
        let row = sqlx::query(QUEUE_HEAD_SQL)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| DataError::query("queue_head", err))?;
        row.map(|row| -> Result<QueuedAddition> {
            Ok(QueuedAddition {
                id: row.try_get("id")?,
                key: RecordKey {
                    announce_set_hash: row.try_get("announce_set_hash")?,
                    content_hash: row.try_get("content_hash")?,
                },
                enqueued_at: row.try_get("enqueued_at")?,
                priority_delay: row.try_get("priority_delay")?,
                destination_path: row.try_get("destination_path")?,
            })
        })
        .transpose()
    }

    async fn remove_queued(&self, id: i64) -> Result<()> {
        sqlx::query(REMOVE_QUEUED_SQL)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|err| DataError::query("remove_queued", err))?;
        Ok(())
    }

    async fn queue_len(&self) -> Result<u64> {
        let total: i64 = sqlx::query_scalar(QUEUE_LEN_SQL)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| DataError::query("queue_len", err))?;
        to_u64("total", total)
    }

    async fn upsert_tracker_torrent(&self, torrent: &TrackerTorrent) -> Result<()> {
        sqlx::query(UPSERT_TRACKER_TORRENT_SQL)
            .bind(&torrent.tracker)
            .bind(torrent.torrent_id)
            .bind(&torrent.key.announce_set_hash)
            .bind(&torrent.key.content_hash)
            .bind(&torrent.announces)
            .bind(torrent.retrieved_at)
            .execute(&self.pool)
            .await
            .map_err(|err| DataError::query("upsert_tracker_torrent", err))?;
        Ok(())
    }

    async fn tracker_torrents(&self, tracker: &str, ids: &[i64]) -> Result<Vec<TrackerTorrent>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(SELECT_TRACKER_TORRENTS_SQL)
            .bind(tracker)
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await
            .map_err(|err| DataError::query("tracker_torrents", err))?;
        rows.iter()
            .map(|row| -> Result<TrackerTorrent> {
                let retrieved_at: DateTime<Utc> = row.try_get("retrieved_at")?;
                Ok(TrackerTorrent {
                    tracker: row.try_get("tracker")?,
                    torrent_id: row.try_get("torrent_id")?,
                    key: RecordKey {
                        announce_set_hash: row.try_get("announce_set_hash")?,
                        content_hash: row.try_get("content_hash")?,
                    },
                    announces: row.try_get("announces")?,
                    retrieved_at,
                })
            })
            .collect()
    }
}

async fn insert_in(
    tx: &mut Transaction<'_, Postgres>,
    operation: &'static str,
    record: &TorrentRecord,
) -> Result<RecordId> {
    let id: i64 = sqlx::query_scalar(INSERT_RECORD_SQL)
        .bind(&record.announce_set_hash)
        .bind(&record.content_hash)
        .bind(record.worker_id.0)
        .bind(record.location_id.0)
        .bind(&record.name)
        .bind(clamp_i64(record.size_bytes))
        .bind(clamp_i64(record.uploaded_bytes))
        .bind(record.done)
        .bind(record.date_added)
        .bind(record.error.as_deref())
        .bind(&record.announces)
        .fetch_one(&mut **tx)
        .await
        .map_err(|err| classify(operation, &record.key().to_string(), err))?;
    Ok(RecordId(id))
}

fn record_from_row(row: &PgRow) -> Result<PersistedTorrentRecord> {
    Ok(PersistedTorrentRecord {
        id: RecordId(row.try_get("id")?),
        record: TorrentRecord {
            announce_set_hash: row.try_get("announce_set_hash")?,
            content_hash: row.try_get("content_hash")?,
            worker_id: WorkerId(row.try_get("worker_id")?),
            location_id: LocationId(row.try_get("location_id")?),
            name: row.try_get("name")?,
            size_bytes: to_u64("size_bytes", row.try_get("size_bytes")?)?,
            uploaded_bytes: to_u64("uploaded_bytes", row.try_get("uploaded_bytes")?)?,
            done: row.try_get("done")?,
            date_added: row.try_get("date_added")?,
            error: row.try_get("error")?,
            announces: row.try_get("announces")?,
        },
    })
}

fn classify(operation: &'static str, key: &str, err: sqlx::Error) -> DataError {
    let constraint = match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => db.constraint().and_then(|name| {
            KNOWN_CONSTRAINTS
                .iter()
                .copied()
                .find(|known| *known == name)
        }),
        _ => None,
    };
    constraint.map_or_else(
        || DataError::query(operation, err),
        |constraint| DataError::ConstraintViolation {
            operation,
            constraint,
            key: key.to_string(),
        },
    )
}

fn to_u64(field: &'static str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| DataError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
