//! Postgres-backed job table.
//!
//! Conditional writes are single `UPDATE ... WHERE` statements, so the
//! expected-value check and the write are one atomic step inside Postgres.
//! Record invariants are repeated as `CHECK` constraints.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | JobTableError | Scenario |
//! |----------------------|---------------|----------|
//! | `23505` | `DuplicateKey` | `put` of an existing job id |
//! | `23514` | `Domain` | Archive id set on a job that is not COMPLETED |
//! | Any other / pool / network | `Storage` | Transient storage failure |

use std::sync::Arc;

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use strata_core::{
    ArchiveId, DomainError, JobId, JobRecord, JobStatus, JobUpdate, ObjectLocation, UserId,
};

use super::r#trait::{ConditionalWrite, JobTable, JobTableError};
use crate::runtime::BlockingRuntime;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    job_id          UUID PRIMARY KEY,
    user_id         TEXT NOT NULL,
    user_email      TEXT NOT NULL,
    input_file_name TEXT NOT NULL CHECK (length(input_file_name) > 0),
    input_bucket    TEXT NOT NULL,
    input_key       TEXT NOT NULL,
    job_status      TEXT NOT NULL CHECK (job_status IN ('PENDING', 'RUNNING', 'COMPLETED')),
    submit_time     BIGINT NOT NULL,
    complete_time   BIGINT,
    result_bucket   TEXT,
    result_key      TEXT,
    log_bucket      TEXT,
    log_key         TEXT,
    archive_id      TEXT,
    CONSTRAINT jobs_archived_only_when_completed
        CHECK (archive_id IS NULL OR job_status = 'COMPLETED')
);

CREATE INDEX IF NOT EXISTS jobs_user_id_idx ON jobs (user_id);
"#;

const SELECT_COLUMNS: &str = r#"
    job_id, user_id, user_email, input_file_name, input_bucket, input_key,
    job_status, submit_time, complete_time, result_bucket, result_key,
    log_bucket, log_key, archive_id
"#;

#[derive(Debug, Clone)]
pub struct PostgresJobTable {
    pool: Arc<PgPool>,
    runtime: BlockingRuntime,
}

impl PostgresJobTable {
    pub fn new(pool: PgPool, runtime: BlockingRuntime) -> Self {
        Self {
            pool: Arc::new(pool),
            runtime,
        }
    }

    /// Open a small connection pool on a dedicated runtime.
    pub fn connect(database_url: &str) -> Result<Self, JobTableError> {
        let runtime = BlockingRuntime::new("strata-jobs-db")
            .map_err(|e| JobTableError::Storage(format!("failed to start runtime: {e}")))?;
        let pool = runtime
            .block_on(
                PgPoolOptions::new()
                    .max_connections(4)
                    .connect(database_url),
            )
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, runtime))
    }

    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    pub fn runtime(&self) -> &BlockingRuntime {
        &self.runtime
    }

    /// Create the `jobs` table and its owner index if missing.
    pub fn ensure_schema(&self) -> Result<(), JobTableError> {
        self.runtime
            .block_on(sqlx::raw_sql(SCHEMA).execute(&*self.pool))
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

impl JobTable for PostgresJobTable {
    #[instrument(skip(self), fields(job_id = %job_id), err)]
    fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, JobTableError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM jobs WHERE job_id = $1");
        let row = self
            .runtime
            .block_on(
                sqlx::query(&sql)
                    .bind(*job_id.as_uuid())
                    .fetch_optional(&*self.pool),
            )
            .map_err(|e| map_sqlx_error("get", e))?;

        row.map(|r| JobRow::from_pg(&r).and_then(JobRecord::try_from))
            .transpose()
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    fn query_by_owner(&self, user_id: &UserId) -> Result<Vec<JobRecord>, JobTableError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM jobs WHERE user_id = $1");
        let rows = self
            .runtime
            .block_on(
                sqlx::query(&sql)
                    .bind(user_id.as_str())
                    .fetch_all(&*self.pool),
            )
            .map_err(|e| map_sqlx_error("query_by_owner", e))?;

        rows.iter()
            .map(|r| JobRow::from_pg(r).and_then(JobRecord::try_from))
            .collect()
    }

    #[instrument(skip(self, record), fields(job_id = %record.job_id), err)]
    fn put(&self, record: JobRecord) -> Result<(), JobTableError> {
        record.validate()?;
        let job_id = record.job_id;
        let row = JobRow::from(record);

        self.runtime
            .block_on(
                sqlx::query(
                    r#"
                    INSERT INTO jobs (
                        job_id, user_id, user_email, input_file_name, input_bucket,
                        input_key, job_status, submit_time, complete_time,
                        result_bucket, result_key, log_bucket, log_key, archive_id
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                    "#,
                )
                .bind(row.job_id)
                .bind(&row.user_id)
                .bind(&row.user_email)
                .bind(&row.input_file_name)
                .bind(&row.input_bucket)
                .bind(&row.input_key)
                .bind(&row.job_status)
                .bind(row.submit_time)
                .bind(row.complete_time)
                .bind(&row.result_bucket)
                .bind(&row.result_key)
                .bind(&row.log_bucket)
                .bind(&row.log_key)
                .bind(&row.archive_id)
                .execute(&*self.pool),
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    JobTableError::DuplicateKey(job_id)
                } else {
                    map_sqlx_error("put", e)
                }
            })?;
        Ok(())
    }

    #[instrument(
        skip(self, update),
        fields(job_id = %job_id, expected = %expected, target = %update.target_status()),
        err
    )]
    fn conditional_update(
        &self,
        job_id: JobId,
        expected: JobStatus,
        update: JobUpdate,
    ) -> Result<ConditionalWrite, JobTableError> {
        update.validate_from(expected)?;

        let target = update.target_status();
        let (complete_time, result_file, log_file) = match &update {
            JobUpdate::Start => (None, None, None),
            JobUpdate::Complete(c) => (
                Some(c.complete_time),
                Some(c.result_file.clone()),
                Some(c.log_file.clone()),
            ),
        };

        let result = self
            .runtime
            .block_on(
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET job_status    = $3,
                        complete_time = COALESCE($4, complete_time),
                        result_bucket = COALESCE($5, result_bucket),
                        result_key    = COALESCE($6, result_key),
                        log_bucket    = COALESCE($7, log_bucket),
                        log_key       = COALESCE($8, log_key)
                    WHERE job_id = $1 AND job_status = $2
                    "#,
                )
                .bind(*job_id.as_uuid())
                .bind(expected.as_str())
                .bind(target.as_str())
                .bind(complete_time)
                .bind(result_file.as_ref().map(|l| l.bucket.as_str()))
                .bind(result_file.as_ref().map(|l| l.key.as_str()))
                .bind(log_file.as_ref().map(|l| l.bucket.as_str()))
                .bind(log_file.as_ref().map(|l| l.key.as_str()))
                .execute(&*self.pool),
            )
            .map_err(|e| map_sqlx_error("conditional_update", e))?;

        Ok(write_outcome(result.rows_affected()))
    }

    #[instrument(skip(self, expected, new), fields(job_id = %job_id), err)]
    fn set_archive_id(
        &self,
        job_id: JobId,
        expected: Option<&ArchiveId>,
        new: Option<&ArchiveId>,
    ) -> Result<ConditionalWrite, JobTableError> {
        let result = self
            .runtime
            .block_on(
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET archive_id = $3
                    WHERE job_id = $1 AND archive_id IS NOT DISTINCT FROM $2
                    "#,
                )
                .bind(*job_id.as_uuid())
                .bind(expected.map(ArchiveId::as_str))
                .bind(new.map(ArchiveId::as_str))
                .execute(&*self.pool),
            )
            .map_err(|e| map_sqlx_error("set_archive_id", e))?;

        Ok(write_outcome(result.rows_affected()))
    }
}

fn write_outcome(rows_affected: u64) -> ConditionalWrite {
    if rows_affected == 1 {
        ConditionalWrite::Applied
    } else {
        ConditionalWrite::Rejected
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobTableError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
            let msg = format!("database error in {operation} ({code}): {}", db_err.message());
            match code.as_str() {
                // Check constraint violation
                "23514" => JobTableError::Domain(DomainError::invariant(msg)),
                _ => JobTableError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            JobTableError::Storage(format!("connection pool closed in {operation}"))
        }
        _ => JobTableError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}

/// Flat column view of a [`JobRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct JobRow {
    job_id: Uuid,
    user_id: String,
    user_email: String,
    input_file_name: String,
    input_bucket: String,
    input_key: String,
    job_status: String,
    submit_time: i64,
    complete_time: Option<i64>,
    result_bucket: Option<String>,
    result_key: Option<String>,
    log_bucket: Option<String>,
    log_key: Option<String>,
    archive_id: Option<String>,
}

impl JobRow {
    fn from_pg(row: &PgRow) -> Result<Self, JobTableError> {
        let read = || -> Result<Self, sqlx::Error> {
            Ok(JobRow {
                job_id: row.try_get("job_id")?,
                user_id: row.try_get("user_id")?,
                user_email: row.try_get("user_email")?,
                input_file_name: row.try_get("input_file_name")?,
                input_bucket: row.try_get("input_bucket")?,
                input_key: row.try_get("input_key")?,
                job_status: row.try_get("job_status")?,
                submit_time: row.try_get("submit_time")?,
                complete_time: row.try_get("complete_time")?,
                result_bucket: row.try_get("result_bucket")?,
                result_key: row.try_get("result_key")?,
                log_bucket: row.try_get("log_bucket")?,
                log_key: row.try_get("log_key")?,
                archive_id: row.try_get("archive_id")?,
            })
        };
        read().map_err(|e| JobTableError::Storage(format!("failed to read job row: {e}")))
    }
}

fn location(bucket: Option<String>, key: Option<String>) -> Option<ObjectLocation> {
    match (bucket, key) {
        (Some(bucket), Some(key)) => Some(ObjectLocation { bucket, key }),
        _ => None,
    }
}

impl TryFrom<JobRow> for JobRecord {
    type Error = JobTableError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let record = JobRecord {
            job_id: JobId::from_uuid(row.job_id),
            user_id: UserId::new(row.user_id)?,
            user_email: row.user_email,
            input_file_name: row.input_file_name,
            input_file: ObjectLocation::new(row.input_bucket, row.input_key),
            status: row.job_status.parse()?,
            submit_time: row.submit_time,
            complete_time: row.complete_time,
            result_file: location(row.result_bucket, row.result_key),
            log_file: location(row.log_bucket, row.log_key),
            archive_id: row.archive_id.map(ArchiveId::new).transpose()?,
        };
        Ok(record)
    }
}

impl From<JobRecord> for JobRow {
    fn from(record: JobRecord) -> Self {
        let (result_bucket, result_key) = split(record.result_file);
        let (log_bucket, log_key) = split(record.log_file);
        JobRow {
            job_id: record.job_id.into(),
            user_id: record.user_id.into_inner(),
            user_email: record.user_email,
            input_file_name: record.input_file_name,
            input_bucket: record.input_file.bucket,
            input_key: record.input_file.key,
            job_status: record.status.as_str().to_string(),
            submit_time: record.submit_time,
            complete_time: record.complete_time,
            result_bucket,
            result_key,
            log_bucket,
            log_key,
            archive_id: record.archive_id.map(ArchiveId::into_inner),
        }
    }
}

fn split(location: Option<ObjectLocation>) -> (Option<String>, Option<String>) {
    match location {
        Some(l) => (Some(l.bucket), Some(l.key)),
        None => (None, None),
    }
}
