use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use disqualified_officers_core::{
    DisqualificationPayload, DisqualificationRecord, DisqualificationStore, OfficerId, OfficerType,
    StoreError,
};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use time::OffsetDateTime;

const LATEST_SCHEMA_VERSION: i64 = 1;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS disqualifications (
  officer_id TEXT PRIMARY KEY,
  officer_type TEXT NOT NULL CHECK (officer_type IN ('natural','corporate')),
  delta_at TEXT NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  officer_disq_id TEXT,
  officer_detail_id TEXT,
  officer_id_raw TEXT,
  data_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_disqualifications_officer_type ON disqualifications(officer_type);
";

const SELECT_COLUMNS: &str = "officer_id, officer_type, delta_at, created_at, updated_at,
    officer_disq_id, officer_detail_id, officer_id_raw, data_json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

/// SQLite-backed disqualification store.
///
/// Each operation opens its own connection, so one store value can be shared
/// across threads without locking.
#[derive(Debug, Clone)]
pub struct SqliteDisqualificationStore {
    db_path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteDisqualificationStore {
    /// Open the store at `db_path` and apply pending schema migrations.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or migrated.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_busy_timeout(db_path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Like [`Self::open`] with an explicit lock wait budget.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or migrated.
    pub fn open_with_busy_timeout(db_path: impl Into<PathBuf>, busy_timeout: Duration) -> Result<Self> {
        let store = Self { db_path: db_path.into(), busy_timeout };
        let mut conn = store.connect()?;
        migrate(&mut conn)?;
        tracing::debug!(db = %store.db_path.display(), "disqualifications store ready");
        Ok(store)
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Report current and target schema versions.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        let conn = self.connect()?;
        conn.execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };
        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
        })
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path).with_context(|| {
            format!("failed to open sqlite database at {}", self.db_path.display())
        })?;
        conn.busy_timeout(self.busy_timeout).context("failed to set sqlite busy timeout")?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to configure sqlite pragmas")?;
        Ok(conn)
    }

    fn load(&self, id: &OfficerId) -> Result<Option<StoredRow>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {SELECT_COLUMNS} FROM disqualifications WHERE officer_id = ?1"))
            .context("failed to prepare disqualification lookup")?;
        let row = stmt
            .query_row(params![id.as_str()], StoredRow::from_row)
            .optional()
            .with_context(|| format!("failed to read disqualification {id}"))?;
        Ok(row)
    }

    fn load_by_type(
        &self,
        id: &OfficerId,
        officer_type: OfficerType,
    ) -> Result<Option<StoredRow>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM disqualifications WHERE officer_id = ?1 AND officer_type = ?2"
            ))
            .context("failed to prepare typed disqualification lookup")?;
        let row = stmt
            .query_row(params![id.as_str(), officer_type.as_str()], StoredRow::from_row)
            .optional()
            .with_context(|| format!("failed to read {officer_type} disqualification {id}"))?;
        Ok(row)
    }

    fn upsert(&self, record: &DisqualificationRecord) -> Result<()> {
        let data_json =
            record.payload.data_json().context("failed to serialize disqualification payload")?;
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO disqualifications(
                officer_id, officer_type, delta_at, created_at, updated_at,
                officer_disq_id, officer_detail_id, officer_id_raw, data_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(officer_id) DO UPDATE SET
                officer_type = excluded.officer_type,
                delta_at = excluded.delta_at,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                officer_disq_id = excluded.officer_disq_id,
                officer_detail_id = excluded.officer_detail_id,
                officer_id_raw = excluded.officer_id_raw,
                data_json = excluded.data_json",
            params![
                record.id.as_str(),
                record.officer_type().as_str(),
                record.delta_at,
                rfc3339(record.created_at)?,
                rfc3339(record.updated_at)?,
                record.officer_disq_id,
                record.officer_detail_id,
                record.officer_id_raw,
                data_json,
            ],
        )
        .with_context(|| format!("failed to save disqualification {}", record.id))?;
        Ok(())
    }

    fn remove(&self, id: &OfficerId) -> Result<usize> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM disqualifications WHERE officer_id = ?1", params![id.as_str()])
            .with_context(|| format!("failed to delete disqualification {id}"))
    }
}

impl DisqualificationStore for SqliteDisqualificationStore {
    fn find_by_id(&self, id: &OfficerId) -> Result<Option<DisqualificationRecord>, StoreError> {
        self.load(id).map_err(|err| classify(&err))?.map(decode).transpose()
    }

    fn find_by_id_and_type(
        &self,
        id: &OfficerId,
        officer_type: OfficerType,
    ) -> Result<Option<DisqualificationRecord>, StoreError> {
        self.load_by_type(id, officer_type)
            .map_err(|err| classify(&err))?
            .map(decode)
            .transpose()
    }

    fn save(&self, record: &DisqualificationRecord) -> Result<(), StoreError> {
        record
            .validate()
            .map_err(|err| StoreError::Permanent(format!("record validation failed: {err}")))?;
        self.upsert(record).map_err(|err| classify(&err))
    }

    fn delete_by_id(&self, id: &OfficerId) -> Result<(), StoreError> {
        let removed = self.remove(id).map_err(|err| classify(&err))?;
        tracing::debug!(officer_id = %id, removed, "disqualification delete applied");
        Ok(())
    }
}

struct StoredRow {
    officer_id: String,
    officer_type: String,
    delta_at: String,
    created_at: String,
    updated_at: String,
    officer_disq_id: Option<String>,
    officer_detail_id: Option<String>,
    officer_id_raw: Option<String>,
    data_json: String,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            officer_id: row.get(0)?,
            officer_type: row.get(1)?,
            delta_at: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            officer_disq_id: row.get(5)?,
            officer_detail_id: row.get(6)?,
            officer_id_raw: row.get(7)?,
            data_json: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<DisqualificationRecord> {
        let id = OfficerId::parse(&self.officer_id)
            .map_err(|err| anyhow!("stored officer id is invalid: {err}"))?;
        let officer_type = OfficerType::parse(&self.officer_type)
            .map_err(|err| anyhow!("stored officer type is invalid: {err}"))?;
        let payload = DisqualificationPayload::from_data_json(officer_type, &self.data_json)
            .with_context(|| format!("failed to deserialize {officer_type} payload for {id}"))?;

        Ok(DisqualificationRecord {
            id,
            officer_disq_id: self.officer_disq_id,
            officer_detail_id: self.officer_detail_id,
            officer_id_raw: self.officer_id_raw,
            delta_at: self.delta_at,
            created_at: parse_rfc3339(&self.created_at)?,
            updated_at: parse_rfc3339(&self.updated_at)?,
            payload,
        })
    }
}

fn decode(row: StoredRow) -> Result<DisqualificationRecord, StoreError> {
    row.into_record().map_err(|err| {
        let message = format!("{err:#}");
        tracing::error!(error = %message, "stored disqualification cannot be decoded");
        StoreError::Corrupt(message)
    })
}

/// Sort a failure into retryable and non-retryable classes by the underlying
/// SQLite result code. Anything that is not an I/O or locking condition is
/// permanent.
fn classify(err: &anyhow::Error) -> StoreError {
    let message = format!("{err:#}");
    let transient = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<rusqlite::Error>())
        .is_some_and(is_transient_sqlite_error);

    if transient {
        tracing::warn!(error = %message, "transient sqlite failure");
        StoreError::Transient(message)
    } else {
        tracing::error!(error = %message, "permanent sqlite failure");
        StoreError::Permanent(message)
    }
}

fn is_transient_sqlite_error(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => matches!(
            failure.code,
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::CannotOpen
                | ErrorCode::DiskFull
                | ErrorCode::OutOfMemory
        ),
        _ => false,
    }
}

fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
        .context("failed to apply schema_migrations table")?;

    let version = current_schema_version(conn)?;
    if version < 1 {
        apply_migration_1(conn)?;
    }

    let version = current_schema_version(conn)?;
    if version != LATEST_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
        ));
    }
    Ok(())
}

fn apply_migration_1(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction().context("failed to start migration v1 transaction")?;
    tx.execute_batch(MIGRATION_001_SQL).context("failed to apply migration v1")?;
    record_schema_version(&tx, 1)?;
    tx.commit().context("failed to commit migration v1")?;
    tracing::info!(version = 1, "applied disqualifications schema migration");
    Ok(())
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = rfc3339(OffsetDateTime::now_utc())?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid RFC3339 timestamp: {value}"))
}
