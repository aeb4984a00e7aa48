use super::{format_timestamp, parse_timestamp, ProvenanceStore};
use crate::error::StoreError;
use crate::hasher::Algorithm;
use crate::model::{FileRecord, HistoryEntry, RecordStatus, ScanSession, SignalFingerprint};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result};
use tracing::debug;

const SCHEMA_VERSION: i64 = 1;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = SqliteStore { conn };
        store.configure_pragmas()?;
        store.migrate_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteStore { conn };
        store.configure_pragmas()?;
        store.migrate_schema()?;
        Ok(store)
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode)");
        Ok(())
    }

    fn migrate_schema(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version < SCHEMA_VERSION {
            self.conn.execute_batch(include_str!("schema.sql"))?;
            debug!("SQLite schema initialized (version {})", SCHEMA_VERSION);
        }
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn session_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM scan_session", [], |row| row.get(0))
    }
}

fn insert_record(
    conn: &Connection,
    record: &FileRecord,
    scan_time: DateTime<Utc>,
) -> std::result::Result<(), StoreError> {
    let (status, reason) = match &record.status {
        RecordStatus::Ok => ("ok", None),
        RecordStatus::Failed(reason) => ("failed", Some(reason.as_str())),
    };
    let fingerprint = match &record.fingerprint {
        Some(fp) => Some(
            serde_json::to_string(fp)
                .map_err(|e| StoreError::Corrupt(format!("fingerprint encode: {}", e)))?,
        ),
        None => None,
    };

    let mut stmt = conn.prepare_cached(
        "INSERT INTO file_record \
         (relative_path, algorithm, scan_time, digest, size_bytes, modified_time, \
          status, failure_reason, fingerprint) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    stmt.execute(params![
        record.relative_path,
        record.algorithm.as_str(),
        format_timestamp(scan_time),
        record.digest,
        record.size_bytes as i64,
        record.modified_time.map(format_timestamp),
        status,
        reason,
        fingerprint,
    ])?;
    Ok(())
}

impl ProvenanceStore for SqliteStore {
    fn append_record(
        &mut self,
        record: &FileRecord,
        scan_time: DateTime<Utc>,
    ) -> std::result::Result<(), StoreError> {
        insert_record(&self.conn, record, scan_time)
    }

    fn append_records(
        &mut self,
        records: &[FileRecord],
        scan_time: DateTime<Utc>,
    ) -> std::result::Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        for record in records {
            insert_record(&tx, record, scan_time)?;
        }
        tx.commit()?;
        debug!("Appended {} provenance records", records.len());
        Ok(records.len())
    }

    fn append_session(&mut self, session: &ScanSession) -> std::result::Result<(), StoreError> {
        let (release_version, release_label) = match &session.release {
            Some(release) => (release.version.clone(), release.label.clone()),
            None => (None, None),
        };
        self.conn.execute(
            "INSERT INTO scan_session \
             (root_path, algorithm, file_count, failed_count, total_bytes, duration_ms, \
              started_at, completed_at, execution_mode, release_version, release_label) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                session.root_path,
                session.algorithm.as_str(),
                session.file_count as i64,
                session.failed_count as i64,
                session.total_size_bytes as i64,
                session.duration.as_millis() as i64,
                format_timestamp(session.started_at),
                format_timestamp(session.completed_at),
                session.execution_mode,
                release_version,
                release_label,
            ],
        )?;
        Ok(())
    }

    fn history(&self, relative_path: &str) -> std::result::Result<Vec<HistoryEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT relative_path, algorithm, digest, size_bytes, scan_time, status, \
                    failure_reason, fingerprint \
             FROM file_record WHERE relative_path = ?1 \
             ORDER BY scan_time DESC, id DESC",
        )?;

        let rows = stmt
            .query_map(params![relative_path], |row| {
                Ok(RawHistoryRow {
                    relative_path: row.get(0)?,
                    algorithm: row.get(1)?,
                    digest: row.get(2)?,
                    size_bytes: row.get(3)?,
                    scan_time: row.get(4)?,
                    status: row.get(5)?,
                    failure_reason: row.get(6)?,
                    fingerprint: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        rows.into_iter().map(RawHistoryRow::into_entry).collect()
    }
}

struct RawHistoryRow {
    relative_path: String,
    algorithm: String,
    digest: String,
    size_bytes: i64,
    scan_time: String,
    status: String,
    failure_reason: Option<String>,
    fingerprint: Option<String>,
}

impl RawHistoryRow {
    fn into_entry(self) -> std::result::Result<HistoryEntry, StoreError> {
        let algorithm: Algorithm = self.algorithm.parse().map_err(StoreError::Corrupt)?;
        let status = match self.status.as_str() {
            "ok" => RecordStatus::Ok,
            _ => RecordStatus::Failed(self.failure_reason.unwrap_or_default()),
        };
        let fingerprint = match self.fingerprint {
            Some(json) => Some(
                serde_json::from_str::<SignalFingerprint>(&json)
                    .map_err(|e| StoreError::Corrupt(format!("fingerprint decode: {}", e)))?,
            ),
            None => None,
        };

        Ok(HistoryEntry {
            relative_path: self.relative_path,
            algorithm,
            digest: self.digest,
            size_bytes: self.size_bytes as u64,
            scan_time: parse_timestamp(&self.scan_time)?,
            status,
            fingerprint,
        })
    }
}
