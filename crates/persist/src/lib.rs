//! Corral persistence: SQLite store for object identity and the last observed record.
//!
//! One row per `(kind, name)` holds the current state; the previous three records per object
//! are kept in a rotating history table.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use corral_core::ResourceKind;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;

const HISTORY_DEPTH: i64 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    pub kind: ResourceKind,
    pub name: String,
    /// `None` once the object is known to be gone.
    pub id: Option<String>,
    pub ts: i64,
    pub record: Json,
}

pub trait StateStore {
    fn put(&self, state: &StoredState) -> Result<()>;
    fn get(&self, kind: ResourceKind, name: &str) -> Result<Option<StoredState>>;
    /// Previous records, newest first.
    fn history(&self, kind: ResourceKind, name: &str, limit: Option<usize>) -> Result<Vec<StoredState>>;
    fn remove(&self, kind: ResourceKind, name: &str) -> Result<bool>;
    fn list(&self, kind: Option<ResourceKind>) -> Result<Vec<StoredState>>;
}

/// SQLite-backed store. Synchronous; callers are not latency sensitive.
pub struct SqliteStore {
    db: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    pub fn open_default() -> Result<Self> {
        let path = match std::env::var("CORRAL_DB_PATH") {
            Ok(p) => p,
            Err(_) => db_path_under(std::env::var_os("HOME").map(PathBuf::from))?,
        };
        Self::open(&path)
    }

    pub fn open(path: &str) -> Result<Self> {
        let started = std::time::Instant::now();
        let db = rusqlite::Connection::open(path).with_context(|| format!("opening sqlite db at {}", path))?;
        db.pragma_update(None, "journal_mode", "WAL").ok();
        db.pragma_update(None, "synchronous", "NORMAL").ok();
        db.execute(
            "CREATE TABLE IF NOT EXISTS state (
                kind   TEXT NOT NULL,
                name   TEXT NOT NULL,
                id     TEXT,
                ts     INTEGER NOT NULL,
                record BLOB NOT NULL,
                PRIMARY KEY (kind, name)
            )",
            [],
        )
        .context("creating state table")?;
        db.execute(
            "CREATE TABLE IF NOT EXISTS history (
                kind   TEXT NOT NULL,
                name   TEXT NOT NULL,
                id     TEXT,
                ts     INTEGER NOT NULL,
                record BLOB NOT NULL
            )",
            [],
        )
        .context("creating history table")?;
        db.execute("CREATE INDEX IF NOT EXISTS idx_history_key_ts ON history(kind, name, ts DESC)", []).ok();
        histogram!("persist_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        debug!(path, "state store open");
        Ok(Self { db: Mutex::new(db) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, rusqlite::Connection>> {
        self.db.lock().map_err(|_| anyhow!("state store lock poisoned"))
    }
}

fn encode(record: &Json) -> Result<Vec<u8>> {
    let text = serde_json::to_string(record).context("serializing record")?;
    Ok(maybe_compress(&text))
}

fn decode(blob: &[u8]) -> Result<Json> {
    serde_json::from_str(&maybe_decompress(blob)).context("parsing stored record")
}

fn parse_kind(s: &str) -> Result<ResourceKind> {
    s.parse::<ResourceKind>().map_err(|e| anyhow!("stored row has bad kind: {}", e))
}

type Row = (String, String, Option<String>, i64, Vec<u8>);

fn into_state(row: Row) -> Result<StoredState> {
    let (kind, name, id, ts, blob) = row;
    Ok(StoredState { kind: parse_kind(&kind)?, name, id, ts, record: decode(&blob)? })
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

impl StateStore for SqliteStore {
    fn put(&self, state: &StoredState) -> Result<()> {
        let started = std::time::Instant::now();
        let blob = encode(&state.record)?;
        let mut db = self.lock()?;
        let tx = db.transaction()?;
        tx.execute(
            "INSERT INTO history(kind, name, id, ts, record)
             SELECT kind, name, id, ts, record FROM state WHERE kind = ?1 AND name = ?2",
            (state.kind.as_str(), &state.name),
        )?;
        tx.execute(
            "DELETE FROM history
             WHERE kind = ?1 AND name = ?2
               AND rowid NOT IN (
                   SELECT rowid FROM history WHERE kind = ?1 AND name = ?2 ORDER BY ts DESC, rowid DESC LIMIT ?3
               )",
            (state.kind.as_str(), &state.name, HISTORY_DEPTH),
        )?;
        tx.execute(
            "INSERT INTO state(kind, name, id, ts, record) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(kind, name) DO UPDATE SET id = excluded.id, ts = excluded.ts, record = excluded.record",
            (state.kind.as_str(), &state.name, &state.id, state.ts, &blob),
        )?;
        tx.commit()?;
        histogram!("persist_put_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("persist_put_total", 1u64);
        Ok(())
    }

    fn get(&self, kind: ResourceKind, name: &str) -> Result<Option<StoredState>> {
        let started = std::time::Instant::now();
        let db = self.lock()?;
        let mut stmt = db.prepare("SELECT kind, name, id, ts, record FROM state WHERE kind = ?1 AND name = ?2")?;
        let mut rows = stmt.query((kind.as_str(), name))?;
        let out = match rows.next()? {
            Some(row) => Some(into_state(read_row(row)?)?),
            None => None,
        };
        histogram!("persist_get_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(out)
    }

    fn history(&self, kind: ResourceKind, name: &str, limit: Option<usize>) -> Result<Vec<StoredState>> {
        let cap = limit.unwrap_or(HISTORY_DEPTH as usize);
        let db = self.lock()?;
        let mut stmt = db.prepare(
            "SELECT kind, name, id, ts, record FROM history WHERE kind = ?1 AND name = ?2 ORDER BY ts DESC, rowid DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map((kind.as_str(), name, cap as i64), read_row)?;
        rows.map(|r| into_state(r?)).collect()
    }

    fn remove(&self, kind: ResourceKind, name: &str) -> Result<bool> {
        let db = self.lock()?;
        let n = db.execute("DELETE FROM state WHERE kind = ?1 AND name = ?2", (kind.as_str(), name))?;
        db.execute("DELETE FROM history WHERE kind = ?1 AND name = ?2", (kind.as_str(), name))?;
        counter!("persist_remove_total", 1u64);
        Ok(n > 0)
    }

    fn list(&self, kind: Option<ResourceKind>) -> Result<Vec<StoredState>> {
        let db = self.lock()?;
        let mut stmt = db.prepare(
            "SELECT kind, name, id, ts, record FROM state WHERE ?1 IS NULL OR kind = ?1 ORDER BY kind, name",
        )?;
        let rows = stmt.query_map([kind.map(|k| k.as_str())], read_row)?;
        rows.map(|r| into_state(r?)).collect()
    }
}

/// `<home>/.corral/corral.db`, creating the directory; `corral.db` in the working directory
/// without a home.
fn db_path_under(home: Option<PathBuf>) -> Result<String> {
    let Some(mut p) = home else { return Ok("corral.db".to_string()) };
    p.push(".corral");
    std::fs::create_dir_all(&p).with_context(|| format!("creating state directory {}", p.display()))?;
    p.push("corral.db");
    Ok(p.to_string_lossy().to_string())
}

/// Seconds since the epoch.
pub fn now_ts() -> i64 { time::OffsetDateTime::now_utc().unix_timestamp() }

pub fn maybe_compress(text: &str) -> Vec<u8> {
    #[cfg(feature = "zstd")]
    {
        let lvl: i32 = std::env::var("CORRAL_ZSTD_LEVEL").ok().and_then(|s| s.parse().ok()).unwrap_or(3);
        return zstd::encode_all(text.as_bytes(), lvl).unwrap_or_else(|_| text.as_bytes().to_vec());
    }
    #[allow(unreachable_code)]
    text.as_bytes().to_vec()
}

pub fn maybe_decompress(blob: &[u8]) -> String {
    #[cfg(feature = "zstd")]
    {
        if let Ok(de) = zstd::decode_all(std::io::Cursor::new(blob)) {
            return String::from_utf8_lossy(&de).to_string();
        }
    }
    String::from_utf8_lossy(blob).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_db() -> String {
        let dir = std::env::temp_dir();
        let f = format!("corral-test-{}.db", std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos());
        dir.join(f).to_string_lossy().to_string()
    }

    fn state(name: &str, id: Option<&str>, ts: i64) -> StoredState {
        StoredState {
            kind: ResourceKind::Project,
            name: name.to_string(),
            id: id.map(str::to_string),
            ts,
            record: json!({ "name": name, "cluster_id": "c-1", "description": format!("v{}", ts) }),
        }
    }

    #[test]
    fn state_directory_errors_surface() {
        let home = PathBuf::from(temp_db());
        assert_eq!(db_path_under(Some(home.clone())).unwrap(), home.join(".corral").join("corral.db").to_string_lossy());
        assert!(home.join(".corral").is_dir());

        // a plain file where the directory should go
        let blocked = PathBuf::from(temp_db());
        std::fs::write(&blocked, b"").unwrap();
        let err = db_path_under(Some(blocked)).unwrap_err();
        assert!(format!("{:#}", err).contains("creating state directory"), "{:#}", err);

        assert_eq!(db_path_under(None).unwrap(), "corral.db");
    }

    #[test]
    fn put_get_overwrites_current() {
        let s = SqliteStore::open(&temp_db()).unwrap();
        s.put(&state("payments", Some("p-1"), 1)).unwrap();
        s.put(&state("payments", Some("p-1"), 2)).unwrap();
        let got = s.get(ResourceKind::Project, "payments").unwrap().unwrap();
        assert_eq!(got.ts, 2);
        assert_eq!(got.record["description"], "v2");
        assert!(s.get(ResourceKind::Cluster, "payments").unwrap().is_none());
    }

    #[test]
    fn history_rotates_to_three() {
        let s = SqliteStore::open(&temp_db()).unwrap();
        for i in 0..6 {
            s.put(&state("payments", Some("p-1"), i)).unwrap();
        }
        let rows = s.history(ResourceKind::Project, "payments", None).unwrap();
        assert_eq!(rows.iter().map(|r| r.ts).collect::<Vec<_>>(), vec![4, 3, 2]);
    }

    #[test]
    fn cleared_identity_round_trips_and_remove_drops_rows() {
        let s = SqliteStore::open(&temp_db()).unwrap();
        s.put(&state("gone", None, 1)).unwrap();
        s.put(&state("kept", Some("p-2"), 1)).unwrap();
        assert_eq!(s.get(ResourceKind::Project, "gone").unwrap().unwrap().id, None);
        assert_eq!(s.list(None).unwrap().len(), 2);
        assert_eq!(s.list(Some(ResourceKind::Cluster)).unwrap().len(), 0);
        assert!(s.remove(ResourceKind::Project, "gone").unwrap());
        assert!(!s.remove(ResourceKind::Project, "gone").unwrap());
        assert_eq!(s.list(Some(ResourceKind::Project)).unwrap().len(), 1);
    }
}
