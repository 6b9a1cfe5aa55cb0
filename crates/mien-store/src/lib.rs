//! mien-store — SQLite-backed identity store.
//!
//! Sole source of truth for the identity mapping: users (numeric id plus
//! the system-generated stable uuid), their captured image references,
//! and an append-only activity log. Schema is created lazily when the
//! store file does not exist yet.
//!
//! Image references are keyed by the *stable* identity on both the write
//! and the read path; the numeric training label is recovered from the
//! joined user record, never by re-parsing file names (the path parse is
//! kept only as a consistency-check fallback, see [`parse_sample_label`]).

use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create store directory: {0}")]
    CreateDir(std::io::Error),
    #[error("no user with stable id {0}")]
    UnknownOwner(String),
}

/// A registered user. `stable_id` is assigned once at first registration
/// and never changes for the lifetime of the numeric id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub numeric_id: i64,
    pub stable_id: String,
    pub name: String,
    pub age: i64,
    pub role: String,
}

/// One entry of the append-only activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRecord {
    pub activity: String,
    pub recorded_at: String,
}

/// Durable, process-external persistence for users, image references,
/// and activity records. Not designed for concurrent writers; callers
/// serialize sessions (the store is a single local file).
pub struct IdentityStore {
    conn: Connection,
    path: PathBuf,
}

impl IdentityStore {
    /// Open (creating if absent) the store at `path` and ensure the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StoreError::CreateDir)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id    INTEGER PRIMARY KEY,
                uuid  TEXT NOT NULL UNIQUE,
                name  TEXT NOT NULL,
                age   INTEGER NOT NULL,
                role  TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS images (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_uuid  TEXT NOT NULL REFERENCES users(uuid),
                image_path  TEXT NOT NULL CHECK (length(image_path) > 0)
            );
            CREATE TABLE IF NOT EXISTS user_activity (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id      INTEGER NOT NULL REFERENCES users(id),
                activity     TEXT NOT NULL,
                recorded_at  TEXT NOT NULL
            );",
        )?;

        tracing::debug!(path = %path.display(), "identity store opened");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Path of the backing store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a new user with a fresh stable id, or update the mutable
    /// fields of an existing one. The stable id is never rewritten.
    pub fn register_or_update(
        &self,
        numeric_id: i64,
        name: &str,
        age: i64,
        role: &str,
    ) -> Result<i64, StoreError> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT uuid FROM users WHERE id = ?1",
                params![numeric_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| self.log_fault("register_or_update lookup", e))?;

        match existing {
            Some(stable_id) => {
                self.conn
                    .execute(
                        "UPDATE users SET name = ?1, age = ?2, role = ?3 WHERE id = ?4",
                        params![name, age, role, numeric_id],
                    )
                    .map_err(|e| self.log_fault("register_or_update update", e))?;
                tracing::info!(user = numeric_id, stable_id, "user updated");
            }
            None => {
                let stable_id = uuid::Uuid::new_v4().to_string();
                self.conn
                    .execute(
                        "INSERT INTO users (id, uuid, name, age, role) VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![numeric_id, stable_id, name, age, role],
                    )
                    .map_err(|e| self.log_fault("register_or_update insert", e))?;
                tracing::info!(user = numeric_id, stable_id, "user registered");
            }
        }
        Ok(numeric_id)
    }

    /// Point lookup by numeric id. `Ok(None)` is a normal outcome,
    /// distinct from a storage fault.
    pub fn get_profile(&self, numeric_id: i64) -> Result<Option<UserProfile>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, uuid, name, age, role FROM users WHERE id = ?1",
                params![numeric_id],
                |row| {
                    Ok(UserProfile {
                        numeric_id: row.get(0)?,
                        stable_id: row.get(1)?,
                        name: row.get(2)?,
                        age: row.get(3)?,
                        role: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(|e| self.log_fault("get_profile", e))
    }

    /// Batch-insert image references for one stable identity as a single
    /// transaction. On any failure the whole batch rolls back; no partial
    /// image set survives.
    pub fn add_images(&self, stable_id: &str, paths: &[String]) -> Result<(), StoreError> {
        if paths.is_empty() {
            return Ok(());
        }
        if !self.owner_exists(stable_id)? {
            return Err(StoreError::UnknownOwner(stable_id.to_string()));
        }

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO images (owner_uuid, image_path) VALUES (?1, ?2)")?;
            for path in paths {
                stmt.execute(params![stable_id, path])
                    .map_err(|e| self.log_fault("add_images", e))?;
            }
        }
        tx.commit()?;
        tracing::info!(stable_id, count = paths.len(), "image batch recorded");
        Ok(())
    }

    /// All image references for a stable identity, as parallel
    /// (numeric label, path) sequences ordered by insertion.
    ///
    /// An unknown owner is a detectable integrity fault; an underlying
    /// storage fault on this read path degrades to two empty sequences.
    pub fn get_images(&self, stable_id: &str) -> Result<(Vec<i64>, Vec<String>), StoreError> {
        if !self.owner_exists(stable_id)? {
            return Err(StoreError::UnknownOwner(stable_id.to_string()));
        }

        match self.fetch_images(stable_id) {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::error!(stable_id, error = %e, "get_images failed, degrading to empty");
                Ok((Vec::new(), Vec::new()))
            }
        }
    }

    fn fetch_images(&self, stable_id: &str) -> Result<(Vec<i64>, Vec<String>), rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT u.id, i.image_path
             FROM images i JOIN users u ON i.owner_uuid = u.uuid
             WHERE i.owner_uuid = ?1
             ORDER BY i.id",
        )?;
        let rows = stmt.query_map(params![stable_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut labels = Vec::new();
        let mut paths = Vec::new();
        for row in rows {
            let (label, path) = row?;
            labels.push(label);
            paths.push(path);
        }
        tracing::info!(stable_id, count = paths.len(), "image references fetched");
        Ok((labels, paths))
    }

    /// Append one activity entry for a user, timestamped now.
    pub fn record_activity(&self, numeric_id: i64, activity: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO user_activity (user_id, activity, recorded_at) VALUES (?1, ?2, ?3)",
                params![numeric_id, activity, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(|e| self.log_fault("record_activity", e))?;
        Ok(())
    }

    /// Activity log for a user, most recent first.
    pub fn get_activity(&self, numeric_id: i64) -> Result<Vec<ActivityRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT activity, recorded_at FROM user_activity
             WHERE user_id = ?1 ORDER BY recorded_at DESC",
        )?;
        let rows = stmt.query_map(params![numeric_id], |row| {
            Ok(ActivityRecord {
                activity: row.get(0)?,
                recorded_at: row.get(1)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.log_fault("get_activity", e))
    }

    fn owner_exists(&self, stable_id: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM users WHERE uuid = ?1",
                params![stable_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| self.log_fault("owner lookup", e))?;
        Ok(found.is_some())
    }

    fn log_fault(&self, op: &str, e: rusqlite::Error) -> StoreError {
        tracing::error!(op, error = %e, "store operation failed");
        StoreError::Sqlite(e)
    }
}

/// Recover the numeric label from a sample file name of the form
/// `"<numeric_id>.<sample_index>.jpg"`.
///
/// Compatibility fallback only: labels are authoritative from the store
/// record, and the trainer uses this to cross-check each sample.
pub fn parse_sample_label(path: &str) -> Option<i64> {
    Path::new(path)
        .file_name()?
        .to_str()?
        .split('.')
        .next()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> (tempfile::TempDir, IdentityStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::open(&dir.path().join("store.db")).unwrap();
        (dir, store)
    }

    fn register(store: &IdentityStore, id: i64) -> UserProfile {
        store.register_or_update(id, "Ada", 30, "admin").unwrap();
        store.get_profile(id).unwrap().unwrap()
    }

    #[test]
    fn test_register_then_get_profile() {
        let (_dir, store) = open_store();
        let profile = register(&store, 7);
        assert_eq!(profile.numeric_id, 7);
        assert_eq!(profile.name, "Ada");
        assert_eq!(profile.age, 30);
        assert_eq!(profile.role, "admin");
        assert!(!profile.stable_id.is_empty());
    }

    #[test]
    fn test_get_profile_absent_is_none() {
        let (_dir, store) = open_store();
        assert!(store.get_profile(42).unwrap().is_none());
    }

    #[test]
    fn test_reregistration_preserves_stable_id() {
        let (_dir, store) = open_store();
        let first = register(&store, 7);

        store.register_or_update(7, "Ada Lovelace", 31, "operator").unwrap();
        let second = store.get_profile(7).unwrap().unwrap();

        assert_eq!(second.stable_id, first.stable_id);
        assert_eq!(second.name, "Ada Lovelace");
        assert_eq!(second.age, 31);
        assert_eq!(second.role, "operator");
    }

    #[test]
    fn test_add_and_get_images() {
        let (_dir, store) = open_store();
        let profile = register(&store, 7);

        let paths = vec!["a/7.1.jpg".to_string(), "a/7.2.jpg".to_string()];
        store.add_images(&profile.stable_id, &paths).unwrap();

        let (labels, fetched) = store.get_images(&profile.stable_id).unwrap();
        assert_eq!(labels, vec![7, 7]);
        assert_eq!(fetched, paths);
    }

    #[test]
    fn test_add_images_unknown_owner_is_detectable() {
        let (_dir, store) = open_store();
        let err = store
            .add_images("not-a-registered-uuid", &["x/1.1.jpg".to_string()])
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownOwner(_)));
    }

    #[test]
    fn test_get_images_unknown_owner_is_detectable() {
        let (_dir, store) = open_store();
        let err = store.get_images("not-a-registered-uuid").unwrap_err();
        assert!(matches!(err, StoreError::UnknownOwner(_)));
    }

    #[test]
    fn test_add_images_batch_is_atomic() {
        let (_dir, store) = open_store();
        let profile = register(&store, 7);

        // The empty path violates the schema CHECK mid-batch; the two valid
        // entries before it must not survive.
        let batch = vec![
            "a/7.1.jpg".to_string(),
            "a/7.2.jpg".to_string(),
            String::new(),
            "a/7.3.jpg".to_string(),
        ];
        assert!(store.add_images(&profile.stable_id, &batch).is_err());

        let (labels, paths) = store.get_images(&profile.stable_id).unwrap();
        assert!(labels.is_empty());
        assert!(paths.is_empty());
    }

    #[test]
    fn test_images_scoped_per_stable_id() {
        let (_dir, store) = open_store();
        let a = register(&store, 7);
        store.register_or_update(8, "Grace", 45, "user").unwrap();
        let b = store.get_profile(8).unwrap().unwrap();

        store.add_images(&a.stable_id, &["d/7.1.jpg".to_string()]).unwrap();
        store.add_images(&b.stable_id, &["d/8.1.jpg".to_string()]).unwrap();

        let (labels, paths) = store.get_images(&b.stable_id).unwrap();
        assert_eq!(labels, vec![8]);
        assert_eq!(paths, vec!["d/8.1.jpg".to_string()]);
    }

    #[test]
    fn test_activity_log_most_recent_first() {
        let (_dir, store) = open_store();
        register(&store, 7);

        store.record_activity(7, "enrolled").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.record_activity(7, "recognized").unwrap();

        let log = store.get_activity(7).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].activity, "recognized");
        assert_eq!(log[1].activity, "enrolled");
    }

    #[test]
    fn test_schema_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let stable_id = {
            let store = IdentityStore::open(&path).unwrap();
            register(&store, 7).stable_id
        };
        let store = IdentityStore::open(&path).unwrap();
        assert_eq!(store.get_profile(7).unwrap().unwrap().stable_id, stable_id);
    }

    #[test]
    fn test_parse_sample_label() {
        assert_eq!(parse_sample_label("images/uuid/7.12.jpg"), Some(7));
        assert_eq!(parse_sample_label("7.1.jpg"), Some(7));
        assert_eq!(parse_sample_label("images/uuid/notanumber.1.jpg"), None);
        assert_eq!(parse_sample_label(""), None);
    }
}
