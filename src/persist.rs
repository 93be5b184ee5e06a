//! A SQLite-backed [`LandmarkStore`], the "relational form" shape spec §4.D
//! recommends when persistence is required, with the schema from spec §6.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::error::{Error, Result};
use crate::hashing::{Landmark, LandmarkHash};
use crate::index::{LandmarkStore, Posting};
use crate::track::{IndexStats, Track, TrackId};

/// A durable landmark store. All operations take a connection-wide mutex:
/// SQLite's own locking already serializes writers, but bundling app-level
/// writer/commit semantics behind one mutex keeps the atomicity contract in
/// spec §5 explicit rather than relying on an underlying engine detail.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        let store = SqliteStore {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let store = SqliteStore {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().expect("sqlite lock poisoned");
        conn.execute_batch(
            "BEGIN;
             CREATE TABLE IF NOT EXISTS tracks (
                 track_id TEXT PRIMARY KEY,
                 title TEXT NOT NULL,
                 artist TEXT NOT NULL,
                 path TEXT,
                 duration_s REAL NOT NULL,
                 num_peaks INTEGER NOT NULL,
                 num_hashes INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS postings (
                 hash_value INTEGER NOT NULL,
                 track_id TEXT NOT NULL REFERENCES tracks(track_id) ON DELETE CASCADE,
                 anchor_time INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_postings_hash ON postings (hash_value);
             CREATE INDEX IF NOT EXISTS idx_postings_track ON postings (track_id);
             COMMIT;",
        )?;
        Ok(())
    }

    fn row_to_track(
        track_id: TrackId,
        title: String,
        artist: String,
        path: Option<String>,
        duration_s: f32,
        num_peaks: i64,
        num_hashes: i64,
    ) -> Track {
        Track {
            track_id,
            title,
            artist,
            source_path: path,
            duration_s,
            num_peaks: num_peaks as usize,
            num_hashes: num_hashes as usize,
        }
    }
}

impl LandmarkStore for SqliteStore {
    fn add_track(&self, mut track: Track, landmarks: &[Landmark]) -> Result<()> {
        track.num_hashes = landmarks.len();
        let mut conn = self.conn.lock().expect("sqlite lock poisoned");

        let existing: Option<TrackId> = conn
            .query_row(
                "SELECT track_id FROM tracks WHERE track_id = ?1",
                params![track.track_id],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(Error::DuplicateTrack(track.track_id.clone()));
        }

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO tracks (track_id, title, artist, path, duration_s, num_peaks, num_hashes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                track.track_id,
                track.title,
                track.artist,
                track.source_path,
                track.duration_s,
                track.num_peaks as i64,
                track.num_hashes as i64,
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO postings (hash_value, track_id, anchor_time) VALUES (?1, ?2, ?3)",
            )?;
            for lm in landmarks {
                stmt.execute(params![lm.hash, track.track_id, lm.anchor_time])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn forget(&self, track_id: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("sqlite lock poisoned");
        let changed = conn.execute("DELETE FROM tracks WHERE track_id = ?1", params![track_id])?;
        Ok(changed > 0)
    }

    fn lookup(&self, hash: LandmarkHash) -> Vec<Posting> {
        self.lookup_capped(hash, usize::MAX)
    }

    fn lookup_capped(&self, hash: LandmarkHash, limit: usize) -> Vec<Posting> {
        let conn = self.conn.lock().expect("sqlite lock poisoned");
        let limit_i64 = if limit == usize::MAX { i64::MAX } else { limit as i64 };
        let mut stmt = match conn.prepare(
            "SELECT track_id, anchor_time FROM postings WHERE hash_value = ?1 LIMIT ?2",
        ) {
            Ok(stmt) => stmt,
            Err(_) => return Vec::new(),
        };
        let rows = stmt.query_map(params![hash, limit_i64], |row| {
            Ok(Posting {
                track_id: row.get(0)?,
                anchor_time: row.get::<_, i64>(1)? as u32,
            })
        });
        match rows {
            Ok(rows) => rows.filter_map(|r| r.ok()).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn get_track(&self, track_id: &str) -> Option<Track> {
        let conn = self.conn.lock().expect("sqlite lock poisoned");
        conn.query_row(
            "SELECT track_id, title, artist, path, duration_s, num_peaks, num_hashes
             FROM tracks WHERE track_id = ?1",
            params![track_id],
            |row| {
                Ok(Self::row_to_track(
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            },
        )
        .optional()
        .ok()
        .flatten()
    }

    fn list_tracks(&self) -> Vec<Track> {
        let conn = self.conn.lock().expect("sqlite lock poisoned");
        let mut stmt = match conn.prepare(
            "SELECT track_id, title, artist, path, duration_s, num_peaks, num_hashes FROM tracks",
        ) {
            Ok(stmt) => stmt,
            Err(_) => return Vec::new(),
        };
        let rows = stmt.query_map([], |row| {
            Ok(Self::row_to_track(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))
        });
        match rows {
            Ok(rows) => rows.filter_map(|r| r.ok()).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn stats(&self) -> IndexStats {
        let conn = self.conn.lock().expect("sqlite lock poisoned");
        let n_tracks: i64 = conn
            .query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))
            .unwrap_or(0);
        let n_postings: i64 = conn
            .query_row("SELECT COUNT(*) FROM postings", [], |row| row.get(0))
            .unwrap_or(0);
        let n_unique_hashes: i64 = conn
            .query_row("SELECT COUNT(DISTINCT hash_value) FROM postings", [], |row| row.get(0))
            .unwrap_or(0);
        IndexStats {
            n_tracks: n_tracks as usize,
            n_postings: n_postings as usize,
            n_unique_hashes: n_unique_hashes as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> Track {
        Track::new(id.to_string())
    }

    fn lm(hash: LandmarkHash, t: u32) -> Landmark {
        Landmark { hash, anchor_time: t }
    }

    #[test]
    fn add_lookup_forget_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_track(track("a"), &[lm(1, 0), lm(1, 2)]).unwrap();
        assert_eq!(store.lookup(1).len(), 2);
        assert!(store.forget("a").unwrap());
        assert!(store.lookup(1).is_empty());
        assert!(store.get_track("a").is_none());
    }

    #[test]
    fn duplicate_track_rejected_with_no_partial_insert() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_track(track("a"), &[lm(1, 0)]).unwrap();
        let err = store.add_track(track("a"), &[lm(2, 0)]).unwrap_err();
        assert!(matches!(err, Error::DuplicateTrack(_)));
        // The rejected attempt must not have added hash 2's posting.
        assert!(store.lookup(2).is_empty());
    }

    #[test]
    fn forget_unknown_is_false_not_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(!store.forget("nope").unwrap());
    }

    #[test]
    fn cascade_delete_removes_postings() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_track(track("a"), &[lm(5, 0), lm(6, 1)]).unwrap();
        store.forget("a").unwrap();
        let stats = store.stats();
        assert_eq!(stats.n_tracks, 0);
        assert_eq!(stats.n_postings, 0);
    }
}
