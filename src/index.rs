//! The in-memory inverted hash index (spec §4.D): `hash → postings`, plus
//! the track-metadata side table. Many-reader / single-writer-lease
//! concurrency per spec §5.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, RwLock};

use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::hashing::{Landmark, LandmarkHash};
use crate::track::{IndexStats, Track, TrackId};

/// A compact numeric handle into the track side table, used internally so
/// postings don't duplicate `track_id` strings (spec §4.D storage-shape
/// recommendation).
type TrackHandle = u32;

/// The `(track_id, anchor_time)` entry stored against a hash key (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub track_id: TrackId,
    pub anchor_time: u32,
}

#[derive(Debug, Clone, Copy)]
struct InternalPosting {
    handle: TrackHandle,
    anchor_time: u32,
}

struct TrackRecord {
    track: Track,
    /// Every hash this track contributed a posting under, so `forget` can
    /// find and remove them. May contain duplicates; harmless to revisit a
    /// bucket twice during cleanup.
    hashes: Vec<LandmarkHash>,
}

/// The operations every landmark store (in-memory or persisted) exposes
/// (spec §4.D's operation table).
pub trait LandmarkStore: Send + Sync {
    fn add_track(&self, track: Track, landmarks: &[Landmark]) -> Result<()>;
    fn forget(&self, track_id: &str) -> Result<bool>;
    fn lookup(&self, hash: LandmarkHash) -> Vec<Posting>;
    /// Same as [`LandmarkStore::lookup`] but returns at most `limit`
    /// postings, for the matcher's hot-hash guard (spec §4.E).
    fn lookup_capped(&self, hash: LandmarkHash, limit: usize) -> Vec<Posting>;
    fn get_track(&self, track_id: &str) -> Option<Track>;
    fn list_tracks(&self) -> Vec<Track>;
    fn stats(&self) -> IndexStats;

    /// Like [`LandmarkStore::get_track`], but raises `Error::UnknownTrack`
    /// instead of returning `None` — for callers (the CLI's `show`
    /// subcommand) that want a missing track to be a hard failure rather
    /// than an idempotent no-op (spec §7's `UnknownTrack` row).
    fn require_track(&self, track_id: &str) -> Result<Track> {
        self.get_track(track_id)
            .ok_or_else(|| Error::UnknownTrack(track_id.to_string()))
    }
}

/// An in-memory, shared, thread-safe landmark index backed by a sharded
/// concurrent map for postings and a reader/writer-locked side table for
/// track metadata. Recommended for corpora that fit in memory (spec §4.D).
pub struct MemoryIndex {
    postings: DashMap<LandmarkHash, Vec<InternalPosting>>,
    id_to_handle: DashMap<TrackId, TrackHandle>,
    tracks: RwLock<Vec<Option<TrackRecord>>>,
    next_handle: AtomicU32,
    /// Serializes the commit of one track's postings-and-metadata publish
    /// at a time (spec §5: "add_track takes an exclusive writer lease").
    write_lease: Mutex<()>,
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndex {
    pub fn new() -> Self {
        MemoryIndex {
            postings: DashMap::new(),
            id_to_handle: DashMap::new(),
            tracks: RwLock::new(Vec::new()),
            next_handle: AtomicU32::new(0),
            write_lease: Mutex::new(()),
        }
    }

    fn resolve_track_id(&self, handle: TrackHandle) -> Option<TrackId> {
        let tracks = self.tracks.read().expect("track table lock poisoned");
        tracks
            .get(handle as usize)
            .and_then(|slot| slot.as_ref())
            .map(|rec| rec.track.track_id.clone())
    }
}

impl LandmarkStore for MemoryIndex {
    fn add_track(&self, mut track: Track, landmarks: &[Landmark]) -> Result<()> {
        let _lease = self.write_lease.lock().expect("write lease poisoned");

        if self.id_to_handle.contains_key(&track.track_id) {
            return Err(Error::DuplicateTrack(track.track_id.clone()));
        }

        track.num_hashes = landmarks.len();

        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let mut touched_hashes = Vec::with_capacity(landmarks.len());

        // Bulk-insert postings in batches, amortizing per-posting overhead
        // (spec §4.D "SHOULD batch postings in groups of at least 1,000").
        const BATCH: usize = 1_000;
        for chunk in landmarks.chunks(BATCH) {
            for lm in chunk {
                self.postings
                    .entry(lm.hash)
                    .or_default()
                    .push(InternalPosting {
                        handle,
                        anchor_time: lm.anchor_time,
                    });
                touched_hashes.push(lm.hash);
            }
        }

        // Publish the track row last: until this point no reader can learn
        // the handle exists via get_track/list_tracks/stats, so nobody
        // observes a track whose posting count disagrees with num_hashes.
        self.id_to_handle.insert(track.track_id.clone(), handle);
        {
            let mut tracks = self.tracks.write().expect("track table lock poisoned");
            if tracks.len() <= handle as usize {
                tracks.resize_with(handle as usize + 1, || None);
            }
            tracks[handle as usize] = Some(TrackRecord {
                track,
                hashes: touched_hashes,
            });
        }

        Ok(())
    }

    fn forget(&self, track_id: &str) -> Result<bool> {
        let _lease = self.write_lease.lock().expect("write lease poisoned");

        let Some((_, handle)) = self.id_to_handle.remove(track_id) else {
            return Ok(false);
        };

        let hashes = {
            let mut tracks = self.tracks.write().expect("track table lock poisoned");
            tracks
                .get_mut(handle as usize)
                .and_then(|slot| slot.take())
                .map(|rec| rec.hashes)
                .unwrap_or_default()
        };

        for hash in hashes {
            if let Some(mut postings) = self.postings.get_mut(&hash) {
                postings.retain(|p| p.handle != handle);
            }
        }

        Ok(true)
    }

    fn lookup(&self, hash: LandmarkHash) -> Vec<Posting> {
        self.lookup_capped(hash, usize::MAX)
    }

    fn lookup_capped(&self, hash: LandmarkHash, limit: usize) -> Vec<Posting> {
        let Some(bucket) = self.postings.get(&hash) else {
            return Vec::new();
        };
        bucket
            .iter()
            .take(limit)
            .filter_map(|p| {
                self.resolve_track_id(p.handle).map(|track_id| Posting {
                    track_id,
                    anchor_time: p.anchor_time,
                })
            })
            .collect()
    }

    fn get_track(&self, track_id: &str) -> Option<Track> {
        let handle = *self.id_to_handle.get(track_id)?;
        let tracks = self.tracks.read().expect("track table lock poisoned");
        tracks
            .get(handle as usize)
            .and_then(|slot| slot.as_ref())
            .map(|rec| rec.track.clone())
    }

    fn list_tracks(&self) -> Vec<Track> {
        let tracks = self.tracks.read().expect("track table lock poisoned");
        tracks
            .iter()
            .filter_map(|slot| slot.as_ref().map(|rec| rec.track.clone()))
            .collect()
    }

    fn stats(&self) -> IndexStats {
        let tracks = self.tracks.read().expect("track table lock poisoned");
        let n_tracks = tracks.iter().filter(|s| s.is_some()).count();
        let n_postings: usize = self.postings.iter().map(|e| e.value().len()).sum();
        let n_unique_hashes = self.postings.iter().filter(|e| !e.value().is_empty()).count();
        IndexStats {
            n_tracks,
            n_postings,
            n_unique_hashes,
        }
    }
}
