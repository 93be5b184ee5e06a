//! Track records (spec §3, GLOSSARY "Track").

/// Opaque, stable identifier for an indexed recording — typically a
/// content-derived hex digest.
pub type TrackId = String;

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub track_id: TrackId,
    pub title: String,
    pub artist: String,
    pub source_path: Option<String>,
    pub duration_s: f32,
    pub num_peaks: usize,
    pub num_hashes: usize,
}

impl Track {
    pub fn new(track_id: impl Into<TrackId>) -> Self {
        Track {
            track_id: track_id.into(),
            title: String::new(),
            artist: String::new(),
            source_path: None,
            duration_s: 0.0,
            num_peaks: 0,
            num_hashes: 0,
        }
    }
}

/// Aggregate counters returned by `stats()` (spec §4.D).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub n_tracks: usize,
    pub n_postings: usize,
    pub n_unique_hashes: usize,
}
