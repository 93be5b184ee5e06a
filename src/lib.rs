//! A landmark-based acoustic fingerprint engine: spectral-peak
//! constellation extraction, combinatorial hashing, an inverted hash index,
//! and a time-offset-histogram matcher, in the spirit of the Shazam family
//! of algorithms.
//!
//! Container/codec decoding, the HTTP surface, directory walking,
//! configuration loading and logging setup, and authentication are external
//! collaborators — only a reference decoder is bundled here, behind
//! [`decode::AudioDecoder`].

pub mod config;
pub mod decode;
pub mod error;
pub mod frontend;
pub mod hashing;
pub mod index;
pub mod matcher;
pub mod peaks;
pub mod persist;
pub mod pipeline;
pub mod spectrogram;
pub mod track;

pub use config::Config;
pub use error::{Error, Result};
pub use hashing::{hashes, Landmark, LandmarkHash};
pub use index::{LandmarkStore, MemoryIndex, Posting};
pub use matcher::{match_query, MatchCandidate, MatchOptions};
pub use peaks::{cap_peaks, find_peaks, Peak};
pub use persist::SqliteStore;
pub use pipeline::{index_paths, FileOutcome, IndexReport};
pub use spectrogram::Spectrogram;
pub use track::{IndexStats, Track, TrackId};

/// Computes the landmark hashes for a decoded query clip in one call:
/// front end → peak extractor → hash generator. Returns an empty `Vec` for
/// any input too short, too quiet, or with fewer than two peaks (spec §4
/// edge cases) rather than an error — the caller treats this as "no
/// fingerprint", not a failure.
pub fn fingerprint(
    interleaved: &[f32],
    channels: u16,
    source_rate: u32,
    cfg: &Config,
) -> Vec<Landmark> {
    let spectrogram = frontend::to_spectrogram(interleaved, channels, source_rate, cfg);
    if spectrogram.is_empty() {
        return Vec::new();
    }
    let peaks = peaks::find_peaks(&spectrogram, cfg);
    hashing::hashes(&peaks, cfg)
}
