//! The indexing pipeline (spec §4.F): fans out decode → spectrogram →
//! peaks → hashes across worker tasks, then serializes the `add_track`
//! commit per spec §5.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::decode::AudioDecoder;
use crate::error::Error;
use crate::frontend::to_spectrogram;
use crate::hashing::hashes;
use crate::index::LandmarkStore;
use crate::peaks::{cap_peaks, find_peaks};
use crate::track::{Track, TrackId};

/// Caps per-track peak count to bound memory on long files (spec §4.B).
const MAX_PEAKS_PER_TRACK: usize = 200_000;

#[derive(Debug)]
pub enum FileOutcome {
    Indexed { track_id: TrackId },
    Skipped { reason: String },
    Errored { reason: String },
}

#[derive(Debug, Default)]
pub struct IndexReport {
    pub indexed: usize,
    pub skipped: usize,
    pub errors: Vec<(PathBuf, String)>,
}

/// Derives a stable, opaque content-hash id for a file's bytes (spec §3:
/// "typically a content-derived hex digest").
fn content_track_id(bytes: &[u8]) -> TrackId {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn fingerprint_one(
    path: &Path,
    decoder: &dyn AudioDecoder,
    cfg: &Config,
) -> Result<(Track, Vec<crate::hashing::Landmark>), Error> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::DecodeFailure(format!("failed to read {}: {e}", path.display())))?;
    let track_id = content_track_id(&bytes);

    let decoded = decoder.decode(path)?;
    let spectrogram = to_spectrogram(&decoded.interleaved, decoded.channels, decoded.source_rate, cfg);
    if spectrogram.is_empty() {
        return Err(Error::EmptyFingerprint(format!(
            "{} produced no spectrogram frames",
            path.display()
        )));
    }

    let peaks = cap_peaks(find_peaks(&spectrogram, cfg), MAX_PEAKS_PER_TRACK);
    let landmarks = hashes(&peaks, cfg);

    let sample_count = decoded.interleaved.len() / decoded.channels.max(1) as usize;
    let duration_s = sample_count as f32 / decoded.source_rate.max(1) as f32;

    let mut track = Track::new(track_id);
    track.title = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    track.source_path = Some(path.display().to_string());
    track.duration_s = duration_s;
    track.num_peaks = peaks.len();
    track.num_hashes = landmarks.len();

    Ok((track, landmarks))
}

/// Fans out decode→spectrogram→peaks→hashes over `paths` using up to
/// `concurrency` worker threads, then commits each track with `add_track`.
/// Individual file failures are recorded, not fatal to the batch (spec
/// §4.F). `cancel`, checked at each file boundary, supports cooperative
/// cancellation (spec §5) — an in-flight `add_track` always runs to
/// completion once started.
pub fn index_paths(
    paths: &[PathBuf],
    store: &dyn LandmarkStore,
    decoder: &dyn AudioDecoder,
    cfg: &Config,
    concurrency: usize,
    cancel: &AtomicBool,
    progress: Option<&(dyn Fn(usize, usize, &FileOutcome) + Sync)>,
) -> IndexReport {
    let total = paths.len();
    let done = AtomicUsize::new(0);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .build()
        .expect("failed to build worker pool");

    let outcomes: Vec<(PathBuf, FileOutcome)> = pool.install(|| {
        paths
            .par_iter()
            .map(|path| {
                if cancel.load(Ordering::SeqCst) {
                    let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                    let outcome = FileOutcome::Skipped {
                        reason: "cancelled".into(),
                    };
                    if let Some(cb) = progress {
                        cb(n, total, &outcome);
                    }
                    return (path.clone(), outcome);
                }

                let outcome = match fingerprint_one(path, decoder, cfg) {
                    Ok((track, landmarks)) => {
                        let track_id = track.track_id.clone();
                        match store.add_track(track, &landmarks) {
                            Ok(()) => FileOutcome::Indexed { track_id },
                            Err(Error::DuplicateTrack(id)) => FileOutcome::Skipped {
                                reason: format!("duplicate track {id}"),
                            },
                            Err(e) => FileOutcome::Errored {
                                reason: e.to_string(),
                            },
                        }
                    }
                    Err(Error::EmptyFingerprint(reason)) => FileOutcome::Skipped { reason },
                    Err(e) => FileOutcome::Errored {
                        reason: e.to_string(),
                    },
                };

                let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(cb) = progress {
                    cb(n, total, &outcome);
                }
                (path.clone(), outcome)
            })
            .collect()
    });

    let mut report = IndexReport::default();
    for (path, outcome) in outcomes {
        match outcome {
            FileOutcome::Indexed { .. } => report.indexed += 1,
            FileOutcome::Skipped { reason } => {
                log::debug!("skipped {}: {reason}", path.display());
                report.skipped += 1;
            }
            FileOutcome::Errored { reason } => {
                log::warn!("error indexing {}: {reason}", path.display());
                report.errors.push((path, reason));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodedAudio;
    use crate::index::MemoryIndex;
    use std::f32::consts::PI;
    use std::io::Write;

    struct FakeDecoder {
        sample_rate: u32,
    }

    impl AudioDecoder for FakeDecoder {
        fn decode(&self, path: &Path) -> Result<DecodedAudio, Error> {
            let bytes = std::fs::read(path).unwrap();
            let n = bytes.len() / 4;
            let mut samples = Vec::with_capacity(n);
            for i in 0..n {
                let t = i as f32 / self.sample_rate as f32;
                samples.push(0.5 * (2.0 * PI * 440.0 * t).sin());
            }
            Ok(DecodedAudio {
                interleaved: samples,
                channels: 1,
                source_rate: self.sample_rate,
            })
        }
    }

    #[test]
    fn indexes_files_and_reports_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for i in 0..3 {
            let path = dir.path().join(format!("song{i}.raw"));
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(&vec![0u8; 4 * 11_025 * 2]).unwrap();
            paths.push(path);
        }

        let store = MemoryIndex::new();
        let decoder = FakeDecoder { sample_rate: 11_025 };
        let cfg = Config::default();
        let cancel = AtomicBool::new(false);

        let report = index_paths(&paths, &store, &decoder, &cfg, 2, &cancel, None);
        assert_eq!(report.indexed, 3);
        assert_eq!(report.skipped, 0);
        assert!(report.errors.is_empty());
        assert_eq!(store.stats().n_tracks, 3);
    }

    #[test]
    fn cancellation_skips_remaining_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.raw");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&vec![0u8; 4 * 11_025 * 2])
            .unwrap();
        let paths = vec![path];

        let store = MemoryIndex::new();
        let decoder = FakeDecoder { sample_rate: 11_025 };
        let cfg = Config::default();
        let cancel = AtomicBool::new(true);

        let report = index_paths(&paths, &store, &decoder, &cfg, 1, &cancel, None);
        assert_eq!(report.indexed, 0);
        assert_eq!(report.skipped, 1);
    }
}
