//! The matcher (spec §4.E): scores candidate tracks by the sharpness of
//! their query-to-track time-offset histogram and returns the aligned
//! top-k.

use std::collections::{HashMap, HashSet};

use crate::hashing::Landmark;
use crate::index::LandmarkStore;
use crate::track::TrackId;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub track_id: TrackId,
    pub score: f32,
    pub offset_frames: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct MatchOptions {
    pub k: usize,
    pub min_score: f32,
    pub max_candidates_scanned: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        MatchOptions {
            k: 10,
            min_score: 0.0,
            max_candidates_scanned: usize::MAX,
        }
    }
}

/// Scores every candidate track by the peak bin of its `Δ = anchor_time -
/// t_query` histogram, per spec §4.E. Each query landmark contributes at
/// most one vote to any single (track, bin) pair — the fix for the scoring
/// Open Question in spec §9, which otherwise lets a single query-hash with
/// colliding postings push `score` above 1.
pub fn match_query(
    store: &dyn LandmarkStore,
    query_landmarks: &[Landmark],
    max_postings_per_hash_query: usize,
    opts: &MatchOptions,
) -> Vec<MatchCandidate> {
    let q = query_landmarks.len();
    if q == 0 {
        return Vec::new();
    }

    let mut histograms: HashMap<TrackId, HashMap<i64, usize>> = HashMap::new();

    for landmark in query_landmarks {
        let postings = store.lookup_capped(landmark.hash, max_postings_per_hash_query);
        let mut credited_this_landmark: HashSet<(TrackId, i64)> = HashSet::new();

        for posting in postings {
            let delta = posting.anchor_time as i64 - landmark.anchor_time as i64;
            let key = (posting.track_id.clone(), delta);
            if credited_this_landmark.insert(key) {
                *histograms
                    .entry(posting.track_id)
                    .or_default()
                    .entry(delta)
                    .or_insert(0) += 1;
            }
        }
    }

    let mut candidates: Vec<MatchCandidate> = histograms
        .into_iter()
        .take(opts.max_candidates_scanned)
        .filter_map(|(track_id, histogram)| {
            let (&delta, &count) = histogram
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))?;
            let score = count as f32 / q as f32;
            Some(MatchCandidate {
                track_id,
                score,
                offset_frames: delta,
            })
        })
        .filter(|c| c.score >= opts.min_score)
        .collect();

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap()
            .then_with(|| a.track_id.cmp(&b.track_id))
    });
    candidates.truncate(opts.k);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::track::Track;

    fn lm(hash: u32, t: u32) -> Landmark {
        Landmark { hash, anchor_time: t }
    }

    #[test]
    fn empty_query_yields_no_matches() {
        let idx = MemoryIndex::new();
        let opts = MatchOptions::default();
        assert!(match_query(&idx, &[], 5_000, &opts).is_empty());
    }

    #[test]
    fn sharp_alignment_beats_diffuse_noise() {
        let idx = MemoryIndex::new();
        // T1: a run of landmarks with anchor times 0,1,2,...,19 all under
        // distinct hashes, so a query slice offset by 5 frames aligns
        // sharply.
        let t1_landmarks: Vec<Landmark> = (0..20).map(|i| lm(i, i)).collect();
        idx.add_track(Track::new("t1"), &t1_landmarks).unwrap();

        // T2: noise track reusing the same hash space but with anchor
        // times that never agree on a single delta.
        let t2_landmarks: Vec<Landmark> = (0..20).map(|i| lm(i, i * 7 % 23)).collect();
        idx.add_track(Track::new("t2"), &t2_landmarks).unwrap();

        // Query: same hashes as T1, offset by +5 (simulating a clip
        // starting 5 frames into T1).
        let query: Vec<Landmark> = (0..20).map(|i| lm(i, i + 5)).collect();

        let opts = MatchOptions { k: 5, ..Default::default() };
        let results = match_query(&idx, &query, 5_000, &opts);
        assert_eq!(results[0].track_id, "t1");
        assert_eq!(results[0].offset_frames, -5);
        assert!(results[0].score > 0.9);
        if let Some(t2) = results.iter().find(|r| r.track_id == "t2") {
            assert!(t2.score < results[0].score);
        }
    }

    #[test]
    fn score_never_exceeds_one_even_with_colliding_postings() {
        let idx = MemoryIndex::new();
        // Track emits the same hash at the same anchor time 50 times
        // (pathological duplicate landmarks, spec §3 permits multiplicity).
        let dup_landmarks: Vec<Landmark> = (0..50).map(|_| lm(1, 0)).collect();
        idx.add_track(Track::new("dup"), &dup_landmarks).unwrap();

        let query = vec![lm(1, 0)];
        let opts = MatchOptions::default();
        let results = match_query(&idx, &query, 5_000, &opts);
        assert_eq!(results.len(), 1);
        assert!(results[0].score <= 1.0);
        assert_eq!(results[0].score, 1.0); // 1 query landmark, 1 vote max.
    }

    #[test]
    fn ties_break_by_higher_hit_count_then_track_id() {
        let idx = MemoryIndex::new();
        idx.add_track(Track::new("b"), &[lm(1, 0)]).unwrap();
        idx.add_track(Track::new("a"), &[lm(1, 0)]).unwrap();
        let query = vec![lm(1, 0)];
        let opts = MatchOptions::default();
        let results = match_query(&idx, &query, 5_000, &opts);
        assert_eq!(results[0].track_id, "a");
        assert_eq!(results[1].track_id, "b");
    }

    #[test]
    fn min_score_prunes_weak_candidates() {
        let idx = MemoryIndex::new();
        idx.add_track(Track::new("weak"), &[lm(1, 0), lm(2, 100)]).unwrap();
        let query = vec![lm(1, 0), lm(2, 0), lm(3, 0), lm(4, 0)];
        let opts = MatchOptions { min_score: 0.5, ..Default::default() };
        let results = match_query(&idx, &query, 5_000, &opts);
        assert!(results.is_empty());
    }
}
