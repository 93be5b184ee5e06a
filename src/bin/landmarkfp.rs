//! `landmarkfp` — index and query audio files against a landmark
//! fingerprint store (spec §1).
//!
//! Usage:
//!   landmarkfp index  <db> <paths...> [--concurrency N]
//!   landmarkfp query  <db> <file> [--topk K] [--min-score S]
//!   landmarkfp forget <db> <track-id>
//!   landmarkfp show   <db> <track-id>
//!   landmarkfp stats  <db>

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use walkdir::WalkDir;

use landmarkfp::{
    fingerprint, index_paths, match_query, Config, LandmarkStore, MatchOptions, SqliteStore,
};

#[derive(Parser, Debug)]
#[command(name = "landmarkfp")]
#[command(about = "Landmark-based acoustic fingerprint indexing and matching", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index one or more audio files (directories are walked recursively).
    Index {
        /// Path to the SQLite database (created if missing).
        #[arg(long)]
        db: PathBuf,
        /// Audio files or directories to index.
        paths: Vec<PathBuf>,
        /// Number of worker threads used to fan out decoding.
        #[arg(long, default_value_t = num_cpus())]
        concurrency: usize,
    },
    /// Identify a query clip against the index.
    Query {
        #[arg(long)]
        db: PathBuf,
        /// The clip to identify.
        file: PathBuf,
        /// Maximum number of candidates to return.
        #[arg(long, default_value_t = 10)]
        topk: usize,
        /// Minimum score a candidate must clear to be reported.
        #[arg(long, default_value_t = 0.0)]
        min_score: f32,
    },
    /// Remove a track and all of its postings from the index.
    Forget {
        #[arg(long)]
        db: PathBuf,
        track_id: String,
    },
    /// Print metadata for a single indexed track.
    Show {
        #[arg(long)]
        db: PathBuf,
        track_id: String,
    },
    /// Print aggregate index counters.
    Stats {
        #[arg(long)]
        db: PathBuf,
    },
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::Builder::from_default_env().filter_level(level).init();

    let cfg = Config::default();
    cfg.validate().context("invalid configuration")?;

    match args.command {
        Command::Index { db, paths, concurrency } => run_index(&db, &paths, concurrency, &cfg),
        Command::Query { db, file, topk, min_score } => run_query(&db, &file, topk, min_score, &cfg),
        Command::Forget { db, track_id } => run_forget(&db, &track_id),
        Command::Show { db, track_id } => run_show(&db, &track_id),
        Command::Stats { db } => run_stats(&db),
    }
}

fn expand_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
                if entry.file_type().is_file() {
                    out.push(entry.path().to_path_buf());
                }
            }
        } else {
            out.push(path.clone());
        }
    }
    out
}

fn run_index(db: &PathBuf, paths: &[PathBuf], concurrency: usize, cfg: &Config) -> Result<()> {
    let store = SqliteStore::open(db).with_context(|| format!("opening {}", db.display()))?;
    let decoder = landmarkfp::decode::SymphoniaDecoder;
    let files = expand_paths(paths);
    if files.is_empty() {
        bail!("no input files found under the given paths");
    }
    log::info!("indexing {} file(s) with concurrency={concurrency}", files.len());

    let cancel = AtomicBool::new(false);
    let progress = |n: usize, total: usize, _outcome: &landmarkfp::FileOutcome| {
        log::debug!("progress {n}/{total}");
    };
    let report = index_paths(&files, &store, &decoder, cfg, concurrency, &cancel, Some(&progress));

    println!("indexed {} track(s), skipped {}", report.indexed, report.skipped);
    for (path, reason) in &report.errors {
        eprintln!("error: {}: {reason}", path.display());
    }
    Ok(())
}

fn run_query(db: &PathBuf, file: &PathBuf, topk: usize, min_score: f32, cfg: &Config) -> Result<()> {
    let store = SqliteStore::open(db).with_context(|| format!("opening {}", db.display()))?;
    let decoder = landmarkfp::decode::SymphoniaDecoder;
    use landmarkfp::decode::AudioDecoder;
    let decoded = decoder.decode(file).with_context(|| format!("decoding {}", file.display()))?;

    let landmarks = fingerprint(&decoded.interleaved, decoded.channels, decoded.source_rate, cfg);
    if landmarks.is_empty() {
        println!("no fingerprint extracted from {} (too short or too quiet)", file.display());
        return Ok(());
    }

    let opts = MatchOptions { k: topk, min_score, ..Default::default() };
    let results = match_query(&store, &landmarks, cfg.max_postings_per_hash_query, &opts);

    if results.is_empty() {
        println!("no match found");
        return Ok(());
    }
    for (rank, candidate) in results.iter().enumerate() {
        println!(
            "{}. {}  score={:.3}  offset_frames={}",
            rank + 1,
            candidate.track_id,
            candidate.score,
            candidate.offset_frames
        );
    }
    Ok(())
}

fn run_forget(db: &PathBuf, track_id: &str) -> Result<()> {
    let store = SqliteStore::open(db).with_context(|| format!("opening {}", db.display()))?;
    if store.forget(track_id)? {
        println!("removed {track_id}");
    } else {
        println!("{track_id} was not present");
    }
    Ok(())
}

fn run_show(db: &PathBuf, track_id: &str) -> Result<()> {
    let store = SqliteStore::open(db).with_context(|| format!("opening {}", db.display()))?;
    // Unlike `forget`, a missing id here is a hard error (spec §7
    // `UnknownTrack`), not an idempotent no-op: the caller asked to look up
    // one specific track, not to ensure its absence.
    let track = store.require_track(track_id)?;
    println!("track_id:   {}", track.track_id);
    println!("title:      {}", track.title);
    println!("artist:     {}", track.artist);
    if let Some(path) = &track.source_path {
        println!("path:       {path}");
    }
    println!("duration_s: {:.2}", track.duration_s);
    println!("num_peaks:  {}", track.num_peaks);
    println!("num_hashes: {}", track.num_hashes);
    Ok(())
}

fn run_stats(db: &PathBuf) -> Result<()> {
    let store = SqliteStore::open(db).with_context(|| format!("opening {}", db.display()))?;
    let stats = store.stats();
    println!("tracks:        {}", stats.n_tracks);
    println!("postings:      {}", stats.n_postings);
    println!("unique hashes: {}", stats.n_unique_hashes);
    Ok(())
}
