//! Error kinds surfaced by the core, one variant per row of spec §7.

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    /// Raised by the front end / decoder collaborator: input could not be
    /// turned into PCM.
    #[error("decode failure: {0}")]
    DecodeFailure(String),

    /// Raised by the peak extractor or hash generator when the input is too
    /// short or too quiet to produce any landmarks. Not logged as an error
    /// by callers; it is the expected outcome for silence.
    #[error("empty fingerprint: {0}")]
    EmptyFingerprint(String),

    /// Raised by `add_track` when `track_id` is already present.
    #[error("duplicate track: {0}")]
    DuplicateTrack(String),

    /// Raised by `forget`/`get_track` when the id is not in the store.
    /// Callers that only need idempotent delete should not treat this as
    /// fatal.
    #[error("unknown track: {0}")]
    UnknownTrack(String),

    /// An on-disk or in-memory invariant was violated. Fatal; surface to
    /// the operator.
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    /// Raised by `Config::validate`: the supplied configuration cannot
    /// produce a well-formed spectrogram or hash field, independent of any
    /// index state. Kept distinct from `CorruptIndex`, which is reserved
    /// for invariant violations raised by index operations.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Out of memory or storage quota. Caller may retry with lower
    /// concurrency.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Passthrough for the SQLite-backed store.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
