//! Video frame hashing and matching.
//!
//! Frames are extracted by an external producer, hashed one by one and pruned
//! by quality and by distance from the last kept frame. The surviving
//! [FrameHash] records can be written as text lines and compared with
//! [calculate_match].

/// Repeatable stream adapter.
pub mod cache;
pub mod extract;
/// Frame gating and the producer/consumer pipeline.
pub mod hasher;
/// Whole-set comparison of frame hashes.
pub mod matcher;
/// Line readers and writers for frame records.
pub mod parser;
/// The frame record type and its text form.
pub mod record;

pub use cache::CachedStream;
pub use hasher::{determine_frame_rate, probe_frame_rate, FrameFilter, VideoHasher};
pub use matcher::{calculate_match, calculate_match_async, calculate_match_blocking, MatchResult};
pub use parser::{parse_records, parse_str, read_records, write_records};
pub use record::FrameHash;
