//! Rust PDQ perceptual hashing library, supporting still images and videos.
//!
//! Images are reduced to a 256-bit [Hash256] whose Hamming distance to other
//! hashes tracks visual similarity. Videos are hashed frame by frame into
//! [FrameHash] records that can be compared as sets with [calculate_match].
//!
//! ```no_run
//! use pdq::PdqHasher;
//!
//! let hasher = PdqHasher::new();
//! let first = hasher.from_path("first.jpg")?;
//! let second = hasher.from_path("second.jpg")?;
//! println!("distance {}", first.hash.hamming_distance(&second.hash));
//! # Ok::<(), pdq::Error>(())
//! ```

#![deny(missing_docs)]
#![allow(clippy::tabs_in_doc_comments)]
use std::path::Path;

/// Settings file and environment loading.
pub mod config;
mod error;
/// The 256-bit hash value type.
pub mod hash;
pub mod hasher;
/// Median selection.
pub mod median;
pub mod stats;
pub mod video;

pub use crate::{
	config::Settings,
	error::{Error, Result},
	hash::Hash256,
	hasher::{raster::Raster, HashResult, HashingStatistics, PdqHasher},
	video::{
		calculate_match, calculate_match_async, calculate_match_blocking, FrameHash, MatchResult,
		VideoHasher,
	},
};

/// Media kinds with a dedicated hashing path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
	/// Still image.
	Image,

	/// Video.
	Video,
}

/// Sniff the file at `path`. Returns [None] for anything that is neither an
/// image nor a video.
pub fn detect_type<P: AsRef<Path>>(path: P) -> Result<Option<Type>> {
	let kind = match infer::get_from_path(&path)? {
		Some(kind) => match kind.matcher_type() {
			infer::MatcherType::Image => Some(Type::Image),
			infer::MatcherType::Video => Some(Type::Video),
			_ => None,
		},
		None => None,
	};

	Ok(kind)
}
