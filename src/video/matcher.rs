use std::collections::BTreeSet;

use futures::{executor, Stream};
use tracing::debug;

use crate::{
	hash::Hash256,
	video::{cache::CachedStream, record::FrameHash},
	Result,
};

/// Outcome of comparing two frame sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
	/// Whether either side matched above the threshold.
	pub is_match: bool,
	/// Percentage of left frames with a close frame on the right, truncated.
	pub left_match_percent: u32,
	/// Percentage of right frames with a close frame on the left, truncated.
	pub right_match_percent: u32,
}

/// Compare two frame sets.
///
/// A frame is matched when any frame of the other set lies at a Hamming
/// distance strictly below `max_distance`. The sets match when either side's
/// matched percentage exceeds `threshold`. An empty set has a percentage of 0.
///
/// Each side is treated as a set of hashes: records repeating a hash count once.
pub fn calculate_match(
	left: &[FrameHash],
	right: &[FrameHash],
	max_distance: u32,
	threshold: f64,
) -> MatchResult {
	let (left, right) = (unique_hashes(left), unique_hashes(right));
	let left_match_percent = match_percent(&left, &right, max_distance);
	let right_match_percent = match_percent(&right, &left, max_distance);
	let is_match = f64::from(left_match_percent) > threshold || f64::from(right_match_percent) > threshold;

	debug!(
		left = left.len(),
		right = right.len(),
		left_match_percent,
		right_match_percent,
		is_match,
		"compared frame sets"
	);

	MatchResult {
		is_match,
		left_match_percent,
		right_match_percent,
	}
}

/// [calculate_match] over cached streams. Each side is drained once and the
/// caller may reuse both for further comparisons.
pub async fn calculate_match_async(
	left: &mut CachedStream<'_, FrameHash>,
	right: &mut CachedStream<'_, FrameHash>,
	max_distance: u32,
	threshold: f64,
) -> Result<MatchResult> {
	let left = left.materialize().await?;
	let right = right.materialize().await?;

	Ok(calculate_match(left, right, max_distance, threshold))
}

/// Blocking [calculate_match_async] over two streams.
///
/// Must not be called from inside an async runtime.
pub fn calculate_match_blocking<L, R>(
	left: L,
	right: R,
	max_distance: u32,
	threshold: f64,
) -> Result<MatchResult>
where
	L: Stream<Item = Result<FrameHash>> + Send,
	R: Stream<Item = Result<FrameHash>> + Send,
{
	executor::block_on(async move {
		let mut left = CachedStream::new(left);
		let mut right = CachedStream::new(right);

		calculate_match_async(&mut left, &mut right, max_distance, threshold).await
	})
}

fn unique_hashes(frames: &[FrameHash]) -> Vec<Hash256> {
	let unique: BTreeSet<Hash256> = frames.iter().map(|frame| frame.hash()).collect();
	unique.into_iter().collect()
}

fn match_percent(frames: &[Hash256], others: &[Hash256], max_distance: u32) -> u32 {
	if frames.is_empty() {
		return 0;
	}

	// strictly below max_distance
	let Some(limit) = max_distance.checked_sub(1) else {
		return 0;
	};

	let matched = frames
		.iter()
		.filter(|frame| {
			others
				.iter()
				.any(|other| frame.hamming_distance_le(other, limit))
		})
		.count();

	(matched * 100 / frames.len()) as u32
}

#[cfg(test)]
mod tests {
	use futures::stream;
	use rand::SeedableRng;
	use rand_chacha::ChaCha8Rng;

	use super::*;
	use crate::Error;

	fn frames(hashes: &[Hash256]) -> Vec<FrameHash> {
		hashes
			.iter()
			.enumerate()
			.map(|(i, hash)| FrameHash::new(i as u32, *hash, None, None))
			.collect()
	}

	fn random_hashes(seed: u64, count: usize) -> Vec<Hash256> {
		let mut rng = ChaCha8Rng::seed_from_u64(seed);
		(0..count).map(|_| Hash256::new().fuzz(&mut rng, 256)).collect()
	}

	#[test]
	fn test_identical_sets_match() {
		let set = frames(&random_hashes(1, 12));
		let result = calculate_match(&set, &set, 1, 0.0);

		assert!(result.is_match);
		assert_eq!(result.left_match_percent, 100);
		assert_eq!(result.right_match_percent, 100);
	}

	#[test]
	fn test_far_sets_never_match() {
		let left = frames(&[Hash256::new(), Hash256::new().with_bit(3)]);
		let mut full = Hash256::new();
		full.set_all();
		let right = frames(&[full]);

		for threshold in [0.5, 10.0, 50.0, 99.0] {
			let result = calculate_match(&left, &right, 100, threshold);
			assert!(!result.is_match);
			assert_eq!(result.left_match_percent, 0);
		}
	}

	#[test]
	fn test_distance_is_strict() {
		let left = frames(&[Hash256::new()]);
		let right = frames(&[Hash256::new().with_bit(0).with_bit(1)]);

		assert_eq!(calculate_match(&left, &right, 2, 0.0).left_match_percent, 0);
		assert_eq!(calculate_match(&left, &right, 3, 0.0).left_match_percent, 100);
		assert_eq!(calculate_match(&left, &right, 0, 0.0).left_match_percent, 0);
	}

	#[test]
	fn test_partial_overlap() {
		// left: 4 frames, one of which appears on the right.
		let hashes = random_hashes(7, 5);
		let left = frames(&hashes[..4]);
		let right = frames(&[hashes[2], hashes[4]]);

		let result = calculate_match(&left, &right, 1, 40.0);
		assert_eq!(result.left_match_percent, 25);
		assert_eq!(result.right_match_percent, 50);
		assert!(result.is_match);

		let result = calculate_match(&left, &right, 1, 50.0);
		assert!(!result.is_match);
	}

	#[test]
	fn test_percent_truncates() {
		let hashes = random_hashes(11, 3);
		let left = frames(&hashes);
		let right = frames(&hashes[..1]);

		assert_eq!(calculate_match(&left, &right, 1, 0.0).left_match_percent, 33);
	}

	#[test]
	fn test_repeated_records_count_once() {
		let hashes = random_hashes(13, 2);
		let left = frames(&[hashes[0], hashes[0], hashes[0], hashes[1]]);
		let right = frames(&[hashes[0], hashes[0]]);

		let result = calculate_match(&left, &right, 1, 60.0);
		assert_eq!(result.left_match_percent, 50);
		assert_eq!(result.right_match_percent, 100);
		assert!(result.is_match);

		let result = calculate_match(&left, &right[..1], 1, 100.0);
		assert!(!result.is_match);
	}

	#[test]
	fn test_empty_set() {
		let set = frames(&random_hashes(3, 2));
		let result = calculate_match(&[], &set, 31, 0.0);

		assert_eq!(result.left_match_percent, 0);
		assert_eq!(result.right_match_percent, 0);
		assert!(!result.is_match);
	}

	#[tokio::test]
	async fn test_async_reuses_streams() {
		let hashes = random_hashes(5, 6);
		let mut left = CachedStream::new(stream::iter(frames(&hashes).into_iter().map(Ok)));
		let mut right = CachedStream::new(stream::iter(frames(&hashes[3..]).into_iter().map(Ok)));

		let first = calculate_match_async(&mut left, &mut right, 1, 80.0).await.unwrap();
		let second = calculate_match_async(&mut right, &mut left, 1, 80.0).await.unwrap();

		assert_eq!(first.left_match_percent, 50);
		assert_eq!(first.right_match_percent, 100);
		assert!(first.is_match);
		assert_eq!(second.left_match_percent, 100);
		assert_eq!(second.right_match_percent, 50);
	}

	#[test]
	fn test_blocking_matches_sync() {
		let hashes = random_hashes(9, 8);
		let left = frames(&hashes);
		let right = frames(&hashes[..2]);

		let blocking = calculate_match_blocking(
			stream::iter(left.clone().into_iter().map(Ok)),
			stream::iter(right.clone().into_iter().map(Ok)),
			31,
			80.0,
		)
		.unwrap();

		assert_eq!(blocking, calculate_match(&left, &right, 31, 80.0));
	}

	#[test]
	fn test_blocking_propagates_errors() {
		let result = calculate_match_blocking(
			stream::iter(vec![Err(Error::Producer("gone".into()))]),
			stream::empty(),
			31,
			80.0,
		);

		assert!(matches!(result, Err(Error::Producer(_))));
	}
}
