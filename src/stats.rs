//! Process-wide hashing telemetry. Append-only; nothing in the hashing path reads it.

use std::{
	sync::atomic::{AtomicU64, Ordering},
	time::Duration,
};

static HASHES_GENERATED: AtomicU64 = AtomicU64::new(0);
static READ_MICROS: AtomicU64 = AtomicU64::new(0);
static HASH_MICROS: AtomicU64 = AtomicU64::new(0);

/// Totals accumulated since process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
	/// Number of image hashes produced.
	pub hashes_generated: u64,
	/// Time spent decoding and preparing inputs.
	pub read_duration: Duration,
	/// Time spent in the hashing pipeline.
	pub hash_duration: Duration,
}

pub(crate) fn record(read: Duration, hash: Duration) {
	HASHES_GENERATED.fetch_add(1, Ordering::Relaxed);
	READ_MICROS.fetch_add(read.as_micros() as u64, Ordering::Relaxed);
	HASH_MICROS.fetch_add(hash.as_micros() as u64, Ordering::Relaxed);
}

/// Current totals.
pub fn snapshot() -> Snapshot {
	Snapshot {
		hashes_generated: HASHES_GENERATED.load(Ordering::Relaxed),
		read_duration: Duration::from_micros(READ_MICROS.load(Ordering::Relaxed)),
		hash_duration: Duration::from_micros(HASH_MICROS.load(Ordering::Relaxed)),
	}
}
