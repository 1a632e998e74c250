//! Tunable thresholds, read from `pdq.toml` and `PDQ_*` environment variables.

use std::{path::Path, time::Duration};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::{
	video::hasher::{check_poll_interval, FRAME_SIZE, MIN_FRAME_DISTANCE, MIN_QUALITY},
	Result,
};

/// Settings file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "pdq.toml";

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
	/// Video frames below this quality are discarded.
	pub min_quality: u32,
	/// Video frames closer than this to the last kept frame are discarded.
	pub min_frame_distance: u32,
	/// Frames closer than this count as matching when comparing videos.
	pub match_distance: u32,
	/// Percentage of matched frames above which two videos match.
	pub match_threshold: f64,
	/// Edge of the square frames extracted from videos.
	pub frame_size: u32,
	/// Frame directory poll interval in milliseconds.
	pub poll_interval_ms: u64,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			min_quality: MIN_QUALITY,
			min_frame_distance: MIN_FRAME_DISTANCE,
			match_distance: 31,
			match_threshold: 80.0,
			frame_size: FRAME_SIZE,
			poll_interval_ms: 1000,
		}
	}
}

impl Settings {
	/// Load from `path`, or from `pdq.toml` if it exists, then apply `PDQ_*`
	/// environment overrides such as `PDQ_MIN_QUALITY=40`. A zero
	/// `poll_interval_ms` is rejected.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let file = match path {
			Some(path) => File::from(path).required(true),
			None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
		};

		let settings: Self = Config::builder()
			.add_source(file)
			.add_source(Environment::with_prefix("PDQ").try_parsing(true))
			.build()?
			.try_deserialize()?;
		check_poll_interval(settings.poll_interval())?;

		Ok(settings)
	}

	/// Poll interval as a [Duration].
	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}
}
