use thiserror::Error;

/// Errors produced while hashing, parsing or matching.
#[derive(Error, Debug)]
pub enum Error {
	/// Hex hash string was not exactly 64 characters long.
	#[error("incorrect hex length for pdq hash: expected 64 characters, got {0}")]
	HashLength(usize),

	/// Hex hash string contained a non-hex character.
	#[error("invalid hex in pdq hash: {0}")]
	Hex(#[from] hex::FromHexError),

	/// Frame record line could not be parsed.
	#[error("malformed frame record: {0}")]
	Record(String),

	/// A frame index or distance was negative.
	#[error("{field} must be non-negative, got {value}")]
	Negative {
		/// Name of the offending field.
		field: &'static str,
		/// Rejected value.
		value: i64,
	},

	/// Raster declared a color space other than sRGB.
	#[error("unsupported color space {0}, input must be sRGB")]
	ColorSpace(String),

	/// Raster dimensions or buffer were inconsistent.
	#[error("invalid raster: {0}")]
	Raster(String),

	/// Image could not be decoded.
	#[error("image error: {0}")]
	Image(#[from] image::ImageError),

	/// Filesystem or process IO failure.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	/// The video frame producer failed.
	#[error("frame producer failed: {0}")]
	Producer(String),

	/// A background hashing task panicked or was cancelled.
	#[error("hashing task failed: {0}")]
	Task(#[from] tokio::task::JoinError),

	/// No usable frame rate could be determined.
	#[error("unable to determine frame rate: {0}")]
	FrameRate(String),

	/// Settings could not be loaded.
	#[error("failed to load config: {0}")]
	Config(#[from] config::ConfigError),
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
