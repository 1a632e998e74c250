use std::{
	fmt::{self, Display},
	str::FromStr,
	time::Duration,
};

use crate::{hash::Hash256, Error, Result};

/// Fields in a canonical record line.
const NUM_FIELDS: usize = 4;

const NANOS_PER_TICK: u32 = 100;
const TICKS_PER_SECOND: u32 = 10_000_000;

/// Hash of one retained video frame.
///
/// Text form, one record per line: `frame,hash,distance,timestamp`, where
/// `distance` and `timestamp` may be empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHash {
	frame: u32,
	hash: Hash256,
	distance: Option<u32>,
	timestamp: Option<Duration>,
}

impl FrameHash {
	/// Create a record. The timestamp is truncated to whole 100 ns ticks, the
	/// resolution of the text form.
	pub fn new(frame: u32, hash: Hash256, distance: Option<u32>, timestamp: Option<Duration>) -> Self {
		Self {
			frame,
			hash,
			distance,
			timestamp: timestamp.map(truncate_to_ticks),
		}
	}

	/// Create a record from signed values, failing on a negative frame or distance.
	pub fn try_new(
		frame: i64,
		hash: Hash256,
		distance: Option<i64>,
		timestamp: Option<Duration>,
	) -> Result<Self> {
		let frame = non_negative("frame", frame)?;
		let distance = distance.map(|d| non_negative("distance", d)).transpose()?;

		Ok(Self::new(frame, hash, distance, timestamp))
	}

	/// Frame index within the video.
	pub fn frame(&self) -> u32 {
		self.frame
	}

	/// Perceptual hash of the frame.
	pub fn hash(&self) -> Hash256 {
		self.hash
	}

	/// Hamming distance from the previously retained frame.
	pub fn distance(&self) -> Option<u32> {
		self.distance
	}

	/// Position of the frame in the video.
	pub fn timestamp(&self) -> Option<Duration> {
		self.timestamp
	}

	/// Parse one record line held as bytes.
	pub fn from_bytes(line: &[u8]) -> Result<Self> {
		let line = std::str::from_utf8(line)
			.map_err(|e| Error::Record(format!("line is not valid UTF-8: {}", e)))?;

		line.parse()
	}
}

fn truncate_to_ticks(timestamp: Duration) -> Duration {
	let nanos = timestamp.subsec_nanos() / NANOS_PER_TICK * NANOS_PER_TICK;
	Duration::new(timestamp.as_secs(), nanos)
}

fn non_negative(field: &'static str, value: i64) -> Result<u32> {
	if value < 0 {
		return Err(Error::Negative { field, value });
	}

	u32::try_from(value).map_err(|_| Error::Record(format!("{} {} is out of range", field, value)))
}

fn parse_integer(field: &'static str, value: &str) -> Result<i64> {
	value
		.parse::<i64>()
		.map_err(|e| Error::Record(format!("invalid {} {:?}: {}", field, value, e)))
}

impl Display for FrameHash {
	/// Canonical record line, without the trailing newline.
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{},{},", self.frame, self.hash)?;

		if let Some(distance) = self.distance {
			write!(f, "{}", distance)?;
		}

		write!(f, ",")?;

		if let Some(timestamp) = self.timestamp {
			write!(f, "{}", format_timestamp(timestamp))?;
		}

		Ok(())
	}
}

impl FromStr for FrameHash {
	type Err = Error;

	fn from_str(line: &str) -> Result<Self> {
		let line = line.trim_end_matches(&['\r', '\n'][..]);
		let fields: Vec<&str> = line.split(',').collect();

		if fields.len() > NUM_FIELDS {
			return Err(Error::Record(format!(
				"too many fields ({}), valid format is <frame>,<hash>,<distance>,<timestamp>",
				fields.len()
			)));
		}

		let frame = match fields[0].trim() {
			"" => return Err(Error::Record("missing frame index".into())),
			value => parse_integer("frame", value)?,
		};

		let hash = match fields.get(1).map(|f| f.trim()) {
			None | Some("") => return Err(Error::Record("missing hash".into())),
			Some(value) => Hash256::from_hex(value)?,
		};

		let distance = match fields.get(2).map(|f| f.trim()) {
			None | Some("") => None,
			Some(value) => Some(parse_integer("distance", value)?),
		};

		let timestamp = match fields.get(3).map(|f| f.trim()) {
			None | Some("") => None,
			Some(value) => Some(parse_timestamp(value)?),
		};

		Self::try_new(frame, hash, distance, timestamp)
	}
}

/// Format as `[d.]hh:mm:ss[.fffffff]`.
pub fn format_timestamp(timestamp: Duration) -> String {
	let total = timestamp.as_secs();
	let (days, hours) = (total / 86_400, (total / 3_600) % 24);
	let (minutes, seconds) = ((total / 60) % 60, total % 60);
	let ticks = timestamp.subsec_nanos() / NANOS_PER_TICK;

	let mut text = String::new();
	if days > 0 {
		text.push_str(&format!("{}.", days));
	}
	text.push_str(&format!("{:02}:{:02}:{:02}", hours, minutes, seconds));
	if ticks > 0 {
		text.push_str(&format!(".{:07}", ticks));
	}

	text
}

/// Parse the `[d.]hh:mm:ss[.fffffff]` form written by [format_timestamp].
pub fn parse_timestamp(value: &str) -> Result<Duration> {
	let invalid = || Error::Record(format!("invalid timestamp {:?}", value));

	let parts: Vec<&str> = value.split(':').collect();
	if parts.len() != 3 {
		return Err(invalid());
	}

	let (days, hours) = match parts[0].split_once('.') {
		Some((days, hours)) => (days, hours),
		None => ("0", parts[0]),
	};
	let (seconds, fraction) = match parts[2].split_once('.') {
		Some((seconds, fraction)) => (seconds, fraction),
		None => (parts[2], ""),
	};

	let number = |text: &str| text.parse::<u64>().map_err(|_| invalid());
	let (days, hours, minutes, seconds) = (
		number(days)?,
		number(hours)?,
		number(parts[1])?,
		number(seconds)?,
	);

	if hours > 23 || minutes > 59 || seconds > 59 {
		return Err(invalid());
	}

	let ticks = if fraction.is_empty() {
		0
	} else {
		if fraction.len() > 7 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
			return Err(invalid());
		}
		// right-pad to 7 digits: ".5" is half a second
		let padded = format!("{:0<7}", fraction);
		padded.parse::<u32>().map_err(|_| invalid())?
	};

	let whole = ((days * 24 + hours) * 60 + minutes) * 60 + seconds;
	debug_assert!(ticks < TICKS_PER_SECOND);

	Ok(Duration::new(whole, ticks * NANOS_PER_TICK))
}
