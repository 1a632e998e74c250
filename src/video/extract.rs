//! Frame extraction through the `ffmpeg` and `ffprobe` command line tools.

use std::{path::Path, process::Stdio, time::Duration};

use tokio::process::Command;
use tracing::debug;

use crate::{Error, Result};

/// File name prefix of extracted frames.
pub const FRAME_PREFIX: &str = "Frame";
/// File name extension of extracted frames.
pub const FRAME_EXTENSION: &str = "png";

/// Container facts needed to pick a frame rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeInfo {
	/// Total duration, if the container reports one.
	pub duration: Option<Duration>,
	/// Whether a video stream is present.
	pub has_video: bool,
}

/// Parse `ffprobe -show_entries format=duration:stream=codec_type` output in
/// the `default=noprint_wrappers=1` form.
pub fn parse_probe_output(output: &str) -> ProbeInfo {
	let mut info = ProbeInfo {
		duration: None,
		has_video: false,
	};

	for line in output.lines() {
		match line.trim().split_once('=') {
			Some(("codec_type", "video")) => info.has_video = true,
			Some(("duration", value)) => {
				info.duration = value
					.parse::<f64>()
					.ok()
					.and_then(|secs| Duration::try_from_secs_f64(secs).ok())
			}
			_ => {}
		}
	}

	info
}

/// Probe a local path or URL.
pub async fn probe(input: &str) -> Result<ProbeInfo> {
	let output = Command::new("ffprobe")
		.args([
			"-v",
			"error",
			"-show_entries",
			"format=duration:stream=codec_type",
			"-of",
			"default=noprint_wrappers=1",
			input,
		])
		.stdin(Stdio::null())
		.kill_on_drop(true)
		.output()
		.await?;

	if !output.status.success() {
		return Err(Error::Producer(format!(
			"ffprobe failed on {}: {}",
			input,
			String::from_utf8_lossy(&output.stderr).trim()
		)));
	}

	let info = parse_probe_output(&String::from_utf8_lossy(&output.stdout));
	debug!(input, ?info, "probed video");

	Ok(info)
}

/// Decode `input` at `frame_rate` into `Frame00000.png`, `Frame00001.png`...
/// inside `output_dir`, each scaled to `frame_size` squared.
///
/// The child process is killed if the returned future is dropped.
pub async fn extract_frames(
	input: String,
	frame_rate: f64,
	frame_size: u32,
	output_dir: &Path,
) -> Result<()> {
	let pattern = output_dir.join(format!("{}%05d.{}", FRAME_PREFIX, FRAME_EXTENSION));
	let rate = frame_rate.to_string();
	let scale = format!("scale={}:{}", frame_size, frame_size);

	debug!(%input, %rate, "extracting frames");

	let output = Command::new("ffmpeg")
		.args(["-nostdin", "-hide_banner", "-loglevel", "error", "-i"])
		.arg(&input)
		.args(["-r", rate.as_str(), "-vf", scale.as_str(), "-start_number", "0"])
		.arg(&pattern)
		.stdin(Stdio::null())
		.stdout(Stdio::null())
		.stderr(Stdio::piped())
		.kill_on_drop(true)
		.output()
		.await?;

	if !output.status.success() {
		return Err(Error::Producer(format!(
			"ffmpeg exited with {} on {}: {}",
			output.status,
			input,
			String::from_utf8_lossy(&output.stderr).trim()
		)));
	}

	Ok(())
}

/// Frame index of an extracted frame file name such as `Frame00042.png`.
pub fn parse_frame_index(file_name: &str) -> Option<u32> {
	let digits = file_name
		.strip_prefix(FRAME_PREFIX)?
		.strip_suffix(FRAME_EXTENSION)?
		.strip_suffix('.')?;

	if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
		return None;
	}

	digits.parse().ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_probe_output() {
		let info = parse_probe_output("codec_type=video\ncodec_type=audio\nduration=12.500000\n");

		assert!(info.has_video);
		assert_eq!(info.duration, Some(Duration::from_millis(12_500)));
	}

	#[test]
	fn test_parse_probe_without_video() {
		let info = parse_probe_output("codec_type=audio\r\nduration=N/A\r\n");

		assert!(!info.has_video);
		assert_eq!(info.duration, None);
		assert_eq!(parse_probe_output("").duration, None);
	}

	#[test]
	fn test_parse_frame_index() {
		assert_eq!(parse_frame_index("Frame00000.png"), Some(0));
		assert_eq!(parse_frame_index("Frame00042.png"), Some(42));
		assert_eq!(parse_frame_index("Frame123456.png"), Some(123_456));

		for name in ["Frame.png", "Frame00001.jpg", "frame00001.png", "Frame-0001.png", "Frame00001png"] {
			assert_eq!(parse_frame_index(name), None, "{}", name);
		}
	}
}
