use std::{
	future::Future,
	path::{Path, PathBuf},
	sync::Arc,
	time::Duration,
};

use futures::{stream, Stream};
use tempfile::TempDir;
use tokio::{runtime::Handle, sync::mpsc, task::JoinHandle, time};
use tracing::{debug, trace, warn};

use crate::{
	config::Settings,
	hash::Hash256,
	hasher::{raster::Raster, PdqHasher},
	video::{
		extract::{self, parse_frame_index},
		record::FrameHash,
	},
	Error, Result,
};

/// Frames below this quality are discarded.
pub const MIN_QUALITY: u32 = 49;
/// Frames closer than this to the last kept frame are discarded.
pub const MIN_FRAME_DISTANCE: u32 = 30;
/// Edge of the square frames handed to the hasher.
pub const FRAME_SIZE: u32 = 512;
/// How often the frame directory is polled.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Pick a sampling rate from the total duration, or from a desired number of
/// output frames when one is given.
pub fn determine_frame_rate(duration: Duration, desired_frames: Option<u64>) -> Result<f64> {
	let secs = duration.as_secs_f64();
	if secs <= 0.0 {
		return Err(Error::FrameRate("video has no duration".into()));
	}

	let rate = match desired_frames {
		Some(count) => (count as f64 / secs * 100.0).round() / 100.0,
		None if secs < 5.0 => 10.0,
		None if secs < 60.0 => 2.0,
		None if secs < 300.0 => 1.0,
		None if secs < 600.0 => 0.5,
		None => 0.25,
	};

	if rate <= 0.0 {
		return Err(Error::FrameRate(format!(
			"{:?} frames over {:.2}s rounds to a rate of zero",
			desired_frames, secs
		)));
	}

	Ok(rate)
}

/// [determine_frame_rate] for a local path or URL, using `ffprobe`.
pub async fn probe_frame_rate(input: &str, desired_frames: Option<u64>) -> Result<f64> {
	let info = extract::probe(input).await?;

	if !info.has_video {
		return Err(Error::FrameRate(format!("{} has no video stream", input)));
	}

	let duration = info
		.duration
		.ok_or_else(|| Error::FrameRate(format!("{} reports no duration", input)))?;

	determine_frame_rate(duration, desired_frames)
}

fn check_frame_rate(frame_rate: f64) -> Result<()> {
	if frame_rate.is_finite() && frame_rate > 0.0 {
		Ok(())
	} else {
		Err(Error::FrameRate(format!("invalid frame rate {}", frame_rate)))
	}
}

pub(crate) fn check_poll_interval(poll_interval: Duration) -> Result<()> {
	if poll_interval.is_zero() {
		return Err(config::ConfigError::Message("poll interval must be greater than zero".into()).into());
	}

	Ok(())
}

/// Quality and near-duplicate gate over frames in index order.
#[derive(Debug, Clone)]
pub struct FrameFilter {
	min_quality: u32,
	min_distance: u32,
	frame_rate: f64,
	last_hash: Option<Hash256>,
	last_frame: Option<u32>,
}

impl FrameFilter {
	/// Create a filter that has kept nothing yet.
	pub fn new(min_quality: u32, min_distance: u32, frame_rate: f64) -> Self {
		Self {
			min_quality,
			min_distance,
			frame_rate,
			last_hash: None,
			last_frame: None,
		}
	}

	/// Decide on the next frame, returning its record when it is kept.
	///
	/// Frames at or before the last seen index are skipped.
	pub fn admit(&mut self, frame: u32, hash: Hash256, quality: u32) -> Option<FrameHash> {
		if self.last_frame.map_or(false, |last| frame <= last) {
			warn!(frame, last = ?self.last_frame, "skipping out of order frame");
			return None;
		}
		self.last_frame = Some(frame);

		if quality < self.min_quality {
			trace!(frame, quality, "discarding low quality frame");
			return None;
		}

		let distance = match self.last_hash {
			Some(last) => {
				let distance = hash.hamming_distance(&last);
				if distance < self.min_distance {
					trace!(frame, distance, "discarding near duplicate frame");
					return None;
				}
				distance
			}
			None => 0,
		};

		self.last_hash = Some(hash);
		let timestamp = Duration::try_from_secs_f64(f64::from(frame) / self.frame_rate).ok();

		Some(FrameHash::new(frame, hash, Some(distance), timestamp))
	}
}

/// Hashes video frames into a pruned, ordered sequence of [FrameHash].
#[derive(Debug, Clone)]
pub struct VideoHasher {
	hasher: Arc<PdqHasher>,
	min_quality: u32,
	min_distance: u32,
	frame_size: u32,
	poll_interval: Duration,
}

impl Default for VideoHasher {
	fn default() -> Self {
		Self::new()
	}
}

impl VideoHasher {
	/// Create a video hasher with the default thresholds.
	pub fn new() -> Self {
		Self {
			hasher: Arc::new(PdqHasher::new()),
			min_quality: MIN_QUALITY,
			min_distance: MIN_FRAME_DISTANCE,
			frame_size: FRAME_SIZE,
			poll_interval: POLL_INTERVAL,
		}
	}

	/// Apply the video fields of `settings`.
	pub fn with_settings(self, settings: &Settings) -> Self {
		Self {
			min_quality: settings.min_quality,
			min_distance: settings.min_frame_distance,
			frame_size: settings.frame_size,
			poll_interval: settings.poll_interval(),
			..self
		}
	}

	/// Replace the quality gate.
	pub fn with_min_quality(self, min_quality: u32) -> Self {
		Self { min_quality, ..self }
	}

	/// Replace the near-duplicate gate.
	pub fn with_min_distance(self, min_distance: u32) -> Self {
		Self { min_distance, ..self }
	}

	/// Replace the frame directory poll interval.
	pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
		Self { poll_interval, ..self }
	}

	fn filter(&self, frame_rate: f64) -> FrameFilter {
		FrameFilter::new(self.min_quality, self.min_distance, frame_rate)
	}

	/// Hash already decoded frames, given as `(index, raster)` in index order.
	pub fn hash_frames<I, R>(&self, frames: I, frame_rate: f64) -> Result<Vec<FrameHash>>
	where
		I: IntoIterator<Item = (u32, R)>,
		R: Raster,
	{
		check_frame_rate(frame_rate)?;
		let mut filter = self.filter(frame_rate);
		let mut kept = Vec::new();

		for (index, raster) in frames {
			let result = self.hasher.from_raster(&raster, &format!("frame {}", index))?;
			kept.extend(filter.admit(index, result.hash, result.quality));
		}

		Ok(kept)
	}

	/// Extract frames from a local path or URL with `ffmpeg` and hash them
	/// as they appear.
	pub fn from_input(
		&self,
		input: &str,
		frame_rate: f64,
	) -> Result<impl Stream<Item = Result<FrameHash>> + Send + 'static> {
		let input = input.to_owned();
		let frame_size = self.frame_size;

		self.hash_with_producer(frame_rate, move |dir: PathBuf| async move {
			extract::extract_frames(input, frame_rate, frame_size, &dir).await
		})
	}

	/// Hash frames written by `producer` into a fresh temporary directory.
	///
	/// The producer writes `Frame<index>.png` files and resolves when it is
	/// done. A file is only hashed once a later frame exists or the producer
	/// has finished, and is deleted once hashed. A producer error ends the
	/// stream with that error. Dropping the stream stops the producer and
	/// removes the directory.
	///
	/// Must be called from within a tokio runtime. A zero poll interval is
	/// rejected with [Error::Config].
	pub fn hash_with_producer<P, F>(
		&self,
		frame_rate: f64,
		producer: P,
	) -> Result<impl Stream<Item = Result<FrameHash>> + Send + 'static>
	where
		P: FnOnce(PathBuf) -> F,
		F: Future<Output = Result<()>> + Send + 'static,
	{
		check_frame_rate(frame_rate)?;
		check_poll_interval(self.poll_interval)?;

		let runtime = Handle::try_current()
			.map_err(|e| Error::Producer(format!("no async runtime available: {}", e)))?;
		let dir = tempfile::Builder::new().prefix("pdq-frames-").tempdir()?;
		debug!(dir = %dir.path().display(), frame_rate, "hashing video frames");

		let (events, receiver) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
		let production = producer(dir.path().to_path_buf());
		let watcher = runtime.spawn(watch_frames(
			dir.path().to_path_buf(),
			production,
			self.poll_interval,
			events,
		));

		let consumer = Consumer {
			hasher: self.hasher.clone(),
			filter: self.filter(frame_rate),
			events: receiver,
			poll_interval: self.poll_interval,
			dir: Some(dir),
			_watcher: AbortOnDrop(watcher),
		};

		Ok(stream::try_unfold(consumer, |mut consumer| async move {
			match consumer.next_record().await {
				Ok(Some(record)) => Ok(Some((record, consumer))),
				Ok(None) => Ok(None),
				Err(e) => Err(e),
			}
		}))
	}
}

#[derive(Debug)]
enum FrameEvent {
	Frame { index: u32, path: PathBuf },
	Done,
	Error(Error),
}

/// Aborts the task when dropped.
#[derive(Debug)]
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
	fn drop(&mut self) {
		self.0.abort();
	}
}

struct Consumer {
	hasher: Arc<PdqHasher>,
	filter: FrameFilter,
	events: mpsc::Receiver<FrameEvent>,
	poll_interval: Duration,
	dir: Option<TempDir>,
	_watcher: AbortOnDrop,
}

impl Consumer {
	async fn next_record(&mut self) -> Result<Option<FrameHash>> {
		loop {
			match self.next_event().await? {
				FrameEvent::Frame { index, path } => {
					let hashed = hash_frame(self.hasher.clone(), path.clone()).await;
					remove_frame(&path).await;

					let (hash, quality) = hashed?;
					if let Some(record) = self.filter.admit(index, hash, quality) {
						return Ok(Some(record));
					}
				}
				FrameEvent::Done => {
					if let Some(dir) = self.dir.take() {
						let path = dir.path().to_path_buf();
						if let Err(e) = dir.close() {
							warn!(dir = %path.display(), "failed to remove frame directory: {}", e);
						}
					}
					return Ok(None);
				}
				FrameEvent::Error(e) => return Err(e),
			}
		}
	}

	async fn next_event(&mut self) -> Result<FrameEvent> {
		loop {
			match time::timeout(self.poll_interval, self.events.recv()).await {
				Ok(Some(event)) => return Ok(event),
				Ok(None) => return Err(Error::Producer("frame watcher stopped unexpectedly".into())),
				Err(_) => trace!("waiting for frames"),
			}
		}
	}
}

async fn hash_frame(hasher: Arc<PdqHasher>, path: PathBuf) -> Result<(Hash256, u32)> {
	let result = tokio::task::spawn_blocking(move || hasher.from_path(&path)).await??;
	Ok((result.hash, result.quality))
}

async fn remove_frame(path: &Path) {
	if let Err(e) = tokio::fs::remove_file(path).await {
		warn!(path = %path.display(), "failed to remove frame: {}", e);
	}
}

/// Polls `dir` until `production` resolves, announcing frames in index order.
async fn watch_frames<F>(
	dir: PathBuf,
	production: F,
	poll_interval: Duration,
	events: mpsc::Sender<FrameEvent>,
) where
	F: Future<Output = Result<()>>,
{
	tokio::pin!(production);
	let mut ticker = time::interval(poll_interval);
	let mut last_sent = None;

	loop {
		tokio::select! {
			result = &mut production => {
				let last = match result {
					Ok(()) => match announce(&dir, &events, &mut last_sent, true).await {
						Ok(true) => FrameEvent::Done,
						Ok(false) => return,
						Err(e) => FrameEvent::Error(e),
					},
					Err(e) => FrameEvent::Error(e),
				};
				let _ = events.send(last).await;
				return;
			}
			_ = ticker.tick() => {
				match announce(&dir, &events, &mut last_sent, false).await {
					Ok(true) => {}
					Ok(false) => return,
					Err(e) => {
						let _ = events.send(FrameEvent::Error(e)).await;
						return;
					}
				}
			}
		}
	}
}

/// Send every frame newer than `last_sent`. Unless `finished`, the newest
/// file is held back since the producer may still be writing it. Returns
/// `false` once the consumer has gone away.
async fn announce(
	dir: &Path,
	events: &mpsc::Sender<FrameEvent>,
	last_sent: &mut Option<u32>,
	finished: bool,
) -> Result<bool> {
	let mut frames = list_frames(dir).await?;
	frames.retain(|(index, _)| last_sent.map_or(true, |last| *index > last));
	frames.sort_by_key(|(index, _)| *index);

	if !finished {
		frames.pop();
	}

	for (index, path) in frames {
		trace!(index, "frame available");
		if events.send(FrameEvent::Frame { index, path }).await.is_err() {
			return Ok(false);
		}
		*last_sent = Some(index);
	}

	Ok(true)
}

async fn list_frames(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
	let mut frames = Vec::new();
	let mut entries = tokio::fs::read_dir(dir).await?;

	while let Some(entry) = entries.next_entry().await? {
		if let Some(index) = entry.file_name().to_str().and_then(parse_frame_index) {
			frames.push((index, entry.path()));
		}
	}

	Ok(frames)
}

#[cfg(test)]
mod tests {
	use futures::TryStreamExt;
	use image::{DynamicImage, Rgb, RgbImage};

	use super::*;

	fn pattern(phase: u32, invert: bool) -> RgbImage {
		RgbImage::from_fn(64, 64, |x, y| {
			let wave = ((x + phase) as f64 / 6.0).sin() * (y as f64 / 9.0).cos();
			let v = (128.0 + 90.0 * wave) as u8;
			let v = if invert { 255 - v } else { v };
			Rgb([v, v, v])
		})
	}

	fn write_frame(dir: &Path, index: u32, image: &RgbImage) {
		let path = dir.join(format!("Frame{:05}.png", index));
		DynamicImage::ImageRgb8(image.clone()).save(path).unwrap();
	}

	#[test]
	fn test_frame_rate_by_duration() {
		let rate = |secs| determine_frame_rate(Duration::from_secs_f64(secs), None).unwrap();

		assert_eq!(rate(4.9), 10.0);
		assert_eq!(rate(5.0), 2.0);
		assert_eq!(rate(59.0), 2.0);
		assert_eq!(rate(60.0), 1.0);
		assert_eq!(rate(299.0), 1.0);
		assert_eq!(rate(300.0), 0.5);
		assert_eq!(rate(600.0), 0.25);
		assert_eq!(rate(7200.0), 0.25);
	}

	#[test]
	fn test_frame_rate_by_count() {
		let rate = |secs, count| determine_frame_rate(Duration::from_secs(secs), Some(count));

		assert_eq!(rate(30, 60).unwrap(), 2.0);
		assert_eq!(rate(3, 1).unwrap(), 0.33);
		assert_eq!(rate(8, 1).unwrap(), 0.13);
		assert!(matches!(rate(1000, 1), Err(Error::FrameRate(_))));
		assert!(matches!(rate(0, 10), Err(Error::FrameRate(_))));
	}

	#[test]
	fn test_filter_drops_near_duplicates() {
		let first = Hash256::new();
		let mut second = first;
		for bit in 0..20 {
			second.flip_bit(bit * 7);
		}
		assert_eq!(first.hamming_distance(&second), 20);

		let mut filter = FrameFilter::new(MIN_QUALITY, MIN_FRAME_DISTANCE, 1.0);
		let kept = filter.admit(0, first, 100).unwrap();
		assert_eq!(kept.distance(), Some(0));
		assert_eq!(kept.timestamp(), Some(Duration::ZERO));

		assert!(filter.admit(1, second, 100).is_none());
	}

	#[test]
	fn test_filter_drops_low_quality() {
		let first = Hash256::new();
		let mut far = Hash256::new();
		far.set_all();

		let mut filter = FrameFilter::new(MIN_QUALITY, MIN_FRAME_DISTANCE, 2.0);
		assert!(filter.admit(0, first, 90).is_some());
		assert!(filter.admit(1, far, 40).is_none());

		// the low quality frame did not become the reference
		let kept = filter.admit(3, far, 49).unwrap();
		assert_eq!(kept.distance(), Some(256));
		assert_eq!(kept.timestamp(), Some(Duration::from_millis(1_500)));
	}

	#[test]
	fn test_filter_skips_out_of_order() {
		let mut filter = FrameFilter::new(0, 0, 1.0);

		assert!(filter.admit(5, Hash256::new(), 100).is_some());
		assert!(filter.admit(5, Hash256::new(), 100).is_none());
		assert!(filter.admit(2, Hash256::new(), 100).is_none());
		assert!(filter.admit(6, Hash256::new(), 100).is_some());
	}

	#[test]
	fn test_hash_frames() {
		let frames = vec![
			(0, pattern(0, false)),
			(1, pattern(0, false)),
			(2, pattern(0, true)),
		];
		let records = VideoHasher::new().with_min_quality(0).hash_frames(frames, 2.0).unwrap();

		// the repeat is dropped, the inverted frame is far away
		assert_eq!(records.len(), 2);
		assert_eq!(records[0].frame(), 0);
		assert_eq!(records[1].frame(), 2);
		assert!(records[1].distance().unwrap() >= MIN_FRAME_DISTANCE);
		assert_eq!(records[1].timestamp(), Some(Duration::from_secs(1)));
	}

	#[test]
	fn test_invalid_frame_rate() {
		let hasher = VideoHasher::new();
		let frames: Vec<(u32, RgbImage)> = Vec::new();

		assert!(matches!(hasher.hash_frames(frames.clone(), 0.0), Err(Error::FrameRate(_))));
		assert!(matches!(hasher.hash_frames(frames, f64::NAN), Err(Error::FrameRate(_))));
	}

	#[tokio::test]
	async fn test_producer_frames_are_hashed_in_order() {
		let hasher = VideoHasher::new()
			.with_min_quality(0)
			.with_min_distance(0)
			.with_poll_interval(Duration::from_millis(10));
		let (dir_tx, dir_rx) = tokio::sync::oneshot::channel();

		let stream = hasher
			.hash_with_producer(2.0, move |dir: PathBuf| async move {
				// written out of order, with a pause so the watcher sees partial batches
				for index in [2, 0, 1] {
					write_frame(&dir, index, &pattern(index * 5, index % 2 == 1));
				}
				time::sleep(Duration::from_millis(50)).await;
				write_frame(&dir, 3, &pattern(3, true));
				let _ = dir_tx.send(dir);
				Ok(())
			})
			.unwrap();

		let records: Vec<FrameHash> = stream.try_collect().await.unwrap();
		let frames: Vec<u32> = records.iter().map(|r| r.frame()).collect();
		assert_eq!(frames, vec![0, 1, 2, 3]);
		assert_eq!(records[3].timestamp(), Some(Duration::from_millis(1_500)));
		assert_eq!(records[0].distance(), Some(0));

		let dir = dir_rx.await.unwrap();
		assert!(!dir.exists());
	}

	#[tokio::test]
	async fn test_producer_error_ends_stream() {
		let hasher = VideoHasher::new().with_poll_interval(Duration::from_millis(10));
		let stream = hasher
			.hash_with_producer(1.0, |_dir: PathBuf| async {
				Err(Error::Producer("decoder crashed".into()))
			})
			.unwrap();

		let result: Result<Vec<FrameHash>> = stream.try_collect().await;
		assert!(matches!(result, Err(Error::Producer(message)) if message == "decoder crashed"));
	}

	#[tokio::test]
	async fn test_dropping_stream_removes_directory() {
		let hasher = VideoHasher::new().with_poll_interval(Duration::from_millis(10));
		let (dir_tx, dir_rx) = tokio::sync::oneshot::channel();

		let stream = hasher
			.hash_with_producer(1.0, move |dir: PathBuf| async move {
				write_frame(&dir, 0, &pattern(0, false));
				let _ = dir_tx.send(dir);
				futures::future::pending::<()>().await;
				Ok(())
			})
			.unwrap();

		let dir = dir_rx.await.unwrap();
		assert!(dir.exists());
		drop(stream);
		assert!(!dir.exists());
	}

	#[test]
	fn test_requires_runtime() {
		let result = VideoHasher::new().hash_with_producer(1.0, |_dir: PathBuf| async { Ok(()) });
		assert!(matches!(result, Err(Error::Producer(_))));
	}

	#[test]
	fn test_fractional_timestamps_survive_text_form() {
		let mut filter = FrameFilter::new(0, 0, 0.33);
		let record = filter.admit(1, Hash256::new(), 100).unwrap();

		assert_eq!(record.to_string().parse::<FrameHash>().unwrap(), record);

		let mut text = Vec::new();
		crate::video::write_records(&mut text, &[record]).unwrap();
		let text = String::from_utf8(text).unwrap();
		assert_eq!(crate::video::parser::parse_str(&text).unwrap(), vec![record]);
	}

	#[tokio::test]
	async fn test_zero_poll_interval_rejected() {
		let hasher = VideoHasher::new().with_poll_interval(Duration::ZERO);
		let result = hasher.hash_with_producer(1.0, |_dir: PathBuf| async { Ok(()) });
		assert!(matches!(result, Err(Error::Config(_))));

		let settings = Settings {
			poll_interval_ms: 0,
			..Settings::default()
		};
		let hasher = VideoHasher::new().with_settings(&settings);
		let result = hasher.hash_with_producer(1.0, |_dir: PathBuf| async { Ok(()) });
		assert!(matches!(result, Err(Error::Config(_))));
	}

	#[tokio::test]
	async fn test_undecodable_frame_ends_stream() {
		let hasher = VideoHasher::new().with_poll_interval(Duration::from_millis(10));
		let (dir_tx, dir_rx) = tokio::sync::oneshot::channel();

		let stream = hasher
			.hash_with_producer(1.0, move |dir: PathBuf| async move {
				std::fs::write(dir.join("Frame00000.png"), b"not a png").unwrap();
				let _ = dir_tx.send(dir);
				Ok(())
			})
			.unwrap();

		let result: Result<Vec<FrameHash>> = stream.try_collect().await;
		assert!(matches!(result, Err(Error::Image(_))));

		let dir = dir_rx.await.unwrap();
		assert!(!dir.join("Frame00000.png").exists());
		assert!(!dir.exists());
	}
}
