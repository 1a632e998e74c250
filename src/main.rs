//! `pdq` command line tool.

use std::{
	fs,
	io::{self, BufWriter, Write},
	path::{Path, PathBuf},
	process::ExitCode,
};

use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use pdq::{
	detect_type, stats,
	video::{parser::read_records, probe_frame_rate, write_records},
	calculate_match_async, FrameHash, Hash256, PdqHasher, Result, Settings, Type, VideoHasher,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[clap(name = "pdq", version, about = "PDQ perceptual hashes for images and videos")]
struct Cli {
	/// Settings file, `pdq.toml` is used when present
	#[clap(long, global = true, value_parser)]
	config: Option<PathBuf>,

	#[clap(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Hash images and videos. Images print `hash,quality,path`, videos print frame records
	Hash {
		/// Files to hash. Videos may also be http(s) URLs
		#[clap(required = true, value_parser)]
		inputs: Vec<String>,

		/// Video sampling rate, picked from the duration when absent
		#[clap(long, value_parser)]
		frame_rate: Option<f64>,

		/// Desired number of sampled frames per video, ignored with `--frame-rate`
		#[clap(long, value_parser)]
		frames: Option<u64>,

		/// Write each video's records to `<DIR>/<name>.pdq` instead of stdout
		#[clap(long, value_parser)]
		out_dir: Option<PathBuf>,
	},

	/// Compare two frame record files
	Compare {
		/// Left record file
		#[clap(value_parser)]
		left: PathBuf,

		/// Right record file
		#[clap(value_parser)]
		right: PathBuf,

		/// Frames closer than this match, overrides the settings
		#[clap(long, value_parser)]
		distance: Option<u32>,

		/// Match percentage threshold, overrides the settings
		#[clap(long, value_parser)]
		threshold: Option<f64>,
	},

	/// Hamming distance between two hex hashes
	Distance {
		/// First hash
		#[clap(value_parser)]
		first: String,

		/// Second hash
		#[clap(value_parser)]
		second: String,
	},

	/// Flip random bits of a hash
	Fuzz {
		/// Hash to start from
		#[clap(value_parser)]
		hash: String,

		/// Number of random flips
		#[clap(long, value_parser)]
		bits: usize,

		/// Seed for a reproducible result
		#[clap(long, value_parser)]
		seed: Option<u64>,
	},
}

#[tokio::main]
async fn main() -> ExitCode {
	tracing_subscriber::registry()
		.with(fmt::layer().with_writer(io::stderr))
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();

	match run(Cli::parse()).await {
		Ok(code) => code,
		Err(e) => {
			error!("{}", e);
			ExitCode::FAILURE
		}
	}
}

async fn run(cli: Cli) -> Result<ExitCode> {
	let settings = Settings::load(cli.config.as_deref())?;

	match cli.command {
		Command::Hash {
			inputs,
			frame_rate,
			frames,
			out_dir,
		} => hash(&settings, inputs, frame_rate, frames, out_dir.as_deref()).await,
		Command::Compare {
			left,
			right,
			distance,
			threshold,
		} => {
			let distance = distance.unwrap_or(settings.match_distance);
			let threshold = threshold.unwrap_or(settings.match_threshold);
			compare(&left, &right, distance, threshold).await?;
			Ok(ExitCode::SUCCESS)
		}
		Command::Distance { first, second } => {
			let first: Hash256 = first.parse()?;
			let second: Hash256 = second.parse()?;
			println!("{}", first.hamming_distance(&second));
			Ok(ExitCode::SUCCESS)
		}
		Command::Fuzz { hash, bits, seed } => {
			let hash: Hash256 = hash.parse()?;
			let mut rng = match seed {
				Some(seed) => ChaCha8Rng::seed_from_u64(seed),
				None => ChaCha8Rng::from_entropy(),
			};
			println!("{}", hash.fuzz(&mut rng, bits));
			Ok(ExitCode::SUCCESS)
		}
	}
}

fn is_url(input: &str) -> bool {
	input.starts_with("http://") || input.starts_with("https://")
}

async fn hash(
	settings: &Settings,
	inputs: Vec<String>,
	frame_rate: Option<f64>,
	frames: Option<u64>,
	out_dir: Option<&Path>,
) -> Result<ExitCode> {
	let mut images = Vec::new();
	let mut videos = Vec::new();
	let mut failures = 0usize;

	for input in inputs {
		if is_url(&input) {
			videos.push(input);
			continue;
		}

		match detect_type(&input) {
			Ok(Some(Type::Image)) => images.push(input),
			Ok(Some(Type::Video)) => videos.push(input),
			Ok(None) => warn!(%input, "skipping input that is neither an image nor a video"),
			Err(e) => {
				error!(%input, "{}", e);
				failures += 1;
			}
		}
	}

	failures += tokio::task::spawn_blocking(move || hash_images(&images)).await??;

	let video_hasher = VideoHasher::new().with_settings(settings);
	for input in &videos {
		if let Err(e) = hash_video(&video_hasher, input, frame_rate, frames, out_dir).await {
			error!(%input, "{}", e);
			failures += 1;
		}
	}

	let snapshot = stats::snapshot();
	info!(
		hashes = snapshot.hashes_generated,
		read = ?snapshot.read_duration,
		hash = ?snapshot.hash_duration,
		failures,
		"finished"
	);

	Ok(if failures == 0 {
		ExitCode::SUCCESS
	} else {
		ExitCode::FAILURE
	})
}

/// Hash images in parallel, printing in input order. Returns the failure count.
fn hash_images(images: &[String]) -> Result<usize> {
	let hasher = PdqHasher::new();
	let results: Vec<_> = images.par_iter().map(|path| hasher.from_path(path)).collect();

	let stdout = io::stdout();
	let mut out = BufWriter::new(stdout.lock());
	let mut failures = 0;

	for (path, result) in images.iter().zip(results) {
		match result {
			Ok(result) => writeln!(out, "{},{},{}", result.hash, result.quality, path)?,
			Err(e) => {
				error!(%path, "{}", e);
				failures += 1;
			}
		}
	}

	out.flush()?;
	Ok(failures)
}

async fn hash_video(
	hasher: &VideoHasher,
	input: &str,
	frame_rate: Option<f64>,
	frames: Option<u64>,
	out_dir: Option<&Path>,
) -> Result<()> {
	let frame_rate = match frame_rate {
		Some(frame_rate) => frame_rate,
		None => probe_frame_rate(input, frames).await?,
	};
	info!(%input, frame_rate, "hashing video");

	let stream = hasher.from_input(input, frame_rate)?;
	futures::pin_mut!(stream);

	match out_dir {
		Some(dir) => {
			let records: Vec<FrameHash> = stream.try_collect().await?;
			let name = Path::new(input)
				.file_name()
				.map(|name| name.to_string_lossy().into_owned())
				.unwrap_or_else(|| "video".into());
			let path = dir.join(format!("{}.pdq", name));

			write_records(BufWriter::new(fs::File::create(&path)?), &records)?;
			info!(path = %path.display(), records = records.len(), "wrote frame records");
		}
		None => {
			while let Some(record) = stream.try_next().await? {
				println!("{}", record);
			}
		}
	}

	Ok(())
}

async fn compare(left: &Path, right: &Path, distance: u32, threshold: f64) -> Result<()> {
	let open = |path: &Path| {
		let path = path.to_path_buf();
		async move {
			let file = tokio::fs::File::open(&path).await?;
			Ok::<_, pdq::Error>(pdq::video::CachedStream::new(read_records(
				tokio::io::BufReader::new(file),
			)))
		}
	};

	let mut left = open(left).await?;
	let mut right = open(right).await?;
	let result = calculate_match_async(&mut left, &mut right, distance, threshold).await?;

	println!(
		"match={} left={}% right={}%",
		result.is_match, result.left_match_percent, result.right_match_percent
	);

	Ok(())
}
