//! PDQ image hashing: luma, Jarosz filter, 64x64 decimation, partial DCT and
//! median thresholding.

use std::{
	f64::consts::PI,
	io::{self, BufRead, Seek},
	path::Path,
	time::{Duration, Instant},
};

use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage};
use tracing::debug;

use crate::{hash::Hash256, median::torben_median, stats, Error, Result};

use self::raster::Raster;

/// Jarosz box filter passes.
pub mod filter;
/// Decoded pixel sources.
pub mod raster;

//  From Wikipedia: standard RGB to luminance (the 'Y' in 'YUV').
const LUMA_FROM_R_COEFF: f32 = 0.299;
const LUMA_FROM_G_COEFF: f32 = 0.587;
const LUMA_FROM_B_COEFF: f32 = 0.114;

/// Larger inputs are resized so neither side exceeds this.
pub const MAX_DIMENSION: u32 = 1024;

const BUFFER_W_H: usize = 64;
const DCT_OUTPUT_W_H: usize = 16;
const DCT_OUTPUT_MATRIX_SIZE: usize = DCT_OUTPUT_W_H * DCT_OUTPUT_W_H;

/// Observability data attached to every hash. Not part of the hash itself.
#[derive(Debug, Clone, PartialEq)]
pub struct HashingStatistics {
	/// Time spent decoding and preparing the raster.
	pub read_duration: Duration,
	/// Time spent in the hashing pipeline.
	pub hash_duration: Duration,
	/// Pixels in the working raster (rows * cols after bounding).
	pub pixels: usize,
	/// Caller-supplied identifier of the input.
	pub source: String,
}

/// Hash, quality and statistics for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct HashResult {
	/// The perceptual hash.
	pub hash: Hash256,
	/// Gradient based confidence, 0 to 100.
	pub quality: u32,
	/// Timing and source metadata.
	pub statistics: HashingStatistics,
}

/// PDQ hasher. Holds only the precomputed DCT basis, so one instance can be
/// shared between threads.
#[derive(Debug, Clone)]
pub struct PdqHasher {
	dct_matrix: [[f32; BUFFER_W_H]; DCT_OUTPUT_W_H],
}

impl Default for PdqHasher {
	fn default() -> Self {
		Self::new()
	}
}

impl PdqHasher {
	/// Create a hasher, computing the 16x64 DCT basis.
	pub fn new() -> Self {
		let scale = (2.0 / BUFFER_W_H as f64).sqrt();
		let mut dct_matrix = [[0.0f32; BUFFER_W_H]; DCT_OUTPUT_W_H];

		for (i, row) in dct_matrix.iter_mut().enumerate() {
			for (k, value) in row.iter_mut().enumerate() {
				*value = (scale
					* (PI / 2.0 / BUFFER_W_H as f64 * (i + 1) as f64 * (2 * k + 1) as f64).cos())
					as f32;
			}
		}

		Self { dct_matrix }
	}

	/// The `D[i][k] = sqrt(2/64) * cos(pi/128 * (i+1) * (2k+1))` basis.
	pub fn dct_matrix(&self) -> &[[f32; BUFFER_W_H]; DCT_OUTPUT_W_H] {
		&self.dct_matrix
	}

	/// Decode and hash an image file.
	pub fn from_path<P: AsRef<Path>>(&self, path: P) -> Result<HashResult> {
		let path = path.as_ref();

		if !path.exists() {
			return Err(Error::Io(io::Error::new(
				io::ErrorKind::NotFound,
				format!("{} does not exist", path.display()),
			)));
		}

		let started = Instant::now();
		let image = image::open(path)?;

		self.hash_image(&image, &path.to_string_lossy(), started)
	}

	/// Decode and hash an encoded image held in memory.
	///
	/// Non-seekable streams can be read to completion and passed here.
	pub fn from_bytes(&self, bytes: &[u8], source: &str) -> Result<HashResult> {
		let started = Instant::now();
		let image = image::load_from_memory(bytes)?;

		self.hash_image(&image, source, started)
	}

	/// Decode and hash an image from a seekable reader, sniffing the format.
	pub fn from_reader<R: BufRead + Seek>(&self, reader: R, source: &str) -> Result<HashResult> {
		let started = Instant::now();
		let image = image::io::Reader::new(reader)
			.with_guessed_format()?
			.decode()?;

		self.hash_image(&image, source, started)
	}

	/// Hash an already decoded image.
	pub fn from_image(&self, image: &DynamicImage, source: &str) -> Result<HashResult> {
		self.hash_image(image, source, Instant::now())
	}

	/// Hash any [Raster]. Fails if the raster is not sRGB or is empty.
	pub fn from_raster<R: Raster + ?Sized>(&self, raster: &R, source: &str) -> Result<HashResult> {
		let started = Instant::now();
		check_raster(raster)?;

		let (width, height) = (raster.width(), raster.height());

		if width <= MAX_DIMENSION && height <= MAX_DIMENSION {
			return self.hash_bounded(raster, source, started);
		}

		let full = RgbImage::from_fn(width, height, |x, y| Rgb(raster.rgb(x, y)));
		let resized = image::imageops::resize(
			&full,
			width.min(MAX_DIMENSION),
			height.min(MAX_DIMENSION),
			FilterType::Triangle,
		);

		self.hash_bounded(&resized, source, started)
	}

	fn hash_image(&self, image: &DynamicImage, source: &str, started: Instant) -> Result<HashResult> {
		check_raster(image)?;

		let (width, height) = image.dimensions();

		if width <= MAX_DIMENSION && height <= MAX_DIMENSION {
			return self.hash_bounded(image, source, started);
		}

		let resized = image.resize_exact(
			width.min(MAX_DIMENSION),
			height.min(MAX_DIMENSION),
			FilterType::Triangle,
		);

		self.hash_bounded(&resized, source, started)
	}

	fn hash_bounded<R: Raster + ?Sized>(
		&self,
		raster: &R,
		source: &str,
		started: Instant,
	) -> Result<HashResult> {
		let num_cols = raster.width() as usize;
		let num_rows = raster.height() as usize;
		let mut luma = fill_float_luma(raster);
		let read_duration = started.elapsed();

		let hash_started = Instant::now();
		let (hash, quality) = self.from_luma(&mut luma, num_rows, num_cols)?;
		let hash_duration = hash_started.elapsed();

		stats::record(read_duration, hash_duration);
		debug!(
			"Hashed {} ({}x{}) quality {} in {:?} (read {:?})",
			source, num_cols, num_rows, quality, hash_duration, read_duration
		);

		Ok(HashResult {
			hash,
			quality,
			statistics: HashingStatistics {
				read_duration,
				hash_duration,
				pixels: num_rows * num_cols,
				source: source.to_string(),
			},
		})
	}

	/// Hash a row-major `num_rows x num_cols` luma buffer, filtering it in place.
	///
	/// Returns the hash and its quality.
	pub fn from_luma(
		&self,
		luma: &mut [f32],
		num_rows: usize,
		num_cols: usize,
	) -> Result<(Hash256, u32)> {
		if num_rows == 0 || num_cols == 0 || luma.len() != num_rows * num_cols {
			return Err(Error::Raster(format!(
				"luma buffer of {} values does not match {}x{}",
				luma.len(),
				num_cols,
				num_rows
			)));
		}

		let mut scratch = vec![0.0f32; luma.len()];
		filter::jarosz_filter(
			luma,
			&mut scratch,
			num_rows,
			num_cols,
			filter::window_size(num_cols),
			filter::window_size(num_rows),
			filter::NUM_JAROSZ_XY_PASSES,
		);

		let buffer64x64 = decimate_float(luma, num_rows, num_cols);
		let quality = quality_metric(&buffer64x64);
		let buffer16x16 = self.dct64_to_16(&buffer64x64);

		Ok((buffer16x16_to_bits(&buffer16x16), quality))
	}

	/// Only the 16x16 lowest non-DC frequencies of the 64x64 DCT-II are needed,
	/// so the transform is two contractions with the 16x64 basis.
	fn dct64_to_16(
		&self,
		input: &[[f32; BUFFER_W_H]; BUFFER_W_H],
	) -> [f32; DCT_OUTPUT_MATRIX_SIZE] {
		let mut intermediate = [[0.0f32; BUFFER_W_H]; DCT_OUTPUT_W_H];

		for i in 0..DCT_OUTPUT_W_H {
			for j in 0..BUFFER_W_H {
				let mut sumk = 0.0f32;
				for k in 0..BUFFER_W_H {
					sumk += self.dct_matrix[i][k] * input[k][j];
				}
				intermediate[i][j] = sumk;
			}
		}

		let mut output = [0.0f32; DCT_OUTPUT_MATRIX_SIZE];
		for i in 0..DCT_OUTPUT_W_H {
			for j in 0..DCT_OUTPUT_W_H {
				let mut sumk = 0.0f32;
				for k in 0..BUFFER_W_H {
					sumk += intermediate[i][k] * self.dct_matrix[j][k];
				}
				output[i * DCT_OUTPUT_W_H + j] = sumk;
			}
		}

		output
	}
}

fn check_raster<R: Raster + ?Sized>(raster: &R) -> Result<()> {
	let color_space = raster.color_space();

	if !color_space.is_srgb() {
		return Err(Error::ColorSpace(color_space.to_string()));
	}

	if raster.width() == 0 || raster.height() == 0 {
		return Err(Error::Raster(format!(
			"cannot hash an empty {}x{} raster",
			raster.width(),
			raster.height()
		)));
	}

	Ok(())
}

fn fill_float_luma<R: Raster + ?Sized>(raster: &R) -> Vec<f32> {
	let num_cols = raster.width();
	let num_rows = raster.height();
	let mut luma = Vec::with_capacity(num_rows as usize * num_cols as usize);

	for row in 0..num_rows {
		for col in 0..num_cols {
			let [r, g, b] = raster.rgb(col, row);
			luma.push(
				LUMA_FROM_R_COEFF * r as f32
					+ LUMA_FROM_G_COEFF * g as f32
					+ LUMA_FROM_B_COEFF * b as f32,
			);
		}
	}

	luma
}

/// Nearest sample at each output cell centre.
fn decimate_float(
	input: &[f32],
	in_num_rows: usize,
	in_num_cols: usize,
) -> [[f32; BUFFER_W_H]; BUFFER_W_H] {
	let mut output = [[0.0f32; BUFFER_W_H]; BUFFER_W_H];

	for (i, row) in output.iter_mut().enumerate() {
		let ini = ((i as f64 + 0.5) * in_num_rows as f64 / BUFFER_W_H as f64) as usize;
		for (j, value) in row.iter_mut().enumerate() {
			let inj = ((j as f64 + 0.5) * in_num_cols as f64 / BUFFER_W_H as f64) as usize;
			*value = input[ini * in_num_cols + inj];
		}
	}

	output
}

// This is all heuristic (see the PDQ hashing doc). Quantization matters since
// we want to count *significant* gradients, not just the sum of many small
// ones. Each difference is scaled and then truncated.
pub(crate) fn quality_metric(buffer64x64: &[[f32; BUFFER_W_H]; BUFFER_W_H]) -> u32 {
	let mut gradient_sum: i64 = 0;

	for i in 0..BUFFER_W_H - 1 {
		for j in 0..BUFFER_W_H {
			let d = ((buffer64x64[i][j] - buffer64x64[i + 1][j]) * 100.0 / 255.0) as i32;
			gradient_sum += d.abs() as i64;
		}
	}

	for row in buffer64x64.iter() {
		for j in 0..BUFFER_W_H - 1 {
			let d = ((row[j] - row[j + 1]) * 100.0 / 255.0) as i32;
			gradient_sum += d.abs() as i64;
		}
	}

	(gradient_sum / 90).min(100) as u32
}

/// Each bit says whether its frequency component is strictly above the median.
pub(crate) fn buffer16x16_to_bits(dct_output: &[f32; DCT_OUTPUT_MATRIX_SIZE]) -> Hash256 {
	let mut hash = Hash256::new();
	let median = torben_median(dct_output).unwrap_or_default();

	for (k, value) in dct_output.iter().enumerate() {
		if *value > median {
			hash.set_bit(k);
		}
	}

	hash
}
