//! Jarosz box filtering: repeated 1-D sliding-window means along rows then
//! columns, approximating a 2-D tent filter (Wojciech Jarosz, "Fast Image
//! Convolutions", SIGGRAPH 2001).

/// Number of X,Y pass pairs.
pub const NUM_JAROSZ_XY_PASSES: usize = 2;

/// Dimension divisor for the per-pass window size. The image is decimated to
/// 64x64 and two passes are applied, so each pass covers half a block.
const JAROSZ_WINDOW_SIZE_DIVISOR: usize = 128;

/// Window size for one axis: `ceil(dimension / 128)`.
pub fn window_size(dimension: usize) -> usize {
	(dimension + JAROSZ_WINDOW_SIZE_DIVISOR - 1) / JAROSZ_WINDOW_SIZE_DIVISOR
}

/// Sliding-window mean over one strided vector.
///
/// Reads `length` samples of `input` starting at `offset` with the given
/// `stride` and writes the same positions of `output`. Every output is the
/// mean of the samples actually inside its window, which is truncated at both
/// ends instead of zero padded.
pub fn box_1d(
	input: &[f32],
	output: &mut [f32],
	offset: usize,
	length: usize,
	stride: usize,
	full_window_size: usize,
) {
	let half_window_size = (full_window_size + 2) / 2;
	let phase_1_nreps = half_window_size - 1;
	let phase_2_nreps = full_window_size - half_window_size + 1;
	let phase_3_nreps = length - full_window_size;
	let phase_4_nreps = half_window_size - 1;

	// left edge (subtracts), right edge (adds), output
	let mut li = offset;
	let mut ri = offset;
	let mut oi = offset;
	let mut sum = 0.0f32;
	let mut current_window_size = 0.0f32;

	// Ramp up, no writes.
	for _ in 0..phase_1_nreps {
		sum += input[ri];
		current_window_size += 1.0;
		ri += stride;
	}

	// Window still growing.
	for _ in 0..phase_2_nreps {
		sum += input[ri];
		current_window_size += 1.0;
		output[oi] = sum / current_window_size;
		ri += stride;
		oi += stride;
	}

	// Full window.
	for _ in 0..phase_3_nreps {
		sum += input[ri];
		sum -= input[li];
		output[oi] = sum / current_window_size;
		li += stride;
		ri += stride;
		oi += stride;
	}

	// Window shrinking.
	for _ in 0..phase_4_nreps {
		sum -= input[li];
		current_window_size -= 1.0;
		output[oi] = sum / current_window_size;
		li += stride;
		oi += stride;
	}
}

/// Box filter every row of a `num_rows x num_cols` row-major matrix.
pub fn box_along_rows(
	input: &[f32],
	output: &mut [f32],
	num_rows: usize,
	num_cols: usize,
	window_size: usize,
) {
	for i in 0..num_rows {
		box_1d(input, output, i * num_cols, num_cols, 1, window_size);
	}
}

/// Box filter every column of a `num_rows x num_cols` row-major matrix.
pub fn box_along_cols(
	input: &[f32],
	output: &mut [f32],
	num_rows: usize,
	num_cols: usize,
	window_size: usize,
) {
	for j in 0..num_cols {
		box_1d(input, output, j, num_rows, num_cols, window_size);
	}
}

/// Apply `nreps` X,Y box pass pairs in place. `scratch` must be as long as `buffer`.
pub fn jarosz_filter(
	buffer: &mut [f32],
	scratch: &mut [f32],
	num_rows: usize,
	num_cols: usize,
	window_size_along_rows: usize,
	window_size_along_cols: usize,
	nreps: usize,
) {
	for _ in 0..nreps {
		box_along_rows(buffer, scratch, num_rows, num_cols, window_size_along_rows);
		box_along_cols(scratch, buffer, num_rows, num_cols, window_size_along_cols);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn approx_eq(a: &[f32], b: &[f32]) {
		assert_eq!(a.len(), b.len());
		for (x, y) in a.iter().zip(b) {
			assert!((x - y).abs() < 1e-4, "{:?} != {:?}", a, b);
		}
	}

	#[test]
	fn test_window_size() {
		assert_eq!(window_size(1), 1);
		assert_eq!(window_size(128), 1);
		assert_eq!(window_size(129), 2);
		assert_eq!(window_size(512), 4);
		assert_eq!(window_size(1024), 8);
	}

	#[test]
	fn test_window_of_one_is_identity() {
		let input = [1.0, 5.0, -2.0, 8.0];
		let mut output = [0.0; 4];
		box_1d(&input, &mut output, 0, 4, 1, 1);
		approx_eq(&output, &input);
	}

	#[test]
	fn test_truncated_windows_at_edges() {
		// Window 3 centred on each sample, truncated at both ends.
		let input = [3.0, 6.0, 9.0, 12.0, 15.0];
		let mut output = [0.0; 5];
		box_1d(&input, &mut output, 0, 5, 1, 3);
		approx_eq(&output, &[4.5, 6.0, 9.0, 12.0, 13.5]);
	}

	#[test]
	fn test_even_window() {
		// Window 4 covers one sample before and two after.
		let input = [4.0, 8.0, 12.0, 16.0, 20.0, 24.0];
		let mut output = [0.0; 6];
		box_1d(&input, &mut output, 0, 6, 1, 4);
		approx_eq(&output, &[8.0, 10.0, 14.0, 18.0, 20.0, 22.0]);
	}

	#[test]
	fn test_strided_column() {
		// 3x2 matrix, filter the second column only.
		let input = [0.0, 3.0, 0.0, 6.0, 0.0, 9.0];
		let mut output = [-1.0; 6];
		box_1d(&input, &mut output, 1, 3, 2, 3);
		approx_eq(&output, &[-1.0, 4.5, -1.0, 6.0, -1.0, 7.5]);
	}

	#[test]
	fn test_constant_is_preserved() {
		let mut buffer = vec![42.0f32; 37 * 23];
		let mut scratch = vec![0.0f32; buffer.len()];
		jarosz_filter(&mut buffer, &mut scratch, 37, 23, 3, 5, NUM_JAROSZ_XY_PASSES);
		assert!(buffer.iter().all(|v| (v - 42.0).abs() < 1e-3));
	}
}
