/// Exact median of `values` using Torben's bisection-on-value method.
///
/// Does not reorder or copy the input. For an even count this is the lower
/// median, i.e. `sorted[(n - 1) / 2]`. Returns [None] for an empty slice.
pub fn torben_median(values: &[f32]) -> Option<f32> {
	let mut min = values.iter().copied().reduce(f32::min)?;
	let mut max = values.iter().copied().reduce(f32::max)?;
	let midn = (values.len() + 1) / 2;

	loop {
		let guess = (min + max) / 2.0;
		let mut less = 0;
		let mut greater = 0;
		let mut equal = 0;
		let mut max_lt_guess = min;
		let mut min_gt_guess = max;

		for &value in values {
			if value < guess {
				less += 1;
				if value > max_lt_guess {
					max_lt_guess = value;
				}
			} else if value > guess {
				greater += 1;
				if value < min_gt_guess {
					min_gt_guess = value;
				}
			} else {
				equal += 1;
			}
		}

		if less <= midn && greater <= midn {
			return Some(if less >= midn {
				max_lt_guess
			} else if less + equal >= midn {
				guess
			} else {
				min_gt_guess
			});
		} else if less > greater {
			max = max_lt_guess;
		} else {
			min = min_gt_guess;
		}
	}
}
