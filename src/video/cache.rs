use futures::{stream::BoxStream, Stream, StreamExt, TryStreamExt};

use crate::Result;

/// A fallible stream that is pulled from its source at most once.
///
/// The first [CachedStream::materialize] drains the source into memory; every
/// later call replays the cached values without touching the source again.
/// If the source fails, the error is returned and the values read so far stay
/// cached, so a later call resumes where the source left off.
pub struct CachedStream<'a, T> {
	source: Option<BoxStream<'a, Result<T>>>,
	cache: Vec<T>,
}

impl<'a, T: Send + 'a> CachedStream<'a, T> {
	/// Wrap a stream.
	pub fn new<S>(source: S) -> Self
	where
		S: Stream<Item = Result<T>> + Send + 'a,
	{
		Self {
			source: Some(source.boxed()),
			cache: Vec::new(),
		}
	}

	/// Wrap values that are already in memory.
	pub fn from_vec(values: Vec<T>) -> Self {
		Self {
			source: None,
			cache: values,
		}
	}

	/// Whether the source has been fully drained.
	pub fn is_materialized(&self) -> bool {
		self.source.is_none()
	}

	/// Drain the source if needed and return every value.
	pub async fn materialize(&mut self) -> Result<&[T]> {
		if let Some(source) = self.source.as_mut() {
			while let Some(value) = source.try_next().await? {
				self.cache.push(value);
			}
			self.source = None;
		}

		Ok(&self.cache)
	}
}

impl<T> std::fmt::Debug for CachedStream<'_, T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CachedStream")
			.field("cached", &self.cache.len())
			.field("materialized", &self.source.is_none())
			.finish()
	}
}
