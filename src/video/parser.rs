use std::io::{BufRead, Write};

use futures::{stream, Stream};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::{video::record::FrameHash, Result};

/// Lazily parsed records from a line-oriented reader.
///
/// Lines are split on `\n` with an optional `\r` stripped. Blank lines are
/// skipped, and a final line without a terminator is still parsed.
#[derive(Debug)]
pub struct Records<R> {
	reader: R,
	line: Vec<u8>,
}

impl<R: BufRead> Iterator for Records<R> {
	type Item = Result<FrameHash>;

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			self.line.clear();

			match self.reader.read_until(b'\n', &mut self.line) {
				Ok(0) => return None,
				Ok(_) => {}
				Err(e) => return Some(Err(e.into())),
			}

			let line = trim_line(&self.line);
			if !line.is_empty() {
				return Some(FrameHash::from_bytes(line));
			}
		}
	}
}

/// Parse records from a blocking reader.
pub fn parse_records<R: BufRead>(reader: R) -> Records<R> {
	Records {
		reader,
		line: Vec::new(),
	}
}

/// Parse every record in `text`, failing on the first malformed line.
pub fn parse_str(text: &str) -> Result<Vec<FrameHash>> {
	parse_records(text.as_bytes()).collect()
}

/// Parse records from an async reader as a stream.
pub fn read_records<R>(reader: R) -> impl Stream<Item = Result<FrameHash>>
where
	R: AsyncBufRead + Unpin,
{
	stream::try_unfold((reader, Vec::new()), |(mut reader, mut line)| async move {
		let record = next_record(&mut reader, &mut line).await;
		record.map(|record| record.map(|record| (record, (reader, line))))
	})
}

async fn next_record<R>(reader: &mut R, line: &mut Vec<u8>) -> Result<Option<FrameHash>>
where
	R: AsyncBufRead + Unpin,
{
	loop {
		line.clear();

		if reader.read_until(b'\n', line).await? == 0 {
			return Ok(None);
		}

		let trimmed = trim_line(line);
		if !trimmed.is_empty() {
			return FrameHash::from_bytes(trimmed).map(Some);
		}
	}
}

/// Write records in canonical form, one per line.
pub fn write_records<'a, W, I>(mut writer: W, records: I) -> Result<()>
where
	W: Write,
	I: IntoIterator<Item = &'a FrameHash>,
{
	for record in records {
		writeln!(writer, "{}", record)?;
	}

	writer.flush()?;
	Ok(())
}

fn trim_line(line: &[u8]) -> &[u8] {
	let line = line.strip_suffix(b"\n").unwrap_or(line);
	line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
	use std::{io::BufReader, time::Duration};

	use futures::TryStreamExt;

	use super::*;
	use crate::{hash::Hash256, Error};

	const HASH_A: &str = "9c151c3af838278e3ef57c180c7d031c07aefd12f2ccc1e18f2a1e1c7d0ff163";
	const HASH_B: &str = "0000000000000000000000000000000000000000000000000000000000000001";

	fn sample_text() -> String {
		format!(
			"0,{},,00:00:00\r\n\n3,{},30,00:00:01.5\n7,{},30",
			HASH_A, HASH_B, HASH_A
		)
	}

	#[test]
	fn test_parse_str_all_lines() {
		let records = parse_str(&sample_text()).unwrap();

		assert_eq!(records.len(), 3);
		assert_eq!(records[0].frame(), 0);
		assert_eq!(records[0].distance(), None);
		assert_eq!(records[1].hash().to_hex(), HASH_B);
		assert_eq!(records[1].timestamp(), Some(Duration::from_millis(1_500)));
		// final line without a newline
		assert_eq!(records[2].frame(), 7);
		assert_eq!(records[2].timestamp(), None);
	}

	#[test]
	fn test_small_buffer_reader() {
		let text = sample_text();
		let reader = BufReader::with_capacity(3, text.as_bytes());
		let records: Vec<_> = parse_records(reader).collect::<Result<_>>().unwrap();

		assert_eq!(records, parse_str(&text).unwrap());
	}

	#[test]
	fn test_error_stops_collect() {
		let text = format!("1,{}\n2,{},1,2,3\n3,{}\n", HASH_A, HASH_A, HASH_A);
		let mut records = parse_records(text.as_bytes());

		assert!(records.next().unwrap().is_ok());
		assert!(matches!(records.next(), Some(Err(Error::Record(_)))));
		assert!(records.next().unwrap().is_ok());
		assert!(records.next().is_none());

		assert!(parse_str(&text).is_err());
	}

	#[test]
	fn test_empty_input() {
		assert!(parse_str("").unwrap().is_empty());
		assert!(parse_str("\n\r\n\n").unwrap().is_empty());
	}

	#[test]
	fn test_write_then_parse() {
		let records = vec![
			FrameHash::new(0, Hash256::from_hex(HASH_A).unwrap(), None, Some(Duration::ZERO)),
			FrameHash::new(
				12,
				Hash256::from_hex(HASH_B).unwrap(),
				Some(64),
				Some(Duration::from_secs(6)),
			),
		];

		let mut out = Vec::new();
		write_records(&mut out, &records).unwrap();
		let text = String::from_utf8(out).unwrap();

		assert_eq!(
			text,
			format!("0,{},,00:00:00\n12,{},64,00:00:06\n", HASH_A, HASH_B)
		);
		assert_eq!(parse_str(&text).unwrap(), records);
	}

	#[tokio::test]
	async fn test_async_reader_matches_sync() {
		let text = sample_text();
		let reader = tokio::io::BufReader::with_capacity(5, text.as_bytes());
		let records: Vec<FrameHash> = read_records(reader).try_collect().await.unwrap();

		assert_eq!(records, parse_str(&text).unwrap());
	}

	#[tokio::test]
	async fn test_async_reader_reports_error() {
		let text = format!("1,{}\n-2,{}\n", HASH_A, HASH_A);
		let result: Result<Vec<FrameHash>> =
			read_records(tokio::io::BufReader::new(text.as_bytes()))
				.try_collect()
				.await;

		assert!(matches!(result, Err(Error::Negative { field: "frame", .. })));
	}
}
