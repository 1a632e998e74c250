use std::fmt::{self, Display};

use image::{DynamicImage, GenericImageView, ImageBuffer, Rgb, Rgba};

use crate::{Error, Result};

/// Color space a raster declares for its RGB samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorSpace {
	/// sRGB or an equivalent such as BT.709 full range.
	Srgb,

	/// No color space attached. Treated as sRGB.
	Unspecified,

	/// Anything else, named by the decoder.
	Other(String),
}

impl ColorSpace {
	/// Whether pixels in this color space can be hashed as-is.
	pub fn is_srgb(&self) -> bool {
		!matches!(self, ColorSpace::Other(_))
	}
}

impl Display for ColorSpace {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ColorSpace::Srgb => write!(f, "sRGB"),
			ColorSpace::Unspecified => write!(f, "unspecified"),
			ColorSpace::Other(name) => write!(f, "{}", name),
		}
	}
}

/// A decoded image the hasher can read pixels from.
///
/// This is the only thing the hasher needs from an image decoder: dimensions,
/// 8-bit RGB samples and the declared color space.
pub trait Raster {
	/// Width in pixels.
	fn width(&self) -> u32;

	/// Height in pixels.
	fn height(&self) -> u32;

	/// Red, green and blue samples of the pixel at column `x`, row `y`.
	fn rgb(&self, x: u32, y: u32) -> [u8; 3];

	/// Declared color space of the samples.
	fn color_space(&self) -> ColorSpace {
		ColorSpace::Srgb
	}
}

impl Raster for ImageBuffer<Rgb<u8>, Vec<u8>> {
	fn width(&self) -> u32 {
		GenericImageView::dimensions(self).0
	}

	fn height(&self) -> u32 {
		GenericImageView::dimensions(self).1
	}

	fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
		GenericImageView::get_pixel(self, x, y).0
	}
}

impl Raster for ImageBuffer<Rgba<u8>, Vec<u8>> {
	fn width(&self) -> u32 {
		GenericImageView::dimensions(self).0
	}

	fn height(&self) -> u32 {
		GenericImageView::dimensions(self).1
	}

	fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
		let [r, g, b, _] = GenericImageView::get_pixel(self, x, y).0;
		[r, g, b]
	}
}

/// Decoded files carry no color space information.
impl Raster for DynamicImage {
	fn width(&self) -> u32 {
		GenericImageView::dimensions(self).0
	}

	fn height(&self) -> u32 {
		GenericImageView::dimensions(self).1
	}

	fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
		let [r, g, b, _] = GenericImageView::get_pixel(self, x, y).0;
		[r, g, b]
	}

	fn color_space(&self) -> ColorSpace {
		ColorSpace::Unspecified
	}
}

/// Packed `rgb24` pixel buffer, as emitted by raw video decoders.
#[derive(Debug, Clone)]
pub struct RgbRaster {
	width: u32,
	height: u32,
	data: Vec<u8>,
	color_space: ColorSpace,
}

impl RgbRaster {
	/// Wrap a row-major `rgb24` buffer of exactly `width * height * 3` bytes.
	pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
		let expected = width as usize * height as usize * 3;

		if width == 0 || height == 0 {
			return Err(Error::Raster(format!(
				"dimensions must be non-zero, got {}x{}",
				width, height
			)));
		}

		if data.len() != expected {
			return Err(Error::Raster(format!(
				"expected {} bytes for {}x{} rgb24, got {}",
				expected,
				width,
				height,
				data.len()
			)));
		}

		Ok(Self {
			width,
			height,
			data,
			color_space: ColorSpace::Srgb,
		})
	}

	/// Replace the declared color space.
	pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
		self.color_space = color_space;
		self
	}
}

impl Raster for RgbRaster {
	fn width(&self) -> u32 {
		self.width
	}

	fn height(&self) -> u32 {
		self.height
	}

	fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
		let offset = (y as usize * self.width as usize + x as usize) * 3;
		[self.data[offset], self.data[offset + 1], self.data[offset + 2]]
	}

	fn color_space(&self) -> ColorSpace {
		self.color_space.clone()
	}
}
