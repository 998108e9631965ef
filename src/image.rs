//! Pixel storage shared by every engine.
//!
//! ## Formats
//!
//! | Format | Magic | Cell | Description |
//! |--------|-------|------|-------------|
//! | Gray | `P2` | `u16` | Single intensity channel |
//! | Color | `P3` | [`Rgb`] | Red, green, blue channels |
//!
//! Every channel lies in `0..=max_intensity`. Pixels live in one flat,
//! row-major `Array2` of shape `(height, width)`, so disjoint output regions can
//! be handed to different workers as independent mutable views.

use std::fmt::Debug;

use ndarray::{Array2, Array3, ArrayView3, ArrayViewMut2};

use crate::error::{FilterError, Result};

/// Largest max intensity a netpbm text image can declare.
pub const MAX_INTENSITY_LIMIT: u32 = 65535;

/// Pixel layout of an [`Image`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Gray,
    Color,
}

impl PixelFormat {
    /// Netpbm magic token of the plain-text encoding.
    pub fn magic(self) -> &'static str {
        match self {
            PixelFormat::Gray => "P2",
            PixelFormat::Color => "P3",
        }
    }

    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray => 1,
            PixelFormat::Color => 3,
        }
    }

    pub fn from_magic(magic: &str) -> Result<Self> {
        match magic {
            "P2" => Ok(PixelFormat::Gray),
            "P3" => Ok(PixelFormat::Color),
            other => Err(FilterError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn from_channels(channels: usize) -> Result<Self> {
        match channels {
            1 => Ok(PixelFormat::Gray),
            3 => Ok(PixelFormat::Color),
            other => Err(FilterError::UnsupportedFormat(format!(
                "{other} channels"
            ))),
        }
    }
}

/// A single cell value, either one intensity or an RGB triple.
pub trait Pixel: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    const FORMAT: PixelFormat;

    /// Value of channel `c` (`c < FORMAT.channels()`).
    fn channel(self, c: usize) -> u16;

    /// Build a pixel channel by channel.
    fn from_channels(f: impl FnMut(usize) -> u16) -> Self;

    /// Clamp every channel into `0..=max`.
    #[inline]
    fn clamp_to(self, max: u16) -> Self {
        Self::from_channels(|c| self.channel(c).min(max))
    }
}

impl Pixel for u16 {
    const FORMAT: PixelFormat = PixelFormat::Gray;

    #[inline]
    fn channel(self, _c: usize) -> u16 {
        self
    }

    #[inline]
    fn from_channels(mut f: impl FnMut(usize) -> u16) -> Self {
        f(0)
    }
}

/// RGB triple, one intensity per channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u16,
    pub g: u16,
    pub b: u16,
}

impl Rgb {
    pub const fn new(r: u16, g: u16, b: u16) -> Self {
        Self { r, g, b }
    }
}

impl Pixel for Rgb {
    const FORMAT: PixelFormat = PixelFormat::Color;

    #[inline]
    fn channel(self, c: usize) -> u16 {
        match c {
            0 => self.r,
            1 => self.g,
            _ => self.b,
        }
    }

    #[inline]
    fn from_channels(mut f: impl FnMut(usize) -> u16) -> Self {
        Self {
            r: f(0),
            g: f(1),
            b: f(2),
        }
    }
}

fn validate(width: usize, height: usize, max_intensity: u32) -> Result<u16> {
    if width == 0 || height == 0 {
        return Err(FilterError::InvalidDimensions { width, height });
    }
    if max_intensity == 0 || max_intensity > MAX_INTENSITY_LIMIT {
        return Err(FilterError::InvalidMaxIntensity(max_intensity));
    }
    Ok(max_intensity as u16)
}

/// Owned pixel grid of one format.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelBuffer<P: Pixel> {
    data: Array2<P>,
    max_intensity: u16,
}

impl<P: Pixel> PixelBuffer<P> {
    /// Black image of the given size.
    pub fn new(width: usize, height: usize, max_intensity: u32) -> Result<Self> {
        let max_intensity = validate(width, height, max_intensity)?;
        Ok(Self {
            data: Array2::from_elem((height, width), P::default()),
            max_intensity,
        })
    }

    /// Wrap row-major pixels. Channels above `max_intensity` are clamped.
    pub fn from_vec(
        width: usize,
        height: usize,
        max_intensity: u32,
        pixels: Vec<P>,
    ) -> Result<Self> {
        let max = validate(width, height, max_intensity)?;
        let actual = pixels.len();
        let data = Array2::from_shape_vec((height, width), pixels).map_err(|_| {
            FilterError::ShapeMismatch {
                expected: width * height,
                actual,
            }
        })?;
        Ok(Self {
            data: data.mapv(|p| p.clamp_to(max)),
            max_intensity: max,
        })
    }

    /// Build an image by evaluating `f(x, y)` in row-major order.
    pub fn from_fn(
        width: usize,
        height: usize,
        max_intensity: u32,
        mut f: impl FnMut(usize, usize) -> P,
    ) -> Result<Self> {
        let max = validate(width, height, max_intensity)?;
        Ok(Self {
            data: Array2::from_shape_fn((height, width), |(y, x)| f(x, y).clamp_to(max)),
            max_intensity: max,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    pub fn max_intensity(&self) -> u16 {
        self.max_intensity
    }

    pub fn header(&self) -> ImageHeader {
        ImageHeader {
            width: self.width(),
            height: self.height(),
            max_intensity: self.max_intensity,
            format: P::FORMAT,
        }
    }

    /// Pixel at `(x, y)`, or black when the coordinate is outside the image.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> P {
        self.data.get((y, x)).copied().unwrap_or_default()
    }

    /// Store `value` at `(x, y)` after clamping it into `0..=max_intensity`.
    /// Coordinates outside the image are ignored.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: P) {
        let max = self.max_intensity;
        if let Some(cell) = self.data.get_mut((y, x)) {
            *cell = value.clamp_to(max);
        }
    }

    /// Row-major pixels.
    pub fn pixels(&self) -> impl Iterator<Item = &P> + '_ {
        self.data.iter()
    }

    pub(crate) fn view_mut(&mut self) -> ArrayViewMut2<'_, P> {
        self.data.view_mut()
    }
}

/// Everything about an image except its pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageHeader {
    pub width: usize,
    pub height: usize,
    pub max_intensity: u16,
    pub format: PixelFormat,
}

impl ImageHeader {
    /// Black image matching this header.
    pub fn blank(&self) -> Result<Image> {
        let max = u32::from(self.max_intensity);
        Ok(match self.format {
            PixelFormat::Gray => Image::Gray(PixelBuffer::new(self.width, self.height, max)?),
            PixelFormat::Color => Image::Color(PixelBuffer::new(self.width, self.height, max)?),
        })
    }
}

/// A decoded image in one of the two supported formats.
#[derive(Clone, Debug, PartialEq)]
pub enum Image {
    Gray(PixelBuffer<u16>),
    Color(PixelBuffer<Rgb>),
}

impl Image {
    pub fn header(&self) -> ImageHeader {
        match self {
            Image::Gray(buf) => buf.header(),
            Image::Color(buf) => buf.header(),
        }
    }

    pub fn width(&self) -> usize {
        self.header().width
    }

    pub fn height(&self) -> usize {
        self.header().height
    }

    pub fn max_intensity(&self) -> u16 {
        self.header().max_intensity
    }

    pub fn format(&self) -> PixelFormat {
        match self {
            Image::Gray(_) => PixelFormat::Gray,
            Image::Color(_) => PixelFormat::Color,
        }
    }

    /// Convert from an `(height, width, channels)` array with 1 or 3 channels.
    pub fn from_array3(input: ArrayView3<u16>, max_intensity: u32) -> Result<Self> {
        let (height, width, channels) = input.dim();
        match PixelFormat::from_channels(channels)? {
            PixelFormat::Gray => PixelBuffer::from_fn(width, height, max_intensity, |x, y| {
                input[[y, x, 0]]
            })
            .map(Image::Gray),
            PixelFormat::Color => PixelBuffer::from_fn(width, height, max_intensity, |x, y| {
                Rgb::new(input[[y, x, 0]], input[[y, x, 1]], input[[y, x, 2]])
            })
            .map(Image::Color),
        }
    }

    /// Convert to an `(height, width, channels)` array.
    pub fn to_array3(&self) -> Array3<u16> {
        match self {
            Image::Gray(buf) => to_array3(buf),
            Image::Color(buf) => to_array3(buf),
        }
    }
}

fn to_array3<P: Pixel>(buf: &PixelBuffer<P>) -> Array3<u16> {
    let channels = P::FORMAT.channels();
    Array3::from_shape_fn((buf.height(), buf.width(), channels), |(y, x, c)| {
        buf.data[[y, x]].channel(c)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_out_of_range_is_black() {
        let buf = PixelBuffer::<u16>::from_vec(2, 1, 255, vec![7, 9]).unwrap();
        assert_eq!(buf.get(1, 0), 9);
        assert_eq!(buf.get(2, 0), 0);
        assert_eq!(buf.get(0, 1), 0);
    }

    #[test]
    fn test_set_clamps_to_max_intensity() {
        let mut buf = PixelBuffer::<Rgb>::new(2, 2, 100).unwrap();
        buf.set(1, 1, Rgb::new(250, 50, 101));
        assert_eq!(buf.get(1, 1), Rgb::new(100, 50, 100));

        // Ignored, not a panic
        buf.set(5, 5, Rgb::new(1, 1, 1));
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        let err = PixelBuffer::<u16>::from_vec(3, 3, 255, vec![0; 8]).unwrap_err();
        assert!(matches!(
            err,
            FilterError::ShapeMismatch {
                expected: 9,
                actual: 8
            }
        ));
    }

    #[test]
    fn test_new_rejects_empty_and_bad_max() {
        assert!(matches!(
            PixelBuffer::<u16>::new(0, 4, 255),
            Err(FilterError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            PixelBuffer::<u16>::new(4, 4, 0),
            Err(FilterError::InvalidMaxIntensity(0))
        ));
        assert!(matches!(
            PixelBuffer::<u16>::new(4, 4, 70000),
            Err(FilterError::InvalidMaxIntensity(70000))
        ));
    }

    #[test]
    fn test_array3_conversion_keeps_layout() {
        let mut arr = Array3::<u16>::zeros((2, 3, 3));
        arr[[1, 2, 0]] = 10;
        arr[[1, 2, 1]] = 20;
        arr[[1, 2, 2]] = 30;

        let image = Image::from_array3(arr.view(), 255).unwrap();
        assert_eq!(image.format(), PixelFormat::Color);
        assert_eq!((image.width(), image.height()), (3, 2));
        match &image {
            Image::Color(buf) => assert_eq!(buf.get(2, 1), Rgb::new(10, 20, 30)),
            Image::Gray(_) => panic!("expected color image"),
        }
        assert_eq!(image.to_array3(), arr);
    }

    #[test]
    fn test_array3_rejects_rgba() {
        let arr = Array3::<u16>::zeros((2, 2, 4));
        assert!(matches!(
            Image::from_array3(arr.view(), 255),
            Err(FilterError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_header_blank_matches_format() {
        let header = ImageHeader {
            width: 4,
            height: 3,
            max_intensity: 15,
            format: PixelFormat::Color,
        };
        let blank = header.blank().unwrap();
        assert_eq!(blank.header(), header);
    }

    #[test]
    fn test_magic_tokens() {
        assert_eq!(PixelFormat::from_magic("P2").unwrap(), PixelFormat::Gray);
        assert_eq!(PixelFormat::Color.magic(), "P3");
        assert!(matches!(
            PixelFormat::from_magic("P6"),
            Err(FilterError::UnsupportedFormat(_))
        ));
    }
}
