//! Plain-text netpbm codec (`P2` grayscale, `P3` color).
//!
//! Layout: magic token, width, height, max intensity, then `width * height`
//! row-major values (three per pixel for `P3`), all separated by whitespace.
//! `#` starts a comment that runs to the end of the line.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{FilterError, Result};
use crate::image::{Image, Pixel, PixelBuffer, PixelFormat, Rgb, MAX_INTENSITY_LIMIT};

struct Tokens<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            line: 1,
        }
    }

    fn next_token(&mut self) -> Option<&'a str> {
        let bytes = self.text.as_bytes();
        loop {
            match bytes.get(self.pos)? {
                b'\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                b'#' => {
                    while bytes.get(self.pos).is_some_and(|&b| b != b'\n') {
                        self.pos += 1;
                    }
                }
                b if b.is_ascii_whitespace() => self.pos += 1,
                _ => break,
            }
        }
        let start = self.pos;
        while bytes
            .get(self.pos)
            .is_some_and(|&b| !b.is_ascii_whitespace() && b != b'#')
        {
            self.pos += 1;
        }
        Some(&self.text[start..self.pos])
    }

    fn error(&self, message: impl Into<String>) -> FilterError {
        FilterError::Parse {
            line: self.line,
            message: message.into(),
        }
    }

    fn number(&mut self, what: &str) -> Result<u32> {
        let token = self
            .next_token()
            .ok_or_else(|| self.error(format!("missing {what}")))?;
        token
            .parse()
            .map_err(|_| self.error(format!("invalid {what} '{token}'")))
    }
}

fn read_pixels<P: Pixel>(
    tokens: &mut Tokens<'_>,
    width: usize,
    height: usize,
    max_intensity: u32,
) -> Result<PixelBuffer<P>> {
    if width == 0 || height == 0 {
        return Err(FilterError::InvalidDimensions { width, height });
    }

    let count = width * height;
    let mut pixels = Vec::new();
    let mut failure = None;
    for _ in 0..count {
        let pixel = P::from_channels(|_| {
            if failure.is_some() {
                return 0;
            }
            match tokens.number("pixel value") {
                Ok(v) => v.min(max_intensity) as u16,
                Err(err) => {
                    failure = Some(err);
                    0
                }
            }
        });
        if let Some(err) = failure {
            return Err(err);
        }
        pixels.push(pixel);
    }
    PixelBuffer::from_vec(width, height, max_intensity, pixels)
}

/// Decode a plain-text netpbm image.
pub fn parse_pnm(text: &str) -> Result<Image> {
    let mut tokens = Tokens::new(text);
    let magic = tokens
        .next_token()
        .ok_or_else(|| tokens.error("empty input"))?;
    let format = PixelFormat::from_magic(magic)?;

    let width = tokens.number("width")? as usize;
    let height = tokens.number("height")? as usize;
    let max_intensity = tokens.number("max intensity")?;
    if max_intensity == 0 || max_intensity > MAX_INTENSITY_LIMIT {
        return Err(FilterError::InvalidMaxIntensity(max_intensity));
    }

    match format {
        PixelFormat::Gray => {
            read_pixels::<u16>(&mut tokens, width, height, max_intensity).map(Image::Gray)
        }
        PixelFormat::Color => {
            read_pixels::<Rgb>(&mut tokens, width, height, max_intensity).map(Image::Color)
        }
    }
}

/// Decode from any reader. Bytes that are not UTF-8 can only be valid
/// inside comments, so they are replaced rather than rejected.
pub fn read_pnm<R: Read>(mut reader: R) -> Result<Image> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    parse_pnm(&String::from_utf8_lossy(&bytes))
}

pub fn load_pnm(path: &Path) -> Result<Image> {
    let image = read_pnm(BufReader::new(File::open(path)?))?;
    log::debug!(
        "loaded {} ({} {}x{}, max {})",
        path.display(),
        image.format().magic(),
        image.width(),
        image.height(),
        image.max_intensity()
    );
    Ok(image)
}

/// Bytes inspected by [`detect_format`].
const MAGIC_PROBE_LEN: u64 = 64;

/// Format of a file, judged by its magic token only.
pub fn detect_format(path: &Path) -> Result<PixelFormat> {
    let mut head = Vec::new();
    File::open(path)?
        .take(MAGIC_PROBE_LEN)
        .read_to_end(&mut head)?;
    let text = String::from_utf8_lossy(&head);
    let mut tokens = Tokens::new(&text);
    let magic = tokens
        .next_token()
        .ok_or_else(|| tokens.error("empty input"))?;
    PixelFormat::from_magic(magic)
}

fn write_pixels<P: Pixel, W: Write>(out: &mut W, buf: &PixelBuffer<P>) -> Result<()> {
    let channels = P::FORMAT.channels();
    let mut row = String::new();
    for (i, pixel) in buf.pixels().enumerate() {
        let x = i % buf.width();
        for c in 0..channels {
            if x > 0 || c > 0 {
                row.push(' ');
            }
            row.push_str(&pixel.channel(c).to_string());
        }
        if x + 1 == buf.width() {
            writeln!(out, "{row}")?;
            row.clear();
        }
    }
    Ok(())
}

/// Encode `image` as plain-text netpbm.
pub fn write_pnm<W: Write>(mut out: W, image: &Image) -> Result<()> {
    let header = image.header();
    writeln!(out, "{}", header.format.magic())?;
    writeln!(out, "# Generated by parfilter")?;
    writeln!(out, "{} {}", header.width, header.height)?;
    writeln!(out, "{}", header.max_intensity)?;
    match image {
        Image::Gray(buf) => write_pixels(&mut out, buf)?,
        Image::Color(buf) => write_pixels(&mut out, buf)?,
    }
    out.flush()?;
    Ok(())
}

pub fn save_pnm(path: &Path, image: &Image) -> Result<()> {
    write_pnm(BufWriter::new(File::create(path)?), image)?;
    log::debug!("saved {}", path.display());
    Ok(())
}
