use anyhow::{anyhow, bail, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageReader};
use std::path::Path;

/// Quality used for JPEG output, the usual library default.
pub const JPEG_QUALITY: u8 = 75;

/// Interleaved RGB pixels, row-major, top-to-bottom, left-to-right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RgbBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            bail!(
                "rgb buffer size mismatch: expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            );
        }
        Ok(Self { width, height, data })
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }
}

/// Still-image formats selected from the output file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
}

impl OutputFormat {
    /// `.png` maps to PNG, `.jpg`/`.jpeg` to JPEG, case-insensitively.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(3))
        .ok_or_else(|| anyhow!("image dimensions {}x{} overflow", width, height))
}

/// Reduces a 16-bit channel to 8 bits after premultiplying by alpha, so
/// transparent pixels come out composited onto black.
#[inline]
fn to_8bit(channel: u16, alpha: u16) -> u8 {
    ((channel as u32 * alpha as u32 / 0xffff) >> 8) as u8
}

/// Decodes an image file into interleaved RGB bytes.
///
/// The decoder is picked from the file content, falling back to the
/// extension when the content is not recognised.
pub fn read(path: impl AsRef<Path>) -> Result<RgbBuffer> {
    let path = path.as_ref();
    let image = ImageReader::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to read image {}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode image {}", path.display()))?;

    let rgba = image.to_rgba16();
    let (width, height) = rgba.dimensions();
    let mut data = Vec::with_capacity(rgb_len(width, height)?);
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        data.extend_from_slice(&[to_8bit(r, a), to_8bit(g, a), to_8bit(b, a)]);
    }

    log::debug!("read {} ({}x{})", path.display(), width, height);
    Ok(RgbBuffer { width, height, data })
}

/// Encodes interleaved RGB bytes as a fully opaque PNG or JPEG, chosen by
/// the suffix of `path`.
///
/// An unrecognised suffix is an error and no file is created.
pub fn write(path: impl AsRef<Path>, width: u32, height: u32, rgb: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let format = OutputFormat::from_path(path)
        .ok_or_else(|| anyhow!("unsupported output format: {}", path.display()))?;

    let expected = rgb_len(width, height)?;
    if rgb.len() != expected {
        bail!(
            "rgb buffer size mismatch: expected {} bytes for {}x{}, got {}",
            expected,
            width,
            height,
            rgb.len()
        );
    }

    // encode fully before touching the file so a failed encode leaves nothing
    let mut encoded = Vec::new();
    let result = match format {
        OutputFormat::Png => {
            PngEncoder::new(&mut encoded).write_image(rgb, width, height, ExtendedColorType::Rgb8)
        }
        OutputFormat::Jpeg => JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY)
            .write_image(rgb, width, height, ExtendedColorType::Rgb8),
    };
    result.with_context(|| format!("failed to encode {}", path.display()))?;
    std::fs::write(path, &encoded)
        .with_context(|| format!("failed to create {}", path.display()))?;

    log::debug!("wrote {} ({}x{})", path.display(), width, height);
    Ok(())
}

/// Writes an [`RgbBuffer`], see [`write`].
pub fn write_buffer(path: impl AsRef<Path>, buffer: &RgbBuffer) -> Result<()> {
    write(path, buffer.width, buffer.height, &buffer.data)
}
