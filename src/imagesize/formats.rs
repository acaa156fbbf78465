//! Built-in formats, decoded with the `image` crate

use std::io::{Cursor, Read};

use image::io::Reader as ImageReader;
use image::ImageFormat;

use super::{FormatError, FormatRegistry, ImageMeta, PeekRead};

const JPEG_MAGIC: &[u8] = b"\xff\xd8";
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const GIF_MAGIC: &[u8] = b"GIF8?a";
const WEBP_MAGIC: &[u8] = b"RIFF????WEBP";
const BMP_MAGIC: &[u8] = b"BM";

/// Upper bound on bytes buffered per image (50MB)
const MAX_SOURCE_BYTES: u64 = 50 * 1024 * 1024;

pub(super) fn register_builtin(registry: &FormatRegistry) {
    registry.register(JPEG_MAGIC, |reader: &mut dyn PeekRead| {
        decode_with(reader, ImageFormat::Jpeg, "jpeg")
    });
    registry.register(PNG_MAGIC, |reader: &mut dyn PeekRead| {
        decode_with(reader, ImageFormat::Png, "png")
    });
    registry.register(GIF_MAGIC, |reader: &mut dyn PeekRead| {
        decode_with(reader, ImageFormat::Gif, "gif")
    });
    registry.register(WEBP_MAGIC, |reader: &mut dyn PeekRead| {
        decode_with(reader, ImageFormat::WebP, "webp")
    });
    registry.register(BMP_MAGIC, |reader: &mut dyn PeekRead| {
        decode_with(reader, ImageFormat::Bmp, "bmp")
    });
}

fn decode_with(
    reader: &mut dyn PeekRead,
    format: ImageFormat,
    name: &'static str,
) -> Result<ImageMeta, FormatError> {
    let mut data = Vec::new();
    Read::take(&mut *reader, MAX_SOURCE_BYTES).read_to_end(&mut data)?;

    let (width, height) = ImageReader::with_format(Cursor::new(data), format)
        .into_dimensions()
        .map_err(|e| FormatError::Malformed(format!("{} header: {}", name, e)))?;

    Ok(ImageMeta {
        format: name,
        width,
        height,
    })
}
