//! Image format conversion utilities.
//!
//! The CLIPRDR wire carries bitmaps as a bare DIB (`BITMAPINFOHEADER` or
//! `BITMAPV5HEADER` followed by colour table and pixels). Local image codecs
//! expect a complete BMP file, so inbound DIBs get a synthesized 14-byte file
//! header and outbound BMPs lose theirs.
//!
//! # Feature Flag
//!
//! This module requires the `image` feature:
//!
//! ```toml
//! [dependencies]
//! clipsync-core = { version = "0.3", features = ["image"] }
//! ```

use bytes::{BufMut, BytesMut};
use image::{DynamicImage, ImageFormat};

use crate::formats::LocalType;
use crate::{ClipboardError, ClipboardResult};

/// Size of the BMP file header the wire format omits
pub const BMP_FILE_HEADER_SIZE: usize = 14;

const BITMAPINFOHEADER_SIZE: usize = 40;
const BITMAPV5HEADER_SIZE: usize = 124;
const BI_BITFIELDS: u32 = 3;

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

/// Compute where the pixel array starts, counted from the start of the BMP file.
///
/// The offset covers the file header, the info header, the colour table
/// (explicit `biClrUsed`, or `2^biBitCount` entries up to 8 bpp), the three
/// channel masks of a `BI_BITFIELDS` info header, and an embedded colour
/// profile of a V5 header.
fn pixel_data_offset(dib: &[u8]) -> ClipboardResult<u64> {
    if dib.len() < BITMAPINFOHEADER_SIZE {
        return Err(ClipboardError::InvalidBitmap(format!(
            "DIB too small: {} bytes (need {})",
            dib.len(),
            BITMAPINFOHEADER_SIZE
        )));
    }

    let header_size = read_u32(dib, 0) as usize;
    if header_size < BITMAPINFOHEADER_SIZE || header_size > dib.len() {
        return Err(ClipboardError::InvalidBitmap(format!(
            "unsupported header size {} in {} byte DIB",
            header_size,
            dib.len()
        )));
    }

    let bit_count = read_u16(dib, 14);
    let compression = read_u32(dib, 16);
    let colors_used = read_u32(dib, 32);

    let mut offset = (BMP_FILE_HEADER_SIZE + header_size) as u64;
    if colors_used != 0 {
        offset += 4 * u64::from(colors_used);
    } else if (1..=8).contains(&bit_count) {
        offset += 4u64 << bit_count;
    }

    if header_size == BITMAPINFOHEADER_SIZE {
        if compression == BI_BITFIELDS {
            offset += 12;
        }
    } else if header_size >= BITMAPV5HEADER_SIZE {
        let profile_data = read_u32(dib, 112);
        let profile_size = read_u32(dib, 116);
        if u64::from(profile_data) <= offset {
            offset += u64::from(profile_size);
        }
    }

    Ok(offset)
}

/// Prepend the 14-byte BMP file header to a device-independent bitmap.
///
/// The result starts with `BM`, carries its own total length at bytes 2..6
/// and a pixel-data offset at bytes 10..14 that lies inside the buffer.
pub fn wrap_bitmap_payload(dib: &[u8]) -> ClipboardResult<Vec<u8>> {
    let offset = pixel_data_offset(dib)?;
    let total = BMP_FILE_HEADER_SIZE + dib.len();

    if offset >= total as u64 {
        return Err(ClipboardError::InvalidBitmap(format!(
            "pixel data offset {} outside {} byte bitmap",
            offset, total
        )));
    }
    let file_size = u32::try_from(total).map_err(|_| ClipboardError::InvalidBitmap("DIB too large".to_string()))?;

    let mut bmp = BytesMut::with_capacity(total);
    bmp.put_slice(b"BM");
    bmp.put_u32_le(file_size);
    bmp.put_u16_le(0);
    bmp.put_u16_le(0);
    bmp.put_u32_le(offset as u32);
    bmp.put_slice(dib);

    Ok(bmp.to_vec())
}

/// Strip the BMP file header, leaving the DIB the wire expects.
pub fn unwrap_bitmap_file(bmp: &[u8]) -> ClipboardResult<&[u8]> {
    if bmp.len() < BMP_FILE_HEADER_SIZE {
        return Err(ClipboardError::InvalidBitmap("BMP file too small".to_string()));
    }
    if &bmp[0..2] != b"BM" {
        return Err(ClipboardError::InvalidBitmap("invalid BMP signature".to_string()));
    }
    Ok(&bmp[BMP_FILE_HEADER_SIZE..])
}

/// Decode a remote image payload of the given kind.
pub fn decode_image(kind: LocalType, data: &[u8]) -> ClipboardResult<DynamicImage> {
    let (bytes, format) = match kind {
        LocalType::Bitmap => (std::borrow::Cow::Owned(wrap_bitmap_payload(data)?), ImageFormat::Bmp),
        LocalType::Png => (std::borrow::Cow::Borrowed(data), ImageFormat::Png),
        LocalType::Jpeg => (std::borrow::Cow::Borrowed(data), ImageFormat::Jpeg),
        other => {
            return Err(ClipboardError::FormatConversion(format!("{:?} is not an image type", other)));
        }
    };

    image::load_from_memory_with_format(&bytes, format).map_err(|e| ClipboardError::ImageDecode(e.to_string()))
}

/// Encode a local image for the given remote kind.
///
/// JPEG has no alpha channel, so the image is flattened to RGB first.
/// Bitmaps are produced as a BMP file and then unwrapped to a bare DIB.
pub fn encode_image(kind: LocalType, image: &DynamicImage) -> ClipboardResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut out);

    let result = match kind {
        LocalType::Png => image.write_to(&mut cursor, ImageFormat::Png),
        LocalType::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut cursor, ImageFormat::Jpeg),
        LocalType::Bitmap => image.write_to(&mut cursor, ImageFormat::Bmp),
        other => {
            return Err(ClipboardError::FormatConversion(format!("{:?} is not an image type", other)));
        }
    };
    result.map_err(|e| ClipboardError::ImageEncode(e.to_string()))?;

    if kind == LocalType::Bitmap {
        return Ok(unwrap_bitmap_file(&out)?.to_vec());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use proptest::prelude::*;

    fn info_header(header_size: u32, bit_count: u16, compression: u32, colors_used: u32) -> Vec<u8> {
        let mut header = vec![0u8; header_size as usize];
        header[0..4].copy_from_slice(&header_size.to_le_bytes());
        header[4..8].copy_from_slice(&1i32.to_le_bytes());
        header[8..12].copy_from_slice(&1i32.to_le_bytes());
        header[12..14].copy_from_slice(&1u16.to_le_bytes());
        header[14..16].copy_from_slice(&bit_count.to_le_bytes());
        header[16..20].copy_from_slice(&compression.to_le_bytes());
        header[32..36].copy_from_slice(&colors_used.to_le_bytes());
        header
    }

    fn pixel_offset_of(bmp: &[u8]) -> u32 {
        u32::from_le_bytes([bmp[10], bmp[11], bmp[12], bmp[13]])
    }

    #[test]
    fn test_wrap_24bit() {
        let mut dib = info_header(40, 24, 0, 0);
        dib.extend_from_slice(&[0x10, 0x20, 0x30, 0x00]);

        let bmp = wrap_bitmap_payload(&dib).unwrap();
        assert_eq!(&bmp[0..2], b"BM");
        assert_eq!(u32::from_le_bytes([bmp[2], bmp[3], bmp[4], bmp[5]]) as usize, bmp.len());
        assert_eq!(pixel_offset_of(&bmp), 54);
    }

    #[test]
    fn test_wrap_palette() {
        let mut dib = info_header(40, 8, 0, 0);
        dib.extend(vec![0u8; 256 * 4]);
        dib.extend_from_slice(&[1, 0, 0, 0]);
        assert_eq!(pixel_offset_of(&wrap_bitmap_payload(&dib).unwrap()), 14 + 40 + 1024);

        let mut dib = info_header(40, 8, 0, 2);
        dib.extend(vec![0u8; 2 * 4]);
        dib.extend_from_slice(&[1, 0, 0, 0]);
        assert_eq!(pixel_offset_of(&wrap_bitmap_payload(&dib).unwrap()), 14 + 40 + 8);
    }

    #[test]
    fn test_wrap_bitfields() {
        let mut dib = info_header(40, 32, 3, 0);
        dib.extend(vec![0u8; 12]);
        dib.extend_from_slice(&[0xFF; 4]);
        assert_eq!(pixel_offset_of(&wrap_bitmap_payload(&dib).unwrap()), 14 + 40 + 12);
    }

    #[test]
    fn test_wrap_v5_embedded_profile() {
        let mut dib = info_header(124, 32, 3, 0);
        // Profile placed directly after the header, before the pixels
        dib[112..116].copy_from_slice(&124u32.to_le_bytes());
        dib[116..120].copy_from_slice(&16u32.to_le_bytes());
        dib.extend(vec![0u8; 16]);
        dib.extend_from_slice(&[0xFF; 4]);
        assert_eq!(pixel_offset_of(&wrap_bitmap_payload(&dib).unwrap()), 14 + 124 + 16);
    }

    #[test]
    fn test_wrap_rejects_short_and_inconsistent() {
        assert!(wrap_bitmap_payload(&[0u8; 12]).is_err());

        // Colour table claims more entries than the payload holds
        let dib = info_header(40, 8, 0, 4096);
        assert!(matches!(wrap_bitmap_payload(&dib), Err(ClipboardError::InvalidBitmap(_))));
    }

    #[test]
    fn test_unwrap_bitmap_file() {
        assert!(unwrap_bitmap_file(b"XX0123456789abcdef").is_err());
        assert!(unwrap_bitmap_file(b"BM").is_err());
        assert_eq!(unwrap_bitmap_file(b"BM012345678901dib").unwrap(), b"dib");
    }

    #[test]
    fn test_bitmap_roundtrip() {
        let mut source = RgbImage::new(3, 2);
        source.put_pixel(0, 0, Rgb([255, 0, 0]));
        source.put_pixel(2, 1, Rgb([0, 0, 255]));
        let source = DynamicImage::ImageRgb8(source);

        let dib = encode_image(LocalType::Bitmap, &source).unwrap();
        assert_ne!(&dib[0..2], b"BM");

        let decoded = decode_image(LocalType::Bitmap, &dib).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
        assert_eq!(decoded.to_rgb8().get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(decoded.to_rgb8().get_pixel(2, 1), &Rgb([0, 0, 255]));
    }

    #[test]
    fn test_png_roundtrip() {
        let mut source = RgbaImage::new(4, 4);
        source.put_pixel(1, 1, Rgba([1, 2, 3, 128]));
        let source = DynamicImage::ImageRgba8(source);

        let png = encode_image(LocalType::Png, &source).unwrap();
        let decoded = decode_image(LocalType::Png, &png).unwrap();
        assert_eq!(decoded.to_rgba8().get_pixel(1, 1), &Rgba([1, 2, 3, 128]));
    }

    #[test]
    fn test_jpeg_from_rgba() {
        let source = DynamicImage::ImageRgba8(RgbaImage::new(8, 8));
        let jpeg = encode_image(LocalType::Jpeg, &source).unwrap();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
        assert_eq!(decode_image(LocalType::Jpeg, &jpeg).unwrap().width(), 8);
    }

    #[test]
    fn test_non_image_kind() {
        assert!(decode_image(LocalType::Html, b"<b>").is_err());
    }

    proptest! {
        #[test]
        fn prop_wrap_header_invariants(
            header_size in prop::sample::select(vec![40u32, 108, 124]),
            bit_count in prop::sample::select(vec![1u16, 4, 8, 16, 24, 32]),
            colors_used in 0u32..32,
            bitfields in any::<bool>(),
            pixels in prop::collection::vec(any::<u8>(), 1..256),
        ) {
            let compression = if bitfields { BI_BITFIELDS } else { 0 };
            let mut dib = info_header(header_size, bit_count, compression, colors_used);
            let table = if colors_used != 0 {
                colors_used as usize * 4
            } else if bit_count <= 8 {
                4usize << bit_count
            } else {
                0
            };
            dib.extend(vec![0u8; table]);
            if header_size == 40 && bitfields {
                dib.extend(vec![0u8; 12]);
            }
            dib.extend(pixels);

            let bmp = wrap_bitmap_payload(&dib).unwrap();
            prop_assert_eq!(&bmp[0..2], b"BM");
            let total = u32::from_le_bytes([bmp[2], bmp[3], bmp[4], bmp[5]]) as usize;
            prop_assert_eq!(total, bmp.len());
            prop_assert!((pixel_offset_of(&bmp) as usize) < bmp.len());
            prop_assert_eq!(&bmp[14..], &dib[..]);
        }
    }
}
