//! PNG image format support

use crate::{IoError, IoResult};
use folio_core::{Pix, PixMut, PixelDepth, color};
use png::{BitDepth, ColorType, Decoder, Encoder};
use std::io::{BufRead, Seek, Write};

/// Read a PNG image
///
/// 1-bit grayscale becomes a 1 bpp ink mask (black = ink), 8/16-bit
/// grayscale becomes 8 bpp, RGB/RGBA becomes 32 bpp.
pub fn read_png<R: BufRead + Seek>(reader: R) -> IoResult<Pix> {
    let decoder = Decoder::new(reader);
    let mut reader = decoder
        .read_info()
        .map_err(|e| IoError::DecodeError(format!("PNG decode error: {}", e)))?;

    let info = reader.info();
    let width = info.width;
    let height = info.height;
    let color_type = info.color_type;
    let bit_depth = info.bit_depth;

    let depth = match (color_type, bit_depth) {
        (ColorType::Grayscale, BitDepth::One) => PixelDepth::Bit1,
        (ColorType::Grayscale, BitDepth::Eight | BitDepth::Sixteen) => PixelDepth::Bit8,
        (ColorType::GrayscaleAlpha, BitDepth::Eight | BitDepth::Sixteen) => PixelDepth::Bit8,
        (ColorType::Rgb | ColorType::Rgba, BitDepth::Eight | BitDepth::Sixteen) => {
            PixelDepth::Bit32
        }
        _ => {
            return Err(IoError::UnsupportedFormat(format!(
                "unsupported PNG format: {:?} {:?}",
                color_type, bit_depth
            )));
        }
    };

    let buf_size = reader
        .output_buffer_size()
        .ok_or_else(|| IoError::DecodeError("failed to get output buffer size".to_string()))?;
    let mut buf = vec![0; buf_size];
    let output_info = reader
        .next_frame(&mut buf)
        .map_err(|e| IoError::DecodeError(format!("PNG frame error: {}", e)))?;

    let mut pix = PixMut::new(width, height, depth)?;
    let bytes_per_row = output_info.line_size;
    let data = &buf[..output_info.buffer_size()];
    let wide = bit_depth == BitDepth::Sixteen;

    for y in 0..height {
        let row = &data[y as usize * bytes_per_row..];
        for x in 0..width {
            let xi = x as usize;
            let val = match color_type {
                ColorType::Grayscale if bit_depth == BitDepth::One => {
                    let bit = (row[xi / 8] >> (7 - (xi % 8))) & 1;
                    u32::from(bit == 0)
                }
                ColorType::Grayscale => row[if wide { xi * 2 } else { xi }] as u32,
                ColorType::GrayscaleAlpha => row[if wide { xi * 4 } else { xi * 2 }] as u32,
                ColorType::Rgb | ColorType::Rgba => {
                    let samples = if color_type == ColorType::Rgb { 3 } else { 4 };
                    let step = if wide { 2 } else { 1 };
                    let idx = xi * samples * step;
                    color::compose_rgb(row[idx], row[idx + step], row[idx + 2 * step])
                }
                _ => 0,
            };
            pix.set_pixel_unchecked(x, y, val);
        }
    }

    Ok(pix.into())
}

/// Write a PNG image
///
/// 1 bpp images are written as 1-bit grayscale with ink as black.
pub fn write_png<W: Write>(pix: &Pix, writer: W) -> IoResult<()> {
    let width = pix.width();
    let height = pix.height();

    let (color_type, bit_depth, bytes_per_row) = match pix.depth() {
        PixelDepth::Bit1 => (ColorType::Grayscale, BitDepth::One, width.div_ceil(8)),
        PixelDepth::Bit8 => (ColorType::Grayscale, BitDepth::Eight, width),
        PixelDepth::Bit32 => (ColorType::Rgb, BitDepth::Eight, width * 3),
    };
    let bytes_per_row = bytes_per_row as usize;

    let mut encoder = Encoder::new(writer, width, height);
    encoder.set_color(color_type);
    encoder.set_depth(bit_depth);

    let mut writer = encoder
        .write_header()
        .map_err(|e| IoError::EncodeError(format!("PNG header error: {}", e)))?;

    let mut data = vec![0u8; bytes_per_row * height as usize];
    for y in 0..height {
        let row = &mut data[y as usize * bytes_per_row..(y as usize + 1) * bytes_per_row];
        for x in 0..width {
            let val = pix.get_pixel_unchecked(x, y);
            let xi = x as usize;
            match pix.depth() {
                PixelDepth::Bit1 => {
                    if val == 0 {
                        row[xi / 8] |= 1 << (7 - (xi % 8));
                    }
                }
                PixelDepth::Bit8 => row[xi] = val as u8,
                PixelDepth::Bit32 => {
                    let (r, g, b) = color::extract_rgb(val);
                    row[xi * 3] = r;
                    row[xi * 3 + 1] = g;
                    row[xi * 3 + 2] = b;
                }
            }
        }
    }

    writer
        .write_image_data(&data)
        .map_err(|e| IoError::EncodeError(format!("PNG write error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode_decode(pix: &Pix) -> Pix {
        let mut buffer = Vec::new();
        write_png(pix, &mut buffer).unwrap();
        read_png(Cursor::new(buffer)).unwrap()
    }

    #[test]
    fn test_png_binary_keeps_ink() {
        let mut pm = PixMut::new(13, 4, PixelDepth::Bit1).unwrap();
        pm.set_pixel(0, 0, 1).unwrap();
        pm.set_pixel(12, 3, 1).unwrap();
        let pix: Pix = pm.into();
        let back = encode_decode(&pix);
        assert_eq!(back.depth(), PixelDepth::Bit1);
        assert_eq!(back.count_pixels().unwrap(), 2);
        assert_eq!(back.get_pixel(12, 3), Some(1));
    }

    #[test]
    fn test_png_gray_and_rgb() {
        let mut pm = PixMut::new(10, 10, PixelDepth::Bit8).unwrap();
        pm.set_pixel(3, 4, 91).unwrap();
        let back = encode_decode(&pm.into());
        assert_eq!(back.get_pixel(3, 4), Some(91));

        let mut pm = PixMut::new(5, 5, PixelDepth::Bit32).unwrap();
        pm.set_rgb(1, 1, 0, 255, 0).unwrap();
        let back = encode_decode(&pm.into());
        assert_eq!(back.get_rgb(1, 1), Some((0, 255, 0)));
    }
}
