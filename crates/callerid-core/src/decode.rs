use crate::{error::ImageError, model::DecodedImage, ports::ImageDecoder};
use bytes::Bytes;

/// [`ImageDecoder`] for PNG and JPEG photos, producing RGBA8 pixels.
#[derive(Clone, Copy, Debug, Default)]
pub struct RasterDecoder;

impl ImageDecoder for RasterDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, ImageError> {
        let image = image::load_from_memory(bytes).map_err(|e| ImageError::Decode {
            reason: e.to_string(),
        })?;
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();

        Ok(DecodedImage {
            width,
            height,
            pixels: Bytes::from(rgba.into_raw()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    #[test]
    fn decodes_png() {
        let mut png = Vec::new();
        RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255]))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let decoded = RasterDecoder.decode(&png).unwrap();
        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(decoded.pixels.len(), 3 * 2 * 4);
        assert_eq!(&decoded.pixels[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            RasterDecoder.decode(b"definitely not an image"),
            Err(ImageError::Decode { .. })
        ));
    }
}
