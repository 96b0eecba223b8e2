//! Raster image conversion, done in-process with the `image` crate.

use std::io::Cursor;

use ::image::codecs::jpeg::JpegEncoder;
use ::image::{DynamicImage, ImageFormat as Codec};
use cf_core::{AdapterKind, ConversionOutput, Error, ImageFormat, ImageOptions, InputFile};

use crate::progress::ProgressSender;

/// Convert a raster image to `options.format`.
///
/// Decoding and encoding are CPU-bound and run on the blocking pool.
pub async fn convert_image(
    file: &InputFile,
    options: &ImageOptions,
    progress: &ProgressSender,
) -> cf_core::Result<ConversionOutput> {
    let bytes = file.bytes.clone();
    let decoded = tokio::task::spawn_blocking(move || ::image::load_from_memory(&bytes))
        .await
        .map_err(|e| Error::Internal(format!("image decode task failed: {e}")))?
        .map_err(|e| Error::adapter(AdapterKind::Image, format!("failed to decode {}: {e}", file.name)))?;
    progress.send(50.0, "decoded");

    let format = options.format;
    let quality = options.quality;
    let encoded = tokio::task::spawn_blocking(move || encode(&decoded, format, quality))
        .await
        .map_err(|e| Error::Internal(format!("image encode task failed: {e}")))??;
    progress.send(100.0, "encoded");

    Ok(ConversionOutput::new(
        format!("{}.{}", file.base_name(), format.extension()),
        encoded,
    ))
}

/// Encode `img` as `format`. `quality` (0.0-1.0) only affects JPEG.
pub(crate) fn encode(img: &DynamicImage, format: ImageFormat, quality: f32) -> cf_core::Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    let result = match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, jpeg_quality(quality));
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
        }
        ImageFormat::Png => img.write_to(&mut buf, Codec::Png),
        ImageFormat::Webp => DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut buf, Codec::WebP),
        ImageFormat::Bmp => img.write_to(&mut buf, Codec::Bmp),
        ImageFormat::Gif => DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut buf, Codec::Gif),
        ImageFormat::Tiff => img.write_to(&mut buf, Codec::Tiff),
    };
    result.map_err(|e| Error::adapter(AdapterKind::Image, format!("failed to encode {format:?}: {e}")))?;
    Ok(buf.into_inner())
}

fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{Rgba, RgbaImage};

    fn png_bytes() -> Vec<u8> {
        let img = RgbaImage::from_pixel(4, 3, Rgba([200, 10, 10, 255]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img).write_to(&mut buf, Codec::Png).unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn png_to_jpeg() {
        let file = InputFile::new("holiday.photo.png", png_bytes());
        let options = ImageOptions {
            format: ImageFormat::Jpeg,
            quality: 0.8,
        };
        let out = convert_image(&file, &options, &ProgressSender::noop()).await.unwrap();

        assert_eq!(out.file_name, "holiday.jpg");
        let decoded = ::image::load_from_memory(&out.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
        assert_eq!(::image::guess_format(&out.bytes).unwrap(), Codec::Jpeg);
    }

    #[tokio::test]
    async fn garbage_input_is_adapter_error() {
        let file = InputFile::new("broken.png", b"not an image".to_vec());
        let err = convert_image(&file, &ImageOptions::default(), &ProgressSender::noop())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), cf_core::ErrorKind::AdapterInvocation);
    }

    #[test]
    fn jpeg_quality_mapping() {
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(0.92), 92);
        assert_eq!(jpeg_quality(1.0), 100);
    }
}
