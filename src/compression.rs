// compression.rs - the external compression boundary

use std::io::Cursor;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ColorType, DynamicImage, GenericImageView, ImageFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Quality applied when a request carries none, or an out-of-range one.
const DEFAULT_QUALITY: u8 = 80;

/// Target tokens a request may carry. `Original` resolves against the
/// detected source encoding at compression time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Original,
    Jpeg,
    Png,
    WebP,
    Avif,
}

/// Concrete encodings the capability can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Jpeg,
    Png,
    WebP,
    Avif,
}

impl Encoding {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Avif => "avif",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
            Self::Avif => "image/avif",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompressRequest {
    pub filename: String,
    /// Raw upload bytes, shared with the session record.
    pub bytes: Arc<Vec<u8>>,
    /// 10-100; anything else (or `None`) falls back to the default.
    pub quality: Option<u8>,
    pub format: OutputFormat,
}

/// Metadata of the uploaded file as detected from its bytes.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub filename: String,
    pub bytes: u64,
    pub width: u32,
    pub height: u32,
    /// Detected container, e.g. "png"; "unknown" when detection fails.
    pub format: &'static str,
}

/// The measured compression outcome.
#[derive(Debug, Clone)]
pub struct CompressedInfo {
    pub bytes: u64,
    pub width: u32,
    pub height: u32,
    pub encoding: Encoding,
    /// Self-describing data-URL string, decodable for download or bundling.
    pub payload: String,
}

#[derive(Debug, Clone)]
pub struct CompressResponse {
    pub source: SourceInfo,
    pub result: CompressedInfo,
    /// Percentage reduction, rounded to two decimals.
    pub ratio: f64,
}

#[derive(Debug, Error)]
pub enum CompressError {
    #[error("failed to decode image: {0}")]
    Decode(image::ImageError),
    #[error("failed to encode image: {0}")]
    Encode(image::ImageError),
    #[error("compression worker stopped unexpectedly")]
    Worker,
}

/// Compress one image. All pixel work happens in the `image` crate on a
/// blocking worker; the caller awaits one request at a time.
pub async fn compress(request: CompressRequest) -> Result<CompressResponse, CompressError> {
    tokio::task::spawn_blocking(move || compress_blocking(request))
        .await
        .map_err(|_| CompressError::Worker)?
}

fn compress_blocking(request: CompressRequest) -> Result<CompressResponse, CompressError> {
    let quality = resolve_quality(request.quality);
    let detected = image::guess_format(&request.bytes).ok();
    let img = image::load_from_memory(&request.bytes).map_err(CompressError::Decode)?;
    let (width, height) = img.dimensions();

    let encoding = resolve_target(request.format, detected);
    let data = encode_image(&img, encoding, quality).map_err(CompressError::Encode)?;

    let source_bytes = request.bytes.len() as u64;
    let ratio = round2((1.0 - data.len() as f64 / source_bytes as f64) * 100.0);
    let payload = format!("data:{};base64,{}", encoding.mime(), STANDARD.encode(&data));

    Ok(CompressResponse {
        source: SourceInfo {
            filename: request.filename,
            bytes: source_bytes,
            width,
            height,
            format: format_name(detected),
        },
        result: CompressedInfo {
            bytes: data.len() as u64,
            width,
            height,
            encoding,
            payload,
        },
        ratio,
    })
}

fn resolve_quality(quality: Option<u8>) -> u8 {
    match quality {
        Some(value) if (10..=100).contains(&value) => value,
        _ => DEFAULT_QUALITY,
    }
}

/// `Original` keeps the detected encoding where the encoder table supports
/// it; everything unrecognized or unsupported falls back to JPEG.
fn resolve_target(format: OutputFormat, detected: Option<ImageFormat>) -> Encoding {
    match format {
        OutputFormat::Jpeg => Encoding::Jpeg,
        OutputFormat::Png => Encoding::Png,
        OutputFormat::WebP => Encoding::WebP,
        OutputFormat::Avif => Encoding::Avif,
        OutputFormat::Original => match detected {
            Some(ImageFormat::Jpeg) => Encoding::Jpeg,
            Some(ImageFormat::Png) => Encoding::Png,
            Some(ImageFormat::WebP) => Encoding::WebP,
            Some(ImageFormat::Avif) => Encoding::Avif,
            _ => Encoding::Jpeg,
        },
    }
}

fn format_name(format: Option<ImageFormat>) -> &'static str {
    format
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("unknown")
}

fn encode_image(
    img: &DynamicImage,
    encoding: Encoding,
    quality: u8,
) -> image::ImageResult<Vec<u8>> {
    match encoding {
        Encoding::Jpeg => encode_jpeg(img, quality),
        Encoding::Png => encode_png(img),
        Encoding::WebP => encode_webp(img, quality),
        Encoding::Avif => encode_avif(img, quality),
    }
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> image::ImageResult<Vec<u8>> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut data = Vec::new();
    let mut cursor = Cursor::new(&mut data);
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality);
    encoder.encode(&rgb, width, height, ColorType::Rgb8)?;
    Ok(data)
}

// PNG has no quality knob; best compression with adaptive filtering.
fn encode_png(img: &DynamicImage) -> image::ImageResult<Vec<u8>> {
    let mut data = Vec::new();
    let mut cursor = Cursor::new(&mut data);
    let encoder = image::codecs::png::PngEncoder::new_with_quality(
        &mut cursor,
        image::codecs::png::CompressionType::Best,
        image::codecs::png::FilterType::Adaptive,
    );
    img.write_with_encoder(encoder)?;
    Ok(data)
}

fn encode_webp(img: &DynamicImage, quality: u8) -> image::ImageResult<Vec<u8>> {
    let mut data = Vec::new();
    let mut cursor = Cursor::new(&mut data);
    let encoder = image::codecs::webp::WebPEncoder::new_with_quality(
        &mut cursor,
        image::codecs::webp::WebPQuality::lossy(quality),
    );
    DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(encoder)?;
    Ok(data)
}

fn encode_avif(img: &DynamicImage, quality: u8) -> image::ImageResult<Vec<u8>> {
    let mut data = Vec::new();
    let mut cursor = Cursor::new(&mut data);
    let encoder =
        image::codecs::avif::AvifEncoder::new_with_speed_quality(&mut cursor, 8, quality);
    DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(encoder)?;
    Ok(data)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_png() -> Vec<u8> {
        let gradient = image::RgbImage::from_fn(64, 64, |x, y| {
            image::Rgb([(x * 4) as u8, (y * 4) as u8, 128])
        });
        let mut data = Vec::new();
        DynamicImage::ImageRgb8(gradient)
            .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
            .expect("encoding the sample PNG should succeed");
        data
    }

    #[test]
    fn missing_or_invalid_quality_falls_back_to_default() {
        assert_eq!(resolve_quality(None), 80);
        assert_eq!(resolve_quality(Some(5)), 80);
        assert_eq!(resolve_quality(Some(101)), 80);
        assert_eq!(resolve_quality(Some(10)), 10);
        assert_eq!(resolve_quality(Some(100)), 100);
    }

    #[test]
    fn original_resolves_to_detected_encoding() {
        assert_eq!(
            resolve_target(OutputFormat::Original, Some(ImageFormat::Png)),
            Encoding::Png
        );
        assert_eq!(
            resolve_target(OutputFormat::Original, Some(ImageFormat::WebP)),
            Encoding::WebP
        );
    }

    #[test]
    fn unsupported_sources_fall_back_to_jpeg() {
        assert_eq!(
            resolve_target(OutputFormat::Original, Some(ImageFormat::Bmp)),
            Encoding::Jpeg
        );
        assert_eq!(resolve_target(OutputFormat::Original, None), Encoding::Jpeg);
    }

    #[test]
    fn explicit_targets_ignore_the_detected_format() {
        assert_eq!(
            resolve_target(OutputFormat::Png, Some(ImageFormat::Jpeg)),
            Encoding::Png
        );
        assert_eq!(
            resolve_target(OutputFormat::Avif, Some(ImageFormat::Png)),
            Encoding::Avif
        );
    }

    #[test]
    fn png_to_jpeg_reports_the_measured_result() {
        let bytes = sample_png();
        let source_len = bytes.len() as u64;
        let request = CompressRequest {
            filename: "sample.png".into(),
            bytes: Arc::new(bytes),
            quality: Some(60),
            format: OutputFormat::Jpeg,
        };

        let response = compress_blocking(request).expect("compression should succeed");

        assert_eq!(response.source.filename, "sample.png");
        assert_eq!(response.source.bytes, source_len);
        assert_eq!(response.source.format, "png");
        assert_eq!((response.source.width, response.source.height), (64, 64));
        assert_eq!(response.result.encoding, Encoding::Jpeg);
        assert!(response.result.bytes > 0);
        assert!(response.result.payload.starts_with("data:image/jpeg;base64,"));

        let expected = round2((1.0 - response.result.bytes as f64 / source_len as f64) * 100.0);
        assert_eq!(response.ratio, expected);
    }

    #[test]
    fn ratio_is_rounded_to_two_decimals() {
        assert_eq!(round2(66.666_666), 66.67);
        assert_eq!(round2(12.344_9), 12.34);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn undecodable_bytes_surface_as_an_error() {
        let request = CompressRequest {
            filename: "junk.png".into(),
            bytes: Arc::new(vec![0u8; 16]),
            quality: None,
            format: OutputFormat::Jpeg,
        };
        assert!(matches!(
            compress_blocking(request),
            Err(CompressError::Decode(_))
        ));
    }
}
