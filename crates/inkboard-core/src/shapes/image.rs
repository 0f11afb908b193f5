//! Image shape for embedding raster images.

use super::{ShapeId, ShapeStyle, ShapeTrait};
use base64::{Engine, engine::general_purpose::STANDARD};
use kurbo::{Affine, BezPath, Point, Rect, Shape as KurboShape};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Longest side, in world units, an imported image is displayed at.
pub const MAX_IMAGE_DISPLAY_SIZE: f64 = 400.0;

/// Failure to turn a picked file into an image shape.
#[derive(Debug, Error)]
pub enum ImageImportError {
    #[error("image file is empty")]
    Empty,
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to decode image: {0}")]
    Decode(#[from] ::image::ImageError),
}

/// Image format for stored image data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    WebP,
}

impl ImageFormat {
    /// Get MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::WebP => "image/webp",
        }
    }

    fn from_decoder(format: ::image::ImageFormat) -> Result<Self, ImageImportError> {
        match format {
            ::image::ImageFormat::Png => Ok(ImageFormat::Png),
            ::image::ImageFormat::Jpeg => Ok(ImageFormat::Jpeg),
            ::image::ImageFormat::WebP => Ok(ImageFormat::WebP),
            other => Err(ImageImportError::UnsupportedFormat(format!("{other:?}"))),
        }
    }
}

/// An embedded raster image, drawn at `source size * scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub(crate) id: ShapeId,
    /// Top-left corner position.
    pub position: Point,
    /// Original image width in pixels.
    pub source_width: u32,
    /// Original image height in pixels.
    pub source_height: u32,
    pub format: ImageFormat,
    /// Encoded file bytes, base64 so the payload stays plain JSON.
    pub data_base64: String,
    /// Uniform display scale.
    pub scale: f64,
    #[serde(default)]
    pub rotation: f64,
    /// Style properties (stroke used for optional border).
    pub style: ShapeStyle,
}

impl Image {
    /// Create an image shape from already-known pixel dimensions.
    pub fn new(
        position: Point,
        data: &[u8],
        source_width: u32,
        source_height: u32,
        format: ImageFormat,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            position,
            source_width,
            source_height,
            format,
            data_base64: STANDARD.encode(data),
            scale: 1.0,
            rotation: 0.0,
            style: ShapeStyle::default(),
        }
    }

    /// Decode file bytes and build an image whose longest side fits within
    /// [`MAX_IMAGE_DISPLAY_SIZE`]. Small images are never upscaled.
    pub fn decode(position: Point, data: &[u8]) -> Result<Self, ImageImportError> {
        if data.is_empty() {
            return Err(ImageImportError::Empty);
        }
        let format = ImageFormat::from_decoder(::image::guess_format(data)?)?;
        let decoded = ::image::load_from_memory(data)?;
        let (width, height) = (decoded.width(), decoded.height());

        let mut img = Self::new(position, data, width, height, format);
        img.scale = fit_scale(width, height);
        Ok(img)
    }

    /// Get the raw image data (decoded from base64).
    pub fn data(&self) -> Option<Vec<u8>> {
        STANDARD.decode(&self.data_base64).ok()
    }

    pub fn display_width(&self) -> f64 {
        self.source_width as f64 * self.scale
    }

    pub fn display_height(&self) -> f64 {
        self.source_height as f64 * self.scale
    }

    pub fn as_rect(&self) -> Rect {
        Rect::from_origin_size(self.position, (self.display_width(), self.display_height()))
    }
}

fn fit_scale(width: u32, height: u32) -> f64 {
    let longest = width.max(height) as f64;
    if longest <= 0.0 {
        return 1.0;
    }
    (MAX_IMAGE_DISPLAY_SIZE / longest).min(1.0)
}

impl ShapeTrait for Image {
    fn id(&self) -> ShapeId {
        self.id
    }

    fn bounds(&self) -> Rect {
        self.as_rect()
    }

    fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        self.as_rect().inflate(tolerance, tolerance).contains(point)
    }

    fn to_path(&self) -> BezPath {
        self.as_rect().to_path(0.1)
    }

    fn style(&self) -> &ShapeStyle {
        &self.style
    }

    fn style_mut(&mut self) -> &mut ShapeStyle {
        &mut self.style
    }

    fn transform(&mut self, affine: Affine) {
        self.position = affine * self.position;
        // Aspect ratio is locked, so only the horizontal factor counts
        let coeffs = affine.as_coeffs();
        self.scale *= coeffs[0].abs();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        ::image::RgbaImage::new(width, height)
            .write_to(&mut out, ::image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_large_image_is_scaled_down() {
        let img = Image::decode(Point::ZERO, &png_bytes(800, 200)).unwrap();
        assert_eq!(img.format, ImageFormat::Png);
        assert_eq!((img.source_width, img.source_height), (800, 200));
        assert!((img.display_width() - 400.0).abs() < 1e-9);
        assert!((img.display_height() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_small_image_not_upscaled() {
        let img = Image::decode(Point::new(5.0, 5.0), &png_bytes(40, 30)).unwrap();
        assert!((img.scale - 1.0).abs() < f64::EPSILON);
        assert_eq!(img.bounds(), Rect::new(5.0, 5.0, 45.0, 35.0));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            Image::decode(Point::ZERO, &[]),
            Err(ImageImportError::Empty)
        ));
        assert!(Image::decode(Point::ZERO, b"not an image at all").is_err());
    }

    #[test]
    fn test_data_round_trip() {
        let bytes = png_bytes(2, 2);
        let img = Image::decode(Point::ZERO, &bytes).unwrap();
        assert_eq!(img.data().unwrap(), bytes);
    }
}
