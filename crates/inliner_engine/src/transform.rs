//! Decode → bound → re-encode for arbitrary image bytes.
//!
//! The source format is sniffed from the byte header only. JPEG, PNG and GIF
//! keep their format; everything else that decodes (WebP in practice) is
//! normalised to JPEG because there is no WebP output in the target set.

use std::io::Cursor;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use thiserror::Error;

use crate::settings::TransformSettings;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("unsupported or corrupt image data: {0}")]
    Decode(String),
    #[error("failed to encode {format:?}: {message}")]
    Encode { format: OutputFormat, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Gif,
}

impl OutputFormat {
    fn for_source(source: ImageFormat) -> Self {
        match source {
            ImageFormat::Png => OutputFormat::Png,
            ImageFormat::Gif => OutputFormat::Gif,
            _ => OutputFormat::Jpeg,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Gif => "image/gif",
        }
    }
}

/// A re-encoded image ready to be embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}

impl InlineImage {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// `data:<mime>;base64,<payload>` for the re-encoded bytes.
    pub fn to_data_uri(&self) -> String {
        let mime = self.mime_type();
        let mut uri = String::with_capacity(
            "data:;base64,".len() + mime.len() + base64::encoded_len(self.bytes.len(), true).unwrap_or(0),
        );
        uri.push_str("data:");
        uri.push_str(mime);
        uri.push_str(";base64,");
        base64::engine::general_purpose::STANDARD.encode_string(&self.bytes, &mut uri);
        uri
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageTransformer {
    settings: TransformSettings,
}

impl ImageTransformer {
    pub fn new(settings: TransformSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TransformSettings {
        &self.settings
    }

    pub fn transform(&self, bytes: &[u8]) -> Result<InlineImage, TransformError> {
        let source =
            image::guess_format(bytes).map_err(|err| TransformError::Decode(err.to_string()))?;
        let decoded = image::load_from_memory_with_format(bytes, source)
            .map_err(|err| TransformError::Decode(err.to_string()))?;

        let bounded = bound_dimensions(decoded, self.settings.max_dimension);
        let format = OutputFormat::for_source(source);
        let bytes = encode(&bounded, format, self.settings.jpeg_quality)?;

        Ok(InlineImage {
            bytes,
            format,
            width: bounded.width(),
            height: bounded.height(),
        })
    }
}

/// One-shot transform with the default JPEG quality.
pub fn transform(bytes: &[u8], max_dimension: u32) -> Result<InlineImage, TransformError> {
    ImageTransformer::new(TransformSettings {
        max_dimension,
        ..TransformSettings::default()
    })
    .transform(bytes)
}

// Never upscales; keeps aspect ratio and fits inside max x max.
fn bound_dimensions(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let max_dimension = max_dimension.max(1);
    if image.width() <= max_dimension && image.height() <= max_dimension {
        return image;
    }
    image.resize(max_dimension, max_dimension, FilterType::CatmullRom)
}

fn encode(image: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>, TransformError> {
    let mut buf = Vec::new();
    let result = match format {
        OutputFormat::Jpeg => {
            // The JPEG encoder rejects alpha channels.
            let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        }
        OutputFormat::Png => image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png),
        // First frame only; animation is not carried over.
        OutputFormat::Gif => DynamicImage::ImageRgba8(image.to_rgba8())
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Gif),
    };
    result.map_err(|err| TransformError::Encode {
        format,
        message: err.to_string(),
    })?;
    Ok(buf)
}
