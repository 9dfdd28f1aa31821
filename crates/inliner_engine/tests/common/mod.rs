#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use inliner_engine::{
    decode_data_uri, is_data_uri, ArchiveResource, ImageResolver, ImageTransformer, InlineImage,
    ResolveError,
};
use url::Url;

pub fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = match format {
        ImageFormat::Gif | ImageFormat::Png => DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([20, 120, 200, 255]),
        )),
        _ => DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 40, 40]))),
    };
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    encoded(width, height, ImageFormat::Jpeg)
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    encoded(width, height, ImageFormat::Png)
}

pub fn gif(width: u32, height: u32) -> Vec<u8> {
    encoded(width, height, ImageFormat::Gif)
}

/// What the rewriter should emit for `bytes` under default settings.
pub fn expected_uri(bytes: &[u8]) -> String {
    ImageTransformer::default()
        .transform(bytes)
        .unwrap()
        .to_data_uri()
}

pub fn resource(url: &str, mime: &str, data: Vec<u8>) -> ArchiveResource {
    ArchiveResource {
        url: url.to_string(),
        mime_type: mime.to_string(),
        text_encoding: None,
        data,
    }
}

/// Serves fixture bytes keyed by the raw source string and records every request.
/// `data:` URIs are decoded like the real resolvers do.
#[derive(Default)]
pub struct FixtureResolver {
    images: HashMap<String, Vec<u8>>,
    transformer: ImageTransformer,
    requests: Mutex<Vec<String>>,
}

impl FixtureResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: &str, bytes: Vec<u8>) -> Self {
        self.images.insert(source.to_string(), bytes);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageResolver for FixtureResolver {
    async fn resolve_image(
        &self,
        source: &str,
        _base_url: Option<&Url>,
    ) -> Result<Option<InlineImage>, ResolveError> {
        self.requests.lock().unwrap().push(source.to_string());
        if is_data_uri(source) {
            let bytes = decode_data_uri(source)?;
            return Ok(Some(self.transformer.transform(&bytes)?));
        }
        match self.images.get(source) {
            Some(bytes) => Ok(Some(self.transformer.transform(bytes)?)),
            None => Ok(None),
        }
    }
}
