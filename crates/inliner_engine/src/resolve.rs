//! Turning a source string into an embeddable image.
//!
//! [`ImageResolver`] is the single seam the DOM rewriter talks to. The
//! network variant fetches over HTTP, the archive variant looks the source up
//! in a [`ResourceTable`] and can delegate misses to another resolver.

use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use engine_logging::{engine_debug, engine_trace};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use thiserror::Error;
use url::Url;

use crate::archive::{resolve_reference, ResourceTable};
use crate::settings::ResolverSettings;
use crate::transform::{ImageTransformer, InlineImage, TransformError};
use crate::types::{FailureKind, FetchError, FetchedImage};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),
}

#[async_trait]
pub trait ImageResolver: Send + Sync {
    /// Resolves `source` (possibly relative to `base_url`) to an inlined image.
    ///
    /// `Ok(None)` means nothing was found, which is not an error.
    async fn resolve_image(
        &self,
        source: &str,
        base_url: Option<&Url>,
    ) -> Result<Option<InlineImage>, ResolveError>;
}

pub fn is_data_uri(source: &str) -> bool {
    source
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

/// Decodes the base64 payload of a `data:` URI.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, FetchError> {
    if !is_data_uri(uri) {
        return Err(FetchError::new(FailureKind::InvalidDataUri, "missing data: scheme"));
    }
    let (header, payload) = uri[5..]
        .split_once(',')
        .ok_or_else(|| FetchError::new(FailureKind::InvalidDataUri, "missing payload separator"))?;
    let is_base64 = header
        .split(';')
        .any(|param| param.trim().eq_ignore_ascii_case("base64"));
    if !is_base64 {
        return Err(FetchError::new(
            FailureKind::InvalidDataUri,
            "only base64 payloads are supported",
        ));
    }
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let engine = &base64::engine::general_purpose::STANDARD;
    engine
        .decode(&compact)
        .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(&compact))
        .map_err(|err| FetchError::new(FailureKind::InvalidDataUri, err.to_string()))
}

fn inline_data_uri(transformer: &ImageTransformer, uri: &str) -> Result<InlineImage, ResolveError> {
    let bytes = decode_data_uri(uri)?;
    Ok(transformer.transform(&bytes)?)
}

/// Fetches images over HTTP(S).
#[derive(Debug, Clone)]
pub struct NetworkImageResolver {
    client: reqwest::Client,
    settings: ResolverSettings,
    transformer: ImageTransformer,
}

impl NetworkImageResolver {
    pub fn new(settings: ResolverSettings, transformer: ImageTransformer) -> Result<Self, FetchError> {
        let client = build_client(&settings)?;
        Ok(Self {
            client,
            settings,
            transformer,
        })
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    pub async fn fetch(&self, url: &Url) -> Result<FetchedImage, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, self.settings.accept.as_str())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let max_bytes = self.settings.max_bytes;
        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let final_url = response.url().clone();
        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        if let Some(ct) = declared.as_deref() {
            if is_text_content_type(ct) {
                return Err(FetchError::new(
                    FailureKind::UnsupportedContentType {
                        content_type: ct.to_string(),
                    },
                    "expected an image",
                ));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes,
                        actual: Some(next_len),
                    },
                    "response too large",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        let content_type = declared.unwrap_or_else(|| mime_from_extension(final_url.path()).to_string());
        Ok(FetchedImage {
            final_url: final_url.to_string(),
            content_type,
            bytes,
        })
    }
}

#[async_trait]
impl ImageResolver for NetworkImageResolver {
    async fn resolve_image(
        &self,
        source: &str,
        base_url: Option<&Url>,
    ) -> Result<Option<InlineImage>, ResolveError> {
        if is_data_uri(source) {
            return inline_data_uri(&self.transformer, source).map(Some);
        }
        let url = resolve_http_url(source, base_url)?;
        let fetched = self.fetch(&url).await?;
        engine_trace!(
            "fetched {} ({} bytes, {})",
            fetched.final_url,
            fetched.bytes.len(),
            fetched.content_type
        );
        Ok(Some(self.transformer.transform(&fetched.bytes)?))
    }
}

fn build_client(settings: &ResolverSettings) -> Result<reqwest::Client, FetchError> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout)
        .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
        .user_agent(settings.user_agent.as_str());
    if let Some(proxy) = settings.proxy.as_deref() {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))
}

fn resolve_http_url(source: &str, base_url: Option<&Url>) -> Result<Url, FetchError> {
    let url = resolve_reference(source, base_url).ok_or_else(|| {
        FetchError::new(
            FailureKind::InvalidUrl,
            format!("cannot resolve {source:?} without a usable base url"),
        )
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::new(
            FailureKind::InvalidUrl,
            format!("unsupported scheme {other}"),
        )),
    }
}

fn is_text_content_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or(content_type).trim();
    essence
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("text/"))
}

fn mime_from_extension(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}

/// Serves images out of a decoded webarchive, optionally falling back to
/// another resolver on a miss.
pub struct ArchiveImageResolver {
    table: ResourceTable,
    transformer: ImageTransformer,
    fallback: Option<Box<dyn ImageResolver>>,
}

impl ArchiveImageResolver {
    pub fn new(table: ResourceTable, transformer: ImageTransformer) -> Self {
        Self {
            table,
            transformer,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: impl ImageResolver + 'static) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    pub fn table(&self) -> &ResourceTable {
        &self.table
    }
}

#[async_trait]
impl ImageResolver for ArchiveImageResolver {
    async fn resolve_image(
        &self,
        source: &str,
        base_url: Option<&Url>,
    ) -> Result<Option<InlineImage>, ResolveError> {
        if is_data_uri(source) {
            return inline_data_uri(&self.transformer, source).map(Some);
        }
        match self.table.lookup(source, base_url) {
            Some(resource) if resource.is_image() => {
                engine_trace!("archive hit for {} -> {}", source, resource.url);
                return Ok(Some(self.transformer.transform(&resource.data)?));
            }
            Some(resource) => {
                engine_debug!(
                    "archive entry {} for {} is not an image ({})",
                    resource.url,
                    source,
                    resource.mime_type
                );
            }
            None => {}
        }
        match &self.fallback {
            Some(fallback) => fallback.resolve_image(source, base_url).await,
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for ArchiveImageResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveImageResolver")
            .field("resources", &self.table.len())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_base64_data_uri() {
        let bytes = decode_data_uri("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(bytes, vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn accepts_wrapped_payload_and_uppercase_scheme() {
        let bytes = decode_data_uri("DATA:image/gif;base64,R0lG\nODlh").unwrap();
        assert_eq!(&bytes, b"GIF89a");
    }

    #[test]
    fn rejects_percent_encoded_data_uri() {
        let err = decode_data_uri("data:image/svg+xml,%3Csvg%3E").unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidDataUri);
    }

    #[test]
    fn rejects_data_uri_without_payload() {
        let err = decode_data_uri("data:image/png;base64").unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidDataUri);
    }

    #[test]
    fn relative_source_needs_a_base() {
        let err = resolve_http_url("/img/a.png", None).unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidUrl);

        let base = Url::parse("https://example.com/post/1").unwrap();
        let url = resolve_http_url("../img/a.png", Some(&base)).unwrap();
        assert_eq!(url.as_str(), "https://example.com/img/a.png");
    }

    #[test]
    fn non_http_schemes_are_rejected() {
        let err = resolve_http_url("ftp://example.com/a.png", None).unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidUrl);
    }

    #[test]
    fn extension_fallback_for_mime() {
        assert_eq!(mime_from_extension("/a/B.PNG"), "image/png");
        assert_eq!(mime_from_extension("/a/b.webp"), "image/webp");
        assert_eq!(mime_from_extension("/a/b"), "image/jpeg");
    }

    #[test]
    fn text_content_types_are_detected() {
        assert!(is_text_content_type("text/html; charset=utf-8"));
        assert!(!is_text_content_type("image/png"));
        assert!(!is_text_content_type("img"));
    }
}
