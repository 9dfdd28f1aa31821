//! Webarchive container decoding and the resource lookup heuristic.
//!
//! A `.webarchive` is a property list holding one main resource, a list of
//! subresources, and nested subframe archives that carry their own
//! subresources. Everything is flattened into a single [`ResourceTable`].

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::Cursor;

use encoding_rs::Encoding;
use engine_logging::{engine_debug, engine_info};
use plist::{Dictionary, Value};
use thiserror::Error;
use url::Url;

use crate::decode::decode_html;

const CONTENT_NODE_COLON: &str = "/jcr:content/";
const CONTENT_NODE_UNDERSCORE: &str = "/_jcr_content/";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("malformed webarchive container: {0}")]
    MalformedContainer(String),
}

/// One embedded file of a webarchive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveResource {
    pub url: String,
    pub mime_type: String,
    pub text_encoding: Option<String>,
    pub data: Vec<u8>,
}

impl ArchiveResource {
    /// Declared MIME type, or one sniffed from the byte header when none was stored.
    pub fn effective_mime_type(&self) -> Option<String> {
        let declared = self.mime_type.trim();
        if !declared.is_empty() {
            return Some(declared.to_ascii_lowercase());
        }
        image::guess_format(&self.data)
            .ok()
            .map(|format| format.to_mime_type().to_string())
    }

    pub fn is_image(&self) -> bool {
        self.effective_mime_type()
            .is_some_and(|mime| mime.starts_with("image/"))
    }
}

/// Resources of one decoded archive keyed by their exact original URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceTable {
    base_url: Option<Url>,
    resources: HashMap<String, ArchiveResource>,
}

impl ResourceTable {
    pub fn new(base_url: Option<Url>) -> Self {
        Self {
            base_url,
            resources: HashMap::new(),
        }
    }

    /// Adds a resource; the first resource stored under a URL wins.
    /// Returns `false` when the resource was dropped as a duplicate or has no URL.
    pub fn insert(&mut self, resource: ArchiveResource) -> bool {
        if resource.url.is_empty() {
            return false;
        }
        match self.resources.entry(resource.url.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(resource);
                true
            }
        }
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn get(&self, url: &str) -> Option<&ArchiveResource> {
        self.resources.get(url)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArchiveResource> {
        self.resources.values()
    }

    /// Finds the resource a page reference most likely points at.
    ///
    /// Tried in order, first hit wins:
    /// 1. the reference resolved against `base` (or the table's own base URL);
    /// 2. the same URL with the `jcr:content` segment in its other spelling;
    /// 3. steps 1-2 again with a `-WIDTHxHEIGHT` file name suffix stripped;
    /// 4. the largest image whose path starts with the asset root;
    /// 5. the raw reference as a literal key.
    pub fn lookup(&self, raw: &str, base: Option<&Url>) -> Option<&ArchiveResource> {
        let base = base.or(self.base_url.as_ref());
        if let Some(resolved) = resolve_reference(raw, base) {
            if let Some(hit) = self.lookup_with_variants(&resolved) {
                return Some(hit);
            }
            let stripped = strip_size_suffix(resolved.path());
            if stripped != resolved.path() {
                let mut alt = resolved.clone();
                alt.set_path(&stripped);
                if let Some(hit) = self.lookup_with_variants(&alt) {
                    return Some(hit);
                }
            }
            if let Some(hit) = self.largest_under_asset_root(&resolved) {
                engine_debug!("archive lookup fell back to asset root for {}", raw);
                return Some(hit);
            }
        }
        self.resources.get(raw)
    }

    fn lookup_with_variants(&self, url: &Url) -> Option<&ArchiveResource> {
        if let Some(hit) = self.resources.get(url.as_str()) {
            return Some(hit);
        }
        let alternate = alternate_content_node(url.path())?;
        let mut alt = url.clone();
        alt.set_path(&alternate);
        self.resources.get(alt.as_str())
    }

    // Largest payload wins: the biggest rendition is most likely the original.
    fn largest_under_asset_root(&self, url: &Url) -> Option<&ArchiveResource> {
        let root = asset_root(url.path());
        if root.is_empty() || root == "/" {
            return None;
        }
        self.resources
            .values()
            .filter(|res| !res.data.is_empty() && res.is_image())
            .filter(|res| {
                Url::parse(&res.url)
                    .map(|candidate| candidate.path().starts_with(root))
                    .unwrap_or(false)
            })
            .fold(None, |best: Option<&ArchiveResource>, res| match best {
                Some(current) if current.data.len() >= res.data.len() => Some(current),
                _ => Some(res),
            })
    }
}

/// A decoded webarchive: the main document as text plus its resource table.
#[derive(Debug, Clone)]
pub struct WebArchive {
    pub main_html: String,
    pub resources: ResourceTable,
}

impl WebArchive {
    pub fn base_url(&self) -> Option<&Url> {
        self.resources.base_url()
    }
}

/// Parses a webarchive property list (binary or XML).
pub fn decode_webarchive(bytes: &[u8]) -> Result<WebArchive, ArchiveError> {
    let root = Value::from_reader(Cursor::new(bytes))
        .map_err(|err| ArchiveError::MalformedContainer(err.to_string()))?;
    let root = root.as_dictionary().ok_or_else(|| {
        ArchiveError::MalformedContainer("top-level value is not a dictionary".into())
    })?;

    let main = main_resource(root);
    let base_url = main
        .as_ref()
        .and_then(|res| Url::parse(&res.url).ok());

    let mut resources = ResourceTable::new(base_url);
    collect_subresources(root, &mut resources);

    let main_html = main
        .map(|res| main_document_text(res.data, res.text_encoding.as_deref()))
        .unwrap_or_default();

    engine_info!(
        "decoded webarchive: {} resources, base url {}",
        resources.len(),
        resources
            .base_url()
            .map(Url::as_str)
            .unwrap_or("<none>")
    );

    Ok(WebArchive {
        main_html,
        resources,
    })
}

fn main_resource(archive: &Dictionary) -> Option<ArchiveResource> {
    let modern = archive.get("WebMainResource").and_then(parse_resource);
    match modern {
        Some(res) if !res.url.is_empty() || !res.data.is_empty() => Some(res),
        _ => archive.get("MainResource").and_then(parse_resource),
    }
}

fn collect_subresources(archive: &Dictionary, table: &mut ResourceTable) {
    for key in ["Subresources", "WebSubresources"] {
        let entries = archive.get(key).and_then(Value::as_array);
        for entry in entries.into_iter().flatten() {
            if let Some(res) = parse_resource(entry) {
                table.insert(res);
            }
        }
    }
    let frames = archive
        .get("WebSubframeArchives")
        .and_then(Value::as_array);
    for frame in frames.into_iter().flatten() {
        if let Some(frame) = frame.as_dictionary() {
            collect_subresources(frame, table);
        }
    }
}

fn parse_resource(value: &Value) -> Option<ArchiveResource> {
    let dict = value.as_dictionary()?;
    let text = |key: &str| dict.get(key).and_then(Value::as_string).map(str::to_string);
    Some(ArchiveResource {
        url: text("WebResourceURL").unwrap_or_default(),
        mime_type: text("WebResourceMIMEType").unwrap_or_default(),
        text_encoding: text("WebResourceTextEncodingName").filter(|name| !name.is_empty()),
        data: dict
            .get("WebResourceData")
            .and_then(Value::as_data)
            .map(<[u8]>::to_vec)
            .unwrap_or_default(),
    })
}

// Best effort: declared encoding, then UTF-8, then sniffing, then lossy.
fn main_document_text(data: Vec<u8>, encoding_name: Option<&str>) -> String {
    if let Some(text) = encoding_name.and_then(|name| transcode(&data, name)) {
        return text;
    }
    match String::from_utf8(data) {
        Ok(text) => text,
        Err(err) => {
            let data = err.into_bytes();
            match decode_html(&data, None) {
                Ok(decoded) => decoded.html,
                Err(_) => String::from_utf8_lossy(&data).into_owned(),
            }
        }
    }
}

fn transcode(data: &[u8], encoding_name: &str) -> Option<String> {
    let encoding = Encoding::for_label(encoding_name.trim().as_bytes())?;
    let text = encoding.decode_without_bom_handling_and_without_replacement(data)?;
    if text.is_empty() {
        return None;
    }
    Some(text.into_owned())
}

/// Parses `raw` as an absolute URL, or joins it onto `base` when it is relative.
pub(crate) fn resolve_reference(raw: &str, base: Option<&Url>) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match Url::parse(trimmed) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => base.and_then(|b| b.join(trimmed).ok()),
        Err(_) => None,
    }
}

/// The same path with the content-node segment in its other spelling.
pub(crate) fn alternate_content_node(path: &str) -> Option<String> {
    if path.contains(CONTENT_NODE_UNDERSCORE) {
        return Some(path.replace(CONTENT_NODE_UNDERSCORE, CONTENT_NODE_COLON));
    }
    if path.contains(CONTENT_NODE_COLON) {
        return Some(path.replace(CONTENT_NODE_COLON, CONTENT_NODE_UNDERSCORE));
    }
    None
}

/// `/img/photo-800x600.jpg` -> `/img/photo.jpg`; anything else is returned unchanged.
pub(crate) fn strip_size_suffix(path: &str) -> String {
    let Some(dot) = path.rfind('.') else {
        return path.to_string();
    };
    let (stem, ext) = path.split_at(dot);
    let Some(dash) = stem.rfind('-') else {
        return path.to_string();
    };
    let size = &stem[dash + 1..];
    let mut parts = size.split('x');
    let is_size = match (parts.next(), parts.next(), parts.next()) {
        (Some(w), Some(h), None) => is_digits(w) && is_digits(h),
        _ => false,
    };
    if !is_size {
        return path.to_string();
    }
    format!("{}{}", &stem[..dash], ext)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Path prefix that identifies an asset independent of its rendition.
pub(crate) fn asset_root(path: &str) -> &str {
    let mut root = path;
    for marker in [CONTENT_NODE_COLON, CONTENT_NODE_UNDERSCORE] {
        if let Some(idx) = root.find(marker) {
            root = &root[..idx];
        }
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strips_numeric_size_suffix() {
        assert_eq!(strip_size_suffix("/a/photo-800x600.jpg"), "/a/photo.jpg");
        assert_eq!(
            strip_size_suffix("/a/image.png-800x600.png"),
            "/a/image.png.png"
        );
    }

    #[test]
    fn keeps_paths_without_a_size_suffix() {
        for path in [
            "/a/photo.jpg",
            "/a/photo-large.jpg",
            "/a/photo-800x.jpg",
            "/a/photo-x600.jpg",
            "/a/photo-8a0x600.jpg",
            "/a/photo-800x600x2.jpg",
            "/a/noext",
        ] {
            assert_eq!(strip_size_suffix(path), path);
        }
    }

    #[test]
    fn swaps_content_node_spelling_both_ways() {
        assert_eq!(
            alternate_content_node("/a/_jcr_content/img.png").as_deref(),
            Some("/a/jcr:content/img.png")
        );
        assert_eq!(
            alternate_content_node("/a/jcr:content/img.png").as_deref(),
            Some("/a/_jcr_content/img.png")
        );
        assert_eq!(alternate_content_node("/a/img.png"), None);
    }

    #[test]
    fn asset_root_truncates_at_first_content_node() {
        assert_eq!(asset_root("/a/b/jcr:content/renditions/x.png"), "/a/b");
        assert_eq!(asset_root("/a/b/_jcr_content/x.png"), "/a/b");
        assert_eq!(asset_root("/a/b/x.png"), "/a/b/x.png");
    }

    #[test]
    fn first_resource_wins_on_duplicate_url() {
        let mut table = ResourceTable::new(None);
        let first = ArchiveResource {
            url: "https://example.com/a.png".into(),
            mime_type: "image/png".into(),
            text_encoding: None,
            data: vec![1],
        };
        let second = ArchiveResource {
            data: vec![2, 2],
            ..first.clone()
        };
        assert!(table.insert(first));
        assert!(!table.insert(second));
        assert_eq!(table.get("https://example.com/a.png").unwrap().data, vec![1]);
    }

    #[test]
    fn resources_without_url_are_ignored() {
        let mut table = ResourceTable::new(None);
        assert!(!table.insert(ArchiveResource {
            url: String::new(),
            mime_type: "image/png".into(),
            text_encoding: None,
            data: vec![1],
        }));
        assert!(table.is_empty());
    }

    #[test]
    fn missing_mime_type_is_sniffed() {
        let res = ArchiveResource {
            url: "https://example.com/x".into(),
            mime_type: String::new(),
            text_encoding: None,
            data: vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0],
        };
        assert_eq!(res.effective_mime_type().as_deref(), Some("image/png"));
        assert!(res.is_image());
    }

    #[test]
    fn declared_latin1_main_document_is_transcoded() {
        assert_eq!(main_document_text(b"caf\xe9".to_vec(), Some("iso-8859-1")), "café");
    }

    #[test]
    fn unknown_encoding_label_falls_back_to_utf8() {
        assert_eq!(
            main_document_text("héllo".as_bytes().to_vec(), Some("no-such-charset")),
            "héllo"
        );
    }
}
