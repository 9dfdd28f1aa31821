mod common;

use std::collections::BTreeMap;

use common::{gif, jpeg, png, resource, FixtureResolver};
use inliner_engine::{
    decode_webarchive, ArchiveError, ArchiveImageResolver, ImageResolver, ImageTransformer,
    OutputFormat, ResourceTable,
};
use plist::{Dictionary, Value};
use pretty_assertions::assert_eq;
use url::Url;

fn base() -> Url {
    Url::parse("https://example.com/a/b/page.html").unwrap()
}

fn table(resources: &[(&str, Vec<u8>)]) -> ResourceTable {
    let mut table = ResourceTable::new(Some(base()));
    for (url, data) in resources {
        table.insert(resource(url, "image/png", data.clone()));
    }
    table
}

#[test]
fn lookup_exact_resolved_url() {
    let table = table(&[("https://example.com/a/b/img/a.png", vec![1])]);
    let hit = table.lookup("img/a.png", None).unwrap();
    assert_eq!(hit.url, "https://example.com/a/b/img/a.png");

    let other_base = Url::parse("https://example.com/a/b/c/").unwrap();
    assert!(table.lookup("../img/a.png", Some(&other_base)).is_some());
}

#[test]
fn lookup_alternate_content_node_spelling() {
    let table = table(&[(
        "https://example.com/a/b/jcr:content/renditions/x.png",
        vec![1],
    )]);
    let hit = table
        .lookup("/a/b/_jcr_content/renditions/x.png", None)
        .unwrap();
    assert_eq!(hit.url, "https://example.com/a/b/jcr:content/renditions/x.png");
}

#[test]
fn lookup_strips_size_suffix() {
    let table = table(&[("https://example.com/img/photo.jpg", vec![1])]);
    let hit = table.lookup("/img/photo-800x600.jpg", None).unwrap();
    assert_eq!(hit.url, "https://example.com/img/photo.jpg");
}

#[test]
fn lookup_combines_suffix_strip_and_spelling_swap() {
    let table = table(&[("https://example.com/c/_jcr_content/pic.jpg", vec![1])]);
    let hit = table.lookup("/c/jcr:content/pic-640x480.jpg", None).unwrap();
    assert_eq!(hit.url, "https://example.com/c/_jcr_content/pic.jpg");
}

#[test]
fn lookup_prefers_largest_rendition_under_asset_root() {
    let table = table(&[
        ("https://example.com/a/b/jcr:content/renditions/small.png", vec![1; 10]),
        ("https://example.com/a/b/jcr:content/renditions/large.png", vec![1; 500]),
        ("https://example.com/a/b/jcr:content/renditions/medium.png", vec![1; 100]),
        ("https://example.com/elsewhere/huge.png", vec![1; 5000]),
    ]);
    let hit = table.lookup("/a/b/_jcr_content/image.png", None).unwrap();
    assert_eq!(hit.url, "https://example.com/a/b/jcr:content/renditions/large.png");
}

#[test]
fn lookup_resolves_rendition_stored_with_suffixed_name() {
    let table = table(&[(
        "https://example.com/a/b/jcr:content/image.png-800x600.png",
        vec![7; 32],
    )]);
    let hit = table.lookup("/a/b/_jcr_content/image.png", None).unwrap();
    assert_eq!(
        hit.url,
        "https://example.com/a/b/jcr:content/image.png-800x600.png"
    );
}

#[test]
fn lookup_skips_non_images_under_asset_root() {
    let mut table = ResourceTable::new(Some(base()));
    table.insert(resource(
        "https://example.com/a/b/jcr:content/data.json",
        "application/json",
        b"{\"a\":1}".to_vec(),
    ));
    assert!(table.lookup("/a/b/_jcr_content/image.png", None).is_none());
}

#[test]
fn lookup_falls_back_to_literal_key() {
    let mut table = ResourceTable::new(None);
    table.insert(resource("images/logo.png", "image/png", vec![1]));
    let hit = table.lookup("images/logo.png", None).unwrap();
    assert_eq!(hit.url, "images/logo.png");
    assert!(table.lookup("images/other.png", None).is_none());
}

fn resource_dict(url: &str, mime: &str, data: &[u8]) -> Value {
    let mut dict = Dictionary::new();
    dict.insert("WebResourceURL".into(), Value::String(url.into()));
    dict.insert("WebResourceMIMEType".into(), Value::String(mime.into()));
    dict.insert("WebResourceData".into(), Value::Data(data.to_vec()));
    Value::Dictionary(dict)
}

fn archive_bytes(root: Dictionary) -> Vec<u8> {
    let mut out = Vec::new();
    Value::Dictionary(root).to_writer_binary(&mut out).unwrap();
    out
}

#[test]
fn decodes_main_resource_subresources_and_nested_frames() {
    engine_logging::initialize_for_tests();
    let mut main = match resource_dict(
        "https://example.com/post/1",
        "text/html",
        "<html><body><p>caf\u{e9}</p></body></html>".as_bytes(),
    ) {
        Value::Dictionary(dict) => dict,
        _ => unreachable!(),
    };
    main.insert(
        "WebResourceTextEncodingName".into(),
        Value::String("UTF-8".into()),
    );

    let mut inner_frame = Dictionary::new();
    inner_frame.insert(
        "WebSubresources".into(),
        Value::Array(vec![resource_dict(
            "https://cdn.example.com/deep.gif",
            "image/gif",
            &gif(4, 4),
        )]),
    );
    let mut frame = Dictionary::new();
    frame.insert(
        "WebSubresources".into(),
        Value::Array(vec![
            resource_dict("https://cdn.example.com/frame.png", "image/png", &png(4, 4)),
            resource_dict("https://cdn.example.com/a.jpg", "image/jpeg", b"duplicate"),
        ]),
    );
    frame.insert(
        "WebSubframeArchives".into(),
        Value::Array(vec![Value::Dictionary(inner_frame)]),
    );

    let mut root = Dictionary::new();
    root.insert("WebMainResource".into(), Value::Dictionary(main));
    root.insert(
        "WebSubresources".into(),
        Value::Array(vec![resource_dict(
            "https://cdn.example.com/a.jpg",
            "image/jpeg",
            &jpeg(8, 8),
        )]),
    );
    root.insert(
        "WebSubframeArchives".into(),
        Value::Array(vec![Value::Dictionary(frame)]),
    );

    let archive = decode_webarchive(&archive_bytes(root)).unwrap();
    assert_eq!(
        archive.base_url().map(Url::as_str),
        Some("https://example.com/post/1")
    );
    assert!(archive.main_html.contains("caf\u{e9}"));

    let urls: BTreeMap<_, _> = archive
        .resources
        .iter()
        .map(|res| (res.url.clone(), res.mime_type.clone()))
        .collect();
    assert_eq!(urls.len(), 3);
    assert!(urls.contains_key("https://cdn.example.com/deep.gif"));
    assert!(urls.contains_key("https://cdn.example.com/frame.png"));
    assert_eq!(
        archive.resources.get("https://cdn.example.com/a.jpg").unwrap().data,
        jpeg(8, 8)
    );
}

#[test]
fn accepts_legacy_key_spellings() {
    let mut root = Dictionary::new();
    root.insert(
        "MainResource".into(),
        resource_dict("https://example.com/old", "text/html", b"<p>old</p>"),
    );
    root.insert(
        "Subresources".into(),
        Value::Array(vec![resource_dict(
            "https://example.com/i.png",
            "image/png",
            &png(2, 2),
        )]),
    );

    let archive = decode_webarchive(&archive_bytes(root)).unwrap();
    assert_eq!(archive.main_html, "<p>old</p>");
    assert_eq!(archive.resources.len(), 1);
}

#[test]
fn main_document_in_declared_legacy_encoding() {
    let mut main = Dictionary::new();
    main.insert("WebResourceURL".into(), Value::String("https://example.com/x".into()));
    main.insert("WebResourceMIMEType".into(), Value::String("text/html".into()));
    main.insert(
        "WebResourceTextEncodingName".into(),
        Value::String("windows-1252".into()),
    );
    main.insert("WebResourceData".into(), Value::Data(b"<p>na\xefve</p>".to_vec()));
    let mut root = Dictionary::new();
    root.insert("WebMainResource".into(), Value::Dictionary(main));

    let archive = decode_webarchive(&archive_bytes(root)).unwrap();
    assert_eq!(archive.main_html, "<p>na\u{ef}ve</p>");
}

#[test]
fn garbage_is_a_malformed_container() {
    let err = decode_webarchive(b"definitely not a plist").unwrap_err();
    assert!(matches!(err, ArchiveError::MalformedContainer(_)));
}

#[test]
fn non_dictionary_root_is_malformed() {
    let mut out = Vec::new();
    Value::Array(vec![]).to_writer_binary(&mut out).unwrap();
    assert!(matches!(
        decode_webarchive(&out),
        Err(ArchiveError::MalformedContainer(_))
    ));
}

#[tokio::test]
async fn archive_resolver_transforms_hits() {
    let mut table = ResourceTable::new(Some(base()));
    table.insert(resource(
        "https://example.com/a/b/wide.jpg",
        "image/jpeg",
        jpeg(900, 300),
    ));
    let resolver = ArchiveImageResolver::new(table, ImageTransformer::default());

    let image = resolver.resolve_image("wide.jpg", None).await.unwrap().unwrap();
    assert_eq!(image.format, OutputFormat::Jpeg);
    assert_eq!((image.width, image.height), (300, 100));
}

#[tokio::test]
async fn archive_resolver_sniffs_missing_mime_type() {
    let mut table = ResourceTable::new(Some(base()));
    table.insert(resource("https://example.com/a/b/anon", "", gif(10, 10)));
    let resolver = ArchiveImageResolver::new(table, ImageTransformer::default());

    let image = resolver.resolve_image("anon", None).await.unwrap().unwrap();
    assert_eq!(image.format, OutputFormat::Gif);
}

#[tokio::test]
async fn archive_resolver_misses_without_fallback() {
    let resolver = ArchiveImageResolver::new(ResourceTable::new(Some(base())), ImageTransformer::default());
    assert!(resolver.resolve_image("nope.png", None).await.unwrap().is_none());
}

#[tokio::test]
async fn archive_resolver_delegates_misses_and_non_images_to_fallback() {
    let mut table = ResourceTable::new(Some(base()));
    table.insert(resource(
        "https://example.com/a/b/style.css",
        "text/css",
        b"body{}".to_vec(),
    ));
    let fallback = FixtureResolver::new()
        .with("style.css", png(3, 3))
        .with("remote.png", png(5, 5));
    let resolver = ArchiveImageResolver::new(table, ImageTransformer::default()).with_fallback(fallback);

    let remote = resolver.resolve_image("remote.png", None).await.unwrap().unwrap();
    assert_eq!((remote.width, remote.height), (5, 5));
    let css = resolver.resolve_image("style.css", None).await.unwrap().unwrap();
    assert_eq!((css.width, css.height), (3, 3));
}

#[tokio::test]
async fn archive_resolver_handles_data_uris_without_lookup() {
    let resolver = ArchiveImageResolver::new(ResourceTable::new(None), ImageTransformer::default());
    let uri = common::expected_uri(&png(6, 6));
    let image = resolver.resolve_image(&uri, None).await.unwrap().unwrap();
    assert_eq!(image.format, OutputFormat::Png);
    assert_eq!(image.to_data_uri(), uri);
}
