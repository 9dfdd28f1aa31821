//! Candidate image sources gathered from `srcset`, `src` and CMS `data-attrs`.

use scraper::node::Element;
use serde::Deserialize;

/// One possible source for an image, considered before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub source: String,
    /// Declared `w` descriptor, when the candidate came from a `srcset`.
    pub width: Option<u32>,
}

impl ImageCandidate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            width: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DataAttrs {
    #[serde(default)]
    src: Option<String>,
    #[serde(default, rename = "srcNoWatermark")]
    src_no_watermark: Option<String>,
}

/// Preferred source from a Substack-style `data-attrs` JSON blob.
///
/// `srcNoWatermark` wins over `src`. Malformed JSON, or anything other
/// than a JSON object, yields no candidate.
pub fn data_attrs_candidate(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    if !value.is_object() {
        return None;
    }
    let attrs = DataAttrs::deserialize(value).ok()?;
    let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
    non_empty(attrs.src_no_watermark).or_else(|| non_empty(attrs.src))
}

/// Splits a `srcset` into its candidates, in declaration order.
///
/// URLs end at whitespace, so `data:` URIs with embedded commas survive.
pub fn parse_srcset(srcset: &str) -> Vec<ImageCandidate> {
    let mut candidates = Vec::new();
    let mut rest = srcset;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == ',');
        if rest.is_empty() {
            break;
        }
        let url_end = rest
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(rest.len());
        let (url, after) = rest.split_at(url_end);
        rest = after;

        let mut descriptors = "";
        let url = if url.ends_with(',') {
            url.trim_end_matches(',')
        } else {
            let desc_end = rest.find(',').unwrap_or(rest.len());
            descriptors = &rest[..desc_end];
            rest = &rest[desc_end..];
            url
        };
        if url.is_empty() {
            continue;
        }
        candidates.push(ImageCandidate {
            source: url.to_string(),
            width: width_descriptor(descriptors),
        });
    }
    candidates
}

fn width_descriptor(descriptors: &str) -> Option<u32> {
    descriptors
        .split_whitespace()
        .find_map(|d| d.strip_suffix('w').and_then(|n| n.parse().ok()))
}

/// The widest candidate of a `srcset`. Entries without a width descriptor
/// rank lowest; on a tie the earlier entry wins.
pub fn best_srcset_candidate(srcset: &str) -> Option<ImageCandidate> {
    parse_srcset(srcset)
        .into_iter()
        .fold(None, |best: Option<ImageCandidate>, candidate| match best {
            Some(current) if current.width.unwrap_or(0) >= candidate.width.unwrap_or(0) => {
                Some(current)
            }
            _ => Some(candidate),
        })
}

/// Candidates of an `<img>` nested in a `<picture>`: data-attrs, widest srcset
/// entry, src, then the lazy-load `data-src` and widest `data-srcset` entry.
pub(crate) fn picture_img_candidates(img: &Element) -> Vec<ImageCandidate> {
    let mut out = Vec::new();
    push_data_attrs(img, &mut out);
    push_srcset(img, "srcset", &mut out);
    push_src(img, "src", &mut out);
    push_lazy(img, &mut out);
    dedup(out)
}

/// Candidates of a standalone `<img>`: data-attrs, src, then the lazy-load
/// `data-src` and widest `data-srcset` entry.
pub(crate) fn img_candidates(img: &Element) -> Vec<ImageCandidate> {
    let mut out = Vec::new();
    push_data_attrs(img, &mut out);
    push_src(img, "src", &mut out);
    push_lazy(img, &mut out);
    dedup(out)
}

/// Candidates of a `<source>`: widest srcset entry, then src.
pub(crate) fn source_candidates(source: &Element) -> Vec<ImageCandidate> {
    let mut out = Vec::new();
    push_srcset(source, "srcset", &mut out);
    push_src(source, "src", &mut out);
    dedup(out)
}

fn push_data_attrs(el: &Element, out: &mut Vec<ImageCandidate>) {
    if let Some(source) = el.attr("data-attrs").and_then(data_attrs_candidate) {
        out.push(ImageCandidate::new(source));
    }
}

fn push_srcset(el: &Element, attr: &str, out: &mut Vec<ImageCandidate>) {
    if let Some(best) = el.attr(attr).and_then(best_srcset_candidate) {
        out.push(best);
    }
}

fn push_src(el: &Element, attr: &str, out: &mut Vec<ImageCandidate>) {
    if let Some(src) = el.attr(attr).map(str::trim).filter(|s| !s.is_empty()) {
        out.push(ImageCandidate::new(src));
    }
}

fn push_lazy(el: &Element, out: &mut Vec<ImageCandidate>) {
    push_src(el, "data-src", out);
    push_srcset(el, "data-srcset", out);
}

fn dedup(candidates: Vec<ImageCandidate>) -> Vec<ImageCandidate> {
    let mut seen: Vec<ImageCandidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !seen.iter().any(|c| c.source == candidate.source) {
            seen.push(candidate);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn no_watermark_variant_is_preferred() {
        let raw = r#"{"src":"x.jpg","srcNoWatermark":"y.jpg"}"#;
        assert_eq!(data_attrs_candidate(raw).as_deref(), Some("y.jpg"));
    }

    #[test]
    fn falls_back_to_src_when_no_watermark_is_empty() {
        let raw = r#"{"src":"x.jpg","srcNoWatermark":"","height":300}"#;
        assert_eq!(data_attrs_candidate(raw).as_deref(), Some("x.jpg"));
    }

    #[test]
    fn malformed_data_attrs_yield_nothing() {
        assert_eq!(data_attrs_candidate("{not json"), None);
        assert_eq!(data_attrs_candidate(r#"{"alt":"x"}"#), None);
        assert_eq!(data_attrs_candidate(r#"["x.jpg"]"#), None);
    }

    #[test]
    fn lazy_load_attributes_follow_src() {
        let doc = scraper::Html::parse_fragment(
            r#"<img src="placeholder.gif" data-src="real.jpg" data-srcset="s.jpg 200w, l.jpg 900w">"#,
        );
        let img = doc
            .root_element()
            .descendants()
            .filter_map(scraper::ElementRef::wrap)
            .find(|el| el.value().name() == "img")
            .unwrap();
        let sources: Vec<String> = img_candidates(img.value())
            .into_iter()
            .map(|c| c.source)
            .collect();
        assert_eq!(sources, vec!["placeholder.gif", "real.jpg", "l.jpg"]);
    }

    #[test]
    fn parses_width_and_density_descriptors() {
        let parsed = parse_srcset("a.jpg 480w, b.jpg 2x,c.jpg");
        assert_eq!(
            parsed,
            vec![
                ImageCandidate {
                    source: "a.jpg".into(),
                    width: Some(480)
                },
                ImageCandidate {
                    source: "b.jpg".into(),
                    width: None
                },
                ImageCandidate {
                    source: "c.jpg".into(),
                    width: None
                },
            ]
        );
    }

    #[test]
    fn data_uri_with_comma_stays_whole() {
        let parsed = parse_srcset("data:image/png;base64,AAAA 1x, b.png 200w");
        assert_eq!(parsed[0].source, "data:image/png;base64,AAAA");
        assert_eq!(parsed[1].source, "b.png");
        assert_eq!(parsed[1].width, Some(200));
    }

    #[test]
    fn widest_entry_wins() {
        let best = best_srcset_candidate("s.jpg 320w, l.jpg 1024w, m.jpg 640w").unwrap();
        assert_eq!(best.source, "l.jpg");
    }

    #[test]
    fn untagged_entries_rank_lowest_and_first_wins_ties() {
        assert_eq!(
            best_srcset_candidate("plain.jpg, tagged.jpg 10w").unwrap().source,
            "tagged.jpg"
        );
        assert_eq!(
            best_srcset_candidate("one.jpg, two.jpg").unwrap().source,
            "one.jpg"
        );
        assert_eq!(best_srcset_candidate("  ,  "), None);
    }
}
