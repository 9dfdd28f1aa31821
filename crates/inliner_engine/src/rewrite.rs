//! Image inlining over one article body.
//!
//! The parsed tree is never mutated. Three ordered passes decide what each
//! image-bearing element becomes ([`Action`], keyed by node id), then
//! [`crate::serialize`] writes a fresh document applying those decisions
//! together with the leftover-media and anchor normalisation.

use std::collections::HashMap;
use std::fmt;

use ego_tree::NodeId;
use engine_logging::{engine_debug, engine_info};
use scraper::{ElementRef, Html};
use thiserror::Error;
use url::Url;

use crate::candidates::{img_candidates, picture_img_candidates, source_candidates, ImageCandidate};
use crate::resolve::{is_data_uri, ImageResolver};
use crate::serialize::HtmlEmitter;
use crate::settings::RewriteOptions;

/// Marks an `<img>` whose `src` has already been inlined.
pub const PROCESSED_MARKER: &str = "data-processed";

const LOGGED_SOURCE_CHARS: usize = 96;

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("document could not be parsed: {0}")]
    DocumentParse(String),
    #[error("failed to serialize rewritten document")]
    Serialize(#[from] fmt::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutput {
    pub html: String,
    pub images_inlined: usize,
}

/// Terminal decision for one image-bearing element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    /// `<picture>` collapsed into a single `<img>`.
    ReplacePicture { src: String, alt: Option<String> },
    /// `<img>` kept with its `src` replaced and sizing attributes stripped.
    InlineImg { src: String },
    /// `<img>` that already carries an inlined `src`; only stripped.
    KeepProcessedImg,
    /// Orphan `<source>` turned into an `<img>`.
    SourceToImg { src: String },
    Remove,
}

pub(crate) type Plan = HashMap<NodeId, Action>;

/// Rewrites article HTML so that every surviving image is an inlined `data:` URI.
pub struct ArticleRewriter<'r> {
    resolver: &'r dyn ImageResolver,
    options: RewriteOptions,
}

impl<'r> ArticleRewriter<'r> {
    pub fn new(resolver: &'r dyn ImageResolver, options: RewriteOptions) -> Self {
        Self { resolver, options }
    }

    /// Returns the rewritten inner HTML of `<body>` and the number of inlined images.
    ///
    /// Per-image failures only remove the element; only an unusable document
    /// or a serialization failure is an error.
    pub async fn rewrite(
        &self,
        html: &str,
        base_url: Option<&Url>,
    ) -> Result<RewriteOutput, RewriteError> {
        let document = Html::parse_document(html);
        let body = document
            .root_element()
            .children()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "body")
            .ok_or_else(|| RewriteError::DocumentParse("document has no <body>".into()))?;

        let mut plan = Plan::new();
        if self.options.include_images {
            let mut pass = Resolution {
                resolver: self.resolver,
                base_url,
                plan: &mut plan,
            };
            pass.collapse_pictures(body).await;
            pass.process_images(body).await;
            pass.process_orphan_sources(body).await;
        }

        let mut emitter = HtmlEmitter::new(&plan, self.options.include_images);
        let mut out = String::with_capacity(html.len());
        emitter.write_children(*body, &mut out)?;

        let images_inlined = emitter.images_inlined();
        engine_info!("rewrote article: {} images inlined", images_inlined);
        Ok(RewriteOutput {
            html: out,
            images_inlined,
        })
    }
}

/// Convenience wrapper around [`ArticleRewriter`].
pub async fn rewrite_article(
    html: &str,
    base_url: Option<&Url>,
    resolver: &dyn ImageResolver,
    options: RewriteOptions,
) -> Result<RewriteOutput, RewriteError> {
    ArticleRewriter::new(resolver, options)
        .rewrite(html, base_url)
        .await
}

struct Resolution<'a> {
    resolver: &'a dyn ImageResolver,
    base_url: Option<&'a Url>,
    plan: &'a mut Plan,
}

impl Resolution<'_> {
    async fn collapse_pictures(&mut self, body: ElementRef<'_>) {
        for picture in elements_named(body, "picture") {
            if has_ancestor(picture, &["picture", "svg"]) {
                continue;
            }
            let img = elements_named(picture, "img").into_iter().next();
            let alt = img
                .and_then(|img| img.value().attr("alt"))
                .filter(|alt| !alt.is_empty())
                .map(str::to_string);

            let mut candidates = img
                .map(|img| picture_img_candidates(img.value()))
                .unwrap_or_default();
            for source in elements_named(picture, "source") {
                candidates.extend(source_candidates(source.value()));
            }

            let action = match self.first_resolvable(&candidates).await {
                Some(src) => Action::ReplacePicture { src, alt },
                None => {
                    engine_debug!("removing <picture> with {} candidates", candidates.len());
                    Action::Remove
                }
            };
            self.plan.insert(picture.id(), action);
        }
    }

    async fn process_images(&mut self, body: ElementRef<'_>) {
        for img in elements_named(body, "img") {
            if has_ancestor(img, &["picture", "svg"]) {
                continue;
            }
            if is_already_processed(img) {
                self.plan.insert(img.id(), Action::KeepProcessedImg);
                continue;
            }
            let candidates = img_candidates(img.value());
            let action = match self.first_resolvable(&candidates).await {
                Some(src) => Action::InlineImg { src },
                None => {
                    engine_debug!("removing <img> with {} candidates", candidates.len());
                    Action::Remove
                }
            };
            self.plan.insert(img.id(), action);
        }
    }

    async fn process_orphan_sources(&mut self, body: ElementRef<'_>) {
        for source in elements_named(body, "source") {
            if has_ancestor(source, &["picture", "svg", "video", "audio"])
                || !may_be_image(source)
            {
                continue;
            }
            let candidates = source_candidates(source.value());
            let action = match self.first_resolvable(&candidates).await {
                Some(src) => Action::SourceToImg { src },
                None => Action::Remove,
            };
            self.plan.insert(source.id(), action);
        }
    }

    /// Tries candidates in order; the first one that resolves wins.
    async fn first_resolvable(&self, candidates: &[ImageCandidate]) -> Option<String> {
        for candidate in candidates {
            match self
                .resolver
                .resolve_image(&candidate.source, self.base_url)
                .await
            {
                Ok(Some(image)) => return Some(image.to_data_uri()),
                Ok(None) => engine_debug!("no image for {}", loggable(&candidate.source)),
                Err(err) => engine_debug!("candidate {} failed: {}", loggable(&candidate.source), err),
            }
        }
        None
    }
}

// An <img> marked processed is only trusted when its src really is inlined.
fn is_already_processed(img: ElementRef<'_>) -> bool {
    let el = img.value();
    el.attr(PROCESSED_MARKER) == Some("1") && el.attr("src").is_some_and(is_data_uri)
}

// A <source> with a declared non-image type never yields an image.
fn may_be_image(source: ElementRef<'_>) -> bool {
    source
        .value()
        .attr("type")
        .map(str::trim)
        .filter(|ty| !ty.is_empty())
        .is_none_or(|ty| ty.to_ascii_lowercase().starts_with("image/"))
}

fn elements_named<'a>(root: ElementRef<'a>, name: &str) -> Vec<ElementRef<'a>> {
    root.descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == name)
        .collect()
}

fn has_ancestor(el: ElementRef<'_>, names: &[&str]) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| names.contains(&ancestor.value().name()))
}

fn loggable(source: &str) -> &str {
    match source.char_indices().nth(LOGGED_SOURCE_CHARS) {
        Some((idx, _)) => &source[..idx],
        None => source,
    }
}
