use std::borrow::Cow;
use std::fmt::{self, Write};

use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::ElementRef;

use crate::rewrite::{Action, Plan, PROCESSED_MARKER};

/// Sizing, lazy-loading and CMS rendition attributes dropped from inlined images.
const STRIPPED_IMG_ATTRIBUTES: &[&str] = &[
    "srcset",
    "sizes",
    "loading",
    "width",
    "height",
    "style",
    "class",
    "data-attrs",
    "data-src",
    "data-srcset",
    "data-orig-size",
    "data-medium-file",
    "data-large-file",
];

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta", "param",
    "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext",
];

/// Writes HTML for a parsed tree, applying a rewrite plan on the way out.
pub(crate) struct HtmlEmitter<'p> {
    plan: &'p Plan,
    include_images: bool,
    images_kept: usize,
    images_inlined: usize,
}

impl<'p> HtmlEmitter<'p> {
    pub(crate) fn new(plan: &'p Plan, include_images: bool) -> Self {
        Self {
            plan,
            include_images,
            images_kept: 0,
            images_inlined: 0,
        }
    }

    pub(crate) fn images_inlined(&self) -> usize {
        self.images_inlined
    }

    pub(crate) fn write_children(&mut self, node: NodeRef<'_, Node>, out: &mut String) -> fmt::Result {
        for child in node.children() {
            self.write_node(child, out)?;
        }
        Ok(())
    }

    fn write_node(&mut self, node: NodeRef<'_, Node>, out: &mut String) -> fmt::Result {
        match node.value() {
            Node::Text(text) => {
                if parent_is_raw_text(node) {
                    out.push_str(text);
                } else {
                    escape_text(text, out);
                }
                Ok(())
            }
            Node::Comment(comment) => write!(out, "<!--{}-->", &**comment),
            Node::Element(_) => match ElementRef::wrap(node) {
                Some(element) => self.write_element(element, out),
                None => Ok(()),
            },
            Node::Document | Node::Fragment => self.write_children(node, out),
            // Doctypes and processing instructions never occur inside <body>.
            _ => Ok(()),
        }
    }

    fn write_element(&mut self, element: ElementRef<'_>, out: &mut String) -> fmt::Result {
        if let Some(action) = self.plan.get(&element.id()) {
            return match action {
                Action::Remove => Ok(()),
                Action::ReplacePicture { src, alt } => {
                    self.write_fresh_img(src, alt.as_deref(), out)
                }
                Action::SourceToImg { src } => self.write_fresh_img(src, None, out),
                Action::InlineImg { src } => self.write_stripped_img(element, Some(src), out),
                Action::KeepProcessedImg => self.write_stripped_img(element, None, out),
            };
        }

        let name = element.value().name();
        match name {
            // Anything image-bearing without a decision did not survive.
            "img" | "picture" | "source" | "svg" => Ok(()),
            // Its markup is unparsed text here and would reach readers with scripting off.
            "noscript" => Ok(()),
            "figure" if !self.include_images => Ok(()),
            "figure" => self.write_figure(element, out),
            "a" => self.write_children(*element, out),
            _ => {
                write_open_tag(element, out)?;
                if VOID_ELEMENTS.contains(&name) {
                    return Ok(());
                }
                self.write_children(*element, out)?;
                write!(out, "</{name}>")
            }
        }
    }

    // A figure is only kept if at least one image survived inside it.
    fn write_figure(&mut self, element: ElementRef<'_>, out: &mut String) -> fmt::Result {
        let kept_before = self.images_kept;
        let mut inner = String::new();
        self.write_children(*element, &mut inner)?;
        if self.images_kept == kept_before {
            return Ok(());
        }
        write_open_tag(element, out)?;
        out.push_str(&inner);
        out.push_str("</figure>");
        Ok(())
    }

    fn write_fresh_img(&mut self, src: &str, alt: Option<&str>, out: &mut String) -> fmt::Result {
        out.push_str("<img");
        write_attr("src", src, out)?;
        if let Some(alt) = alt {
            write_attr("alt", alt, out)?;
        }
        out.push('>');
        self.images_kept += 1;
        self.images_inlined += 1;
        Ok(())
    }

    fn write_stripped_img(
        &mut self,
        element: ElementRef<'_>,
        new_src: Option<&str>,
        out: &mut String,
    ) -> fmt::Result {
        out.push_str("<img");
        let mut wrote_src = false;
        for (name, value) in qualified_attrs(element) {
            if name == PROCESSED_MARKER || STRIPPED_IMG_ATTRIBUTES.contains(&&*name) {
                continue;
            }
            if name == "src" {
                write_attr("src", new_src.unwrap_or(value), out)?;
                wrote_src = true;
                continue;
            }
            write_attr(&name, value, out)?;
        }
        if let (false, Some(src)) = (wrote_src, new_src) {
            write_attr("src", src, out)?;
        }
        out.push('>');
        self.images_kept += 1;
        if new_src.is_some() {
            self.images_inlined += 1;
        }
        Ok(())
    }
}

fn write_open_tag(element: ElementRef<'_>, out: &mut String) -> fmt::Result {
    write!(out, "<{}", element.value().name())?;
    for (name, value) in qualified_attrs(element) {
        write_attr(&name, value, out)?;
    }
    out.push('>');
    Ok(())
}

/// Attributes with their namespace prefix restored (`xlink:href`, `xml:lang`).
fn qualified_attrs<'a>(
    element: ElementRef<'a>,
) -> impl Iterator<Item = (Cow<'a, str>, &'a str)> {
    element.value().attrs.iter().map(|(name, value)| {
        let local: &str = &name.local;
        let name = match &name.prefix {
            Some(prefix) => Cow::Owned(format!("{}:{local}", &**prefix)),
            None => Cow::Borrowed(local),
        };
        (name, &**value)
    })
}

fn write_attr(name: &str, value: &str, out: &mut String) -> fmt::Result {
    write!(out, " {name}=\"")?;
    escape_attribute(value, out);
    out.push('"');
    Ok(())
}

pub(crate) fn escape_attribute(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

pub(crate) fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

fn parent_is_raw_text(node: NodeRef<'_, Node>) -> bool {
    node.parent()
        .and_then(|parent| parent.value().as_element().map(|el| el.name()))
        .is_some_and(|name| RAW_TEXT_ELEMENTS.contains(&name))
}
